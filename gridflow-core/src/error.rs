// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

use std::fmt;
use std::sync::Arc;

pub type Result<T> = std::result::Result<T, GridflowError>;

/// Error type shared by every gridflow crate.
///
/// Modeled as a single tagged enum rather than a per-crate `thiserror` derive
/// so that error variants can be matched on across crate boundaries (the
/// scheduler needs to tell a `TaskFailure` apart from a `TrackerStopping`
/// without downcasting).
#[derive(Debug, Clone)]
pub enum GridflowError {
    /// The event loop's channel was closed or never started.
    EventLoopNotStarted(String),
    /// Posting an event to a stopped event loop.
    EventLoopStopped(String),
    /// Catch-all for invariant violations that should never happen in
    /// practice (e.g. a duplicate insert into a supposedly-exclusive slot).
    Internal(String),
    /// Wraps an arbitrary lower-level error so it can cross an `async`
    /// boundary without losing its message.
    External(Arc<dyn std::error::Error + Send + Sync>),
}

impl fmt::Display for GridflowError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            GridflowError::EventLoopNotStarted(name) => {
                write!(f, "Event loop {name} has not been started")
            }
            GridflowError::EventLoopStopped(name) => {
                write!(f, "Event loop {name} has stopped accepting events")
            }
            GridflowError::Internal(msg) => write!(f, "Internal error: {msg}"),
            GridflowError::External(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for GridflowError {}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for GridflowError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        GridflowError::EventLoopStopped("unknown".to_owned())
    }
}
