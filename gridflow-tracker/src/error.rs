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

use gridflow_core::error::GridflowError;

pub type Result<T> = std::result::Result<T, TrackerError>;

/// The tracker's crate-wide error type. A single hand-rolled enum,
/// mirroring `gridflow_core::GridflowError`, rather than a per-variant
/// `thiserror` derive.
#[derive(Debug, Clone)]
pub enum TrackerError {
    /// The lifecycle gate is closed; every public API returns this (or a
    /// `false`/`None` equivalent where the call site documents it).
    TrackerStopping,
    /// `submit` called with a `JobId` already known locally or in the
    /// store.
    DuplicateJob(String),
    /// `status`/`plan`/`counters` for a `JobId` the store has no record
    /// of.
    UnknownJob(String),
    /// A task reported `Failed`/`Crashed`; carried into `fail_cause`.
    TaskFailure(String),
    /// `Planner::plan` returned an error; the job was never persisted.
    PlanningFailure(String),
    /// A node hosting part of a job's plan left the cluster while the
    /// job was active.
    ParticipantLost(String),
    /// `kill` was invoked.
    Cancelled,
    /// Catch-all for invariant violations that should never happen in
    /// practice.
    Internal(String),
}

impl TrackerError {
    /// The message that lands in a job's `fail_cause` when this error
    /// drives a job into `CANCELLING`.
    pub fn as_fail_cause(&self) -> String {
        match self {
            TrackerError::TrackerStopping => "tracker is stopping".to_owned(),
            TrackerError::DuplicateJob(id) => format!("duplicate job: {id}"),
            TrackerError::UnknownJob(id) => format!("unknown job: {id}"),
            TrackerError::TaskFailure(msg) => msg.clone(),
            TrackerError::PlanningFailure(msg) => msg.clone(),
            TrackerError::ParticipantLost(msg) => msg.clone(),
            TrackerError::Cancelled => "Job cancelled".to_owned(),
            TrackerError::Internal(msg) => msg.clone(),
        }
    }
}

impl fmt::Display for TrackerError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TrackerError::TrackerStopping => write!(f, "tracker is stopping"),
            TrackerError::DuplicateJob(id) => write!(f, "duplicate job: {id}"),
            TrackerError::UnknownJob(id) => write!(f, "unknown job: {id}"),
            TrackerError::TaskFailure(msg) => write!(f, "task failure: {msg}"),
            TrackerError::PlanningFailure(msg) => write!(f, "planning failure: {msg}"),
            TrackerError::ParticipantLost(msg) => write!(f, "participant lost: {msg}"),
            TrackerError::Cancelled => write!(f, "job cancelled"),
            TrackerError::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for TrackerError {}

impl From<GridflowError> for TrackerError {
    fn from(err: GridflowError) -> Self {
        match err {
            GridflowError::EventLoopNotStarted(_) | GridflowError::EventLoopStopped(_) => {
                TrackerError::TrackerStopping
            }
            GridflowError::Internal(msg) => TrackerError::Internal(msg),
            GridflowError::External(err) => TrackerError::Internal(err.to_string()),
        }
    }
}
