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

//! The job tracker state machine: drives map/reduce jobs through
//! SETUP → MAP → REDUCE → COMPLETE (with a CANCELLING branch) on one
//! participating node, reacting to task-completion callbacks and cluster
//! membership changes while keeping a replicated metadata record
//! consistent across the cluster.

pub mod config;
pub mod error;
pub mod event;
pub mod job;
pub mod local_state;
pub mod metadata;
pub mod metrics;
pub mod registry;
pub mod store;
pub mod task_executor;
pub mod transform;
pub mod tracker;

#[cfg(test)]
pub mod test_utils;

pub use config::TrackerConfig;
pub use error::{Result, TrackerError};
pub use metadata::{Counters, JobMetadata, Phase};
pub use tracker::{FinishResult, JobTracker, JobTrackerDeps};
