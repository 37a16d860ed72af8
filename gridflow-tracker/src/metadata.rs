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

//! The replicated record a `JobTracker` drives through its lifecycle.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::job::{JobId, JobInfo, NodeId, Plan, ProcessDescriptor, SplitId};

/// Where a job sits in its lifecycle. Transitions are one-directional
/// except for the `CANCELLING` branch, which can be entered from `SETUP`,
/// `MAP` or `REDUCE` and always leads to `COMPLETE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Setup,
    Map,
    Reduce,
    Cancelling,
    Complete,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Complete)
    }
}

/// Running counters carried alongside a job's metadata, surfaced to
/// metrics and to clients polling job status. Plain data, no behavior;
/// merged by summation in `Transform::IncrementCounters`.
#[derive(Debug, Clone, Default)]
pub struct Counters {
    values: HashMap<String, u64>,
}

impl Counters {
    pub fn get(&self, name: &str) -> u64 {
        self.values.get(name).copied().unwrap_or(0)
    }

    pub fn set(&mut self, name: impl Into<String>, value: u64) {
        self.values.insert(name.into(), value);
    }

    /// Merge `other` into `self` by summing values sharing a name.
    pub fn merge(&mut self, other: &Counters) {
        for (name, value) in &other.values {
            *self.values.entry(name.clone()).or_insert(0) += value;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl FromIterator<(String, u64)> for Counters {
    fn from_iter<I: IntoIterator<Item = (String, u64)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// The full replicated state of a single job, as stored under its
/// `JobId` key in the `MetadataStore`. Every field is plain data so the
/// record can be cloned and diffed cheaply; all behavior lives in
/// `Transform::apply`.
#[derive(Clone)]
pub struct JobMetadata {
    pub job_id: JobId,
    pub submitter_node_id: NodeId,
    pub job_info: Arc<dyn JobInfo>,
    pub plan: Arc<dyn Plan>,

    pub phase: Phase,
    /// Splits not yet reported complete. Seeded from the plan at
    /// submission and drained as `RemoveMappers` transforms land.
    pub pending_splits: HashSet<SplitId>,
    /// Reducer indices not yet reported complete.
    pub pending_reducers: HashSet<usize>,
    /// Reducer index -> where it can be reached, populated as reducers
    /// come online during `MAP`/`REDUCE`.
    pub reducer_addresses: HashMap<usize, ProcessDescriptor>,
    pub counters: Counters,
    /// The first fatal error observed for this job, if any.
    pub fail_cause: Option<String>,

    pub queued_at: u64,
    pub setup_complete_ts: Option<u64>,
    pub map_complete_ts: Option<u64>,
    pub complete_ts: Option<u64>,
    /// Set once the record reaches `COMPLETE`, so it self-evicts from the
    /// store after `TrackerConfig::finished_job_info_ttl`.
    pub ttl: Option<u64>,
}

impl JobMetadata {
    /// The metadata for a freshly planned job, phase=SETUP, before any
    /// split or reducer has reported progress.
    pub fn new(
        job_id: JobId,
        submitter_node_id: NodeId,
        job_info: Arc<dyn JobInfo>,
        plan: Arc<dyn Plan>,
        queued_at: u64,
    ) -> Self {
        let pending_splits = plan.all_splits().iter().map(|s| s.split_id()).collect();
        let pending_reducers = (0..plan.reducer_count()).collect();
        Self {
            job_id,
            submitter_node_id,
            job_info,
            plan,
            phase: Phase::Setup,
            pending_splits,
            pending_reducers,
            reducer_addresses: HashMap::new(),
            counters: Counters::default(),
            fail_cause: None,
            queued_at,
            setup_complete_ts: None,
            map_complete_ts: None,
            complete_ts: None,
            ttl: None,
        }
    }

    pub fn is_cancelling(&self) -> bool {
        matches!(self.phase, Phase::Cancelling)
    }

    pub fn is_complete(&self) -> bool {
        self.phase.is_terminal()
    }
}

impl std::fmt::Debug for JobMetadata {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("JobMetadata")
            .field("job_id", &self.job_id)
            .field("phase", &self.phase)
            .field("pending_splits", &self.pending_splits.len())
            .field("pending_reducers", &self.pending_reducers.len())
            .field("fail_cause", &self.fail_cause)
            .finish()
    }
}
