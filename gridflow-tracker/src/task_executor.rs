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

//! The task dispatch, shuffle and discovery contracts the tracker relies
//! on but does not implement. Trait-only: a real deployment supplies
//! concrete implementations that actually launch work and talk to peers.

use std::collections::HashSet;

use async_trait::async_trait;

use crate::error::Result;
use crate::job::{JobId, NodeId, SplitId};
use crate::metadata::JobMetadata;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskType {
    Setup,
    Map,
    Reduce,
    Combine,
    Commit,
    Abort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Completed,
    Failed,
    Crashed,
}

impl TaskState {
    pub fn is_failure(self) -> bool {
        matches!(self, TaskState::Failed | TaskState::Crashed)
    }
}

#[derive(Debug, Clone)]
pub struct TaskStatus {
    pub state: TaskState,
    pub message: Option<String>,
    /// Counters produced by this task, merged into the job's replicated
    /// `counters` when the task completed successfully. Most relevant
    /// for COMMIT/ABORT, whose counters become the job's final tally.
    pub counters: Option<crate::metadata::Counters>,
}

impl TaskStatus {
    pub fn completed() -> Self {
        Self {
            state: TaskState::Completed,
            message: None,
            counters: None,
        }
    }

    pub fn completed_with_counters(counters: crate::metadata::Counters) -> Self {
        Self {
            state: TaskState::Completed,
            message: None,
            counters: Some(counters),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            state: TaskState::Failed,
            message: Some(message.into()),
            counters: None,
        }
    }
}

/// Identifies a single dispatched unit of work. `task_number` is the
/// plan-stable numbering from `Plan::task_number`; `split_id`/`reducer`
/// disambiguate which piece of work it refers to.
#[derive(Debug, Clone)]
pub struct TaskInfo {
    pub task_type: TaskType,
    pub job_id: JobId,
    pub task_number: u64,
    pub split_id: Option<SplitId>,
    pub reducer: Option<usize>,
}

impl TaskInfo {
    pub fn map(job_id: JobId, task_number: u64, split_id: SplitId) -> Self {
        Self {
            task_type: TaskType::Map,
            job_id,
            task_number,
            split_id: Some(split_id),
            reducer: None,
        }
    }

    pub fn reduce(job_id: JobId, reducer: usize) -> Self {
        Self {
            task_type: TaskType::Reduce,
            job_id,
            task_number: reducer as u64,
            split_id: None,
            reducer: Some(reducer),
        }
    }

    pub fn singleton(job_id: JobId, task_type: TaskType) -> Self {
        Self {
            task_type,
            job_id,
            task_number: 0,
            split_id: None,
            reducer: None,
        }
    }
}

/// Dispatches tasks for a job and reacts to every metadata snapshot.
///
/// `on_job_state_changed` MUST be idempotent/pure with respect to a given
/// snapshot: the tracker's `MetadataStore` reference implementation may
/// redeliver the latest snapshot to a freshly-subscribed callback, and a
/// replicated backend is free to redeliver on retry.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn run(&self, tasks: Vec<TaskInfo>);

    async fn cancel_tasks(&self, job_id: &JobId);

    async fn on_job_state_changed(&self, meta: &JobMetadata);
}

/// The shuffle subsystem: opaque beyond `flush`/`job_finished`.
#[async_trait]
pub trait Shuffle: Send + Sync {
    async fn flush(&self, job_id: &JobId) -> Result<()>;

    async fn job_finished(&self, job_id: &JobId);
}

/// Cluster membership and node-leave/-fail notifications.
#[async_trait]
pub trait Discovery: Send + Sync {
    async fn live_nodes(&self) -> HashSet<NodeId>;

    /// Subscribe to node-left/failed events. The callback is invoked once
    /// per departed node; delivery order across nodes is not guaranteed.
    fn subscribe_departures(&self) -> tokio::sync::mpsc::Receiver<NodeId>;
}

/// Node-local facts the tracker needs but does not own: identity, whether
/// this node is the job's update leader, and whether it participates in a
/// given job's plan at all.
pub trait RuntimeContext: Send + Sync {
    fn local_node_id(&self) -> NodeId;

    /// True iff this node is authorized to issue singleton tasks
    /// (SETUP/COMMIT/ABORT) and drive node-left recovery for `job_id`.
    /// Delegated to the surrounding runtime; this design only requires
    /// the predicate.
    fn is_update_leader(&self, job_id: &JobId) -> bool;

    fn is_participating(&self, meta: &JobMetadata) -> bool;
}

/// A `RuntimeContext` naming a single fixed node as update leader for
/// every job; sufficient for tests and single-node deployments.
pub struct FixedLeaderRuntimeContext {
    pub local_node_id: NodeId,
    pub leader_node_id: NodeId,
}

impl RuntimeContext for FixedLeaderRuntimeContext {
    fn local_node_id(&self) -> NodeId {
        self.local_node_id.clone()
    }

    fn is_update_leader(&self, _job_id: &JobId) -> bool {
        self.local_node_id == self.leader_node_id
    }

    fn is_participating(&self, meta: &JobMetadata) -> bool {
        meta.plan.mapper_node_ids().contains(&self.local_node_id)
            || meta.plan.reducer_node_ids().contains(&self.local_node_id)
            || self.is_update_leader(&meta.job_id)
    }
}

/// A `TaskExecutor` that records every dispatched task and every observed
/// snapshot without running anything; used by the test harness.
#[derive(Default)]
pub struct RecordingTaskExecutor {
    pub dispatched: parking_lot::Mutex<Vec<TaskInfo>>,
    pub cancelled: parking_lot::Mutex<Vec<JobId>>,
    pub snapshots: parking_lot::Mutex<Vec<JobMetadata>>,
}

#[async_trait]
impl TaskExecutor for RecordingTaskExecutor {
    async fn run(&self, tasks: Vec<TaskInfo>) {
        self.dispatched.lock().extend(tasks);
    }

    async fn cancel_tasks(&self, job_id: &JobId) {
        self.cancelled.lock().push(job_id.clone());
    }

    async fn on_job_state_changed(&self, meta: &JobMetadata) {
        self.snapshots.lock().push(meta.clone());
    }
}

/// A `Shuffle` that always succeeds immediately; used by the test harness
/// and as a sane default for deployments that don't need real shuffle.
#[derive(Default)]
pub struct NoopShuffle {
    pub flushed: parking_lot::Mutex<Vec<JobId>>,
    pub finished: parking_lot::Mutex<Vec<JobId>>,
}

#[async_trait]
impl Shuffle for NoopShuffle {
    async fn flush(&self, job_id: &JobId) -> Result<()> {
        self.flushed.lock().push(job_id.clone());
        Ok(())
    }

    async fn job_finished(&self, job_id: &JobId) {
        self.finished.lock().push(job_id.clone());
    }
}

/// A `Discovery` driven entirely by test code via `leave`/`set_live`.
pub struct ManualDiscovery {
    live: parking_lot::Mutex<HashSet<NodeId>>,
    tx: tokio::sync::mpsc::Sender<NodeId>,
    rx: parking_lot::Mutex<Option<tokio::sync::mpsc::Receiver<NodeId>>>,
}

impl ManualDiscovery {
    pub fn new(initial_live: HashSet<NodeId>) -> Self {
        let (tx, rx) = tokio::sync::mpsc::channel(64);
        Self {
            live: parking_lot::Mutex::new(initial_live),
            tx,
            rx: parking_lot::Mutex::new(Some(rx)),
        }
    }

    pub async fn leave(&self, node_id: NodeId) {
        self.live.lock().remove(&node_id);
        let _ = self.tx.send(node_id).await;
    }
}

#[async_trait]
impl Discovery for ManualDiscovery {
    async fn live_nodes(&self) -> HashSet<NodeId> {
        self.live.lock().clone()
    }

    fn subscribe_departures(&self) -> tokio::sync::mpsc::Receiver<NodeId> {
        self.rx
            .lock()
            .take()
            .expect("subscribe_departures called more than once on ManualDiscovery")
    }
}
