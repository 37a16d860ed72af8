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

//! A harness that drives a `JobTracker` against virtual nodes with no
//! real networking: an in-memory store, a manual discovery service and a
//! recording task executor that a test can hand completions to directly.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::TrackerConfig;
use crate::error::Result;
use crate::job::{Job, JobFactory, JobId, JobInfo, NodeId, Plan, Planner};
use crate::metrics::TestMetricsCollector;
use crate::store::InMemoryMetadataStore;
use crate::task_executor::{
    FixedLeaderRuntimeContext, ManualDiscovery, NoopShuffle, RecordingTaskExecutor, TaskInfo,
    TaskStatus,
};
use crate::tracker::{FinishResult, JobTracker, JobTrackerDeps};

/// A `Job` that does nothing; sufficient for exercising the state
/// machine without any real map/reduce work.
#[derive(Debug)]
pub struct VirtualJob {
    id: JobId,
}

#[async_trait]
impl Job for VirtualJob {
    fn id(&self) -> &JobId {
        &self.id
    }

    async fn initialize(&self, _local_node_id: &NodeId) -> Result<()> {
        Ok(())
    }

    async fn dispose(&self, _interrupt: bool) {}

    async fn cleanup_staging_directory(&self) {}
}

#[derive(Debug)]
pub struct VirtualJobInfo {
    pub name: String,
}

impl JobInfo for VirtualJobInfo {
    fn name(&self) -> &str {
        &self.name
    }
}

pub struct VirtualJobFactory;

#[async_trait]
impl JobFactory for VirtualJobFactory {
    async fn create(&self, job_id: JobId, _job_info: Arc<dyn JobInfo>) -> Result<Arc<dyn Job>> {
        Ok(Arc::new(VirtualJob { id: job_id }))
    }
}

/// Always produces the plan a test constructed ahead of time, ignoring
/// `live_nodes`; tests that need planning to react to membership changes
/// build a fresh planner per scenario.
pub struct FixedPlanner {
    pub plan: Arc<dyn Plan>,
}

#[async_trait]
impl Planner for FixedPlanner {
    async fn plan(&self, _job: &dyn Job, _live_nodes: &std::collections::HashSet<NodeId>) -> Result<Arc<dyn Plan>> {
        Ok(self.plan.clone())
    }
}

/// Everything a test needs to poke at a single-node `JobTracker`: the
/// tracker itself, plus handles to its collaborators so the test can
/// simulate task completions and node departures directly.
pub struct TrackerTest {
    pub tracker: Arc<JobTracker>,
    pub task_executor: Arc<RecordingTaskExecutor>,
    pub shuffle: Arc<NoopShuffle>,
    pub discovery: Arc<ManualDiscovery>,
    pub metrics: Arc<TestMetricsCollector>,
}

impl TrackerTest {
    pub async fn new(local_node_id: impl Into<String>, plan: Arc<dyn Plan>) -> Self {
        Self::with_live_nodes(local_node_id, plan, vec![]).await
    }

    pub async fn with_live_nodes(
        local_node_id: impl Into<String>,
        plan: Arc<dyn Plan>,
        other_live_nodes: Vec<NodeId>,
    ) -> Self {
        let local_node_id = local_node_id.into();
        let mut live_nodes: std::collections::HashSet<NodeId> = other_live_nodes.into_iter().collect();
        live_nodes.insert(local_node_id.clone());

        let store = Arc::new(InMemoryMetadataStore::new());
        let task_executor = Arc::new(RecordingTaskExecutor::default());
        let shuffle = Arc::new(NoopShuffle::default());
        let discovery = Arc::new(ManualDiscovery::new(live_nodes));
        let metrics = Arc::new(TestMetricsCollector::new());
        let runtime = Arc::new(FixedLeaderRuntimeContext {
            local_node_id: local_node_id.clone(),
            leader_node_id: local_node_id.clone(),
        });

        let deps = JobTrackerDeps {
            local_node_id,
            store,
            planner: Arc::new(FixedPlanner { plan }),
            task_executor: task_executor.clone(),
            shuffle: shuffle.clone(),
            discovery: discovery.clone(),
            runtime,
            job_factory: Arc::new(VirtualJobFactory),
            metrics: metrics.clone(),
            config: TrackerConfig::default().with_node_left_recheck_interval(Duration::from_secs(3600)),
        };

        let tracker = Arc::new(JobTracker::new(deps));
        tracker.start().await.expect("event loop starts");

        Self {
            tracker,
            task_executor,
            shuffle,
            discovery,
            metrics,
        }
    }

    pub async fn submit(&self, job_id: impl Into<String>, name: impl Into<String>) -> Result<JobId> {
        self.tracker
            .submit(
                JobId::new(job_id.into()),
                Arc::new(VirtualJobInfo { name: name.into() }),
            )
            .await
    }

    pub async fn complete(&self, task: TaskInfo, status: TaskStatus) -> Result<()> {
        self.tracker.on_task_finished(task, status).await
    }

    pub async fn finish(&self, job_id: &JobId) -> Result<FinishResult> {
        self.tracker.finish_future(job_id).await
    }

    /// Polls `status` until `predicate` is satisfied or `timeout` elapses,
    /// returning the last observed metadata.
    pub async fn await_status(
        &self,
        job_id: &JobId,
        timeout: Duration,
        mut predicate: impl FnMut(&crate::metadata::JobMetadata) -> bool,
    ) -> Option<crate::metadata::JobMetadata> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Ok(Some(meta)) = self.tracker.status(job_id).await {
                if predicate(&meta) {
                    return Some(meta);
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return None;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

pub fn assert_metric_recorded(
    collector: &TestMetricsCollector,
    job_id: &JobId,
    kind: crate::metrics::MetricEventKind,
) {
    assert!(
        collector
            .events()
            .iter()
            .any(|e| &e.job_id == job_id && e.kind == kind),
        "expected a {kind:?} metric event for {job_id}, got {:?}",
        collector.events()
    );
}
