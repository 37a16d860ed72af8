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

//! The public facade: submits jobs, answers status queries, dispatches
//! local work as metadata changes, and reacts to task completions and
//! cluster membership changes through a single-threaded event loop.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use log::{debug, info, warn};
use tokio::sync::{Notify, OnceCell as AsyncOnceCell, RwLock};

use gridflow_core::event_loop::{EventHandler, EventLoop};
use gridflow_core::time::timestamp_secs;

use crate::config::TrackerConfig;
use crate::error::{Result, TrackerError};
use crate::event::TrackerEvent;
use crate::job::{Job, JobFactory, JobId, JobInfo, NodeId, Planner, ProcessDescriptor};
use crate::local_state::LocalJobState;
use crate::metadata::{Counters, JobMetadata, Phase};
use crate::metrics::TrackerMetricsCollector;
use crate::registry::JobRegistry;
use crate::store::MetadataStore;
use crate::task_executor::{
    Discovery, RuntimeContext, Shuffle, TaskExecutor, TaskInfo, TaskState, TaskStatus, TaskType,
};
use crate::transform::{orphaned_work, Transform};

/// The resolution of a job's finish future: the terminal `fail_cause`, or
/// `None` if the job completed successfully.
#[derive(Debug, Clone)]
pub struct FinishResult {
    pub job_id: JobId,
    pub fail_cause: Option<String>,
}

/// A single-resolution slot shared by every caller awaiting the same
/// job's completion. Modeled after the `OnceCell`-based construct-once
/// pattern in `JobRegistry`, but allows many waiters rather than many
/// constructors.
struct FinishSlot {
    result: AsyncOnceCell<FinishResult>,
    notify: Notify,
}

impl FinishSlot {
    fn new() -> Self {
        Self {
            result: AsyncOnceCell::new(),
            notify: Notify::new(),
        }
    }

    fn resolve(&self, result: FinishResult) {
        let _ = self.result.set(result);
        self.notify.notify_waiters();
    }

    async fn wait(&self) -> FinishResult {
        loop {
            if let Some(result) = self.result.get() {
                return result.clone();
            }
            let notified = self.notify.notified();
            if let Some(result) = self.result.get() {
                return result.clone();
            }
            notified.await;
        }
    }
}

/// A readers-writer gate guarding "alive vs shutting down". Every public
/// entry point acquires a read permit; `stop()` acquires the write
/// permit, which only succeeds once every in-flight read permit has been
/// released, then permanently closes the gate.
struct Gate {
    lock: RwLock<bool>,
}

impl Gate {
    fn new() -> Self {
        Self {
            lock: RwLock::new(false),
        }
    }

    async fn enter(&self) -> Result<tokio::sync::RwLockReadGuard<'_, bool>> {
        let guard = self.lock.read().await;
        if *guard {
            Err(TrackerError::TrackerStopping)
        } else {
            Ok(guard)
        }
    }

    async fn close(&self) {
        let mut guard = self.lock.write().await;
        *guard = true;
    }
}

/// Everything the facade needs to collaborate with the rest of the
/// cluster. Constructed once and handed to [`JobTracker::new`].
pub struct JobTrackerDeps {
    pub local_node_id: NodeId,
    pub store: Arc<dyn MetadataStore>,
    pub planner: Arc<dyn Planner>,
    pub task_executor: Arc<dyn TaskExecutor>,
    pub shuffle: Arc<dyn Shuffle>,
    pub discovery: Arc<dyn Discovery>,
    pub runtime: Arc<dyn RuntimeContext>,
    pub job_factory: Arc<dyn JobFactory>,
    pub metrics: Arc<dyn TrackerMetricsCollector>,
    pub config: TrackerConfig,
}

struct Inner {
    local_node_id: NodeId,
    store: Arc<dyn MetadataStore>,
    planner: Arc<dyn Planner>,
    task_executor: Arc<dyn TaskExecutor>,
    shuffle: Arc<dyn Shuffle>,
    discovery: Arc<dyn Discovery>,
    runtime: Arc<dyn RuntimeContext>,
    registry: JobRegistry,
    metrics: Arc<dyn TrackerMetricsCollector>,
    config: TrackerConfig,
    local_states: DashMap<JobId, Arc<LocalJobState>>,
    finish_futs: DashMap<JobId, Arc<FinishSlot>>,
    gate: Gate,
}

/// The per-node job tracker state machine.
pub struct JobTracker {
    inner: Arc<Inner>,
    event_loop: tokio::sync::Mutex<EventLoop<TrackerEvent>>,
}

impl JobTracker {
    pub fn new(deps: JobTrackerDeps) -> Self {
        let buffer_size = deps.config.event_loop_buffer_size() as usize;
        let inner = Arc::new(Inner {
            local_node_id: deps.local_node_id,
            store: deps.store,
            planner: deps.planner,
            task_executor: deps.task_executor,
            shuffle: deps.shuffle,
            discovery: deps.discovery,
            runtime: deps.runtime,
            registry: JobRegistry::new(deps.job_factory),
            metrics: deps.metrics,
            config: deps.config,
            local_states: DashMap::new(),
            finish_futs: DashMap::new(),
            gate: Gate::new(),
        });

        let event_loop = EventLoop::new(
            "job-tracker".to_owned(),
            buffer_size,
            inner.clone() as Arc<dyn EventHandler<TrackerEvent>>,
        );

        Self {
            inner,
            event_loop: tokio::sync::Mutex::new(event_loop),
        }
    }

    /// Subscribes to the metadata store and discovery service, and starts
    /// the event loop. Must be called before `submit`.
    pub async fn start(&self) -> Result<()> {
        let mut event_loop = self.event_loop.lock().await;
        event_loop.start()?;
        let sender = event_loop.get_sender()?;
        drop(event_loop);

        let mut store_updates = self.inner.store.subscribe();
        let forward = sender.clone();
        tokio::task::spawn(async move {
            loop {
                match store_updates.recv().await {
                    Ok(meta) => {
                        if forward
                            .post_event(TrackerEvent::MetadataUpdated(meta))
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        warn!("job tracker missed {n} metadata updates, falling behind");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        let mut departures = self.inner.discovery.subscribe_departures();
        let forward = sender.clone();
        tokio::task::spawn(async move {
            while let Some(node_id) = departures.recv().await {
                if forward
                    .post_event(TrackerEvent::NodeDeparted(node_id))
                    .await
                    .is_err()
                {
                    break;
                }
            }
        });

        let recheck_interval = self.inner.config.node_left_recheck_interval();
        let forward = sender;
        tokio::task::spawn(async move {
            let mut ticker = tokio::time::interval(recheck_interval);
            loop {
                ticker.tick().await;
                if forward
                    .post_event(TrackerEvent::RecheckNodeLeft)
                    .await
                    .is_err()
                {
                    break;
                }
            }
        });

        Ok(())
    }

    /// Closes the gate (rejecting all new public calls once in-flight
    /// ones drain), stops the event loop, and fails every active finish
    /// future with `TrackerStopping`.
    pub async fn stop(&self) {
        self.inner.gate.close().await;
        self.event_loop.lock().await.stop().await;
        for entry in self.inner.finish_futs.iter() {
            entry.value().resolve(FinishResult {
                job_id: entry.key().clone(),
                fail_cause: Some(TrackerError::TrackerStopping.as_fail_cause()),
            });
        }
    }

    pub async fn submit(&self, job_id: JobId, job_info: Arc<dyn JobInfo>) -> Result<JobId> {
        let _permit = self.inner.gate.enter().await?;

        if self.inner.store.get(&job_id).await.is_some() {
            return Err(TrackerError::DuplicateJob(job_id.to_string()));
        }
        if self.inner.finish_futs.contains_key(&job_id) {
            return Err(TrackerError::DuplicateJob(job_id.to_string()));
        }

        let job = self
            .inner
            .registry
            .get_or_create(job_id.clone(), job_info.clone())
            .await?;
        job.initialize(&self.inner.local_node_id).await?;

        let live_nodes = self.inner.discovery.live_nodes().await;
        let plan = self
            .inner
            .planner
            .plan(job.as_ref(), &live_nodes)
            .await
            .map_err(|e| TrackerError::PlanningFailure(e.to_string()))?;

        let queued_at = timestamp_secs();
        let meta = JobMetadata::new(
            job_id.clone(),
            self.inner.local_node_id.clone(),
            job_info,
            plan,
            queued_at,
        );

        match self.inner.finish_futs.entry(job_id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(TrackerError::Internal(format!(
                    "finish future already registered for {job_id}"
                )));
            }
            dashmap::mapref::entry::Entry::Vacant(v) => {
                v.insert(Arc::new(FinishSlot::new()));
            }
        }

        if !self.inner.store.put_if_absent(job_id.clone(), meta).await {
            self.inner.finish_futs.remove(&job_id);
            return Err(TrackerError::DuplicateJob(job_id.to_string()));
        }

        let submitted_at = timestamp_secs();
        self.inner
            .metrics
            .record_submitted(&job_id, queued_at, submitted_at);
        info!("job {job_id} submitted");

        Ok(job_id)
    }

    pub async fn status(&self, job_id: &JobId) -> Result<Option<JobMetadata>> {
        let _permit = self.inner.gate.enter().await?;
        Ok(self.inner.store.get(job_id).await)
    }

    pub async fn plan(&self, job_id: &JobId) -> Result<Option<Arc<dyn crate::job::Plan>>> {
        let _permit = self.inner.gate.enter().await?;
        Ok(self.inner.store.get(job_id).await.map(|m| m.plan))
    }

    pub async fn counters(&self, job_id: &JobId) -> Result<Option<Counters>> {
        let _permit = self.inner.gate.enter().await?;
        Ok(self.inner.store.get(job_id).await.map(|m| m.counters))
    }

    /// Idempotent: if the metadata is already `COMPLETE`, resolves
    /// immediately.
    pub async fn finish_future(&self, job_id: &JobId) -> Result<FinishResult> {
        let _permit = self.inner.gate.enter().await?;

        let slot = self
            .inner
            .finish_futs
            .entry(job_id.clone())
            .or_insert_with(|| Arc::new(FinishSlot::new()))
            .clone();

        if let Some(meta) = self.inner.store.get(job_id).await {
            if meta.is_complete() {
                slot.resolve(FinishResult {
                    job_id: job_id.clone(),
                    fail_cause: meta.fail_cause.clone(),
                });
            }
        }

        Ok(slot.wait().await)
    }

    /// Issues `CancelJob` unless the job is already terminal/cancelling,
    /// then waits for it to finish. Returns `true` iff it resolved with a
    /// cancellation cause.
    pub async fn kill(&self, job_id: &JobId) -> Result<bool> {
        let _permit = self.inner.gate.enter().await?;

        if let Some(meta) = self.inner.store.get(job_id).await {
            if !meta.is_complete() && !meta.is_cancelling() {
                self.inner
                    .store
                    .transform(
                        job_id,
                        Box::new(move |current| {
                            current.map(|m| {
                                Transform::cancel_job(
                                    Some(TrackerError::Cancelled.as_fail_cause()),
                                    HashSet::new(),
                                    HashSet::new(),
                                )
                                .apply(m)
                            })
                        }),
                    )
                    .await?;
            }
        } else {
            return Err(TrackerError::UnknownJob(job_id.to_string()));
        }

        let result = self.finish_future(job_id).await?;
        Ok(result.fail_cause.is_some())
    }

    pub async fn on_task_finished(&self, task_info: TaskInfo, status: TaskStatus) -> Result<()> {
        let _permit = self.inner.gate.enter().await?;
        self.inner.on_task_finished(task_info, status).await
    }

    pub async fn on_external_mappers_initialized(
        &self,
        job_id: JobId,
        reducers: Vec<usize>,
        desc: ProcessDescriptor,
    ) -> Result<()> {
        let _permit = self.inner.gate.enter().await?;
        self.inner
            .store
            .transform(
                &job_id,
                Box::new(move |current| {
                    current.map(|m| Transform::initialize_reducers(reducers, desc).apply(m))
                }),
            )
            .await?;
        Ok(())
    }
}

impl Inner {
    async fn on_task_finished(&self, task_info: TaskInfo, status: TaskStatus) -> Result<()> {
        let job_id = task_info.job_id.clone();
        match task_info.task_type {
            TaskType::Setup => {
                let transform = if status.state == TaskState::Completed {
                    Transform::update_phase(Phase::Map)
                } else {
                    let err = status.message.clone().unwrap_or_else(|| {
                        TrackerError::TaskFailure("setup task failed".to_owned()).as_fail_cause()
                    });
                    Transform::cancel_job(Some(err), HashSet::new(), HashSet::new())
                };
                self.apply_transform(&job_id, transform).await
            }
            TaskType::Map => self.on_map_finished(task_info, status).await,
            TaskType::Reduce => {
                let reducer = task_info
                    .reducer
                    .ok_or_else(|| TrackerError::Internal("REDUCE task missing reducer index".into()))?;
                let err = status.state.is_failure().then(|| {
                    status.message.clone().unwrap_or_else(|| {
                        TrackerError::TaskFailure("reduce task failed".to_owned()).as_fail_cause()
                    })
                });
                self.apply_transform(&job_id, Transform::remove_reducer(reducer, err))
                    .await
            }
            TaskType::Combine => self.on_combine_finished(task_info, status).await,
            TaskType::Commit | TaskType::Abort => {
                let ttl = timestamp_secs() + self.config.finished_job_info_ttl().as_secs();
                let mut stack = vec![Transform::SetTtl(ttl)];
                if status.state == TaskState::Completed {
                    if let Some(counters) = status.counters {
                        stack.push(Transform::increment_counters(counters));
                    }
                }
                stack.push(Transform::update_phase(Phase::Complete));
                self.apply_stack(&job_id, stack).await
            }
        }
    }

    async fn on_map_finished(&self, task_info: TaskInfo, status: TaskStatus) -> Result<()> {
        let job_id = task_info.job_id.clone();
        let split_id = task_info
            .split_id
            .ok_or_else(|| TrackerError::Internal("MAP task missing split id".into()))?;
        let local_state = self.local_state(&job_id);
        let last_mapper_finished = local_state.on_map_finished();

        if status.state.is_failure() {
            let err = status.message.clone().unwrap_or_else(|| {
                TrackerError::TaskFailure("map task failed".to_owned()).as_fail_cause()
            });
            return self
                .apply_transform(
                    &job_id,
                    Transform::remove_mappers(HashSet::from([split_id]), Some(err)),
                )
                .await;
        }

        if last_mapper_finished {
            let flush_err = self.shuffle.flush(&job_id).await.err();
            self.apply_transform(
                &job_id,
                Transform::remove_mappers(
                    HashSet::from([split_id]),
                    flush_err.map(|e| e.to_string()),
                ),
            )
            .await
        } else {
            self.apply_transform(&job_id, Transform::remove_mappers(HashSet::from([split_id]), None))
                .await
        }
    }

    async fn on_combine_finished(&self, task_info: TaskInfo, status: TaskStatus) -> Result<()> {
        let job_id = task_info.job_id.clone();
        let local_state = self.local_state(&job_id);
        let scheduled: HashSet<_> = local_state.scheduled_mappers().into_iter().collect();

        if status.state.is_failure() {
            let err = status.message.clone().unwrap_or_else(|| {
                TrackerError::TaskFailure("combine task failed".to_owned()).as_fail_cause()
            });
            return self
                .apply_transform(&job_id, Transform::remove_mappers(scheduled, Some(err)))
                .await;
        }

        let flush_err = self.shuffle.flush(&job_id).await.err();
        self.apply_transform(
            &job_id,
            Transform::remove_mappers(scheduled, flush_err.map(|e| e.to_string())),
        )
        .await
    }

    async fn apply_transform(&self, job_id: &JobId, transform: Transform) -> Result<()> {
        self.apply_stack(job_id, vec![transform]).await
    }

    async fn apply_stack(&self, job_id: &JobId, stack: Vec<Transform>) -> Result<()> {
        crate::store::transform_with_stack(&self.store, job_id, stack).await
    }

    fn local_state(&self, job_id: &JobId) -> Arc<LocalJobState> {
        self.local_states
            .entry(job_id.clone())
            .or_insert_with(|| Arc::new(LocalJobState::new()))
            .clone()
    }

    /// Dispatch the local node's share of work for `meta`, per its
    /// current phase.
    async fn dispatch_local_work(&self, meta: &JobMetadata) {
        self.task_executor.on_job_state_changed(meta).await;
        self.metrics.set_pending_tasks_queue_size(
            (meta.pending_splits.len() + meta.pending_reducers.len()) as i64,
        );

        match meta.phase {
            Phase::Setup => {
                if self.runtime.is_update_leader(&meta.job_id) && !self.local_states.contains_key(&meta.job_id) {
                    self.local_state(&meta.job_id);
                    self.task_executor
                        .run(vec![TaskInfo::singleton(meta.job_id.clone(), TaskType::Setup)])
                        .await;
                }
            }
            Phase::Map => {
                if !self.runtime.is_participating(meta) {
                    return;
                }
                let local_state = self.local_state(&meta.job_id);
                let mut tasks = vec![];
                for split in meta.plan.mappers(&self.local_node_id) {
                    if local_state.try_schedule_mapper(split.split_id()) {
                        let task_number = meta.plan.task_number(split.as_ref());
                        tasks.push(TaskInfo::map(meta.job_id.clone(), task_number, split.split_id()));
                    }
                }
                if !tasks.is_empty() {
                    self.task_executor.run(tasks).await;
                }
            }
            Phase::Reduce => {
                if meta.pending_reducers.is_empty() && self.runtime.is_update_leader(&meta.job_id) {
                    self.task_executor
                        .run(vec![TaskInfo::singleton(meta.job_id.clone(), TaskType::Commit)])
                        .await;
                    return;
                }
                if !self.runtime.is_participating(meta) {
                    return;
                }
                let local_state = self.local_state(&meta.job_id);
                let mut tasks = vec![];
                for reducer in meta.plan.reducers(&self.local_node_id) {
                    if local_state.try_schedule_reducer(reducer) {
                        tasks.push(TaskInfo::reduce(meta.job_id.clone(), reducer));
                    }
                }
                if !tasks.is_empty() {
                    self.task_executor.run(tasks).await;
                }
            }
            Phase::Cancelling => {
                if !self.runtime.is_participating(meta) {
                    return;
                }
                let local_state = self.local_state(&meta.job_id);
                if local_state.on_cancel() {
                    self.task_executor.cancel_tasks(&meta.job_id).await;
                }

                if meta.pending_splits.is_empty() && meta.pending_reducers.is_empty() {
                    if self.runtime.is_update_leader(&meta.job_id) && local_state.on_aborted() {
                        self.task_executor
                            .run(vec![TaskInfo::singleton(meta.job_id.clone(), TaskType::Abort)])
                            .await;
                    }
                } else {
                    let unscheduled_splits: HashSet<_> = meta
                        .plan
                        .mappers(&self.local_node_id)
                        .iter()
                        .map(|s| s.split_id())
                        .filter(|id| !local_state.is_mapper_scheduled(*id))
                        .collect();
                    let unscheduled_reducers: HashSet<_> = meta
                        .plan
                        .reducers(&self.local_node_id)
                        .into_iter()
                        .filter(|r| !local_state.is_reducer_scheduled(*r))
                        .collect();
                    if !unscheduled_splits.is_empty() || !unscheduled_reducers.is_empty() {
                        let job_id = meta.job_id.clone();
                        let _ = self
                            .apply_transform(
                                &job_id,
                                Transform::cancel_job(None, unscheduled_splits, unscheduled_reducers),
                            )
                            .await;
                    }
                }
            }
            Phase::Complete => {
                self.local_states.remove(&meta.job_id);
                self.shuffle.job_finished(&meta.job_id).await;

                if let Some(slot) = self.finish_futs.get(&meta.job_id) {
                    slot.resolve(FinishResult {
                        job_id: meta.job_id.clone(),
                        fail_cause: meta.fail_cause.clone(),
                    });
                }
                self.finish_futs.remove(&meta.job_id);

                if self.runtime.is_update_leader(&meta.job_id) {
                    if let Some(job) = self.registry.get(&meta.job_id) {
                        job.cleanup_staging_directory().await;
                    }
                }
                self.registry
                    .remove_and_dispose(&meta.job_id, meta.fail_cause.is_some())
                    .await;

                let now = timestamp_secs();
                match &meta.fail_cause {
                    None => self.metrics.record_completed(&meta.job_id, meta.queued_at, now),
                    Some(cause) if cause == &TrackerError::Cancelled.as_fail_cause() => {
                        self.metrics.record_cancelled(&meta.job_id)
                    }
                    Some(_) => self.metrics.record_failed(&meta.job_id, meta.queued_at, now),
                }
                info!("job {} reached COMPLETE (fail_cause={:?})", meta.job_id, meta.fail_cause);
            }
        }
    }

    /// Node-left recovery: only the update leader acts, scanning every
    /// job in the store for assignments that live on a node no longer in
    /// `live_nodes`.
    async fn recover_node_left(&self) {
        let live_nodes = self.discovery.live_nodes().await;
        for meta in self.store.all().await {
            if !self.runtime.is_update_leader(&meta.job_id) {
                continue;
            }
            match meta.phase {
                Phase::Setup => {
                    if !self.local_states.contains_key(&meta.job_id) {
                        debug!("re-dispatching SETUP for {} after leader failover", meta.job_id);
                        self.dispatch_local_work(&meta).await;
                    }
                }
                Phase::Map | Phase::Reduce => {
                    let (splits, reducers) = orphaned_work(meta.plan.as_ref(), &live_nodes);
                    if !splits.is_empty() || !reducers.is_empty() {
                        warn!(
                            "job {} lost {} mapper(s) and {} reducer(s) to departed nodes",
                            meta.job_id,
                            splits.len(),
                            reducers.len()
                        );
                        let err = TrackerError::ParticipantLost(
                            "One or more nodes hosting this job's work failed".to_owned(),
                        )
                        .as_fail_cause();
                        let _ = self
                            .apply_transform(
                                &meta.job_id,
                                Transform::cancel_job(Some(err), splits, reducers),
                            )
                            .await;
                    }
                }
                _ => {}
            }
        }
    }
}

#[async_trait]
impl EventHandler<TrackerEvent> for Inner {
    async fn on_event(&self, event: TrackerEvent) -> gridflow_core::error::Result<()> {
        match event {
            TrackerEvent::MetadataUpdated(meta) => {
                self.dispatch_local_work(&meta).await;
            }
            TrackerEvent::NodeDeparted(node_id) => {
                debug!("node {node_id} departed, running recovery");
                self.recover_node_left().await;
            }
            TrackerEvent::RecheckNodeLeft => {
                self.recover_node_left().await;
            }
        }
        Ok(())
    }

    async fn on_stop(&self) {
        info!("job tracker event loop stopped");
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashMap;
    use std::time::Duration;

    use crate::job::{NumberedSplit, StaticPlan};
    use crate::metadata::Phase;
    use crate::metrics::MetricEventKind;
    use crate::task_executor::{TaskInfo, TaskStatus, TaskType};
    use crate::test_utils::{assert_metric_recorded, TrackerTest};

    use super::*;

    /// Polls until `check` holds or `timeout` elapses; used to wait for
    /// the event loop to have processed a metadata update (e.g. to have
    /// scheduled every local mapper) before a test simulates completions,
    /// since `status()` reflects the store write itself, not the
    /// subsequent local dispatch that write triggers.
    async fn poll_until(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if check() {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    fn two_mapper_one_reducer_plan(node_a: &str, node_b: &str) -> Arc<dyn crate::job::Plan> {
        let mut mappers = HashMap::new();
        mappers.insert(
            node_a.to_owned(),
            vec![Arc::new(NumberedSplit(1)) as Arc<dyn crate::job::InputSplit>],
        );
        mappers.insert(
            node_b.to_owned(),
            vec![Arc::new(NumberedSplit(2)) as Arc<dyn crate::job::InputSplit>],
        );
        let mut reducers = HashMap::new();
        reducers.insert(node_a.to_owned(), vec![0]);
        Arc::new(StaticPlan::new(mappers, reducers))
    }

    #[tokio::test]
    async fn happy_path_two_mappers_one_reducer() {
        let plan = two_mapper_one_reducer_plan("leader", "leader");
        let test = TrackerTest::new("leader", plan).await;
        let job_id = test.submit("job-1", "J1").await.unwrap();

        test.await_status(&job_id, Duration::from_secs(1), |m| m.phase == Phase::Setup)
            .await
            .expect("job reaches SETUP");

        test.complete(
            TaskInfo::singleton(job_id.clone(), TaskType::Setup),
            TaskStatus::completed(),
        )
        .await
        .unwrap();

        test.await_status(&job_id, Duration::from_secs(1), |m| m.phase == Phase::Map)
            .await
            .expect("job reaches MAP");
        poll_until(Duration::from_secs(1), || {
            test.task_executor
                .dispatched
                .lock()
                .iter()
                .filter(|t| t.task_type == TaskType::Map)
                .count()
                == 2
        })
        .await;

        test.complete(
            TaskInfo::map(job_id.clone(), 1, 1),
            TaskStatus::completed(),
        )
        .await
        .unwrap();
        test.complete(
            TaskInfo::map(job_id.clone(), 2, 2),
            TaskStatus::completed(),
        )
        .await
        .unwrap();

        test.await_status(&job_id, Duration::from_secs(1), |m| m.phase == Phase::Reduce)
            .await
            .expect("job reaches REDUCE");

        test.complete(TaskInfo::reduce(job_id.clone(), 0), TaskStatus::completed())
            .await
            .unwrap();

        test.await_status(&job_id, Duration::from_secs(1), |m| {
            m.phase == Phase::Reduce && m.pending_reducers.is_empty()
        })
        .await
        .expect("all reducers drained");

        test.complete(
            TaskInfo::singleton(job_id.clone(), TaskType::Commit),
            TaskStatus::completed(),
        )
        .await
        .unwrap();

        let result = test.finish(&job_id).await.unwrap();
        assert!(result.fail_cause.is_none());

        let meta = test.tracker.status(&job_id).await.unwrap().unwrap();
        assert_eq!(meta.phase, Phase::Complete);
        assert!(meta.pending_splits.is_empty());
        assert!(meta.pending_reducers.is_empty());

        assert_metric_recorded(&test.metrics, &job_id, MetricEventKind::Completed);
    }

    #[tokio::test]
    async fn mapper_crash_drains_to_cancelled() {
        let mut mappers = HashMap::new();
        mappers.insert(
            "leader".to_owned(),
            vec![
                Arc::new(NumberedSplit(1)) as Arc<dyn crate::job::InputSplit>,
                Arc::new(NumberedSplit(2)) as Arc<dyn crate::job::InputSplit>,
                Arc::new(NumberedSplit(3)) as Arc<dyn crate::job::InputSplit>,
            ],
        );
        let plan: Arc<dyn crate::job::Plan> = Arc::new(StaticPlan::new(mappers, HashMap::new()));
        let test = TrackerTest::new("leader", plan).await;
        let job_id = test.submit("job-2", "J2").await.unwrap();

        test.complete(
            TaskInfo::singleton(job_id.clone(), TaskType::Setup),
            TaskStatus::completed(),
        )
        .await
        .unwrap();
        test.await_status(&job_id, Duration::from_secs(1), |m| m.phase == Phase::Map)
            .await
            .unwrap();
        poll_until(Duration::from_secs(1), || {
            test.task_executor
                .dispatched
                .lock()
                .iter()
                .filter(|t| t.task_type == TaskType::Map)
                .count()
                == 3
        })
        .await;

        test.complete(
            TaskInfo::map(job_id.clone(), 1, 1),
            TaskStatus::failed("mapper 1 crashed"),
        )
        .await
        .unwrap();

        let meta = test
            .await_status(&job_id, Duration::from_secs(1), |m| m.is_cancelling())
            .await
            .expect("job enters CANCELLING");
        assert_eq!(meta.fail_cause.as_deref(), Some("mapper 1 crashed"));

        test.complete(TaskInfo::map(job_id.clone(), 2, 2), TaskStatus::completed())
            .await
            .unwrap();
        test.complete(TaskInfo::map(job_id.clone(), 3, 3), TaskStatus::completed())
            .await
            .unwrap();

        test.await_status(&job_id, Duration::from_secs(1), |m| m.pending_splits.is_empty())
            .await
            .expect("pending splits drain");

        test.complete(
            TaskInfo::singleton(job_id.clone(), TaskType::Abort),
            TaskStatus::completed(),
        )
        .await
        .unwrap();

        let result = test.finish(&job_id).await.unwrap();
        assert_eq!(result.fail_cause.as_deref(), Some("mapper 1 crashed"));
    }

    #[tokio::test]
    async fn node_left_during_map_forces_cancelling() {
        let plan = two_mapper_one_reducer_plan("leader", "gone");
        let test = TrackerTest::with_live_nodes("leader", plan, vec!["gone".to_owned()]).await;
        let job_id = test.submit("job-3", "J3").await.unwrap();

        test.complete(
            TaskInfo::singleton(job_id.clone(), TaskType::Setup),
            TaskStatus::completed(),
        )
        .await
        .unwrap();
        test.await_status(&job_id, Duration::from_secs(1), |m| m.phase == Phase::Map)
            .await
            .unwrap();
        poll_until(Duration::from_secs(1), || {
            test.task_executor
                .dispatched
                .lock()
                .iter()
                .filter(|t| t.task_type == TaskType::Map)
                .count()
                == 1
        })
        .await;

        test.discovery.leave("gone".to_owned()).await;

        let meta = test
            .await_status(&job_id, Duration::from_secs(2), |m| m.is_cancelling())
            .await
            .expect("node-left recovery forces CANCELLING");
        assert!(meta.fail_cause.is_some());

        test.complete(TaskInfo::map(job_id.clone(), 1, 1), TaskStatus::completed())
            .await
            .unwrap();
        test.await_status(&job_id, Duration::from_secs(1), |m| m.pending_splits.is_empty())
            .await
            .expect("orphaned split pruned, local split drains");

        test.complete(
            TaskInfo::singleton(job_id.clone(), TaskType::Abort),
            TaskStatus::completed(),
        )
        .await
        .unwrap();

        let result = test.finish(&job_id).await.unwrap();
        assert!(result.fail_cause.is_some());
    }

    #[tokio::test]
    async fn kill_during_reduce_cancels_job() {
        let plan = two_mapper_one_reducer_plan("leader", "leader");
        let test = TrackerTest::new("leader", plan).await;
        let job_id = test.submit("job-4", "J4").await.unwrap();

        test.complete(
            TaskInfo::singleton(job_id.clone(), TaskType::Setup),
            TaskStatus::completed(),
        )
        .await
        .unwrap();
        poll_until(Duration::from_secs(1), || {
            test.task_executor
                .dispatched
                .lock()
                .iter()
                .filter(|t| t.task_type == TaskType::Map)
                .count()
                == 2
        })
        .await;
        test.complete(TaskInfo::map(job_id.clone(), 1, 1), TaskStatus::completed())
            .await
            .unwrap();
        test.complete(TaskInfo::map(job_id.clone(), 2, 2), TaskStatus::completed())
            .await
            .unwrap();
        test.await_status(&job_id, Duration::from_secs(1), |m| m.phase == Phase::Reduce)
            .await
            .unwrap();
        poll_until(Duration::from_secs(1), || {
            test.task_executor
                .dispatched
                .lock()
                .iter()
                .filter(|t| t.task_type == TaskType::Reduce)
                .count()
                == 1
        })
        .await;

        let tracker = test.tracker.clone();
        let kill_job_id = job_id.clone();
        let kill = tokio::task::spawn(async move { tracker.kill(&kill_job_id).await });

        test.await_status(&job_id, Duration::from_secs(1), |m| m.is_cancelling())
            .await
            .expect("kill moves job to CANCELLING");

        test.complete(
            TaskInfo::singleton(job_id.clone(), TaskType::Abort),
            TaskStatus::completed(),
        )
        .await
        .unwrap();

        assert!(kill.await.unwrap().unwrap());

        let meta = test.tracker.status(&job_id).await.unwrap().unwrap();
        assert_eq!(meta.fail_cause.as_deref(), Some("Job cancelled"));
    }

    #[tokio::test]
    async fn duplicate_submit_is_rejected() {
        let plan = two_mapper_one_reducer_plan("leader", "leader");
        let test = TrackerTest::new("leader", plan).await;
        test.submit("job-5", "J5").await.unwrap();

        let err = test.submit("job-5", "J5 again").await.unwrap_err();
        assert!(matches!(err, TrackerError::DuplicateJob(_)));
    }

    #[tokio::test]
    async fn shutdown_fails_active_finish_futures() {
        let plan = two_mapper_one_reducer_plan("leader", "leader");
        let test = TrackerTest::new("leader", plan).await;
        let job_id = test.submit("job-6", "J6").await.unwrap();

        test.complete(
            TaskInfo::singleton(job_id.clone(), TaskType::Setup),
            TaskStatus::completed(),
        )
        .await
        .unwrap();
        test.await_status(&job_id, Duration::from_secs(1), |m| m.phase == Phase::Map)
            .await
            .unwrap();

        let tracker = test.tracker.clone();
        let finish_job_id = job_id.clone();
        let finish = tokio::task::spawn(async move { tracker.finish_future(&finish_job_id).await });
        tokio::task::yield_now().await;

        test.tracker.stop().await;

        let result = finish.await.unwrap().unwrap();
        assert_eq!(result.fail_cause.as_deref(), Some("tracker is stopping"));

        let submit_after_stop = test.submit("job-7", "J7").await;
        assert!(matches!(
            submit_after_stop,
            Err(TrackerError::TrackerStopping)
        ));
    }
}
