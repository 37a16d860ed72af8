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

//! Local per-node map from `JobId` to a lazily-materialized `Job`,
//! ensuring at-most-one construction per `JobId` even under concurrent
//! callers.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::OnceCell;

use crate::error::Result;
use crate::job::{Job, JobFactory, JobId, JobInfo};

/// First caller for a given `JobId` drives construction via `factory`;
/// concurrent and subsequent callers await the same `OnceCell`. If
/// construction fails, the entry is removed so a later call may retry.
pub struct JobRegistry {
    factory: Arc<dyn JobFactory>,
    entries: DashMap<JobId, Arc<OnceCell<Arc<dyn Job>>>>,
}

impl JobRegistry {
    pub fn new(factory: Arc<dyn JobFactory>) -> Self {
        Self {
            factory,
            entries: DashMap::new(),
        }
    }

    pub async fn get_or_create(
        &self,
        job_id: JobId,
        job_info: Arc<dyn JobInfo>,
    ) -> Result<Arc<dyn Job>> {
        let cell = self
            .entries
            .entry(job_id.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        let factory = self.factory.clone();
        let result = cell
            .get_or_try_init(|| {
                let job_id = job_id.clone();
                async move { factory.create(job_id, job_info).await }
            })
            .await
            .map(|job| job.clone());

        if result.is_err() {
            // Allow a later caller to retry construction from scratch.
            self.entries.remove(&job_id);
        }

        result
    }

    pub fn get(&self, job_id: &JobId) -> Option<Arc<dyn Job>> {
        self.entries.get(job_id)?.get().cloned()
    }

    /// Remove and dispose the job, if present. Called once a job reaches
    /// `COMPLETE` on the leader or when the tracker stops.
    pub async fn remove_and_dispose(&self, job_id: &JobId, interrupt: bool) {
        if let Some((_, cell)) = self.entries.remove(job_id) {
            if let Some(job) = cell.get() {
                job.dispose(interrupt).await;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use async_trait::async_trait;
    use std::fmt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct TestJobInfo;
    impl JobInfo for TestJobInfo {
        fn name(&self) -> &str {
            "test"
        }
    }

    struct TestJob {
        id: JobId,
        disposed: AtomicUsize,
    }

    #[async_trait]
    impl Job for TestJob {
        fn id(&self) -> &JobId {
            &self.id
        }

        async fn initialize(&self, _local_node_id: &crate::job::NodeId) -> Result<()> {
            Ok(())
        }

        async fn dispose(&self, _interrupt: bool) {
            self.disposed.fetch_add(1, Ordering::SeqCst);
        }

        async fn cleanup_staging_directory(&self) {}
    }

    impl fmt::Debug for TestJob {
        fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
            write!(f, "TestJob({})", self.id)
        }
    }

    struct CountingFactory {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl JobFactory for CountingFactory {
        async fn create(
            &self,
            job_id: JobId,
            _job_info: Arc<dyn JobInfo>,
        ) -> Result<Arc<dyn Job>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(crate::error::TrackerError::Internal(
                    "forced failure".to_owned(),
                ));
            }
            Ok(Arc::new(TestJob {
                id: job_id,
                disposed: AtomicUsize::new(0),
            }))
        }
    }

    #[tokio::test]
    async fn materializes_at_most_once() {
        let factory = Arc::new(CountingFactory {
            calls: AtomicUsize::new(0),
            fail: false,
        });
        let registry = JobRegistry::new(factory.clone());
        let job_id = JobId::new("job-1");

        let a = registry
            .get_or_create(job_id.clone(), Arc::new(TestJobInfo))
            .await
            .unwrap();
        let b = registry
            .get_or_create(job_id.clone(), Arc::new(TestJobInfo))
            .await
            .unwrap();

        assert_eq!(factory.calls.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn construction_failure_allows_retry() {
        let factory = Arc::new(CountingFactory {
            calls: AtomicUsize::new(0),
            fail: true,
        });
        let registry = JobRegistry::new(factory.clone());
        let job_id = JobId::new("job-1");

        let first = registry
            .get_or_create(job_id.clone(), Arc::new(TestJobInfo))
            .await;
        assert!(first.is_err());
        assert!(registry.is_empty());

        let second = registry
            .get_or_create(job_id.clone(), Arc::new(TestJobInfo))
            .await;
        assert!(second.is_err());
        assert_eq!(factory.calls.load(Ordering::SeqCst), 2);
    }
}
