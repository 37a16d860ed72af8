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

//! The replicated key/value store abstraction the tracker drives every
//! job record through, plus an in-memory reference implementation.
//!
//! `InMemoryMetadataStore` is single-node only: it does not replicate
//! anything across a network. It exists so the tracker and its tests can
//! run without a real cache deployment; a production deployment would
//! swap in a backend that actually replicates `put_if_absent`/`transform`
//! across participants.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::error::Result;
use crate::job::JobId;
use crate::metadata::JobMetadata;

/// A replicated key/value store keyed by `JobId`, holding `JobMetadata`.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn get(&self, job_id: &JobId) -> Option<JobMetadata>;

    /// Insert `meta` iff no record exists yet for `job_id`. Returns `true`
    /// if the insert happened.
    async fn put_if_absent(&self, job_id: JobId, meta: JobMetadata) -> bool;

    /// Atomically apply `f` to the current value (or `None` if absent,
    /// which `f` must handle by returning `None`). No-op if the record
    /// does not exist and `f(None)` returns `None`.
    async fn transform(
        &self,
        job_id: &JobId,
        f: Box<dyn FnOnce(Option<JobMetadata>) -> Option<JobMetadata> + Send>,
    ) -> Result<()>;

    async fn remove(&self, job_id: &JobId);

    /// All current records, used by node-left recovery to scan for
    /// orphaned work.
    async fn all(&self) -> Vec<JobMetadata>;

    /// Subscribe to every future update (insert or transform) across the
    /// whole keyspace. Each subscriber receives its own independent
    /// stream; slow subscribers may miss updates once the broadcast
    /// channel's buffer fills, matching a best-effort continuous query.
    fn subscribe(&self) -> broadcast::Receiver<JobMetadata>;
}

/// A non-durable, single-process `MetadataStore` backed by a concurrent
/// map. Every `JobTracker` in a test or single-node deployment shares one
/// of these; there is no cross-process replication.
pub struct InMemoryMetadataStore {
    entries: DashMap<JobId, JobMetadata>,
    updates: broadcast::Sender<JobMetadata>,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        let (updates, _) = broadcast::channel(1024);
        Self {
            entries: DashMap::new(),
            updates,
        }
    }
}

impl Default for InMemoryMetadataStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn get(&self, job_id: &JobId) -> Option<JobMetadata> {
        self.entries.get(job_id).map(|e| e.clone())
    }

    async fn put_if_absent(&self, job_id: JobId, meta: JobMetadata) -> bool {
        match self.entries.entry(job_id) {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(v) => {
                let inserted = meta.clone();
                v.insert(meta);
                let _ = self.updates.send(inserted);
                true
            }
        }
    }

    async fn transform(
        &self,
        job_id: &JobId,
        f: Box<dyn FnOnce(Option<JobMetadata>) -> Option<JobMetadata> + Send>,
    ) -> Result<()> {
        let current = self.entries.get(job_id).map(|e| e.clone());
        let updated = f(current);
        match updated {
            Some(meta) => {
                self.entries.insert(job_id.clone(), meta.clone());
                let _ = self.updates.send(meta);
            }
            None => {
                self.entries.remove(job_id);
            }
        }
        Ok(())
    }

    async fn remove(&self, job_id: &JobId) {
        self.entries.remove(job_id);
    }

    async fn all(&self) -> Vec<JobMetadata> {
        self.entries.iter().map(|e| e.value().clone()).collect()
    }

    fn subscribe(&self) -> broadcast::Receiver<JobMetadata> {
        self.updates.subscribe()
    }
}

/// Convenience used by callers that already hold a stack of `Transform`s:
/// applies `apply_stack` under the store's atomic `transform`.
pub async fn transform_with_stack(
    store: &Arc<dyn MetadataStore>,
    job_id: &JobId,
    stack: Vec<crate::transform::Transform>,
) -> Result<()> {
    store
        .transform(
            job_id,
            Box::new(move |current| current.map(|meta| crate::transform::apply_stack(&stack, meta))),
        )
        .await
}
