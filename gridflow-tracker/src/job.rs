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

//! The external collaborator contracts named in the design: `Planner`,
//! `Job`/`JobInfo`, `InputSplit` and `Plan`. None of these are implemented
//! here -- the tracker only depends on their trait surface.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A globally unique, serializable job identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// The identifier of a cluster participant. Opaque beyond equality/hashing.
pub type NodeId = String;

/// The stable numeric identity of an [`InputSplit`] within a [`Plan`].
/// `pending_splits` is keyed by this rather than by the split itself so
/// that `JobMetadata` stays cheaply `Clone`-able without requiring splits
/// to implement it.
pub type SplitId = u64;

/// An opaque, self-contained unit of mapper input. Value-equal and
/// hashable via [`InputSplit::split_id`].
pub trait InputSplit: fmt::Debug + Send + Sync + 'static {
    fn split_id(&self) -> SplitId;
}

/// Where an externally-addressable reducer can be reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessDescriptor {
    pub host: String,
    pub port: u16,
}

/// Opaque client-supplied job description; carries everything needed to
/// reconstruct a [`Job`].
pub trait JobInfo: fmt::Debug + Send + Sync + 'static {
    /// Human readable name used in logs and metrics; need not be unique.
    fn name(&self) -> &str;
}

/// The immutable assignment of splits and reducer indices to nodes,
/// produced once by the [`Planner`] at submission time.
pub trait Plan: Send + Sync + 'static {
    fn mapper_node_ids(&self) -> HashSet<NodeId>;
    fn mappers(&self, node_id: &NodeId) -> Vec<Arc<dyn InputSplit>>;
    fn reducer_node_ids(&self) -> HashSet<NodeId>;
    fn reducers(&self, node_id: &NodeId) -> Vec<usize>;
    fn reducer_count(&self) -> usize;

    /// A stable numbering of `split`, consistent across every replica that
    /// holds the same `Plan`. Used as the `task_number` a `TaskExecutor`
    /// reports progress against.
    fn task_number(&self, split: &dyn InputSplit) -> u64 {
        split.split_id()
    }

    /// All splits across every mapper node, used to seed the initial
    /// `pending_splits` set at submission time.
    fn all_splits(&self) -> Vec<Arc<dyn InputSplit>> {
        self.mapper_node_ids()
            .into_iter()
            .flat_map(|node| self.mappers(&node))
            .collect()
    }

    fn splits_for_nodes(&self, nodes: &HashSet<NodeId>) -> Vec<Arc<dyn InputSplit>> {
        nodes.iter().flat_map(|n| self.mappers(n)).collect()
    }

    fn reducers_for_nodes(&self, nodes: &HashSet<NodeId>) -> HashSet<usize> {
        nodes.iter().flat_map(|n| self.reducers(n)).collect()
    }
}

/// Produces a [`Plan`] for a job given the set of currently live nodes.
/// A synchronous failure here is a `PlanningFailure`: the job is never
/// persisted to the `MetadataStore`.
#[async_trait]
pub trait Planner: Send + Sync {
    async fn plan(
        &self,
        job: &dyn Job,
        live_nodes: &HashSet<NodeId>,
    ) -> Result<Arc<dyn Plan>>;
}

/// The runtime object materialized once per `JobId` on first need. Owned
/// by the `JobRegistry`; destroyed when the job reaches `COMPLETE` on the
/// leader or when the tracker stops.
#[async_trait]
pub trait Job: Send + Sync + 'static {
    fn id(&self) -> &JobId;

    async fn initialize(&self, local_node_id: &NodeId) -> Result<()>;

    async fn dispose(&self, interrupt: bool);

    async fn cleanup_staging_directory(&self);
}

/// Constructs a [`Job`] from a [`JobId`] and [`JobInfo`]. Used by the
/// `JobRegistry` to materialize at most one `Job` per `JobId`.
#[async_trait]
pub trait JobFactory: Send + Sync {
    async fn create(
        &self,
        job_id: JobId,
        job_info: Arc<dyn JobInfo>,
    ) -> Result<Arc<dyn Job>>;
}

/// Helper for tests and simple deployments: a `Plan` built from plain maps.
#[derive(Default)]
pub struct StaticPlan {
    mappers: HashMap<NodeId, Vec<Arc<dyn InputSplit>>>,
    reducers: HashMap<NodeId, Vec<usize>>,
    reducer_count: usize,
}

impl StaticPlan {
    pub fn new(
        mappers: HashMap<NodeId, Vec<Arc<dyn InputSplit>>>,
        reducers: HashMap<NodeId, Vec<usize>>,
    ) -> Self {
        let reducer_count = reducers.values().map(|r| r.len()).sum();
        Self {
            mappers,
            reducers,
            reducer_count,
        }
    }
}

impl Plan for StaticPlan {
    fn mapper_node_ids(&self) -> HashSet<NodeId> {
        self.mappers.keys().cloned().collect()
    }

    fn mappers(&self, node_id: &NodeId) -> Vec<Arc<dyn InputSplit>> {
        self.mappers.get(node_id).cloned().unwrap_or_default()
    }

    fn reducer_node_ids(&self) -> HashSet<NodeId> {
        self.reducers.keys().cloned().collect()
    }

    fn reducers(&self, node_id: &NodeId) -> Vec<usize> {
        self.reducers.get(node_id).cloned().unwrap_or_default()
    }

    fn reducer_count(&self) -> usize {
        self.reducer_count
    }
}

/// A simple `InputSplit` identified purely by an integer; sufficient for
/// tests and for planners that don't need richer split metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NumberedSplit(pub SplitId);

impl InputSplit for NumberedSplit {
    fn split_id(&self) -> SplitId {
        self.0
    }
}
