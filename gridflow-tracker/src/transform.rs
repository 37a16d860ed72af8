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

//! Deterministic mutations of a [`JobMetadata`] record, expressed as a
//! small tagged enum rather than boxed closures so that a `Transform` can
//! be logged, matched on and unit-tested without capturing environment
//! state. A `Vec<Transform>` models "stacking": each element is folded
//! over the previous result before the leaf write lands in the store.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use gridflow_core::time::timestamp_secs;

use crate::job::{NodeId, ProcessDescriptor, SplitId};
use crate::metadata::{Counters, JobMetadata, Phase};

#[derive(Debug, Clone)]
pub enum Transform {
    UpdatePhase(Phase),
    RemoveMappers {
        splits: HashSet<SplitId>,
        err: Option<String>,
    },
    RemoveReducer {
        reducer: usize,
        err: Option<String>,
    },
    InitializeReducers {
        reducers: Vec<usize>,
        desc: ProcessDescriptor,
    },
    CancelJob {
        err: Option<String>,
        splits: HashSet<SplitId>,
        reducers: HashSet<usize>,
    },
    IncrementCounters(Counters),
    /// Stamp `ttl` on the record so it self-evicts after the configured
    /// TTL has elapsed once it reaches `COMPLETE`.
    SetTtl(u64),
}

impl Transform {
    pub fn update_phase(phase: Phase) -> Self {
        Transform::UpdatePhase(phase)
    }

    pub fn remove_mappers(splits: HashSet<SplitId>, err: Option<String>) -> Self {
        Transform::RemoveMappers { splits, err }
    }

    pub fn remove_reducer(reducer: usize, err: Option<String>) -> Self {
        Transform::RemoveReducer { reducer, err }
    }

    pub fn initialize_reducers(reducers: Vec<usize>, desc: ProcessDescriptor) -> Self {
        Transform::InitializeReducers { reducers, desc }
    }

    /// Precondition (caller-side assertion, per the design note): either
    /// `meta.phase` is already `Cancelling` or `err` is `Some`.
    pub fn cancel_job(
        err: Option<String>,
        splits: HashSet<SplitId>,
        reducers: HashSet<usize>,
    ) -> Self {
        Transform::CancelJob {
            err,
            splits,
            reducers,
        }
    }

    pub fn increment_counters(counters: Counters) -> Self {
        Transform::IncrementCounters(counters)
    }

    /// Apply this transform to `meta`, returning the updated record.
    pub fn apply(&self, mut meta: JobMetadata) -> JobMetadata {
        match self {
            Transform::UpdatePhase(phase) => {
                meta.phase = *phase;
                if *phase == Phase::Map {
                    meta.setup_complete_ts.get_or_insert_with(timestamp_secs);
                } else if *phase == Phase::Complete {
                    meta.complete_ts.get_or_insert_with(timestamp_secs);
                }
                meta
            }
            Transform::RemoveMappers { splits, err } => {
                for split in splits {
                    meta.pending_splits.remove(split);
                }
                if let Some(err) = err {
                    if !meta.is_cancelling() {
                        meta.fail_cause = Some(err.clone());
                        meta.phase = Phase::Cancelling;
                    }
                } else if meta.pending_splits.is_empty() && !meta.is_cancelling() {
                    meta.phase = Phase::Reduce;
                    meta.map_complete_ts.get_or_insert_with(timestamp_secs);
                }
                meta
            }
            Transform::RemoveReducer { reducer, err } => {
                meta.pending_reducers.remove(reducer);
                if let Some(err) = err {
                    if !meta.is_cancelling() {
                        meta.fail_cause = Some(err.clone());
                        meta.phase = Phase::Cancelling;
                    }
                }
                meta
            }
            Transform::InitializeReducers { reducers, desc } => {
                for reducer in reducers {
                    meta.reducer_addresses.insert(*reducer, desc.clone());
                }
                meta
            }
            Transform::CancelJob {
                err,
                splits,
                reducers,
            } => {
                for split in splits {
                    meta.pending_splits.remove(split);
                }
                for reducer in reducers {
                    meta.pending_reducers.remove(reducer);
                }
                meta.phase = Phase::Cancelling;
                if let Some(err) = err {
                    meta.fail_cause = Some(err.clone());
                }
                meta
            }
            Transform::IncrementCounters(delta) => {
                meta.counters.merge(delta);
                meta
            }
            Transform::SetTtl(ttl) => {
                meta.ttl = Some(*ttl);
                meta
            }
        }
    }
}

/// Fold a stack of transforms over `meta` left-to-right: `stack[0]` is the
/// oldest intent, `stack.last()` the most recently layered one.
pub fn apply_stack(stack: &[Transform], meta: JobMetadata) -> JobMetadata {
    stack.iter().fold(meta, |acc, t| t.apply(acc))
}

/// Node-left recovery helper: everything in `plan`'s mapper/reducer
/// assignment that lives on a node no longer present in `live_nodes`.
pub fn orphaned_work(
    plan: &dyn crate::job::Plan,
    live_nodes: &HashSet<NodeId>,
) -> (HashSet<SplitId>, HashSet<usize>) {
    let dead_mapper_nodes: HashSet<NodeId> = plan
        .mapper_node_ids()
        .difference(live_nodes)
        .cloned()
        .collect();
    let dead_reducer_nodes: HashSet<NodeId> = plan
        .reducer_node_ids()
        .difference(live_nodes)
        .cloned()
        .collect();

    let splits = plan
        .splits_for_nodes(&dead_mapper_nodes)
        .iter()
        .map(|s| s.split_id())
        .collect();
    let reducers = plan.reducers_for_nodes(&dead_reducer_nodes);

    (splits, reducers)
}
