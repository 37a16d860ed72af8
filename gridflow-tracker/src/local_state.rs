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

//! Per-job, per-node scheduler bookkeeping. Not replicated: every field
//! here reflects only what *this* node has locally dispatched, and is
//! touched exclusively from the tracker's single-threaded event loop with
//! the exception of `completed_mappers`, which is also incremented from
//! task-completion callbacks that arrive off that loop.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use dashmap::DashSet;

use crate::job::SplitId;

/// Created on first local scheduling decision for a job; removed once the
/// phase-COMPLETE notification for that job has been processed.
pub struct LocalJobState {
    scheduled_mappers: DashSet<SplitId>,
    scheduled_reducers: DashSet<usize>,
    completed_mappers: AtomicUsize,
    cancelled: AtomicBool,
    aborted: AtomicBool,
}

impl LocalJobState {
    pub fn new() -> Self {
        Self {
            scheduled_mappers: DashSet::new(),
            scheduled_reducers: DashSet::new(),
            completed_mappers: AtomicUsize::new(0),
            cancelled: AtomicBool::new(false),
            aborted: AtomicBool::new(false),
        }
    }

    /// Returns `true` iff `split` had not already been scheduled locally,
    /// in which case it is now marked scheduled.
    pub fn try_schedule_mapper(&self, split: SplitId) -> bool {
        self.scheduled_mappers.insert(split)
    }

    /// Returns `true` iff `reducer` had not already been scheduled
    /// locally, in which case it is now marked scheduled.
    pub fn try_schedule_reducer(&self, reducer: usize) -> bool {
        self.scheduled_reducers.insert(reducer)
    }

    pub fn scheduled_mapper_count(&self) -> usize {
        self.scheduled_mappers.len()
    }

    pub fn is_mapper_scheduled(&self, split: SplitId) -> bool {
        self.scheduled_mappers.contains(&split)
    }

    pub fn is_reducer_scheduled(&self, reducer: usize) -> bool {
        self.scheduled_reducers.contains(&reducer)
    }

    pub fn scheduled_mappers(&self) -> Vec<SplitId> {
        self.scheduled_mappers.iter().map(|s| *s).collect()
    }

    /// Atomically increments the completed-mapper count and returns
    /// whether this was the last scheduled mapper to report in.
    pub fn on_map_finished(&self) -> bool {
        let completed = self.completed_mappers.fetch_add(1, Ordering::SeqCst) + 1;
        completed == self.scheduled_mappers.len()
    }

    /// One-shot latch: returns `true` exactly once, on the first call.
    pub fn on_cancel(&self) -> bool {
        self.cancelled
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// One-shot latch: returns `true` exactly once, on the first call.
    pub fn on_aborted(&self) -> bool {
        self.aborted
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

impl Default for LocalJobState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn scheduling_a_mapper_twice_is_idempotent() {
        let state = LocalJobState::new();
        assert!(state.try_schedule_mapper(1));
        assert!(!state.try_schedule_mapper(1));
        assert_eq!(state.scheduled_mapper_count(), 1);
    }

    #[test]
    fn on_map_finished_detects_last_mapper() {
        let state = LocalJobState::new();
        state.try_schedule_mapper(1);
        state.try_schedule_mapper(2);
        assert!(!state.on_map_finished());
        assert!(state.on_map_finished());
    }

    #[test]
    fn cancel_and_abort_latches_fire_once() {
        let state = LocalJobState::new();
        assert!(state.on_cancel());
        assert!(!state.on_cancel());
        assert!(state.on_aborted());
        assert!(!state.on_aborted());
    }
}
