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

//! Programmatic configuration of a `JobTracker`. No CLI flag parsing or
//! file-based config loading lives here -- callers construct a
//! `TrackerConfig` directly, the way an embedder would construct
//! `SchedulerConfig` before handing it to `SchedulerServer::new`.

use std::time::Duration;

/// Policy used when the tracker needs to pick among live nodes for
/// informational or metrics purposes. The authoritative split/reducer
/// assignment always comes from the `Plan`; this never overrides it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotsPolicy {
    /// Prefer the same small set of nodes until they're saturated.
    Bias,
    /// Spread evenly across all live nodes.
    RoundRobin,
}

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    event_loop_buffer_size: u32,
    finished_job_info_ttl: Duration,
    node_left_recheck_interval: Duration,
    slots_policy: SlotsPolicy,
}

impl TrackerConfig {
    pub fn event_loop_buffer_size(&self) -> u32 {
        self.event_loop_buffer_size
    }

    pub fn with_event_loop_buffer_size(mut self, value: u32) -> Self {
        self.event_loop_buffer_size = value;
        self
    }

    pub fn finished_job_info_ttl(&self) -> Duration {
        self.finished_job_info_ttl
    }

    pub fn with_finished_job_info_ttl(mut self, value: Duration) -> Self {
        self.finished_job_info_ttl = value;
        self
    }

    pub fn node_left_recheck_interval(&self) -> Duration {
        self.node_left_recheck_interval
    }

    pub fn with_node_left_recheck_interval(mut self, value: Duration) -> Self {
        self.node_left_recheck_interval = value;
        self
    }

    pub fn slots_policy(&self) -> SlotsPolicy {
        self.slots_policy
    }

    pub fn with_slots_policy(mut self, value: SlotsPolicy) -> Self {
        self.slots_policy = value;
        self
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            event_loop_buffer_size: 1000,
            finished_job_info_ttl: Duration::from_secs(60 * 60),
            node_left_recheck_interval: Duration::from_secs(10),
            slots_policy: SlotsPolicy::Bias,
        }
    }
}
