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

//! The two sources of asynchrony the tracker's `EventLoop` serializes:
//! replicated metadata snapshots, and cluster membership changes.

use crate::job::NodeId;
use crate::metadata::JobMetadata;

#[derive(Debug, Clone)]
pub enum TrackerEvent {
    /// A new snapshot of a job's metadata has landed in the store,
    /// whether from this node's own transform or another node's.
    MetadataUpdated(JobMetadata),
    /// `node_id` has left or been declared failed by discovery.
    NodeDeparted(NodeId),
    /// Periodic tick driving node-left recovery even when discovery
    /// delivers no new departures, at `TrackerConfig::node_left_recheck_interval`.
    RecheckNodeLeft,
}
