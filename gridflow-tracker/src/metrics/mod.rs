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

#[cfg(feature = "prometheus-metrics")]
pub mod prometheus;

use parking_lot::Mutex;

use crate::job::JobId;

/// Records lifecycle events and queue depth for every job a tracker
/// handles. An in-memory `TestMetricsCollector` backs tests and is the
/// default when the `prometheus-metrics` feature is disabled; a
/// `PrometheusMetricsCollector` backs production deployments.
pub trait TrackerMetricsCollector: Send + Sync {
    fn record_submitted(&self, job_id: &JobId, queued_at: u64, submitted_at: u64);

    fn record_completed(&self, job_id: &JobId, queued_at: u64, completed_at: u64);

    fn record_failed(&self, job_id: &JobId, queued_at: u64, failed_at: u64);

    fn record_cancelled(&self, job_id: &JobId);

    fn set_pending_tasks_queue_size(&self, value: i64);

    /// Scrapeable rendering of the current metric values, if this
    /// collector supports it. Returns `(body, content_type)`.
    fn gather_metrics(&self) -> Option<(Vec<u8>, String)> {
        None
    }
}

#[derive(Debug, Clone)]
pub struct MetricEvent {
    pub job_id: JobId,
    pub kind: MetricEventKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MetricEventKind {
    #[default]
    Submitted,
    Completed,
    Failed,
    Cancelled,
}

/// Records every event verbatim, in order, for assertions in tests. Not
/// suitable for production: the event log grows without bound.
#[derive(Default)]
pub struct TestMetricsCollector {
    events: Mutex<Vec<MetricEvent>>,
    pending_queue_size: Mutex<i64>,
}

impl TestMetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<MetricEvent> {
        self.events.lock().clone()
    }

    pub fn pending_queue_size(&self) -> i64 {
        *self.pending_queue_size.lock()
    }

    fn push(&self, job_id: &JobId, kind: MetricEventKind) {
        self.events.lock().push(MetricEvent {
            job_id: job_id.clone(),
            kind,
        });
    }
}

impl TrackerMetricsCollector for TestMetricsCollector {
    fn record_submitted(&self, job_id: &JobId, _queued_at: u64, _submitted_at: u64) {
        self.push(job_id, MetricEventKind::Submitted);
    }

    fn record_completed(&self, job_id: &JobId, _queued_at: u64, _completed_at: u64) {
        self.push(job_id, MetricEventKind::Completed);
    }

    fn record_failed(&self, job_id: &JobId, _queued_at: u64, _failed_at: u64) {
        self.push(job_id, MetricEventKind::Failed);
    }

    fn record_cancelled(&self, job_id: &JobId) {
        self.push(job_id, MetricEventKind::Cancelled);
    }

    fn set_pending_tasks_queue_size(&self, value: i64) {
        *self.pending_queue_size.lock() = value;
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn records_events_in_order() {
        let collector = TestMetricsCollector::new();
        let job_id = JobId::new("job-1");
        collector.record_submitted(&job_id, 0, 1);
        collector.record_completed(&job_id, 0, 5);

        let events = collector.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, MetricEventKind::Submitted);
        assert_eq!(events[1].kind, MetricEventKind::Completed);
    }
}
