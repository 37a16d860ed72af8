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

use std::sync::Arc;

use crate::error::{Result, TrackerError};
use once_cell::sync::OnceCell;
use prometheus::{
    register_counter_with_registry, register_gauge_with_registry,
    register_histogram_with_registry, Counter, Gauge, Histogram, Registry,
};
use prometheus::{Encoder, TextEncoder};
use warp::Reply;

use crate::job::JobId;
use crate::metrics::TrackerMetricsCollector;

static COLLECTOR: OnceCell<Arc<dyn TrackerMetricsCollector>> = OnceCell::new();

pub struct PrometheusMetricsCollector {
    completion_time: Histogram,
    queueing_time_ms: Histogram,
    failed: Counter,
    cancelled: Counter,
    completed: Counter,
    submitted: Counter,
    pending_queue_size: Gauge,
}

impl PrometheusMetricsCollector {
    pub fn new(registry: &Registry) -> Result<Self> {
        let completion_time = register_histogram_with_registry!(
            "job_completion_time_seconds",
            "Histogram of job completion time in seconds",
            vec![0.5_f64, 1_f64, 5_f64, 30_f64, 60_f64],
            registry
        )
        .map_err(|e| TrackerError::Internal(format!("Error registering metric: {:?}", e)))?;

        let queueing_time_ms = register_histogram_with_registry!(
            "job_queueing_time_ms",
            "Histogram of time spent queued before submission, in milliseconds",
            vec![1.0_f64, 5.0_f64, 25.0_f64, 100.0_f64, 500.0_f64],
            registry
        )
        .map_err(|e| TrackerError::Internal(format!("Error registering metric: {:?}", e)))?;

        let failed = register_counter_with_registry!(
            "job_failed_total",
            "Counter of failed jobs",
            registry
        )
        .map_err(|e| TrackerError::Internal(format!("Error registering metric: {:?}", e)))?;

        let cancelled = register_counter_with_registry!(
            "job_cancelled_total",
            "Counter of cancelled jobs",
            registry
        )
        .map_err(|e| TrackerError::Internal(format!("Error registering metric: {:?}", e)))?;

        let completed = register_counter_with_registry!(
            "job_completed_total",
            "Counter of completed jobs",
            registry
        )
        .map_err(|e| TrackerError::Internal(format!("Error registering metric: {:?}", e)))?;

        let submitted = register_counter_with_registry!(
            "job_submitted_total",
            "Counter of submitted jobs",
            registry
        )
        .map_err(|e| TrackerError::Internal(format!("Error registering metric: {:?}", e)))?;

        let pending_queue_size = register_gauge_with_registry!(
            "job_pending_queue_size",
            "Number of pending tasks across all tracked jobs",
            registry
        )
        .map_err(|e| TrackerError::Internal(format!("Error registering metric: {:?}", e)))?;

        Ok(Self {
            completion_time,
            queueing_time_ms,
            failed,
            cancelled,
            completed,
            submitted,
            pending_queue_size,
        })
    }

    pub fn current() -> Result<Arc<dyn TrackerMetricsCollector>> {
        COLLECTOR
            .get_or_try_init(|| {
                let collector = Self::new(::prometheus::default_registry())?;
                Ok(Arc::new(collector) as Arc<dyn TrackerMetricsCollector>)
            })
            .map(|arc| arc.clone())
    }
}

impl TrackerMetricsCollector for PrometheusMetricsCollector {
    fn record_submitted(&self, _job_id: &JobId, queued_at: u64, submitted_at: u64) {
        self.submitted.inc();
        self.queueing_time_ms
            .observe(submitted_at.saturating_sub(queued_at) as f64);
    }

    fn record_completed(&self, _job_id: &JobId, queued_at: u64, completed_at: u64) {
        self.completed.inc();
        self.completion_time
            .observe(completed_at.saturating_sub(queued_at) as f64);
    }

    fn record_failed(&self, _job_id: &JobId, _queued_at: u64, _failed_at: u64) {
        self.failed.inc();
    }

    fn record_cancelled(&self, _job_id: &JobId) {
        self.cancelled.inc();
    }

    fn set_pending_tasks_queue_size(&self, value: i64) {
        self.pending_queue_size.set(value as f64);
    }

    fn gather_metrics(&self) -> Option<(Vec<u8>, String)> {
        get_metrics_bytes().ok()
    }
}

fn get_metrics_bytes() -> Result<(Vec<u8>, String)> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = vec![];
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TrackerError::Internal(format!("Error encoding prometheus metrics: {:?}", e)))?;
    Ok((buffer, encoder.format_type().to_owned()))
}

/// A `warp` handler suitable for mounting at a metrics-scrape endpoint.
pub fn get_metrics() -> Result<impl Reply> {
    let (buffer, content_type) = get_metrics_bytes()?;
    Ok(warp::reply::with_header(
        buffer,
        hyper::header::CONTENT_TYPE,
        content_type,
    ))
}
