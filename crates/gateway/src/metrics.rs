use crate::error::GatewayError;
use opentelemetry::{
    KeyValue, global,
    metrics::{Counter, Histogram},
};
use std::time::Duration;

const METER_NAME: &str = "gateway";

pub struct GatewayMetrics {
    duration: Histogram<f64>,
    requests: Counter<u64>,
    detections: Counter<u64>,
}

impl GatewayMetrics {
    /// Instruments on the global meter. A no-op provider is used until
    /// telemetry export is configured.
    pub fn new() -> Self {
        let meter = global::meter(METER_NAME);
        let latency_buckets = [
            0.01, 0.025, 0.05, 0.075, 0.1, 0.15, 0.2, 0.3, 0.5, 0.75, 1.0, 2.0, 5.0,
        ];

        let duration = meter
            .f64_histogram("predict_duration_seconds")
            .with_description("Time to serve a prediction (decode + detect + draw + encode)")
            .with_unit("s")
            .with_boundaries(latency_buckets.to_vec())
            .build();
        let requests = meter
            .u64_counter("predict_requests_total")
            .with_description("Prediction requests by outcome")
            .build();
        let detections = meter
            .u64_counter("detections_total")
            .with_description("Total detections returned")
            .build();

        Self {
            duration,
            requests,
            detections,
        }
    }

    pub fn record_success(&self, elapsed: Duration, num_detections: usize) {
        let attrs = [KeyValue::new("outcome", "ok")];
        self.duration.record(elapsed.as_secs_f64(), &attrs);
        self.requests.add(1, &attrs);
        self.detections.add(num_detections as u64, &[]);
    }

    pub fn record_failure(&self, elapsed: Duration, error: &GatewayError) {
        let attrs = [KeyValue::new("outcome", error.kind())];
        self.duration.record(elapsed.as_secs_f64(), &attrs);
        self.requests.add(1, &attrs);
    }
}

impl Default for GatewayMetrics {
    fn default() -> Self {
        Self::new()
    }
}
