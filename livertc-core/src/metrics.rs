//! Prometheus metrics for the SFU.
//!
//! Exposed per room: RTP ingress bytes/packets (counters) and the current
//! subscriber count (gauge), plus a process-wide room-count gauge. The
//! collector is an injected collaborator rather than a set of globals so
//! the SFU core can be exercised in tests against a private registry.

use prometheus::{
    register_int_counter_vec_with_registry, register_int_gauge_vec_with_registry,
    register_int_gauge_with_registry, Encoder, IntCounterVec, IntGauge, IntGaugeVec, Registry,
    TextEncoder,
};

pub struct SfuMetrics {
    registry: Registry,
    rtp_bytes: IntCounterVec,
    rtp_packets: IntCounterVec,
    subscribers: IntGaugeVec,
    rooms: IntGauge,
}

impl SfuMetrics {
    pub fn new() -> Self {
        Self::with_registry(Registry::new())
    }

    pub fn with_registry(registry: Registry) -> Self {
        let rtp_bytes = register_int_counter_vec_with_registry!(
            "webrtc_rtp_bytes_total",
            "Total RTP bytes received by room",
            &["room"],
            registry.clone()
        )
        .expect("register webrtc_rtp_bytes_total");

        let rtp_packets = register_int_counter_vec_with_registry!(
            "webrtc_rtp_packets_total",
            "Total RTP packets received by room",
            &["room"],
            registry.clone()
        )
        .expect("register webrtc_rtp_packets_total");

        let subscribers = register_int_gauge_vec_with_registry!(
            "webrtc_subscribers",
            "Current subscribers per room",
            &["room"],
            registry.clone()
        )
        .expect("register webrtc_subscribers");

        let rooms = register_int_gauge_with_registry!(
            "webrtc_rooms",
            "Current rooms managed",
            registry.clone()
        )
        .expect("register webrtc_rooms");

        Self {
            registry,
            rtp_bytes,
            rtp_packets,
            subscribers,
            rooms,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn add_rtp_bytes(&self, room: &str, n: usize) {
        self.rtp_bytes.with_label_values(&[room]).inc_by(n as u64);
    }

    pub fn inc_rtp_packets(&self, room: &str) {
        self.rtp_packets.with_label_values(&[room]).inc();
    }

    pub fn inc_subscribers(&self, room: &str) {
        self.subscribers.with_label_values(&[room]).inc();
    }

    pub fn dec_subscribers(&self, room: &str) {
        self.subscribers.with_label_values(&[room]).dec();
    }

    pub fn set_subscribers(&self, room: &str, n: usize) {
        self.subscribers.with_label_values(&[room]).set(n as i64);
    }

    pub fn set_rooms(&self, n: usize) {
        self.rooms.set(n as i64);
    }

    /// Encode the registry in Prometheus text exposition format.
    pub fn gather(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|_| prometheus::Error::Msg("Invalid UTF-8".to_string()))
    }
}

impl Default for SfuMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = SfuMetrics::new();
        metrics.add_rtp_bytes("demo", 1200);
        metrics.add_rtp_bytes("demo", 300);
        metrics.inc_rtp_packets("demo");
        metrics.inc_rtp_packets("demo");

        let output = metrics.gather().unwrap();
        assert!(output.contains("webrtc_rtp_bytes_total{room=\"demo\"} 1500"));
        assert!(output.contains("webrtc_rtp_packets_total{room=\"demo\"} 2"));
    }

    #[test]
    fn test_subscriber_gauge() {
        let metrics = SfuMetrics::new();
        metrics.inc_subscribers("demo");
        metrics.inc_subscribers("demo");
        metrics.dec_subscribers("demo");

        let output = metrics.gather().unwrap();
        assert!(output.contains("webrtc_subscribers{room=\"demo\"} 1"));

        metrics.set_subscribers("demo", 0);
        let output = metrics.gather().unwrap();
        assert!(output.contains("webrtc_subscribers{room=\"demo\"} 0"));
    }

    #[test]
    fn test_rooms_gauge() {
        let metrics = SfuMetrics::new();
        metrics.set_rooms(3);
        let output = metrics.gather().unwrap();
        assert!(output.contains("webrtc_rooms 3"));
    }
}
