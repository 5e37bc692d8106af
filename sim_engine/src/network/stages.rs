//! The network pipeline's domain stages (§4.5): bandwidth limits, protocol
//! overhead, congestion, packet loss, jitter, QoS, geographic latency and
//! topology.

use crate::base::op_hash_fraction;
use sim_common::operation::Operation;
use sim_common::profile::network::{CongestionBehavior, ProtocolBehavior, QosBehavior, TopologyBehavior};

/// S1: the link's advertised base latency, clamped to the documented range.
pub fn bandwidth_limits(base_latency_ms: f64) -> f64 {
    base_latency_ms.clamp(0.001, 1000.0)
}

/// Protocol framing and multiplexing overhead.
pub fn protocol_overhead(latency_ms: f64, op: &Operation, protocol: &ProtocolBehavior) -> f64 {
    let mut t = latency_ms / protocol.protocol_efficiency.max(0.01);
    if op.metadata_flag("multiplexed") {
        t *= protocol.multiplexing_efficiency;
    }
    t
}

/// Above the congestion threshold, utilization itself inflates latency
/// (independent of whether a packet is actually lost).
pub fn congestion(latency_ms: f64, utilization: f64, congestion: &CongestionBehavior) -> f64 {
    if utilization <= congestion.congestion_threshold {
        return latency_ms;
    }
    let overshoot = (utilization - congestion.congestion_threshold) / (1.0 - congestion.congestion_threshold).max(0.01);
    latency_ms * (1.0 + overshoot.clamp(0.0, 1.0))
}

/// A hash-determined packet loss event pays the full retransmit penalty.
pub fn packet_loss(latency_ms: f64, op: &Operation, congestion: &CongestionBehavior) -> (f64, bool) {
    let fraction = op_hash_fraction(op, 0x105505_00);
    if fraction < congestion.packet_loss_ratio {
        (latency_ms * congestion.retransmit_penalty, true)
    } else {
        (latency_ms, false)
    }
}

/// Jitter adds a bounded, hash-determined amount of extra delay.
pub fn jitter(latency_ms: f64, op: &Operation, congestion: &CongestionBehavior) -> f64 {
    let fraction = op_hash_fraction(op, 0x17772_000);
    latency_ms + congestion.jitter_ms * fraction
}

/// QoS class weighting: below 1.0 is priority treatment, above is deprioritized.
pub fn qos(latency_ms: f64, op: &Operation, qos: &QosBehavior) -> f64 {
    let class = op.metadata_str("qos_class").unwrap_or("best_effort");
    let weight = qos.classes.get(class).copied().unwrap_or(1.0);
    latency_ms * weight
}

/// Fixed geographic propagation delay (single-node scope, §1: no multi-hop routing).
pub fn geo_latency(latency_ms: f64, topology: &TopologyBehavior) -> f64 {
    latency_ms + topology.geo_latency_ms
}

/// A declared topology with a routing hint implies at least one extra hop.
pub fn topology(latency_ms: f64, op: &Operation, topology: &TopologyBehavior) -> f64 {
    if !topology.edges.is_empty() && op.next_component.is_some() {
        latency_ms * 1.05
    } else {
        latency_ms
    }
}

/// A network request occupies one lane out of the link's concurrent-lane budget.
pub fn lanes_needed(_op: &Operation) -> u32 {
    1
}

#[cfg(test)]
mod tests {
    use super::*;
    use sim_common::operation::{ComplexityClass, Language, OperationType};
    use std::collections::HashMap;

    fn op() -> Operation {
        Operation { id: "n1".into(), op_type: OperationType::NetworkRequest, complexity: ComplexityClass::O1, language: Language::Rust, data_size: 1500, next_component: None, metadata: HashMap::new() }
    }

    #[test]
    fn congestion_is_noop_below_threshold() {
        let c = CongestionBehavior::default();
        assert_eq!(congestion(1.0, 0.5, &c), 1.0);
    }

    #[test]
    fn congestion_inflates_latency_above_threshold() {
        let c = CongestionBehavior::default();
        assert!(congestion(1.0, 0.95, &c) > 1.0);
    }

    #[test]
    fn priority_class_is_cheaper_than_best_effort() {
        let mut qos_behavior = QosBehavior::default();
        qos_behavior.classes.insert("priority".to_string(), 0.5);
        let mut priority_op = op();
        priority_op.metadata.insert("qos_class".to_string(), serde_json::json!("priority"));
        let priority = qos(1.0, &priority_op, &qos_behavior);
        let best_effort = qos(1.0, &op(), &qos_behavior);
        assert!(priority < best_effort);
    }
}
