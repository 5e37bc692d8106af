//! Network profile's `engine_specific` typed record (§4.5).

use serde::{Deserialize, Serialize};

/// Protocol overhead behavior (headers, multiplexing, efficiency).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolBehavior {
    pub header_overhead_bytes: u64,
    pub multiplexing_efficiency: f64,
    pub protocol_efficiency: f64,
}

impl Default for ProtocolBehavior {
    fn default() -> Self {
        Self { header_overhead_bytes: 54, multiplexing_efficiency: 0.9, protocol_efficiency: 0.92 }
    }
}

/// Congestion and packet-loss/jitter behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CongestionBehavior {
    pub congestion_threshold: f64,
    pub packet_loss_ratio: f64,
    pub jitter_ms: f64,
    pub retransmit_penalty: f64,
}

impl Default for CongestionBehavior {
    fn default() -> Self {
        Self { congestion_threshold: 0.8, packet_loss_ratio: 0.001, jitter_ms: 0.5, retransmit_penalty: 2.0 }
    }
}

/// QoS class weighting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QosBehavior {
    pub classes: std::collections::HashMap<String, f64>,
}

impl Default for QosBehavior {
    fn default() -> Self {
        let mut classes = std::collections::HashMap::new();
        classes.insert("best_effort".to_string(), 1.0);
        classes.insert("priority".to_string(), 0.6);
        Self { classes }
    }
}

/// Geographic latency and node/edge topology (single-node scope, §1).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TopologyBehavior {
    pub geo_latency_ms: f64,
    pub nodes: Vec<String>,
    pub edges: Vec<(String, String)>,
}

impl Default for TopologyBehavior {
    fn default() -> Self {
        Self { geo_latency_ms: 0.0, nodes: Vec::new(), edges: Vec::new() }
    }
}

/// The network engine's full `engine_specific` typed record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSpecific {
    pub protocol_behavior: ProtocolBehavior,
    pub congestion_behavior: CongestionBehavior,
    pub qos_behavior: QosBehavior,
    pub topology_behavior: TopologyBehavior,
}

impl Default for NetworkSpecific {
    fn default() -> Self {
        Self {
            protocol_behavior: ProtocolBehavior::default(),
            congestion_behavior: CongestionBehavior::default(),
            qos_behavior: QosBehavior::default(),
            topology_behavior: TopologyBehavior::default(),
        }
    }
}
