//! Hardware profiles (§3, §4.1, §6) — the immutable, typed description of a
//! piece of hardware consumed by one engine kind.
//!
//! Profiles are parsed in two phases, per the design notes (§9): first as a
//! loosely-typed wire document, then into per-kind typed records so the
//! engines never do magic-string lookups against raw JSON at run time.

pub mod cpu;
pub mod memory;
pub mod network;
pub mod storage;
pub mod store;

use crate::complexity::EngineKind;
use crate::error::{SimError, SimResult};
use cpu::CpuSpecific;
use memory::MemorySpecific;
use network::NetworkSpecific;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use storage::StorageSpecific;

/// Required `baseline_performance` keys per engine kind (§4.1).
pub fn required_baseline_keys(kind: EngineKind) -> &'static [&'static str] {
    match kind {
        EngineKind::Cpu => &["cores", "base_clock", "base_processing_time"],
        EngineKind::Memory => &["capacity_gb", "access_time", "bandwidth_gbps"],
        EngineKind::Storage => &["capacity_gb", "max_iops", "avg_latency_ms"],
        EngineKind::Network => &["bandwidth_mbps", "base_latency_ms"],
    }
}

/// The raw wire shape of a profile JSON document (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileDocument {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub baseline_performance: HashMap<String, f64>,
    #[serde(default)]
    pub technology_specs: HashMap<String, serde_json::Value>,
    #[serde(default = "default_engine_specific")]
    pub engine_specific: serde_json::Value,
}

fn default_engine_specific() -> serde_json::Value {
    serde_json::Value::Object(Default::default())
}

/// Per-kind typed `engine_specific` record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum EngineSpecific {
    Cpu(CpuSpecific),
    Memory(MemorySpecific),
    Storage(StorageSpecific),
    Network(NetworkSpecific),
}

/// An immutable, fully-validated hardware profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineProfile {
    pub name: String,
    pub kind: EngineKind,
    pub description: String,
    pub version: String,
    pub baseline_performance: HashMap<String, f64>,
    pub technology_specs: HashMap<String, serde_json::Value>,
    pub engine_specific: EngineSpecific,
}

impl EngineProfile {
    /// Parse and validate a wire document against an expected engine kind.
    ///
    /// Required `baseline_performance` keys missing is a hard error for
    /// this file only (§4.1's failure policy). Unknown `engine_specific`
    /// sub-keys are ignored; a sub-record that fails to parse falls back
    /// to its typed default with a warning rather than failing the whole
    /// profile, per the "numeric anomalies clamp to safe defaults" policy.
    pub fn parse(path: &str, doc: ProfileDocument, expected_kind: EngineKind) -> SimResult<Self> {
        if doc.kind.to_lowercase() != expected_kind.dir_name() {
            return Err(SimError::InvalidProfile {
                path: path.to_string(),
                reason: format!("type '{}' does not match directory kind '{}'", doc.kind, expected_kind),
            });
        }

        for key in required_baseline_keys(expected_kind) {
            if !doc.baseline_performance.contains_key(*key) {
                return Err(SimError::InvalidProfile {
                    path: path.to_string(),
                    reason: format!("missing required baseline_performance field '{key}'"),
                });
            }
        }

        let engine_specific = match expected_kind {
            EngineKind::Cpu => EngineSpecific::Cpu(parse_specific_or_default(path, doc.engine_specific.clone())),
            EngineKind::Memory => EngineSpecific::Memory(parse_specific_or_default(path, doc.engine_specific.clone())),
            EngineKind::Storage => EngineSpecific::Storage(parse_specific_or_default(path, doc.engine_specific.clone())),
            EngineKind::Network => EngineSpecific::Network(parse_specific_or_default(path, doc.engine_specific.clone())),
        };

        Ok(EngineProfile {
            name: doc.name,
            kind: expected_kind,
            description: doc.description,
            version: doc.version,
            baseline_performance: doc.baseline_performance,
            technology_specs: doc.technology_specs,
            engine_specific,
        })
    }

    /// Read a required numeric baseline field. Only call this for keys
    /// already guaranteed present by `required_baseline_keys` validation,
    /// or handle the `None` case explicitly for optional fields.
    pub fn baseline(&self, key: &str) -> Option<f64> {
        self.baseline_performance.get(key).copied()
    }

    /// Typed accessor for the CPU engine-specific record.
    pub fn as_cpu(&self) -> Option<&CpuSpecific> {
        match &self.engine_specific {
            EngineSpecific::Cpu(c) => Some(c),
            _ => None,
        }
    }

    /// Typed accessor for the memory engine-specific record.
    pub fn as_memory(&self) -> Option<&MemorySpecific> {
        match &self.engine_specific {
            EngineSpecific::Memory(m) => Some(m),
            _ => None,
        }
    }

    /// Typed accessor for the storage engine-specific record.
    pub fn as_storage(&self) -> Option<&StorageSpecific> {
        match &self.engine_specific {
            EngineSpecific::Storage(s) => Some(s),
            _ => None,
        }
    }

    /// Typed accessor for the network engine-specific record.
    pub fn as_network(&self) -> Option<&NetworkSpecific> {
        match &self.engine_specific {
            EngineSpecific::Network(n) => Some(n),
            _ => None,
        }
    }
}

fn parse_specific_or_default<T>(path: &str, value: serde_json::Value) -> T
where
    T: Default + for<'de> Deserialize<'de>,
{
    match serde_json::from_value(value) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(path, error = %e, "engine_specific failed to parse, falling back to defaults");
            T::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(kind: &str, baseline: &[(&str, f64)]) -> ProfileDocument {
        ProfileDocument {
            name: "test".into(),
            kind: kind.into(),
            description: String::new(),
            version: "1.0".into(),
            baseline_performance: baseline.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            technology_specs: HashMap::new(),
            engine_specific: serde_json::json!({}),
        }
    }

    #[test]
    fn missing_required_field_is_hard_error() {
        let d = doc("cpu", &[("cores", 24.0), ("base_clock", 3.0)]); // missing base_processing_time
        let result = EngineProfile::parse("x.json", d, EngineKind::Cpu);
        assert!(matches!(result, Err(SimError::InvalidProfile { .. })));
    }

    #[test]
    fn mismatched_kind_is_hard_error() {
        let d = doc("memory", &[]);
        let result = EngineProfile::parse("x.json", d, EngineKind::Cpu);
        assert!(result.is_err());
    }

    #[test]
    fn valid_cpu_profile_parses_with_defaults() {
        let d = doc("cpu", &[("cores", 24.0), ("base_clock", 3.0), ("base_processing_time", 0.08)]);
        let profile = EngineProfile::parse("x.json", d, EngineKind::Cpu).unwrap();
        assert_eq!(profile.baseline("cores"), Some(24.0));
        assert!(profile.as_cpu().is_some());
    }
}
