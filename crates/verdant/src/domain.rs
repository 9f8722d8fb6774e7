//! Core data model for the planning pipeline.
//!
//! Every payload that crosses an agent boundary or lands in the memory bank
//! is an explicit struct here — optional fields are `Option<T>`, never absent
//! keys, so the serialized shape stays stable across the store and the LLM
//! boundary.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ── Thresholds ─────────────────────────────────────────────────────

/// A facility reading is anomalous when current exceeds this multiple of
/// its baseline.
pub const ANOMALY_THRESHOLD: f64 = 1.15;

/// An anomaly is high-severity when current exceeds this multiple of
/// its baseline.
pub const HIGH_SEVERITY_THRESHOLD: f64 = 1.3;

/// A facility is "critical" in the summary when current exceeds this
/// multiple of its baseline.
pub const CRITICAL_FACILITY_THRESHOLD: f64 = 1.2;

/// A plan is high-priority when its total CO2 savings exceed this (kg).
pub const HIGH_PRIORITY_CO2_KG: f64 = 100.0;

// ── Readings ───────────────────────────────────────────────────────

/// Per-facility electricity reading. Named channels (hvac, lighting,
/// production, ...) are flattened alongside the totals.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct FacilityEnergy {
    pub current_kwh: f64,
    pub baseline_kwh: f64,
    /// Channel breakdown in kWh, keyed by channel name (e.g. `hvac_kwh`).
    #[serde(flatten)]
    pub channels: BTreeMap<String, f64>,
}

/// One batch of sensor readings across facilities.
///
/// `BTreeMap` keeps facility iteration order stable (sorted by name), which
/// fixes the insertion order of detected anomalies.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct SensorReadings {
    pub energy: BTreeMap<String, FacilityEnergy>,
    #[serde(default)]
    pub production: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub facility: BTreeMap<String, serde_json::Value>,
}

// ── Anomalies ──────────────────────────────────────────────────────

/// Anomaly severity. `High` when current exceeds 1.3× baseline.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Medium,
    High,
}

/// A detected operational anomaly for one facility.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Anomaly {
    /// Anomaly kind, e.g. `energy_spike`.
    #[serde(rename = "type")]
    pub kind: String,
    pub facility: String,
    pub current: f64,
    pub baseline: f64,
    pub deviation_pct: f64,
    pub severity: Severity,
}

// ── Context package ────────────────────────────────────────────────

/// Fixed-shape efficiency block included in every summary.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct EfficiencyMetrics {
    /// kWh per unit output.
    pub energy_intensity: f64,
    pub capacity_utilization: f64,
}

impl Default for EfficiencyMetrics {
    fn default() -> Self {
        Self {
            energy_intensity: 1.2,
            capacity_utilization: 0.85,
        }
    }
}

/// Summary statistics computed by the Data Scout each cycle.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct OperationalSummary {
    pub total_energy_kwh: f64,
    pub total_emissions_kg_co2: f64,
    pub anomaly_count: usize,
    pub critical_facilities: Vec<String>,
    #[serde(default)]
    pub efficiency_metrics: EfficiencyMetrics,
}

/// Simulated or fetched weather forecast.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct WeatherForecast {
    pub condition: String,
    pub temperature_c: f64,
}

/// External signals: grid carbon intensity plus an optional forecast.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct ExternalContext {
    /// kg CO2 per kWh drawn from the grid right now.
    pub grid_carbon_intensity: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weather: Option<WeatherForecast>,
}

/// Historical baseline averaged from stored context snapshots.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct BaselineMetrics {
    pub energy_kwh: f64,
    pub emissions_kg: f64,
}

impl Default for BaselineMetrics {
    fn default() -> Self {
        Self {
            energy_kwh: 1000.0,
            emissions_kg: 500.0,
        }
    }
}

/// The bundle the Data Scout hands to the EcoPlanner: summarized operational
/// data, anomalies, and external signals. Immutable once produced.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct ContextPackage {
    pub timestamp: String,
    pub operational_summary: OperationalSummary,
    pub anomalies: Vec<Anomaly>,
    pub external_context: ExternalContext,
    #[serde(default)]
    pub historical_baseline: BaselineMetrics,
}

// ── Recommendations & plans ────────────────────────────────────────

/// Implementation complexity of a recommendation.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for Complexity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Complexity::Low => write!(f, "low"),
            Complexity::Medium => write!(f, "medium"),
            Complexity::High => write!(f, "high"),
        }
    }
}

/// Implementation time horizon of a recommendation.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Timeline {
    #[serde(rename = "immediate")]
    Immediate,
    #[serde(rename = "short-term")]
    ShortTerm,
    #[serde(rename = "long-term")]
    LongTerm,
}

impl std::fmt::Display for Timeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Timeline::Immediate => write!(f, "immediate"),
            Timeline::ShortTerm => write!(f, "short-term"),
            Timeline::LongTerm => write!(f, "long-term"),
        }
    }
}

/// A single sustainability recommendation.
///
/// LLM-parsed instances populate fields best-effort; the rule-based fallback
/// always populates everything.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct Recommendation {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub energy_savings_kwh: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub co2_savings_kg: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complexity: Option<Complexity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeline: Option<Timeline>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
    /// Best-effort output of the route optimizer, attached during enrichment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_optimization: Option<serde_json::Value>,
}

impl Recommendation {
    /// CO2 savings with missing treated as zero (used for ranking and sums).
    pub fn co2(&self) -> f64 {
        self.co2_savings_kg.unwrap_or(0.0)
    }

    /// Energy savings with missing treated as zero.
    pub fn energy(&self) -> f64 {
        self.energy_savings_kwh.unwrap_or(0.0)
    }
}

/// Plan priority: `High` iff total CO2 savings exceed [`HIGH_PRIORITY_CO2_KG`].
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::High => write!(f, "high"),
            Priority::Medium => write!(f, "medium"),
        }
    }
}

/// The finalized, ranked, size-bounded output of one planning cycle.
///
/// Immutable after creation except for `plan_id`, assigned by the memory
/// bank on persist.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Plan {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_id: Option<i64>,
    pub timestamp: String,
    pub recommendations: Vec<Recommendation>,
    pub total_co2_savings_kg: f64,
    pub total_energy_savings_kwh: f64,
    pub implementation_priority: Priority,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Severity::High).unwrap(), "\"high\"");
        assert_eq!(
            serde_json::to_string(&Severity::Medium).unwrap(),
            "\"medium\""
        );
    }

    #[test]
    fn timeline_uses_hyphenated_names() {
        assert_eq!(
            serde_json::to_string(&Timeline::ShortTerm).unwrap(),
            "\"short-term\""
        );
        let parsed: Timeline = serde_json::from_str("\"immediate\"").unwrap();
        assert_eq!(parsed, Timeline::Immediate);
    }

    #[test]
    fn baseline_defaults() {
        let baseline = BaselineMetrics::default();
        assert_eq!(baseline.energy_kwh, 1000.0);
        assert_eq!(baseline.emissions_kg, 500.0);
    }

    #[test]
    fn recommendation_parses_with_missing_fields() {
        let rec: Recommendation =
            serde_json::from_str(r#"{"description": "Adjust HVAC setpoints"}"#).unwrap();
        assert_eq!(rec.description, "Adjust HVAC setpoints");
        assert!(rec.co2_savings_kg.is_none());
        assert_eq!(rec.co2(), 0.0);
    }

    #[test]
    fn facility_energy_flattens_channels() {
        let json = r#"{"current_kwh": 500.0, "baseline_kwh": 450.0, "hvac_kwh": 200.0}"#;
        let reading: FacilityEnergy = serde_json::from_str(json).unwrap();
        assert_eq!(reading.channels.get("hvac_kwh"), Some(&200.0));
    }

    #[test]
    fn anomaly_kind_serializes_as_type() {
        let anomaly = Anomaly {
            kind: "energy_spike".into(),
            facility: "facility_a".into(),
            current: 600.0,
            baseline: 450.0,
            deviation_pct: 33.3,
            severity: Severity::High,
        };
        let value = serde_json::to_value(&anomaly).unwrap();
        assert_eq!(value["type"], "energy_spike");
    }
}
