//! Data Scout: telemetry ingestion and context preparation.
//!
//! One scouting cycle ingests the latest facility readings (through the
//! registry's `iot_simulator` tool when present, else the built-in
//! generator), detects energy anomalies against per-facility baselines,
//! computes summary statistics and external signals, and hands the result to
//! the planner as a [`ContextPackage`]. The package is also snapshotted into
//! the memory bank.

use std::sync::Arc;

use chrono::{Local, Timelike, Utc};
use serde_json::{Value, json};
use tracing::info;

use crate::agent::{Agent, AgentFuture, log_action};
use crate::config::Config;
use crate::domain::{
    ANOMALY_THRESHOLD, Anomaly, ContextPackage, CRITICAL_FACILITY_THRESHOLD, EfficiencyMetrics,
    ExternalContext, HIGH_SEVERITY_THRESHOLD, OperationalSummary, SensorReadings, Severity,
    WeatherForecast,
};
use crate::memory::MemoryBank;
use crate::tools::common::IotSimulator;
use crate::tools::core::ToolSet;

/// Grid carbon intensity by local hour: solar peak (hours 10–16 inclusive)
/// runs cleaner than the off-peak mix.
pub fn grid_intensity_for_hour(hour: u32) -> f64 {
    if (10..=16).contains(&hour) { 0.35 } else { 0.55 }
}

/// Agent responsible for data aggregation and context preparation.
pub struct DataScout {
    memory: Arc<MemoryBank>,
    tools: Arc<ToolSet>,
    emission_factor_electricity: f64,
    simulator_seed: u64,
}

impl DataScout {
    pub fn new(memory: Arc<MemoryBank>, tools: Arc<ToolSet>, config: &Config) -> Self {
        Self {
            memory,
            tools,
            emission_factor_electricity: config.emission_factor_electricity,
            simulator_seed: config.simulator_seed,
        }
    }

    /// Run one scouting cycle.
    ///
    /// Sub-step errors propagate to the orchestrator boundary; anomalies are
    /// never silently dropped.
    pub async fn scout(&self, _context: &Value) -> Result<ContextPackage, String> {
        info!("DataScout: starting data scouting cycle");

        let readings = self.ingest().await?;
        let anomalies = detect_anomalies(&readings);
        let summary = self.summarize(&readings, &anomalies);
        let external_context = self.fetch_external_context().await?;
        let historical_baseline = self.memory.get_baseline_metrics()?;

        let package = ContextPackage {
            timestamp: Utc::now().to_rfc3339(),
            operational_summary: summary,
            anomalies,
            external_context,
            historical_baseline,
        };

        self.memory.store_context(&package)?;

        let metric_keys = [
            "total_energy_kwh",
            "total_emissions_kg_co2",
            "anomaly_count",
            "critical_facilities",
            "efficiency_metrics",
        ];
        log_action(
            &self.memory,
            "DataScout",
            "context_prepared",
            json!({
                "anomaly_count": package.anomalies.len(),
                "summary_metrics": metric_keys,
            }),
        )?;

        Ok(package)
    }

    /// Ingest the latest readings: the registered reading source when
    /// available, else the built-in deterministic generator.
    async fn ingest(&self) -> Result<SensorReadings, String> {
        if self.tools.has("iot_simulator") {
            let raw = self.tools.execute("iot_simulator", "{}").await;
            if raw.starts_with("Error") {
                return Err(format!("reading source failed: {raw}"));
            }
            return serde_json::from_str(&raw)
                .map_err(|e| format!("failed to parse sensor readings: {e}"));
        }
        Ok(IotSimulator::new(self.simulator_seed).readings())
    }

    fn summarize(&self, readings: &SensorReadings, anomalies: &[Anomaly]) -> OperationalSummary {
        let total_energy_kwh: f64 = readings.energy.values().map(|f| f.current_kwh).sum();
        let critical_facilities = readings
            .energy
            .iter()
            .filter(|(_, reading)| {
                reading.current_kwh > reading.baseline_kwh * CRITICAL_FACILITY_THRESHOLD
            })
            .map(|(facility, _)| facility.clone())
            .collect();

        OperationalSummary {
            total_energy_kwh,
            total_emissions_kg_co2: total_energy_kwh * self.emission_factor_electricity,
            anomaly_count: anomalies.len(),
            critical_facilities,
            efficiency_metrics: EfficiencyMetrics::default(),
        }
    }

    /// Fetch external signals: optional weather, grid carbon intensity.
    async fn fetch_external_context(&self) -> Result<ExternalContext, String> {
        let mut external = ExternalContext {
            grid_carbon_intensity: grid_intensity_for_hour(Local::now().hour()),
            weather: None,
        };

        if self.tools.has("weather_forecast") {
            let raw = self.tools.execute("weather_forecast", "{}").await;
            // The forecast is advisory; a failed fetch just leaves it out.
            if let Ok(forecast) = serde_json::from_str::<WeatherForecast>(&raw) {
                external.weather = Some(forecast);
            }
        }

        Ok(external)
    }
}

/// Flag every facility whose current electricity draw exceeds its baseline
/// by more than the anomaly threshold.
pub fn detect_anomalies(readings: &SensorReadings) -> Vec<Anomaly> {
    let mut anomalies = Vec::new();

    for (facility, reading) in &readings.energy {
        let current = reading.current_kwh;
        let baseline = reading.baseline_kwh;
        if baseline <= 0.0 {
            continue;
        }
        if current > baseline * ANOMALY_THRESHOLD {
            anomalies.push(Anomaly {
                kind: "energy_spike".to_string(),
                facility: facility.clone(),
                current,
                baseline,
                deviation_pct: ((current - baseline) / baseline) * 100.0,
                severity: if current > baseline * HIGH_SEVERITY_THRESHOLD {
                    Severity::High
                } else {
                    Severity::Medium
                },
            });
        }
    }

    anomalies
}

impl Agent for DataScout {
    fn name(&self) -> &str {
        "DataScout"
    }

    fn execute(&self, context: Value) -> AgentFuture<'_> {
        Box::pin(async move {
            let package = self.scout(&context).await?;
            serde_json::to_value(&package)
                .map_err(|e| format!("failed to serialize context package: {e}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FacilityEnergy;

    fn readings_with(facilities: &[(&str, f64, f64)]) -> SensorReadings {
        let mut readings = SensorReadings::default();
        for &(name, current, baseline) in facilities {
            readings.energy.insert(
                name.to_string(),
                FacilityEnergy {
                    current_kwh: current,
                    baseline_kwh: baseline,
                    ..Default::default()
                },
            );
        }
        readings
    }

    #[test]
    fn anomaly_emitted_above_threshold() {
        // 600 / 450 = 1.33x baseline: anomalous and high severity.
        let readings = readings_with(&[("facility_a", 600.0, 450.0)]);
        let anomalies = detect_anomalies(&readings);
        assert_eq!(anomalies.len(), 1);
        let anomaly = &anomalies[0];
        assert_eq!(anomaly.facility, "facility_a");
        assert_eq!(anomaly.severity, Severity::High);
        let expected_pct = ((600.0 - 450.0) / 450.0) * 100.0;
        assert!((anomaly.deviation_pct - expected_pct).abs() < 1e-9);
    }

    #[test]
    fn medium_severity_between_thresholds() {
        // 1.2x baseline: anomalous but below the 1.3x high-severity bar.
        let readings = readings_with(&[("facility_b", 540.0, 450.0)]);
        let anomalies = detect_anomalies(&readings);
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].severity, Severity::Medium);
    }

    #[test]
    fn no_anomaly_at_or_below_threshold() {
        // Exactly 1.15x and below: no anomaly.
        let readings = readings_with(&[
            ("facility_a", 517.5, 450.0),
            ("facility_b", 400.0, 450.0),
        ]);
        assert!(detect_anomalies(&readings).is_empty());
    }

    #[test]
    fn just_above_threshold_is_anomalous() {
        let readings = readings_with(&[("facility_a", 517.6, 450.0)]);
        let anomalies = detect_anomalies(&readings);
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].severity, Severity::Medium);
    }

    #[test]
    fn anomalies_follow_facility_order() {
        let readings = readings_with(&[
            ("facility_c", 600.0, 450.0),
            ("facility_a", 600.0, 450.0),
        ]);
        let anomalies = detect_anomalies(&readings);
        // BTreeMap iteration: sorted facility names.
        assert_eq!(anomalies[0].facility, "facility_a");
        assert_eq!(anomalies[1].facility, "facility_c");
    }

    #[test]
    fn zero_baseline_skipped() {
        let readings = readings_with(&[("facility_x", 100.0, 0.0)]);
        assert!(detect_anomalies(&readings).is_empty());
    }

    #[test]
    fn grid_intensity_by_hour() {
        assert_eq!(grid_intensity_for_hour(10), 0.35);
        assert_eq!(grid_intensity_for_hour(13), 0.35);
        assert_eq!(grid_intensity_for_hour(16), 0.35);
        assert_eq!(grid_intensity_for_hour(9), 0.55);
        assert_eq!(grid_intensity_for_hour(17), 0.55);
        assert_eq!(grid_intensity_for_hour(0), 0.55);
    }

    #[tokio::test]
    async fn scout_produces_persisted_package() {
        let dir = tempfile::tempdir().unwrap();
        let memory = Arc::new(MemoryBank::open(dir.path().join("memory.db")).unwrap());
        let config = Config::default();
        let tools = Arc::new(crate::tools::default_tool_set(&config));
        let scout = DataScout::new(Arc::clone(&memory), tools, &config);

        let package = scout.scout(&json!({})).await.unwrap();
        // Empty store at scout time: the literal default baseline.
        assert_eq!(package.historical_baseline.energy_kwh, 1000.0);
        assert_eq!(package.historical_baseline.emissions_kg, 500.0);
        assert!(package.operational_summary.total_energy_kwh > 0.0);
        assert_eq!(
            package.operational_summary.anomaly_count,
            package.anomalies.len()
        );
        assert!(package.external_context.grid_carbon_intensity > 0.0);

        // The package was snapshotted: the baseline now reflects it.
        let baseline = memory.get_baseline_metrics().unwrap();
        assert!(
            (baseline.energy_kwh - package.operational_summary.total_energy_kwh).abs() < 1e-9
        );
    }

    #[tokio::test]
    async fn summary_totals_and_critical_facilities() {
        let dir = tempfile::tempdir().unwrap();
        let memory = Arc::new(MemoryBank::open(dir.path().join("memory.db")).unwrap());
        let config = Config::default();
        let tools = Arc::new(ToolSet::new()); // no reading source: built-in generator
        let scout = DataScout::new(memory, tools, &config);

        let readings = readings_with(&[
            ("facility_a", 600.0, 450.0), // 1.33x: critical
            ("facility_b", 700.0, 750.0),
        ]);
        let anomalies = detect_anomalies(&readings);
        let summary = scout.summarize(&readings, &anomalies);
        assert_eq!(summary.total_energy_kwh, 1300.0);
        assert!((summary.total_emissions_kg_co2 - 1300.0 * 0.475).abs() < 1e-9);
        assert_eq!(summary.anomaly_count, 1);
        assert_eq!(summary.critical_facilities, vec!["facility_a".to_string()]);
        assert_eq!(summary.efficiency_metrics.energy_intensity, 1.2);
    }
}
