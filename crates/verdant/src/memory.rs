//! Persistent memory bank over sqlite.
//!
//! Stores context snapshots, plans, user feedback, agent events, and
//! per-cycle orchestration results. Every operation opens its own
//! short-lived connection — access is serialized per call and no
//! transaction spans multiple logical writes.

use std::path::{Path, PathBuf};

use chrono::Utc;
use rusqlite::{Connection, params};
use serde_json::Value;
use tracing::debug;

use crate::domain::{BaselineMetrics, ContextPackage, Plan, Priority, Recommendation};

/// Sqlite-backed storage for pipeline artifacts.
pub struct MemoryBank {
    db_path: PathBuf,
}

impl MemoryBank {
    /// Open (creating if needed) the memory bank at the given path and
    /// initialize the schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, String> {
        let db_path = path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("failed to create memory directory: {e}"))?;
        }
        let bank = Self { db_path };
        bank.init_schema()?;
        Ok(bank)
    }

    fn connect(&self) -> Result<Connection, String> {
        Connection::open(&self.db_path)
            .map_err(|e| format!("failed to open memory database: {e}"))
    }

    fn init_schema(&self) -> Result<(), String> {
        let conn = self.connect()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS context_snapshots (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                data TEXT NOT NULL
            )",
            [],
        )
        .map_err(|e| format!("failed to create context_snapshots: {e}"))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS plans (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                recommendations TEXT NOT NULL,
                total_co2_savings REAL,
                status TEXT DEFAULT 'pending'
            )",
            [],
        )
        .map_err(|e| format!("failed to create plans: {e}"))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS feedback (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                plan_id INTEGER,
                recommendation_id TEXT,
                action TEXT,
                user_notes TEXT,
                timestamp TEXT,
                FOREIGN KEY (plan_id) REFERENCES plans(id)
            )",
            [],
        )
        .map_err(|e| format!("failed to create feedback: {e}"))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                agent_name TEXT,
                action TEXT,
                details TEXT
            )",
            [],
        )
        .map_err(|e| format!("failed to create events: {e}"))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS cycles (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                context TEXT,
                plan TEXT,
                status TEXT
            )",
            [],
        )
        .map_err(|e| format!("failed to create cycles: {e}"))?;

        Ok(())
    }

    /// Store one context snapshot.
    pub fn store_context(&self, package: &ContextPackage) -> Result<(), String> {
        let conn = self.connect()?;
        let data = serde_json::to_string(package)
            .map_err(|e| format!("failed to serialize context: {e}"))?;
        conn.execute(
            "INSERT INTO context_snapshots (timestamp, data) VALUES (?1, ?2)",
            params![Utc::now().to_rfc3339(), data],
        )
        .map_err(|e| format!("failed to store context: {e}"))?;
        Ok(())
    }

    /// Store a generated plan. Returns the assigned plan id.
    pub fn store_plan(&self, plan: &Plan) -> Result<i64, String> {
        let conn = self.connect()?;
        let recommendations = serde_json::to_string(&plan.recommendations)
            .map_err(|e| format!("failed to serialize recommendations: {e}"))?;
        conn.execute(
            "INSERT INTO plans (timestamp, recommendations, total_co2_savings, status)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                plan.timestamp,
                recommendations,
                plan.total_co2_savings_kg,
                "pending"
            ],
        )
        .map_err(|e| format!("failed to store plan: {e}"))?;
        Ok(conn.last_insert_rowid())
    }

    /// Log an agent event for observability.
    pub fn log_event(&self, agent_name: &str, action: &str, details: &Value) -> Result<(), String> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO events (timestamp, agent_name, action, details)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                Utc::now().to_rfc3339(),
                agent_name,
                action,
                details.to_string()
            ],
        )
        .map_err(|e| format!("failed to log event: {e}"))?;
        Ok(())
    }

    /// Average baseline metrics over the snapshots of the last 30 days.
    ///
    /// Falls back to `{energy_kwh: 1000, emissions_kg: 500}` when no
    /// snapshots exist.
    pub fn get_baseline_metrics(&self) -> Result<BaselineMetrics, String> {
        let conn = self.connect()?;
        let mut stmt = conn
            .prepare(
                "SELECT data FROM context_snapshots
                 WHERE timestamp > datetime('now', '-30 days')
                 ORDER BY timestamp DESC",
            )
            .map_err(|e| format!("failed to query snapshots: {e}"))?;

        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| format!("failed to read snapshots: {e}"))?;

        let mut total_energy = 0.0;
        let mut total_emissions = 0.0;
        let mut count = 0u32;
        for row in rows {
            let data = row.map_err(|e| format!("failed to read snapshot row: {e}"))?;
            if let Ok(package) = serde_json::from_str::<ContextPackage>(&data) {
                total_energy += package.operational_summary.total_energy_kwh;
                total_emissions += package.operational_summary.total_emissions_kg_co2;
                count += 1;
            }
        }

        if count == 0 {
            debug!("no recent snapshots, using default baseline");
            return Ok(BaselineMetrics::default());
        }

        Ok(BaselineMetrics {
            energy_kwh: total_energy / f64::from(count),
            emissions_kg: total_emissions / f64::from(count),
        })
    }

    /// Store user feedback on a recommendation.
    pub fn store_feedback(
        &self,
        plan_id: i64,
        recommendation_id: &str,
        action: &str,
        notes: &str,
    ) -> Result<(), String> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO feedback (plan_id, recommendation_id, action, user_notes, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                plan_id,
                recommendation_id,
                action,
                notes,
                Utc::now().to_rfc3339()
            ],
        )
        .map_err(|e| format!("failed to store feedback: {e}"))?;
        Ok(())
    }

    /// Retrieve recent plans, newest first.
    pub fn get_recent_plans(&self, limit: usize) -> Result<Vec<Plan>, String> {
        let conn = self.connect()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, timestamp, recommendations, total_co2_savings
                 FROM plans ORDER BY timestamp DESC LIMIT ?1",
            )
            .map_err(|e| format!("failed to query plans: {e}"))?;

        let rows = stmt
            .query_map(params![limit as i64], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, f64>(3)?,
                ))
            })
            .map_err(|e| format!("failed to read plans: {e}"))?;

        let mut plans = Vec::new();
        for row in rows {
            let (id, timestamp, recommendations_json, total_co2) =
                row.map_err(|e| format!("failed to read plan row: {e}"))?;
            let recommendations: Vec<Recommendation> =
                serde_json::from_str(&recommendations_json)
                    .map_err(|e| format!("failed to parse stored recommendations: {e}"))?;
            let total_energy = recommendations.iter().map(Recommendation::energy).sum();
            plans.push(Plan {
                plan_id: Some(id),
                timestamp,
                recommendations,
                total_co2_savings_kg: total_co2,
                total_energy_savings_kwh: total_energy,
                implementation_priority: if total_co2 > crate::domain::HIGH_PRIORITY_CO2_KG {
                    Priority::High
                } else {
                    Priority::Medium
                },
            });
        }
        Ok(plans)
    }

    /// Store one orchestration cycle result.
    pub fn store_cycle_result(
        &self,
        context: &Value,
        plan: &Value,
        status: &str,
    ) -> Result<(), String> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO cycles (timestamp, context, plan, status)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                Utc::now().to_rfc3339(),
                context.to_string(),
                plan.to_string(),
                status
            ],
        )
        .map_err(|e| format!("failed to store cycle result: {e}"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{OperationalSummary, Timeline};

    fn temp_bank() -> (tempfile::TempDir, MemoryBank) {
        let dir = tempfile::tempdir().unwrap();
        let bank = MemoryBank::open(dir.path().join("memory.db")).unwrap();
        (dir, bank)
    }

    fn sample_package(energy: f64, emissions: f64) -> ContextPackage {
        ContextPackage {
            timestamp: Utc::now().to_rfc3339(),
            operational_summary: OperationalSummary {
                total_energy_kwh: energy,
                total_emissions_kg_co2: emissions,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn sample_plan(co2: f64) -> Plan {
        Plan {
            plan_id: None,
            timestamp: Utc::now().to_rfc3339(),
            recommendations: vec![Recommendation {
                id: "hvac_scheduling".into(),
                description: "Tighten HVAC schedules".into(),
                energy_savings_kwh: Some(80.0),
                co2_savings_kg: Some(co2),
                complexity: None,
                timeline: Some(Timeline::Immediate),
                category: Some("hvac".into()),
                rationale: None,
                route_optimization: None,
            }],
            total_co2_savings_kg: co2,
            total_energy_savings_kwh: 80.0,
            implementation_priority: Priority::Medium,
        }
    }

    #[test]
    fn baseline_defaults_when_empty() {
        let (_dir, bank) = temp_bank();
        let baseline = bank.get_baseline_metrics().unwrap();
        assert_eq!(baseline, BaselineMetrics::default());
    }

    #[test]
    fn baseline_averages_recent_snapshots() {
        let (_dir, bank) = temp_bank();
        bank.store_context(&sample_package(1000.0, 400.0)).unwrap();
        bank.store_context(&sample_package(2000.0, 600.0)).unwrap();
        let baseline = bank.get_baseline_metrics().unwrap();
        assert_eq!(baseline.energy_kwh, 1500.0);
        assert_eq!(baseline.emissions_kg, 500.0);
    }

    #[test]
    fn store_plan_assigns_incrementing_ids() {
        let (_dir, bank) = temp_bank();
        let first = bank.store_plan(&sample_plan(42.0)).unwrap();
        let second = bank.store_plan(&sample_plan(10.0)).unwrap();
        assert!(second > first);
    }

    #[test]
    fn recent_plans_newest_first() {
        let (_dir, bank) = temp_bank();
        let mut early = sample_plan(10.0);
        early.timestamp = "2026-08-01T00:00:00+00:00".into();
        let mut late = sample_plan(200.0);
        late.timestamp = "2026-08-02T00:00:00+00:00".into();
        bank.store_plan(&early).unwrap();
        bank.store_plan(&late).unwrap();

        let plans = bank.get_recent_plans(10).unwrap();
        assert_eq!(plans.len(), 2);
        assert_eq!(plans[0].total_co2_savings_kg, 200.0);
        assert_eq!(plans[0].implementation_priority, Priority::High);
        assert_eq!(plans[1].implementation_priority, Priority::Medium);
        assert!(plans[0].plan_id.is_some());
    }

    #[test]
    fn recent_plans_respects_limit() {
        let (_dir, bank) = temp_bank();
        for i in 0..5 {
            let mut plan = sample_plan(f64::from(i));
            plan.timestamp = format!("2026-08-0{}T00:00:00+00:00", i + 1);
            bank.store_plan(&plan).unwrap();
        }
        assert_eq!(bank.get_recent_plans(3).unwrap().len(), 3);
    }

    #[test]
    fn events_and_feedback_insert() {
        let (_dir, bank) = temp_bank();
        bank.log_event("DataScout", "context_prepared", &serde_json::json!({"n": 2}))
            .unwrap();
        let plan_id = bank.store_plan(&sample_plan(5.0)).unwrap();
        bank.store_feedback(plan_id, "hvac_scheduling", "accepted", "looks right")
            .unwrap();
    }

    #[test]
    fn cycle_results_insert() {
        let (_dir, bank) = temp_bank();
        bank.store_cycle_result(
            &serde_json::json!({"anomalies": []}),
            &serde_json::json!({"recommendations": []}),
            "completed",
        )
        .unwrap();
    }
}
