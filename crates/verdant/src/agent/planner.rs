//! EcoPlanner: turns a context package into a ranked plan.
//!
//! The planning workflow: assemble a token-budgeted prompt, call the LLM
//! with the full tool registry, parse its output into recommendations
//! (structured JSON when offered, markdown-block splitting otherwise), fall
//! back to the deterministic rule-based generator when nothing usable comes
//! back, enrich impacts through the emissions tool, then rank, truncate, and
//! persist.
//!
//! The markdown parser is a lossy, best-effort heuristic by design — it is
//! always paired with the rule-based fallback, which is the one path
//! guaranteed to produce a non-empty plan.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::agent::prompt::{ECOPLANNER_SYSTEM_PROMPT, PLANNING_TASK, situation_block};
use crate::agent::{Agent, AgentFuture, log_action};
use crate::api::{LlmClient, LlmResponse};
use crate::config::Config;
use crate::context::{ContextBuilder, HistoryEntry};
use crate::domain::{
    Complexity, ContextPackage, HIGH_PRIORITY_CO2_KG, Plan, Priority, Recommendation, Severity,
    Timeline,
};
use crate::memory::MemoryBank;
use crate::tools::core::ToolSet;

/// Number of prior plans offered to the prompt as history.
const MAX_HISTORY_ITEMS: usize = 5;

/// Fallback total-energy figure when neither summary nor baseline has one.
const FALLBACK_TOTAL_ENERGY_KWH: f64 = 950.0;

/// Agent responsible for generating sustainability action plans.
pub struct EcoPlanner {
    llm: LlmClient,
    memory: Arc<MemoryBank>,
    tools: Arc<ToolSet>,
    context: ContextBuilder,
    temperature: f32,
    max_recommendations: usize,
    emission_factor_electricity: f64,
}

impl EcoPlanner {
    pub fn new(
        llm: LlmClient,
        memory: Arc<MemoryBank>,
        tools: Arc<ToolSet>,
        config: &Config,
    ) -> Self {
        Self {
            llm,
            memory,
            tools,
            context: ContextBuilder::new(config.context_window_tokens),
            temperature: config.temperature,
            max_recommendations: config.max_recommendations,
            emission_factor_electricity: config.emission_factor_electricity,
        }
    }

    /// Run one planning cycle over a prepared context package.
    pub async fn plan(&self, package: &ContextPackage) -> Result<Plan, String> {
        info!("EcoPlanner: starting planning cycle");

        // 1. Budgeted prompt assembly.
        let prompt = self.build_planning_prompt(package)?;

        // 2. LLM call with the full registry.
        let response = self
            .llm
            .generate_with_tools(&prompt, &self.tools.definitions(), self.temperature)
            .await;

        // 3. Parse into recommendation-shaped records.
        let mut recommendations = parse_recommendations(&response);

        // 4. Nothing usable: deterministic fallback.
        if recommendations.is_empty() {
            info!("EcoPlanner: no usable LLM output, using rule-based recommendations");
            recommendations = self.rule_based_recommendations(package);
        }

        // 5. Enrich impacts through tools.
        let enriched = self.enrich_recommendations(recommendations).await;
        // Enrichment only appends, so this can't fire for non-empty input;
        // kept as a guard against future filtering.
        let enriched = if enriched.is_empty() {
            self.rule_based_recommendations(package)
        } else {
            enriched
        };

        // 6. Rank, truncate, totalize.
        let mut plan = self.prioritize_and_format(enriched);

        // 7. Persist; the store assigns the plan id.
        plan.plan_id = Some(self.memory.store_plan(&plan)?);

        // 8. Summary event.
        log_action(
            &self.memory,
            "EcoPlanner",
            "plan_generated",
            json!({
                "recommendation_count": plan.recommendations.len(),
                "estimated_co2_savings": plan.total_co2_savings_kg,
            }),
        )?;

        Ok(plan)
    }

    /// Assemble the planning prompt under the token budget.
    ///
    /// The unbounded inputs (the raw package and plan history) go through
    /// the budgeter; the situation and task blocks are bounded by
    /// construction (at most five anomaly lines) and are appended after.
    fn build_planning_prompt(&self, package: &ContextPackage) -> Result<String, String> {
        let current_data = serde_json::to_value(package)
            .map_err(|e| format!("failed to serialize context package: {e}"))?;

        let history: Vec<HistoryEntry> = self
            .memory
            .get_recent_plans(MAX_HISTORY_ITEMS)?
            .into_iter()
            .map(|plan| {
                HistoryEntry::new(
                    plan.timestamp,
                    format!(
                        "{} recommendations, {:.1} kg CO2 projected",
                        plan.recommendations.len(),
                        plan.total_co2_savings_kg
                    ),
                )
            })
            .collect();

        let budgeted = self.context.build_context(
            ECOPLANNER_SYSTEM_PROMPT,
            &current_data,
            &history,
            MAX_HISTORY_ITEMS,
        )?;

        Ok(format!(
            "{budgeted}\n\n{}\n{PLANNING_TASK}",
            situation_block(package)
        ))
    }

    /// Deterministic rule-based recommendations: the guaranteed-non-empty
    /// path. Produces three fixed measures plus up to three anomaly-driven
    /// ones, every field populated.
    pub fn rule_based_recommendations(&self, package: &ContextPackage) -> Vec<Recommendation> {
        let summary = &package.operational_summary;
        let baseline = &package.historical_baseline;

        let total_energy = if summary.total_energy_kwh > 0.0 {
            summary.total_energy_kwh
        } else if baseline.energy_kwh > 0.0 {
            baseline.energy_kwh
        } else {
            FALLBACK_TOTAL_ENERGY_KWH
        };
        let grid_intensity = if package.external_context.grid_carbon_intensity > 0.0 {
            package.external_context.grid_carbon_intensity
        } else {
            self.emission_factor_electricity
        };

        let mut recommendations = vec![
            Recommendation {
                id: "hvac_scheduling".to_string(),
                description: "Tighten HVAC schedules to occupancy: raise cooling setpoints \
                              outside occupied hours and stage startup per zone."
                    .to_string(),
                energy_savings_kwh: Some((total_energy * 0.08).max(35.0)),
                co2_savings_kg: None,
                complexity: Some(Complexity::Medium),
                timeline: Some(Timeline::Immediate),
                category: Some("hvac".to_string()),
                rationale: Some(
                    "HVAC is typically the largest controllable load; schedule tuning \
                     recovers savings without capital spend."
                        .to_string(),
                ),
                route_optimization: None,
            },
            Recommendation {
                id: "load_shifting".to_string(),
                description: format!(
                    "Shift flexible equipment runs into the low-carbon window \
                     (current grid intensity {grid_intensity:.2} kg CO2/kWh)."
                ),
                energy_savings_kwh: Some((total_energy * 0.05).max(25.0)),
                co2_savings_kg: None,
                complexity: Some(Complexity::Low),
                timeline: Some(Timeline::ShortTerm),
                category: Some("scheduling".to_string()),
                rationale: Some(
                    "Running deferrable loads when grid intensity is low cuts emissions \
                     even at constant consumption."
                        .to_string(),
                ),
                route_optimization: None,
            },
        ];

        for anomaly in package
            .anomalies
            .iter()
            .filter(|a| a.current - a.baseline > 0.0)
            .take(3)
        {
            let deviation = anomaly.current - anomaly.baseline;
            recommendations.push(Recommendation {
                id: format!("anomaly_{}", anomaly.facility),
                description: format!(
                    "Investigate the {} at {}: consumption is {:.1}% above baseline; \
                     check equipment scheduling and recent setpoint changes.",
                    anomaly.kind, anomaly.facility, anomaly.deviation_pct
                ),
                energy_savings_kwh: Some((deviation * 0.9).max(20.0)),
                co2_savings_kg: None,
                complexity: Some(if anomaly.severity == Severity::High {
                    Complexity::Medium
                } else {
                    Complexity::Low
                }),
                timeline: Some(Timeline::Immediate),
                category: Some("anomaly_response".to_string()),
                rationale: Some(
                    "Sustained deviations from baseline usually trace to a correctable \
                     operational change."
                        .to_string(),
                ),
                route_optimization: None,
            });
        }

        recommendations.push(Recommendation {
            id: "lighting_controls".to_string(),
            description: "Tune lighting controls: occupancy sensor sweeps, daylight \
                          dimming calibration, and de-lamping over-lit areas."
                .to_string(),
            energy_savings_kwh: Some(
                (summary.total_emissions_kg_co2 * 0.04 / self.emission_factor_electricity)
                    .max(18.0),
            ),
            co2_savings_kg: None,
            complexity: Some(Complexity::Low),
            timeline: Some(Timeline::ShortTerm),
            category: Some("lighting".to_string()),
            rationale: Some(
                "Lighting retune is the cheapest recurring win and needs no downtime."
                    .to_string(),
            ),
            route_optimization: None,
        });

        recommendations
    }

    /// Enrich recommendations with tool-calculated impacts.
    async fn enrich_recommendations(
        &self,
        recommendations: Vec<Recommendation>,
    ) -> Vec<Recommendation> {
        let mut enriched = Vec::with_capacity(recommendations.len());

        for mut rec in recommendations {
            if let Some(kwh) = rec.energy_savings_kwh
                && self.tools.has("emissions_calculator")
            {
                let raw = self
                    .tools
                    .execute("emissions_calculator", &json!({ "energy_kwh": kwh }).to_string())
                    .await;
                match serde_json::from_str::<Value>(&raw) {
                    Ok(result) => {
                        rec.co2_savings_kg = result["co2_kg"].as_f64();
                    }
                    Err(_) => warn!("emissions_calculator returned unparseable result"),
                }
            }

            if rec.description.to_lowercase().contains("route")
                && self.tools.has("route_optimizer")
            {
                // Best-effort: absence or failure of the optimizer is fine.
                let raw = self.tools.execute("route_optimizer", "{}").await;
                if let Ok(result) = serde_json::from_str::<Value>(&raw) {
                    rec.route_optimization = Some(result);
                }
            }

            enriched.push(rec);
        }

        enriched
    }

    /// Rank by CO2 impact (stable, descending), truncate, and compute totals.
    fn prioritize_and_format(&self, mut recommendations: Vec<Recommendation>) -> Plan {
        recommendations.sort_by(|a, b| {
            b.co2()
                .partial_cmp(&a.co2())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        recommendations.truncate(self.max_recommendations);

        let total_co2_savings_kg: f64 = recommendations.iter().map(Recommendation::co2).sum();
        let total_energy_savings_kwh: f64 =
            recommendations.iter().map(Recommendation::energy).sum();

        Plan {
            plan_id: None,
            timestamp: Utc::now().to_rfc3339(),
            recommendations,
            total_co2_savings_kg,
            total_energy_savings_kwh,
            implementation_priority: if total_co2_savings_kg > HIGH_PRIORITY_CO2_KG {
                Priority::High
            } else {
                Priority::Medium
            },
        }
    }
}

/// Parse an LLM response into recommendation-shaped records.
///
/// A soft-error response yields nothing. A response whose text is a JSON
/// object with a `recommendations` array is used verbatim (fields
/// best-effort). Otherwise the text is split into blocks on lines starting
/// with `##` or `**Recommendation`, accumulating description text per block.
fn parse_recommendations(response: &LlmResponse) -> Vec<Recommendation> {
    if response.is_error() {
        return Vec::new();
    }

    // Structured path.
    if let Ok(value) = serde_json::from_str::<Value>(&response.text)
        && let Some(items) = value.get("recommendations").and_then(Value::as_array)
    {
        return items
            .iter()
            .enumerate()
            .filter_map(|(i, item)| {
                let mut rec: Recommendation = serde_json::from_value(item.clone()).ok()?;
                if rec.id.is_empty() {
                    rec.id = format!("rec_{}", i + 1);
                }
                Some(rec)
            })
            .collect();
    }

    // Text path: markdown-block splitting.
    let mut recommendations: Vec<Recommendation> = Vec::new();
    let mut current: Option<String> = None;

    for line in response.text.lines() {
        if line.starts_with("##") || line.starts_with("**Recommendation") {
            if let Some(description) = current.take() {
                push_text_recommendation(&mut recommendations, description);
            }
            current = Some(String::new());
        } else if let Some(ref mut description) = current {
            description.push_str(line);
            description.push(' ');
        }
    }
    if let Some(description) = current {
        push_text_recommendation(&mut recommendations, description);
    }

    debug!(
        "parsed {} recommendation(s) from LLM text",
        recommendations.len()
    );
    recommendations
}

fn push_text_recommendation(recommendations: &mut Vec<Recommendation>, description: String) {
    let description = description.trim().to_string();
    if description.is_empty() {
        return;
    }
    let id = format!("rec_{}", recommendations.len() + 1);
    recommendations.push(Recommendation {
        id,
        description,
        ..Default::default()
    });
}

impl Agent for EcoPlanner {
    fn name(&self) -> &str {
        "EcoPlanner"
    }

    fn execute(&self, context: Value) -> AgentFuture<'_> {
        Box::pin(async move {
            let package: ContextPackage = serde_json::from_value(context)
                .map_err(|e| format!("invalid context package: {e}"))?;
            let plan = self.plan(&package).await?;
            serde_json::to_value(&plan).map_err(|e| format!("failed to serialize plan: {e}"))
        })
    }
}
