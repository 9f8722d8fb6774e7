//! End-to-end orchestration cycles against a null LLM backend.
//!
//! With no LLM configured every cycle must still complete, with the plan
//! coming from the rule-based generator and enriched through the emissions
//! tool.

use std::sync::Arc;

use serde_json::json;

use verdant::NullChatApi;
use verdant::agent::orchestrator::{CycleStatus, Orchestrator};
use verdant::agent::planner::EcoPlanner;
use verdant::agent::scout::DataScout;
use verdant::api::LlmClient;
use verdant::config::Config;
use verdant::domain::{ContextPackage, Priority, Recommendation};
use verdant::memory::MemoryBank;
use verdant::tools::default_tool_set;

fn pipeline(
    dir: &tempfile::TempDir,
    with_scout: bool,
) -> (Arc<MemoryBank>, Orchestrator) {
    let config = Config::default();
    let memory = Arc::new(MemoryBank::open(dir.path().join("memory.db")).unwrap());
    let tools = Arc::new(default_tool_set(&config));
    let llm = LlmClient::new(Box::new(NullChatApi), &config.model);

    let mut orchestrator = Orchestrator::new(Arc::clone(&memory)).with_agent(Arc::new(
        EcoPlanner::new(llm, Arc::clone(&memory), Arc::clone(&tools), &config),
    ));
    if with_scout {
        orchestrator.add_agent(Arc::new(DataScout::new(
            Arc::clone(&memory),
            Arc::clone(&tools),
            &config,
        )));
    }
    (memory, orchestrator)
}

#[tokio::test]
async fn empty_sources_and_no_llm_yield_fixed_fallback_plan() {
    let dir = tempfile::tempdir().unwrap();
    let (memory, orchestrator) = pipeline(&dir, false);

    // Zero anomalies, zero summary: the planner sees only the literal
    // default baseline {energy_kwh: 1000, emissions_kg: 500}.
    let mut package = ContextPackage::default();
    package.historical_baseline = memory.get_baseline_metrics().unwrap();
    assert_eq!(package.historical_baseline.energy_kwh, 1000.0);
    assert_eq!(package.historical_baseline.emissions_kg, 500.0);

    let result = orchestrator
        .run_cycle(Some(serde_json::to_value(&package).unwrap()))
        .await;
    assert_eq!(result.status, CycleStatus::Completed);
    let plan = result.plan.unwrap();

    // Exactly the three fixed fallback measures, in CO2 order.
    let ids: Vec<&str> = plan.recommendations.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["hvac_scheduling", "load_shifting", "lighting_controls"]);

    // Savings derive from the 1000 kWh baseline; CO2 from the emissions
    // tool at the 0.475 electricity factor.
    assert_eq!(plan.recommendations[0].energy_savings_kwh, Some(80.0));
    assert!((plan.recommendations[0].co2_savings_kg.unwrap() - 38.0).abs() < 1e-9);
    assert_eq!(plan.recommendations[1].energy_savings_kwh, Some(50.0));
    assert_eq!(plan.recommendations[2].energy_savings_kwh, Some(18.0));

    // Total lands under 100 kg: medium priority.
    let expected_total = (80.0 + 50.0 + 18.0) * 0.475;
    assert!((plan.total_co2_savings_kg - expected_total).abs() < 1e-9);
    assert_eq!(plan.implementation_priority, Priority::Medium);

    assert!(plan.plan_id.is_some());
}

#[tokio::test]
async fn full_cycle_with_scout_completes_and_persists() {
    let dir = tempfile::tempdir().unwrap();
    let (memory, orchestrator) = pipeline(&dir, true);
    let config = Config::default();

    let result = orchestrator.run_cycle(None).await;
    assert_eq!(result.status, CycleStatus::Completed, "{:?}", result.error);
    let plan = result.plan.unwrap();

    // Plan invariants.
    assert!(!plan.recommendations.is_empty());
    assert!(plan.recommendations.len() <= config.max_recommendations);
    let co2s: Vec<f64> = plan.recommendations.iter().map(Recommendation::co2).collect();
    assert!(
        co2s.windows(2).all(|w| w[0] >= w[1]),
        "recommendations not sorted by CO2: {co2s:?}"
    );
    let sum: f64 = co2s.iter().sum();
    assert!((plan.total_co2_savings_kg - sum).abs() < 1e-9);

    // The cycle persisted a plan and a context snapshot.
    let stored = memory.get_recent_plans(10).unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].plan_id, plan.plan_id);
    assert_ne!(
        memory.get_baseline_metrics().unwrap().energy_kwh,
        0.0,
        "context snapshot missing"
    );
}

#[tokio::test]
async fn consecutive_cycles_accumulate_history() {
    let dir = tempfile::tempdir().unwrap();
    let (memory, orchestrator) = pipeline(&dir, true);

    for _ in 0..3 {
        let result = orchestrator.run_cycle(None).await;
        assert_eq!(result.status, CycleStatus::Completed);
    }
    assert_eq!(memory.get_recent_plans(10).unwrap().len(), 3);
}

#[tokio::test]
async fn malformed_context_fails_cycle_without_panicking() {
    let dir = tempfile::tempdir().unwrap();
    let (_memory, orchestrator) = pipeline(&dir, false);

    // A context that is not a ContextPackage: the planner phase errors and
    // the orchestrator converts it into a failed result.
    let result = orchestrator.run_cycle(Some(json!("not a package"))).await;
    assert_eq!(result.status, CycleStatus::Failed);
    assert!(result.error.unwrap().contains("invalid context package"));
}
