//! Multi-agent coordination: the sequential planning cycle and parallel
//! fan-out.
//!
//! [`Orchestrator::run_cycle`] runs the Data Scout phase and then the
//! EcoPlanner phase; EcoPlanner never starts before the scout's package is
//! fully produced. Errors from either phase are caught once at this boundary
//! and converted into a failed [`CycleResult`] — a cycle never panics or
//! propagates an error to the caller.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{error, info};

use crate::agent::Agent;
use crate::domain::Plan;
use crate::memory::MemoryBank;

/// One task for [`Orchestrator::parallel_execution`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentTask {
    /// Registry name of the agent to run.
    pub agent: String,
    /// Context handed to the agent.
    #[serde(default)]
    pub context: Value,
}

/// Outcome status of one orchestration cycle.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CycleStatus {
    Completed,
    Failed,
}

/// Result of one orchestration cycle.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct CycleResult {
    pub status: CycleStatus,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<Plan>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CycleResult {
    fn completed(plan: Plan) -> Self {
        Self {
            status: CycleStatus::Completed,
            timestamp: Utc::now().to_rfc3339(),
            plan: Some(plan),
            error: None,
        }
    }

    fn failed(error: String) -> Self {
        Self {
            status: CycleStatus::Failed,
            timestamp: Utc::now().to_rfc3339(),
            plan: None,
            error: Some(error),
        }
    }
}

/// Coordinates agents through the planning workflow.
pub struct Orchestrator {
    agents: HashMap<String, Arc<dyn Agent>>,
    memory: Arc<MemoryBank>,
}

impl Orchestrator {
    pub fn new(memory: Arc<MemoryBank>) -> Self {
        Self {
            agents: HashMap::new(),
            memory,
        }
    }

    /// Register an agent (builder pattern).
    pub fn with_agent(mut self, agent: Arc<dyn Agent>) -> Self {
        self.add_agent(agent);
        self
    }

    /// Register an agent under its own name.
    pub fn add_agent(&mut self, agent: Arc<dyn Agent>) {
        info!("Added agent: {}", agent.name());
        self.agents.insert(agent.name().to_string(), agent);
    }

    /// Remove an agent from the registry.
    pub fn remove_agent(&mut self, name: &str) {
        if self.agents.remove(name).is_some() {
            info!("Removed agent: {name}");
        }
    }

    /// Execute one complete orchestration cycle.
    ///
    /// Data Scout gathers context (or the provided context passes through
    /// when no scout is registered), EcoPlanner generates the plan, and the
    /// result is persisted. Any phase error yields a failed result instead
    /// of propagating.
    pub async fn run_cycle(&self, context: Option<Value>) -> CycleResult {
        info!("Starting orchestration cycle");
        match self.try_cycle(context).await {
            Ok(result) => {
                info!("Orchestration cycle completed");
                result
            }
            Err(e) => {
                error!("Orchestration cycle failed: {e}");
                CycleResult::failed(e)
            }
        }
    }

    async fn try_cycle(&self, context: Option<Value>) -> Result<CycleResult, String> {
        let context = context.unwrap_or_else(|| json!({}));

        // Phase 1: data gathering.
        let package = match self.agents.get("DataScout") {
            Some(scout) => {
                info!("Phase 1: Data Scout gathering context");
                scout.execute(context).await?
            }
            None => context,
        };

        // Phase 2: planning.
        let planner = self
            .agents
            .get("EcoPlanner")
            .ok_or_else(|| "EcoPlanner not available".to_string())?;
        info!("Phase 2: EcoPlanner generating recommendations");
        let plan_value = planner.execute(package.clone()).await?;

        // Phase 3: persist the cycle.
        self.memory
            .store_cycle_result(&package, &plan_value, "completed")?;

        let plan: Plan = serde_json::from_value(plan_value)
            .map_err(|e| format!("planner returned malformed plan: {e}"))?;
        Ok(CycleResult::completed(plan))
    }

    /// Execute multiple agent tasks in parallel.
    ///
    /// All tasks are gathered; a failing task captures its error in place
    /// without aborting siblings. Unknown agent names yield error entries.
    pub async fn parallel_execution(&self, tasks: Vec<AgentTask>) -> Vec<Result<Value, String>> {
        let futures = tasks.into_iter().map(|task| {
            let agent = self.agents.get(&task.agent).cloned();
            async move {
                match agent {
                    Some(agent) => agent.execute(task.context).await,
                    None => Err(format!("unknown agent '{}'", task.agent)),
                }
            }
        });
        join_all(futures).await
    }
}
