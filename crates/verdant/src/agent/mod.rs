//! Planning agents and their orchestration.
//!
//! Agents are polymorphic over one operation: `execute(context) -> result`,
//! both sides JSON values so the [`Orchestrator`](orchestrator::Orchestrator)
//! can chain and fan out agents without knowing their payload types. The
//! concrete agents expose typed entry points
//! ([`DataScout::scout`](scout::DataScout::scout),
//! [`EcoPlanner::plan`](planner::EcoPlanner::plan)) and bridge them through
//! serde in their [`Agent`] impls.

pub mod orchestrator;
pub mod planner;
pub mod prompt;
pub mod scout;

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;
use tracing::info;

use crate::memory::MemoryBank;

/// Boxed future returned by [`Agent::execute`].
pub type AgentFuture<'a> = Pin<Box<dyn Future<Output = Result<Value, String>> + Send + 'a>>;

/// A pipeline agent: one named, asynchronous `execute` operation.
pub trait Agent: Send + Sync {
    /// The agent's registry name.
    fn name(&self) -> &str;

    /// Run the agent's main task over a JSON context.
    ///
    /// Uses a boxed future so that the trait is dyn-compatible.
    fn execute(&self, context: Value) -> AgentFuture<'_>;
}

/// Log an agent action to tracing and the memory bank's event log.
pub(crate) fn log_action(
    memory: &MemoryBank,
    agent: &str,
    action: &str,
    details: Value,
) -> Result<(), String> {
    info!("{agent}: {action} {details}");
    memory.log_event(agent, action, &details)
}
