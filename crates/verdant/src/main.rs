//! Run the sustainability planning pipeline from the command line.
//!
//! Reads the API key from the `VERDANT_API_KEY` environment variable; with
//! no key configured, cycles still complete through the rule-based
//! recommendation generator.
//!
//! # Examples
//!
//! ```sh
//! # One full orchestration cycle (scout + planner), pretty-printed plan
//! verdant run
//!
//! # Machine-readable cycle result
//! verdant run --json
//!
//! # Recent persisted plans
//! verdant plans --limit 5
//!
//! # Inspect the simulated sensor feed
//! verdant readings
//! verdant readings --facility facility_b
//!
//! # Current historical baseline
//! verdant baseline
//! ```

use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use verdant::ChatClient;
use verdant::agent::orchestrator::{CycleStatus, Orchestrator};
use verdant::agent::planner::EcoPlanner;
use verdant::agent::scout::DataScout;
use verdant::api::LlmClient;
use verdant::api::retry::RetryConfig;
use verdant::config::Config;
use verdant::domain::Plan;
use verdant::memory::MemoryBank;
use verdant::tools::common::IotSimulator;
use verdant::tools::default_tool_set;
use verdant::{ChatApi, NullChatApi};

/// Sustainability planning pipeline over simulated facility telemetry.
#[derive(Parser)]
#[command(name = "verdant")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one orchestration cycle and print the resulting plan
    Run {
        /// Print the raw cycle result as JSON
        #[arg(long)]
        json: bool,
    },
    /// List recent persisted plans, newest first
    Plans {
        /// Maximum number of plans to show
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Print one batch of simulated sensor readings
    Readings {
        /// Restrict output to a single facility
        #[arg(long)]
        facility: Option<String>,
    },
    /// Print the current historical baseline metrics
    Baseline,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    if let Err(e) = run(cli, config).await {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

async fn run(cli: Cli, config: Config) -> Result<(), String> {
    match cli.command {
        Command::Run { json } => run_cycle(&config, json).await,
        Command::Plans { limit } => show_plans(&config, limit),
        Command::Readings { facility } => show_readings(&config, facility),
        Command::Baseline => show_baseline(&config),
    }
}

async fn run_cycle(config: &Config, json: bool) -> Result<(), String> {
    let memory = Arc::new(MemoryBank::open(&config.memory_path)?);
    let tools = Arc::new(default_tool_set(config));

    let api: Box<dyn ChatApi> = if config.llm_configured() {
        Box::new(ChatClient::new(&config.api_key, &config.api_url)?)
    } else {
        eprintln!("note: VERDANT_API_KEY not set; plans come from the rule-based generator");
        Box::new(NullChatApi)
    };
    let llm = LlmClient::new(api, &config.model)
        .with_max_tokens(config.max_tokens)
        .with_retry(
            RetryConfig::with_attempts(config.llm_max_attempts)
                .with_delay(config.rate_limit_delay),
        );

    let orchestrator = Orchestrator::new(Arc::clone(&memory))
        .with_agent(Arc::new(DataScout::new(
            Arc::clone(&memory),
            Arc::clone(&tools),
            config,
        )))
        .with_agent(Arc::new(EcoPlanner::new(llm, memory, tools, config)));

    let result = orchestrator.run_cycle(None).await;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&result)
                .map_err(|e| format!("failed to render result: {e}"))?
        );
        return Ok(());
    }

    match (result.status, result.plan) {
        (CycleStatus::Completed, Some(plan)) => {
            print_plan(&plan);
            Ok(())
        }
        (CycleStatus::Completed, None) => Err("completed cycle carried no plan".to_string()),
        (CycleStatus::Failed, _) => Err(result
            .error
            .unwrap_or_else(|| "cycle failed without detail".to_string())),
    }
}

fn print_plan(plan: &Plan) {
    println!(
        "Plan {}: {} recommendation(s), {:.1} kg CO2 / {:.1} kWh projected, priority {}",
        plan.plan_id.map_or("?".to_string(), |id| id.to_string()),
        plan.recommendations.len(),
        plan.total_co2_savings_kg,
        plan.total_energy_savings_kwh,
        plan.implementation_priority,
    );
    for (i, rec) in plan.recommendations.iter().enumerate() {
        println!("\n{}. [{}] {}", i + 1, rec.id, rec.description);
        println!(
            "   savings: {:.1} kWh / {:.1} kg CO2, complexity: {}, timeline: {}",
            rec.energy(),
            rec.co2(),
            rec.complexity
                .map_or("?".to_string(), |c| c.to_string()),
            rec.timeline.map_or("?".to_string(), |t| t.to_string()),
        );
    }
}

fn show_plans(config: &Config, limit: usize) -> Result<(), String> {
    let memory = MemoryBank::open(&config.memory_path)?;
    let plans = memory.get_recent_plans(limit)?;
    if plans.is_empty() {
        println!("No plans stored yet. Run `verdant run` first.");
        return Ok(());
    }
    for plan in &plans {
        println!(
            "{}  plan {}  {} rec(s)  {:.1} kg CO2",
            plan.timestamp,
            plan.plan_id.unwrap_or_default(),
            plan.recommendations.len(),
            plan.total_co2_savings_kg,
        );
    }
    Ok(())
}

fn show_readings(config: &Config, facility: Option<String>) -> Result<(), String> {
    let simulator = IotSimulator::new(config.simulator_seed);
    let readings = simulator.readings();
    match facility {
        Some(id) => {
            let energy = readings
                .energy
                .get(&id)
                .ok_or_else(|| format!("unknown facility '{id}'"))?;
            println!(
                "{}",
                serde_json::to_string_pretty(energy)
                    .map_err(|e| format!("failed to render readings: {e}"))?
            );
        }
        None => println!(
            "{}",
            serde_json::to_string_pretty(&readings)
                .map_err(|e| format!("failed to render readings: {e}"))?
        ),
    }
    Ok(())
}

fn show_baseline(config: &Config) -> Result<(), String> {
    let memory = MemoryBank::open(&config.memory_path)?;
    let baseline = memory.get_baseline_metrics()?;
    println!(
        "baseline: {:.1} kWh energy, {:.1} kg CO2 emissions (30-day average)",
        baseline.energy_kwh, baseline.emissions_kg,
    );
    Ok(())
}
