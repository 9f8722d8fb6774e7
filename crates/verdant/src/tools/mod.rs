//! Tool trait, registry, and the concrete operational tools.

pub mod common;
pub mod core;

use crate::config::Config;
use common::{EmissionsCalculator, IotSimulator, RouteOptimizer, WeatherTool};
use core::ToolSet;

/// Build the standard tool registry for a pipeline run.
///
/// Always registers the emissions calculator and the sensor simulator;
/// weather and route optimization are feature-gated by config.
pub fn default_tool_set(config: &Config) -> ToolSet {
    ToolSet::new()
        .with_arg_validation(true)
        .with(EmissionsCalculator::new(config))
        .with(IotSimulator::new(config.simulator_seed))
        .with_if(config.enable_weather, WeatherTool::new(config.simulator_seed))
        .with_if(
            config.enable_route_optimization,
            RouteOptimizer::new(config),
        )
}
