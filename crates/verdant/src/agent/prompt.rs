//! System prompts and prompt-section formatting for the agents.

use crate::domain::ContextPackage;

/// System prompt for the EcoPlanner's planning call.
pub const ECOPLANNER_SYSTEM_PROMPT: &str = "\
You are EcoPlanner, an AI sustainability expert for enterprise operations.

Your role is to analyze operational data and generate actionable recommendations to:
- Reduce energy consumption
- Lower carbon emissions
- Improve operational efficiency
- Address anomalies and inefficiencies

Guidelines:
1. Be specific and actionable - provide concrete steps, not vague suggestions
2. Quantify impact - estimate energy savings (kWh) and CO2 reductions (kg)
3. Consider feasibility - factor in operational constraints and complexity
4. Prioritize by impact - focus on high-impact, practical measures
5. Use available tools to validate calculations

Focus on practical measures like HVAC optimization, lighting efficiency,
load shifting to low-carbon hours, process optimization, and predictive
maintenance.";

/// System prompt for the Data Scout (used for analysis-style calls).
pub const DATA_SCOUT_SYSTEM_PROMPT: &str = "\
You are Data Scout, an AI data analyst specializing in operational monitoring.

Your role is to:
- Continuously monitor operational data streams
- Detect anomalies and inefficiencies
- Summarize key metrics and trends
- Provide context for decision-making

Always include current vs. baseline comparisons, a severity assessment,
potential root causes, and recommended next steps.";

/// Fixed task block appended to every planning prompt.
pub const PLANNING_TASK: &str = "\
## Task:
Generate 3-5 specific, actionable recommendations to:
1. Reduce energy consumption
2. Lower carbon emissions
3. Improve operational efficiency
4. Address detected anomalies

For each recommendation, provide:
- Clear action description
- Estimated impact (kWh saved, CO2 reduced)
- Implementation complexity (low/medium/high)
- Time horizon (immediate/short-term/long-term)

Use available tools to calculate precise impacts when needed.";

/// Render the current operational situation: emission totals, the top
/// anomalies, and external signals. Bounded in size — at most five anomaly
/// lines plus a handful of fixed lines.
pub fn situation_block(package: &ContextPackage) -> String {
    let summary = &package.operational_summary;
    let external = &package.external_context;

    let mut block = format!(
        "## Current Operational State\n\n\
         **Total Energy Consumption:** {:.1} kWh\n\
         **Total CO2 Emissions:** {:.1} kg CO2\n\
         **Detected Anomalies:** {}\n\n\
         ### Anomalies Requiring Attention:\n",
        summary.total_energy_kwh,
        summary.total_emissions_kg_co2,
        package.anomalies.len(),
    );

    for anomaly in package.anomalies.iter().take(5) {
        block.push_str(&format!(
            "\n- {} at {}: {:.1}% above baseline (severity: {})",
            anomaly.kind,
            anomaly.facility,
            anomaly.deviation_pct,
            match anomaly.severity {
                crate::domain::Severity::High => "high",
                crate::domain::Severity::Medium => "medium",
            },
        ));
    }

    block.push_str(&format!(
        "\n\n### External Context:\n- Grid Carbon Intensity: {:.2} kg CO2/kWh\n",
        external.grid_carbon_intensity,
    ));

    if let Some(ref weather) = external.weather {
        block.push_str(&format!(
            "- Weather Forecast: {}, Temp: {:.1}°C\n",
            weather.condition, weather.temperature_c,
        ));
    }

    block
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Anomaly, Severity, WeatherForecast};

    fn package_with_anomalies(count: usize) -> ContextPackage {
        let mut package = ContextPackage::default();
        package.operational_summary.total_energy_kwh = 1600.0;
        package.operational_summary.total_emissions_kg_co2 = 760.0;
        package.external_context.grid_carbon_intensity = 0.35;
        for i in 0..count {
            package.anomalies.push(Anomaly {
                kind: "energy_spike".into(),
                facility: format!("facility_{i}"),
                current: 600.0,
                baseline: 450.0,
                deviation_pct: 33.3,
                severity: Severity::High,
            });
        }
        package
    }

    #[test]
    fn situation_includes_totals_and_grid() {
        let block = situation_block(&package_with_anomalies(1));
        assert!(block.contains("1600.0 kWh"));
        assert!(block.contains("760.0 kg CO2"));
        assert!(block.contains("Grid Carbon Intensity: 0.35"));
        assert!(block.contains("energy_spike at facility_0: 33.3% above baseline (severity: high)"));
    }

    #[test]
    fn situation_caps_anomalies_at_five() {
        let block = situation_block(&package_with_anomalies(8));
        assert!(block.contains("facility_4"));
        assert!(!block.contains("facility_5"));
    }

    #[test]
    fn weather_line_only_when_present() {
        let mut package = package_with_anomalies(0);
        assert!(!situation_block(&package).contains("Weather Forecast"));
        package.external_context.weather = Some(WeatherForecast {
            condition: "clear".into(),
            temperature_c: 22.0,
        });
        assert!(situation_block(&package).contains("Weather Forecast: clear, Temp: 22.0°C"));
    }
}
