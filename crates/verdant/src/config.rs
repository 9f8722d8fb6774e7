//! Pipeline configuration with sensible defaults and environment overrides.
//!
//! [`Config::from_env`] reads `VERDANT_*` variables on top of the defaults;
//! anything unset keeps its default. The API key is the only setting without
//! a usable default — when it is empty the pipeline runs with a null LLM
//! backend and every plan comes from the rule-based generator.

use std::time::Duration;

/// Default chat-completions endpoint (OpenAI-compatible).
pub const DEFAULT_API_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Default model for planning calls.
pub const DEFAULT_MODEL: &str = "google/gemini-2.5-flash";

/// Central configuration for the planning pipeline.
#[derive(Debug, Clone)]
pub struct Config {
    /// API key for the chat-completions endpoint. Empty disables the LLM.
    pub api_key: String,
    /// Chat-completions endpoint URL.
    pub api_url: String,
    /// Model identifier.
    pub model: String,
    /// Sampling temperature for planning calls. Default: `0.7`.
    pub temperature: f32,
    /// Maximum tokens per LLM response. Default: `2048`.
    pub max_tokens: u32,
    /// Context window budget for prompt assembly, in tokens. Default: `8000`.
    pub context_window_tokens: usize,
    /// Maximum LLM attempts per call (first try included). Default: `3`.
    pub llm_max_attempts: u32,
    /// Fixed delay between rate-limited attempts. Default: `2s`.
    pub rate_limit_delay: Duration,
    /// Path of the sqlite memory bank. Default: `./data/verdant.db`.
    pub memory_path: String,
    /// Grid electricity emission factor, kg CO2 per kWh. Default: `0.475`.
    pub emission_factor_electricity: f64,
    /// Diesel emission factor, kg CO2 per liter. Default: `2.68`.
    pub emission_factor_diesel: f64,
    /// Gasoline emission factor, kg CO2 per liter. Default: `2.31`.
    pub emission_factor_gasoline: f64,
    /// Maximum recommendations retained in a plan. Default: `10`.
    pub max_recommendations: usize,
    /// Register the weather tool. Default: `false`.
    pub enable_weather: bool,
    /// Register the route optimizer tool. Default: `true`.
    pub enable_route_optimization: bool,
    /// Seed for the deterministic sensor simulator. Default: `7`.
    pub simulator_seed: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_url: DEFAULT_API_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.7,
            max_tokens: 2048,
            context_window_tokens: 8000,
            llm_max_attempts: 3,
            rate_limit_delay: Duration::from_secs_f64(2.0),
            memory_path: "./data/verdant.db".to_string(),
            emission_factor_electricity: 0.475,
            emission_factor_diesel: 2.68,
            emission_factor_gasoline: 2.31,
            max_recommendations: 10,
            enable_weather: false,
            enable_route_optimization: true,
            simulator_seed: 7,
        }
    }
}

impl Config {
    /// Build a config from defaults plus `VERDANT_*` environment overrides.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(key) = std::env::var("VERDANT_API_KEY") {
            config.api_key = key;
        }
        if let Ok(url) = std::env::var("VERDANT_API_URL") {
            config.api_url = url;
        }
        if let Ok(model) = std::env::var("VERDANT_MODEL") {
            config.model = model;
        }
        if let Some(attempts) = env_parse::<u32>("VERDANT_MAX_RETRIES") {
            config.llm_max_attempts = attempts;
        }
        if let Some(delay) = env_parse::<f64>("VERDANT_RATE_LIMIT_DELAY") {
            config.rate_limit_delay = Duration::from_secs_f64(delay);
        }
        if let Ok(path) = std::env::var("VERDANT_MEMORY_PATH") {
            config.memory_path = path;
        }
        if let Some(max) = env_parse::<usize>("VERDANT_MAX_RECOMMENDATIONS") {
            config.max_recommendations = max;
        }
        if let Some(seed) = env_parse::<u64>("VERDANT_SIM_SEED") {
            config.simulator_seed = seed;
        }
        config.enable_weather = env_flag("VERDANT_ENABLE_WEATHER", config.enable_weather);
        config.enable_route_optimization = env_flag(
            "VERDANT_ENABLE_ROUTE_OPTIMIZATION",
            config.enable_route_optimization,
        );
        config
    }

    /// Whether an LLM backend is configured.
    pub fn llm_configured(&self) -> bool {
        !self.api_key.is_empty()
    }
}

/// Parse an environment variable, ignoring unset or malformed values.
fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

/// Read a boolean environment flag. Truthy values: `1`, `true`, `yes`, `on`.
fn env_flag(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(value) => matches!(
            value.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_operational_constants() {
        let config = Config::default();
        assert_eq!(config.llm_max_attempts, 3);
        assert_eq!(config.rate_limit_delay, Duration::from_secs(2));
        assert_eq!(config.emission_factor_electricity, 0.475);
        assert_eq!(config.emission_factor_diesel, 2.68);
        assert_eq!(config.emission_factor_gasoline, 2.31);
        assert_eq!(config.max_recommendations, 10);
        assert!(!config.llm_configured());
    }

    #[test]
    fn env_flag_truthy_values() {
        // Unset: default wins.
        assert!(env_flag("VERDANT_TEST_FLAG_UNSET", true));
        assert!(!env_flag("VERDANT_TEST_FLAG_UNSET", false));
    }
}
