//! Token-budgeted prompt assembly.
//!
//! [`ContextBuilder`] fills a fixed token ceiling in priority order: the
//! system prompt (hard error if it alone would eat more than 30% of the
//! ceiling), the serialized current data (truncated to half of whatever
//! remains), then as much history as still fits — walked newest-first,
//! emitted oldest-first.
//!
//! Token counts are estimates from a chars-per-token ratio. The ratio is
//! deliberately the only counting strategy: it keeps budgeting deterministic
//! and reproducible without a tokenizer dependency, at the cost of a few
//! percent of slack against the real model tokenizer.

use serde_json::Value;

/// Characters per token used by the default estimator.
pub const DEFAULT_CHARS_PER_TOKEN: f64 = 4.0;

/// Default context window budget in tokens.
pub const DEFAULT_CONTEXT_WINDOW: usize = 8_000;

/// Marker appended to token-truncated blocks.
pub const TRUNCATION_MARKER: &str = "\n... (truncated)";

/// Share of the total ceiling the system prompt may consume.
const SYSTEM_PROMPT_SHARE: f64 = 0.30;

/// Share of the *remaining* budget the current-data block may consume.
const CURRENT_DATA_SHARE: f64 = 0.50;

// ── Token counting ─────────────────────────────────────────────────

/// Estimating token counter based on a chars-per-token ratio.
#[derive(Debug, Clone)]
pub struct TokenCounter {
    chars_per_token: f64,
}

impl Default for TokenCounter {
    fn default() -> Self {
        Self {
            chars_per_token: DEFAULT_CHARS_PER_TOKEN,
        }
    }
}

impl TokenCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a custom chars-per-token ratio (must be positive).
    pub fn with_ratio(ratio: f64) -> Self {
        Self {
            chars_per_token: if ratio > 0.0 {
                ratio
            } else {
                DEFAULT_CHARS_PER_TOKEN
            },
        }
    }

    /// Estimated token count for a text.
    pub fn count(&self, text: &str) -> usize {
        (text.len() as f64 / self.chars_per_token).ceil() as usize
    }

    /// Cut a text to at most `max_tokens` estimated tokens (on a char
    /// boundary), appending [`TRUNCATION_MARKER`]. The marker's own tokens
    /// are budgeted so the result stays within `max_tokens`.
    pub fn truncate_to_tokens(&self, text: &str, max_tokens: usize) -> String {
        if self.count(text) <= max_tokens {
            return text.to_string();
        }
        let marker_tokens = self.count(TRUNCATION_MARKER);
        let keep_tokens = max_tokens.saturating_sub(marker_tokens);
        let mut keep_chars = (keep_tokens as f64 * self.chars_per_token) as usize;
        while keep_chars > 0 && !text.is_char_boundary(keep_chars) {
            keep_chars -= 1;
        }
        format!("{}{TRUNCATION_MARKER}", text.get(..keep_chars).unwrap_or(""))
    }
}

// ── History ────────────────────────────────────────────────────────

/// One prior-cycle entry included in the history block.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub timestamp: String,
    pub summary: String,
}

impl HistoryEntry {
    pub fn new(timestamp: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            timestamp: timestamp.into(),
            summary: summary.into(),
        }
    }

    fn to_line(&self) -> String {
        format!("- {}: {}", self.timestamp, self.summary)
    }
}

// ── Builder ────────────────────────────────────────────────────────

/// Assembles prompts that fit a fixed token ceiling.
#[derive(Debug, Clone)]
pub struct ContextBuilder {
    max_tokens: usize,
    counter: TokenCounter,
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_CONTEXT_WINDOW)
    }
}

impl ContextBuilder {
    /// Create a builder with the given token ceiling.
    pub fn new(max_tokens: usize) -> Self {
        Self {
            max_tokens,
            counter: TokenCounter::new(),
        }
    }

    /// Override the estimator's chars-per-token ratio.
    pub fn with_chars_per_token(mut self, ratio: f64) -> Self {
        self.counter = TokenCounter::with_ratio(ratio);
        self
    }

    /// The configured token ceiling.
    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    /// Build a prompt context within the token ceiling.
    ///
    /// Inclusion order, each step deducting from the remaining budget:
    /// 1. `system_prompt` — error if it alone exceeds 30% of the ceiling.
    /// 2. `current_data`, pretty-serialized — token-truncated to 50% of the
    ///    remaining budget when it overflows.
    /// 3. History — whole if it fits, otherwise rebuilt newest-first until
    ///    the next entry would overflow (output restored to oldest-first).
    pub fn build_context(
        &self,
        system_prompt: &str,
        current_data: &Value,
        history: &[HistoryEntry],
        max_history_items: usize,
    ) -> Result<String, String> {
        let mut parts: Vec<String> = Vec::new();
        let mut remaining = self.max_tokens;

        // 1. System prompt.
        let system_tokens = self.counter.count(system_prompt);
        if system_tokens as f64 > self.max_tokens as f64 * SYSTEM_PROMPT_SHARE {
            return Err(format!(
                "system prompt too long: {system_tokens} tokens exceeds {:.0}% of the {} token ceiling",
                SYSTEM_PROMPT_SHARE * 100.0,
                self.max_tokens
            ));
        }
        parts.push(system_prompt.to_string());
        remaining = remaining.saturating_sub(system_tokens);

        // 2. Current data.
        let mut data_str = serde_json::to_string_pretty(current_data)
            .map_err(|e| format!("failed to serialize current data: {e}"))?;
        let data_budget = (remaining as f64 * CURRENT_DATA_SHARE) as usize;
        if self.counter.count(&data_str) > data_budget {
            data_str = self.counter.truncate_to_tokens(&data_str, data_budget);
        }
        let data_tokens = self.counter.count(&data_str);
        parts.push(data_str);
        remaining = remaining.saturating_sub(data_tokens);

        // 3. History, most recent `max_history_items` entries.
        if !history.is_empty() {
            let start = history.len().saturating_sub(max_history_items);
            let recent = &history[start..];
            let formatted = format_history(recent);
            if self.counter.count(&formatted) <= remaining {
                parts.push(formatted);
            } else {
                parts.push(self.fit_history(recent, remaining));
            }
        }

        Ok(parts.join("\n\n"))
    }

    /// Include as many recent history entries as fit, newest-first walk,
    /// oldest-first output.
    fn fit_history(&self, history: &[HistoryEntry], max_tokens: usize) -> String {
        let header = "## Recent History";
        let mut lines: Vec<String> = Vec::new();
        let mut used = self.counter.count(header);

        for entry in history.iter().rev() {
            let line = entry.to_line();
            let line_tokens = self.counter.count(&line);
            if used + line_tokens > max_tokens {
                break;
            }
            lines.insert(0, line);
            used += line_tokens;
        }

        format!("{header}\n{}", lines.join("\n"))
    }
}

/// Format a full history block with numbered entries.
fn format_history(entries: &[HistoryEntry]) -> String {
    let mut formatted = vec!["## Historical Context".to_string()];
    for (i, entry) in entries.iter().enumerate() {
        formatted.push(format!(
            "### Entry {}\nTimestamp: {}\nSummary: {}",
            i + 1,
            entry.timestamp,
            entry.summary
        ));
    }
    formatted.join("\n")
}
