//! Prompt assembly under a token budget.

pub mod budget;

pub use budget::{ContextBuilder, HistoryEntry, TokenCounter};
