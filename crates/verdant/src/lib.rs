//! Sustainability planning pipeline for simulated facility operations.
//!
//! `verdant` runs a two-agent cycle over operational telemetry: a
//! [`DataScout`](agent::scout::DataScout) summarizes facility readings into a
//! [`ContextPackage`](domain::ContextPackage) (anomalies, totals, external
//! signals), and an [`EcoPlanner`](agent::planner::EcoPlanner) turns that
//! package into a ranked [`Plan`](domain::Plan) of recommendations through an
//! LLM with function-calling — degrading to a deterministic rule-based
//! generator whenever the model yields nothing usable. The
//! [`Orchestrator`](agent::orchestrator::Orchestrator) sequences the two
//! phases and persists every artifact to the sqlite-backed
//! [`MemoryBank`](memory::MemoryBank).
//!
//! # Getting started
//!
//! ```ignore
//! use std::sync::Arc;
//! use verdant::agent::orchestrator::Orchestrator;
//! use verdant::agent::{planner::EcoPlanner, scout::DataScout};
//! use verdant::api::LlmClient;
//! use verdant::config::Config;
//! use verdant::memory::MemoryBank;
//! use verdant::tools::default_tool_set;
//! use verdant::ChatClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), String> {
//!     let config = Config::from_env();
//!     let memory = Arc::new(MemoryBank::open(&config.memory_path)?);
//!     let tools = Arc::new(default_tool_set(&config));
//!
//!     let api = ChatClient::new(&config.api_key, &config.api_url)?;
//!     let llm = LlmClient::new(Box::new(api), &config.model);
//!
//!     let orchestrator = Orchestrator::new(Arc::clone(&memory))
//!         .with_agent(Arc::new(DataScout::new(
//!             Arc::clone(&memory),
//!             Arc::clone(&tools),
//!             &config,
//!         )))
//!         .with_agent(Arc::new(EcoPlanner::new(llm, memory, tools, &config)));
//!
//!     let result = orchestrator.run_cycle(None).await;
//!     println!("{}", serde_json::to_string_pretty(&result).unwrap());
//!     Ok(())
//! }
//! ```
//!
//! # Where to find things
//!
//! - **Data model:** [`domain`] — context packages, anomalies,
//!   recommendations, plans.
//! - **LLM boundary:** the wire types and [`ChatClient`] in this module, the
//!   retry/soft-error wrapper in [`api`].
//! - **Prompt budgeting:** [`context::budget::ContextBuilder`] keeps prompts
//!   inside the model's context window.
//! - **Tools:** the [`Tool`](tools::core::Tool) trait and
//!   [`ToolSet`](tools::core::ToolSet) registry, with the concrete
//!   operational tools in [`tools::common`].
//! - **Agents:** [`agent::scout`], [`agent::planner`],
//!   [`agent::orchestrator`].
//! - **Persistence:** [`memory::MemoryBank`].
//!
//! # Design principles
//!
//! 1. **The plan is never empty.** Every degradation path — API errors, rate
//!    limit exhaustion, unparseable output — lands in the deterministic
//!    fallback generator, so a cycle always produces recommendations.
//! 2. **Tools are the unit of capability.** Emissions math, sensor
//!    simulation, and route estimation are [`Tool`](tools::core::Tool)
//!    implementors callable both by agents and by the model.
//! 3. **Context is a budget.** Prompt assembly deducts the system prompt,
//!    current data, and history from a fixed token ceiling in that order.
//! 4. **Soft failures at the LLM boundary.** The client returns error-shaped
//!    results instead of raising; only the orchestrator converts agent
//!    errors into a failed cycle.

pub mod agent;
pub mod api;
pub mod config;
pub mod context;
pub mod domain;
pub mod memory;
pub mod tools;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

// ── Schema generation ──────────────────────────────────────────────

/// Generate a JSON Schema `serde_json::Value` from a type that implements
/// `schemars::JsonSchema`. This is the bridge between strong Rust types
/// and the `serde_json::Value` that the function-calling API expects.
///
/// # Example
///
/// ```
/// use verdant::json_schema_for;
/// use schemars::JsonSchema;
/// use serde::Deserialize;
///
/// #[derive(Deserialize, JsonSchema)]
/// struct EmissionsArgs {
///     energy_kwh: f64,
/// }
///
/// let schema = json_schema_for::<EmissionsArgs>();
/// assert_eq!(schema["type"], "object");
/// ```
pub fn json_schema_for<T: JsonSchema>() -> serde_json::Value {
    let schema = schemars::schema_for!(T);
    serde_json::to_value(schema)
        .unwrap_or_else(|_| serde_json::json!({"type": "object", "properties": {}}))
}

// ── Request types ──────────────────────────────────────────────────

/// Chat completion request body. Unused optional fields are omitted from
/// serialization.
#[derive(Serialize, Debug, Default)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "is_zero_u32")]
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "is_zero_f32")]
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDef>>,
}

fn is_zero_u32(v: &u32) -> bool {
    *v == 0
}
fn is_zero_f32(v: &f32) -> bool {
    *v == 0.0
}

// ── Message types ──────────────────────────────────────────────────

/// Role of a message in the conversation.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

/// A message in the conversation.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Message {
    pub role: MessageRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

// ── Tool types ─────────────────────────────────────────────────────

/// The type of a tool definition. Currently always `Function`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum ToolType {
    #[serde(rename = "function")]
    Function,
}

/// Tool definition sent to the API (OpenAI function-calling format).
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ToolDef {
    #[serde(rename = "type")]
    pub tool_type: ToolType,
    pub function: FunctionDef,
}

impl ToolDef {
    /// Create a function-calling tool definition.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            tool_type: ToolType::Function,
            function: FunctionDef {
                name: name.into(),
                description: description.into(),
                parameters,
            },
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct FunctionDef {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// The type of a tool call. Currently always `Function`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum CallType {
    #[serde(rename = "function")]
    Function,
}

/// A tool call returned by the model.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: CallType,
    pub function: FunctionCallData,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct FunctionCallData {
    pub name: String,
    pub arguments: String,
}

// ── Response types ─────────────────────────────────────────────────

/// Raw API response (internal deserialization target).
#[derive(Deserialize, Debug)]
struct RawChatResponse {
    choices: Option<Vec<RawChoice>>,
    error: Option<ApiErrorResponse>,
    #[serde(default)]
    usage: Option<UsageInfo>,
}

#[derive(Deserialize, Debug)]
struct RawChoice {
    message: RawResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct RawResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Deserialize, Debug)]
struct ApiErrorResponse {
    message: String,
}

/// Clean return type from [`ChatClient::chat`].
#[derive(Debug, Default)]
pub struct ChatCompletion {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Option<UsageInfo>,
    pub finish_reason: Option<String>,
}

/// Token usage statistics.
#[derive(Deserialize, Debug, Clone)]
pub struct UsageInfo {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

// ── ChatApi seam ───────────────────────────────────────────────────

/// Boxed future returned by [`ChatApi::chat`].
///
/// Type alias to keep trait signatures and implementations readable.
pub type ChatFuture<'a> = Pin<Box<dyn Future<Output = Result<ChatCompletion, String>> + Send + 'a>>;

/// The chat-completion boundary as a dyn-compatible trait.
///
/// [`ChatClient`] is the production implementation; tests substitute
/// scripted fakes, and [`NullChatApi`] stands in when no API key is
/// configured so the pipeline degrades to the rule-based fallback.
pub trait ChatApi: Send + Sync {
    /// Send a chat completion request.
    ///
    /// The returned future borrows both the client and the request body.
    fn chat<'a>(&'a self, body: &'a ChatRequest) -> ChatFuture<'a>;
}

/// A chat backend that always fails. Used when no API key is configured;
/// the resulting soft error routes every cycle to the fallback generator.
pub struct NullChatApi;

impl ChatApi for NullChatApi {
    fn chat<'a>(&'a self, _body: &'a ChatRequest) -> ChatFuture<'a> {
        Box::pin(async { Err("LLM not configured (missing API key)".to_string()) })
    }
}

// ── Client ─────────────────────────────────────────────────────────

/// Async HTTP client for an OpenAI-compatible chat completions API.
pub struct ChatClient {
    client: reqwest::Client,
    api_key: String,
    url: String,
}

impl ChatClient {
    /// Create a new client with the given API key and endpoint URL.
    pub fn new(api_key: impl Into<String>, url: impl Into<String>) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .user_agent("verdant/0.2")
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| format!("failed to build HTTP client: {e}"))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            url: url.into(),
        })
    }

    async fn chat_inner(&self, body: &ChatRequest) -> Result<ChatCompletion, String> {
        let tool_count = body.tools.as_ref().map_or(0, |t| t.len());
        debug!(
            "LLM request: model={}, messages={}, tools={}, max_tokens={}, temp={}",
            body.model,
            body.messages.len(),
            tool_count,
            body.max_tokens,
            body.temperature,
        );
        trace!(
            "Request payload size: {} bytes",
            serde_json::to_string(body).map_or(0, |s| s.len())
        );

        let start = Instant::now();

        let resp = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(body)
            .send()
            .await
            .map_err(|e| format!("request failed: {e}"))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| format!("failed to read response: {e}"))?;

        debug!(
            "LLM response: HTTP {} in {:.1}s ({} bytes)",
            status,
            start.elapsed().as_secs_f64(),
            text.len()
        );

        if !status.is_success() {
            return Err(format!("chat API HTTP {status}: {text}"));
        }

        let parsed: RawChatResponse =
            serde_json::from_str(&text).map_err(|e| format!("failed to parse response: {e}"))?;

        if let Some(err) = parsed.error {
            return Err(format!("chat API error: {}", err.message));
        }

        if let Some(ref usage) = parsed.usage {
            debug!(
                "Token usage: prompt={}, completion={}, total={}",
                usage.prompt_tokens.unwrap_or(0),
                usage.completion_tokens.unwrap_or(0),
                usage.total_tokens.unwrap_or(0),
            );
        }

        match parsed.choices.and_then(|c| c.into_iter().next()) {
            Some(c) => Ok(ChatCompletion {
                content: c.message.content,
                tool_calls: c.message.tool_calls.unwrap_or_default(),
                usage: parsed.usage,
                finish_reason: c.finish_reason,
            }),
            None => Ok(ChatCompletion {
                usage: parsed.usage,
                ..Default::default()
            }),
        }
    }
}

impl ChatApi for ChatClient {
    fn chat<'a>(&'a self, body: &'a ChatRequest) -> ChatFuture<'a> {
        Box::pin(self.chat_inner(body))
    }
}
