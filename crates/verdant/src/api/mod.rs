//! Retrying LLM client with soft error results.
//!
//! [`LlmClient`] wraps a [`ChatApi`] backend behind the retry policy in
//! [`retry`]: rate-limited attempts are repeated with a fixed delay up to the
//! configured maximum; any other failure returns immediately. Failures never
//! surface as `Err` — the caller gets an [`LlmResponse`] whose `error` field
//! is set, which downstream code treats as "no usable recommendations".

pub mod retry;

use crate::{ChatApi, ChatRequest, Message, ToolCall, ToolDef};
use retry::{RetryConfig, is_rate_limit_error};
use tracing::{debug, warn};

/// A model-issued tool invocation in uniform `{name, args}` form.
#[derive(Debug, Clone)]
pub struct ParsedToolCall {
    pub name: String,
    /// Parsed JSON arguments; `Null` when the raw argument string is not
    /// valid JSON (best-effort, never an error).
    pub args: serde_json::Value,
}

/// Result of a single `generate_with_tools` call.
///
/// A present `error` is a soft failure: `text` carries an `"Error: ..."`
/// string and `tool_calls` is empty. Callers must treat it as empty output.
#[derive(Debug, Default)]
pub struct LlmResponse {
    pub text: String,
    pub tool_calls: Vec<ParsedToolCall>,
    pub finish_reason: Option<String>,
    pub error: Option<String>,
}

impl LlmResponse {
    /// Whether this response is a soft error.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    fn from_error(message: String) -> Self {
        Self {
            text: format!("Error: {message}"),
            tool_calls: Vec::new(),
            finish_reason: None,
            error: Some(message),
        }
    }
}

/// Chat client with function-calling support and bounded rate-limit retry.
pub struct LlmClient {
    api: Box<dyn ChatApi>,
    model: String,
    max_tokens: u32,
    retry: RetryConfig,
}

impl LlmClient {
    /// Create a client over the given backend with default retry policy.
    pub fn new(api: Box<dyn ChatApi>, model: impl Into<String>) -> Self {
        Self {
            api,
            model: model.into(),
            max_tokens: 2048,
            retry: RetryConfig::default(),
        }
    }

    /// Override the retry policy.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Override the per-response token limit.
    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = max;
        self
    }

    /// Generate a response with tool-calling capability.
    ///
    /// Retries only when the backend error carries the rate-limit signature,
    /// waiting the configured fixed delay between attempts. On exhaustion or
    /// on any other error, returns a soft error response.
    pub async fn generate_with_tools(
        &self,
        prompt: &str,
        tools: &[ToolDef],
        temperature: f32,
    ) -> LlmResponse {
        let body = ChatRequest {
            model: self.model.clone(),
            messages: vec![Message::user(prompt)],
            max_tokens: self.max_tokens,
            temperature,
            tools: if tools.is_empty() {
                None
            } else {
                Some(tools.to_vec())
            },
        };

        let mut attempt = 1;
        loop {
            match self.api.chat(&body).await {
                Ok(completion) => {
                    let tool_calls = parse_tool_calls(&completion.tool_calls);
                    debug!(
                        "LLM output: {} chars text, {} tool call(s)",
                        completion.content.as_ref().map_or(0, |s| s.len()),
                        tool_calls.len()
                    );
                    return LlmResponse {
                        text: completion.content.unwrap_or_default(),
                        tool_calls,
                        finish_reason: completion.finish_reason,
                        error: None,
                    };
                }
                Err(e) => {
                    warn!(
                        "LLM call failed (attempt {attempt}/{}): {e}",
                        self.retry.max_attempts
                    );
                    if attempt < self.retry.max_attempts && is_rate_limit_error(&e) {
                        tokio::time::sleep(self.retry.rate_limit_delay).await;
                        attempt += 1;
                        continue;
                    }
                    return LlmResponse::from_error(e);
                }
            }
        }
    }
}

/// Parse raw tool calls into the uniform `{name, args}` list.
fn parse_tool_calls(calls: &[ToolCall]) -> Vec<ParsedToolCall> {
    calls
        .iter()
        .map(|call| ParsedToolCall {
            name: call.function.name.clone(),
            args: serde_json::from_str(&call.function.arguments)
                .unwrap_or(serde_json::Value::Null),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CallType, ChatCompletion, ChatFuture, FunctionCallData};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Scripted backend: pops one canned outcome per call.
    struct ScriptedApi {
        outcomes: Mutex<Vec<Result<ChatCompletion, String>>>,
        calls: Mutex<u32>,
    }

    impl ScriptedApi {
        fn new(mut outcomes: Vec<Result<ChatCompletion, String>>) -> Self {
            outcomes.reverse();
            Self {
                outcomes: Mutex::new(outcomes),
                calls: Mutex::new(0),
            }
        }

        fn call_count(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    impl ChatApi for ScriptedApi {
        fn chat<'a>(&'a self, _body: &'a ChatRequest) -> ChatFuture<'a> {
            *self.calls.lock().unwrap() += 1;
            let outcome = self
                .outcomes
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err("script exhausted".to_string()));
            Box::pin(async move { outcome })
        }
    }

    fn text_completion(text: &str) -> ChatCompletion {
        ChatCompletion {
            content: Some(text.to_string()),
            ..Default::default()
        }
    }

    fn fast_retry() -> RetryConfig {
        RetryConfig::with_attempts(3).with_delay(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn success_passes_through() {
        let api = ScriptedApi::new(vec![Ok(text_completion("three recommendations"))]);
        let client = LlmClient::new(Box::new(api), "test-model");
        let response = client.generate_with_tools("plan", &[], 0.7).await;
        assert!(!response.is_error());
        assert_eq!(response.text, "three recommendations");
    }

    #[tokio::test]
    async fn rate_limit_retries_then_succeeds() {
        let api = ScriptedApi::new(vec![
            Err("chat API HTTP 429: rate limited".to_string()),
            Err("Resource has been exhausted".to_string()),
            Ok(text_completion("recovered")),
        ]);
        let client = LlmClient::new(Box::new(api), "test-model").with_retry(fast_retry());
        let response = client.generate_with_tools("plan", &[], 0.7).await;
        assert!(!response.is_error());
        assert_eq!(response.text, "recovered");
    }

    #[tokio::test]
    async fn rate_limit_exhaustion_returns_soft_error() {
        let api = ScriptedApi::new(vec![
            Err("chat API HTTP 429: a".to_string()),
            Err("chat API HTTP 429: b".to_string()),
            Err("chat API HTTP 429: c".to_string()),
        ]);
        let client = LlmClient::new(Box::new(api), "test-model").with_retry(fast_retry());
        let response = client.generate_with_tools("plan", &[], 0.7).await;
        assert!(response.is_error());
        assert!(response.text.starts_with("Error: "));
        assert_eq!(response.error.as_deref(), Some("chat API HTTP 429: c"));
    }

    #[tokio::test]
    async fn non_rate_limit_error_fails_immediately() {
        let api = ScriptedApi::new(vec![
            Err("chat API HTTP 400: bad request".to_string()),
            Ok(text_completion("never reached")),
        ]);
        let client = LlmClient::new(Box::new(api), "test-model").with_retry(fast_retry());
        let response = client.generate_with_tools("plan", &[], 0.7).await;
        assert!(response.is_error());
        assert!(response.text.starts_with("Error: chat API HTTP 400"));
    }

    #[tokio::test]
    async fn non_rate_limit_error_makes_single_attempt() {
        // Shared call counter: the scripted API is owned by the client, so
        // count through a leaked shared reference.
        let api: &'static ScriptedApi = &*Box::leak(Box::new(ScriptedApi::new(vec![
            Err("failed to parse response".to_string()),
            Ok(text_completion("never reached")),
        ])));
        let client = LlmClient::new(Box::new(ApiRef(api)), "test-model").with_retry(fast_retry());
        let response = client.generate_with_tools("plan", &[], 0.7).await;
        assert!(response.is_error());
        assert_eq!(api.call_count(), 1);
    }

    /// Borrowing adapter so a test can keep a handle on the scripted API.
    struct ApiRef(&'static ScriptedApi);

    impl ChatApi for ApiRef {
        fn chat<'a>(&'a self, body: &'a ChatRequest) -> ChatFuture<'a> {
            self.0.chat(body)
        }
    }

    #[tokio::test]
    async fn tool_calls_parsed_into_uniform_list() {
        let completion = ChatCompletion {
            content: Some("".to_string()),
            tool_calls: vec![ToolCall {
                id: "call-1".to_string(),
                call_type: CallType::Function,
                function: FunctionCallData {
                    name: "emissions_calculator".to_string(),
                    arguments: r#"{"energy_kwh": 120.0}"#.to_string(),
                },
            }],
            ..Default::default()
        };
        let api = ScriptedApi::new(vec![Ok(completion)]);
        let client = LlmClient::new(Box::new(api), "test-model");
        let response = client.generate_with_tools("plan", &[], 0.7).await;
        assert_eq!(response.tool_calls.len(), 1);
        assert_eq!(response.tool_calls[0].name, "emissions_calculator");
        assert_eq!(response.tool_calls[0].args["energy_kwh"], 120.0);
    }

    #[test]
    fn malformed_tool_args_parse_to_null() {
        let calls = vec![ToolCall {
            id: "call-1".to_string(),
            call_type: CallType::Function,
            function: FunctionCallData {
                name: "emissions_calculator".to_string(),
                arguments: "not json".to_string(),
            },
        }];
        let parsed = parse_tool_calls(&calls);
        assert_eq!(parsed[0].args, serde_json::Value::Null);
    }
}
