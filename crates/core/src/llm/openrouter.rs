use crate::config::{env_parse, Settings};
use crate::llm::error::LlmDiagnosticsError;
use crate::llm::json;
use crate::llm::{ChatMessage, LlmClient, Provider, ToolExecutor, ToolSpec};
use anyhow::Context;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
const DEFAULT_MODEL: &str = "deepseek/deepseek-chat";
const DEFAULT_MAX_TOKENS: u32 = 4096;
const DEFAULT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_MAX_ITERATIONS: u32 = 5;

const APP_REFERER: &str = "https://github.com/fadvisor/fadvisor";
const APP_TITLE: &str = "FAdvisor";

/// Chat-completions client for OpenRouter and other OpenAI-compatible endpoints.
#[derive(Debug, Clone)]
pub struct OpenRouterClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    max_iterations: u32,
}

impl OpenRouterClient {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let api_key = settings.require_openrouter_api_key()?.to_string();
        let base_url = settings
            .llm_base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let model = settings
            .default_model
            .clone()
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let max_tokens = env_parse::<u32>("LLM_MAX_TOKENS").unwrap_or(DEFAULT_MAX_TOKENS);
        let timeout_secs = env_parse::<u64>("LLM_TIMEOUT_SECS").unwrap_or(DEFAULT_TIMEOUT_SECS);
        let max_iterations = env_parse::<u32>("MAX_ITERATIONS").unwrap_or(DEFAULT_MAX_ITERATIONS);

        Self::new(api_key, base_url, model, max_tokens, Duration::from_secs(timeout_secs))
            .map(|c| c.with_max_iterations(max_iterations))
    }

    pub fn new(
        api_key: String,
        base_url: String,
        model: String,
        max_tokens: u32,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build reqwest client")?;

        Ok(Self {
            http,
            api_key,
            base_url,
            model,
            max_tokens,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        })
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_max_iterations(mut self, n: u32) -> Self {
        self.max_iterations = n.max(1);
        self
    }

    async fn create_completion(
        &self,
        req: &CompletionRequest<'_>,
    ) -> anyhow::Result<(Value, CompletionResponse)> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.api_key))?,
        );
        headers.insert("HTTP-Referer", HeaderValue::from_static(APP_REFERER));
        headers.insert("X-Title", HeaderValue::from_static(APP_TITLE));

        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let res = self
            .http
            .post(url)
            .headers(headers)
            .json(req)
            .send()
            .await
            .context("chat completion request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read chat completion response body")?;
        if !status.is_success() {
            let raw_response_json = serde_json::from_str::<Value>(&text).ok();
            return Err(LlmDiagnosticsError {
                provider: Provider::OpenRouter,
                stage: "http",
                detail: format!("status={status}"),
                raw_output: Some(text),
                raw_response_json,
            }
            .into());
        }

        let raw_json = serde_json::from_str::<Value>(&text)
            .with_context(|| format!("failed to parse chat completion JSON: {text}"))?;
        let parsed = serde_json::from_value::<CompletionResponse>(raw_json.clone())
            .context("failed to decode chat completion response")?;
        Ok((raw_json, parsed))
    }

    fn wire_tools(tools: &[ToolSpec]) -> Option<Vec<WireTool<'_>>> {
        if tools.is_empty() {
            return None;
        }
        Some(
            tools
                .iter()
                .map(|t| WireTool {
                    kind: "function",
                    function: t,
                })
                .collect(),
        )
    }
}

#[async_trait::async_trait]
impl LlmClient for OpenRouterClient {
    fn provider(&self) -> Provider {
        Provider::OpenRouter
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn respond(
        &self,
        conversation: &[ChatMessage],
        tools: &[ToolSpec],
        executor: &dyn ToolExecutor,
    ) -> anyhow::Result<String> {
        let mut messages: Vec<WireMessage> = conversation.iter().map(WireMessage::from).collect();
        let wire_tools = Self::wire_tools(tools);

        for iteration in 1..=self.max_iterations {
            let req = CompletionRequest {
                model: &self.model,
                max_tokens: self.max_tokens,
                messages: &messages,
                tools: wire_tools.as_deref(),
            };
            let (raw_json, res) = self.create_completion(&req).await?;

            let Some(choice) = res.choices.into_iter().next() else {
                return Err(LlmDiagnosticsError {
                    raw_response_json: Some(raw_json),
                    ..LlmDiagnosticsError::new(Provider::OpenRouter, "decode", "response has no choices")
                }
                .into());
            };

            let calls = choice.message.tool_calls.clone().unwrap_or_default();
            if calls.is_empty() {
                return Ok(choice.message.content.unwrap_or_default());
            }

            tracing::debug!(iteration, calls = calls.len(), "model requested tool calls");
            messages.push(choice.message);

            for call in calls {
                let result = match json::parse_tool_arguments(&call.function.arguments) {
                    Ok(args) => executor.execute(&call.function.name, args).await,
                    Err(err) => {
                        tracing::warn!(tool = %call.function.name, error = %err, "unparseable tool arguments");
                        serde_json::json!({ "error": format!("{err:#}") })
                    }
                };
                messages.push(WireMessage {
                    role: "tool".to_string(),
                    content: Some(result.to_string()),
                    tool_calls: None,
                    tool_call_id: Some(call.id),
                });
            }
        }

        Err(LlmDiagnosticsError::new(
            Provider::OpenRouter,
            "tool_loop",
            format!("no final answer after {} iterations", self.max_iterations),
        )
        .into())
    }
}

#[derive(Debug, Clone, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: &'a [WireMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [WireTool<'a>]>,
}

#[derive(Debug, Clone, Serialize)]
struct WireTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: &'a ToolSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl From<&ChatMessage> for WireMessage {
    fn from(m: &ChatMessage) -> Self {
        let role = match m.role {
            crate::llm::Role::System => "system",
            crate::llm::Role::User => "user",
            crate::llm::Role::Assistant => "assistant",
        };
        Self {
            role: role.to_string(),
            content: Some(m.content.clone()),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ToolCall {
    id: String,
    #[serde(rename = "type", default = "function_kind")]
    kind: String,
    function: FunctionCall,
}

fn function_kind() -> String {
    "function".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Clone, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Clone, Deserialize)]
struct Choice {
    message: WireMessage,
}
