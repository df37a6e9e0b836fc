use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};

use listing_core::config::{LlmConfig, LlmProvider};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const OLLAMA_BASE_URL: &str = "http://localhost:11434/v1";

/// A single function the model is forced to call.
#[derive(Clone, Debug, PartialEq)]
pub struct FunctionSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Value,
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String>;

    /// Returns the parsed arguments of the forced function call.
    async fn call_function(&self, system: &str, prompt: &str, function: &FunctionSpec)
        -> Result<Value>;
}

/// Chat-completions client for OpenAI and OpenAI-compatible servers (Ollama).
pub struct OpenAiCompatibleClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<SecretString>,
    model: String,
}

impl OpenAiCompatibleClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<SecretString>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build LLM HTTP client")?;
        let base_url = base_url.into();
        Ok(Self {
            http,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key,
            model: model.into(),
        })
    }

    /// `None` when the configured provider is the offline rule set.
    pub fn from_config(config: &LlmConfig) -> Result<Option<Self>> {
        let default_base = match config.provider {
            LlmProvider::Rules => return Ok(None),
            LlmProvider::OpenAi => OPENAI_BASE_URL,
            LlmProvider::Ollama => OLLAMA_BASE_URL,
        };
        let base_url = config.base_url.clone().unwrap_or_else(|| default_base.to_string());
        Self::new(
            base_url,
            config.api_key.clone(),
            config.model.clone(),
            Duration::from_secs(config.timeout_secs),
        )
        .map(Some)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn post(&self, body: Value) -> Result<ChatResponse> {
        let mut request = self.http.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.expose_secret());
        }

        let response = request.send().await.context("LLM request failed")?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(anyhow!("LLM endpoint returned {status}: {}", truncate(&detail, 300)));
        }
        response.json::<ChatResponse>().await.context("LLM response was not valid JSON")
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatibleClient {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String> {
        let body = json!({
            "model": self.model,
            "temperature": 0,
            "messages": messages(system, prompt),
        });
        let response = self.post(body).await?;
        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| anyhow!("LLM response carried no content"))
    }

    async fn call_function(
        &self,
        system: &str,
        prompt: &str,
        function: &FunctionSpec,
    ) -> Result<Value> {
        let response = self.post(function_call_body(&self.model, system, prompt, function)).await?;
        function_arguments(response, function.name)
    }
}

fn messages(system: &str, prompt: &str) -> Value {
    json!([
        { "role": "system", "content": system },
        { "role": "user", "content": prompt },
    ])
}

pub(crate) fn function_call_body(
    model: &str,
    system: &str,
    prompt: &str,
    function: &FunctionSpec,
) -> Value {
    json!({
        "model": model,
        "temperature": 0,
        "messages": messages(system, prompt),
        "tools": [{
            "type": "function",
            "function": {
                "name": function.name,
                "description": function.description,
                "parameters": function.parameters,
            }
        }],
        "tool_choice": { "type": "function", "function": { "name": function.name } },
    })
}

fn function_arguments(response: ChatResponse, name: &str) -> Result<Value> {
    let call = response
        .choices
        .into_iter()
        .flat_map(|choice| choice.message.tool_calls.unwrap_or_default())
        .find(|call| call.function.name == name)
        .ok_or_else(|| anyhow!("LLM did not call `{name}`"))?;
    serde_json::from_str(&call.function.arguments)
        .with_context(|| format!("arguments of `{name}` were not valid JSON"))
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
    tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ToolCall {
    function: ToolFunction,
}

#[derive(Debug, Deserialize)]
struct ToolFunction {
    name: String,
    arguments: String,
}
