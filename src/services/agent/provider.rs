use serde::{Deserialize, Serialize};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use super::tools::ToolDefinition;
use super::AgentError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ProviderConfig {
    Gemini { api_key: String, model: String, temperature: f32 },
    Anthropic { api_key: String, model: String, temperature: f32 },
    OpenAI { api_key: String, model: String, temperature: f32 },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: "assistant".to_string(), content: content.into() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub finish_reason: String,
}

#[async_trait]
pub trait LLMProvider: Send + Sync {
    async fn generate(
        &self,
        messages: Vec<Message>,
        tools: Option<Vec<ToolDefinition>>,
    ) -> Result<AgentResponse, AgentError>;
}

/// Split leading system messages from the conversation.
fn split_system(messages: Vec<Message>) -> (Option<String>, Vec<Message>) {
    let (system, rest): (Vec<Message>, Vec<Message>) =
        messages.into_iter().partition(|m| m.role == "system");
    let system = if system.is_empty() {
        None
    } else {
        Some(system.into_iter().map(|m| m.content).collect::<Vec<_>>().join("\n\n"))
    };
    (system, rest)
}

async fn read_json(response: reqwest::Response, provider: &str) -> Result<serde_json::Value, AgentError> {
    if !response.status().is_success() {
        let status = response.status();
        let error_text = response.text().await?;
        return Err(AgentError::Provider(format!(
            "{} API error ({}): {}",
            provider, status, error_text
        )));
    }
    Ok(response.json().await?)
}

fn http_client(timeout: Duration) -> Result<reqwest::Client, AgentError> {
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}

pub struct GeminiProvider {
    api_key: String,
    model: String,
    temperature: f32,
    base_url: String,
    client: reqwest::Client,
}

impl GeminiProvider {
    pub fn new(api_key: String, model: String, temperature: f32) -> Self {
        Self {
            api_key,
            model,
            temperature,
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, AgentError> {
        self.client = http_client(timeout)?;
        Ok(self)
    }
}

#[async_trait]
impl LLMProvider for GeminiProvider {
    async fn generate(
        &self,
        messages: Vec<Message>,
        tools: Option<Vec<ToolDefinition>>,
    ) -> Result<AgentResponse, AgentError> {
        let (system, messages) = split_system(messages);

        // Gemini calls the assistant "model"
        let contents: Vec<serde_json::Value> = messages
            .iter()
            .map(|m| {
                let role = if m.role == "assistant" { "model" } else { "user" };
                serde_json::json!({
                    "role": role,
                    "parts": [{ "text": m.content }]
                })
            })
            .collect();

        let mut body = serde_json::json!({
            "contents": contents,
            "generationConfig": { "temperature": self.temperature },
        });

        if let Some(system) = system {
            body["systemInstruction"] = serde_json::json!({ "parts": [{ "text": system }] });
        }

        if let Some(tools) = tools.filter(|t| !t.is_empty()) {
            let declarations: Vec<serde_json::Value> = tools
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters
                    })
                })
                .collect();
            body["tools"] = serde_json::json!([{ "functionDeclarations": declarations }]);
        }

        let url = format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model);
        let response = self
            .client
            .post(&url)
            .query(&[("key", &self.api_key)])
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let response_json = read_json(response, "Gemini").await?;
        let candidate = &response_json["candidates"][0];
        let parts = candidate["content"]["parts"].as_array().cloned().unwrap_or_default();

        let content = parts
            .iter()
            .filter_map(|p| p["text"].as_str())
            .collect::<Vec<_>>()
            .join("");

        // Gemini does not assign call ids
        let tool_calls = parts
            .iter()
            .filter_map(|p| p.get("functionCall"))
            .map(|c| ToolCall {
                id: uuid::Uuid::new_v4().to_string(),
                name: c["name"].as_str().unwrap_or("").to_string(),
                arguments: c.get("args").cloned().unwrap_or(serde_json::json!({})),
            })
            .collect();

        let finish_reason = candidate["finishReason"]
            .as_str()
            .unwrap_or("STOP")
            .to_string();

        Ok(AgentResponse {
            content,
            tool_calls,
            finish_reason,
        })
    }
}

pub struct AnthropicProvider {
    api_key: String,
    model: String,
    temperature: f32,
    base_url: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new(api_key: String, model: String, temperature: f32) -> Self {
        Self {
            api_key,
            model,
            temperature,
            base_url: "https://api.anthropic.com".to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, AgentError> {
        self.client = http_client(timeout)?;
        Ok(self)
    }
}

#[async_trait]
impl LLMProvider for AnthropicProvider {
    async fn generate(
        &self,
        messages: Vec<Message>,
        tools: Option<Vec<ToolDefinition>>,
    ) -> Result<AgentResponse, AgentError> {
        let (system, messages) = split_system(messages);

        // Convert messages to Anthropic format
        let anthropic_messages: Vec<serde_json::Value> = messages
            .iter()
            .map(|m| {
                serde_json::json!({
                    "role": m.role,
                    "content": m.content
                })
            })
            .collect();

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": anthropic_messages,
            "max_tokens": 4096,
            "temperature": self.temperature,
        });

        if let Some(system) = system {
            body["system"] = serde_json::json!(system);
        }

        if let Some(tools) = tools.filter(|t| !t.is_empty()) {
            let tools: Vec<serde_json::Value> = tools
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "name": t.name,
                        "description": t.description,
                        "input_schema": t.parameters
                    })
                })
                .collect();
            body["tools"] = serde_json::json!(tools);
        }

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let response_json = read_json(response, "Anthropic").await?;

        // Parse response
        let content = response_json["content"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|c| c["text"].as_str())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        let tool_calls = if let Some(content_array) = response_json["content"].as_array() {
            content_array
                .iter()
                .filter(|c| c["type"] == "tool_use")
                .map(|c| ToolCall {
                    id: c["id"].as_str().unwrap_or("").to_string(),
                    name: c["name"].as_str().unwrap_or("").to_string(),
                    arguments: c["input"].clone(),
                })
                .collect()
        } else {
            vec![]
        };

        let finish_reason = response_json["stop_reason"]
            .as_str()
            .unwrap_or("end_turn")
            .to_string();

        Ok(AgentResponse {
            content,
            tool_calls,
            finish_reason,
        })
    }
}

pub struct OpenAIProvider {
    api_key: String,
    model: String,
    temperature: f32,
    base_url: String,
    client: reqwest::Client,
}

impl OpenAIProvider {
    pub fn new(api_key: String, model: String, temperature: f32) -> Self {
        Self {
            api_key,
            model,
            temperature,
            base_url: "https://api.openai.com".to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, AgentError> {
        self.client = http_client(timeout)?;
        Ok(self)
    }
}

#[async_trait]
impl LLMProvider for OpenAIProvider {
    async fn generate(
        &self,
        messages: Vec<Message>,
        tools: Option<Vec<ToolDefinition>>,
    ) -> Result<AgentResponse, AgentError> {
        let openai_messages: Vec<serde_json::Value> = messages
            .iter()
            .map(|m| {
                serde_json::json!({
                    "role": m.role,
                    "content": m.content
                })
            })
            .collect();

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": openai_messages,
            "temperature": self.temperature,
        });

        if let Some(tools) = tools.filter(|t| !t.is_empty()) {
            let tools: Vec<serde_json::Value> = tools
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters
                        }
                    })
                })
                .collect();
            body["tools"] = serde_json::json!(tools);
        }

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let response_json = read_json(response, "OpenAI").await?;

        let choice = &response_json["choices"][0];
        let message = &choice["message"];

        let content = message["content"].as_str().unwrap_or("").to_string();

        let tool_calls = if let Some(calls) = message["tool_calls"].as_array() {
            calls
                .iter()
                .map(|c| {
                    let function = &c["function"];
                    ToolCall {
                        id: c["id"].as_str().unwrap_or("").to_string(),
                        name: function["name"].as_str().unwrap_or("").to_string(),
                        arguments: serde_json::from_str(function["arguments"].as_str().unwrap_or("{}"))
                            .unwrap_or(serde_json::json!({})),
                    }
                })
                .collect()
        } else {
            vec![]
        };

        let finish_reason = choice["finish_reason"]
            .as_str()
            .unwrap_or("stop")
            .to_string();

        Ok(AgentResponse {
            content,
            tool_calls,
            finish_reason,
        })
    }
}

/// Build the configured backend; `timeout` bounds every model request.
pub fn create_provider(
    config: ProviderConfig,
    timeout: Duration,
) -> Result<Arc<dyn LLMProvider>, AgentError> {
    let provider: Arc<dyn LLMProvider> = match config {
        ProviderConfig::Gemini { api_key, model, temperature } => {
            Arc::new(GeminiProvider::new(api_key, model, temperature).with_timeout(timeout)?)
        }
        ProviderConfig::Anthropic { api_key, model, temperature } => {
            Arc::new(AnthropicProvider::new(api_key, model, temperature).with_timeout(timeout)?)
        }
        ProviderConfig::OpenAI { api_key, model, temperature } => {
            Arc::new(OpenAIProvider::new(api_key, model, temperature).with_timeout(timeout)?)
        }
    };
    Ok(provider)
}
