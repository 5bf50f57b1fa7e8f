//! Chat-completion client for OpenAI-compatible endpoints
//!
//! One `ChatClient` per role (classifier, judge, generator), each with its own
//! sampling temperature. Structured replies are requested in JSON mode and
//! decoded leniently, since models still wrap JSON in fences or prose.

use crate::agent::collaborators::{Classifier, Generator, Judge, RouteDecision, Verdict};
use crate::agent::state::Route;
use crate::config::LlmConfig;
use crate::errors::{AppError, Result};
use crate::metrics;
use async_trait::async_trait;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::OnceLock;
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    #[serde(default)]
    content: Option<String>,
}

/// LLM client bound to one role
#[derive(Clone)]
pub struct ChatClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: usize,
    role: &'static str,
}

impl ChatClient {
    /// Build a client for `role` (used as the provider label in errors and metrics)
    pub fn new(config: &LlmConfig, role: &'static str, temperature: f32) -> Result<Self> {
        let api_key = config.api_key.clone().ok_or_else(|| AppError::Configuration {
            message: "llm.api_key (or GOOGLE_API_KEY) is required".to_string(),
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key,
            model: config.model.clone(),
            temperature,
            max_tokens: config.max_tokens,
            role,
        })
    }

    /// Classifier, judge and generator clients with their configured temperatures
    pub fn for_roles(config: &LlmConfig) -> Result<(Self, Self, Self)> {
        Ok((
            Self::new(config, "classifier", config.classifier_temperature)?,
            Self::new(config, "judge", config.judge_temperature)?,
            Self::new(config, "generator", config.generator_temperature)?,
        ))
    }

    /// Send one completion request and return the reply text
    async fn complete(&self, system: Option<&str>, user: &str, json_mode: bool) -> Result<String> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system {
            messages.push(ChatMessage { role: "system", content: system });
        }
        messages.push(ChatMessage { role: "user", content: user });

        let request = ChatRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            response_format: json_mode.then_some(ResponseFormat { kind: "json_object" }),
        };

        let started = Instant::now();
        let result = self.send(&request).await;
        metrics::record_provider_call(self.role, started.elapsed().as_secs_f64(), result.is_ok());
        result
    }

    async fn send(&self, request: &ChatRequest<'_>) -> Result<String> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| AppError::provider(self.role, format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::provider(self.role, format!("API error {}: {}", status, body)));
        }

        // Past this point the provider answered; anything undecodable is malformed
        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| AppError::malformed(self.role, format!("unreadable response: {}", e)))?;

        let content = reply_content(parsed).map_err(|m| AppError::malformed(self.role, m))?;

        debug!(role = self.role, len = content.len(), "Completion received");
        Ok(content)
    }
}

/// Text of the first choice, or why there is none
fn reply_content(parsed: ChatResponse) -> std::result::Result<String, String> {
    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| "response had no choices".to_string())?;

    match choice.message.content {
        Some(content) => Ok(content),
        None => Err(format!(
            "choice has no content (finish_reason: {})",
            choice.finish_reason.as_deref().unwrap_or("unknown")
        )),
    }
}

#[async_trait]
impl Classifier for ChatClient {
    async fn classify(&self, instructions: &str, question: &str) -> Result<RouteDecision> {
        let raw = self.complete(Some(instructions), question, true).await?;
        parse_route_decision(&raw).map_err(|m| AppError::malformed(self.role, m))
    }
}

#[async_trait]
impl Judge for ChatClient {
    async fn judge(&self, instructions: &str, question: &str, retrieved: &str) -> Result<Verdict> {
        let user = format!(
            "Question: {}\n\nRetrieved info:\n{}\n\nIs this sufficient to answer the question? Respond ONLY with JSON.",
            question, retrieved
        );
        let raw = self.complete(Some(instructions), &user, true).await?;
        parse_verdict(&raw).map_err(|m| AppError::malformed(self.role, m))
    }
}

#[async_trait]
impl Generator for ChatClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.complete(None, prompt, false).await
    }
}

fn fence_pattern() -> Option<&'static Regex> {
    static FENCE: OnceLock<Option<Regex>> = OnceLock::new();
    FENCE
        .get_or_init(|| Regex::new(r"(?s)```(?:json)?\s*(\{.*\})\s*```").ok())
        .as_ref()
}

/// JSON object of a reply: the fenced block if there is one, otherwise the
/// outermost `{...}` span
pub fn extract_json(text: &str) -> Option<&str> {
    if let Some(fenced) = fence_pattern()
        .and_then(|re| re.captures(text))
        .and_then(|caps| caps.get(1))
    {
        return Some(fenced.as_str());
    }

    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(&text[start..=end])
}

fn parse_object(raw: &str) -> std::result::Result<serde_json::Map<String, Value>, String> {
    let json = extract_json(raw).ok_or_else(|| format!("no JSON object in reply: {:.80}", raw))?;
    match serde_json::from_str::<Value>(json) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err("reply is not a JSON object".to_string()),
        Err(e) => Err(format!("invalid JSON: {}", e)),
    }
}

/// Decode `{"route": ..., "reply": ...}`; route names are matched case-insensitively
pub fn parse_route_decision(raw: &str) -> std::result::Result<RouteDecision, String> {
    let map = parse_object(raw)?;

    let route = match map.get("route").and_then(Value::as_str).map(|r| r.trim().to_lowercase()) {
        Some(r) if r == "rag" => Route::Rag,
        Some(r) if r == "web" => Route::Web,
        Some(r) if r == "answer" => Route::Answer,
        Some(r) if r == "end" => Route::End,
        Some(other) => return Err(format!("unknown route '{}'", other)),
        None => return Err("missing 'route' field".to_string()),
    };

    let reply = map.get("reply").and_then(Value::as_str).map(str::to_string);

    Ok(RouteDecision { route, reply })
}

/// Decode `{"sufficient": bool}`; string booleans are tolerated
pub fn parse_verdict(raw: &str) -> std::result::Result<Verdict, String> {
    let map = parse_object(raw)?;

    let sufficient = match map.get("sufficient") {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) if s.eq_ignore_ascii_case("true") => true,
        Some(Value::String(s)) if s.eq_ignore_ascii_case("false") => false,
        Some(other) => return Err(format!("'sufficient' is not a boolean: {}", other)),
        None => return Err("missing 'sufficient' field".to_string()),
    };

    Ok(Verdict { sufficient })
}
