//! Model gateway abstraction and the Mistral implementation.
//!
//! Defines the [`ChatGateway`] trait — the boundary to the remote
//! text-generation service — and [`MistralGateway`], which calls the
//! Mistral chat-completions API with retry and backoff.
//!
//! Both a blocking completion and a streaming variant are provided. The
//! streaming variant yields an ordered, finite sequence of text fragments
//! over a channel; concatenating them reproduces the non-streaming result
//! for identical inputs.
//!
//! # Retry Strategy
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;

use crate::config::ApiConfig;
use crate::models::{ChatMessage, GenerationParams, Role};

/// One fully assembled generation request.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub system_prompt: String,
    pub history: Vec<ChatMessage>,
    pub user_message: String,
    pub params: GenerationParams,
}

/// The external text-generation boundary.
///
/// Implementations must guarantee that the concatenated fragments of
/// [`stream`](ChatGateway::stream) equal the result of
/// [`complete`](ChatGateway::complete) for identical inputs.
#[async_trait]
pub trait ChatGateway: Send + Sync {
    /// Generate the full response text in one call.
    async fn complete(&self, request: &ChatRequest) -> Result<String>;

    /// Generate the response as an ordered sequence of text fragments.
    /// The channel closes when generation is finished; an `Err` item
    /// terminates the stream.
    async fn stream(&self, request: &ChatRequest) -> Result<mpsc::Receiver<Result<String>>>;
}

/// Drain a fragment stream into the full response text.
#[allow(dead_code)]
pub async fn collect_stream(mut rx: mpsc::Receiver<Result<String>>) -> Result<String> {
    let mut text = String::new();
    while let Some(fragment) = rx.recv().await {
        text.push_str(&fragment?);
    }
    Ok(text)
}

/// Gateway implementation for the Mistral chat-completions API.
pub struct MistralGateway {
    api_key: String,
    model: String,
    endpoint: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl MistralGateway {
    /// Create a gateway from configuration.
    ///
    /// A missing credential is fatal here, before any model call is
    /// attempted.
    pub fn new(config: &ApiConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            bail!(
                "Missing Mistral API key. Set the MISTRAL_API_KEY environment variable \
                 or api.api_key in the config file."
            );
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            endpoint: config.endpoint.clone(),
            max_retries: config.max_retries,
            client,
        })
    }

    fn request_body(&self, request: &ChatRequest, stream: bool) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "messages": build_messages(request),
            "temperature": request.params.temperature,
            "max_tokens": request.params.max_tokens,
            "top_p": request.params.top_p,
            "stream": stream,
        })
    }
}

#[async_trait]
impl ChatGateway for MistralGateway {
    async fn complete(&self, request: &ChatRequest) -> Result<String> {
        let body = self.request_body(request, false);
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(&self.endpoint)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        return parse_completion(&json);
                    }

                    // Rate limited or server error — retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err =
                            Some(anyhow::anyhow!("Mistral API error {}: {}", status, body_text));
                        continue;
                    }

                    // Client error (not 429) — don't retry
                    let body_text = response.text().await.unwrap_or_default();
                    bail!("Mistral API error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Generation failed after retries")))
    }

    async fn stream(&self, request: &ChatRequest) -> Result<mpsc::Receiver<Result<String>>> {
        let body = self.request_body(request, true);

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .context("Failed to reach the Mistral API")?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("Mistral API error {}: {}", status, body_text);
        }

        let (tx, rx) = mpsc::channel(64);

        tokio::spawn(async move {
            let mut stream = response.bytes_stream();
            let mut buffer = String::new();

            while let Some(chunk) = stream.next().await {
                let bytes = match chunk {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        let _ = tx.send(Err(anyhow::anyhow!("Stream error: {}", e))).await;
                        return;
                    }
                };

                buffer.push_str(&String::from_utf8_lossy(&bytes));

                // Process complete lines; a partial line stays buffered
                // until the next chunk completes it.
                while let Some(newline) = buffer.find('\n') {
                    let line = buffer[..newline].trim().to_string();
                    buffer.drain(..=newline);

                    match parse_sse_line(&line) {
                        SseEvent::Fragment(text) => {
                            if tx.send(Ok(text)).await.is_err() {
                                return;
                            }
                        }
                        SseEvent::Done => return,
                        SseEvent::Ignore => {}
                    }
                }
            }
        });

        Ok(rx)
    }
}

/// Build the ordered message list: system instructions first, then the
/// filtered history, then the new user message.
fn build_messages(request: &ChatRequest) -> Vec<serde_json::Value> {
    let mut messages = Vec::with_capacity(request.history.len() + 2);

    if !request.system_prompt.is_empty() {
        messages.push(serde_json::json!({
            "role": "system",
            "content": request.system_prompt,
        }));
    }

    for message in &request.history {
        let role = match message.role {
            Role::User => "user",
            Role::Assistant => "assistant",
        };
        messages.push(serde_json::json!({
            "role": role,
            "content": message.content,
        }));
    }

    messages.push(serde_json::json!({
        "role": "user",
        "content": request.user_message,
    }));

    messages
}

/// Parse the chat-completions response JSON.
fn parse_completion(json: &serde_json::Value) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| anyhow::anyhow!("Invalid Mistral response: missing message content"))
}

enum SseEvent {
    Fragment(String),
    Done,
    Ignore,
}

/// Interpret one server-sent-event line from the streaming endpoint.
/// Empty keep-alive lines and fragments without content deltas are
/// ignored.
fn parse_sse_line(line: &str) -> SseEvent {
    let Some(data) = line.strip_prefix("data:") else {
        return SseEvent::Ignore;
    };
    let data = data.trim();

    if data == "[DONE]" {
        return SseEvent::Done;
    }

    let Ok(json) = serde_json::from_str::<serde_json::Value>(data) else {
        return SseEvent::Ignore;
    };

    match json
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("delta"))
        .and_then(|d| d.get("content"))
        .and_then(|c| c.as_str())
    {
        Some(text) if !text.is_empty() => SseEvent::Fragment(text.to_string()),
        _ => SseEvent::Ignore,
    }
}
