//! Ollama HTTP client.
//!
//! Ollama is a local model server; this module is the only place that
//! talks to it. Chat exchanges go through `POST /api/chat`, either as a
//! single JSON object or as a stream of NDJSON chunks, and `GET
//! /api/tags` doubles as the liveness probe and model inventory.

use futures::StreamExt;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::transcript::Turn;

/// Failures talking to the model server, classified for loop-level
/// reporting. Every variant is a single-turn failure: the chat loop
/// prints the message and prompts again.
#[derive(Debug, Error)]
pub enum OllamaError {
    #[error("failed to connect to Ollama at {host} - is it running?")]
    Connect {
        host: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Ollama request failed with status {status}: {message}")]
    Status { status: StatusCode, message: String },

    #[error("Ollama reported an error: {0}")]
    Api(String),

    #[error("unexpected response from Ollama: {0}")]
    Malformed(String),

    #[error("connection lost while streaming the response")]
    Stream(#[source] reqwest::Error),
}

/// One entry in the wire `messages` array.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

impl From<&Turn> for ChatMessage {
    fn from(turn: &Turn) -> Self {
        Self {
            role: turn.role.as_str().to_string(),
            content: turn.text.clone(),
        }
    }
}

/// Request payload for `POST /api/chat`.
#[derive(Debug, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
    pub options: ChatOptions,
}

#[derive(Debug, Serialize)]
pub struct ChatOptions {
    pub temperature: f32,
}

/// A complete response or one stream chunk from `/api/chat`. The same
/// shape covers both; extra server fields (timings, token counts) are
/// ignored.
#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    message: Option<ChatMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Error body Ollama attaches to non-success responses.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// Response from `GET /api/tags`.
#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    name: String,
}

/// Client for a local Ollama server.
#[derive(Clone)]
pub struct OllamaClient {
    host: String,
    http: Client,
}

impl OllamaClient {
    /// Create a client for the given host, e.g. `http://localhost:11434`.
    ///
    /// No overall request timeout is set: a generation request blocks
    /// for as long as the model takes. The model-list probe applies its
    /// own short timeout.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            http: Client::new(),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Send a chat request and return the complete reply text.
    pub async fn chat(&self, request: &ChatRequest) -> Result<String, OllamaError> {
        let url = format!("{}/api/chat", self.host);
        debug!(model = %request.model, messages = request.messages.len(), "sending chat request");

        let response = self
            .http
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|source| OllamaError::Connect {
                host: self.host.clone(),
                source,
            })?;
        let response = check_status(response).await?;

        let chunk: ChatChunk = response
            .json()
            .await
            .map_err(|e| OllamaError::Malformed(e.to_string()))?;
        reply_text(chunk)
    }

    /// Send a chat request with streaming enabled, invoking `on_token`
    /// with each content chunk as it arrives. Returns the accumulated
    /// reply once the server marks the stream done.
    ///
    /// Chunks are NDJSON lines, and a line can be split across network
    /// reads, so bytes are buffered until a newline completes the line.
    pub async fn chat_stream(
        &self,
        request: &ChatRequest,
        mut on_token: impl FnMut(&str),
    ) -> Result<String, OllamaError> {
        let url = format!("{}/api/chat", self.host);
        debug!(model = %request.model, messages = request.messages.len(), "sending streaming chat request");

        let response = self
            .http
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|source| OllamaError::Connect {
                host: self.host.clone(),
                source,
            })?;
        let response = check_status(response).await?;

        let mut stream = response.bytes_stream();
        let mut buffer: Vec<u8> = Vec::new();
        let mut reply = String::new();

        while let Some(chunk) = stream.next().await {
            let bytes = chunk.map_err(OllamaError::Stream)?;
            buffer.extend_from_slice(&bytes);

            while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&line);
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if consume_line(line, &mut reply, &mut on_token)? {
                    return Ok(reply);
                }
            }
        }

        // The buffer may still hold a final line the server sent without
        // a trailing newline.
        let line = String::from_utf8_lossy(&buffer);
        let line = line.trim();
        if !line.is_empty() && consume_line(line, &mut reply, &mut on_token)? {
            return Ok(reply);
        }

        Err(OllamaError::Malformed(
            "stream ended before the final done chunk".to_string(),
        ))
    }

    /// List the model names available on the server. Also serves as the
    /// liveness probe: a connection failure here means Ollama is down.
    pub async fn list_models(&self) -> Result<Vec<String>, OllamaError> {
        let url = format!("{}/api/tags", self.host);
        let response = self
            .http
            .get(&url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map_err(|source| OllamaError::Connect {
                host: self.host.clone(),
                source,
            })?;
        let response = check_status(response).await?;

        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| OllamaError::Malformed(e.to_string()))?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }
}

/// Pass a successful response through; turn anything else into a Status
/// error carrying the `{"error": …}` message when the body has one.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, OllamaError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .map(|e| e.error)
        .unwrap_or(body);
    Err(OllamaError::Status { status, message })
}

/// Extract the reply from a complete (non-streamed) chat response.
fn reply_text(chunk: ChatChunk) -> Result<String, OllamaError> {
    if let Some(error) = chunk.error {
        return Err(OllamaError::Api(error));
    }
    chunk
        .message
        .map(|m| m.content)
        .ok_or_else(|| OllamaError::Malformed("response is missing the message field".to_string()))
}

/// Parse one NDJSON line, appending any content to `reply` and handing
/// it to the renderer. Returns true when the server marks the stream
/// done.
fn consume_line(
    line: &str,
    reply: &mut String,
    on_token: &mut impl FnMut(&str),
) -> Result<bool, OllamaError> {
    let chunk: ChatChunk = serde_json::from_str(line)
        .map_err(|e| OllamaError::Malformed(format!("bad stream chunk: {e}")))?;
    if let Some(error) = chunk.error {
        return Err(OllamaError::Api(error));
    }
    if let Some(message) = chunk.message {
        if !message.content.is_empty() {
            reply.push_str(&message.content);
            on_token(&message.content);
        }
    }
    Ok(chunk.done)
}

/// True when the server has `model`, treating a bare name and its
/// `:latest` tag as the same model.
pub fn model_available(models: &[String], model: &str) -> bool {
    models.iter().any(|name| {
        name == model
            || name
                .strip_suffix(":latest")
                .map_or(false, |base| base == model)
    })
}

/// Strip `<think>…</think>` blocks and trim surrounding whitespace.
///
/// Reasoning models emit scratch work inside think tags. It is shown
/// while streaming, but must not re-enter the conversation context, so
/// replies are cleaned before they are committed to the transcript.
/// Unpaired tags are left alone.
pub fn clean_reply(response: &str) -> String {
    let mut text = response.to_string();
    while let Some(start) = text.find("<think>") {
        match text[start..].find("</think>") {
            Some(offset) => {
                text.replace_range(start..start + offset + "</think>".len(), "");
            }
            None => break,
        }
    }
    text.trim().to_string()
}
