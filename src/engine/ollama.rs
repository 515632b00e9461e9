use super::{CompletionError, Engine, types::*};
use crate::config::Config;
use anyhow::{Context, Result, anyhow};
use reqwest::blocking::Client;
use std::time::{Duration, Instant};
use tracing::debug;

/// Client for an Ollama-compatible `/api/chat` endpoint.
pub struct OllamaEngine {
    client: Client,
    base_url: String,
    model: String,
    temperature: f32,
}

impl OllamaEngine {
    pub fn new(cfg: &Config) -> Result<Self> {
        let mut builder = Client::builder();
        // reqwest's blocking client defaults to a 30s timeout; 0 means none.
        builder = if cfg.llm.request_timeout_seconds > 0 {
            builder.timeout(Duration::from_secs(cfg.llm.request_timeout_seconds))
        } else {
            builder.timeout(None)
        };
        let client = builder.build().with_context(|| "building HTTP client")?;
        if cfg.llm.model.trim().is_empty() {
            return Err(anyhow!("llm.model is empty"));
        }
        Ok(Self {
            client,
            base_url: cfg.llm.base_url.trim_end_matches('/').to_string(),
            model: cfg.llm.model.clone(),
            temperature: cfg.llm.temperature,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let url = format!("{}/api/tags", self.base_url);
        let resp = self
            .client
            .get(&url)
            .send()
            .with_context(|| format!("GET {url}"))?;
        if !resp.status().is_success() {
            return Err(anyhow!("GET {url} failed with status {}", resp.status()));
        }
        let list: ModelList = resp.json().with_context(|| "parsing model list")?;
        let mut models = list.models;
        models.sort_by(|a, b| a.id().cmp(b.id()));
        Ok(models)
    }
}

impl Engine for OllamaEngine {
    fn complete(&self, system: &str, prompt: &str) -> Result<String, CompletionError> {
        let url = format!("{}/api/chat", self.base_url);
        let req = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage::system(system), ChatMessage::user(prompt)],
            stream: false,
            options: ChatOptions {
                temperature: self.temperature,
            },
        };

        let started = Instant::now();
        let resp = self
            .client
            .post(&url)
            .json(&req)
            .send()
            .map_err(|e| CompletionError::Transport(e.to_string()))?;

        let status = resp.status();
        let body = resp
            .text()
            .map_err(|e| CompletionError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(CompletionError::Status {
                code: status.as_u16(),
                body: truncate(&body, 500),
            });
        }

        let text = extract_message_text(&body)?;
        debug!(
            "chat model={} prompt_chars={} response_chars={} elapsed={:?}",
            self.model,
            prompt.len(),
            text.len(),
            started.elapsed()
        );
        Ok(text)
    }
}

/// Assistant text of a non-streaming `/api/chat` response body.
pub fn extract_message_text(body: &str) -> Result<String, CompletionError> {
    let parsed: ChatResponse = serde_json::from_str(body)
        .map_err(|e| CompletionError::Malformed(format!("{e}: {}", truncate(body, 200))))?;
    if let Some(err) = parsed.error {
        return Err(CompletionError::Malformed(err));
    }
    parsed
        .message
        .map(|m| m.content)
        .ok_or_else(|| CompletionError::Malformed("response has no message".into()))
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((i, _)) => format!("{}...", &s[..i]),
        None => s.to_string(),
    }
}
