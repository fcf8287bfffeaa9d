use crate::config::AppConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};

pub const GROQ_API_BASE: &str = "https://api.groq.com/openai/v1";

/// A chat-completion capability. The query engine holds exactly one of these
/// and never knows which provider is behind it.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Generate a completion for a system instruction plus one user message.
    async fn complete(&self, system: &str, user: &str) -> Result<String>;
    /// Provider name for logs (e.g. "groq", "openai-compat").
    fn name(&self) -> &str;
}

/// Picks the backend for this process. Missing or unusable configuration
/// degrades to [`UnavailableChat`] so startup itself never fails; the error
/// surfaces on the first query instead.
pub fn select_backend(config: &AppConfig) -> Arc<dyn ChatBackend> {
    let Some(api_key) = config.groq_api_key.clone() else {
        warn!("GROQ_API_KEY is not set; SQL generation will fail at query time");
        return Arc::new(UnavailableChat);
    };

    let built: Result<Arc<dyn ChatBackend>> = match config.chat_base_url.as_deref() {
        Some(base_url) => {
            OpenAiCompatChat::new(base_url, &api_key, &config.model, config.request_timeout)
                .map(|backend| Arc::new(backend) as Arc<dyn ChatBackend>)
        }
        None => GroqChat::new(&api_key, &config.model, config.request_timeout)
            .map(|backend| Arc::new(backend) as Arc<dyn ChatBackend>),
    };

    match built {
        Ok(backend) => {
            info!(backend = backend.name(), model = %config.model, "chat backend selected");
            backend
        }
        Err(err) => {
            warn!(error = %err, "failed to build chat backend; continuing without one");
            Arc::new(UnavailableChat)
        }
    }
}

/// Groq's native endpoint.
pub struct GroqChat {
    http: ChatHttp,
}

impl GroqChat {
    pub fn new(api_key: &str, model: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: ChatHttp::new(GROQ_API_BASE, api_key, model, timeout)?,
        })
    }
}

#[async_trait]
impl ChatBackend for GroqChat {
    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        self.http.complete(system, user).await
    }

    fn name(&self) -> &str {
        "groq"
    }
}

/// Any OpenAI-compatible endpoint, re-pointed via base-URL override.
pub struct OpenAiCompatChat {
    http: ChatHttp,
}

impl OpenAiCompatChat {
    pub fn new(base_url: &str, api_key: &str, model: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: ChatHttp::new(base_url, api_key, model, timeout)?,
        })
    }
}

#[async_trait]
impl ChatBackend for OpenAiCompatChat {
    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        self.http.complete(system, user).await
    }

    fn name(&self) -> &str {
        "openai-compat"
    }
}

/// Placeholder used when no backend could be configured. Fails at use-time.
pub struct UnavailableChat;

#[async_trait]
impl ChatBackend for UnavailableChat {
    async fn complete(&self, _system: &str, _user: &str) -> Result<String> {
        anyhow::bail!("no chat backend is configured; set GROQ_API_KEY")
    }

    fn name(&self) -> &str {
        "unavailable"
    }
}

struct ChatHttp {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl ChatHttp {
    fn new(base_url: &str, api_key: &str, model: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build chat HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }

    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
            "temperature": 0.0,
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("chat completion request failed")?
            .error_for_status()
            .context("chat completion returned an error status")?;

        let payload: Value = response
            .json()
            .await
            .context("chat completion response was not JSON")?;
        parse_completion(&payload)
    }
}

fn parse_completion(payload: &Value) -> Result<String> {
    payload
        .pointer("/choices/0/message/content")
        .and_then(|content| content.as_str())
        .map(|text| text.trim().to_string())
        .context("chat completion missing choices[0].message.content")
}
