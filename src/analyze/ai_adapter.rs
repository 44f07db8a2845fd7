//! Ollama adapter for the worker-call collaborator.
//!
//! Calls `POST {base}/api/generate` with streaming disabled and returns the
//! `response` field. Worker calls are slow, so the client carries a long
//! timeout of its own; the fan-out layer adds none.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::analyze::{WorkerClient, WorkerRequest};
use crate::error::TaskError;

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_WORKER_TIMEOUT: Duration = Duration::from_secs(300);

pub struct OllamaClient {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Serialize)]
struct GenerateReq<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Deserialize)]
struct GenerateResp {
    #[serde(default)]
    response: String,
}

impl OllamaClient {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .user_agent(crate::ingest::http::USER_AGENT)
            .connect_timeout(Duration::from_secs(5))
            .timeout(timeout)
            .build()
            .expect("reqwest client");
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl WorkerClient for OllamaClient {
    async fn complete(&self, req: &WorkerRequest) -> Result<String, TaskError> {
        let body = GenerateReq {
            model: &req.target,
            prompt: &req.prompt,
            stream: false,
            options: GenerateOptions {
                temperature: req.temperature,
            },
        };

        let resp = self
            .http
            .post(format!("{}/api/generate", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| TaskError::from_reqwest(&e))?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            return Err(TaskError::BadResponse(format!(
                "ollama HTTP {} for model {}: {}",
                status.as_u16(),
                req.target,
                detail.chars().take(200).collect::<String>()
            )));
        }

        let parsed: GenerateResp = resp
            .json()
            .await
            .map_err(|e| TaskError::BadResponse(format!("ollama body: {e}")))?;
        let text = parsed.response.trim();
        if text.is_empty() {
            return Err(TaskError::BadResponse(format!(
                "model {} returned an empty response",
                req.target
            )));
        }
        Ok(text.to_string())
    }

    fn provider_name(&self) -> &'static str {
        "ollama"
    }
}
