// src/analyze/mod.rs
//! Worker-call collaborator: one prompt in, one text completion out.

pub mod ai_adapter;
pub mod prompt;

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::TaskError;

pub use crate::analyze::ai_adapter::OllamaClient;
pub use crate::analyze::prompt::{build_prompt, PromptVars, DATA_PLACEHOLDER};

/// A single non-streaming completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerRequest {
    /// Remote model identifier, e.g. `gpt-oss:20b`.
    pub target: String,
    pub temperature: f32,
    /// Instructions with the structured input already merged in.
    pub prompt: String,
}

#[async_trait]
pub trait WorkerClient: Send + Sync {
    /// Failures come back as `TaskError`, never as a panic that would sink the batch.
    async fn complete(&self, req: &WorkerRequest) -> Result<String, TaskError>;
    fn provider_name(&self) -> &'static str;
}

pub type DynWorkerClient = Arc<dyn WorkerClient>;
