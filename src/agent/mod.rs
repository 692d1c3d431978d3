//! Agents: prompt templates bound to a chat model
//!
//! An [`Agent`] pairs a static [`AgentSpec`] with a model id and a
//! [`ChatModel`] client. Structured agents ask the model for a
//! [`ChunkAnalysis`] and validate the reply before handing it back.

mod analysis;
pub mod catalog;

pub use analysis::{analysis_reply, extract_json, ChunkAnalysis, Evaluation};
pub use catalog::AgentSpec;

use crate::llm::{ChatModel, ChatRequest, ModelError};
use std::sync::Arc;

/// Model used when a caller does not pick one.
pub const DEFAULT_MODEL_ID: &str = "o4-mini";

/// An agent ready to run against a model.
#[derive(Clone)]
pub struct Agent {
    spec: &'static AgentSpec,
    model_id: String,
    client: Arc<dyn ChatModel>,
}

impl Agent {
    pub fn new(spec: &'static AgentSpec, model_id: impl Into<String>, client: Arc<dyn ChatModel>) -> Self {
        Self {
            spec,
            model_id: model_id.into(),
            client,
        }
    }

    pub fn id(&self) -> &str {
        self.spec.id
    }

    pub fn name(&self) -> &str {
        self.spec.name
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    fn request(&self, message: &str) -> ChatRequest {
        ChatRequest {
            model: self.model_id.clone(),
            system: self.spec.instructions.to_string(),
            user: message.to_string(),
            response_format: self.spec.structured.then(ChunkAnalysis::response_format),
        }
    }

    /// Send a message and return the raw reply text.
    pub async fn run(&self, message: &str) -> Result<String, ModelError> {
        tracing::debug!(agent = self.spec.id, model = %self.model_id, chars = message.len(), "invoking agent");
        let reply = self.client.complete(&self.request(message)).await?;
        if let Some(usage) = &reply.usage {
            tracing::debug!(
                agent = self.spec.id,
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "agent reply received"
            );
        }
        Ok(reply.content)
    }

    /// Send a message and parse the reply as a chunk analysis.
    pub async fn analyze(&self, message: &str) -> Result<ChunkAnalysis, ModelError> {
        let text = self.run(message).await?;
        ChunkAnalysis::parse(&text)
    }
}
