pub mod ollama;
pub mod types;

use thiserror::Error;

pub use types::{ChatMessage, ChatRequest, ChatResponse, ModelInfo, ModelList};

/// A failed round trip to the completion service.
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("completion service unreachable: {0}")]
    Transport(String),
    #[error("completion service returned HTTP {code}: {body}")]
    Status { code: u16, body: String },
    #[error("malformed completion response: {0}")]
    Malformed(String),
}

impl CompletionError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            CompletionError::Transport(_) => true,
            CompletionError::Status { code, .. } => *code == 429 || *code >= 500,
            CompletionError::Malformed(_) => false,
        }
    }
}

/// Blocking chat completion: one system instruction, one user prompt, free text back.
pub trait Engine {
    fn complete(&self, system: &str, prompt: &str) -> Result<String, CompletionError>;
}

impl<E: Engine + ?Sized> Engine for &E {
    fn complete(&self, system: &str, prompt: &str) -> Result<String, CompletionError> {
        (**self).complete(system, prompt)
    }
}

impl<E: Engine + ?Sized> Engine for Box<E> {
    fn complete(&self, system: &str, prompt: &str) -> Result<String, CompletionError> {
        (**self).complete(system, prompt)
    }
}
