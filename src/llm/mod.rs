//! Quiz generation backends and the retrying generator.
//!
//! [`GenerationBackend`] is the seam between the retry/validation logic
//! and the HTTP client: the generator hands a prompt to a backend and
//! gets raw model text back. [`GeminiClient`] is the production backend;
//! tests substitute scripted ones.

pub mod gemini;
pub mod generator;

use async_trait::async_trait;

use crate::error::LlmError;

pub use gemini::GeminiClient;
pub use generator::QuizGenerator;

/// A text-generation backend.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Sends the prompt and returns the model's raw text output.
    async fn generate(&self, prompt: &str) -> Result<String, LlmError>;
}
