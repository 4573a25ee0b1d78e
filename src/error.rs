//! Error types for quiz generation.
//!
//! Storage, queue, config, and source errors live next to their modules;
//! the generation taxonomy is shared between the backend clients and the
//! retrying generator, so it lives here.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur during quiz generation.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Missing API key: GEMINI_API_KEY environment variable not set")]
    MissingApiKey,

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },

    #[error("Failed to parse generation response: {0}")]
    ParseError(String),

    #[error("Invalid quiz structure: {0}")]
    InvalidQuiz(String),

    #[error("Generation attempt timed out after {0:?}")]
    Timeout(Duration),

    #[error("Quiz generation failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<LlmError>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retries_exhausted_includes_last_error() {
        let err = LlmError::RetriesExhausted {
            attempts: 3,
            source: Box::new(LlmError::InvalidQuiz("quiz is empty".to_string())),
        };

        let message = err.to_string();
        assert!(message.contains("3 attempts"));
        assert!(message.contains("quiz is empty"));
    }

    #[test]
    fn test_timeout_display() {
        let err = LlmError::Timeout(Duration::from_secs(60));
        assert!(err.to_string().contains("60"));
    }
}
