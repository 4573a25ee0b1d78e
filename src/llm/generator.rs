//! Retrying quiz generator.
//!
//! Wraps a [`GenerationBackend`] with per-attempt timeouts, linear
//! backoff, JSON extraction, and structural validation. A response that
//! parses but violates the quiz shape (wrong option count, empty fields)
//! is treated exactly like a transport failure and retried.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::LlmError;
use crate::models::{Book, Quiz, QuizData, QuizQuestion};
use crate::utils::extract_json;

use super::GenerationBackend;

const DEFAULT_QUESTION_COUNT: u32 = 5;
const DEFAULT_RETRY_LIMIT: u32 = 3;
const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_BACKOFF_STEP: Duration = Duration::from_secs(2);

/// Generates validated quizzes from book metadata, retrying on failure.
pub struct QuizGenerator {
    backend: Arc<dyn GenerationBackend>,
    model_name: String,
    question_count: u32,
    retry_limit: u32,
    attempt_timeout: Duration,
    backoff_step: Duration,
}

impl QuizGenerator {
    pub fn new(backend: Arc<dyn GenerationBackend>, model_name: impl Into<String>) -> Self {
        Self {
            backend,
            model_name: model_name.into(),
            question_count: DEFAULT_QUESTION_COUNT,
            retry_limit: DEFAULT_RETRY_LIMIT,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
            backoff_step: DEFAULT_BACKOFF_STEP,
        }
    }

    pub fn with_question_count(mut self, count: u32) -> Self {
        self.question_count = count;
        self
    }

    pub fn with_retry_limit(mut self, limit: u32) -> Self {
        self.retry_limit = limit.max(1);
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn with_backoff_step(mut self, step: Duration) -> Self {
        self.backoff_step = step;
        self
    }

    /// Name of the model recorded on generated quizzes.
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Configured retry budget.
    pub fn retry_limit(&self) -> u32 {
        self.retry_limit
    }

    /// Generates a completed quiz for the book.
    ///
    /// Makes up to `retry_limit` attempts, sleeping `backoff_step *
    /// attempt` between consecutive ones. Returns
    /// [`LlmError::RetriesExhausted`] carrying the final attempt's error
    /// once the budget is spent.
    pub async fn generate(&self, book: &Book) -> Result<Quiz, LlmError> {
        let prompt = self.build_prompt(book);
        let mut last_error = None;

        for attempt in 1..=self.retry_limit {
            if attempt > 1 {
                let delay = self.backoff_delay(attempt - 1);
                debug!(
                    book_id = %book.id,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "backing off before retry"
                );
                tokio::time::sleep(delay).await;
            }

            match self.attempt(&prompt).await {
                Ok(questions) => {
                    return Ok(Quiz::completed(book.id, &self.model_name, questions));
                }
                Err(e) => {
                    warn!(
                        book_id = %book.id,
                        attempt,
                        retry_limit = self.retry_limit,
                        error = %e,
                        "generation attempt failed"
                    );
                    last_error = Some(e);
                }
            }
        }

        let source = last_error.unwrap_or(LlmError::RequestFailed(
            "no generation attempts were made".to_string(),
        ));

        Err(LlmError::RetriesExhausted {
            attempts: self.retry_limit,
            source: Box::new(source),
        })
    }

    /// Delay before the retry following the given failed attempt.
    pub fn backoff_delay(&self, failed_attempt: u32) -> Duration {
        self.backoff_step * failed_attempt
    }

    async fn attempt(&self, prompt: &str) -> Result<Vec<QuizQuestion>, LlmError> {
        let response = tokio::time::timeout(self.attempt_timeout, self.backend.generate(prompt))
            .await
            .map_err(|_| LlmError::Timeout(self.attempt_timeout))??;

        let json = extract_json(&response).ok_or_else(|| {
            LlmError::ParseError("no JSON document found in model output".to_string())
        })?;

        let data: QuizData =
            serde_json::from_str(&json).map_err(|e| LlmError::ParseError(e.to_string()))?;

        self.validate_questions(&data.quiz)?;

        Ok(data.quiz)
    }

    fn validate_questions(&self, questions: &[QuizQuestion]) -> Result<(), LlmError> {
        if questions.is_empty() {
            return Err(LlmError::InvalidQuiz("quiz is empty".to_string()));
        }

        for (idx, q) in questions.iter().enumerate() {
            if q.question.trim().is_empty() {
                return Err(LlmError::InvalidQuiz(format!(
                    "question {} has no question text",
                    idx + 1
                )));
            }
            if q.options.len() != 4 {
                return Err(LlmError::InvalidQuiz(format!(
                    "question {} has {} options, expected 4",
                    idx + 1,
                    q.options.len()
                )));
            }
            if q.answer.trim().is_empty() {
                return Err(LlmError::InvalidQuiz(format!(
                    "question {} has no answer",
                    idx + 1
                )));
            }
            if q.explanation.trim().is_empty() {
                return Err(LlmError::InvalidQuiz(format!(
                    "question {} has no explanation",
                    idx + 1
                )));
            }
        }

        Ok(())
    }

    fn build_prompt(&self, book: &Book) -> String {
        let mut context = format!("Title: {}\n", book.title);

        if !book.authors.is_empty() {
            context.push_str(&format!("Authors: {}\n", book.authors.join(", ")));
        }
        if !book.publisher.is_empty() {
            context.push_str(&format!("Publisher: {}\n", book.publisher));
        }
        if !book.published_date.is_empty() {
            context.push_str(&format!("Published: {}\n", book.published_date));
        }
        if !book.categories.is_empty() {
            context.push_str(&format!("Categories: {}\n", book.categories.join(", ")));
        }
        if !book.description.is_empty() {
            context.push_str(&format!("Description: {}\n", book.description));
        }

        format!(
            "You are a literature teacher writing a comprehension quiz about a book.\n\
             \n\
             {context}\n\
             Generate exactly {count} multiple-choice questions about this book.\n\
             Each question must have exactly 4 options labeled A) through D), \
             a correct answer matching one option verbatim, and a short explanation.\n\
             \n\
             Respond with JSON only, in this shape:\n\
             {{\"quiz\": [{{\"question\": \"...\", \"options\": [\"A) ...\", \"B) ...\", \
             \"C) ...\", \"D) ...\"], \"answer\": \"A) ...\", \"explanation\": \"...\"}}]}}",
            context = context,
            count = self.question_count,
        )
    }
}
