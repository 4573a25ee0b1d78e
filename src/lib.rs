//! bookwise: book catalog ingest with background quiz generation.
//!
//! Books are merged from public metadata sources ([`sources`]), stored in
//! PostgreSQL ([`storage`]), and fed to an async pipeline ([`scheduler`])
//! that generates multiple-choice quizzes through an LLM backend ([`llm`]).

pub mod cli;
pub mod config;
pub mod error;
pub mod llm;
pub mod models;
pub mod scheduler;
pub mod sources;
pub mod storage;
pub mod utils;

pub use error::LlmError;
