//! Domain models shared across the pipeline and storage layers.
//!
//! - [`Book`]: a bibliographic record merged from one or more sources
//! - [`Quiz`]: the generated quiz tied one-to-one to a book
//! - [`QuizStatus`] / [`QuizState`]: the per-book and per-quiz status
//!   vocabularies persisted in the durable store

pub mod book;
pub mod quiz;

pub use book::{Book, QuizStatus};
pub use quiz::{Quiz, QuizData, QuizQuestion, QuizState};
