//! Background quiz-generation pipeline.
//!
//! [`queue`] provides the bounded drop-on-full job queue; [`worker_pool`]
//! owns the worker tasks, the per-book generation workflow, and the retry
//! sweeps. The pipeline is an owned value wired together at startup, not
//! process-global state.

pub mod queue;
pub mod worker_pool;

pub use queue::{job_queue, EnqueueOutcome, JobReceiver, JobSender};
pub use worker_pool::{PipelineConfig, PipelineError, PipelineStats, QuizPipeline};
