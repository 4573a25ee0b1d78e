//! Quiz pipeline: worker pool and generation workflow.
//!
//! The pipeline owns a bounded job queue and a fixed set of worker tasks.
//! Callers hand it book ids; workers run the generation workflow for each
//! id: short-circuit if a completed quiz already exists, clear any stale
//! failure marker, stamp the book `generating`, call the generator, then
//! stamp `completed` or persist a failure marker and stamp `failed`.
//!
//! Shutdown closes the queue; workers drain whatever is already enqueued
//! before exiting, so an accepted job is never silently discarded by a
//! clean stop. A broadcast channel stops the periodic retry sweep.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::llm::QuizGenerator;
use crate::models::{QuizState, QuizStatus};
use crate::storage::{BookStore, DatabaseError, QuizStore};

use super::queue::{job_queue, EnqueueOutcome, JobReceiver, JobSender};

/// Errors that can occur operating the pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Pipeline is already running.
    #[error("Pipeline is already running")]
    AlreadyRunning,

    /// Pipeline is not running.
    #[error("Pipeline is not running")]
    NotRunning,

    /// A storage operation failed.
    #[error("Storage error: {0}")]
    Storage(#[from] DatabaseError),
}

/// Configuration for the quiz pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Number of worker tasks to spawn.
    pub worker_count: usize,
    /// Capacity of the job queue; enqueues beyond it are dropped.
    pub queue_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            worker_count: 3,
            queue_capacity: 100,
        }
    }
}

impl PipelineConfig {
    pub fn with_worker_count(mut self, count: usize) -> Self {
        self.worker_count = count;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }
}

/// Snapshot of pipeline and catalog state.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct PipelineStats {
    pub total_books: i64,
    pub pending: i64,
    pub generating: i64,
    pub completed: i64,
    pub failed: i64,
    pub queue_size: usize,
    pub worker_count: usize,
    pub running: bool,
}

struct PipelineInner {
    sender: Option<JobSender>,
    workers: Vec<JoinHandle<()>>,
}

/// Owns the job queue, the workers, and the retry sweeps.
///
/// All methods take `&self`; the pipeline is meant to live in an `Arc`
/// shared between the ingest path and the CLI surface.
pub struct QuizPipeline {
    generator: Arc<QuizGenerator>,
    books: Arc<dyn BookStore>,
    quizzes: Arc<dyn QuizStore>,
    config: PipelineConfig,
    inner: Mutex<PipelineInner>,
    shutdown_tx: broadcast::Sender<()>,
}

impl QuizPipeline {
    pub fn new(
        generator: Arc<QuizGenerator>,
        books: Arc<dyn BookStore>,
        quizzes: Arc<dyn QuizStore>,
        config: PipelineConfig,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            generator,
            books,
            quizzes,
            config,
            inner: Mutex::new(PipelineInner {
                sender: None,
                workers: Vec::new(),
            }),
            shutdown_tx,
        }
    }

    /// Starts the worker pool.
    ///
    /// Returns [`PipelineError::AlreadyRunning`] if the pool is already up.
    pub fn start(&self) -> Result<(), PipelineError> {
        let mut inner = self.lock_inner();

        if inner.sender.is_some() {
            return Err(PipelineError::AlreadyRunning);
        }

        let (sender, receiver) = job_queue(self.config.queue_capacity);

        for i in 0..self.config.worker_count {
            let worker = Worker {
                id: format!("quiz-worker-{}", i),
                receiver: receiver.clone(),
                generator: Arc::clone(&self.generator),
                books: Arc::clone(&self.books),
                quizzes: Arc::clone(&self.quizzes),
            };

            inner.workers.push(tokio::spawn(async move {
                worker.run().await;
            }));
        }

        inner.sender = Some(sender);

        info!(
            worker_count = self.config.worker_count,
            queue_capacity = self.config.queue_capacity,
            "quiz pipeline started"
        );

        Ok(())
    }

    /// Stops the pipeline, draining jobs already in the queue.
    ///
    /// Closes the queue so workers exit after finishing what is already
    /// enqueued, signals the periodic retry sweep, and waits for every
    /// worker task.
    pub async fn stop(&self) -> Result<(), PipelineError> {
        let (sender, workers) = {
            let mut inner = self.lock_inner();
            match inner.sender.take() {
                Some(sender) => (sender, std::mem::take(&mut inner.workers)),
                None => return Err(PipelineError::NotRunning),
            }
        };

        info!("stopping quiz pipeline");

        // Ignore send error: no periodic sweep may be subscribed.
        let _ = self.shutdown_tx.send(());

        // Dropping the only sender closes the queue; workers drain and exit.
        drop(sender);

        for handle in workers {
            if let Err(e) = handle.await {
                error!(error = %e, "worker task panicked during shutdown");
            }
        }

        info!("quiz pipeline stopped");
        Ok(())
    }

    /// Whether the worker pool is currently running.
    pub fn is_running(&self) -> bool {
        self.lock_inner().sender.is_some()
    }

    /// Number of jobs currently waiting in the queue.
    pub fn queue_depth(&self) -> usize {
        self.lock_inner()
            .sender
            .as_ref()
            .map(|s| s.depth())
            .unwrap_or(0)
    }

    /// Enqueues a book for quiz generation without blocking.
    ///
    /// When the queue is full the id is dropped and
    /// [`EnqueueOutcome::Dropped`] is returned; the book stays in its
    /// current status and a later sweep will pick it up.
    pub fn enqueue(&self, book_id: Uuid) -> Result<EnqueueOutcome, PipelineError> {
        let inner = self.lock_inner();
        let Some(sender) = inner.sender.as_ref() else {
            warn!(book_id = %book_id, "pipeline not running, cannot enqueue");
            return Err(PipelineError::NotRunning);
        };

        let outcome = sender.try_enqueue(book_id);
        match outcome {
            EnqueueOutcome::Queued => {
                debug!(book_id = %book_id, depth = sender.depth(), "book enqueued");
            }
            EnqueueOutcome::Dropped => {
                warn!(
                    book_id = %book_id,
                    capacity = sender.capacity(),
                    "queue full, dropping generation job"
                );
            }
            EnqueueOutcome::Closed => {
                warn!(book_id = %book_id, "queue closed, dropping generation job");
            }
        }

        Ok(outcome)
    }

    /// Enqueues every book whose quiz is pending or failed.
    ///
    /// Run once at startup to pick up work left over from a previous
    /// process. Returns the number of books actually queued.
    pub async fn process_all_pending(&self) -> Result<usize, PipelineError> {
        let books = self
            .books
            .find_by_quiz_status(&[QuizStatus::Pending, QuizStatus::Failed])
            .await?;

        let mut queued = 0;
        for book in &books {
            if self.enqueue(book.id)? == EnqueueOutcome::Queued {
                queued += 1;
            }
        }

        info!(found = books.len(), queued, "startup sweep enqueued unprocessed books");
        Ok(queued)
    }

    /// Resets every failed book to pending and re-enqueues it.
    ///
    /// Books whose enqueue is dropped stay pending and are retried by the
    /// next sweep. Returns the number of books re-queued.
    pub async fn retry_failed(&self) -> Result<usize, PipelineError> {
        let failed = self.books.find_by_quiz_status(&[QuizStatus::Failed]).await?;

        let mut queued = 0;
        for book in &failed {
            self.books
                .update_quiz_status(book.id, QuizStatus::Pending, None)
                .await?;

            if self.enqueue(book.id)? == EnqueueOutcome::Queued {
                queued += 1;
            }
        }

        if !failed.is_empty() {
            info!(found = failed.len(), queued, "retry sweep re-queued failed books");
        }

        Ok(queued)
    }

    /// Spawns a background task that runs [`Self::retry_failed`] at the
    /// given interval until the pipeline is stopped.
    pub fn start_periodic_retry(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let pipeline = self;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick fires immediately; skip it so the first sweep
            // happens one full interval after startup.
            ticker.tick().await;

            info!(interval_secs = interval.as_secs(), "periodic retry sweep started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = pipeline.retry_failed().await {
                            error!(error = %e, "periodic retry sweep failed");
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!("periodic retry sweep stopped");
                        break;
                    }
                }
            }
        })
    }

    /// Returns catalog counts plus live queue and worker state.
    pub async fn stats(&self) -> Result<PipelineStats, PipelineError> {
        let counts = self.books.quiz_status_counts().await?;

        let (queue_size, running) = {
            let inner = self.lock_inner();
            match inner.sender.as_ref() {
                Some(sender) => (sender.depth(), true),
                None => (0, false),
            }
        };

        Ok(PipelineStats {
            total_books: counts.total,
            pending: counts.pending,
            generating: counts.generating,
            completed: counts.completed,
            failed: counts.failed,
            queue_size,
            worker_count: self.config.worker_count,
            running,
        })
    }

    fn lock_inner(&self) -> std::sync::MutexGuard<'_, PipelineInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

enum WorkflowOutcome {
    Completed,
    AlreadyCompleted,
    Failed,
    Missing,
}

/// A single worker draining the job queue.
struct Worker {
    id: String,
    receiver: JobReceiver,
    generator: Arc<QuizGenerator>,
    books: Arc<dyn BookStore>,
    quizzes: Arc<dyn QuizStore>,
}

impl Worker {
    async fn run(self) {
        info!(worker_id = %self.id, "worker started");

        while let Some(book_id) = self.receiver.dequeue().await {
            self.process_book(book_id).await;
        }

        info!(worker_id = %self.id, "worker stopped");
    }

    async fn process_book(&self, book_id: Uuid) {
        let started = Instant::now();

        match self.run_workflow(book_id).await {
            Ok(WorkflowOutcome::Completed) => {
                info!(
                    worker_id = %self.id,
                    book_id = %book_id,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "quiz generated"
                );
            }
            Ok(WorkflowOutcome::AlreadyCompleted) => {
                debug!(worker_id = %self.id, book_id = %book_id, "quiz already completed");
            }
            Ok(WorkflowOutcome::Failed) => {
                warn!(
                    worker_id = %self.id,
                    book_id = %book_id,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "quiz generation exhausted retries"
                );
            }
            Ok(WorkflowOutcome::Missing) => {
                warn!(worker_id = %self.id, book_id = %book_id, "queued book no longer exists");
            }
            Err(e) => {
                error!(worker_id = %self.id, book_id = %book_id, error = %e, "workflow error");

                // The book must not stay stuck in `generating`.
                if let Err(e) = self
                    .books
                    .update_quiz_status(book_id, QuizStatus::Failed, None)
                    .await
                {
                    error!(
                        worker_id = %self.id,
                        book_id = %book_id,
                        error = %e,
                        "failed to mark book failed after workflow error"
                    );
                }
            }
        }
    }

    async fn run_workflow(&self, book_id: Uuid) -> Result<WorkflowOutcome, DatabaseError> {
        let Some(book) = self.books.get_book(book_id).await? else {
            return Ok(WorkflowOutcome::Missing);
        };

        // A completed quiz may exist even when the book's status says
        // otherwise (a crash between the two writes). Re-stamp and move on.
        if let Some(quiz) = self
            .quizzes
            .find_by_book_and_status(book_id, QuizState::Completed)
            .await?
        {
            self.books
                .update_quiz_status(book_id, QuizStatus::Completed, Some(quiz.id))
                .await?;
            return Ok(WorkflowOutcome::AlreadyCompleted);
        }

        // Clear any stale failure marker before the new attempt.
        let deleted = self
            .quizzes
            .delete_by_book_and_status(book_id, QuizState::Failed)
            .await?;
        if deleted > 0 {
            debug!(worker_id = %self.id, book_id = %book_id, "removed stale failure marker");
        }

        self.books
            .update_quiz_status(book_id, QuizStatus::Generating, None)
            .await?;

        match self.generator.generate(&book).await {
            Ok(quiz) => {
                self.quizzes.create_quiz(&quiz).await?;
                self.books
                    .update_quiz_status(book_id, QuizStatus::Completed, Some(quiz.id))
                    .await?;
                Ok(WorkflowOutcome::Completed)
            }
            Err(e) => {
                let marker = crate::models::Quiz::failure_marker(
                    book_id,
                    self.generator.model_name(),
                    self.generator.retry_limit(),
                    e.to_string(),
                );

                self.quizzes.create_quiz(&marker).await?;
                // Only the status is stamped: the marker is deleted by the
                // next attempt, so referencing it from the book would leave
                // quiz_id dangling.
                self.books
                    .update_quiz_status(book_id, QuizStatus::Failed, None)
                    .await?;
                Ok(WorkflowOutcome::Failed)
            }
        }
    }
}
