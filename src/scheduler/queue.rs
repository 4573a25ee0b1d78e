//! Bounded in-memory job queue with drop-on-full enqueue.
//!
//! Jobs are bare book ids; they carry no payload and are not durable. The
//! producer side never blocks: when the queue is at capacity the id is
//! dropped and the caller learns about it only through the returned
//! [`EnqueueOutcome`] and a warn log. A slow generation backend therefore
//! can never stall the caller that triggered the enqueue.
//!
//! Dropping the [`JobSender`] closes the channel; workers drain whatever
//! is left and then exit their receive loops.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Result of a non-blocking enqueue attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// The id was accepted into the queue.
    Queued,
    /// The queue was at capacity; the id was dropped.
    Dropped,
    /// The receiving side is gone (pipeline stopped mid-call).
    Closed,
}

/// Creates a bounded job queue with the given capacity.
///
/// Returns the producer and consumer halves. The consumer half is cheap to
/// clone; all clones compete for items.
pub fn job_queue(capacity: usize) -> (JobSender, JobReceiver) {
    let (tx, rx) = mpsc::channel(capacity);

    (
        JobSender { tx },
        JobReceiver {
            rx: Arc::new(Mutex::new(rx)),
        },
    )
}

/// Producer half of the job queue.
#[derive(Debug, Clone)]
pub struct JobSender {
    tx: mpsc::Sender<Uuid>,
}

impl JobSender {
    /// Enqueues a book id without blocking.
    pub fn try_enqueue(&self, book_id: Uuid) -> EnqueueOutcome {
        match self.tx.try_send(book_id) {
            Ok(()) => EnqueueOutcome::Queued,
            Err(TrySendError::Full(_)) => EnqueueOutcome::Dropped,
            Err(TrySendError::Closed(_)) => EnqueueOutcome::Closed,
        }
    }

    /// Number of ids currently waiting in the queue.
    ///
    /// Derived from the channel's free permits, so it stays within
    /// `0..=capacity()` regardless of how sends and receives interleave.
    pub fn depth(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    /// Fixed capacity of the queue.
    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }
}

/// Consumer half of the job queue, shared by all workers.
#[derive(Debug, Clone)]
pub struct JobReceiver {
    rx: Arc<Mutex<mpsc::Receiver<Uuid>>>,
}

impl JobReceiver {
    /// Receives the next book id, waiting until one is available.
    ///
    /// Returns `None` once the sender has been dropped and the queue is
    /// drained, which is the workers' shutdown signal.
    pub async fn dequeue(&self) -> Option<Uuid> {
        let mut rx = self.rx.lock().await;
        rx.recv().await
    }
}
