//! End-to-end pipeline tests against in-memory stores and a mock
//! generation backend.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use bookwise::error::LlmError;
use bookwise::llm::{GenerationBackend, QuizGenerator};
use bookwise::models::{Book, Quiz, QuizState, QuizStatus};
use bookwise::scheduler::{EnqueueOutcome, PipelineConfig, PipelineError, QuizPipeline};
use bookwise::storage::{BookStore, DatabaseError, QuizStatusCounts, QuizStore};

#[derive(Default)]
struct MemoryStore {
    books: Mutex<HashMap<Uuid, Book>>,
    quizzes: Mutex<HashMap<Uuid, Quiz>>,
}

impl MemoryStore {
    fn add_book(&self, book: Book) -> Uuid {
        let id = book.id;
        self.books.lock().unwrap().insert(id, book);
        id
    }

    fn add_quiz(&self, quiz: Quiz) {
        self.quizzes.lock().unwrap().insert(quiz.id, quiz);
    }

    fn book(&self, id: Uuid) -> Book {
        self.books.lock().unwrap().get(&id).cloned().expect("book exists")
    }

    fn quiz_count(&self) -> usize {
        self.quizzes.lock().unwrap().len()
    }

    fn quizzes_for_book(&self, book_id: Uuid) -> Vec<Quiz> {
        self.quizzes
            .lock()
            .unwrap()
            .values()
            .filter(|q| q.book_id == book_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl BookStore for MemoryStore {
    async fn get_book(&self, id: Uuid) -> Result<Option<Book>, DatabaseError> {
        Ok(self.books.lock().unwrap().get(&id).cloned())
    }

    async fn insert_book(&self, book: &Book) -> Result<(), DatabaseError> {
        self.books.lock().unwrap().insert(book.id, book.clone());
        Ok(())
    }

    async fn find_by_isbn(&self, isbn: &str) -> Result<Option<Book>, DatabaseError> {
        Ok(self
            .books
            .lock()
            .unwrap()
            .values()
            .find(|b| b.isbn == isbn || b.isbn13 == isbn)
            .cloned())
    }

    async fn update_quiz_status(
        &self,
        id: Uuid,
        status: QuizStatus,
        quiz_id: Option<Uuid>,
    ) -> Result<(), DatabaseError> {
        let mut books = self.books.lock().unwrap();
        let book = books
            .get_mut(&id)
            .ok_or_else(|| DatabaseError::NotFound(format!("Book {}", id)))?;

        book.quiz_status = status;
        if quiz_id.is_some() {
            book.quiz_id = quiz_id;
        }
        Ok(())
    }

    async fn find_by_quiz_status(
        &self,
        statuses: &[QuizStatus],
    ) -> Result<Vec<Book>, DatabaseError> {
        Ok(self
            .books
            .lock()
            .unwrap()
            .values()
            .filter(|b| statuses.contains(&b.quiz_status))
            .cloned()
            .collect())
    }

    async fn quiz_status_counts(&self) -> Result<QuizStatusCounts, DatabaseError> {
        let books = self.books.lock().unwrap();
        let mut counts = QuizStatusCounts {
            total: books.len() as i64,
            ..Default::default()
        };
        for book in books.values() {
            match book.quiz_status {
                QuizStatus::Pending => counts.pending += 1,
                QuizStatus::Generating => counts.generating += 1,
                QuizStatus::Completed => counts.completed += 1,
                QuizStatus::Failed => counts.failed += 1,
            }
        }
        Ok(counts)
    }
}

#[async_trait]
impl QuizStore for MemoryStore {
    async fn create_quiz(&self, quiz: &Quiz) -> Result<(), DatabaseError> {
        let mut quizzes = self.quizzes.lock().unwrap();
        if quizzes.values().any(|q| q.book_id == quiz.book_id) {
            return Err(DatabaseError::InvalidData(format!(
                "quiz already exists for book {}",
                quiz.book_id
            )));
        }
        quizzes.insert(quiz.id, quiz.clone());
        Ok(())
    }

    async fn get_quiz(&self, id: Uuid) -> Result<Option<Quiz>, DatabaseError> {
        Ok(self.quizzes.lock().unwrap().get(&id).cloned())
    }

    async fn find_by_book_and_status(
        &self,
        book_id: Uuid,
        status: QuizState,
    ) -> Result<Option<Quiz>, DatabaseError> {
        Ok(self
            .quizzes
            .lock()
            .unwrap()
            .values()
            .find(|q| q.book_id == book_id && q.status == status)
            .cloned())
    }

    async fn delete_by_book_and_status(
        &self,
        book_id: Uuid,
        status: QuizState,
    ) -> Result<u64, DatabaseError> {
        let mut quizzes = self.quizzes.lock().unwrap();
        let before = quizzes.len();
        quizzes.retain(|_, q| !(q.book_id == book_id && q.status == status));
        Ok((before - quizzes.len()) as u64)
    }
}

struct MockBackend {
    response: Result<String, String>,
    calls: AtomicUsize,
}

impl MockBackend {
    fn succeeding() -> Self {
        Self {
            response: Ok(valid_quiz_json(5)),
            calls: AtomicUsize::new(0),
        }
    }

    fn failing(message: &str) -> Self {
        Self {
            response: Err(message.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerationBackend for MockBackend {
    async fn generate(&self, _prompt: &str) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.response {
            Ok(text) => Ok(text.clone()),
            Err(message) => Err(LlmError::RequestFailed(message.clone())),
        }
    }
}

fn valid_quiz_json(question_count: usize) -> String {
    let questions: Vec<serde_json::Value> = (0..question_count)
        .map(|i| {
            serde_json::json!({
                "question": format!("Question {}?", i + 1),
                "options": ["A) one", "B) two", "C) three", "D) four"],
                "answer": "A) one",
                "explanation": "Because.",
            })
        })
        .collect();
    serde_json::json!({ "quiz": questions }).to_string()
}

fn build_pipeline(
    store: Arc<MemoryStore>,
    backend: Arc<MockBackend>,
    worker_count: usize,
    queue_capacity: usize,
    retry_limit: u32,
) -> Arc<QuizPipeline> {
    let generator = QuizGenerator::new(backend as Arc<dyn GenerationBackend>, "test-model")
        .with_retry_limit(retry_limit)
        .with_backoff_step(Duration::from_millis(1));

    let config = PipelineConfig::default()
        .with_worker_count(worker_count)
        .with_queue_capacity(queue_capacity);

    Arc::new(QuizPipeline::new(
        Arc::new(generator),
        Arc::clone(&store) as Arc<dyn BookStore>,
        store as Arc<dyn QuizStore>,
        config,
    ))
}

#[tokio::test]
async fn generates_quiz_for_pending_book() {
    let store = Arc::new(MemoryStore::default());
    let backend = Arc::new(MockBackend::succeeding());
    let book_id = store.add_book(Book::new("Dune", "9780441172719"));

    let pipeline = build_pipeline(Arc::clone(&store), Arc::clone(&backend), 3, 100, 3);
    pipeline.start().expect("pipeline starts");
    assert_eq!(pipeline.enqueue(book_id).expect("running"), EnqueueOutcome::Queued);
    pipeline.stop().await.expect("pipeline drains and stops");

    let book = store.book(book_id);
    assert_eq!(book.quiz_status, QuizStatus::Completed);
    let quiz_id = book.quiz_id.expect("quiz id stamped on book");

    let quizzes = store.quizzes_for_book(book_id);
    assert_eq!(quizzes.len(), 1);
    assert_eq!(quizzes[0].id, quiz_id);
    assert_eq!(quizzes[0].status, QuizState::Completed);
    assert_eq!(quizzes[0].questions.len(), 5);
    assert_eq!(backend.call_count(), 1);
}

#[tokio::test]
async fn generated_quiz_is_retrievable_through_stamped_id() {
    let store = Arc::new(MemoryStore::default());
    let backend = Arc::new(MockBackend::succeeding());
    let book_id = store.add_book(Book::new("Dune", "9780441172719"));

    let pipeline = build_pipeline(Arc::clone(&store), backend, 1, 100, 3);
    pipeline.start().expect("pipeline starts");
    pipeline.enqueue(book_id).expect("running");
    pipeline.stop().await.expect("pipeline stops");

    // The read path: load the book, follow quiz_id, fetch the quiz.
    let book = (&*store as &dyn BookStore)
        .get_book(book_id)
        .await
        .expect("lookup succeeds")
        .expect("book exists");
    let quiz_id = book.quiz_id.expect("quiz id stamped");

    let quiz = (&*store as &dyn QuizStore)
        .get_quiz(quiz_id)
        .await
        .expect("lookup succeeds")
        .expect("quiz exists");

    assert_eq!(quiz.book_id, book_id);
    assert_eq!(quiz.status, QuizState::Completed);
    assert_eq!(quiz.questions.len(), 5);
}

#[tokio::test]
async fn completed_book_short_circuits_without_backend_call() {
    let store = Arc::new(MemoryStore::default());
    let backend = Arc::new(MockBackend::succeeding());

    // A completed quiz exists but the book's status was never stamped,
    // as after a crash between the two writes.
    let book_id = store.add_book(Book::new("Dune", "9780441172719"));
    let existing = Quiz::completed(book_id, "test-model", vec![]);
    let existing_id = existing.id;
    store.add_quiz(existing);

    let pipeline = build_pipeline(Arc::clone(&store), Arc::clone(&backend), 1, 100, 3);
    pipeline.start().expect("pipeline starts");
    pipeline.enqueue(book_id).expect("running");
    pipeline.stop().await.expect("pipeline stops");

    let book = store.book(book_id);
    assert_eq!(book.quiz_status, QuizStatus::Completed);
    assert_eq!(book.quiz_id, Some(existing_id));
    assert_eq!(store.quiz_count(), 1);
    assert_eq!(backend.call_count(), 0);
}

#[tokio::test]
async fn retry_exhaustion_persists_failure_marker() {
    let store = Arc::new(MemoryStore::default());
    let backend = Arc::new(MockBackend::failing("upstream 503"));
    let book_id = store.add_book(Book::new("Dune", "9780441172719"));

    let pipeline = build_pipeline(Arc::clone(&store), Arc::clone(&backend), 1, 100, 2);
    pipeline.start().expect("pipeline starts");
    pipeline.enqueue(book_id).expect("running");
    pipeline.stop().await.expect("pipeline stops");

    // The generator gets exactly its retry budget, no more.
    assert_eq!(backend.call_count(), 2);

    let book = store.book(book_id);
    assert_eq!(book.quiz_status, QuizStatus::Failed);

    let quizzes = store.quizzes_for_book(book_id);
    assert_eq!(quizzes.len(), 1);
    assert_eq!(quizzes[0].status, QuizState::Failed);
    assert_eq!(quizzes[0].retry_count, 2);
    assert!(quizzes[0].questions.is_empty());
    assert!(quizzes[0].error_log.contains("upstream 503"));

    // The book never references the failure marker; a later attempt
    // deletes it, which would leave a stamped quiz_id dangling.
    assert_eq!(book.quiz_id, None);
}

#[tokio::test]
async fn stale_failure_marker_is_replaced_by_completed_quiz() {
    let store = Arc::new(MemoryStore::default());
    let backend = Arc::new(MockBackend::succeeding());

    let book = Book::new("Dune", "9780441172719").with_quiz_status(QuizStatus::Failed);
    let book_id = store.add_book(book);
    store.add_quiz(Quiz::failure_marker(book_id, "test-model", 3, "old error"));

    let pipeline = build_pipeline(Arc::clone(&store), Arc::clone(&backend), 1, 100, 3);
    pipeline.start().expect("pipeline starts");
    pipeline.enqueue(book_id).expect("running");
    pipeline.stop().await.expect("pipeline stops");

    let book = store.book(book_id);
    assert_eq!(book.quiz_status, QuizStatus::Completed);

    // Exactly one quiz remains and it is the fresh completed one.
    let quizzes = store.quizzes_for_book(book_id);
    assert_eq!(quizzes.len(), 1);
    assert_eq!(quizzes[0].status, QuizState::Completed);
    assert_eq!(quizzes[0].questions.len(), 5);
}

#[tokio::test]
async fn book_is_never_left_generating() {
    let store = Arc::new(MemoryStore::default());
    let backend = Arc::new(MockBackend::failing("always down"));
    let book_id = store.add_book(Book::new("Dune", "9780441172719"));

    let pipeline = build_pipeline(Arc::clone(&store), backend, 2, 100, 2);
    pipeline.start().expect("pipeline starts");
    pipeline.enqueue(book_id).expect("running");
    pipeline.stop().await.expect("pipeline stops");

    let book = store.book(book_id);
    assert_ne!(book.quiz_status, QuizStatus::Generating);
    assert_eq!(book.quiz_status, QuizStatus::Failed);
}

#[tokio::test]
async fn full_queue_drops_jobs_without_blocking() {
    let store = Arc::new(MemoryStore::default());
    let backend = Arc::new(MockBackend::succeeding());

    // No workers, so nothing drains the queue.
    let pipeline = build_pipeline(Arc::clone(&store), backend, 0, 2, 3);
    pipeline.start().expect("pipeline starts");

    let ids: Vec<Uuid> = (0..4)
        .map(|i| store.add_book(Book::new(format!("Book {}", i), format!("isbn-{}", i))))
        .collect();

    assert_eq!(pipeline.enqueue(ids[0]).expect("running"), EnqueueOutcome::Queued);
    assert_eq!(pipeline.enqueue(ids[1]).expect("running"), EnqueueOutcome::Queued);
    assert_eq!(pipeline.enqueue(ids[2]).expect("running"), EnqueueOutcome::Dropped);
    assert_eq!(pipeline.enqueue(ids[3]).expect("running"), EnqueueOutcome::Dropped);
    assert_eq!(pipeline.queue_depth(), 2);

    pipeline.stop().await.expect("pipeline stops");
}

#[tokio::test]
async fn enqueue_requires_running_pipeline() {
    let store = Arc::new(MemoryStore::default());
    let backend = Arc::new(MockBackend::succeeding());
    let book_id = store.add_book(Book::new("Dune", "9780441172719"));

    let pipeline = build_pipeline(store, backend, 1, 100, 3);

    assert!(matches!(
        pipeline.enqueue(book_id),
        Err(PipelineError::NotRunning)
    ));
}

#[tokio::test]
async fn start_and_stop_are_not_reentrant() {
    let store = Arc::new(MemoryStore::default());
    let backend = Arc::new(MockBackend::succeeding());
    let pipeline = build_pipeline(store, backend, 1, 100, 3);

    pipeline.start().expect("first start succeeds");
    assert!(matches!(pipeline.start(), Err(PipelineError::AlreadyRunning)));
    assert!(pipeline.is_running());

    pipeline.stop().await.expect("first stop succeeds");
    assert!(!pipeline.is_running());
    assert!(matches!(pipeline.stop().await, Err(PipelineError::NotRunning)));

    // The pipeline can be started again after a clean stop.
    pipeline.start().expect("restart succeeds");
    pipeline.stop().await.expect("second stop succeeds");
}

#[tokio::test]
async fn startup_sweep_enqueues_pending_and_failed_books() {
    let store = Arc::new(MemoryStore::default());
    let backend = Arc::new(MockBackend::succeeding());

    store.add_book(Book::new("A", "isbn-a"));
    store.add_book(Book::new("B", "isbn-b").with_quiz_status(QuizStatus::Failed));
    store.add_book(Book::new("C", "isbn-c").with_quiz_status(QuizStatus::Completed));

    // No workers so we can observe what the sweep queued.
    let pipeline = build_pipeline(Arc::clone(&store), backend, 0, 100, 3);
    pipeline.start().expect("pipeline starts");

    let queued = pipeline.process_all_pending().await.expect("sweep runs");
    assert_eq!(queued, 2);
    assert_eq!(pipeline.queue_depth(), 2);

    pipeline.stop().await.expect("pipeline stops");
}

#[tokio::test]
async fn retry_sweep_resets_failed_books_to_pending() {
    let store = Arc::new(MemoryStore::default());
    let backend = Arc::new(MockBackend::succeeding());

    let failed_ids: Vec<Uuid> = (0..3)
        .map(|i| {
            store.add_book(
                Book::new(format!("F{}", i), format!("isbn-f{}", i))
                    .with_quiz_status(QuizStatus::Failed),
            )
        })
        .collect();
    store.add_book(Book::new("Done", "isbn-done").with_quiz_status(QuizStatus::Completed));

    let pipeline = build_pipeline(Arc::clone(&store), backend, 0, 100, 3);
    pipeline.start().expect("pipeline starts");

    let queued = pipeline.retry_failed().await.expect("sweep runs");
    assert_eq!(queued, 3);
    assert_eq!(pipeline.queue_depth(), 3);

    for id in failed_ids {
        assert_eq!(store.book(id).quiz_status, QuizStatus::Pending);
    }

    // A second sweep finds nothing failed.
    assert_eq!(pipeline.retry_failed().await.expect("sweep runs"), 0);

    pipeline.stop().await.expect("pipeline stops");
}

#[tokio::test]
async fn periodic_retry_runs_and_stops_with_pipeline() {
    let store = Arc::new(MemoryStore::default());
    let backend = Arc::new(MockBackend::succeeding());

    let book_id = store.add_book(
        Book::new("Dune", "9780441172719").with_quiz_status(QuizStatus::Failed),
    );

    let pipeline = build_pipeline(Arc::clone(&store), backend, 0, 100, 3);
    pipeline.start().expect("pipeline starts");

    let sweep = Arc::clone(&pipeline).start_periodic_retry(Duration::from_millis(20));
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(store.book(book_id).quiz_status, QuizStatus::Pending);
    assert_eq!(pipeline.queue_depth(), 1);

    pipeline.stop().await.expect("pipeline stops");

    // Stop signals the sweep; it must terminate on its own.
    tokio::time::timeout(Duration::from_secs(1), sweep)
        .await
        .expect("sweep task terminates")
        .expect("sweep task does not panic");
}

#[tokio::test]
async fn stats_reflect_catalog_and_pipeline_state() {
    let store = Arc::new(MemoryStore::default());
    let backend = Arc::new(MockBackend::succeeding());

    store.add_book(Book::new("A", "isbn-a"));
    store.add_book(Book::new("B", "isbn-b").with_quiz_status(QuizStatus::Completed));
    store.add_book(Book::new("C", "isbn-c").with_quiz_status(QuizStatus::Failed));

    let pipeline = build_pipeline(Arc::clone(&store), backend, 2, 100, 3);

    let stats = pipeline.stats().await.expect("stats load");
    assert_eq!(stats.total_books, 3);
    assert_eq!(stats.pending, 1);
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.worker_count, 2);
    assert!(!stats.running);

    pipeline.start().expect("pipeline starts");
    let stats = pipeline.stats().await.expect("stats load");
    assert!(stats.running);

    pipeline.stop().await.expect("pipeline stops");
}
