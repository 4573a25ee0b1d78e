//! CLI command definitions and handlers.

use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};

use crate::config::Config;
use crate::llm::{GeminiClient, GenerationBackend, QuizGenerator};
use crate::models::QuizStatus;
use crate::scheduler::{EnqueueOutcome, PipelineConfig, PipelineStats, QuizPipeline};
use crate::sources::{BookMerger, SearchKind};
use crate::storage::{BookStore, Database, QuizStore};

/// Book catalog with background quiz generation.
#[derive(Parser)]
#[command(name = "bookwise")]
#[command(about = "Ingest book metadata and generate quizzes in the background")]
#[command(version)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Run the quiz pipeline until interrupted.
    ///
    /// Sweeps pending and failed books at startup, then generates quizzes
    /// for enqueued books and periodically re-queues failures.
    Run,

    /// Look up a book in the metadata sources and store it.
    Ingest(IngestArgs),

    /// Print a stored book's generated quiz as JSON.
    Quiz(QuizArgs),

    /// Look up a stored book by ISBN and print it as JSON.
    Book(BookArgs),

    /// List stored books, optionally filtered by quiz status.
    List(ListArgs),

    /// Print catalog and pipeline statistics as JSON.
    Stats,

    /// Apply database migrations and exit.
    Migrate,
}

/// Arguments for `bookwise quiz`.
#[derive(Parser, Debug)]
pub struct QuizArgs {
    /// Id of the book whose quiz to print.
    pub book_id: uuid::Uuid,
}

/// Arguments for `bookwise book`.
#[derive(Parser, Debug)]
pub struct BookArgs {
    /// ISBN-10 or ISBN-13 of the stored book.
    pub isbn: String,
}

/// Arguments for `bookwise list`.
#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Only list books in this quiz status
    /// (pending, generating, completed, failed).
    #[arg(short, long)]
    pub status: Option<String>,
}

/// Arguments for `bookwise ingest`.
#[derive(Parser, Debug)]
pub struct IngestArgs {
    /// The search query (ISBN, title, or author depending on --kind).
    pub query: String,

    /// What the query matches against.
    #[arg(short, long, value_enum, default_value = "isbn")]
    pub kind: SearchKind,

    /// Generate the quiz immediately instead of leaving the book pending.
    #[arg(long)]
    pub generate: bool,
}

/// Parses command-line arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Executes the parsed command.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run => run_pipeline().await,
        Commands::Ingest(args) => ingest(args).await,
        Commands::Quiz(args) => show_quiz(args).await,
        Commands::Book(args) => show_book(args).await,
        Commands::List(args) => list_books(args).await,
        Commands::Stats => stats().await,
        Commands::Migrate => migrate().await,
    }
}

async fn connect() -> anyhow::Result<(Config, Arc<Database>)> {
    let config = Config::from_env()?;
    let database = Database::connect(&config.database_url).await?;
    Ok((config, Arc::new(database)))
}

fn build_pipeline(config: &Config, database: Arc<Database>) -> anyhow::Result<Arc<QuizPipeline>> {
    let api_key = config
        .gemini_api_key
        .clone()
        .ok_or(crate::error::LlmError::MissingApiKey)?;

    let backend = GeminiClient::new(api_key, &config.gemini_model)?;
    let generator = QuizGenerator::new(
        Arc::new(backend) as Arc<dyn GenerationBackend>,
        &config.gemini_model,
    )
    .with_question_count(config.quiz_questions_count)
    .with_retry_limit(config.quiz_retry_limit);

    let pipeline_config = PipelineConfig::default()
        .with_worker_count(config.quiz_worker_count)
        .with_queue_capacity(config.quiz_queue_capacity);

    Ok(Arc::new(QuizPipeline::new(
        Arc::new(generator),
        Arc::clone(&database) as Arc<dyn BookStore>,
        database as Arc<dyn QuizStore>,
        pipeline_config,
    )))
}

async fn run_pipeline() -> anyhow::Result<()> {
    let (config, database) = connect().await?;
    database.run_migrations().await?;

    let pipeline = build_pipeline(&config, database)?;
    pipeline.start()?;
    pipeline.process_all_pending().await?;
    let sweep = Arc::clone(&pipeline).start_periodic_retry(config.quiz_retry_interval);

    info!("pipeline running, press ctrl-c to stop");
    tokio::signal::ctrl_c().await?;

    pipeline.stop().await?;
    sweep.await?;

    Ok(())
}

async fn ingest(args: IngestArgs) -> anyhow::Result<()> {
    let (config, database) = connect().await?;
    database.run_migrations().await?;

    let merger = BookMerger::new(config.google_books_api_key.clone())?;
    let book = merger.search_book(&args.query, args.kind).await?;

    if let Some(existing) = database.find_by_isbn(&book.isbn).await? {
        warn!(
            book_id = %existing.id,
            isbn = %existing.isbn,
            "book already in catalog, skipping insert"
        );
        println!("{}", serde_json::to_string_pretty(&existing)?);
        return Ok(());
    }

    database.insert_book(&book).await?;
    info!(book_id = %book.id, title = %book.title, "book stored");

    if args.generate {
        let pipeline = build_pipeline(&config, database)?;
        pipeline.start()?;

        if pipeline.enqueue(book.id)? != EnqueueOutcome::Queued {
            warn!(book_id = %book.id, "could not enqueue generation job");
        }

        // Stopping drains the queue, so the job finishes before we exit.
        pipeline.stop().await?;
    }

    println!("{}", serde_json::to_string_pretty(&book)?);
    Ok(())
}

async fn show_quiz(args: QuizArgs) -> anyhow::Result<()> {
    let (_, database) = connect().await?;

    let book = database
        .get_book(args.book_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("no book with id {}", args.book_id))?;

    let quiz_id = book.quiz_id.ok_or_else(|| {
        anyhow::anyhow!(
            "'{}' has no quiz yet (status: {})",
            book.title,
            book.quiz_status
        )
    })?;

    let quiz = database
        .get_quiz(quiz_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("quiz {} not found", quiz_id))?;

    println!("{}", serde_json::to_string_pretty(&quiz)?);
    Ok(())
}

async fn show_book(args: BookArgs) -> anyhow::Result<()> {
    let (_, database) = connect().await?;

    let book = database
        .find_by_isbn(&args.isbn)
        .await?
        .ok_or_else(|| anyhow::anyhow!("no stored book with isbn {}", args.isbn))?;

    println!("{}", serde_json::to_string_pretty(&book)?);
    Ok(())
}

async fn list_books(args: ListArgs) -> anyhow::Result<()> {
    let (_, database) = connect().await?;

    let statuses = match &args.status {
        Some(status) => vec![status
            .parse::<QuizStatus>()
            .map_err(anyhow::Error::msg)?],
        None => vec![
            QuizStatus::Pending,
            QuizStatus::Generating,
            QuizStatus::Completed,
            QuizStatus::Failed,
        ],
    };

    let books = database.find_by_quiz_status(&statuses).await?;
    println!("{}", serde_json::to_string_pretty(&books)?);
    Ok(())
}

async fn stats() -> anyhow::Result<()> {
    let (config, database) = connect().await?;

    let counts = database.quiz_status_counts().await?;
    let stats = PipelineStats {
        total_books: counts.total,
        pending: counts.pending,
        generating: counts.generating,
        completed: counts.completed,
        failed: counts.failed,
        queue_size: 0,
        worker_count: config.quiz_worker_count,
        running: false,
    };

    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

async fn migrate() -> anyhow::Result<()> {
    let (_, database) = connect().await?;
    database.run_migrations().await?;

    let counts = database.quiz_status_counts().await?;
    info!(total_books = counts.total, "migrations applied");

    // Surface books stuck mid-generation from a previous crash.
    let stuck = database
        .find_by_quiz_status(&[QuizStatus::Generating])
        .await?;
    if !stuck.is_empty() {
        warn!(count = stuck.len(), "books left in generating state; run the pipeline to recover");
    }

    Ok(())
}
