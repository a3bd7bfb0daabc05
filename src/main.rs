//! Storybook Builder CLI
//!
//! Runs the pipeline workers (story, illustration, finalize) against the
//! jobs table, and provides manual triggers for the two pipeline stages.

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use storybook_builder::ai::{OpenAiImageModel, OpenAiTextModel};
use storybook_builder::assets::CloudinaryStore;
use storybook_builder::db::{books, create_pool_from_env, pages};
use storybook_builder::fetch::HttpImageFetcher;
use storybook_builder::orchestrator;
use storybook_builder::queue::{FlowProducer, JobQueue, QueueName};
use storybook_builder::worker::{
    setup_signal_handler, FinalizeProcessor, IllustrationProcessor, PipelineWorkers,
    StoryProcessor, WorkerConfig, WorkerRunner,
};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "storybook-builder")]
#[command(about = "Generate illustrated children's books from photo drafts")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum QueueArg {
    Story,
    Illustration,
    Finalize,
    All,
}

#[derive(Subcommand)]
enum Commands {
    /// Run as worker, polling the jobs table
    Worker {
        /// Queue to work (default: all three)
        #[arg(short, long, value_enum, default_value = "all")]
        queue: QueueArg,

        /// Poll interval in seconds (default: 5)
        #[arg(short, long, default_value = "5")]
        poll_interval: u64,

        /// Job timeout in seconds (default: 300)
        #[arg(short, long, default_value = "300")]
        timeout: u64,

        /// Run at most one job and exit (for testing)
        #[arg(long)]
        once: bool,
    },

    /// Trigger story generation for a book
    GenerateStory {
        /// Book ID
        #[arg(short, long)]
        book_id: Uuid,

        /// Owning user ID
        #[arg(short, long)]
        user_id: String,
    },

    /// Trigger illustration generation for a book with a completed story
    GenerateIllustrations {
        /// Book ID
        #[arg(short, long)]
        book_id: Uuid,

        /// Owning user ID
        #[arg(short, long)]
        user_id: String,
    },

    /// Show a book's pipeline status and per-page outcomes
    Status {
        /// Book ID
        #[arg(short, long)]
        book_id: Uuid,
    },
}

fn build_workers() -> Result<PipelineWorkers> {
    let text_model = OpenAiTextModel::from_env()?;
    let image_model = OpenAiImageModel::from_env()?;
    let fetcher = HttpImageFetcher::new()?;
    let asset_store = CloudinaryStore::from_env()?;

    Ok(PipelineWorkers {
        story: StoryProcessor::new(Arc::new(text_model)),
        illustration: IllustrationProcessor::new(
            Arc::new(fetcher),
            Arc::new(image_model),
            Arc::new(asset_store),
        ),
        finalize: FinalizeProcessor::new(),
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Load .env file if present
    dotenvy::dotenv().ok();

    match cli.command {
        Commands::Worker {
            queue,
            poll_interval,
            timeout,
            once,
        } => {
            info!("Initializing worker...");

            let pool = create_pool_from_env().await?;
            info!("Database connection established");

            let config = WorkerConfig::builder()
                .poll_interval_secs(poll_interval)
                .job_timeout(Duration::from_secs(timeout))
                .build();

            let workers = Arc::new(build_workers()?);
            let queue_client = JobQueue::new(pool);
            let shutdown = Arc::new(AtomicBool::new(false));

            let queues: Vec<QueueName> = match queue {
                QueueArg::Story => vec![QueueName::StoryGeneration],
                QueueArg::Illustration => vec![QueueName::IllustrationGeneration],
                QueueArg::Finalize => vec![QueueName::BookFinalize],
                QueueArg::All => vec![
                    QueueName::StoryGeneration,
                    QueueName::IllustrationGeneration,
                    QueueName::BookFinalize,
                ],
            };

            if once {
                info!("Running in single-job mode...");
                let runner = WorkerRunner::new(
                    queue_client,
                    config,
                    workers,
                    shutdown,
                );
                let mut processed = false;
                for queue in queues {
                    if runner.run_once(queue).await? {
                        processed = true;
                        break;
                    }
                }
                if processed {
                    println!("Job processed");
                } else {
                    println!("No runnable jobs found");
                }
                return Ok(());
            }

            setup_signal_handler(shutdown.clone());

            let mut handles = Vec::new();
            for queue in queues {
                let runner = WorkerRunner::new(
                    queue_client.clone(),
                    config.clone(),
                    workers.clone(),
                    shutdown.clone(),
                );
                handles.push(tokio::spawn(async move { runner.run(queue).await }));
            }
            for handle in handles {
                handle.await??;
            }
        }

        Commands::GenerateStory { book_id, user_id } => {
            let pool = create_pool_from_env().await?;
            let queue_client = JobQueue::new(pool.clone());

            let job_id =
                orchestrator::enqueue_story_generation(&pool, &queue_client, book_id, &user_id)
                    .await?;
            println!("Story generation enqueued as job {}", job_id);
        }

        Commands::GenerateIllustrations { book_id, user_id } => {
            let pool = create_pool_from_env().await?;
            let flow = FlowProducer::new(pool.clone());

            let parent_id =
                orchestrator::enqueue_illustration_flow(&pool, &flow, book_id, &user_id).await?;
            println!("Illustration flow enqueued, finalize job {}", parent_id);
        }

        Commands::Status { book_id } => {
            let pool = create_pool_from_env().await?;

            let Some(book) = books::get_book(&pool, book_id).await? else {
                eprintln!("Book {} not found", book_id);
                std::process::exit(1);
            };

            println!("Book: {}", book.id);
            println!("  Title: {}", book.title.as_deref().unwrap_or("(untitled)"));
            println!("  Status: {}", book.status);
            if let Some(total) = book.total_tokens {
                println!("  Story tokens: {}", total);
            }

            let snapshot = pages::moderation_snapshot(&pool, book_id).await?;
            println!("  Pages ({}):", snapshot.len());
            for page in snapshot {
                println!(
                    "    page {}: {} {}",
                    page.page_number,
                    page.moderation_status.as_deref().unwrap_or("PENDING"),
                    page.generated_image_url.as_deref().unwrap_or("-")
                );
            }
        }
    }

    Ok(())
}
