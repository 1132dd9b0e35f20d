mod api;
mod config;
mod crawler;
mod messages;
mod output;

use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, info, warn};

use config::Config;
use crawler::{
    CancelHandle, CrawlOutcome, CrawlRequest, HttpLauncher, ProgressEvent, ScrapingService,
};
use messages::MessagePool;
use output::Format;

#[derive(Parser)]
#[command(name = "listing-harvester", about = "Listing crawler with batched contact extraction")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl one city and print the result
    Run {
        /// City slug as it appears in listing URLs
        #[arg(long)]
        city: String,
        #[arg(long, default_value_t = 1)]
        start: u32,
        #[arg(long, default_value_t = 1)]
        end: u32,
        /// Text carried in every deep link (default: one template per entry)
        #[arg(short, long)]
        message: Option<String>,
        /// Use one random template for every entry
        #[arg(long, conflicts_with = "message")]
        random_message: bool,
        #[arg(short, long, value_enum, default_value_t = Format::Json)]
        format: Format,
    },
    /// Serve the HTTP API
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = Config::from_env()?;

    let pool = match &cfg.messages_file {
        Some(path) => MessagePool::load(path)?,
        None => MessagePool::default(),
    };
    info!(templates = pool.len(), "Message templates loaded");

    let launcher = Arc::new(HttpLauncher::new(&cfg));
    let service = Arc::new(ScrapingService::new(cfg.clone(), pool, launcher));

    match cli.command {
        Commands::Serve => {
            api::serve(&cfg, service).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Run {
            city,
            start,
            end,
            message,
            random_message,
            format,
        } => {
            let message = match (message, random_message) {
                (Some(text), _) => text,
                (None, true) => service.messages().random().to_string(),
                (None, false) => String::new(),
            };
            let req = CrawlRequest {
                city_slug: city,
                start_page: start,
                end_page: end,
                message,
            };
            run_once(&service, &req, format).await
        }
    }
}

async fn run_once(
    service: &ScrapingService,
    req: &CrawlRequest,
    format: Format,
) -> anyhow::Result<ExitCode> {
    let cancel = CancelHandle::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, finishing the current batch");
                cancel.cancel();
            }
        }
    });

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
            )?
            .progress_chars("#>-"),
    );
    let sink = {
        let pb = pb.clone();
        move |e: ProgressEvent<'_>| {
            pb.set_length(e.total_known as u64);
            pb.set_position(e.processed as u64);
            pb.set_message(format!("batch {}: {}", e.batch + 1, e.latest.name));
        }
    };

    let outcome = service.run(req, &cancel, Some(Arc::new(sink))).await;
    pb.finish_and_clear();

    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(error = %e, "Crawl failed");
            return Ok(ExitCode::FAILURE);
        }
    };

    let code = match &outcome {
        CrawlOutcome::Completed(_) => ExitCode::SUCCESS,
        CrawlOutcome::Cancelled { reason, .. } => {
            warn!(?reason, "Crawl stopped early, output is partial");
            ExitCode::from(2)
        }
    };
    output::write_result(std::io::stdout().lock(), outcome.result(), format)?;
    Ok(code)
}
