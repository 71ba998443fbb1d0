use std::error::Error;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use jobwatch_core::app::{DEFAULT_BULK_WORKERS, JobFilter, JobList, WatchOptions};
use jobwatch_core::impls::{HttpExecutionGateway, TerminalDisplay};
use jobwatch_core::ports::ListQuery;
use jobwatch_core::render::TextRenderer;
use jobwatch_core::{Client, ClientConfig, ExecutionStatus};

/// jobwatch - track tool executions on the DeepOrigin Platform
///
/// Credentials come from DEEPORIGIN_TOKEN / DEEPORIGIN_ORG_KEY.
#[derive(Parser, Debug)]
#[command(name = "jobwatch")]
#[command(version)]
#[command(about = "Track tool executions on the DeepOrigin Platform", long_about = None)]
struct Cli {
    /// API base URL (overrides DEEPORIGIN_BASE_URL / DEEPORIGIN_ENV)
    #[arg(long = "base-url", global = true)]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List executions as a table, followed by a status summary
    List {
        /// Keep only executions with this status (e.g. Running)
        #[arg(long)]
        status: Option<ExecutionStatus>,

        /// Keep only executions of this tool (e.g. deeporigin.docking)
        #[arg(long = "tool-key")]
        tool_key: Option<String>,

        #[arg(long = "page-size", default_value_t = ListQuery::DEFAULT_PAGE_SIZE)]
        page_size: u32,

        /// Server-side ordering, e.g. "createdAt? desc"
        #[arg(long)]
        order: Option<String>,

        /// Server-side filter expression
        #[arg(long)]
        filter: Option<String>,

        /// Print the table as JSON
        #[arg(long)]
        json: bool,
    },

    /// Render one execution
    Show {
        id: String,

        /// Print the raw execution record as JSON
        #[arg(long)]
        json: bool,
    },

    /// Follow an execution until it finishes (Ctrl-C to stop)
    Watch {
        id: String,

        /// Seconds between refreshes (at least 1)
        #[arg(long, default_value_t = 5, value_parser = clap::value_parser!(u64).range(1..))]
        interval: u64,
    },

    /// Cancel one or more executions
    Cancel {
        #[arg(required = true)]
        ids: Vec<String>,

        #[arg(long, default_value_t = DEFAULT_BULK_WORKERS)]
        workers: usize,
    },

    /// Approve one or more quoted executions
    Confirm {
        #[arg(required = true)]
        ids: Vec<String>,

        #[arg(long, default_value_t = DEFAULT_BULK_WORKERS)]
        workers: usize,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let mut config = ClientConfig::from_env()?;
    if let Some(base_url) = cli.base_url {
        config = ClientConfig::new(base_url, config.token, config.org_key)
            .with_timeout(config.timeout);
    }
    // gateway は 1 度だけ作り、全コマンドで共有する
    let client = Client::new(Arc::new(HttpExecutionGateway::new(&config)?));
    let renderer = Arc::new(TextRenderer::new());
    let display = Arc::new(TerminalDisplay::stdout());

    match cli.command {
        Command::List {
            status,
            tool_key,
            page_size,
            order,
            filter,
            json,
        } => {
            let mut query = ListQuery::new().with_page_size(page_size);
            if let Some(order) = order {
                query = query.with_order(order);
            }
            if let Some(filter) = filter {
                query = query.with_filter(filter);
            }

            let mut criteria = JobFilter::new();
            if let Some(status) = status {
                criteria = criteria.status(status);
            }
            if let Some(tool_key) = tool_key {
                criteria = criteria.tool_key(tool_key);
            }
            let jobs = client.list_jobs(&query).await?.filter(&criteria);

            if json {
                println!("{}", serde_json::to_string_pretty(&jobs.to_table())?);
            } else {
                print!("{}", jobs.to_table());
                println!();
                println!("{}", jobs.summary());
            }
        }
        Command::Show { id, json } => {
            let job = client.job(id).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&job.snapshot())?);
            } else {
                job.show(renderer.as_ref(), display.as_ref());
            }
        }
        Command::Watch { id, interval } => {
            let job = client.job(id).await?;
            let options = WatchOptions::default().with_interval(Duration::from_secs(interval));
            let Some(mut handle) = job.watch(renderer, display, options)? else {
                return Ok(());
            };

            let interrupted = tokio::select! {
                _ = handle.wait() => false,
                _ = tokio::signal::ctrl_c() => true,
            };
            if interrupted {
                job.stop_watching();
                handle.stop_and_join().await;
            }
        }
        Command::Cancel { ids, workers } => {
            let jobs = JobList::from_ids(&client, ids).await?;
            jobs.cancel_all(workers).await?;
            println!("cancellation requested for {} execution(s)", jobs.len());
        }
        Command::Confirm { ids, workers } => {
            let jobs = JobList::from_ids(&client, ids).await?;
            jobs.confirm_all(workers).await?;
            println!("confirmed {} execution(s)", jobs.len());
        }
    }
    Ok(())
}
