//! BatchRun CLI - Run a batch of tasks under one deadline and report the outcomes.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use batchrun_core::{BatchSummary, Outcome, TaskSpec};
use batchrun_executor::{
    random_batch, BatchProfile, ExecutorConfig, Orchestrator, MIN_LIVENESS_GRACE,
};

const MIN_GRACE_MS: u64 = MIN_LIVENESS_GRACE.as_millis() as u64;

/// BatchRun CLI - Deadline-bounded parallel task batches
#[derive(Parser)]
#[command(name = "batchrun")]
#[command(about = "Run a batch of tasks in parallel under a shared deadline", long_about = None)]
struct Cli {
    /// Log filter (e.g. "debug", "batchrun_executor=trace"); overrides RUST_LOG
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a batch and print the summary
    Run {
        /// Batch deadline in milliseconds
        #[arg(short, long, default_value = "3000")]
        deadline_ms: u64,

        /// Load the batch from a JSON file instead of generating one
        #[arg(
            short,
            long,
            conflicts_with_all = ["tasks", "min_ms", "max_ms", "failure_rate", "seed"]
        )]
        input: Option<PathBuf>,

        /// How long past the deadline to wait for stragglers, in milliseconds (minimum 10)
        #[arg(
            long,
            default_value = "1000",
            value_parser = clap::value_parser!(u64).range(MIN_GRACE_MS..)
        )]
        grace_ms: u64,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        profile: ProfileArgs,
    },

    /// Generate a random batch and print it as JSON
    Generate {
        #[command(flatten)]
        profile: ProfileArgs,
    },
}

#[derive(Args)]
struct ProfileArgs {
    /// Number of tasks to generate
    #[arg(short, long, default_value = "5")]
    tasks: usize,

    /// Shortest task duration in milliseconds
    #[arg(long, default_value = "1000")]
    min_ms: u64,

    /// Longest task duration in milliseconds
    #[arg(long, default_value = "4000")]
    max_ms: u64,

    /// Probability that a task fails
    #[arg(long, default_value = "0.2")]
    failure_rate: f64,

    /// RNG seed for a reproducible batch
    #[arg(long)]
    seed: Option<u64>,
}

impl ProfileArgs {
    fn generate(&self) -> Result<Vec<TaskSpec>, Box<dyn std::error::Error>> {
        let profile = BatchProfile::new(
            Duration::from_millis(self.min_ms),
            Duration::from_millis(self.max_ms),
            self.failure_rate,
        );
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(random_batch(self.tasks, &profile, &mut rng)?)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing; stdout is reserved for the report
    let filter = match &cli.log_level {
        Some(level) => EnvFilter::try_new(level)?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Run {
            deadline_ms,
            input,
            grace_ms,
            json,
            profile,
        } => {
            let tasks = match input {
                Some(path) => load_batch(&path)?,
                None => profile.generate()?,
            };
            run_batch(tasks, deadline_ms, grace_ms, json).await?;
        }
        Commands::Generate { profile } => {
            let tasks = profile.generate()?;
            println!("{}", serde_json::to_string_pretty(&tasks)?);
        }
    }

    Ok(())
}

fn load_batch(path: &Path) -> Result<Vec<TaskSpec>, Box<dyn std::error::Error>> {
    let raw = std::fs::read_to_string(path)?;
    let tasks: Vec<TaskSpec> = serde_json::from_str(&raw)?;
    info!(path = %path.display(), tasks = tasks.len(), "Loaded batch file");
    Ok(tasks)
}

async fn run_batch(
    tasks: Vec<TaskSpec>,
    deadline_ms: u64,
    grace_ms: u64,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted; expiring the batch deadline");
                shutdown.cancel();
            }
        });
    }

    let config = ExecutorConfig::default().with_liveness_grace(Duration::from_millis(grace_ms));
    let orchestrator = Orchestrator::new(config).with_shutdown(shutdown);

    info!(tasks = tasks.len(), deadline_ms, "Starting batch");
    let summary = orchestrator
        .submit_batch(tasks, Duration::from_millis(deadline_ms))
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }

    Ok(())
}

fn print_summary(summary: &BatchSummary) {
    println!("Outcomes ({}):", summary.total());
    println!("{:<36}  {:<10}  {:>8}  {}", "TASK", "STATUS", "ELAPSED", "DETAIL");
    println!("{}", "-".repeat(80));

    for outcome in &summary.outcomes {
        println!(
            "{:<36}  {:<10}  {:>6}ms  {}",
            outcome.task_id.as_str(),
            outcome.status.as_str(),
            outcome.elapsed_ms,
            detail(outcome)
        );
    }

    println!();
    println!("--- Results ---");
    println!("Successful: {}", summary.success_count);
    println!("Failed:     {}", summary.failed_count);
    println!("Cancelled:  {}", summary.cancelled_count);
}

fn detail(outcome: &Outcome) -> &str {
    outcome
        .payload
        .as_deref()
        .or(outcome.error_detail.as_deref())
        .unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;
    use batchrun_core::TaskId;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_defaults() {
        let cli = Cli::try_parse_from(["batchrun", "run"]).unwrap();
        match cli.command {
            Commands::Run {
                deadline_ms,
                grace_ms,
                json,
                input,
                profile,
            } => {
                assert_eq!(deadline_ms, 3000);
                assert_eq!(grace_ms, 1000);
                assert!(!json);
                assert!(input.is_none());
                assert_eq!(profile.tasks, 5);
                assert_eq!((profile.min_ms, profile.max_ms), (1000, 4000));
            }
            Commands::Generate { .. } => panic!("expected run"),
        }
    }

    #[test]
    fn test_input_conflicts_with_generation_flags() {
        let parsed =
            Cli::try_parse_from(["batchrun", "run", "--input", "batch.json", "--seed", "1"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_grace_below_minimum_rejected() {
        assert!(Cli::try_parse_from(["batchrun", "run", "--grace-ms", "0"]).is_err());
        assert!(Cli::try_parse_from(["batchrun", "run", "--grace-ms", "9"]).is_err());

        let cli = Cli::try_parse_from(["batchrun", "run", "--grace-ms", "10"]).unwrap();
        let Commands::Run { grace_ms, .. } = cli.command else {
            panic!("expected run");
        };
        assert_eq!(grace_ms, MIN_GRACE_MS);
    }

    #[test]
    fn test_seeded_generation_is_reproducible() {
        let cli =
            Cli::try_parse_from(["batchrun", "generate", "--tasks", "8", "--seed", "42"])
                .unwrap();
        let Commands::Generate { profile } = cli.command else {
            panic!("expected generate");
        };

        assert_eq!(profile.generate().unwrap(), profile.generate().unwrap());
    }

    #[test]
    fn test_detail_prefers_payload() {
        let ok = Outcome::success(TaskId::from("a"), "task a success");
        let failed = Outcome::failed(TaskId::from("b"), "domain failure");

        assert_eq!(detail(&ok), "task a success");
        assert_eq!(detail(&failed), "domain failure");
        assert_eq!(detail(&Outcome::cancelled(TaskId::from("c"))), "deadline exceeded");
    }
}
