use anyhow::Context;
use clap::{Parser, Subcommand};
use rand::SeedableRng;
use rand::rngs::StdRng;
use sds_vision::config::ExperimentConfig;
use sds_vision::core_modules::utils::image_helper;
use sds_vision::parallel_pipeline::ParallelExperiment;
use sds_vision::pipeline::{self, DEFAULT_AGENT_COUNT, DEFAULT_MAX_ITERATIONS};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

/// Handwritten-digit classification by Stochastic Diffusion Search.
#[derive(Parser)]
#[command(name = "sds_tester")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Directory holding the IDX image and label files [env: SDS_DATASET_DIR]
    #[arg(long, global = true)]
    dataset_dir: Option<PathBuf>,

    /// Number of SDS agents per classification
    #[arg(long, global = true, default_value_t = DEFAULT_AGENT_COUNT)]
    agent_count: usize,

    /// Fixed number of SDS iterations per classification
    #[arg(long, global = true, default_value_t = DEFAULT_MAX_ITERATIONS)]
    max_iterations: usize,

    /// Seed for every random draw; random when omitted [env: SDS_SEED]
    #[arg(long, global = true)]
    seed: Option<u64>,

    /// Cap on records decoded from each dataset file
    #[arg(long, global = true)]
    max_items: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify one randomly chosen test picture against a small training slice
    Example {
        /// Also save the chosen picture as a PNG
        #[arg(long)]
        png: Option<PathBuf>,
    },
    /// Classify every test picture against the full training set
    Experiment {
        /// Where to write the JSON results log [env: SDS_RESULTS_PATH]
        #[arg(long)]
        results: Option<PathBuf>,

        /// Size of the classification worker pool [env: SDS_WORKERS]
        #[arg(long)]
        workers: Option<usize>,
    },
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Example { .. } => "example",
            Commands::Experiment { .. } => "experiment",
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let mut config = ExperimentConfig::from_env();
    if let Some(dir) = cli.dataset_dir {
        config.dataset_dir = dir;
    }
    if cli.seed.is_some() {
        config.seed = cli.seed;
    }
    config.max_items = cli.max_items;
    config.pipeline.agent_count = cli.agent_count;
    config.pipeline.max_iterations = cli.max_iterations;
    let seed = config.seed.unwrap_or_else(rand::random);

    info!(
        "Starting {}. Agent count: {}, Max Iterations: {}, Seed: {}",
        cli.command.name(),
        config.pipeline.agent_count,
        config.pipeline.max_iterations,
        seed
    );

    match cli.command {
        Commands::Example { png } => {
            let mut rng = StdRng::seed_from_u64(seed);
            let outcome = pipeline::run_example(&config, &mut rng)
                .with_context(|| format!("example run over {}", config.dataset_dir.display()))?;
            if let Some(path) = png {
                image_helper::save_png(&outcome.reference, &path)
                    .with_context(|| format!("saving {}", path.display()))?;
                info!("Saved picture to {}", path.display());
            }
        }
        Commands::Experiment { results, workers } => {
            if let Some(path) = results {
                config.results_path = path;
            }
            if let Some(workers) = workers {
                config.workers = workers;
            }
            let report = ParallelExperiment::new(config.clone())
                .run(seed)
                .await
                .with_context(|| format!("experiment over {}", config.dataset_dir.display()))?;
            println!(
                "Processing complete. {}/{} correct ({:.1}%). Results saved to {}",
                report.correct,
                report.total(),
                report.accuracy(),
                config.results_path.display()
            );
        }
    }

    Ok(())
}
