use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing::{error, info};

use atlas_pipeline::config::PipelineConfig;
use atlas_pipeline::error::PipelineError;
use atlas_pipeline::logging;
use atlas_pipeline::pipeline::PipelineRunner;
use atlas_pipeline::sources::{
    LocationReader, NeighborhoodReader, PropertyReader, RowOutcome, WikipediaReader,
};

#[derive(Parser)]
#[command(name = "atlas_pipeline")]
#[command(about = "Real-estate and geographic knowledge base ingestion pipeline")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full ingestion-to-embedding pipeline
    Run {
        /// Path to the pipeline TOML configuration
        #[arg(long, default_value = "atlas.toml")]
        config: PathBuf,
        /// Cap on rows read per source (overrides run.sample_size)
        #[arg(long)]
        sample_size: Option<usize>,
        /// Skip all configured sinks for this run
        #[arg(long)]
        skip_sinks: bool,
    },
    /// Validate configuration and source availability, then exit
    Validate {
        #[arg(long, default_value = "atlas.toml")]
        config: PathBuf,
    },
    /// Print the first rows of a source as JSON lines
    Sample {
        #[arg(long, default_value = "atlas.toml")]
        config: PathBuf,
        /// Source to sample: property, neighborhood, wikipedia, locations
        #[arg(long)]
        source: String,
        #[arg(long, default_value_t = 5)]
        limit: usize,
    },
}

const EXIT_FATAL: i32 = 1;
const EXIT_CONFIG: i32 = 2;

fn load_config(path: &Path) -> Result<PipelineConfig, i32> {
    match PipelineConfig::load(path) {
        Ok(config) => Ok(config),
        Err(e) => {
            error!(error = %e, "invalid configuration");
            eprintln!("Configuration error: {e}");
            Err(EXIT_CONFIG)
        }
    }
}

#[tokio::main]
async fn main() {
    logging::init_logging();
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    let code = match cli.command {
        Commands::Run {
            config,
            sample_size,
            skip_sinks,
        } => run_pipeline(&config, sample_size, skip_sinks).await,
        Commands::Validate { config } => validate(&config),
        Commands::Sample {
            config,
            source,
            limit,
        } => sample(&config, &source, limit),
    };
    std::process::exit(code);
}

async fn run_pipeline(config_path: &Path, sample_size: Option<usize>, skip_sinks: bool) -> i32 {
    let mut config = match load_config(config_path) {
        Ok(config) => config,
        Err(code) => return code,
    };
    if sample_size.is_some() {
        config.run.sample_size = sample_size;
    }
    if skip_sinks {
        config.sinks.enabled.clear();
    }

    let runner = PipelineRunner::new(config);

    // Ctrl-c requests cooperative cancellation; partial tables are
    // preserved for diagnosis.
    let cancel = runner.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("cancellation requested, draining workers");
            let _ = cancel.send(true);
        }
    });

    match runner.run().await {
        Ok(report) => {
            print!("{}", report.summary());
            report.exit_code()
        }
        Err(PipelineError::Config(e)) => {
            error!(error = %e, "run aborted by configuration error");
            eprintln!("Configuration error: {e}");
            EXIT_CONFIG
        }
        Err(e) => {
            error!(error = %e, "pipeline run failed");
            eprintln!("Pipeline failed: {e}");
            EXIT_FATAL
        }
    }
}

fn validate(config_path: &Path) -> i32 {
    let config = match load_config(config_path) {
        Ok(config) => config,
        Err(code) => return code,
    };

    let mut ok = true;
    for (name, path) in [
        ("properties", &config.sources.properties),
        ("neighborhoods", &config.sources.neighborhoods),
        ("wikipedia_db", &config.sources.wikipedia_db),
        ("locations", &config.sources.locations),
    ] {
        let exists = Path::new(path).exists();
        println!("source {name}: {path} {}", if exists { "ok" } else { "MISSING" });
        ok &= exists;
    }
    println!(
        "embedding provider: {} (model {})",
        config.embedding.provider, config.embedding.model
    );
    println!("sinks enabled: {:?}", config.sinks.enabled);

    if ok {
        println!("configuration valid");
        0
    } else {
        EXIT_CONFIG
    }
}

fn sample(config_path: &Path, source: &str, limit: usize) -> i32 {
    let config = match load_config(config_path) {
        Ok(config) => config,
        Err(code) => return code,
    };

    let result = match source {
        "property" => PropertyReader::read(Path::new(&config.sources.properties), Some(limit))
            .map(|(outcomes, _)| print_outcomes(outcomes)),
        "neighborhood" => {
            NeighborhoodReader::read(Path::new(&config.sources.neighborhoods), Some(limit))
                .map(|(outcomes, _)| print_outcomes(outcomes))
        }
        "wikipedia" => WikipediaReader::read(Path::new(&config.sources.wikipedia_db), Some(limit))
            .map(|(outcomes, _)| print_outcomes(outcomes)),
        "locations" => LocationReader::read(Path::new(&config.sources.locations)).map(|(entries, _)| {
            for entry in entries.into_iter().take(limit) {
                match serde_json::to_string(&entry) {
                    Ok(line) => println!("{line}"),
                    Err(e) => eprintln!("could not render row: {e}"),
                }
            }
        }),
        other => {
            eprintln!("unknown source '{other}' (expected property, neighborhood, wikipedia, locations)");
            return EXIT_CONFIG;
        }
    };

    match result {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("sample failed: {e}");
            EXIT_FATAL
        }
    }
}

fn print_outcomes<T: serde::Serialize>(outcomes: Vec<RowOutcome<T>>) {
    for outcome in outcomes {
        match serde_json::to_string(outcome.record()) {
            Ok(line) => println!("{line}"),
            Err(e) => eprintln!("could not render row: {e}"),
        }
        if outcome.is_corrupt() {
            eprintln!("  (row is corrupt)");
        }
    }
}
