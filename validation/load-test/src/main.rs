//! Load test CLI for the WMS/tile map serving stack.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use wms_load_test::{
    wms, HttpDispatcher, LoadRunner, ResultsReport, ScenarioGenerator, TestConfig, TestResults,
    UserGroup, WeightOverrides,
};

#[derive(Parser)]
#[command(name = "wms-load-test")]
#[command(about = "Load testing tool for WMS/tile map services", long_about = None)]
struct Cli {
    /// Log level
    #[arg(long, env = "LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a load test from a scenario file
    Run {
        /// Path to scenario YAML file
        #[arg(short, long)]
        scenario: PathBuf,

        /// Override test duration in seconds
        #[arg(short, long)]
        duration: Option<u64>,

        /// Multiply every user group's count (at least one user per group)
        #[arg(long)]
        users_scale: Option<f64>,

        /// Override RNG seed
        #[arg(long)]
        seed: Option<u64>,

        /// Output format: table (default), json, csv
        #[arg(short, long, default_value = "table")]
        output: String,
    },

    /// Run a quick smoke test with a single profile
    Quick {
        /// Profile to simulate
        #[arg(short, long, default_value = wms::BASELINE)]
        profile: String,

        /// Number of simulated users
        #[arg(short = 'n', long, default_value = "5")]
        users: u32,

        /// Test duration in seconds
        #[arg(short, long, default_value = "30")]
        duration: u64,

        /// Base URL
        #[arg(short, long, env = "WMS_BASE_URL", default_value = "http://localhost:8080")]
        url: String,

        /// RNG seed
        #[arg(long)]
        seed: Option<u64>,
    },

    /// List built-in profiles with their rules, weights and pacing
    List,

    /// Print generated requests as JSON lines without sending them
    Sample {
        /// Profile to sample
        #[arg(short, long, default_value = wms::BASELINE)]
        profile: String,

        /// RNG seed
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Number of requests to print
        #[arg(short = 'n', long, default_value = "10")]
        count: usize,

        /// Reference time for TIME/RUN offsets (RFC 3339, defaults to now)
        #[arg(long)]
        reference_time: Option<DateTime<Utc>>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment from .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(&cli.log_level)?;

    match cli.command {
        Commands::Run {
            scenario,
            duration,
            users_scale,
            seed,
            output,
        } => {
            info!(scenario = %scenario.display(), "Loading scenario");

            let mut config = TestConfig::from_file(&scenario)?;
            if let Some(d) = duration {
                config.duration_secs = d;
            }
            if let Some(scale) = users_scale {
                config.scale_users(scale);
            }
            if seed.is_some() {
                config.seed = seed;
            }
            config.validate()?;

            info!(
                name = %config.name,
                description = %config.description,
                users = config.total_users(),
                "Configuration loaded"
            );

            let scenario_name = scenario
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_else(|| config.name.clone());
            let results = run(config, scenario_name).await?;
            print_results(&results, &output)
        }
        Commands::Quick {
            profile,
            users,
            duration,
            url,
            seed,
        } => {
            let config = TestConfig {
                name: "quick".to_string(),
                description: "Quick smoke test".to_string(),
                base_url: url,
                duration_secs: duration,
                warmup_secs: 0,
                seed,
                reference_time: None,
                users: vec![UserGroup {
                    profile,
                    count: users,
                }],
                weight_overrides: WeightOverrides::new(),
                request_timeout_secs: 30,
                log_requests: false,
            };
            config.validate()?;

            let results = run(config, "quick".to_string()).await?;
            print_results(&results, "table")
        }
        Commands::List => {
            let generator = wms::standard_generator(Utc::now())?;
            for profile in generator.profiles() {
                let pacing = profile.pacing();
                println!(
                    "{} (pacing {:.2}s - {:.2}s)",
                    profile.name(),
                    pacing.min.as_secs_f64(),
                    pacing.max.as_secs_f64()
                );
                for (i, rule) in profile.rules().iter().enumerate() {
                    println!(
                        "    {:<16} weight {:>3}  ({:.1}%)",
                        rule.name(),
                        rule.weight(),
                        profile.probability(i) * 100.0
                    );
                }
                println!();
            }
            Ok(())
        }
        Commands::Sample {
            profile,
            seed,
            count,
            reference_time,
        } => {
            let generator = wms::standard_generator(reference_time.unwrap_or_else(Utc::now))?;
            let mut rng = StdRng::seed_from_u64(seed);
            for _ in 0..count {
                let request = generator.next_request(&profile, &mut rng)?;
                println!("{}", serde_json::to_string(&request)?);
            }
            Ok(())
        }
    }
}

fn init_tracing(log_level: &str) -> anyhow::Result<()> {
    let level = match log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // Reports go to stdout, logs to stderr
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

async fn run(config: TestConfig, scenario_name: String) -> anyhow::Result<TestResults> {
    let mut builder = wms::standard_builder().map_err(|e| {
        error!(error = %e, "Built-in scenario catalog is misconfigured");
        e
    })?;
    builder
        .apply_weight_overrides(&config.weight_overrides)
        .context("invalid weight_overrides")?;
    if let Some(time) = config.reference_time {
        builder.reference_time(time);
    }
    let generator: Arc<ScenarioGenerator> = Arc::new(builder.build());

    let dispatcher = HttpDispatcher::new(
        config.base_url.clone(),
        Duration::from_secs(config.request_timeout_secs),
        config.total_users() as usize,
    )?;

    LoadRunner::new(config, generator, dispatcher)
        .with_scenario_name(scenario_name)
        .run()
        .await
}

fn print_results(results: &TestResults, output: &str) -> anyhow::Result<()> {
    match output {
        "json" => {
            println!("{}", ResultsReport::format_json(results)?);
        }
        "csv" => {
            println!("{}", ResultsReport::csv_header());
            println!("{}", ResultsReport::format_csv(results));
        }
        _ => {
            println!("{}", ResultsReport::format_table(results));
        }
    }
    Ok(())
}
