//! breakfast - serves instrumented breakfasts until told to stop.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use breakfast::config::BreakfastConfig;
use breakfast::context::Telemetry;
use breakfast::items::Griddle;
use breakfast::observability::{init_tracer, SamplerType};
use breakfast::pipeline::{run_forever, Diner, Kitchen};
use breakfast::stages::ServePolicy;

/// Serve policies selectable on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum PolicyArg {
    FirstReady,
    AllReady,
    RetryMistakes,
}

#[derive(Parser, Debug)]
#[clap(
    name = "breakfast",
    about = "Serve pancakes through an instrumented two-stage pipeline",
    version
)]
struct Cli {
    /// JSON configuration file; flags override its values
    #[clap(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Pancakes per breakfast
    #[clap(long)]
    batch_size: Option<usize>,

    /// Cook time in milliseconds
    #[clap(long)]
    cook_ms: Option<u64>,

    /// How the syrup station treats the rest of a batch
    #[clap(long, value_enum)]
    policy: Option<PolicyArg>,

    /// Extra passes over soggy pancakes with --policy retry-mistakes
    #[clap(long)]
    retry_passes: Option<usize>,

    /// Sampler type (const or probabilistic)
    #[clap(long)]
    sampler_type: Option<SamplerType>,

    /// Sampler parameter
    #[clap(long)]
    sampler_param: Option<f64>,

    /// Report spans at debug level instead of info
    #[clap(long)]
    no_log_spans: bool,

    /// Seed for reproducible pancakes
    #[clap(long)]
    seed: Option<u64>,

    /// Stop after this many breakfasts
    #[clap(long)]
    iterations: Option<usize>,

    /// Seconds to wait before serving
    #[clap(long)]
    startup_delay: Option<u64>,

    /// Enable debug logging
    #[clap(short, long)]
    verbose: bool,

    /// Log as JSON
    #[clap(long)]
    json: bool,
}

impl Cli {
    /// Loads the configuration file, if any, and applies flag overrides.
    fn build_config(&self) -> Result<BreakfastConfig> {
        let mut config = match &self.config {
            Some(path) => BreakfastConfig::from_json_file(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            None => BreakfastConfig::default(),
        };

        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(cook_ms) = self.cook_ms {
            config.cook_time_ms = cook_ms;
        }
        if let Some(policy) = self.policy {
            config.serve_policy = match policy {
                PolicyArg::FirstReady => ServePolicy::FirstReady,
                PolicyArg::AllReady => ServePolicy::AllReady,
                PolicyArg::RetryMistakes => ServePolicy::RetryMistakes {
                    passes: self.retry_passes.unwrap_or(1),
                },
            };
        } else if let (Some(passes), ServePolicy::RetryMistakes { .. }) =
            (self.retry_passes, config.serve_policy)
        {
            config.serve_policy = ServePolicy::RetryMistakes { passes };
        }
        if let Some(sampler_type) = self.sampler_type {
            config.tracer.sampler_type = sampler_type;
        }
        if let Some(param) = self.sampler_param {
            config.tracer.sampler_param = param;
        }
        if self.no_log_spans {
            config.tracer.reporter_log_spans = false;
        }
        if let Some(seed) = self.seed {
            config.griddle.seed = Some(seed);
        }
        if let Some(delay) = self.startup_delay {
            config.startup_delay_secs = delay;
        }

        Ok(config)
    }
}

/// Logs go to stderr so stdout carries only the status lines.
fn initialize_tracing(verbose: bool, json: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }
}

fn print_banner(config: &BreakfastConfig) {
    println!(
        "Serving breakfast as '{}': {} pancakes per order, {} ms on the griddle, policy {:?}",
        config.service_name, config.batch_size, config.cook_time_ms, config.serve_policy
    );
    println!(
        "Spans are reported on stderr (sampler {} {}). Press Ctrl-C to close the kitchen.\n",
        config.tracer.sampler_type, config.tracer.sampler_param
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    initialize_tracing(cli.verbose, cli.json);

    let config = cli.build_config()?;
    config.validate().context("Invalid configuration")?;
    debug!(?config, "Configuration loaded");

    print_banner(&config);
    if !config.startup_delay().is_zero() {
        tokio::time::sleep(config.startup_delay()).await;
    }
    println!("Making Breakfast!");

    let (tracer, closer) =
        init_tracer(&config.service_name, &config.tracer).context("Tracer Init Error")?;

    let kitchen = Arc::new(Kitchen::from_config(
        &config,
        Telemetry::logging(tracer),
        Griddle::new(config.griddle.clone()),
        Diner,
    ));

    let signal_kitchen = Arc::clone(&kitchen);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupted; closing the kitchen");
                signal_kitchen.shutdown("interrupted");
            }
            Err(err) => warn!(error = %err, "Could not listen for Ctrl-C"),
        }
    });

    let summary = run_forever(&*kitchen, cli.iterations).await;
    closer.close();

    info!(
        served = summary.served,
        ruined = summary.ruined,
        "Goodbye"
    );
    Ok(())
}
