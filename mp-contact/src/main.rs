mod config;

use clap::{Args, Parser};
use config::{Config, ConfigError, LoggingConfig, MetricsConfig};
use metrics_exporter_statsd::StatsdBuilder;
use resolver::ServiceError;
use resolver::metrics_defs::ALL_METRICS;
use shared::metrics_defs::describe_metrics;
use std::path::PathBuf;
use std::process;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
enum CliCommand {
    /// Serve the lookup API and the admin listener
    Serve(ServeArgs),
    /// Resolve a single postcode and print the result as JSON
    Resolve(ResolveArgs),
}

#[derive(Args, Debug, Clone)]
struct ServeArgs {
    #[arg(long)]
    config_file_path: PathBuf,
}

#[derive(Args, Debug, Clone)]
struct ResolveArgs {
    #[arg(long)]
    config_file_path: PathBuf,
    postcode: String,
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error("could not start runtime: {0}")]
    Runtime(#[from] std::io::Error),
    #[error("could not initialize metrics: {0}")]
    Metrics(String),
    #[error("could not encode result: {0}")]
    Encode(#[from] serde_json::Error),
}

fn main() {
    let cli = CliCommand::parse();

    if let Err(e) = cli_main(cli) {
        eprintln!("{e}");
        process::exit(1);
    }
}

fn cli_main(cli: CliCommand) -> Result<(), CliError> {
    match cli {
        CliCommand::Serve(args) => {
            let config = Config::from_file(&args.config_file_path)?;
            let _sentry = init_logging(config.logging.as_ref());
            if let Some(metrics) = &config.metrics {
                init_metrics(metrics)?;
            }

            tracing::info!("starting mp-contact");
            runtime()?.block_on(resolver::run(config.service))?;
        }
        CliCommand::Resolve(args) => {
            let config = Config::from_file(&args.config_file_path)?;
            let _sentry = init_logging(config.logging.as_ref());

            let contact =
                runtime()?.block_on(resolver::resolve_once(&config.service, &args.postcode))?;
            println!("{}", serde_json::to_string_pretty(&contact)?);
        }
    }

    Ok(())
}

fn runtime() -> Result<tokio::runtime::Runtime, std::io::Error> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
}

/// Installs the tracing subscriber. Events are forwarded to Sentry when a DSN is
/// configured; the returned guard flushes them on drop.
fn init_logging(config: Option<&LoggingConfig>) -> Option<sentry::ClientInitGuard> {
    let guard = config.map(|logging| {
        sentry::init((
            logging.sentry_dsn.as_str(),
            sentry::ClientOptions {
                release: sentry::release_name!(),
                ..Default::default()
            },
        ))
    });

    let sentry_layer = guard
        .as_ref()
        .map(|_| sentry::integrations::tracing::layer());

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_layer)
        .init();

    guard
}

fn init_metrics(config: &MetricsConfig) -> Result<(), CliError> {
    let recorder = StatsdBuilder::from(config.statsd_host.as_str(), config.statsd_port)
        .build(Some("mp_contact"))
        .map_err(|e| CliError::Metrics(e.to_string()))?;

    metrics::set_global_recorder(recorder).map_err(|e| CliError::Metrics(e.to_string()))?;
    describe_metrics(ALL_METRICS);

    Ok(())
}
