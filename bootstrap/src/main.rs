//! Lambda custom runtime bootstrap
//!
//! Reads the runtime configuration the host injects, registers the bundled
//! handlers and runs the invocation loop until a fatal error.

mod handlers;

use bootstrap_runtime::{
    report_init_error, ConfigError, EnvSettings, HandlerRegistry, HttpRuntimeClient, Runtime,
    RuntimeConfig,
};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const RUNTIME_API_ENV: &str = "AWS_LAMBDA_RUNTIME_API";

#[derive(Parser, Debug)]
#[command(name = "bootstrap")]
#[command(about = "Lambda custom runtime bootstrap", long_about = None)]
struct Args {
    /// Runtime API endpoint as host:port (overrides AWS_LAMBDA_RUNTIME_API)
    #[arg(long)]
    runtime_api: Option<String>,

    /// Handler selector as <module>.<name> (overrides _HANDLER)
    #[arg(long)]
    handler: Option<String>,

    /// Export each invocation's trace id as _X_AMZN_TRACE_ID
    #[arg(long)]
    propagate_trace_env: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "BOOTSTRAP_LOG_LEVEL")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "bootstrap={level},bootstrap_runtime={level}",
                    level = args.log_level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid runtime configuration");
            if let Some(runtime_api) = init_error_endpoint(&args) {
                match HttpRuntimeClient::new(&runtime_api) {
                    Ok(client) => report_init_error(&client, &e).await,
                    Err(client_error) => {
                        warn!(error = %client_error, "Failed to report initialization error");
                    }
                }
            }
            return Err(e.into());
        }
    };

    let mut registry = HandlerRegistry::new();
    handlers::register(&mut registry);

    info!("Starting Lambda bootstrap...");
    info!("  Runtime API: {}", config.runtime_api);
    info!("  Handler: {} ({})", config.handler_name, config.handler);
    info!("  Registered: {}", registry.names().join(", "));

    let runtime = Runtime::from_config(config, registry)?;
    runtime.run().await?;

    Ok(())
}

/// Environment settings with the command-line overrides applied
fn load_config(args: &Args) -> Result<RuntimeConfig, ConfigError> {
    let mut settings = EnvSettings::load()?;
    if let Some(runtime_api) = &args.runtime_api {
        settings.runtime_api = Some(runtime_api.clone());
    }
    if let Some(handler) = &args.handler {
        settings.handler = Some(handler.clone());
    }
    if args.propagate_trace_env {
        settings.propagate_trace_env = Some("true".to_string());
    }

    RuntimeConfig::from_settings(settings)
}

/// Where to report a startup failure. Read straight from the process
/// environment, since the configuration layer itself may be what failed.
fn init_error_endpoint(args: &Args) -> Option<String> {
    args.runtime_api
        .clone()
        .or_else(|| std::env::var(RUNTIME_API_ENV).ok())
        .filter(|api| !api.is_empty())
}
