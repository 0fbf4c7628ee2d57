use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use idp::{load_config, Config, Database, IdpError, ServiceContext, Worker};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter};

/// Plain text by default; `IDP_LOG_FORMAT=json` switches to JSON lines.
fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "idp=info,idp_worker=info".into());

    let json = std::env::var("IDP_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let (text_layer, json_layer) = if json {
        (None, Some(fmt::layer().json()))
    } else {
        (Some(fmt::layer()), None)
    };

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(text_layer)
        .with(json_layer);
    tracing::subscriber::set_global_default(subscriber)?;

    // Route `log` records from the library into tracing
    tracing_log::LogTracer::init()?;
    Ok(())
}

fn load() -> Result<Config, IdpError> {
    match std::env::var_os("IDP_CONFIG") {
        Some(path) => {
            let path = PathBuf::from(path);
            info!("Loading config from {}", path.display());
            Ok(load_config(&path)?)
        }
        None => {
            info!("IDP_CONFIG not set, using built-in defaults");
            Ok(Config::default())
        }
    }
}

async fn run() -> Result<(), IdpError> {
    let config = load()?;
    let db = Database::open(&config.database.path)?;
    let ctx = Arc::new(ServiceContext::from_config(config, db)?);

    let worker = Worker::new(ctx);
    let shutdown = worker.shutdown_handle();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("Shutdown requested");
        shutdown.trigger();
    }) {
        warn!("Could not install Ctrl-C handler: {}", e);
    }

    worker.run().await
}

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(e) = init_logging() {
        eprintln!("Failed to initialize logging: {}", e);
        return ExitCode::FAILURE;
    }

    info!("Starting idp-worker v{}", env!("CARGO_PKG_VERSION"));

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(kind = e.kind().as_str(), "Worker exited: {}", e);
            ExitCode::FAILURE
        }
    }
}
