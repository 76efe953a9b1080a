//! DocDB Provisioner
//!
//! Provisions the demo database and collection on the configured store, writes
//! the sample families and reads them back.

use std::error::Error;
use std::process::ExitCode;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use docdb_provisioner::{demo, Config, ProvisioningClient, RestBackend};

#[tokio::main]
async fn main() -> ExitCode {
    // Load configuration
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    // Initialize logging
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!("Starting DocDB provisioner");
    tracing::info!("Endpoint: {}", config.endpoint);
    tracing::info!("Conflict policy: {}", config.on_conflict.as_str());

    match run(&config).await {
        Ok(collection_id) => {
            println!("{}", collection_id);
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("Provisioning failed: {}", e);
            eprintln!("Error: {}, Message: {}", e, root_cause(e.as_ref()));
            ExitCode::FAILURE
        }
    }
}

async fn run(config: &Config) -> Result<String, Box<dyn Error>> {
    let backend = RestBackend::from_config(config)?;
    let client = ProvisioningClient::new(backend).with_on_conflict(config.on_conflict);

    let collection = demo::run(&client, true).await?;
    tracing::info!("Provisioning complete: {}", collection.path());

    Ok(collection.id)
}

fn root_cause<'a>(error: &'a (dyn Error + 'static)) -> &'a (dyn Error + 'static) {
    let mut current = error;
    while let Some(source) = current.source() {
        current = source;
    }
    current
}
