use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fleischchan_core::config::{staging_dir_from_env_value, storage_dir_from_env_value};
use fleischchan_core::constants::{STAGING_DIR_ENV, STORAGE_DIR_ENV};
use fleischchan_core::{Board, CoreConfig};

/// Target of this binary's own log events.
const LOG_TARGET: &str = env!("CARGO_CRATE_NAME");

/// Main entry point for the fleischchan board backend
///
/// Resolves configuration once, prepares the storage directories and serves the REST API.
///
/// # Environment Variables
/// - `FLEISCHCHAN_REST_ADDR`: REST server address (default: "0.0.0.0:8080")
/// - `FLEISCHCHAN_STORAGE_DIR`: Storage root for uploaded files (default: "storage")
/// - `FLEISCHCHAN_STAGING_DIR`: Staging directory for in-flight uploads
///   (default: "<storage>/.staging")
///
/// # Returns
/// * `Ok(())` - If the server starts and runs successfully
/// * `Err(anyhow::Error)` - If configuration, storage setup or the server fails
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("{}=info", LOG_TARGET).parse()?)
                .add_directive("fleischchan_core=info".parse()?)
                .add_directive("fleischchan_files=info".parse()?)
                .add_directive("api_rest=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let rest_addr =
        std::env::var("FLEISCHCHAN_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".into());

    let cfg = CoreConfig::new(
        storage_dir_from_env_value(std::env::var(STORAGE_DIR_ENV).ok()),
        staging_dir_from_env_value(std::env::var(STAGING_DIR_ENV).ok()),
    )?;
    tracing::info!(
        "++ Storage root {} (staging in {})",
        cfg.storage_dir().display(),
        cfg.staging_dir().display()
    );

    let board = Board::in_memory(&cfg)?;
    api_rest::serve(board, &rest_addr).await
}
