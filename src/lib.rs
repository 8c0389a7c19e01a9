pub mod accounts;
pub mod analysis;
pub mod api;
pub mod assessments;
pub mod config;
pub mod core_state;
pub mod crypto;
pub mod dashboard;
pub mod db;
pub mod mail;
pub mod media;
pub mod models;
pub mod notifications;
pub mod otp;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use thiserror::Error;
use tracing_subscriber::EnvFilter;

use config::{ConfigError, ServerConfig};
use core_state::{CoreError, CoreState};

#[derive(Error, Debug)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Cannot create data directory {path}: {source}")]
    DataDir {
        path: String,
        source: std::io::Error,
    },

    #[error(transparent)]
    Database(#[from] db::DatabaseError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Admin password rejected: {0}")]
    AdminPassword(#[from] crypto::CryptoError),

    #[error("Server failed: {0}")]
    Server(String),
}

/// Prepare storage and shared state: data directory, schema, built-in
/// modules and the bootstrap admin account.
pub fn bootstrap(config: ServerConfig) -> Result<Arc<CoreState>, StartupError> {
    std::fs::create_dir_all(&config.data_dir).map_err(|source| StartupError::DataDir {
        path: config.data_dir.display().to_string(),
        source,
    })?;

    // Opening runs pending migrations
    let conn = db::open_database(&config.db_path())?;
    db::seed::seed_default_modules(&conn)?;

    if let (Some(email), Some(password)) = (&config.admin_email, &config.admin_password) {
        crypto::validate_password_policy(password)?;
        let iterations = config.password_iterations;
        let created = db::seed::ensure_admin(&conn, email, "Administrator", || {
            crypto::hash_password(password, iterations)
        })?;
        if created {
            tracing::info!(email = %config::mask_email(email), "Admin account ready");
        }
    } else if !db::admin_exists(&conn)? {
        tracing::warn!("No admin account exists; set CDSS_ADMIN_EMAIL and CDSS_ADMIN_PASSWORD");
    }
    drop(conn);

    Ok(Arc::new(CoreState::new(config)?))
}

async fn serve(config: ServerConfig) -> Result<(), StartupError> {
    let bind = config.bind;
    let core = bootstrap(config)?;
    let mut server = api::start_server_on(core.clone(), bind)
        .await
        .map_err(StartupError::Server)?;
    tracing::info!(addr = %server.session.server_addr, "Listening");

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Cannot listen for shutdown signal: {e}");
    }
    server.shutdown();
    server.stopped().await;

    match tokio::task::spawn_blocking(move || core.flush_and_prune_audit()).await {
        Ok(Ok(count)) => tracing::info!(count, "Audit buffer flushed"),
        Ok(Err(e)) => tracing::warn!("Final audit flush failed: {e}"),
        Err(e) => tracing::warn!("Final audit flush task failed: {e}"),
    }
    Ok(())
}

/// Binary entry point: logging, configuration, then serve until Ctrl-C.
pub fn run() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let result = ServerConfig::from_env()
        .map_err(StartupError::from)
        .and_then(|config| {
            tokio::runtime::Runtime::new()
                .map_err(|e| StartupError::Server(format!("Cannot start runtime: {e}")))?
                .block_on(serve(config))
        });

    if let Err(e) = result {
        tracing::error!("{e}");
        std::process::exit(1);
    }
}
