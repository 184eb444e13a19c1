use background_service::BackgroundService;
use database::SeenStore;
use notifier::TelegramNotifier;
use postwatch_core::{AppConfig, CoreError, ErrorExt, HandleSource};
use profile_client::ProfileClient;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "postwatch=info,postwatch_core=info,database=info,\
notifier=info,profile_client=info,background_service=info";

#[tokio::main]
async fn main() -> Result<(), CoreError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    tracing::info!("Starting Postwatch");

    let config = AppConfig::from_env().map_err(|e| {
        e.log_error();
        e
    })?;

    let store = SeenStore::open(&config.db_filename).await.map_err(|e| {
        tracing::error!(path = %config.db_filename.display(), "Could not initialize store");
        CoreError::from(e)
    })?;

    let boot_handles = HandleSource::new(&config.users_file)
        .with_dedupe(config.dedupe_handles)
        .load_at_boot()
        .await
        .map_err(|e| {
            e.log_error();
            e
        })?;
    tracing::info!(count = boot_handles.len(), "Loaded handles to monitor");

    let notifier = TelegramNotifier::from_config(&config)?;
    if !notifier.is_configured() {
        tracing::warn!(
            "TELEGRAM_BOT_TOKEN or TELEGRAM_CHAT_ID is not set; alerts will be dropped"
        );
    }
    let fetchers = ProfileClient::from_config(&config)?;

    let service = Arc::new(BackgroundService::from_config(
        &config,
        Arc::new(fetchers),
        Arc::new(notifier),
        store,
    ));

    let runner = {
        let service = service.clone();
        tokio::spawn(async move { service.run().await })
    };

    shutdown_signal().await;
    tracing::info!("Shutdown requested, finishing current cycle");
    service.stop();

    if let Err(e) = runner.await {
        tracing::error!("Background service task failed: {}", e);
    }

    tracing::info!("Postwatch stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
