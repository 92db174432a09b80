//! Beacon desktop companion: notification-channel synchronization core.
//!
//! Keeps a realtime subscription set, the tray menu and UI surfaces in
//! line with server-held per-category notification preferences. GUI
//! shells embed [`app::App`]; the bundled binary runs headless.

pub mod app;
pub mod channels;
pub mod credentials;
pub mod dispatch;
pub mod events;
pub mod headless;
pub mod reconcile;
pub mod session;
pub mod tray;

#[cfg(test)]
mod testutil;

use std::path::PathBuf;
use std::sync::Arc;

use beacon_client::api::BackendClient;
use beacon_client::pubsub::RedisConnector;

use app::App;
use credentials::FileCredentialStore;
use dispatch::DesktopNotifier;
use headless::{HeadlessTray, HeadlessWindow};

/// Determine the data directory for the application.
/// Priority: BEACON_DATA_DIR env var > ~/.beacon
fn data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("BEACON_DATA_DIR") {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".beacon")
}

/// Load .env from multiple candidate paths.
fn load_dotenv() {
    let candidates = [".env", "../.env"];
    for path in &candidates {
        if dotenvy::from_filename(path).is_ok() {
            tracing::info!("Loaded .env from: {path}");
            return;
        }
    }
    tracing::debug!("No .env file found, using system environment variables");
}

/// Run the headless companion until Ctrl-C.
pub async fn run() -> Result<(), anyhow::Error> {
    load_dotenv();

    let dir = data_dir();
    std::fs::create_dir_all(&dir)?;
    tracing::info!(dir = %dir.display(), "using data directory");

    let store = FileCredentialStore::new(dir.join("credentials.json"));
    let app = App::new(
        Arc::new(store),
        Arc::new(BackendClient::new()),
        Arc::new(RedisConnector),
        Arc::new(DesktopNotifier),
        Arc::new(HeadlessWindow),
        Arc::new(HeadlessTray),
    );

    app.start().await;

    let mut events = app.subscribe();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupt received");
                break;
            }
            event = events.recv() => match event {
                Ok(event) => tracing::debug!(event = event.name(), "app event"),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(missed = n, "event subscriber lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    app.shutdown().await;
    Ok(())
}
