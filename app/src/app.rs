//! Application state and UI-facing operations.
//!
//! `App` is the single entry point for UI shells and the tray: it owns
//! the credential store, the cached preference map, the realtime session
//! manager and the tray presenter, and it broadcasts change events to
//! subscribers.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{Mutex, broadcast};

use beacon_client::api::PreferenceBackend;
use beacon_client::pubsub::PubSubConnector;
use beacon_client::{ClientError, Credentials, PreferenceMap};

use crate::credentials::CredentialStore;
use crate::dispatch::{Dispatcher, Notifier, WindowHandle};
use crate::events::AppEvent;
use crate::reconcile;
use crate::session::{RebuildOutcome, SessionManager};
use crate::tray::{TrayHost, TrayPresenter};

const EVENT_BUS_CAPACITY: usize = 256;

/// Shared application handle; cheap to clone.
#[derive(Clone)]
pub struct App {
    inner: Arc<AppInner>,
}

struct AppInner {
    store: Arc<dyn CredentialStore>,
    backend: Arc<dyn PreferenceBackend>,
    session: SessionManager,
    presenter: TrayPresenter,
    events: broadcast::Sender<AppEvent>,
    /// Last confirmed preference map, replaced only by fetch results.
    cache: Mutex<PreferenceCache>,
    /// Tags every state-changing operation so out-of-order completions
    /// can be discarded.
    seq: AtomicU64,
}

#[derive(Default)]
struct PreferenceCache {
    map: Option<PreferenceMap>,
    /// Sequence number of the fetch that produced `map`.
    seq: u64,
}

impl App {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        backend: Arc<dyn PreferenceBackend>,
        connector: Arc<dyn PubSubConnector>,
        notifier: Arc<dyn Notifier>,
        window: Arc<dyn WindowHandle>,
        tray: Arc<dyn TrayHost>,
    ) -> Self {
        let dispatcher = Dispatcher::new(notifier, window);
        let session = SessionManager::new(backend.clone(), connector, dispatcher);
        let (events, _) = broadcast::channel(EVENT_BUS_CAPACITY);

        Self {
            inner: Arc::new(AppInner {
                store,
                backend,
                session,
                presenter: TrayPresenter::new(tray),
                events,
                cache: Mutex::new(PreferenceCache::default()),
                seq: AtomicU64::new(0),
            }),
        }
    }

    /// Subscribe to app events (preference changes).
    pub fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.inner.events.subscribe()
    }

    pub fn session(&self) -> &SessionManager {
        &self.inner.session
    }

    /// Last confirmed preference map, if any fetch completed yet.
    pub async fn cached_preferences(&self) -> Option<PreferenceMap> {
        self.inner.cache.lock().await.map.clone()
    }

    /// App start: bring realtime up if credentials are stored, and show
    /// the initial tray menu either way.
    pub async fn start(&self) {
        if self.inner.store.get().is_some() {
            self.rebuild_session().await;
        } else {
            let seq = self.next_seq();
            self.inner.presenter.present(seq, None, None);
        }
    }

    /// Store new credentials and rebuild the realtime session.
    pub async fn set_credentials(&self, credentials: Credentials) {
        if let Err(e) = self.inner.store.set(&credentials) {
            tracing::error!(error = %e, "failed to persist credentials");
        }
        self.rebuild_session().await;
    }

    /// Log out: drop credentials, tear the session down, reset the tray.
    pub async fn clear_credentials(&self) {
        if let Err(e) = self.inner.store.clear() {
            tracing::warn!(error = %e, "failed to clear credentials");
        }
        self.inner.session.teardown().await;
        self.drop_cache().await;

        let seq = self.next_seq();
        self.inner.presenter.present(seq, None, None);
    }

    /// Fetch the authoritative preference map, refreshing cache and tray
    /// from the result unless a newer fetch already completed.
    pub async fn get_preferences(&self) -> Result<PreferenceMap, ClientError> {
        let Some(credentials) = self.inner.store.get() else {
            return Err(ClientError::MissingCredentials);
        };

        let seq = self.next_seq();
        match self.inner.backend.fetch_preferences(&credentials).await {
            Ok(preferences) => {
                if self.accept_fetch(seq, &preferences).await {
                    self.inner
                        .presenter
                        .present(seq, Some(&credentials), Some(&preferences));
                }
                Ok(preferences)
            }
            Err(e) if e.is_unauthorized() => Err(self.force_logout(e).await),
            Err(e) => Err(e),
        }
    }

    /// Toggle one category.
    ///
    /// Optimistic flow: negate the last confirmed value, issue the
    /// authoritative update, bring the live subscription in line, then
    /// re-fetch the full map as confirmation. The cache only moves to
    /// the re-fetched state, so a failed update leaves the UI free to
    /// revert its optimistic rendering.
    pub async fn toggle_preference(&self, key: &str) -> Result<PreferenceMap, ClientError> {
        let Some(credentials) = self.inner.store.get() else {
            return Err(ClientError::MissingCredentials);
        };

        let last_known = match self.cached_value(key).await {
            Some(value) => value,
            // Nothing confirmed yet for this key; ask the server.
            None => {
                let current = self.inner.backend.fetch_preferences(&credentials).await?;
                current.get(key).copied().unwrap_or(false)
            }
        };
        let desired = !last_known;

        tracing::info!(key, desired, "toggling notification preference");
        match self
            .inner
            .backend
            .update_preference(&credentials, key, desired)
            .await
        {
            Ok(_) => {}
            Err(e) if e.is_unauthorized() => return Err(self.force_logout(e).await),
            Err(e) => return Err(e),
        }

        let plan = reconcile::plan_toggle(&self.inner.session.subscriptions().await, key, desired);
        if let Err(e) = self.inner.session.apply(&plan).await {
            tracing::warn!(key, error = %e, "failed to apply subscription change");
        }

        // Confirmation re-fetch: the one repair mechanism against missed
        // updates from other devices.
        let confirmed = self.get_preferences().await?;
        let _ = self
            .inner
            .events
            .send(AppEvent::PreferencesChanged(confirmed.clone()));
        Ok(confirmed)
    }

    /// Graceful shutdown: tear the realtime session down so server-side
    /// subscriptions are released.
    pub async fn shutdown(&self) {
        tracing::info!("shutdown sequence started");
        self.inner.session.teardown().await;
        tracing::info!("shutdown sequence completed");
    }

    async fn rebuild_session(&self) {
        let credentials = self.inner.store.get();
        let seq = self.next_seq();

        match self.inner.session.rebuild(credentials.as_ref()).await {
            RebuildOutcome::Live(preferences) => {
                self.accept_fetch(seq, &preferences).await;
                self.inner
                    .presenter
                    .present(seq, credentials.as_ref(), Some(&preferences));
                let _ = self
                    .inner
                    .events
                    .send(AppEvent::PreferencesChanged(preferences));
            }
            RebuildOutcome::NoCredentials => {
                self.inner.presenter.present(seq, None, None);
            }
            RebuildOutcome::AlreadyInitializing => {
                // Dropped: the in-flight rebuild renders when it lands.
            }
            RebuildOutcome::Unauthorized => {
                let _ = self
                    .force_logout(ClientError::Unauthorized { status: 401 })
                    .await;
            }
            RebuildOutcome::Failed => {
                // Usable without realtime; the tray reflects the gap.
                self.inner.presenter.present(seq, credentials.as_ref(), None);
            }
        }
    }

    /// Stored credentials were rejected: drop them and return to the
    /// logged-out state. Returns the error for the caller to surface.
    async fn force_logout(&self, error: ClientError) -> ClientError {
        tracing::warn!(error = %error, "stored credentials rejected, logging out");
        self.clear_credentials().await;
        error
    }

    async fn cached_value(&self, key: &str) -> Option<bool> {
        self.inner
            .cache
            .lock()
            .await
            .map
            .as_ref()
            .and_then(|m| m.get(key).copied())
    }

    /// Adopt a completed fetch unless a newer one already landed.
    async fn accept_fetch(&self, seq: u64, preferences: &PreferenceMap) -> bool {
        let mut cache = self.inner.cache.lock().await;
        if seq < cache.seq {
            tracing::debug!(seq, newest = cache.seq, "discarding stale preference fetch");
            return false;
        }
        cache.seq = seq;
        cache.map = Some(preferences.clone());
        true
    }

    async fn drop_cache(&self) {
        self.inner.cache.lock().await.map = None;
    }

    fn next_seq(&self) -> u64 {
        self.inner.seq.fetch_add(1, Ordering::SeqCst) + 1
    }
}
