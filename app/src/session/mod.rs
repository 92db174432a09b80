//! Realtime session lifecycle.
//!
//! Owns the single live pub/sub connection, derives its subscriptions
//! from the server-reported preference map, and routes inbound channel
//! events to the notification dispatcher. At most one session exists at
//! a time; a generation counter fences events from torn-down sessions.


use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{Mutex, mpsc};

use beacon_client::api::PreferenceBackend;
use beacon_client::pubsub::{ChannelEvent, PubSubConnection, PubSubConnector};
use beacon_client::{ClientError, Credentials, PreferenceMap};

use crate::channels;
use crate::dispatch::Dispatcher;
use crate::reconcile::{self, ReconcilePlan, SubscriptionSet};

/// Lifecycle states of the realtime session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    NoSession,
    Initializing,
    Live,
    TearingDown,
}

/// Result of a rebuild request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebuildOutcome {
    /// Session is live; carries the preference map fetched during init.
    Live(PreferenceMap),
    /// No usable credentials; realtime stays inert.
    NoCredentials,
    /// Another rebuild is already running; this request was dropped.
    AlreadyInitializing,
    /// The server rejected the credentials; the caller should clear them.
    Unauthorized,
    /// Initialization failed; the app stays usable without realtime.
    Failed,
}

pub struct SessionManager {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    backend: Arc<dyn PreferenceBackend>,
    connector: Arc<dyn PubSubConnector>,
    dispatcher: Dispatcher,
    /// Guards the initializing sequence. Acquired with `try_lock` so a
    /// rebuild request arriving mid-flight is dropped, never queued.
    init_guard: Mutex<()>,
    /// The single live session, if any.
    live: Mutex<Option<LiveSession>>,
    /// Bumped whenever a session is created or destroyed; the event pump
    /// compares against it to drop events from stale handles.
    generation: AtomicU64,
    state: std::sync::Mutex<SessionState>,
}

struct LiveSession {
    connection: Box<dyn PubSubConnection>,
    subscriptions: SubscriptionSet,
    generation: u64,
}

impl SessionManager {
    pub fn new(
        backend: Arc<dyn PreferenceBackend>,
        connector: Arc<dyn PubSubConnector>,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                backend,
                connector,
                dispatcher,
                init_guard: Mutex::new(()),
                live: Mutex::new(None),
                generation: AtomicU64::new(0),
                state: std::sync::Mutex::new(SessionState::NoSession),
            }),
        }
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state.lock().unwrap()
    }

    pub async fn is_live(&self) -> bool {
        self.inner.live.lock().await.is_some()
    }

    /// Snapshot of the live subscription set (empty when no session).
    pub async fn subscriptions(&self) -> SubscriptionSet {
        self.inner
            .live
            .lock()
            .await
            .as_ref()
            .map(|s| s.subscriptions.clone())
            .unwrap_or_default()
    }

    /// Tear down any existing session and bring up a new one for the
    /// given credentials.
    ///
    /// Exactly one rebuild runs at a time; a request arriving while one
    /// is in flight is dropped and reported as such. Every failure is
    /// non-fatal: the app keeps running without realtime notifications
    /// until the next trigger.
    pub async fn rebuild(&self, credentials: Option<&Credentials>) -> RebuildOutcome {
        let Ok(_guard) = self.inner.init_guard.try_lock() else {
            tracing::info!("session rebuild already in flight, dropping request");
            return RebuildOutcome::AlreadyInitializing;
        };

        self.set_state(SessionState::Initializing);
        self.disconnect_live().await;

        let Some(credentials) = credentials.filter(|c| c.is_complete()) else {
            tracing::debug!("credentials missing, realtime stays offline");
            self.set_state(SessionState::NoSession);
            return RebuildOutcome::NoCredentials;
        };

        match self.initialize(credentials).await {
            Ok(preferences) => {
                self.set_state(SessionState::Live);
                tracing::info!(
                    subscriptions = preferences.values().filter(|v| **v).count(),
                    "realtime session live"
                );
                RebuildOutcome::Live(preferences)
            }
            Err(e) => {
                self.set_state(SessionState::NoSession);
                if e.is_unauthorized() {
                    tracing::warn!(error = %e, "credentials rejected while building realtime session");
                    RebuildOutcome::Unauthorized
                } else {
                    tracing::warn!(error = %e, "realtime session initialization failed");
                    RebuildOutcome::Failed
                }
            }
        }
    }

    /// Disconnect and discard the live session, if any.
    pub async fn teardown(&self) {
        if self.is_live().await {
            self.set_state(SessionState::TearingDown);
        }
        self.disconnect_live().await;
        self.set_state(SessionState::NoSession);
    }

    /// Apply subscribe/unsubscribe operations to the live session.
    ///
    /// A no-op when no session is live: the next rebuild reconciles from
    /// scratch anyway.
    pub async fn apply(&self, plan: &ReconcilePlan) -> Result<(), ClientError> {
        if plan.is_empty() {
            return Ok(());
        }

        let mut live = self.inner.live.lock().await;
        let Some(session) = live.as_mut() else {
            tracing::debug!(ops = plan.len(), "no live session, skipping subscription ops");
            return Ok(());
        };

        for key in &plan.unsubscribe {
            session
                .connection
                .unsubscribe(&channels::channel_name(key))
                .await?;
            session.subscriptions.remove(key);
            tracing::info!(key, "unsubscribed");
        }
        for key in &plan.subscribe {
            session
                .connection
                .subscribe(&channels::channel_name(key))
                .await?;
            session.subscriptions.insert(key.clone());
            tracing::info!(key, "subscribed");
        }
        Ok(())
    }

    async fn initialize(&self, credentials: &Credentials) -> Result<PreferenceMap, ClientError> {
        let bootstrap = self.inner.backend.fetch_realtime_bootstrap(credentials).await?;
        let mut connection = self.inner.connector.connect(&bootstrap).await?;

        match self.bring_up(&mut connection, credentials).await {
            Ok((preferences, subscriptions)) => {
                let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
                match connection.events() {
                    Some(events) => self.spawn_pump(events, generation),
                    None => tracing::warn!("connection exposed no event stream"),
                }
                *self.inner.live.lock().await = Some(LiveSession {
                    connection,
                    subscriptions,
                    generation,
                });
                Ok(preferences)
            }
            Err(e) => {
                if let Err(disconnect_err) = connection.disconnect().await {
                    tracing::warn!(error = %disconnect_err, "error discarding half-built session");
                }
                Err(e)
            }
        }
    }

    /// Fetch preferences and subscribe every enabled category on the
    /// fresh connection.
    async fn bring_up(
        &self,
        connection: &mut Box<dyn PubSubConnection>,
        credentials: &Credentials,
    ) -> Result<(PreferenceMap, SubscriptionSet), ClientError> {
        let preferences = self.inner.backend.fetch_preferences(credentials).await?;

        let plan = reconcile::plan(&SubscriptionSet::new(), &preferences);
        let mut subscriptions = SubscriptionSet::new();
        for key in &plan.subscribe {
            connection.subscribe(&channels::channel_name(key)).await?;
            subscriptions.insert(key.clone());
        }

        Ok((preferences, subscriptions))
    }

    fn spawn_pump(&self, mut events: mpsc::Receiver<ChannelEvent>, generation: u64) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if inner.generation.load(Ordering::SeqCst) != generation {
                    tracing::debug!(channel = %event.channel,
                        "dropping event from torn-down session");
                    break;
                }
                inner.dispatcher.dispatch(&event);
            }
            tracing::debug!(generation, "event pump stopped");
        });
    }

    async fn disconnect_live(&self) {
        let mut live = self.inner.live.lock().await;
        if let Some(mut session) = live.take() {
            // Invalidate the pump before the disconnect so late events
            // cannot race past the teardown.
            self.inner.generation.fetch_add(1, Ordering::SeqCst);
            session.subscriptions.clear();
            if let Err(e) = session.connection.disconnect().await {
                tracing::warn!(error = %e, "error disconnecting realtime session");
            }
            tracing::info!(generation = session.generation, "realtime session torn down");
        }
    }

    fn set_state(&self, state: SessionState) {
        *self.inner.state.lock().unwrap() = state;
    }
}
