//! In-memory fakes shared by session and app-level tests.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{Notify, Semaphore, mpsc};

use beacon_client::api::PreferenceBackend;
use beacon_client::pubsub::{ChannelEvent, PubSubConnection, PubSubConnector};
use beacon_client::{ClientError, Credentials, PreferenceMap, RealtimeBootstrap};

use crate::credentials::{CredentialStore, StoreError};
use crate::dispatch::{Notifier, NotifyError, WindowHandle};
use crate::reconcile::SubscriptionSet;
use crate::tray::{MenuSpec, TrayHost};

pub fn creds() -> Credentials {
    Credentials {
        token: "tok".into(),
        device_id: "dev".into(),
        api_url: "https://api.example.com".into(),
    }
}

pub fn prefs(entries: &[(&str, bool)]) -> PreferenceMap {
    entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

pub fn subs(keys: &[&str]) -> SubscriptionSet {
    keys.iter().map(|k| k.to_string()).collect()
}

/// Backend fake holding a server-side preference map.
///
/// Fetches can be gated on a zero-permit semaphore so tests control
/// completion order; `*_entered` fires when a call reaches the gate.
#[derive(Default)]
pub struct FakeBackend {
    server: Mutex<PreferenceMap>,
    pub unauthorized: AtomicBool,
    pub fail_bootstrap: AtomicBool,
    prefs_gate: Mutex<Option<Arc<Semaphore>>>,
    bootstrap_gate: Mutex<Option<Arc<Semaphore>>>,
    pub prefs_entered: Notify,
    pub bootstrap_entered: Notify,
    pub fetch_calls: AtomicU64,
}

impl FakeBackend {
    pub fn with_preferences(entries: &[(&str, bool)]) -> Self {
        let backend = Self::default();
        *backend.server.lock().unwrap() = prefs(entries);
        backend
    }

    pub fn set_server_preferences(&self, entries: &[(&str, bool)]) {
        *self.server.lock().unwrap() = prefs(entries);
    }

    /// Gate the next preference fetch; returns the semaphore to release.
    pub fn gate_next_fetch(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.prefs_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    /// Gate the next bootstrap fetch; returns the semaphore to release.
    pub fn gate_next_bootstrap(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.bootstrap_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    async fn wait(gate: Option<Arc<Semaphore>>) {
        if let Some(gate) = gate {
            gate.acquire().await.expect("gate closed").forget();
        }
    }
}

#[async_trait]
impl PreferenceBackend for FakeBackend {
    async fn fetch_preferences(
        &self,
        _credentials: &Credentials,
    ) -> Result<PreferenceMap, ClientError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.prefs_gate.lock().unwrap().take();
        self.prefs_entered.notify_one();
        Self::wait(gate).await;

        if self.unauthorized.load(Ordering::SeqCst) {
            return Err(ClientError::Unauthorized { status: 401 });
        }
        Ok(self.server.lock().unwrap().clone())
    }

    async fn update_preference(
        &self,
        _credentials: &Credentials,
        key: &str,
        value: bool,
    ) -> Result<PreferenceMap, ClientError> {
        if self.unauthorized.load(Ordering::SeqCst) {
            return Err(ClientError::Unauthorized { status: 401 });
        }
        let mut server = self.server.lock().unwrap();
        server.insert(key.to_string(), value);
        Ok(server.clone())
    }

    async fn fetch_realtime_bootstrap(
        &self,
        _credentials: &Credentials,
    ) -> Result<RealtimeBootstrap, ClientError> {
        let gate = self.bootstrap_gate.lock().unwrap().take();
        self.bootstrap_entered.notify_one();
        Self::wait(gate).await;

        if self.fail_bootstrap.load(Ordering::SeqCst) {
            return Err(ClientError::Api {
                status: 500,
                message: "bootstrap unavailable".into(),
            });
        }
        Ok(RealtimeBootstrap {
            key: "test-key".into(),
            host: "realtime.test".into(),
            port: 6380,
            force_tls: false,
        })
    }
}

/// Handle onto the most recent fake connection, for injecting events
/// and observing the teardown.
#[derive(Clone)]
pub struct FakeHandle {
    pub event_tx: mpsc::Sender<ChannelEvent>,
    disconnected: Arc<AtomicBool>,
    subscribed: Arc<Mutex<BTreeSet<String>>>,
}

impl FakeHandle {
    pub fn disconnected(&self) -> bool {
        self.disconnected.load(Ordering::SeqCst)
    }

    pub fn subscribed(&self) -> BTreeSet<String> {
        self.subscribed.lock().unwrap().clone()
    }
}

#[derive(Default)]
pub struct FakeConnector {
    ops: Arc<Mutex<Vec<String>>>,
    last: Mutex<Option<FakeHandle>>,
    pub connect_count: AtomicU64,
    pub fail_connect: AtomicBool,
}

impl FakeConnector {
    pub fn ops(&self) -> Vec<String> {
        self.ops.lock().unwrap().clone()
    }

    pub fn last_handle(&self) -> FakeHandle {
        self.last.lock().unwrap().clone().expect("no connection made")
    }
}

#[async_trait]
impl PubSubConnector for FakeConnector {
    async fn connect(
        &self,
        _bootstrap: &RealtimeBootstrap,
    ) -> Result<Box<dyn PubSubConnection>, ClientError> {
        self.connect_count.fetch_add(1, Ordering::SeqCst);
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(ClientError::Api {
                status: 503,
                message: "connect refused".into(),
            });
        }

        let (event_tx, event_rx) = mpsc::channel(16);
        let disconnected = Arc::new(AtomicBool::new(false));
        let subscribed = Arc::new(Mutex::new(BTreeSet::new()));
        *self.last.lock().unwrap() = Some(FakeHandle {
            event_tx,
            disconnected: disconnected.clone(),
            subscribed: subscribed.clone(),
        });

        Ok(Box::new(FakeConnection {
            ops: self.ops.clone(),
            events: Some(event_rx),
            disconnected,
            subscribed,
        }))
    }
}

struct FakeConnection {
    ops: Arc<Mutex<Vec<String>>>,
    events: Option<mpsc::Receiver<ChannelEvent>>,
    disconnected: Arc<AtomicBool>,
    subscribed: Arc<Mutex<BTreeSet<String>>>,
}

#[async_trait]
impl PubSubConnection for FakeConnection {
    async fn subscribe(&mut self, channel: &str) -> Result<(), ClientError> {
        self.ops.lock().unwrap().push(format!("subscribe {channel}"));
        self.subscribed.lock().unwrap().insert(channel.to_string());
        Ok(())
    }

    async fn unsubscribe(&mut self, channel: &str) -> Result<(), ClientError> {
        self.ops.lock().unwrap().push(format!("unsubscribe {channel}"));
        self.subscribed.lock().unwrap().remove(channel);
        Ok(())
    }

    fn events(&mut self) -> Option<mpsc::Receiver<ChannelEvent>> {
        self.events.take()
    }

    async fn disconnect(&mut self) -> Result<(), ClientError> {
        self.disconnected.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryStore {
    creds: Mutex<Option<Credentials>>,
}

impl MemoryStore {
    pub fn logged_in() -> Self {
        let store = Self::default();
        *store.creds.lock().unwrap() = Some(creds());
        store
    }
}

impl CredentialStore for MemoryStore {
    fn get(&self) -> Option<Credentials> {
        self.creds.lock().unwrap().clone()
    }

    fn set(&self, credentials: &Credentials) -> Result<(), StoreError> {
        *self.creds.lock().unwrap() = Some(credentials.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        *self.creds.lock().unwrap() = None;
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub shown: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    pub fn count(&self) -> usize {
        self.shown.lock().unwrap().len()
    }
}

impl Notifier for RecordingNotifier {
    fn show(
        &self,
        title: &str,
        body: &str,
        _on_click: Box<dyn FnOnce() + Send + 'static>,
    ) -> Result<(), NotifyError> {
        self.shown
            .lock()
            .unwrap()
            .push((title.to_string(), body.to_string()));
        Ok(())
    }
}

pub struct NoopWindow;

impl WindowHandle for NoopWindow {
    fn focus(&self) {}
}

#[derive(Default)]
pub struct RecordingTray {
    pub menus: Mutex<Vec<MenuSpec>>,
}

impl RecordingTray {
    pub fn last_menu(&self) -> MenuSpec {
        self.menus.lock().unwrap().last().cloned().expect("no menu set")
    }
}

impl TrayHost for RecordingTray {
    fn set_menu(&self, menu: &MenuSpec) {
        self.menus.lock().unwrap().push(menu.clone());
    }
}
