//! In-memory collaborators for end-to-end session tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use ipd_portal_daemon::config::Config;
use ipd_portal_daemon::credentials::{Credential, CredentialStore, MemoryCredentialStore};
use ipd_portal_daemon::error::PortalError;
use ipd_portal_daemon::lifecycle::{Collaborators, Runtime};
use ipd_portal_daemon::portal::{Connector, DeviceClient};
use ipd_portal_daemon::session::SessionState;
use ipd_portal_daemon::ui::{Display, UiEvent};
use ipd_portal_daemon::view::{CredentialPrompt, LoginAttempt, ViewId, ViewSwitcher};

pub const RESOURCE: &str = "DevicePortal";
pub const USERNAME: &str = "admin";
pub const SECRET: &str = "secret";

/// Calls observed by the fake device
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceOp {
    Connect(String),
    Read,
    Write(f32),
    Close,
}

/// Shared state behind the fake portal
pub struct FakePortal {
    accounts: HashMap<String, String>,
    ipd: Mutex<f32>,
    ops: Mutex<Vec<DeviceOp>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl FakePortal {
    pub fn new(ipd: f32) -> Arc<Self> {
        let mut accounts = HashMap::new();
        accounts.insert(USERNAME.to_string(), SECRET.to_string());
        Arc::new(Self {
            accounts,
            ipd: Mutex::new(ipd),
            ops: Mutex::new(Vec::new()),
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
        })
    }

    /// Make every read on a live connection fail with a server error
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make every write on a live connection fail with a server error
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn writes(&self) -> Vec<f32> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                DeviceOp::Write(ipd) => Some(ipd),
                _ => None,
            })
            .collect()
    }

    pub fn ops(&self) -> Vec<DeviceOp> {
        self.ops.lock().unwrap().clone()
    }

    fn record(&self, op: DeviceOp) {
        self.ops.lock().unwrap().push(op);
    }
}

pub struct FakeConnector(pub Arc<FakePortal>);

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(
        &self,
        username: &str,
        secret: &str,
    ) -> Result<Box<dyn DeviceClient>, PortalError> {
        self.0.record(DeviceOp::Connect(username.to_string()));
        match self.0.accounts.get(username) {
            Some(expected) if expected == secret => Ok(Box::new(FakeClient {
                portal: Arc::clone(&self.0),
                closed: AtomicBool::new(false),
            })),
            _ => Err(PortalError::Unauthorized),
        }
    }
}

struct FakeClient {
    portal: Arc<FakePortal>,
    closed: AtomicBool,
}

#[async_trait]
impl DeviceClient for FakeClient {
    async fn read_ipd(&self) -> Result<f32, PortalError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(PortalError::Closed);
        }
        self.portal.record(DeviceOp::Read);
        if self.portal.fail_reads.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        Ok(*self.portal.ipd.lock().unwrap())
    }

    async fn write_ipd(&self, ipd: f32) -> Result<(), PortalError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(PortalError::Closed);
        }
        self.portal.record(DeviceOp::Write(ipd));
        if self.portal.fail_writes.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        *self.portal.ipd.lock().unwrap() = ipd;
        Ok(())
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.portal.record(DeviceOp::Close);
        }
    }
}

fn unavailable() -> PortalError {
    PortalError::Status {
        status: 503,
        message: "service unavailable".to_string(),
    }
}

/// Login prompt fed by the test; waits until an answer is pushed
pub struct ScriptedPrompt {
    tx: mpsc::UnboundedSender<Option<LoginAttempt>>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Option<LoginAttempt>>>,
    failures: Mutex<Vec<String>>,
}

impl ScriptedPrompt {
    pub fn new() -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            tx,
            rx: tokio::sync::Mutex::new(rx),
            failures: Mutex::new(Vec::new()),
        })
    }

    pub fn answer(&self, username: &str, secret: &str) {
        let _ = self.tx.send(Some(LoginAttempt {
            username: username.to_string(),
            secret: secret.to_string(),
        }));
    }

    pub fn cancel(&self) {
        let _ = self.tx.send(None);
    }

    pub fn failures(&self) -> Vec<String> {
        self.failures.lock().unwrap().clone()
    }
}

#[async_trait]
impl CredentialPrompt for ScriptedPrompt {
    async fn request_credentials(&self) -> Option<LoginAttempt> {
        self.rx.lock().await.recv().await.flatten()
    }

    async fn report_failure(&self, message: &str) {
        self.failures.lock().unwrap().push(message.to_string());
    }
}

#[derive(Default)]
pub struct RecordingSwitcher {
    calls: Mutex<Vec<String>>,
}

impl RecordingSwitcher {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ViewSwitcher for RecordingSwitcher {
    async fn switch_to(&self, view: ViewId) {
        self.calls.lock().unwrap().push(format!("to:{view}"));
    }

    async fn switch_back(&self, from: ViewId, consolidate: bool) {
        self.calls
            .lock()
            .unwrap()
            .push(format!("back:{from}:{consolidate}"));
    }
}

pub struct RecordingDisplay(pub Arc<Mutex<Vec<UiEvent>>>);

impl Display for RecordingDisplay {
    fn apply(&mut self, event: &UiEvent) {
        self.0.lock().unwrap().push(event.clone());
    }
}

/// A running daemon wired to fakes
pub struct Harness {
    pub runtime: Runtime,
    pub portal: Arc<FakePortal>,
    pub store: Arc<MemoryCredentialStore>,
    pub prompt: Arc<ScriptedPrompt>,
    pub switcher: Arc<RecordingSwitcher>,
    pub events: Arc<Mutex<Vec<UiEvent>>>,
}

pub struct HarnessOptions {
    /// Secret stored for `USERNAME` before startup, if any
    pub stored_secret: Option<&'static str>,
    pub side_loading: bool,
    pub poll_period: Duration,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            stored_secret: None,
            side_loading: true,
            // long enough that no poll fires unless a test asks for one
            poll_period: Duration::from_secs(3600),
        }
    }
}

impl Harness {
    pub fn start(options: HarnessOptions) -> Self {
        let mut config = Config::from_lookup(|key| match key {
            "HOME" => Some("/tmp/ipd-portal-test".to_string()),
            _ => None,
        })
        .unwrap();
        config.side_loading = options.side_loading;
        config.poll_period = options.poll_period;

        let portal = FakePortal::new(63.5);
        let store = Arc::new(MemoryCredentialStore::new());
        if let Some(secret) = options.stored_secret {
            store
                .add(&Credential::new(RESOURCE, USERNAME, secret))
                .unwrap();
        }
        let prompt = ScriptedPrompt::new();
        let switcher = Arc::new(RecordingSwitcher::default());
        let events = Arc::new(Mutex::new(Vec::new()));

        let runtime = Runtime::init(
            &config,
            Collaborators {
                store: store.clone(),
                connector: Arc::new(FakeConnector(Arc::clone(&portal))),
                switcher: switcher.clone(),
                prompt: prompt.clone(),
                display: Box::new(RecordingDisplay(Arc::clone(&events))),
            },
        );

        Self {
            runtime,
            portal,
            store,
            prompt,
            switcher,
            events,
        }
    }

    pub async fn wait_for(&self, state: SessionState) {
        tokio::time::timeout(Duration::from_secs(5), self.runtime.session().wait_for(state))
            .await
            .unwrap_or_else(|_| panic!("timed out waiting for {state}"))
            .unwrap();
        self.runtime.ui().flush().await;
    }

    /// Wait until the applied UI events satisfy `pred`
    pub async fn eventually(&self, what: &str, pred: impl Fn(&[UiEvent]) -> bool) {
        for _ in 0..500 {
            self.runtime.ui().flush().await;
            if pred(self.events.lock().unwrap().as_slice()) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("timed out waiting for {what}: {:?}", self.events());
    }

    pub fn events(&self) -> Vec<UiEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Error messages shown so far
    pub fn errors(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|event| match event {
                UiEvent::ShowError { message } => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    /// Just the state changes, in display order
    pub fn states(&self) -> Vec<SessionState> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|event| match event {
                UiEvent::ShowState { state } => Some(*state),
                _ => None,
            })
            .collect()
    }
}
