use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;

use crate::bridge::{BridgeError, EmbeddedRuntime, RuntimeRef};
use crate::platform::{
    FrameSpec, FullscreenEventKind, HostEvent, HostPlatform, LoadTicket, PlatformError,
    RuntimeConfig, SurfaceNode, TimerKind,
};
use crate::remote::{
    AuthService, Collection, DataStore, Filter, ObjectStorage, RemoteError, Row, Session,
    SessionListener, SubscriptionId, UserId,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimOp {
    ContainerCleared { removed: usize },
    ScriptInjected { url: String },
    CanvasAttached(SurfaceNode),
    RuntimeRequested { product_name: String },
    FrameAttached(SurfaceNode),
    TimerScheduled { timer: TimerKind, delay_ms: u64 },
    FullscreenRequested,
    FullscreenExited,
    RuntimeQuit { runtime_id: u64 },
}

#[derive(Debug, Clone, Default)]
pub struct SimJournal {
    ops: Arc<Mutex<Vec<SimOp>>>,
}

impl SimJournal {
    fn push(&self, op: SimOp) {
        match self.ops.lock() {
            Ok(mut guard) => guard.push(op),
            Err(poisoned) => poisoned.into_inner().push(op),
        }
    }

    pub fn snapshot(&self) -> Vec<SimOp> {
        match self.ops.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn position(&self, predicate: impl Fn(&SimOp) -> bool) -> Option<usize> {
        self.snapshot().iter().position(predicate)
    }
}

#[derive(Debug, Clone, Copy)]
struct PendingTimer {
    due_ms: u64,
    ticket: LoadTicket,
    timer: TimerKind,
}

#[derive(Debug)]
pub struct SimPlatform {
    journal: SimJournal,
    next_node_id: u64,
    next_runtime_id: Arc<AtomicU64>,
    children: Vec<SurfaceNode>,
    frames: Vec<(SurfaceNode, FrameSpec)>,
    entry_point_available: bool,
    fail_canvas: bool,
    fail_frame: bool,
    fullscreen_supported: bool,
    fullscreen_event_kind: FullscreenEventKind,
    fullscreen: bool,
    pending_script: Option<LoadTicket>,
    pending_runtime: Option<(LoadTicket, RuntimeConfig)>,
    timers: Vec<PendingTimer>,
    fullscreen_events: Vec<HostEvent>,
    now_ms: u64,
}

impl Default for SimPlatform {
    fn default() -> Self {
        Self {
            journal: SimJournal::default(),
            next_node_id: 1,
            next_runtime_id: Arc::new(AtomicU64::new(1)),
            children: Vec::new(),
            frames: Vec::new(),
            entry_point_available: true,
            fail_canvas: false,
            fail_frame: false,
            fullscreen_supported: true,
            fullscreen_event_kind: FullscreenEventKind::Standard,
            fullscreen: false,
            pending_script: None,
            pending_runtime: None,
            timers: Vec::new(),
            fullscreen_events: Vec::new(),
            now_ms: 0,
        }
    }
}

impl SimPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn journal(&self) -> &SimJournal {
        &self.journal
    }

    pub fn children(&self) -> &[SurfaceNode] {
        &self.children
    }

    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    pub fn frame_spec(&self, node: SurfaceNode) -> Option<&FrameSpec> {
        self.frames
            .iter()
            .find(|(candidate, _)| *candidate == node)
            .map(|(_, spec)| spec)
    }

    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    pub fn is_fullscreen(&self) -> bool {
        self.fullscreen
    }

    pub fn pending_runtime_config(&self) -> Option<&RuntimeConfig> {
        self.pending_runtime.as_ref().map(|(_, config)| config)
    }

    pub fn set_entry_point_available(&mut self, available: bool) {
        self.entry_point_available = available;
    }

    pub fn set_fail_canvas(&mut self, fail: bool) {
        self.fail_canvas = fail;
    }

    pub fn set_fail_frame(&mut self, fail: bool) {
        self.fail_frame = fail;
    }

    pub fn set_fullscreen_supported(&mut self, supported: bool) {
        self.fullscreen_supported = supported;
    }

    pub fn set_fullscreen_event_kind(&mut self, kind: FullscreenEventKind) {
        self.fullscreen_event_kind = kind;
    }

    pub fn spawn_runtime(&self) -> Arc<SimRuntime> {
        let id = self.next_runtime_id.fetch_add(1, Ordering::Relaxed);
        Arc::new(SimRuntime::with_journal(id, self.journal.clone()))
    }

    pub fn complete_script(&mut self) -> Option<HostEvent> {
        let ticket = self.pending_script.take()?;
        Some(HostEvent::ScriptLoaded { ticket })
    }

    pub fn fail_script(&mut self, reason: &str) -> Option<HostEvent> {
        let ticket = self.pending_script.take()?;
        Some(HostEvent::ScriptFailed {
            ticket,
            reason: reason.to_string(),
        })
    }

    pub fn report_progress(&self, fraction: f32) -> Option<HostEvent> {
        let (ticket, _) = self.pending_runtime.as_ref()?;
        Some(HostEvent::Progress {
            ticket: *ticket,
            fraction,
        })
    }

    pub fn complete_runtime(&mut self, runtime: RuntimeRef) -> Option<HostEvent> {
        let (ticket, _) = self.pending_runtime.take()?;
        Some(HostEvent::RuntimeCreated { ticket, runtime })
    }

    pub fn fail_runtime(&mut self, reason: &str) -> Option<HostEvent> {
        let (ticket, _) = self.pending_runtime.take()?;
        Some(HostEvent::RuntimeFailed {
            ticket,
            reason: reason.to_string(),
        })
    }

    pub fn advance(&mut self, delta: Duration) -> Vec<HostEvent> {
        self.now_ms = self.now_ms.saturating_add(delta.as_millis() as u64);
        let now = self.now_ms;
        let (mut due, pending): (Vec<_>, Vec<_>) =
            self.timers.drain(..).partition(|timer| timer.due_ms <= now);
        self.timers = pending;
        due.sort_by_key(|timer| timer.due_ms);
        due.into_iter()
            .map(|timer| HostEvent::TimerElapsed {
                ticket: timer.ticket,
                timer: timer.timer,
            })
            .collect()
    }

    pub fn take_fullscreen_events(&mut self) -> Vec<HostEvent> {
        std::mem::take(&mut self.fullscreen_events)
    }

    fn allocate_node(&mut self) -> u64 {
        let id = self.next_node_id;
        self.next_node_id = self.next_node_id.saturating_add(1);
        id
    }

    fn push_fullscreen_event(&mut self) {
        self.fullscreen_events.push(HostEvent::FullscreenChanged {
            kind: self.fullscreen_event_kind,
            element_present: self.fullscreen,
        });
    }
}

impl HostPlatform for SimPlatform {
    fn clear_container(&mut self) -> usize {
        let removed = self.children.len();
        self.children.clear();
        self.frames.clear();
        self.journal.push(SimOp::ContainerCleared { removed });
        removed
    }

    fn inject_loader_script(
        &mut self,
        ticket: LoadTicket,
        url: &str,
    ) -> Result<(), PlatformError> {
        self.pending_script = Some(ticket);
        self.journal.push(SimOp::ScriptInjected {
            url: url.to_string(),
        });
        Ok(())
    }

    fn has_runtime_entry_point(&self) -> bool {
        self.entry_point_available
    }

    fn attach_canvas(&mut self) -> Result<SurfaceNode, PlatformError> {
        if self.fail_canvas {
            return Err(PlatformError::Operation {
                operation: "attach_canvas",
                message: "canvas creation refused".to_string(),
            });
        }
        let node = SurfaceNode::Canvas(self.allocate_node());
        self.children.push(node);
        self.journal.push(SimOp::CanvasAttached(node));
        Ok(node)
    }

    fn create_runtime(
        &mut self,
        ticket: LoadTicket,
        _canvas: SurfaceNode,
        config: &RuntimeConfig,
    ) -> Result<(), PlatformError> {
        self.pending_runtime = Some((ticket, config.clone()));
        self.journal.push(SimOp::RuntimeRequested {
            product_name: config.product_name.clone(),
        });
        Ok(())
    }

    fn attach_frame(&mut self, frame: &FrameSpec) -> Result<SurfaceNode, PlatformError> {
        if self.fail_frame {
            return Err(PlatformError::Operation {
                operation: "attach_frame",
                message: "frame creation refused".to_string(),
            });
        }
        let node = SurfaceNode::Frame(self.allocate_node());
        self.children.push(node);
        self.frames.push((node, frame.clone()));
        self.journal.push(SimOp::FrameAttached(node));
        Ok(node)
    }

    fn schedule(&mut self, ticket: LoadTicket, timer: TimerKind, delay: Duration) {
        let delay_ms = delay.as_millis() as u64;
        self.timers.push(PendingTimer {
            due_ms: self.now_ms.saturating_add(delay_ms),
            ticket,
            timer,
        });
        self.journal.push(SimOp::TimerScheduled { timer, delay_ms });
    }

    fn request_fullscreen(&mut self) -> Result<(), PlatformError> {
        if !self.fullscreen_supported {
            return Err(PlatformError::Operation {
                operation: "request_fullscreen",
                message: "fullscreen is not supported".to_string(),
            });
        }
        self.fullscreen = true;
        self.journal.push(SimOp::FullscreenRequested);
        self.push_fullscreen_event();
        Ok(())
    }

    fn exit_fullscreen(&mut self) -> Result<(), PlatformError> {
        self.fullscreen = false;
        self.journal.push(SimOp::FullscreenExited);
        self.push_fullscreen_event();
        Ok(())
    }
}

#[derive(Debug)]
pub struct SimRuntime {
    id: u64,
    journal: Option<SimJournal>,
    input_enabled: AtomicBool,
    fail_input_signals: AtomicBool,
    fail_quit: AtomicBool,
    disable_calls: AtomicUsize,
    enable_calls: AtomicUsize,
    quit_calls: AtomicUsize,
}

impl SimRuntime {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::build(0, None))
    }

    fn with_journal(id: u64, journal: SimJournal) -> Self {
        Self::build(id, Some(journal))
    }

    fn build(id: u64, journal: Option<SimJournal>) -> Self {
        Self {
            id,
            journal,
            input_enabled: AtomicBool::new(true),
            fail_input_signals: AtomicBool::new(false),
            fail_quit: AtomicBool::new(false),
            disable_calls: AtomicUsize::new(0),
            enable_calls: AtomicUsize::new(0),
            quit_calls: AtomicUsize::new(0),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn input_enabled(&self) -> bool {
        self.input_enabled.load(Ordering::Relaxed)
    }

    pub fn fail_input_signals(&self, fail: bool) {
        self.fail_input_signals.store(fail, Ordering::Relaxed);
    }

    pub fn fail_quit(&self, fail: bool) {
        self.fail_quit.store(fail, Ordering::Relaxed);
    }

    pub fn disable_calls(&self) -> usize {
        self.disable_calls.load(Ordering::Relaxed)
    }

    pub fn enable_calls(&self) -> usize {
        self.enable_calls.load(Ordering::Relaxed)
    }

    pub fn quit_calls(&self) -> usize {
        self.quit_calls.load(Ordering::Relaxed)
    }
}

impl EmbeddedRuntime for SimRuntime {
    fn disable_input(&self) -> Result<(), BridgeError> {
        self.disable_calls.fetch_add(1, Ordering::Relaxed);
        if self.fail_input_signals.load(Ordering::Relaxed) {
            return Err(BridgeError::Rejected("input toggle unsupported".to_string()));
        }
        self.input_enabled.store(false, Ordering::Relaxed);
        Ok(())
    }

    fn enable_input(&self) -> Result<(), BridgeError> {
        self.enable_calls.fetch_add(1, Ordering::Relaxed);
        if self.fail_input_signals.load(Ordering::Relaxed) {
            return Err(BridgeError::Rejected("input toggle unsupported".to_string()));
        }
        self.input_enabled.store(true, Ordering::Relaxed);
        Ok(())
    }

    fn quit(&self) -> Result<(), BridgeError> {
        self.quit_calls.fetch_add(1, Ordering::Relaxed);
        if let Some(journal) = &self.journal {
            journal.push(SimOp::RuntimeQuit {
                runtime_id: self.id,
            });
        }
        if self.fail_quit.load(Ordering::Relaxed) {
            return Err(BridgeError::Rejected("quit threw".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryDataStore {
    tables: BTreeMap<&'static str, Vec<Row>>,
    next_id: u64,
    failures: BTreeMap<&'static str, RemoteError>,
    calls: usize,
}

impl MemoryDataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&mut self, collection: Collection, error: RemoteError) {
        self.failures.insert(collection.table_name(), error);
    }

    pub fn rows(&self, collection: Collection) -> &[Row] {
        self.tables
            .get(collection.table_name())
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls
    }

    fn begin_call(&mut self, collection: Collection) -> Result<(), RemoteError> {
        self.calls = self.calls.saturating_add(1);
        match self.failures.remove(collection.table_name()) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

fn row_matches(row: &Row, filters: &[Filter]) -> bool {
    filters
        .iter()
        .all(|filter| row.get(&filter.column) == Some(&filter.value))
}

impl DataStore for MemoryDataStore {
    fn select(&mut self, collection: Collection, filters: &[Filter]) -> Result<Vec<Row>, RemoteError> {
        self.begin_call(collection)?;
        Ok(self
            .rows(collection)
            .iter()
            .filter(|row| row_matches(row, filters))
            .cloned()
            .collect())
    }

    fn insert(&mut self, collection: Collection, mut row: Row) -> Result<Row, RemoteError> {
        self.begin_call(collection)?;
        self.next_id = self.next_id.saturating_add(1);
        row.insert("id".to_string(), Value::from(self.next_id));
        self.tables
            .entry(collection.table_name())
            .or_default()
            .push(row.clone());
        Ok(row)
    }

    fn update(
        &mut self,
        collection: Collection,
        filters: &[Filter],
        changes: Row,
    ) -> Result<usize, RemoteError> {
        self.begin_call(collection)?;
        let mut updated = 0usize;
        if let Some(rows) = self.tables.get_mut(collection.table_name()) {
            for row in rows.iter_mut().filter(|row| row_matches(row, filters)) {
                for (key, value) in &changes {
                    row.insert(key.clone(), value.clone());
                }
                updated += 1;
            }
        }
        Ok(updated)
    }

    fn delete(&mut self, collection: Collection, filters: &[Filter]) -> Result<usize, RemoteError> {
        self.begin_call(collection)?;
        let Some(rows) = self.tables.get_mut(collection.table_name()) else {
            return Ok(0);
        };
        let before = rows.len();
        rows.retain(|row| !row_matches(row, filters));
        Ok(before - rows.len())
    }
}

#[derive(Debug, Clone)]
struct Account {
    user_id: UserId,
    username: String,
    email: String,
    password: String,
    is_admin: bool,
}

#[derive(Default)]
pub struct MemoryAuthService {
    accounts: Vec<Account>,
    current: Option<Session>,
    listeners: Vec<(SubscriptionId, SessionListener)>,
    next_subscription: u64,
}

impl MemoryAuthService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_admin(mut self, username: &str, email: &str, password: &str) -> Self {
        self.accounts.push(Account {
            user_id: UserId(format!("user-{}", self.accounts.len() + 1)),
            username: username.to_string(),
            email: email.to_string(),
            password: password.to_string(),
            is_admin: true,
        });
        self
    }

    fn publish(&mut self) {
        let current = self.current.clone();
        for (_, listener) in &mut self.listeners {
            listener(current.as_ref());
        }
    }

    fn session_for(account: &Account) -> Session {
        Session {
            user_id: account.user_id.clone(),
            username: account.username.clone(),
            email: account.email.clone(),
            is_admin: account.is_admin,
        }
    }
}

impl AuthService for MemoryAuthService {
    fn sign_in(&mut self, email: &str, password: &str) -> Result<Session, RemoteError> {
        let account = self
            .accounts
            .iter()
            .find(|account| account.email == email && account.password == password)
            .ok_or_else(|| RemoteError::Rejected {
                message: "invalid login credentials".to_string(),
            })?;
        let session = Self::session_for(account);
        self.current = Some(session.clone());
        self.publish();
        Ok(session)
    }

    fn sign_up(
        &mut self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<Session, RemoteError> {
        if self.accounts.iter().any(|account| account.email == email) {
            return Err(RemoteError::Rejected {
                message: format!("user {email} already registered"),
            });
        }
        let account = Account {
            user_id: UserId(format!("user-{}", self.accounts.len() + 1)),
            username: username.to_string(),
            email: email.to_string(),
            password: password.to_string(),
            is_admin: false,
        };
        let session = Self::session_for(&account);
        self.accounts.push(account);
        self.current = Some(session.clone());
        self.publish();
        Ok(session)
    }

    fn sign_out(&mut self) -> Result<(), RemoteError> {
        self.current = None;
        self.publish();
        Ok(())
    }

    fn current_session(&self) -> Option<Session> {
        self.current.clone()
    }

    fn subscribe(&mut self, listener: SessionListener) -> SubscriptionId {
        self.next_subscription = self.next_subscription.saturating_add(1);
        let id = SubscriptionId(self.next_subscription);
        self.listeners.push((id, listener));
        id
    }

    fn unsubscribe(&mut self, id: SubscriptionId) {
        self.listeners.retain(|(candidate, _)| *candidate != id);
    }
}

#[derive(Debug, Default)]
pub struct MemoryObjectStorage {
    objects: BTreeMap<(String, String), Vec<u8>>,
    fail_paths: Vec<String>,
}

impl MemoryObjectStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_path(&mut self, path: &str) {
        self.fail_paths.push(path.to_string());
    }

    pub fn object(&self, bucket: &str, path: &str) -> Option<&[u8]> {
        self.objects
            .get(&(bucket.to_string(), path.to_string()))
            .map(Vec::as_slice)
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }
}

impl ObjectStorage for MemoryObjectStorage {
    fn upload(&mut self, bucket: &str, path: &str, bytes: &[u8]) -> Result<String, RemoteError> {
        if self.fail_paths.iter().any(|candidate| candidate == path) {
            return Err(RemoteError::Network {
                message: format!("upload of {path} interrupted"),
            });
        }
        self.objects
            .insert((bucket.to_string(), path.to_string()), bytes.to_vec());
        Ok(format!("https://storage.local/{bucket}/{path}"))
    }
}
