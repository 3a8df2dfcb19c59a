//! Persistent Home Assistant connection
//!
//! One background task owns the WebSocket. It authenticates, loads every
//! registry plus the current states into the [`HubStore`], subscribes to
//! `state_changed`, and keeps the store current for the lifetime of the
//! socket. When the socket drops the task waits a fixed delay and starts
//! over; an `auth_invalid` reply ends the task for good.
//!
//! Outgoing commands carry a message id. Fire-and-forget calls only log
//! failures, correlated calls resolve through a oneshot channel keyed by id.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::error::{HubError, HubResult};
use crate::protocol::{
    auth_frame, Command, EntityState, Inbound, RegistryKind, StateChanged, WsError, WsEvent,
};
use crate::store::{EntityRecord, HubStore};

pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Where and how to connect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubSettings {
    pub url: String,
    pub access_token: String,
    pub reconnect_delay: Duration,
    /// Give up after this many failed reconnects in a row; 0 retries forever
    pub max_reconnect_attempts: u32,
    pub reconnect: bool,
}

impl HubSettings {
    pub fn new(url: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            access_token: access_token.into(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            max_reconnect_attempts: 0,
            reconnect: true,
        }
    }

    pub fn with_reconnect(mut self, delay: Duration, max_attempts: u32) -> Self {
        self.reconnect_delay = delay;
        self.max_reconnect_attempts = max_attempts;
        self
    }

    /// Stop after the first session ends
    pub fn without_reconnect(mut self) -> Self {
        self.reconnect = false;
        self
    }

    /// WebSocket endpoint for the configured server URL
    pub fn websocket_url(&self) -> String {
        websocket_url(&self.url)
    }
}

/// Convert a server URL into its `/api/websocket` endpoint
pub fn websocket_url(server: &str) -> String {
    let server = server.trim().trim_end_matches('/');
    if server.ends_with("/api/websocket") {
        return server.to_string();
    }

    let ws = if let Some(rest) = server.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = server.strip_prefix("http://") {
        format!("ws://{rest}")
    } else if server.starts_with("ws://") || server.starts_with("wss://") {
        server.to_string()
    } else {
        format!("ws://{server}")
    };
    format!("{ws}/api/websocket")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Authenticated,
    /// Authenticated and every initial registry query answered
    Synced,
    /// The hub rejected the token; no reconnect is attempted
    AuthFailed,
}

impl ConnectionState {
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Authenticated | Self::Synced)
    }
}

/// Change notifications published by the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HubEvent {
    Connection(ConnectionState),
    StatesLoaded,
    RegistryUpdated(RegistryKind),
    StateChanged(String),
}

/// Seam between the synchronization layer and the code that uses it
pub trait Hub: Send + Sync {
    fn connect(&self) -> HubResult<()>;

    /// Queue a service call without waiting for the hub's answer
    fn call_service(&self, domain: &str, service: &str, data: Value) -> HubResult<u64>;

    /// Send a command and wait for its result frame
    fn request(&self, command: Command) -> impl Future<Output = HubResult<Value>> + Send;

    fn subscribe(&self) -> broadcast::Receiver<HubEvent>;

    fn with_store<R>(&self, f: impl FnOnce(&HubStore) -> R) -> R;

    fn entity(&self, entity_id: &str) -> Option<EntityRecord> {
        self.with_store(|store| store.entity(entity_id).cloned())
    }
}

enum Pending {
    States,
    Registry(RegistryKind),
    Subscription,
    FireAndForget(String),
    Mutation {
        kind: RegistryKind,
        command: Command,
        reply: oneshot::Sender<HubResult<Value>>,
    },
    Reply(oneshot::Sender<HubResult<Value>>),
}

enum Flow {
    Continue,
    AuthRejected(String),
}

enum SessionEnd {
    Closed,
    Shutdown,
    AuthRejected(String),
    Failed(HubError),
}

struct Inner {
    settings: Mutex<Option<HubSettings>>,
    store: RwLock<HubStore>,
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
    pending: Mutex<HashMap<u64, Pending>>,
    next_id: AtomicU64,
    sync_outstanding: AtomicUsize,
    running: AtomicBool,
    events: broadcast::Sender<HubEvent>,
    state: watch::Sender<ConnectionState>,
    shutdown: watch::Sender<bool>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Home Assistant WebSocket client with a live local mirror
#[derive(Clone)]
pub struct HubClient {
    inner: Arc<Inner>,
}

impl Default for HubClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HubClient {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (shutdown, _) = watch::channel(false);

        Self {
            inner: Arc::new(Inner {
                settings: Mutex::new(None),
                store: RwLock::new(HubStore::new()),
                outbound: Mutex::new(None),
                pending: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(0),
                sync_outstanding: AtomicUsize::new(0),
                running: AtomicBool::new(false),
                events,
                state,
                shutdown,
            }),
        }
    }

    /// Set the server URL and access token
    pub fn configure(&self, url: &str, access_token: &str) {
        let mut settings = lock(&self.inner.settings);
        let next = match settings.as_ref() {
            Some(current) => HubSettings {
                url: url.to_string(),
                access_token: access_token.to_string(),
                ..current.clone()
            },
            None => HubSettings::new(url, access_token),
        };
        if settings.as_ref() != Some(&next) {
            log::debug!("Hub configured for {}", next.websocket_url());
            *settings = Some(next);
        }
    }

    /// Replace all connection settings, including the reconnect policy
    pub fn configure_with(&self, next: HubSettings) {
        *lock(&self.inner.settings) = Some(next);
    }

    /// Start the connection task; does nothing when it is already running
    pub fn connect(&self) -> HubResult<()> {
        if lock(&self.inner.settings).is_none() {
            return Err(HubError::NotConfigured);
        }
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.inner.shutdown.send_replace(false);
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            run(Arc::clone(&inner)).await;
            inner.running.store(false, Ordering::SeqCst);
        });
        Ok(())
    }

    /// Stop the connection task and any pending reconnect
    pub fn shutdown(&self) {
        self.inner.shutdown.send_replace(true);
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Wait until the initial registry load finished
    pub async fn wait_synced(&self, timeout: Duration) -> HubResult<()> {
        let mut rx = self.watch_state();
        let reached = tokio::time::timeout(
            timeout,
            rx.wait_for(|s| matches!(s, ConnectionState::Synced | ConnectionState::AuthFailed)),
        )
        .await
        .map_err(|_| HubError::Timeout)?
        .map(|state| *state)
        .map_err(|_| HubError::Disconnected)?;

        match reached {
            ConnectionState::AuthFailed => {
                Err(HubError::AuthInvalid("access token rejected".to_string()))
            }
            _ => Ok(()),
        }
    }

    pub fn call_service(&self, domain: &str, service: &str, data: Value) -> HubResult<u64> {
        log::debug!("Calling {domain}.{service} with {data}");
        let command = Command::call_service(domain, service, data);
        self.inner
            .send_tracked(&command, Pending::FireAndForget(format!("{domain}.{service}")))
    }

    /// Round trip through the hub; everything queued before it has been sent
    pub async fn ping(&self) -> HubResult<()> {
        self.request(Command::ping()).await.map(|_| ())
    }

    /// Service call that waits for the hub's result
    pub async fn call_service_acked(
        &self,
        domain: &str,
        service: &str,
        data: Value,
    ) -> HubResult<Value> {
        self.request(Command::call_service(domain, service, data))
            .await
    }

    pub async fn request(&self, command: Command) -> HubResult<Value> {
        let (reply, rx) = oneshot::channel();
        let pending = match command.mutated_registry() {
            Some(kind) => Pending::Mutation {
                kind,
                command: command.clone(),
                reply,
            },
            None => Pending::Reply(reply),
        };
        self.inner.send_tracked(&command, pending)?;
        rx.await.unwrap_or(Err(HubError::Disconnected))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HubEvent> {
        self.inner.events.subscribe()
    }

    /// Read access to the mirrored state
    pub fn with_store<R>(&self, f: impl FnOnce(&HubStore) -> R) -> R {
        let store = self
            .inner
            .store
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        f(&store)
    }
}

impl Hub for HubClient {
    fn connect(&self) -> HubResult<()> {
        HubClient::connect(self)
    }

    fn call_service(&self, domain: &str, service: &str, data: Value) -> HubResult<u64> {
        HubClient::call_service(self, domain, service, data)
    }

    fn request(&self, command: Command) -> impl Future<Output = HubResult<Value>> + Send {
        HubClient::request(self, command)
    }

    fn subscribe(&self) -> broadcast::Receiver<HubEvent> {
        HubClient::subscribe(self)
    }

    fn with_store<R>(&self, f: impl FnOnce(&HubStore) -> R) -> R {
        HubClient::with_store(self, f)
    }
}

/// Keep a session open until shut down or rejected
async fn run(inner: Arc<Inner>) {
    let mut shutdown = inner.shutdown.subscribe();
    let mut failures: u32 = 0;

    loop {
        let Some(settings) = lock(&inner.settings).clone() else {
            break;
        };

        inner.set_state(ConnectionState::Connecting);
        let outcome = tokio::select! {
            biased;
            _ = shutdown.wait_for(|stop| *stop) => SessionEnd::Shutdown,
            outcome = inner.session(&settings) => outcome,
        };

        if inner.current_state().is_connected() {
            failures = 0;
        }
        inner.drop_session();

        match outcome {
            SessionEnd::Shutdown => {
                log::debug!("Hub connection shut down");
                inner.set_state(ConnectionState::Disconnected);
                break;
            }
            SessionEnd::AuthRejected(reason) => {
                log::error!("Hub rejected the access token: {reason}");
                inner.set_state(ConnectionState::AuthFailed);
                break;
            }
            SessionEnd::Closed => log::info!("Hub closed the connection"),
            SessionEnd::Failed(err) => log::warn!("Hub connection failed: {err}"),
        }

        inner.set_state(ConnectionState::Disconnected);
        if !settings.reconnect {
            break;
        }
        failures += 1;
        if settings.max_reconnect_attempts > 0 && failures > settings.max_reconnect_attempts {
            log::error!(
                "Giving up after {} reconnect attempts",
                settings.max_reconnect_attempts
            );
            break;
        }

        log::info!(
            "Reconnecting in {}",
            humantime::format_duration(settings.reconnect_delay)
        );
        tokio::select! {
            biased;
            _ = shutdown.wait_for(|stop| *stop) => break,
            () = tokio::time::sleep(settings.reconnect_delay) => {}
        }
    }
}

impl Inner {
    async fn session(&self, settings: &HubSettings) -> SessionEnd {
        match self.serve(settings).await {
            Ok(end) => end,
            Err(err) => SessionEnd::Failed(err),
        }
    }

    async fn serve(&self, settings: &HubSettings) -> HubResult<SessionEnd> {
        let url = settings.websocket_url();
        log::debug!("Connecting to WebSocket: {url}");

        let (socket, _) = connect_async(url.as_str()).await?;
        let (mut write, mut read) = socket.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();

        loop {
            tokio::select! {
                Some(frame) = rx.recv() => {
                    log::trace!("-> {frame}");
                    write.send(Message::Text(frame)).await?;
                }
                message = read.next() => {
                    let Some(message) = message else {
                        return Ok(SessionEnd::Closed);
                    };
                    match message? {
                        Message::Text(text) => {
                            log::trace!("<- {text}");
                            if let Flow::AuthRejected(reason) = self.handle_frame(&text, &tx) {
                                let _ = write.close().await;
                                return Ok(SessionEnd::AuthRejected(reason));
                            }
                        }
                        Message::Close(_) => return Ok(SessionEnd::Closed),
                        _ => {}
                    }
                }
            }
        }
    }

    fn handle_frame(&self, text: &str, socket: &mpsc::UnboundedSender<String>) -> Flow {
        let frame: Inbound = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(err) => {
                log::warn!("Ignoring malformed frame: {err}");
                return Flow::Continue;
            }
        };

        match frame {
            Inbound::AuthRequired { ha_version } => {
                log::debug!(
                    "Hub requests auth (version {})",
                    ha_version.as_deref().unwrap_or("unknown")
                );
                let token = lock(&self.settings)
                    .as_ref()
                    .map(|s| s.access_token.clone())
                    .unwrap_or_default();
                if socket.send(auth_frame(&token)).is_err() {
                    log::warn!("Socket closed before auth could be sent");
                }
            }
            Inbound::AuthOk { ha_version } => {
                log::info!(
                    "Authenticated with Home Assistant {}",
                    ha_version.as_deref().unwrap_or("")
                );
                *lock(&self.outbound) = Some(socket.clone());
                self.set_state(ConnectionState::Authenticated);
                self.start_sync();
            }
            Inbound::AuthInvalid { message } => {
                return Flow::AuthRejected(message.unwrap_or_else(|| "invalid token".to_string()));
            }
            Inbound::Result {
                id,
                success,
                result,
                error,
            } => self.handle_result(id, success, result, error),
            Inbound::Event { event, .. } => self.handle_event(event),
            Inbound::Pong { id } => self.handle_result(id, true, Value::Null, None),
            Inbound::Unknown => {}
        }
        Flow::Continue
    }

    /// Queue the registry loads and the event subscription
    fn start_sync(&self) {
        self.sync_outstanding
            .store(1 + RegistryKind::ALL.len(), Ordering::SeqCst);

        let mut queue = vec![(Command::get_states(), Pending::States)];
        queue.extend(
            RegistryKind::ALL
                .into_iter()
                .map(|kind| (Command::list(kind), Pending::Registry(kind))),
        );
        queue.push((
            Command::subscribe_events("state_changed"),
            Pending::Subscription,
        ));

        for (command, pending) in queue {
            if let Err(err) = self.send_tracked(&command, pending) {
                log::warn!("Could not queue {}: {err}", command.kind());
            }
        }
    }

    fn handle_result(&self, id: u64, success: bool, result: Value, error: Option<WsError>) {
        let Some(pending) = lock(&self.pending).remove(&id) else {
            log::debug!("Result for unknown request {id}");
            return;
        };

        let outcome = if success {
            Ok(result)
        } else {
            Err(error.map_or_else(
                || HubError::Command {
                    code: "unknown_error".to_string(),
                    message: "request failed".to_string(),
                },
                HubError::from,
            ))
        };

        match pending {
            Pending::States => {
                let states = outcome.and_then(|value| {
                    serde_json::from_value::<Vec<EntityState>>(value).map_err(HubError::from)
                });
                match states {
                    Ok(states) => {
                        log::info!("Loaded {} entity states", states.len());
                        self.write_store().replace_states(states);
                        self.emit(HubEvent::StatesLoaded);
                    }
                    Err(err) => log::warn!("Loading states failed: {err}"),
                }
                self.finish_sync_step();
            }
            Pending::Registry(kind) => {
                let loaded = outcome.and_then(|value| {
                    self.write_store()
                        .replace_registry(kind, value)
                        .map_err(HubError::from)
                });
                match loaded {
                    Ok(count) => {
                        log::debug!("Loaded {count} {kind:?} registry entries");
                        self.emit(HubEvent::RegistryUpdated(kind));
                    }
                    Err(err) => log::warn!("Loading {kind:?} registry failed: {err}"),
                }
                self.finish_sync_step();
            }
            Pending::Subscription => {
                if let Err(err) = outcome {
                    log::warn!("Subscribing to state changes failed: {err}");
                }
            }
            Pending::FireAndForget(what) => {
                if let Err(err) = outcome {
                    log::warn!("{what} failed: {err}");
                }
            }
            Pending::Mutation {
                kind,
                command,
                reply,
            } => {
                if let Ok(value) = &outcome {
                    let merged = self
                        .write_store()
                        .apply_mutation(kind, &command, value.clone());
                    match merged {
                        Ok(()) => self.emit(HubEvent::RegistryUpdated(kind)),
                        Err(err) => log::warn!("Could not merge {} reply: {err}", command.kind()),
                    }
                }
                let _ = reply.send(outcome);
            }
            Pending::Reply(reply) => {
                let _ = reply.send(outcome);
            }
        }
    }

    fn handle_event(&self, event: WsEvent) {
        if event.event_type != "state_changed" {
            log::trace!("Ignoring {} event", event.event_type);
            return;
        }

        match serde_json::from_value::<StateChanged>(event.data) {
            Ok(change) => {
                let entity_id = change.entity_id.clone();
                self.write_store().apply_state_changed(change);
                self.emit(HubEvent::StateChanged(entity_id));
            }
            Err(err) => log::warn!("Ignoring malformed state_changed event: {err}"),
        }
    }

    fn finish_sync_step(&self) {
        let previous = self
            .sync_outstanding
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if previous == Ok(1) {
            log::debug!("Initial sync complete");
            self.set_state(ConnectionState::Synced);
        }
    }

    fn send_tracked(&self, command: &Command, pending: Pending) -> HubResult<u64> {
        let outbound = lock(&self.outbound).clone().ok_or(HubError::Disconnected)?;

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        lock(&self.pending).insert(id, pending);

        if outbound.send(command.to_frame(id)).is_err() {
            lock(&self.pending).remove(&id);
            return Err(HubError::Disconnected);
        }
        Ok(id)
    }

    /// Forget the socket and fail everything still waiting on it
    fn drop_session(&self) {
        *lock(&self.outbound) = None;
        self.sync_outstanding.store(0, Ordering::SeqCst);

        let pending: Vec<Pending> = lock(&self.pending).drain().map(|(_, p)| p).collect();
        for entry in pending {
            match entry {
                Pending::Mutation { reply, .. } | Pending::Reply(reply) => {
                    let _ = reply.send(Err(HubError::Disconnected));
                }
                _ => {}
            }
        }
    }

    fn write_store(&self) -> std::sync::RwLockWriteGuard<'_, HubStore> {
        self.store.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn current_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn set_state(&self, next: ConnectionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            log::debug!("Connection state {previous:?} -> {next:?}");
            self.emit(HubEvent::Connection(next));
        }
    }

    fn emit(&self, event: HubEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    use serde_json::json;
    use tokio::net::{TcpListener, TcpStream};
    use tokio_tungstenite::{accept_async, WebSocketStream};

    struct FakeServer {
        url: String,
        frames: Arc<Mutex<Vec<Value>>>,
        connections: Arc<AtomicUsize>,
    }

    impl FakeServer {
        fn frame_types(&self) -> Vec<String> {
            self.frames
                .lock()
                .unwrap()
                .iter()
                .map(|f| f["type"].as_str().unwrap_or_default().to_string())
                .collect()
        }
    }

    async fn fake_server(token: &'static str) -> FakeServer {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let frames = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(AtomicUsize::new(0));

        let (log, count) = (frames.clone(), connections.clone());
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                count.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(serve_client(stream, token, log.clone()));
            }
        });

        FakeServer {
            url,
            frames,
            connections,
        }
    }

    async fn send(ws: &mut WebSocketStream<TcpStream>, value: Value) {
        ws.send(Message::Text(value.to_string())).await.unwrap();
    }

    fn ok(id: &Value, result: Value) -> Value {
        json!({"id": id, "type": "result", "success": true, "result": result})
    }

    async fn serve_client(stream: TcpStream, token: &str, log: Arc<Mutex<Vec<Value>>>) {
        let mut ws = accept_async(stream).await.unwrap();
        send(&mut ws, json!({"type": "auth_required", "ha_version": "2025.1.0"})).await;

        let Some(Ok(Message::Text(auth))) = ws.next().await else {
            return;
        };
        let auth: Value = serde_json::from_str(&auth).unwrap();
        if auth["access_token"] != token {
            send(&mut ws, json!({"type": "auth_invalid", "message": "Invalid access token"}))
                .await;
            return;
        }
        send(&mut ws, json!({"type": "auth_ok", "ha_version": "2025.1.0"})).await;

        while let Some(Ok(Message::Text(text))) = ws.next().await {
            let frame: Value = serde_json::from_str(&text).unwrap();
            log.lock().unwrap().push(frame.clone());
            let id = &frame["id"];

            let reply = match frame["type"].as_str().unwrap_or_default() {
                "get_states" => ok(
                    id,
                    json!([{
                        "entity_id": "light.kitchen",
                        "state": "off",
                        "attributes": {"friendly_name": "Kitchen Light"},
                        "last_changed": "2025-01-15T10:30:00+00:00",
                        "last_updated": "2025-01-15T10:30:00+00:00"
                    }]),
                ),
                "config/area_registry/list" => {
                    ok(id, json!([{"area_id": "area_5", "name": "Kitchen"}]))
                }
                "config/device_registry/list" => {
                    ok(id, json!([{"id": "device_1", "area_id": "area_5"}]))
                }
                "config/entity_registry/list" => ok(
                    id,
                    json!([{"entity_id": "light.kitchen", "device_id": "device_1"}]),
                ),
                "config/label_registry/create" => ok(
                    id,
                    json!({"label_id": "new_label", "name": frame["name"]}),
                ),
                "subscribe_events" => {
                    send(&mut ws, ok(id, Value::Null)).await;
                    json!({
                        "id": id,
                        "type": "event",
                        "event": {
                            "event_type": "state_changed",
                            "data": {
                                "entity_id": "light.kitchen",
                                "new_state": {
                                    "entity_id": "light.kitchen",
                                    "state": "on",
                                    "attributes": {"brightness": 255},
                                    "last_changed": "2025-01-15T10:31:00+00:00",
                                    "last_updated": "2025-01-15T10:31:00+00:00"
                                }
                            }
                        }
                    })
                }
                "call_service" if frame["service"] == "restart" => return,
                "call_service" if frame["service"] == "bogus" => json!({
                    "id": id,
                    "type": "result",
                    "success": false,
                    "error": {"code": "service_not_found", "message": "Service not found."}
                }),
                _ => ok(id, json!([])),
            };
            send(&mut ws, reply).await;
        }
    }

    fn client_for(server: &FakeServer, token: &str) -> HubClient {
        let client = HubClient::new();
        client.configure_with(
            HubSettings::new(&server.url, token).with_reconnect(Duration::from_millis(20), 0),
        );
        client
    }

    #[test]
    fn test_websocket_url() {
        assert_eq!(
            websocket_url("http://hass.local:8123/"),
            "ws://hass.local:8123/api/websocket"
        );
        assert_eq!(
            websocket_url("https://example.com"),
            "wss://example.com/api/websocket"
        );
        assert_eq!(
            websocket_url("wss://example.com/api/websocket"),
            "wss://example.com/api/websocket"
        );
        assert_eq!(
            websocket_url("192.168.1.10:8123"),
            "ws://192.168.1.10:8123/api/websocket"
        );
    }

    #[test]
    fn test_configure_is_idempotent() {
        let client = HubClient::new();
        client.configure("http://a:8123", "t");
        client.configure("http://a:8123", "t");
        let settings = lock(&client.inner.settings).clone().unwrap();
        assert_eq!(settings, HubSettings::new("http://a:8123", "t"));
    }

    #[tokio::test]
    async fn test_connect_requires_configuration() {
        let client = HubClient::new();
        assert!(matches!(client.connect(), Err(HubError::NotConfigured)));
    }

    #[tokio::test]
    async fn test_calls_fail_fast_when_disconnected() {
        let client = HubClient::new();
        assert!(matches!(
            client.call_service("light", "toggle", json!({})),
            Err(HubError::Disconnected)
        ));
        assert!(matches!(
            client.request(Command::get_states()).await,
            Err(HubError::Disconnected)
        ));
    }

    #[tokio::test]
    async fn test_handshake_loads_registries_and_follows_events() {
        let server = fake_server("good-token").await;
        let client = client_for(&server, "good-token");
        let mut events = client.subscribe();

        client.connect().unwrap();
        client.connect().unwrap();
        client.wait_synced(Duration::from_secs(5)).await.unwrap();

        let area = client.with_store(|s| s.area_of("light.kitchen").map(|a| a.name.clone()));
        assert_eq!(area.as_deref(), Some("Kitchen"));

        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Ok(HubEvent::StateChanged(id)) = events.recv().await {
                    if id == "light.kitchen" {
                        break;
                    }
                }
            }
        })
        .await
        .unwrap();

        let record = Hub::entity(&client, "light.kitchen").unwrap();
        assert_eq!(record.state.state, "on");
        assert_eq!(record.area_id.as_deref(), Some("area_5"));

        let types = server.frame_types();
        assert_eq!(
            &types[..7],
            &[
                "get_states",
                "config/area_registry/list",
                "config/floor_registry/list",
                "config/device_registry/list",
                "config/entity_registry/list",
                "config/label_registry/list",
                "subscribe_events",
            ]
        );
        assert_eq!(server.connections.load(Ordering::SeqCst), 1);
        client.shutdown();
    }

    #[tokio::test]
    async fn test_invalid_token_is_terminal() {
        let server = fake_server("good-token").await;
        let client = client_for(&server, "wrong-token");

        client.connect().unwrap();
        let err = client
            .wait_synced(Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, HubError::AuthInvalid(_)));
        assert_eq!(client.state(), ConnectionState::AuthFailed);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(server.connections.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_correlated_call_carries_server_error() {
        let server = fake_server("good-token").await;
        let client = client_for(&server, "good-token");
        client.connect().unwrap();
        client.wait_synced(Duration::from_secs(5)).await.unwrap();

        let err = client
            .call_service_acked("light", "bogus", json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some("service_not_found"));

        let id = client
            .call_service("light", "toggle", json!({"entity_id": "light.kitchen"}))
            .unwrap();
        assert!(id > 0);
        client.shutdown();
    }

    #[tokio::test]
    async fn test_mutation_ack_is_merged_into_store() {
        let server = fake_server("good-token").await;
        let client = client_for(&server, "good-token");
        client.connect().unwrap();
        client.wait_synced(Duration::from_secs(5)).await.unwrap();

        client
            .request(Command::create_label("roomdeck:order:0010"))
            .await
            .unwrap();
        let label = client.with_store(|s| s.label_by_name("roomdeck:order:0010").cloned());
        assert_eq!(label.unwrap().label_id, "new_label");
        client.shutdown();
    }

    #[tokio::test]
    async fn test_reconnects_after_socket_loss() {
        let server = fake_server("good-token").await;
        let client = client_for(&server, "good-token");
        client.connect().unwrap();
        client.wait_synced(Duration::from_secs(5)).await.unwrap();

        // The fake server hangs up instead of answering
        let err = client
            .call_service_acked("homeassistant", "restart", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, HubError::Disconnected));

        tokio::time::timeout(Duration::from_secs(5), async {
            while server.connections.load(Ordering::SeqCst) < 2
                || client.state() != ConnectionState::Synced
            {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        client.shutdown();
    }

    /// Listener that accepts and drops every connection before the handshake
    async fn refusing_server() -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let attempts = Arc::new(AtomicUsize::new(0));
        let count = attempts.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                count.fetch_add(1, Ordering::SeqCst);
                drop(stream);
            }
        });
        (url, attempts)
    }

    async fn wait_stopped(client: &HubClient) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while client.inner.running.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }

    async fn hang_up(client: &HubClient) {
        let err = client
            .call_service_acked("homeassistant", "restart", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, HubError::Disconnected));
    }

    #[tokio::test]
    async fn test_gives_up_after_max_reconnect_attempts() {
        let (url, attempts) = refusing_server().await;
        let client = HubClient::new();
        client.configure_with(
            HubSettings::new(&url, "good-token").with_reconnect(Duration::from_millis(20), 2),
        );
        client.connect().unwrap();

        wait_stopped(&client).await;
        // first session plus two retries
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert_eq!(client.state(), ConnectionState::Disconnected);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_without_reconnect_stops_after_first_session() {
        let server = fake_server("good-token").await;
        let client = HubClient::new();
        client.configure_with(HubSettings::new(&server.url, "good-token").without_reconnect());
        client.connect().unwrap();
        client.wait_synced(Duration::from_secs(5)).await.unwrap();

        hang_up(&client).await;
        wait_stopped(&client).await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(server.connections.load(Ordering::SeqCst), 1);
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_connected_session_resets_failure_count() {
        let server = fake_server("good-token").await;
        let client = HubClient::new();
        client.configure_with(
            HubSettings::new(&server.url, "good-token").with_reconnect(Duration::from_millis(20), 1),
        );
        client.connect().unwrap();

        // two hang-ups in a row exceed a cap of one unless each synced session resets it
        for expected in 1..=2 {
            client.wait_synced(Duration::from_secs(5)).await.unwrap();
            assert_eq!(server.connections.load(Ordering::SeqCst), expected);
            hang_up(&client).await;
            tokio::time::timeout(Duration::from_secs(5), async {
                while server.connections.load(Ordering::SeqCst) <= expected {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            })
            .await
            .unwrap();
        }

        client.wait_synced(Duration::from_secs(5)).await.unwrap();
        assert!(client.inner.running.load(Ordering::SeqCst));
        client.shutdown();
    }

    #[tokio::test]
    async fn test_malformed_frames_are_skipped() {
        let client = HubClient::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        assert!(matches!(
            client.inner.handle_frame("not json", &tx),
            Flow::Continue
        ));
        assert!(matches!(
            client.inner.handle_frame(
                r#"{"type": "event", "event": {"event_type": "state_changed", "data": {"bad": 1}}}"#,
                &tx
            ),
            Flow::Continue
        ));
        assert!(matches!(
            client
                .inner
                .handle_frame(r#"{"type": "auth_invalid", "message": "nope"}"#, &tx),
            Flow::AuthRejected(_)
        ));
    }
}
