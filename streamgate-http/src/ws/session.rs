// WebSocket session
//
// Adopts an upgrading HTTP exchange and runs the frame-level state
// machine: interceptor dispatch, keep-alive pings, and the client
// fan-out map used by publishers. The client-map mutex is never held
// across interceptor callbacks or frame writes.

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::debug;
use url::Url;

use streamgate_core::models::VHostAppName;

use super::frame::{Frame, FrameOpcode};
use super::response::WebSocketResponse;
use crate::error::{HttpError, Result};
use crate::exchange::{
    Connection, ConnectionType, ExchangeStatus, HttpExchange, HttpRequest, StatusCode,
};

/// Keep-alive interval; the first ping goes out once this much time has
/// passed since the upgrade.
pub const WEBSOCKET_PING_INTERVAL: Duration = Duration::from_millis(20_000);

/// Canned keep-alive payload, pre-materialized at construction.
const PING_PAYLOAD: &[u8] = b"OvenMediaEngine";

pub type SessionInfoId = u32;

/// Tagged scalar stored in a session-info's user-data map.
#[derive(Debug, Clone, PartialEq)]
pub enum UserValue {
    Bool(bool),
    U64(u64),
    Str(String),
}

/// Per-client state attached to a session by an interceptor after the
/// upgrade.
pub struct WebSocketSessionInfo {
    pub vhost_app_name: VHostAppName,
    pub host_name: String,
    pub app_name: String,
    pub stream_name: String,
    pub id: SessionInfoId,
    pub uri: Url,
    user_data: Mutex<HashMap<String, UserValue>>,
    extra: Mutex<Option<Arc<dyn Any + Send + Sync>>>,
}

impl WebSocketSessionInfo {
    #[must_use]
    pub fn new(
        vhost_app_name: VHostAppName,
        host_name: impl Into<String>,
        app_name: impl Into<String>,
        stream_name: impl Into<String>,
        id: SessionInfoId,
        uri: Url,
    ) -> Self {
        Self {
            vhost_app_name,
            host_name: host_name.into(),
            app_name: app_name.into(),
            stream_name: stream_name.into(),
            id,
            uri,
            user_data: Mutex::new(HashMap::new()),
            extra: Mutex::new(None),
        }
    }

    pub fn add_user_data(&self, key: impl Into<String>, value: UserValue) {
        self.user_data.lock().insert(key.into(), value);
    }

    #[must_use]
    pub fn user_data(&self, key: &str) -> Option<UserValue> {
        self.user_data.lock().get(key).cloned()
    }

    /// Attach an interceptor-defined payload. Interceptors that need
    /// strong typing wrap an owning handle they can downcast later.
    pub fn set_extra<T: Send + Sync + 'static>(&self, extra: Arc<T>) {
        *self.extra.lock() = Some(extra);
    }

    #[must_use]
    pub fn extra_as<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.extra
            .lock()
            .clone()
            .and_then(|extra| extra.downcast::<T>().ok())
    }
}

/// Elapsed-time tracker for the keep-alive timer.
struct Stopwatch {
    last: Mutex<Instant>,
}

impl Stopwatch {
    fn new() -> Self {
        Self {
            last: Mutex::new(Instant::now()),
        }
    }

    fn start(&self) {
        *self.last.lock() = Instant::now();
    }

    fn is_elapsed(&self, interval: Duration) -> bool {
        self.last.lock().elapsed() >= interval
    }

    fn update(&self) {
        *self.last.lock() = Instant::now();
    }

    #[cfg(test)]
    fn rewind(&self, duration: Duration) {
        *self.last.lock() -= duration;
    }
}

/// A WebSocket-upgraded exchange.
pub struct WebSocketSession {
    exchange: HttpExchange,
    ws_response: Arc<WebSocketResponse>,
    ping_payload: Bytes,
    ping_timer: Stopwatch,
    multiple_clients: AtomicBool,
    clients: Mutex<BTreeMap<SessionInfoId, Arc<WebSocketSessionInfo>>>,
}

impl WebSocketSession {
    /// Adopt an upgrading exchange. The request flips to the WebSocket
    /// connection type and the response is wrapped in a frame writer.
    #[must_use]
    pub fn adopt(exchange: HttpExchange) -> Arc<Self> {
        exchange
            .request()
            .set_connection_type(ConnectionType::WebSocket);

        let ws_response = Arc::new(WebSocketResponse::new(exchange.response()));

        Arc::new(Self {
            exchange,
            ws_response,
            ping_payload: Bytes::from_static(PING_PAYLOAD),
            ping_timer: Stopwatch::new(),
            multiple_clients: AtomicBool::new(false),
            clients: Mutex::new(BTreeMap::new()),
        })
    }

    /// Complete the upgrade: resolve the interceptor, announce the
    /// session, and start the keep-alive timer.
    ///
    /// When no interceptor accepts the session a `404 Not Found` is
    /// emitted and the exchange ends in `Error`.
    pub fn upgrade(self: &Arc<Self>) -> Result<()> {
        let Some(interceptor) = self.exchange.connection().find_interceptor(self) else {
            self.exchange.set_status(ExchangeStatus::Error);
            self.exchange.response().set_status_code(StatusCode::NotFound);
            self.exchange.response().respond()?;
            return Err(HttpError::InterceptorNotFound);
        };

        interceptor.on_request_prepared(self);

        self.exchange.set_status(ExchangeStatus::Exchanging);
        self.ping_timer.start();

        Ok(())
    }

    /// Send a keep-alive ping when the interval has elapsed.
    ///
    /// A no-op (and a success) while the interval is still running;
    /// otherwise resets the timer and reports whether at least one byte
    /// went out.
    pub fn ping(&self) -> bool {
        if !self.ping_timer.is_elapsed(WEBSOCKET_PING_INTERVAL) {
            return true;
        }

        self.ping_timer.update();

        self.ws_response.send(&self.ping_payload, FrameOpcode::Ping) > 0
    }

    /// Dispatch one parsed frame.
    ///
    /// The interceptor is re-resolved on every call; the connection may
    /// swap it mid-session. Frames arriving after a terminal status are
    /// rejected.
    pub fn on_frame_received(self: &Arc<Self>, frame: &Frame) -> Result<()> {
        let status = self.exchange.status();
        if status.is_terminal() {
            return Err(HttpError::SessionTerminated(status));
        }

        let Some(interceptor) = self.exchange.connection().find_interceptor(self) else {
            self.exchange.set_status(ExchangeStatus::Error);
            return Err(HttpError::InterceptorNotFound);
        };

        match frame.opcode() {
            FrameOpcode::ConnectionClose => {
                // The client requested to close the connection
                debug!(payload_len = frame.payload().len(), "Close frame received");
                interceptor.on_request_completed(self);
                self.exchange.set_status(ExchangeStatus::Completed);
                Ok(())
            }

            FrameOpcode::Ping => {
                debug!(payload_len = frame.payload().len(), "Ping frame received");
                self.ws_response.send(frame.payload(), FrameOpcode::Pong);
                Ok(())
            }

            FrameOpcode::Pong => {
                debug!(payload_len = frame.payload().len(), "Pong frame received");
                Ok(())
            }

            _ => {
                if interceptor.on_data_received(self, frame.payload()) {
                    Ok(())
                } else {
                    self.exchange.set_status(ExchangeStatus::Error);
                    Err(HttpError::InterceptorRejected)
                }
            }
        }
    }

    #[must_use]
    pub fn request(&self) -> &Arc<HttpRequest> {
        self.exchange.request()
    }

    #[must_use]
    pub fn connection(&self) -> &Arc<dyn Connection> {
        self.exchange.connection()
    }

    #[must_use]
    pub fn websocket_response(&self) -> &Arc<WebSocketResponse> {
        &self.ws_response
    }

    #[must_use]
    pub fn status(&self) -> ExchangeStatus {
        self.exchange.status()
    }

    /// Allow more than one attached client (publishers serving several
    /// subscribers over one socket).
    pub fn set_multiple_clients(&self, multiple: bool) {
        self.multiple_clients.store(multiple, Ordering::SeqCst);
    }

    #[must_use]
    pub fn multiple_clients(&self) -> bool {
        self.multiple_clients.load(Ordering::SeqCst)
    }

    /// Attach a client. Refused when the session is single-client and one
    /// is already attached.
    pub fn add_client(&self, client: Arc<WebSocketSessionInfo>) -> Result<()> {
        let mut clients = self.clients.lock();

        if !self.multiple_clients() && !clients.is_empty() {
            return Err(HttpError::ClientRejected);
        }

        clients.insert(client.id, client);
        Ok(())
    }

    #[must_use]
    pub fn first_client(&self) -> Option<Arc<WebSocketSessionInfo>> {
        self.clients.lock().values().next().cloned()
    }

    #[must_use]
    pub fn client(&self, id: SessionInfoId) -> Option<Arc<WebSocketSessionInfo>> {
        self.clients.lock().get(&id).cloned()
    }

    /// Snapshot of the attached clients; callers iterate outside the
    /// client-map lock.
    #[must_use]
    pub fn clients(&self) -> Vec<Arc<WebSocketSessionInfo>> {
        self.clients.lock().values().cloned().collect()
    }

    pub fn delete_client(&self, id: SessionInfoId) {
        self.clients.lock().remove(&id);
    }
}
