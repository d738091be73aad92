// HTTP exchange abstraction
//
// A single request/response pair with a monotone status progression.
// HTTP parsing and TLS live below this layer; the exchange only sees a
// parsed request and a transport it can write response bytes to.

use std::collections::HashMap;
use std::io;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::warn;
use url::Url;

use crate::ws::{WebSocketInterceptor, WebSocketSession};

/// Lifecycle of an exchange. The progression is monotone: once a
/// terminal state (`Completed` or `Error`) is reached it never changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ExchangeStatus {
    Init,
    Exchanging,
    Completed,
    Error,
}

impl ExchangeStatus {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionType {
    Http,
    WebSocket,
}

/// Minimal response status set surfaced by this layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Ok,
    NotFound,
    InternalServerError,
}

impl StatusCode {
    #[must_use]
    pub fn code(&self) -> u16 {
        match self {
            Self::Ok => 200,
            Self::NotFound => 404,
            Self::InternalServerError => 500,
        }
    }

    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::NotFound => "Not Found",
            Self::InternalServerError => "Internal Server Error",
        }
    }
}

/// Byte sink backed by the connection's socket.
///
/// Writes may block the calling thread; implementations apply their own
/// timeouts.
pub trait Transport: Send + Sync {
    fn send(&self, data: &[u8]) -> io::Result<usize>;
}

/// The connection that owns an exchange. Resolves the application-level
/// interceptor for an upgraded session; the interceptor may change over
/// the lifetime of the connection.
pub trait Connection: Send + Sync {
    fn find_interceptor(
        &self,
        session: &Arc<WebSocketSession>,
    ) -> Option<Arc<dyn WebSocketInterceptor>>;
}

/// A parsed HTTP request.
pub struct HttpRequest {
    uri: Url,
    headers: HashMap<String, String>,
    connection_type: Mutex<ConnectionType>,
}

impl HttpRequest {
    #[must_use]
    pub fn new(uri: Url, headers: HashMap<String, String>) -> Self {
        Self {
            uri,
            headers,
            connection_type: Mutex::new(ConnectionType::Http),
        }
    }

    #[must_use]
    pub fn uri(&self) -> &Url {
        &self.uri
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    #[must_use]
    pub fn connection_type(&self) -> ConnectionType {
        *self.connection_type.lock()
    }

    pub fn set_connection_type(&self, connection_type: ConnectionType) {
        *self.connection_type.lock() = connection_type;
    }
}

/// Response writer for an exchange.
pub struct HttpResponse {
    status_code: Mutex<StatusCode>,
    transport: Arc<dyn Transport>,
}

impl HttpResponse {
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            status_code: Mutex::new(StatusCode::Ok),
            transport,
        }
    }

    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        *self.status_code.lock()
    }

    pub fn set_status_code(&self, status_code: StatusCode) {
        *self.status_code.lock() = status_code;
    }

    /// Emit the status line. Body emission is handled by the layers that
    /// own the payload format.
    pub fn respond(&self) -> io::Result<usize> {
        let status = self.status_code();
        let head = format!("HTTP/1.1 {} {}\r\n\r\n", status.code(), status.reason());
        self.transport.send(head.as_bytes())
    }

    #[must_use]
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }
}

/// A request/response pairing with status tracking. Subtypes such as the
/// WebSocket session embed this and share its contract.
pub struct HttpExchange {
    request: Arc<HttpRequest>,
    response: Arc<HttpResponse>,
    connection: Arc<dyn Connection>,
    status: Mutex<ExchangeStatus>,
}

impl HttpExchange {
    #[must_use]
    pub fn new(
        request: Arc<HttpRequest>,
        response: Arc<HttpResponse>,
        connection: Arc<dyn Connection>,
    ) -> Self {
        Self {
            request,
            response,
            connection,
            status: Mutex::new(ExchangeStatus::Init),
        }
    }

    #[must_use]
    pub fn request(&self) -> &Arc<HttpRequest> {
        &self.request
    }

    #[must_use]
    pub fn response(&self) -> &Arc<HttpResponse> {
        &self.response
    }

    #[must_use]
    pub fn connection(&self) -> &Arc<dyn Connection> {
        &self.connection
    }

    #[must_use]
    pub fn status(&self) -> ExchangeStatus {
        *self.status.lock()
    }

    /// Advance the status. Regressions and transitions out of a terminal
    /// state are rejected.
    pub fn set_status(&self, status: ExchangeStatus) -> bool {
        let mut current = self.status.lock();

        if current.is_terminal() || status < *current {
            warn!(
                current = ?*current,
                requested = ?status,
                "Rejected exchange status transition"
            );
            return false;
        }

        *current = status;
        true
    }
}
