pub mod error;
pub mod exchange;
pub mod ws;

pub use error::{HttpError, Result};
pub use exchange::{
    Connection, ConnectionType, ExchangeStatus, HttpExchange, HttpRequest, HttpResponse,
    StatusCode, Transport,
};
pub use ws::{
    Frame, FrameOpcode, SessionInfoId, UserValue, WebSocketInterceptor, WebSocketResponse,
    WebSocketSession, WebSocketSessionInfo, WEBSOCKET_PING_INTERVAL,
};
