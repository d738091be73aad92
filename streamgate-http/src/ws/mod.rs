// WebSocket exchange layer
//
// A protocol state machine layered on top of an HTTP upgrade: the
// session adopts an exchange, dispatches parsed frames to the
// application interceptor, keeps the connection alive with pings, and
// fans written frames out to its attached clients.

mod frame;
mod interceptor;
mod response;
mod session;

pub use frame::{Frame, FrameOpcode};
pub use interceptor::WebSocketInterceptor;
pub use response::WebSocketResponse;
pub use session::{
    SessionInfoId, UserValue, WebSocketSession, WebSocketSessionInfo, WEBSOCKET_PING_INTERVAL,
};
