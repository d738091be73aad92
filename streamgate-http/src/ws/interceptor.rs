use std::sync::Arc;

use bytes::Bytes;

use super::session::WebSocketSession;

/// Application-level handler selected per exchange by the connection.
///
/// The session re-resolves its interceptor on every frame, so a
/// connection may swap handlers mid-session.
pub trait WebSocketInterceptor: Send + Sync {
    /// Called once after a successful upgrade.
    fn on_request_prepared(&self, session: &Arc<WebSocketSession>);

    /// Called for every non-control frame. Returning `false` terminates
    /// the session with an error.
    fn on_data_received(&self, session: &Arc<WebSocketSession>, payload: &Bytes) -> bool;

    /// Called when the peer closes the connection.
    fn on_request_completed(&self, session: &Arc<WebSocketSession>);
}
