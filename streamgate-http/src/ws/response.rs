// WebSocket frame writer
//
// Serializes server frames (unmasked, FIN always set) and writes them to
// the exchange's transport. Safe against concurrent sends from the ping
// timer and the dispatch/fan-out paths.

use std::sync::Arc;

use bytes::{BufMut, BytesMut};
use parking_lot::Mutex;
use tracing::error;

use super::frame::FrameOpcode;
use crate::exchange::{HttpResponse, Transport};

pub struct WebSocketResponse {
    transport: Arc<dyn Transport>,
    send_lock: Mutex<()>,
}

impl WebSocketResponse {
    /// Wrap the response of the exchange being upgraded.
    #[must_use]
    pub fn new(response: &HttpResponse) -> Self {
        Self {
            transport: Arc::clone(response.transport()),
            send_lock: Mutex::new(()),
        }
    }

    /// Frame `payload` under `opcode` and write it out.
    ///
    /// Returns the number of bytes written; 0 signals a transport
    /// failure.
    pub fn send(&self, payload: &[u8], opcode: FrameOpcode) -> usize {
        let frame = encode_frame(payload, opcode);

        let _guard = self.send_lock.lock();
        match self.transport.send(&frame) {
            Ok(written) => written,
            Err(e) => {
                error!(error = %e, "Failed to write WebSocket frame");
                0
            }
        }
    }
}

/// Serialize a server frame: FIN | opcode, then the 7/16/64-bit payload
/// length form, then the payload. Server frames are never masked.
fn encode_frame(payload: &[u8], opcode: FrameOpcode) -> BytesMut {
    let mut frame = BytesMut::with_capacity(payload.len() + 10);

    frame.put_u8(0x80 | opcode as u8);

    match payload.len() {
        len if len < 126 => frame.put_u8(len as u8),
        len if len <= u16::MAX as usize => {
            frame.put_u8(126);
            frame.put_u16(len as u16);
        }
        len => {
            frame.put_u8(127);
            frame.put_u64(len as u64);
        }
    }

    frame.put_slice(payload);
    frame
}
