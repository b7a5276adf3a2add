//! Seams to the outside world: streaming transport, viewer sessions, mirror output
//!
//! The console does not run a server. The host wires an implementation of
//! [`Transport`] (typically a websocket endpoint) and calls
//! [`Console::on_connect`](crate::Console::on_connect) and
//! [`Console::on_data`](crate::Console::on_data) from its session callbacks.

use parking_lot::Mutex;
use std::io::Write;

/// Broadcast-capable streaming transport
pub trait Transport: Send + Sync {
    /// Whether at least one consumer is connected
    fn has_connected_consumers(&self) -> bool;

    /// Whether every connected consumer can take another write right now
    fn can_accept_write(&self) -> bool;

    /// Fire-and-forget delivery to all connected consumers
    fn broadcast(&self, bytes: &[u8]);
}

/// A single connected viewer
pub trait Session {
    /// Send text to this viewer only
    fn send_text(&self, text: &str);
}

/// Synchronous sink receiving every normalised line, e.g. a serial port
pub trait MirrorSink: Send + Sync {
    /// Write one line
    fn write_line(&self, line: &[u8]);
}

impl<W: Write + Send> MirrorSink for Mutex<W> {
    fn write_line(&self, line: &[u8]) {
        let mut out = self.lock();
        let _ = out.write_all(line);
        let _ = out.flush();
    }
}

/// Transport with no consumers; everything handed to it is dropped
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTransport;

impl Transport for NullTransport {
    fn has_connected_consumers(&self) -> bool {
        false
    }

    fn can_accept_write(&self) -> bool {
        false
    }

    fn broadcast(&self, _bytes: &[u8]) {}
}
