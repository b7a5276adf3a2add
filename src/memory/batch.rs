//! Batching and flush policy for the streaming transport
//!
//! The engine sits between the drain loop and the [`Transport`]. It tries to
//! keep transport calls few while bounding both latency and memory:
//!
//! - With nobody connected, lines are discarded on arrival.
//! - With an idle batch and a writable transport, a line goes out directly.
//! - Otherwise lines are appended to a bounded batch. When a line would push
//!   the batch past `max_bytes`, whole lines are trimmed from the front and
//!   the trimmed byte count is kept as a single pending loss notice.
//! - A batch is flushed when forced, when the flush interval has elapsed,
//!   or when it has reached `max_bytes`, provided the transport can take it.
//!   A flush the transport cannot accept is deferred, never discarded.
//!
//! The loss notice always goes out before the batch content that follows it.

use crate::transport::Transport;
use tracing::warn;

/// Result of a flush attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing was batched
    Empty,
    /// No consumers were connected; the batch was dropped
    Discarded,
    /// Not due yet, or the transport could not take it; content kept
    Deferred,
    /// The batch was broadcast
    Sent,
}

/// Accumulating buffer with size/time flush policy and loss accounting
#[derive(Debug)]
pub struct BatchEngine {
    batch: Vec<u8>,
    max_bytes: usize,
    flush_interval_ms: u64,
    last_flush_ms: Option<u64>,
    pending_loss: Option<u64>,
    lost_total: u64,
}

impl BatchEngine {
    /// Create an engine with the given size ceiling and flush interval
    ///
    /// # Arguments
    ///
    /// * `max_bytes` - Batch size ceiling; 0 keeps only the newest undelivered line
    /// * `flush_interval_ms` - Time-based flush period; 0 disables time-based flushing
    pub fn new(max_bytes: usize, flush_interval_ms: u64) -> Self {
        Self {
            batch: Vec::with_capacity(max_bytes),
            max_bytes,
            flush_interval_ms,
            last_flush_ms: None,
            pending_loss: None,
            lost_total: 0,
        }
    }

    /// Hand one normalised line to the engine
    pub fn accumulate(&mut self, line: &[u8], transport: &dyn Transport, now_ms: u64) {
        if line.is_empty() || !transport.has_connected_consumers() {
            return;
        }
        self.last_flush_ms.get_or_insert(now_ms);

        if transport.can_accept_write() && self.send_pending_loss(transport, now_ms) {
            if !self.batch.is_empty() {
                self.flush(true, transport, now_ms);
            }
            if self.batch.is_empty() && transport.can_accept_write() {
                transport.broadcast(line);
                self.last_flush_ms = Some(now_ms);
                return;
            }
        }

        self.append(line, transport, now_ms);
        self.flush(false, transport, now_ms);
    }

    /// Attempt to deliver the batch
    ///
    /// `force` skips the interval and size checks but still respects the
    /// transport's backpressure signal.
    pub fn flush(&mut self, force: bool, transport: &dyn Transport, now_ms: u64) -> FlushOutcome {
        if self.batch.is_empty() {
            return FlushOutcome::Empty;
        }
        if !transport.has_connected_consumers() {
            self.batch.clear();
            return FlushOutcome::Discarded;
        }

        let last = *self.last_flush_ms.get_or_insert(now_ms);
        let due = force
            || (self.flush_interval_ms > 0 && now_ms.saturating_sub(last) >= self.flush_interval_ms)
            || self.batch.len() >= self.max_bytes;

        let loss_delivered = self.send_pending_loss(transport, now_ms);
        if !due || !loss_delivered || !transport.can_accept_write() {
            return FlushOutcome::Deferred;
        }

        transport.broadcast(&self.batch);
        self.batch.clear();
        self.last_flush_ms = Some(now_ms);
        FlushOutcome::Sent
    }

    /// Append under the size ceiling, trimming whole lines from the front
    fn append(&mut self, line: &[u8], transport: &dyn Transport, now_ms: u64) {
        if self.max_bytes == 0 {
            if !self.batch.is_empty() {
                let replaced = self.batch.len();
                self.batch.clear();
                self.record_loss(replaced);
            }
            self.batch.extend_from_slice(line);
            return;
        }

        let mut line = line;
        if self.batch.len() + line.len() > self.max_bytes {
            if transport.can_accept_write() {
                self.flush(true, transport, now_ms);
            }
            if self.batch.len() + line.len() > self.max_bytes {
                let mut lost = 0;
                if line.len() > self.max_bytes {
                    lost += line.len() - self.max_bytes;
                    line = &line[line.len() - self.max_bytes..];
                }
                let overflow = (self.batch.len() + line.len()).saturating_sub(self.max_bytes);
                lost += self.trim_front(overflow);
                if lost > 0 {
                    warn!(dropped = lost, "stream batch overflow, dropping {} bytes", lost);
                    self.record_loss(lost);
                }
            }
        }
        self.batch.extend_from_slice(line);
    }

    /// Remove at least `drop` bytes from the front, on line boundaries
    ///
    /// Returns the number of bytes removed.
    fn trim_front(&mut self, drop: usize) -> usize {
        if drop == 0 || self.batch.is_empty() {
            return 0;
        }
        if drop >= self.batch.len() {
            let removed = self.batch.len();
            self.batch.clear();
            return removed;
        }

        let mut cut = 0;
        while cut < drop {
            match self.batch[cut..].iter().position(|&b| b == b'\n') {
                Some(pos) => cut += pos + 1,
                None => {
                    cut = self.batch.len();
                    break;
                }
            }
        }
        self.batch.drain(..cut);
        cut
    }

    fn record_loss(&mut self, bytes: usize) {
        let bytes = bytes as u64;
        self.pending_loss = Some(self.pending_loss.unwrap_or(0) + bytes);
        self.lost_total += bytes;
    }

    /// Deliver the pending loss notice if the transport can take it
    ///
    /// Returns `true` when no notice remains pending.
    fn send_pending_loss(&mut self, transport: &dyn Transport, now_ms: u64) -> bool {
        let Some(bytes) = self.pending_loss else {
            return true;
        };
        if !transport.can_accept_write() {
            return false;
        }
        let notice = loss_notice(bytes);
        transport.broadcast(notice.as_bytes());
        self.pending_loss = None;
        self.last_flush_ms = Some(now_ms);
        true
    }

    /// Bytes awaiting delivery
    pub fn pending(&self) -> &[u8] {
        &self.batch
    }

    /// Byte count of the undelivered loss notice, if any
    pub fn pending_loss_bytes(&self) -> Option<u64> {
        self.pending_loss
    }

    /// Bytes lost to overflow since creation
    pub fn lost_total(&self) -> u64 {
        self.lost_total
    }

    /// Discard batched content and timing state
    pub fn reset(&mut self, max_bytes: usize, flush_interval_ms: u64) {
        self.batch.clear();
        self.max_bytes = max_bytes;
        self.flush_interval_ms = flush_interval_ms;
        self.last_flush_ms = None;
    }
}

/// Text of the loss notice sent to connected viewers
pub fn loss_notice(bytes: u64) -> String {
    format!("[sherlog] stream overflow, dropped {} bytes\n", bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use parking_lot::Mutex;

    struct TestTransport {
        connected: AtomicBool,
        writable: AtomicBool,
        sent: Mutex<Vec<Vec<u8>>>,
    }

    impl TestTransport {
        fn new(connected: bool, writable: bool) -> Self {
            Self {
                connected: AtomicBool::new(connected),
                writable: AtomicBool::new(writable),
                sent: Mutex::new(Vec::new()),
            }
        }

        fn set_writable(&self, writable: bool) {
            self.writable.store(writable, Ordering::SeqCst);
        }

        fn sent(&self) -> Vec<String> {
            self.sent
                .lock()
                .iter()
                .map(|b| String::from_utf8_lossy(b).into_owned())
                .collect()
        }
    }

    impl Transport for TestTransport {
        fn has_connected_consumers(&self) -> bool {
            self.connected.load(Ordering::SeqCst)
        }

        fn can_accept_write(&self) -> bool {
            self.writable.load(Ordering::SeqCst)
        }

        fn broadcast(&self, bytes: &[u8]) {
            self.sent.lock().push(bytes.to_vec());
        }
    }

    #[test]
    fn test_no_consumers_discards() {
        let transport = TestTransport::new(false, true);
        let mut engine = BatchEngine::new(64, 100);
        engine.accumulate(b"hello\n", &transport, 0);
        assert!(engine.pending().is_empty());
        assert!(transport.sent().is_empty());
    }

    #[test]
    fn test_direct_send_when_idle_and_writable() {
        let transport = TestTransport::new(true, true);
        let mut engine = BatchEngine::new(64, 100);
        engine.accumulate(b"one\n", &transport, 0);
        engine.accumulate(b"two\n", &transport, 1);
        assert_eq!(transport.sent(), vec!["one\n", "two\n"]);
        assert!(engine.pending().is_empty());
    }

    #[test]
    fn test_overflow_trims_whole_lines() {
        let transport = TestTransport::new(true, false);
        let mut engine = BatchEngine::new(10, 100);

        engine.accumulate(b"abcde\n", &transport, 0);
        assert_eq!(engine.pending(), b"abcde\n");
        assert_eq!(engine.pending_loss_bytes(), None);

        engine.accumulate(b"fghij\n", &transport, 1);
        assert_eq!(engine.pending(), b"fghij\n");
        assert_eq!(engine.pending_loss_bytes(), Some(6));
        assert_eq!(engine.lost_total(), 6);
        assert!(transport.sent().is_empty());
    }

    #[test]
    fn test_loss_notices_coalesce() {
        let transport = TestTransport::new(true, false);
        let mut engine = BatchEngine::new(10, 1000);
        engine.accumulate(b"aaaa\n", &transport, 0);
        engine.accumulate(b"bbbb\n", &transport, 0);
        engine.accumulate(b"cccc\n", &transport, 0);
        engine.accumulate(b"dddd\n", &transport, 0);
        assert_eq!(engine.pending(), b"cccc\ndddd\n");
        assert_eq!(engine.pending_loss_bytes(), Some(10));
    }

    #[test]
    fn test_oversized_line_keeps_tail() {
        let transport = TestTransport::new(true, false);
        let mut engine = BatchEngine::new(8, 1000);
        engine.accumulate(b"xy\n", &transport, 0);
        engine.accumulate(b"0123456789\n", &transport, 0);
        // 3 bytes clipped from the new line, 3 trimmed from the batch
        assert_eq!(engine.pending(), b"3456789\n");
        assert_eq!(engine.pending_loss_bytes(), Some(6));
    }

    #[test]
    fn test_loss_notice_precedes_batch() {
        let transport = TestTransport::new(true, false);
        let mut engine = BatchEngine::new(10, 100);
        engine.accumulate(b"abcde\n", &transport, 0);
        engine.accumulate(b"fghij\n", &transport, 0);

        transport.set_writable(true);
        assert_eq!(engine.flush(true, &transport, 5), FlushOutcome::Sent);
        assert_eq!(transport.sent(), vec![loss_notice(6), "fghij\n".to_string()]);
        assert_eq!(engine.pending_loss_bytes(), None);
    }

    #[test]
    fn test_time_based_flush() {
        let transport = TestTransport::new(true, false);
        let mut engine = BatchEngine::new(1024, 100);
        engine.accumulate(b"queued\n", &transport, 0);

        transport.set_writable(true);
        assert_eq!(engine.flush(false, &transport, 50), FlushOutcome::Deferred);
        assert!(transport.sent().is_empty());
        assert_eq!(engine.flush(false, &transport, 100), FlushOutcome::Sent);
        assert_eq!(transport.sent(), vec!["queued\n"]);
    }

    #[test]
    fn test_size_based_flush() {
        let transport = TestTransport::new(true, false);
        let mut engine = BatchEngine::new(10, 10_000);
        engine.accumulate(b"abcd\n", &transport, 0);
        engine.accumulate(b"efgh\n", &transport, 0);
        assert_eq!(engine.pending().len(), 10);

        transport.set_writable(true);
        assert_eq!(engine.flush(false, &transport, 1), FlushOutcome::Sent);
        assert_eq!(transport.sent(), vec!["abcd\nefgh\n"]);
    }

    #[test]
    fn test_zero_interval_disables_time_flush() {
        let transport = TestTransport::new(true, false);
        let mut engine = BatchEngine::new(1024, 0);
        engine.accumulate(b"line\n", &transport, 0);
        transport.set_writable(true);
        assert_eq!(engine.flush(false, &transport, 1_000_000), FlushOutcome::Deferred);
        assert_eq!(engine.flush(true, &transport, 1_000_000), FlushOutcome::Sent);
    }

    #[test]
    fn test_forced_flush_is_idempotent() {
        let transport = TestTransport::new(true, false);
        let mut engine = BatchEngine::new(1024, 100);
        engine.accumulate(b"once\n", &transport, 0);
        transport.set_writable(true);

        assert_eq!(engine.flush(true, &transport, 1), FlushOutcome::Sent);
        assert_eq!(engine.flush(true, &transport, 2), FlushOutcome::Empty);
        assert_eq!(transport.sent(), vec!["once\n"]);
    }

    #[test]
    fn test_blocked_flush_defers() {
        let transport = TestTransport::new(true, false);
        let mut engine = BatchEngine::new(1024, 100);
        engine.accumulate(b"keep me\n", &transport, 0);
        assert_eq!(engine.flush(true, &transport, 500), FlushOutcome::Deferred);
        assert_eq!(engine.pending(), b"keep me\n");
    }

    #[test]
    fn test_disconnect_discards_batch() {
        let transport = TestTransport::new(true, false);
        let mut engine = BatchEngine::new(1024, 100);
        engine.accumulate(b"stale\n", &transport, 0);
        transport.connected.store(false, Ordering::SeqCst);
        assert_eq!(engine.flush(true, &transport, 1), FlushOutcome::Discarded);
        assert!(engine.pending().is_empty());
    }

    #[test]
    fn test_batched_content_drains_before_new_line() {
        let transport = TestTransport::new(true, false);
        let mut engine = BatchEngine::new(1024, 100);
        engine.accumulate(b"first\n", &transport, 0);
        transport.set_writable(true);
        engine.accumulate(b"second\n", &transport, 1);
        assert_eq!(transport.sent(), vec!["first\n", "second\n"]);
    }

    #[test]
    fn test_zero_ceiling_keeps_newest_line() {
        let transport = TestTransport::new(true, false);
        let mut engine = BatchEngine::new(0, 100);
        engine.accumulate(b"old\n", &transport, 0);
        engine.accumulate(b"new\n", &transport, 0);
        assert_eq!(engine.pending(), b"new\n");
        assert_eq!(engine.pending_loss_bytes(), Some(4));
    }
}
