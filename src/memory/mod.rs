//! In-memory stages of the console pipeline
//!
//! This module holds everything the pipeline keeps in RAM:
//!
//! - `Message`, the owned line handle that travels from producer to drain loop
//! - `TransferQueue`, the bounded producer/consumer mailbox
//! - `Backlog`, the byte ring holding recent history for late viewers
//! - `BatchEngine`, the accumulation and flush policy for the streaming transport
//!
//! Ownership of a line is linear: a producer builds a `Message`, the queue
//! holds it, the drain loop takes it and drops it after fan-out. A rejected
//! enqueue drops the message on the spot.

pub mod backlog;
pub mod batch;
pub mod queue;

use std::fmt::{self, Write};

/// Owned, move-only log line in transit through the pipeline
///
/// Not `Clone`: exactly one stage owns a line at any time.
#[derive(Debug, PartialEq, Eq)]
pub struct Message {
    line: String,
}

impl Message {
    /// Wrap an already rendered line
    pub fn new(line: String) -> Self {
        Self { line }
    }

    /// Render `args` into a new message, clipped to `max_len` bytes (0 = unlimited)
    ///
    /// # Returns
    ///
    /// The message (if rendering produced text and allocation succeeded) and
    /// the full rendered length before clipping.
    pub fn format(args: fmt::Arguments<'_>, max_len: usize) -> (Option<Self>, usize) {
        let mut out = ClipWriter::new(max_len);
        let ok = out.write_fmt(args).is_ok();
        let rendered = out.rendered;
        if !ok || out.alloc_failed || out.buf.is_empty() {
            return (None, rendered);
        }
        (Some(Self { line: out.buf }), rendered)
    }

    /// The line text
    pub fn as_str(&self) -> &str {
        &self.line
    }

    /// The line bytes
    pub fn as_bytes(&self) -> &[u8] {
        self.line.as_bytes()
    }

    /// Length in bytes
    pub fn len(&self) -> usize {
        self.line.len()
    }

    /// Whether the line is empty
    pub fn is_empty(&self) -> bool {
        self.line.is_empty()
    }

    /// Terminate the line with `'\n'` if it is not already
    ///
    /// Returns `false` if growing the buffer failed; the line is then left
    /// unterminated.
    pub fn ensure_newline(&mut self) -> bool {
        if self.line.ends_with('\n') {
            return true;
        }
        if self.line.try_reserve_exact(1).is_err() {
            return false;
        }
        self.line.push('\n');
        true
    }

    /// Release the underlying buffer
    pub fn into_string(self) -> String {
        self.line
    }
}

/// `fmt::Write` sink that keeps at most `limit` bytes but counts everything
struct ClipWriter {
    buf: String,
    limit: usize,
    rendered: usize,
    alloc_failed: bool,
}

impl ClipWriter {
    fn new(limit: usize) -> Self {
        Self { buf: String::new(), limit, rendered: 0, alloc_failed: false }
    }
}

impl Write for ClipWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.rendered += s.len();
        if self.alloc_failed {
            return Ok(());
        }
        let room = if self.limit == 0 {
            s.len()
        } else {
            self.limit.saturating_sub(self.buf.len())
        };
        let mut end = room.min(s.len());
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        if end == 0 {
            return Ok(());
        }
        if self.buf.try_reserve(end).is_err() {
            self.alloc_failed = true;
            return Ok(());
        }
        self.buf.push_str(&s[..end]);
        Ok(())
    }
}
