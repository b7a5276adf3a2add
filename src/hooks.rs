//! Producer hooks: the diagnostic log facility slot and the boot character sink
//!
//! A [`LogFacility`] stands in for the system-wide formatter that log macros
//! write through. [`Console::enable_log_bridge`](crate::Console::enable_log_bridge)
//! installs a [`BridgeHandler`] into it and hands back a
//! [`BridgeRegistration`], which owns the handler that was installed before.
//! Restoring (or dropping) the registration puts that handler back and
//! stops the console's drain thread. Registrations may be released in any
//! order: one released from under another hands its predecessor to the
//! registration above it, so the chain always unwinds to the first handler.
//!
//! [`BootCharSink`] receives output one character at a time, the way early
//! boot output is produced, and assembles lines before submitting them.

use crate::console::Inner;
use crate::gateway::rendered_len;
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::io::{self, Write};
use std::sync::{Arc, Weak};
use tracing::warn;

/// Formatter a [`LogFacility`] dispatches every record to
pub trait FormatHandler: Send + Sync {
    /// Render and deliver one record; returns the rendered length
    fn vprintf(&self, args: fmt::Arguments<'_>) -> usize;
}

/// Writes records to standard error; the facility's initial handler
#[derive(Debug, Default, Clone, Copy)]
pub struct StderrHandler;

impl FormatHandler for StderrHandler {
    fn vprintf(&self, args: fmt::Arguments<'_>) -> usize {
        let line = args.to_string();
        let _ = io::stderr().write_all(line.as_bytes());
        line.len()
    }
}

/// Swappable system-wide formatter slot
pub struct LogFacility {
    handler: RwLock<Arc<dyn FormatHandler>>,
    links: Mutex<Vec<Weak<BridgeLink>>>,
}

/// One installed bridge and the handler it replaced
pub(crate) struct BridgeLink {
    installed: Arc<dyn FormatHandler>,
    previous: Mutex<Arc<dyn FormatHandler>>,
}

fn same_handler(a: &Arc<dyn FormatHandler>, b: &Arc<dyn FormatHandler>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

impl LogFacility {
    /// Facility writing through `handler`
    pub fn new(handler: Arc<dyn FormatHandler>) -> Self {
        Self {
            handler: RwLock::new(handler),
            links: Mutex::new(Vec::new()),
        }
    }

    /// Install `handler`, returning the one it replaces
    ///
    /// A raw swap: bridges installed underneath are not told about it.
    pub fn set_vprintf(&self, handler: Arc<dyn FormatHandler>) -> Arc<dyn FormatHandler> {
        std::mem::replace(&mut *self.handler.write(), handler)
    }

    /// Currently installed handler
    pub fn handler(&self) -> Arc<dyn FormatHandler> {
        self.handler.read().clone()
    }

    /// Send a pre-formatted record to the current handler
    pub fn vprintf(&self, args: fmt::Arguments<'_>) -> usize {
        let handler = self.handler();
        handler.vprintf(args)
    }

    /// Install `handler` as a tracked link in the registration chain
    pub(crate) fn attach(&self, handler: Arc<dyn FormatHandler>) -> Arc<BridgeLink> {
        let mut links = self.links.lock();
        let previous = self.set_vprintf(handler.clone());
        let link = Arc::new(BridgeLink {
            installed: handler,
            previous: Mutex::new(previous),
        });
        links.retain(|l| l.strong_count() > 0);
        links.push(Arc::downgrade(&link));
        link
    }

    /// Remove `link` from the chain, reconnecting whatever sits around it
    pub(crate) fn detach(&self, link: &Arc<BridgeLink>) {
        let mut links = self.links.lock();
        links.retain(|l| l.strong_count() > 0 && !std::ptr::eq(l.as_ptr(), Arc::as_ptr(link)));
        let previous = link.previous.lock().clone();

        {
            let mut current = self.handler.write();
            if same_handler(&current, &link.installed) {
                *current = previous;
                return;
            }
        }

        // Another bridge was installed on top; it inherits our predecessor
        for above in links.iter().filter_map(Weak::upgrade) {
            let mut above_previous = above.previous.lock();
            if same_handler(&above_previous, &link.installed) {
                *above_previous = previous;
                return;
            }
        }
        warn!("log facility handler was replaced outside the bridge chain, leaving it installed");
    }

    /// Emit an IDF-style record: `"<L> (<ms>) <tag>: <message>\n"`
    pub fn log(&self, level: crate::Severity, tag: &str, timestamp_ms: u64, args: fmt::Arguments<'_>) -> usize {
        self.vprintf(format_args!("{} ({}) {}: {}\n", level.marker(), timestamp_ms, tag, args))
    }
}

impl Default for LogFacility {
    fn default() -> Self {
        Self::new(Arc::new(StderrHandler))
    }
}

impl fmt::Debug for LogFacility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogFacility").finish_non_exhaustive()
    }
}

/// Facility handler feeding the console's log-bridge path
///
/// Always reports the rendered length, also when the line is filtered,
/// dropped on a full queue, or the console is gone.
pub struct BridgeHandler {
    console: Weak<Inner>,
}

impl BridgeHandler {
    pub(crate) fn new(console: Weak<Inner>) -> Self {
        Self { console }
    }
}

impl FormatHandler for BridgeHandler {
    fn vprintf(&self, args: fmt::Arguments<'_>) -> usize {
        match self.console.upgrade() {
            Some(inner) => inner.bridge_write(args),
            None => rendered_len(args),
        }
    }
}

/// Proof that a facility is routed through a console
///
/// Owns the handler that was installed before the bridge.
#[must_use = "dropping the registration restores the previous handler immediately"]
pub struct BridgeRegistration {
    facility: Arc<LogFacility>,
    link: Option<Arc<BridgeLink>>,
    console: Weak<Inner>,
}

impl BridgeRegistration {
    pub(crate) fn new(facility: Arc<LogFacility>, link: Arc<BridgeLink>, console: Weak<Inner>) -> Self {
        Self {
            facility,
            link: Some(link),
            console,
        }
    }

    /// Handler the facility falls back to when this registration is released
    pub fn previous(&self) -> Option<Arc<dyn FormatHandler>> {
        self.link.as_ref().map(|link| link.previous.lock().clone())
    }

    /// Put the previous handler back and stop the console's drain thread
    pub fn restore(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(link) = self.link.take() {
            self.facility.detach(&link);
            if let Some(inner) = self.console.upgrade() {
                inner.stop();
            }
        }
    }
}

impl Drop for BridgeRegistration {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for BridgeRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeRegistration")
            .field("active", &self.link.is_some())
            .finish()
    }
}

/// Size of the boot sink's line buffer
pub const BOOT_LINE_CAPACITY: usize = 256;

struct LineBuf {
    bytes: [u8; BOOT_LINE_CAPACITY],
    len: usize,
}

/// Per-character sink assembling boot output into lines
///
/// A line is submitted on `'\n'`, or when the buffer fills up, in which case
/// a newline is appended to it. [`putc`](Self::putc) never waits: a character
/// arriving while another caller holds the line buffer is dropped.
pub struct BootCharSink {
    console: Weak<Inner>,
    line: Mutex<LineBuf>,
}

impl BootCharSink {
    pub(crate) fn new(console: Weak<Inner>) -> Self {
        Self {
            console,
            line: Mutex::new(LineBuf {
                bytes: [0; BOOT_LINE_CAPACITY],
                len: 0,
            }),
        }
    }

    /// Feed one character; returns `false` if it was dropped on contention
    pub fn putc(&self, c: u8) -> bool {
        let Some(mut line) = self.line.try_lock() else {
            return false;
        };
        let at = line.len;
        line.bytes[at] = c;
        line.len += 1;
        if c != b'\n' && line.len < BOOT_LINE_CAPACITY {
            return true;
        }

        let text = String::from_utf8_lossy(&line.bytes[..line.len]).into_owned();
        line.len = 0;
        drop(line);

        if let Some(inner) = self.console.upgrade() {
            if text.ends_with('\n') {
                inner.submit(format_args!("{}", text));
            } else {
                inner.submit(format_args!("{}\n", text));
            }
        }
        true
    }

    /// Feed every byte of `s`
    pub fn write_str(&self, s: &str) {
        for b in s.bytes() {
            self.putc(b);
        }
    }

    /// Bytes buffered for the current, unterminated line
    pub fn pending(&self) -> usize {
        self.line.lock().len
    }
}

impl fmt::Debug for BootCharSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BootCharSink").field("pending", &self.pending()).finish()
    }
}
