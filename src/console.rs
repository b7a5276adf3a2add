//! The console: owns the pipeline and exposes the host-facing API
//!
//! ```text
//! producers ──► gateway ──► transfer queue ──► drain loop ──┬─► backlog ring
//!   (task / isr,  (filter on                                 ├─► batch engine ──► transport
//!    log bridge)   bridge path)                              ├─► mirror
//!                                                            └─► rotation sink
//! ```
//!
//! Shared state lives in [`Inner`] behind an `Arc` so the drain thread and
//! the hook handles can reach it. Hooks hold only a `Weak` reference.

use crate::clock::{Clock, MonotonicClock};
use crate::commands::{tokenize, CommandRegistry};
use crate::config::{Config, FileLogConfig};
use crate::disk::rotation::RotationSink;
use crate::disk::Storage;
use crate::drain::{self, DrainHandle};
use crate::error::{Error, Result};
use crate::filter::Severity;
use crate::gateway::{rendered_len, Ingress};
use crate::hooks::{BootCharSink, BridgeHandler, BridgeRegistration, LogFacility};
use crate::memory::backlog::Backlog;
use crate::memory::batch::{BatchEngine, FlushOutcome};
use crate::transport::{MirrorSink, Session, Transport};
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Banner sent to every newly connected viewer
pub const BANNER: &str = "== sherlog console connected ==\n";

/// Counters describing pipeline health
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsoleStats {
    /// Messages accepted by the transfer queue
    pub accepted: u64,
    /// Messages dropped by producers: queue full, or submitted mid-reconfiguration
    pub rejected: u64,
    /// Log-bridge lines rejected by the severity filter
    pub filtered: u64,
    /// Bytes trimmed from the streaming batch on overflow
    pub lost_bytes: u64,
    /// File log rotations performed
    pub rotations: u64,
    /// Bytes currently retained by the backlog
    pub backlog_used: usize,
}

/// State shared between the console, the drain thread and the hooks
pub(crate) struct Inner {
    pub(crate) config: RwLock<Arc<Config>>,
    pub(crate) ingress: RwLock<Arc<Ingress>>,
    pub(crate) backlog: Mutex<Backlog>,
    pub(crate) batch: Mutex<BatchEngine>,
    pub(crate) rotation: Mutex<RotationSink>,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) clock: Arc<dyn Clock>,
    commands: RwLock<CommandRegistry>,
    drain: Mutex<Option<DrainHandle>>,
    filtered: AtomicU64,
    retired_accepted: AtomicU64,
    retired_rejected: AtomicU64,
}

impl Inner {
    /// Producer-side view, or `None` while a reconfiguration swaps it
    fn current_ingress(&self) -> Option<Arc<Ingress>> {
        match self.ingress.try_read() {
            Some(guard) => Some(guard.clone()),
            None => {
                self.retired_rejected.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub(crate) fn submit(&self, args: fmt::Arguments<'_>) -> bool {
        match self.current_ingress() {
            Some(ingress) => ingress.submit(args),
            None => false,
        }
    }

    /// Log-bridge producer path; returns the rendered length in every case
    pub(crate) fn bridge_write(&self, args: fmt::Arguments<'_>) -> usize {
        let Some(ingress) = self.current_ingress() else {
            return rendered_len(args);
        };
        let (rendered, filtered) = ingress.submit_filtered(args);
        if filtered {
            self.filtered.fetch_add(1, Ordering::Relaxed);
        }
        rendered
    }

    pub(crate) fn flush(&self, force: bool) -> FlushOutcome {
        let now = self.clock.now_ms();
        self.batch.lock().flush(force, self.transport.as_ref(), now)
    }

    fn start(self: &Arc<Self>) -> Result<()> {
        let mut slot = self.drain.lock();
        self.spawn_into(&mut slot)
    }

    /// Spawn a drain thread into an empty, already locked slot
    fn spawn_into(self: &Arc<Self>, slot: &mut Option<DrainHandle>) -> Result<()> {
        if slot.is_some() {
            return Ok(());
        }
        let cfg = self.config.read().clone();
        let ingress = self.ingress.read().clone();
        let handle = drain::spawn(Arc::clone(self), ingress, cfg).map_err(Error::Spawn)?;
        *slot = Some(handle);
        Ok(())
    }

    /// Stop the drain thread (if running) and force out the batch
    ///
    /// Returns whether the drain thread was running.
    pub(crate) fn stop(&self) -> bool {
        let mut slot = self.drain.lock();
        self.halt(&mut slot)
    }

    /// Stop the thread held by an already locked slot
    fn halt(&self, slot: &mut Option<DrainHandle>) -> bool {
        let handle = slot.take();
        let was_running = handle.is_some();
        if let Some(handle) = handle {
            handle.stop();
            let ingress = self.ingress.read().clone();
            let abandoned = ingress.queue().receiver().try_iter().count();
            debug!(abandoned, "drain stopped");
        }
        self.flush(true);
        was_running
    }

    fn is_running(&self) -> bool {
        self.drain.lock().is_some()
    }
}

/// Asynchronous log capture and delivery pipeline
///
/// Dropping the console stops the drain thread.
pub struct Console {
    inner: Arc<Inner>,
}

impl Console {
    /// Build a console with the monotonic system clock
    ///
    /// # Arguments
    ///
    /// * `transport` - Streaming transport viewers are attached to
    /// * `storage` - Backend for the rotating file log
    /// * `backlog_bytes` - Backlog ring capacity; 0 disables the backlog
    /// * `config` - Initial configuration
    ///
    /// # Returns
    ///
    /// The console, not yet running, or the configuration error
    pub fn new(
        transport: Arc<dyn Transport>,
        storage: Box<dyn Storage>,
        backlog_bytes: usize,
        config: Config,
    ) -> Result<Self> {
        Self::with_clock(transport, storage, backlog_bytes, config, Arc::new(MonotonicClock))
    }

    /// Build a console reading time from `clock`
    pub fn with_clock(
        transport: Arc<dyn Transport>,
        storage: Box<dyn Storage>,
        backlog_bytes: usize,
        config: Config,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        let inner = Inner {
            ingress: RwLock::new(Arc::new(Ingress::new(&config))),
            backlog: Mutex::new(Backlog::new(backlog_bytes)),
            batch: Mutex::new(BatchEngine::new(config.batch_max_bytes, config.flush_interval_ms)),
            rotation: Mutex::new(RotationSink::new(storage)),
            config: RwLock::new(Arc::new(config)),
            transport,
            clock,
            commands: RwLock::new(CommandRegistry::new()),
            drain: Mutex::new(None),
            filtered: AtomicU64::new(0),
            retired_accepted: AtomicU64::new(0),
            retired_rejected: AtomicU64::new(0),
        };
        Ok(Self { inner: Arc::new(inner) })
    }

    /// Spawn the drain thread; a no-op when already running
    pub fn start(&self) -> Result<()> {
        self.inner.start()
    }

    /// Flush the batch and stop the drain thread
    ///
    /// Messages still in the transfer queue are abandoned.
    pub fn stop(&self) {
        self.inner.stop();
    }

    /// Whether the drain thread is running
    pub fn is_running(&self) -> bool {
        self.inner.is_running()
    }

    /// Render `args` and queue it; never blocks
    ///
    /// # Returns
    ///
    /// `false` if the line rendered empty or the queue was full
    pub fn submit(&self, args: fmt::Arguments<'_>) -> bool {
        self.inner.submit(args)
    }

    /// Queue a plain string
    pub fn print(&self, text: &str) -> bool {
        self.inner.submit(format_args!("{}", text))
    }

    /// Current configuration
    pub fn config(&self) -> Arc<Config> {
        self.inner.config.read().clone()
    }

    /// Apply a configuration change
    ///
    /// The drain thread is paused for the swap: the batch is force-flushed,
    /// the transfer queue rebuilt (queued messages are abandoned) and the
    /// drain thread restarted if it was running. An invalid result leaves
    /// the running configuration untouched.
    ///
    /// Must not be called from inside a transport or mirror callback, which
    /// run on the drain thread this method joins.
    pub fn update_config<F>(&self, change: F) -> Result<()>
    where
        F: FnOnce(&mut Config),
    {
        // The slot stays locked until the new drain thread is in place, so
        // no concurrent start can attach a thread to the retired queue
        let mut slot = self.inner.drain.lock();
        let mut next = (*self.config()).clone();
        change(&mut next);
        next.validate()?;

        let was_running = self.inner.halt(&mut slot);
        {
            let mut ingress = self.inner.ingress.write();
            let old = ingress.queue();
            self.inner.retired_accepted.fetch_add(old.accepted(), Ordering::Relaxed);
            self.inner.retired_rejected.fetch_add(old.rejected(), Ordering::Relaxed);
            *ingress = Arc::new(Ingress::new(&next));
        }
        self.inner.batch.lock().reset(next.batch_max_bytes, next.flush_interval_ms);
        debug!(config = ?next, "configuration updated");
        *self.inner.config.write() = Arc::new(next);

        if was_running {
            self.inner.spawn_into(&mut slot)?;
        }
        Ok(())
    }

    /// Replace the whole configuration
    pub fn set_config(&self, config: Config) -> Result<()> {
        self.update_config(|cfg| *cfg = config)
    }

    /// Toggle the `[HH:MM:SS.mmm] ` line prefix
    pub fn set_timestamps(&self, enable: bool) -> Result<()> {
        self.update_config(|cfg| cfg.timestamps = enable)
    }

    /// Set the maximum rendered line length (0 = unlimited)
    pub fn set_max_line_len(&self, max_line_len: usize) -> Result<()> {
        self.update_config(|cfg| cfg.max_line_len = max_line_len)
    }

    /// Set the admission ceiling for log-bridge lines
    pub fn set_severity_ceiling(&self, ceiling: Severity) -> Result<()> {
        self.update_config(|cfg| cfg.severity_ceiling = ceiling)
    }

    /// Set or clear the synchronous mirror sink
    pub fn set_mirror(&self, mirror: Option<Arc<dyn MirrorSink>>) -> Result<()> {
        self.update_config(|cfg| cfg.mirror = mirror)
    }

    /// Enable the rotating file log
    ///
    /// `None` and zero arguments keep the current values.
    pub fn enable_file_log(&self, path: Option<&str>, max_file_size: u64, max_files: u8) -> Result<()> {
        self.update_config(|cfg| {
            let file = &mut cfg.file_log;
            file.enabled = true;
            if let Some(path) = path {
                file.path = path.to_string();
            }
            if max_file_size > 0 {
                file.max_file_size = max_file_size;
            }
            if max_files > 0 {
                file.max_files = max_files;
            }
        })
    }

    /// Stop writing the file log
    pub fn disable_file_log(&self) -> Result<()> {
        self.update_config(|cfg| cfg.file_log.enabled = false)
    }

    /// Replace the file log settings
    pub fn set_file_log(&self, file_log: FileLogConfig) -> Result<()> {
        self.update_config(|cfg| cfg.file_log = file_log)
    }

    /// Copy of the backlog in chronological order
    pub fn backlog_snapshot(&self) -> Vec<u8> {
        self.inner.backlog.lock().snapshot()
    }

    /// Attempt to deliver the streaming batch now
    pub fn flush(&self, force: bool) -> FlushOutcome {
        self.inner.flush(force)
    }

    /// Greet a newly connected viewer
    ///
    /// Sends the banner, the backlog and the command table to `session`,
    /// then force-flushes the batch so the viewer is caught up.
    pub fn on_connect(&self, session: &dyn Session) {
        session.send_text(BANNER);
        let snapshot = self.backlog_snapshot();
        if !snapshot.is_empty() {
            session.send_text(&String::from_utf8_lossy(&snapshot));
        }
        let help = self.help_text();
        if !help.is_empty() {
            session.send_text(&help);
        }
        self.inner.flush(true);
    }

    /// Handle a line of text typed by a viewer
    ///
    /// The input is echoed into the pipeline, dispatched, and a non-empty
    /// reply is printed as well.
    pub fn on_data(&self, text: &str) {
        self.inner.submit(format_args!("> {}", text));
        let reply = self.dispatch(text);
        if !reply.is_empty() {
            self.print(&reply);
        }
    }

    /// Register a viewer command; see [`CommandRegistry::add`]
    pub fn add_command<F>(&self, name: &str, args: &str, help: &str, handler: F) -> bool
    where
        F: Fn(&[String]) -> String + Send + Sync + 'static,
    {
        self.inner.commands.write().add(name, args, help, handler)
    }

    /// Aligned command table, empty without commands
    pub fn help_text(&self) -> String {
        self.inner.commands.read().help_text()
    }

    /// Run one line of viewer input and return the reply
    pub fn dispatch(&self, raw: &str) -> String {
        let argv = tokenize(raw.trim());
        let handler = match argv.first() {
            Some(name) if name != "help" => self.inner.commands.read().lookup(name),
            _ => None,
        };
        // Handlers run without the registry lock so they may register commands
        match handler {
            Some(handler) => handler(argv.as_slice()),
            None => self.inner.commands.read().dispatch(raw),
        }
    }

    /// Pipeline counters
    pub fn stats(&self) -> ConsoleStats {
        let inner = &self.inner;
        let ingress = inner.ingress.read().clone();
        ConsoleStats {
            accepted: inner.retired_accepted.load(Ordering::Relaxed) + ingress.queue().accepted(),
            rejected: inner.retired_rejected.load(Ordering::Relaxed) + ingress.queue().rejected(),
            filtered: inner.filtered.load(Ordering::Relaxed),
            lost_bytes: inner.batch.lock().lost_total(),
            rotations: inner.rotation.lock().rotations(),
            backlog_used: inner.backlog.lock().used(),
        }
    }

    /// Route a log facility through this console
    ///
    /// The facility's current handler is kept by the returned registration
    /// and put back when it is restored or dropped.
    pub fn enable_log_bridge(&self, facility: &Arc<LogFacility>) -> BridgeRegistration {
        let handler = Arc::new(BridgeHandler::new(Arc::downgrade(&self.inner)));
        let link = facility.attach(handler);
        BridgeRegistration::new(Arc::clone(facility), link, Arc::downgrade(&self.inner))
    }

    /// Character sink for low-level boot output
    pub fn enable_boot_bridge(&self) -> Arc<BootCharSink> {
        Arc::new(BootCharSink::new(Arc::downgrade(&self.inner)))
    }

    /// `tracing` layer feeding events through the log-bridge path
    #[cfg(feature = "tracing-bridge")]
    pub fn console_layer(&self) -> crate::layer::ConsoleLayer {
        crate::layer::ConsoleLayer::new(Arc::downgrade(&self.inner))
    }
}

impl Drop for Console {
    fn drop(&mut self) {
        self.inner.stop();
    }
}

impl fmt::Debug for Console {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Console")
            .field("running", &self.is_running())
            .field("config", &self.config())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::disk::FsStorage;
    use crate::transport::NullTransport;
    use tempfile::tempdir;

    fn console(config: Config) -> (Console, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let console = Console::with_clock(
            Arc::new(NullTransport),
            Box::new(FsStorage::new(dir.path())),
            64,
            config,
            Arc::new(ManualClock::new(0)),
        )
        .unwrap();
        (console, dir)
    }

    #[test]
    fn test_invalid_config_rejected() {
        let dir = tempdir().unwrap();
        let result = Console::new(
            Arc::new(NullTransport),
            Box::new(FsStorage::new(dir.path())),
            0,
            Config { queue_len: 0, ..Config::default() },
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_update_config_validates_before_stopping() {
        let (console, _dir) = console(Config::default());
        console.start().unwrap();
        assert!(console.update_config(|cfg| cfg.queue_len = 0).is_err());
        assert!(console.is_running());
        assert_eq!(console.config().queue_len, 8);
    }

    #[test]
    fn test_stats_survive_queue_rebuild() {
        let (console, _dir) = console(Config { queue_len: 1, ..Config::default() });
        assert!(console.print("kept"));
        assert!(!console.print("dropped"));
        console.set_timestamps(false).unwrap();
        assert!(console.print("after"));

        let stats = console.stats();
        assert_eq!(stats.accepted, 2);
        assert_eq!(stats.rejected, 1);
        assert!(!console.config().timestamps);
    }

    #[test]
    fn test_enable_file_log_keeps_unset_fields() {
        let (console, _dir) = console(Config::default());
        console.enable_file_log(None, 0, 5).unwrap();
        let file = console.config().file_log.clone();
        assert!(file.enabled);
        assert_eq!(file.path, "/console.log");
        assert_eq!(file.max_file_size, 32 * 1024);
        assert_eq!(file.max_files, 5);

        console.disable_file_log().unwrap();
        assert!(!console.config().file_log.enabled);
    }

    #[test]
    fn test_start_stop_idempotent() {
        let (console, _dir) = console(Config::default());
        console.stop();
        console.start().unwrap();
        console.start().unwrap();
        assert!(console.is_running());
        console.stop();
        console.stop();
        assert!(!console.is_running());
    }

    #[test]
    fn test_dispatch_releases_registry_for_handler() {
        let (console, _dir) = console(Config::default());
        let console = Arc::new(console);
        let weak = Arc::downgrade(&console);
        console.add_command("nest", "", "Register from inside a handler", move |_| {
            let console = weak.upgrade().unwrap();
            console.add_command("inner", "", "", |_| "ok\n".to_string());
            "added\n".to_string()
        });
        assert_eq!(console.dispatch("nest"), "added\n");
        assert_eq!(console.dispatch("inner"), "ok\n");
    }
}
