//! Sherlog Console - a non-blocking log capture and fan-out pipeline
//! for embedded web consoles.
//!
//! # Overview
//!
//! Producers anywhere on the device (application threads, interrupt
//! handlers, the system log facility, early boot output) hand formatted
//! lines to the console without ever blocking. A single drain thread takes
//! them off a bounded transfer queue and fans each line out to:
//!
//! 1. A fixed-size backlog ring replayed to newly connected viewers
//! 2. A batching engine streaming to connected viewers over a [`Transport`]
//! 3. An optional synchronous mirror (serial port, stderr)
//! 4. An optional size-rotated file log
//!
//! # Key Features
//!
//! - Never-blocking submission from task and interrupt context
//! - A full queue drops the newest line instead of stalling producers
//! - Severity filtering of log-facility lines before they are queued
//! - Bounded batching with whole-line trimming and coalesced loss notices
//! - Generational file rotation that degrades silently on storage errors
//! - Swappable log facility registration that restores the prior handler
//!
//! # Usage
//!
//! The library is typically used by:
//! 1. Building a [`Console`] with a transport, a storage backend and a [`Config`]
//! 2. Starting the drain thread
//! 3. Routing the log facility or `tracing` through it
//! 4. Calling [`Console::on_connect`] and [`Console::on_data`] from the
//!    transport's session callbacks
//!
//! See `demos/basic_usage.rs` for a complete walkthrough.

#![deny(missing_docs)]

mod clock;
mod commands;
mod config;
mod console;
mod disk;
mod drain;
mod error;
mod filter;
mod gateway;
mod hooks;
#[cfg(feature = "tracing-bridge")]
mod layer;
mod memory;
mod transport;

pub use clock::{format_timestamp, Clock, ManualClock, MonotonicClock};
pub use commands::{tokenize, CommandFn, CommandRegistry, MAX_ARGS, MAX_COMMANDS, UNKNOWN_COMMAND};
pub use config::{Config, FileLogConfig, MIN_TASK_STACK};
pub use console::{Console, ConsoleStats, BANNER};
pub use disk::rotation::RotationSink;
pub use disk::{FsStorage, Storage};
pub use error::{ConfigError, Error, Result};
pub use filter::{admit, detect, Severity};
pub use gateway::ExecContext;
pub use hooks::{
    BootCharSink, BridgeHandler, BridgeRegistration, FormatHandler, LogFacility, StderrHandler,
    BOOT_LINE_CAPACITY,
};
#[cfg(feature = "tracing-bridge")]
pub use layer::{severity_for, ConsoleLayer};
pub use memory::backlog::Backlog;
pub use memory::batch::{loss_notice, BatchEngine, FlushOutcome};
pub use memory::queue::{IsrEnqueue, TransferQueue};
pub use memory::Message;
pub use transport::{MirrorSink, NullTransport, Session, Transport};

/// Format a line and submit it to a console
///
/// Expands to [`Console::submit`] and evaluates to its `bool` result.
///
/// ```no_run
/// # fn demo(console: &sherlog_console::Console) {
/// sherlog_console::console_printf!(console, "boot took {} ms", 412);
/// # }
/// ```
#[macro_export]
macro_rules! console_printf {
    ($console:expr, $($arg:tt)*) => {
        $console.submit(::core::format_args!($($arg)*))
    };
}
