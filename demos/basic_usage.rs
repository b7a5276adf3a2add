//! Basic usage example for the sherlog console
//!
//! This example demonstrates:
//! 1. Building a console over a stdout "transport" and a temp directory
//! 2. Mirroring every line to stderr and enabling the rotating file log
//! 3. Submitting lines from several threads concurrently
//! 4. Routing a log facility and `tracing` through the console
//! 5. Greeting a viewer and dispatching a typed command
//!
//! The transport prints what it would stream to connected viewers. The file
//! log is written under a temporary directory which is cleaned up at the end.

use parking_lot::Mutex;
use sherlog_console::{console_printf, Config, Console, FsStorage, LogFacility, Session, Severity, Transport};
use std::io::{self, Write};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing_subscriber::layer::SubscriberExt;

/// Pretends a single viewer is always connected and writes to stdout
struct StdoutTransport;

impl Transport for StdoutTransport {
    fn has_connected_consumers(&self) -> bool {
        true
    }

    fn can_accept_write(&self) -> bool {
        true
    }

    fn broadcast(&self, bytes: &[u8]) {
        let mut out = io::stdout().lock();
        let _ = out.write_all(b"[ws] ");
        let _ = out.write_all(bytes);
    }
}

struct PrintSession;

impl Session for PrintSession {
    fn send_text(&self, text: &str) {
        print!("[viewer] {}", text);
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let temp_dir = std::env::temp_dir().join("sherlog_console_demo");
    std::fs::create_dir_all(&temp_dir)?;

    let config = Config {
        mirror: Some(Arc::new(Mutex::new(io::stderr()))),
        severity_ceiling: Severity::Warn,
        ..Config::default()
    };
    let console = Arc::new(Console::new(
        Arc::new(StdoutTransport),
        Box::new(FsStorage::new(&temp_dir)),
        4096,
        config,
    )?);
    console.enable_file_log(Some("/console.log"), 4 * 1024, 3)?;
    console.start()?;

    let weak = Arc::downgrade(&console);
    console.add_command("stats", "", "Show pipeline counters", move |_| match weak.upgrade() {
        Some(console) => format!("{:?}\n", console.stats()),
        None => String::new(),
    });

    println!("Writing from worker threads...");
    let workers: Vec<_> = (0..3)
        .map(|id| {
            let console = console.clone();
            thread::spawn(move || {
                for i in 0..5 {
                    if !console_printf!(console, "worker {} step {}", id, i) {
                        eprintln!("worker {} dropped step {}", id, i);
                    }
                    thread::sleep(Duration::from_millis(5));
                }
            })
        })
        .collect();
    for worker in workers {
        let _ = worker.join();
    }

    println!("Routing the log facility...");
    let facility = Arc::new(LogFacility::default());
    let registration = console.enable_log_bridge(&facility);
    facility.log(Severity::Error, "wifi", 1200, format_args!("association failed"));
    facility.log(Severity::Info, "wifi", 1250, format_args!("connected, rssi {}", -61));

    println!("Routing tracing events...");
    let subscriber = tracing_subscriber::registry().with(console.console_layer());
    tracing::subscriber::with_default(subscriber, || {
        tracing::warn!(target: "ota", "update server unreachable");
    });

    let boot = console.enable_boot_bridge();
    boot.write_str("ets Jun  8 2016 00:22:57\n");

    thread::sleep(Duration::from_millis(200));

    println!("A viewer connects...");
    console.on_connect(&PrintSession);
    console.on_data("stats");

    thread::sleep(Duration::from_millis(200));
    registration.restore();

    println!("File log written to {}", temp_dir.join("console.log").display());
    std::fs::remove_dir_all(&temp_dir)?;
    Ok(())
}
