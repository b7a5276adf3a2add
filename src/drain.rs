//! The drain loop: single consumer of the transfer queue
//!
//! One dedicated thread waits on the queue with the flush interval as
//! timeout. Each received message is normalised (newline, optional
//! timestamp) and fanned out to the backlog, the batch engine, the mirror
//! and the file log. A timeout with nothing received runs the time-based
//! flush check so batched content never waits longer than one interval.
//!
//! The drain thread is the only writer of the backlog and the rotation
//! sink while it runs.

use crate::clock::format_timestamp;
use crate::config::Config;
use crate::console::Inner;
use crate::gateway::Ingress;
use crate::memory::Message;
use crossbeam_channel::{bounded, select, Receiver, RecvError, Sender};
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::debug;

/// Running drain thread plus its stop signal
pub(crate) struct DrainHandle {
    stop_tx: Sender<()>,
    thread: JoinHandle<()>,
}

impl DrainHandle {
    /// Signal the loop and wait for it to exit
    ///
    /// Messages still queued are abandoned.
    pub(crate) fn stop(self) {
        drop(self.stop_tx);
        if self.thread.join().is_err() {
            debug!("drain thread panicked before stop");
        }
    }
}

enum Wake {
    Line(Message),
    Timeout,
    Stop,
}

impl From<Result<Message, RecvError>> for Wake {
    fn from(received: Result<Message, RecvError>) -> Self {
        match received {
            Ok(msg) => Wake::Line(msg),
            Err(RecvError) => Wake::Stop,
        }
    }
}

/// Spawn the drain thread for the given queue and configuration snapshot
pub(crate) fn spawn(inner: Arc<Inner>, ingress: Arc<Ingress>, cfg: Arc<Config>) -> io::Result<DrainHandle> {
    let (stop_tx, stop_rx) = bounded::<()>(0);
    let thread = thread::Builder::new()
        .name("sherlog-drain".to_string())
        .stack_size(cfg.effective_stack())
        .spawn(move || run(&inner, &ingress, &cfg, &stop_rx))?;
    Ok(DrainHandle { stop_tx, thread })
}

fn run(inner: &Inner, ingress: &Ingress, cfg: &Config, stop_rx: &Receiver<()>) {
    let rx = ingress.queue().receiver();
    let wait = (cfg.flush_interval_ms > 0).then(|| Duration::from_millis(cfg.flush_interval_ms));
    debug!(
        queue_len = cfg.queue_len,
        priority = cfg.task_priority,
        flush_interval_ms = cfg.flush_interval_ms,
        "drain loop started"
    );

    loop {
        let wake = match wait {
            Some(timeout) => select! {
                recv(rx) -> msg => Wake::from(msg),
                recv(stop_rx) -> _ => Wake::Stop,
                default(timeout) => Wake::Timeout,
            },
            None => select! {
                recv(rx) -> msg => Wake::from(msg),
                recv(stop_rx) -> _ => Wake::Stop,
            },
        };

        match wake {
            Wake::Line(msg) => process(inner, cfg, msg),
            Wake::Timeout => {
                inner.flush(false);
            }
            Wake::Stop => break,
        }
    }
    debug!(abandoned = rx.len(), "drain loop stopped");
}

/// Normalise one message and fan it out to every sink
pub(crate) fn process(inner: &Inner, cfg: &Config, mut msg: Message) {
    msg.ensure_newline();
    let now = inner.clock.now_ms();
    let line = if cfg.timestamps {
        let mut stamped = format_timestamp(now);
        stamped.push_str(msg.as_str());
        stamped
    } else {
        msg.into_string()
    };
    let bytes = line.as_bytes();

    inner.backlog.lock().push(bytes);
    inner.batch.lock().accumulate(bytes, inner.transport.as_ref(), now);
    if let Some(mirror) = &cfg.mirror {
        mirror.write_line(bytes);
    }
    if cfg.file_log.enabled {
        inner.rotation.lock().append(&cfg.file_log, bytes);
    }
}
