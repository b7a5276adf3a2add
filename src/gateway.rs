//! Ingestion gateway: producer entry into the pipeline
//!
//! Producers may run in task or interrupt context. The context is checked once
//! per submission and routes to one of two non-blocking enqueue strategies;
//! neither ever waits on the queue.

use crate::config::Config;
use crate::filter::{self, Severity};
use crate::memory::queue::TransferQueue;
use crate::memory::Message;
use std::fmt;

/// Execution context of a producer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecContext {
    /// Regular thread/task context
    Task,
    /// Interrupt handler; must not block or yield
    Interrupt,
}

/// Producer-side view of the pipeline: the queue plus the settings
/// producers need, swapped as a unit on reconfiguration
pub(crate) struct Ingress {
    queue: TransferQueue,
    max_line_len: usize,
    ceiling: Severity,
    current_context: fn() -> ExecContext,
    isr_yield: fn(),
}

impl Ingress {
    pub(crate) fn new(cfg: &Config) -> Self {
        Self {
            queue: TransferQueue::new(cfg.queue_len),
            max_line_len: cfg.max_line_len,
            ceiling: cfg.severity_ceiling,
            current_context: cfg.current_context,
            isr_yield: cfg.isr_yield,
        }
    }

    pub(crate) fn queue(&self) -> &TransferQueue {
        &self.queue
    }

    /// Render and enqueue; `false` if rendering or queueing failed
    pub(crate) fn submit(&self, args: fmt::Arguments<'_>) -> bool {
        match Message::format(args, self.max_line_len) {
            (Some(msg), _) => self.enqueue(msg),
            (None, _) => false,
        }
    }

    /// Log-bridge path: render, filter by severity, enqueue
    ///
    /// Returns the rendered length and whether the line was filtered out.
    pub(crate) fn submit_filtered(&self, args: fmt::Arguments<'_>) -> (usize, bool) {
        let (msg, rendered) = Message::format(args, self.max_line_len);
        let Some(msg) = msg else {
            return (rendered, false);
        };
        if !filter::admit(msg.as_bytes(), self.ceiling) {
            return (rendered, true);
        }
        self.enqueue(msg);
        (rendered, false)
    }

    /// Hand a message to the queue using the strategy for the current context
    pub(crate) fn enqueue(&self, msg: Message) -> bool {
        match (self.current_context)() {
            ExecContext::Interrupt => {
                let outcome = self.queue.try_enqueue_from_isr(msg);
                if outcome.wake_consumer {
                    (self.isr_yield)();
                }
                outcome.accepted
            }
            ExecContext::Task => self.queue.try_enqueue(msg),
        }
    }
}

/// Length `args` renders to, without keeping the text
pub(crate) fn rendered_len(args: fmt::Arguments<'_>) -> usize {
    struct Counter(usize);

    impl fmt::Write for Counter {
        fn write_str(&mut self, s: &str) -> fmt::Result {
            self.0 += s.len();
            Ok(())
        }
    }

    let mut counter = Counter(0);
    let _ = fmt::write(&mut counter, args);
    counter.0
}
