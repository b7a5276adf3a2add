//! Bounded transfer queue between producers and the drain loop
//!
//! A fixed-capacity FIFO of [`Message`] handles. Producers never wait:
//! both the task-context and the interrupt-context paths try once and, on a
//! full queue, drop the message and report failure. This is the pipeline's
//! single backpressure valve.
//!
//! The consumer side is only used by the drain loop, which blocks on the
//! receiver with the flush interval as timeout.

use crate::memory::Message;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use crossbeam_utils::CachePadded;
use std::sync::atomic::{AtomicU64, Ordering};

/// Outcome of an interrupt-context enqueue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IsrEnqueue {
    /// Whether the message was queued
    pub accepted: bool,
    /// Whether the consumer was likely blocked and should be switched to
    pub wake_consumer: bool,
}

/// Fixed-capacity multi-producer, single-consumer mailbox of messages
pub struct TransferQueue {
    tx: Sender<Message>,
    rx: Receiver<Message>,
    capacity: usize,
    accepted: CachePadded<AtomicU64>,
    rejected: CachePadded<AtomicU64>,
}

impl TransferQueue {
    /// Create a queue holding at most `capacity` messages
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0; configuration validation rejects that earlier.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "queue capacity must be non-zero");
        let (tx, rx) = bounded(capacity);
        Self {
            tx,
            rx,
            capacity,
            accepted: CachePadded::new(AtomicU64::new(0)),
            rejected: CachePadded::new(AtomicU64::new(0)),
        }
    }

    /// Task-context enqueue with zero wait
    ///
    /// On a full queue the message is released and `false` is returned.
    pub fn try_enqueue(&self, msg: Message) -> bool {
        match self.tx.try_send(msg) {
            Ok(()) => {
                self.accepted.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Full(msg)) | Err(TrySendError::Disconnected(msg)) => {
                drop(msg);
                self.rejected.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Interrupt-context enqueue
    ///
    /// Never yields. Reports whether the consumer was idle on an empty queue,
    /// in which case the caller should request a context switch on return
    /// from the interrupt.
    pub fn try_enqueue_from_isr(&self, msg: Message) -> IsrEnqueue {
        let was_empty = self.rx.is_empty();
        let accepted = self.try_enqueue(msg);
        IsrEnqueue {
            accepted,
            wake_consumer: accepted && was_empty,
        }
    }

    /// Receiver handle for the drain loop
    pub(crate) fn receiver(&self) -> &Receiver<Message> {
        &self.rx
    }

    /// Maximum number of queued messages
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Messages currently queued
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Whether no messages are queued
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Messages accepted since creation
    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    /// Messages dropped on a full queue since creation
    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }
}
