//! `tracing` integration
//!
//! [`ConsoleLayer`] renders each event as an IDF-style line and feeds it
//! through the log-bridge path, so the severity ceiling applies to it.

use crate::console::Inner;
use crate::filter::Severity;
use std::fmt::{self, Write};
use std::sync::Weak;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

const OWN_TARGET: &str = "sherlog_console";

/// Layer forwarding `tracing` events into a console
///
/// Events emitted by this crate are skipped.
pub struct ConsoleLayer {
    console: Weak<Inner>,
}

impl ConsoleLayer {
    pub(crate) fn new(console: Weak<Inner>) -> Self {
        Self { console }
    }
}

/// Severity marker used for a `tracing` level
pub fn severity_for(level: &Level) -> Severity {
    match *level {
        Level::ERROR => Severity::Error,
        Level::WARN => Severity::Warn,
        Level::INFO => Severity::Info,
        Level::DEBUG => Severity::Debug,
        Level::TRACE => Severity::Verbose,
    }
}

impl<S: Subscriber> Layer<S> for ConsoleLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if metadata.target().starts_with(OWN_TARGET) {
            return;
        }
        let Some(inner) = self.console.upgrade() else {
            return;
        };

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        inner.bridge_write(format_args!(
            "{} ({}) {}: {}",
            severity_for(metadata.level()).marker(),
            inner.clock.now_ms(),
            metadata.target(),
            visitor.finish()
        ));
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl MessageVisitor {
    fn finish(mut self) -> String {
        if !self.fields.is_empty() {
            if !self.message.is_empty() {
                self.message.push(' ');
            }
            self.message.push_str(&self.fields);
        }
        self.message
    }

    fn separator(&mut self) {
        if !self.fields.is_empty() {
            self.fields.push(' ');
        }
    }
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{:?}", value);
        } else {
            self.separator();
            let _ = write!(self.fields, "{}={:?}", field.name(), value);
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            self.separator();
            let _ = write!(self.fields, "{}={}", field.name(), value);
        }
    }
}
