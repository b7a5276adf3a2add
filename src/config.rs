//! Console configuration
//!
//! A `Config` is fixed while the drain loop runs. Every change goes through
//! [`Console::update_config`](crate::Console::update_config), which pauses
//! the drain loop, swaps the record and rebuilds the transfer queue.

use crate::error::ConfigError;
use crate::filter::Severity;
use crate::gateway::ExecContext;
use crate::transport::MirrorSink;
use std::fmt;
use std::sync::Arc;

/// Minimum stack handed to the drain thread, whatever the configured size
pub const MIN_TASK_STACK: usize = 16 * 1024;

/// Rotating file log settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileLogConfig {
    /// Whether lines are written to the file log
    pub enabled: bool,
    /// Active file path, relative to the storage root
    pub path: String,
    /// Rotate once the active file grows beyond this many bytes
    pub max_file_size: u64,
    /// Number of historical generations kept (`<path>.1` ..= `<path>.N`)
    pub max_files: u8,
}

impl Default for FileLogConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: "/console.log".to_string(),
            max_file_size: 32 * 1024,
            max_files: 3,
        }
    }
}

/// Pipeline configuration
#[derive(Clone)]
pub struct Config {
    /// Transfer queue depth in messages
    pub queue_len: usize,
    /// Requested drain thread stack in bytes
    pub task_stack: usize,
    /// Requested drain task priority; kept for hosts with a priority scheduler
    pub task_priority: u8,
    /// Optional synchronous mirror for every normalised line
    pub mirror: Option<Arc<dyn MirrorSink>>,
    /// Prefix lines with `[HH:MM:SS.mmm] `
    pub timestamps: bool,
    /// Maximum rendered line length in bytes (0 = unlimited)
    pub max_line_len: usize,
    /// File log settings
    pub file_log: FileLogConfig,
    /// Log-bridge lines ranked below this severity are dropped
    pub severity_ceiling: Severity,
    /// Streaming batch size ceiling in bytes
    pub batch_max_bytes: usize,
    /// Time-based flush period (0 = flush only on size or force)
    pub flush_interval_ms: u64,
    /// Reports the execution context of the calling producer
    pub current_context: fn() -> ExecContext,
    /// Requests a context switch after an interrupt-context enqueue woke the consumer
    pub isr_yield: fn(),
}

fn task_context() -> ExecContext {
    ExecContext::Task
}

fn no_yield() {}

impl Default for Config {
    fn default() -> Self {
        Self {
            queue_len: 8,
            task_stack: 4096,
            task_priority: 3,
            mirror: None,
            timestamps: true,
            max_line_len: 512,
            file_log: FileLogConfig::default(),
            severity_ceiling: Severity::Error,
            batch_max_bytes: 1024,
            flush_interval_ms: 100,
            current_context: task_context,
            isr_yield: no_yield,
        }
    }
}

impl Config {
    /// Check the record for values the pipeline cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_len == 0 {
            return Err(ConfigError::ZeroQueueDepth);
        }
        if self.task_stack == 0 {
            return Err(ConfigError::ZeroTaskStack);
        }
        if self.file_log.enabled {
            if self.file_log.path.is_empty() {
                return Err(ConfigError::EmptyFilePath);
            }
            if self.file_log.max_file_size == 0 {
                return Err(ConfigError::ZeroMaxFileSize);
            }
        }
        Ok(())
    }

    /// Stack size actually requested from the thread builder
    pub fn effective_stack(&self) -> usize {
        self.task_stack.max(MIN_TASK_STACK)
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("queue_len", &self.queue_len)
            .field("task_stack", &self.task_stack)
            .field("task_priority", &self.task_priority)
            .field("mirror", &self.mirror.is_some())
            .field("timestamps", &self.timestamps)
            .field("max_line_len", &self.max_line_len)
            .field("file_log", &self.file_log)
            .field("severity_ceiling", &self.severity_ceiling)
            .field("batch_max_bytes", &self.batch_max_bytes)
            .field("flush_interval_ms", &self.flush_interval_ms)
            .finish_non_exhaustive()
    }
}
