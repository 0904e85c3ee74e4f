//! Observability infrastructure for Covet.
//!
//! Structured logging with consistent spans, plus the bounded in-memory log
//! ring the control surface snapshots for `/api/logs`. The ring is fed by a
//! `tracing` layer so every event the process emits lands in it; there is
//! no separate logging side channel.

use std::collections::VecDeque;
use std::fmt;
use std::fmt::Write as _;
use std::sync::{Arc, Mutex, Once};

use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

static INIT: Once = Once::new();

/// Number of log lines the ring retains by default.
pub const DEFAULT_LOG_CAPACITY: usize = 500;

/// Log output format.
#[derive(Debug, Clone, Copy, Default)]
pub enum LogFormat {
    /// JSON structured logs (for production).
    Json,
    /// Pretty-printed logs (for development).
    #[default]
    Pretty,
}

/// A bounded ring of recent log lines guarded by a mutex.
///
/// Pushing beyond capacity evicts the oldest line. Readers take a snapshot;
/// they never hold the lock across awaits.
#[derive(Debug)]
pub struct LogBuffer {
    capacity: usize,
    lines: Mutex<VecDeque<String>>,
}

impl LogBuffer {
    /// Creates a ring holding at most `capacity` lines.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            lines: Mutex::new(VecDeque::new()),
        }
    }

    /// Appends a line, evicting the oldest when full.
    pub fn push(&self, line: String) {
        if let Ok(mut lines) = self.lines.lock() {
            if lines.len() >= self.capacity {
                lines.pop_front();
            }
            lines.push_back(line);
        }
    }

    /// Returns a copy of the retained lines, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<String> {
        self.lines
            .lock()
            .map(|lines| lines.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns the number of retained lines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.lock().map(|lines| lines.len()).unwrap_or(0)
    }

    /// Returns true when no lines are retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}

/// A `tracing` layer that mirrors every event into a [`LogBuffer`].
pub struct BufferLayer {
    buffer: Arc<LogBuffer>,
}

impl BufferLayer {
    /// Creates a layer feeding the given ring.
    #[must_use]
    pub fn new(buffer: Arc<LogBuffer>) -> Self {
        Self { buffer }
    }
}

impl<S: Subscriber> Layer<S> for BufferLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = LineVisitor::default();
        event.record(&mut visitor);

        let timestamp = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S");
        let metadata = event.metadata();
        let mut line = format!("{timestamp} {:>5} {}", metadata.level(), visitor.message);
        if !visitor.fields.is_empty() {
            let _ = write!(line, " {}", visitor.fields);
        }
        self.buffer.push(line);
    }
}

#[derive(Default)]
struct LineVisitor {
    message: String,
    fields: String,
}

impl LineVisitor {
    fn push_field(&mut self, name: &str, rendered: fmt::Arguments<'_>) {
        if !self.fields.is_empty() {
            self.fields.push(' ');
        }
        let _ = write!(self.fields, "{name}={rendered}");
    }
}

impl Visit for LineVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.push_field(field.name(), format_args!("{value}"));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else {
            self.push_field(field.name(), format_args!("{value:?}"));
        }
    }
}

/// Initializes the logging subsystem.
///
/// Call once at application startup. Safe to call multiple times; subsequent
/// calls are no-ops. `RUST_LOG` controls levels, defaulting to `info`.
pub fn init_logging(format: LogFormat) {
    init_with(format, None);
}

/// Initializes logging and mirrors every event into `buffer`.
pub fn init_logging_with_buffer(format: LogFormat, buffer: Arc<LogBuffer>) {
    init_with(format, Some(buffer));
}

fn init_with(format: LogFormat, buffer: Option<Arc<LogBuffer>>) {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let buffer_layer = buffer.map(BufferLayer::new);

        match format {
            LogFormat::Json => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(tracing_subscriber::fmt::layer().json())
                    .with(buffer_layer)
                    .init();
            }
            LogFormat::Pretty => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(tracing_subscriber::fmt::layer().pretty())
                    .with(buffer_layer)
                    .init();
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::subscriber::with_default;
    use tracing_subscriber::Registry;

    #[test]
    fn ring_evicts_oldest_beyond_capacity() {
        let buffer = LogBuffer::new(3);
        for i in 0..5 {
            buffer.push(format!("line {i}"));
        }
        let lines = buffer.snapshot();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "line 2");
        assert_eq!(lines[2], "line 4");
    }

    #[test]
    fn layer_captures_message_and_fields() {
        let buffer = Arc::new(LogBuffer::new(10));
        let subscriber = Registry::default().with(BufferLayer::new(Arc::clone(&buffer)));

        with_default(subscriber, || {
            tracing::info!(venue_id = 89607, "cookies refreshed");
        });

        let lines = buffer.snapshot();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("cookies refreshed"));
        assert!(lines[0].contains("venue_id=89607"));
    }

    #[test]
    fn init_logging_is_idempotent() {
        init_logging(LogFormat::Pretty);
        init_logging(LogFormat::Pretty);
    }

    #[test]
    fn empty_ring_snapshot_is_empty() {
        let buffer = LogBuffer::default();
        assert!(buffer.is_empty());
        assert!(buffer.snapshot().is_empty());
    }
}
