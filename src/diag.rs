//! Bounded diagnostic ring
//!
//! The most recent N formatted log lines, each stamped with a strictly
//! increasing sequence number, kept for the `/diag` endpoint and the relay
//! push. A `tracing` layer mirrors every event into the ring so the console
//! and the HTTP surface always tell the same story.

use std::collections::VecDeque;
use std::fmt::Write as _;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

/// Lines retained by the ring
pub const DIAG_LINE_COUNT: usize = 16;
/// Length cap per stored line
pub const DIAG_LINE_LEN: usize = 104;

struct DiagInner {
    lines: VecDeque<String>,
    seq: u64,
}

/// Bounded ring of recent diagnostic lines
pub struct DiagLog {
    inner: Mutex<DiagInner>,
}

impl Default for DiagLog {
    fn default() -> Self {
        DiagLog {
            inner: Mutex::new(DiagInner {
                lines: VecDeque::with_capacity(DIAG_LINE_COUNT),
                seq: 1,
            }),
        }
    }
}

impl DiagLog {
    /// Append a line, evicting the oldest when full
    pub fn push(&self, line: &str) {
        let mut inner = self.inner.lock();
        let seq = inner.seq;
        inner.seq += 1;

        let mut stored = String::with_capacity(DIAG_LINE_LEN);
        let _ = write!(stored, "[{seq}] ");
        let mut remaining = DIAG_LINE_LEN.saturating_sub(stored.len());
        for c in line.chars() {
            let l = c.len_utf8();
            if l > remaining {
                break;
            }
            stored.push(c);
            remaining -= l;
        }

        if inner.lines.len() >= DIAG_LINE_COUNT {
            inner.lines.pop_front();
        }
        inner.lines.push_back(stored);
    }

    /// Copy of the retained lines, oldest first
    pub fn snapshot(&self) -> Vec<String> {
        self.inner.lock().lines.iter().cloned().collect()
    }

    /// Number of retained lines
    pub fn len(&self) -> usize {
        self.inner.lock().lines.len()
    }

    /// Whether nothing has been logged yet
    pub fn is_empty(&self) -> bool {
        self.inner.lock().lines.is_empty()
    }

    /// Next sequence number to be assigned
    pub fn seq(&self) -> u64 {
        self.inner.lock().seq
    }
}

/// `tracing` layer that mirrors formatted events into a [`DiagLog`]
pub struct DiagLayer {
    log: Arc<DiagLog>,
}

impl DiagLayer {
    /// Mirror events into `log`
    pub fn new(log: Arc<DiagLog>) -> Self {
        DiagLayer { log }
    }
}

struct MessageVisitor {
    line: String,
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            let text = format!("{value:?}");
            if self.line.is_empty() {
                self.line = text;
            } else {
                self.line = format!("{text} {}", self.line);
            }
        } else {
            if !self.line.is_empty() {
                self.line.push(' ');
            }
            let _ = write!(self.line, "{}={value:?}", field.name());
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            if self.line.is_empty() {
                self.line = value.to_string();
            } else {
                self.line = format!("{value} {}", self.line);
            }
        } else {
            if !self.line.is_empty() {
                self.line.push(' ');
            }
            let _ = write!(self.line, "{}={value}", field.name());
        }
    }
}

impl<S: Subscriber> Layer<S> for DiagLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor {
            line: String::new(),
        };
        event.record(&mut visitor);
        if !visitor.line.is_empty() {
            self.log.push(&visitor.line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_evicts_oldest() {
        let log = DiagLog::default();
        for i in 0..20 {
            log.push(&format!("line {i}"));
        }
        let lines = log.snapshot();
        assert_eq!(lines.len(), DIAG_LINE_COUNT);
        assert!(lines[0].contains("line 4"));
        assert!(lines.last().unwrap().contains("line 19"));
    }

    #[test]
    fn test_sequence_strictly_increasing() {
        let log = DiagLog::default();
        log.push("a");
        log.push("b");
        let lines = log.snapshot();
        assert!(lines[0].starts_with("[1] "));
        assert!(lines[1].starts_with("[2] "));
        assert_eq!(log.seq(), 3);
    }

    #[test]
    fn test_long_lines_clipped_at_char_boundary() {
        let log = DiagLog::default();
        log.push(&"あ".repeat(200));
        let lines = log.snapshot();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].len() <= DIAG_LINE_LEN);
    }

    #[test]
    fn test_layer_mirrors_events() {
        use tracing_subscriber::layer::SubscriberExt;
        let log = Arc::new(DiagLog::default());
        let subscriber =
            tracing_subscriber::registry().with(DiagLayer::new(Arc::clone(&log)));
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(code = 200, "probe ok");
        });
        let lines = log.snapshot();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("probe ok"));
        assert!(lines[0].contains("code=200"));
    }
}
