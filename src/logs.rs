// Log capture
// In-memory ring buffer fed by a tracing Layer, served by GET /api/logs and
// the `logs://server` MCP resource.

use std::collections::VecDeque;
use std::fmt::Write as _;

use axum::Json;
use axum::extract::{Query, State};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::Level;
use tracing::field::{Field, Visit};
use tracing_subscriber::layer::Context;

use crate::error::GatewayError;
use crate::state::AppState;

pub const DEFAULT_CAPACITY: usize = 1000;

// ── Ring buffer ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, serde::Serialize, utoipa::ToSchema)]
pub struct LogEntry {
    /// Position in the capture. Keeps counting after old entries are evicted.
    pub seq: u64,
    pub timestamp: String,
    #[serde(serialize_with = "serialize_level")]
    #[schema(value_type = String, example = "INFO")]
    pub level: Level,
    pub target: String,
    pub message: String,
}

fn serialize_level<S: serde::Serializer>(level: &Level, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(level.as_str())
}

struct Ring {
    entries: VecDeque<LogEntry>,
    next_seq: u64,
}

/// Bounded log history. `std::sync::Mutex` because pushes come from the
/// tracing layer, outside any async context.
pub struct LogRingBuffer {
    ring: std::sync::Mutex<Ring>,
    capacity: usize,
}

impl LogRingBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            ring: std::sync::Mutex::new(Ring {
                entries: VecDeque::with_capacity(capacity),
                next_seq: 0,
            }),
            capacity,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Ring> {
        self.ring.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn record(&self, level: Level, target: &str, message: String) {
        let mut ring = self.lock();
        if ring.entries.len() == self.capacity {
            ring.entries.pop_front();
        }
        let seq = ring.next_seq;
        ring.next_seq += 1;
        ring.entries.push_back(LogEntry {
            seq,
            timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            level,
            target: target.to_string(),
            message,
        });
    }

    /// Up to `limit` matching entries, newest first.
    pub fn newest(&self, limit: usize, filter: &LogFilter) -> Vec<LogEntry> {
        let ring = self.lock();
        ring.entries
            .iter()
            .rev()
            .filter(|e| filter.matches(e))
            .take(limit)
            .cloned()
            .collect()
    }

    /// Entries recorded since startup, including evicted ones.
    pub fn captured(&self) -> u64 {
        self.lock().next_seq
    }

    /// Last `lines` entries as plain text, oldest first.
    pub fn tail_text(&self, lines: usize) -> String {
        let ring = self.lock();
        let skip = ring.entries.len().saturating_sub(lines);
        let mut out = String::new();
        for e in ring.entries.iter().skip(skip) {
            let _ = writeln!(out, "{} {:>5} {}: {}", e.timestamp, e.level, e.target, e.message);
        }
        out
    }
}

/// Query-side filter for `GET /api/logs`.
#[derive(Debug, Default)]
pub struct LogFilter {
    /// Most verbose level still shown: `warn` keeps WARN and ERROR.
    pub level: Option<Level>,
    /// Lower-cased substring matched against message and target.
    pub search: Option<String>,
}

impl LogFilter {
    pub fn parse(level: Option<&str>, search: Option<&str>) -> Result<Self, GatewayError> {
        let level = level
            .filter(|l| !l.is_empty())
            .map(|l| {
                l.parse::<Level>()
                    .map_err(|_| GatewayError::invalid_input(format!("Unknown log level: {}", l)))
            })
            .transpose()?;
        Ok(Self {
            level,
            search: search.filter(|s| !s.is_empty()).map(str::to_lowercase),
        })
    }

    fn matches(&self, e: &LogEntry) -> bool {
        // tracing orders levels by verbosity: ERROR < WARN < ... < TRACE.
        self.level.is_none_or(|max| e.level <= max)
            && self.search.as_deref().is_none_or(|s| {
                e.message.to_lowercase().contains(s) || e.target.to_lowercase().contains(s)
            })
    }
}

// ── tracing Layer ───────────────────────────────────────────────────────────

/// Copies every event that passes the subscriber's filter into the buffer.
pub struct LogBufferLayer {
    buffer: std::sync::Arc<LogRingBuffer>,
}

impl LogBufferLayer {
    pub fn new(buffer: std::sync::Arc<LogRingBuffer>) -> Self {
        Self { buffer }
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{:?}", value);
        } else {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }
}

impl<S> tracing_subscriber::Layer<S> for LogBufferLayer
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        let meta = event.metadata();
        self.buffer.record(
            *meta.level(),
            meta.target(),
            format!("{}{}", visitor.message, visitor.fields),
        );
    }
}

// ── GET /api/logs ───────────────────────────────────────────────────────────

#[derive(Deserialize, utoipa::IntoParams)]
pub struct LogsQuery {
    pub limit: Option<usize>,
    pub level: Option<String>,
    pub search: Option<String>,
}

#[utoipa::path(get, path = "/api/logs", tag = "system",
    params(LogsQuery),
    responses(
        (status = 200, description = "Recent server log entries, newest first", body = Value),
        (status = 400, description = "Unknown log level", body = Value),
    ),
    security(("bearerAuth" = []))
)]
pub async fn server_logs(
    State(state): State<AppState>,
    Query(q): Query<LogsQuery>,
) -> Result<Json<Value>, GatewayError> {
    let filter = LogFilter::parse(q.level.as_deref(), q.search.as_deref())?;
    let limit = q.limit.unwrap_or(200).min(500);
    let entries = state.log_buffer.newest(limit, &filter);
    Ok(Json(json!({
        "logs": entries,
        "total": entries.len(),
        "captured": state.log_buffer.captured(),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(capacity: usize, lines: &[(Level, &str)]) -> LogRingBuffer {
        let buf = LogRingBuffer::new(capacity);
        for (level, message) in lines {
            buf.record(*level, "nexus_gateway::queue", message.to_string());
        }
        buf
    }

    #[test]
    fn evicts_oldest_and_keeps_counting() {
        let buf = filled(2, &[(Level::INFO, "one"), (Level::INFO, "two"), (Level::INFO, "three")]);
        let all = buf.newest(10, &LogFilter::default());
        assert_eq!(all.iter().map(|e| e.message.as_str()).collect::<Vec<_>>(), vec!["three", "two"]);
        assert_eq!(all[0].seq, 2);
        assert_eq!(buf.captured(), 3);
    }

    #[test]
    fn level_filter_keeps_that_level_and_more_severe() {
        let buf = filled(
            10,
            &[(Level::DEBUG, "noise"), (Level::WARN, "job failed"), (Level::ERROR, "state write failed")],
        );
        let filter = LogFilter::parse(Some("warn"), None).unwrap();
        assert_eq!(buf.newest(10, &filter).len(), 2);

        let filter = LogFilter::parse(None, Some("JOB")).unwrap();
        let hits = buf.newest(10, &filter);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].level, Level::WARN);
    }

    #[test]
    fn unknown_level_is_invalid_input() {
        let err = LogFilter::parse(Some("loud"), None).unwrap_err();
        assert_eq!(err.code(), "INVALID_INPUT");
    }

    #[test]
    fn entries_serialize_level_as_text() {
        let buf = filled(1, &[(Level::ERROR, "boom")]);
        let v = serde_json::to_value(&buf.newest(1, &LogFilter::default())[0]).unwrap();
        assert_eq!(v["level"], "ERROR");
        assert_eq!(v["seq"], 0);
    }

    #[test]
    fn tail_text_is_oldest_first() {
        let lines: Vec<(Level, String)> = (0..5).map(|i| (Level::INFO, format!("line {}", i))).collect();
        let lines: Vec<(Level, &str)> = lines.iter().map(|(l, m)| (*l, m.as_str())).collect();
        let text = filled(10, &lines).tail_text(2);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("line 3"));
        assert!(lines[1].ends_with("line 4"));
    }
}
