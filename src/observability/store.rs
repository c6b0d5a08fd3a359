use std::path::Path;
use std::sync::Mutex;

use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};

use super::{Labels, MetricsHook};
use crate::error::MetricsError;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS metric_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL,
    name TEXT NOT NULL,
    kind TEXT NOT NULL,
    value REAL NOT NULL,
    labels TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_metric_events_timestamp ON metric_events(timestamp);
CREATE INDEX IF NOT EXISTS idx_metric_events_name ON metric_events(name);
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Latency,
    Counter,
    Gauge,
}

impl MetricKind {
    fn as_str(self) -> &'static str {
        match self {
            MetricKind::Latency => "latency",
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "counter" => MetricKind::Counter,
            "gauge" => MetricKind::Gauge,
            _ => MetricKind::Latency,
        }
    }
}

/// Aggregate of one metric name over the retention window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub name: String,
    pub kind: MetricKind,
    pub events: u64,
    pub total: f64,
    pub avg: f64,
    pub max: f64,
}

/// Metrics hook persisting events into a local SQLite database.
pub struct SqliteMetricsStore {
    conn: Mutex<Connection>,
}

impl SqliteMetricsStore {
    pub fn open(path: &Path) -> Result<Self, MetricsError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "auto_vacuum", "INCREMENTAL")?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, MetricsError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, MetricsError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn record(
        &self,
        name: &str,
        kind: MetricKind,
        value: f64,
        labels: Labels<'_>,
    ) -> Result<(), MetricsError> {
        let labels_json = serde_json::Value::Object(
            labels
                .iter()
                .map(|(k, v)| (k.to_string(), serde_json::Value::from(*v)))
                .collect(),
        )
        .to_string();

        let conn = self.lock();
        conn.execute(
            "INSERT INTO metric_events (timestamp, name, kind, value, labels)
             VALUES (datetime('now'), ?1, ?2, ?3, ?4)",
            params![name, kind.as_str(), value, labels_json],
        )?;
        Ok(())
    }

    /// Per-name aggregates for events newer than `retention_days`.
    pub fn summary(&self, retention_days: u32) -> Result<Vec<MetricSummary>, MetricsError> {
        let query = format!(
            r#"
            SELECT
                name,
                kind,
                COUNT(*) as events,
                COALESCE(SUM(value), 0) as total,
                COALESCE(AVG(value), 0) as avg,
                COALESCE(MAX(value), 0) as max
            FROM metric_events
            WHERE timestamp >= datetime('now', '-{} days')
            GROUP BY name, kind
            ORDER BY name ASC
            "#,
            retention_days
        );

        let conn = self.lock();
        let mut stmt = conn.prepare(&query)?;
        let rows = stmt.query_map([], |row| {
            let kind: String = row.get(1)?;
            Ok(MetricSummary {
                name: row.get(0)?,
                kind: MetricKind::parse(&kind),
                events: row.get::<_, i64>(2)? as u64,
                total: row.get(3)?,
                avg: row.get(4)?,
                max: row.get(5)?,
            })
        })?;

        let summaries = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(summaries)
    }

    /// Delete events older than `retention_days`; returns the number removed.
    pub fn cleanup(&self, retention_days: u32) -> Result<usize, MetricsError> {
        let query = format!(
            "DELETE FROM metric_events WHERE timestamp < datetime('now', '-{} days')",
            retention_days
        );
        let conn = self.lock();
        Ok(conn.execute(&query, [])?)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        // A panic while holding the lock cannot leave the connection half-written.
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record_or_warn(&self, name: &str, kind: MetricKind, value: f64, labels: Labels<'_>) {
        if let Err(e) = self.record(name, kind, value, labels) {
            tracing::warn!(metric = name, error = %e, "failed to record metric");
        }
    }
}

impl MetricsHook for SqliteMetricsStore {
    fn record_latency(&self, name: &str, value_ms: f64, labels: Labels<'_>) {
        self.record_or_warn(name, MetricKind::Latency, value_ms, labels);
    }

    fn increment(&self, name: &str, value: u64, labels: Labels<'_>) {
        self.record_or_warn(name, MetricKind::Counter, value as f64, labels);
    }

    fn record_gauge(&self, name: &str, value: f64, labels: Labels<'_>) {
        self.record_or_warn(name, MetricKind::Gauge, value, labels);
    }
}
