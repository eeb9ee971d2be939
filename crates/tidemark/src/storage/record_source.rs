//! Relational record source backed by libsql
//!
//! Cursor columns hold either ISO-8601 text (`2026-01-02 03:04:05` or
//! `2026-01-02T03:04:05.000Z`) or numeric unix-epoch seconds. Both are
//! normalised to a Julian day before comparing with the watermark.
//!
//! A non-null cursor that normalises to NULL would never match the delta
//! predicate, so such rows fail the fetch instead of reading as "unchanged".

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use std::sync::Arc;
use tracing::debug;

use crate::core::datasource::{RecordSource, Result};
use crate::storage::backend::{quote_identifier, LibsqlBackend};
use tidemark_api::{Record, SyncError};

pub struct LibsqlRecordSource {
    backend: Arc<LibsqlBackend>,
}

impl LibsqlRecordSource {
    pub fn new(backend: Arc<LibsqlBackend>) -> Self {
        Self { backend }
    }

    fn select_sql(table: &str, cursor_field: &str, with_since: bool) -> String {
        let table = quote_identifier(table);
        let cursor = quote_identifier(cursor_field);
        if with_since {
            let normalised = cursor_julianday(&cursor);
            format!("SELECT * FROM {table} WHERE {normalised} > julianday(?1) ORDER BY {cursor}")
        } else {
            format!("SELECT * FROM {table} ORDER BY {cursor}")
        }
    }

    fn unreadable_cursor_sql(table: &str, cursor_field: &str) -> String {
        let table = quote_identifier(table);
        let cursor = quote_identifier(cursor_field);
        let normalised = cursor_julianday(&cursor);
        format!("SELECT COUNT(*) FROM {table} WHERE {cursor} IS NOT NULL AND {normalised} IS NULL")
    }

    async fn ensure_cursor_readable(
        &self,
        conn: &libsql::Connection,
        table: &str,
        cursor_field: &str,
    ) -> Result<()> {
        let sql = Self::unreadable_cursor_sql(table, cursor_field);
        let mut rows = conn
            .query(&sql, ())
            .await
            .map_err(|e| classify_error(table, e))?;
        let unreadable = match rows.next().await.map_err(|e| classify_error(table, e))? {
            Some(row) => row.get::<i64>(0).map_err(|e| classify_error(table, e))?,
            None => 0,
        };

        if unreadable > 0 {
            return Err(SyncError::query(format!(
                "Failed to query {}: {} rows have a {} value that is not a timestamp",
                table, unreadable, cursor_field
            )));
        }
        Ok(())
    }
}

/// SQL expression turning a quoted cursor column into a Julian day
fn cursor_julianday(cursor: &str) -> String {
    format!(
        "(CASE WHEN typeof({cursor}) IN ('integer', 'real') \
         THEN julianday({cursor}, 'unixepoch') ELSE julianday({cursor}) END)"
    )
}

#[async_trait]
impl RecordSource for LibsqlRecordSource {
    async fn fetch_records(
        &self,
        table: &str,
        cursor_field: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Record>> {
        let sql = Self::select_sql(table, cursor_field, since.is_some());
        let conn = self.backend.connection();

        if since.is_some() {
            self.ensure_cursor_readable(conn, table, cursor_field).await?;
        }

        let rows = match since {
            Some(since) => {
                let since = since.to_rfc3339_opts(SecondsFormat::Millis, true);
                conn.query(&sql, libsql::params![since]).await
            }
            None => conn.query(&sql, ()).await,
        };
        let mut rows = rows.map_err(|e| classify_error(table, e))?;

        let columns: Vec<String> = (0..rows.column_count())
            .map(|idx| rows.column_name(idx).unwrap_or_default().to_string())
            .collect();

        let mut records = Vec::new();
        while let Some(row) = rows.next().await.map_err(|e| classify_error(table, e))? {
            let mut record = Record::new();
            for (idx, name) in columns.iter().enumerate() {
                let value = row
                    .get_value(idx as i32)
                    .map_err(|e| classify_error(table, e))?;
                if let Some(json) = value_to_json(value) {
                    record.insert(name.clone(), json);
                }
            }
            records.push(record);
        }

        debug!(
            "[LibsqlRecordSource] Fetched {} rows from {} (since: {:?})",
            records.len(),
            table,
            since
        );
        Ok(records)
    }
}

/// Convert a column value to JSON; binary columns are dropped from the record
fn value_to_json(value: libsql::Value) -> Option<serde_json::Value> {
    match value {
        libsql::Value::Null => Some(serde_json::Value::Null),
        libsql::Value::Integer(i) => Some(serde_json::Value::from(i)),
        libsql::Value::Real(f) => Some(
            serde_json::Number::from_f64(f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
        ),
        libsql::Value::Text(s) => Some(text_to_json(s)),
        libsql::Value::Blob(_) => None,
    }
}

/// Text holding a JSON object or array is embedded as structured JSON
fn text_to_json(text: String) -> serde_json::Value {
    let trimmed = text.trim_start();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        if let Ok(json) = serde_json::from_str::<serde_json::Value>(&text) {
            if json.is_object() || json.is_array() {
                return json;
            }
        }
    }
    serde_json::Value::String(text)
}

/// Map a libsql failure onto the sync error taxonomy
///
/// libsql reports remote transport problems and local SQL problems through the
/// same error type; connection-level failures are recognised by message.
fn classify_error(table: &str, err: libsql::Error) -> SyncError {
    let message = err.to_string();
    let lowered = message.to_lowercase();
    let unreachable = ["connection", "unable to open", "timed out", "network"]
        .iter()
        .any(|needle| lowered.contains(needle));

    if unreachable {
        SyncError::source_unavailable(format!("Failed to reach source for {}: {}", table, message))
    } else {
        SyncError::query(format!("Failed to query {}: {}", table, message))
    }
}
