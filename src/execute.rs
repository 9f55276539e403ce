//! Read-path statement execution against the business store.
//!
//! Every call opens a fresh connection, runs exactly one statement, and
//! releases the connection before returning. Column values are shaped into
//! JSON by the store's runtime type: integers and finite reals pass through,
//! blobs are replaced with a placeholder, and timestamp-shaped text is
//! re-rendered in ISO-8601 form so downstream synthesis reads naturally.

use std::path::Path;

use chrono::NaiveDateTime;
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Connection, Row as _, SqliteConnection, TypeInfo, ValueRef};

use crate::db;
use crate::error::EngineError;
use crate::models::{QueryStatement, Row};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";
const ISO_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Run a validated statement and return its rows as JSON objects.
pub async fn execute_query(
    store_path: &Path,
    statement: &QueryStatement,
) -> Result<Vec<Row>, EngineError> {
    let mut conn = db::connect_store(store_path).await?;
    let outcome = fetch_rows(&mut conn, &statement.sql).await;
    let _ = conn.close().await;
    let rows = outcome?;
    tracing::debug!(
        object = statement.target_object.as_str(),
        rows = rows.len(),
        "statement executed"
    );
    Ok(rows)
}

async fn fetch_rows(conn: &mut SqliteConnection, sql: &str) -> Result<Vec<Row>, EngineError> {
    let rows = sqlx::query(sql)
        .fetch_all(conn)
        .await
        .map_err(|e| EngineError::QueryExecution(format!("SQL query execution error: {}", e)))?;
    Ok(rows.iter().map(row_to_map).collect())
}

fn row_to_map(row: &SqliteRow) -> Row {
    let mut map = Row::new();
    for column in row.columns() {
        map.insert(column.name().to_string(), column_value(row, column.ordinal()));
    }
    map
}

fn column_value(row: &SqliteRow, index: usize) -> Value {
    let type_name = match row.try_get_raw(index) {
        Ok(raw) if !raw.is_null() => raw.type_info().name().to_string(),
        _ => return Value::Null,
    };
    match type_name.as_str() {
        "INTEGER" => row
            .try_get::<i64, _>(index)
            .map(Value::from)
            .unwrap_or(Value::Null),
        "REAL" => row
            .try_get::<f64, _>(index)
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        "TEXT" => match row.try_get::<String, _>(index) {
            Ok(text) => {
                let rendered = render_timestamp(&text).unwrap_or(text);
                Value::String(rendered)
            }
            Err(_) => Value::Null,
        },
        "BLOB" => Value::String("<binary data>".to_string()),
        _ => Value::Null,
    }
}

/// Re-render store timestamps (`2024-01-05 09:30:00`) as ISO-8601.
fn render_timestamp(text: &str) -> Option<String> {
    let parsed = NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT).ok()?;
    Some(parsed.format(ISO_FORMAT).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqliteConnectOptions;
    use sqlx::ConnectOptions;
    use std::path::PathBuf;
    use tempfile::TempDir;

    async fn seeded_store(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("store.db");
        let mut conn = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .connect()
            .await
            .unwrap();
        sqlx::query(
            "CREATE TABLE Candidate (
                Id INTEGER PRIMARY KEY,
                Name TEXT NOT NULL,
                Score REAL,
                Photo BLOB,
                CreatedAt TEXT
            )",
        )
        .execute(&mut conn)
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO Candidate (Id, Name, Score, Photo, CreatedAt) VALUES
                (1, 'Priya Sharma', 4.5, X'DEADBEEF', '2024-01-05 09:30:00'),
                (2, 'Rahul Verma', NULL, NULL, '2024-02-11 14:05:00.125')",
        )
        .execute(&mut conn)
        .await
        .unwrap();
        conn.close().await.unwrap();
        path
    }

    fn statement(sql: &str) -> QueryStatement {
        QueryStatement {
            sql: sql.to_string(),
            source_question: "test".to_string(),
            target_object: "Candidate".to_string(),
            requesting_role: "Recruiter".to_string(),
        }
    }

    #[tokio::test]
    async fn test_rows_shaped_by_runtime_type() {
        let dir = TempDir::new().unwrap();
        let path = seeded_store(&dir).await;
        let rows = execute_query(&path, &statement("SELECT * FROM Candidate ORDER BY Id"))
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);

        let first = &rows[0];
        assert_eq!(first["Id"], Value::from(1));
        assert_eq!(first["Name"], Value::from("Priya Sharma"));
        assert_eq!(first["Score"], Value::from(4.5));
        assert_eq!(first["Photo"], Value::from("<binary data>"));
        assert_eq!(first["CreatedAt"], Value::from("2024-01-05T09:30:00"));

        let second = &rows[1];
        assert_eq!(second["Score"], Value::Null);
        assert_eq!(second["Photo"], Value::Null);
        assert_eq!(second["CreatedAt"], Value::from("2024-02-11T14:05:00.125"));
    }

    #[tokio::test]
    async fn test_limit_bound_is_honored() {
        let dir = TempDir::new().unwrap();
        let path = seeded_store(&dir).await;
        let rows = execute_query(&path, &statement("SELECT Id FROM Candidate ORDER BY Id LIMIT 1"))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn test_execution_failure_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = seeded_store(&dir).await;
        let err = execute_query(&path, &statement("SELECT * FROM NoSuchTable"))
            .await
            .unwrap_err();
        match err {
            EngineError::QueryExecution(message) => {
                assert!(message.starts_with("SQL query execution error:"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_timestamp_rendering() {
        assert_eq!(
            render_timestamp("2024-01-05 09:30:00").as_deref(),
            Some("2024-01-05T09:30:00")
        );
        assert_eq!(render_timestamp("not a date"), None);
        assert_eq!(render_timestamp("2024-13-99 09:30:00"), None);
    }
}
