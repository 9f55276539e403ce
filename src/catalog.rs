//! Catalog introspection over the business store.
//!
//! The catalog is read fresh on every call; nothing is cached, because the
//! platform may alter tables between requests. Lookup order is base tables
//! first, then views.

use sqlx::{Row, SqliteConnection};

use crate::error::EngineError;
use crate::models::{SchemaColumn, SchemaDescriptor};

/// List all user tables and views, tables first, each group alphabetical.
pub async fn list_objects(conn: &mut SqliteConnection) -> Result<Vec<String>, sqlx::Error> {
    let tables: Vec<String> = sqlx::query_scalar(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )
    .fetch_all(&mut *conn)
    .await?;

    let views: Vec<String> =
        sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type = 'view' ORDER BY name")
            .fetch_all(&mut *conn)
            .await?;

    Ok(tables.into_iter().chain(views).collect())
}

/// Describe one catalog object: ordered columns for a base table, the
/// stored defining statement for a view.
pub async fn describe(
    conn: &mut SqliteConnection,
    object_name: &str,
) -> Result<SchemaDescriptor, EngineError> {
    let is_table: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type = 'table' AND name = ?1 AND name NOT LIKE 'sqlite_%'",
    )
    .bind(object_name)
    .fetch_one(&mut *conn)
    .await?;

    if is_table {
        let columns = table_columns(conn, object_name).await?;
        return Ok(SchemaDescriptor::Table {
            name: object_name.to_string(),
            columns,
        });
    }

    let view_sql: Option<String> =
        sqlx::query_scalar("SELECT sql FROM sqlite_master WHERE type = 'view' AND name = ?1")
            .bind(object_name)
            .fetch_optional(&mut *conn)
            .await?;

    match view_sql {
        Some(definition) => Ok(SchemaDescriptor::View {
            name: object_name.to_string(),
            definition,
        }),
        None => Err(EngineError::ObjectNotFound(format!(
            "The {} table/view does not exist",
            object_name
        ))),
    }
}

async fn table_columns(
    conn: &mut SqliteConnection,
    table: &str,
) -> Result<Vec<SchemaColumn>, sqlx::Error> {
    let rows = sqlx::query(
        r#"SELECT name, type, "notnull", dflt_value FROM pragma_table_info(?1) ORDER BY cid"#,
    )
    .bind(table)
    .fetch_all(&mut *conn)
    .await?;

    let mut columns = Vec::with_capacity(rows.len());
    for row in rows {
        let name: String = row.try_get("name")?;
        let declared: String = row.try_get("type")?;
        let notnull: i64 = row.try_get("notnull")?;
        let default: Option<String> = row.try_get("dflt_value")?;
        let (data_type, max_length) = split_declared_type(&declared);
        columns.push(SchemaColumn {
            name,
            data_type,
            max_length,
            nullable: notnull == 0,
            default,
        });
    }
    Ok(columns)
}

/// Split a declared column type like `VARCHAR(200)` into base type and
/// length. Multi-argument forms (`DECIMAL(10,2)`) stay whole.
fn split_declared_type(declared: &str) -> (String, Option<i64>) {
    let declared = declared.trim();
    if let (Some(open), Some(close)) = (declared.find('('), declared.rfind(')')) {
        if close > open {
            if let Ok(n) = declared[open + 1..close].trim().parse::<i64>() {
                return (declared[..open].trim().to_string(), Some(n));
            }
        }
    }
    (declared.to_string(), None)
}

/// Render a descriptor into the canonical structural text embedded in
/// translation prompts.
pub fn render(descriptor: &SchemaDescriptor) -> String {
    match descriptor {
        SchemaDescriptor::Table { name, columns } => {
            let mut out = format!("CREATE TABLE \"{}\" (\n", name);
            for (i, col) in columns.iter().enumerate() {
                let data_type = match col.max_length {
                    Some(len) => format!("{}({})", col.data_type, len),
                    None => col.data_type.clone(),
                };
                let nullable = if col.nullable { "NULL" } else { "NOT NULL" };
                let default = col
                    .default
                    .as_ref()
                    .map(|d| format!(" DEFAULT {}", d))
                    .unwrap_or_default();
                let comma = if i + 1 == columns.len() { "" } else { "," };
                out.push_str(&format!(
                    "    \"{}\" {} {}{}{}\n",
                    col.name, data_type, nullable, default, comma
                ));
            }
            out.push(')');
            out
        }
        SchemaDescriptor::View { definition, .. } => definition.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::Connection;

    async fn seeded_conn() -> SqliteConnection {
        let mut conn = SqliteConnection::connect("sqlite::memory:").await.unwrap();
        sqlx::query(
            r#"
            CREATE TABLE Candidate (
                CandidateID INTEGER NOT NULL,
                FullName VARCHAR(200),
                Notes TEXT DEFAULT 'none'
            )
            "#,
        )
        .execute(&mut conn)
        .await
        .unwrap();
        sqlx::query("CREATE VIEW ActiveCandidate AS SELECT CandidateID FROM Candidate")
            .execute(&mut conn)
            .await
            .unwrap();
        conn
    }

    #[tokio::test]
    async fn test_list_objects_tables_then_views() {
        let mut conn = seeded_conn().await;
        let objects = list_objects(&mut conn).await.unwrap();
        assert_eq!(objects, vec!["Candidate", "ActiveCandidate"]);
    }

    #[tokio::test]
    async fn test_describe_table_columns_in_order() {
        let mut conn = seeded_conn().await;
        let descriptor = describe(&mut conn, "Candidate").await.unwrap();
        match &descriptor {
            SchemaDescriptor::Table { columns, .. } => {
                assert_eq!(columns.len(), 3);
                assert_eq!(columns[0].name, "CandidateID");
                assert!(!columns[0].nullable);
                assert_eq!(columns[1].data_type, "VARCHAR");
                assert_eq!(columns[1].max_length, Some(200));
                assert_eq!(columns[2].default.as_deref(), Some("'none'"));
            }
            other => panic!("expected table descriptor, got {:?}", other),
        }
        let rendered = render(&descriptor);
        assert!(rendered.starts_with("CREATE TABLE \"Candidate\""));
        assert!(rendered.contains("\"FullName\" VARCHAR(200) NULL"));
        assert!(rendered.contains("\"CandidateID\" INTEGER NOT NULL"));
    }

    #[tokio::test]
    async fn test_describe_view_returns_definition() {
        let mut conn = seeded_conn().await;
        let descriptor = describe(&mut conn, "ActiveCandidate").await.unwrap();
        match &descriptor {
            SchemaDescriptor::View { definition, .. } => {
                assert!(definition.contains("CREATE VIEW ActiveCandidate"));
            }
            other => panic!("expected view descriptor, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_describe_unknown_object() {
        let mut conn = seeded_conn().await;
        let err = describe(&mut conn, "Payroll").await.unwrap_err();
        assert!(matches!(err, EngineError::ObjectNotFound(_)));
    }

    #[test]
    fn test_split_declared_type() {
        assert_eq!(
            split_declared_type("VARCHAR(200)"),
            ("VARCHAR".to_string(), Some(200))
        );
        assert_eq!(split_declared_type("INTEGER"), ("INTEGER".to_string(), None));
        assert_eq!(
            split_declared_type("DECIMAL(10,2)"),
            ("DECIMAL(10,2)".to_string(), None)
        );
    }
}
