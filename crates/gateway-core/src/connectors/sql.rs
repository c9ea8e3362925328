//! Read-only SQL connector: `db.query` / `db.schema` behind a statement
//! verifier, backed by a pooled SQLite connection.

use crate::errors::GatewayError;
use crate::registry::{Tool, ToolHandler};
use crate::schema::{FieldSchema, FieldSpec, ObjectSchema};
use async_trait::async_trait;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::Value as SqlValue;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqlConnectorConfig {
    pub path: PathBuf,
    pub max_rows: u64,
    pub query_timeout_ms: u64,
    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: u32,
    #[serde(default = "default_pool_idle_timeout_ms")]
    pub pool_idle_timeout_ms: u64,
}

fn default_pool_max_size() -> u32 {
    8
}

fn default_pool_idle_timeout_ms() -> u64 {
    60_000
}

const STATEMENT_BLOCKLIST: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "DROP", "ALTER", "CREATE", "TRUNCATE", "GRANT", "REVOKE",
    "EXECUTE", "CALL", "COPY", "LOAD", "SET", "LOCK", "UNLOCK",
];

const REQUIRED_FIRST_TOKENS: &[&str] = &["SELECT", "WITH", "EXPLAIN"];

const DANGEROUS_FUNCTIONS: &[&str] = &[
    "PG_READ_FILE",
    "PG_WRITE_FILE",
    "PG_FILE_WRITE",
    "LO_IMPORT",
    "LO_EXPORT",
    "COPY",
];

fn strip_comments(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '-' && chars.peek() == Some(&'-') {
            chars.next();
            for c in chars.by_ref() {
                if c == '\n' {
                    break;
                }
            }
            out.push(' ');
        } else if c == '/' && chars.peek() == Some(&'*') {
            chars.next();
            let mut prev = ' ';
            for c in chars.by_ref() {
                if prev == '*' && c == '/' {
                    break;
                }
                prev = c;
            }
            out.push(' ');
        } else {
            out.push(c);
        }
    }
    out
}

fn contains_whole_word(haystack: &str, word: &str) -> bool {
    let re = regex::Regex::new(&format!(r"\b{}\b", regex::escape(word))).expect("escaped pattern is valid");
    re.is_match(haystack)
}

/// Verify `sql` is a single read-only statement, returning the
/// whitespace-collapsed uppercase form used for the checks.
fn verify_read_only(sql: &str) -> Result<(), GatewayError> {
    let stripped = strip_comments(sql);
    let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    let upper = collapsed.to_uppercase();
    let trimmed = upper.trim();

    let without_trailing = trimmed.strip_suffix(';').unwrap_or(trimmed);
    if without_trailing.contains(';') {
        let segments = without_trailing.split(';').filter(|s| !s.trim().is_empty()).count();
        if segments > 1 {
            return Err(GatewayError::security("multiple statements are not permitted"));
        }
    }

    for word in STATEMENT_BLOCKLIST {
        if contains_whole_word(without_trailing, word) {
            return Err(GatewayError::security(format!("statement contains disallowed keyword '{word}'")));
        }
    }

    let first_token = without_trailing.split_whitespace().next().unwrap_or("");
    if !REQUIRED_FIRST_TOKENS.contains(&first_token) {
        return Err(GatewayError::security(format!(
            "statement must begin with one of {REQUIRED_FIRST_TOKENS:?}, found '{first_token}'"
        )));
    }

    for func in DANGEROUS_FUNCTIONS {
        if without_trailing.contains(func) {
            return Err(GatewayError::security(format!("statement references disallowed function '{func}'")));
        }
    }

    Ok(())
}

fn json_params_to_sql(params: &[Value]) -> Vec<SqlValue> {
    params
        .iter()
        .map(|v| match v {
            Value::Null => SqlValue::Null,
            Value::Bool(b) => SqlValue::Integer(*b as i64),
            Value::Number(n) if n.is_i64() => SqlValue::Integer(n.as_i64().unwrap()),
            Value::Number(n) => SqlValue::Real(n.as_f64().unwrap_or(0.0)),
            Value::String(s) => SqlValue::Text(s.clone()),
            other => SqlValue::Text(other.to_string()),
        })
        .collect()
}

fn row_to_json(row: &rusqlite::Row, column_names: &[String]) -> rusqlite::Result<Value> {
    let mut object = serde_json::Map::new();
    for (i, name) in column_names.iter().enumerate() {
        let value: SqlValue = row.get(i)?;
        let json_value = match value {
            SqlValue::Null => Value::Null,
            SqlValue::Integer(n) => json!(n),
            SqlValue::Real(f) => json!(f),
            SqlValue::Text(s) => json!(s),
            SqlValue::Blob(b) => {
                use base64::Engine;
                json!(base64::engine::general_purpose::STANDARD.encode(b))
            }
        };
        object.insert(name.clone(), json_value);
    }
    Ok(Value::Object(object))
}

struct QueryHandler {
    pool: Pool<SqliteConnectionManager>,
    config: SqlConnectorConfig,
}

#[async_trait]
impl ToolHandler for QueryHandler {
    async fn call(&self, args: &Value) -> Result<Value, GatewayError> {
        let sql = args["sql"].as_str().ok_or_else(|| GatewayError::validation("sql", "required"))?.to_string();
        verify_read_only(&sql)?;

        let params: Vec<Value> = args
            .get("params")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let pool = self.pool.clone();
        let max_rows = self.config.max_rows;
        let timeout_ms = self.config.query_timeout_ms;

        let deadline = Duration::from_millis(timeout_ms);
        tokio::time::timeout(
            deadline,
            tokio::task::spawn_blocking(move || run_query(&pool, &sql, &params, max_rows)),
        )
        .await
        .map_err(|_| GatewayError::Timeout { timeout_ms })?
        .map_err(|e| GatewayError::internal(format!("query task panicked: {e}")))?
    }
}

fn run_query(
    pool: &Pool<SqliteConnectionManager>,
    sql: &str,
    params: &[Value],
    max_rows: u64,
) -> Result<Value, GatewayError> {
    let conn = pool.get().map_err(|e| GatewayError::connector(format!("pool checkout failed: {e}")))?;
    conn.busy_timeout(Duration::from_millis(2000))
        .map_err(|e| GatewayError::connector(format!("busy_timeout failed: {e}")))?;

    let sql_params = json_params_to_sql(params);
    let param_refs: Vec<&dyn rusqlite::ToSql> = sql_params.iter().map(|v| v as &dyn rusqlite::ToSql).collect();

    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| GatewayError::connector(format!("prepare failed: {e}")))?;
    let column_names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

    let mut rows = stmt
        .query(param_refs.as_slice())
        .map_err(|e| GatewayError::connector(format!("query failed: {e}")))?;

    let mut out = Vec::new();
    let mut truncated = false;
    while let Some(row) = rows.next().map_err(|e| GatewayError::connector(format!("row fetch failed: {e}")))? {
        if out.len() as u64 >= max_rows {
            truncated = true;
            break;
        }
        out.push(row_to_json(row, &column_names).map_err(|e| GatewayError::connector(format!("decode failed: {e}")))?);
    }

    Ok(json!({
        "rows": out,
        "row_count": out.len(),
        "truncated": truncated,
    }))
}

struct SchemaHandler {
    pool: Pool<SqliteConnectionManager>,
}

#[async_trait]
impl ToolHandler for SchemaHandler {
    async fn call(&self, args: &Value) -> Result<Value, GatewayError> {
        let schema = args.get("schema").and_then(Value::as_str).unwrap_or("public").to_string();
        let table = args.get("table").and_then(Value::as_str).map(str::to_string);

        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || run_schema_query(&pool, &schema, table.as_deref()))
            .await
            .map_err(|e| GatewayError::internal(format!("schema task panicked: {e}")))?
    }
}

fn run_schema_query(
    pool: &Pool<SqliteConnectionManager>,
    schema: &str,
    table: Option<&str>,
) -> Result<Value, GatewayError> {
    let conn = pool.get().map_err(|e| GatewayError::connector(format!("pool checkout failed: {e}")))?;

    let (sql, param): (&str, Vec<SqlValue>) = match table {
        None => (
            "SELECT name AS table_name FROM sqlite_master WHERE type = 'table'",
            vec![],
        ),
        Some(table) => (
            "SELECT name, type FROM pragma_table_info(?1)",
            vec![SqlValue::Text(table.to_string())],
        ),
    };

    let param_refs: Vec<&dyn rusqlite::ToSql> = param.iter().map(|v| v as &dyn rusqlite::ToSql).collect();
    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| GatewayError::connector(format!("prepare failed: {e}")))?;
    let column_names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let mut rows = stmt
        .query(param_refs.as_slice())
        .map_err(|e| GatewayError::connector(format!("query failed: {e}")))?;

    let mut out = Vec::new();
    while let Some(row) = rows.next().map_err(|e| GatewayError::connector(format!("row fetch failed: {e}")))? {
        out.push(row_to_json(row, &column_names).map_err(|e| GatewayError::connector(format!("decode failed: {e}")))?);
    }

    Ok(json!({
        "schema": schema,
        "table": table,
        "columns": out,
    }))
}

pub struct SqlConnector;

impl SqlConnector {
    pub fn build_pool(config: &SqlConnectorConfig) -> Result<Pool<SqliteConnectionManager>, GatewayError> {
        let manager = SqliteConnectionManager::file(&config.path).with_flags(
            rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
        );
        Pool::builder()
            .max_size(config.pool_max_size)
            .idle_timeout(Some(Duration::from_millis(config.pool_idle_timeout_ms)))
            .build(manager)
            .map_err(|e| GatewayError::internal(format!("could not build sqlite pool: {e}")))
    }

    pub fn tools(config: SqlConnectorConfig) -> Result<Vec<Tool>, GatewayError> {
        let pool = Self::build_pool(&config)?;

        Ok(vec![
            Tool::new(
                "db.query",
                "Run a read-only SQL query",
                ObjectSchema::new()
                    .field("sql", FieldSpec::required(FieldSchema::string()))
                    .field(
                        "params",
                        FieldSpec::optional(FieldSchema::Array {
                            items: Box::new(FieldSchema::Any),
                            min_items: None,
                            max_items: None,
                        }),
                    ),
                std::sync::Arc::new(QueryHandler {
                    pool: pool.clone(),
                    config,
                }),
            ),
            Tool::new(
                "db.schema",
                "Inspect table/column metadata",
                ObjectSchema::new()
                    .field("table", FieldSpec::optional(FieldSchema::string()))
                    .field(
                        "schema",
                        FieldSpec::with_default(FieldSchema::string(), json!("public")),
                    ),
                std::sync::Arc::new(SchemaHandler { pool }),
            ),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_db() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let conn = rusqlite::Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT);
             INSERT INTO users (name) VALUES ('alice'), ('bob'), ('carol');",
        )
        .unwrap();
        (dir, path)
    }

    #[test]
    fn rejects_insert_statement() {
        assert!(verify_read_only("INSERT INTO users (name) VALUES ('x')").is_err());
    }

    #[test]
    fn rejects_multi_statement() {
        assert!(verify_read_only("SELECT 1; SELECT 2").is_err());
    }

    #[test]
    fn tolerates_trailing_semicolon() {
        assert!(verify_read_only("SELECT 1;").is_ok());
    }

    #[test]
    fn rejects_non_select_first_token() {
        assert!(verify_read_only("UPDATE users SET name = 'x'").is_err());
    }

    #[test]
    fn allows_select_with_and_explain() {
        assert!(verify_read_only("SELECT * FROM users").is_ok());
        assert!(verify_read_only("WITH t AS (SELECT 1) SELECT * FROM t").is_ok());
        assert!(verify_read_only("EXPLAIN SELECT * FROM users").is_ok());
    }

    #[test]
    fn strips_comments_before_checking() {
        assert!(verify_read_only("SELECT 1 -- ; DROP TABLE users\n").is_ok());
        assert!(verify_read_only("/* comment */ SELECT 1").is_ok());
    }

    #[test]
    fn rejects_dangerous_function_reference() {
        assert!(verify_read_only("SELECT pg_read_file('/etc/passwd')").is_err());
    }

    #[tokio::test]
    async fn query_returns_rows_and_respects_max_rows() {
        let (_dir, path) = setup_db();
        let config = SqlConnectorConfig {
            path,
            max_rows: 2,
            query_timeout_ms: 2000,
            pool_max_size: 4,
            pool_idle_timeout_ms: 30_000,
        };
        let pool = SqlConnector::build_pool(&config).unwrap();
        let handler = QueryHandler { pool, config };
        let result = handler
            .call(&json!({"sql": "SELECT * FROM users ORDER BY id"}))
            .await
            .unwrap();
        assert_eq!(result["row_count"], json!(2));
        assert_eq!(result["truncated"], json!(true));
    }

    #[tokio::test]
    async fn schema_lists_tables() {
        let (_dir, path) = setup_db();
        let config = SqlConnectorConfig {
            path,
            max_rows: 100,
            query_timeout_ms: 2000,
            pool_max_size: 4,
            pool_idle_timeout_ms: 30_000,
        };
        let pool = SqlConnector::build_pool(&config).unwrap();
        let handler = SchemaHandler { pool };
        let result = handler.call(&json!({})).await.unwrap();
        let columns = result["columns"].as_array().unwrap();
        assert!(columns.iter().any(|c| c["table_name"] == json!("users")));
    }
}
