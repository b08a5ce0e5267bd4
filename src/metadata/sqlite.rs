//! SQLite-backed document store.
//!
//! Uses `rusqlite` with the `bundled` feature so no system SQLite
//! library is required.  All async trait methods are thin wrappers
//! around synchronous rusqlite calls executed under a `Mutex`.
//!
//! Record bodies are stored as JSON text; filters and ordering are pushed
//! down to SQLite through `json_extract`.  Native order is insertion order.

use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde_json::Value;

use super::store::{
    generate_document_id, Direction, Document, DocumentStore, Filter, Query, StoredDocument,
};

/// Current schema version. Bumped when migrations are added.
const SCHEMA_VERSION: i64 = 1;

/// Document store backed by a single SQLite database file.
pub struct SqliteDocumentStore {
    /// The database connection, guarded by a mutex for Send + Sync.
    conn: Mutex<Connection>,
}

impl SqliteDocumentStore {
    /// Open (or create) the database at `path` and initialize the schema.
    ///
    /// Passing `":memory:"` creates an in-memory database (useful for tests).
    pub fn new(path: &str) -> anyhow::Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.apply_pragmas()?;
        store.init_db()?;
        Ok(store)
    }

    /// Apply recommended SQLite pragmas for performance and safety.
    fn apply_pragmas(&self) -> anyhow::Result<()> {
        let conn = self.conn.lock().expect("mutex poisoned");
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 5000;
            ",
        )?;
        Ok(())
    }

    /// Create the required tables and indexes if they do not already exist.
    /// This is idempotent -- safe to call on every startup.
    fn init_db(&self) -> anyhow::Result<()> {
        let conn = self.conn.lock().expect("mutex poisoned");
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS schema_version (
                version    INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS documents (
                seq         INTEGER PRIMARY KEY AUTOINCREMENT,
                collection  TEXT NOT NULL,
                id          TEXT NOT NULL,
                body        TEXT NOT NULL,

                UNIQUE (collection, id)
            );

            CREATE INDEX IF NOT EXISTS idx_documents_collection
                ON documents(collection, seq);
            ",
        )?;

        let existing: Option<i64> = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |row| {
                row.get(0)
            })
            .optional()?
            .flatten();

        if existing.map_or(true, |v| v < SCHEMA_VERSION) {
            conn.execute(
                "INSERT OR REPLACE INTO schema_version (version, applied_at) VALUES (?1, ?2)",
                params![SCHEMA_VERSION, chrono::Utc::now().to_rfc3339()],
            )?;
        }

        Ok(())
    }
}

/// JSON path addressing a top-level field, quoted so any key is safe.
fn json_path(field: &str) -> String {
    format!("$.\"{}\"", field.replace('"', "\\\""))
}

/// Convert a scalar JSON filter operand to the SQL value `json_extract`
/// would produce for it.
fn to_sql_value(value: &Value) -> anyhow::Result<SqlValue> {
    Ok(match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(
                n.as_f64()
                    .ok_or_else(|| anyhow::anyhow!("Unrepresentable number: {n}"))?,
            ),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        Value::Array(_) | Value::Object(_) => {
            anyhow::bail!("Only scalar values can be used as filter operands")
        }
    })
}

/// Build the SELECT statement and its parameters for `query`.
fn build_select(collection: &str, query: &Query) -> anyhow::Result<(String, Vec<SqlValue>)> {
    let mut sql = String::from("SELECT id, body FROM documents WHERE collection = ?");
    let mut args = vec![SqlValue::Text(collection.to_string())];

    for filter in &query.filters {
        match filter {
            Filter::Eq { field, value } => {
                sql.push_str(" AND json_extract(body, ?) IS ?");
                args.push(SqlValue::Text(json_path(field)));
                args.push(to_sql_value(value)?);
            }
            Filter::Range { field, start, end } => {
                sql.push_str(" AND json_extract(body, ?) >= ? AND json_extract(body, ?) < ?");
                args.push(SqlValue::Text(json_path(field)));
                args.push(to_sql_value(start)?);
                args.push(SqlValue::Text(json_path(field)));
                args.push(to_sql_value(end)?);
            }
        }
    }

    match &query.order_by {
        Some(order) => {
            let direction = match order.direction {
                Direction::Ascending => "ASC",
                Direction::Descending => "DESC",
            };
            sql.push_str(&format!(" ORDER BY json_extract(body, ?) {direction}, seq ASC"));
            args.push(SqlValue::Text(json_path(&order.field)));
        }
        None => sql.push_str(" ORDER BY seq ASC"),
    }

    Ok((sql, args))
}

fn parse_body(id: String, body: &str) -> anyhow::Result<StoredDocument> {
    let fields: Document = serde_json::from_str(body)?;
    Ok(StoredDocument { id, fields })
}

impl DocumentStore for SqliteDocumentStore {
    fn insert(
        &self,
        collection: &str,
        document: Document,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send + '_>> {
        let collection = collection.to_string();
        Box::pin(async move {
            let id = generate_document_id();
            let body = serde_json::to_string(&document)?;
            let conn = self.conn.lock().expect("mutex poisoned");
            conn.execute(
                "INSERT INTO documents (collection, id, body) VALUES (?1, ?2, ?3)",
                params![collection, id, body],
            )?;
            Ok(id)
        })
    }

    fn get(
        &self,
        collection: &str,
        id: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<StoredDocument>>> + Send + '_>> {
        let collection = collection.to_string();
        let id = id.to_string();
        Box::pin(async move {
            let conn = self.conn.lock().expect("mutex poisoned");
            let body: Option<String> = conn
                .query_row(
                    "SELECT body FROM documents WHERE collection = ?1 AND id = ?2",
                    params![collection, id],
                    |row| row.get(0),
                )
                .optional()?;
            body.map(|b| parse_body(id, &b)).transpose()
        })
    }

    fn query(
        &self,
        collection: &str,
        query: Query,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Vec<StoredDocument>>> + Send + '_>> {
        let collection = collection.to_string();
        Box::pin(async move {
            let (sql, args) = build_select(&collection, &query)?;
            let conn = self.conn.lock().expect("mutex poisoned");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(args), |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            rows.into_iter()
                .map(|(id, body)| parse_body(id, &body))
                .collect()
        })
    }

    fn delete(
        &self,
        collection: &str,
        id: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<bool>> + Send + '_>> {
        let collection = collection.to_string();
        let id = id.to_string();
        Box::pin(async move {
            let conn = self.conn.lock().expect("mutex poisoned");
            let removed = conn.execute(
                "DELETE FROM documents WHERE collection = ?1 AND id = ?2",
                params![collection, id],
            )?;
            Ok(removed > 0)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_store() -> SqliteDocumentStore {
        SqliteDocumentStore::new(":memory:").unwrap()
    }

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    async fn titles(store: &SqliteDocumentStore, query: Query) -> Vec<String> {
        store
            .query("cars", query)
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.fields["title"].as_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_schema_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docs.db");
        let path = path.to_str().unwrap();
        SqliteDocumentStore::new(path).unwrap();
        SqliteDocumentStore::new(path).unwrap();
    }

    #[tokio::test]
    async fn test_insert_get_delete() {
        let store = test_store();
        let id = store
            .insert("cars", doc(json!({"title": "ONIX", "year": 2020})))
            .await
            .unwrap();

        let fetched = store.get("cars", &id).await.unwrap().unwrap();
        assert_eq!(fetched.id, id);
        assert_eq!(fetched.fields["year"], 2020);

        assert!(store.delete("cars", &id).await.unwrap());
        assert!(store.get("cars", &id).await.unwrap().is_none());
        assert!(!store.delete("cars", &id).await.unwrap());
    }

    #[tokio::test]
    async fn test_collections_are_isolated() {
        let store = test_store();
        store.insert("cars", doc(json!({"title": "A"}))).await.unwrap();
        store.insert("bikes", doc(json!({"title": "B"}))).await.unwrap();
        assert_eq!(titles(&store, Query::all()).await, ["A"]);
    }

    #[tokio::test]
    async fn test_equality_filter() {
        let store = test_store();
        store
            .insert("cars", doc(json!({"title": "A", "owner_uid": "u1"})))
            .await
            .unwrap();
        store
            .insert("cars", doc(json!({"title": "B", "owner_uid": "u2"})))
            .await
            .unwrap();
        let q = Query::all().filter(Filter::eq("owner_uid", "u2"));
        assert_eq!(titles(&store, q).await, ["B"]);
    }

    #[tokio::test]
    async fn test_prefix_range_filter() {
        let store = test_store();
        for title in ["ONIX 1.0", "ONIX PLUS", "CIVIC", "ONI", "ONIY"] {
            store.insert("cars", doc(json!({"title": title}))).await.unwrap();
        }
        let q = Query::all().filter(Filter::range("title", "ONIX", "ONIX\u{10FFFF}"));
        assert_eq!(titles(&store, q).await, ["ONIX 1.0", "ONIX PLUS"]);
    }

    #[tokio::test]
    async fn test_order_by_descending_with_native_tiebreak() {
        let store = test_store();
        for (title, created) in [("A", "2026-01-01"), ("B", "2026-03-01"), ("C", "2026-02-01")] {
            store
                .insert("cars", doc(json!({"title": title, "created_at": created})))
                .await
                .unwrap();
        }
        let q = Query::all().order_by("created_at", Direction::Descending);
        assert_eq!(titles(&store, q).await, ["B", "C", "A"]);

        let q = Query::all().order_by("created_at", Direction::Ascending);
        assert_eq!(titles(&store, q).await, ["A", "C", "B"]);
    }

    #[tokio::test]
    async fn test_nested_values_round_trip() {
        let store = test_store();
        let id = store
            .insert(
                "cars",
                doc(json!({"title": "A", "assets": [{"asset_id": "x", "owner_uid": "u"}]})),
            )
            .await
            .unwrap();
        let fetched = store.get("cars", &id).await.unwrap().unwrap();
        assert_eq!(fetched.fields["assets"][0]["asset_id"], "x");
    }

    #[tokio::test]
    async fn test_object_operand_rejected() {
        let store = test_store();
        let q = Query::all().filter(Filter::eq("title", json!({"nested": true})));
        assert!(store.query("cars", q).await.is_err());
    }

    #[test]
    fn test_json_path_quotes_field() {
        assert_eq!(json_path("title"), "$.\"title\"");
    }
}
