//! Query Store
//!
//! Append-only persistence for completed analyses. The only implementation is
//! [`SqliteQueryStore`]: a single `rusqlite::Connection` behind an async mutex,
//! with every statement run on the blocking thread pool.
//!
//! Timestamps are stored as fixed-width RFC 3339 text with millisecond
//! precision, so the text ordering of the `timestamp` column is the time
//! ordering.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::response::StructuredResponse;

/// Errors from the query store
#[derive(Debug, Error)]
pub enum StoreError {
    /// Could not create the database directory
    #[error("Failed to create database directory {path}: {source}")]
    CreateDir {
        /// Directory that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// SQLite reported an error
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The structured response could not be serialized
    #[error("Failed to encode response: {0}")]
    Encode(#[source] serde_json::Error),

    /// A stored row could not be turned back into a record
    #[error("Failed to decode stored query {id}: {reason}")]
    Decode {
        /// Row id
        id: i64,
        /// What was wrong
        reason: String,
    },

    /// The blocking task running the statement died
    #[error("Database task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Where the database lives
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DatabaseLocation {
    /// Private in-memory database, gone when the store is dropped
    Memory,
    /// File on disk
    File(PathBuf),
}

impl DatabaseLocation {
    /// Interpret a configured path; `:memory:` selects an in-memory database
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        if raw.trim() == ":memory:" {
            Self::Memory
        } else {
            Self::File(PathBuf::from(raw))
        }
    }
}

impl std::fmt::Display for DatabaseLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Memory => write!(f, ":memory:"),
            Self::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// A completed analysis waiting to be stored
#[derive(Clone, Debug)]
pub struct NewQuery {
    /// User input exactly as submitted
    pub symptoms: String,
    /// Normalized analysis
    pub response: StructuredResponse,
    /// `backend/model` label of the producer
    pub provider: String,
    /// Opaque client grouping key
    pub session_id: Option<String>,
}

/// A stored analysis
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueryRecord {
    /// Store-assigned id
    pub id: i64,
    /// User input exactly as submitted
    pub symptoms: String,
    /// Normalized analysis
    pub response: StructuredResponse,
    /// `backend/model` label of the producer
    #[serde(rename = "llm_provider")]
    pub provider: String,
    /// Creation time
    pub timestamp: DateTime<Utc>,
    /// Opaque client grouping key
    pub session_id: Option<String>,
}

/// Durable, time-ordered storage of analyses
#[async_trait]
pub trait QueryStore: Send + Sync {
    /// Store a new record and return its id
    async fn append(&self, query: NewQuery) -> Result<i64, StoreError>;

    /// Up to `limit` records, newest first
    async fn recent(&self, limit: usize) -> Result<Vec<QueryRecord>, StoreError>;

    /// Number of stored records
    async fn count(&self) -> Result<u64, StoreError>;
}

/// SQLite-backed [`QueryStore`]
pub struct SqliteQueryStore {
    conn: Arc<Mutex<Connection>>,
    location: DatabaseLocation,
}

impl std::fmt::Debug for SqliteQueryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteQueryStore")
            .field("location", &self.location)
            .finish_non_exhaustive()
    }
}

impl SqliteQueryStore {
    /// Open (or create) the store at `location` and ensure the schema exists
    ///
    /// # Errors
    ///
    /// Returns an error if the directory, database or schema cannot be created.
    pub async fn open(location: DatabaseLocation) -> Result<Self, StoreError> {
        if let DatabaseLocation::File(ref path) = location {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|source| StoreError::CreateDir {
                        path: parent.to_path_buf(),
                        source,
                    })?;
            }
        }

        info!(location = %location, "Opening query database");

        let target = location.clone();
        let conn = tokio::task::spawn_blocking(move || -> Result<Connection, StoreError> {
            let conn = match target {
                DatabaseLocation::Memory => Connection::open_in_memory()?,
                DatabaseLocation::File(ref path) => {
                    let conn = Connection::open(path)?;
                    let mode: String =
                        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
                    debug!(journal_mode = %mode, "Journal mode set");
                    conn.pragma_update(None, "synchronous", "NORMAL")?;
                    conn
                }
            };
            initialize_schema(&conn)?;
            Ok(conn)
        })
        .await??;

        debug!("Query database schema ready");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            location,
        })
    }

    /// Open a file-backed store
    ///
    /// # Errors
    ///
    /// See [`SqliteQueryStore::open`].
    pub async fn open_path(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::open(DatabaseLocation::File(path.as_ref().to_path_buf())).await
    }

    /// Open a private in-memory store
    ///
    /// # Errors
    ///
    /// See [`SqliteQueryStore::open`].
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        Self::open(DatabaseLocation::Memory).await
    }

    /// Where this store lives
    #[must_use]
    pub fn location(&self) -> &DatabaseLocation {
        &self.location
    }

    /// Run `f` against the connection on the blocking pool
    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            f(&conn)
        })
        .await?
    }
}

fn initialize_schema(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS symptom_queries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            symptoms TEXT NOT NULL,
            response TEXT NOT NULL,
            llm_provider TEXT NOT NULL,
            timestamp TEXT NOT NULL,
            session_id TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_symptom_queries_timestamp
            ON symptom_queries(timestamp);",
    )
}

/// Canonical stored form of a timestamp
fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Row as read from SQLite, before decoding
struct RawRow {
    id: i64,
    symptoms: String,
    response: String,
    provider: String,
    timestamp: String,
    session_id: Option<String>,
}

impl RawRow {
    fn decode(self) -> Result<QueryRecord, StoreError> {
        let response = serde_json::from_str(&self.response).map_err(|e| StoreError::Decode {
            id: self.id,
            reason: format!("response: {e}"),
        })?;
        let timestamp = DateTime::parse_from_rfc3339(&self.timestamp)
            .map_err(|e| StoreError::Decode {
                id: self.id,
                reason: format!("timestamp {:?}: {e}", self.timestamp),
            })?
            .with_timezone(&Utc);

        Ok(QueryRecord {
            id: self.id,
            symptoms: self.symptoms,
            response,
            provider: self.provider,
            timestamp,
            session_id: self.session_id,
        })
    }
}

#[async_trait]
impl QueryStore for SqliteQueryStore {
    async fn append(&self, query: NewQuery) -> Result<i64, StoreError> {
        let response = serde_json::to_string(&query.response).map_err(StoreError::Encode)?;
        let timestamp = format_timestamp(&Utc::now());

        let id = self
            .with_conn(move |conn| {
                conn.execute(
                    "INSERT INTO symptom_queries (symptoms, response, llm_provider, timestamp, session_id)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        query.symptoms,
                        response,
                        query.provider,
                        timestamp,
                        query.session_id
                    ],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;

        debug!(id, "Stored query");
        Ok(id)
    }

    async fn recent(&self, limit: usize) -> Result<Vec<QueryRecord>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let rows = self
            .with_conn(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, symptoms, response, llm_provider, timestamp, session_id
                     FROM symptom_queries
                     ORDER BY timestamp DESC, id DESC
                     LIMIT ?1",
                )?;
                let rows = stmt
                    .query_map(params![limit], |row| {
                        Ok(RawRow {
                            id: row.get(0)?,
                            symptoms: row.get(1)?,
                            response: row.get(2)?,
                            provider: row.get(3)?,
                            timestamp: row.get(4)?,
                            session_id: row.get(5)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;

        rows.into_iter().map(RawRow::decode).collect()
    }

    async fn count(&self) -> Result<u64, StoreError> {
        self.with_conn(|conn| {
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM symptom_queries", [], |row| row.get(0))?;
            Ok(u64::try_from(count).unwrap_or(0))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::Guidance;
    use pretty_assertions::assert_eq;

    fn sample(symptoms: &str) -> NewQuery {
        NewQuery {
            symptoms: symptoms.to_string(),
            response: StructuredResponse::new(
                vec!["Tension headache"],
                "Rest",
                vec!["Sudden severe pain"],
                "Educational only",
            ),
            provider: "gemini/gemini-1.5-flash".to_string(),
            session_id: None,
        }
    }

    #[tokio::test]
    async fn test_append_then_recent_round_trips() {
        let store = SqliteQueryStore::open_in_memory().await.unwrap();

        let mut query = sample("headache");
        query.session_id = Some("session-1".to_string());
        query
            .response
            .extra
            .insert("severity".to_string(), serde_json::json!("mild"));

        let id = store.append(query.clone()).await.unwrap();
        let records = store.recent(1).await.unwrap();

        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.id, id);
        assert_eq!(record.symptoms, "headache");
        assert_eq!(record.response, query.response);
        assert_eq!(record.provider, "gemini/gemini-1.5-flash");
        assert_eq!(record.session_id.as_deref(), Some("session-1"));
    }

    #[tokio::test]
    async fn test_recent_is_newest_first_and_limited() {
        let store = SqliteQueryStore::open_in_memory().await.unwrap();
        for i in 0..5 {
            store.append(sample(&format!("query {i}"))).await.unwrap();
        }

        let records = store.recent(3).await.unwrap();
        let symptoms: Vec<_> = records.iter().map(|r| r.symptoms.as_str()).collect();
        assert_eq!(symptoms, vec!["query 4", "query 3", "query 2"]);
        assert!(records.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));

        assert_eq!(store.count().await.unwrap(), 5);
        assert_eq!(store.recent(50).await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_ids_increase() {
        let store = SqliteQueryStore::open_in_memory().await.unwrap();
        let first = store.append(sample("a")).await.unwrap();
        let second = store.append(sample("b")).await.unwrap();
        assert!(second > first);
    }

    #[tokio::test]
    async fn test_file_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("queries.sqlite");

        {
            let store = SqliteQueryStore::open_path(&path).await.unwrap();
            store.append(sample("persisted")).await.unwrap();
        }

        let store = SqliteQueryStore::open_path(&path).await.unwrap();
        let records = store.recent(10).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].symptoms, "persisted");
        assert_eq!(
            records[0].response.conditions,
            Guidance::List(vec!["Tension headache".to_string()])
        );
    }

    #[tokio::test]
    async fn test_corrupt_row_is_decode_error() {
        let store = SqliteQueryStore::open_in_memory().await.unwrap();
        store
            .with_conn(|conn| {
                conn.execute(
                    "INSERT INTO symptom_queries (symptoms, response, llm_provider, timestamp)
                     VALUES ('x', 'not json', 'gemini/m', '2024-01-01T00:00:00.000Z')",
                    [],
                )?;
                Ok(())
            })
            .await
            .unwrap();

        let err = store.recent(1).await.unwrap_err();
        assert!(matches!(err, StoreError::Decode { .. }));
    }

    #[test]
    fn test_record_wire_shape() {
        let record = QueryRecord {
            id: 7,
            symptoms: "cough".to_string(),
            response: StructuredResponse::new("a", "b", "c", "d"),
            provider: "gemini/gemini-1.5-pro".to_string(),
            timestamp: DateTime::parse_from_rfc3339("2024-05-01T10:00:00.250Z")
                .unwrap()
                .with_timezone(&Utc),
            session_id: None,
        };

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["llm_provider"], "gemini/gemini-1.5-pro");
        assert_eq!(value["response"]["nextSteps"], "b");
        assert!(value["session_id"].is_null());
        assert!(value.get("provider").is_none());
    }

    #[test]
    fn test_timestamp_format_is_fixed_width() {
        let ts = DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(format_timestamp(&ts), "2024-05-01T10:00:00.000Z");
    }

    #[test]
    fn test_database_location_parse() {
        assert_eq!(DatabaseLocation::parse(":memory:"), DatabaseLocation::Memory);
        assert_eq!(
            DatabaseLocation::parse("./database.sqlite"),
            DatabaseLocation::File(PathBuf::from("./database.sqlite"))
        );
    }
}
