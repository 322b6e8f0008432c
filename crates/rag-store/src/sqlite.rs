//! SQLite-based storage implementation.

use std::path::Path;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use tracing::{debug, info};

use rag_core::{
    Fragment, FragmentStore, NewFragment, RagError, Result, Retriever, SearchFilters, StoreStats,
};

use crate::schema::{SCHEMA, SCHEMA_VERSION};
use crate::vector::{bytes_to_vec, rank, vec_to_bytes};

const FRAGMENT_COLUMNS: &str =
    "id, document_id, content, embedding, summary_vector, metadata, doc_type, language";

/// SQLite-based fragment store.
///
/// Vectors are stored as little-endian f32 blobs and ranked by brute-force
/// cosine similarity after the scalar filters are applied in SQL.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        // Ensure parent directory exists
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| RagError::database(format!("Failed to open database: {}", e)))?;

        Self::init(conn, path)
    }

    /// Open an in-memory database (for testing).
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| RagError::database(format!("Failed to open in-memory database: {}", e)))?;

        Self::init(conn, Path::new(":memory:"))
    }

    fn init(conn: Connection, path: &Path) -> Result<Self> {
        Self::configure_connection(&conn)?;

        conn.execute_batch(SCHEMA)
            .map_err(|e| RagError::database(format!("Failed to initialize schema: {}", e)))?;
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)
            .map_err(|e| RagError::database(format!("Failed to set schema version: {}", e)))?;

        info!("Database opened at {:?}", path);

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Configure SQLite connection for optimal performance.
    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA cache_size = -64000;
            PRAGMA busy_timeout = 30000;
            PRAGMA temp_store = MEMORY;
            "#,
        )
        .map_err(|e| RagError::database(format!("Failed to configure connection: {}", e)))?;

        Ok(())
    }

    /// Execute a blocking operation on the connection.
    fn with_conn<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Connection) -> Result<R>,
    {
        let conn = self.conn.lock().map_err(|e| RagError::database(e.to_string()))?;
        f(&conn)
    }

    /// Convert a row selected with `FRAGMENT_COLUMNS` to a Fragment.
    fn row_to_fragment(row: &rusqlite::Row<'_>) -> rusqlite::Result<Fragment> {
        let embedding: Option<Vec<u8>> = row.get(3)?;
        let summary_vector: Option<Vec<u8>> = row.get(4)?;

        Ok(Fragment {
            id: row.get(0)?,
            document_id: row.get(1)?,
            content: row.get(2)?,
            embedding: embedding.as_deref().map(bytes_to_vec),
            summary_vector: summary_vector.as_deref().map(bytes_to_vec),
            metadata: row.get(5)?,
            doc_type: row.get(6)?,
            language: row.get(7)?,
        })
    }
}

/// A filter value, treating the empty string as unset.
fn filter_value(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[async_trait]
impl Retriever for SqliteStore {
    async fn search(
        &self,
        query: &[f32],
        filters: &SearchFilters,
        limit: usize,
    ) -> Result<Vec<Fragment>> {
        let doc_type = filter_value(&filters.doc_type);
        let language = filter_value(&filters.language);

        let candidates = self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&format!(
                    r#"
                    SELECT {FRAGMENT_COLUMNS}
                    FROM fragments
                    WHERE embedding IS NOT NULL
                    AND (?1 IS NULL OR doc_type = ?1)
                    AND (?2 IS NULL OR language = ?2)
                    ORDER BY id
                    "#
                ))
                .map_err(|e| RagError::database(e.to_string()))?;

            let rows = stmt
                .query_map(params![doc_type, language], Self::row_to_fragment)
                .map_err(|e| RagError::database(e.to_string()))?;

            rows.collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| RagError::database(e.to_string()))
        })?;

        let scanned = candidates.len();
        let results = rank(query, candidates, limit);
        debug!("Ranked {} fragments, returning {}", scanned, results.len());
        Ok(results)
    }
}

#[async_trait]
impl FragmentStore for SqliteStore {
    async fn insert(&self, fragments: Vec<NewFragment>) -> Result<Vec<i64>> {
        let created_at = now_secs();

        self.with_conn(|conn| {
            let tx = conn
                .unchecked_transaction()
                .map_err(|e| RagError::database(e.to_string()))?;

            let mut ids = Vec::with_capacity(fragments.len());
            {
                let mut stmt = tx
                    .prepare(
                        r#"
                        INSERT INTO fragments (document_id, content, embedding, summary_vector,
                                               metadata, doc_type, language, created_at)
                        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                        "#,
                    )
                    .map_err(|e| RagError::database(e.to_string()))?;

                for fragment in &fragments {
                    stmt.execute(params![
                        fragment.document_id,
                        fragment.content,
                        fragment.embedding.as_deref().map(vec_to_bytes),
                        fragment.summary_vector.as_deref().map(vec_to_bytes),
                        fragment.metadata,
                        fragment.doc_type,
                        fragment.language,
                        created_at,
                    ])
                    .map_err(|e| RagError::database(format!("Failed to insert fragment: {}", e)))?;
                    ids.push(tx.last_insert_rowid());
                }
            }

            tx.commit()
                .map_err(|e| RagError::database(e.to_string()))?;

            debug!("Inserted {} fragments", ids.len());
            Ok(ids)
        })
    }

    async fn get(&self, id: i64) -> Result<Option<Fragment>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {FRAGMENT_COLUMNS} FROM fragments WHERE id = ?1"),
                params![id],
                Self::row_to_fragment,
            )
            .optional()
            .map_err(|e| RagError::database(e.to_string()))
        })
    }

    async fn stats(&self) -> Result<StoreStats> {
        self.with_conn(|conn| {
            let (fragments, embedded, documents): (u64, u64, u64) = conn
                .query_row(
                    r#"
                    SELECT COUNT(*),
                           COUNT(embedding),
                           COUNT(DISTINCT document_id)
                    FROM fragments
                    "#,
                    [],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )
                .map_err(|e| RagError::database(e.to_string()))?;

            // Get page count and page size to estimate storage
            let page_count: u64 = conn
                .query_row("PRAGMA page_count", [], |row| row.get(0))
                .unwrap_or(0);
            let page_size: u64 = conn
                .query_row("PRAGMA page_size", [], |row| row.get(0))
                .unwrap_or(4096);

            Ok(StoreStats {
                fragments,
                embedded,
                documents,
                storage_bytes: page_count * page_size,
            })
        })
    }
}
