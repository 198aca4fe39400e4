//! Durable vector store on SQLite with similarity search via `sqlite-vec`.
//!
//! Layout: a `chunks` table keyed by `chunk_id` carrying document linkage,
//! offsets, content, metadata and a monotonic `insert_seq`, joined by rowid
//! to a `vec0` virtual table holding the embeddings. The declared dimension
//! is pinned in `store_meta` so reopening a database with a different
//! embedder fails loudly instead of corrupting the index.
//!
//! All statements for one logical operation run inside a single `rusqlite`
//! transaction on the store's connection, and `tokio_rusqlite` executes
//! calls serially on a dedicated thread, so a search never observes a
//! half-applied mutation.

use std::mem::transmute;
use std::os::raw::c_char;
use std::path::Path;
use std::sync::OnceLock;

use async_trait::async_trait;
use tokio_rusqlite::{Connection, OptionalExtension, ffi};

use crate::stores::{
    DocumentLocks, DocumentSummary, IndexEntry, SearchHit, VectorStore, validate_document_entries,
    validate_entries, validate_top_k,
};
use crate::types::KbError;

#[derive(Debug)]
pub struct SqliteVectorStore {
    conn: Connection,
    dimension: usize,
    locks: DocumentLocks,
}

/// Row image prepared outside the connection thread: metadata and the
/// embedding are serialized up front so the write closure is infallible
/// except for SQLite itself.
struct RowData {
    chunk_id: String,
    document_id: String,
    sequence_index: i64,
    start_offset: i64,
    end_offset: i64,
    text: String,
    metadata: String,
    embedding_json: String,
}

impl RowData {
    fn from_entry(entry: IndexEntry) -> Result<Self, KbError> {
        let embedding_json = serde_json::to_string(&entry.embedding)
            .map_err(|err| KbError::Storage(err.to_string()))?;
        Ok(Self {
            chunk_id: entry.chunk_id,
            document_id: entry.document_id,
            sequence_index: entry.sequence_index as i64,
            start_offset: entry.start_offset as i64,
            end_offset: entry.end_offset as i64,
            text: entry.text,
            metadata: entry.metadata.to_string(),
            embedding_json,
        })
    }
}

impl SqliteVectorStore {
    /// Opens (or creates) the database at `path` for embeddings of the
    /// given dimension.
    pub async fn open(path: impl AsRef<Path>, dimension: usize) -> Result<Self, KbError> {
        if dimension == 0 {
            return Err(KbError::Configuration(
                "embedding dimension must be positive".to_string(),
            ));
        }
        register_sqlite_vec()?;

        let conn = Connection::open(path)
            .await
            .map_err(|err| KbError::Storage(err.to_string()))?;

        // The extension must answer before we rely on vec0 tables.
        conn.call(|conn| -> tokio_rusqlite::Result<_> {
            conn.query_row("SELECT vec_version()", [], |row| row.get::<_, String>(0))?;
            Ok(())
        })
        .await
        .map_err(|err| KbError::Storage(err.to_string()))?;

        let stored_dimension = conn
            .call(|conn| -> tokio_rusqlite::Result<_> {
                conn.execute(
                    "CREATE TABLE IF NOT EXISTS store_meta (
                        key TEXT PRIMARY KEY,
                        value TEXT NOT NULL
                    )",
                    [],
                )?;
                let stored = conn
                    .query_row(
                        "SELECT value FROM store_meta WHERE key = 'dimension'",
                        [],
                        |row| row.get::<_, String>(0),
                    )
                    .optional()?;
                Ok(stored)
            })
            .await
            .map_err(|err| KbError::Storage(err.to_string()))?;

        if let Some(stored) = stored_dimension {
            let stored: usize = stored
                .parse()
                .map_err(|_| KbError::Storage(format!("corrupt dimension metadata: {stored}")))?;
            if stored != dimension {
                return Err(KbError::DimensionMismatch {
                    expected: stored,
                    actual: dimension,
                });
            }
        }

        conn.call(move |conn| -> tokio_rusqlite::Result<_> {
            let tx = conn.transaction()?;
            tx.execute(
                "CREATE TABLE IF NOT EXISTS chunks (
                    chunk_id TEXT PRIMARY KEY,
                    document_id TEXT NOT NULL,
                    sequence_index INTEGER NOT NULL,
                    start_offset INTEGER NOT NULL,
                    end_offset INTEGER NOT NULL,
                    content TEXT NOT NULL,
                    metadata TEXT NOT NULL,
                    insert_seq INTEGER NOT NULL
                )",
                [],
            )?;
            tx.execute(
                "CREATE INDEX IF NOT EXISTS idx_chunks_document ON chunks(document_id)",
                [],
            )?;
            tx.execute(
                &format!(
                    "CREATE VIRTUAL TABLE IF NOT EXISTS chunks_vec USING vec0(embedding float[{dimension}])"
                ),
                [],
            )?;
            tx.execute(
                "INSERT OR REPLACE INTO store_meta (key, value) VALUES ('dimension', ?1)",
                [dimension.to_string()],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(|err| KbError::Storage(err.to_string()))?;

        Ok(Self {
            conn,
            dimension,
            locks: DocumentLocks::new(),
        })
    }

    /// The underlying connection, for queries outside the trait surface.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    async fn write_rows(&self, rows: Vec<RowData>, wipe_document: Option<String>) -> Result<(), KbError> {
        self.conn
            .call(move |conn| -> tokio_rusqlite::Result<_> {
                let tx = conn.transaction()?;
                if let Some(document_id) = &wipe_document {
                    tx.execute(
                        "DELETE FROM chunks_vec WHERE rowid IN
                         (SELECT rowid FROM chunks WHERE document_id = ?1)",
                        [document_id],
                    )?;
                    tx.execute("DELETE FROM chunks WHERE document_id = ?1", [document_id])?;
                }
                let mut next_seq: i64 = tx.query_row(
                    "SELECT COALESCE(MAX(insert_seq), 0) FROM chunks",
                    [],
                    |row| row.get(0),
                )?;
                for row in rows {
                    // Replace-by-chunk_id: drop any prior row and its vector.
                    let prior: Option<i64> = tx
                        .query_row(
                            "SELECT rowid FROM chunks WHERE chunk_id = ?1",
                            [&row.chunk_id],
                            |r| r.get(0),
                        )
                        .optional()?;
                    if let Some(rowid) = prior {
                        tx.execute("DELETE FROM chunks_vec WHERE rowid = ?1", [rowid])?;
                        tx.execute("DELETE FROM chunks WHERE rowid = ?1", [rowid])?;
                    }
                    next_seq += 1;
                    tx.execute(
                        "INSERT INTO chunks
                         (chunk_id, document_id, sequence_index, start_offset, end_offset,
                          content, metadata, insert_seq)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                        (
                            &row.chunk_id,
                            &row.document_id,
                            row.sequence_index,
                            row.start_offset,
                            row.end_offset,
                            &row.text,
                            &row.metadata,
                            next_seq,
                        ),
                    )?;
                    let rowid = tx.last_insert_rowid();
                    tx.execute(
                        "INSERT INTO chunks_vec (rowid, embedding) VALUES (?1, vec_f32(?2))",
                        (rowid, &row.embedding_json),
                    )?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(|err| KbError::Storage(err.to_string()))
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn upsert(&self, entries: Vec<IndexEntry>) -> Result<(), KbError> {
        validate_entries(self.dimension, &entries)?;
        if entries.is_empty() {
            return Ok(());
        }
        let _guards = self
            .locks
            .lock_many(entries.iter().map(|e| e.document_id.as_str()))
            .await;
        let rows = entries
            .into_iter()
            .map(RowData::from_entry)
            .collect::<Result<Vec<_>, _>>()?;
        self.write_rows(rows, None).await
    }

    async fn replace_document(
        &self,
        document_id: &str,
        entries: Vec<IndexEntry>,
    ) -> Result<(), KbError> {
        validate_document_entries(document_id, &entries)?;
        validate_entries(self.dimension, &entries)?;
        let _guard = self.locks.lock(document_id).await;
        let rows = entries
            .into_iter()
            .map(RowData::from_entry)
            .collect::<Result<Vec<_>, _>>()?;
        self.write_rows(rows, Some(document_id.to_string())).await
    }

    async fn delete_by_document(&self, document_id: &str) -> Result<usize, KbError> {
        let _guard = self.locks.lock(document_id).await;
        let document_id = document_id.to_string();
        self.conn
            .call(move |conn| -> tokio_rusqlite::Result<_> {
                let tx = conn.transaction()?;
                tx.execute(
                    "DELETE FROM chunks_vec WHERE rowid IN
                     (SELECT rowid FROM chunks WHERE document_id = ?1)",
                    [&document_id],
                )?;
                let removed = tx.execute("DELETE FROM chunks WHERE document_id = ?1", [&document_id])?;
                tx.commit()?;
                Ok(removed)
            })
            .await
            .map_err(|err| KbError::Storage(err.to_string()))
    }

    async fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<SearchHit>, KbError> {
        validate_top_k(top_k)?;
        crate::embeddings::ensure_dimension(self.dimension, query)?;

        let query_json =
            serde_json::to_string(query).map_err(|err| KbError::Storage(err.to_string()))?;
        self.conn
            .call(move |conn| -> tokio_rusqlite::Result<_> {
                let mut stmt = conn.prepare(
                    "SELECT c.chunk_id, c.document_id, c.sequence_index, c.content, c.metadata,
                            vec_distance_cosine(v.embedding, vec_f32(?1)) AS distance
                     FROM chunks c
                     JOIN chunks_vec v ON v.rowid = c.rowid
                     ORDER BY distance ASC, c.insert_seq DESC
                     LIMIT ?2",
                )?;
                let rows = stmt.query_map((&query_json, top_k as i64), |row| {
                    let metadata: String = row.get(4)?;
                    let distance: f32 = row.get(5)?;
                    Ok(SearchHit {
                        chunk_id: row.get(0)?,
                        document_id: row.get(1)?,
                        sequence_index: row.get::<_, i64>(2)? as usize,
                        text: row.get(3)?,
                        // Cosine distance → similarity; higher is better.
                        score: 1.0 - distance,
                        metadata: serde_json::from_str(&metadata).unwrap_or_default(),
                    })
                })?;

                let mut hits = Vec::new();
                for row in rows {
                    hits.push(row?);
                }
                Ok(hits)
            })
            .await
            .map_err(|err| KbError::Storage(err.to_string()))
    }

    async fn list_documents(&self) -> Result<Vec<DocumentSummary>, KbError> {
        self.conn
            .call(|conn| -> tokio_rusqlite::Result<_> {
                let mut stmt = conn.prepare(
                    "SELECT document_id, COUNT(*) FROM chunks
                     GROUP BY document_id ORDER BY document_id",
                )?;
                let rows = stmt.query_map([], |row| {
                    Ok(DocumentSummary {
                        document_id: row.get(0)?,
                        chunk_count: row.get::<_, i64>(1)? as usize,
                    })
                })?;
                let mut summaries = Vec::new();
                for row in rows {
                    summaries.push(row?);
                }
                Ok(summaries)
            })
            .await
            .map_err(|err| KbError::Storage(err.to_string()))
    }

    async fn count(&self) -> Result<usize, KbError> {
        self.conn
            .call(|conn| -> tokio_rusqlite::Result<_> {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))?;
                Ok(count as usize)
            })
            .await
            .map_err(|err| KbError::Storage(err.to_string()))
    }
}

fn register_sqlite_vec() -> Result<(), KbError> {
    static INIT: OnceLock<Result<(), String>> = OnceLock::new();

    INIT.get_or_init(|| unsafe {
        type SqliteExtensionInit = unsafe extern "C" fn(
            *mut ffi::sqlite3,
            *mut *mut c_char,
            *const ffi::sqlite3_api_routines,
        ) -> i32;

        let init: unsafe extern "C" fn() = sqlite_vec::sqlite3_vec_init;
        let init_fn: SqliteExtensionInit =
            transmute::<unsafe extern "C" fn(), SqliteExtensionInit>(init);
        let rc = ffi::sqlite3_auto_extension(Some(init_fn));
        if rc == ffi::SQLITE_OK {
            Ok(())
        } else {
            Err(format!(
                "failed to register sqlite-vec extension (code {rc})"
            ))
        }
    })
    .clone()
    .map_err(KbError::Storage)
}
