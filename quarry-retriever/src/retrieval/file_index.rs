//! SQLite-backed durable index store for files and chunks.
//!
//! This is the single source of truth all other components read from and
//! write to. Two tables:
//!
//! ```sql
//! CREATE TABLE files (
//!     relative_path TEXT PRIMARY KEY,  -- workspace-relative, '/' separators
//!     hash BLOB NOT NULL,              -- blake3 fingerprint (32 bytes)
//!     size INTEGER NOT NULL,
//!     modified_at INTEGER NOT NULL,    -- unix seconds
//!     language TEXT NOT NULL,
//!     indexed_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
//! );
//!
//! CREATE TABLE chunks (
//!     id INTEGER PRIMARY KEY AUTOINCREMENT,
//!     relative_path TEXT NOT NULL REFERENCES files ON DELETE CASCADE,
//!     file_hash BLOB NOT NULL,         -- fingerprint the chunk was cut from
//!     start_byte INTEGER NOT NULL,
//!     end_byte INTEGER NOT NULL,
//!     content TEXT NOT NULL,
//!     embedding BLOB                   -- f32 LE vector, NULL when absent
//! );
//! ```
//!
//! A file's chunk set is replaced in one transaction (delete + insert), so
//! readers observe either the pre-update or the post-update set, never a
//! mix, and every surviving chunk row always carries the fingerprint of the
//! content it was cut from. WAL mode gives concurrent readers a consistent
//! snapshot during writes.

use anyhow::{Context, Result};
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{Row, SqlitePool};
use std::path::Path;

/// Stored metadata for one indexed file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// Path relative to the workspace root, `/` separators.
    pub relative_path: String,
    /// blake3 fingerprint of the content the current chunk set was cut from.
    pub hash: [u8; 32],
    pub size: u64,
    /// Last observed modification time (unix seconds).
    pub modified_at: i64,
    pub language: String,
}

/// One stored chunk. `id` is `None` until the row is inserted.
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    pub id: Option<i64>,
    pub relative_path: String,
    pub file_hash: [u8; 32],
    pub start_byte: usize,
    pub end_byte: usize,
    pub content: String,
    pub embedding: Option<Vec<f32>>,
}

/// Durable record of files, chunks, fingerprints, and vectors.
#[derive(Clone, Debug)]
pub struct FileIndex {
    pool: SqlitePool,
}

impl FileIndex {
    /// Open (or create) the persistent store under `base`. Failure to open
    /// or prepare the store fails closed: the caller is expected to trigger
    /// a full rebuild rather than proceed with partial data.
    pub async fn open(base: &Path) -> Result<Self> {
        let db_path = base.join(".quarry.db");
        let pool = SqlitePool::connect_with(
            SqliteConnectOptions::new()
                .filename(&db_path)
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
                .busy_timeout(std::time::Duration::from_secs(5))
                .foreign_keys(true)
                .create_if_missing(true),
        )
        .await
        .with_context(|| format!("index store at {} is unreadable", db_path.display()))?;
        Self::with_pool(pool).await
    }

    /// In-memory store for tests. A single pooled connection, since each
    /// `:memory:` connection is its own database.
    pub async fn open_memory() -> Result<Self> {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self> {
        Self::create_tables(&pool)
            .await
            .context("failed to prepare index store schema")?;
        Ok(Self { pool })
    }

    async fn create_tables(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS files (
                relative_path TEXT PRIMARY KEY,
                hash BLOB NOT NULL,
                size INTEGER NOT NULL,
                modified_at INTEGER NOT NULL,
                language TEXT NOT NULL,
                indexed_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chunks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                relative_path TEXT NOT NULL,
                file_hash BLOB NOT NULL,
                start_byte INTEGER NOT NULL,
                end_byte INTEGER NOT NULL,
                content TEXT NOT NULL,
                embedding BLOB,
                FOREIGN KEY (relative_path) REFERENCES files(relative_path) ON DELETE CASCADE
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_path ON chunks(relative_path)")
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Fetch a file record by workspace-relative path.
    pub async fn get_file(&self, relative_path: &str) -> Result<Option<FileRecord>> {
        let row = sqlx::query(
            "SELECT relative_path, hash, size, modified_at, language FROM files WHERE relative_path = ?1",
        )
        .bind(relative_path)
        .fetch_optional(&self.pool)
        .await?;
        row.map(file_from_row).transpose()
    }

    /// All file records, ordered by path.
    pub async fn list_files(&self) -> Result<Vec<FileRecord>> {
        let rows = sqlx::query(
            "SELECT relative_path, hash, size, modified_at, language FROM files ORDER BY relative_path",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(file_from_row).collect()
    }

    /// Refresh a file's observed metadata without touching its chunk set.
    /// Used when the content hash proved unchanged but the mtime moved.
    pub async fn touch_file(&self, relative_path: &str, size: u64, modified_at: i64) -> Result<()> {
        sqlx::query("UPDATE files SET size = ?2, modified_at = ?3 WHERE relative_path = ?1")
            .bind(relative_path)
            .bind(size as i64)
            .bind(modified_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Atomically replace a file's record and entire chunk set.
    ///
    /// Old chunks are removed and new chunks inserted in one transaction,
    /// preserving the "never mixed versions" invariant. Returns the new
    /// chunks with their assigned row ids.
    pub async fn replace_file(
        &self,
        file: &FileRecord,
        chunks: &[ChunkRecord],
    ) -> Result<Vec<ChunkRecord>> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO files (relative_path, hash, size, modified_at, language, indexed_at)
            VALUES (?1, ?2, ?3, ?4, ?5, datetime('now'))
            ON CONFLICT(relative_path) DO UPDATE SET
                hash = excluded.hash,
                size = excluded.size,
                modified_at = excluded.modified_at,
                language = excluded.language,
                indexed_at = datetime('now')
            "#,
        )
        .bind(&file.relative_path)
        .bind(&file.hash[..])
        .bind(file.size as i64)
        .bind(file.modified_at)
        .bind(&file.language)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM chunks WHERE relative_path = ?1")
            .bind(&file.relative_path)
            .execute(&mut *tx)
            .await?;

        let mut inserted = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let embedding_bytes = chunk.embedding.as_ref().map(|v| encode_vector(v));
            let result = sqlx::query(
                r#"
                INSERT INTO chunks (relative_path, file_hash, start_byte, end_byte, content, embedding)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
            )
            .bind(&chunk.relative_path)
            .bind(&chunk.file_hash[..])
            .bind(chunk.start_byte as i64)
            .bind(chunk.end_byte as i64)
            .bind(&chunk.content)
            .bind(embedding_bytes)
            .execute(&mut *tx)
            .await?;
            let mut stored = chunk.clone();
            stored.id = Some(result.last_insert_rowid());
            inserted.push(stored);
        }

        tx.commit().await?;
        Ok(inserted)
    }

    /// Remove a file and (via cascade) its chunks.
    pub async fn remove_file(&self, relative_path: &str) -> Result<()> {
        sqlx::query("DELETE FROM files WHERE relative_path = ?1")
            .bind(relative_path)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Chunks belonging to one file, ordered by position.
    pub async fn get_chunks(&self, relative_path: &str) -> Result<Vec<ChunkRecord>> {
        let rows = sqlx::query(
            "SELECT id, relative_path, file_hash, start_byte, end_byte, content, embedding
             FROM chunks WHERE relative_path = ?1 ORDER BY start_byte",
        )
        .bind(relative_path)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(chunk_from_row).collect()
    }

    /// Fetch one chunk by row id.
    pub async fn get_chunk(&self, id: i64) -> Result<Option<ChunkRecord>> {
        let row = sqlx::query(
            "SELECT id, relative_path, file_hash, start_byte, end_byte, content, embedding
             FROM chunks WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(chunk_from_row).transpose()
    }

    /// Every chunk in the store, ordered by path then position. Used to
    /// rebuild the in-memory search structures at startup.
    pub async fn all_chunks(&self) -> Result<Vec<ChunkRecord>> {
        let rows = sqlx::query(
            "SELECT id, relative_path, file_hash, start_byte, end_byte, content, embedding
             FROM chunks ORDER BY relative_path, start_byte",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(chunk_from_row).collect()
    }

    pub async fn count_files(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM files")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    pub async fn count_chunks(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }
}

fn file_from_row(row: sqlx::sqlite::SqliteRow) -> Result<FileRecord> {
    let hash_bytes: Vec<u8> = row.get("hash");
    let mut hash = [0u8; 32];
    anyhow::ensure!(hash_bytes.len() == 32, "corrupt file hash in index store");
    hash.copy_from_slice(&hash_bytes);
    let size: i64 = row.get("size");
    Ok(FileRecord {
        relative_path: row.get("relative_path"),
        hash,
        size: size as u64,
        modified_at: row.get("modified_at"),
        language: row.get("language"),
    })
}

fn chunk_from_row(row: sqlx::sqlite::SqliteRow) -> Result<ChunkRecord> {
    let hash_bytes: Vec<u8> = row.get("file_hash");
    let mut file_hash = [0u8; 32];
    anyhow::ensure!(hash_bytes.len() == 32, "corrupt chunk hash in index store");
    file_hash.copy_from_slice(&hash_bytes);
    let start_byte: i64 = row.get("start_byte");
    let end_byte: i64 = row.get("end_byte");
    let embedding_bytes: Option<Vec<u8>> = row.get("embedding");
    Ok(ChunkRecord {
        id: Some(row.get("id")),
        relative_path: row.get("relative_path"),
        file_hash,
        start_byte: start_byte as usize,
        end_byte: end_byte as usize,
        content: row.get("content"),
        embedding: embedding_bytes.as_deref().map(decode_vector),
    })
}

/// Little-endian f32 encoding for embedding blobs.
fn encode_vector(vector: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(vector.len() * 4);
    for value in vector {
        out.extend_from_slice(&value.to_le_bytes());
    }
    out
}

fn decode_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(path: &str, hash_byte: u8) -> FileRecord {
        FileRecord {
            relative_path: path.to_string(),
            hash: [hash_byte; 32],
            size: 10,
            modified_at: 1_700_000_000,
            language: "rust".to_string(),
        }
    }

    fn chunk(path: &str, hash_byte: u8, start: usize, text: &str) -> ChunkRecord {
        ChunkRecord {
            id: None,
            relative_path: path.to_string(),
            file_hash: [hash_byte; 32],
            start_byte: start,
            end_byte: start + text.len(),
            content: text.to_string(),
            embedding: None,
        }
    }

    #[tokio::test]
    async fn file_round_trip() -> Result<()> {
        let index = FileIndex::open_memory().await?;
        let record = file("src/lib.rs", 1);
        index.replace_file(&record, &[]).await?;
        assert_eq!(index.get_file("src/lib.rs").await?, Some(record));
        assert_eq!(index.get_file("missing.rs").await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn replace_swaps_whole_chunk_set() -> Result<()> {
        let index = FileIndex::open_memory().await?;
        let record = file("a.rs", 1);
        index
            .replace_file(
                &record,
                &[chunk("a.rs", 1, 0, "old one"), chunk("a.rs", 1, 10, "old two")],
            )
            .await?;
        let old = index.get_chunks("a.rs").await?;
        assert_eq!(old.len(), 2);

        let mut updated = file("a.rs", 2);
        updated.modified_at += 1;
        index
            .replace_file(&updated, &[chunk("a.rs", 2, 0, "new")])
            .await?;
        let new = index.get_chunks("a.rs").await?;
        assert_eq!(new.len(), 1);
        assert_eq!(new[0].content, "new");
        assert_eq!(new[0].file_hash, [2; 32]);
        // Old ids are gone entirely.
        for chunk in &old {
            assert!(index.get_chunk(chunk.id.unwrap()).await?.is_none());
        }
        Ok(())
    }

    #[tokio::test]
    async fn embeddings_round_trip_as_f32() -> Result<()> {
        let index = FileIndex::open_memory().await?;
        let record = file("v.rs", 3);
        let mut with_vector = chunk("v.rs", 3, 0, "fn main() {}");
        with_vector.embedding = Some(vec![0.25, -1.5, 3.125]);
        let stored = index.replace_file(&record, &[with_vector]).await?;
        let fetched = index.get_chunk(stored[0].id.unwrap()).await?.unwrap();
        assert_eq!(fetched.embedding, Some(vec![0.25, -1.5, 3.125]));
        Ok(())
    }

    #[tokio::test]
    async fn removing_a_file_cascades_to_chunks() -> Result<()> {
        let index = FileIndex::open_memory().await?;
        index
            .replace_file(&file("gone.rs", 4), &[chunk("gone.rs", 4, 0, "text")])
            .await?;
        index.remove_file("gone.rs").await?;
        assert_eq!(index.count_files().await?, 0);
        assert_eq!(index.count_chunks().await?, 0);
        Ok(())
    }
}
