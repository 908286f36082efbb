//! SQLite vector backend using the `sqlite-vec` extension.
//!
//! Each collection is a plain table holding chunk rows with their embedding
//! serialized as a JSON array; similarity search runs through
//! `vec_distance_cosine(vec_f32(...), vec_f32(...))` so no virtual table is
//! required.

use std::mem::transmute;
use std::os::raw::c_char;
use std::path::Path;
use std::sync::Once;

use async_trait::async_trait;
use tokio_rusqlite::{Connection, ffi};

use super::{ChunkRecord, FileEntry, SearchHit, VectorBackend};
use crate::types::CoreError;

#[derive(Clone)]
pub struct SqliteBackend {
    conn: Connection,
}

impl SqliteBackend {
    /// Opens (or creates) the database at `path` and verifies the sqlite-vec
    /// extension is loadable.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        Self::register_sqlite_vec()?;
        let conn = Connection::open(path)
            .await
            .map_err(|err| CoreError::Storage(err.to_string()))?;
        conn.call(|conn| {
            let result = conn.query_row("select vec_version()", [], |row| row.get::<_, String>(0));
            match result {
                Ok(_) => Ok(()),
                Err(err) => Err(tokio_rusqlite::Error::Rusqlite(err)),
            }
        })
        .await
        .map_err(|err| CoreError::Storage(err.to_string()))?;
        Ok(Self { conn })
    }

    fn register_sqlite_vec() -> Result<(), CoreError> {
        use std::sync::Mutex;

        static INIT: Once = Once::new();
        static INIT_RESULT: Mutex<Option<Result<(), String>>> = Mutex::new(None);

        INIT.call_once(|| {
            let result = unsafe {
                type SqliteExtensionInit = unsafe extern "C" fn(
                    *mut ffi::sqlite3,
                    *mut *const c_char,
                    *const ffi::sqlite3_api_routines,
                ) -> i32;

                let init: unsafe extern "C" fn() = sqlite_vec::sqlite3_vec_init;
                let init_fn: SqliteExtensionInit =
                    transmute::<unsafe extern "C" fn(), SqliteExtensionInit>(init);
                let rc = ffi::sqlite3_auto_extension(Some(init_fn));
                if rc != 0 {
                    Err(format!(
                        "failed to register sqlite-vec extension (code {rc})"
                    ))
                } else {
                    Ok(())
                }
            };
            *INIT_RESULT.lock().expect("init result mutex poisoned") = Some(result);
        });

        INIT_RESULT
            .lock()
            .expect("init result mutex poisoned")
            .clone()
            .expect("init was called but result not set")
            .map_err(CoreError::Storage)
    }

    /// Collection names become table names, so restrict them to identifier
    /// characters.
    fn table_name(collection: &str) -> Result<String, CoreError> {
        if collection.is_empty()
            || !collection
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
        {
            return Err(CoreError::Storage(format!(
                "invalid collection name '{collection}'"
            )));
        }
        Ok(collection.to_string())
    }

    async fn ensure_collection(&self, table: &str) -> Result<(), CoreError> {
        let create = format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                id TEXT PRIMARY KEY,
                group_id TEXT,
                file_path TEXT,
                file_name TEXT,
                chunk_index INTEGER,
                content TEXT,
                embedding TEXT
            )"
        );
        let index = format!("CREATE INDEX IF NOT EXISTS idx_{table}_group ON {table}(group_id)");
        self.conn
            .call(move |conn| {
                conn.execute(&create, [])?;
                conn.execute(&index, [])?;
                Ok(())
            })
            .await
            .map_err(|err| CoreError::Storage(err.to_string()))
    }
}

#[async_trait]
impl VectorBackend for SqliteBackend {
    async fn upsert(&self, collection: &str, chunks: Vec<ChunkRecord>) -> Result<(), CoreError> {
        if chunks.is_empty() {
            return Ok(());
        }
        let table = Self::table_name(collection)?;
        self.ensure_collection(&table).await?;

        let mut rows = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let embedding = match &chunk.embedding {
                Some(embedding) => serde_json::to_string(embedding)
                    .map_err(|err| CoreError::Storage(err.to_string()))?,
                None => {
                    return Err(CoreError::Storage(format!(
                        "chunk '{}' has no embedding",
                        chunk.id
                    )));
                }
            };
            rows.push((chunk, embedding));
        }

        let sql = format!(
            "INSERT OR REPLACE INTO {table}
             (id, group_id, file_path, file_name, chunk_index, content, embedding)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
        );
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                for (chunk, embedding) in rows {
                    tx.execute(
                        &sql,
                        (
                            &chunk.id,
                            &chunk.group_id,
                            &chunk.file_path,
                            &chunk.file_name,
                            chunk.chunk_index as i64,
                            &chunk.content,
                            &embedding,
                        ),
                    )?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(|err| CoreError::Storage(err.to_string()))
    }

    async fn search(
        &self,
        collection: &str,
        query_embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<SearchHit>, CoreError> {
        let table = Self::table_name(collection)?;
        self.ensure_collection(&table).await?;

        let query_json = serde_json::to_string(query_embedding)
            .map_err(|err| CoreError::Storage(err.to_string()))?;
        let sql = format!(
            "SELECT id, group_id, file_path, file_name, chunk_index, content,
                    vec_distance_cosine(vec_f32(embedding), vec_f32(?1)) AS distance
             FROM {table}
             ORDER BY distance ASC, rowid ASC
             LIMIT {top_k}"
        );
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map((&query_json,), |row| {
                    let chunk = ChunkRecord {
                        id: row.get(0)?,
                        group_id: row.get(1)?,
                        file_path: row.get(2)?,
                        file_name: row.get(3)?,
                        chunk_index: row.get::<_, i64>(4)? as usize,
                        content: row.get(5)?,
                        embedding: None,
                    };
                    let distance: f32 = row.get(6)?;
                    Ok(SearchHit {
                        chunk,
                        score: 1.0 - distance,
                    })
                })?;
                let mut hits = Vec::new();
                for row in rows {
                    hits.push(row?);
                }
                Ok(hits)
            })
            .await
            .map_err(|err| CoreError::Storage(err.to_string()))
    }

    async fn delete_group(&self, collection: &str, group_id: &str) -> Result<usize, CoreError> {
        let table = Self::table_name(collection)?;
        self.ensure_collection(&table).await?;

        let sql = format!("DELETE FROM {table} WHERE group_id = ?1");
        let group_id = group_id.to_string();
        self.conn
            .call(move |conn| {
                let deleted = conn.execute(&sql, (&group_id,))?;
                Ok(deleted)
            })
            .await
            .map_err(|err| CoreError::Storage(err.to_string()))
    }

    async fn list_groups(&self, collection: &str) -> Result<Vec<FileEntry>, CoreError> {
        let table = Self::table_name(collection)?;
        self.ensure_collection(&table).await?;

        let sql = format!(
            "SELECT group_id, file_path, file_name
             FROM {table}
             GROUP BY group_id
             ORDER BY MIN(rowid) ASC"
        );
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map([], |row| {
                    Ok(FileEntry {
                        group_id: row.get(0)?,
                        file_path: row.get(1)?,
                        file_name: row.get(2)?,
                    })
                })?;
                let mut files = Vec::new();
                for row in rows {
                    files.push(row?);
                }
                Ok(files)
            })
            .await
            .map_err(|err| CoreError::Storage(err.to_string()))
    }

    async fn count(&self, collection: &str) -> Result<usize, CoreError> {
        let table = Self::table_name(collection)?;
        self.ensure_collection(&table).await?;

        let sql = format!("SELECT COUNT(*) FROM {table}");
        self.conn
            .call(move |conn| {
                let count: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
                Ok(count as usize)
            })
            .await
            .map_err(|err| CoreError::Storage(err.to_string()))
    }
}
