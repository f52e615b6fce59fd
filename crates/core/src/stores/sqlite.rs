use crate::error::{ChatError, IngestError};
use crate::models::{DocumentChunk, RetrievedChunk};
use crate::traits::VectorIndex;
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Vector index persisted as one SQLite database per collection.
///
/// Embeddings are stored as little-endian f32 blobs and searched with
/// brute-force cosine similarity; at the single-document scale this index
/// serves, that beats maintaining an ANN structure.
pub struct SqliteVectorIndex {
    conn: Connection,
    db_path: PathBuf,
}

impl SqliteVectorIndex {
    /// Open (or create) the collection database under `dir`.
    pub fn open(dir: &Path, collection: &str) -> Result<Self, ChatError> {
        if collection.trim().is_empty() {
            return Err(ChatError::Request("collection name is empty".to_string()));
        }

        std::fs::create_dir_all(dir).map_err(IngestError::Io)?;
        let db_path = dir.join(format!("{collection}.sqlite3"));
        let conn = Connection::open(&db_path)?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS chunks (
                id TEXT PRIMARY KEY,
                source_path TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                text TEXT NOT NULL,
                created_at TEXT DEFAULT CURRENT_TIMESTAMP
            );

            CREATE TABLE IF NOT EXISTS embeddings (
                chunk_id TEXT PRIMARY KEY,
                embedding BLOB NOT NULL,
                dimensions INTEGER NOT NULL,
                FOREIGN KEY (chunk_id) REFERENCES chunks(id) ON DELETE CASCADE
            );
            "#,
        )?;

        Ok(Self { conn, db_path })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }
}

impl VectorIndex for SqliteVectorIndex {
    fn reset(&mut self) -> Result<(), ChatError> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM embeddings", [])?;
        tx.execute("DELETE FROM chunks", [])?;
        tx.commit()?;
        Ok(())
    }

    fn insert(
        &mut self,
        chunks: &[DocumentChunk],
        embeddings: &[Vec<f32>],
    ) -> Result<usize, ChatError> {
        if chunks.len() != embeddings.len() {
            return Err(ChatError::Request(format!(
                "embedding count {} doesn't match chunk count {}",
                embeddings.len(),
                chunks.len()
            )));
        }

        if let Some(first) = embeddings.first() {
            for embedding in embeddings {
                if embedding.len() != first.len() {
                    return Err(ChatError::Request(format!(
                        "embedding dimension {} != {}",
                        embedding.len(),
                        first.len()
                    )));
                }
            }
        }

        let tx = self.conn.transaction()?;
        for (chunk, embedding) in chunks.iter().zip(embeddings.iter()) {
            let id = Uuid::new_v4().to_string();
            tx.execute(
                "INSERT INTO chunks (id, source_path, chunk_index, text) VALUES (?1, ?2, ?3, ?4)",
                params![id, chunk.source_path, chunk.chunk_index as i64, chunk.text],
            )?;

            let blob: Vec<u8> = embedding
                .iter()
                .flat_map(|value| value.to_le_bytes())
                .collect();
            tx.execute(
                "INSERT INTO embeddings (chunk_id, embedding, dimensions) VALUES (?1, ?2, ?3)",
                params![id, blob, embedding.len() as i64],
            )?;
        }
        tx.commit()?;

        Ok(chunks.len())
    }

    fn search(&self, query_vector: &[f32], top_k: usize) -> Result<Vec<RetrievedChunk>, ChatError> {
        let mut stmt = self.conn.prepare(
            "SELECT c.source_path, c.chunk_index, c.text, e.embedding
             FROM chunks c
             JOIN embeddings e ON c.id = e.chunk_id",
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Vec<u8>>(3)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut scored: Vec<RetrievedChunk> = rows
            .into_iter()
            .map(|(source_path, chunk_index, text, blob)| {
                let embedding = decode_embedding(&blob);
                RetrievedChunk {
                    score: f64::from(cosine_similarity(query_vector, &embedding)),
                    chunk: DocumentChunk {
                        source_path,
                        chunk_index: chunk_index as u64,
                        text,
                    },
                }
            })
            .collect();

        scored.sort_by(|left, right| right.score.total_cmp(&left.score));
        scored.truncate(top_k);
        Ok(scored)
    }

    fn count(&self) -> Result<u64, ChatError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

fn decode_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot_product = 0.0;
    let mut norm_a = 0.0;
    let mut norm_b = 0.0;

    for (x, y) in a.iter().zip(b.iter()) {
        dot_product += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denominator = (norm_a * norm_b).sqrt();
    if denominator == 0.0 {
        return 0.0;
    }

    dot_product / denominator
}
