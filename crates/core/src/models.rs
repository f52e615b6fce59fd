use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;

use crate::error::IngestError;

/// Identity of the document behind the current index contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentFingerprint {
    pub document_id: String,
    pub title: String,
    pub source_path: String,
    pub checksum: String,
    pub ingested_at: DateTime<Utc>,
}

impl DocumentFingerprint {
    /// Fingerprint a document from its on-disk bytes.
    pub fn from_path(path: &Path) -> Result<Self, IngestError> {
        let checksum = digest_file(path)?;
        let title = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                IngestError::MissingFileName(format!("path missing filename: {}", path.display()))
            })?;

        Ok(Self {
            document_id: hash_hex(path.to_string_lossy().as_bytes()),
            title: title.to_string(),
            source_path: path.to_string_lossy().to_string(),
            checksum,
            ingested_at: Utc::now(),
        })
    }

    /// Fingerprint already-extracted text under a caller-supplied source name.
    pub fn from_text(source_path: &str, text: &str) -> Result<Self, IngestError> {
        if source_path.trim().is_empty() {
            return Err(IngestError::InvalidArgument(
                "source path is empty".to_string(),
            ));
        }

        let title = Path::new(source_path)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(source_path)
            .to_string();

        Ok(Self {
            document_id: hash_hex(source_path.as_bytes()),
            title,
            source_path: source_path.to_string(),
            checksum: hash_hex(text.as_bytes()),
            ingested_at: Utc::now(),
        })
    }
}

/// One bounded slice of extracted document text, the unit of embedding
/// and retrieval.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentChunk {
    pub source_path: String,
    pub chunk_index: u64,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub chunk: DocumentChunk,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationTurn {
    pub question: String,
    pub answer: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatAnswer {
    pub answer: String,
    /// Originating document paths of the chunks used, in first-seen order.
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetrievalOptions {
    pub top_k: usize,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self { top_k: 4 }
    }
}

/// Outcome of a successful index build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexReport {
    pub document: DocumentFingerprint,
    pub chunk_count: usize,
}

pub fn digest_file(path: &Path) -> Result<String, IngestError> {
    let bytes = fs::read(path)?;
    Ok(hash_hex(&bytes))
}

fn hash_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}
