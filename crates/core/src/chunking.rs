use crate::error::IngestError;
use crate::models::{DocumentChunk, DocumentFingerprint};

#[derive(Debug, Clone, Copy)]
pub struct ChunkingConfig {
    pub max_chars: usize,
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: 1_000,
            overlap_chars: 100,
        }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.max_chars == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "max_chars must be positive".to_string(),
            ));
        }
        if self.overlap_chars >= self.max_chars {
            return Err(IngestError::InvalidChunkConfig(format!(
                "overlap {} must be smaller than max chunk size {}",
                self.overlap_chars, self.max_chars
            )));
        }
        Ok(())
    }
}

/// Split `text` into overlapping chunks of at most `max_chars` characters.
///
/// Each cut prefers, in order: a paragraph break, a line break, a sentence
/// period, a space. A chunk is cut mid-word only when the window contains
/// none of these. Consecutive chunks share `overlap_chars` characters so
/// context survives the boundary. Deterministic for a given input and
/// config.
pub fn split_text(text: &str, config: ChunkingConfig) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return Vec::new();
    }
    if chars.len() <= config.max_chars {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < chars.len() {
        let window_end = (start + config.max_chars).min(chars.len());
        let end = if window_end == chars.len() {
            window_end
        } else {
            start + break_offset(&chars[start..window_end])
        };

        chunks.push(chars[start..end].iter().collect());

        if end == chars.len() {
            break;
        }

        // Step back by the overlap, but always move forward.
        let next = end.saturating_sub(config.overlap_chars);
        start = if next > start { next } else { end };
    }

    chunks
}

/// Where to cut a full window, honouring the separator preference order.
/// Boundaries in the first third of the window are ignored so chunks stay
/// close to their budget.
fn break_offset(window: &[char]) -> usize {
    let len = window.len();

    if let Some(position) = rfind_paragraph_break(window) {
        if position + 2 > len / 3 {
            return position + 2;
        }
    }
    if let Some(position) = window.iter().rposition(|&c| c == '\n') {
        if position + 1 > len / 3 {
            return position + 1;
        }
    }
    if let Some(position) = window.iter().rposition(|&c| c == '.') {
        if position + 1 > len / 3 {
            return position + 1;
        }
    }
    if let Some(position) = window.iter().rposition(|&c| c == ' ') {
        if position > 0 {
            return position + 1;
        }
    }

    len
}

fn rfind_paragraph_break(window: &[char]) -> Option<usize> {
    (0..window.len().saturating_sub(1))
        .rev()
        .find(|&index| window[index] == '\n' && window[index + 1] == '\n')
}

/// Chunk a document's extracted text into indexable pieces.
///
/// Empty text yields an empty sequence, not an error.
pub fn build_chunks(
    document: &DocumentFingerprint,
    text: &str,
    config: ChunkingConfig,
) -> Result<Vec<DocumentChunk>, IngestError> {
    config.validate()?;

    let chunks = split_text(text, config)
        .into_iter()
        .enumerate()
        .map(|(index, chunk_text)| DocumentChunk {
            source_path: document.source_path.clone(),
            chunk_index: index as u64,
            text: chunk_text,
        })
        .collect();

    Ok(chunks)
}
