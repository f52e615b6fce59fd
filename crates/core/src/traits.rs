use crate::error::ChatError;
use crate::models::{DocumentChunk, RetrievedChunk};

/// Nearest-neighbor store over chunk embeddings, persisted per collection.
///
/// The store is local and synchronous; the network collaborators
/// (embedding and chat services) live behind their own async traits.
pub trait VectorIndex {
    /// Discard every entry in the collection. Safe on an empty collection.
    fn reset(&mut self) -> Result<(), ChatError>;

    /// Store one entry per chunk with a freshly generated unique id.
    /// Either every row lands or none do.
    fn insert(
        &mut self,
        chunks: &[DocumentChunk],
        embeddings: &[Vec<f32>],
    ) -> Result<usize, ChatError>;

    /// The `top_k` entries nearest to `query_vector`, best first. An empty
    /// collection yields an empty result, not an error.
    fn search(&self, query_vector: &[f32], top_k: usize) -> Result<Vec<RetrievedChunk>, ChatError>;

    fn count(&self) -> Result<u64, ChatError>;
}
