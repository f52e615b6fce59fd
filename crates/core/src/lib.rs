pub mod chunking;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod llm;
pub mod models;
pub mod orchestrator;
pub mod stores;
pub mod traits;

pub use chunking::{build_chunks, split_text, ChunkingConfig};
pub use embeddings::{
    CharacterNgramEmbedder, Embedder, HttpEmbedder, DEFAULT_EMBEDDING_DIMENSIONS,
};
pub use error::{ChatError, IngestError};
pub use extractor::{extract_document_text, LopdfExtractor, PageText, PdfExtractor};
pub use llm::{ChatMessage, ChatModel, GroqChatModel, DEFAULT_CHAT_ENDPOINT, DEFAULT_CHAT_MODEL};
pub use models::{
    ChatAnswer, ConversationTurn, DocumentChunk, DocumentFingerprint, IndexReport,
    RetrievalOptions, RetrievedChunk,
};
pub use orchestrator::ChatSession;
pub use stores::SqliteVectorIndex;
pub use traits::VectorIndex;
