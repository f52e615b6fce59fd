use crate::chunking::{build_chunks, ChunkingConfig};
use crate::embeddings::Embedder;
use crate::error::ChatError;
use crate::extractor::extract_document_text;
use crate::llm::{ChatMessage, ChatModel};
use crate::models::{
    ChatAnswer, ConversationTurn, DocumentFingerprint, IndexReport, RetrievalOptions,
    RetrievedChunk,
};
use crate::traits::VectorIndex;
use std::collections::HashSet;
use std::future::Future;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

const CONDENSE_PROMPT: &str = "Given the following conversation and a follow up question, \
rephrase the follow up question to be a standalone question that keeps every relevant detail. \
Reply with the standalone question only.";

const ANSWER_PROMPT: &str = "Use the following pieces of context from the document to answer \
the user's question. If the answer is not contained in the context, say you don't know \
instead of making one up.";

const MAX_SERVICE_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY: Duration = Duration::from_millis(250);

/// Conversational retrieval session over a single indexed document.
///
/// Owns the three collaborators (embedder, chat model, vector index) plus
/// the conversation history, replacing the usual pile of process-wide
/// singletons with one explicit object. A session answers questions only
/// after an index build succeeds; a failed rebuild drops it back to the
/// unanswerable state until the next successful build.
pub struct ChatSession<E, M, V>
where
    E: Embedder,
    M: ChatModel,
    V: VectorIndex,
{
    embedder: E,
    model: M,
    index: V,
    chunking: ChunkingConfig,
    retrieval: RetrievalOptions,
    history: Vec<ConversationTurn>,
    ready: bool,
}

impl<E, M, V> ChatSession<E, M, V>
where
    E: Embedder,
    M: ChatModel,
    V: VectorIndex,
{
    /// Create a session over the given collaborators. A collection that
    /// already holds entries (persisted by an earlier run) is usable
    /// immediately; history always starts empty.
    pub fn new(embedder: E, model: M, index: V) -> Self {
        let ready = index.count().map(|entries| entries > 0).unwrap_or(false);
        Self {
            embedder,
            model,
            index,
            chunking: ChunkingConfig::default(),
            retrieval: RetrievalOptions::default(),
            history: Vec::new(),
            ready,
        }
    }

    pub fn with_chunking(mut self, chunking: ChunkingConfig) -> Self {
        self.chunking = chunking;
        self
    }

    pub fn with_retrieval(mut self, retrieval: RetrievalOptions) -> Self {
        self.retrieval = retrieval;
        self
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn history(&self) -> &[ConversationTurn] {
        &self.history
    }

    /// Replace the index contents with the given PDF's chunks.
    pub async fn build_index(&mut self, pdf_path: &Path) -> Result<IndexReport, ChatError> {
        let document = DocumentFingerprint::from_path(pdf_path)?;
        let text = extract_document_text(pdf_path)?;
        self.build_index_from_document(document, &text).await
    }

    /// Replace the index contents with chunks of already-extracted text.
    pub async fn build_index_from_text(
        &mut self,
        source_path: &str,
        text: &str,
    ) -> Result<IndexReport, ChatError> {
        let document = DocumentFingerprint::from_text(source_path, text)?;
        self.build_index_from_document(document, text).await
    }

    async fn build_index_from_document(
        &mut self,
        document: DocumentFingerprint,
        text: &str,
    ) -> Result<IndexReport, ChatError> {
        // Until the rebuild completes, the session cannot answer.
        self.ready = false;

        let chunks = build_chunks(&document, text, self.chunking)?;
        info!(
            source = %document.source_path,
            chunk_count = chunks.len(),
            "indexing document"
        );

        // Embed before touching the index: a failing service never leaves
        // a half-cleared collection behind.
        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let embeddings = with_retry("embed", || self.embedder.embed_batch(&texts)).await?;

        self.index.reset()?;
        let inserted = self.index.insert(&chunks, &embeddings)?;
        self.ready = true;

        info!(source = %document.source_path, inserted, "index rebuilt");
        Ok(IndexReport {
            document,
            chunk_count: inserted,
        })
    }

    /// Answer a question using retrieved context plus the conversation so
    /// far, and append the new turn to the history.
    pub async fn ask(&mut self, question: &str) -> Result<ChatAnswer, ChatError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(ChatError::Request("question is empty".to_string()));
        }
        if !self.ready {
            return Err(ChatError::not_initialized("index"));
        }

        // Follow-ups referencing earlier turns retrieve poorly verbatim;
        // rewrite them into a standalone query first.
        let standalone = if self.history.is_empty() {
            question.to_string()
        } else {
            let messages = condense_messages(&self.history, question);
            with_retry("condense", || self.model.complete(&messages)).await?
        };
        debug!(retrieval_query = %standalone, "retrieving context");

        let query_vector = with_retry("embed", || self.embedder.embed(&standalone)).await?;
        let hits = self.index.search(&query_vector, self.retrieval.top_k)?;

        let messages = answer_messages(&hits, &self.history, question);
        let answer = with_retry("complete", || self.model.complete(&messages)).await?;

        let sources = dedupe_sources(&hits);
        self.history.push(ConversationTurn {
            question: question.to_string(),
            answer: answer.clone(),
        });

        info!(
            sources = sources.len(),
            history_len = self.history.len(),
            "answered question"
        );
        Ok(ChatAnswer { answer, sources })
    }
}

async fn with_retry<T, F, Fut>(operation: &str, mut call: F) -> Result<T, ChatError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ChatError>>,
{
    let mut attempt = 1;
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(error) if error.is_transient() && attempt < MAX_SERVICE_ATTEMPTS => {
                warn!(
                    operation,
                    attempt,
                    error = %error,
                    "transient service failure, retrying"
                );
                tokio::time::sleep(RETRY_BASE_DELAY * 2u32.pow(attempt - 1)).await;
                attempt += 1;
            }
            Err(error) => return Err(error),
        }
    }
}

fn condense_messages(history: &[ConversationTurn], question: &str) -> Vec<ChatMessage> {
    let mut transcript = String::new();
    for turn in history {
        transcript.push_str("Human: ");
        transcript.push_str(&turn.question);
        transcript.push_str("\nAssistant: ");
        transcript.push_str(&turn.answer);
        transcript.push('\n');
    }

    vec![
        ChatMessage::system(CONDENSE_PROMPT),
        ChatMessage::user(format!(
            "Chat history:\n{transcript}\nFollow up question: {question}\nStandalone question:"
        )),
    ]
}

fn answer_messages(
    hits: &[RetrievedChunk],
    history: &[ConversationTurn],
    question: &str,
) -> Vec<ChatMessage> {
    let context = hits
        .iter()
        .map(|hit| hit.chunk.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    let mut messages = vec![ChatMessage::system(format!(
        "{ANSWER_PROMPT}\n\nContext:\n{context}"
    ))];
    for turn in history {
        messages.push(ChatMessage::user(turn.question.clone()));
        messages.push(ChatMessage::assistant(turn.answer.clone()));
    }
    messages.push(ChatMessage::user(question.to_string()));
    messages
}

fn dedupe_sources(hits: &[RetrievedChunk]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut sources = Vec::new();
    for hit in hits {
        if seen.insert(hit.chunk.source_path.clone()) {
            sources.push(hit.chunk.source_path.clone());
        }
    }
    sources
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DocumentChunk;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FakeEmbedder {
        recorded: Mutex<Vec<String>>,
        transient_failures: Mutex<u32>,
        permanent_failure: bool,
    }

    impl FakeEmbedder {
        fn new() -> Self {
            Self {
                recorded: Mutex::new(Vec::new()),
                transient_failures: Mutex::new(0),
                permanent_failure: false,
            }
        }

        fn failing_transiently(times: u32) -> Self {
            let embedder = Self::new();
            *embedder.transient_failures.lock().unwrap() = times;
            embedder
        }

        fn failing_permanently() -> Self {
            Self {
                permanent_failure: true,
                ..Self::new()
            }
        }

        fn recorded(&self) -> Vec<String> {
            self.recorded.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Embedder for FakeEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, ChatError> {
            if self.permanent_failure {
                return Err(ChatError::BackendResponse {
                    backend: "embeddings".to_string(),
                    details: "400 Bad Request".to_string(),
                });
            }

            let mut failures = self.transient_failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(ChatError::BackendResponse {
                    backend: "embeddings".to_string(),
                    details: "503 Service Unavailable".to_string(),
                });
            }
            drop(failures);

            self.recorded.lock().unwrap().push(text.to_string());
            Ok(vec![1.0, 0.0])
        }

        fn dimensions(&self) -> usize {
            2
        }
    }

    struct FakeChatModel {
        calls: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl FakeChatModel {
        fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ChatModel for FakeChatModel {
        async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ChatError> {
            self.calls.lock().unwrap().push(messages.to_vec());

            let is_condense = messages
                .iter()
                .any(|message| message.content.contains("Standalone question:"));
            if is_condense {
                Ok("What is the construction status of Namma Metro?".to_string())
            } else {
                Ok("The metro extension is under construction.".to_string())
            }
        }
    }

    #[derive(Default)]
    struct FakeIndex {
        entries: Vec<(DocumentChunk, Vec<f32>)>,
    }

    impl FakeIndex {
        fn populated(chunks: Vec<DocumentChunk>) -> Self {
            Self {
                entries: chunks.into_iter().map(|chunk| (chunk, vec![1.0, 0.0])).collect(),
            }
        }
    }

    impl VectorIndex for FakeIndex {
        fn reset(&mut self) -> Result<(), ChatError> {
            self.entries.clear();
            Ok(())
        }

        fn insert(
            &mut self,
            chunks: &[DocumentChunk],
            embeddings: &[Vec<f32>],
        ) -> Result<usize, ChatError> {
            if chunks.len() != embeddings.len() {
                return Err(ChatError::Request("length mismatch".to_string()));
            }
            self.entries
                .extend(chunks.iter().cloned().zip(embeddings.iter().cloned()));
            Ok(chunks.len())
        }

        fn search(
            &self,
            _query_vector: &[f32],
            top_k: usize,
        ) -> Result<Vec<RetrievedChunk>, ChatError> {
            Ok(self
                .entries
                .iter()
                .take(top_k)
                .enumerate()
                .map(|(position, (chunk, _))| RetrievedChunk {
                    chunk: chunk.clone(),
                    score: 1.0 - position as f64 * 0.1,
                })
                .collect())
        }

        fn count(&self) -> Result<u64, ChatError> {
            Ok(self.entries.len() as u64)
        }
    }

    fn session() -> ChatSession<FakeEmbedder, FakeChatModel, FakeIndex> {
        ChatSession::new(FakeEmbedder::new(), FakeChatModel::new(), FakeIndex::default())
    }

    fn chunk(source: &str, index: u64, text: &str) -> DocumentChunk {
        DocumentChunk {
            source_path: source.to_string(),
            chunk_index: index,
            text: text.to_string(),
        }
    }

    #[tokio::test]
    async fn ask_before_any_build_is_not_initialized() {
        let mut session = session();
        let result = session.ask("What is Alpha?").await;
        assert!(matches!(
            result,
            Err(ChatError::NotInitialized { ref component }) if component == "index"
        ));
    }

    #[tokio::test]
    async fn blank_question_is_rejected() {
        let mut session = session();
        let result = session.ask("   ").await;
        assert!(matches!(result, Err(ChatError::Request(_))));
    }

    #[tokio::test]
    async fn build_then_ask_returns_answer_and_sources() {
        let mut session = session();
        let report = session
            .build_index_from_text("/tmp/news.pdf", "Namma Metro construction update")
            .await
            .expect("build should succeed");
        assert_eq!(report.chunk_count, 1);
        assert!(session.is_ready());

        let answer = session
            .ask("Any news on 'Namma Metro'?")
            .await
            .expect("ask should succeed");
        assert!(!answer.answer.is_empty());
        assert_eq!(answer.sources, vec!["/tmp/news.pdf".to_string()]);
        assert_eq!(session.history().len(), 1);
    }

    #[tokio::test]
    async fn small_document_builds_exactly_one_chunk() {
        let mut session = session();
        let report = session
            .build_index_from_text("/tmp/tiny.pdf", "Alpha. Beta. Gamma.")
            .await
            .expect("build should succeed");
        assert_eq!(report.chunk_count, 1);
        assert_eq!(session.index.entries[0].0.chunk_index, 0);
    }

    #[tokio::test]
    async fn follow_up_retrieves_with_condensed_query() {
        let mut session = session();
        session
            .build_index_from_text("/tmp/news.pdf", "Namma Metro construction update")
            .await
            .expect("build should succeed");

        session.ask("Any news on Namma Metro?").await.expect("first ask");
        session.ask("When will it open?").await.expect("second ask");

        let recorded = session.embedder.recorded();
        let last_query = recorded.last().expect("queries were embedded");
        assert_eq!(last_query, "What is the construction status of Namma Metro?");
        assert!(!recorded.contains(&"When will it open?".to_string()));

        // One answer call for the first question, condense + answer for
        // the follow-up.
        assert_eq!(session.model.call_count(), 3);
    }

    #[tokio::test]
    async fn sources_are_deduplicated_in_first_seen_order() {
        let embedder = FakeEmbedder::new();
        let model = FakeChatModel::new();
        let index = FakeIndex::populated(vec![
            chunk("/tmp/a.pdf", 0, "first"),
            chunk("/tmp/b.pdf", 0, "second"),
            chunk("/tmp/a.pdf", 1, "third"),
        ]);

        let mut session = ChatSession::new(embedder, model, index)
            .with_retrieval(RetrievalOptions { top_k: 10 });
        let answer = session.ask("anything?").await.expect("ask should succeed");
        assert_eq!(
            answer.sources,
            vec!["/tmp/a.pdf".to_string(), "/tmp/b.pdf".to_string()]
        );
    }

    #[tokio::test]
    async fn failed_embedding_leaves_session_uninitialized() {
        let mut session = ChatSession::new(
            FakeEmbedder::failing_permanently(),
            FakeChatModel::new(),
            FakeIndex::default(),
        );

        let result = session
            .build_index_from_text("/tmp/doc.pdf", "some text")
            .await;
        assert!(result.is_err());
        assert!(!session.is_ready());

        let follow_up = session.ask("anything?").await;
        assert!(matches!(follow_up, Err(ChatError::NotInitialized { .. })));
    }

    #[tokio::test]
    async fn transient_embedding_failure_is_retried() {
        let mut session = ChatSession::new(
            FakeEmbedder::failing_transiently(1),
            FakeChatModel::new(),
            FakeIndex::default(),
        );

        let report = session
            .build_index_from_text("/tmp/doc.pdf", "some text")
            .await
            .expect("retry should recover");
        assert_eq!(report.chunk_count, 1);
        assert!(session.is_ready());
    }

    #[tokio::test]
    async fn session_over_populated_index_starts_ready() {
        let index = FakeIndex::populated(vec![chunk("/tmp/old.pdf", 0, "persisted")]);
        let session = ChatSession::new(FakeEmbedder::new(), FakeChatModel::new(), index);
        assert!(session.is_ready());
    }

    #[tokio::test]
    async fn history_grows_one_turn_per_question() {
        let mut session = session();
        session
            .build_index_from_text("/tmp/doc.pdf", "content body")
            .await
            .expect("build should succeed");

        session.ask("first?").await.expect("first");
        session.ask("second?").await.expect("second");

        let history = session.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].question, "first?");
        assert_eq!(history[1].question, "second?");
    }
}
