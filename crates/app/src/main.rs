use chrono::Utc;
use clap::{Parser, Subcommand};
use pdf_chat_core::{
    CharacterNgramEmbedder, ChatAnswer, ChatSession, Embedder, GroqChatModel, HttpEmbedder,
    RetrievalOptions, SqliteVectorIndex,
};
use std::io::Write;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "pdf-chat", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Directory that holds the persisted vector index.
    #[arg(long, env = "PDF_CHAT_INDEX_DIR", default_value = "./pdf_chat_index")]
    index_dir: PathBuf,

    /// Collection name inside the index directory.
    #[arg(long, default_value = "pdfdata")]
    collection: String,

    /// Number of chunks to retrieve per question.
    #[arg(long, default_value = "4")]
    top_k: usize,

    /// Chat completions base URL (OpenAI compatible).
    #[arg(long, default_value = pdf_chat_core::DEFAULT_CHAT_ENDPOINT)]
    chat_url: String,

    /// Chat model identifier.
    #[arg(long, default_value = pdf_chat_core::DEFAULT_CHAT_MODEL)]
    chat_model: String,

    /// API key for the chat service.
    #[arg(long, env = "GROQ_API_KEY", hide_env_values = true)]
    api_key: String,

    /// Embeddings base URL (OpenAI compatible). Uses the built-in local
    /// embedder when unset.
    #[arg(long, env = "PDF_CHAT_EMBEDDINGS_URL")]
    embeddings_url: Option<String>,

    /// Embedding model identifier.
    #[arg(long, default_value = "sentence-transformers/all-MiniLM-L6-v2")]
    embeddings_model: String,

    /// Embedding vector dimensions.
    #[arg(long, default_value = "384")]
    embeddings_dimensions: usize,

    /// API key for the embeddings service, if it needs one.
    #[arg(long, env = "PDF_CHAT_EMBEDDINGS_API_KEY", hide_env_values = true)]
    embeddings_api_key: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Index a PDF into the collection, replacing previous contents.
    Index {
        /// Path of the PDF to index.
        #[arg(long)]
        pdf: PathBuf,
    },
    /// Ask a single question about the indexed document.
    Ask {
        /// The question to answer.
        #[arg(long)]
        question: String,
    },
    /// Interactive question loop; type "exit" to leave.
    Chat,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();

    let embedder: Box<dyn Embedder> = match &cli.embeddings_url {
        Some(endpoint) => {
            let mut embedder = HttpEmbedder::new(
                endpoint,
                &cli.embeddings_model,
                cli.embeddings_dimensions,
            )
            .map_err(|error| anyhow::anyhow!(error.to_string()))?;
            if let Some(api_key) = &cli.embeddings_api_key {
                embedder = embedder.with_api_key(api_key);
            }
            Box::new(embedder)
        }
        None => Box::new(CharacterNgramEmbedder::default()),
    };

    let model = GroqChatModel::new(&cli.chat_url, &cli.chat_model, &cli.api_key)
        .map_err(|error| anyhow::anyhow!(error.to_string()))?;
    let index = SqliteVectorIndex::open(&cli.index_dir, &cli.collection)
        .map_err(|error| anyhow::anyhow!(error.to_string()))?;

    let mut session = ChatSession::new(embedder, model, index)
        .with_retrieval(RetrievalOptions { top_k: cli.top_k });

    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "pdf-chat boot"
    );

    match cli.command {
        Command::Index { pdf } => {
            let report = session
                .build_index(&pdf)
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;

            println!(
                "{} chunks stored in collection '{}' from {}",
                report.chunk_count, cli.collection, report.document.source_path
            );
        }
        Command::Ask { question } => {
            let answer = session
                .ask(&question)
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;
            print_answer(&answer);
        }
        Command::Chat => {
            if !session.is_ready() {
                warn!("no document indexed yet; run the index command first");
            }

            let stdin = std::io::stdin();
            loop {
                print!("\nQuestion (exit to quit): ");
                std::io::stdout().flush()?;

                let mut line = String::new();
                if stdin.read_line(&mut line)? == 0 {
                    break;
                }

                let question = line.trim();
                if question.is_empty() {
                    continue;
                }
                if matches!(question.to_lowercase().as_str(), "exit" | "quit" | "q") {
                    println!("Goodbye!");
                    break;
                }

                match session.ask(question).await {
                    Ok(answer) => print_answer(&answer),
                    Err(error) => warn!(%error, "question failed"),
                }
            }
        }
    }

    Ok(())
}

fn print_answer(answer: &ChatAnswer) {
    println!("Answer: {}", answer.answer);
    if answer.sources.is_empty() {
        println!("Sources: none returned");
    } else {
        println!("Sources:");
        for source in &answer.sources {
            println!("- {source}");
        }
    }
}
