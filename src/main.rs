//! ragbot - ask questions about a document through a persona chatbot
//!
//! Commands:
//! - `ask`: build a chatbot from a file and answer one question
//! - `chat`: interactive session with a chatbot built from a file
//! - `chunks`: show how a file is split into passages

use anyhow::Context;
use clap::Parser;
use ragbot::{
    chatbot::{Chatbot, ChatbotService, CreateChatbotRequest},
    config::{AppConfig, EmbeddingBackend},
    document::{self, Document, MediaType},
    embedding::create_embedder,
    generation::Generator,
    logging::{self, LogTarget},
    rag,
    security::Session,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Answer a single question about a document
    Ask {
        /// PDF or plain-text document
        #[arg(long)]
        file: PathBuf,
        /// Friendly, Formal or Witty
        #[arg(long, default_value = "Formal")]
        persona: String,
        /// Number of passages used as context
        #[arg(long)]
        top_k: Option<usize>,
        /// Question text
        question: String,
    },
    /// Chat with a document interactively
    Chat {
        /// PDF or plain-text document
        #[arg(long)]
        file: PathBuf,
        /// Chatbot name
        #[arg(long)]
        name: String,
        /// Chatbot description
        #[arg(long)]
        description: Option<String>,
        /// Friendly, Formal or Witty
        #[arg(long, default_value = "Formal")]
        persona: String,
    },
    /// Print the passages a document is split into
    Chunks {
        /// PDF or plain-text document
        #[arg(long)]
        file: PathBuf,
        /// Maximum passage length in characters
        #[arg(long)]
        max_chars: Option<usize>,
        /// Characters shared by consecutive passages
        #[arg(long)]
        overlap: Option<usize>,
    },
}

#[derive(Parser, Debug)]
#[command(name = "ragbot")]
#[command(version)]
#[command(about = "Persona chatbots grounded in a single document", long_about = None)]
struct Args {
    /// Configuration file path (overrides defaults)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Use the hashing embedder instead of downloading a model
    #[arg(long, global = true)]
    offline: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let target = match args.command {
        Command::Chat { .. } => LogTarget::File,
        _ => LogTarget::Stderr,
    };

    let mut app_config = AppConfig::load(args.config.as_deref())?;
    logging::init_logging(args.verbose || app_config.debug, target)?;

    if args.offline {
        app_config.embedding.backend = EmbeddingBackend::Hashing;
    }

    match args.command {
        Command::Ask {
            file,
            persona,
            top_k,
            question,
        } => {
            if let Some(k) = top_k {
                app_config.top_k = k;
            }
            app_config.validate()?;

            let service = build_service(&app_config).await?;
            let name = file
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| "document".to_string());
            let session = local_session(&app_config);
            let chatbot = create_from_file(&service, &session, &file, &name, None, &persona).await?;

            let result = service
                .ask_chatbot(&chatbot, &question)
                .await
                .map_err(|e| anyhow::anyhow!(e.user_message()))?;
            println!("{}", result.answer);
        }
        Command::Chat {
            file,
            name,
            description,
            persona,
        } => {
            app_config.validate()?;
            let service = build_service(&app_config).await?;
            let session = local_session(&app_config);
            let chatbot = create_from_file(
                &service,
                &session,
                &file,
                &name,
                description.as_deref(),
                &persona,
            )
            .await?;
            run_chat(&service, &chatbot).await?;
        }
        Command::Chunks {
            file,
            max_chars,
            overlap,
        } => {
            let max_chars = max_chars.unwrap_or(app_config.chunking.chunk_size);
            let overlap = overlap.unwrap_or(app_config.chunking.chunk_overlap);

            let text = document::extract(&read_document(&file)?)?;
            for passage in rag::chunk(&text, max_chars, overlap) {
                println!(
                    "--- passage {} [{}..{}) {} chars",
                    passage.index,
                    passage.start,
                    passage.end,
                    passage.char_len()
                );
                println!("{}", passage.text);
            }
        }
    }

    Ok(())
}

async fn build_service(app_config: &AppConfig) -> anyhow::Result<ChatbotService> {
    tracing::info!(
        "Using {} model {} at {}",
        app_config.generation.provider,
        app_config.generation.model,
        app_config.generation.url
    );

    let embedder = create_embedder(&app_config.embedding).await?;
    tracing::info!("Embedding with {} ({} dims)", embedder.model_name(), embedder.dimension());

    let generator = Generator::from_config(app_config.generation.clone(), app_config.generation_timeout())?;
    Ok(ChatbotService::new(embedder, Arc::new(generator), app_config))
}

async fn create_from_file(
    service: &ChatbotService,
    session: &Session,
    path: &Path,
    name: &str,
    description: Option<&str>,
    persona: &str,
) -> anyhow::Result<Arc<Chatbot>> {
    let document = read_document(path)?;
    let description = description
        .map(str::to_string)
        .unwrap_or_else(|| format!("Answers questions about {}", path.display()));

    let request = CreateChatbotRequest::new(name, description, persona, document);
    service
        .create_chatbot(request, session)
        .await
        .map_err(|e| anyhow::anyhow!(e.user_message()))
}

fn read_document(path: &Path) -> anyhow::Result<Document> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(Document::new(bytes, media_type_for(path)))
}

/// Declared media type, guessed from the file extension
fn media_type_for(path: &Path) -> String {
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "pdf" => MediaType::Pdf.as_mime().to_string(),
        "txt" | "md" | "text" => MediaType::PlainText.as_mime().to_string(),
        "png" => "image/png".to_string(),
        "jpg" | "jpeg" => "image/jpeg".to_string(),
        "html" | "htm" => "text/html".to_string(),
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document".to_string(),
        _ => "application/octet-stream".to_string(),
    }
}

/// The person at the terminal counts as logged in for the life of the process
fn local_session(app_config: &AppConfig) -> Session {
    let username = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "local".to_string());

    Session::new(
        username,
        chrono::Utc::now(),
        chrono::Duration::hours(app_config.session_timeout_hours),
    )
}

async fn run_chat(service: &ChatbotService, chatbot: &Chatbot) -> anyhow::Result<()> {
    println!(
        "{} ({}) is ready: {} passages. Type /sources to toggle sources, /quit to exit.",
        chatbot.name,
        chatbot.persona,
        chatbot.index().len()
    );
    println!("Logs: {}", logging::log_path().display());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut show_sources = false;

    loop {
        print_prompt()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };

        match line.trim() {
            "" => continue,
            "/quit" | "/exit" => break,
            "/sources" => {
                show_sources = !show_sources;
                println!("Sources {}", if show_sources { "on" } else { "off" });
            }
            question => match service.ask_chatbot(chatbot, question).await {
                Ok(result) => {
                    println!("{}", result.answer);
                    if show_sources {
                        for scored in &result.passages {
                            println!(
                                "  [{} score {:.3}] {}",
                                scored.passage.index,
                                scored.score,
                                preview(&scored.passage.text, 80)
                            );
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!("Question failed: {}", e);
                    println!("{}", e.user_message());
                }
            },
        }
    }

    println!("Bye");
    Ok(())
}

fn print_prompt() -> std::io::Result<()> {
    use std::io::Write;
    print!("> ");
    std::io::stdout().flush()
}

fn preview(text: &str, max_chars: usize) -> String {
    let flat: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        flat
    } else {
        let cut: String = flat.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}
