//! Chatbots grounded in a single uploaded document
//!
//! [`ChatbotService`] ties the pipeline together:
//!
//! ```text
//! create: document -> extract -> chunk -> embed -> VectorIndex -> registry
//! ask:    question -> search(top_k) -> persona prompt -> Generator -> answer
//! ```
//!
//! A failed creation registers nothing. A failed question affects only that
//! question; the chatbot stays usable.

mod registry;

pub use registry::{ChatbotRegistry, Reservation};

use crate::config::{AppConfig, ChunkingConfig};
use crate::document::{self, Document, ExtractError};
use crate::embedding::{Embedder, EmbeddingError};
use crate::generation::{GenerationError, Generator};
use crate::rag::{self, IndexError, Passage, Persona, PromptTemplate, ScoredPassage, VectorIndex};
use crate::security::Session;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum ChatbotError {
    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("Chatbot '{0}' already exists")]
    DuplicateName(String),

    #[error("Chatbot {0} not found")]
    NotFound(Uuid),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Document is {size} bytes, limit is {limit}")]
    DocumentTooLarge { size: usize, limit: usize },

    #[error("Session for '{0}' has expired")]
    SessionExpired(String),
}

impl ChatbotError {
    /// Message suitable for showing to the person who triggered the failure
    pub fn user_message(&self) -> String {
        match self {
            Self::Extract(ExtractError::UnsupportedFormat(media_type)) => format!(
                "Unsupported file type '{}'. Please upload a PDF or plain text file.",
                media_type
            ),
            Self::Extract(ExtractError::ExtractionFailure(reason)) => {
                format!("Error processing document: {}", reason)
            }
            Self::Index(IndexError::EmptyCorpus) => {
                "The document does not contain any text to answer from.".to_string()
            }
            Self::Index(IndexError::Embedding(e)) | Self::Embedding(e) => {
                format!("Error creating embeddings: {}", e)
            }
            Self::Generation(GenerationError::Timeout(limit)) => format!(
                "The model did not answer within {} seconds. Please try again.",
                limit.as_secs()
            ),
            Self::Generation(GenerationError::Failure(reason)) => {
                format!("Error generating response: {}", reason)
            }
            Self::DuplicateName(name) => format!("You already have a chatbot named '{}'.", name),
            Self::NotFound(_) => "That chatbot no longer exists.".to_string(),
            Self::InvalidRequest(reason) => reason.clone(),
            Self::DocumentTooLarge { limit, .. } => {
                format!("File size exceeds {} limit", human_size(*limit))
            }
            Self::SessionExpired(_) => "Session expired. Please login again.".to_string(),
        }
    }
}

fn human_size(bytes: usize) -> String {
    const MIB: usize = 1024 * 1024;
    const KIB: usize = 1024;

    if bytes >= MIB && bytes % MIB == 0 {
        format!("{}MB", bytes / MIB)
    } else if bytes >= KIB && bytes % KIB == 0 {
        format!("{}KB", bytes / KIB)
    } else {
        format!("{} bytes", bytes)
    }
}

/// A registered chatbot. Immutable once built.
pub struct Chatbot {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub persona: Persona,
    pub creator: String,
    pub created_at: DateTime<Utc>,
    index: VectorIndex,
    template: PromptTemplate,
}

impl fmt::Debug for Chatbot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chatbot")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("persona", &self.persona)
            .field("creator", &self.creator)
            .field("index", &self.index)
            .finish()
    }
}

impl Chatbot {
    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    pub fn template(&self) -> &PromptTemplate {
        &self.template
    }

    pub fn summary(&self) -> ChatbotSummary {
        ChatbotSummary {
            id: self.id,
            name: self.name.clone(),
            description: self.description.clone(),
            persona: self.persona,
            created_at: self.created_at,
            passages: self.index.len(),
        }
    }
}

/// Dashboard view of a chatbot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatbotSummary {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub persona: Persona,
    pub created_at: DateTime<Utc>,
    pub passages: usize,
}

#[derive(Debug, Clone)]
pub struct CreateChatbotRequest {
    pub name: String,
    pub description: String,
    /// Persona name; unknown names fall back to [`Persona::Formal`]
    pub persona: String,
    pub document: Document,
}

impl CreateChatbotRequest {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        persona: impl Into<String>,
        document: Document,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            persona: persona.into(),
            document,
        }
    }

    fn validate(&self) -> Result<(), ChatbotError> {
        if self.name.trim().is_empty() || self.description.trim().is_empty() || self.document.is_empty() {
            return Err(ChatbotError::InvalidRequest(
                "Please fill in all fields and upload a document".to_string(),
            ));
        }
        Ok(())
    }
}

/// Outcome of one question
#[derive(Debug, Clone)]
pub struct QueryResult {
    /// Retrieved passages, best match first
    pub passages: Vec<ScoredPassage>,
    pub prompt: String,
    pub answer: String,
}

pub struct ChatbotService {
    registry: ChatbotRegistry,
    embedder: Arc<dyn Embedder>,
    generator: Arc<Generator>,
    chunking: ChunkingConfig,
    top_k: usize,
    max_document_bytes: usize,
}

impl ChatbotService {
    pub fn new(embedder: Arc<dyn Embedder>, generator: Arc<Generator>, config: &AppConfig) -> Self {
        Self {
            registry: ChatbotRegistry::new(),
            embedder,
            generator,
            chunking: config.chunking,
            top_k: config.top_k,
            max_document_bytes: config.max_document_bytes,
        }
    }

    pub fn registry(&self) -> &ChatbotRegistry {
        &self.registry
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Build and register a chatbot from an uploaded document.
    ///
    /// The session's user becomes the creator. If the returned future is
    /// dropped before it completes, nothing is registered and the name is free.
    pub async fn create_chatbot(
        &self,
        request: CreateChatbotRequest,
        session: &Session,
    ) -> Result<Arc<Chatbot>, ChatbotError> {
        check_session(session)?;
        request.validate()?;
        let creator = session.username.as_str();

        let size = request.document.len();
        if size > self.max_document_bytes {
            return Err(ChatbotError::DocumentTooLarge {
                size,
                limit: self.max_document_bytes,
            });
        }

        let name = request.name.trim().to_string();
        let reservation = self.registry.reserve(creator, &name).await?;

        match self.build_chatbot(&request, &name, creator).await {
            Ok(chatbot) => {
                let chatbot = self.registry.insert(reservation, chatbot).await;
                tracing::info!(
                    "Created chatbot '{}' ({} passages, persona {})",
                    chatbot.name,
                    chatbot.index.len(),
                    chatbot.persona
                );
                Ok(chatbot)
            }
            Err(e) => {
                tracing::warn!("Creating chatbot '{}' failed: {}", name, e);
                drop(reservation);
                Err(e)
            }
        }
    }

    async fn build_chatbot(
        &self,
        request: &CreateChatbotRequest,
        name: &str,
        creator: &str,
    ) -> Result<Chatbot, ChatbotError> {
        let text = document::extract(&request.document)?;
        tracing::debug!(
            "Extracted {} chars from {} document",
            text.chars().count(),
            request.document.media_type
        );

        if text.trim().is_empty() {
            return Err(IndexError::EmptyCorpus.into());
        }

        let passages: Vec<Passage> =
            rag::chunk(&text, self.chunking.chunk_size, self.chunking.chunk_overlap).collect();
        tracing::debug!("Chunked document into {} passages", passages.len());

        let index = VectorIndex::build(passages, self.embedder.clone()).await?;

        let persona = Persona::from_name(&request.persona);
        Ok(Chatbot {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: request.description.trim().to_string(),
            persona,
            creator: creator.to_string(),
            created_at: Utc::now(),
            index,
            template: PromptTemplate::for_persona(persona),
        })
    }

    /// Answer a question with a registered chatbot
    pub async fn ask(&self, chatbot_id: Uuid, question: &str) -> Result<QueryResult, ChatbotError> {
        let chatbot = self
            .registry
            .get(chatbot_id)
            .await
            .ok_or(ChatbotError::NotFound(chatbot_id))?;

        self.ask_chatbot(&chatbot, question).await
    }

    /// Answer a question with a chatbot the caller already holds
    pub async fn ask_chatbot(&self, chatbot: &Chatbot, question: &str) -> Result<QueryResult, ChatbotError> {
        if question.trim().is_empty() {
            return Err(ChatbotError::InvalidRequest("Please enter a question".to_string()));
        }

        let passages = chatbot.index.search(question, self.top_k).await?;
        tracing::debug!(
            "Retrieved {} passages for '{}' (best score {:?})",
            passages.len(),
            chatbot.name,
            passages.first().map(|p| p.score)
        );

        let context: Vec<Passage> = passages.iter().map(|p| p.passage.clone()).collect();
        let prompt = chatbot.template.render(&context, question);

        let answer = self.generator.generate(&prompt).await?;
        tracing::debug!("Answered with {} chars", answer.len());

        Ok(QueryResult {
            passages,
            prompt,
            answer,
        })
    }

    /// Dashboard listing for the session's user
    pub async fn list_for(&self, session: &Session) -> Result<Vec<ChatbotSummary>, ChatbotError> {
        check_session(session)?;
        Ok(self.registry.list_for(&session.username).await)
    }
}

fn check_session(session: &Session) -> Result<(), ChatbotError> {
    if session.is_active() {
        Ok(())
    } else {
        tracing::debug!("Rejecting expired session for {}", session.username);
        Err(ChatbotError::SessionExpired(session.username.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelProvider as ProviderType;
    use crate::embedding::HashingEmbedder;
    use crate::generation::{ModelProvider, ProviderError, ProviderResponse};
    use async_trait::async_trait;
    use std::time::Duration;

    struct EchoProvider;

    #[async_trait]
    impl ModelProvider for EchoProvider {
        async fn generate(&self, prompt: &str) -> Result<ProviderResponse, ProviderError> {
            Ok(ProviderResponse {
                content: format!("  {} chars  ", prompt.len()),
                model: "echo".to_string(),
                finish_reason: Some("stop".to_string()),
            })
        }

        fn model_name(&self) -> &str {
            "echo"
        }

        fn provider_type(&self) -> ProviderType {
            ProviderType::Ollama
        }
    }

    fn service() -> ChatbotService {
        let generator = Generator::new(Arc::new(EchoProvider), Duration::from_secs(5));
        ChatbotService::new(
            Arc::new(HashingEmbedder::new(64)),
            Arc::new(generator),
            &AppConfig::default(),
        )
    }

    fn session(username: &str) -> Session {
        Session::new(username, Utc::now(), chrono::Duration::hours(24))
    }

    fn text_document(text: &str) -> Document {
        Document::new(text.as_bytes().to_vec(), "text/plain")
    }

    #[tokio::test]
    async fn test_create_and_ask() {
        let service = service();
        let request = CreateChatbotRequest::new(
            "Handbook",
            "Company handbook",
            "Witty",
            text_document("Vacation requests go through the HR portal."),
        );

        let bot = service.create_chatbot(request, &session("ana")).await.unwrap();
        assert_eq!(bot.persona, Persona::Witty);
        assert_eq!(bot.index().len(), 1);

        let result = service.ask(bot.id, "How do I request vacation?").await.unwrap();
        assert_eq!(result.passages.len(), 1);
        assert!(result.prompt.contains("HR portal"));
        assert_eq!(result.answer, format!("  {} chars  ", result.prompt.len()));
    }

    #[tokio::test]
    async fn test_question_is_passed_verbatim() {
        let service = service();
        let request = CreateChatbotRequest::new(
            "Handbook",
            "Company handbook",
            "Formal",
            text_document("Vacation requests go through the HR portal."),
        );
        let bot = service.create_chatbot(request, &session("ana")).await.unwrap();

        let result = service.ask(bot.id, "  Where do I ask?\n").await.unwrap();
        assert!(result.prompt.contains("Question:   Where do I ask?\n\n\nAnswer: "));

        assert!(matches!(
            service.ask(bot.id, " \t ").await,
            Err(ChatbotError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_expired_session_is_rejected() {
        let service = service();
        let stale = Session::new(
            "ana",
            Utc::now() - chrono::Duration::hours(25),
            chrono::Duration::hours(24),
        );
        let request = CreateChatbotRequest::new(
            "Handbook",
            "Company handbook",
            "Formal",
            text_document("Vacation requests go through the HR portal."),
        );

        let err = service.create_chatbot(request, &stale).await.unwrap_err();
        assert!(matches!(err, ChatbotError::SessionExpired(ref user) if user == "ana"));
        assert_eq!(err.user_message(), "Session expired. Please login again.");
        assert!(service.registry().is_empty().await);
        assert!(matches!(
            service.list_for(&stale).await,
            Err(ChatbotError::SessionExpired(_))
        ));
        assert!(!service.registry().is_pending("ana", "Handbook"));
    }

    #[tokio::test]
    async fn test_missing_fields() {
        let service = service();
        let request = CreateChatbotRequest::new("  ", "desc", "Formal", text_document("text"));
        assert!(matches!(
            service.create_chatbot(request, &session("ana")).await,
            Err(ChatbotError::InvalidRequest(_))
        ));

        let request = CreateChatbotRequest::new("Bot", "desc", "Formal", text_document(""));
        assert!(matches!(
            service.create_chatbot(request, &session("ana")).await,
            Err(ChatbotError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_document_size_limit() {
        let generator = Generator::new(Arc::new(EchoProvider), Duration::from_secs(5));
        let config = AppConfig {
            max_document_bytes: 16,
            ..AppConfig::default()
        };
        let service = ChatbotService::new(Arc::new(HashingEmbedder::new(64)), Arc::new(generator), &config);

        let request = CreateChatbotRequest::new(
            "Bot",
            "desc",
            "Formal",
            text_document("this text is longer than sixteen bytes"),
        );
        let err = service.create_chatbot(request, &session("ana")).await.unwrap_err();
        assert!(matches!(err, ChatbotError::DocumentTooLarge { limit: 16, .. }));
        assert_eq!(err.user_message(), "File size exceeds 16 bytes limit");
    }

    #[tokio::test]
    async fn test_blank_document_is_empty_corpus() {
        let service = service();
        let request = CreateChatbotRequest::new("Bot", "desc", "Formal", text_document(" \n\n \t"));

        assert!(matches!(
            service.create_chatbot(request, &session("ana")).await,
            Err(ChatbotError::Index(IndexError::EmptyCorpus))
        ));
        assert!(service.registry().is_empty().await);
    }

    #[tokio::test]
    async fn test_unknown_chatbot() {
        let service = service();
        let id = Uuid::new_v4();
        assert!(matches!(
            service.ask(id, "anything").await,
            Err(ChatbotError::NotFound(missing)) if missing == id
        ));
    }

    #[test]
    fn test_user_messages() {
        assert_eq!(
            ChatbotError::DocumentTooLarge {
                size: 6 * 1024 * 1024,
                limit: 5 * 1024 * 1024
            }
            .user_message(),
            "File size exceeds 5MB limit"
        );
        assert!(ChatbotError::Extract(ExtractError::UnsupportedFormat("image/png".to_string()))
            .user_message()
            .contains("image/png"));
        assert!(ChatbotError::Generation(GenerationError::Timeout(Duration::from_secs(60)))
            .user_message()
            .contains("60 seconds"));
    }
}
