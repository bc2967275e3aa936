//! ragbot - persona chatbots grounded in one uploaded document
//!
//! A chatbot is built from a single PDF or plain-text document: the text is
//! extracted, split into overlapping passages, embedded into an in-memory
//! vector index, and each question is answered by a language model prompted
//! with the closest passages and the chatbot's persona.

pub mod chatbot;
pub mod config;
pub mod document;
pub mod embedding;
pub mod generation;
pub mod logging;
pub mod rag;
pub mod security;

pub use chatbot::{ChatbotError, ChatbotService, CreateChatbotRequest, QueryResult};
pub use config::AppConfig;
pub use document::{Document, ExtractError, MediaType};
pub use embedding::{Embedder, EmbeddingError};
pub use generation::{GenerationError, Generator};
pub use rag::{IndexError, Passage, Persona, ScoredPassage, VectorIndex};
