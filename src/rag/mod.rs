//! Retrieval-augmented generation core
//!
//! - [`chunker`] - boundary-aware overlapping passages
//! - [`index`] - per-chatbot vector index and top-k search
//! - [`prompt`] - persona templates and grounded prompt assembly

pub mod chunker;
pub mod index;
pub mod prompt;

pub use chunker::{chunk, reassemble, Chunks, Passage};
pub use index::{IndexError, ScoredPassage, VectorIndex, DEFAULT_TOP_K};
pub use prompt::{build_prompt, context_block, Persona, PromptTemplate, NO_CONTEXT};
