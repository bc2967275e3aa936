//! Persona prompt templates
//!
//! Each persona contributes one fixed instruction line. The rest of the
//! template is shared: it grounds the model in the retrieved context and tells
//! it to say so when the context does not hold the answer.

use crate::rag::chunker::Passage;
use serde::{Deserialize, Serialize};
use std::fmt;

const CONTEXT_SLOT: &str = "{context}";
const QUESTION_SLOT: &str = "{question}";

/// Rendered in place of the context block when nothing was retrieved
pub const NO_CONTEXT: &str = "No context provided.";

/// Response style of a chatbot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Persona {
    Friendly,
    #[default]
    Formal,
    Witty,
}

impl Persona {
    pub const ALL: [Persona; 3] = [Persona::Friendly, Persona::Formal, Persona::Witty];

    /// Resolve a persona by name, case-insensitively.
    /// Unrecognised names fall back to [`Persona::Formal`].
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "friendly" => Self::Friendly,
            "formal" => Self::Formal,
            "witty" => Self::Witty,
            other => {
                tracing::debug!("Unknown persona '{}', using Formal", other);
                Self::Formal
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Friendly => "Friendly",
            Self::Formal => "Formal",
            Self::Witty => "Witty",
        }
    }

    /// Fixed instruction text for this persona
    pub fn instruction(&self) -> &'static str {
        match self {
            Self::Friendly => {
                "You are a friendly and helpful assistant. Respond in a casual, approachable manner."
            }
            Self::Formal => {
                "You are a professional and formal assistant. Maintain a business-appropriate tone."
            }
            Self::Witty => {
                "You are a witty and clever assistant with a good sense of humor. Include appropriate jokes or wordplay."
            }
        }
    }
}

impl fmt::Display for Persona {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persona's prompt template with `{context}` and `{question}` slots
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    persona: Persona,
    template: String,
}

impl PromptTemplate {
    pub fn for_persona(persona: Persona) -> Self {
        let template = format!(
            "{}\n\n\
             Using the following context information, please answer the question. \
             If the answer cannot be found in the context, say so.\n\n\
             Context:\n{}\n\n\
             Question: {}\n\n\
             Answer: ",
            persona.instruction(),
            CONTEXT_SLOT,
            QUESTION_SLOT
        );

        Self { persona, template }
    }

    pub fn persona(&self) -> Persona {
        self.persona
    }

    /// Template text with the slots still in place
    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Fill the slots. Only the template is scanned for slots, so braces
    /// inside passages or the question are copied verbatim.
    pub fn render(&self, passages: &[Passage], question: &str) -> String {
        let context = context_block(passages);
        let context = if context.is_empty() { NO_CONTEXT } else { context.as_str() };

        let mut prompt = String::with_capacity(self.template.len() + context.len() + question.len());
        let mut rest = self.template.as_str();

        while let Some((pos, slot)) = next_slot(rest) {
            prompt.push_str(&rest[..pos]);
            prompt.push_str(if slot == CONTEXT_SLOT { context } else { question });
            rest = &rest[pos + slot.len()..];
        }
        prompt.push_str(rest);

        prompt
    }
}

fn next_slot(text: &str) -> Option<(usize, &'static str)> {
    [CONTEXT_SLOT, QUESTION_SLOT]
        .into_iter()
        .filter_map(|slot| text.find(slot).map(|pos| (pos, slot)))
        .min_by_key(|(pos, _)| *pos)
}

/// Passage texts in retrieval order, separated by a blank line
pub fn context_block(passages: &[Passage]) -> String {
    passages
        .iter()
        .map(|p| p.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Assemble the grounded prompt for a question. Pure and total.
pub fn build_prompt(persona: Persona, passages: &[Passage], question: &str) -> String {
    PromptTemplate::for_persona(persona).render(passages, question)
}
