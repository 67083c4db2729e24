use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};

use loanbot_core::domain::conversation::Message;

use crate::schema::{self, FIELD_ORDER};

/// What the extraction source wants the engine to do next. The engine
/// treats this as advisory: question selection and the save decision are
/// recomputed deterministically either way.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionAction {
    Ask,
    Save,
}

/// Structured output of one extraction pass over the transcript. Never
/// persisted; consumed by the reconciler within the same turn.
#[derive(Clone, Debug, Deserialize)]
pub struct ExtractionResult {
    pub action: ExtractionAction,
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default)]
    pub missing: Vec<String>,
    #[serde(default)]
    pub collected: Map<String, Value>,
}

impl ExtractionResult {
    /// The explicit degraded variant: ask again for every field. Used when
    /// externally sourced output does not match the expected shape.
    pub fn ask_everything() -> Self {
        Self {
            action: ExtractionAction::Ask,
            question: Some("Can you clarify the last detail?".to_string()),
            missing: FIELD_ORDER.iter().map(|field| field.name().to_string()).collect(),
            collected: Map::new(),
        }
    }

    /// Parses model output. Shape-variable input degrades to
    /// `ask_everything` rather than an error path.
    pub fn parse(content: &str) -> Self {
        serde_json::from_str(content.trim()).unwrap_or_else(|_| Self::ask_everything())
    }

    pub fn ask_for(missing: Vec<schema::Field>, collected: Map<String, Value>) -> Self {
        let question = missing.first().map(|field| field.prompt().to_string());
        Self {
            action: ExtractionAction::Ask,
            question,
            missing: schema::field_names(&missing),
            collected,
        }
    }

    pub fn save(collected: Map<String, Value>) -> Self {
        Self { action: ExtractionAction::Save, question: None, missing: Vec::new(), collected }
    }
}

/// Converts a conversational transcript into an extraction result. The
/// contract is infallible: implementations must always produce a usable
/// result, degrading internally on any failure.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, transcript: &[Message]) -> ExtractionResult;
}
