//! Slot-filling intake engine.
//!
//! This crate is the "brain" of the loanbot system - the turn engine that:
//! - Extracts the four required loan fields from free-form conversation
//! - Reconciles LLM extraction output against a deterministic fallback
//! - Validates the assembled payload and finalizes the loan record
//! - Decides, each turn, whether to ask a follow-up or save
//!
//! # Architecture
//!
//! One turn is a short sequential pipeline:
//! 1. **Extraction** (`llm` / `fallback`) - transcript → `ExtractionResult`
//! 2. **Reconciliation** (`reconcile`) - merge, backstop, validate
//! 3. **Decision** (`engine`) - finalize via the loan sink or pick the
//!    next question in fixed schema order
//!
//! # Key Types
//!
//! - `IntakeEngine` - Main orchestrator (see `engine` module)
//! - `Extractor` - Pluggable trait for the LLM gateway or the rule-based
//!   offline extractor
//! - `Field` - Static schema of required fields in priority order
//!
//! # Safety Principle
//!
//! The LLM is strictly an extractor. It NEVER decides which question is
//! asked next or when a loan is saved. Those are deterministic decisions
//! made by the engine against the field schema.

pub mod engine;
pub mod extraction;
pub mod fallback;
pub mod llm;
pub mod reconcile;
pub mod schema;

pub use engine::{EngineError, IntakeEngine, TurnResult};
pub use extraction::{ExtractionAction, ExtractionResult, Extractor};
pub use fallback::RuleBasedExtractor;
pub use llm::{LlmClient, LlmExtractor, OpenAiChatClient};
pub use schema::Field;
