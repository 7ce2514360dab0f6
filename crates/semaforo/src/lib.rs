//! Risk evaluation and deliberation engine for fiscal compliance reviews.
//!
//! The engine turns structured answers about a business operation into a weighted,
//! layered risk score, a traffic-light verdict with escalation actions, and an
//! adaptive per-segment feedback loop. It consumes already-extracted structured
//! values and produces deterministic, auditable scores; free-text interpretation,
//! document handling, and persistence technology live with collaborators behind
//! the repository traits defined here.

pub mod catalog;
pub mod config;
pub mod defense;
pub mod evaluation;
pub mod ledger;
pub mod learning;
pub mod telemetry;

pub use catalog::{ActiveCatalog, CatalogError, QuestionCatalog};
pub use evaluation::{EvaluationEngine, EvaluationOutcome, HardBlockFlags, SemaphoreColor};
pub use ledger::{Case, CaseId, CaseLedger, LedgerError};
pub use learning::{FeedbackLearner, LearningError, SegmentProfile};
