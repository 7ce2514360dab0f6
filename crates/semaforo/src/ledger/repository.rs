use serde::Serialize;

use super::domain::{Case, CaseId};
use crate::evaluation::LayerScores;

/// Storage abstraction for cases so the ledger can be exercised in isolation.
///
/// `with_case` must serialize concurrent mutations of the same case while leaving
/// distinct cases free to proceed in parallel.
pub trait CaseRepository: Send + Sync {
    fn insert(&self, case: Case) -> Result<(), RepositoryError>;
    fn fetch(&self, id: &CaseId) -> Result<Option<Case>, RepositoryError>;
    fn with_case<T, F>(&self, id: &CaseId, mutate: F) -> Result<T, RepositoryError>
    where
        F: FnOnce(&mut Case) -> T;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Sanitized representation of a case's exposed status.
#[derive(Debug, Clone, Serialize)]
pub struct CaseStatusView {
    pub case_id: CaseId,
    pub status: &'static str,
    pub semaphore: &'static str,
    pub layer_scores: LayerScores,
    pub red_flag_count: u32,
    pub alert_count: u32,
    pub open_critical_gaps: Vec<String>,
}
