//! Case ("huella") lifecycle: answers accumulate, the verdict is recomputed on
//! every write, closing freezes scores, and the semaphore history stays append-only.

pub mod domain;
pub mod repository;
pub mod service;

#[cfg(test)]
mod tests;

pub use domain::{
    AmountBand, Case, CaseAnswer, CaseClosure, CaseId, CaseStatus, Decision, SegmentKey,
    SemaphoreTransition,
};
pub use repository::{CaseRepository, CaseStatusView, RepositoryError};
pub use service::{AnswerOutcome, CaseLedger, LedgerError, OpenCaseRequest};
