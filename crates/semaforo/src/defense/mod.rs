//! Expediente management for cases under active authority scrutiny: deadline
//! computation over a business-day calendar, document readiness, and a strictly
//! forward workflow state machine.

pub mod calendar;

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::ledger::{CaseId, RepositoryError};

/// Identifier wrapper for defense case files.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DefenseCaseId(pub String);

impl fmt::Display for DefenseCaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fixed catalog of authority act types, each with its statutory response window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActType {
    ElectronicReview,
    DomiciliaryVisit,
    DeskReview,
    RefundDenial,
    ObservationNotice,
    InvitationLetter,
    ProvisionalResolution,
}

impl ActType {
    pub const fn response_window_business_days(self) -> u32 {
        match self {
            ActType::ElectronicReview => 15,
            ActType::DomiciliaryVisit => 20,
            ActType::DeskReview => 20,
            ActType::RefundDenial => 45,
            ActType::ObservationNotice => 20,
            ActType::InvitationLetter => 10,
            ActType::ProvisionalResolution => 30,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            ActType::ElectronicReview => "electronic_review",
            ActType::DomiciliaryVisit => "domiciliary_visit",
            ActType::DeskReview => "desk_review",
            ActType::RefundDenial => "refund_denial",
            ActType::ObservationNotice => "observation_notice",
            ActType::InvitationLetter => "invitation_letter",
            ActType::ProvisionalResolution => "provisional_resolution",
        }
    }
}

/// Linear defense workflow. Resolutions are absorbing; nothing else may be skipped
/// except a direct jump to a resolution when one arrives out of band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefenseStatus {
    Received,
    Analyzing,
    Gathering,
    Drafting,
    ReadyToFile,
    Filed,
    AwaitingResolution,
    ResolvedFavorable,
    ResolvedPartial,
    ResolvedUnfavorable,
    UnderAppeal,
}

impl DefenseStatus {
    pub const fn label(self) -> &'static str {
        match self {
            DefenseStatus::Received => "received",
            DefenseStatus::Analyzing => "analyzing",
            DefenseStatus::Gathering => "gathering",
            DefenseStatus::Drafting => "drafting",
            DefenseStatus::ReadyToFile => "ready_to_file",
            DefenseStatus::Filed => "filed",
            DefenseStatus::AwaitingResolution => "awaiting_resolution",
            DefenseStatus::ResolvedFavorable => "resolved_favorable",
            DefenseStatus::ResolvedPartial => "resolved_partial",
            DefenseStatus::ResolvedUnfavorable => "resolved_unfavorable",
            DefenseStatus::UnderAppeal => "under_appeal",
        }
    }

    pub const fn is_resolution(self) -> bool {
        matches!(
            self,
            DefenseStatus::ResolvedFavorable
                | DefenseStatus::ResolvedPartial
                | DefenseStatus::ResolvedUnfavorable
        )
    }

    pub const fn is_terminal(self) -> bool {
        self.is_resolution() || matches!(self, DefenseStatus::UnderAppeal)
    }

    const fn next_in_sequence(self) -> Option<DefenseStatus> {
        match self {
            DefenseStatus::Received => Some(DefenseStatus::Analyzing),
            DefenseStatus::Analyzing => Some(DefenseStatus::Gathering),
            DefenseStatus::Gathering => Some(DefenseStatus::Drafting),
            DefenseStatus::Drafting => Some(DefenseStatus::ReadyToFile),
            DefenseStatus::ReadyToFile => Some(DefenseStatus::Filed),
            DefenseStatus::Filed => Some(DefenseStatus::AwaitingResolution),
            _ => None,
        }
    }

    fn allows(self, to: DefenseStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        if to.is_resolution() {
            // An external resolution may arrive out of band at any point.
            return true;
        }
        if self == DefenseStatus::AwaitingResolution && to == DefenseStatus::UnderAppeal {
            return true;
        }
        self.next_in_sequence() == Some(to)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentPriority {
    Critical,
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequiredDocument {
    pub code: String,
    pub priority: DocumentPriority,
    pub available: bool,
}

/// Display-only urgency classification; recomputed on read, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Critical,
    High,
    Medium,
    Normal,
}

impl Urgency {
    pub fn classify(business_days_remaining: i64) -> Self {
        if business_days_remaining <= 3 {
            Urgency::Critical
        } else if business_days_remaining <= 7 {
            Urgency::High
        } else if business_days_remaining <= 15 {
            Urgency::Medium
        } else {
            Urgency::Normal
        }
    }
}

/// Dashboard summary for deadline alerting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadlineSummary {
    pub deadline: NaiveDate,
    pub urgency: Urgency,
    pub business_days_remaining: i64,
    pub documents_ready: usize,
    pub documents_total: usize,
}

/// Errors raised by defense case operations.
#[derive(Debug, thiserror::Error)]
pub enum DefenseError {
    #[error("transition {} -> {} is not allowed", .from.label(), .to.label())]
    IllegalTransition {
        from: DefenseStatus,
        to: DefenseStatus,
    },
    #[error("unknown required document '{code}'")]
    UnknownDocument { code: String },
}

/// One defense case file ("expediente") under active authority scrutiny.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefenseCase {
    pub id: DefenseCaseId,
    pub linked_case_ids: Vec<CaseId>,
    pub act_type: ActType,
    pub notification_date: NaiveDate,
    /// Computed once at creation from the business-day calendar; corrections
    /// require a superseding case, never a silent recompute.
    pub deadline: NaiveDate,
    pub status: DefenseStatus,
    pub required_documents: Vec<RequiredDocument>,
    /// Audit link to the case this one supersedes, if any.
    pub supersedes: Option<DefenseCaseId>,
    pub created_at: DateTime<Utc>,
}

impl DefenseCase {
    pub fn open(
        id: DefenseCaseId,
        linked_case_ids: Vec<CaseId>,
        act_type: ActType,
        notification_date: NaiveDate,
        required_documents: Vec<RequiredDocument>,
    ) -> Self {
        let deadline = calendar::add_business_days(
            notification_date,
            act_type.response_window_business_days(),
        );
        info!(
            defense_id = %id,
            act_type = act_type.label(),
            %deadline,
            "defense case opened"
        );
        Self {
            id,
            linked_case_ids,
            act_type,
            notification_date,
            deadline,
            status: DefenseStatus::Received,
            required_documents,
            supersedes: None,
            created_at: Utc::now(),
        }
    }

    /// Move to the next state in sequence, or jump to an out-of-band resolution.
    pub fn advance(&mut self, to: DefenseStatus) -> Result<(), DefenseError> {
        if !self.status.allows(to) {
            return Err(DefenseError::IllegalTransition {
                from: self.status,
                to,
            });
        }
        info!(
            defense_id = %self.id,
            from = self.status.label(),
            to = to.label(),
            "defense case advanced"
        );
        self.status = to;
        Ok(())
    }

    /// Create the corrected replacement for this case. The original is left as-is;
    /// the replacement computes its own deadline and carries the audit link.
    pub fn supersede(&self, new_id: DefenseCaseId, notification_date: NaiveDate) -> DefenseCase {
        let mut replacement = DefenseCase::open(
            new_id,
            self.linked_case_ids.clone(),
            self.act_type,
            notification_date,
            self.required_documents.clone(),
        );
        replacement.supersedes = Some(self.id.clone());
        replacement
    }

    pub fn mark_document(&mut self, code: &str, available: bool) -> Result<(), DefenseError> {
        let document = self
            .required_documents
            .iter_mut()
            .find(|document| document.code == code)
            .ok_or_else(|| DefenseError::UnknownDocument {
                code: code.to_string(),
            })?;
        document.available = available;
        Ok(())
    }

    pub fn urgency(&self, today: NaiveDate) -> Urgency {
        Urgency::classify(calendar::business_days_between(today, self.deadline))
    }

    pub fn deadline_summary(&self, today: NaiveDate) -> DeadlineSummary {
        let remaining = calendar::business_days_between(today, self.deadline);
        DeadlineSummary {
            deadline: self.deadline,
            urgency: Urgency::classify(remaining),
            business_days_remaining: remaining,
            documents_ready: self
                .required_documents
                .iter()
                .filter(|document| document.available)
                .count(),
            documents_total: self.required_documents.len(),
        }
    }
}

/// Storage abstraction for defense cases, mirroring the case repository contract.
pub trait DefenseRepository: Send + Sync {
    fn insert(&self, case: DefenseCase) -> Result<(), RepositoryError>;
    fn fetch(&self, id: &DefenseCaseId) -> Result<Option<DefenseCase>, RepositoryError>;
    fn with_case<T, F>(&self, id: &DefenseCaseId, mutate: F) -> Result<T, RepositoryError>
    where
        F: FnOnce(&mut DefenseCase) -> T;
}
