use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::{Block, EscalationAction};
use crate::evaluation::{AnswerValue, LayerScores, SemaphoreColor};

/// Identifier wrapper for evaluated operations ("huellas").
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CaseId(pub String);

impl fmt::Display for CaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Case lifecycle; approved/rejected/cancelled are terminal and freeze scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    InProgress,
    Approved,
    Rejected,
    Cancelled,
}

impl CaseStatus {
    pub const fn label(self) -> &'static str {
        match self {
            CaseStatus::InProgress => "in_progress",
            CaseStatus::Approved => "approved",
            CaseStatus::Rejected => "rejected",
            CaseStatus::Cancelled => "cancelled",
        }
    }

    pub const fn is_terminal(self) -> bool {
        !matches!(self, CaseStatus::InProgress)
    }
}

/// Explicit decision that closes a case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approve,
    Reject,
    Cancel,
}

impl Decision {
    pub const fn resulting_status(self) -> CaseStatus {
        match self {
            Decision::Approve => CaseStatus::Approved,
            Decision::Reject => CaseStatus::Rejected,
            Decision::Cancel => CaseStatus::Cancelled,
        }
    }
}

/// Monetary band used as the third component of the segment key.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum AmountBand {
    UpTo100K,
    UpTo1M,
    UpTo10M,
    UpTo50M,
    Above50M,
}

impl AmountBand {
    pub fn from_amount(amount: f64) -> Self {
        if amount <= 100_000.0 {
            AmountBand::UpTo100K
        } else if amount <= 1_000_000.0 {
            AmountBand::UpTo1M
        } else if amount <= 10_000_000.0 {
            AmountBand::UpTo10M
        } else if amount <= 50_000_000.0 {
            AmountBand::UpTo50M
        } else {
            AmountBand::Above50M
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            AmountBand::UpTo100K => "lte_100k",
            AmountBand::UpTo1M => "100k_to_1m",
            AmountBand::UpTo10M => "1m_to_10m",
            AmountBand::UpTo50M => "10m_to_50m",
            AmountBand::Above50M => "gt_50m",
        }
    }
}

/// Grouping key for historical outcomes: industry x service type x amount band.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SegmentKey {
    pub industry: String,
    pub service_type: String,
    pub amount_band: AmountBand,
}

impl fmt::Display for SegmentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{}|{}",
            self.industry,
            self.service_type,
            self.amount_band.label()
        )
    }
}

/// One stored answer together with its derived escalation state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseAnswer {
    pub question_id: String,
    pub value: AnswerValue,
    pub triggered_action: EscalationAction,
    pub is_red_flag: bool,
    pub requires_review: bool,
    pub submitted_at: DateTime<Utc>,
}

/// Append-only record of one semaphore color change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemaphoreTransition {
    pub from: SemaphoreColor,
    pub to: SemaphoreColor,
    pub layers_before: LayerScores,
    pub layers_after: LayerScores,
    /// Reference to the evidence that caused the change (question id or close action).
    pub trigger: String,
    pub at: DateTime<Utc>,
}

/// Final decision metadata recorded when a case reaches a terminal status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseClosure {
    pub decision: Decision,
    pub reasoning: String,
    pub closed_at: DateTime<Utc>,
}

/// One evaluated business operation and its full deliberation state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Case {
    pub id: CaseId,
    pub subject_id: String,
    pub industry: String,
    pub service_type: String,
    pub amount: f64,
    pub counterparty_id: String,
    pub status: CaseStatus,
    pub answers: BTreeMap<String, CaseAnswer>,
    pub block_scores: BTreeMap<Block, f64>,
    pub layer_scores: LayerScores,
    pub semaphore: SemaphoreColor,
    pub red_flag_count: u32,
    pub alert_count: u32,
    pub review_required: Vec<String>,
    pub semaphore_history: Vec<SemaphoreTransition>,
    pub closure: Option<CaseClosure>,
    pub opened_at: DateTime<Utc>,
}

impl Case {
    pub fn segment(&self) -> SegmentKey {
        SegmentKey {
            industry: self.industry.clone(),
            service_type: self.service_type.clone(),
            amount_band: AmountBand::from_amount(self.amount),
        }
    }
}
