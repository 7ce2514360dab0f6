//! Adaptive feedback loop: closed-case outcomes update per-segment risk profiles.
//!
//! Learning here means counters and derived statistics, not model training. New
//! patterns arrive as inert candidates and only start influencing scoring after an
//! explicit promotion step, so the loop cannot silently drift verdicts.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::ledger::{CaseId, CaseRepository, CaseStatus, RepositoryError, SegmentKey};

/// A curated rule active in one of the profile's pattern lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnedPattern {
    pub id: String,
    pub description: String,
    /// Question this pattern keys on, when it keys on one.
    pub question_id: Option<String>,
    pub times_applied: u32,
    pub times_successful: u32,
}

/// A raw pattern observed in outcomes but not yet curated into an active list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidatePattern {
    pub id: String,
    pub description: String,
    pub question_id: Option<String>,
    pub observations: u32,
    pub first_seen: DateTime<Utc>,
}

/// Which active list a candidate is promoted into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternList {
    MinimumEvidence,
    FrequentObjections,
    SuccessPatterns,
    Alerts,
}

/// Real-world resolution of a closed case, reported by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservedOutcome {
    Favorable,
    Partial,
    Unfavorable,
}

impl ObservedOutcome {
    pub const fn label(self) -> &'static str {
        match self {
            ObservedOutcome::Favorable => "favorable",
            ObservedOutcome::Partial => "partial",
            ObservedOutcome::Unfavorable => "unfavorable",
        }
    }
}

/// Adaptive prior for one (industry, service type, amount band) segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentProfile {
    pub segment: SegmentKey,
    pub total_cases: u64,
    pub approved_cases: u64,
    pub rejected_cases: u64,
    pub average_approved_score: f64,
    pub minimum_evidence_patterns: Vec<LearnedPattern>,
    pub frequent_objections: Vec<LearnedPattern>,
    pub success_patterns: Vec<LearnedPattern>,
    pub alerts: Vec<LearnedPattern>,
    pub candidates: Vec<CandidatePattern>,
    /// Optimistic-concurrency version, bumped by the store on every write.
    pub version: u64,
}

impl SegmentProfile {
    pub fn empty(segment: SegmentKey) -> Self {
        Self {
            segment,
            total_cases: 0,
            approved_cases: 0,
            rejected_cases: 0,
            average_approved_score: 0.0,
            minimum_evidence_patterns: Vec::new(),
            frequent_objections: Vec::new(),
            success_patterns: Vec::new(),
            alerts: Vec::new(),
            candidates: Vec::new(),
            version: 0,
        }
    }

    fn list_mut(&mut self, list: PatternList) -> &mut Vec<LearnedPattern> {
        match list {
            PatternList::MinimumEvidence => &mut self.minimum_evidence_patterns,
            PatternList::FrequentObjections => &mut self.frequent_objections,
            PatternList::SuccessPatterns => &mut self.success_patterns,
            PatternList::Alerts => &mut self.alerts,
        }
    }
}

/// Storage abstraction for segment profiles.
///
/// `put` must reject a write whose `expected_version` no longer matches the stored
/// profile, so increments are never applied over stale reads.
pub trait SegmentProfileRepository: Send + Sync {
    fn fetch(&self, segment: &SegmentKey) -> Result<Option<SegmentProfile>, RepositoryError>;
    fn put(&self, profile: SegmentProfile, expected_version: u64) -> Result<(), RepositoryError>;
}

/// Errors raised by the feedback learner.
#[derive(Debug, thiserror::Error)]
pub enum LearningError {
    #[error("case '{case_id}' not found")]
    CaseNotFound { case_id: CaseId },
    #[error("case '{case_id}' is still {} and cannot feed learning", .status.label())]
    CaseStillOpen { case_id: CaseId, status: CaseStatus },
    #[error("segment '{segment}' has no profile")]
    UnknownSegment { segment: SegmentKey },
    #[error("candidate '{candidate_id}' not found in segment profile")]
    UnknownCandidate { candidate_id: String },
    #[error("candidate '{candidate_id}' has {observations} observation(s), {required} required")]
    InsufficientObservations {
        candidate_id: String,
        observations: u32,
        required: u32,
    },
    #[error("profile update contended after {attempts} attempts")]
    Contention { attempts: u32 },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

const MAX_WRITE_ATTEMPTS: u32 = 5;
const MIN_PROMOTION_OBSERVATIONS: u32 = 3;

/// Ingests closed-case outcomes and maintains segment profiles. Never mutates
/// historical cases and never writes through the scoring path.
pub struct FeedbackLearner<R, P> {
    cases: Arc<R>,
    profiles: Arc<P>,
}

impl<R, P> FeedbackLearner<R, P>
where
    R: CaseRepository + 'static,
    P: SegmentProfileRepository + 'static,
{
    pub fn new(cases: Arc<R>, profiles: Arc<P>) -> Self {
        Self { cases, profiles }
    }

    /// Record the real-world outcome of a terminal case into its segment profile.
    ///
    /// Counter updates retry on version conflicts up to a bounded count, then
    /// surface as contention for the caller to retry at a higher level.
    pub fn record_outcome(
        &self,
        case_id: &CaseId,
        outcome: ObservedOutcome,
        was_correct: bool,
    ) -> Result<SegmentProfile, LearningError> {
        let case = self
            .cases
            .fetch(case_id)?
            .ok_or_else(|| LearningError::CaseNotFound {
                case_id: case_id.clone(),
            })?;
        if !case.status.is_terminal() {
            return Err(LearningError::CaseStillOpen {
                case_id: case.id.clone(),
                status: case.status,
            });
        }

        let segment = case.segment();
        let overall_score = (case.layer_scores.formal
            + case.layer_scores.materiality
            + case.layer_scores.business_purpose)
            / 3.0;

        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let mut profile = self
                .profiles
                .fetch(&segment)?
                .unwrap_or_else(|| SegmentProfile::empty(segment.clone()));
            let expected_version = profile.version;

            profile.total_cases += 1;
            match case.status {
                CaseStatus::Approved => {
                    profile.approved_cases += 1;
                    // Running mean over approved cases only.
                    let count = profile.approved_cases as f64;
                    profile.average_approved_score +=
                        (overall_score - profile.average_approved_score) / count;
                }
                CaseStatus::Rejected => profile.rejected_cases += 1,
                CaseStatus::Cancelled | CaseStatus::InProgress => {}
            }

            if !was_correct {
                note_candidates(&mut profile, &case, outcome);
            }

            match self.profiles.put(profile.clone(), expected_version) {
                Ok(()) => {
                    info!(
                        %segment,
                        case_id = %case.id,
                        outcome = outcome.label(),
                        was_correct,
                        "outcome recorded"
                    );
                    profile.version = expected_version + 1;
                    return Ok(profile);
                }
                Err(RepositoryError::Conflict) => {
                    warn!(%segment, attempt, "profile write contended, retrying");
                }
                Err(other) => return Err(LearningError::Repository(other)),
            }
        }

        Err(LearningError::Contention {
            attempts: MAX_WRITE_ATTEMPTS,
        })
    }

    /// Promote an observed candidate into an active pattern list.
    ///
    /// Explicit and gated: a candidate needs at least three distinct observations,
    /// and nothing promotes automatically.
    pub fn promote_candidate(
        &self,
        segment: &SegmentKey,
        candidate_id: &str,
        target: PatternList,
    ) -> Result<SegmentProfile, LearningError> {
        for _ in 1..=MAX_WRITE_ATTEMPTS {
            let mut profile =
                self.profiles
                    .fetch(segment)?
                    .ok_or_else(|| LearningError::UnknownSegment {
                        segment: segment.clone(),
                    })?;
            let expected_version = profile.version;

            let position = profile
                .candidates
                .iter()
                .position(|candidate| candidate.id == candidate_id)
                .ok_or_else(|| LearningError::UnknownCandidate {
                    candidate_id: candidate_id.to_string(),
                })?;

            let candidate = &profile.candidates[position];
            if candidate.observations < MIN_PROMOTION_OBSERVATIONS {
                return Err(LearningError::InsufficientObservations {
                    candidate_id: candidate.id.clone(),
                    observations: candidate.observations,
                    required: MIN_PROMOTION_OBSERVATIONS,
                });
            }

            let candidate = profile.candidates.remove(position);
            profile.list_mut(target).push(LearnedPattern {
                id: candidate.id,
                description: candidate.description,
                question_id: candidate.question_id,
                times_applied: 0,
                times_successful: 0,
            });

            match self.profiles.put(profile.clone(), expected_version) {
                Ok(()) => {
                    info!(%segment, candidate_id, ?target, "candidate promoted");
                    profile.version = expected_version + 1;
                    return Ok(profile);
                }
                Err(RepositoryError::Conflict) => continue,
                Err(other) => return Err(LearningError::Repository(other)),
            }
        }

        Err(LearningError::Contention {
            attempts: MAX_WRITE_ATTEMPTS,
        })
    }
}

/// Derive candidate objection patterns from the case's red flags when the verdict
/// turned out wrong. Repeat sightings bump the observation counter instead of
/// duplicating the candidate.
fn note_candidates(
    profile: &mut SegmentProfile,
    case: &crate::ledger::Case,
    outcome: ObservedOutcome,
) {
    for answer in case.answers.values().filter(|answer| answer.is_red_flag) {
        let candidate_id = format!("cand-{}", answer.question_id);
        if let Some(existing) = profile
            .candidates
            .iter_mut()
            .find(|candidate| candidate.id == candidate_id)
        {
            existing.observations += 1;
            continue;
        }
        profile.candidates.push(CandidatePattern {
            id: candidate_id,
            description: format!(
                "red flag on {} preceded a {} outcome",
                answer.question_id,
                outcome.label()
            ),
            question_id: Some(answer.question_id.clone()),
            observations: 1,
            first_seen: Utc::now(),
        });
    }
}
