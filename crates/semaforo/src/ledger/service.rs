use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::domain::{
    Case, CaseAnswer, CaseClosure, CaseId, CaseStatus, Decision, SemaphoreTransition,
};
use super::repository::{CaseRepository, CaseStatusView, RepositoryError};
use crate::catalog::{ActiveCatalog, EscalationAction, QuestionCatalog, Severity};
use crate::evaluation::{
    assess, AnswerShapeError, AnswerValue, EvaluationEngine, EvaluationInput, EvaluationOutcome,
    HardBlockFlags, LayerScores, SemaphoreColor,
};
use crate::learning::{SegmentProfile, SegmentProfileRepository};

/// Payload to open a new case before any answers arrive.
#[derive(Debug, Clone, Deserialize)]
pub struct OpenCaseRequest {
    pub subject_id: String,
    pub industry: String,
    pub service_type: String,
    pub amount: f64,
    pub counterparty_id: String,
}

/// Result of one answer upsert: the new verdict plus what this answer triggered.
#[derive(Debug, Clone, Serialize)]
pub struct AnswerOutcome {
    pub semaphore: SemaphoreColor,
    pub previous_semaphore: SemaphoreColor,
    pub changed: bool,
    pub triggered_action: EscalationAction,
    pub is_red_flag: bool,
    pub requires_review: bool,
    pub layer_scores: LayerScores,
}

/// Errors raised by ledger operations, always naming the offending field.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("case '{case_id}' not found")]
    CaseNotFound { case_id: CaseId },
    #[error("case '{case_id}' is closed as {}", .status.label())]
    CaseClosed { case_id: CaseId, status: CaseStatus },
    #[error("question '{question_id}' is not in the active catalog")]
    UnknownQuestion { question_id: String },
    #[error("question '{question_id}' does not apply to service type '{service_type}'")]
    QuestionNotApplicable {
        question_id: String,
        service_type: String,
    },
    #[error("required critical questions unanswered: {}", .missing.join(", "))]
    IncompleteCriticalQuestions { missing: Vec<String> },
    #[error(transparent)]
    Shape(#[from] AnswerShapeError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

static CASE_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_case_id() -> CaseId {
    let id = CASE_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    CaseId(format!("case-{id:06}"))
}

/// Owns the lifecycle of evaluated operations: answers accumulate, the verdict is
/// recomputed on every write, and closing freezes scores.
pub struct CaseLedger<R, P> {
    repository: Arc<R>,
    profiles: Arc<P>,
    catalog: Arc<ActiveCatalog>,
}

impl<R, P> CaseLedger<R, P>
where
    R: CaseRepository + 'static,
    P: SegmentProfileRepository + 'static,
{
    pub fn new(repository: Arc<R>, profiles: Arc<P>, catalog: Arc<ActiveCatalog>) -> Self {
        Self {
            repository,
            profiles,
            catalog,
        }
    }

    /// Open a case and compute its initial verdict from the (empty) answer set.
    pub fn open(&self, request: OpenCaseRequest) -> Result<Case, LedgerError> {
        let catalog = self.catalog.current();
        let engine = EvaluationEngine::new(catalog);
        let outcome = engine.score(&EvaluationInput {
            service_type: &request.service_type,
            answers: &BTreeMap::new(),
            profile: None,
            hard_blocks: &HardBlockFlags::default(),
        })?;

        let case = Case {
            id: next_case_id(),
            subject_id: request.subject_id,
            industry: request.industry,
            service_type: request.service_type,
            amount: request.amount,
            counterparty_id: request.counterparty_id,
            status: CaseStatus::InProgress,
            answers: BTreeMap::new(),
            block_scores: outcome.block_scores,
            layer_scores: outcome.layer_scores,
            semaphore: outcome.verdict.color,
            red_flag_count: outcome.red_flag_count,
            alert_count: outcome.alert_count,
            review_required: outcome.review_required,
            semaphore_history: Vec::new(),
            closure: None,
            opened_at: Utc::now(),
        };

        self.repository.insert(case.clone())?;
        info!(case_id = %case.id, semaphore = case.semaphore.label(), "case opened");
        Ok(case)
    }

    /// Insert or overwrite one answer, re-running the full scoring pipeline.
    pub fn upsert_answer(
        &self,
        case_id: &CaseId,
        question_id: &str,
        value: AnswerValue,
        hard_blocks: &HardBlockFlags,
    ) -> Result<AnswerOutcome, LedgerError> {
        let catalog = self.catalog.current();
        let snapshot = self.require_case(case_id)?;
        let question = catalog
            .question(question_id)
            .ok_or_else(|| LedgerError::UnknownQuestion {
                question_id: question_id.to_string(),
            })?;
        if !question.applies_to(&snapshot.service_type) {
            return Err(LedgerError::QuestionNotApplicable {
                question_id: question_id.to_string(),
                service_type: snapshot.service_type.clone(),
            });
        }

        // Validate shape and derive per-answer escalation before taking the lock.
        let assessment = assess(question, Some(&value))?;
        let profile = self.segment_profile(&snapshot)?;
        let engine = EvaluationEngine::new(catalog);

        let result = self
            .repository
            .with_case(case_id, |case| -> Result<AnswerOutcome, LedgerError> {
                if case.status.is_terminal() {
                    return Err(LedgerError::CaseClosed {
                        case_id: case.id.clone(),
                        status: case.status,
                    });
                }

                case.answers.insert(
                    question_id.to_string(),
                    CaseAnswer {
                        question_id: question_id.to_string(),
                        value: value.clone(),
                        triggered_action: assessment.action,
                        is_red_flag: assessment.is_red_flag,
                        requires_review: assessment.requires_review,
                        submitted_at: Utc::now(),
                    },
                );

                let outcome = score_case(&engine, case, profile.as_ref(), hard_blocks)?;
                let previous = case.semaphore;
                let changed = apply_outcome(case, &outcome, question_id);
                if changed {
                    info!(
                        case_id = %case.id,
                        from = previous.label(),
                        to = case.semaphore.label(),
                        trigger = question_id,
                        "semaphore changed"
                    );
                }

                Ok(AnswerOutcome {
                    semaphore: case.semaphore,
                    previous_semaphore: previous,
                    changed,
                    triggered_action: assessment.action,
                    is_red_flag: assessment.is_red_flag,
                    requires_review: assessment.requires_review,
                    layer_scores: case.layer_scores,
                })
            })
            .map_err(|err| map_repository(case_id, err))?;

        result
    }

    /// Bulk upsert used for batch re-scoring, e.g. after a catalog upgrade.
    pub fn evaluate(
        &self,
        case_id: &CaseId,
        answers: Vec<(String, AnswerValue)>,
        hard_blocks: &HardBlockFlags,
    ) -> Result<EvaluationOutcome, LedgerError> {
        let catalog = self.catalog.current();
        let snapshot = self.require_case(case_id)?;

        let mut assessed = Vec::with_capacity(answers.len());
        for (question_id, value) in answers {
            let question =
                catalog
                    .question(&question_id)
                    .ok_or_else(|| LedgerError::UnknownQuestion {
                        question_id: question_id.clone(),
                    })?;
            if !question.applies_to(&snapshot.service_type) {
                return Err(LedgerError::QuestionNotApplicable {
                    question_id,
                    service_type: snapshot.service_type.clone(),
                });
            }
            let assessment = assess(question, Some(&value))?;
            assessed.push((question_id, value, assessment));
        }

        let profile = self.segment_profile(&snapshot)?;
        let engine = EvaluationEngine::new(catalog);

        self.repository
            .with_case(case_id, |case| -> Result<EvaluationOutcome, LedgerError> {
                if case.status.is_terminal() {
                    return Err(LedgerError::CaseClosed {
                        case_id: case.id.clone(),
                        status: case.status,
                    });
                }

                let submitted_at = Utc::now();
                for (question_id, value, assessment) in assessed {
                    case.answers.insert(
                        question_id.clone(),
                        CaseAnswer {
                            question_id,
                            value,
                            triggered_action: assessment.action,
                            is_red_flag: assessment.is_red_flag,
                            requires_review: assessment.requires_review,
                            submitted_at,
                        },
                    );
                }

                let outcome = score_case(&engine, case, profile.as_ref(), hard_blocks)?;
                apply_outcome(case, &outcome, "bulk_evaluation");
                Ok(outcome)
            })
            .map_err(|err| map_repository(case_id, err))?
    }

    /// Close the case with an explicit decision, freezing scores.
    ///
    /// Refused while any applicable required critical question remains unanswered.
    pub fn close(
        &self,
        case_id: &CaseId,
        decision: Decision,
        reasoning: String,
    ) -> Result<Case, LedgerError> {
        let catalog = self.catalog.current();

        let closed = self
            .repository
            .with_case(case_id, |case| -> Result<Case, LedgerError> {
                if case.status.is_terminal() {
                    return Err(LedgerError::CaseClosed {
                        case_id: case.id.clone(),
                        status: case.status,
                    });
                }

                let missing = open_critical_gaps(case, &catalog);
                if !missing.is_empty() {
                    return Err(LedgerError::IncompleteCriticalQuestions { missing });
                }

                let status = decision.resulting_status();
                case.status = status;
                case.closure = Some(CaseClosure {
                    decision,
                    reasoning,
                    closed_at: Utc::now(),
                });
                case.semaphore_history.push(SemaphoreTransition {
                    from: case.semaphore,
                    to: case.semaphore,
                    layers_before: case.layer_scores,
                    layers_after: case.layer_scores,
                    trigger: format!("close:{}", status.label()),
                    at: Utc::now(),
                });
                Ok(case.clone())
            })
            .map_err(|err| map_repository(case_id, err))??;

        info!(
            case_id = %closed.id,
            status = closed.status.label(),
            semaphore = closed.semaphore.label(),
            "case closed"
        );
        Ok(closed)
    }

    /// Required critical questions still unanswered for the case's service type.
    pub fn list_open_critical_gaps(&self, case_id: &CaseId) -> Result<Vec<String>, LedgerError> {
        let catalog = self.catalog.current();
        let case = self.require_case(case_id)?;
        Ok(open_critical_gaps(&case, &catalog))
    }

    pub fn get(&self, case_id: &CaseId) -> Result<Case, LedgerError> {
        self.require_case(case_id)
    }

    pub fn status_view(&self, case_id: &CaseId) -> Result<CaseStatusView, LedgerError> {
        let catalog = self.catalog.current();
        let case = self.require_case(case_id)?;
        Ok(CaseStatusView {
            case_id: case.id.clone(),
            status: case.status.label(),
            semaphore: case.semaphore.label(),
            layer_scores: case.layer_scores,
            red_flag_count: case.red_flag_count,
            alert_count: case.alert_count,
            open_critical_gaps: open_critical_gaps(&case, &catalog),
        })
    }

    fn require_case(&self, case_id: &CaseId) -> Result<Case, LedgerError> {
        self.repository
            .fetch(case_id)?
            .ok_or_else(|| LedgerError::CaseNotFound {
                case_id: case_id.clone(),
            })
    }

    fn segment_profile(&self, case: &Case) -> Result<Option<SegmentProfile>, LedgerError> {
        Ok(self.profiles.fetch(&case.segment())?)
    }
}

fn map_repository(case_id: &CaseId, err: RepositoryError) -> LedgerError {
    match err {
        RepositoryError::NotFound => LedgerError::CaseNotFound {
            case_id: case_id.clone(),
        },
        other => LedgerError::Repository(other),
    }
}

fn score_case(
    engine: &EvaluationEngine,
    case: &Case,
    profile: Option<&SegmentProfile>,
    hard_blocks: &HardBlockFlags,
) -> Result<EvaluationOutcome, LedgerError> {
    let answers: BTreeMap<String, AnswerValue> = case
        .answers
        .iter()
        .map(|(id, answer)| (id.clone(), answer.value.clone()))
        .collect();

    Ok(engine.score(&EvaluationInput {
        service_type: &case.service_type,
        answers: &answers,
        profile,
        hard_blocks,
    })?)
}

/// Write the computed outcome onto the case. Appends a history entry only when the
/// color actually changed, so unchanged recomputations are idempotent no-ops.
fn apply_outcome(case: &mut Case, outcome: &EvaluationOutcome, trigger: &str) -> bool {
    let previous = case.semaphore;
    let layers_before = case.layer_scores;

    case.block_scores = outcome.block_scores.clone();
    case.layer_scores = outcome.layer_scores;
    case.red_flag_count = outcome.red_flag_count;
    case.alert_count = outcome.alert_count;
    case.review_required = outcome.review_required.clone();
    case.semaphore = outcome.verdict.color;

    let changed = previous != case.semaphore;
    if changed {
        case.semaphore_history.push(SemaphoreTransition {
            from: previous,
            to: case.semaphore,
            layers_before,
            layers_after: case.layer_scores,
            trigger: trigger.to_string(),
            at: Utc::now(),
        });
    }
    changed
}

fn open_critical_gaps(case: &Case, catalog: &QuestionCatalog) -> Vec<String> {
    catalog
        .applicable(&case.service_type)
        .filter(|question| question.required && question.severity == Severity::Critical)
        .filter(|question| {
            // A stored answer with no substance is still an open gap.
            match case.answers.get(&question.id) {
                Some(answer) => answer.value.is_blank(),
                None => true,
            }
        })
        .map(|question| question.id.clone())
        .collect()
}
