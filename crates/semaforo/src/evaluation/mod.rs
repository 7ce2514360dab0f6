//! Deterministic scoring pipeline: per-answer assessment, block and layer
//! aggregation, and the semaphore verdict.

mod answers;
mod layers;
mod semaphore;

pub use answers::{assess, AnswerAssessment, AnswerShapeError, AnswerValue};
pub use layers::LayerScores;
pub use semaphore::{
    resolve, HardBlockFlags, HardBlockReason, SemaphoreColor, Verdict, VerdictReason,
};

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::catalog::{Block, EscalationAction, QuestionCatalog};
use crate::learning::SegmentProfile;

/// Escalation raised by a specific question during an evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggeredFlag {
    pub question_id: String,
    pub action: EscalationAction,
}

impl TriggeredFlag {
    pub fn label(&self) -> String {
        format!("{}:{}", self.action.label(), self.question_id)
    }
}

/// Everything the scorer needs for one pass over a case.
pub struct EvaluationInput<'a> {
    pub service_type: &'a str,
    pub answers: &'a BTreeMap<String, AnswerValue>,
    /// Read-only segment prior; `None` when the segment has no history yet.
    pub profile: Option<&'a SegmentProfile>,
    pub hard_blocks: &'a HardBlockFlags,
}

/// Full result of scoring a case: auditable and reproducible from its inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationOutcome {
    pub block_scores: BTreeMap<Block, f64>,
    pub layer_scores: LayerScores,
    pub verdict: Verdict,
    pub triggered_flags: Vec<TriggeredFlag>,
    pub red_flag_count: u32,
    pub alert_count: u32,
    pub review_required: Vec<String>,
}

/// Stateless evaluator applying one catalog version to a case's answers.
pub struct EvaluationEngine {
    catalog: Arc<QuestionCatalog>,
}

impl EvaluationEngine {
    pub fn new(catalog: Arc<QuestionCatalog>) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &QuestionCatalog {
        &self.catalog
    }

    /// Score every applicable question, aggregate, and resolve the verdict.
    ///
    /// Pure with respect to its inputs: repeated calls over the same answers,
    /// profile snapshot, and hard blocks return identical outcomes.
    pub fn score(&self, input: &EvaluationInput<'_>) -> Result<EvaluationOutcome, AnswerShapeError> {
        let mut assessments: BTreeMap<String, AnswerAssessment> = BTreeMap::new();
        let mut triggered_flags = Vec::new();
        let mut red_flag_count = 0;
        let mut alert_count = 0;
        let mut review_required = Vec::new();

        for question in self.catalog.applicable(input.service_type) {
            let assessment = assess(question, input.answers.get(&question.id))?;
            if assessment.action != EscalationAction::LearnOnly {
                triggered_flags.push(TriggeredFlag {
                    question_id: question.id.clone(),
                    action: assessment.action,
                });
            }
            if assessment.is_red_flag {
                red_flag_count += 1;
            }
            if assessment.action == EscalationAction::Alert {
                alert_count += 1;
            }
            if assessment.requires_review {
                review_required.push(question.id.clone());
            }
            assessments.insert(question.id.clone(), assessment);
        }

        triggered_flags.sort_by_key(|flag| (flag.action.priority(), flag.question_id.clone()));

        let mut scores = layers::block_scores(&self.catalog, input.service_type, &assessments);
        let layer_scores = match input.profile {
            Some(profile) => {
                let unadjusted = layers::layer_scores(&scores, &self.catalog.weights);
                layers::apply_segment_prior(&mut scores, profile, &assessments, &self.catalog);
                let mut adjusted = layers::layer_scores(&scores, &self.catalog.weights);
                layers::clamp_layers_to_band(&mut adjusted, &unadjusted, &self.catalog.weights);
                adjusted
            }
            None => layers::layer_scores(&scores, &self.catalog.weights),
        };
        let verdict = resolve(
            &layer_scores,
            red_flag_count,
            input.hard_blocks,
            &self.catalog.weights,
        );

        Ok(EvaluationOutcome {
            block_scores: scores
                .into_iter()
                .filter_map(|(block, score)| score.map(|value| (block, value)))
                .collect(),
            layer_scores,
            verdict,
            triggered_flags,
            red_flag_count,
            alert_count,
            review_required,
        })
    }
}
