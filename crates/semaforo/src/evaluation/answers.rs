use serde::{Deserialize, Serialize};

use crate::catalog::{AnswerType, EscalationAction, Question};

/// Raw answer payload, already typed upstream by the intake layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerValue {
    Text(String),
    Selection(usize),
    Selections(Vec<usize>),
    Numeric(f64),
}

impl AnswerValue {
    pub const fn kind(&self) -> &'static str {
        match self {
            AnswerValue::Text(_) => "text",
            AnswerValue::Selection(_) => "selection",
            AnswerValue::Selections(_) => "selections",
            AnswerValue::Numeric(_) => "numeric",
        }
    }

    /// Blank text carries no content and counts as unanswered. Shape checking
    /// confines `Text` values to text-typed questions, so this is the only
    /// payload that can be present yet substantively missing.
    pub fn is_blank(&self) -> bool {
        matches!(self, AnswerValue::Text(text) if text.trim().is_empty())
    }
}

/// Outcome of assessing one answer against its catalog definition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnswerAssessment {
    pub action: EscalationAction,
    pub negative: bool,
    pub missing: bool,
    pub is_red_flag: bool,
    pub requires_review: bool,
}

impl AnswerAssessment {
    fn from_action(action: EscalationAction, negative: bool, missing: bool) -> Self {
        Self {
            action,
            negative,
            missing,
            is_red_flag: action == EscalationAction::RedFlag,
            requires_review: matches!(
                action,
                EscalationAction::RedFlag | EscalationAction::ForcedReview
            ),
        }
    }

    fn quiet() -> Self {
        Self::from_action(EscalationAction::LearnOnly, false, false)
    }
}

/// Answer payload does not match the question's declared answer type.
#[derive(Debug, thiserror::Error)]
pub enum AnswerShapeError {
    #[error("question '{question_id}' expects {expected:?}, received a {found} value")]
    TypeMismatch {
        question_id: String,
        expected: AnswerType,
        found: &'static str,
    },
    #[error("question '{question_id}' option index {index} exceeds {options} options")]
    OptionOutOfRange {
        question_id: String,
        index: usize,
        options: usize,
    },
}

/// Assess one answer (or its absence) against the question definition.
///
/// Resubmitting an answer re-runs this from scratch; there is no incremental state.
pub fn assess(
    question: &Question,
    value: Option<&AnswerValue>,
) -> Result<AnswerAssessment, AnswerShapeError> {
    // Shape errors always win over the missing classification: a blank text
    // payload on a choice question is a mismatch, not an unanswered question.
    if let Some(value) = value {
        check_shape(question, value)?;
    }

    if value.map_or(true, AnswerValue::is_blank) {
        if question.required {
            return Ok(AnswerAssessment::from_action(
                question.action_if_incomplete,
                false,
                true,
            ));
        }
        return Ok(AnswerAssessment::quiet());
    }

    let value = value.ok_or_else(|| unreachable_shape(question))?;

    match classify(question, value) {
        Classification::Negative => Ok(AnswerAssessment::from_action(
            question.action_if_negative,
            true,
            false,
        )),
        // Crossed the alert threshold without reaching the critical one: escalate an
        // alert, but the answer still counts as positive for scoring.
        Classification::AlertBand => Ok(AnswerAssessment::from_action(
            EscalationAction::Alert,
            false,
            false,
        )),
        Classification::Positive => Ok(AnswerAssessment::quiet()),
    }
}

enum Classification {
    Negative,
    AlertBand,
    Positive,
}

fn classify(question: &Question, value: &AnswerValue) -> Classification {
    match (question.answer_type, value) {
        (AnswerType::SingleChoice | AnswerType::Scale, AnswerValue::Selection(index)) => {
            if let Some(threshold) = question.critical_threshold {
                if *index >= threshold {
                    return Classification::Negative;
                }
                if question
                    .alert_threshold
                    .is_some_and(|alert| *index >= alert)
                {
                    return Classification::AlertBand;
                }
                Classification::Positive
            } else if question
                .alert_threshold
                .is_some_and(|alert| *index >= alert)
            {
                Classification::Negative
            } else {
                Classification::Positive
            }
        }
        (AnswerType::MultiChoice, AnswerValue::Selections(indices)) => {
            let none_selected = question
                .none_sentinel
                .is_some_and(|sentinel| indices.contains(&sentinel));
            if none_selected || (indices.is_empty() && question.required) {
                Classification::Negative
            } else {
                Classification::Positive
            }
        }
        (AnswerType::Percentage | AnswerType::Amount, AnswerValue::Numeric(amount)) => {
            match question.acceptable_range {
                Some(range) if range.contains(*amount) => Classification::Positive,
                Some(_) => Classification::Negative,
                // Unreachable for a validated catalog; treat as positive rather
                // than inventing a failure mode scoring would have to absorb.
                None => Classification::Positive,
            }
        }
        // Free text is out of engine scope: never negative, always learn-only.
        (AnswerType::ShortText | AnswerType::LongText, AnswerValue::Text(_)) => {
            Classification::Positive
        }
        _ => Classification::Positive,
    }
}

fn check_shape(question: &Question, value: &AnswerValue) -> Result<(), AnswerShapeError> {
    let matches_type = matches!(
        (question.answer_type, value),
        (
            AnswerType::ShortText | AnswerType::LongText,
            AnswerValue::Text(_)
        ) | (
            AnswerType::SingleChoice | AnswerType::Scale,
            AnswerValue::Selection(_)
        ) | (AnswerType::MultiChoice, AnswerValue::Selections(_))
            | (
                AnswerType::Percentage | AnswerType::Amount,
                AnswerValue::Numeric(_)
            )
    );

    if !matches_type {
        return Err(AnswerShapeError::TypeMismatch {
            question_id: question.id.clone(),
            expected: question.answer_type,
            found: value.kind(),
        });
    }

    let out_of_range = match value {
        AnswerValue::Selection(index) if *index >= question.options.len() => Some(*index),
        AnswerValue::Selections(indices) => indices
            .iter()
            .copied()
            .find(|index| *index >= question.options.len()),
        _ => None,
    };

    if let Some(index) = out_of_range {
        return Err(AnswerShapeError::OptionOutOfRange {
            question_id: question.id.clone(),
            index,
            options: question.options.len(),
        });
    }

    Ok(())
}

fn unreachable_shape(question: &Question) -> AnswerShapeError {
    AnswerShapeError::TypeMismatch {
        question_id: question.id.clone(),
        expected: question.answer_type,
        found: "absent",
    }
}
