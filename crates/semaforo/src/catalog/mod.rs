//! Versioned question catalog and scoring configuration.
//!
//! Weights, thresholds, and escalation rules live here as data, not as scattered
//! conditionals. A catalog is validated as a whole before it can be activated, and a
//! version that fails validation leaves the previously active one in force.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::info;

/// One of the six thematic blocks an evaluation question belongs to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Block {
    Documental,
    Financial,
    Deliverables,
    Communications,
    Materiality,
    BusinessPurpose,
}

impl Block {
    pub const ALL: [Block; 6] = [
        Block::Documental,
        Block::Financial,
        Block::Deliverables,
        Block::Communications,
        Block::Materiality,
        Block::BusinessPurpose,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            Block::Documental => "documental",
            Block::Financial => "financial",
            Block::Deliverables => "deliverables",
            Block::Communications => "communications",
            Block::Materiality => "materiality",
            Block::BusinessPurpose => "business_purpose",
        }
    }
}

/// Consolidated scoring layer a block contributes to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    Formal,
    Materiality,
    BusinessPurpose,
}

impl Layer {
    pub const ALL: [Layer; 3] = [Layer::Formal, Layer::Materiality, Layer::BusinessPurpose];

    pub const fn label(self) -> &'static str {
        match self {
            Layer::Formal => "formal",
            Layer::Materiality => "materiality",
            Layer::BusinessPurpose => "business_purpose",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    Important,
    Informational,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerType {
    ShortText,
    LongText,
    SingleChoice,
    MultiChoice,
    Scale,
    Percentage,
    Amount,
}

impl AnswerType {
    pub const fn has_options(self) -> bool {
        matches!(
            self,
            AnswerType::SingleChoice | AnswerType::MultiChoice | AnswerType::Scale
        )
    }

    pub const fn is_numeric(self) -> bool {
        matches!(self, AnswerType::Percentage | AnswerType::Amount)
    }

    const fn requires_threshold(self) -> bool {
        matches!(self, AnswerType::SingleChoice | AnswerType::Scale)
    }
}

/// Escalation triggered by a negative or missing answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EscalationAction {
    ForcedReview,
    RedFlag,
    Alert,
    LearnOnly,
}

impl EscalationAction {
    pub const fn label(self) -> &'static str {
        match self {
            EscalationAction::ForcedReview => "forcedReview",
            EscalationAction::RedFlag => "redFlag",
            EscalationAction::Alert => "alert",
            EscalationAction::LearnOnly => "learnOnly",
        }
    }

    /// Escalations ordered most severe first, used to prioritize triggered actions.
    pub const fn priority(self) -> u8 {
        match self {
            EscalationAction::ForcedReview => 0,
            EscalationAction::RedFlag => 1,
            EscalationAction::Alert => 2,
            EscalationAction::LearnOnly => 3,
        }
    }
}

/// Which service types a question applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Applicability {
    All,
    ServiceTypes(BTreeSet<String>),
}

impl Applicability {
    pub fn covers(&self, service_type: &str) -> bool {
        match self {
            Applicability::All => true,
            Applicability::ServiceTypes(types) => types.contains(service_type),
        }
    }
}

/// Inclusive bounds a numeric answer must fall within to count as positive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AcceptableRange {
    pub min: f64,
    pub max: f64,
}

impl AcceptableRange {
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Catalog entry, immutable once its catalog version is published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub block: Block,
    pub ordinal: u16,
    pub prompt: String,
    pub severity: Severity,
    pub answer_type: AnswerType,
    pub action_if_negative: EscalationAction,
    pub action_if_incomplete: EscalationAction,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub critical_threshold: Option<usize>,
    #[serde(default)]
    pub alert_threshold: Option<usize>,
    /// Index of the "none of the above" option on multi-choice questions.
    #[serde(default)]
    pub none_sentinel: Option<usize>,
    #[serde(default)]
    pub acceptable_range: Option<AcceptableRange>,
    pub applicability: Applicability,
    pub required: bool,
}

impl Question {
    pub fn applies_to(&self, service_type: &str) -> bool {
        self.applicability.covers(service_type)
    }
}

/// Layer weighting and verdict thresholds for one catalog version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    /// Per-layer block weights. Each layer's weights must sum to 1.0.
    pub layer_weights: BTreeMap<Layer, BTreeMap<Block, f64>>,
    /// Ceiling applied to a block containing a critical-severity negative answer.
    pub critical_cap: f64,
    /// A layer below this is insufficient and forces a red verdict.
    pub insufficient_threshold: f64,
    /// A layer below this (but not insufficient) yields a yellow verdict.
    pub weak_threshold: f64,
    /// Minimum closed cases before a segment profile biases scoring.
    pub prior_min_sample: u64,
    /// Largest adjustment, in points, a segment prior may apply to one block.
    pub prior_max_points: f64,
}

const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Immutable-per-version registry of evaluation questions plus scoring weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionCatalog {
    pub version: String,
    pub questions: Vec<Question>,
    pub weights: ScoringWeights,
}

impl QuestionCatalog {
    pub fn question(&self, id: &str) -> Option<&Question> {
        self.questions.iter().find(|question| question.id == id)
    }

    /// Questions applicable to a service type, in catalog order.
    pub fn applicable<'a>(
        &'a self,
        service_type: &'a str,
    ) -> impl Iterator<Item = &'a Question> + 'a {
        self.questions
            .iter()
            .filter(move |question| question.applies_to(service_type))
    }

    pub fn from_json(raw: &str) -> Result<Self, CatalogError> {
        let catalog: QuestionCatalog = serde_json::from_str(raw)?;
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn to_json(&self) -> Result<String, CatalogError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check every structural invariant of the catalog. Violations name the
    /// offending question or layer so editors can fix the exported JSON directly.
    pub fn validate(&self) -> Result<(), CatalogError> {
        let mut seen = BTreeSet::new();
        for question in &self.questions {
            if !seen.insert(question.id.as_str()) {
                return Err(CatalogError::DuplicateQuestionId {
                    question_id: question.id.clone(),
                });
            }
            self.validate_question(question)?;
        }
        self.validate_weights()
    }

    fn validate_question(&self, question: &Question) -> Result<(), CatalogError> {
        if question.answer_type.has_options() {
            if question.options.is_empty() {
                return Err(CatalogError::MissingOptions {
                    question_id: question.id.clone(),
                });
            }
        } else if !question.options.is_empty() {
            return Err(CatalogError::UnexpectedOptions {
                question_id: question.id.clone(),
            });
        }

        if question.answer_type.requires_threshold()
            && question.critical_threshold.is_none()
            && question.alert_threshold.is_none()
        {
            return Err(CatalogError::MissingThreshold {
                question_id: question.id.clone(),
            });
        }

        for threshold in [
            question.critical_threshold,
            question.alert_threshold,
            question.none_sentinel,
        ]
        .into_iter()
        .flatten()
        {
            if threshold >= question.options.len() {
                return Err(CatalogError::ThresholdOutOfRange {
                    question_id: question.id.clone(),
                    index: threshold,
                    options: question.options.len(),
                });
            }
        }

        if question.answer_type.is_numeric() {
            match question.acceptable_range {
                None => {
                    return Err(CatalogError::MissingAcceptableRange {
                        question_id: question.id.clone(),
                    });
                }
                Some(range) if range.min > range.max => {
                    return Err(CatalogError::EmptyAcceptableRange {
                        question_id: question.id.clone(),
                    });
                }
                Some(_) => {}
            }
        }

        Ok(())
    }

    fn validate_weights(&self) -> Result<(), CatalogError> {
        let weights = &self.weights;
        for layer in Layer::ALL {
            let blocks = weights
                .layer_weights
                .get(&layer)
                .ok_or(CatalogError::MissingLayerWeights { layer })?;
            let sum: f64 = blocks.values().sum();
            if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
                return Err(CatalogError::WeightSumMismatch { layer, sum });
            }
            if blocks.values().any(|weight| *weight <= 0.0) {
                return Err(CatalogError::NonPositiveWeight { layer });
            }
        }

        for (field, value) in [
            ("critical_cap", weights.critical_cap),
            ("insufficient_threshold", weights.insufficient_threshold),
            ("weak_threshold", weights.weak_threshold),
        ] {
            if !(value > 0.0 && value <= 100.0) {
                return Err(CatalogError::BoundOutOfRange { field, value });
            }
        }

        if weights.insufficient_threshold >= weights.weak_threshold {
            return Err(CatalogError::ThresholdOrder {
                insufficient: weights.insufficient_threshold,
                weak: weights.weak_threshold,
            });
        }

        if weights.prior_max_points < 0.0 {
            return Err(CatalogError::BoundOutOfRange {
                field: "prior_max_points",
                value: weights.prior_max_points,
            });
        }

        Ok(())
    }
}

/// Validation and load failures for a candidate catalog version.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("duplicate question id '{question_id}'")]
    DuplicateQuestionId { question_id: String },
    #[error("question '{question_id}' has a choice/scale answer type but no options")]
    MissingOptions { question_id: String },
    #[error("question '{question_id}' carries options but is not choice/scale")]
    UnexpectedOptions { question_id: String },
    #[error("question '{question_id}' needs a critical or alert threshold")]
    MissingThreshold { question_id: String },
    #[error("question '{question_id}' threshold index {index} exceeds {options} options")]
    ThresholdOutOfRange {
        question_id: String,
        index: usize,
        options: usize,
    },
    #[error("numeric question '{question_id}' has no acceptable range")]
    MissingAcceptableRange { question_id: String },
    #[error("question '{question_id}' acceptable range has min above max")]
    EmptyAcceptableRange { question_id: String },
    #[error("layer '{}' has no block weights", layer.label())]
    MissingLayerWeights { layer: Layer },
    #[error("layer '{}' weights sum to {sum}, expected 1.0", layer.label())]
    WeightSumMismatch { layer: Layer, sum: f64 },
    #[error("layer '{}' contains a non-positive weight", layer.label())]
    NonPositiveWeight { layer: Layer },
    #[error("{field} must be within (0, 100], found {value}")]
    BoundOutOfRange { field: &'static str, value: f64 },
    #[error("insufficient threshold {insufficient} must be below weak threshold {weak}")]
    ThresholdOrder { insufficient: f64, weak: f64 },
    #[error("catalog JSON malformed: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Process-wide current catalog with load-validate-activate swap semantics.
pub struct ActiveCatalog {
    current: RwLock<Arc<QuestionCatalog>>,
}

impl ActiveCatalog {
    pub fn new(catalog: QuestionCatalog) -> Result<Self, CatalogError> {
        catalog.validate()?;
        Ok(Self {
            current: RwLock::new(Arc::new(catalog)),
        })
    }

    pub fn current(&self) -> Arc<QuestionCatalog> {
        self.current.read().expect("catalog lock poisoned").clone()
    }

    /// Validate a candidate version and swap it in atomically. A candidate that
    /// fails validation is refused and the active version stays in force.
    pub fn activate(&self, candidate: QuestionCatalog) -> Result<String, CatalogError> {
        candidate.validate()?;
        let version = candidate.version.clone();
        *self.current.write().expect("catalog lock poisoned") = Arc::new(candidate);
        info!(%version, "question catalog activated");
        Ok(version)
    }

    pub fn activate_json(&self, raw: &str) -> Result<String, CatalogError> {
        let candidate: QuestionCatalog = serde_json::from_str(raw)?;
        self.activate(candidate)
    }
}
