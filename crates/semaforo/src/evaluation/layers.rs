use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::catalog::{Block, Layer, QuestionCatalog, ScoringWeights, Severity};
use crate::evaluation::answers::AnswerAssessment;
use crate::learning::SegmentProfile;

/// The three consolidated layer scores, each in [0, 100].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LayerScores {
    pub formal: f64,
    pub materiality: f64,
    pub business_purpose: f64,
}

impl LayerScores {
    pub const fn get(&self, layer: Layer) -> f64 {
        match layer {
            Layer::Formal => self.formal,
            Layer::Materiality => self.materiality,
            Layer::BusinessPurpose => self.business_purpose,
        }
    }

    /// Lowest-scoring layer, used when reporting the verdict reason.
    pub fn weakest(&self) -> (Layer, f64) {
        Layer::ALL
            .into_iter()
            .map(|layer| (layer, self.get(layer)))
            .fold((Layer::Formal, f64::MAX), |best, candidate| {
                if candidate.1 < best.1 {
                    candidate
                } else {
                    best
                }
            })
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct BlockTally {
    applicable_required: u32,
    positive_answers: u32,
    critical_negative: bool,
}

/// Score each block from per-question assessments.
///
/// A block whose service type exempts every required question yields `None` and is
/// later excluded from layer weighting instead of scoring a misleading zero.
pub(crate) fn block_scores(
    catalog: &QuestionCatalog,
    service_type: &str,
    assessments: &BTreeMap<String, AnswerAssessment>,
) -> BTreeMap<Block, Option<f64>> {
    let mut tallies: BTreeMap<Block, BlockTally> = BTreeMap::new();

    for question in catalog.applicable(service_type) {
        let tally = tallies.entry(question.block).or_default();
        if question.required {
            tally.applicable_required += 1;
        }
        if let Some(assessment) = assessments.get(&question.id) {
            if !assessment.missing && !assessment.negative {
                tally.positive_answers += 1;
            }
            if assessment.negative && question.severity == Severity::Critical {
                tally.critical_negative = true;
            }
        }
    }

    Block::ALL
        .into_iter()
        .map(|block| {
            let tally = tallies.get(&block).copied().unwrap_or_default();
            (block, score_block(tally, &catalog.weights))
        })
        .collect()
}

fn score_block(tally: BlockTally, weights: &ScoringWeights) -> Option<f64> {
    if tally.applicable_required == 0 {
        return None;
    }

    let ratio = f64::from(tally.positive_answers) / f64::from(tally.applicable_required);
    let mut score = (ratio * 100.0).min(100.0);

    // Severity is a cap, not just a weight: one critical negative bounds the block.
    if tally.critical_negative {
        score = score.min(weights.critical_cap);
    }

    Some(score)
}

/// Bounded adjustment from the segment's learned profile.
///
/// The prior only applies once the segment has enough closed cases and is clamped
/// to a configured number of points per block. The verdict-threshold guard lives
/// in [`clamp_layers_to_band`], after blocks collapse into layers, since the
/// thresholds are evaluated on layer scores.
pub(crate) fn apply_segment_prior(
    scores: &mut BTreeMap<Block, Option<f64>>,
    profile: &SegmentProfile,
    assessments: &BTreeMap<String, AnswerAssessment>,
    catalog: &QuestionCatalog,
) {
    let weights = &catalog.weights;
    if profile.total_cases < weights.prior_min_sample {
        return;
    }

    let mut adjustments: BTreeMap<Block, f64> = BTreeMap::new();

    for pattern in &profile.success_patterns {
        if let Some(block) = matched_block(pattern.question_id.as_deref(), assessments, catalog) {
            *adjustments.entry(block).or_insert(0.0) += 1.0;
        }
    }
    for pattern in &profile.alerts {
        if let Some(block) = matched_block(pattern.question_id.as_deref(), assessments, catalog) {
            *adjustments.entry(block).or_insert(0.0) -= 1.0;
        }
    }

    for (block, adjustment) in adjustments {
        let clamped = adjustment.clamp(-weights.prior_max_points, weights.prior_max_points);
        if let Some(Some(score)) = scores.get_mut(&block) {
            *score = (*score + clamped).clamp(0.0, 100.0);
        }
    }
}

fn matched_block(
    question_id: Option<&str>,
    assessments: &BTreeMap<String, AnswerAssessment>,
    catalog: &QuestionCatalog,
) -> Option<Block> {
    let id = question_id?;
    if !assessments.contains_key(id) {
        return None;
    }
    catalog.question(id).map(|question| question.block)
}

/// A prior may nudge layer scores but never lift one across the insufficient or
/// weak thresholds; verdict changes must come from the answers themselves. The
/// clamp binds on layers because that is where the thresholds are evaluated: a
/// small per-block bump can otherwise shift a multi-block weighted layer across
/// a band the unadjusted answers had not cleared.
pub(crate) fn clamp_layers_to_band(
    adjusted: &mut LayerScores,
    unadjusted: &LayerScores,
    weights: &ScoringWeights,
) {
    adjusted.formal = clamp_to_band(unadjusted.formal, adjusted.formal, weights);
    adjusted.materiality = clamp_to_band(unadjusted.materiality, adjusted.materiality, weights);
    adjusted.business_purpose = clamp_to_band(
        unadjusted.business_purpose,
        adjusted.business_purpose,
        weights,
    );
}

fn clamp_to_band(base: f64, adjusted: f64, weights: &ScoringWeights) -> f64 {
    let mut bounded = adjusted;
    for threshold in [weights.insufficient_threshold, weights.weak_threshold] {
        if base < threshold && bounded >= threshold {
            bounded = threshold - 0.01;
        }
    }
    bounded
}

/// Collapse block scores into the three layers using configured weights.
///
/// Blocks without applicable required questions are dropped and the remaining
/// weights renormalized proportionally. A layer left with no scored blocks has no
/// applicable requirements at all and scores 100.
pub(crate) fn layer_scores(
    scores: &BTreeMap<Block, Option<f64>>,
    weights: &ScoringWeights,
) -> LayerScores {
    let score_for = |layer: Layer| -> f64 {
        let blocks = match weights.layer_weights.get(&layer) {
            Some(blocks) => blocks,
            None => return 100.0,
        };

        let mut weighted_sum = 0.0;
        let mut weight_total = 0.0;
        for (block, weight) in blocks {
            if let Some(Some(score)) = scores.get(block) {
                weighted_sum += score * weight;
                weight_total += weight;
            }
        }

        if weight_total == 0.0 {
            100.0
        } else {
            weighted_sum / weight_total
        }
    };

    LayerScores {
        formal: score_for(Layer::Formal),
        materiality: score_for(Layer::Materiality),
        business_purpose: score_for(Layer::BusinessPurpose),
    }
}
