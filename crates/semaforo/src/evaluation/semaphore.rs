use serde::{Deserialize, Serialize};

use crate::catalog::{Layer, ScoringWeights};
use crate::evaluation::layers::LayerScores;

/// Three-color aggregate verdict for a case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SemaphoreColor {
    Green,
    Yellow,
    Red,
}

impl SemaphoreColor {
    pub const fn label(self) -> &'static str {
        match self {
            SemaphoreColor::Green => "green",
            SemaphoreColor::Yellow => "yellow",
            SemaphoreColor::Red => "red",
        }
    }
}

/// Hard-block booleans supplied by the blacklist/authority-status service at
/// submission time. Never cached by the engine.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardBlockFlags {
    #[serde(default)]
    pub counterparty_on_exclusion_list: bool,
    #[serde(default)]
    pub counterparty_not_localizable: bool,
    #[serde(default)]
    pub operations_presumed_simulated: bool,
}

impl HardBlockFlags {
    /// First triggered hard block in a fixed priority order.
    pub fn triggered(&self) -> Option<HardBlockReason> {
        if self.counterparty_on_exclusion_list {
            Some(HardBlockReason::CounterpartyOnExclusionList)
        } else if self.counterparty_not_localizable {
            Some(HardBlockReason::CounterpartyNotLocalizable)
        } else if self.operations_presumed_simulated {
            Some(HardBlockReason::OperationsPresumedSimulated)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HardBlockReason {
    CounterpartyOnExclusionList,
    CounterpartyNotLocalizable,
    OperationsPresumedSimulated,
}

impl HardBlockReason {
    pub const fn summary(self) -> &'static str {
        match self {
            HardBlockReason::CounterpartyOnExclusionList => {
                "counterparty appears on the authority exclusion list"
            }
            HardBlockReason::CounterpartyNotLocalizable => {
                "counterparty could not be located by the authority"
            }
            HardBlockReason::OperationsPresumedSimulated => {
                "counterparty has operations presumed simulated"
            }
        }
    }
}

/// Why the semaphore landed on its color.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictReason {
    HardBlock(HardBlockReason),
    InsufficientLayer { layer: Layer, score: f64 },
    RedFlags { count: u32 },
    WeakLayer { layer: Layer, score: f64 },
    Healthy,
}

impl VerdictReason {
    pub fn summary(&self) -> String {
        match self {
            VerdictReason::HardBlock(reason) => reason.summary().to_string(),
            VerdictReason::InsufficientLayer { layer, score } => {
                format!("{} layer at {score:.1} is insufficient", layer.label())
            }
            VerdictReason::RedFlags { count } => format!("{count} red flag(s) raised"),
            VerdictReason::WeakLayer { layer, score } => {
                format!("{} layer at {score:.1} is weak", layer.label())
            }
            VerdictReason::Healthy => "all layers healthy".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub color: SemaphoreColor,
    pub reason: VerdictReason,
}

/// Collapse layer scores, red flags, and hard blocks into the verdict.
///
/// The decision table is evaluated top to bottom, first match wins; every input
/// combination maps to exactly one color.
pub fn resolve(
    layers: &LayerScores,
    red_flag_count: u32,
    hard_blocks: &HardBlockFlags,
    weights: &ScoringWeights,
) -> Verdict {
    if let Some(reason) = hard_blocks.triggered() {
        return Verdict {
            color: SemaphoreColor::Red,
            reason: VerdictReason::HardBlock(reason),
        };
    }

    let (weakest_layer, weakest_score) = layers.weakest();

    if weakest_score < weights.insufficient_threshold {
        return Verdict {
            color: SemaphoreColor::Red,
            reason: VerdictReason::InsufficientLayer {
                layer: weakest_layer,
                score: weakest_score,
            },
        };
    }

    if red_flag_count > 0 {
        return Verdict {
            color: SemaphoreColor::Red,
            reason: VerdictReason::RedFlags {
                count: red_flag_count,
            },
        };
    }

    if weakest_score < weights.weak_threshold {
        return Verdict {
            color: SemaphoreColor::Yellow,
            reason: VerdictReason::WeakLayer {
                layer: weakest_layer,
                score: weakest_score,
            },
        };
    }

    Verdict {
        color: SemaphoreColor::Green,
        reason: VerdictReason::Healthy,
    }
}
