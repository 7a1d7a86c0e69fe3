/*!
 * Importance Scoring
 * Collapses a statistical profile and the current execution into [0, 1]
 *
 * Weighted factors:
 * - cost: current duration against the high-cost threshold (0.4)
 * - error rate: running share of failed executions (0.3)
 * - variability: coefficient of variation of durations (0.2)
 * - criticality: flat 0.1 for business-critical operations
 */

use super::stats::OperationStats;
use crate::core::limits::{COST_WEIGHT, CRITICALITY_SCORE, ERROR_RATE_WEIGHT, VARIABILITY_WEIGHT};
use crate::core::QueryMetrics;
use serde::Serialize;

/// Individual factor contributions, already weighted
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ScoreBreakdown {
    pub cost: f64,
    pub error_rate: f64,
    pub variability: f64,
    pub criticality: f64,
}

impl ScoreBreakdown {
    #[inline]
    pub fn total(&self) -> f64 {
        (self.cost + self.error_rate + self.variability + self.criticality).clamp(0.0, 1.0)
    }
}

/// Stateless scorer parameterized by the high-cost threshold
#[derive(Debug, Clone, Copy)]
pub struct ImportanceScorer {
    high_cost_threshold_ms: f64,
}

impl ImportanceScorer {
    pub fn new(high_cost_threshold_ms: f64) -> Self {
        Self {
            high_cost_threshold_ms,
        }
    }

    pub fn breakdown(&self, stats: &OperationStats, metrics: &QueryMetrics) -> ScoreBreakdown {
        let cost = if self.high_cost_threshold_ms > 0.0 {
            (metrics.duration_ms.max(0.0) / self.high_cost_threshold_ms).min(1.0)
        } else {
            1.0
        };

        ScoreBreakdown {
            cost: cost * COST_WEIGHT,
            error_rate: stats.error_rate.clamp(0.0, 1.0) * ERROR_RATE_WEIGHT,
            variability: stats.coefficient_of_variation().min(1.0) * VARIABILITY_WEIGHT,
            criticality: if metrics.is_critical {
                CRITICALITY_SCORE
            } else {
                0.0
            },
        }
    }

    #[inline]
    pub fn score(&self, stats: &OperationStats, metrics: &QueryMetrics) -> f64 {
        self.breakdown(stats, metrics).total()
    }
}
