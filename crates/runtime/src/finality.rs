//! Finality evaluator: turns a scope's semantic-graph snapshot into a
//! four-dimension weighted goal score and walks an ordered sequence of
//! gates -- a prior human decision, sustained divergence, vacuous content,
//! the resolution gates, the near-finality review band, and finally the
//! declared escalate/block/expire rules -- down to a single outcome.
//!
//! The gate functions are pure; [`FinalityEvaluator::evaluate`] composes
//! them with the same ordered-match idiom as [`crate::policy::engine`].

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::config::FinalityConfig;
use crate::convergence::{convergence_rate, trajectory_quality, DimensionScores, DimensionWeights};
use crate::graph::FinalitySnapshot;
use crate::types::ScopeStatus;

#[derive(Debug, Error)]
pub enum FinalityError {
    #[error("no finality condition matched")]
    NoMatch,
}

const MONOTONICITY_TOLERANCE: f64 = 0.001;
const RISK_ESCALATION_THRESHOLD: f64 = 0.9;
const BLOCKED_THRESHOLD: f64 = 0.1;

/// Folds a snapshot's raw counters into the four `[0.0, 1.0]` dimensions
/// `goal_score` weights. A dimension with nothing to measure (no claims, no
/// contradictions) scores `1.0` -- vacuously satisfied, the same convention
/// [`crate::graph::FinalitySnapshot::goals_completion_ratio`] already uses.
pub fn dimension_scores(snapshot: &FinalitySnapshot) -> DimensionScores {
    let claim_confidence = if snapshot.claims_active_count == 0 {
        1.0
    } else {
        (snapshot.claims_active_avg_confidence / 0.85).clamp(0.0, 1.0)
    };
    let contradiction_resolution = if snapshot.contradictions_total_count == 0 {
        1.0
    } else {
        1.0 - (snapshot.contradictions_unresolved_count as f64
            / snapshot.contradictions_total_count as f64)
    };
    let goal_completion = snapshot.goals_completion_ratio.clamp(0.0, 1.0);
    let risk_containment = 1.0 - snapshot.scope_risk_score.min(1.0);

    DimensionScores {
        claim_confidence,
        contradiction_resolution,
        goal_completion,
        risk_containment,
    }
}

/// Weighted sum of the four clamped dimensions (P5: always in
/// `[0.0, 1.0]`).
pub fn goal_score(dims: &DimensionScores, weights: &DimensionWeights) -> f64 {
    dims.as_array()
        .iter()
        .zip(weights.as_array())
        .map(|(d, w)| d * w)
        .sum::<f64>()
        .clamp(0.0, 1.0)
}

/// §4.11 gate E: a scope with no active claims and vacuously-complete goals
/// has nothing to finalize over and stays active rather than resolving.
fn is_vacuous(snapshot: &FinalitySnapshot) -> bool {
    snapshot.claims_active_count == 0 && snapshot.goals_completion_ratio >= 1.0
}

/// §4.11a gate B: the score history is non-decreasing, within `tolerance`,
/// over its last `window` points.
pub fn is_monotonic(history: &[f64], window: usize, tolerance: f64) -> bool {
    if history.len() < 2 {
        return true;
    }
    let window = window.clamp(2, history.len());
    let tail = &history[history.len() - window..];
    tail.windows(2).all(|w| w[1] - w[0] >= -tolerance)
}

/// §4.11a gate D: idle and quiet for at least the configured windows. A
/// zero-valued config (the default) treats every scope as quiescent --
/// quiescence isn't enforced unless configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuiescenceConfig {
    pub min_idle_cycles: u32,
    pub min_last_delta_age_ms: i64,
}

fn is_quiescent(snapshot: &FinalitySnapshot, config: Option<QuiescenceConfig>) -> bool {
    match config {
        None => true,
        Some(c) => {
            snapshot.scope_idle_cycles >= c.min_idle_cycles
                && snapshot.scope_last_delta_age_ms >= c.min_last_delta_age_ms
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalityCondition {
    Resolved,
    Escalated,
    Blocked,
    Expired,
}

/// One of the options offered to a human reviewer when a scope lands in the
/// near-finality band.
#[derive(Debug, Clone, PartialEq)]
pub enum ReviewOption {
    ApproveFinality,
    ProvideResolution,
    Escalate,
    Defer { days: u32 },
}

/// A scope crossed into the human-in-the-loop review band: its score is
/// promising (`near_threshold <= score < auto_threshold`) but not yet safe
/// to auto-resolve.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalityReview {
    pub score: f64,
    pub dimension_breakdown: DimensionScores,
    pub options: Vec<ReviewOption>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FinalityOutcome {
    Resolved,
    Review(FinalityReview),
    Escalated,
    Blocked,
    Expired,
    Active,
}

impl FinalityOutcome {
    /// The terminal condition this outcome corresponds to, or `None` for
    /// the non-terminal `Review`/`Active` outcomes.
    pub fn condition(&self) -> Option<FinalityCondition> {
        match self {
            FinalityOutcome::Resolved => Some(FinalityCondition::Resolved),
            FinalityOutcome::Escalated => Some(FinalityCondition::Escalated),
            FinalityOutcome::Blocked => Some(FinalityCondition::Blocked),
            FinalityOutcome::Expired => Some(FinalityCondition::Expired),
            FinalityOutcome::Review(_) | FinalityOutcome::Active => None,
        }
    }
}

/// Everything [`FinalityEvaluator::evaluate`] needs for one scope at one
/// round. `score_history` and `v_history` are the scope's goal-score and
/// Lyapunov-`V` trajectories with the current round already appended by the
/// caller (after recording it via [`crate::convergence::ConvergenceStore`]).
pub struct FinalityContext<'a> {
    pub snapshot: &'a FinalitySnapshot,
    pub score_history: &'a [f64],
    pub v_history: &'a [f64],
    /// `true` if a human reviewer already chose `approve_finality` for this
    /// scope in an earlier round.
    pub prior_decision_approved: bool,
    pub max_risk_severity: f64,
    pub age: Duration,
    pub expiry: Duration,
}

/// Configuration-driven ordered evaluation over a [`FinalityContext`].
pub struct FinalityEvaluator {
    pub weights: DimensionWeights,
    pub near_threshold: f64,
    pub auto_threshold: f64,
    pub monotonicity_window: usize,
    pub trajectory_quality_min: f64,
    pub divergence_rate: f64,
    pub quiescence: Option<QuiescenceConfig>,
}

impl FinalityEvaluator {
    pub fn from_config(config: &FinalityConfig) -> Self {
        Self {
            weights: DimensionWeights {
                confidence: config.weight_confidence,
                contradictions: config.weight_contradictions,
                goals: config.weight_goals,
                risk: config.weight_risk,
            },
            near_threshold: config.near_threshold,
            auto_threshold: config.auto_threshold,
            monotonicity_window: config.monotonicity_window as usize,
            trajectory_quality_min: config.trajectory_quality_min,
            divergence_rate: config.divergence_rate,
            quiescence: None,
        }
    }

    /// Runs the full decision sequence (§4.11 steps 1, 4-9; step 6 folds in
    /// the §4.11a gates):
    ///
    /// 1. a prior `approve_finality` decision short-circuits to resolved.
    /// 4. sustained divergence (negative convergence rate over >= 3 rounds)
    ///    escalates before anything else is tried.
    /// 5. no meaningful content to finalize over stays active.
    /// 6. the resolution gate: score past `auto_threshold`, holding steady
    ///    (monotonic), well-behaved (trajectory quality), and settled
    ///    (quiescent).
    /// 7. the near-finality review band.
    /// 8. declared escalate/block/expire rules.
    /// 9. otherwise active.
    pub fn evaluate(&self, ctx: &FinalityContext) -> FinalityOutcome {
        if ctx.prior_decision_approved {
            return FinalityOutcome::Resolved;
        }

        let dims = dimension_scores(ctx.snapshot);
        let score = goal_score(&dims, &self.weights);

        if ctx.v_history.len() >= 3 {
            if let Some(rate) = convergence_rate(ctx.v_history) {
                if rate < self.divergence_rate {
                    return FinalityOutcome::Escalated;
                }
            }
        }

        if is_vacuous(ctx.snapshot) {
            return FinalityOutcome::Active;
        }

        if ctx.max_risk_severity >= RISK_ESCALATION_THRESHOLD {
            return FinalityOutcome::Escalated;
        }
        if ctx.age >= ctx.expiry {
            return FinalityOutcome::Expired;
        }

        let monotonic = is_monotonic(ctx.score_history, self.monotonicity_window, MONOTONICITY_TOLERANCE);
        let quality = trajectory_quality(ctx.score_history);
        let quiescent = is_quiescent(ctx.snapshot, self.quiescence);

        if score >= self.auto_threshold && monotonic && quality >= self.trajectory_quality_min && quiescent {
            return FinalityOutcome::Resolved;
        }

        if score >= self.near_threshold && score < self.auto_threshold {
            return FinalityOutcome::Review(FinalityReview {
                score,
                dimension_breakdown: dims,
                options: vec![
                    ReviewOption::ApproveFinality,
                    ReviewOption::ProvideResolution,
                    ReviewOption::Escalate,
                    ReviewOption::Defer { days: 7 },
                ],
            });
        }

        if score <= BLOCKED_THRESHOLD {
            return FinalityOutcome::Blocked;
        }

        FinalityOutcome::Active
    }

    pub fn target_status(condition: FinalityCondition) -> ScopeStatus {
        match condition {
            FinalityCondition::Resolved => ScopeStatus::Resolved,
            FinalityCondition::Escalated => ScopeStatus::Escalated,
            FinalityCondition::Blocked => ScopeStatus::Blocked,
            FinalityCondition::Expired => ScopeStatus::Expired,
        }
    }
}

pub fn age_since(created_at: DateTime<Utc>) -> Duration {
    Utc::now() - created_at
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(
        claims_active_count: usize,
        claims_active_avg_confidence: f64,
        contradictions_unresolved_count: usize,
        contradictions_total_count: usize,
        goals_completion_ratio: f64,
        scope_risk_score: f64,
    ) -> FinalitySnapshot {
        FinalitySnapshot {
            claims_active_count,
            claims_active_min_confidence: claims_active_avg_confidence,
            claims_active_avg_confidence,
            contradictions_unresolved_count,
            contradictions_total_count,
            risks_critical_active_count: 0,
            goals_completion_ratio,
            scope_risk_score,
            scope_idle_cycles: 0,
            scope_last_delta_age_ms: 0,
        }
    }

    fn vacuous_snapshot() -> FinalitySnapshot {
        snapshot(0, 1.0, 0, 0, 1.0, 0.0)
    }

    #[test]
    fn vacuous_scope_returns_active() {
        let evaluator = FinalityEvaluator {
            weights: DimensionWeights::default(),
            near_threshold: 0.5,
            auto_threshold: 0.85,
            monotonicity_window: 3,
            trajectory_quality_min: 0.7,
            divergence_rate: 0.0,
            quiescence: None,
        };
        let snap = vacuous_snapshot();
        let dims = dimension_scores(&snap);
        assert_eq!(goal_score(&dims, &evaluator.weights), 1.0);

        let ctx = FinalityContext {
            snapshot: &snap,
            score_history: &[1.0],
            v_history: &[0.0],
            prior_decision_approved: false,
            max_risk_severity: 0.0,
            age: Duration::hours(1),
            expiry: Duration::days(30),
        };
        assert_eq!(evaluator.evaluate(&ctx), FinalityOutcome::Active);
    }

    #[test]
    fn monotonicity_gate_blocks_resolution() {
        let evaluator = FinalityEvaluator {
            weights: DimensionWeights::default(),
            near_threshold: 0.5,
            auto_threshold: 0.85,
            monotonicity_window: 3,
            trajectory_quality_min: 0.0,
            divergence_rate: -1.0,
            quiescence: None,
        };
        // all dimensions satisfied -> score would clear auto_threshold.
        let snap = snapshot(2, 0.9, 0, 0, 1.0, 0.0);
        let dims = dimension_scores(&snap);
        let score = goal_score(&dims, &evaluator.weights);
        assert!(score >= evaluator.auto_threshold);

        let ctx = FinalityContext {
            snapshot: &snap,
            score_history: &[0.70, 0.80, 0.95, 0.72],
            v_history: &[],
            prior_decision_approved: false,
            max_risk_severity: 0.0,
            age: Duration::hours(1),
            expiry: Duration::days(30),
        };
        // the history's non-monotonic tail ([0.80, 0.95, 0.72]) blocks the
        // resolution gate even though this round's score clears threshold.
        assert_eq!(evaluator.evaluate(&ctx), FinalityOutcome::Active);
    }

    #[test]
    fn near_finality_band_returns_review_with_dimension_breakdown() {
        let evaluator = FinalityEvaluator {
            weights: DimensionWeights::default(),
            near_threshold: 0.0,
            auto_threshold: 1.0,
            monotonicity_window: 3,
            trajectory_quality_min: 0.7,
            divergence_rate: -10.0,
            quiescence: None,
        };
        let snap = snapshot(2, 0.7, 1, 2, 0.6, 0.1);
        let ctx = FinalityContext {
            snapshot: &snap,
            score_history: &[0.68, 0.682],
            v_history: &[],
            prior_decision_approved: false,
            max_risk_severity: 0.0,
            age: Duration::hours(1),
            expiry: Duration::days(30),
        };
        match evaluator.evaluate(&ctx) {
            FinalityOutcome::Review(review) => {
                assert!((review.score - 0.682_06).abs() < 1e-4);
                assert_eq!(review.options.len(), 4);
                assert!(review.options.contains(&ReviewOption::ApproveFinality));
                assert!(review.options.contains(&ReviewOption::Defer { days: 7 }));
            }
            other => panic!("expected Review, got {other:?}"),
        }
    }

    #[test]
    fn sustained_divergence_escalates() {
        let evaluator = FinalityEvaluator {
            weights: DimensionWeights::default(),
            near_threshold: 0.5,
            auto_threshold: 0.85,
            monotonicity_window: 3,
            trajectory_quality_min: 0.7,
            divergence_rate: 0.0,
            quiescence: None,
        };
        let snap = snapshot(1, 0.5, 0, 1, 0.5, 0.2);
        let ctx = FinalityContext {
            snapshot: &snap,
            score_history: &[0.5, 0.4, 0.3],
            v_history: &[0.10, 0.15, 0.20],
            prior_decision_approved: false,
            max_risk_severity: 0.0,
            age: Duration::hours(1),
            expiry: Duration::days(30),
        };
        assert_eq!(evaluator.evaluate(&ctx), FinalityOutcome::Escalated);
    }

    #[test]
    fn prior_approval_short_circuits_to_resolved() {
        let evaluator = FinalityEvaluator::from_config(&FinalityConfig::default());
        let snap = snapshot(5, 0.1, 3, 3, 0.1, 0.9);
        let ctx = FinalityContext {
            snapshot: &snap,
            score_history: &[0.1],
            v_history: &[],
            prior_decision_approved: true,
            max_risk_severity: 0.95,
            age: Duration::hours(1),
            expiry: Duration::days(30),
        };
        assert_eq!(evaluator.evaluate(&ctx), FinalityOutcome::Resolved);
    }

    #[test]
    fn severe_risk_escalates_before_declared_rules() {
        let evaluator = FinalityEvaluator::from_config(&FinalityConfig::default());
        let snap = snapshot(1, 0.9, 0, 0, 1.0, 0.95);
        let ctx = FinalityContext {
            snapshot: &snap,
            score_history: &[0.9],
            v_history: &[],
            prior_decision_approved: false,
            max_risk_severity: 0.95,
            age: Duration::hours(1),
            expiry: Duration::days(30),
        };
        assert_eq!(evaluator.evaluate(&ctx), FinalityOutcome::Escalated);
    }

    #[test]
    fn elapsed_past_expiry_expires() {
        let evaluator = FinalityEvaluator::from_config(&FinalityConfig::default());
        let snap = snapshot(0, 1.0, 0, 0, 0.2, 0.0);
        let ctx = FinalityContext {
            snapshot: &snap,
            score_history: &[0.3],
            v_history: &[],
            prior_decision_approved: false,
            max_risk_severity: 0.0,
            age: Duration::days(31),
            expiry: Duration::days(30),
        };
        assert_eq!(evaluator.evaluate(&ctx), FinalityOutcome::Expired);
    }

    #[test]
    fn goal_score_clamps_to_unit_interval() {
        let weights = DimensionWeights::default();
        let dims = DimensionScores {
            claim_confidence: 2.0,
            contradiction_resolution: 2.0,
            goal_completion: 2.0,
            risk_containment: 2.0,
        };
        assert_eq!(goal_score(&dims, &weights), 1.0);
    }
}
