//! Convergence tracker: Lyapunov-style multi-dimensional distance-to-target
//! analytics over a scope's goal-score trajectory, plus the persistence of
//! that trajectory so the finality evaluator can read it back across
//! rounds.
//!
//! The analysis functions are pure; [`ConvergenceStore`] is the only part
//! that touches `rusqlite`, the same row-mapping idiom as [`crate::graph`].

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;

use crate::types::ScopeId;

pub const DIMENSIONS: usize = 4;
const V_FLOOR: f64 = 1e-10;
const ESTIMATE_EPSILON: f64 = 0.005;
const MAX_ESTIMATED_ROUNDS: u32 = 1000;

#[derive(Debug, Error)]
pub enum ConvergenceError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// The four tracked dimensions of scope progress, each already normalized
/// to `[0.0, 1.0]` with `1.0` meaning fully satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DimensionScores {
    pub claim_confidence: f64,
    pub contradiction_resolution: f64,
    pub goal_completion: f64,
    pub risk_containment: f64,
}

impl DimensionScores {
    pub fn as_array(&self) -> [f64; DIMENSIONS] {
        [
            self.claim_confidence,
            self.contradiction_resolution,
            self.goal_completion,
            self.risk_containment,
        ]
    }

    /// Every dimension fully satisfied -- the zero of [`lyapunov_v`] against
    /// the default all-ones target.
    pub fn perfect() -> Self {
        Self {
            claim_confidence: 1.0,
            contradiction_resolution: 1.0,
            goal_completion: 1.0,
            risk_containment: 1.0,
        }
    }
}

/// Relative weight of each dimension in the aggregate goal score. Expected
/// to sum to `1.0`; [`crate::config::FinalityConfig`] owns validating that.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DimensionWeights {
    pub confidence: f64,
    pub contradictions: f64,
    pub goals: f64,
    pub risk: f64,
}

impl DimensionWeights {
    pub fn as_array(&self) -> [f64; DIMENSIONS] {
        [self.confidence, self.contradictions, self.goals, self.risk]
    }
}

impl Default for DimensionWeights {
    fn default() -> Self {
        Self {
            confidence: 0.30,
            contradictions: 0.30,
            goals: 0.25,
            risk: 0.15,
        }
    }
}

/// One recorded round of a scope's convergence trajectory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvergencePoint {
    pub scope_id: ScopeId,
    pub epoch: u64,
    pub goal_score: f64,
    pub lyapunov_v: f64,
    pub dimensions: DimensionScores,
    pub pressure: [f64; DIMENSIONS],
    pub created_at: DateTime<Utc>,
}

/// Weighted squared distance to target across all four dimensions --
/// always `>= 0`, `== 0` iff every dimension has reached its target (P6).
pub fn lyapunov_v(dims: &DimensionScores, weights: &DimensionWeights, targets: &DimensionScores) -> f64 {
    dims.as_array()
        .iter()
        .zip(targets.as_array())
        .zip(weights.as_array())
        .map(|((actual, target), w)| w * (target - actual) * (target - actual))
        .sum()
}

/// Per-dimension unmet weighted distance -- the largest entry names the
/// bottleneck dimension holding the score back.
pub fn pressure(dims: &DimensionScores, weights: &DimensionWeights) -> [f64; DIMENSIONS] {
    let mut out = [0.0; DIMENSIONS];
    for (i, (actual, w)) in dims.as_array().iter().zip(weights.as_array()).enumerate() {
        out[i] = w * (1.0 - actual).max(0.0);
    }
    out
}

/// Mean of `-ln(V_i / V_{i-1})` over the most recent `min(5, n - 1)`
/// consecutive pairs of `v_history`, each `V` floored to avoid a
/// divide-by-zero once a scope reaches exact convergence. Positive means
/// `V` is shrinking (converging); negative means it is growing (diverging).
/// `None` with fewer than two points.
pub fn convergence_rate(v_history: &[f64]) -> Option<f64> {
    if v_history.len() < 2 {
        return None;
    }
    let pairs = (v_history.len() - 1).min(5);
    let window = &v_history[v_history.len() - 1 - pairs..];
    let deltas: Vec<f64> = window
        .windows(2)
        .map(|w| {
            let prev = w[0].max(V_FLOOR);
            let curr = w[1].max(V_FLOOR);
            -(curr / prev).ln()
        })
        .collect();
    Some(deltas.iter().sum::<f64>() / deltas.len() as f64)
}

/// Rounds remaining at the current rate before `V` crosses `epsilon`.
/// `Some(0)` if already there; `None` if there are too few points or the
/// trajectory isn't meaningfully converging; capped at 1000 rounds.
pub fn estimated_rounds(v_current: f64, rate: Option<f64>) -> Option<u32> {
    if v_current <= ESTIMATE_EPSILON {
        return Some(0);
    }
    let rate = rate?;
    if rate <= 1e-3 {
        return None;
    }
    let rounds = (-(ESTIMATE_EPSILON / v_current).ln() / rate).ceil();
    if !rounds.is_finite() || rounds < 0.0 {
        return None;
    }
    Some((rounds as u32).min(MAX_ESTIMATED_ROUNDS))
}

/// Sign changes between consecutive score deltas -- each one is a reversal
/// in the direction of travel.
pub fn direction_changes(history: &[f64]) -> u32 {
    let deltas: Vec<f64> = history.windows(2).map(|w| w[1] - w[0]).collect();
    let mut changes = 0;
    for pair in deltas.windows(2) {
        if pair[0] == 0.0 || pair[1] == 0.0 {
            continue;
        }
        if pair[0].signum() != pair[1].signum() {
            changes += 1;
        }
    }
    changes
}

/// Two or more direction changes in the window counts as oscillation.
pub fn is_oscillating(history: &[f64]) -> bool {
    direction_changes(history) >= 2
}

/// Trajectory quality gate (§4.11a C): `1.0` minus half a point for every
/// direction change relative to the number of reversals the window could
/// possibly contain. Clean monotonic progress scores `1.0`; a history that
/// reverses at every step approaches `0.0`.
pub fn trajectory_quality(history: &[f64]) -> f64 {
    if history.len() < 3 {
        return 1.0;
    }
    let max_possible = (history.len() - 2) as f64;
    let changes = direction_changes(history) as f64;
    (1.0 - 0.5 * (changes / max_possible)).clamp(0.0, 1.0)
}

/// MACI plateau detection: an exponential moving average of the per-round
/// progress ratio `delta_score / remaining_gap_to_target`, declaring a
/// plateau once the EMA has stayed under `plateau_threshold` for
/// `plateau_rounds` consecutive rounds.
pub struct PlateauTracker {
    alpha_ema: f64,
    plateau_threshold: f64,
    plateau_rounds: u32,
    ema: Option<f64>,
    consecutive_low: u32,
}

impl PlateauTracker {
    pub fn new(alpha_ema: f64, plateau_threshold: f64, plateau_rounds: u32) -> Self {
        Self {
            alpha_ema,
            plateau_threshold,
            plateau_rounds,
            ema: None,
            consecutive_low: 0,
        }
    }

    /// Feeds one more round (previous score, current score, target);
    /// returns whether the scope has now plateaued.
    pub fn record(&mut self, prev_score: f64, curr_score: f64, target: f64) -> bool {
        let remaining_gap = (target - prev_score).abs().max(V_FLOOR);
        let ratio = (curr_score - prev_score) / remaining_gap;
        let ema = match self.ema {
            Some(prev_ema) => self.alpha_ema * ratio + (1.0 - self.alpha_ema) * prev_ema,
            None => ratio,
        };
        self.ema = Some(ema);

        if ema.abs() < self.plateau_threshold {
            self.consecutive_low += 1;
        } else {
            self.consecutive_low = 0;
        }
        self.consecutive_low >= self.plateau_rounds
    }

    pub fn current_ema(&self) -> Option<f64> {
        self.ema
    }
}

/// Persists a scope's convergence trajectory so it survives process
/// restarts and is readable across evaluation rounds.
pub struct ConvergenceStore {
    conn: Mutex<Connection>,
}

impl ConvergenceStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ConvergenceError> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS convergence_points (
                scope_id TEXT NOT NULL,
                epoch INTEGER NOT NULL,
                goal_score REAL NOT NULL,
                lyapunov_v REAL NOT NULL,
                dimensions TEXT NOT NULL,
                pressure TEXT NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (scope_id, epoch)
            );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self, ConvergenceError> {
        Self::open(":memory:")
    }

    /// Records one round of a scope's trajectory; retried rounds reuse the
    /// same epoch and overwrite in place.
    pub async fn record_point(&self, point: &ConvergencePoint) -> Result<(), ConvergenceError> {
        let conn = self.conn.lock().expect("convergence mutex poisoned");
        conn.execute(
            "INSERT INTO convergence_points
                (scope_id, epoch, goal_score, lyapunov_v, dimensions, pressure, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(scope_id, epoch) DO UPDATE SET
                goal_score = excluded.goal_score,
                lyapunov_v = excluded.lyapunov_v,
                dimensions = excluded.dimensions,
                pressure = excluded.pressure,
                created_at = excluded.created_at",
            params![
                point.scope_id.to_string(),
                point.epoch as i64,
                point.goal_score,
                point.lyapunov_v,
                serde_json::to_string(&point.dimensions).expect("dimension scores always serialize"),
                serde_json::to_string(&point.pressure).expect("pressure array always serializes"),
                point.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// The most recent `depth` rounds for a scope, oldest first.
    pub async fn load_history(
        &self,
        scope_id: ScopeId,
        depth: usize,
    ) -> Result<Vec<ConvergencePoint>, ConvergenceError> {
        let conn = self.conn.lock().expect("convergence mutex poisoned");
        let mut stmt = conn.prepare(
            "SELECT epoch, goal_score, lyapunov_v, dimensions, pressure, created_at
             FROM convergence_points WHERE scope_id = ?1
             ORDER BY epoch DESC LIMIT ?2",
        )?;
        let mut rows: Vec<ConvergencePoint> = stmt
            .query_map(params![scope_id.to_string(), depth as i64], |row| {
                let epoch: i64 = row.get(0)?;
                let dimensions: String = row.get(3)?;
                let pressure: String = row.get(4)?;
                let created_at: String = row.get(5)?;
                Ok(ConvergencePoint {
                    scope_id,
                    epoch: epoch as u64,
                    goal_score: row.get(1)?,
                    lyapunov_v: row.get(2)?,
                    dimensions: serde_json::from_str(&dimensions).unwrap_or(DimensionScores {
                        claim_confidence: 0.0,
                        contradiction_resolution: 0.0,
                        goal_completion: 0.0,
                        risk_containment: 0.0,
                    }),
                    pressure: serde_json::from_str(&pressure).unwrap_or([0.0; DIMENSIONS]),
                    created_at: created_at.parse().unwrap_or_else(|_| Utc::now()),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows.reverse();
        Ok(rows)
    }

    /// Number of most-recent consecutive rounds with no score movement
    /// (within `tolerance`) -- the quiescence gate's idle-cycle count.
    pub fn idle_cycles(history: &[ConvergencePoint], tolerance: f64) -> u32 {
        let mut count = 0;
        for pair in history.windows(2).rev() {
            if (pair[1].goal_score - pair[0].goal_score).abs() < tolerance {
                count += 1;
            } else {
                break;
            }
        }
        count
    }

    /// Milliseconds since the last round whose score actually moved.
    pub fn last_delta_age_ms(history: &[ConvergencePoint], now: DateTime<Utc>, tolerance: f64) -> i64 {
        for pair in history.windows(2).rev() {
            if (pair[1].goal_score - pair[0].goal_score).abs() >= tolerance {
                return (now - pair[1].created_at).num_milliseconds();
            }
        }
        history
            .first()
            .map(|p| (now - p.created_at).num_milliseconds())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dims(v: f64) -> DimensionScores {
        DimensionScores {
            claim_confidence: v,
            contradiction_resolution: v,
            goal_completion: v,
            risk_containment: v,
        }
    }

    #[test]
    fn v_shrinks_as_dimensions_approach_target() {
        let weights = DimensionWeights::default();
        let target = DimensionScores::perfect();
        let far = lyapunov_v(&dims(0.1), &weights, &target);
        let near = lyapunov_v(&dims(0.9), &weights, &target);
        assert!(near < far);
        assert!(near > 0.0);
    }

    #[test]
    fn v_is_zero_iff_all_dimensions_hit_target() {
        let weights = DimensionWeights::default();
        let target = DimensionScores::perfect();
        assert_eq!(lyapunov_v(&dims(1.0), &weights, &target), 0.0);
    }

    #[test]
    fn pressure_highlights_the_lagging_dimension() {
        let weights = DimensionWeights::default();
        let mixed = DimensionScores {
            claim_confidence: 1.0,
            contradiction_resolution: 1.0,
            goal_completion: 0.2,
            risk_containment: 1.0,
        };
        let p = pressure(&mixed, &weights);
        assert!(p[2] > p[0]);
        assert!(p[2] > p[1]);
        assert!(p[2] > p[3]);
    }

    #[test]
    fn diverging_history_yields_negative_rate() {
        let v_history = vec![0.10, 0.15, 0.20];
        let rate = convergence_rate(&v_history).unwrap();
        assert!(rate < 0.0, "expected a negative rate, got {rate}");
    }

    #[test]
    fn converging_history_yields_positive_rate() {
        let v_history = vec![0.40, 0.20, 0.10];
        let rate = convergence_rate(&v_history).unwrap();
        assert!(rate > 0.0);
    }

    #[test]
    fn convergence_rate_uses_at_most_five_most_recent_pairs() {
        let mut v_history = vec![0.9, 0.8];
        for _ in 0..10 {
            v_history.push(0.05);
        }
        let rate = convergence_rate(&v_history).unwrap();
        assert!(rate.abs() < 1e-6, "expected the flat tail to dominate, got {rate}");
    }

    #[test]
    fn estimated_rounds_is_zero_once_below_epsilon() {
        assert_eq!(estimated_rounds(0.001, Some(0.1)), Some(0));
    }

    #[test]
    fn estimated_rounds_is_none_when_not_converging() {
        assert_eq!(estimated_rounds(0.5, Some(-0.1)), None);
        assert_eq!(estimated_rounds(0.5, None), None);
    }

    #[test]
    fn estimated_rounds_caps_at_one_thousand() {
        let rounds = estimated_rounds(0.5, Some(0.002)).unwrap();
        assert_eq!(rounds, 1000);
    }

    #[test]
    fn estimated_rounds_rejects_near_zero_rate() {
        assert_eq!(estimated_rounds(0.5, Some(1e-6)), None);
    }

    #[test]
    fn trajectory_quality_penalizes_reversals() {
        let clean = trajectory_quality(&[0.1, 0.2, 0.3, 0.4]);
        let jagged = trajectory_quality(&[0.70, 0.80, 0.95, 0.72]);
        assert_eq!(clean, 1.0);
        assert!(jagged < 1.0);
    }

    #[test]
    fn plateau_tracker_declares_after_consecutive_low_rounds() {
        let mut tracker = PlateauTracker::new(0.3, 0.01, 3);
        assert!(!tracker.record(0.80, 0.801, 1.0));
        assert!(!tracker.record(0.801, 0.8015, 1.0));
        assert!(tracker.record(0.8015, 0.8016, 1.0));
    }

    #[test]
    fn is_oscillating_detects_repeated_reversals() {
        assert!(is_oscillating(&[0.5, 0.6, 0.5, 0.6, 0.5]));
        assert!(!is_oscillating(&[0.1, 0.2, 0.3, 0.4]));
    }

    #[tokio::test]
    async fn store_round_trips_history_oldest_first() {
        let store = ConvergenceStore::open_in_memory().unwrap();
        let scope_id = ScopeId::new();
        for epoch in 0..3u64 {
            let score = 0.5 + epoch as f64 * 0.1;
            let d = dims(score);
            let w = DimensionWeights::default();
            let target = DimensionScores::perfect();
            let v = lyapunov_v(&d, &w, &target);
            store
                .record_point(&ConvergencePoint {
                    scope_id,
                    epoch,
                    goal_score: score,
                    lyapunov_v: v,
                    dimensions: d,
                    pressure: pressure(&d, &w),
                    created_at: Utc::now(),
                })
                .await
                .unwrap();
        }
        let history = store.load_history(scope_id, 10).await.unwrap();
        assert_eq!(history.len(), 3);
        assert!(history[0].goal_score < history[2].goal_score);
    }
}
