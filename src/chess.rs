//! Move selection for the chess demo's "AI levels".
//!
//! Scores come from an external network; this module only decides which of
//! the scored moves to play. Higher levels play the best move almost always,
//! lower levels sample from a widening set of good moves with geometrically
//! decaying weights. There is no search and no legality checking here.
//!
//! # Example
//!
//! ```rust
//! use portfolio_guard::chess::{AiLevel, ScoredMove, select_move_with_draw};
//!
//! let moves = [
//!     ScoredMove::new("e2e4", 0.61),
//!     ScoredMove::new("d2d4", 0.58),
//!     ScoredMove::new("g1f3", 0.55),
//! ];
//!
//! let chosen = select_move_with_draw(&moves, AiLevel::new(10), 0.5).unwrap();
//! assert_eq!(chosen.mv, "e2e4");
//! ```

use rand::Rng;

/// Probability that a strong level plays its top move.
pub const STRONG_TOP_MOVE_PROBABILITY: f64 = 0.9;

/// Levels at or above this play the top move (or, rarely, the runner-up).
pub const STRONG_LEVEL: u8 = 8;

/// Weight ratio between consecutive ranks at weaker levels.
pub const RANK_DECAY: f64 = 0.7;

/// An AI strength between 1 and 10.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AiLevel(u8);

impl AiLevel {
    /// Weakest level.
    pub const MIN: AiLevel = AiLevel(1);
    /// Strongest level.
    pub const MAX: AiLevel = AiLevel(10);

    /// Create a level, clamping into `1..=10`.
    pub fn new(level: u8) -> Self {
        Self(level.clamp(Self::MIN.0, Self::MAX.0))
    }

    /// The numeric level.
    pub fn get(self) -> u8 {
        self.0
    }

    /// How many top-ranked moves a weak level samples from:
    /// `max(1, floor(2 + (10 - level) / 10 * 5))`.
    pub fn candidate_count(self) -> usize {
        let spread = 2.0 + f64::from(Self::MAX.0 - self.0) * 5.0 / 10.0;
        (spread.floor() as usize).max(1)
    }
}

impl Default for AiLevel {
    fn default() -> Self {
        Self::MAX
    }
}

/// A move paired with its externally computed score (higher is better).
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredMove<M> {
    /// The move, in whatever notation the caller uses.
    pub mv: M,
    /// Evaluation score.
    pub score: f64,
}

impl<M> ScoredMove<M> {
    /// Pair a move with its score.
    pub fn new(mv: M, score: f64) -> Self {
        Self { mv, score }
    }
}

/// Pick a move for `level`, drawing randomness from `rng`.
///
/// Returns `None` only when `moves` is empty.
pub fn select_move<'a, M, R>(
    moves: &'a [ScoredMove<M>],
    level: AiLevel,
    rng: &mut R,
) -> Option<&'a ScoredMove<M>>
where
    R: Rng + ?Sized,
{
    select_move_with_draw(moves, level, rng.random::<f64>())
}

/// Pick a move for `level` from a single uniform draw in `[0, 1)`.
///
/// Moves are ranked by score, best first; ties keep their input order.
pub fn select_move_with_draw<M>(
    moves: &[ScoredMove<M>],
    level: AiLevel,
    draw: f64,
) -> Option<&ScoredMove<M>> {
    if moves.is_empty() {
        return None;
    }

    let mut ranked: Vec<&ScoredMove<M>> = moves.iter().collect();
    ranked.sort_by(|a, b| b.score.total_cmp(&a.score));

    let index = if level.get() >= STRONG_LEVEL {
        if draw < STRONG_TOP_MOVE_PROBABILITY {
            0
        } else {
            1.min(ranked.len() - 1)
        }
    } else {
        weighted_rank(level.candidate_count().min(ranked.len()), draw)
    };

    ranked.get(index).copied()
}

/// Map one uniform draw onto ranks `0..count` weighted by `RANK_DECAY^rank`.
fn weighted_rank(count: usize, draw: f64) -> usize {
    let weights: Vec<f64> = (0..count).map(|rank| RANK_DECAY.powi(rank as i32)).collect();
    let total: f64 = weights.iter().sum();
    let target = draw.clamp(0.0, 1.0) * total;

    let mut cumulative = 0.0;
    for (rank, weight) in weights.iter().enumerate() {
        cumulative += weight;
        if target < cumulative {
            return rank;
        }
    }
    count.saturating_sub(1)
}
