// === Module Header (agents-tooling) START ===
// header: Parsed by scripts/check_module_headers.sh for purpose/role presence; keep keys on single-line entries.
// purpose: Turn one comment's reactions plus a cutoff instant into a single quality score
// role: scoring/pure
// inputs: Reaction slices from the cache orchestrator; the owning PR's merge time as cutoff
// outputs: f64 score per comment
// invariants:
// - Base score 1.0; no reactions means exactly 1.0
// - Reactions created after the cutoff are ignored; reactions without a timestamp always count
// - Result is never below the floor (-1.0); there is no ceiling
// - Order-independent: the score is a sum followed by a clamp
// - Unavailable reaction data scores the base value
// tie_breakers: contracts > orchestration > correctness > performance > minimal_diffs
// === Module Header END ===

use chrono::{DateTime, Utc};

use crate::model::{Reaction, ReactionContent};

/// Per-tag weights and clamps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreWeights {
  pub base: f64,
  pub floor: f64,
  pub thumbs_up: f64,
  pub thumbs_down: f64,
  /// heart, hooray, rocket
  pub celebrate: f64,
  /// confused, eyes
  pub doubt: f64,
}

impl Default for ScoreWeights {
  fn default() -> Self {
    Self {
      base: 1.0,
      floor: -1.0,
      thumbs_up: 2.0,
      thumbs_down: -2.0,
      celebrate: 0.5,
      doubt: -0.5,
    }
  }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ScoringEngine {
  weights: ScoreWeights,
}

impl ScoringEngine {
  pub fn new(weights: ScoreWeights) -> Self {
    Self { weights }
  }

  pub fn weights(&self) -> ScoreWeights {
    self.weights
  }

  fn weight_of(&self, content: &ReactionContent) -> f64 {
    let w = &self.weights;

    match content {
      ReactionContent::ThumbsUp => w.thumbs_up,
      ReactionContent::ThumbsDown => w.thumbs_down,
      ReactionContent::Heart | ReactionContent::Hooray | ReactionContent::Rocket => w.celebrate,
      ReactionContent::Confused | ReactionContent::Eyes => w.doubt,
      ReactionContent::Other(_) => 0.0,
    }
  }

  /// Score a comment from the reactions it had at `cutoff`.
  pub fn score(&self, reactions: &[Reaction], cutoff: DateTime<Utc>) -> f64 {
    let raw = reactions
      .iter()
      .filter(|r| r.created_at.map_or(true, |t| t <= cutoff))
      .fold(self.weights.base, |acc, r| acc + self.weight_of(&r.content));

    raw.max(self.weights.floor)
  }

  /// Like [`score`](Self::score), but `None` (reactions could not be fetched) yields the base score.
  pub fn score_or_base(&self, reactions: Option<&[Reaction]>, cutoff: DateTime<Utc>) -> f64 {
    match reactions {
      Some(rs) => self.score(rs, cutoff),
      None => self.weights.base,
    }
  }
}
