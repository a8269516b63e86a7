// === Module Header (agents-tooling) START ===
// header: Parsed by scripts/check_module_headers.sh for purpose/role presence; keep keys on single-line entries.
// purpose: Trait seam for durable entity storage consulted by the cache orchestrator
// role: store/contract
// outputs: DurableStore trait; SqliteStore implementation re-exported
// invariants:
// - PR upserts never touch check states; only mark_checked writes them, and never back to Unknown
// - Comment upserts never clear reactions_checked or renew reactions_cached_at
// - replace_reactions is all-or-nothing
// errors: anyhow::Result with context; callers decide whether a failure is fatal
// tie_breakers: contracts > orchestration > correctness > performance > minimal_diffs
// === Module Header END ===

pub mod sqlite;

pub use sqlite::SqliteStore;

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::model::{
  Aspect, CheckState, Comment, CommentKind, PrKey, PullRequest, Reaction, ReactionChannel, Review,
};

pub trait DurableStore {
  fn get_pr(&self, key: &PrKey) -> Result<Option<PullRequest>>;
  fn upsert_pr(&self, pr: &PullRequest) -> Result<()>;
  /// Record the outcome of checking one aspect of a PR, creating a stub row if needed.
  fn mark_checked(&self, key: &PrKey, aspect: Aspect, state: CheckState, at: DateTime<Utc>) -> Result<()>;

  fn get_comment(&self, id: i64) -> Result<Option<Comment>>;
  fn upsert_comment(&self, comment: &Comment) -> Result<()>;
  /// Comments of one PR and kind, oldest first.
  fn list_comments(&self, key: &PrKey, kind: CommentKind) -> Result<Vec<Comment>>;
  /// Drop stored comments of this PR/kind whose ids are not in `keep`, with their reactions.
  fn retain_comments(&self, key: &PrKey, kind: CommentKind, keep: &[i64]) -> Result<usize>;
  /// Set reactions_checked and stamp the reaction set as fetched at `at`.
  fn mark_reactions_checked(&self, comment_id: i64, at: DateTime<Utc>) -> Result<()>;

  fn list_reactions(&self, comment_id: i64, channel: ReactionChannel) -> Result<Vec<Reaction>>;
  /// Replace the stored reaction set of a comment on one channel in a single transaction.
  fn replace_reactions(&self, comment_id: i64, channel: ReactionChannel, reactions: &[Reaction]) -> Result<()>;

  /// Reviews of one PR ordered by submission time.
  fn list_reviews(&self, key: &PrKey) -> Result<Vec<Review>>;
  fn upsert_review(&self, review: &Review) -> Result<()>;

  /// Delete every stored record.
  fn wipe(&self) -> Result<()>;
}
