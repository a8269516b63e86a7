// === Module Header (agents-tooling) START ===
// header: Parsed by scripts/check_module_headers.sh for purpose/role presence; keep keys on single-line entries.
// purpose: Decide per entity (PR, comments of a PR, reactions of a comment, reviews) whether the store or the remote answers
// role: cache/orchestrator
// inputs: DurableStore and RemoteSource trait objects; optional fixed "now"
// outputs: Fetched<T> { value, source } plus running CacheStats
// side_effects: Remote calls on miss; write-through upserts into the store
// invariants:
// - Confirmed absence answers empty without scanning the store or calling the remote
// - A comment list is a hit only when non-empty and no entry is older than the retention window
// - Reactions are reused only while reactions_checked and the reaction set itself is fresh; an empty set is cacheable
// - Store read failures fall through to the remote; store write failures are logged and never fail the read
// - Remote failures propagate for that one entity only
// errors: RemoteError for misses; anyhow only for explicit wipe
// tie_breakers: contracts > orchestration > correctness > performance > minimal_diffs
// === Module Header END ===

use std::cell::RefCell;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::model::{Aspect, CheckState, Comment, CommentKind, PrKey, PullRequest, Reaction, ReactionChannel, RepoRef, Review};
use crate::remote::{RemoteError, RemoteSource};
use crate::store::DurableStore;
use crate::window::DateWindow;

/// Cached comments, reactions and reviews are trusted for this many days.
pub const RETENTION_DAYS: i64 = 7;

/// Where a returned value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
  Store,
  Remote,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Fetched<T> {
  pub value: T,
  pub source: Source,
}

impl<T> Fetched<T> {
  fn store(value: T) -> Self {
    Self {
      value,
      source: Source::Store,
    }
  }

  fn remote(value: T) -> Self {
    Self {
      value,
      source: Source::Remote,
    }
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
  pub pr_hits: u32,
  pub pr_fetches: u32,
  pub comment_hits: u32,
  pub comment_absent_hits: u32,
  pub comment_fetches: u32,
  pub reaction_hits: u32,
  pub reaction_fetches: u32,
  pub review_hits: u32,
  pub review_fetches: u32,
  pub store_errors: u32,
}

pub struct CacheOrchestrator {
  remote: Box<dyn RemoteSource>,
  store: Box<dyn DurableStore>,
  retention: Duration,
  now_override: Option<DateTime<Utc>>,
  stats: RefCell<CacheStats>,
}

impl CacheOrchestrator {
  pub fn new(remote: Box<dyn RemoteSource>, store: Box<dyn DurableStore>) -> Self {
    Self {
      remote,
      store,
      retention: Duration::days(RETENTION_DAYS),
      now_override: None,
      stats: RefCell::new(CacheStats::default()),
    }
  }

  /// Pin "now" for staleness checks and cache stamps.
  pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
    self.now_override = Some(now);
    self
  }

  pub fn store(&self) -> &dyn DurableStore {
    self.store.as_ref()
  }

  pub fn stats(&self) -> CacheStats {
    *self.stats.borrow()
  }

  fn now(&self) -> DateTime<Utc> {
    self.now_override.unwrap_or_else(Utc::now)
  }

  fn is_stale(&self, cached_at: DateTime<Utc>) -> bool {
    self.now() - cached_at > self.retention
  }

  fn store_failed(&self, what: &str, err: &anyhow::Error) {
    self.stats.borrow_mut().store_errors += 1;
    warn!(error = %format!("{err:#}"), "{what}");
  }

  /// Wipe every cached record.
  pub fn clear(&self) -> anyhow::Result<()> {
    self.store.wipe()
  }

  /// List merged PRs from the remote and record them for later GetPR hits.
  pub fn list_merged_prs(&self, repo: &RepoRef, window: &DateWindow) -> Result<Vec<PullRequest>, RemoteError> {
    let mut prs = self.remote.list_merged_prs(repo, window)?;
    let now = self.now();

    for pr in &mut prs {
      pr.cached_at = now;
      self.backfill_pr(pr);
    }

    Ok(prs)
  }

  /// A stored PR with a title is complete; anything else is fetched and written through.
  pub fn get_pr(&self, key: &PrKey) -> Result<Fetched<PullRequest>, RemoteError> {
    match self.store.get_pr(key) {
      Ok(Some(pr)) if pr.is_complete() => {
        self.stats.borrow_mut().pr_hits += 1;
        debug!(pr = %key, "pr served from store");
        return Ok(Fetched::store(pr));
      }
      Ok(_) => {}
      Err(e) => self.store_failed("pr lookup failed; asking remote", &e),
    }

    let mut pr = self.remote.get_pr(key)?;
    self.stats.borrow_mut().pr_fetches += 1;
    pr.cached_at = self.now();
    self.backfill_pr(&pr);

    Ok(Fetched::remote(pr))
  }

  /// Comments of one kind for a PR.
  pub fn get_comments(&self, key: &PrKey, kind: CommentKind) -> Result<Fetched<Vec<Comment>>, RemoteError> {
    match self.store.get_pr(key) {
      Ok(Some(pr)) if pr.check_state(kind.aspect()) == CheckState::ConfirmedAbsent => {
        self.stats.borrow_mut().comment_absent_hits += 1;
        debug!(pr = %key, kind = kind.as_str(), "confirmed absent");
        return Ok(Fetched::store(Vec::new()));
      }
      Ok(_) => {}
      Err(e) => self.store_failed("pr lookup failed; asking remote", &e),
    }

    match self.store.list_comments(key, kind) {
      Ok(cached) if !cached.is_empty() && !cached.iter().any(|c| self.is_stale(c.cached_at)) => {
        self.stats.borrow_mut().comment_hits += 1;
        debug!(pr = %key, kind = kind.as_str(), count = cached.len(), "comments served from store");
        return Ok(Fetched::store(cached));
      }
      Ok(cached) => debug!(pr = %key, kind = kind.as_str(), cached = cached.len(), "comments missing or stale"),
      Err(e) => self.store_failed("comment scan failed; asking remote", &e),
    }

    self.ensure_pr(key);

    let mut comments = self.remote.list_comments(key, kind)?;
    self.stats.borrow_mut().comment_fetches += 1;
    let now = self.now();

    for c in &mut comments {
      c.cached_at = now;
    }

    self.backfill_comments(key, kind, &comments);

    Ok(Fetched::remote(comments))
  }

  /// Reactions of one comment on one channel.
  pub fn get_reactions(
    &self,
    repo: &RepoRef,
    comment_id: i64,
    channel: ReactionChannel,
  ) -> Result<Fetched<Vec<Reaction>>, RemoteError> {
    match self.store.get_comment(comment_id) {
      Ok(Some(c)) if c.reactions_checked && c.reactions_cached_at.is_some_and(|t| !self.is_stale(t)) => {
        match self.store.list_reactions(comment_id, channel) {
          Ok(reactions) => {
            self.stats.borrow_mut().reaction_hits += 1;
            return Ok(Fetched::store(reactions));
          }
          Err(e) => self.store_failed("reaction scan failed; asking remote", &e),
        }
      }
      Ok(_) => {}
      Err(e) => self.store_failed("comment lookup failed; asking remote", &e),
    }

    let mut reactions = self.remote.list_reactions(repo, comment_id, channel)?;
    self.stats.borrow_mut().reaction_fetches += 1;
    let now = self.now();

    for r in &mut reactions {
      r.cached_at = now;
    }

    self.backfill_reactions(comment_id, channel, &reactions);

    Ok(Fetched::remote(reactions))
  }

  /// Reviews of a PR, under the same absence/staleness rules as comments.
  pub fn get_reviews(&self, key: &PrKey) -> Result<Fetched<Vec<Review>>, RemoteError> {
    match self.store.get_pr(key) {
      Ok(Some(pr)) if pr.reviews == CheckState::ConfirmedAbsent => {
        self.stats.borrow_mut().review_hits += 1;
        return Ok(Fetched::store(Vec::new()));
      }
      Ok(_) => {}
      Err(e) => self.store_failed("pr lookup failed; asking remote", &e),
    }

    match self.store.list_reviews(key) {
      Ok(cached) if !cached.is_empty() && !cached.iter().any(|r| self.is_stale(r.cached_at)) => {
        self.stats.borrow_mut().review_hits += 1;
        return Ok(Fetched::store(cached));
      }
      Ok(_) => {}
      Err(e) => self.store_failed("review scan failed; asking remote", &e),
    }

    self.ensure_pr(key);

    let mut reviews = self.remote.list_reviews(key)?;
    self.stats.borrow_mut().review_fetches += 1;
    let now = self.now();

    for r in &mut reviews {
      r.cached_at = now;
      if let Err(e) = self.store.upsert_review(r) {
        self.store_failed("review write-through failed", &e);
      }
    }

    self.mark(key, Aspect::Reviews, !reviews.is_empty());

    Ok(Fetched::remote(reviews))
  }

  // --- write-through helpers: never fail the read ---

  fn ensure_pr(&self, key: &PrKey) {
    if let Err(e) = self.get_pr(key) {
      warn!(pr = %key, error = %e, "could not backfill pr record");
    }
  }

  fn backfill_pr(&self, pr: &PullRequest) {
    if let Err(e) = self.store.upsert_pr(pr) {
      self.store_failed("pr write-through failed", &e);
    }
  }

  fn backfill_comments(&self, key: &PrKey, kind: CommentKind, comments: &[Comment]) {
    for c in comments {
      if let Err(e) = self.store.upsert_comment(c) {
        self.store_failed("comment write-through failed", &e);
      }
    }

    let ids: Vec<i64> = comments.iter().map(|c| c.id).collect();

    match self.store.retain_comments(key, kind, &ids) {
      Ok(0) => {}
      Ok(n) => debug!(pr = %key, kind = kind.as_str(), removed = n, "dropped comments gone upstream"),
      Err(e) => self.store_failed("comment prune failed", &e),
    }

    self.mark(key, kind.aspect(), !comments.is_empty());
  }

  fn backfill_reactions(&self, comment_id: i64, channel: ReactionChannel, reactions: &[Reaction]) {
    if let Err(e) = self.store.replace_reactions(comment_id, channel, reactions) {
      self.store_failed("reaction write-through failed", &e);
      return;
    }

    if let Err(e) = self.store.mark_reactions_checked(comment_id, self.now()) {
      self.store_failed("marking reactions checked failed", &e);
    }
  }

  fn mark(&self, key: &PrKey, aspect: Aspect, found: bool) {
    if let Err(e) = self.store.mark_checked(key, aspect, CheckState::from_found(found), self.now()) {
      self.store_failed("check-state update failed", &e);
    }
  }
}
