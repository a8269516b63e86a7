// === Module Header (agents-tooling) START ===
// header: Parsed by scripts/check_module_headers.sh for purpose/role presence; keep keys on single-line entries.
// purpose: Trait seam for the remote pull-request source plus JSON-to-model mapping shared by implementations
// role: remote/contract
// inputs: GitHub REST JSON payloads (pulls, issue/review comments, reactions, reviews)
// outputs: Typed model records stamped with the fetch time
// invariants:
// - Every failure is entity-scoped (RemoteError) and never panics
// - list_merged_prs returns only merged PRs with start <= merged_at < end + 1 day
// - Malformed list items are skipped, not fatal
// errors: RemoteError { Transport, Status, Decode }
// tie_breakers: contracts > orchestration > correctness > performance > minimal_diffs
// === Module Header END ===

pub mod fixture;
pub mod github;

pub use fixture::FixtureSource;
pub use github::{get_github_token, GithubHttpSource};

use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::ext::serde_json::JsonFetch;
use crate::model::{
  CheckState, Comment, CommentKind, PrKey, PrSize, PullRequest, Reaction, ReactionChannel, ReactionContent, RepoRef,
  Review,
};
use crate::window::DateWindow;

#[derive(Debug, Error)]
pub enum RemoteError {
  #[error("request to {url} failed: {message}")]
  Transport { url: String, message: String },
  #[error("GitHub answered HTTP {code} for {url}")]
  Status { code: u16, url: String },
  #[error("unexpected payload from {url}: {message}")]
  Decode { url: String, message: String },
}

pub trait RemoteSource {
  fn list_merged_prs(&self, repo: &RepoRef, window: &DateWindow) -> Result<Vec<PullRequest>, RemoteError>;
  fn get_pr(&self, key: &PrKey) -> Result<PullRequest, RemoteError>;
  fn list_issue_comments(&self, key: &PrKey) -> Result<Vec<Comment>, RemoteError>;
  fn list_review_comments(&self, key: &PrKey) -> Result<Vec<Comment>, RemoteError>;
  fn list_reactions(
    &self,
    repo: &RepoRef,
    comment_id: i64,
    channel: ReactionChannel,
  ) -> Result<Vec<Reaction>, RemoteError>;
  fn list_reviews(&self, key: &PrKey) -> Result<Vec<Review>, RemoteError>;

  fn list_comments(&self, key: &PrKey, kind: CommentKind) -> Result<Vec<Comment>, RemoteError> {
    match kind {
      CommentKind::Issue => self.list_issue_comments(key),
      CommentKind::Review => self.list_review_comments(key),
    }
  }
}

fn as_items<'a>(payload: &'a Value, url: &str) -> Result<&'a Vec<Value>, RemoteError> {
  payload.as_array().ok_or_else(|| RemoteError::Decode {
    url: url.to_string(),
    message: "expected a JSON array".into(),
  })
}

/// Map a PR payload (list or detail shape). `None` when required fields are missing.
pub(crate) fn pr_from_json(repo: &RepoRef, v: &Value, now: DateTime<Utc>) -> Option<PullRequest> {
  let number: u64 = v.fetch("number").to()?;
  let size = match (
    v.fetch("additions").to::<u64>(),
    v.fetch("deletions").to::<u64>(),
    v.fetch("changed_files").to::<u64>(),
  ) {
    (Some(additions), Some(deletions), Some(changed_files)) => Some(PrSize {
      additions,
      deletions,
      changed_files,
    }),
    _ => None,
  };

  Some(PullRequest {
    key: PrKey::new(repo.owner.clone(), repo.name.clone(), number),
    title: v.fetch("title").to_or_default(),
    author: v.fetch("user.login").to_or_default(),
    merged_at: v.fetch("merged_at").to_utc(),
    size,
    issue_comments: CheckState::Unknown,
    review_comments: CheckState::Unknown,
    reviews: CheckState::Unknown,
    cached_at: now,
  })
}

pub(crate) fn comment_from_json(key: &PrKey, kind: CommentKind, v: &Value, now: DateTime<Utc>) -> Option<Comment> {
  let created_at = v.fetch("created_at").to_utc()?;

  Some(Comment {
    id: v.fetch("id").to()?,
    pr: key.clone(),
    kind,
    author: v.fetch("user.login").to_or_default(),
    body: v.fetch("body").to_or_default(),
    created_at,
    updated_at: v.fetch("updated_at").to_utc().unwrap_or(created_at),
    cached_at: now,
    reactions_checked: false,
    reactions_cached_at: None,
  })
}

pub(crate) fn reaction_from_json(
  comment_id: i64,
  channel: ReactionChannel,
  v: &Value,
  now: DateTime<Utc>,
) -> Option<Reaction> {
  let tag: String = v.fetch("content").to()?;

  Some(Reaction {
    comment_id,
    channel,
    content: ReactionContent::from_tag(&tag),
    author: v.fetch("user.login").to_or_default(),
    created_at: v.fetch("created_at").to_utc(),
    cached_at: now,
  })
}

pub(crate) fn review_from_json(key: &PrKey, v: &Value, now: DateTime<Utc>) -> Option<Review> {
  Some(Review {
    id: v.fetch("id").to()?,
    pr: key.clone(),
    author: v.fetch("user.login").to_or_default(),
    state: v.fetch("state").to_or_default(),
    submitted_at: v.fetch("submitted_at").to_utc(),
    cached_at: now,
  })
}

/// Map every item of a list payload, skipping entries the mapper rejects.
pub(crate) fn map_items<T>(
  payload: &Value,
  url: &str,
  mut map: impl FnMut(&Value) -> Option<T>,
) -> Result<Vec<T>, RemoteError> {
  let items = as_items(payload, url)?;
  let mut out = Vec::with_capacity(items.len());

  for item in items {
    match map(item) {
      Some(x) => out.push(x),
      None => debug!(url, "skipping malformed item"),
    }
  }

  Ok(out)
}

/// Keep merged PRs inside the window, in payload order.
pub(crate) fn merged_in_window(prs: Vec<PullRequest>, window: &DateWindow) -> Vec<PullRequest> {
  prs
    .into_iter()
    .filter(|pr| pr.merged_at.is_some_and(|t| window.contains_merge(t)))
    .collect()
}
