//! File-backed [`RemoteSource`] used for offline runs and end-to-end tests.
//!
//! The fixture is one JSON document holding REST-shaped payloads:
//!
//! ```json
//! {
//!   "pulls":           { "acme/widgets": [ { "number": 1, "merged_at": "...", ... } ] },
//!   "issue_comments":  { "acme/widgets#1": [ ... ] },
//!   "review_comments": { "acme/widgets#1": [ ... ] },
//!   "reviews":         { "acme/widgets#1": [ ... ] },
//!   "reactions":       { "issue_comment:101": [ ... ], "review_comment:202": [ ... ] },
//!   "fail":            [ "issue_comments:acme/widgets#2" ]
//! }
//! ```
//!
//! Missing list entries read as empty lists. Entries named in `fail` answer
//! with HTTP 502 so that per-entity error handling can be exercised.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use serde_json::Value;

use super::{
  comment_from_json, map_items, merged_in_window, pr_from_json, reaction_from_json, review_from_json, RemoteError,
  RemoteSource,
};
use crate::model::{Comment, CommentKind, PrKey, PullRequest, Reaction, ReactionChannel, RepoRef, Review};
use crate::window::DateWindow;

pub const FIXTURE_ENV: &str = "PR_CHAMPION_FIXTURE";

pub struct FixtureSource {
  doc: Value,
}

impl FixtureSource {
  pub fn from_value(doc: Value) -> Self {
    Self { doc }
  }

  pub fn from_path(path: &Path) -> Result<Self> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading fixture {}", path.display()))?;
    let doc: Value = serde_json::from_str(&text).with_context(|| format!("parsing fixture {}", path.display()))?;

    Ok(Self::from_value(doc))
  }

  /// Build from `PR_CHAMPION_FIXTURE` when it is set.
  pub fn from_env() -> Result<Option<Self>> {
    match std::env::var(FIXTURE_ENV) {
      Ok(p) if !p.trim().is_empty() => Self::from_path(Path::new(p.trim())).map(Some),
      _ => Ok(None),
    }
  }

  fn check(&self, entry: &str) -> Result<(), RemoteError> {
    let failing = self
      .doc
      .get("fail")
      .and_then(Value::as_array)
      .is_some_and(|xs| xs.iter().any(|x| x.as_str() == Some(entry)));

    if failing {
      return Err(RemoteError::Status {
        code: 502,
        url: format!("fixture://{entry}"),
      });
    }

    Ok(())
  }

  fn section(&self, section: &str, key: &str) -> Result<Value, RemoteError> {
    self.check(&format!("{section}:{key}"))?;

    Ok(
      self
        .doc
        .get(section)
        .and_then(|s| s.get(key))
        .cloned()
        .unwrap_or_else(|| Value::Array(Vec::new())),
    )
  }
}

impl RemoteSource for FixtureSource {
  fn list_merged_prs(&self, repo: &RepoRef, window: &DateWindow) -> Result<Vec<PullRequest>, RemoteError> {
    let slug = repo.to_string();
    let payload = self.section("pulls", &slug)?;
    let now = Utc::now();
    let prs = map_items(&payload, &slug, |v| pr_from_json(repo, v, now))?;

    Ok(merged_in_window(prs, window))
  }

  fn get_pr(&self, key: &PrKey) -> Result<PullRequest, RemoteError> {
    let slug = key.repo_slug();
    self.check(&format!("pr:{key}"))?;

    let repo = RepoRef::new(key.owner.clone(), key.repo.clone());
    let payload = self.section("pulls", &slug)?;
    let found = payload
      .as_array()
      .and_then(|xs| xs.iter().find(|v| v.get("number").and_then(Value::as_u64) == Some(key.number)))
      .and_then(|v| pr_from_json(&repo, v, Utc::now()));

    found.ok_or_else(|| RemoteError::Status {
      code: 404,
      url: format!("fixture://pr:{key}"),
    })
  }

  fn list_issue_comments(&self, key: &PrKey) -> Result<Vec<Comment>, RemoteError> {
    let payload = self.section("issue_comments", &key.to_string())?;
    let now = Utc::now();

    map_items(&payload, "fixture://issue_comments", |v| {
      comment_from_json(key, CommentKind::Issue, v, now)
    })
  }

  fn list_review_comments(&self, key: &PrKey) -> Result<Vec<Comment>, RemoteError> {
    let payload = self.section("review_comments", &key.to_string())?;
    let now = Utc::now();

    map_items(&payload, "fixture://review_comments", |v| {
      comment_from_json(key, CommentKind::Review, v, now)
    })
  }

  fn list_reactions(
    &self,
    _repo: &RepoRef,
    comment_id: i64,
    channel: ReactionChannel,
  ) -> Result<Vec<Reaction>, RemoteError> {
    let payload = self.section("reactions", &format!("{}:{}", channel.as_str(), comment_id))?;
    let now = Utc::now();

    map_items(&payload, "fixture://reactions", |v| {
      reaction_from_json(comment_id, channel, v, now)
    })
  }

  fn list_reviews(&self, key: &PrKey) -> Result<Vec<Review>, RemoteError> {
    let payload = self.section("reviews", &key.to_string())?;
    let now = Utc::now();

    map_items(&payload, "fixture://reviews", |v| review_from_json(key, v, now))
  }
}
