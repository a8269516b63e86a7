// === Module Header (agents-tooling) START ===
// header: Parsed by scripts/check_module_headers.sh for purpose/role presence; keep keys on single-line entries.
// purpose: Blocking GitHub REST client implementing RemoteSource (token discovery, paginated GETs)
// role: remote/github-http
// inputs: API token; owner/repo/number/comment ids; date window for merged PR listing
// outputs: Model records mapped from JSON payloads
// side_effects: Network calls to api.github.com; spawns `gh` subprocess for token fallback
// invariants:
// - Follows Link rel="next" until exhausted (or, for PR listing, until pages predate the window)
// - Exactly one attempt per page; no retry or rate-limit handling
// - Token discovery prefers GITHUB_TOKEN, then GH_TOKEN, then `gh auth token`
// errors: RemoteError; transport, HTTP status and body decoding are distinguished
// tie_breakers: contracts > orchestration > correctness > performance > minimal_diffs
// === Module Header END ===

use std::time::Duration;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

use super::{
  comment_from_json, map_items, merged_in_window, pr_from_json, reaction_from_json, review_from_json, RemoteError,
  RemoteSource,
};
use crate::ext::serde_json::JsonFetch;
use crate::model::{Comment, CommentKind, PrKey, PullRequest, Reaction, ReactionChannel, RepoRef, Review};
use crate::window::DateWindow;

pub const DEFAULT_API_BASE: &str = "https://api.github.com";
const USER_AGENT: &str = "pr-champion";
const PER_PAGE: u32 = 100;

/// Discover a GitHub token: env vars first, then `gh auth token` if available.
pub fn get_github_token() -> Option<String> {
  for var in ["GITHUB_TOKEN", "GH_TOKEN"] {
    if let Ok(t) = std::env::var(var) {
      if !t.trim().is_empty() {
        return Some(t.trim().to_string());
      }
    }
  }

  if let Ok(output) = std::process::Command::new("gh").args(["auth", "token"]).output() {
    if output.status.success() {
      let t = String::from_utf8_lossy(&output.stdout).trim().to_string();

      if !t.is_empty() {
        return Some(t);
      }
    }
  }

  None
}

/// Extract the `rel="next"` target from a Link header.
pub fn next_link(header: &str) -> Option<String> {
  static RE_NEXT: Lazy<Regex> = Lazy::new(|| Regex::new(r#"<([^>]+)>;\s*rel="next""#).unwrap());

  RE_NEXT
    .captures(header)
    .and_then(|c| c.get(1))
    .map(|m| m.as_str().to_string())
}

pub struct GithubHttpSource {
  agent: ureq::Agent,
  token: String,
  base: String,
}

impl GithubHttpSource {
  pub fn new(token: impl Into<String>) -> Self {
    Self::with_base_url(DEFAULT_API_BASE, token)
  }

  pub fn with_base_url(base: &str, token: impl Into<String>) -> Self {
    let agent: ureq::Agent = ureq::Agent::config_builder()
      .timeout_global(Some(Duration::from_secs(30)))
      .build()
      .into();

    Self {
      agent,
      token: token.into(),
      base: base.trim_end_matches('/').to_string(),
    }
  }

  fn repo_url(&self, owner: &str, repo: &str, tail: &str) -> String {
    format!("{}/repos/{}/{}/{}", self.base, owner, repo, tail)
  }

  fn get_page(&self, url: &str) -> Result<(Value, Option<String>), RemoteError> {
    let resp = self
      .agent
      .get(url)
      .header("Accept", "application/vnd.github+json")
      .header("X-GitHub-Api-Version", "2022-11-28")
      .header("User-Agent", USER_AGENT)
      .header("Authorization", format!("Bearer {}", self.token))
      .call();

    let mut resp = match resp {
      Ok(r) => r,
      Err(ureq::Error::StatusCode(code)) => {
        return Err(RemoteError::Status {
          code,
          url: url.to_string(),
        })
      }
      Err(e) => {
        return Err(RemoteError::Transport {
          url: url.to_string(),
          message: e.to_string(),
        })
      }
    };

    let next = resp
      .headers()
      .get("link")
      .and_then(|v| v.to_str().ok())
      .and_then(next_link);

    let body = resp
      .body_mut()
      .read_json::<Value>()
      .map_err(|e| RemoteError::Decode {
        url: url.to_string(),
        message: e.to_string(),
      })?;

    Ok((body, next))
  }

  /// GET every page, letting `more` stop early after inspecting a page.
  fn get_all(&self, first: &str, mut more: impl FnMut(&[Value]) -> bool) -> Result<Value, RemoteError> {
    let mut items: Vec<Value> = Vec::new();
    let mut url = Some(first.to_string());

    while let Some(current) = url.take() {
      let (page, next) = self.get_page(&current)?;
      let Some(page_items) = page.as_array() else {
        return Err(RemoteError::Decode {
          url: current,
          message: "expected a JSON array".into(),
        });
      };

      debug!(url = %current, count = page_items.len(), "fetched page");

      let keep_going = more(page_items);
      items.extend(page_items.iter().cloned());

      if keep_going {
        url = next;
      }
    }

    Ok(Value::Array(items))
  }

  fn list_for_pr(&self, key: &PrKey, tail: &str) -> Result<(String, Value), RemoteError> {
    let url = self.repo_url(&key.owner, &key.repo, &format!("{tail}?per_page={PER_PAGE}"));
    let payload = self.get_all(&url, |_| true)?;

    Ok((url, payload))
  }
}

/// A page sorted by `updated` descending whose last entry predates `start`
/// cannot be followed by PRs merged inside the window.
fn page_reaches_window(items: &[Value], start: DateTime<Utc>) -> bool {
  match items.last().and_then(|v| v.fetch("updated_at").to_utc()) {
    Some(updated) => updated >= start,
    None => true,
  }
}

impl RemoteSource for GithubHttpSource {
  fn list_merged_prs(&self, repo: &RepoRef, window: &DateWindow) -> Result<Vec<PullRequest>, RemoteError> {
    let url = self.repo_url(
      &repo.owner,
      &repo.name,
      &format!("pulls?state=closed&sort=updated&direction=desc&per_page={PER_PAGE}"),
    );
    let payload = self.get_all(&url, |items| page_reaches_window(items, window.start))?;
    let now = Utc::now();
    let prs = map_items(&payload, &url, |v| pr_from_json(repo, v, now))?;

    Ok(merged_in_window(prs, window))
  }

  fn get_pr(&self, key: &PrKey) -> Result<PullRequest, RemoteError> {
    let url = self.repo_url(&key.owner, &key.repo, &format!("pulls/{}", key.number));
    let (payload, _) = self.get_page(&url)?;
    let repo = RepoRef::new(key.owner.clone(), key.repo.clone());

    pr_from_json(&repo, &payload, Utc::now()).ok_or_else(|| RemoteError::Decode {
      url,
      message: "pull request payload without a number".into(),
    })
  }

  fn list_issue_comments(&self, key: &PrKey) -> Result<Vec<Comment>, RemoteError> {
    let (url, payload) = self.list_for_pr(key, &format!("issues/{}/comments", key.number))?;
    let now = Utc::now();

    map_items(&payload, &url, |v| comment_from_json(key, CommentKind::Issue, v, now))
  }

  fn list_review_comments(&self, key: &PrKey) -> Result<Vec<Comment>, RemoteError> {
    let (url, payload) = self.list_for_pr(key, &format!("pulls/{}/comments", key.number))?;
    let now = Utc::now();

    map_items(&payload, &url, |v| comment_from_json(key, CommentKind::Review, v, now))
  }

  fn list_reactions(
    &self,
    repo: &RepoRef,
    comment_id: i64,
    channel: ReactionChannel,
  ) -> Result<Vec<Reaction>, RemoteError> {
    let tail = match channel {
      ReactionChannel::IssueComment => format!("issues/comments/{comment_id}/reactions?per_page={PER_PAGE}"),
      ReactionChannel::ReviewComment => format!("pulls/comments/{comment_id}/reactions?per_page={PER_PAGE}"),
    };
    let url = self.repo_url(&repo.owner, &repo.name, &tail);
    let payload = self.get_all(&url, |_| true)?;
    let now = Utc::now();

    map_items(&payload, &url, |v| reaction_from_json(comment_id, channel, v, now))
  }

  fn list_reviews(&self, key: &PrKey) -> Result<Vec<Review>, RemoteError> {
    let (url, payload) = self.list_for_pr(key, &format!("pulls/{}/reviews", key.number))?;
    let now = Utc::now();

    map_items(&payload, &url, |v| review_from_json(key, v, now))
  }
}
