// === Module Header (agents-tooling) START ===
// header: Parsed by scripts/check_module_headers.sh for purpose/role presence; keep keys on single-line entries.
// purpose: Define the entity records (PRs, comments, reactions, reviews) and the derived weekly/user statistics
// role: model/types
// outputs: Serializable structs shared by the store, the remote source, the cache orchestrator and the aggregator
// invariants:
// - A per-aspect check state is a single three-valued enum; "checked without a result" is unrepresentable
// - Comment kind and reaction channel are closed enums; unknown reaction tags pass through as Other
// - Tally preserves first-insertion order of users
// tie_breakers: contracts > orchestration > correctness > performance > minimal_diffs
// === Module Header END ===

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

/// A GitHub repository, `owner/name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RepoRef {
  pub owner: String,
  pub name: String,
}

impl RepoRef {
  pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
    Self {
      owner: owner.into(),
      name: name.into(),
    }
  }
}

impl fmt::Display for RepoRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}/{}", self.owner, self.name)
  }
}

/// Natural key of a pull request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PrKey {
  pub owner: String,
  pub repo: String,
  pub number: u64,
}

impl PrKey {
  pub fn new(owner: impl Into<String>, repo: impl Into<String>, number: u64) -> Self {
    Self {
      owner: owner.into(),
      repo: repo.into(),
      number,
    }
  }

  pub fn repo_slug(&self) -> String {
    format!("{}/{}", self.owner, self.repo)
  }
}

impl fmt::Display for PrKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}/{}#{}", self.owner, self.repo, self.number)
  }
}

/// What we know about one aspect (issue comments, review comments, reviews) of a PR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckState {
  /// Never checked against the remote.
  #[default]
  Unknown,
  /// Checked; the remote had nothing.
  ConfirmedAbsent,
  /// Checked; the remote returned at least one entry.
  ConfirmedPresent,
}

impl CheckState {
  pub fn from_found(found: bool) -> Self {
    if found {
      CheckState::ConfirmedPresent
    } else {
      CheckState::ConfirmedAbsent
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      CheckState::Unknown => "unknown",
      CheckState::ConfirmedAbsent => "absent",
      CheckState::ConfirmedPresent => "present",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "unknown" => Some(CheckState::Unknown),
      "absent" => Some(CheckState::ConfirmedAbsent),
      "present" => Some(CheckState::ConfirmedPresent),
      _ => None,
    }
  }
}

/// PR aspects that carry a [`CheckState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Aspect {
  IssueComments,
  ReviewComments,
  Reviews,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrSize {
  pub additions: u64,
  pub deletions: u64,
  pub changed_files: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullRequest {
  pub key: PrKey,
  pub title: String,
  pub author: String,
  pub merged_at: Option<DateTime<Utc>>,
  pub size: Option<PrSize>,
  pub issue_comments: CheckState,
  pub review_comments: CheckState,
  pub reviews: CheckState,
  pub cached_at: DateTime<Utc>,
}

impl PullRequest {
  /// A record with a title has been filled from a full PR payload.
  pub fn is_complete(&self) -> bool {
    !self.title.trim().is_empty()
  }

  pub fn check_state(&self, aspect: Aspect) -> CheckState {
    match aspect {
      Aspect::IssueComments => self.issue_comments,
      Aspect::ReviewComments => self.review_comments,
      Aspect::Reviews => self.reviews,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommentKind {
  Issue,
  Review,
}

impl CommentKind {
  pub const ALL: [CommentKind; 2] = [CommentKind::Issue, CommentKind::Review];

  pub fn as_str(self) -> &'static str {
    match self {
      CommentKind::Issue => "issue",
      CommentKind::Review => "review",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "issue" => Some(CommentKind::Issue),
      "review" => Some(CommentKind::Review),
      _ => None,
    }
  }

  /// Reaction channel that belongs to comments of this kind.
  pub fn channel(self) -> ReactionChannel {
    match self {
      CommentKind::Issue => ReactionChannel::IssueComment,
      CommentKind::Review => ReactionChannel::ReviewComment,
    }
  }

  pub fn aspect(self) -> Aspect {
    match self {
      CommentKind::Issue => Aspect::IssueComments,
      CommentKind::Review => Aspect::ReviewComments,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReactionChannel {
  IssueComment,
  ReviewComment,
}

impl ReactionChannel {
  pub fn as_str(self) -> &'static str {
    match self {
      ReactionChannel::IssueComment => "issue_comment",
      ReactionChannel::ReviewComment => "review_comment",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "issue_comment" => Some(ReactionChannel::IssueComment),
      "review_comment" => Some(ReactionChannel::ReviewComment),
      _ => None,
    }
  }
}

/// Reaction content tag as GitHub spells it (`+1`, `-1`, `heart`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ReactionContent {
  ThumbsUp,
  ThumbsDown,
  Heart,
  Hooray,
  Rocket,
  Confused,
  Eyes,
  Other(String),
}

impl ReactionContent {
  pub fn from_tag(tag: &str) -> Self {
    match tag {
      "+1" => ReactionContent::ThumbsUp,
      "-1" => ReactionContent::ThumbsDown,
      "heart" => ReactionContent::Heart,
      "hooray" => ReactionContent::Hooray,
      "rocket" => ReactionContent::Rocket,
      "confused" => ReactionContent::Confused,
      "eyes" => ReactionContent::Eyes,
      other => ReactionContent::Other(other.to_string()),
    }
  }

  pub fn as_tag(&self) -> &str {
    match self {
      ReactionContent::ThumbsUp => "+1",
      ReactionContent::ThumbsDown => "-1",
      ReactionContent::Heart => "heart",
      ReactionContent::Hooray => "hooray",
      ReactionContent::Rocket => "rocket",
      ReactionContent::Confused => "confused",
      ReactionContent::Eyes => "eyes",
      ReactionContent::Other(tag) => tag,
    }
  }
}

impl From<String> for ReactionContent {
  fn from(tag: String) -> Self {
    ReactionContent::from_tag(&tag)
  }
}

impl From<ReactionContent> for String {
  fn from(content: ReactionContent) -> Self {
    content.as_tag().to_string()
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
  pub id: i64,
  pub pr: PrKey,
  pub kind: CommentKind,
  pub author: String,
  pub body: String,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
  pub cached_at: DateTime<Utc>,
  pub reactions_checked: bool,
  /// When the stored reaction set was last fetched; owned by the store.
  pub reactions_cached_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reaction {
  pub comment_id: i64,
  pub channel: ReactionChannel,
  pub content: ReactionContent,
  pub author: String,
  pub created_at: Option<DateTime<Utc>>,
  pub cached_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
  pub id: i64,
  pub pr: PrKey,
  pub author: String,
  pub state: String,
  pub submitted_at: Option<DateTime<Utc>>,
  pub cached_at: DateTime<Utc>,
}

impl Review {
  pub fn is_approval(&self) -> bool {
    self.state.eq_ignore_ascii_case("APPROVED")
  }
}

/// Per-user running totals that remember the order users first appeared in.
#[derive(Debug, Clone, PartialEq)]
pub struct Tally<T> {
  entries: Vec<(String, T)>,
}

impl<T> Default for Tally<T> {
  fn default() -> Self {
    Self { entries: Vec::new() }
  }
}

impl<T> Tally<T>
where
  T: Copy + PartialOrd + std::ops::AddAssign,
{
  pub fn add(&mut self, user: &str, amount: T) {
    match self.entries.iter_mut().find(|(u, _)| u == user) {
      Some((_, v)) => *v += amount,
      None => self.entries.push((user.to_string(), amount)),
    }
  }

  pub fn get(&self, user: &str) -> Option<T> {
    self.entries.iter().find(|(u, _)| u == user).map(|(_, v)| *v)
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, T)> + '_ {
    self.entries.iter().map(|(u, v)| (u.as_str(), *v))
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// The user with the strictly greatest value above `floor`.
  ///
  /// A later user only displaces the current leader by beating it, so on an
  /// exact tie the user seen first keeps the lead.
  pub fn leader_above(&self, floor: T) -> Option<&str> {
    let mut best: Option<(&str, T)> = None;

    for (user, value) in self.iter() {
      let threshold = best.map(|(_, v)| v).unwrap_or(floor);

      if value > threshold {
        best = Some((user, value));
      }
    }

    best.map(|(u, _)| u)
  }
}

impl<T: Serialize> Serialize for Tally<T> {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(self.entries.len()))?;

    for (user, value) in &self.entries {
      map.serialize_entry(user, value)?;
    }

    map.end()
  }
}

/// One Monday-anchored calendar week of activity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeekBucket {
  pub start: DateTime<Utc>,
  pub end: DateTime<Utc>,
  pub pr_counts: Tally<u32>,
  pub comment_counts: Tally<u32>,
  pub weighted_scores: Tally<f64>,
  pub review_counts: Tally<u32>,
  pub approval_counts: Tally<u32>,
  /// `owner/name` -> per-user merged PR count.
  pub repo_prs: BTreeMap<String, Tally<u32>>,
  pub pr_winner: Option<String>,
  pub comment_winner: Option<String>,
  pub weighted_winner: Option<String>,
}

impl WeekBucket {
  pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
    Self {
      start,
      end,
      pr_counts: Tally::default(),
      comment_counts: Tally::default(),
      weighted_scores: Tally::default(),
      review_counts: Tally::default(),
      approval_counts: Tally::default(),
      repo_prs: BTreeMap::new(),
      pr_winner: None,
      comment_winner: None,
      weighted_winner: None,
    }
  }
}

/// Cumulative per-user statistics over every folded week.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UserStat {
  pub prs_count: u32,
  pub weekly_wins: u32,
  pub total_score: u32,
  pub comments_count: u32,
  pub comment_weekly_wins: u32,
  pub comment_score: u32,
  pub weighted_comment_score: f64,
  pub weighted_weekly_wins: u32,
  pub weighted_weekly_score: u32,
  pub reviews_count: u32,
  pub approvals_count: u32,
  pub repo_prs: BTreeMap<String, u32>,
}
