// === Module Header (agents-tooling) START ===
// header: Parsed by scripts/check_module_headers.sh for purpose/role presence; keep keys on single-line entries.
// purpose: Bucket merged PRs, comments and reviews into Monday-anchored weeks, pick weekly winners, fold into per-user stats
// role: aggregation/weekly
// inputs: PullRequest records (merged), Comment records with precomputed scores, optional Review records
// outputs: WeeklyResult { weeks ascending by start, users keyed by login }
// invariants:
// - Comments and reviews land in the week of their PR's merge, never their own timestamp
// - Bots, self-comments and post-merge comments never reach a tally
// - Winners need a strictly greater value; ties keep the first user seen in that bucket
// - A weighted winner must score strictly above zero
// - finish() consumes the aggregator, so a bucket set is folded exactly once
// tie_breakers: contracts > orchestration > correctness > performance > minimal_diffs
// === Module Header END ===

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::{Comment, PullRequest, Review, UserStat, WeekBucket};
use crate::window::{week_end, week_start};

/// Logins (or fragments of logins) that belong to automation accounts.
pub const BOT_DENYLIST: [&str; 10] = [
  "grupogcb",
  "sonarqubecloud",
  "copilot",
  "github-actions",
  "dependabot",
  "codecov",
  "sonarcloud",
  "renovate",
  "greenkeeper",
  "snyk-bot",
];

pub const BOT_SUFFIX: &str = "[bot]";

/// Case-insensitive denylist match (substring) or a GitHub app `[bot]` suffix.
pub fn is_excluded_user(login: &str) -> bool {
  let lower = login.to_lowercase();

  BOT_DENYLIST.iter().any(|b| lower.contains(b)) || lower.ends_with(BOT_SUFFIX)
}

/// Why an entry was left out of the weekly tallies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exclusion {
  Unmerged,
  Bot,
  SelfAuthored,
  AfterMerge,
}

/// Check whether a comment on `pr` may count; `None` means it does.
pub fn comment_exclusion(pr: &PullRequest, comment: &Comment) -> Option<Exclusion> {
  let Some(merged_at) = pr.merged_at else {
    return Some(Exclusion::Unmerged);
  };

  if is_excluded_user(&comment.author) {
    return Some(Exclusion::Bot);
  }

  if comment.author == pr.author {
    return Some(Exclusion::SelfAuthored);
  }

  if comment.created_at > merged_at {
    return Some(Exclusion::AfterMerge);
  }

  None
}

/// Same rules as comments; reviews without a submission time (pending) never count.
pub fn review_exclusion(pr: &PullRequest, review: &Review) -> Option<Exclusion> {
  let Some(merged_at) = pr.merged_at else {
    return Some(Exclusion::Unmerged);
  };

  if is_excluded_user(&review.author) {
    return Some(Exclusion::Bot);
  }

  if review.author == pr.author {
    return Some(Exclusion::SelfAuthored);
  }

  match review.submitted_at {
    Some(t) if t <= merged_at => None,
    _ => Some(Exclusion::AfterMerge),
  }
}

/// Final aggregation output: the only data the report reads.
#[derive(Debug, Clone, Serialize)]
pub struct WeeklyResult {
  pub weeks: Vec<WeekBucket>,
  pub users: BTreeMap<String, UserStat>,
}

#[derive(Debug, Default)]
pub struct WeeklyAggregator {
  weeks: BTreeMap<DateTime<Utc>, WeekBucket>,
}

impl WeeklyAggregator {
  pub fn new() -> Self {
    Self::default()
  }

  fn bucket_for(&mut self, t: DateTime<Utc>) -> &mut WeekBucket {
    let start = week_start(t);

    self
      .weeks
      .entry(start)
      .or_insert_with(|| WeekBucket::new(start, week_end(start)))
  }

  /// Tally one merged PR for its author. Unmerged PRs are ignored.
  pub fn record_pr(&mut self, pr: &PullRequest) -> Result<(), Exclusion> {
    let Some(merged_at) = pr.merged_at else {
      return Err(Exclusion::Unmerged);
    };
    let repo = pr.key.repo_slug();
    let bucket = self.bucket_for(merged_at);

    bucket.pr_counts.add(&pr.author, 1);
    bucket.repo_prs.entry(repo).or_default().add(&pr.author, 1);

    Ok(())
  }

  /// Tally one comment and its weighted score in the PR's merge week.
  pub fn record_comment(&mut self, pr: &PullRequest, comment: &Comment, score: f64) -> Result<(), Exclusion> {
    if let Some(reason) = comment_exclusion(pr, comment) {
      return Err(reason);
    }
    let Some(merged_at) = pr.merged_at else {
      return Err(Exclusion::Unmerged);
    };
    let bucket = self.bucket_for(merged_at);

    bucket.comment_counts.add(&comment.author, 1);
    bucket.weighted_scores.add(&comment.author, score);

    Ok(())
  }

  pub fn record_review(&mut self, pr: &PullRequest, review: &Review) -> Result<(), Exclusion> {
    if let Some(reason) = review_exclusion(pr, review) {
      return Err(reason);
    }
    let Some(merged_at) = pr.merged_at else {
      return Err(Exclusion::Unmerged);
    };
    let bucket = self.bucket_for(merged_at);

    bucket.review_counts.add(&review.author, 1);

    if review.is_approval() {
      bucket.approval_counts.add(&review.author, 1);
    }

    Ok(())
  }

  /// Resolve winners for every week and fold the weeks into user stats.
  pub fn finish(self) -> WeeklyResult {
    let mut weeks: Vec<WeekBucket> = self.weeks.into_values().collect();

    for bucket in &mut weeks {
      resolve_winners(bucket);
    }

    let users = fold_weeks(&weeks);

    WeeklyResult { weeks, users }
  }
}

/// Fill the three winner slots of a bucket from its tallies.
pub fn resolve_winners(bucket: &mut WeekBucket) {
  bucket.pr_winner = bucket.pr_counts.leader_above(0).map(str::to_string);
  bucket.comment_winner = bucket.comment_counts.leader_above(0).map(str::to_string);
  bucket.weighted_winner = bucket.weighted_scores.leader_above(0.0).map(str::to_string);
}

fn is_winner(slot: &Option<String>, user: &str) -> bool {
  slot.as_deref() == Some(user)
}

/// Fold resolved buckets into fresh per-user statistics.
pub fn fold_weeks(weeks: &[WeekBucket]) -> BTreeMap<String, UserStat> {
  let mut users: BTreeMap<String, UserStat> = BTreeMap::new();

  for week in weeks {
    for (user, count) in week.pr_counts.iter() {
      let stat = users.entry(user.to_string()).or_default();
      stat.prs_count += count;

      if is_winner(&week.pr_winner, user) {
        stat.weekly_wins += 1;
        stat.total_score += 1;
      }
    }

    for (repo, tally) in &week.repo_prs {
      for (user, count) in tally.iter() {
        let stat = users.entry(user.to_string()).or_default();
        *stat.repo_prs.entry(repo.clone()).or_default() += count;
      }
    }

    for (user, count) in week.comment_counts.iter() {
      let stat = users.entry(user.to_string()).or_default();
      stat.comments_count += count;

      if is_winner(&week.comment_winner, user) {
        stat.comment_weekly_wins += 1;
        stat.comment_score += 1;
      }
    }

    for (user, score) in week.weighted_scores.iter() {
      let stat = users.entry(user.to_string()).or_default();
      stat.weighted_comment_score += score;

      if is_winner(&week.weighted_winner, user) {
        stat.weighted_weekly_wins += 1;
        stat.weighted_weekly_score += 1;
      }
    }

    for (user, count) in week.review_counts.iter() {
      users.entry(user.to_string()).or_default().reviews_count += count;
    }

    for (user, count) in week.approval_counts.iter() {
      users.entry(user.to_string()).or_default().approvals_count += count;
    }
  }

  users
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::{CheckState, CommentKind, PrKey};
  use chrono::{Duration, TimeZone};

  fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, 0, 0).single().unwrap()
  }

  fn pr(number: u64, author: &str, merged_at: DateTime<Utc>) -> PullRequest {
    PullRequest {
      key: PrKey::new("acme", "widgets", number),
      title: format!("PR {number}"),
      author: author.into(),
      merged_at: Some(merged_at),
      size: None,
      issue_comments: CheckState::Unknown,
      review_comments: CheckState::Unknown,
      reviews: CheckState::Unknown,
      cached_at: merged_at,
    }
  }

  fn comment(id: i64, pr: &PullRequest, author: &str, created_at: DateTime<Utc>) -> Comment {
    Comment {
      id,
      pr: pr.key.clone(),
      kind: CommentKind::Issue,
      author: author.into(),
      body: "looks good".into(),
      created_at,
      updated_at: created_at,
      cached_at: created_at,
      reactions_checked: false,
      reactions_cached_at: None,
    }
  }

  #[test]
  fn bot_logins_are_excluded() {
    assert!(is_excluded_user("dependabot[bot]"));
    assert!(is_excluded_user("SonarCloud"));
    assert!(is_excluded_user("my-renovate-runner"));
    assert!(is_excluded_user("deploy-helper[BOT]"));
    assert!(!is_excluded_user("alice"));
  }

  #[test]
  fn fold_counts_weekly_pr_wins_and_totals() {
    let w1 = at(2024, 9, 30, 10);
    let w2 = at(2024, 10, 8, 10);
    let mut agg = WeeklyAggregator::new();
    let mut n = 0;

    for _ in 0..5 {
      n += 1;
      agg.record_pr(&pr(n, "alice", w1)).unwrap();
    }
    for _ in 0..2 {
      n += 1;
      agg.record_pr(&pr(n, "alice", w2)).unwrap();
    }
    for _ in 0..6 {
      n += 1;
      agg.record_pr(&pr(n, "bob", w2)).unwrap();
    }

    let out = agg.finish();
    assert_eq!(out.weeks.len(), 2);
    assert!(out.weeks[0].start < out.weeks[1].start);
    assert_eq!(out.weeks[0].pr_winner.as_deref(), Some("alice"));
    assert_eq!(out.weeks[1].pr_winner.as_deref(), Some("bob"));

    let alice = &out.users["alice"];
    let bob = &out.users["bob"];
    assert_eq!(alice.weekly_wins, 1);
    assert_eq!(alice.total_score, 1);
    assert_eq!(alice.prs_count, 7);
    assert_eq!(bob.weekly_wins, 1);
    assert_eq!(bob.prs_count, 6);
    assert_eq!(alice.repo_prs["acme/widgets"], 7);
  }

  #[test]
  fn pr_tie_keeps_first_seen_author() {
    let t = at(2024, 10, 2, 9);
    let mut agg = WeeklyAggregator::new();
    agg.record_pr(&pr(1, "zoe", t)).unwrap();
    agg.record_pr(&pr(2, "adam", t)).unwrap();

    let out = agg.finish();
    assert_eq!(out.weeks[0].pr_winner.as_deref(), Some("zoe"));
  }

  #[test]
  fn comments_anchor_to_merge_week() {
    let merged = at(2024, 10, 7, 9);
    let p = pr(1, "alice", merged);
    let mut agg = WeeklyAggregator::new();
    agg.record_pr(&p).unwrap();
    // Written the previous week, merged this week.
    agg.record_comment(&p, &comment(10, &p, "bob", at(2024, 10, 3, 12)), 1.0).unwrap();

    let out = agg.finish();
    assert_eq!(out.weeks.len(), 1);
    assert_eq!(out.weeks[0].start, at(2024, 10, 7, 0));
    assert_eq!(out.weeks[0].comment_counts.get("bob"), Some(1));
  }

  #[test]
  fn excluded_comments_never_reach_tallies() {
    let merged = at(2024, 10, 4, 12);
    let p = pr(1, "alice", merged);
    let mut agg = WeeklyAggregator::new();
    agg.record_pr(&p).unwrap();

    let bot = comment(1, &p, "dependabot[bot]", merged - Duration::hours(1));
    let own = comment(2, &p, "alice", merged - Duration::hours(1));
    let late = comment(3, &p, "bob", merged + Duration::seconds(1));
    assert_eq!(agg.record_comment(&p, &bot, 5.0), Err(Exclusion::Bot));
    assert_eq!(agg.record_comment(&p, &own, 5.0), Err(Exclusion::SelfAuthored));
    assert_eq!(agg.record_comment(&p, &late, 5.0), Err(Exclusion::AfterMerge));

    let out = agg.finish();
    assert!(out.weeks[0].comment_counts.is_empty());
    assert!(!out.users.contains_key("dependabot[bot]"));
    assert_eq!(out.users["alice"].comments_count, 0);
  }

  #[test]
  fn comment_at_merge_instant_counts() {
    let merged = at(2024, 10, 4, 12);
    let p = pr(1, "alice", merged);
    assert_eq!(comment_exclusion(&p, &comment(1, &p, "bob", merged)), None);
  }

  #[test]
  fn weighted_winner_needs_positive_score() {
    let merged = at(2024, 10, 4, 12);
    let p = pr(1, "alice", merged);
    let mut agg = WeeklyAggregator::new();
    agg.record_pr(&p).unwrap();
    agg.record_comment(&p, &comment(1, &p, "bob", merged), -1.0).unwrap();
    agg.record_comment(&p, &comment(2, &p, "carol", merged), 0.0).unwrap();

    let out = agg.finish();
    let week = &out.weeks[0];
    assert_eq!(week.weighted_winner, None);
    assert_eq!(week.comment_winner.as_deref(), Some("bob"));
    assert_eq!(out.users["bob"].weighted_comment_score, -1.0);
    assert_eq!(out.users["bob"].weighted_weekly_wins, 0);
    assert_eq!(out.users["bob"].comment_weekly_wins, 1);
  }

  #[test]
  fn weighted_total_accumulates_without_winning() {
    let w1 = at(2024, 9, 30, 10);
    let w2 = at(2024, 10, 8, 10);
    let p1 = pr(1, "alice", w1);
    let p2 = pr(2, "alice", w2);
    let mut agg = WeeklyAggregator::new();
    agg.record_pr(&p1).unwrap();
    agg.record_pr(&p2).unwrap();
    agg.record_comment(&p1, &comment(1, &p1, "bob", w1), 3.0).unwrap();
    agg.record_comment(&p1, &comment(2, &p1, "carol", w1), 1.0).unwrap();
    agg.record_comment(&p2, &comment(3, &p2, "carol", w2), 1.5).unwrap();
    agg.record_comment(&p2, &comment(4, &p2, "bob", w2), 0.5).unwrap();

    let out = agg.finish();
    let bob = &out.users["bob"];
    let carol = &out.users["carol"];
    assert_eq!(bob.weighted_comment_score, 3.5);
    assert_eq!(carol.weighted_comment_score, 2.5);
    assert_eq!(bob.weighted_weekly_wins, 1);
    assert_eq!(carol.weighted_weekly_wins, 1);
    assert_eq!(bob.weighted_weekly_score, 1);
  }

  #[test]
  fn reviews_count_before_merge_only() {
    let merged = at(2024, 10, 4, 12);
    let p = pr(1, "alice", merged);
    let review = |id, author: &str, state: &str, submitted_at| Review {
      id,
      pr: p.key.clone(),
      author: author.into(),
      state: state.into(),
      submitted_at,
      cached_at: merged,
    };
    let mut agg = WeeklyAggregator::new();
    agg.record_pr(&p).unwrap();
    agg.record_review(&p, &review(1, "bob", "APPROVED", Some(merged))).unwrap();
    agg.record_review(&p, &review(2, "bob", "COMMENTED", Some(merged))).unwrap();
    assert_eq!(agg.record_review(&p, &review(3, "carol", "APPROVED", None)), Err(Exclusion::AfterMerge));
    assert_eq!(agg.record_review(&p, &review(4, "alice", "APPROVED", Some(merged))), Err(Exclusion::SelfAuthored));

    let out = agg.finish();
    assert_eq!(out.users["bob"].reviews_count, 2);
    assert_eq!(out.users["bob"].approvals_count, 1);
    assert!(!out.users.contains_key("carol"));
  }
}
