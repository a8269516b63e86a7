// === Module Header (agents-tooling) START ===
// header: Parsed by scripts/check_module_headers.sh for purpose/role presence; keep keys on single-line entries.
// purpose: Assemble the champion report from a finished run, as plain text or JSON
// role: rendering/report
// inputs: ChampionRun (weekly buckets ascending, folded user stats, cache stats)
// outputs: Text report string; JSON document { window, repositories, weeks, users, cache, remote_errors }
// invariants:
// - Reads only the run result; never touches the store or the remote
// - Overall rankings are total orders: ties fall back to username ascending
// - Weekly top lists keep first-seen order on ties, matching how the weekly winner was picked
// errors: JSON serialization errors bubble up
// tie_breakers: contracts > orchestration > correctness > performance > minimal_diffs
// === Module Header END ===

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt::Write as _;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::cache::CacheStats;
use crate::model::{Tally, UserStat, WeekBucket};
use crate::pipeline::ChampionRun;
use crate::util::format_score;
use crate::window::DateWindow;

const TOP_N: usize = 3;
const RULE_WIDTH: usize = 60;

#[derive(Debug, Serialize)]
pub struct ChampionReport<'a> {
  pub window: &'a DateWindow,
  pub repositories: Vec<String>,
  pub weeks: &'a [WeekBucket],
  pub users: &'a BTreeMap<String, UserStat>,
  pub cache: CacheStats,
  pub remote_errors: u32,
}

pub fn build_report(run: &ChampionRun) -> ChampionReport<'_> {
  ChampionReport {
    window: &run.window,
    repositories: run.repositories.iter().map(|r| r.to_string()).collect(),
    weeks: &run.result.weeks,
    users: &run.result.users,
    cache: run.cache,
    remote_errors: run.remote_errors,
  }
}

pub fn render_json(run: &ChampionRun) -> Result<String> {
  Ok(serde_json::to_string_pretty(&build_report(run))?)
}

// --- rankings ---

type Ranked<'a> = Vec<(&'a str, &'a UserStat)>;

fn rank_by<'a>(
  users: &'a BTreeMap<String, UserStat>,
  n: usize,
  keep: impl Fn(&UserStat) -> bool,
  cmp: impl Fn(&UserStat, &UserStat) -> Ordering,
) -> Ranked<'a> {
  let mut ranked: Ranked<'a> = users
    .iter()
    .filter(|(_, s)| keep(s))
    .map(|(u, s)| (u.as_str(), s))
    .collect();

  // BTreeMap iteration is already username-ascending; a stable sort keeps that as the last tiebreak.
  ranked.sort_by(|(_, a), (_, b)| cmp(a, b));
  ranked.truncate(n);

  ranked
}

/// PR authors by weekly-win score, then total PRs.
pub fn top_by_score(users: &BTreeMap<String, UserStat>, n: usize) -> Ranked<'_> {
  rank_by(
    users,
    n,
    |s| s.prs_count > 0,
    |a, b| b.total_score.cmp(&a.total_score).then(b.prs_count.cmp(&a.prs_count)),
  )
}

pub fn top_by_prs(users: &BTreeMap<String, UserStat>, n: usize) -> Ranked<'_> {
  rank_by(users, n, |s| s.prs_count > 0, |a, b| b.prs_count.cmp(&a.prs_count))
}

pub fn top_by_comments(users: &BTreeMap<String, UserStat>, n: usize) -> Ranked<'_> {
  rank_by(
    users,
    n,
    |s| s.comments_count > 0,
    |a, b| b.comments_count.cmp(&a.comments_count),
  )
}

/// Users with at least one weekly quality win, by those wins, then by raw weighted total.
pub fn top_by_weighted_weekly(users: &BTreeMap<String, UserStat>, n: usize) -> Ranked<'_> {
  rank_by(
    users,
    n,
    |s| s.weighted_weekly_wins > 0,
    |a, b| {
      b.weighted_weekly_score
        .cmp(&a.weighted_weekly_score)
        .then(b.weighted_comment_score.total_cmp(&a.weighted_comment_score))
    },
  )
}

pub fn top_by_reviews(users: &BTreeMap<String, UserStat>, n: usize) -> Ranked<'_> {
  rank_by(
    users,
    n,
    |s| s.reviews_count > 0,
    |a, b| {
      b.reviews_count
        .cmp(&a.reviews_count)
        .then(b.approvals_count.cmp(&a.approvals_count))
    },
  )
}

/// Highest values of one weekly tally; equal values keep first-seen order.
pub fn week_top<T>(tally: &Tally<T>, n: usize) -> Vec<(&str, T)>
where
  T: Copy + PartialOrd + std::ops::AddAssign,
{
  let mut entries: Vec<(&str, T)> = tally.iter().collect();

  entries.sort_by(|(_, a), (_, b)| b.partial_cmp(a).unwrap_or(Ordering::Equal));
  entries.truncate(n);

  entries
}

// --- text ---

fn day(t: DateTime<Utc>) -> String {
  t.format("%Y-%m-%d").to_string()
}

fn heading(out: &mut String, title: &str) -> std::fmt::Result {
  writeln!(out, "{}", title)?;
  writeln!(out, "{}", "=".repeat(RULE_WIDTH))
}

fn write_week_metric<T: Copy + PartialOrd + std::ops::AddAssign>(
  out: &mut String,
  label: &str,
  winner: Option<&str>,
  tally: &Tally<T>,
  show: impl Fn(T) -> String,
) -> std::fmt::Result {
  match winner {
    Some(w) => writeln!(out, "  {label}: {w}")?,
    None => writeln!(out, "  {label}: none")?,
  }

  for (i, (user, value)) in week_top(tally, TOP_N).into_iter().enumerate() {
    writeln!(out, "    {}. {}: {}", i + 1, user, show(value))?;
  }

  Ok(())
}

fn write_weeks(out: &mut String, weeks: &[WeekBucket]) -> std::fmt::Result {
  heading(out, "WEEKLY SUMMARY")?;

  if weeks.is_empty() {
    writeln!(out, "  No merged pull requests in this window.")?;
  }

  for week in weeks {
    writeln!(out, "Week {} to {}", day(week.start), day(week.end))?;
    write_week_metric(out, "PR champion", week.pr_winner.as_deref(), &week.pr_counts, |n| {
      format!("{n} PRs")
    })?;
    write_week_metric(
      out,
      "Comment champion",
      week.comment_winner.as_deref(),
      &week.comment_counts,
      |n| format!("{n} comments"),
    )?;
    write_week_metric(
      out,
      "Quality champion",
      week.weighted_winner.as_deref(),
      &week.weighted_scores,
      |s| format!("{} points", format_score(s)),
    )?;

    if !week.review_counts.is_empty() {
      let reviews: Vec<String> = week
        .review_counts
        .iter()
        .map(|(u, n)| format!("{} {} ({} approved)", u, n, week.approval_counts.get(u).unwrap_or(0)))
        .collect();
      writeln!(out, "  Reviews: {}", reviews.join(", "))?;
    }

    writeln!(out)?;
  }

  Ok(())
}

fn write_rankings(out: &mut String, users: &BTreeMap<String, UserStat>) -> std::fmt::Result {
  heading(out, "OVERALL RANKING BY PR SCORE")?;

  for (i, (user, s)) in top_by_score(users, TOP_N).into_iter().enumerate() {
    writeln!(out, "{}. {}", i + 1, user)?;
    writeln!(out, "   score: {} points", s.total_score)?;
    writeln!(out, "   weekly wins: {}", s.weekly_wins)?;
    writeln!(out, "   total PRs: {}", s.prs_count)?;

    if s.repo_prs.len() > 1 {
      let per_repo: Vec<String> = s.repo_prs.iter().map(|(r, n)| format!("{r} {n}")).collect();
      writeln!(out, "   by repository: {}", per_repo.join(", "))?;
    }
  }
  writeln!(out)?;

  heading(out, "WEEKLY RANKING BY COMMENT QUALITY")?;
  let quality = top_by_weighted_weekly(users, TOP_N);

  if quality.is_empty() {
    writeln!(out, "  No weekly comment-quality wins in this window.")?;
  }

  for (i, (user, s)) in quality.into_iter().enumerate() {
    writeln!(out, "{}. {}", i + 1, user)?;
    writeln!(out, "   weekly score: {} points", s.weighted_weekly_score)?;
    writeln!(out, "   weekly wins: {}", s.weighted_weekly_wins)?;
    writeln!(out, "   total with reactions: {} points", format_score(s.weighted_comment_score))?;
  }
  writeln!(out)?;

  heading(out, "TOP 3 BY TOTAL PRS")?;
  for (i, (user, s)) in top_by_prs(users, TOP_N).into_iter().enumerate() {
    writeln!(out, "{}. {} - {} PRs", i + 1, user, s.prs_count)?;
  }
  writeln!(out)?;

  heading(out, "TOP 3 BY TOTAL COMMENTS")?;
  for (i, (user, s)) in top_by_comments(users, TOP_N).into_iter().enumerate() {
    writeln!(
      out,
      "{}. {} - {} comments ({} weekly wins)",
      i + 1,
      user,
      s.comments_count,
      s.comment_weekly_wins
    )?;
  }
  writeln!(out)?;

  let reviewers = top_by_reviews(users, TOP_N);

  if !reviewers.is_empty() {
    heading(out, "TOP 3 REVIEWERS")?;
    for (i, (user, s)) in reviewers.into_iter().enumerate() {
      writeln!(
        out,
        "{}. {} - {} reviews, {} approvals",
        i + 1,
        user,
        s.reviews_count,
        s.approvals_count
      )?;
    }
    writeln!(out)?;
  }

  Ok(())
}

fn write_cache(out: &mut String, c: &CacheStats, remote_errors: u32) -> std::fmt::Result {
  heading(out, "CACHE")?;
  writeln!(out, "  pull requests: {} from store, {} fetched", c.pr_hits, c.pr_fetches)?;
  writeln!(
    out,
    "  comments: {} from store ({} confirmed empty), {} fetched",
    c.comment_hits + c.comment_absent_hits,
    c.comment_absent_hits,
    c.comment_fetches
  )?;
  writeln!(out, "  reactions: {} from store, {} fetched", c.reaction_hits, c.reaction_fetches)?;

  if c.review_hits + c.review_fetches > 0 {
    writeln!(out, "  reviews: {} from store, {} fetched", c.review_hits, c.review_fetches)?;
  }

  writeln!(out, "  store errors: {}", c.store_errors)?;
  writeln!(out, "  remote errors: {}", remote_errors)
}

pub fn render_text(run: &ChampionRun) -> Result<String> {
  let mut out = String::new();

  writeln!(
    out,
    "PR CHAMPION REPORT {} to {}",
    day(run.window.start),
    day(run.window.end)
  )?;
  writeln!(out, "Repositories ({}):", run.repositories.len())?;
  for repo in &run.repositories {
    writeln!(out, "  - {}", repo)?;
  }
  writeln!(out)?;

  write_weeks(&mut out, &run.result.weeks)?;
  write_rankings(&mut out, &run.result.users)?;
  write_cache(&mut out, &run.cache, run.remote_errors)?;

  Ok(out)
}
