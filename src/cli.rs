use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, ValueEnum};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::path::PathBuf;

use crate::model::RepoRef;
use crate::util::effective_now;
use crate::window::{parse_now_override, resolve_window, DateWindow};

/// Env var holding a comma-separated repository list.
pub const REPOS_ENV: &str = "GITHUB_REPOS";

#[derive(Copy, Clone, Eq, PartialEq, Debug, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
#[value(rename_all = "lowercase")]
pub enum OutputFormat {
  Text,
  Json,
}

#[derive(Parser, Debug)]
#[command(
    name = "pr-champion",
    version,
    about = "Rank pull-request contributors by weekly merges and reaction-weighted comment quality",
    long_about = None
)]
pub struct Cli {
  /// GitHub token (default: GITHUB_TOKEN, then GH_TOKEN, then `gh auth token`)
  #[arg(short = 't', long)]
  pub token: Option<String>,

  /// Repository owner; use together with --repo
  #[arg(short = 'o', long)]
  pub owner: Option<String>,

  /// Repository name; use together with --owner
  #[arg(short = 'r', long)]
  pub repo: Option<String>,

  /// Comma-separated repositories, e.g. "acme/api,acme/web" (falls back to GITHUB_REPOS)
  #[arg(short = 'R', long, value_delimiter = ',')]
  pub repos: Vec<String>,

  /// Window start: DD/MM/YYYY, YYYY-MM-DD or DD-MM-YYYY (default: 30 days ago)
  #[arg(short = 's', long)]
  pub start: Option<String>,

  /// Window end, same layouts as --start (default: today)
  #[arg(short = 'e', long)]
  pub end: Option<String>,

  /// Analyze the last N days; overrides --start/--end
  #[arg(short = 'd', long)]
  pub days: Option<u32>,

  /// Wipe the local cache before running
  #[arg(short = 'c', long)]
  pub clear_database: bool,

  /// SQLite cache location
  #[arg(long, default_value = "data/comments.db")]
  pub db_path: PathBuf,

  /// Report format
  #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
  pub format: OutputFormat,

  /// Also fetch reviews and count reviews/approvals per user
  #[arg(long)]
  pub reviews: bool,

  /// Emit a troff man page to stdout (internal; for packaging)
  #[arg(long, hide = true)]
  pub gen_man: bool,

  /// Override the "now" instant (hidden; tests only)
  #[arg(long = "now-override", hide = true)]
  pub now_override: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EffectiveConfig {
  pub repos: Vec<RepoRef>,
  pub window: DateWindow,
  #[serde(skip)]
  pub token: Option<String>,
  pub clear_database: bool,
  pub db_path: PathBuf,
  pub format: OutputFormat,
  pub include_reviews: bool,
  pub now: DateTime<Utc>,
}

/// Parse `owner/name` or a GitHub remote URL.
pub fn parse_repo_spec(spec: &str) -> Result<RepoRef> {
  static RE_ORIGIN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:git@github\.com:|https?://github\.com/)([^/]+)/([^/]+?)(?:\.git)?/?$").unwrap());
  static RE_SLUG: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([A-Za-z0-9_.-]+)/([A-Za-z0-9_.-]+)$").unwrap());

  let s = spec.trim();
  let caps = RE_ORIGIN.captures(s).or_else(|| RE_SLUG.captures(s));

  match caps {
    Some(c) => Ok(RepoRef::new(&c[1], &c[2])),
    None => bail!("invalid repository '{}': expected owner/name", spec),
  }
}

fn parse_repo_list<'a>(specs: impl IntoIterator<Item = &'a str>) -> Result<Vec<RepoRef>> {
  let mut out: Vec<RepoRef> = Vec::new();

  for spec in specs.into_iter().map(str::trim).filter(|s| !s.is_empty()) {
    let repo = parse_repo_spec(spec)?;

    if !out.contains(&repo) {
      out.push(repo);
    }
  }

  Ok(out)
}

/// Validate flags and resolve repositories, window and "now".
///
/// `env_repos` is the value of `GITHUB_REPOS`, consulted only when no
/// repository flag was given.
pub fn normalize(cli: Cli, env_repos: Option<String>) -> Result<EffectiveConfig> {
  let fixed = cli.now_override.as_deref().map(parse_now_override).transpose()?;
  let now = effective_now(fixed);

  let repos = match (cli.repos.is_empty(), &cli.owner, &cli.repo) {
    (false, None, None) => parse_repo_list(cli.repos.iter().map(String::as_str))?,
    (false, _, _) => bail!("Ambiguous repository selection: use either --repos or --owner/--repo"),
    (true, Some(o), Some(r)) => vec![parse_repo_spec(&format!("{}/{}", o.trim(), r.trim()))?],
    (true, Some(_), None) | (true, None, Some(_)) => bail!("--owner and --repo must be given together"),
    (true, None, None) => {
      let list = env_repos.unwrap_or_default();
      parse_repo_list(list.split(',')).with_context(|| format!("parsing {REPOS_ENV}"))?
    }
  };

  if repos.is_empty() {
    bail!("No repositories given: use --repos, --owner/--repo, or {}", REPOS_ENV);
  }

  let window = resolve_window(cli.start.as_deref(), cli.end.as_deref(), cli.days, now)?;

  Ok(EffectiveConfig {
    repos,
    window,
    token: cli.token.filter(|t| !t.trim().is_empty()),
    clear_database: cli.clear_database,
    db_path: cli.db_path,
    format: cli.format,
    include_reviews: cli.reviews,
    now,
  })
}
