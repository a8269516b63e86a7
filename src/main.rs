use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use pr_champion::cache::CacheOrchestrator;
use pr_champion::cli::{normalize, Cli, OutputFormat, REPOS_ENV};
use pr_champion::pipeline::{self, RunOptions};
use pr_champion::remote::{get_github_token, FixtureSource, GithubHttpSource, RemoteSource};
use pr_champion::render::{render_json, render_text};
use pr_champion::scoring::ScoringEngine;
use pr_champion::store::SqliteStore;
use pr_champion::util;

fn init_tracing() {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
  let _ = fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init();
}

fn main() -> Result<()> {
  dotenvy::dotenv().ok();
  let cli = Cli::parse();

  if cli.gen_man {
    let page = util::render_man_page::<Cli>()?;
    print!("{}", page);
    return Ok(());
  }

  init_tracing();

  // Phase 1: normalize CLI
  let cfg = normalize(cli, std::env::var(REPOS_ENV).ok())?;

  // Phase 2: open the cache
  let store = SqliteStore::open(&cfg.db_path)?;
  info!(path = %util::canonicalize_lossy(&cfg.db_path), "cache opened");

  // Phase 3: pick the remote
  let remote: Box<dyn RemoteSource> = match FixtureSource::from_env()? {
    Some(fixture) => {
      warn!("serving remote data from fixture file");
      Box::new(fixture)
    }
    None => {
      let Some(token) = cfg.token.clone().or_else(get_github_token) else {
        bail!("No GitHub token: pass --token, set GITHUB_TOKEN or GH_TOKEN, or run `gh auth login`");
      };
      Box::new(GithubHttpSource::new(token))
    }
  };

  let cache = CacheOrchestrator::new(remote, Box::new(store)).with_now(cfg.now);

  if cfg.clear_database {
    cache.clear().context("clearing cache")?;
    info!("cache cleared");
  }

  // Phase 4: fetch, score, aggregate
  let opts = RunOptions {
    repos: cfg.repos.clone(),
    window: cfg.window,
    include_reviews: cfg.include_reviews,
  };
  let run = pipeline::run(&cache, &ScoringEngine::default(), &opts);

  // Phase 5: report
  let out = match cfg.format {
    OutputFormat::Text => render_text(&run)?,
    OutputFormat::Json => render_json(&run)?,
  };
  print!("{}", out);

  if cfg.format == OutputFormat::Json {
    println!();
  }

  Ok(())
}
