// === Module Header (agents-tooling) START ===
// header: Parsed by scripts/check_module_headers.sh for purpose/role presence; keep keys on single-line entries.
// purpose: Small helpers shared by the binary: "now" resolution, path display, number formatting, man page rendering
// role: utilities/helpers
// inputs: Optional fixed instant; paths; clap CommandFactory
// outputs: DateTime<Utc>, display strings, man page text
// invariants:
// - effective_now never reads the clock when an override is given
// - format_score always prints two decimals, so report columns line up
// errors: render_man_page surfaces IO errors from clap_mangen
// tie_breakers: contracts > orchestration > correctness > performance > minimal_diffs
// === Module Header END ===

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use clap::CommandFactory;

/// Absolute form of `p` for logs, falling back to cwd-joined when it does not exist yet.
pub fn canonicalize_lossy<P: AsRef<Path>>(p: P) -> String {
  let p = p.as_ref();
  let pb: PathBuf = match std::fs::canonicalize(p) {
    Ok(x) => x,
    Err(_) => match std::env::current_dir() {
      Ok(cwd) => cwd.join(p),
      Err(_) => PathBuf::from(p),
    },
  };
  pb.to_string_lossy().to_string()
}

/// Returns the effective "now" given an optional override.
pub fn effective_now(override_now: Option<DateTime<Utc>>) -> DateTime<Utc> {
  override_now.unwrap_or_else(Utc::now)
}

/// Weighted scores are reported with two decimals.
pub fn format_score(score: f64) -> String {
  // -0.00 reads oddly in a ranking
  if score.abs() < 0.005 {
    return "0.00".to_string();
  }

  format!("{:.2}", score)
}

/// Render a section-1 man page for a clap `CommandFactory` implementor.
pub fn render_man_page<T: CommandFactory>() -> anyhow::Result<String> {
  let cmd = T::command();
  let man = clap_mangen::Man::new(cmd);
  let mut buf: Vec<u8> = Vec::new();

  man.render(&mut buf)?;

  Ok(String::from_utf8_lossy(&buf).to_string())
}
