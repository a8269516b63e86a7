//! test-support: helpers for robust, nextest-friendly pr-champion tests.
//!
//! Add as a dev-dependency in your top-level `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! test_support = { path = "tests/support", features = ["serde"] }
//! ```
//!
//! Then in tests:
//! ```rust,ignore
//! use test_support::{champion_cmd, fixture_path, tempdir};
//!
//! #[test]
//! fn example() {
//!     let td = tempdir();
//!     let db = td.path().join("cache.db");
//!     champion_cmd(&fixture_path("acme_widgets.json"), &db)
//!         .args(["--repos", "acme/widgets"])
//!         .assert()
//!         .success();
//! }
//! ```

use once_cell::sync::Lazy;
use tracing_subscriber::{fmt, EnvFilter};

use std::{
  env,
  path::{Path, PathBuf},
};

/// Binary under test.
pub const BIN: &str = "pr-champion";

/// Env var that switches the binary to a file-backed remote.
pub const FIXTURE_ENV: &str = "PR_CHAMPION_FIXTURE";

/// Fixed "now" used by CLI tests so cache staleness is deterministic.
pub const FIXED_NOW: &str = "2024-10-14T09:00:00Z";

/// Initialize `tracing` once, honoring `RUST_LOG` and writing via the test writer.
///
/// Safe to call from multiple tests; only the first call configures the global subscriber.
pub fn init_tracing() {
  static INIT: Lazy<()> = Lazy::new(|| {
    let filter = EnvFilter::try_from_default_env()
      .or_else(|_| EnvFilter::try_new("warn,test=info"))
      .unwrap();
    // with_test_writer() causes logs to appear alongside failing tests only (cargo/nextest)
    let _ = fmt().with_env_filter(filter).with_test_writer().try_init();
  });
  Lazy::force(&INIT);
}

/// Return the path to the repository's `tests/fixtures` directory.
///
/// Resolved from this crate's manifest (`tests/support`), so it is stable
/// regardless of the runner's working directory (cargo vs nextest).
pub fn fixtures_dir() -> PathBuf {
  let support = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
  support.parent().unwrap_or(&support).join("fixtures")
}

pub fn fixture_path<P: AsRef<Path>>(rel_path: P) -> PathBuf {
  fixtures_dir().join(rel_path)
}

/// Read a UTF-8 text fixture into a string.
pub fn read_fixture_text<P: AsRef<Path>>(rel_path: P) -> String {
  let path = fixture_path(rel_path);
  std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()))
}

/// Deserialize a JSON fixture into `T` (enable `serde` feature).
#[cfg(feature = "serde")]
pub fn read_fixture_json<T, P>(rel_path: P) -> T
where
  T: serde::de::DeserializeOwned,
  P: AsRef<Path>,
{
  let path = fixture_path(rel_path);
  let file =
    std::fs::File::open(&path).unwrap_or_else(|e| panic!("failed to open fixture {}: {e}", path.display()));
  serde_json::from_reader::<_, T>(file).unwrap_or_else(|e| panic!("failed to parse JSON fixture {}: {e}", path.display()))
}

/// Write a (possibly edited) fixture document into `dir` and return its path.
#[cfg(feature = "serde")]
pub fn write_fixture_json(dir: &Path, name: &str, doc: &serde_json::Value) -> PathBuf {
  let path = dir.join(name);
  let text = serde_json::to_string_pretty(doc).expect("serialize fixture");
  std::fs::write(&path, text).unwrap_or_else(|e| panic!("failed to write fixture {}: {e}", path.display()));
  path
}

/// Create a temp directory that deletes on drop.
pub fn tempdir() -> tempfile::TempDir {
  tempfile::tempdir().expect("create tempdir")
}

/// Set multiple environment variables for the duration of the returned guard.
pub fn with_env(vars: &[(&str, &str)]) -> EnvGuard {
  EnvGuard::set_many(vars)
}

/// Run a binary target with `assert_cmd`, returning the ready-to-run `Command`.
pub fn cmd_bin(bin: &str) -> assert_cmd::Command {
  init_tracing();
  assert_cmd::Command::cargo_bin(bin).expect("binary target not found")
}

/// `pr-champion` wired to a fixture remote and a private cache file.
///
/// Ambient repository/token variables are removed so the host environment
/// cannot leak into the run; callers add `--repos` and window flags.
pub fn champion_cmd(fixture: &Path, db: &Path) -> assert_cmd::Command {
  let mut cmd = cmd_bin(BIN);
  // The db's parent may not exist yet (the binary creates it); spawning in a
  // missing directory fails, so use the nearest existing ancestor.
  let cwd = db.ancestors().skip(1).find(|p| p.is_dir()).unwrap_or(db);

  cmd
    .current_dir(cwd)
    .env(FIXTURE_ENV, fixture)
    .env("RUST_LOG", "warn")
    .env_remove("GITHUB_REPOS")
    .env_remove("GITHUB_TOKEN")
    .env_remove("GH_TOKEN")
    .arg("--db-path")
    .arg(db)
    .args(["--now-override", FIXED_NOW]);

  cmd
}

/// Guard for temporarily setting environment variables.
pub struct EnvGuard {
  prev: Vec<(String, Option<String>)>,
}

impl EnvGuard {
  pub fn set_many(kv: &[(&str, &str)]) -> Self {
    let mut prev = Vec::with_capacity(kv.len());
    for (k, v) in kv {
      prev.push((k.to_string(), env::var(k).ok()));
      env::set_var(k, v);
    }
    Self { prev }
  }
}

impl Drop for EnvGuard {
  fn drop(&mut self) {
    for (k, old) in self.prev.drain(..) {
      match old {
        Some(v) => env::set_var(&k, v),
        None => env::remove_var(&k),
      }
    }
  }
}
