use predicates::prelude::*;
use test_support::{champion_cmd, cmd_bin, fixture_path, tempdir, BIN};

#[test]
fn rejects_unparseable_dates() {
  let td = tempdir();
  champion_cmd(&fixture_path("acme_widgets.json"), &td.path().join("c.db"))
    .args(["--repos", "acme/widgets", "--start", "2024/13/45"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("invalid date"));
}

#[test]
fn rejects_reversed_window() {
  let td = tempdir();
  champion_cmd(&fixture_path("acme_widgets.json"), &td.path().join("c.db"))
    .args(["--repos", "acme/widgets", "--start", "2024-10-13", "--end", "2024-10-01"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("before start date"));
}

#[test]
fn rejects_malformed_repository() {
  let td = tempdir();
  champion_cmd(&fixture_path("acme_widgets.json"), &td.path().join("c.db"))
    .args(["--repos", "acme/widgets,not-a-repo"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("invalid repository 'not-a-repo'"));
}

#[test]
fn requires_some_repository() {
  let td = tempdir();
  champion_cmd(&fixture_path("acme_widgets.json"), &td.path().join("c.db"))
    .assert()
    .failure()
    .stderr(predicate::str::contains("No repositories given"));
}

#[test]
fn zero_days_is_rejected() {
  let td = tempdir();
  champion_cmd(&fixture_path("acme_widgets.json"), &td.path().join("c.db"))
    .args(["--repos", "acme/widgets", "--days", "0"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("--days must be greater than zero"));
}

#[test]
fn missing_token_is_fatal_without_a_fixture() {
  let td = tempdir();
  cmd_bin(BIN)
    .current_dir(td.path())
    .env_clear()
    .env("PATH", "")
    .arg("--db-path")
    .arg(td.path().join("c.db"))
    .args(["--repos", "acme/widgets"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("No GitHub token"));
}
