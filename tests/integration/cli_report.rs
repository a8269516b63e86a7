use serde_json::{json, Value};
use test_support::{champion_cmd, fixture_path, read_fixture_json, tempdir, write_fixture_json};

const WINDOW: [&str; 4] = ["--start", "2024-10-01", "--end", "13/10/2024"];

fn run_json(fixture: &std::path::Path, db: &std::path::Path, extra: &[&str]) -> Value {
  let out = champion_cmd(fixture, db)
    .args(WINDOW)
    .args(["--format", "json"])
    .args(extra)
    .output()
    .unwrap();
  assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
  serde_json::from_slice(&out.stdout).unwrap()
}

#[test]
fn json_report_ranks_contributors() {
  let td = tempdir();
  let v = run_json(&fixture_path("acme_widgets.json"), &td.path().join("c.db"), &["--repos", "acme/widgets"]);

  assert_eq!(v["window"]["start"], "2024-10-01T00:00:00Z");
  assert_eq!(v["repositories"], json!(["acme/widgets"]));

  let weeks = v["weeks"].as_array().unwrap();
  assert_eq!(weeks.len(), 2);
  assert_eq!(weeks[0]["start"], "2024-09-30T00:00:00Z");
  assert_eq!(weeks[0]["pr_winner"], "alice");
  assert_eq!(weeks[0]["weighted_scores"]["bob"], 3.5);
  assert_eq!(weeks[1]["pr_winner"], "bob");
  assert_eq!(weeks[1]["weighted_winner"], "carol");

  let users = &v["users"];
  assert_eq!(users["alice"]["prs_count"], 2);
  assert_eq!(users["alice"]["weekly_wins"], 1);
  assert_eq!(users["alice"]["weighted_comment_score"], -1.0);
  assert_eq!(users["carol"]["weighted_weekly_wins"], 1);
  assert!(users.get("dependabot[bot]").is_none());
  assert_eq!(users["alice"]["reviews_count"], 0);

  assert_eq!(v["cache"]["comment_fetches"], 6);
  assert_eq!(v["cache"]["reaction_fetches"], 3);
  assert_eq!(v["remote_errors"], 0);
}

#[test]
fn second_run_reuses_the_cache_until_cleared() {
  let td = tempdir();
  let fixture = fixture_path("acme_widgets.json");
  let db = td.path().join("nested").join("comments.db");

  let first = run_json(&fixture, &db, &["--repos", "acme/widgets"]);
  assert!(db.exists());

  let second = run_json(&fixture, &db, &["--repos", "acme/widgets"]);
  assert_eq!(second["cache"]["comment_fetches"], 0);
  assert_eq!(second["cache"]["reaction_fetches"], 0);
  assert_eq!(second["cache"]["comment_hits"], 3);
  assert_eq!(second["cache"]["comment_absent_hits"], 3);
  assert_eq!(first["users"], second["users"]);

  let cleared = run_json(&fixture, &db, &["--repos", "acme/widgets", "--clear-database"]);
  assert_eq!(cleared["cache"]["comment_fetches"], 6);
  assert_eq!(cleared["users"], first["users"]);
}

#[test]
fn repositories_fold_together_and_env_list_works() {
  let td = tempdir();
  let out = champion_cmd(&fixture_path("acme_widgets.json"), &td.path().join("c.db"))
    .env("GITHUB_REPOS", "acme/widgets,https://github.com/acme/gadgets.git")
    .args(WINDOW)
    .args(["--format", "json"])
    .output()
    .unwrap();
  assert!(out.status.success());
  let v: Value = serde_json::from_slice(&out.stdout).unwrap();

  assert_eq!(v["repositories"], json!(["acme/widgets", "acme/gadgets"]));
  // three-way tie in the second week; bob's PR was seen first
  assert_eq!(v["weeks"][1]["pr_winner"], "bob");
  assert_eq!(v["users"]["carol"]["repo_prs"], json!({ "acme/gadgets": 1 }));
}

#[test]
fn reviews_flag_counts_reviews() {
  let td = tempdir();
  let v = run_json(
    &fixture_path("acme_widgets.json"),
    &td.path().join("c.db"),
    &["--repos", "acme/widgets", "--reviews"],
  );

  assert_eq!(v["users"]["alice"]["reviews_count"], 1);
  assert_eq!(v["users"]["alice"]["approvals_count"], 1);
  assert_eq!(v["users"]["bob"]["reviews_count"], 0);
}

#[test]
fn remote_failures_degrade_instead_of_aborting() {
  let td = tempdir();
  let mut doc: Value = read_fixture_json("acme_widgets.json");
  doc["fail"] = json!(["reactions:issue_comment:101", "pulls:acme/gadgets"]);
  let fixture = write_fixture_json(td.path(), "failing.json", &doc);

  let v = run_json(&fixture, &td.path().join("c.db"), &["--repos", "acme/widgets,acme/gadgets"]);

  assert_eq!(v["remote_errors"], 2);
  assert_eq!(v["weeks"][0]["weighted_scores"]["bob"], 1.0);
  assert!(v["users"].get("carol").is_some());
}

#[test]
fn text_report_is_the_default() {
  let td = tempdir();
  let out = champion_cmd(&fixture_path("acme_widgets.json"), &td.path().join("c.db"))
    .args(WINDOW)
    .args(["--repos", "acme/widgets"])
    .output()
    .unwrap();
  assert!(out.status.success());
  let text = String::from_utf8_lossy(&out.stdout);

  assert!(text.starts_with("PR CHAMPION REPORT 2024-10-01 to 2024-10-13\n"));
  assert!(text.contains("Week 2024-09-30 to 2024-10-06\n  PR champion: alice\n"));
  assert!(text.contains("  Quality champion: bob\n    1. bob: 3.50 points\n"));
  assert!(text.contains("TOP 3 BY TOTAL COMMENTS"));
  assert!(text.contains("  reactions: 0 from store, 3 fetched\n"));
}
