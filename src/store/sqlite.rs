//! SQLite persistence for cached GitHub entities.
//!
//! One connection, used from a single thread. Timestamps are stored as
//! RFC 3339 UTC text with second precision so that lexical order matches
//! chronological order.
//!
//! # Schema Versioning
//!
//! The schema version lives in SQLite's `user_version` pragma. Bump
//! `SCHEMA_VERSION` and add a `migrate_v{N}_to_v{N+1}` step when the
//! schema changes.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::debug;

use super::DurableStore;
use crate::model::{
  Aspect, CheckState, Comment, CommentKind, PrKey, PrSize, PullRequest, Reaction, ReactionChannel, ReactionContent,
  Review,
};

const SCHEMA_VERSION: i32 = 2;

pub struct SqliteStore {
  conn: Connection,
}

impl SqliteStore {
  /// Open or create the database at `path`, creating parent directories as needed.
  pub fn open(path: &Path) -> Result<Self> {
    if let Some(parent) = path.parent() {
      if !parent.as_os_str().is_empty() {
        std::fs::create_dir_all(parent)
          .with_context(|| format!("creating database directory {}", parent.display()))?;
      }
    }

    let conn = Connection::open(path).with_context(|| format!("opening SQLite database at {}", path.display()))?;
    let store = Self { conn };
    store.init_schema()?;

    debug!(path = %path.display(), "opened cache database");

    Ok(store)
  }

  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory().context("opening in-memory SQLite database")?;
    let store = Self { conn };
    store.init_schema()?;

    Ok(store)
  }

  fn init_schema(&self) -> Result<()> {
    let current: i32 = self
      .conn
      .pragma_query_value(None, "user_version", |row| row.get(0))
      .context("reading schema version")?;

    if current > SCHEMA_VERSION {
      bail!(
        "database schema version {} is newer than supported version {}",
        current,
        SCHEMA_VERSION
      );
    }

    if current < 1 {
      Self::migrate_v0_to_v1(&self.conn)?;
    }

    if current < 2 {
      Self::migrate_v1_to_v2(&self.conn)?;
    }

    if current < SCHEMA_VERSION {
      self.conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    }

    Ok(())
  }

  fn migrate_v0_to_v1(conn: &Connection) -> Result<()> {
    conn
      .execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS prs (
          owner TEXT NOT NULL,
          repo TEXT NOT NULL,
          number INTEGER NOT NULL,
          title TEXT NOT NULL DEFAULT '',
          author TEXT NOT NULL DEFAULT '',
          merged_at TEXT,
          additions INTEGER,
          deletions INTEGER,
          changed_files INTEGER,
          issue_comments_state TEXT NOT NULL DEFAULT 'unknown'
            CHECK(issue_comments_state IN ('unknown', 'absent', 'present')),
          review_comments_state TEXT NOT NULL DEFAULT 'unknown'
            CHECK(review_comments_state IN ('unknown', 'absent', 'present')),
          reviews_state TEXT NOT NULL DEFAULT 'unknown'
            CHECK(reviews_state IN ('unknown', 'absent', 'present')),
          cached_at TEXT NOT NULL,
          PRIMARY KEY (owner, repo, number)
        );

        CREATE TABLE IF NOT EXISTS comments (
          id INTEGER PRIMARY KEY,
          owner TEXT NOT NULL,
          repo TEXT NOT NULL,
          number INTEGER NOT NULL,
          kind TEXT NOT NULL CHECK(kind IN ('issue', 'review')),
          author TEXT NOT NULL,
          body TEXT NOT NULL,
          created_at TEXT NOT NULL,
          updated_at TEXT NOT NULL,
          cached_at TEXT NOT NULL,
          reactions_checked INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_comments_pr
          ON comments(owner, repo, number, kind, created_at);

        CREATE TABLE IF NOT EXISTS reactions (
          comment_id INTEGER NOT NULL,
          channel TEXT NOT NULL CHECK(channel IN ('issue_comment', 'review_comment')),
          content TEXT NOT NULL,
          author TEXT NOT NULL,
          created_at TEXT,
          cached_at TEXT NOT NULL,
          UNIQUE(comment_id, channel, content, author)
        );

        CREATE TABLE IF NOT EXISTS reviews (
          id INTEGER PRIMARY KEY,
          owner TEXT NOT NULL,
          repo TEXT NOT NULL,
          number INTEGER NOT NULL,
          author TEXT NOT NULL,
          state TEXT NOT NULL,
          submitted_at TEXT,
          cached_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_reviews_pr
          ON reviews(owner, repo, number, submitted_at);
        "#,
      )
      .context("creating cache schema")
  }

  /// Reaction freshness gets its own stamp; a comment refetch must not renew it.
  fn migrate_v1_to_v2(conn: &Connection) -> Result<()> {
    conn
      .execute_batch("ALTER TABLE comments ADD COLUMN reactions_cached_at TEXT;")
      .context("adding comments.reactions_cached_at")
  }
}

fn ts(t: DateTime<Utc>) -> String {
  t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn ts_opt(t: Option<DateTime<Utc>>) -> Option<String> {
  t.map(ts)
}

fn conversion_error(idx: usize, msg: String) -> rusqlite::Error {
  rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, msg.into())
}

fn parse_ts(idx: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn ts_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
  let s: String = row.get(idx)?;
  parse_ts(idx, &s)
}

fn ts_opt_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
  let s: Option<String> = row.get(idx)?;
  s.map(|s| parse_ts(idx, &s)).transpose()
}

fn state_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<CheckState> {
  let s: String = row.get(idx)?;
  CheckState::parse(&s).ok_or_else(|| conversion_error(idx, format!("unknown check state '{s}'")))
}

fn kind_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<CommentKind> {
  let s: String = row.get(idx)?;
  CommentKind::parse(&s).ok_or_else(|| conversion_error(idx, format!("unknown comment kind '{s}'")))
}

fn state_column(aspect: Aspect) -> &'static str {
  match aspect {
    Aspect::IssueComments => "issue_comments_state",
    Aspect::ReviewComments => "review_comments_state",
    Aspect::Reviews => "reviews_state",
  }
}

const PR_COLUMNS: &str = "owner, repo, number, title, author, merged_at, additions, deletions, changed_files, \
   issue_comments_state, review_comments_state, reviews_state, cached_at";

fn pr_from_row(row: &Row<'_>) -> rusqlite::Result<PullRequest> {
  let additions: Option<i64> = row.get(6)?;
  let deletions: Option<i64> = row.get(7)?;
  let changed_files: Option<i64> = row.get(8)?;
  let size = match (additions, deletions, changed_files) {
    (Some(a), Some(d), Some(c)) => Some(PrSize {
      additions: a as u64,
      deletions: d as u64,
      changed_files: c as u64,
    }),
    _ => None,
  };

  Ok(PullRequest {
    key: PrKey::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, i64>(2)? as u64),
    title: row.get(3)?,
    author: row.get(4)?,
    merged_at: ts_opt_at(row, 5)?,
    size,
    issue_comments: state_at(row, 9)?,
    review_comments: state_at(row, 10)?,
    reviews: state_at(row, 11)?,
    cached_at: ts_at(row, 12)?,
  })
}

const COMMENT_COLUMNS: &str =
  "id, owner, repo, number, kind, author, body, created_at, updated_at, cached_at, reactions_checked, reactions_cached_at";

fn comment_from_row(row: &Row<'_>) -> rusqlite::Result<Comment> {
  Ok(Comment {
    id: row.get(0)?,
    pr: PrKey::new(row.get::<_, String>(1)?, row.get::<_, String>(2)?, row.get::<_, i64>(3)? as u64),
    kind: kind_at(row, 4)?,
    author: row.get(5)?,
    body: row.get(6)?,
    created_at: ts_at(row, 7)?,
    updated_at: ts_at(row, 8)?,
    cached_at: ts_at(row, 9)?,
    reactions_checked: row.get::<_, i64>(10)? != 0,
    reactions_cached_at: ts_opt_at(row, 11)?,
  })
}

fn review_from_row(row: &Row<'_>) -> rusqlite::Result<Review> {
  Ok(Review {
    id: row.get(0)?,
    pr: PrKey::new(row.get::<_, String>(1)?, row.get::<_, String>(2)?, row.get::<_, i64>(3)? as u64),
    author: row.get(4)?,
    state: row.get(5)?,
    submitted_at: ts_opt_at(row, 6)?,
    cached_at: ts_at(row, 7)?,
  })
}

impl DurableStore for SqliteStore {
  fn get_pr(&self, key: &PrKey) -> Result<Option<PullRequest>> {
    let sql = format!("SELECT {PR_COLUMNS} FROM prs WHERE owner = ?1 AND repo = ?2 AND number = ?3");

    self
      .conn
      .query_row(&sql, params![key.owner, key.repo, key.number as i64], pr_from_row)
      .optional()
      .with_context(|| format!("loading PR {key}"))
  }

  fn upsert_pr(&self, pr: &PullRequest) -> Result<()> {
    let (additions, deletions, changed_files) = match pr.size {
      Some(s) => (
        Some(s.additions as i64),
        Some(s.deletions as i64),
        Some(s.changed_files as i64),
      ),
      None => (None, None, None),
    };

    // Check states are owned by mark_checked and left alone here.
    self
      .conn
      .execute(
        r#"
        INSERT INTO prs (owner, repo, number, title, author, merged_at, additions, deletions, changed_files, cached_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        ON CONFLICT(owner, repo, number) DO UPDATE SET
          title = excluded.title,
          author = excluded.author,
          merged_at = COALESCE(excluded.merged_at, prs.merged_at),
          additions = COALESCE(excluded.additions, prs.additions),
          deletions = COALESCE(excluded.deletions, prs.deletions),
          changed_files = COALESCE(excluded.changed_files, prs.changed_files),
          cached_at = excluded.cached_at
        "#,
        params![
          pr.key.owner,
          pr.key.repo,
          pr.key.number as i64,
          pr.title,
          pr.author,
          ts_opt(pr.merged_at),
          additions,
          deletions,
          changed_files,
          ts(pr.cached_at),
        ],
      )
      .with_context(|| format!("saving PR {}", pr.key))?;

    Ok(())
  }

  fn mark_checked(&self, key: &PrKey, aspect: Aspect, state: CheckState, at: DateTime<Utc>) -> Result<()> {
    if state == CheckState::Unknown {
      bail!("refusing to reset {:?} of {} to unknown", aspect, key);
    }

    let column = state_column(aspect);
    let sql = format!(
      "INSERT INTO prs (owner, repo, number, cached_at, {column}) VALUES (?1, ?2, ?3, ?4, ?5) \
       ON CONFLICT(owner, repo, number) DO UPDATE SET {column} = excluded.{column}"
    );

    self
      .conn
      .execute(
        &sql,
        params![key.owner, key.repo, key.number as i64, ts(at), state.as_str()],
      )
      .with_context(|| format!("marking {:?} of {} as {}", aspect, key, state.as_str()))?;

    Ok(())
  }

  fn get_comment(&self, id: i64) -> Result<Option<Comment>> {
    let sql = format!("SELECT {COMMENT_COLUMNS} FROM comments WHERE id = ?1");

    self
      .conn
      .query_row(&sql, params![id], comment_from_row)
      .optional()
      .with_context(|| format!("loading comment {id}"))
  }

  fn upsert_comment(&self, c: &Comment) -> Result<()> {
    self
      .conn
      .execute(
        r#"
        INSERT INTO comments (
          id, owner, repo, number, kind, author, body, created_at, updated_at, cached_at,
          reactions_checked, reactions_cached_at
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
        ON CONFLICT(id) DO UPDATE SET
          author = excluded.author,
          body = excluded.body,
          created_at = excluded.created_at,
          updated_at = excluded.updated_at,
          cached_at = excluded.cached_at,
          reactions_checked = MAX(comments.reactions_checked, excluded.reactions_checked),
          reactions_cached_at = COALESCE(comments.reactions_cached_at, excluded.reactions_cached_at)
        "#,
        params![
          c.id,
          c.pr.owner,
          c.pr.repo,
          c.pr.number as i64,
          c.kind.as_str(),
          c.author,
          c.body,
          ts(c.created_at),
          ts(c.updated_at),
          ts(c.cached_at),
          c.reactions_checked as i64,
          ts_opt(c.reactions_cached_at),
        ],
      )
      .with_context(|| format!("saving comment {}", c.id))?;

    Ok(())
  }

  fn list_comments(&self, key: &PrKey, kind: CommentKind) -> Result<Vec<Comment>> {
    let sql = format!(
      "SELECT {COMMENT_COLUMNS} FROM comments \
       WHERE owner = ?1 AND repo = ?2 AND number = ?3 AND kind = ?4 \
       ORDER BY created_at ASC, id ASC"
    );
    let mut stmt = self.conn.prepare(&sql)?;
    let rows = stmt
      .query_map(
        params![key.owner, key.repo, key.number as i64, kind.as_str()],
        comment_from_row,
      )?
      .collect::<rusqlite::Result<Vec<_>>>()
      .with_context(|| format!("listing {} comments of {key}", kind.as_str()))?;

    Ok(rows)
  }

  fn retain_comments(&self, key: &PrKey, kind: CommentKind, keep: &[i64]) -> Result<usize> {
    let keep: HashSet<i64> = keep.iter().copied().collect();
    let tx = self.conn.unchecked_transaction()?;

    let stored: Vec<i64> = {
      let mut stmt =
        tx.prepare("SELECT id FROM comments WHERE owner = ?1 AND repo = ?2 AND number = ?3 AND kind = ?4")?;
      let ids = stmt
        .query_map(params![key.owner, key.repo, key.number as i64, kind.as_str()], |row| {
          row.get::<_, i64>(0)
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
      ids
    };

    let mut removed = 0;

    for id in stored.into_iter().filter(|id| !keep.contains(id)) {
      tx.execute("DELETE FROM reactions WHERE comment_id = ?1", params![id])?;
      removed += tx.execute("DELETE FROM comments WHERE id = ?1", params![id])?;
    }

    tx.commit().with_context(|| format!("pruning {} comments of {key}", kind.as_str()))?;

    Ok(removed)
  }

  fn mark_reactions_checked(&self, comment_id: i64, at: DateTime<Utc>) -> Result<()> {
    self
      .conn
      .execute(
        "UPDATE comments SET reactions_checked = 1, reactions_cached_at = ?2 WHERE id = ?1",
        params![comment_id, ts(at)],
      )
      .with_context(|| format!("marking reactions checked for comment {comment_id}"))?;

    Ok(())
  }

  fn list_reactions(&self, comment_id: i64, channel: ReactionChannel) -> Result<Vec<Reaction>> {
    let mut stmt = self.conn.prepare(
      "SELECT comment_id, content, author, created_at, cached_at FROM reactions \
       WHERE comment_id = ?1 AND channel = ?2 ORDER BY rowid",
    )?;
    let rows = stmt
      .query_map(params![comment_id, channel.as_str()], |row| {
        Ok(Reaction {
          comment_id: row.get(0)?,
          channel,
          content: ReactionContent::from_tag(&row.get::<_, String>(1)?),
          author: row.get(2)?,
          created_at: ts_opt_at(row, 3)?,
          cached_at: ts_at(row, 4)?,
        })
      })?
      .collect::<rusqlite::Result<Vec<_>>>()
      .with_context(|| format!("listing {} reactions of comment {comment_id}", channel.as_str()))?;

    Ok(rows)
  }

  fn replace_reactions(&self, comment_id: i64, channel: ReactionChannel, reactions: &[Reaction]) -> Result<()> {
    let tx = self.conn.unchecked_transaction()?;

    tx.execute(
      "DELETE FROM reactions WHERE comment_id = ?1 AND channel = ?2",
      params![comment_id, channel.as_str()],
    )?;

    {
      let mut stmt = tx.prepare(
        "INSERT OR REPLACE INTO reactions (comment_id, channel, content, author, created_at, cached_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
      )?;

      for r in reactions {
        stmt.execute(params![
          comment_id,
          channel.as_str(),
          r.content.as_tag(),
          r.author,
          ts_opt(r.created_at),
          ts(r.cached_at),
        ])?;
      }
    }

    tx.commit()
      .with_context(|| format!("saving {} reactions of comment {comment_id}", channel.as_str()))?;

    Ok(())
  }

  fn list_reviews(&self, key: &PrKey) -> Result<Vec<Review>> {
    let mut stmt = self.conn.prepare(
      "SELECT id, owner, repo, number, author, state, submitted_at, cached_at FROM reviews \
       WHERE owner = ?1 AND repo = ?2 AND number = ?3 ORDER BY submitted_at ASC, id ASC",
    )?;
    let rows = stmt
      .query_map(params![key.owner, key.repo, key.number as i64], review_from_row)?
      .collect::<rusqlite::Result<Vec<_>>>()
      .with_context(|| format!("listing reviews of {key}"))?;

    Ok(rows)
  }

  fn upsert_review(&self, r: &Review) -> Result<()> {
    self
      .conn
      .execute(
        r#"
        INSERT INTO reviews (id, owner, repo, number, author, state, submitted_at, cached_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        ON CONFLICT(id) DO UPDATE SET
          author = excluded.author,
          state = excluded.state,
          submitted_at = excluded.submitted_at,
          cached_at = excluded.cached_at
        "#,
        params![
          r.id,
          r.pr.owner,
          r.pr.repo,
          r.pr.number as i64,
          r.author,
          r.state,
          ts_opt(r.submitted_at),
          ts(r.cached_at),
        ],
      )
      .with_context(|| format!("saving review {}", r.id))?;

    Ok(())
  }

  fn wipe(&self) -> Result<()> {
    let tx = self.conn.unchecked_transaction()?;

    for table in ["reactions", "comments", "reviews", "prs"] {
      tx.execute(&format!("DELETE FROM {table}"), [])?;
    }

    tx.commit().context("clearing cache database")?;

    Ok(())
  }
}
