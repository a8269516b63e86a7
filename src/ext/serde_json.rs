// === Module Header (agents-tooling) START ===
// header: Parsed by scripts/check_module_headers.sh for purpose/role presence; keep keys on single-line entries.
// purpose: Dotted-path lookups into GitHub JSON payloads with typed, non-panicking extraction
// role: extension/serde_json
// outputs: JsonFetch trait; JsonFetched wrapper with to / to_or_default / to_utc
// invariants: No panics; missing paths or JSON nulls yield None; timestamps normalize to UTC
// tie_breakers: contracts > orchestration > correctness > performance > minimal_diffs
// === Module Header END ===

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;

/// A located JSON value awaiting typed extraction.
pub struct JsonFetched<'a> {
  inner: Option<&'a serde_json::Value>,
}

impl<'a> JsonFetched<'a> {
  pub fn to<T>(&self) -> Option<T>
  where
    T: DeserializeOwned,
  {
    self
      .inner
      .filter(|v| !v.is_null())
      .and_then(|v| T::deserialize(v).ok())
  }

  pub fn to_or_default<T>(&self) -> T
  where
    T: DeserializeOwned + Default,
  {
    self.to::<T>().unwrap_or_default()
  }

  /// Parse an RFC 3339 string (any offset) as a UTC instant.
  pub fn to_utc(&self) -> Option<DateTime<Utc>> {
    let s = self.inner?.as_str()?;

    DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.with_timezone(&Utc))
  }
}

/// Fetch nested values via dotted paths like `"user.login"`.
pub trait JsonFetch {
  fn fetch(&self, path: &str) -> JsonFetched<'_>;
}

impl JsonFetch for serde_json::Value {
  fn fetch(&self, path: &str) -> JsonFetched<'_> {
    if path.is_empty() {
      return JsonFetched { inner: Some(self) };
    }

    let inner = path.split('.').try_fold(self, |cur, key| cur.get(key));

    JsonFetched { inner }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;

  #[test]
  fn fetches_nested_logins_and_numbers() {
    let v = serde_json::json!({
      "number": 12,
      "user": { "login": "octocat" },
      "merged_at": null
    });

    assert_eq!(v.fetch("user.login").to::<String>().as_deref(), Some("octocat"));
    assert_eq!(v.fetch("number").to::<u64>(), Some(12));
    assert_eq!(v.fetch("user.id").to::<i64>(), None);
    assert_eq!(v.fetch("merged_at").to::<String>(), None);
    assert!(v.fetch("").to::<serde_json::Value>().is_some());
  }

  #[test]
  fn to_or_default_covers_missing_authors() {
    let v = serde_json::json!({ "user": null });
    let login: String = v.fetch("user.login").to_or_default();
    assert_eq!(login, "");
  }

  #[test]
  fn to_utc_normalizes_offsets() {
    let v = serde_json::json!({ "a": "2024-10-04T14:00:00+02:00", "b": "yesterday" });
    assert_eq!(v.fetch("a").to_utc(), Some(Utc.with_ymd_and_hms(2024, 10, 4, 12, 0, 0).unwrap()));
    assert_eq!(v.fetch("b").to_utc(), None);
    assert_eq!(v.fetch("c").to_utc(), None);
  }
}
