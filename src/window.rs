use anyhow::{bail, Context, Result};
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc};
use serde::Serialize;

// Date windows and calendar-week anchoring.

/// Accepted `--start`/`--end` layouts, tried in order.
const DATE_LAYOUTS: [&str; 3] = ["%d/%m/%Y", "%Y-%m-%d", "%d-%m-%Y"];

const DEFAULT_LOOKBACK_DAYS: i64 = 30;

/// Analysis window. Merges count when `start <= merged_at < end + 1 day`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct DateWindow {
  pub start: DateTime<Utc>,
  pub end: DateTime<Utc>,
}

impl DateWindow {
  /// Exclusive upper bound, one day past `end`.
  pub fn grace_end(&self) -> DateTime<Utc> {
    self.end + Duration::days(1)
  }

  pub fn contains_merge(&self, merged_at: DateTime<Utc>) -> bool {
    merged_at >= self.start && merged_at < self.grace_end()
  }
}

/// Parse a calendar date in one of the accepted layouts as UTC midnight.
pub fn parse_date(s: &str) -> Result<DateTime<Utc>> {
  let trimmed = s.trim();

  for layout in DATE_LAYOUTS {
    if let Ok(d) = NaiveDate::parse_from_str(trimmed, layout) {
      return Ok(d.and_time(NaiveTime::MIN).and_utc());
    }
  }

  bail!("invalid date '{}': expected DD/MM/YYYY, YYYY-MM-DD or DD-MM-YYYY", s)
}

/// Resolve the analysis window from optional CLI inputs.
///
/// `days` wins over `start`/`end`; otherwise missing bounds default to
/// thirty days back and `now`.
pub fn resolve_window(
  start: Option<&str>,
  end: Option<&str>,
  days: Option<u32>,
  now: DateTime<Utc>,
) -> Result<DateWindow> {
  if let Some(n) = days {
    if n == 0 {
      bail!("--days must be greater than zero");
    }

    return Ok(DateWindow {
      start: now - Duration::days(i64::from(n)),
      end: now,
    });
  }

  let start = match start {
    Some(s) => parse_date(s).context("parsing --start")?,
    None => now - Duration::days(DEFAULT_LOOKBACK_DAYS),
  };
  let end = match end {
    Some(s) => parse_date(s).context("parsing --end")?,
    None => now,
  };

  if end < start {
    bail!(
      "end date {} is before start date {}",
      end.format("%Y-%m-%d"),
      start.format("%Y-%m-%d")
    );
  }

  Ok(DateWindow { start, end })
}

/// Parse the hidden `--now-override` value (RFC 3339 or a bare date).
pub fn parse_now_override(s: &str) -> Result<DateTime<Utc>> {
  if let Ok(dt) = DateTime::parse_from_rfc3339(s.trim()) {
    return Ok(dt.with_timezone(&Utc));
  }

  parse_date(s).with_context(|| format!("invalid --now-override '{}'", s))
}

/// Truncate to 00:00 UTC of the same day.
pub fn floor_to_day(t: DateTime<Utc>) -> DateTime<Utc> {
  t.date_naive().and_time(NaiveTime::MIN).and_utc()
}

/// Monday 00:00 of the week containing `t` (Sunday belongs to the week that began six days earlier).
pub fn week_start(t: DateTime<Utc>) -> DateTime<Utc> {
  let iso_weekday = i64::from(t.weekday().number_from_monday());
  let days_back = iso_weekday - 1;

  floor_to_day(t) - Duration::days(days_back)
}

/// Week end is reported as start + 6 days (the Sunday, at 00:00).
pub fn week_end(start: DateTime<Utc>) -> DateTime<Utc> {
  start + Duration::days(6)
}
