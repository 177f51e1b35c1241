use std::fs;
use std::path::PathBuf;
use std::sync::OnceLock;

use anyhow::{anyhow, Context};
use chrono::{DateTime, Datelike, Days, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use regex::Regex;
use serde::Deserialize;
use tracing::warn;

const TIMEZONE_CONFIG_FILE: &str = "docket-time.toml";
const TIMEZONE_ENV_VAR: &str = "DOCKET_TIMEZONE";
const TIMEZONE_CONFIG_ENV_VAR: &str = "DOCKET_TIME_CONFIG";

#[derive(Debug, Deserialize)]
struct TimezoneConfig {
    timezone: Option<String>,
    time: Option<TimezoneSection>,
}

#[derive(Debug, Deserialize)]
struct TimezoneSection {
    timezone: Option<String>,
}

/// The timezone all calendar-date math happens in. Resolved once, from the
/// environment, then a config file, then UTC.
pub fn project_timezone() -> &'static Tz {
    static PROJECT_TZ: OnceLock<Tz> = OnceLock::new();
    PROJECT_TZ.get_or_init(resolve_project_timezone)
}

/// The current calendar date in the project timezone. Due dates are
/// compared against this, never against raw UTC dates, so "due today"
/// does not shift around midnight.
#[must_use]
pub fn today(now: DateTime<Utc>) -> NaiveDate {
    now.with_timezone(project_timezone()).date_naive()
}

/// The instant a calendar due date elapses: the end of that day in the
/// project timezone. A todo due today is therefore due within the next
/// 24 hours for the whole day, and a past date has already elapsed.
#[must_use]
pub fn due_moment(due: NaiveDate) -> DateTime<Utc> {
    let end_of_day = due
        .checked_add_days(Days::new(1))
        .unwrap_or(due)
        .and_time(NaiveTime::MIN);

    match project_timezone().from_local_datetime(&end_of_day) {
        LocalResult::Single(dt) => dt.with_timezone(&Utc),
        LocalResult::Ambiguous(first, second) => {
            let chosen = if first <= second { first } else { second };
            chosen.with_timezone(&Utc)
        }
        LocalResult::None => {
            warn!(%due, "end of due day does not exist in project timezone; using UTC reading");
            Utc.from_utc_datetime(&end_of_day)
        }
    }
}

/// Whole hours until the due moment, rounded up. Zero or negative means
/// the date has elapsed.
#[must_use]
pub fn hours_until_due(due: NaiveDate, now: DateTime<Utc>) -> i64 {
    let seconds = (due_moment(due) - now).num_seconds();
    -((-seconds).div_euclid(3600))
}

#[must_use]
pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Parse a due-date expression from user input into a calendar date.
///
/// Accepted forms: `YYYY-MM-DD`, `today`, `tomorrow`, `yesterday`,
/// weekday names (next occurrence, always in the future), and relative
/// offsets like `+3d` or `+2w`.
#[tracing::instrument(skip(now), fields(input = input))]
pub fn parse_due_expr(input: &str, now: DateTime<Utc>) -> anyhow::Result<NaiveDate> {
    let token = input.trim();
    let lower = token.to_ascii_lowercase();
    let base = today(now);

    if let Ok(date) = NaiveDate::parse_from_str(token, "%Y-%m-%d") {
        return Ok(date);
    }

    match lower.as_str() {
        "today" | "now" => return Ok(base),
        "tomorrow" | "tom" => {
            return base
                .checked_add_days(Days::new(1))
                .ok_or_else(|| anyhow!("date out of range: tomorrow"));
        }
        "yesterday" => {
            return base
                .checked_sub_days(Days::new(1))
                .ok_or_else(|| anyhow!("date out of range: yesterday"));
        }
        _ => {}
    }

    if let Ok(weekday) = lower.parse::<Weekday>() {
        return Ok(next_weekday(base, weekday));
    }

    let offset_re = Regex::new(r"^\+?(?P<num>\d+)(?P<unit>d|day|days|w|week|weeks)$")
        .map_err(|e| anyhow!("internal regex compile failure: {e}"))?;
    if let Some(caps) = offset_re.captures(&lower) {
        let num: u64 = caps
            .name("num")
            .map(|m| m.as_str())
            .ok_or_else(|| anyhow!("missing offset amount"))?
            .parse()
            .context("invalid offset amount")?;
        let days = if caps
            .name("unit")
            .map(|m| m.as_str().starts_with('w'))
            .unwrap_or(false)
        {
            num.saturating_mul(7)
        } else {
            num
        };
        return base
            .checked_add_days(Days::new(days))
            .ok_or_else(|| anyhow!("date out of range: +{days}d"));
    }

    Err(anyhow!("unrecognized due date expression: {input}"))
}

fn next_weekday(from: NaiveDate, target: Weekday) -> NaiveDate {
    let delta = (7 + target.num_days_from_monday() - from.weekday().num_days_from_monday()) % 7;
    let delta = if delta == 0 { 7 } else { u64::from(delta) };
    from.checked_add_days(Days::new(delta)).unwrap_or(from)
}

fn resolve_project_timezone() -> Tz {
    if let Ok(raw) = std::env::var(TIMEZONE_ENV_VAR)
        && let Some(tz) = parse_timezone(&raw, TIMEZONE_ENV_VAR)
    {
        return tz;
    }

    if let Some(path) = timezone_config_path()
        && let Some(tz) = load_timezone_from_file(&path)
    {
        return tz;
    }

    chrono_tz::UTC
}

fn timezone_config_path() -> Option<PathBuf> {
    if let Ok(raw) = std::env::var(TIMEZONE_CONFIG_ENV_VAR) {
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            return Some(PathBuf::from(trimmed));
        }
    }

    std::env::current_dir()
        .ok()
        .map(|dir| dir.join(TIMEZONE_CONFIG_FILE))
}

fn load_timezone_from_file(path: &PathBuf) -> Option<Tz> {
    if !path.exists() {
        return None;
    }

    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) => {
            tracing::error!(file = %path.display(), error = %err, "failed reading timezone config file");
            return None;
        }
    };

    let parsed = match toml::from_str::<TimezoneConfig>(&raw) {
        Ok(parsed) => parsed,
        Err(err) => {
            tracing::error!(file = %path.display(), error = %err, "failed parsing timezone config file");
            return None;
        }
    };

    let timezone = parsed
        .timezone
        .or_else(|| parsed.time.and_then(|section| section.timezone));
    let Some(timezone) = timezone else {
        warn!(file = %path.display(), "timezone config had no timezone field");
        return None;
    };

    parse_timezone(timezone.as_str(), &format!("file:{}", path.display()))
}

fn parse_timezone(raw: &str, source: &str) -> Option<Tz> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        warn!(source, "timezone source was empty");
        return None;
    }

    match trimmed.parse::<Tz>() {
        Ok(tz) => {
            tracing::info!(source, timezone = %trimmed, "configured project timezone");
            Some(tz)
        }
        Err(err) => {
            tracing::error!(source, timezone = %trimmed, error = %err, "failed to parse timezone id");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Datelike, Days, NaiveDate, Utc, Weekday};

    use super::{due_moment, hours_until_due, next_weekday, parse_due_expr, today};

    #[test]
    fn iso_dates_parse_verbatim() {
        let now = Utc::now();
        let parsed = parse_due_expr("2026-03-10", now).expect("parse");
        assert_eq!(parsed, NaiveDate::from_ymd_opt(2026, 3, 10).expect("date"));
    }

    #[test]
    fn named_days_resolve_relative_to_today() {
        let now = Utc::now();
        let base = today(now);
        assert_eq!(parse_due_expr("today", now).expect("today"), base);
        assert_eq!(
            parse_due_expr("tomorrow", now).expect("tomorrow"),
            base.checked_add_days(Days::new(1)).expect("date")
        );
    }

    #[test]
    fn offsets_count_days_and_weeks() {
        let now = Utc::now();
        let base = today(now);
        assert_eq!(
            parse_due_expr("+3d", now).expect("+3d"),
            base.checked_add_days(Days::new(3)).expect("date")
        );
        assert_eq!(
            parse_due_expr("2w", now).expect("2w"),
            base.checked_add_days(Days::new(14)).expect("date")
        );
    }

    #[test]
    fn weekday_names_pick_the_next_occurrence() {
        let now = Utc::now();
        let base = today(now);
        let parsed = parse_due_expr("friday", now).expect("friday");
        assert_eq!(parsed.weekday(), Weekday::Fri);
        assert!(parsed > base);
        assert!(parsed <= base.checked_add_days(Days::new(7)).expect("date"));
    }

    #[test]
    fn unknown_expressions_are_rejected() {
        let now = Utc::now();
        assert!(parse_due_expr("whenever", now).is_err());
        assert!(parse_due_expr("3x", now).is_err());
    }

    #[test]
    fn next_weekday_never_returns_the_same_day() {
        let monday = NaiveDate::from_ymd_opt(2026, 3, 9).expect("date");
        assert_eq!(monday.weekday(), Weekday::Mon);
        let next = next_weekday(monday, Weekday::Mon);
        assert_eq!(next, monday.checked_add_days(Days::new(7)).expect("date"));
    }

    #[test]
    fn due_today_is_within_twenty_four_hours() {
        let now = Utc::now();
        let hours = hours_until_due(today(now), now);
        assert!(hours > 0, "hours was {hours}");
        assert!(hours <= 24, "hours was {hours}");
    }

    #[test]
    fn past_dates_have_elapsed() {
        let now = Utc::now();
        let yesterday = today(now).checked_sub_days(Days::new(1)).expect("date");
        assert!(hours_until_due(yesterday, now) <= 0);
        assert!(due_moment(yesterday) <= now);
    }
}
