use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use serde::Serialize;

use luminacal_core::models::{Validation, day_start_millis};

const NOON_MS: i64 = 12 * 3_600_000;

pub(crate) fn parse_date(date_str: Option<String>) -> Result<NaiveDate> {
    match date_str {
        None => Ok(Local::now().date_naive()),
        Some(s) => match s.as_str() {
            "today" => Ok(Local::now().date_naive()),
            "yesterday" => Ok(Local::now().date_naive() - chrono::Duration::days(1)),
            "tomorrow" => Ok(Local::now().date_naive() + chrono::Duration::days(1)),
            _ => NaiveDate::parse_from_str(&s, "%Y-%m-%d").with_context(|| {
                format!("Invalid date '{s}'. Use YYYY-MM-DD or today/yesterday/tomorrow")
            }),
        },
    }
}

/// Parse an optional bound for `--from`/`--to`.
pub(crate) fn parse_optional_date(date_str: Option<String>) -> Result<Option<NaiveDate>> {
    date_str.map(Some).map(parse_date).transpose()
}

/// Epoch ms to stamp an entry logged for `date`: now for today, local noon otherwise.
pub(crate) fn timestamp_for(date: NaiveDate) -> i64 {
    let now = Local::now();
    if date == now.date_naive() {
        now.timestamp_millis()
    } else {
        day_start_millis(date) + NOON_MS
    }
}

/// Echo a non-valid validation result to stderr.
pub(crate) fn report_validation(field: &str, validation: &Validation) {
    match validation {
        Validation::Valid => {}
        Validation::Warning(msg) => eprintln!("Warning ({field}): {msg}"),
        Validation::Error(msg) => eprintln!("Error ({field}): {msg}"),
    }
}

pub(crate) fn json_error(message: &str) -> String {
    #[derive(Serialize)]
    struct CliError<'a> {
        error: &'a str,
    }
    serde_json::to_string(&CliError { error: message })
        .unwrap_or_else(|_| format!("{{\"error\":\"{message}\"}}"))
}

pub(crate) fn no_neg_zero(v: f64) -> f64 {
    if v == 0.0 { 0.0 } else { v }
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use luminacal_core::models::local_date;

    #[test]
    fn test_parse_date_none() {
        let today = Local::now().date_naive();
        assert_eq!(parse_date(None).unwrap(), today);
    }

    #[test]
    fn test_parse_date_keywords() {
        let today = Local::now().date_naive();
        assert_eq!(parse_date(Some("today".to_string())).unwrap(), today);
        assert_eq!(
            parse_date(Some("yesterday".to_string())).unwrap(),
            today - chrono::Duration::days(1)
        );
        assert_eq!(
            parse_date(Some("tomorrow".to_string())).unwrap(),
            today + chrono::Duration::days(1)
        );
    }

    #[test]
    fn test_parse_date_iso() {
        let date = parse_date(Some("2024-01-15".to_string())).unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
    }

    #[test]
    fn test_parse_date_invalid() {
        assert!(parse_date(Some("nope".to_string())).is_err());
    }

    #[test]
    fn test_parse_optional_date() {
        assert!(parse_optional_date(None).unwrap().is_none());
        assert_eq!(
            parse_optional_date(Some("2024-02-29".to_string())).unwrap(),
            NaiveDate::from_ymd_opt(2024, 2, 29)
        );
        assert!(parse_optional_date(Some("2024-02-30".to_string())).is_err());
    }

    #[test]
    fn test_timestamp_for_lands_on_date() {
        let past = NaiveDate::from_ymd_opt(2023, 9, 1).unwrap();
        assert_eq!(local_date(timestamp_for(past)), past);
        let today = Local::now().date_naive();
        assert_eq!(local_date(timestamp_for(today)), today);
    }

    #[test]
    fn test_json_error() {
        assert_eq!(json_error("boom"), r#"{"error":"boom"}"#);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello world this is long", 10), "hello w...");
    }

    #[test]
    fn test_truncate_utf8() {
        assert_eq!(truncate("Crème fraîche", 10), "Crème f...");
        assert_eq!(truncate("Müsli", 10), "Müsli");
    }

    #[test]
    fn test_no_neg_zero() {
        assert_eq!(no_neg_zero(-0.0).to_bits(), 0.0_f64.to_bits());
        assert_eq!(no_neg_zero(5.0), 5.0);
        assert_eq!(no_neg_zero(-3.0), -3.0);
    }
}
