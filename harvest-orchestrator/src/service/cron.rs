//! Cron expressions
//!
//! Accepts standard five-field expressions (`min hour dom month dow`) as
//! well as the six/seven-field form with seconds (and year). Five-field
//! expressions fire at second zero.

use chrono::{DateTime, Utc};
use std::str::FromStr;

/// Parses a cron expression
pub fn parse(expression: &str) -> Result<cron::Schedule, String> {
    let normalized = normalize(expression);
    cron::Schedule::from_str(&normalized)
        .map_err(|e| format!("invalid cron expression '{}': {}", expression, e))
}

/// First occurrence strictly after `after`
pub fn next_after(expression: &str, after: DateTime<Utc>) -> Result<Option<DateTime<Utc>>, String> {
    Ok(parse(expression)?.after(&after).next())
}

fn normalize(expression: &str) -> String {
    let fields: Vec<&str> = expression.split_whitespace().collect();
    if fields.len() == 5 {
        format!("0 {}", fields.join(" "))
    } else {
        fields.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_five_field_expression_fires_at_second_zero() {
        let after = Utc.with_ymd_and_hms(2024, 5, 1, 10, 7, 30).unwrap();
        let next = next_after("*/15 * * * *", after).unwrap().unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 5, 1, 10, 15, 0).unwrap());
    }

    #[test]
    fn test_six_field_expression_is_used_as_is() {
        let after = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let next = next_after("30 0 12 * * *", after).unwrap().unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 30).unwrap());
    }

    #[test]
    fn test_next_is_strictly_after() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let next = next_after("0 12 * * *", at).unwrap().unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 5, 2, 12, 0, 0).unwrap());
    }

    #[test]
    fn test_invalid_expressions() {
        assert!(parse("not a cron").is_err());
        assert!(parse("61 * * * *").is_err());
        assert!(parse("").is_err());
    }
}
