//! Destination index naming.
//!
//! Index names are a prefix plus a date suffix whose granularity is chosen by
//! [`IndexNameFrequency`]. Names are recomputed on every flush so a long-lived
//! shipper rolls over to the next index when the date changes.

use std::str::FromStr;

use chrono::{Datelike, Duration, Local, NaiveDate};

use crate::config::ConfigError;

/// How often a new destination index is started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndexNameFrequency {
    #[default]
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl IndexNameFrequency {
    /// Get all frequencies.
    pub fn all() -> &'static [IndexNameFrequency] {
        &[
            IndexNameFrequency::Daily,
            IndexNameFrequency::Weekly,
            IndexNameFrequency::Monthly,
            IndexNameFrequency::Yearly,
        ]
    }
}

impl std::fmt::Display for IndexNameFrequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexNameFrequency::Daily => write!(f, "DAILY"),
            IndexNameFrequency::Weekly => write!(f, "WEEKLY"),
            IndexNameFrequency::Monthly => write!(f, "MONTHLY"),
            IndexNameFrequency::Yearly => write!(f, "YEARLY"),
        }
    }
}

impl FromStr for IndexNameFrequency {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DAILY" => Ok(IndexNameFrequency::Daily),
            "WEEKLY" => Ok(IndexNameFrequency::Weekly),
            "MONTHLY" => Ok(IndexNameFrequency::Monthly),
            "YEARLY" => Ok(IndexNameFrequency::Yearly),
            other => Err(ConfigError {
                message: format!("'{}' is not a valid index name frequency", other),
                env_var: None,
            }),
        }
    }
}

/// Compute the destination index for `prefix` on the given calendar day.
pub fn compute_index_name(prefix: &str, frequency: IndexNameFrequency, today: NaiveDate) -> String {
    let suffix = match frequency {
        IndexNameFrequency::Daily => today.format("%Y.%m.%d").to_string(),
        IndexNameFrequency::Weekly => {
            let start_of_week =
                today - Duration::days(i64::from(today.weekday().num_days_from_monday()));
            start_of_week.format("%Y.%m.%d").to_string()
        }
        IndexNameFrequency::Monthly => today.format("%Y.%m").to_string(),
        IndexNameFrequency::Yearly => today.format("%Y").to_string(),
    };

    format!("{}-{}", prefix, suffix)
}

/// Compute the destination index for the local wall-clock date.
///
/// Only the index date is local; entry timestamps stay UTC.
pub fn current_index_name(prefix: &str, frequency: IndexNameFrequency) -> String {
    compute_index_name(prefix, frequency, Local::now().date_naive())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_index_uses_local_date() {
        let before = Local::now().date_naive();
        let name = current_index_name("shiptest", IndexNameFrequency::Daily);
        let after = Local::now().date_naive();

        assert!(
            name == compute_index_name("shiptest", IndexNameFrequency::Daily, before)
                || name == compute_index_name("shiptest", IndexNameFrequency::Daily, after)
        );
    }

    fn pi_day() -> NaiveDate {
        // Thursday
        NaiveDate::from_ymd_opt(2024, 3, 14).unwrap()
    }

    #[test]
    fn test_daily_index_name() {
        assert_eq!(
            compute_index_name("shiptest", IndexNameFrequency::Daily, pi_day()),
            "shiptest-2024.03.14"
        );
    }

    #[test]
    fn test_weekly_index_name_uses_monday() {
        assert_eq!(
            compute_index_name("shiptest", IndexNameFrequency::Weekly, pi_day()),
            "shiptest-2024.03.11"
        );

        // A Monday maps to itself
        let monday = NaiveDate::from_ymd_opt(2024, 3, 11).unwrap();
        assert_eq!(
            compute_index_name("shiptest", IndexNameFrequency::Weekly, monday),
            "shiptest-2024.03.11"
        );
    }

    #[test]
    fn test_weekly_index_name_crosses_year_boundary() {
        // Wednesday 2025-01-01, the week started on Monday 2024-12-30
        let new_year = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        assert_eq!(
            compute_index_name("logs", IndexNameFrequency::Weekly, new_year),
            "logs-2024.12.30"
        );
    }

    #[test]
    fn test_monthly_and_yearly_index_names() {
        assert_eq!(
            compute_index_name("shiptest", IndexNameFrequency::Monthly, pi_day()),
            "shiptest-2024.03"
        );
        assert_eq!(
            compute_index_name("shiptest", IndexNameFrequency::Yearly, pi_day()),
            "shiptest-2024"
        );
    }

    #[test]
    fn test_current_index_name_has_prefix() {
        let name = current_index_name("app", IndexNameFrequency::Yearly);
        assert!(name.starts_with("app-"));
        assert_eq!(name.len(), "app-".len() + 4);
    }

    #[test]
    fn test_frequency_parse() {
        for frequency in IndexNameFrequency::all() {
            let parsed: IndexNameFrequency = frequency.to_string().parse().unwrap();
            assert_eq!(parsed, *frequency);
        }
        assert_eq!("weekly".parse::<IndexNameFrequency>().unwrap(), IndexNameFrequency::Weekly);

        let err = "HOURLY".parse::<IndexNameFrequency>().unwrap_err();
        assert!(err.message.contains("not a valid index name frequency"));
    }
}
