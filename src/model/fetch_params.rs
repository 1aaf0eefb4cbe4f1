use anyhow::{bail, Result};
use chrono::NaiveDate;

/// Immutable query descriptor for one sync invocation, shared read-only
/// across all adapters.
#[derive(Debug, Clone)]
pub struct FetchParams {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Email/identifier to filter on. When `None`, adapters fall back to
    /// the identity they authenticated as.
    pub user_filter: Option<String>,
}

impl FetchParams {
    pub fn new(
        start_date: NaiveDate,
        end_date: NaiveDate,
        user_filter: Option<String>,
    ) -> Result<Self> {
        if start_date > end_date {
            bail!("start date {start_date} is after end date {end_date}");
        }
        Ok(Self {
            start_date,
            end_date,
            user_filter,
        })
    }

    /// Whether an RFC 3339 timestamp falls inside the inclusive date range.
    ///
    /// The range is in whole days: a timestamp anywhere on `end_date` is in
    /// range, one on the following day is not. Unparseable timestamps are
    /// treated as out of range.
    pub fn contains(&self, timestamp: &str) -> bool {
        let Ok(dt) = chrono::DateTime::parse_from_rfc3339(timestamp) else {
            return false;
        };
        let date = dt.date_naive();
        date >= self.start_date && date <= self.end_date
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn rejects_inverted_range() {
        let result = FetchParams::new(date(2025, 2, 1), date(2025, 1, 1), None);
        assert!(result.is_err());
    }

    #[test]
    fn single_day_range_is_valid() {
        let params = FetchParams::new(date(2025, 1, 15), date(2025, 1, 15), None).unwrap();
        assert!(params.contains("2025-01-15T09:00:00Z"));
    }

    #[test]
    fn end_date_is_inclusive() {
        let params = FetchParams::new(date(2025, 1, 1), date(2025, 1, 31), None).unwrap();
        assert!(params.contains("2025-01-31T23:59:59Z"));
        assert!(!params.contains("2025-02-01T00:00:00Z"));
    }

    #[test]
    fn start_date_is_inclusive() {
        let params = FetchParams::new(date(2025, 1, 1), date(2025, 1, 31), None).unwrap();
        assert!(params.contains("2025-01-01T00:00:00Z"));
        assert!(!params.contains("2024-12-31T23:59:59Z"));
    }

    #[test]
    fn garbage_timestamp_is_out_of_range() {
        let params = FetchParams::new(date(2025, 1, 1), date(2025, 1, 31), None).unwrap();
        assert!(!params.contains("not a timestamp"));
    }
}
