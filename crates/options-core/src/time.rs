use chrono::{Datelike, Duration, NaiveDate};

/// NYSE trading days per year, used to express time-to-expiry in year units.
pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Count business days (Mon-Fri) in the half-open interval `[start, end)`.
///
/// Matches numpy's `busday_count`: the start date is included when it is a
/// weekday, the end date never is, and a reversed interval yields the negated
/// count. Exchange holidays are not modeled.
pub fn business_days_between(start: NaiveDate, end: NaiveDate) -> i64 {
    if end < start {
        return -business_days_between(end, start);
    }

    let full_weeks = (end - start).num_days() / 7;
    let mut count = full_weeks * 5;

    let mut day = start + Duration::days(full_weeks * 7);
    while day < end {
        if day.weekday().number_from_monday() <= 5 {
            count += 1;
        }
        day += Duration::days(1);
    }
    count
}

/// Time to expiry in trading-year units.
///
/// Same-day and already-expired contracts are floored to one trading day so
/// the gamma formula never divides by a zero time term.
pub fn years_to_expiry(valuation: NaiveDate, expiration: NaiveDate) -> f64 {
    let days = business_days_between(valuation, expiration);
    if days <= 0 {
        1.0 / TRADING_DAYS_PER_YEAR
    } else {
        days as f64 / TRADING_DAYS_PER_YEAR
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_busdays_within_week() {
        // Mon 2024-01-08 .. Fri 2024-01-12: Mon-Thu counted, Fri excluded
        assert_eq!(business_days_between(d(2024, 1, 8), d(2024, 1, 12)), 4);
    }

    #[test]
    fn test_busdays_over_weekend() {
        // Fri 2024-01-12 .. Mon 2024-01-15: only Friday counts
        assert_eq!(business_days_between(d(2024, 1, 12), d(2024, 1, 15)), 1);
    }

    #[test]
    fn test_busdays_same_day_and_reversed() {
        assert_eq!(business_days_between(d(2024, 1, 10), d(2024, 1, 10)), 0);
        assert_eq!(business_days_between(d(2024, 1, 15), d(2024, 1, 8)), -5);
    }

    #[test]
    fn test_busdays_full_weeks() {
        // Two full calendar weeks
        assert_eq!(business_days_between(d(2024, 1, 8), d(2024, 1, 22)), 10);
    }

    #[test]
    fn test_years_to_expiry_floor() {
        let one_day = 1.0 / TRADING_DAYS_PER_YEAR;
        // Same day floors to one trading day
        assert!((years_to_expiry(d(2024, 1, 10), d(2024, 1, 10)) - one_day).abs() < 1e-12);
        // Expired contracts also floor, never negative
        assert!((years_to_expiry(d(2024, 1, 15), d(2024, 1, 10)) - one_day).abs() < 1e-12);
        // A week out is 5 trading days
        let t = years_to_expiry(d(2024, 1, 8), d(2024, 1, 15));
        assert!((t - 5.0 / TRADING_DAYS_PER_YEAR).abs() < 1e-12);
    }
}
