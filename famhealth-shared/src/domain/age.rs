//! Calendar arithmetic on birth dates and due dates

use chrono::{Datelike, Months, NaiveDate};

/// Average month length used for vaccine schedules
const DAYS_PER_MONTH: f64 = 30.44;

/// Whole years elapsed from `birth` to `today`
pub fn years_between(birth: NaiveDate, today: NaiveDate) -> i32 {
    let mut years = today.year() - birth.year();
    if (today.month(), today.day()) < (birth.month(), birth.day()) {
        years -= 1;
    }
    years.max(0)
}

/// Approximate months of age, floored
pub fn months_between(birth: NaiveDate, today: NaiveDate) -> i32 {
    let days = (today - birth).num_days();
    if days <= 0 {
        return 0;
    }
    (days as f64 / DAYS_PER_MONTH).floor() as i32
}

/// `date` shifted forward by `months`, clamped to the end of shorter months
pub fn add_months(date: NaiveDate, months: u32) -> NaiveDate {
    date.checked_add_months(Months::new(months)).unwrap_or(NaiveDate::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_years_between_before_and_after_birthday() {
        assert_eq!(years_between(d(1990, 6, 15), d(2024, 6, 14)), 33);
        assert_eq!(years_between(d(1990, 6, 15), d(2024, 6, 15)), 34);
        assert_eq!(years_between(d(2030, 1, 1), d(2024, 1, 1)), 0);
    }

    #[test]
    fn test_months_between() {
        assert_eq!(months_between(d(2024, 1, 1), d(2024, 1, 1)), 0);
        assert_eq!(months_between(d(2024, 1, 1), d(2024, 7, 1)), 5);
        assert_eq!(months_between(d(2024, 1, 1), d(2025, 1, 1)), 12);
    }

    #[test]
    fn test_add_months_clamps() {
        assert_eq!(add_months(d(2024, 1, 31), 1), d(2024, 2, 29));
        assert_eq!(add_months(d(2024, 3, 10), 12), d(2025, 3, 10));
    }
}
