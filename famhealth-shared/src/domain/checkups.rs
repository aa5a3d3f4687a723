//! Checkup templates and due-date status

use chrono::NaiveDate;
use serde::Serialize;

use crate::domain::age::add_months;

/// Suggested recurring check
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckTemplate {
    pub name: &'static str,
    pub interval_months: i32,
    pub description: &'static str,
}

pub const CHECK_TEMPLATES: [CheckTemplate; 7] = [
    CheckTemplate { name: "洗牙", interval_months: 6, description: "建议每半年洗牙一次" },
    CheckTemplate { name: "年度体检", interval_months: 12, description: "每年一次全面体检" },
    CheckTemplate { name: "眼科检查", interval_months: 24, description: "每2年检查一次视力" },
    CheckTemplate { name: "口腔检查", interval_months: 12, description: "每年一次口腔全面检查" },
    CheckTemplate { name: "乳腺检查", interval_months: 12, description: "女性40岁以上建议每年一次" },
    CheckTemplate { name: "肠镜", interval_months: 60, description: "40岁以上建议每5年一次" },
    CheckTemplate { name: "骨密度检查", interval_months: 24, description: "50岁以上建议每2年一次" },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Pending,
    Completed,
    Skipped,
}

/// Where an item stands on a given day
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckProgress {
    pub status: CheckStatus,
    pub next_due: Option<NaiveDate>,
    pub overdue_days: i64,
}

/// Computes an item's status from its skip date and most recent check
///
/// An active skip wins. Otherwise the item is due `interval_months` after
/// the last check; on or past that day it is pending and overdue by the
/// elapsed days. Items that were never checked are pending with no due date.
pub fn check_progress(
    interval_months: i32,
    skipped_until: Option<NaiveDate>,
    last_check: Option<NaiveDate>,
    today: NaiveDate,
) -> CheckProgress {
    if let Some(until) = skipped_until.filter(|until| *until > today) {
        return CheckProgress {
            status: CheckStatus::Skipped,
            next_due: Some(until),
            overdue_days: 0,
        };
    }

    let Some(last) = last_check else {
        return CheckProgress {
            status: CheckStatus::Pending,
            next_due: None,
            overdue_days: 0,
        };
    };

    let next_due = add_months(last, interval_months.max(0) as u32);
    if next_due > today {
        CheckProgress {
            status: CheckStatus::Completed,
            next_due: Some(next_due),
            overdue_days: 0,
        }
    } else {
        CheckProgress {
            status: CheckStatus::Pending,
            next_due: Some(next_due),
            overdue_days: (today - next_due).num_days(),
        }
    }
}

/// Skip date for "skip this cycle": one interval from today
pub fn skip_until(interval_months: i32, today: NaiveDate) -> NaiveDate {
    add_months(today, interval_months.max(0) as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_templates() {
        assert_eq!(CHECK_TEMPLATES.len(), 7);
        assert_eq!(CHECK_TEMPLATES[0].name, "洗牙");
        assert_eq!(CHECK_TEMPLATES[5].interval_months, 60);
    }

    #[test]
    fn test_never_checked_is_pending() {
        let progress = check_progress(12, None, None, d(2024, 5, 1));
        assert_eq!(progress.status, CheckStatus::Pending);
        assert_eq!(progress.next_due, None);
        assert_eq!(progress.overdue_days, 0);
    }

    #[test]
    fn test_recent_check_is_completed() {
        let progress = check_progress(6, None, Some(d(2024, 1, 10)), d(2024, 5, 1));
        assert_eq!(progress.status, CheckStatus::Completed);
        assert_eq!(progress.next_due, Some(d(2024, 7, 10)));
    }

    #[test]
    fn test_overdue_counts_days() {
        let progress = check_progress(6, None, Some(d(2023, 10, 1)), d(2024, 4, 11));
        assert_eq!(progress.status, CheckStatus::Pending);
        assert_eq!(progress.next_due, Some(d(2024, 4, 1)));
        assert_eq!(progress.overdue_days, 10);
    }

    #[test]
    fn test_due_today_is_pending() {
        let progress = check_progress(12, None, Some(d(2023, 4, 1)), d(2024, 4, 1));
        assert_eq!(progress.status, CheckStatus::Pending);
        assert_eq!(progress.overdue_days, 0);
    }

    #[test]
    fn test_active_skip_wins() {
        let progress = check_progress(6, Some(d(2024, 10, 1)), Some(d(2020, 1, 1)), d(2024, 4, 1));
        assert_eq!(progress.status, CheckStatus::Skipped);
        assert_eq!(progress.next_due, Some(d(2024, 10, 1)));
    }

    #[test]
    fn test_expired_skip_is_ignored() {
        let progress = check_progress(6, Some(d(2024, 4, 1)), None, d(2024, 4, 1));
        assert_eq!(progress.status, CheckStatus::Pending);
    }

    #[test]
    fn test_skip_until() {
        assert_eq!(skip_until(6, d(2024, 8, 31)), d(2025, 2, 28));
    }
}
