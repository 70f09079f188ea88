// src/services/calendar.rs

use chrono::{Duration, NaiveDate};

use crate::errors::{AppError, AppResult};

/// Ethiopian month names, Meskerem (1) through Pagume (13).
pub const ETHIOPIAN_MONTHS: [&str; 13] = [
    "Meskerem", "Tikimt", "Hidar", "Tahsas", "Tir", "Yekatit", "Megabit", "Miyazia", "Ginbot",
    "Sene", "Hamle", "Nehase", "Pagume",
];

/// Every month is billed as a flat 30-day block counted from the New Year
/// anchor. Pagume really has 5 or 6 days; the flat step is the billing
/// convention the schools run on, not an astronomical claim.
pub const DAYS_PER_MONTH: i64 = 30;

pub fn month_name(month_number: i32) -> AppResult<&'static str> {
    validate_month(month_number)?;
    Ok(ETHIOPIAN_MONTHS[(month_number - 1) as usize])
}

/// Gregorian date on which the given Ethiopian month starts:
/// `anchor + (month_number - 1) * 30 days`.
pub fn month_start_date(anchor: NaiveDate, month_number: i32) -> AppResult<NaiveDate> {
    validate_month(month_number)?;
    Ok(anchor + Duration::days((month_number as i64 - 1) * DAYS_PER_MONTH))
}

/// Due date for a month's invoice: month start plus the grace window.
pub fn due_date(anchor: NaiveDate, month_number: i32, grace_days: i32) -> AppResult<NaiveDate> {
    let start = month_start_date(anchor, month_number)?;
    Ok(start + Duration::days(grace_days as i64))
}

fn validate_month(month_number: i32) -> AppResult<()> {
    if (1..=13).contains(&month_number) {
        Ok(())
    } else {
        Err(AppError::Validation(format!(
            "month number {month_number} is out of range, expected 1..=13"
        )))
    }
}
