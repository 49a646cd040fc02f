use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;

use crate::error::Error;

use super::BoostId;

pub const MINIMUM_DURATION_DAYS: i32 = 1;

/// Computes the total price of a boost, failing if the duration is outside
/// `[1, maximum_days]` or the rate is negative.
pub fn compute_cost(
    duration_days: i32,
    daily_cost: Decimal,
    maximum_days: i32,
) -> Result<Decimal, Error> {
    validate_duration(duration_days, maximum_days)?;
    if daily_cost < Decimal::ZERO {
        return Err(Error::NegativeDailyCost { daily_cost });
    }

    Ok(compute_total(duration_days, daily_cost))
}

pub fn compute_total(duration_days: i32, daily_cost: Decimal) -> Decimal {
    Decimal::from(duration_days) * daily_cost
}

/// Fails with `InvalidStartDate` when the window would end past the last
/// representable instant.
pub fn compute_end_date(
    start_date: DateTime<Utc>,
    duration_days: i32,
) -> Result<DateTime<Utc>, Error> {
    start_date
        .checked_add_signed(Duration::days(i64::from(duration_days)))
        .ok_or(Error::InvalidStartDate {
            start_date,
            duration_days,
        })
}

pub fn validate_duration(duration_days: i32, maximum_days: i32) -> Result<(), Error> {
    if duration_days < MINIMUM_DURATION_DAYS || duration_days > maximum_days {
        return Err(Error::InvalidDuration {
            duration_days,
            maximum: maximum_days,
        });
    }

    Ok(())
}

/// Trims and de-duplicates the requested categories, keeping their order.
pub fn normalize_categories(categories: Vec<String>) -> Result<Vec<String>, Error> {
    let mut normalized: Vec<String> = Vec::with_capacity(categories.len());
    for category in categories {
        let category = category.trim();
        if !category.is_empty() && !normalized.iter().any(|c| c == category) {
            normalized.push(category.to_string());
        }
    }

    if normalized.is_empty() {
        return Err(Error::NoCategories);
    }

    Ok(normalized)
}

/// Returns the trimmed reason, or `MissingReason` if there is nothing left.
pub fn require_reason(boost_id: BoostId, reason: Option<String>) -> Result<String, Error> {
    reason
        .map(|reason| reason.trim().to_string())
        .filter(|reason| !reason.is_empty())
        .ok_or(Error::MissingReason { boost_id })
}
