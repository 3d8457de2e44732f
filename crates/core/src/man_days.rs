//! Man-day and specialist counters derived from a request's dates and slots.

use chrono::{Datelike, NaiveDate};

use crate::domain::request::MemberSlot;

/// Counts Monday–Friday dates in `[begin, end]`. An inverted range counts as zero.
pub fn business_days(begin: NaiveDate, end: NaiveDate) -> u32 {
    if begin > end {
        return 0;
    }

    let total = (end - begin).num_days() + 1;
    let full_weeks = total / 7;
    let remainder = total % 7;
    let first_weekday = i64::from(begin.weekday().num_days_from_monday());

    let tail = (0..remainder).filter(|offset| (first_weekday + offset) % 7 < 5).count() as i64;

    u32::try_from(full_weeks * 5 + tail).unwrap_or(u32::MAX)
}

/// Saturates at `u32::MAX`; validation rejects slot sets whose sum does not fit.
pub fn total_specialists(slots: &[MemberSlot]) -> u32 {
    slots.iter().fold(0u32, |total, slot| total.saturating_add(slot.number_of_profiles_needed))
}
