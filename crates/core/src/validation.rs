use std::collections::HashSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::collaborators::AgreementTerms;
use crate::domain::request::{MemberSlot, RequestSpec, RequestType, SlotKey};

pub const MIN_OFFERS: u32 = 1;
pub const MAX_OFFERS: u32 = 2;

#[derive(Clone, Debug, Error, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SpecViolation {
    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange { field: String, value: u32, min: u32, max: u32 },
    #[error("{request_type:?} request has an invalid member layout: {reason}")]
    InvalidSlotShape { request_type: RequestType, reason: String },
    #[error("end date {end} is before begin date {begin}")]
    InvalidRange { begin: NaiveDate, end: NaiveDate },
    #[error("member slot {slot} is not offered by the master agreement")]
    UnknownCombination { slot: SlotKey },
}

pub fn validate_offer_count(n: u32) -> Result<(), SpecViolation> {
    if (MIN_OFFERS..=MAX_OFFERS).contains(&n) {
        return Ok(());
    }

    Err(SpecViolation::OutOfRange {
        field: "numberOfOffers".to_string(),
        value: n,
        min: MIN_OFFERS,
        max: MAX_OFFERS,
    })
}

pub fn validate_profile_counts(
    request_type: RequestType,
    slots: &[MemberSlot],
) -> Result<(), SpecViolation> {
    let shape = |reason: String| SpecViolation::InvalidSlotShape { request_type, reason };

    match request_type {
        RequestType::Single => match slots {
            [slot] if slot.number_of_profiles_needed == 1 => Ok(()),
            [slot] => Err(shape(format!(
                "a single request needs exactly one profile, got {}",
                slot.number_of_profiles_needed
            ))),
            _ => Err(shape(format!("expected exactly one member slot, got {}", slots.len()))),
        },
        RequestType::Multi => match slots {
            [slot] if slot.number_of_profiles_needed >= 2 => Ok(()),
            [slot] => Err(shape(format!(
                "a multi request needs at least two profiles, got {}",
                slot.number_of_profiles_needed
            ))),
            _ => Err(shape(format!("expected exactly one member slot, got {}", slots.len()))),
        },
        RequestType::Team => {
            if slots.len() < 2 {
                return Err(shape(format!(
                    "a team request needs at least two member slots, got {}",
                    slots.len()
                )));
            }
            if let Some(slot) = slots.iter().find(|slot| slot.number_of_profiles_needed == 0) {
                return Err(shape(format!("member slot {} needs at least one profile", slot.key())));
            }
            let total = slots
                .iter()
                .try_fold(0u32, |total, slot| total.checked_add(slot.number_of_profiles_needed));
            if total.is_none() {
                return Err(shape("total profile count does not fit in a request".to_string()));
            }

            let mut seen = HashSet::new();
            for slot in slots {
                if !seen.insert(slot.profile_key()) {
                    let (role, level, technology_level) = slot.profile_key();
                    return Err(shape(format!(
                        "duplicate member combination {role}/{level}/{technology_level}"
                    )));
                }
            }
            Ok(())
        }
    }
}

pub fn validate_date_range(begin: NaiveDate, end: NaiveDate) -> Result<(), SpecViolation> {
    if end < begin {
        return Err(SpecViolation::InvalidRange { begin, end });
    }
    Ok(())
}

/// Every slot must appear in the agreement's combinations.
/// `None` means the catalog has no such agreement.
pub fn validate_against_agreement(
    slots: &[MemberSlot],
    terms: Option<&AgreementTerms>,
) -> Result<(), SpecViolation> {
    match slots.iter().find(|slot| !terms.is_some_and(|terms| terms.contains(&slot.key()))) {
        Some(slot) => Err(SpecViolation::UnknownCombination { slot: slot.key() }),
        None => Ok(()),
    }
}

pub fn describe_violations(violations: &[SpecViolation]) -> String {
    violations.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

#[derive(Clone, Copy, Debug, Default)]
pub struct RequestSpecValidator;

impl RequestSpecValidator {
    /// Runs all checks and collects every violation rather than stopping at the first.
    pub fn validate(
        &self,
        spec: &RequestSpec,
        terms: Option<&AgreementTerms>,
    ) -> Vec<SpecViolation> {
        [
            validate_offer_count(spec.number_of_offers),
            validate_profile_counts(spec.request_type, &spec.selected_members),
            validate_date_range(spec.begin, spec.end),
            validate_against_agreement(&spec.selected_members, terms),
        ]
        .into_iter()
        .filter_map(Result::err)
        .collect()
    }
}
