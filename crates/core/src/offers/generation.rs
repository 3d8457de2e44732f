use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::collaborators::{Candidate, CandidateQuery, CandidateSource, UpstreamError};
use crate::domain::offer::{Offer, OfferId, OfferStatus};
use crate::domain::request::{CycleStatus, MemberSlot, RequestStatus, ServiceRequest, SlotKey};
use crate::errors::ErrorKind;

pub const DEFAULT_CANDIDATE_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_MAX_OFFERS_PER_SLOT: u32 = 2;

/// Explains why a member slot received fewer offers than requested.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberStatus {
    pub slot: SlotKey,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationReport {
    pub cycle: CycleStatus,
    pub offers: Vec<Offer>,
    pub member_statuses: Vec<MemberStatus>,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GenerationError {
    #[error("offers cannot be generated while the request is {status}")]
    IllegalState { status: RequestStatus },
    #[error("offers for {cycle} were already generated; advance the cycle first")]
    AlreadyGenerated { cycle: CycleStatus },
    #[error("candidate source failed for slot {slot}: {source}")]
    Upstream { slot: String, source: UpstreamError },
    #[error("candidate source did not answer for slot {slot} within {secs}s")]
    Timeout { slot: String, secs: u64 },
}

impl GenerationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::IllegalState { .. } | Self::AlreadyGenerated { .. } => ErrorKind::IllegalState,
            Self::Upstream { .. } | Self::Timeout { .. } => ErrorKind::UpstreamUnavailable,
        }
    }
}

#[derive(Clone, Debug)]
pub struct OfferGenerationEngine {
    candidate_timeout: Duration,
    max_offers_per_slot: u32,
}

impl Default for OfferGenerationEngine {
    fn default() -> Self {
        Self::new(
            Duration::from_secs(DEFAULT_CANDIDATE_TIMEOUT_SECS),
            DEFAULT_MAX_OFFERS_PER_SLOT,
        )
    }
}

impl OfferGenerationEngine {
    pub fn new(candidate_timeout: Duration, max_offers_per_slot: u32) -> Self {
        Self { candidate_timeout, max_offers_per_slot: max_offers_per_slot.max(1) }
    }

    pub fn candidate_timeout(&self) -> Duration {
        self.candidate_timeout
    }

    /// Builds the offers for the request's current cycle. Nothing is persisted here; any
    /// upstream failure aborts the whole run.
    pub async fn generate<S>(
        &self,
        request: &ServiceRequest,
        existing: &[Offer],
        source: &S,
        now: DateTime<Utc>,
    ) -> Result<GenerationReport, GenerationError>
    where
        S: CandidateSource + ?Sized,
    {
        if !request.status.accepts_offer_changes() {
            return Err(GenerationError::IllegalState { status: request.status });
        }

        let cycle = request.cycle_status;
        if existing.iter().any(|offer| offer.cycle == cycle) {
            return Err(GenerationError::AlreadyGenerated { cycle });
        }

        let limit = request.number_of_offers.clamp(1, self.max_offers_per_slot);
        let mut offers = Vec::new();
        let mut member_statuses = Vec::new();

        for slot in &request.selected_members {
            let mut candidates = self.query(slot, limit, source).await?;
            // An unnamed candidate would read back as a placeholder.
            candidates.retain(|candidate| !candidate.provider_name.trim().is_empty());
            candidates.truncate(usize::try_from(limit).unwrap_or(usize::MAX));

            if candidates.is_empty() {
                member_statuses.push(MemberStatus {
                    slot: slot.key(),
                    message: format!("No providers available for {} ({})", slot.role, slot.level),
                });
                offers.push(build_offer(request, slot, None, cycle, now));
                continue;
            }

            if candidates.len() < limit as usize {
                member_statuses.push(MemberStatus {
                    slot: slot.key(),
                    message: format!(
                        "Only {} of {} requested offers available for {} ({})",
                        candidates.len(),
                        limit,
                        slot.role,
                        slot.level
                    ),
                });
            }
            offers.extend(
                candidates
                    .into_iter()
                    .map(|candidate| build_offer(request, slot, Some(candidate), cycle, now)),
            );
        }

        Ok(GenerationReport { cycle, offers, member_statuses })
    }

    async fn query<S>(
        &self,
        slot: &MemberSlot,
        limit: u32,
        source: &S,
    ) -> Result<Vec<Candidate>, GenerationError>
    where
        S: CandidateSource + ?Sized,
    {
        let query = CandidateQuery::for_slot(slot, limit);
        match tokio::time::timeout(self.candidate_timeout, source.candidates(&query)).await {
            Ok(Ok(candidates)) => Ok(candidates),
            Ok(Err(source)) => {
                Err(GenerationError::Upstream { slot: slot.key().to_string(), source })
            }
            Err(_) => Err(GenerationError::Timeout {
                slot: slot.key().to_string(),
                secs: self.candidate_timeout.as_secs(),
            }),
        }
    }
}

fn build_offer(
    request: &ServiceRequest,
    slot: &MemberSlot,
    candidate: Option<Candidate>,
    cycle: CycleStatus,
    now: DateTime<Utc>,
) -> Offer {
    let (provider_name, price, employee_profiles) = match candidate {
        Some(candidate) => {
            (Some(candidate.provider_name), candidate.price, candidate.employee_profiles)
        }
        None => (None, Decimal::ZERO, Vec::new()),
    };

    Offer {
        id: OfferId(Uuid::new_v4().to_string()),
        service_request_id: request.id.clone(),
        domain_id: slot.domain_id.clone(),
        role: slot.role.clone(),
        level: slot.level.clone(),
        technology_level: slot.technology_level.clone(),
        provider_name,
        price,
        cycle,
        employee_profiles,
        status: OfferStatus::Unselected,
        created_at: now,
    }
}
