//! Ports for the systems the workflow consumes but does not own.

use std::collections::HashMap;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::offer::EmployeeProfile;
use crate::domain::request::{MemberSlot, SlotKey};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgreementCombination {
    pub domain_id: String,
    pub domain_name: String,
    pub role_id: String,
    pub role: String,
    pub level: String,
    pub technology_level: String,
}

impl AgreementCombination {
    pub fn key(&self) -> SlotKey {
        SlotKey {
            domain_id: self.domain_id.clone(),
            role: self.role.clone(),
            level: self.level.clone(),
            technology_level: self.technology_level.clone(),
        }
    }

    pub fn from_slot(slot: &MemberSlot) -> Self {
        Self {
            domain_id: slot.domain_id.clone(),
            domain_name: slot.domain_name.clone(),
            role_id: slot.role_id.clone(),
            role: slot.role.clone(),
            level: slot.level.clone(),
            technology_level: slot.technology_level.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgreementTerms {
    pub agreement_id: String,
    pub combinations: Vec<AgreementCombination>,
}

impl AgreementTerms {
    pub fn new(agreement_id: impl Into<String>, combinations: Vec<AgreementCombination>) -> Self {
        Self { agreement_id: agreement_id.into(), combinations }
    }

    pub fn contains(&self, key: &SlotKey) -> bool {
        self.combinations.iter().any(|combination| &combination.key() == key)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum UpstreamError {
    #[error("upstream `{service}` is unreachable: {message}")]
    Unavailable { service: String, message: String },
    #[error("upstream `{service}` answered with status {status}")]
    Status { service: String, status: u16 },
    #[error("upstream `{service}` returned an unreadable payload: {message}")]
    Decode { service: String, message: String },
}

#[async_trait]
pub trait AgreementCatalog: Send + Sync {
    /// `Ok(None)` means the agreement does not exist.
    async fn terms(&self, agreement_id: &str) -> Result<Option<AgreementTerms>, UpstreamError>;
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateQuery {
    pub domain_id: String,
    pub role: String,
    pub level: String,
    pub technology_level: String,
    pub limit: u32,
}

impl CandidateQuery {
    pub fn for_slot(slot: &MemberSlot, limit: u32) -> Self {
        Self {
            domain_id: slot.domain_id.clone(),
            role: slot.role.clone(),
            level: slot.level.clone(),
            technology_level: slot.technology_level.clone(),
            limit,
        }
    }

    pub fn key(&self) -> SlotKey {
        SlotKey {
            domain_id: self.domain_id.clone(),
            role: self.role.clone(),
            level: self.level.clone(),
            technology_level: self.technology_level.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub provider_name: String,
    pub price: Decimal,
    #[serde(default)]
    pub employee_profiles: Vec<EmployeeProfile>,
}

#[async_trait]
pub trait CandidateSource: Send + Sync {
    async fn candidates(&self, query: &CandidateQuery) -> Result<Vec<Candidate>, UpstreamError>;
}

#[derive(Clone, Debug, Default)]
pub struct StaticAgreementCatalog {
    agreements: HashMap<String, AgreementTerms>,
}

impl StaticAgreementCatalog {
    pub fn with_terms(mut self, terms: AgreementTerms) -> Self {
        self.agreements.insert(terms.agreement_id.clone(), terms);
        self
    }
}

#[async_trait]
impl AgreementCatalog for StaticAgreementCatalog {
    async fn terms(&self, agreement_id: &str) -> Result<Option<AgreementTerms>, UpstreamError> {
        Ok(self.agreements.get(agreement_id).cloned())
    }
}

#[derive(Clone, Debug, Default)]
pub struct StaticCandidateSource {
    candidates: HashMap<SlotKey, Vec<Candidate>>,
}

impl StaticCandidateSource {
    pub fn with_candidates(mut self, key: SlotKey, candidates: Vec<Candidate>) -> Self {
        self.candidates.insert(key, candidates);
        self
    }
}

#[async_trait]
impl CandidateSource for StaticCandidateSource {
    async fn candidates(&self, query: &CandidateQuery) -> Result<Vec<Candidate>, UpstreamError> {
        let limit = usize::try_from(query.limit).unwrap_or(usize::MAX);
        Ok(self
            .candidates
            .get(&query.key())
            .map(|candidates| candidates.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}
