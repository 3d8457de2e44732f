use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::man_days::{business_days, total_specialists};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServiceRequestId(pub String);

impl fmt::Display for ServiceRequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestType {
    Single,
    Team,
    Multi,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LocationType {
    Onshore,
    Nearshore,
    Farshore,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestStatus {
    Draft,
    Submitted,
    Assigned,
    Approved,
    Rejected,
    PmOfferEvaluation,
    UserOfferReEvaluation,
    OrderCreated,
}

impl RequestStatus {
    pub const ALL: [RequestStatus; 8] = [
        Self::Draft,
        Self::Submitted,
        Self::Assigned,
        Self::Approved,
        Self::Rejected,
        Self::PmOfferEvaluation,
        Self::UserOfferReEvaluation,
        Self::OrderCreated,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "Draft",
            Self::Submitted => "Submitted",
            Self::Assigned => "Assigned",
            Self::Approved => "Approved",
            Self::Rejected => "Rejected",
            Self::PmOfferEvaluation => "PmOfferEvaluation",
            Self::UserOfferReEvaluation => "UserOfferReEvaluation",
            Self::OrderCreated => "OrderCreated",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        Self::ALL.into_iter().find(|status| status.as_str().eq_ignore_ascii_case(value))
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::OrderCreated)
    }

    /// Offers may be generated and toggled only while the requester owns the selection.
    pub fn accepts_offer_changes(&self) -> bool {
        matches!(self, Self::Approved | Self::UserOfferReEvaluation)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Negotiation round, rendered as `Cycle1`, `Cycle2`, ...
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CycleStatus(u32);

impl CycleStatus {
    pub const FIRST: CycleStatus = CycleStatus(1);

    pub fn new(number: u32) -> Option<Self> {
        (number >= 1).then_some(Self(number))
    }

    pub fn number(self) -> u32 {
        self.0
    }

    pub fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl Default for CycleStatus {
    fn default() -> Self {
        Self::FIRST
    }
}

impl fmt::Display for CycleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cycle{}", self.0)
    }
}

impl FromStr for CycleStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let digits = trimmed
            .get(..5)
            .filter(|prefix| prefix.eq_ignore_ascii_case("cycle"))
            .map(|_| &trimmed[5..])
            .ok_or_else(|| format!("cycle status `{value}` must look like `Cycle<n>`"))?;

        digits
            .parse::<u32>()
            .ok()
            .and_then(Self::new)
            .ok_or_else(|| format!("cycle status `{value}` must carry a number >= 1"))
    }
}

impl TryFrom<String> for CycleStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CycleStatus> for String {
    fn from(value: CycleStatus) -> Self {
        value.to_string()
    }
}

/// Identity of a member slot when matching offers and catalog entries.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotKey {
    pub domain_id: String,
    pub role: String,
    pub level: String,
    pub technology_level: String,
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}/{}", self.domain_id, self.role, self.level, self.technology_level)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberSlot {
    pub domain_id: String,
    pub domain_name: String,
    pub role_id: String,
    pub role: String,
    pub level: String,
    pub technology_level: String,
    pub number_of_profiles_needed: u32,
}

impl MemberSlot {
    pub fn key(&self) -> SlotKey {
        SlotKey {
            domain_id: self.domain_id.clone(),
            role: self.role.clone(),
            level: self.level.clone(),
            technology_level: self.technology_level.clone(),
        }
    }

    /// Team requests may not repeat this combination across slots.
    pub fn profile_key(&self) -> (&str, &str, &str) {
        (&self.role, &self.level, &self.technology_level)
    }
}

/// Append-only log of human-readable events and comments.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationLog(Vec<String>);

impl NotificationLog {
    pub fn push(&mut self, entry: impl Into<String>) {
        self.0.push(entry.into());
    }

    pub fn entries(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Most recent entry starting with `prefix`, e.g. the latest rejection comment.
    pub fn latest_with_prefix(&self, prefix: &str) -> Option<&str> {
        self.0.iter().rev().find(|entry| entry.starts_with(prefix)).map(String::as_str)
    }
}

impl From<Vec<String>> for NotificationLog {
    fn from(entries: Vec<String>) -> Self {
        Self(entries)
    }
}

/// The user-editable part of a service request. Derived counters are not part of it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestSpec {
    pub agreement_id: String,
    pub task_description: String,
    pub project: String,
    #[serde(rename = "type")]
    pub request_type: RequestType,
    pub location: String,
    pub location_type: LocationType,
    pub begin: NaiveDate,
    pub end: NaiveDate,
    pub number_of_offers: u32,
    #[serde(default)]
    pub representatives: BTreeSet<String>,
    #[serde(default)]
    pub information_for_provider_manager: String,
    pub consumer: String,
    pub selected_members: Vec<MemberSlot>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRequest {
    pub id: ServiceRequestId,
    pub agreement_id: String,
    pub task_description: String,
    pub project: String,
    #[serde(rename = "type")]
    pub request_type: RequestType,
    pub location: String,
    pub location_type: LocationType,
    pub begin: NaiveDate,
    pub end: NaiveDate,
    pub amount_of_man_days: u32,
    pub number_of_offers: u32,
    pub number_of_specialists: u32,
    pub representatives: BTreeSet<String>,
    pub information_for_provider_manager: String,
    pub consumer: String,
    pub requested_by: String,
    pub provider_manager_id: Option<String>,
    pub cycle_status: CycleStatus,
    pub status: RequestStatus,
    pub notifications: NotificationLog,
    pub selected_members: Vec<MemberSlot>,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ServiceRequest {
    pub fn from_spec(
        id: ServiceRequestId,
        spec: RequestSpec,
        requested_by: impl Into<String>,
        status: RequestStatus,
        now: DateTime<Utc>,
    ) -> Self {
        let mut request = Self {
            id,
            agreement_id: String::new(),
            task_description: String::new(),
            project: String::new(),
            request_type: spec.request_type,
            location: String::new(),
            location_type: spec.location_type,
            begin: spec.begin,
            end: spec.end,
            amount_of_man_days: 0,
            number_of_offers: 0,
            number_of_specialists: 0,
            representatives: BTreeSet::new(),
            information_for_provider_manager: String::new(),
            consumer: String::new(),
            requested_by: requested_by.into(),
            provider_manager_id: None,
            cycle_status: CycleStatus::FIRST,
            status,
            notifications: NotificationLog::default(),
            selected_members: Vec::new(),
            version: 0,
            created_at: now,
            updated_at: now,
        };
        request.apply_spec(spec);
        request
    }

    /// Overwrites the editable fields and recomputes the derived counters.
    pub fn apply_spec(&mut self, spec: RequestSpec) {
        self.agreement_id = spec.agreement_id;
        self.task_description = spec.task_description;
        self.project = spec.project;
        self.request_type = spec.request_type;
        self.location = spec.location;
        self.location_type = spec.location_type;
        self.begin = spec.begin;
        self.end = spec.end;
        self.number_of_offers = spec.number_of_offers;
        self.representatives = spec.representatives;
        self.information_for_provider_manager = spec.information_for_provider_manager;
        self.consumer = spec.consumer;
        self.selected_members = spec.selected_members;
        self.recompute_derived();
    }

    pub fn recompute_derived(&mut self) {
        self.amount_of_man_days = business_days(self.begin, self.end);
        self.number_of_specialists = total_specialists(&self.selected_members);
    }

    pub fn spec(&self) -> RequestSpec {
        RequestSpec {
            agreement_id: self.agreement_id.clone(),
            task_description: self.task_description.clone(),
            project: self.project.clone(),
            request_type: self.request_type,
            location: self.location.clone(),
            location_type: self.location_type,
            begin: self.begin,
            end: self.end,
            number_of_offers: self.number_of_offers,
            representatives: self.representatives.clone(),
            information_for_provider_manager: self.information_for_provider_manager.clone(),
            consumer: self.consumer.clone(),
            selected_members: self.selected_members.clone(),
        }
    }

    pub fn slot_for(&self, key: &SlotKey) -> Option<&MemberSlot> {
        self.selected_members.iter().find(|slot| &slot.key() == key)
    }
}
