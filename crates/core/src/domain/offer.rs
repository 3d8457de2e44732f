use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::request::{CycleStatus, MemberSlot, ServiceRequestId, SlotKey};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OfferId(pub String);

impl fmt::Display for OfferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OfferStatus {
    Unselected,
    Selected,
}

impl OfferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unselected => "Unselected",
            Self::Selected => "Selected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "unselected" => Some(Self::Unselected),
            "selected" => Some(Self::Selected),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeeProfile {
    #[serde(rename = "employeeID")]
    pub employee_id: String,
    #[serde(rename = "employeeName")]
    pub employee_name: String,
}

/// At most one offer per selection key may be selected.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SelectionKey {
    pub domain_id: String,
    pub role: String,
    pub level: String,
    pub cycle: CycleStatus,
}

/// Member granularity used by the PM-evaluation readiness check.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberKey {
    pub domain_id: String,
    pub role: String,
}

impl fmt::Display for MemberKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.domain_id, self.role)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Offer {
    pub id: OfferId,
    pub service_request_id: ServiceRequestId,
    pub domain_id: String,
    pub role: String,
    pub level: String,
    pub technology_level: String,
    /// `None` marks a "no providers available" placeholder.
    pub provider_name: Option<String>,
    pub price: Decimal,
    pub cycle: CycleStatus,
    pub employee_profiles: Vec<EmployeeProfile>,
    pub status: OfferStatus,
    pub created_at: DateTime<Utc>,
}

impl Offer {
    pub fn is_placeholder(&self) -> bool {
        self.provider_name.as_deref().map(str::trim).map_or(true, str::is_empty)
    }

    pub fn is_selected(&self) -> bool {
        self.status == OfferStatus::Selected
    }

    pub fn selection_key(&self) -> SelectionKey {
        SelectionKey {
            domain_id: self.domain_id.clone(),
            role: self.role.clone(),
            level: self.level.clone(),
            cycle: self.cycle,
        }
    }

    pub fn member_key(&self) -> MemberKey {
        MemberKey { domain_id: self.domain_id.clone(), role: self.role.clone() }
    }

    pub fn slot_key(&self) -> SlotKey {
        SlotKey {
            domain_id: self.domain_id.clone(),
            role: self.role.clone(),
            level: self.level.clone(),
            technology_level: self.technology_level.clone(),
        }
    }

    pub fn matches_slot(&self, slot: &MemberSlot) -> bool {
        self.slot_key() == slot.key()
    }
}
