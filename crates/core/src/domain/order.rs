use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::offer::Offer;
use crate::domain::request::ServiceRequestId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(pub String);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    Created,
    InDelivery,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "Created",
            Self::InDelivery => "InDelivery",
            Self::Completed => "Completed",
            Self::Cancelled => "Cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "created" => Some(Self::Created),
            "indelivery" | "in_delivery" => Some(Self::InDelivery),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

/// Commitment assembled from PM-approved offers. Only `status` changes after creation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub service_request_id: ServiceRequestId,
    pub project: String,
    pub total_price: Decimal,
    pub status: OrderStatus,
    pub approved_offers: Vec<Offer>,
    pub information_for_provider_manager: String,
    pub approved_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        matches!(
            (self.status, next),
            (OrderStatus::Created, OrderStatus::InDelivery)
                | (OrderStatus::InDelivery, OrderStatus::Completed)
                | (OrderStatus::Created, OrderStatus::Cancelled)
                | (OrderStatus::InDelivery, OrderStatus::Cancelled)
        )
    }

    pub fn transition_to(
        &mut self,
        next: OrderStatus,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if self.can_transition_to(next) {
            self.status = next;
            self.updated_at = now;
            return Ok(());
        }

        Err(DomainError::InvalidOrderTransition { from: self.status, to: next })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use super::{Order, OrderId, OrderStatus};
    use crate::domain::request::ServiceRequestId;
    use crate::errors::DomainError;

    fn order(status: OrderStatus) -> Order {
        let now = Utc::now();
        Order {
            id: OrderId("ORD-1".to_string()),
            service_request_id: ServiceRequestId("SR-1".to_string()),
            project: "Atlas".to_string(),
            total_price: Decimal::new(120_000, 2),
            status,
            approved_offers: Vec::new(),
            information_for_provider_manager: String::new(),
            approved_by: "pm-1".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn delivery_lifecycle_is_allowed() {
        let mut order = order(OrderStatus::Created);
        order.transition_to(OrderStatus::InDelivery, Utc::now()).expect("created -> in delivery");
        order.transition_to(OrderStatus::Completed, Utc::now()).expect("in delivery -> completed");
        assert_eq!(order.status, OrderStatus::Completed);
    }

    #[test]
    fn completed_orders_cannot_be_cancelled() {
        let mut order = order(OrderStatus::Completed);
        let error = order
            .transition_to(OrderStatus::Cancelled, Utc::now())
            .expect_err("completed -> cancelled should fail");
        assert!(matches!(error, DomainError::InvalidOrderTransition { .. }));
        assert_eq!(order.status, OrderStatus::Completed);
    }
}
