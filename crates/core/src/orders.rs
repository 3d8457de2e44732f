use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::offer::Offer;
use crate::domain::order::{Order, OrderId, OrderStatus};
use crate::domain::request::{RequestStatus, ServiceRequest};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AssemblyError {
    #[error("service request {request_id} already has order {order_id}")]
    OrderAlreadyExists { request_id: String, order_id: String },
    #[error("an order can only be created during PM offer evaluation, request is {status}")]
    IllegalState { status: RequestStatus },
    #[error("no offer is selected")]
    NothingSelected,
}

/// Freezes the selected offers of a request into an order.
#[derive(Clone, Copy, Debug, Default)]
pub struct OrderAssembler;

impl OrderAssembler {
    /// A request yields at most one order.
    pub fn ensure_no_order(
        &self,
        request: &ServiceRequest,
        existing: Option<&Order>,
    ) -> Result<(), AssemblyError> {
        match existing {
            Some(order) => Err(AssemblyError::OrderAlreadyExists {
                request_id: request.id.to_string(),
                order_id: order.id.to_string(),
            }),
            None => Ok(()),
        }
    }

    pub fn assemble(
        &self,
        request: &ServiceRequest,
        offers: &[Offer],
        existing: Option<&Order>,
        approved_by: &str,
        now: DateTime<Utc>,
    ) -> Result<Order, AssemblyError> {
        self.ensure_no_order(request, existing)?;
        if request.status != RequestStatus::PmOfferEvaluation {
            return Err(AssemblyError::IllegalState { status: request.status });
        }

        let approved_offers: Vec<Offer> = offers
            .iter()
            .filter(|offer| offer.is_selected() && offer.service_request_id == request.id)
            .cloned()
            .collect();
        if approved_offers.is_empty() {
            return Err(AssemblyError::NothingSelected);
        }

        let total_price = approved_offers.iter().map(|offer| offer.price).sum::<Decimal>();

        Ok(Order {
            id: OrderId(Uuid::new_v4().to_string()),
            service_request_id: request.id.clone(),
            project: request.project.clone(),
            total_price,
            status: OrderStatus::Created,
            approved_offers,
            information_for_provider_manager: request.information_for_provider_manager.clone(),
            approved_by: approved_by.to_string(),
            created_at: now,
            updated_at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};
    use rust_decimal::Decimal;

    use super::{AssemblyError, OrderAssembler};
    use crate::domain::offer::{Offer, OfferId, OfferStatus};
    use crate::domain::request::{
        CycleStatus, LocationType, RequestSpec, RequestStatus, RequestType, ServiceRequest,
        ServiceRequestId,
    };

    fn request(status: RequestStatus) -> ServiceRequest {
        let spec = RequestSpec {
            agreement_id: "MA-1".to_string(),
            task_description: "Data lake".to_string(),
            project: "Atlas".to_string(),
            request_type: RequestType::Single,
            location: "Remote".to_string(),
            location_type: LocationType::Farshore,
            begin: NaiveDate::from_ymd_opt(2024, 3, 4).expect("date"),
            end: NaiveDate::from_ymd_opt(2024, 3, 8).expect("date"),
            number_of_offers: 1,
            representatives: Default::default(),
            information_for_provider_manager: "Prefer CET overlap".to_string(),
            consumer: "Ana".to_string(),
            selected_members: Vec::new(),
        };
        let id = ServiceRequestId("SR-1".to_string());
        ServiceRequest::from_spec(id, spec, "user-1", status, Utc::now())
    }

    fn offer(id: &str, role: &str, price: i64, status: OfferStatus) -> Offer {
        Offer {
            id: OfferId(id.to_string()),
            service_request_id: ServiceRequestId("SR-1".to_string()),
            domain_id: "D-1".to_string(),
            role: role.to_string(),
            level: "Mid".to_string(),
            technology_level: "Common".to_string(),
            provider_name: Some("Acme".to_string()),
            price: Decimal::new(price, 0),
            cycle: CycleStatus::FIRST,
            employee_profiles: Vec::new(),
            status,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn order_totals_the_selected_snapshot() {
        let mut offers = vec![
            offer("A", "Dev", 700, OfferStatus::Selected),
            offer("B", "Dev", 650, OfferStatus::Unselected),
            offer("C", "QA", 300, OfferStatus::Selected),
        ];

        let order = OrderAssembler
            .assemble(&request(RequestStatus::PmOfferEvaluation), &offers, None, "pm-1", Utc::now())
            .expect("assemble");
        assert_eq!(order.total_price, Decimal::new(1_000, 0));
        assert_eq!(order.approved_offers.len(), 2);
        assert_eq!(order.information_for_provider_manager, "Prefer CET overlap");

        offers[0].price = Decimal::new(1, 0);
        offers[0].status = OfferStatus::Unselected;
        assert_eq!(order.approved_offers[0].price, Decimal::new(700, 0));
        assert_eq!(order.approved_offers[0].status, OfferStatus::Selected);
    }

    #[test]
    fn second_assembly_is_refused() {
        let offers = vec![offer("A", "Dev", 700, OfferStatus::Selected)];
        let request = request(RequestStatus::PmOfferEvaluation);
        let first = OrderAssembler
            .assemble(&request, &offers, None, "pm-1", Utc::now())
            .expect("first order");

        let error = OrderAssembler
            .assemble(&request, &offers, Some(&first), "pm-1", Utc::now())
            .expect_err("duplicate order");
        assert!(matches!(error, AssemblyError::OrderAlreadyExists { .. }));
    }

    #[test]
    fn preconditions_are_enforced() {
        let selected = vec![offer("A", "Dev", 700, OfferStatus::Selected)];
        let approved = request(RequestStatus::Approved);
        assert_eq!(
            OrderAssembler.assemble(&approved, &selected, None, "pm-1", Utc::now()),
            Err(AssemblyError::IllegalState { status: RequestStatus::Approved })
        );

        let unselected = vec![offer("A", "Dev", 700, OfferStatus::Unselected)];
        assert_eq!(
            OrderAssembler.assemble(
                &request(RequestStatus::PmOfferEvaluation),
                &unselected,
                None,
                "pm-1",
                Utc::now()
            ),
            Err(AssemblyError::NothingSelected)
        );
    }
}
