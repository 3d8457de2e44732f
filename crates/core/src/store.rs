use async_trait::async_trait;
use thiserror::Error;

use crate::domain::offer::{Offer, OfferId};
use crate::domain::order::{Order, OrderId};
use crate::domain::request::{RequestStatus, ServiceRequest, ServiceRequestId};
use crate::errors::ApplicationError;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequestFilter {
    pub requested_by: Option<String>,
    pub status: Option<RequestStatus>,
    pub provider_manager_id: Option<String>,
}

impl RequestFilter {
    pub fn matches(&self, request: &ServiceRequest) -> bool {
        self.requested_by.as_ref().map_or(true, |owner| &request.requested_by == owner)
            && self.status.map_or(true, |status| request.status == status)
            && self
                .provider_manager_id
                .as_ref()
                .map_or(true, |pm| request.provider_manager_id.as_ref() == Some(pm))
    }
}

/// One all-or-nothing write over a request aggregate.
///
/// `expected_version` is the version the caller read; `None` creates the request.
/// `request.version` must already hold the new version.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkflowCommit {
    pub request: ServiceRequest,
    pub expected_version: Option<u64>,
    pub offers: Vec<Offer>,
    pub order: Option<Order>,
}

impl WorkflowCommit {
    pub fn create(request: ServiceRequest) -> Self {
        Self { request, expected_version: None, offers: Vec::new(), order: None }
    }

    pub fn update(request: ServiceRequest, expected_version: u64) -> Self {
        Self { request, expected_version: Some(expected_version), offers: Vec::new(), order: None }
    }

    pub fn with_offers(mut self, offers: Vec<Offer>) -> Self {
        self.offers = offers;
        self
    }

    pub fn with_order(mut self, order: Order) -> Self {
        self.order = Some(order);
        self
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("service request {request_id} is at version {actual:?}, expected {expected:?}")]
    VersionConflict { request_id: String, expected: Option<u64>, actual: Option<u64> },
    #[error("store backend failure: {0}")]
    Backend(String),
}

impl From<StoreError> for ApplicationError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::VersionConflict { request_id, .. } => Self::Conflict { request_id },
            StoreError::Backend(message) => Self::Persistence(message),
        }
    }
}

#[async_trait]
pub trait WorkflowStore: Send + Sync {
    async fn find_request(
        &self,
        id: &ServiceRequestId,
    ) -> Result<Option<ServiceRequest>, StoreError>;
    async fn list_requests(&self, filter: &RequestFilter)
        -> Result<Vec<ServiceRequest>, StoreError>;
    async fn offers_for_request(&self, id: &ServiceRequestId) -> Result<Vec<Offer>, StoreError>;
    async fn find_offer(&self, id: &OfferId) -> Result<Option<Offer>, StoreError>;
    async fn find_order(&self, id: &OrderId) -> Result<Option<Order>, StoreError>;
    async fn order_for_request(&self, id: &ServiceRequestId) -> Result<Option<Order>, StoreError>;
    async fn list_orders(&self) -> Result<Vec<Order>, StoreError>;
    async fn commit(&self, commit: WorkflowCommit) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};

    use super::{RequestFilter, StoreError};
    use crate::domain::request::{
        LocationType, RequestSpec, RequestStatus, RequestType, ServiceRequest, ServiceRequestId,
    };
    use crate::errors::{ApplicationError, ErrorKind};

    fn request() -> ServiceRequest {
        let spec = RequestSpec {
            agreement_id: "MA-1".to_string(),
            task_description: "Audit".to_string(),
            project: "Atlas".to_string(),
            request_type: RequestType::Single,
            location: "Remote".to_string(),
            location_type: LocationType::Onshore,
            begin: NaiveDate::from_ymd_opt(2024, 1, 1).expect("date"),
            end: NaiveDate::from_ymd_opt(2024, 1, 2).expect("date"),
            number_of_offers: 1,
            representatives: Default::default(),
            information_for_provider_manager: String::new(),
            consumer: "Ana".to_string(),
            selected_members: Vec::new(),
        };
        let mut request = ServiceRequest::from_spec(
            ServiceRequestId("SR-1".to_string()),
            spec,
            "user-1",
            RequestStatus::Assigned,
            Utc::now(),
        );
        request.provider_manager_id = Some("pm-1".to_string());
        request
    }

    #[test]
    fn filter_fields_are_conjunctive() {
        let request = request();
        assert!(RequestFilter::default().matches(&request));
        assert!(RequestFilter {
            requested_by: Some("user-1".to_string()),
            status: Some(RequestStatus::Assigned),
            provider_manager_id: Some("pm-1".to_string()),
        }
        .matches(&request));
        assert!(!RequestFilter { status: Some(RequestStatus::Draft), ..RequestFilter::default() }
            .matches(&request));
        assert!(!RequestFilter {
            provider_manager_id: Some("pm-2".to_string()),
            ..RequestFilter::default()
        }
        .matches(&request));
    }

    #[test]
    fn version_conflict_becomes_conflict() {
        let error = ApplicationError::from(StoreError::VersionConflict {
            request_id: "SR-1".to_string(),
            expected: Some(2),
            actual: Some(3),
        });
        assert_eq!(error.kind(), ErrorKind::Conflict);
    }
}
