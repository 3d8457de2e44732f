use std::collections::HashMap;

use tokio::sync::RwLock;

use staffflow_core::domain::offer::{Offer, OfferId};
use staffflow_core::domain::order::{Order, OrderId};
use staffflow_core::domain::request::{ServiceRequest, ServiceRequestId};
use staffflow_core::store::{RequestFilter, StoreError, WorkflowCommit, WorkflowStore};

#[derive(Default)]
struct Tables {
    requests: HashMap<ServiceRequestId, ServiceRequest>,
    offers: Vec<Offer>,
    orders: Vec<Order>,
}

/// Keeps every table behind one lock so a commit is observed whole or not at all.
#[derive(Default)]
pub struct InMemoryWorkflowStore {
    tables: RwLock<Tables>,
}

#[async_trait::async_trait]
impl WorkflowStore for InMemoryWorkflowStore {
    async fn find_request(
        &self,
        id: &ServiceRequestId,
    ) -> Result<Option<ServiceRequest>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.requests.get(id).cloned())
    }

    async fn list_requests(
        &self,
        filter: &RequestFilter,
    ) -> Result<Vec<ServiceRequest>, StoreError> {
        let tables = self.tables.read().await;
        let mut requests: Vec<ServiceRequest> =
            tables.requests.values().filter(|request| filter.matches(request)).cloned().collect();
        requests.sort_by(|left, right| {
            left.created_at.cmp(&right.created_at).then_with(|| left.id.0.cmp(&right.id.0))
        });
        Ok(requests)
    }

    async fn offers_for_request(&self, id: &ServiceRequestId) -> Result<Vec<Offer>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.offers.iter().filter(|offer| &offer.service_request_id == id).cloned().collect())
    }

    async fn find_offer(&self, id: &OfferId) -> Result<Option<Offer>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.offers.iter().find(|offer| &offer.id == id).cloned())
    }

    async fn find_order(&self, id: &OrderId) -> Result<Option<Order>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.orders.iter().find(|order| &order.id == id).cloned())
    }

    async fn order_for_request(&self, id: &ServiceRequestId) -> Result<Option<Order>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.orders.iter().find(|order| &order.service_request_id == id).cloned())
    }

    async fn list_orders(&self) -> Result<Vec<Order>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.orders.clone())
    }

    async fn commit(&self, commit: WorkflowCommit) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;

        let actual = tables.requests.get(&commit.request.id).map(|request| request.version);
        if actual != commit.expected_version {
            return Err(StoreError::VersionConflict {
                request_id: commit.request.id.to_string(),
                expected: commit.expected_version,
                actual,
            });
        }
        if let Some(order) = &commit.order {
            let duplicate = tables.orders.iter().any(|existing| {
                existing.service_request_id == order.service_request_id && existing.id != order.id
            });
            if duplicate {
                return Err(StoreError::Backend(format!(
                    "service request {} already has an order",
                    order.service_request_id
                )));
            }
        }

        for offer in commit.offers {
            match tables.offers.iter_mut().find(|existing| existing.id == offer.id) {
                Some(existing) => *existing = offer,
                None => tables.offers.push(offer),
            }
        }
        if let Some(order) = commit.order {
            match tables.orders.iter_mut().find(|existing| existing.id == order.id) {
                Some(existing) => *existing = order,
                None => tables.orders.push(order),
            }
        }
        tables.requests.insert(commit.request.id.clone(), commit.request);
        Ok(())
    }
}
