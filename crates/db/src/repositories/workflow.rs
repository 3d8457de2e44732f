use sqlx::{sqlite::SqliteRow, Row, Sqlite, Transaction};

use staffflow_core::domain::offer::{Offer, OfferId};
use staffflow_core::domain::order::{Order, OrderId};
use staffflow_core::domain::request::{ServiceRequest, ServiceRequestId};
use staffflow_core::store::{RequestFilter, StoreError, WorkflowCommit, WorkflowStore};

use super::RepositoryError;
use crate::DbPool;

/// Rows keep the full aggregate in `payload_json`; the plain columns exist for filtering
/// and for the optimistic version check.
pub struct SqlWorkflowStore {
    pool: DbPool,
}

impl SqlWorkflowStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn load_request(
        &self,
        id: &ServiceRequestId,
    ) -> Result<Option<ServiceRequest>, RepositoryError> {
        let row = sqlx::query("SELECT payload_json FROM service_request WHERE id = ?")
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| decode::<ServiceRequest>(&row)).transpose()
    }

    async fn load_requests(
        &self,
        filter: &RequestFilter,
    ) -> Result<Vec<ServiceRequest>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT payload_json
             FROM service_request
             WHERE (?1 IS NULL OR requested_by = ?1)
               AND (?2 IS NULL OR status = ?2)
               AND (?3 IS NULL OR provider_manager_id = ?3)
             ORDER BY created_at ASC, id ASC",
        )
        .bind(filter.requested_by.as_deref())
        .bind(filter.status.map(|status| status.as_str()))
        .bind(filter.provider_manager_id.as_deref())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(decode::<ServiceRequest>).collect()
    }

    async fn load_offers(&self, id: &ServiceRequestId) -> Result<Vec<Offer>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT payload_json
             FROM offer
             WHERE service_request_id = ?
             ORDER BY cycle ASC, created_at ASC, rowid ASC",
        )
        .bind(&id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(decode::<Offer>).collect()
    }

    async fn load_offer(&self, id: &OfferId) -> Result<Option<Offer>, RepositoryError> {
        let row = sqlx::query("SELECT payload_json FROM offer WHERE id = ?")
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| decode::<Offer>(&row)).transpose()
    }

    async fn load_order(
        &self,
        sql: &'static str,
        id: &str,
    ) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query(sql).bind(id).fetch_optional(&self.pool).await?;

        row.map(|row| decode::<Order>(&row)).transpose()
    }

    async fn load_orders(&self) -> Result<Vec<Order>, RepositoryError> {
        let rows =
            sqlx::query("SELECT payload_json FROM service_order ORDER BY created_at ASC, id ASC")
                .fetch_all(&self.pool)
                .await?;

        rows.iter().map(decode::<Order>).collect()
    }

    async fn write(&self, commit: WorkflowCommit) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let request = &commit.request;
        let payload = serde_json::to_string(request)?;
        let version = to_i64("version", request.version)?;

        let written = match commit.expected_version {
            None => {
                sqlx::query(
                    "INSERT INTO service_request (
                        id,
                        requested_by,
                        provider_manager_id,
                        status,
                        cycle_status,
                        version,
                        payload_json,
                        created_at,
                        updated_at
                     ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                     ON CONFLICT(id) DO NOTHING",
                )
                .bind(&request.id.0)
                .bind(&request.requested_by)
                .bind(request.provider_manager_id.as_deref())
                .bind(request.status.as_str())
                .bind(request.cycle_status.to_string())
                .bind(version)
                .bind(&payload)
                .bind(request.created_at.to_rfc3339())
                .bind(request.updated_at.to_rfc3339())
                .execute(&mut *tx)
                .await?
                .rows_affected()
            }
            Some(expected) => {
                sqlx::query(
                    "UPDATE service_request SET
                        provider_manager_id = ?,
                        status = ?,
                        cycle_status = ?,
                        version = ?,
                        payload_json = ?,
                        updated_at = ?
                     WHERE id = ? AND version = ?",
                )
                .bind(request.provider_manager_id.as_deref())
                .bind(request.status.as_str())
                .bind(request.cycle_status.to_string())
                .bind(version)
                .bind(&payload)
                .bind(request.updated_at.to_rfc3339())
                .bind(&request.id.0)
                .bind(to_i64("expected_version", expected)?)
                .execute(&mut *tx)
                .await?
                .rows_affected()
            }
        };

        if written == 0 {
            let actual = current_version(&mut tx, &request.id).await?;
            return Err(RepositoryError::VersionConflict {
                request_id: request.id.to_string(),
                expected: commit.expected_version,
                actual,
            });
        }

        for offer in &commit.offers {
            sqlx::query(
                "INSERT INTO offer (
                    id,
                    service_request_id,
                    cycle,
                    status,
                    payload_json,
                    created_at
                 ) VALUES (?, ?, ?, ?, ?, ?)
                 ON CONFLICT(id) DO UPDATE SET
                    status = excluded.status,
                    payload_json = excluded.payload_json",
            )
            .bind(&offer.id.0)
            .bind(&offer.service_request_id.0)
            .bind(offer.cycle.to_string())
            .bind(offer.status.as_str())
            .bind(serde_json::to_string(offer)?)
            .bind(offer.created_at.to_rfc3339())
            .execute(&mut *tx)
            .await?;
        }

        if let Some(order) = &commit.order {
            sqlx::query(
                "INSERT INTO service_order (
                    id,
                    service_request_id,
                    status,
                    total_price,
                    payload_json,
                    created_at,
                    updated_at
                 ) VALUES (?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(id) DO UPDATE SET
                    status = excluded.status,
                    payload_json = excluded.payload_json,
                    updated_at = excluded.updated_at",
            )
            .bind(&order.id.0)
            .bind(&order.service_request_id.0)
            .bind(order.status.as_str())
            .bind(order.total_price.to_string())
            .bind(serde_json::to_string(order)?)
            .bind(order.created_at.to_rfc3339())
            .bind(order.updated_at.to_rfc3339())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl WorkflowStore for SqlWorkflowStore {
    async fn find_request(
        &self,
        id: &ServiceRequestId,
    ) -> Result<Option<ServiceRequest>, StoreError> {
        Ok(self.load_request(id).await?)
    }

    async fn list_requests(
        &self,
        filter: &RequestFilter,
    ) -> Result<Vec<ServiceRequest>, StoreError> {
        Ok(self.load_requests(filter).await?)
    }

    async fn offers_for_request(&self, id: &ServiceRequestId) -> Result<Vec<Offer>, StoreError> {
        Ok(self.load_offers(id).await?)
    }

    async fn find_offer(&self, id: &OfferId) -> Result<Option<Offer>, StoreError> {
        Ok(self.load_offer(id).await?)
    }

    async fn find_order(&self, id: &OrderId) -> Result<Option<Order>, StoreError> {
        Ok(self.load_order("SELECT payload_json FROM service_order WHERE id = ?", &id.0).await?)
    }

    async fn order_for_request(&self, id: &ServiceRequestId) -> Result<Option<Order>, StoreError> {
        let sql = "SELECT payload_json FROM service_order WHERE service_request_id = ?";
        Ok(self.load_order(sql, &id.0).await?)
    }

    async fn list_orders(&self) -> Result<Vec<Order>, StoreError> {
        Ok(self.load_orders().await?)
    }

    async fn commit(&self, commit: WorkflowCommit) -> Result<(), StoreError> {
        Ok(self.write(commit).await?)
    }
}

async fn current_version(
    tx: &mut Transaction<'_, Sqlite>,
    id: &ServiceRequestId,
) -> Result<Option<u64>, RepositoryError> {
    let row = sqlx::query("SELECT version FROM service_request WHERE id = ?")
        .bind(&id.0)
        .fetch_optional(&mut **tx)
        .await?;

    row.map(|row| {
        let value = row.try_get::<i64, _>("version")?;
        u64::try_from(value).map_err(|_| {
            RepositoryError::Decode(format!(
                "invalid value for `version` (expected non-negative): {value}"
            ))
        })
    })
    .transpose()
}

fn decode<T>(row: &SqliteRow) -> Result<T, RepositoryError>
where
    T: serde::de::DeserializeOwned,
{
    let payload = row.try_get::<String, _>("payload_json")?;
    serde_json::from_str(&payload)
        .map_err(|error| RepositoryError::Decode(format!("invalid payload_json: {error}")))
}

fn to_i64(column: &str, value: u64) -> Result<i64, RepositoryError> {
    i64::try_from(value).map_err(|_| {
        RepositoryError::Decode(format!("value for `{column}` does not fit in i64: {value}"))
    })
}
