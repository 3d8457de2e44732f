use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;
use staffflow_db::{ping, DbPool};
use tracing::warn;

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Readiness {
    Ready,
    Degraded,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: Readiness,
    pub detail: String,
}

impl HealthCheck {
    fn ready(detail: impl Into<String>) -> Self {
        Self { status: Readiness::Ready, detail: detail.into() }
    }

    fn degraded(detail: impl Into<String>) -> Self {
        Self { status: Readiness::Degraded, detail: detail.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: Readiness,
    pub database: HealthCheck,
    pub schema: HealthCheck,
    pub checked_at: String,
}

pub fn router(db_pool: DbPool) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { db_pool })
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let database = match ping(&state.db_pool).await {
        Ok(()) => HealthCheck::ready("database query succeeded"),
        Err(error) => HealthCheck::degraded(format!("database query failed: {error}")),
    };
    // No schema probe against an unreachable database.
    let schema = if database.status == Readiness::Ready {
        schema_check(&state.db_pool).await
    } else {
        HealthCheck::degraded("skipped: database unavailable")
    };

    let ready = database.status == Readiness::Ready && schema.status == Readiness::Ready;
    if !ready {
        warn!(
            event_name = "system.health.degraded",
            database = %database.detail,
            schema = %schema.detail,
            "health check degraded"
        );
    }

    let payload = HealthResponse {
        status: if ready { Readiness::Ready } else { Readiness::Degraded },
        database,
        schema,
        checked_at: Utc::now().to_rfc3339(),
    };
    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn schema_check(pool: &DbPool) -> HealthCheck {
    let latest = sqlx::query_scalar::<_, Option<i64>>(
        "SELECT MAX(version) FROM _sqlx_migrations WHERE success = 1",
    )
    .fetch_one(pool)
    .await;

    match latest {
        Ok(Some(version)) => HealthCheck::ready(format!("schema at migration {version}")),
        Ok(None) => HealthCheck::degraded("no migrations applied"),
        Err(error) => HealthCheck::degraded(format!("migration table unreadable: {error}")),
    }
}

#[cfg(test)]
mod tests {
    use axum::{extract::State, http::StatusCode, Json};
    use staffflow_db::{connect_with_settings, migrations};

    use crate::health::{health, HealthState, Readiness};

    #[tokio::test]
    async fn migrated_database_reports_ready() {
        let pool =
            connect_with_settings("sqlite::memory:", 1, 5).await.expect("pool should connect");
        migrations::run_pending(&pool).await.expect("migrations");

        let (status, Json(payload)) = health(State(HealthState { db_pool: pool.clone() })).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.status, Readiness::Ready);
        assert_eq!(payload.schema.detail, "schema at migration 1");

        pool.close().await;
    }

    #[tokio::test]
    async fn unmigrated_database_is_degraded() {
        let pool =
            connect_with_settings("sqlite::memory:", 1, 5).await.expect("pool should connect");

        let (status, Json(payload)) = health(State(HealthState { db_pool: pool.clone() })).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(payload.database.status, Readiness::Ready);
        assert_eq!(payload.schema.status, Readiness::Degraded);

        pool.close().await;
    }

    #[tokio::test]
    async fn closed_pool_is_degraded() {
        let pool =
            connect_with_settings("sqlite::memory:", 1, 5).await.expect("pool should connect");
        pool.close().await;

        let (status, Json(payload)) = health(State(HealthState { db_pool: pool })).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(payload.status, Readiness::Degraded);
        assert_eq!(payload.database.status, Readiness::Degraded);
    }
}
