use std::sync::Arc;
use std::time::Duration;

use staffflow_core::config::{AppConfig, ConfigError, LoadOptions};
use staffflow_core::{AgreementCatalog, CandidateSource, WorkflowService, WorkflowSettings};
use staffflow_db::{connect_with_config, migrations, DbPool, SqlWorkflowStore};
use thiserror::Error;
use tracing::info;

use crate::upstream::{HttpAgreementCatalog, HttpCandidateSource};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub service: Arc<WorkflowService>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("`{0}` must be configured before the server can start")]
    MissingUpstream(&'static str),
    #[error("upstream client for `{service}` could not be built: {source}")]
    UpstreamClient { service: &'static str, source: reqwest::Error },
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );
    let (catalog, candidates) = upstream_clients(&config)?;

    let db_pool = connect_with_config(&config.database)
        .await
        .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let service = WorkflowService::new(
        Arc::new(SqlWorkflowStore::new(db_pool.clone())),
        catalog,
        candidates,
    )
    .with_settings(WorkflowSettings::from(&config.workflow));

    Ok(Application { config, db_pool, service: Arc::new(service) })
}

fn upstream_clients(
    config: &AppConfig,
) -> Result<(Arc<dyn AgreementCatalog>, Arc<dyn CandidateSource>), BootstrapError> {
    let upstream = &config.upstream;
    let timeout = Duration::from_secs(upstream.timeout_secs);

    let catalog_url = upstream
        .catalog_base_url
        .as_deref()
        .ok_or(BootstrapError::MissingUpstream("upstream.catalog_base_url"))?;
    let candidate_url = upstream
        .candidate_base_url
        .as_deref()
        .ok_or(BootstrapError::MissingUpstream("upstream.candidate_base_url"))?;

    let catalog = HttpAgreementCatalog::new(catalog_url, upstream.api_token.clone(), timeout)
        .map_err(|source| BootstrapError::UpstreamClient { service: "agreement catalog", source })?;
    let candidates = HttpCandidateSource::new(candidate_url, upstream.api_token.clone(), timeout)
        .map_err(|source| BootstrapError::UpstreamClient { service: "candidate source", source })?;

    Ok((Arc::new(catalog), Arc::new(candidates)))
}

#[cfg(test)]
mod tests {
    use staffflow_core::config::{ConfigOverrides, LoadOptions};
    use staffflow_core::RequestFilter;

    use crate::bootstrap::{bootstrap, BootstrapError};

    fn overrides(catalog: Option<&str>) -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:".to_string()),
                catalog_base_url: catalog.map(str::to_string),
                candidate_base_url: Some("http://127.0.0.1:9/candidates".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_without_catalog_url() {
        let error = bootstrap(overrides(None)).await.err().expect("missing catalog url");

        assert!(matches!(error, BootstrapError::MissingUpstream("upstream.catalog_base_url")));
        assert!(error.to_string().contains("upstream.catalog_base_url"));
    }

    #[tokio::test]
    async fn bootstrap_migrates_and_wires_the_service() {
        let app = bootstrap(overrides(Some("http://127.0.0.1:9/catalog")))
            .await
            .expect("bootstrap should succeed with valid overrides");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name IN ('service_request', 'offer', 'service_order')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("workflow tables should exist after bootstrap");
        assert_eq!(table_count, 3);

        let stored = app
            .service
            .store()
            .list_requests(&RequestFilter::default())
            .await
            .expect("empty store should be readable");
        assert!(stored.is_empty());

        app.db_pool.close().await;
    }
}
