//! HTTP clients for the master-agreement catalog and the candidate source.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;

use staffflow_core::collaborators::{
    AgreementCatalog, AgreementTerms, Candidate, CandidateQuery, CandidateSource, UpstreamError,
};

const CATALOG_SERVICE: &str = "agreement-catalog";
const CANDIDATE_SERVICE: &str = "candidate-source";

#[derive(Clone)]
struct UpstreamClient {
    http: Client,
    base_url: String,
    token: Option<SecretString>,
    service: &'static str,
}

impl UpstreamClient {
    fn new(
        service: &'static str,
        base_url: &str,
        token: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self { http, base_url: base_url.trim_end_matches('/').to_string(), token, service })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        let builder = builder.header("Accept", "application/json");
        match &self.token {
            Some(token) => builder.bearer_auth(token.expose_secret()),
            None => builder,
        }
    }

    /// `Ok(None)` for a 404; any other non-success status is an error.
    async fn send<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
    ) -> Result<Option<T>, UpstreamError> {
        let response =
            self.authorize(builder).send().await.map_err(|error| UpstreamError::Unavailable {
                service: self.service.to_string(),
                message: error.to_string(),
            })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(UpstreamError::Status {
                service: self.service.to_string(),
                status: status.as_u16(),
            });
        }

        response.json::<T>().await.map(Some).map_err(|error| UpstreamError::Decode {
            service: self.service.to_string(),
            message: error.to_string(),
        })
    }
}

/// `GET {base}/agreements/{id}` returning [`AgreementTerms`].
#[derive(Clone)]
pub struct HttpAgreementCatalog {
    client: UpstreamClient,
}

impl HttpAgreementCatalog {
    pub fn new(
        base_url: &str,
        token: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self { client: UpstreamClient::new(CATALOG_SERVICE, base_url, token, timeout)? })
    }
}

#[async_trait]
impl AgreementCatalog for HttpAgreementCatalog {
    async fn terms(&self, agreement_id: &str) -> Result<Option<AgreementTerms>, UpstreamError> {
        let url = self.client.url(&format!("/agreements/{agreement_id}"));
        self.client.send(self.client.http.get(url)).await
    }
}

/// `POST {base}/candidates` with a [`CandidateQuery`] body.
#[derive(Clone)]
pub struct HttpCandidateSource {
    client: UpstreamClient,
}

impl HttpCandidateSource {
    pub fn new(
        base_url: &str,
        token: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self { client: UpstreamClient::new(CANDIDATE_SERVICE, base_url, token, timeout)? })
    }
}

#[async_trait]
impl CandidateSource for HttpCandidateSource {
    async fn candidates(&self, query: &CandidateQuery) -> Result<Vec<Candidate>, UpstreamError> {
        let url = self.client.url("/candidates");
        let candidates: Option<Vec<Candidate>> =
            self.client.send(self.client.http.post(url).json(query)).await?;
        Ok(candidates.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::{
        extract::Path,
        http::{HeaderMap, StatusCode},
        routing::{get, post},
        Json, Router,
    };
    use rust_decimal::Decimal;
    use staffflow_core::collaborators::{
        AgreementCatalog, AgreementCombination, AgreementTerms, Candidate, CandidateQuery,
        CandidateSource, UpstreamError,
    };

    use super::{HttpAgreementCatalog, HttpCandidateSource};

    fn combination() -> AgreementCombination {
        AgreementCombination {
            domain_id: "D-1".to_string(),
            domain_name: "Data".to_string(),
            role_id: "R-1".to_string(),
            role: "Dev".to_string(),
            level: "Senior".to_string(),
            technology_level: "Common".to_string(),
        }
    }

    async fn agreement(
        headers: HeaderMap,
        Path(id): Path<String>,
    ) -> Result<Json<AgreementTerms>, StatusCode> {
        let token = headers.get("authorization").and_then(|value| value.to_str().ok());
        if token != Some("Bearer s3cret") {
            return Err(StatusCode::UNAUTHORIZED);
        }
        match id.as_str() {
            "MA-1" => Ok(Json(AgreementTerms::new("MA-1", vec![combination()]))),
            _ => Err(StatusCode::NOT_FOUND),
        }
    }

    async fn candidates(Json(query): Json<CandidateQuery>) -> Json<Vec<Candidate>> {
        let all = vec![
            Candidate {
                provider_name: "Acme".to_string(),
                price: Decimal::new(700, 0),
                employee_profiles: Vec::new(),
            },
            Candidate {
                provider_name: "Globex".to_string(),
                price: Decimal::new(650, 0),
                employee_profiles: Vec::new(),
            },
        ];
        Json(all.into_iter().take(query.limit as usize).collect())
    }

    async fn serve() -> String {
        let app = Router::new()
            .route("/agreements/{id}", get(agreement))
            .route("/candidates", post(candidates));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let address = listener.local_addr().expect("address");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("http://{address}")
    }

    #[tokio::test]
    async fn catalog_fetches_terms_and_maps_missing_agreements() {
        let base = serve().await;
        let token = Some("s3cret".to_string().into());
        let catalog =
            HttpAgreementCatalog::new(&base, token, Duration::from_secs(5)).expect("client");

        let terms = catalog.terms("MA-1").await.expect("terms").expect("known agreement");
        assert!(terms.contains(&combination().key()));
        assert_eq!(catalog.terms("MA-404").await.expect("lookup"), None);

        let anonymous =
            HttpAgreementCatalog::new(&base, None, Duration::from_secs(5)).expect("client");
        assert_eq!(
            anonymous.terms("MA-1").await,
            Err(UpstreamError::Status { service: "agreement-catalog".to_string(), status: 401 })
        );
    }

    #[tokio::test]
    async fn candidate_source_posts_the_query() {
        let base = serve().await;
        let source = HttpCandidateSource::new(&base, None, Duration::from_secs(5)).expect("client");
        let query = CandidateQuery {
            domain_id: "D-1".to_string(),
            role: "Dev".to_string(),
            level: "Senior".to_string(),
            technology_level: "Common".to_string(),
            limit: 1,
        };

        let candidates = source.candidates(&query).await.expect("candidates");
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].provider_name, "Acme");
    }

    #[tokio::test]
    async fn unreachable_upstream_is_reported_as_unavailable() {
        let catalog = HttpAgreementCatalog::new("http://127.0.0.1:1", None, Duration::from_secs(1))
            .expect("client");
        let error = catalog.terms("MA-1").await.expect_err("nothing listens on port 1");
        assert!(matches!(error, UpstreamError::Unavailable { .. }));
    }
}
