//! JSON API over the workflow service.
//!
//! Caller identity comes from the gateway headers `x-actor-id` and `x-actor-role`
//! (`user`, `pm`, `admin`); `x-correlation-id` is optional and generated when absent.

use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, Path, Query, State},
    http::{request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use staffflow_core::{
    Actor, ActorRole, ApplicationError, CallContext, ErrorKind, GenerationReport, Offer, OfferId,
    Order, OrderId, OrderStatus, Readiness, RequestFilter, RequestSpec, RequestStatus,
    ServiceRequest, ServiceRequestId, SpecViolation, WorkflowService,
};
use staffflow_core::offers::SelectionChange;

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

#[derive(Clone)]
pub struct ApiState {
    service: Arc<WorkflowService>,
}

pub fn router(service: Arc<WorkflowService>) -> Router {
    Router::new()
        .route("/service-requests", post(create_request).get(list_requests))
        .route("/service-requests/{id}", get(get_request).patch(update_draft))
        .route("/service-requests/{id}/submit", patch(submit))
        .route("/service-requests/{id}/resubmit", patch(resubmit))
        .route("/service-requests/{id}/assign", patch(assign))
        .route("/service-requests/{id}/approve", patch(approve))
        .route("/service-requests/{id}/reject", patch(reject))
        .route("/service-requests/{id}/cycle", patch(advance_cycle))
        .route("/service-requests/{id}/order", get(order_for_request))
        .route("/offers/generate", post(generate_offers))
        .route("/offers/select", post(select_offer))
        .route("/offers/{request_id}", get(list_offers))
        .route("/offers/{request_id}/selected", get(selected_offers))
        .route("/offers/{request_id}/readiness", get(readiness))
        .route("/offers/{request_id}/send-for-pm-evaluation", patch(send_for_pm_evaluation))
        .route("/offers/{request_id}/re-evaluation", patch(request_re_evaluation))
        .route("/offers/{request_id}/resend-for-pm-evaluation", patch(resend_for_pm_evaluation))
        .route("/orders", get(list_orders))
        // POST takes the service request id, GET and PATCH the order id.
        .route("/orders/{id}", get(get_order).post(create_order))
        .route("/orders/{id}/status", patch(update_order_status))
        .with_state(ApiState { service })
}

// ---------------------------------------------------------------------------
// Caller identity
// ---------------------------------------------------------------------------

/// Identity and correlation id of the current HTTP caller.
pub struct Caller(pub CallContext);

impl Caller {
    fn fail(&self) -> impl Fn(ApplicationError) -> ApiError + '_ {
        move |error| ApiError::from_application(error, &self.0.correlation_id)
    }
}

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        caller_from_headers(&parts.headers).map(Caller)
    }
}

fn caller_from_headers(headers: &HeaderMap) -> Result<CallContext, ApiError> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
    };
    let correlation_id =
        header(CORRELATION_ID_HEADER).map_or_else(|| Uuid::new_v4().to_string(), str::to_string);

    let Some(actor_id) = header(ACTOR_ID_HEADER) else {
        let message = format!("missing `{ACTOR_ID_HEADER}` header");
        return Err(ApiError::unauthenticated(message, correlation_id));
    };
    let role = match header(ACTOR_ROLE_HEADER).map(ActorRole::parse) {
        Some(Some(role)) => role,
        Some(None) => {
            return Err(ApiError::unauthenticated(
                format!("`{ACTOR_ROLE_HEADER}` must be one of user, pm, admin"),
                correlation_id,
            ))
        }
        None => {
            return Err(ApiError::unauthenticated(
                format!("missing `{ACTOR_ROLE_HEADER}` header"),
                correlation_id,
            ))
        }
    };

    Ok(CallContext::with_correlation_id(Actor::new(actor_id, role), correlation_id))
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
    pub user_message: String,
    pub correlation_id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<SpecViolation>,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    pub fn from_application(error: ApplicationError, correlation_id: &str) -> Self {
        let violations = error.violations().to_vec();
        let kind = error.kind();
        if kind == ErrorKind::Internal {
            tracing::error!(
                event_name = "api.request.failed",
                correlation_id = %correlation_id,
                error = %error,
                "request failed with an internal error"
            );
        }

        let interface = error.into_interface(correlation_id);
        Self {
            status: status_for(kind),
            body: ErrorBody {
                error: kind.as_str().to_string(),
                message: interface.message().to_string(),
                user_message: interface.user_message().to_string(),
                correlation_id: interface.correlation_id().to_string(),
                violations,
            },
        }
    }

    fn unauthenticated(message: String, correlation_id: String) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            body: ErrorBody {
                error: "unauthenticated".to_string(),
                message,
                user_message: "Sign in again and retry.".to_string(),
                correlation_id,
                violations: Vec::new(),
            },
        }
    }

    fn invalid_query(message: String, correlation_id: &str) -> Self {
        Self {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            body: ErrorBody {
                error: ErrorKind::Validation.as_str().to_string(),
                message,
                user_message: "The request could not be processed. Check inputs and try again."
                    .to_string(),
                correlation_id: correlation_id.to_string(),
                violations: Vec::new(),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_client_error() {
            warn!(
                event_name = "api.request.rejected",
                correlation_id = %self.body.correlation_id,
                error = %self.body.error,
                status = self.status.as_u16(),
                message = %self.body.message,
                "request rejected"
            );
        }
        (self.status, Json(self.body)).into_response()
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::IllegalTransition | ErrorKind::IllegalState | ErrorKind::Conflict => {
            StatusCode::CONFLICT
        }
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        ErrorKind::UpstreamUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CreateRequestBody {
    #[serde(flatten)]
    pub spec: RequestSpec,
    #[serde(default)]
    pub submit: bool,
}

#[derive(Debug, Deserialize)]
pub struct CommentBody {
    pub comment: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct OptionalCommentBody {
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ResubmitBody {
    pub comment: String,
    /// Corrected fields; the stored ones are kept when absent.
    #[serde(default)]
    pub request: Option<RequestSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateOffersBody {
    pub service_request_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectOfferBody {
    pub offer_id: String,
}

#[derive(Debug, Deserialize)]
pub struct OrderStatusBody {
    pub status: OrderStatus,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListRequestsQuery {
    pub owner: Option<String>,
    pub status: Option<String>,
    pub provider_manager: Option<String>,
}

// ---------------------------------------------------------------------------
// Service request handlers
// ---------------------------------------------------------------------------

async fn create_request(
    State(state): State<ApiState>,
    caller: Caller,
    Json(body): Json<CreateRequestBody>,
) -> Result<(StatusCode, Json<ServiceRequest>), ApiError> {
    let request = state
        .service
        .create_request(&caller.0, body.spec, body.submit)
        .await
        .map_err(caller.fail())?;
    Ok((StatusCode::CREATED, Json(request)))
}

async fn list_requests(
    State(state): State<ApiState>,
    caller: Caller,
    Query(query): Query<ListRequestsQuery>,
) -> Result<Json<Vec<ServiceRequest>>, ApiError> {
    let status = match query.status.as_deref() {
        Some(raw) => Some(RequestStatus::parse(raw).ok_or_else(|| {
            ApiError::invalid_query(format!("unknown status `{raw}`"), &caller.0.correlation_id)
        })?),
        None => None,
    };
    let filter = RequestFilter {
        requested_by: query.owner,
        status,
        provider_manager_id: query.provider_manager,
    };

    let requests = state.service.list_requests(&caller.0, filter).await.map_err(caller.fail())?;
    Ok(Json(requests))
}

async fn get_request(
    State(state): State<ApiState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<ServiceRequest>, ApiError> {
    let request =
        state.service.get_request(&caller.0, &ServiceRequestId(id)).await.map_err(caller.fail())?;
    Ok(Json(request))
}

async fn update_draft(
    State(state): State<ApiState>,
    caller: Caller,
    Path(id): Path<String>,
    Json(spec): Json<RequestSpec>,
) -> Result<Json<ServiceRequest>, ApiError> {
    let request = state
        .service
        .update_draft(&caller.0, &ServiceRequestId(id), spec)
        .await
        .map_err(caller.fail())?;
    Ok(Json(request))
}

async fn submit(
    State(state): State<ApiState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<ServiceRequest>, ApiError> {
    let request =
        state.service.submit(&caller.0, &ServiceRequestId(id)).await.map_err(caller.fail())?;
    Ok(Json(request))
}

async fn resubmit(
    State(state): State<ApiState>,
    caller: Caller,
    Path(id): Path<String>,
    Json(body): Json<ResubmitBody>,
) -> Result<Json<ServiceRequest>, ApiError> {
    let request = state
        .service
        .resubmit(&caller.0, &ServiceRequestId(id), body.request, body.comment)
        .await
        .map_err(caller.fail())?;
    Ok(Json(request))
}

async fn assign(
    State(state): State<ApiState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<ServiceRequest>, ApiError> {
    let request =
        state.service.assign(&caller.0, &ServiceRequestId(id)).await.map_err(caller.fail())?;
    Ok(Json(request))
}

async fn approve(
    State(state): State<ApiState>,
    caller: Caller,
    Path(id): Path<String>,
    Json(body): Json<CommentBody>,
) -> Result<Json<ServiceRequest>, ApiError> {
    let request = state
        .service
        .approve(&caller.0, &ServiceRequestId(id), body.comment)
        .await
        .map_err(caller.fail())?;
    Ok(Json(request))
}

async fn reject(
    State(state): State<ApiState>,
    caller: Caller,
    Path(id): Path<String>,
    Json(body): Json<CommentBody>,
) -> Result<Json<ServiceRequest>, ApiError> {
    let request = state
        .service
        .reject(&caller.0, &ServiceRequestId(id), body.comment)
        .await
        .map_err(caller.fail())?;
    Ok(Json(request))
}

async fn advance_cycle(
    State(state): State<ApiState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<ServiceRequest>, ApiError> {
    let request =
        state.service.advance_cycle(&caller.0, &ServiceRequestId(id)).await.map_err(caller.fail())?;
    Ok(Json(request))
}

async fn order_for_request(
    State(state): State<ApiState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    let order = state
        .service
        .order_for_request(&caller.0, &ServiceRequestId(id))
        .await
        .map_err(caller.fail())?;
    Ok(Json(order))
}

// ---------------------------------------------------------------------------
// Offer handlers
// ---------------------------------------------------------------------------

async fn generate_offers(
    State(state): State<ApiState>,
    caller: Caller,
    Json(body): Json<GenerateOffersBody>,
) -> Result<(StatusCode, Json<GenerationReport>), ApiError> {
    let report = state
        .service
        .generate_offers(&caller.0, &ServiceRequestId(body.service_request_id))
        .await
        .map_err(caller.fail())?;
    Ok((StatusCode::CREATED, Json(report)))
}

async fn select_offer(
    State(state): State<ApiState>,
    caller: Caller,
    Json(body): Json<SelectOfferBody>,
) -> Result<Json<SelectionChange>, ApiError> {
    let change = state
        .service
        .select_offer(&caller.0, &OfferId(body.offer_id))
        .await
        .map_err(caller.fail())?;
    Ok(Json(change))
}

async fn list_offers(
    State(state): State<ApiState>,
    caller: Caller,
    Path(request_id): Path<String>,
) -> Result<Json<Vec<Offer>>, ApiError> {
    let offers = state
        .service
        .offers(&caller.0, &ServiceRequestId(request_id))
        .await
        .map_err(caller.fail())?;
    Ok(Json(offers))
}

async fn selected_offers(
    State(state): State<ApiState>,
    caller: Caller,
    Path(request_id): Path<String>,
) -> Result<Json<Vec<Offer>>, ApiError> {
    let offers = state
        .service
        .selected_offers(&caller.0, &ServiceRequestId(request_id))
        .await
        .map_err(caller.fail())?;
    Ok(Json(offers))
}

async fn readiness(
    State(state): State<ApiState>,
    caller: Caller,
    Path(request_id): Path<String>,
) -> Result<Json<Readiness>, ApiError> {
    let readiness = state
        .service
        .readiness(&caller.0, &ServiceRequestId(request_id))
        .await
        .map_err(caller.fail())?;
    Ok(Json(readiness))
}

async fn send_for_pm_evaluation(
    State(state): State<ApiState>,
    caller: Caller,
    Path(request_id): Path<String>,
    Json(body): Json<CommentBody>,
) -> Result<Json<ServiceRequest>, ApiError> {
    let request = state
        .service
        .send_for_pm_evaluation(&caller.0, &ServiceRequestId(request_id), body.comment)
        .await
        .map_err(caller.fail())?;
    Ok(Json(request))
}

async fn request_re_evaluation(
    State(state): State<ApiState>,
    caller: Caller,
    Path(request_id): Path<String>,
    Json(body): Json<CommentBody>,
) -> Result<Json<ServiceRequest>, ApiError> {
    let request = state
        .service
        .request_re_evaluation(&caller.0, &ServiceRequestId(request_id), body.comment)
        .await
        .map_err(caller.fail())?;
    Ok(Json(request))
}

async fn resend_for_pm_evaluation(
    State(state): State<ApiState>,
    caller: Caller,
    Path(request_id): Path<String>,
    Json(body): Json<OptionalCommentBody>,
) -> Result<Json<ServiceRequest>, ApiError> {
    let request = state
        .service
        .resend_for_pm_evaluation(&caller.0, &ServiceRequestId(request_id), body.comment)
        .await
        .map_err(caller.fail())?;
    Ok(Json(request))
}

// ---------------------------------------------------------------------------
// Order handlers
// ---------------------------------------------------------------------------

async fn create_order(
    State(state): State<ApiState>,
    caller: Caller,
    Path(request_id): Path<String>,
    Json(body): Json<OptionalCommentBody>,
) -> Result<(StatusCode, Json<Order>), ApiError> {
    let order = state
        .service
        .approve_and_create_order(&caller.0, &ServiceRequestId(request_id), body.comment)
        .await
        .map_err(caller.fail())?;
    Ok((StatusCode::CREATED, Json(order)))
}

async fn list_orders(
    State(state): State<ApiState>,
    caller: Caller,
) -> Result<Json<Vec<Order>>, ApiError> {
    let orders = state.service.list_orders(&caller.0).await.map_err(caller.fail())?;
    Ok(Json(orders))
}

async fn get_order(
    State(state): State<ApiState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    let order = state.service.get_order(&caller.0, &OrderId(id)).await.map_err(caller.fail())?;
    Ok(Json(order))
}

async fn update_order_status(
    State(state): State<ApiState>,
    caller: Caller,
    Path(id): Path<String>,
    Json(body): Json<OrderStatusBody>,
) -> Result<Json<Order>, ApiError> {
    let order = state
        .service
        .update_order_status(&caller.0, &OrderId(id), body.status)
        .await
        .map_err(caller.fail())?;
    Ok(Json(order))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
        Router,
    };
    use rust_decimal::Decimal;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use staffflow_core::{
        AgreementCombination, AgreementTerms, Candidate, ErrorKind, MemberSlot,
        StaticAgreementCatalog, StaticCandidateSource, WorkflowService,
    };
    use staffflow_db::InMemoryWorkflowStore;

    use super::{router, status_for, ErrorBody};

    fn slot() -> MemberSlot {
        MemberSlot {
            domain_id: "D-1".to_string(),
            domain_name: "Data".to_string(),
            role_id: "R-1".to_string(),
            role: "Dev".to_string(),
            level: "Senior".to_string(),
            technology_level: "Common".to_string(),
            number_of_profiles_needed: 1,
        }
    }

    fn app() -> Router {
        let terms = AgreementTerms::new("MA-1", vec![AgreementCombination::from_slot(&slot())]);
        let catalog = StaticAgreementCatalog::default().with_terms(terms);
        let candidates = StaticCandidateSource::default().with_candidates(
            slot().key(),
            vec![Candidate {
                provider_name: "Acme".to_string(),
                price: Decimal::new(800, 0),
                employee_profiles: Vec::new(),
            }],
        );
        router(Arc::new(WorkflowService::new(
            Arc::new(InMemoryWorkflowStore::default()),
            Arc::new(catalog),
            Arc::new(candidates),
        )))
    }

    fn request_body(submit: bool) -> Value {
        json!({
            "agreementId": "MA-1",
            "taskDescription": "Tune the warehouse",
            "project": "Atlas",
            "type": "Single",
            "location": "Remote",
            "locationType": "Onshore",
            "begin": "2024-03-04",
            "end": "2024-03-08",
            "numberOfOffers": 1,
            "consumer": "Ana",
            "selectedMembers": [{
                "domainId": "D-1",
                "domainName": "Data",
                "roleId": "R-1",
                "role": "Dev",
                "level": "Senior",
                "technologyLevel": "Common",
                "numberOfProfilesNeeded": 1
            }],
            "submit": submit
        })
    }

    async fn call(
        app: &Router,
        method: &str,
        uri: &str,
        actor: Option<(&str, &str)>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some((id, role)) = actor {
            builder = builder.header("x-actor-id", id).header("x-actor-role", role);
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .expect("request"),
            None => builder.body(Body::empty()).expect("request"),
        };

        let response = app.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("json")
        };
        (status, value)
    }

    #[test]
    fn error_kinds_map_to_http_statuses() {
        assert_eq!(status_for(ErrorKind::Validation), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(status_for(ErrorKind::IllegalTransition), StatusCode::CONFLICT);
        assert_eq!(status_for(ErrorKind::IllegalState), StatusCode::CONFLICT);
        assert_eq!(status_for(ErrorKind::Conflict), StatusCode::CONFLICT);
        assert_eq!(status_for(ErrorKind::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(status_for(ErrorKind::Forbidden), StatusCode::FORBIDDEN);
        assert_eq!(status_for(ErrorKind::UpstreamUnavailable), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(status_for(ErrorKind::Internal), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn requests_without_identity_are_rejected() {
        let app = app();
        let (status, body) = call(&app, "GET", "/service-requests", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "unauthenticated");

        let (status, _) =
            call(&app, "GET", "/service-requests", Some(("ana", "superuser")), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn lifecycle_over_http() {
        let app = app();
        let user = Some(("ana", "user"));
        let pm = Some(("pm-1", "pm"));

        let (status, created) =
            call(&app, "POST", "/service-requests", user, Some(request_body(true))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["status"], "Submitted");
        assert_eq!(created["amountOfManDays"], 5);
        let id = created["id"].as_str().expect("id").to_string();

        let (status, _) =
            call(&app, "PATCH", &format!("/service-requests/{id}/assign"), pm, None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, approved) = call(
            &app,
            "PATCH",
            &format!("/service-requests/{id}/approve"),
            pm,
            Some(json!({ "comment": "ok" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(approved["status"], "Approved");

        let (status, report) = call(
            &app,
            "POST",
            "/offers/generate",
            user,
            Some(json!({ "serviceRequestId": id })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let offer_id = report["offers"][0]["id"].as_str().expect("offer id").to_string();

        let (status, change) =
            call(&app, "POST", "/offers/select", user, Some(json!({ "offerId": offer_id }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(change["offer"]["status"], "Selected");

        let (status, readiness) =
            call(&app, "GET", &format!("/offers/{id}/readiness"), user, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(readiness["ready"], true);

        let (status, _) = call(
            &app,
            "PATCH",
            &format!("/offers/{id}/send-for-pm-evaluation"),
            user,
            Some(json!({ "comment": "please" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, order) =
            call(&app, "POST", &format!("/orders/{id}"), pm, Some(json!({}))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(order["status"], "Created");
        let order_id = order["id"].as_str().expect("order id").to_string();

        let (status, body) =
            call(&app, "POST", &format!("/orders/{id}"), pm, Some(json!({}))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "illegal_state");

        let (status, moved) = call(
            &app,
            "PATCH",
            &format!("/orders/{order_id}/status"),
            pm,
            Some(json!({ "status": "InDelivery" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(moved["status"], "InDelivery");

        let (status, orders) = call(&app, "GET", "/orders", user, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(orders.as_array().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn validation_failures_name_the_violation() {
        let app = app();
        let mut body = request_body(false);
        body["numberOfOffers"] = json!(5);

        let (status, value) =
            call(&app, "POST", "/service-requests", Some(("ana", "user")), Some(body)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let error: ErrorBody = serde_json::from_value(value).expect("error body");
        assert_eq!(error.error, "validation");
        assert_eq!(error.violations.len(), 1);
        assert!(error.message.contains("numberOfOffers"));
    }

    #[tokio::test]
    async fn transition_errors_map_to_conflict_and_forbidden() {
        let app = app();
        let ana = Some(("ana", "user"));
        let (_, created) =
            call(&app, "POST", "/service-requests", ana, Some(request_body(false))).await;
        let id = created["id"].as_str().expect("id").to_string();

        let (status, body) = call(
            &app,
            "PATCH",
            &format!("/service-requests/{id}/approve"),
            Some(("pm-1", "pm")),
            Some(json!({ "comment": "early" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "illegal_transition");

        let bob = Some(("bob", "user"));
        let (status, _) = call(&app, "GET", &format!("/service-requests/{id}"), bob, None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) =
            call(&app, "GET", "/service-requests/SR-missing", Some(("pm-1", "pm")), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) =
            call(&app, "GET", "/service-requests?status=Bogus", Some(("pm-1", "pm")), None).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }
}
