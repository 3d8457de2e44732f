use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;

use staffflow_core::audit::InMemoryAuditSink;
use staffflow_core::{
    Actor, AgreementCombination, AgreementTerms, CallContext, Candidate, CandidateQuery,
    CandidateSource, ErrorKind, LocationType, MemberSlot, OrderStatus, RequestFilter, RequestSpec,
    RequestStatus, RequestType, ServiceRequest, StaticAgreementCatalog, StaticCandidateSource,
    UpstreamError, WorkflowService, WorkflowSettings, WorkflowStore,
};
use staffflow_db::{connect_with_settings, migrations, InMemoryWorkflowStore, SqlWorkflowStore};

fn slot(role: &str, profiles: u32) -> MemberSlot {
    MemberSlot {
        domain_id: "D-7".to_string(),
        domain_name: "Platform".to_string(),
        role_id: format!("R-{role}"),
        role: role.to_string(),
        level: "Senior".to_string(),
        technology_level: "Common".to_string(),
        number_of_profiles_needed: profiles,
    }
}

fn spec(request_type: RequestType, members: Vec<MemberSlot>) -> RequestSpec {
    RequestSpec {
        agreement_id: "MA-7".to_string(),
        task_description: "Migrate the billing cluster".to_string(),
        project: "Orion".to_string(),
        request_type,
        location: "Lisbon".to_string(),
        location_type: LocationType::Nearshore,
        begin: NaiveDate::from_ymd_opt(2024, 3, 4).expect("date"),
        end: NaiveDate::from_ymd_opt(2024, 3, 8).expect("date"),
        number_of_offers: 2,
        representatives: ["ops@orion.example".to_string()].into_iter().collect(),
        information_for_provider_manager: "Night shifts possible".to_string(),
        consumer: "Bea".to_string(),
        selected_members: members,
    }
}

fn service(store: Arc<dyn WorkflowStore>, audit: &InMemoryAuditSink) -> WorkflowService {
    service_with_candidates(store, audit, Arc::new(static_candidates()))
}

fn service_with_candidates(
    store: Arc<dyn WorkflowStore>,
    audit: &InMemoryAuditSink,
    candidates: Arc<dyn CandidateSource>,
) -> WorkflowService {
    let catalog = StaticAgreementCatalog::default().with_terms(AgreementTerms::new(
        "MA-7",
        vec![
            AgreementCombination::from_slot(&slot("Architect", 1)),
            AgreementCombination::from_slot(&slot("SRE", 1)),
        ],
    ));

    WorkflowService::new(store, Arc::new(catalog), candidates)
        .with_audit_sink(Arc::new(audit.clone()))
}

fn static_candidates() -> StaticCandidateSource {
    StaticCandidateSource::default()
        .with_candidates(
            slot("Architect", 1).key(),
            vec![
                Candidate {
                    provider_name: "Acme".to_string(),
                    price: Decimal::new(1_200, 0),
                    employee_profiles: Vec::new(),
                },
                Candidate {
                    provider_name: "Globex".to_string(),
                    price: Decimal::new(1_100, 0),
                    employee_profiles: Vec::new(),
                },
            ],
        )
        .with_candidates(slot("SRE", 1).key(), Vec::new())
}

/// Fails or stalls the first `failures` queries for one role, then answers from the static set.
struct FlakyCandidates {
    role: &'static str,
    failures: AtomicU32,
    stall: Option<Duration>,
    inner: StaticCandidateSource,
}

impl FlakyCandidates {
    fn failing(role: &'static str, failures: u32) -> Self {
        Self { role, failures: AtomicU32::new(failures), stall: None, inner: static_candidates() }
    }

    fn stalling(role: &'static str, failures: u32, stall: Duration) -> Self {
        Self { stall: Some(stall), ..Self::failing(role, failures) }
    }
}

#[async_trait]
impl CandidateSource for FlakyCandidates {
    async fn candidates(&self, query: &CandidateQuery) -> Result<Vec<Candidate>, UpstreamError> {
        let degraded = query.role == self.role
            && self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
                .is_ok();
        if degraded {
            match self.stall {
                Some(stall) => tokio::time::sleep(stall).await,
                None => {
                    return Err(UpstreamError::Unavailable {
                        service: "candidates".to_string(),
                        message: "connection refused".to_string(),
                    })
                }
            }
        }
        self.inner.candidates(query).await
    }
}

async fn sql_store() -> Arc<dyn WorkflowStore> {
    let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
    migrations::run_pending(&pool).await.expect("migrations");
    Arc::new(SqlWorkflowStore::new(pool))
}

async fn run_lifecycle(store: Arc<dyn WorkflowStore>) {
    let audit = InMemoryAuditSink::default();
    let service = service(store, &audit);
    let user = CallContext::new(Actor::user("bea"));
    let pm = CallContext::new(Actor::provider_manager("pm-7"));

    let team = spec(RequestType::Team, vec![slot("Architect", 1), slot("SRE", 2)]);
    let draft = service.create_request(&user, team, false).await.expect("draft");
    assert_eq!(draft.status, RequestStatus::Draft);
    assert_eq!(draft.amount_of_man_days, 5);
    assert_eq!(draft.number_of_specialists, 3);

    let edited = service
        .update_draft(&user, &draft.id, spec(RequestType::Single, vec![slot("Architect", 1)]))
        .await
        .expect("edit draft");
    assert_eq!(edited.number_of_specialists, 1);

    service.submit(&user, &draft.id).await.expect("submit");
    let submitted =
        RequestFilter { status: Some(RequestStatus::Submitted), ..RequestFilter::default() };
    let queue = service.list_requests(&pm, submitted).await.expect("pm queue");
    assert_eq!(queue.len(), 1);

    service.assign(&pm, &draft.id).await.expect("assign");
    service.approve(&pm, &draft.id, "Fine".to_string()).await.expect("approve");

    let report = service.generate_offers(&user, &draft.id).await.expect("generate");
    assert_eq!(report.offers.len(), 2);
    assert!(report.member_statuses.is_empty());

    let cheapest = report
        .offers
        .iter()
        .min_by_key(|offer| offer.price)
        .expect("offer")
        .id
        .clone();
    service.select_offer(&user, &cheapest).await.expect("select");
    service
        .send_for_pm_evaluation(&user, &draft.id, "Globex please".to_string())
        .await
        .expect("send");
    service
        .request_re_evaluation(&pm, &draft.id, "Check rates again".to_string())
        .await
        .expect("re-evaluation");

    let reopened = service.get_request(&user, &draft.id).await.expect("request");
    assert_eq!(reopened.status, RequestStatus::UserOfferReEvaluation);
    assert_eq!(
        reopened.notifications.latest_with_prefix("PM: "),
        Some("PM: Check rates again")
    );

    service.advance_cycle(&user, &draft.id).await.expect("cycle 2");
    let second = service.generate_offers(&user, &draft.id).await.expect("generate cycle 2");
    let pick = second.offers.iter().max_by_key(|offer| offer.price).expect("offer").id.clone();
    service.select_offer(&user, &pick).await.expect("select in cycle 2");
    service.resend_for_pm_evaluation(&user, &draft.id, None).await.expect("resend");

    let order = service
        .approve_and_create_order(&pm, &draft.id, Some("Approved".to_string()))
        .await
        .expect("order");
    assert_eq!(order.approved_offers.len(), 2);
    assert_eq!(order.total_price, Decimal::new(2_300, 0));
    assert_eq!(order.status, OrderStatus::Created);

    let stored = service.order_for_request(&user, &draft.id).await.expect("order lookup");
    assert_eq!(stored, order);

    let delivered = service
        .update_order_status(&pm, &order.id, OrderStatus::InDelivery)
        .await
        .expect("deliver");
    assert_eq!(delivered.total_price, order.total_price);
    let reloaded = service.get_order(&user, &order.id).await.expect("order");
    assert_eq!(reloaded.status, OrderStatus::InDelivery);

    let closed = service.get_request(&pm, &draft.id).await.expect("request");
    assert_eq!(closed.status, RequestStatus::OrderCreated);
    assert!(audit.events().iter().any(|event| event.event_type == "flow.transition_applied"));
}

#[tokio::test]
async fn lifecycle_over_in_memory_store() {
    run_lifecycle(Arc::new(InMemoryWorkflowStore::default())).await;
}

#[tokio::test]
async fn lifecycle_over_sql_store() {
    run_lifecycle(sql_store().await).await;
}

async fn approved_team_request(service: &WorkflowService) -> ServiceRequest {
    let user = CallContext::new(Actor::user("bea"));
    let pm = CallContext::new(Actor::provider_manager("pm-7"));
    let team = spec(RequestType::Team, vec![slot("Architect", 1), slot("SRE", 1)]);
    let request = service.create_request(&user, team, true).await.expect("create");
    service.assign(&pm, &request.id).await.expect("assign");
    service.approve(&pm, &request.id, "Fine".to_string()).await.expect("approve")
}

async fn assert_untouched(store: &Arc<dyn WorkflowStore>, before: &ServiceRequest) {
    let after = store.find_request(&before.id).await.expect("find").expect("request");
    assert_eq!(after.status, before.status);
    assert_eq!(after.version, before.version);
    assert_eq!(after.cycle_status, before.cycle_status);
    assert_eq!(after.notifications, before.notifications);
    assert!(store.offers_for_request(&before.id).await.expect("offers").is_empty());
}

#[tokio::test]
async fn candidate_outage_persists_nothing_and_can_be_retried() {
    let store = sql_store().await;
    let audit = InMemoryAuditSink::default();
    let service = service_with_candidates(
        Arc::clone(&store),
        &audit,
        Arc::new(FlakyCandidates::failing("SRE", 1)),
    );
    let user = CallContext::new(Actor::user("bea"));
    let request = approved_team_request(&service).await;

    // The Architect slot answers before the SRE slot fails.
    let error = service.generate_offers(&user, &request.id).await.expect_err("SRE upstream down");
    assert_eq!(error.kind(), ErrorKind::UpstreamUnavailable);
    assert_untouched(&store, &request).await;

    let report =
        service.generate_offers(&user, &request.id).await.expect("retry in the same cycle");
    assert_eq!(report.offers.len(), 3);
    assert!(report.offers.iter().all(|offer| offer.cycle == request.cycle_status));
}

#[tokio::test(start_paused = true)]
async fn candidate_timeout_persists_nothing_and_can_be_retried() {
    let store: Arc<dyn WorkflowStore> = Arc::new(InMemoryWorkflowStore::default());
    let audit = InMemoryAuditSink::default();
    let service = service_with_candidates(
        Arc::clone(&store),
        &audit,
        Arc::new(FlakyCandidates::stalling("Architect", 1, Duration::from_secs(120))),
    )
    .with_settings(WorkflowSettings {
        candidate_timeout: Duration::from_secs(5),
        max_offers_per_slot: 2,
    });
    let user = CallContext::new(Actor::user("bea"));
    let request = approved_team_request(&service).await;

    let error = service.generate_offers(&user, &request.id).await.expect_err("candidate timeout");
    assert_eq!(error.kind(), ErrorKind::UpstreamUnavailable);
    assert_untouched(&store, &request).await;

    let report =
        service.generate_offers(&user, &request.id).await.expect("retry in the same cycle");
    assert_eq!(report.offers.len(), 3);
}

#[tokio::test]
async fn rejected_actions_leave_the_request_untouched() {
    let store = sql_store().await;
    let audit = InMemoryAuditSink::default();
    let service = service(Arc::clone(&store), &audit);
    let user = CallContext::new(Actor::user("bea"));
    let pm = CallContext::new(Actor::provider_manager("pm-7"));

    let request = service
        .create_request(&user, spec(RequestType::Single, vec![slot("Architect", 1)]), true)
        .await
        .expect("create");

    let error = service.generate_offers(&user, &request.id).await.expect_err("not approved yet");
    assert_eq!(error.kind(), ErrorKind::IllegalState);
    assert!(store.offers_for_request(&request.id).await.expect("offers").is_empty());

    service.assign(&pm, &request.id).await.expect("assign");
    let error = service
        .approve(&user, &request.id, "self approval".to_string())
        .await
        .expect_err("users cannot approve");
    assert_eq!(error.kind(), ErrorKind::Forbidden);

    let unchanged = store.find_request(&request.id).await.expect("find").expect("request");
    assert_eq!(unchanged.status, RequestStatus::Assigned);
    assert_eq!(unchanged.version, 2);
}

#[tokio::test]
async fn unknown_agreement_combination_is_rejected() {
    let store: Arc<dyn WorkflowStore> = Arc::new(InMemoryWorkflowStore::default());
    let audit = InMemoryAuditSink::default();
    let service = service(store, &audit);
    let user = CallContext::new(Actor::user("bea"));

    let mut unknown = slot("Architect", 1);
    unknown.level = "Junior".to_string();
    let error = service
        .create_request(&user, spec(RequestType::Single, vec![unknown]), true)
        .await
        .expect_err("combination not in agreement");

    assert_eq!(error.kind(), ErrorKind::Validation);
    assert!(error.to_string().contains("Junior"));
}
