//! Application service that runs every workflow operation against one request aggregate.
//!
//! Each write holds the per-request lock, works on an in-memory copy and lands in a single
//! versioned [`WorkflowCommit`], so a failed operation leaves nothing behind.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::audit::{
    AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, TracingAuditSink,
};
use crate::collaborators::{AgreementCatalog, CandidateSource};
use crate::config::WorkflowConfig;
use crate::domain::actor::{Actor, ActorRole};
use crate::domain::offer::{Offer, OfferId};
use crate::domain::order::{Order, OrderId, OrderStatus};
use crate::domain::request::{RequestSpec, ServiceRequest, ServiceRequestId};
use crate::errors::{ApplicationError, DomainError};
use crate::flows::{FlowContext, FlowEngine, RequestAction, ServiceRequestFlow, TransitionOutcome};
use crate::offers::{
    readiness, GenerationReport, OfferGenerationEngine, OfferSelectionLedger, Readiness,
    SelectionChange, SelectionError, DEFAULT_CANDIDATE_TIMEOUT_SECS, DEFAULT_MAX_OFFERS_PER_SLOT,
};
use crate::orders::OrderAssembler;
use crate::store::{RequestFilter, WorkflowCommit, WorkflowStore};
use crate::validation::{RequestSpecValidator, SpecViolation};

const LOCK_PRUNE_THRESHOLD: usize = 1_024;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkflowSettings {
    pub candidate_timeout: Duration,
    pub max_offers_per_slot: u32,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            candidate_timeout: Duration::from_secs(DEFAULT_CANDIDATE_TIMEOUT_SECS),
            max_offers_per_slot: DEFAULT_MAX_OFFERS_PER_SLOT,
        }
    }
}

impl From<&WorkflowConfig> for WorkflowSettings {
    fn from(config: &WorkflowConfig) -> Self {
        Self {
            candidate_timeout: Duration::from_secs(config.candidate_timeout_secs),
            max_offers_per_slot: config.max_offers_per_slot,
        }
    }
}

/// Who is calling and under which correlation id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallContext {
    pub actor: Actor,
    pub correlation_id: String,
}

impl CallContext {
    pub fn new(actor: Actor) -> Self {
        Self { actor, correlation_id: Uuid::new_v4().to_string() }
    }

    pub fn with_correlation_id(actor: Actor, correlation_id: impl Into<String>) -> Self {
        Self { actor, correlation_id: correlation_id.into() }
    }

    fn audit(&self, request_id: Option<&ServiceRequestId>) -> AuditContext {
        AuditContext::new(request_id.cloned(), self.correlation_id.clone(), self.actor.id.clone())
    }
}

/// Serialises writers per request id within this process.
#[derive(Default)]
struct AggregateLocks {
    inner: Mutex<HashMap<ServiceRequestId, Arc<AsyncMutex<()>>>>,
}

impl AggregateLocks {
    async fn acquire(&self, id: &ServiceRequestId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = match self.inner.lock() {
                Ok(locks) => locks,
                Err(poisoned) => poisoned.into_inner(),
            };
            if locks.len() > LOCK_PRUNE_THRESHOLD {
                locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            }
            Arc::clone(locks.entry(id.clone()).or_default())
        };
        lock.lock_owned().await
    }
}

pub struct WorkflowService {
    store: Arc<dyn WorkflowStore>,
    catalog: Arc<dyn AgreementCatalog>,
    candidates: Arc<dyn CandidateSource>,
    audit: Arc<dyn AuditSink>,
    flow: FlowEngine<ServiceRequestFlow>,
    generator: OfferGenerationEngine,
    validator: RequestSpecValidator,
    assembler: OrderAssembler,
    locks: AggregateLocks,
}

impl WorkflowService {
    pub fn new(
        store: Arc<dyn WorkflowStore>,
        catalog: Arc<dyn AgreementCatalog>,
        candidates: Arc<dyn CandidateSource>,
    ) -> Self {
        let settings = WorkflowSettings::default();
        Self {
            store,
            catalog,
            candidates,
            audit: Arc::new(TracingAuditSink),
            flow: FlowEngine::default(),
            generator: OfferGenerationEngine::new(
                settings.candidate_timeout,
                settings.max_offers_per_slot,
            ),
            validator: RequestSpecValidator,
            assembler: OrderAssembler,
            locks: AggregateLocks::default(),
        }
    }

    pub fn with_settings(mut self, settings: WorkflowSettings) -> Self {
        self.generator =
            OfferGenerationEngine::new(settings.candidate_timeout, settings.max_offers_per_slot);
        self
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn store(&self) -> &Arc<dyn WorkflowStore> {
        &self.store
    }

    // ---- requester operations -------------------------------------------------------------

    /// Creates a request as a draft, or directly as submitted when `submit` is set.
    pub async fn create_request(
        &self,
        ctx: &CallContext,
        spec: RequestSpec,
        submit: bool,
    ) -> Result<ServiceRequest, ApplicationError> {
        let action = if submit { RequestAction::DirectSubmit } else { RequestAction::SaveDraft };
        self.ensure_permitted(ctx, action)?;

        let violations = self.check_spec(&spec).await?;
        let outcome = self.transition(
            ctx,
            None,
            action,
            &FlowContext::default().with_spec_violations(violations),
        )?;

        let id = ServiceRequestId(Uuid::new_v4().to_string());
        let mut request =
            ServiceRequest::from_spec(id, spec, ctx.actor.id.clone(), outcome.to, Utc::now());
        request.version = 1;

        self.store.commit(WorkflowCommit::create(request.clone())).await?;
        log_transition(ctx, &request, &outcome);
        Ok(request)
    }

    pub async fn update_draft(
        &self,
        ctx: &CallContext,
        id: &ServiceRequestId,
        spec: RequestSpec,
    ) -> Result<ServiceRequest, ApplicationError> {
        let _guard = self.locks.acquire(id).await;
        let mut request = self.load_request(id).await?;
        self.ensure_owner(ctx, &request, "edit this request")?;

        let violations = self.check_spec(&spec).await?;
        let outcome = self.transition(
            ctx,
            Some(&request),
            RequestAction::SaveDraft,
            &FlowContext::default().with_spec_violations(violations),
        )?;

        request.apply_spec(spec);
        let expected = stage(&mut request, &outcome);
        self.store.commit(WorkflowCommit::update(request.clone(), expected)).await?;
        log_transition(ctx, &request, &outcome);
        Ok(request)
    }

    pub async fn submit(
        &self,
        ctx: &CallContext,
        id: &ServiceRequestId,
    ) -> Result<ServiceRequest, ApplicationError> {
        let _guard = self.locks.acquire(id).await;
        let mut request = self.load_request(id).await?;
        self.ensure_owner(ctx, &request, "submit this request")?;

        let violations = self.check_spec(&request.spec()).await?;
        let outcome = self.transition(
            ctx,
            Some(&request),
            RequestAction::Submit,
            &FlowContext::default().with_spec_violations(violations),
        )?;

        let expected = stage(&mut request, &outcome);
        self.store.commit(WorkflowCommit::update(request.clone(), expected)).await?;
        log_transition(ctx, &request, &outcome);
        Ok(request)
    }

    /// Sends a rejected request back to the PM queue, optionally with corrected fields.
    pub async fn resubmit(
        &self,
        ctx: &CallContext,
        id: &ServiceRequestId,
        spec: Option<RequestSpec>,
        comment: String,
    ) -> Result<ServiceRequest, ApplicationError> {
        let _guard = self.locks.acquire(id).await;
        let mut request = self.load_request(id).await?;
        self.ensure_owner(ctx, &request, "resubmit this request")?;

        let spec = spec.unwrap_or_else(|| request.spec());
        let violations = self.check_spec(&spec).await?;
        let outcome = self.transition(
            ctx,
            Some(&request),
            RequestAction::Resubmit,
            &FlowContext::default()
                .with_spec_violations(violations)
                .with_comment(Some(comment)),
        )?;

        request.apply_spec(spec);
        request.provider_manager_id = None;
        let expected = stage(&mut request, &outcome);
        self.store.commit(WorkflowCommit::update(request.clone(), expected)).await?;
        log_transition(ctx, &request, &outcome);
        Ok(request)
    }

    /// Moves the negotiation to the next cycle so a fresh round of offers can be generated.
    pub async fn advance_cycle(
        &self,
        ctx: &CallContext,
        id: &ServiceRequestId,
    ) -> Result<ServiceRequest, ApplicationError> {
        let _guard = self.locks.acquire(id).await;
        let mut request = self.load_request(id).await?;
        self.ensure_requester(ctx, "advance the offer cycle")?;
        self.ensure_owner(ctx, &request, "advance the offer cycle")?;

        if !request.status.accepts_offer_changes() {
            return Err(DomainError::IllegalState(format!(
                "the offer cycle cannot advance while the request is {}",
                request.status
            ))
            .into());
        }
        let offers = self.store.offers_for_request(id).await?;
        if !offers.iter().any(|offer| offer.cycle == request.cycle_status) {
            return Err(DomainError::IllegalState(format!(
                "no offers were generated for {} yet",
                request.cycle_status
            ))
            .into());
        }

        let expected = request.version;
        let previous = request.cycle_status;
        request.cycle_status = previous.next();
        request.notifications.push(format!("Offer cycle advanced to {}", request.cycle_status));
        request.version += 1;
        request.updated_at = Utc::now();

        self.store.commit(WorkflowCommit::update(request.clone(), expected)).await?;
        tracing::info!(
            event_name = "workflow.cycle.advanced",
            correlation_id = %ctx.correlation_id,
            service_request_id = %request.id,
            from = %previous,
            to = %request.cycle_status,
            "offer cycle advanced"
        );
        Ok(request)
    }

    pub async fn generate_offers(
        &self,
        ctx: &CallContext,
        id: &ServiceRequestId,
    ) -> Result<GenerationReport, ApplicationError> {
        let _guard = self.locks.acquire(id).await;
        let mut request = self.load_request(id).await?;
        self.ensure_requester(ctx, "generate offers")?;
        self.ensure_owner(ctx, &request, "generate offers")?;

        let existing = self.store.offers_for_request(id).await?;
        let report = match self
            .generator
            .generate(&request, &existing, self.candidates.as_ref(), Utc::now())
            .await
        {
            Ok(report) => report,
            Err(error) => {
                self.audit.emit(
                    AuditEvent::from_context(
                        &ctx.audit(Some(id)),
                        "offers.generation_failed",
                        AuditCategory::Offer,
                        AuditOutcome::Failed,
                    )
                    .with_metadata("error", error.to_string()),
                );
                return Err(DomainError::from(error).into());
            }
        };

        let expected = request.version;
        request.version += 1;
        request.updated_at = Utc::now();
        let commit =
            WorkflowCommit::update(request.clone(), expected).with_offers(report.offers.clone());
        self.store.commit(commit).await?;

        self.audit.emit(
            AuditEvent::from_context(
                &ctx.audit(Some(id)),
                "offers.generated",
                AuditCategory::Offer,
                AuditOutcome::Success,
            )
            .with_metadata("cycle", report.cycle.to_string())
            .with_metadata("offers", report.offers.len().to_string())
            .with_metadata("shortfalls", report.member_statuses.len().to_string()),
        );
        tracing::info!(
            event_name = "workflow.offers.generated",
            correlation_id = %ctx.correlation_id,
            service_request_id = %request.id,
            cycle = %report.cycle,
            offers = report.offers.len(),
            shortfalls = report.member_statuses.len(),
            "offers generated"
        );
        Ok(report)
    }

    /// Toggles one offer; selecting replaces any sibling selection for the same slot and cycle.
    pub async fn select_offer(
        &self,
        ctx: &CallContext,
        offer_id: &OfferId,
    ) -> Result<SelectionChange, ApplicationError> {
        let offer = self
            .store
            .find_offer(offer_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("offer", offer_id))?;
        let id = offer.service_request_id;

        let _guard = self.locks.acquire(&id).await;
        let mut request = self.load_request(&id).await?;
        self.ensure_requester(ctx, "select offers")?;
        self.ensure_owner(ctx, &request, "select offers")?;

        if !request.status.accepts_offer_changes() {
            return Err(DomainError::from(SelectionError::SelectionClosed {
                status: request.status,
            })
            .into());
        }

        let mut ledger = OfferSelectionLedger::new(self.store.offers_for_request(&id).await?);
        let change = ledger.toggle(offer_id).map_err(DomainError::from)?;

        let expected = request.version;
        request.version += 1;
        request.updated_at = Utc::now();
        self.store
            .commit(WorkflowCommit::update(request, expected).with_offers(change.changed()))
            .await?;

        self.audit.emit(
            AuditEvent::from_context(
                &ctx.audit(Some(&id)),
                "offers.selection_toggled",
                AuditCategory::Offer,
                AuditOutcome::Success,
            )
            .with_metadata("offer_id", offer_id.to_string())
            .with_metadata("status", change.offer.status.as_str())
            .with_metadata("deselected", change.deselected.len().to_string()),
        );
        Ok(change)
    }

    pub async fn send_for_pm_evaluation(
        &self,
        ctx: &CallContext,
        id: &ServiceRequestId,
        comment: String,
    ) -> Result<ServiceRequest, ApplicationError> {
        self.evaluation_handoff(ctx, id, RequestAction::SendForPmEvaluation, Some(comment)).await
    }

    pub async fn resend_for_pm_evaluation(
        &self,
        ctx: &CallContext,
        id: &ServiceRequestId,
        comment: Option<String>,
    ) -> Result<ServiceRequest, ApplicationError> {
        self.evaluation_handoff(ctx, id, RequestAction::ResendForPmEvaluation, comment).await
    }

    async fn evaluation_handoff(
        &self,
        ctx: &CallContext,
        id: &ServiceRequestId,
        action: RequestAction,
        comment: Option<String>,
    ) -> Result<ServiceRequest, ApplicationError> {
        let _guard = self.locks.acquire(id).await;
        let mut request = self.load_request(id).await?;
        self.ensure_owner(ctx, &request, "send offers for evaluation")?;

        let offers = self.store.offers_for_request(id).await?;
        let outcome = self.transition(
            ctx,
            Some(&request),
            action,
            &FlowContext::default().with_readiness(readiness(&offers)).with_comment(comment),
        )?;

        let expected = stage(&mut request, &outcome);
        self.store.commit(WorkflowCommit::update(request.clone(), expected)).await?;
        log_transition(ctx, &request, &outcome);
        Ok(request)
    }

    // ---- provider manager operations ------------------------------------------------------

    pub async fn assign(
        &self,
        ctx: &CallContext,
        id: &ServiceRequestId,
    ) -> Result<ServiceRequest, ApplicationError> {
        let _guard = self.locks.acquire(id).await;
        let mut request = self.load_request(id).await?;

        let outcome = self.transition(
            ctx,
            Some(&request),
            RequestAction::Assign,
            &FlowContext::default()
                .with_provider_manager_assigned(request.provider_manager_id.is_some()),
        )?;

        let expected = stage(&mut request, &outcome);
        request.provider_manager_id = Some(ctx.actor.id.clone());
        request.notifications.push(format!("Assigned to provider manager {}", ctx.actor.id));
        self.store.commit(WorkflowCommit::update(request.clone(), expected)).await?;
        log_transition(ctx, &request, &outcome);
        Ok(request)
    }

    pub async fn approve(
        &self,
        ctx: &CallContext,
        id: &ServiceRequestId,
        comment: String,
    ) -> Result<ServiceRequest, ApplicationError> {
        self.pm_decision(ctx, id, RequestAction::Approve, Some(comment)).await
    }

    pub async fn reject(
        &self,
        ctx: &CallContext,
        id: &ServiceRequestId,
        comment: String,
    ) -> Result<ServiceRequest, ApplicationError> {
        self.pm_decision(ctx, id, RequestAction::Reject, Some(comment)).await
    }

    pub async fn request_re_evaluation(
        &self,
        ctx: &CallContext,
        id: &ServiceRequestId,
        comment: String,
    ) -> Result<ServiceRequest, ApplicationError> {
        self.pm_decision(ctx, id, RequestAction::RequestReEvaluation, Some(comment)).await
    }

    async fn pm_decision(
        &self,
        ctx: &CallContext,
        id: &ServiceRequestId,
        action: RequestAction,
        comment: Option<String>,
    ) -> Result<ServiceRequest, ApplicationError> {
        let _guard = self.locks.acquire(id).await;
        let mut request = self.load_request(id).await?;
        self.ensure_assigned_pm(ctx, &request, action.as_str())?;

        let outcome = self.transition(
            ctx,
            Some(&request),
            action,
            &FlowContext::default().with_comment(comment),
        )?;

        let expected = stage(&mut request, &outcome);
        self.store.commit(WorkflowCommit::update(request.clone(), expected)).await?;
        log_transition(ctx, &request, &outcome);
        Ok(request)
    }

    /// Freezes the selected offers into an order and closes the request in one commit.
    pub async fn approve_and_create_order(
        &self,
        ctx: &CallContext,
        id: &ServiceRequestId,
        comment: Option<String>,
    ) -> Result<Order, ApplicationError> {
        let _guard = self.locks.acquire(id).await;
        let mut request = self.load_request(id).await?;
        self.ensure_permitted(ctx, RequestAction::ApproveOffers)?;
        self.ensure_assigned_pm(ctx, &request, "approve offers")?;

        let existing = self.store.order_for_request(id).await?;
        self.assembler.ensure_no_order(&request, existing.as_ref()).map_err(DomainError::from)?;

        // Only PmOfferEvaluation may close into an order; the assembler sees legal states only.
        let outcome = self.transition(
            ctx,
            Some(&request),
            RequestAction::ApproveOffers,
            &FlowContext::default().with_comment(comment),
        )?;

        let offers = self.store.offers_for_request(id).await?;
        let order = self
            .assembler
            .assemble(&request, &offers, existing.as_ref(), &ctx.actor.id, Utc::now())
            .map_err(DomainError::from)?;

        let expected = stage(&mut request, &outcome);
        request.notifications.push(format!("Order {} created", order.id));
        self.store
            .commit(WorkflowCommit::update(request.clone(), expected).with_order(order.clone()))
            .await?;

        log_transition(ctx, &request, &outcome);
        self.audit.emit(
            AuditEvent::from_context(
                &ctx.audit(Some(id)),
                "order.created",
                AuditCategory::Order,
                AuditOutcome::Success,
            )
            .with_metadata("order_id", order.id.to_string())
            .with_metadata("total_price", order.total_price.to_string())
            .with_metadata("offers", order.approved_offers.len().to_string()),
        );
        tracing::info!(
            event_name = "workflow.order.created",
            correlation_id = %ctx.correlation_id,
            service_request_id = %request.id,
            order_id = %order.id,
            total_price = %order.total_price,
            "order created"
        );
        Ok(order)
    }

    pub async fn update_order_status(
        &self,
        ctx: &CallContext,
        order_id: &OrderId,
        status: OrderStatus,
    ) -> Result<Order, ApplicationError> {
        if ctx.actor.role == ActorRole::User {
            return Err(ApplicationError::forbidden(&ctx.actor.id, "change order status"));
        }
        let mut order = self
            .store
            .find_order(order_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("order", order_id))?;
        let id = order.service_request_id.clone();

        let _guard = self.locks.acquire(&id).await;
        let mut request = self.load_request(&id).await?;
        self.ensure_assigned_pm(ctx, &request, "change order status")?;

        let previous = order.status;
        order.transition_to(status, Utc::now())?;

        let expected = request.version;
        request.version += 1;
        request.updated_at = order.updated_at;
        request
            .notifications
            .push(format!("Order {} moved to {}", order.id, order.status.as_str()));
        self.store
            .commit(WorkflowCommit::update(request, expected).with_order(order.clone()))
            .await?;

        tracing::info!(
            event_name = "workflow.order.status_changed",
            correlation_id = %ctx.correlation_id,
            order_id = %order.id,
            from = previous.as_str(),
            to = order.status.as_str(),
            "order status changed"
        );
        Ok(order)
    }

    // ---- reads --------------------------------------------------------------------------

    pub async fn get_request(
        &self,
        ctx: &CallContext,
        id: &ServiceRequestId,
    ) -> Result<ServiceRequest, ApplicationError> {
        let request = self.load_request(id).await?;
        self.ensure_visible(ctx, &request)?;
        Ok(request)
    }

    /// Users only ever see their own requests, whatever the filter says.
    pub async fn list_requests(
        &self,
        ctx: &CallContext,
        mut filter: RequestFilter,
    ) -> Result<Vec<ServiceRequest>, ApplicationError> {
        if ctx.actor.role == ActorRole::User {
            filter.requested_by = Some(ctx.actor.id.clone());
        }
        Ok(self.store.list_requests(&filter).await?)
    }

    pub async fn offers(
        &self,
        ctx: &CallContext,
        id: &ServiceRequestId,
    ) -> Result<Vec<Offer>, ApplicationError> {
        self.get_request(ctx, id).await?;
        Ok(self.store.offers_for_request(id).await?)
    }

    pub async fn selected_offers(
        &self,
        ctx: &CallContext,
        id: &ServiceRequestId,
    ) -> Result<Vec<Offer>, ApplicationError> {
        let offers = self.offers(ctx, id).await?;
        Ok(offers.into_iter().filter(Offer::is_selected).collect())
    }

    pub async fn readiness(
        &self,
        ctx: &CallContext,
        id: &ServiceRequestId,
    ) -> Result<Readiness, ApplicationError> {
        let offers = self.offers(ctx, id).await?;
        Ok(readiness(&offers))
    }

    pub async fn get_order(
        &self,
        ctx: &CallContext,
        order_id: &OrderId,
    ) -> Result<Order, ApplicationError> {
        let order = self
            .store
            .find_order(order_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("order", order_id))?;
        self.get_request(ctx, &order.service_request_id).await?;
        Ok(order)
    }

    pub async fn order_for_request(
        &self,
        ctx: &CallContext,
        id: &ServiceRequestId,
    ) -> Result<Order, ApplicationError> {
        self.get_request(ctx, id).await?;
        self.store
            .order_for_request(id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("order for service request", id))
    }

    pub async fn list_orders(&self, ctx: &CallContext) -> Result<Vec<Order>, ApplicationError> {
        let orders = self.store.list_orders().await?;
        if ctx.actor.role != ActorRole::User {
            return Ok(orders);
        }

        let owned: HashSet<ServiceRequestId> = self
            .list_requests(ctx, RequestFilter::default())
            .await?
            .into_iter()
            .map(|request| request.id)
            .collect();
        Ok(orders.into_iter().filter(|order| owned.contains(&order.service_request_id)).collect())
    }

    // ---- helpers ------------------------------------------------------------------------

    async fn load_request(
        &self,
        id: &ServiceRequestId,
    ) -> Result<ServiceRequest, ApplicationError> {
        self.store
            .find_request(id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("service request", id))
    }

    async fn check_spec(&self, spec: &RequestSpec) -> Result<Vec<SpecViolation>, ApplicationError> {
        let terms = self
            .catalog
            .terms(&spec.agreement_id)
            .await
            .map_err(|error| ApplicationError::UpstreamUnavailable(error.to_string()))?;
        Ok(self.validator.validate(spec, terms.as_ref()))
    }

    fn transition(
        &self,
        ctx: &CallContext,
        request: Option<&ServiceRequest>,
        action: RequestAction,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, ApplicationError> {
        let outcome = self.flow.apply_with_audit(
            request.map(|request| request.status),
            action,
            ctx.actor.role,
            context,
            self.audit.as_ref(),
            &ctx.audit(request.map(|request| &request.id)),
        );

        outcome.map_err(|error| {
            tracing::warn!(
                event_name = "workflow.transition.rejected",
                correlation_id = %ctx.correlation_id,
                service_request_id = %request.map(|r| r.id.to_string()).unwrap_or_default(),
                action = action.as_str(),
                error = %error,
                "transition rejected"
            );
            ApplicationError::from(error)
        })
    }

    fn ensure_permitted(
        &self,
        ctx: &CallContext,
        action: RequestAction,
    ) -> Result<(), ApplicationError> {
        if action.permits(ctx.actor.role) {
            return Ok(());
        }
        Err(ApplicationError::forbidden(&ctx.actor.id, action.as_str()))
    }

    fn ensure_requester(&self, ctx: &CallContext, operation: &str) -> Result<(), ApplicationError> {
        if ctx.actor.role == ActorRole::User {
            return Ok(());
        }
        Err(ApplicationError::forbidden(&ctx.actor.id, operation))
    }

    fn ensure_owner(
        &self,
        ctx: &CallContext,
        request: &ServiceRequest,
        operation: &str,
    ) -> Result<(), ApplicationError> {
        if ctx.actor.role == ActorRole::User && request.requested_by != ctx.actor.id {
            return Err(ApplicationError::forbidden(&ctx.actor.id, operation));
        }
        Ok(())
    }

    /// Once a PM is assigned only that PM (or an admin) may decide on the request.
    fn ensure_assigned_pm(
        &self,
        ctx: &CallContext,
        request: &ServiceRequest,
        operation: &str,
    ) -> Result<(), ApplicationError> {
        match (ctx.actor.role, request.provider_manager_id.as_deref()) {
            (ActorRole::ProviderManager, Some(assigned)) if assigned != ctx.actor.id => {
                Err(ApplicationError::forbidden(&ctx.actor.id, operation))
            }
            _ => Ok(()),
        }
    }

    fn ensure_visible(
        &self,
        ctx: &CallContext,
        request: &ServiceRequest,
    ) -> Result<(), ApplicationError> {
        self.ensure_owner(ctx, request, "view this request")
    }
}

/// Applies an accepted transition to the working copy and returns the version it was read at.
fn stage(request: &mut ServiceRequest, outcome: &TransitionOutcome) -> u64 {
    let expected = request.version;
    request.status = outcome.to;
    if let Some(notification) = &outcome.notification {
        request.notifications.push(notification.clone());
    }
    request.version = expected + 1;
    request.updated_at = Utc::now();
    expected
}

fn log_transition(ctx: &CallContext, request: &ServiceRequest, outcome: &TransitionOutcome) {
    tracing::info!(
        event_name = "workflow.transition.applied",
        correlation_id = %ctx.correlation_id,
        service_request_id = %request.id,
        actor_id = %ctx.actor.id,
        action = outcome.action.as_str(),
        from = outcome.from.map_or("new", |status| status.as_str()),
        to = outcome.to.as_str(),
        version = request.version,
        "transition applied"
    );
}
