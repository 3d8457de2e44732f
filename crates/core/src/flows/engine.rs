use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::actor::ActorRole;
use crate::domain::offer::MemberKey;
use crate::domain::request::RequestStatus;
use crate::errors::ErrorKind;
use crate::flows::states::{FlowContext, RequestAction, TransitionOutcome};
use crate::validation::{describe_violations, SpecViolation};

pub trait FlowDefinition {
    fn name(&self) -> &'static str;
    fn transition(
        &self,
        current: Option<RequestStatus>,
        action: RequestAction,
        role: ActorRole,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>;
}

#[derive(Clone, Debug, Default)]
pub struct ServiceRequestFlow;

impl FlowDefinition for ServiceRequestFlow {
    fn name(&self) -> &'static str {
        "service_request"
    }

    fn transition(
        &self,
        current: Option<RequestStatus>,
        action: RequestAction,
        role: ActorRole,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        transition_service_request(current, action, role, context)
    }
}

#[derive(Clone, Debug)]
pub struct FlowEngine<F> {
    flow: F,
}

impl<F> FlowEngine<F>
where
    F: FlowDefinition,
{
    pub fn new(flow: F) -> Self {
        Self { flow }
    }

    pub fn name(&self) -> &'static str {
        self.flow.name()
    }

    pub fn apply(
        &self,
        current: Option<RequestStatus>,
        action: RequestAction,
        role: ActorRole,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        self.flow.transition(current, action, role, context)
    }

    pub fn apply_with_audit<S>(
        &self,
        current: Option<RequestStatus>,
        action: RequestAction,
        role: ActorRole,
        context: &FlowContext,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.apply(current, action, role, context);
        let from = current.map_or("new", |state| state.as_str());
        match &result {
            Ok(outcome) => {
                sink.emit(
                    AuditEvent::from_context(
                        audit,
                        "flow.transition_applied",
                        AuditCategory::Flow,
                        AuditOutcome::Success,
                    )
                    .with_metadata("flow", self.name())
                    .with_metadata("from", from)
                    .with_metadata("to", outcome.to.as_str())
                    .with_metadata("action", action.as_str()),
                );
            }
            Err(error) => {
                sink.emit(
                    AuditEvent::from_context(
                        audit,
                        "flow.transition_rejected",
                        AuditCategory::Flow,
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("flow", self.name())
                    .with_metadata("from", from)
                    .with_metadata("action", action.as_str())
                    .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }
}

impl Default for FlowEngine<ServiceRequestFlow> {
    fn default() -> Self {
        Self::new(ServiceRequestFlow)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowTransitionError {
    #[error("role {role:?} may not perform `{action}`")]
    ActorNotPermitted { action: RequestAction, role: ActorRole },
    #[error("`{action}` is not allowed from {}", .state.map_or("a new request", |state| state.as_str()))]
    InvalidTransition { state: Option<RequestStatus>, action: RequestAction },
    #[error("request is invalid: {}", describe_violations(.violations))]
    SpecViolations { action: RequestAction, violations: Vec<SpecViolation> },
    #[error("request already has a provider manager assigned")]
    AlreadyAssigned,
    #[error("offer selection is incomplete; missing selections for {}", describe_members(.missing))]
    OffersNotReady { missing: Vec<MemberKey> },
    #[error("`{action}` requires a comment")]
    MissingComment { action: RequestAction },
}

impl FlowTransitionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ActorNotPermitted { .. } => ErrorKind::Forbidden,
            Self::InvalidTransition { .. } => ErrorKind::IllegalTransition,
            Self::SpecViolations { .. } | Self::MissingComment { .. } => ErrorKind::Validation,
            Self::AlreadyAssigned | Self::OffersNotReady { .. } => ErrorKind::IllegalState,
        }
    }
}

fn describe_members(missing: &[MemberKey]) -> String {
    if missing.is_empty() {
        return "every member (nothing is selected)".to_string();
    }
    missing.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

fn transition_service_request(
    current: Option<RequestStatus>,
    action: RequestAction,
    role: ActorRole,
    context: &FlowContext,
) -> Result<TransitionOutcome, FlowTransitionError> {
    use RequestAction::{
        ApproveOffers, Approve, Assign, DirectSubmit, Reject, RequestReEvaluation,
        ResendForPmEvaluation, Resubmit, SaveDraft, SendForPmEvaluation, Submit,
    };
    use RequestStatus::{
        Approved, Assigned, Draft, OrderCreated, PmOfferEvaluation, Rejected, Submitted,
        UserOfferReEvaluation,
    };

    if !action.permits(role) {
        return Err(FlowTransitionError::ActorNotPermitted { action, role });
    }

    let to = match (current, action) {
        (None, SaveDraft) | (Some(Draft), SaveDraft) => Draft,
        (Some(Draft), Submit) | (None, DirectSubmit) | (Some(Rejected), Resubmit) => Submitted,
        (Some(Submitted), Assign) => Assigned,
        (Some(Assigned), Approve) => Approved,
        (Some(Assigned), Reject) => Rejected,
        (Some(Approved), SendForPmEvaluation)
        | (Some(UserOfferReEvaluation), ResendForPmEvaluation) => PmOfferEvaluation,
        (Some(PmOfferEvaluation), ApproveOffers) => OrderCreated,
        (Some(PmOfferEvaluation), RequestReEvaluation) => UserOfferReEvaluation,
        _ => return Err(FlowTransitionError::InvalidTransition { state: current, action }),
    };

    match action {
        SaveDraft | Submit | DirectSubmit | Resubmit if !context.spec_violations.is_empty() => {
            return Err(FlowTransitionError::SpecViolations {
                action,
                violations: context.spec_violations.clone(),
            });
        }
        Assign if context.provider_manager_assigned => {
            return Err(FlowTransitionError::AlreadyAssigned);
        }
        SendForPmEvaluation | ResendForPmEvaluation if !context.readiness.ready => {
            return Err(FlowTransitionError::OffersNotReady {
                missing: context.readiness.missing.clone(),
            });
        }
        _ => {}
    }

    let comment = context.trimmed_comment();
    if action.requires_comment() && comment.is_none() {
        return Err(FlowTransitionError::MissingComment { action });
    }

    let notification = action
        .notification_prefix()
        .zip(comment)
        .map(|(prefix, comment)| format!("{prefix}{comment}"));

    Ok(TransitionOutcome { from: current, to, action, notification })
}
