use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::actor::ActorRole;
use crate::domain::request::RequestStatus;
use crate::offers::Readiness;
use crate::validation::SpecViolation;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestAction {
    SaveDraft,
    Submit,
    DirectSubmit,
    Assign,
    Approve,
    Reject,
    Resubmit,
    SendForPmEvaluation,
    ApproveOffers,
    RequestReEvaluation,
    ResendForPmEvaluation,
}

impl RequestAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SaveDraft => "save_draft",
            Self::Submit => "submit",
            Self::DirectSubmit => "direct_submit",
            Self::Assign => "assign",
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::Resubmit => "resubmit",
            Self::SendForPmEvaluation => "send_for_pm_evaluation",
            Self::ApproveOffers => "approve_offers",
            Self::RequestReEvaluation => "request_re_evaluation",
            Self::ResendForPmEvaluation => "resend_for_pm_evaluation",
        }
    }

    /// The requester drives the request; provider managers (and admins) decide on it.
    pub fn is_requester_action(&self) -> bool {
        matches!(
            self,
            Self::SaveDraft
                | Self::Submit
                | Self::DirectSubmit
                | Self::Resubmit
                | Self::SendForPmEvaluation
                | Self::ResendForPmEvaluation
        )
    }

    pub fn permits(&self, role: ActorRole) -> bool {
        match role {
            ActorRole::User => self.is_requester_action(),
            ActorRole::ProviderManager | ActorRole::Admin => !self.is_requester_action(),
        }
    }

    pub fn requires_comment(&self) -> bool {
        matches!(
            self,
            Self::Approve
                | Self::Reject
                | Self::Resubmit
                | Self::SendForPmEvaluation
                | Self::RequestReEvaluation
        )
    }

    /// Prefix used when the action's comment is appended to the notification log.
    pub fn notification_prefix(&self) -> Option<&'static str> {
        match self {
            Self::Approve => Some("Approved by PM: "),
            Self::Reject => Some("Rejected by PM: "),
            Self::Resubmit => Some("User Resubmission Comment: "),
            Self::SendForPmEvaluation | Self::ResendForPmEvaluation => Some("Requester: "),
            Self::ApproveOffers | Self::RequestReEvaluation => Some("PM: "),
            Self::SaveDraft | Self::Submit | Self::DirectSubmit | Self::Assign => None,
        }
    }
}

impl fmt::Display for RequestAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Facts gathered by the caller that the transition guards inspect.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FlowContext {
    pub spec_violations: Vec<SpecViolation>,
    pub comment: Option<String>,
    pub readiness: Readiness,
    pub provider_manager_assigned: bool,
}

impl FlowContext {
    pub fn with_comment(mut self, comment: Option<String>) -> Self {
        self.comment = comment;
        self
    }

    pub fn with_spec_violations(mut self, violations: Vec<SpecViolation>) -> Self {
        self.spec_violations = violations;
        self
    }

    pub fn with_readiness(mut self, readiness: Readiness) -> Self {
        self.readiness = readiness;
        self
    }

    pub fn with_provider_manager_assigned(mut self, assigned: bool) -> Self {
        self.provider_manager_assigned = assigned;
        self
    }

    pub fn trimmed_comment(&self) -> Option<&str> {
        self.comment.as_deref().map(str::trim).filter(|comment| !comment.is_empty())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    /// `None` when the request is being created.
    pub from: Option<RequestStatus>,
    pub to: RequestStatus,
    pub action: RequestAction,
    pub notification: Option<String>,
}
