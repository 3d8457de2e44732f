use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::order::OrderStatus;
use crate::flows::FlowTransitionError;
use crate::offers::{GenerationError, SelectionError};
use crate::orders::AssemblyError;
use crate::validation::{describe_violations, SpecViolation};

/// Caller-facing classification of every failure the workflow can report.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    IllegalTransition,
    IllegalState,
    Conflict,
    UpstreamUnavailable,
    NotFound,
    Forbidden,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::IllegalTransition => "illegal_transition",
            Self::IllegalState => "illegal_state",
            Self::Conflict => "conflict",
            Self::UpstreamUnavailable => "upstream_unavailable",
            Self::NotFound => "not_found",
            Self::Forbidden => "forbidden",
            Self::Internal => "internal",
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error(transparent)]
    FlowTransition(#[from] FlowTransitionError),
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error(transparent)]
    Selection(#[from] SelectionError),
    #[error(transparent)]
    Assembly(#[from] AssemblyError),
    #[error("request is invalid: {}", describe_violations(.0))]
    Validation(Vec<SpecViolation>),
    #[error("invalid order transition from {from:?} to {to:?}")]
    InvalidOrderTransition { from: OrderStatus, to: OrderStatus },
    #[error("{0}")]
    IllegalState(String),
}

impl DomainError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::FlowTransition(error) => error.kind(),
            Self::Generation(error) => error.kind(),
            Self::Selection(error) => error.kind(),
            Self::Assembly(_) | Self::IllegalState(_) => ErrorKind::IllegalState,
            Self::Validation(_) => ErrorKind::Validation,
            Self::InvalidOrderTransition { .. } => ErrorKind::IllegalTransition,
        }
    }

    pub fn violations(&self) -> &[SpecViolation] {
        match self {
            Self::Validation(violations)
            | Self::FlowTransition(FlowTransitionError::SpecViolations { violations, .. }) => {
                violations.as_slice()
            }
            _ => &[],
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("service request {request_id} was modified concurrently; refetch and retry")]
    Conflict { request_id: String },
    #[error("{entity} `{id}` was not found")]
    NotFound { entity: &'static str, id: String },
    #[error("actor `{actor_id}` may not {operation}")]
    Forbidden { actor_id: String, operation: String },
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl ApplicationError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound { entity, id: id.to_string() }
    }

    pub fn forbidden(actor_id: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::Forbidden { actor_id: actor_id.into(), operation: operation.into() }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Domain(error) => error.kind(),
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Forbidden { .. } => ErrorKind::Forbidden,
            Self::UpstreamUnavailable(_) => ErrorKind::UpstreamUnavailable,
            Self::Persistence(_) | Self::Configuration(_) => ErrorKind::Internal,
        }
    }

    pub fn violations(&self) -> &[SpecViolation] {
        match self {
            Self::Domain(error) => error.violations(),
            _ => &[],
        }
    }

    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::Forbidden { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<FlowTransitionError> for ApplicationError {
    fn from(value: FlowTransitionError) -> Self {
        Self::Domain(value.into())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request ({}): {message}", .kind.as_str())]
    BadRequest { kind: ErrorKind, message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("forbidden: {message}")]
    Forbidden { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::BadRequest { kind, .. } => *kind,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Forbidden { .. } => ErrorKind::Forbidden,
            Self::ServiceUnavailable { .. } => ErrorKind::UpstreamUnavailable,
            Self::Internal { .. } => ErrorKind::Internal,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::BadRequest { message, .. }
            | Self::NotFound { message, .. }
            | Self::Forbidden { message, .. }
            | Self::ServiceUnavailable { message, .. }
            | Self::Internal { message, .. } => message,
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::Forbidden { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { kind: ErrorKind::Conflict, .. } => {
                "The request was changed by someone else. Refresh and try again."
            }
            Self::BadRequest { kind: ErrorKind::Validation, .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::BadRequest { .. } => {
                "This action is not available in the request's current state. Refresh and try again."
            }
            Self::NotFound { .. } => "The requested record does not exist.",
            Self::Forbidden { .. } => "You are not allowed to perform this action.",
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let kind = value.kind();
        let message = value.to_string();
        let correlation_id = "unassigned".to_owned();
        match kind {
            ErrorKind::Validation
            | ErrorKind::IllegalTransition
            | ErrorKind::IllegalState
            | ErrorKind::Conflict => Self::BadRequest { kind, message, correlation_id },
            ErrorKind::NotFound => Self::NotFound { message, correlation_id },
            ErrorKind::Forbidden => Self::Forbidden { message, correlation_id },
            ErrorKind::UpstreamUnavailable => Self::ServiceUnavailable { message, correlation_id },
            ErrorKind::Internal => Self::Internal { message, correlation_id },
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::request::{RequestStatus, RequestType};
    use crate::errors::{ApplicationError, DomainError, ErrorKind, InterfaceError};
    use crate::flows::{FlowTransitionError, RequestAction};
    use crate::offers::GenerationError;
    use crate::validation::SpecViolation;

    #[test]
    fn validation_error_maps_to_bad_request_and_keeps_details() {
        let error = ApplicationError::from(DomainError::Validation(vec![
            SpecViolation::InvalidSlotShape {
                request_type: RequestType::Single,
                reason: "expected exactly one member slot, got 2".to_owned(),
            },
        ]));
        assert_eq!(error.kind(), ErrorKind::Validation);
        assert_eq!(error.violations().len(), 1);

        let interface = error.into_interface("req-1");
        assert!(matches!(
            interface,
            InterfaceError::BadRequest {
                kind: ErrorKind::Validation,
                ref correlation_id,
                ref message,
            } if correlation_id == "req-1" && message.contains("exactly one member slot")
        ));
        assert_eq!(
            interface.user_message(),
            "The request could not be processed. Check inputs and try again."
        );
    }

    #[test]
    fn illegal_transition_is_classified_from_the_flow_error() {
        let error = ApplicationError::from(FlowTransitionError::InvalidTransition {
            state: Some(RequestStatus::Draft),
            action: RequestAction::Approve,
        });

        assert_eq!(error.kind(), ErrorKind::IllegalTransition);
        assert!(error.to_string().contains("Draft"));
    }

    #[test]
    fn conflict_and_not_found_have_distinct_kinds() {
        let conflict =
            ApplicationError::Conflict { request_id: "SR-1".to_owned() }.into_interface("req-2");
        assert_eq!(conflict.kind(), ErrorKind::Conflict);
        assert_eq!(conflict.correlation_id(), "req-2");

        let missing =
            ApplicationError::not_found("service request", "SR-404").into_interface("req-3");
        assert!(matches!(missing, InterfaceError::NotFound { .. }));
        assert_eq!(missing.message(), "service request `SR-404` was not found");
    }

    #[test]
    fn upstream_generation_failure_maps_to_service_unavailable() {
        let error = ApplicationError::from(DomainError::from(GenerationError::Timeout {
            slot: "D-1/Dev/Senior/Advanced".to_owned(),
            secs: 5,
        }));
        let interface = error.into_interface("req-4");

        assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
        assert_eq!(
            interface.user_message(),
            "The service is temporarily unavailable. Please retry shortly."
        );
    }

    #[test]
    fn persistence_error_maps_to_internal() {
        let interface = ApplicationError::Persistence("database lock timeout".to_owned())
            .into_interface("req-5");

        assert!(matches!(interface, InterfaceError::Internal { .. }));
        assert_eq!(interface.user_message(), "An unexpected internal error occurred.");
    }
}
