pub mod audit;
pub mod collaborators;
pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod man_days;
pub mod offers;
pub mod orders;
pub mod service;
pub mod store;
pub mod validation;

pub use collaborators::{
    AgreementCatalog, AgreementCombination, AgreementTerms, Candidate, CandidateQuery,
    CandidateSource, StaticAgreementCatalog, StaticCandidateSource, UpstreamError,
};
pub use domain::actor::{Actor, ActorRole};
pub use domain::offer::{EmployeeProfile, MemberKey, Offer, OfferId, OfferStatus, SelectionKey};
pub use domain::order::{Order, OrderId, OrderStatus};
pub use domain::request::{
    CycleStatus, LocationType, MemberSlot, NotificationLog, RequestSpec, RequestStatus,
    RequestType, ServiceRequest, ServiceRequestId, SlotKey,
};
pub use errors::{ApplicationError, DomainError, ErrorKind, InterfaceError};
pub use flows::{FlowContext, FlowEngine, FlowTransitionError, RequestAction, TransitionOutcome};
pub use offers::{GenerationReport, OfferGenerationEngine, OfferSelectionLedger, Readiness};
pub use orders::OrderAssembler;
pub use service::{CallContext, WorkflowService, WorkflowSettings};
pub use store::{RequestFilter, StoreError, WorkflowCommit, WorkflowStore};
pub use validation::{RequestSpecValidator, SpecViolation};
