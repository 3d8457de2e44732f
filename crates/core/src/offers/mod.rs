pub mod generation;
pub mod ledger;

pub use generation::{
    GenerationError, GenerationReport, MemberStatus, OfferGenerationEngine,
    DEFAULT_CANDIDATE_TIMEOUT_SECS, DEFAULT_MAX_OFFERS_PER_SLOT,
};
pub use ledger::{readiness, OfferSelectionLedger, Readiness, SelectionChange, SelectionError};
