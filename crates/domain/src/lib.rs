//! OPD Workflow Domain Models

/// Visit aggregate (patient workflow state machine)
pub mod visits;

/// Visit day aggregate (token allocation)
pub mod days;

/// Domain errors
pub mod errors;

/// Domain events wrapper
pub mod event;

pub use errors::Error;
pub use event::DomainEvent;
