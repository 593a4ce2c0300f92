//! `stockflow-auth`: pure authorization boundary for stock move transitions.
//!
//! This crate is intentionally decoupled from HTTP and storage: the gate
//! answers "may this actor perform this action on a move anchored in this
//! branch?" from plain values only.

pub mod actions;
pub mod authorize;
pub mod claims;
pub mod principal;
pub mod roles;

pub use actions::MoveAction;
pub use authorize::{
    AuthorizationDecision, AuthzError, DenialKind, TransitionRequest, authorize_transition,
    can_transition, explain_transition,
};
pub use claims::{Hs256JwtValidator, JwtClaims, JwtValidator, TokenValidationError, validate_claims};
pub use principal::Actor;
pub use roles::Role;
