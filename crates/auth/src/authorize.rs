use serde::Serialize;
use thiserror::Error;

use stockflow_core::{BranchId, UserId};

use crate::{Actor, MoveAction, Role};

/// A transition request, already resolved against the move.
///
/// `branch_id` is the branch owning the move's relevant warehouse (see the
/// move type policy); resolving it requires the warehouse directory and so
/// happens before the gate is consulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionRequest {
    pub action: MoveAction,
    pub creator_id: UserId,
    pub branch_id: BranchId,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: {0}")]
    Forbidden(String),
}

/// Why a request was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialKind {
    MissingRole,
    BranchMismatch,
    NotCreator,
}

/// Auditable outcome of a gate evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthorizationDecision {
    pub action: MoveAction,
    pub granted: bool,
    pub reason: String,
    pub denial: Option<DenialKind>,
}

/// Pure gate check: role/action table, branch membership, creator identity.
pub fn can_transition(actor: &Actor, request: &TransitionRequest) -> bool {
    explain_transition(actor, request).granted
}

/// Like [`can_transition`], but returns `AuthzError` carrying the denial reason.
pub fn authorize_transition(actor: &Actor, request: &TransitionRequest) -> Result<(), AuthzError> {
    let decision = explain_transition(actor, request);
    if decision.granted {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(decision.reason))
    }
}

/// Explain the gate's decision for an actor and a resolved request.
///
/// Checks run in a fixed order (role, branch, creator) so the first failing
/// guard names the denial.
pub fn explain_transition(actor: &Actor, request: &TransitionRequest) -> AuthorizationDecision {
    let action = request.action;
    let allowed = action.allowed_roles();

    if !allowed.iter().any(|r| actor.has_role(*r)) {
        let needed: Vec<&str> = allowed.iter().map(Role::as_str).collect();
        return deny(
            action,
            DenialKind::MissingRole,
            format!("'{action}' requires one of the roles {needed:?}"),
        );
    }

    if actor.branch_id != request.branch_id {
        return deny(
            action,
            DenialKind::BranchMismatch,
            format!(
                "actor belongs to branch {} but the move is anchored in branch {}",
                actor.branch_id, request.branch_id
            ),
        );
    }

    if action.requires_creator() && actor.user_id != request.creator_id {
        return deny(
            action,
            DenialKind::NotCreator,
            format!("only the creator of the move may {action} it"),
        );
    }

    AuthorizationDecision {
        action,
        granted: true,
        reason: format!("'{action}' permitted for branch {}", request.branch_id),
        denial: None,
    }
}

fn deny(action: MoveAction, kind: DenialKind, reason: String) -> AuthorizationDecision {
    AuthorizationDecision {
        action,
        granted: false,
        reason,
        denial: Some(kind),
    }
}
