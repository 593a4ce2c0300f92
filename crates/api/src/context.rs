use stockflow_auth::{Actor, Role};
use stockflow_core::{BranchId, UserId};

/// Authenticated actor for a request, derived from the bearer token.
///
/// Present on every protected route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorContext {
    actor: Actor,
}

impl ActorContext {
    pub fn new(actor: Actor) -> Self {
        Self { actor }
    }

    pub fn actor(&self) -> &Actor {
        &self.actor
    }

    pub fn user_id(&self) -> UserId {
        self.actor.user_id
    }

    pub fn branch_id(&self) -> BranchId {
        self.actor.branch_id
    }

    pub fn roles(&self) -> &[Role] {
        &self.actor.roles
    }
}
