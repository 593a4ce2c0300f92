use serde::{Deserialize, Serialize};

use stockflow_core::{BranchId, UserId};

use crate::Role;

/// The acting user for one request.
///
/// Built per request from verified token claims and passed explicitly into
/// every core operation; nothing about the actor is held process-wide.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    pub branch_id: BranchId,
    pub roles: Vec<Role>,
}

impl Actor {
    pub fn new(user_id: UserId, branch_id: BranchId, roles: Vec<Role>) -> Self {
        Self {
            user_id,
            branch_id,
            roles,
        }
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }
}
