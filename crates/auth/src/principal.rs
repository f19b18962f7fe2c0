use serde::{Deserialize, Serialize};

use wareflow_core::UserId;

use crate::Role;

/// The resolved identity of the caller for one request.
///
/// Supplied by the identity collaborator; the engine never authenticates.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Actor {
    pub id: UserId,
    pub role: Role,
}

impl Actor {
    pub fn new(id: UserId, role: impl Into<Role>) -> Self {
        Self {
            id,
            role: role.into(),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}

impl core::fmt::Display for Actor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} ({})", self.id, self.role)
    }
}
