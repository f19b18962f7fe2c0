use thiserror::Error;

use wareflow_core::{DomainError, UserId};

use crate::{Actor, Role};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: step requires role '{required}', actor has '{actual}'")]
    RoleMismatch { required: Role, actual: Role },

    #[error("forbidden: actor does not own this requisition")]
    NotOwner,
}

impl From<AuthzError> for DomainError {
    fn from(value: AuthzError) -> Self {
        DomainError::permission(value.to_string())
    }
}

/// Check that `actor` may act where `required` is expected.
///
/// `admin` passes every check.
pub fn authorize_role(actor: &Actor, required: &Role) -> Result<(), AuthzError> {
    if actor.is_admin() || &actor.role == required {
        Ok(())
    } else {
        Err(AuthzError::RoleMismatch {
            required: required.clone(),
            actual: actor.role.clone(),
        })
    }
}

/// Check that `actor` is the owner of a resource. No admin bypass.
pub fn ensure_owner(actor: &Actor, owner: UserId) -> Result<(), AuthzError> {
    if actor.id == owner {
        Ok(())
    } else {
        Err(AuthzError::NotOwner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actor(role: &'static str) -> Actor {
        Actor::new(UserId::new(), role)
    }

    #[test]
    fn matching_role_is_allowed() {
        assert!(authorize_role(&actor("manager"), &Role::MANAGER).is_ok());
    }

    #[test]
    fn admin_bypasses_role_check() {
        assert!(authorize_role(&actor("admin"), &Role::new("finance")).is_ok());
    }

    #[test]
    fn other_roles_are_rejected_with_both_roles_named() {
        let err = authorize_role(&actor("user"), &Role::MANAGER).unwrap_err();
        assert_eq!(
            err.to_string(),
            "forbidden: step requires role 'manager', actor has 'user'"
        );
        assert!(matches!(DomainError::from(err), DomainError::Permission(_)));
    }

    #[test]
    fn ownership_has_no_admin_bypass() {
        let admin = actor("admin");
        assert_eq!(ensure_owner(&admin, UserId::new()), Err(AuthzError::NotOwner));
        assert!(ensure_owner(&admin, admin.id).is_ok());
    }
}
