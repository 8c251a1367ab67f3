use std::collections::HashSet;

use thiserror::Error;

use procura_core::UserId;

use crate::permissions::permissions_for;
use crate::{Permission, Role};

/// A fully resolved principal for authorization decisions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: UserId,
    pub roles: Vec<Role>,
    pub permissions: HashSet<Permission>,
}

impl Principal {
    /// Resolve effective permissions from the static role policy.
    pub fn from_roles(user_id: UserId, roles: Vec<Role>) -> Self {
        let permissions = roles
            .iter()
            .flat_map(|r| permissions_for(r).iter().cloned())
            .collect();
        Self {
            user_id,
            roles,
            permissions,
        }
    }

    pub fn has(&self, permission: &Permission) -> bool {
        self.permissions.contains(permission)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),
}

/// Pure policy check: no IO, no panics.
pub fn authorize(principal: &Principal, required: &Permission) -> Result<(), AuthzError> {
    if principal.has(required) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authorize_checks_resolved_permissions() {
        let admin = Principal::from_roles(UserId::new(), vec![Role::ADMIN]);
        assert!(authorize(&admin, &Permission::CREATE_REQUEST).is_ok());
        assert_eq!(
            authorize(&admin, &Permission::DECIDE_REQUEST),
            Err(AuthzError::Forbidden("procurement.request.decide".to_string()))
        );
    }

    #[test]
    fn multiple_roles_accumulate() {
        let both = Principal::from_roles(UserId::new(), vec![Role::ADMIN, Role::SUPER_ADMIN]);
        assert!(both.has(&Permission::CREATE_REQUEST));
        assert!(both.has(&Permission::DECIDE_REQUEST));
    }
}
