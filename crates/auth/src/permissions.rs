use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::roles::Role;

/// Permission identifier checked at the command/query boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub const CREATE_REQUEST: Permission = Permission(Cow::Borrowed("procurement.request.create"));
    pub const DECIDE_REQUEST: Permission = Permission(Cow::Borrowed("procurement.request.decide"));
    /// Lift the "own requests only" restriction on reads.
    pub const VIEW_ALL_REQUESTS: Permission =
        Permission(Cow::Borrowed("procurement.request.view_all"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Static role → permission policy.
pub fn permissions_for(role: &Role) -> &'static [Permission] {
    const ADMIN: &[Permission] = &[Permission::CREATE_REQUEST];
    const SUPER_ADMIN: &[Permission] = &[Permission::DECIDE_REQUEST, Permission::VIEW_ALL_REQUESTS];

    match role.as_str() {
        "admin" => ADMIN,
        "super_admin" => SUPER_ADMIN,
        _ => &[],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_creates_but_cannot_decide() {
        let perms = permissions_for(&Role::ADMIN);
        assert!(perms.contains(&Permission::CREATE_REQUEST));
        assert!(!perms.contains(&Permission::DECIDE_REQUEST));
        assert!(!perms.contains(&Permission::VIEW_ALL_REQUESTS));
    }

    #[test]
    fn super_admin_decides_and_sees_everything() {
        let perms = permissions_for(&Role::SUPER_ADMIN);
        assert!(perms.contains(&Permission::DECIDE_REQUEST));
        assert!(perms.contains(&Permission::VIEW_ALL_REQUESTS));
        assert!(!perms.contains(&Permission::CREATE_REQUEST));
    }

    #[test]
    fn unknown_roles_grant_nothing() {
        assert!(permissions_for(&Role::new("viewer")).is_empty());
    }
}
