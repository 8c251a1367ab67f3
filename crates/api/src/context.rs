use procura_auth::{Principal, Role};
use procura_core::UserId;

/// Principal context for a request (authenticated identity + roles).
///
/// Inserted by the auth middleware; every protected handler can rely on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    user_id: UserId,
    name: Option<String>,
    roles: Vec<Role>,
}

impl PrincipalContext {
    pub fn new(user_id: UserId, name: Option<String>, roles: Vec<Role>) -> Self {
        Self {
            user_id,
            name,
            roles,
        }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn roles(&self) -> &[Role] {
        &self.roles
    }

    /// Resolve effective permissions for authorization checks.
    pub fn principal(&self) -> Principal {
        Principal::from_roles(self.user_id, self.roles.clone())
    }
}
