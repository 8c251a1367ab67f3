use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Role identifier carried in tokens.
///
/// Roles stay opaque strings at this layer; [`crate::permissions`] maps the
/// two roles the workflow knows about to permissions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

impl Role {
    /// Raises procurement requests.
    pub const ADMIN: Role = Role(Cow::Borrowed("admin"));
    /// Decides requests and sees every requester's rows.
    pub const SUPER_ADMIN: Role = Role(Cow::Borrowed("super_admin"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
