//! API-side authorization guard.
//!
//! Roles are resolved here, at the HTTP boundary. The services below only ever
//! see a requester scope or an `ApprovalGrant`.

use procura_auth::{AuthzError, Permission, authorize};
use procura_infra::store::RequestScope;
use procura_procurement::ApprovalGrant;

use crate::context::PrincipalContext;

pub fn require(principal: &PrincipalContext, permission: &Permission) -> Result<(), AuthzError> {
    authorize(&principal.principal(), permission)
}

/// Which requests this caller may read.
pub fn request_scope(principal: &PrincipalContext) -> RequestScope {
    if principal.principal().has(&Permission::VIEW_ALL_REQUESTS) {
        RequestScope::All
    } else {
        RequestScope::OwnedBy(principal.user_id())
    }
}

/// Confirm the caller may decide requests and hand back the grant the
/// approval engine expects.
pub fn approval_grant(principal: &PrincipalContext) -> Result<ApprovalGrant, AuthzError> {
    require(principal, &Permission::DECIDE_REQUEST)?;
    Ok(ApprovalGrant::confirmed(principal.user_id()))
}
