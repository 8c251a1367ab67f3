//! `procura-auth`: authentication and authorization boundary.
//!
//! Decides *who* is calling and *what* they may do. The procurement core never
//! sees roles: callers check a [`Permission`] here and hand the domain an
//! already-confirmed grant.

pub mod authorize;
pub mod claims;
pub mod jwt;
pub mod permissions;
pub mod roles;

pub use authorize::{authorize, AuthzError, Principal};
pub use claims::{JwtClaims, TokenValidationError, validate_claims};
pub use jwt::{Hs256JwtValidator, JwtValidator};
pub use permissions::Permission;
pub use roles::Role;
