//! `felicita-auth`: session and authorization model for the FELICITA client.
//!
//! No HTTP, no storage. This crate decides; `felicita-client` performs IO.

pub mod authorize;
pub mod claims;
pub mod guard;
pub mod permissions;
pub mod roles;
pub mod session;
pub mod user;

pub use authorize::{AuthzError, PermissionMode, authorize, has_permission, has_role};
pub use claims::{TokenClaims, TokenDecodeError, decode_claims, is_expired};
pub use guard::{GuardDecision, PermissionCheck, RouteRequirements, UnauthorizedKind, UnauthorizedView};
pub use permissions::Permission;
pub use roles::Role;
pub use session::{SessionAction, SessionState, SessionStatus, reduce};
pub use user::{ProfileUpdate, User, UserId};
