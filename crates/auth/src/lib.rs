//! `wareflow-auth`: identity boundary consumed by the workflow engine.
//!
//! Authentication happens elsewhere; this crate only models the resolved actor
//! `{id, role}` and the pure role/ownership checks. No IO, no storage.

pub mod authorize;
pub mod principal;
pub mod roles;

pub use authorize::{AuthzError, authorize_role, ensure_owner};
pub use principal::Actor;
pub use roles::Role;
