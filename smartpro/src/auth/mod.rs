//! Boundaries to the authentication service and the profile store
//!
//! Both are external collaborators consumed as black boxes; the traits here
//! are the only surface the session and role layers depend on.

pub mod profile;
pub mod provider;

pub use profile::{ProfileStore, Role};
pub use provider::{AuthContext, AuthProvider, Session, User};
