//! Session lifecycle domain.
//!
//! # Module Structure
//!
//! - `lifecycle`: the [`SessionLifecycleManager`] owning the live record
//! - `patch`: shallow merge patches for `update_session`
//! - `validation`: record validation and the restore decision

mod lifecycle;
mod patch;
mod validation;

pub use lifecycle::SessionLifecycleManager;
pub use patch::SessionPatch;
pub use validation::{validate_session, ValidationReport};
