//! Service layer
//!
//! Contains business logic separated from HTTP handlers.

mod identity;

pub use identity::{IdentityService, mask_email};
