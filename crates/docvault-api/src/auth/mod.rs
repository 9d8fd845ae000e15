//! Request identity.
//!
//! The pipeline does not authenticate anyone: an upstream layer resolves the caller and
//! forwards the owner id in `X-Owner-Id`. The processing service's status callback is
//! guarded by a shared key instead.

pub mod middleware;
pub mod models;

pub use middleware::{identity_middleware, service_key_middleware};
pub use models::OwnerContext;
