//! API constants
//!
//! Every route lives under [`API_PREFIX`]; handler path annotations use the same literal.

/// API base path prefix (version-independent)
pub const API_BASE: &str = "/api";

pub const API_VERSION: &str = "v0";

pub const API_PREFIX: &str = "/api/v0";

/// Trusted owner identity set by the upstream auth layer
pub const OWNER_ID_HEADER: &str = "x-owner-id";

/// Shared secret presented by the processing service on status callbacks
pub const SERVICE_KEY_HEADER: &str = "x-service-key";
