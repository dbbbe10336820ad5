// =============================================================================
// Quantum5ocial Backend Constants
// =============================================================================
// Tunables used across the backend, kept in one place.

// =============================================================================
// SERVER
// =============================================================================

/// Port the HTTP server binds to when PORT is unset
pub const DEFAULT_SERVER_PORT: u16 = 8080;

/// Header carrying the authenticated viewer's user id
pub const VIEWER_ID_HEADER: &str = "x-viewer-id";

/// Upper bound on ids accepted by the bulk status endpoint
pub const MAX_STATUS_BATCH: usize = 500;

// =============================================================================
// DATABASE
// =============================================================================

/// Pool size when DB_MAX_CONNECTIONS is unset
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;

/// Pool size for one-off maintenance binaries
pub const MAINTENANCE_DB_MAX_CONNECTIONS: u32 = 2;

/// How long to wait for a pooled connection
pub const DEFAULT_DB_ACQUIRE_TIMEOUT_SECS: u64 = 5;

// =============================================================================
// LOGGING
// =============================================================================

/// Filter used when RUST_LOG is unset
pub const DEFAULT_LOG_FILTER: &str =
    "quantum5ocial=info,tower_http=debug,server=debug,audit_connections=info";
