//! Application configuration constants
//!
//! Central location for default values, resource limits and validation
//! boundaries. Runtime-tunable values live in `services::settings` and are
//! checked against the bounds declared here.

// ===== Data Directory Layout =====

/// Environment variable that overrides the data directory
pub const DATA_DIR_ENV: &str = "PICDECK_DATA_DIR";
/// SQLite database file inside the data directory
pub const DATABASE_FILENAME: &str = "picdeck.sqlite";
/// Blob directory inside the data directory
pub const BLOBS_DIRNAME: &str = "blobs";
/// Staging directory inside the blob directory; staged blobs are never served
pub const STAGING_DIRNAME: &str = ".staging";
/// Settings file inside the data directory
pub const SETTINGS_FILENAME: &str = "settings.json";

// ===== Sampling =====

/// Number of most-recently-added matching pictures considered "fresh"
pub const RECENT_WINDOW: i64 = 50;
/// Smallest accepted recent window
pub const MIN_RECENT_WINDOW: i64 = 1;
/// Largest accepted recent window
pub const MAX_RECENT_WINDOW: i64 = 10_000;

/// Batch size used when a request does not name one
pub const DEFAULT_BATCH_LIMIT: i64 = 10;
/// Requests asking for more than this are clamped
pub const MAX_BATCH_LIMIT: i64 = 100;

// ===== Uploads =====

/// Maximum length kept from a declared upload name
pub const MAX_FILENAME_LENGTH: usize = 255;
/// Longest extension accepted when finalizing a blob
pub const MAX_EXTENSION_LENGTH: usize = 16;

// ===== Reconciliation =====

/// Unreferenced blobs younger than this are left alone (1 hour)
pub const DEFAULT_ORPHAN_GRACE_SECS: u64 = 3_600;
/// Shortest grace period accepted; anything below races in-flight creates
pub const MIN_ORPHAN_GRACE_SECS: u64 = 60;
/// Longest grace period accepted (one year)
pub const MAX_ORPHAN_GRACE_SECS: u64 = 365 * 24 * 3_600;
/// Default sweep frequency
pub const DEFAULT_SWEEP_FREQUENCY: &str = "6h";
