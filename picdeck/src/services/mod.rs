//! Services module
//!
//! Business logic services that coordinate between commands, the record
//! store and the blob store.

pub mod coordinator;
pub mod matches;
pub mod reconcile;
pub mod sampler;
pub mod scheduler;
pub mod settings;

pub use coordinator::{ConsistencyCoordinator, CoordinatorOptions, DeleteReport};
pub use matches::parse_matches;
pub use reconcile::{ReconcileService, SweepReport};
pub use sampler::Sampler;
pub use scheduler::{SchedulerService, SweepFrequency};
pub use settings::{AppSettings, BlobRelease, EmptyTagPolicy, SettingsService};
