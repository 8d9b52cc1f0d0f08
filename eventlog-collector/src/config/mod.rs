//! Configuration: process settings, remote sync, and bootstrap.

mod app;
mod notify;
mod settings;
mod sync;

pub use app::AppConfig;
pub use notify::ConfigNotifier;
pub use settings::{
    AttributeChange, BATCH_SIZE, CONFIG_REFRESH_INTERVAL_MINUTES, CONNECT_TIMEOUT_SECONDS,
    CONTINUOUS_MODE, CYCLE_INTERVAL_SECONDS, CollectorSettings, MAX_BATCH_SIZE,
    MAX_CONCURRENT_TARGETS, MAX_INTERVAL_SECS, QUERY_TIMEOUT_SECONDS,
};
pub use sync::{
    ConfigSyncEngine, DEFAULT_AUTHORITY_TIMEOUT, DEFAULT_NOTIFY_DEBOUNCE, RefreshOutcome,
};

/// The last-applied settings, owned by the sync engine and mutated only
/// through `CollectorSettings::apply_attributes`.
pub type ConfigSnapshot = CollectorSettings;
