// config-log - Configuration change audit logging
//
// This is the library crate containing the change pipeline: snapshot diffing,
// destination policy, sinks and the dispatcher tying them together.
// The binary crate (main.rs) provides the command line front end.

pub mod config;
pub mod dispatch;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod services;
pub mod sinks;

// Re-export commonly used types for convenience
pub use config::SettingsManager;
pub use dispatch::{DispatchError, DispatchReport, Dispatcher};
pub use metrics::Metrics;
pub use models::{
    ChangeRecord, ConfigEvent, ConfigSnapshot, Destination, DestinationConfig, EventContext,
    LeafChange, Operation, Settings, Value,
};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
