//! Data models for config-log.
//!
//! - [`ConfigSnapshot`] and [`Value`]: ordered configuration trees compared by the differ
//! - [`ChangeRecord`] and [`LeafChange`]: what the sinks receive once an event was approved
//! - [`ConfigEvent`] and [`EventContext`]: change notifications and their request-scoped context
//! - [`DestinationConfig`], [`SettingsForm`], [`Settings`]: destination settings and the admin surface
//!
//! All snapshot and settings types derive or implement `Serialize`/`Deserialize`
//! for YAML persistence.

pub mod record;
pub mod settings;
pub mod value;

pub use record::{
    ChangeRecord, Changelist, ConfigEvent, EventContext, EventKind, LeafChange, Operation,
};
pub use settings::{Destination, DestinationConfig, Settings, SettingsForm, split_ignore_list};
pub use value::{ConfigSnapshot, Value};
