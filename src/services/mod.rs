//! Services module - Pure logic for turning snapshots into change reports.
//!
//! Nothing here performs I/O. The sinks and the dispatcher build on these
//! pieces.
//!
//! # Components
//!
//! - [`differ`]: Flattens two [`ConfigSnapshot`](crate::models::ConfigSnapshot)s
//!   into an ordered list of [`LeafChange`](crate::models::LeafChange)s keyed by
//!   dotted path, and formats leaf values (`NULL`, `<empty string>`,
//!   `TRUE`/`FALSE`).
//!
//! - [`policy`]: [`DestinationPolicy`] compiles the glob ignore list and
//!   answers whether an event should be logged at all:
//!   - import suppression
//!   - ignore list with optional negation (allow-list mode)
//!   - unchanged-save suppression, comparing canonical YAML encodings
//!
//! - [`line_diff`]: Side-by-side line diff of two stored YAML documents, used
//!   when browsing the structured log. Long diffs are collapsed.
//!
//! # Usage Example
//!
//! ```ignore
//! use config_log::services::{differ, DestinationPolicy};
//!
//! let policy = DestinationPolicy::new(&settings);
//! if policy.should_log("system.site", Operation::Update, &context) {
//!     for change in differ::diff(&before, &after) {
//!         println!("{}: {} -> {}", change.path, change.old_value, change.new_value);
//!     }
//! }
//! ```

pub mod differ;
pub mod line_diff;
pub mod policy;

pub use differ::{diff, format_value};
pub use line_diff::{DiffCell, DiffRender, DiffRow, render_diff, render_field};
pub use policy::{DestinationPolicy, PolicyError, compile_glob, glob_to_regex, is_changed};
