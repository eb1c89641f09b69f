//! Sinks - independent consumers of approved change records.
//!
//! Each sink produces one kind of side effect for a [`ChangeRecord`]:
//!
//! - [`StructuredSink`]: one row per record in the `config_log` SQLite table
//!   (skipped silently when the table is not installed)
//! - [`TextSink`]: one log line per leaf change, or a summary line for
//!   create/delete/rename records without leaf changes
//! - [`NotifySink`]: one message per record with leaf changes, sent to the
//!   configured address
//!
//! Sinks never see records the destination policy rejected, and a failing
//! sink never stops its siblings: the [`Dispatcher`](crate::dispatch::Dispatcher)
//! logs the [`SinkError`] and moves on.

pub mod database;
pub mod mail;
pub mod text;

use crate::models::{ChangeRecord, Destination, DestinationConfig};
use thiserror::Error;

pub use database::{RecordStore, SqliteRecordStore, StoreHandle, StoredRecord, StructuredSink};
pub use mail::{Mailer, Message, NotifySink, SpoolMailer, format_notification_time};
pub use text::{LogWriter, TextSink, TracingWriter};

/// Errors a sink can report back to the dispatcher
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Failed to encode snapshot: {0}")]
    Encode(#[from] serde_yaml_ng::Error),

    #[error("Delivery to {to} failed: {reason}")]
    Delivery { to: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store at {path} is unavailable: {reason}")]
    Unavailable { path: String, reason: String },
}

/// What a sink did with a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkOutcome {
    /// The side effect happened
    Delivered,
    /// Nothing to do for this record (no address, no lines, no table)
    Skipped,
}

/// A consumer of change records producing one external side effect.
pub trait Sink {
    /// The destination toggle controlling this sink.
    fn destination(&self) -> Destination;

    /// Perform the side effect for one record, under the settings read for
    /// the current event.
    fn handle(
        &self,
        record: &ChangeRecord,
        settings: &DestinationConfig,
    ) -> Result<SinkOutcome, SinkError>;
}
