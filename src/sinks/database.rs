use super::{Sink, SinkError, SinkOutcome};
use crate::models::{ChangeRecord, ConfigSnapshot, Destination, DestinationConfig, Operation};
use camino::{Utf8Path, Utf8PathBuf};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, params};

const TABLE: &str = "config_log";

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS config_log (
    cid INTEGER PRIMARY KEY AUTOINCREMENT,
    uid TEXT NOT NULL,
    operation TEXT NOT NULL,
    name TEXT NOT NULL,
    old_name TEXT,
    data TEXT,
    originalData TEXT,
    created INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS config_log_name ON config_log (name);
CREATE INDEX IF NOT EXISTS config_log_created ON config_log (created);
";

/// A row of the `config_log` table.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    /// Assigned by the store; zero for rows not yet written
    pub id: i64,
    pub actor_id: String,
    pub operation: Operation,
    pub name: String,
    pub old_name: Option<String>,
    /// YAML of the configuration after the change
    pub data: Option<String>,
    /// YAML of the configuration before the change
    pub original_data: Option<String>,
    pub created: i64,
}

impl StoredRecord {
    /// Build the row persisted for a change record.
    ///
    /// Deletes keep no data; imports carry no snapshots and so no data either.
    pub fn from_record(record: &ChangeRecord) -> Result<Self, SinkError> {
        let encode = |snapshot: &Option<ConfigSnapshot>| -> Result<Option<String>, SinkError> {
            Ok(snapshot.as_ref().map(|s| s.encode()).transpose()?)
        };

        let (data, original_data) = match record.operation {
            Operation::Delete => (None, None),
            _ => (encode(&record.after)?, encode(&record.before)?),
        };

        Ok(Self {
            id: 0,
            actor_id: record.actor_id.clone(),
            operation: record.operation,
            name: record.subject_name.clone(),
            old_name: record.old_name.clone(),
            data,
            original_data,
            created: record.timestamp,
        })
    }
}

/// Persistence facility for the structured destination.
#[cfg_attr(test, mockall::automock)]
pub trait RecordStore {
    /// Whether the backing table is provisioned.
    fn table_exists(&self) -> Result<bool, SinkError>;

    /// Write one row, returning its id.
    fn insert(&self, record: &StoredRecord) -> Result<i64, SinkError>;
}

/// SQLite-backed `config_log` table.
pub struct SqliteRecordStore {
    conn: Connection,
}

impl SqliteRecordStore {
    /// Open (or create) the database file. The table is not created; call
    /// [`install`](Self::install) for that.
    pub fn open(path: &Utf8Path) -> Result<Self, SinkError> {
        let conn = Connection::open(path.as_std_path())?;
        tracing::debug!("Opened config log database at {}", path);
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, SinkError> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }

    /// Create the `config_log` table and its indexes.
    pub fn install(&self) -> Result<(), SinkError> {
        self.conn.execute_batch(SCHEMA)?;
        tracing::info!("Installed {} table", TABLE);
        Ok(())
    }

    /// Drop the `config_log` table. Later writes are skipped.
    pub fn uninstall(&self) -> Result<(), SinkError> {
        self.conn.execute_batch("DROP TABLE IF EXISTS config_log;")?;
        tracing::info!("Removed {} table", TABLE);
        Ok(())
    }

    /// Most recent rows first.
    pub fn recent(&self, limit: usize) -> Result<Vec<StoredRecord>, SinkError> {
        let mut stmt = self.conn.prepare(
            "SELECT cid, uid, operation, name, old_name, data, originalData, created
             FROM config_log ORDER BY cid DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit as i64], row_to_record)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn get(&self, id: i64) -> Result<Option<StoredRecord>, SinkError> {
        let record = self
            .conn
            .query_row(
                "SELECT cid, uid, operation, name, old_name, data, originalData, created
                 FROM config_log WHERE cid = ?1",
                params![id],
                row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    pub fn count(&self) -> Result<i64, SinkError> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM config_log", [], |row| row.get(0))?)
    }
}

/// A structured store that may have failed to open.
///
/// The command line front end opens the database per event. When that fails
/// the structured destination is skipped for the event while the other
/// destinations still run.
pub enum StoreHandle {
    Open(SqliteRecordStore),
    Unavailable { path: Utf8PathBuf, reason: String },
}

impl StoreHandle {
    pub fn open(path: &Utf8Path) -> Self {
        match SqliteRecordStore::open(path) {
            Ok(store) => StoreHandle::Open(store),
            Err(e) => {
                tracing::warn!("Config log database at {} is unavailable: {}", path, e);
                StoreHandle::Unavailable {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                }
            }
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, StoreHandle::Open(_))
    }
}

impl RecordStore for StoreHandle {
    fn table_exists(&self) -> Result<bool, SinkError> {
        match self {
            StoreHandle::Open(store) => store.table_exists(),
            StoreHandle::Unavailable { .. } => Ok(false),
        }
    }

    fn insert(&self, record: &StoredRecord) -> Result<i64, SinkError> {
        match self {
            StoreHandle::Open(store) => store.insert(record),
            StoreHandle::Unavailable { path, reason } => Err(SinkError::Unavailable {
                path: path.to_string(),
                reason: reason.clone(),
            }),
        }
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredRecord> {
    let operation: String = row.get(2)?;
    let operation = operation
        .parse::<Operation>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, e.into()))?;

    Ok(StoredRecord {
        id: row.get(0)?,
        actor_id: row.get(1)?,
        operation,
        name: row.get(3)?,
        old_name: row.get(4)?,
        data: row.get(5)?,
        original_data: row.get(6)?,
        created: row.get(7)?,
    })
}

impl RecordStore for SqliteRecordStore {
    fn table_exists(&self) -> Result<bool, SinkError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![TABLE],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn insert(&self, record: &StoredRecord) -> Result<i64, SinkError> {
        self.conn.execute(
            "INSERT INTO config_log (uid, operation, name, old_name, data, originalData, created)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.actor_id,
                record.operation.as_str(),
                record.name,
                record.old_name,
                record.data,
                record.original_data,
                record.created,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }
}

/// Writes one row per change record.
pub struct StructuredSink<S: RecordStore> {
    store: S,
}

impl<S: RecordStore> StructuredSink<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S: RecordStore> Sink for StructuredSink<S> {
    fn destination(&self) -> Destination {
        Destination::Structured
    }

    fn handle(
        &self,
        record: &ChangeRecord,
        _settings: &DestinationConfig,
    ) -> Result<SinkOutcome, SinkError> {
        // The table disappears before the last events of an uninstall run.
        if !self.store.table_exists()? {
            tracing::debug!(
                "Skipping {} of {}: {} table is not installed",
                record.operation,
                record.subject_name,
                TABLE
            );
            return Ok(SinkOutcome::Skipped);
        }

        let row = StoredRecord::from_record(record)?;
        let id = self.store.insert(&row)?;
        tracing::debug!(
            "Stored {} of {} as config log entry {}",
            record.operation,
            record.subject_name,
            id
        );
        Ok(SinkOutcome::Delivered)
    }
}
