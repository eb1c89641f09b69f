use super::value::ConfigSnapshot;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Operation recorded for a configuration object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Update,
    Delete,
    Rename,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
            Operation::Rename => "rename",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Operation::Create),
            "update" => Ok(Operation::Update),
            "delete" => Ok(Operation::Delete),
            "rename" => Ok(Operation::Rename),
            other => Err(format!("unknown operation: {}", other)),
        }
    }
}

/// A single scalar-level difference between two snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafChange {
    /// Dotted path relative to the configuration object, e.g. `page.404`
    pub path: String,
    pub old_value: String,
    pub new_value: String,
}

impl LeafChange {
    pub fn new(
        path: impl Into<String>,
        old_value: impl Into<String>,
        new_value: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            old_value: old_value.into(),
            new_value: new_value.into(),
        }
    }
}

/// One approved change event, handed to every enabled sink.
///
/// Records are built only after the destination policy approved the subject
/// and operation, and are never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeRecord {
    pub subject_name: String,
    pub operation: Operation,
    pub leaf_changes: Vec<LeafChange>,
    /// Previous name, set for renames only
    pub old_name: Option<String>,
    pub actor_id: String,
    /// Epoch seconds
    pub timestamp: i64,
    pub before: Option<ConfigSnapshot>,
    pub after: Option<ConfigSnapshot>,
}

impl ChangeRecord {
    pub fn has_changes(&self) -> bool {
        !self.leaf_changes.is_empty()
    }

    /// Records expanded from an import changelist carry names only.
    pub fn from_import(&self) -> bool {
        self.before.is_none() && self.after.is_none()
    }

    /// Full dotted key of a leaf change, prefixed with the subject name.
    pub fn full_key(&self, change: &LeafChange) -> String {
        format!("{}.{}", self.subject_name, change.path)
    }
}

/// Configuration names touched by an import, grouped by operation.
pub type Changelist = IndexMap<Operation, Vec<String>>;

/// Change notification raised by the configuration system.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigEvent {
    /// An object was written. `before` is `None` for newly created objects.
    Save {
        name: String,
        before: Option<ConfigSnapshot>,
        after: ConfigSnapshot,
    },
    Delete {
        name: String,
        before: ConfigSnapshot,
    },
    Rename {
        old_name: String,
        name: String,
        before: ConfigSnapshot,
        after: ConfigSnapshot,
    },
    /// A bulk import finished; only names and operations are known.
    Import { changelist: Changelist },
}

impl ConfigEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ConfigEvent::Save { .. } => EventKind::Save,
            ConfigEvent::Delete { .. } => EventKind::Delete,
            ConfigEvent::Rename { .. } => EventKind::Rename,
            ConfigEvent::Import { .. } => EventKind::Import,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Save,
    Delete,
    Rename,
    Import,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventKind::Save => "save",
            EventKind::Delete => "delete",
            EventKind::Rename => "rename",
            EventKind::Import => "import",
        };
        f.write_str(name)
    }
}

/// Request-scoped facts about who raised an event and how.
///
/// `importing` replaces a flag that would otherwise be set by an import
/// validation step and read later during save handling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventContext {
    pub actor_id: String,
    /// Epoch seconds
    pub timestamp: i64,
    pub importing: bool,
}

impl EventContext {
    pub fn new(actor_id: impl Into<String>, timestamp: i64) -> Self {
        Self {
            actor_id: actor_id.into(),
            timestamp,
            importing: false,
        }
    }

    /// Context for an event raised by the current wall clock.
    pub fn now(actor_id: impl Into<String>) -> Self {
        Self::new(actor_id, chrono::Utc::now().timestamp())
    }

    /// Mark the event as part of a bulk import.
    pub fn importing(mut self) -> Self {
        self.importing = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_round_trips_through_str() {
        for op in [
            Operation::Create,
            Operation::Update,
            Operation::Delete,
            Operation::Rename,
        ] {
            assert_eq!(op.as_str().parse::<Operation>().unwrap(), op);
        }
        assert!("purge".parse::<Operation>().is_err());
    }

    #[test]
    fn test_full_key() {
        let record = ChangeRecord {
            subject_name: "system.site".to_string(),
            operation: Operation::Update,
            leaf_changes: vec![LeafChange::new("page.404", "/404", "/fourohfour")],
            old_name: None,
            actor_id: "1".to_string(),
            timestamp: 0,
            before: None,
            after: None,
        };
        assert_eq!(
            record.full_key(&record.leaf_changes[0]),
            "system.site.page.404"
        );
        assert!(record.has_changes());
    }

    #[test]
    fn test_from_import() {
        let imported = ChangeRecord {
            subject_name: "system.site".to_string(),
            operation: Operation::Update,
            leaf_changes: Vec::new(),
            old_name: None,
            actor_id: "1".to_string(),
            timestamp: 0,
            before: None,
            after: None,
        };
        assert!(imported.from_import());

        let created = ChangeRecord {
            after: Some(ConfigSnapshot::default()),
            ..imported
        };
        assert!(!created.from_import());
    }

    #[test]
    fn test_importing_context() {
        let ctx = EventContext::new("1", 10).importing();
        assert!(ctx.importing);
        assert_eq!(ctx.actor_id, "1");
    }
}
