// Dispatch module
//
// Routes configuration change events through the destination policy, builds
// change records, and hands them to every enabled sink in registration order.

use crate::metrics::Metrics;
use crate::models::{
    ChangeRecord, ConfigEvent, ConfigSnapshot, DestinationConfig, EventContext, LeafChange,
    Operation,
};
use crate::services::differ;
use crate::services::policy::{DestinationPolicy, PolicyError};
use crate::sinks::{
    LogWriter, Mailer, NotifySink, RecordStore, Sink, SinkOutcome, StructuredSink, TextSink,
};
use std::sync::Arc;
use thiserror::Error;

/// Errors that abort handling of an event.
///
/// Only contract violations end up here; sink failures are logged and
/// counted in the [`DispatchReport`] instead.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error(transparent)]
    Policy(#[from] PolicyError),
}

/// What happened to one event.
#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    /// Records built for the event, in the order sinks saw them
    pub records: Vec<ChangeRecord>,
    /// Sink invocations across all records
    pub invocations: usize,
    /// Invocations where the sink had nothing to do
    pub skipped: usize,
    /// Invocations that returned an error
    pub failures: usize,
}

impl DispatchReport {
    /// True when the policy dropped the event entirely.
    pub fn is_suppressed(&self) -> bool {
        self.records.is_empty()
    }
}

/// Event dispatcher
///
/// Holds the registered sinks in priority order. The default order used by
/// the command line front end is structured, text, notify. Settings are
/// passed to [`dispatch`](Self::dispatch) for every event so changes to
/// them apply immediately.
pub struct Dispatcher {
    sinks: Vec<Box<dyn Sink>>,
    metrics: Arc<Metrics>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::with_metrics(Arc::new(Metrics::new()))
    }

    pub fn with_metrics(metrics: Arc<Metrics>) -> Self {
        Self {
            sinks: Vec::new(),
            metrics,
        }
    }

    /// Dispatcher with the structured, text and notify sinks, in that order.
    pub fn standard<S, W, M>(store: S, writer: W, mailer: M, site_name: &str) -> Self
    where
        S: RecordStore + 'static,
        W: LogWriter + 'static,
        M: Mailer + 'static,
    {
        Self::new()
            .with_sink(Box::new(StructuredSink::new(store)))
            .with_sink(Box::new(TextSink::new(writer)))
            .with_sink(Box::new(NotifySink::new(mailer, site_name)))
    }

    /// Register a sink after the ones already registered.
    pub fn register(&mut self, sink: Box<dyn Sink>) -> &mut Self {
        tracing::debug!("Registered {} destination", sink.destination());
        self.sinks.push(sink);
        self
    }

    pub fn with_sink(mut self, sink: Box<dyn Sink>) -> Self {
        self.register(sink);
        self
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Handle one change event.
    ///
    /// # Errors
    ///
    /// Fails only when a snapshot cannot be encoded for the unchanged check.
    /// Ignore patterns that do not compile match nothing, and sink errors
    /// never propagate.
    pub fn dispatch(
        &self,
        event: &ConfigEvent,
        context: &EventContext,
        settings: &DestinationConfig,
    ) -> Result<DispatchReport, DispatchError> {
        self.metrics.record_event();
        let policy = DestinationPolicy::new(settings);

        let records = build_records(event, context, &policy)?;
        if records.is_empty() {
            tracing::debug!("{} event suppressed by policy", event.kind());
            self.metrics.record_suppressed();
            return Ok(DispatchReport::default());
        }

        let mut report = DispatchReport::default();
        for record in records {
            self.metrics.record_built();
            for sink in &self.sinks {
                let destination = sink.destination();
                if !policy.is_enabled(destination) {
                    continue;
                }

                report.invocations += 1;
                match sink.handle(&record, settings) {
                    Ok(SinkOutcome::Delivered) => self.metrics.record_delivery(destination),
                    Ok(SinkOutcome::Skipped) => {
                        report.skipped += 1;
                        self.metrics.record_skipped();
                    }
                    Err(e) => {
                        report.failures += 1;
                        self.metrics.record_failure();
                        tracing::warn!(
                            "{} destination failed for {} of {}: {}",
                            destination,
                            record.operation,
                            record.subject_name,
                            e
                        );
                    }
                }
            }
            report.records.push(record);
        }

        Ok(report)
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Turn an event into the records the policy approves.
fn build_records(
    event: &ConfigEvent,
    context: &EventContext,
    policy: &DestinationPolicy<'_>,
) -> Result<Vec<ChangeRecord>, PolicyError> {
    let record = |name: &str,
                  operation: Operation,
                  leaf_changes: Vec<LeafChange>,
                  old_name: Option<&String>,
                  before: Option<&ConfigSnapshot>,
                  after: Option<&ConfigSnapshot>| ChangeRecord {
        subject_name: name.to_string(),
        operation,
        leaf_changes,
        old_name: old_name.cloned(),
        actor_id: context.actor_id.clone(),
        timestamp: context.timestamp,
        before: before.cloned(),
        after: after.cloned(),
    };

    match event {
        ConfigEvent::Save {
            name,
            before,
            after,
        } => {
            let operation = if before.is_some() {
                Operation::Update
            } else {
                Operation::Create
            };
            if !policy.should_log(name, operation, context) {
                return Ok(Vec::new());
            }

            let empty = ConfigSnapshot::default();
            let previous = before.as_ref().unwrap_or(&empty);
            if operation == Operation::Update && !policy.should_log_unchanged(previous, after)? {
                tracing::debug!("Skipping update of {}: no changes", name);
                return Ok(Vec::new());
            }

            let changes = differ::diff(previous, after);
            Ok(vec![record(
                name,
                operation,
                changes,
                None,
                before.as_ref(),
                Some(after),
            )])
        }
        ConfigEvent::Delete { name, before } => {
            if !policy.should_log(name, Operation::Delete, context) {
                return Ok(Vec::new());
            }
            Ok(vec![record(
                name,
                Operation::Delete,
                Vec::new(),
                None,
                Some(before),
                None,
            )])
        }
        ConfigEvent::Rename {
            old_name,
            name,
            before,
            after,
        } => {
            if !policy.should_log(name, Operation::Rename, context) {
                return Ok(Vec::new());
            }
            Ok(vec![record(
                name,
                Operation::Rename,
                Vec::new(),
                Some(old_name),
                Some(before),
                Some(after),
            )])
        }
        ConfigEvent::Import { changelist } => {
            // An import batch is an import whatever the caller's context says.
            if policy.is_import_suppressed(&context.clone().importing()) {
                tracing::debug!("Skipping import batch: import logging disabled");
                return Ok(Vec::new());
            }
            Ok(changelist
                .iter()
                .flat_map(|(operation, names)| names.iter().map(move |n| (*operation, n)))
                .filter(|(_, name)| !policy.is_ignored(name))
                .map(|(operation, name)| record(name, operation, Vec::new(), None, None, None))
                .collect())
        }
    }
}
