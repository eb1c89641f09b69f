use super::{Sink, SinkError, SinkOutcome};
use crate::models::{ChangeRecord, Destination, DestinationConfig, Operation};

/// Text-logging facility used by [`TextSink`].
#[cfg_attr(test, mockall::automock)]
pub trait LogWriter {
    fn write_line(&self, line: &str);
}

/// Writes lines through `tracing` at info level under the `config_log`
/// target, so they land wherever the subscriber sends application logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingWriter;

impl LogWriter for TracingWriter {
    fn write_line(&self, line: &str) {
        tracing::info!(target: "config_log", "{}", line);
    }
}

/// Emits one line per leaf change.
pub struct TextSink<W: LogWriter = TracingWriter> {
    writer: W,
}

impl TextSink<TracingWriter> {
    pub fn tracing() -> Self {
        Self::new(TracingWriter)
    }
}

impl<W: LogWriter> TextSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// The lines a record produces, in order.
    ///
    /// Records without leaf changes get a single summary line, except
    /// saved updates, which have nothing to report. Updates listed by an
    /// import carry no values and still get their summary line.
    pub fn lines(record: &ChangeRecord) -> Vec<String> {
        if record.has_changes() {
            return record
                .leaf_changes
                .iter()
                .map(|change| {
                    format!(
                        "Configuration changed: {} changed from {} to {} at {}",
                        record.full_key(change),
                        change.old_value,
                        change.new_value,
                        record.timestamp
                    )
                })
                .collect();
        }

        match record.operation {
            Operation::Update if !record.from_import() => Vec::new(),
            operation => vec![format!(
                "Configuration {}: {}",
                operation, record.subject_name
            )],
        }
    }
}

impl<W: LogWriter> Sink for TextSink<W> {
    fn destination(&self) -> Destination {
        Destination::Text
    }

    fn handle(
        &self,
        record: &ChangeRecord,
        _settings: &DestinationConfig,
    ) -> Result<SinkOutcome, SinkError> {
        let lines = Self::lines(record);
        if lines.is_empty() {
            return Ok(SinkOutcome::Skipped);
        }
        for line in lines {
            self.writer.write_line(&line);
        }
        Ok(SinkOutcome::Delivered)
    }
}
