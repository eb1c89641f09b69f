use super::{Sink, SinkError, SinkOutcome};
use crate::models::{ChangeRecord, Destination, DestinationConfig};
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Datelike, Utc};
use std::fs;

/// A notification ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Message-delivery facility used by [`NotifySink`].
#[cfg_attr(test, mockall::automock)]
pub trait Mailer {
    fn send(&self, message: &Message) -> Result<(), SinkError>;
}

/// Render an epoch timestamp as `Monday 12th of June 2023 11:08:41 AM` (UTC).
pub fn format_notification_time(timestamp: i64) -> String {
    let Some(time) = DateTime::<Utc>::from_timestamp(timestamp, 0) else {
        return timestamp.to_string();
    };

    let day = time.day();
    let suffix = match (day % 10, day % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    };

    format!(
        "{} {}{} of {}",
        time.format("%A"),
        day,
        suffix,
        time.format("%B %Y %I:%M:%S %p")
    )
}

/// Sends one message per record that changed at least one value.
///
/// Records without leaf changes (deletes, renames, imports) never produce
/// a message, and nothing is sent while no address is configured.
pub struct NotifySink<M: Mailer> {
    mailer: M,
    site_name: String,
}

impl<M: Mailer> NotifySink<M> {
    pub fn new(mailer: M, site_name: impl Into<String>) -> Self {
        Self {
            mailer,
            site_name: site_name.into(),
        }
    }

    pub fn mailer(&self) -> &M {
        &self.mailer
    }

    /// Build the message for a record, or `None` when there is nothing to say.
    pub fn compose(&self, record: &ChangeRecord, to: &str) -> Option<Message> {
        if !record.has_changes() {
            return None;
        }

        let time = format_notification_time(record.timestamp);
        let mut body = format!("User ID: {}", record.actor_id);
        for change in &record.leaf_changes {
            body.push('\n');
            body.push_str(&format!(
                "Configuration changed: {} changed from {} to {} at {}",
                record.full_key(change),
                change.old_value,
                change.new_value,
                time
            ));
        }

        Some(Message {
            to: to.to_string(),
            subject: format!("[{}] Configuration change", self.site_name),
            body,
        })
    }
}

impl<M: Mailer> Sink for NotifySink<M> {
    fn destination(&self) -> Destination {
        Destination::Notify
    }

    fn handle(
        &self,
        record: &ChangeRecord,
        settings: &DestinationConfig,
    ) -> Result<SinkOutcome, SinkError> {
        let Some(to) = settings.notify_target() else {
            tracing::debug!("No notification address configured, skipping mail");
            return Ok(SinkOutcome::Skipped);
        };

        let Some(message) = self.compose(record, to) else {
            tracing::debug!(
                "No value changes in {} of {}, skipping mail",
                record.operation,
                record.subject_name
            );
            return Ok(SinkOutcome::Skipped);
        };

        self.mailer.send(&message)?;
        tracing::debug!(
            "Sent change notification for {} to {}",
            record.subject_name,
            to
        );
        Ok(SinkOutcome::Delivered)
    }
}

/// Delivers messages by writing each one to a file in a spool directory,
/// for a mail transfer agent or a person to pick up.
///
/// The directory is created on first delivery. A spool that cannot be
/// created fails that delivery only.
#[derive(Debug, Clone)]
pub struct SpoolMailer {
    spool_dir: Utf8PathBuf,
}

impl SpoolMailer {
    pub fn new<P: AsRef<Utf8Path>>(spool_dir: P) -> Self {
        Self {
            spool_dir: spool_dir.as_ref().to_path_buf(),
        }
    }

    pub fn spool_dir(&self) -> &Utf8Path {
        &self.spool_dir
    }

    fn next_path(&self) -> Utf8PathBuf {
        let stamp = Utc::now().format("%Y%m%dT%H%M%S%.6f");
        let mut path = self.spool_dir.join(format!("{}.eml", stamp));
        let mut n = 1;
        while path.exists() {
            path = self.spool_dir.join(format!("{}-{}.eml", stamp, n));
            n += 1;
        }
        path
    }
}

impl Mailer for SpoolMailer {
    fn send(&self, message: &Message) -> Result<(), SinkError> {
        let failed = |reason: String| SinkError::Delivery {
            to: message.to.clone(),
            reason,
        };

        if !self.spool_dir.is_dir() {
            fs::create_dir_all(&self.spool_dir)
                .map_err(|e| failed(format!("{}: {}", self.spool_dir, e)))?;
        }

        let path = self.next_path();
        let content = format!(
            "To: {}\nSubject: {}\n\n{}\n",
            message.to, message.subject, message.body
        );
        fs::write(&path, content).map_err(|e| failed(format!("{}: {}", path, e)))?;
        tracing::info!("Queued notification for {} at {}", message.to, path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LeafChange, Operation};
    use tempfile::TempDir;

    fn record(changes: Vec<LeafChange>) -> ChangeRecord {
        ChangeRecord {
            subject_name: "system.site".to_string(),
            operation: Operation::Update,
            leaf_changes: changes,
            old_name: None,
            actor_id: "1".to_string(),
            timestamp: 1686481721,
            before: None,
            after: None,
        }
    }

    fn settings_with_address() -> DestinationConfig {
        DestinationConfig {
            notify_target: Some("test@test.com".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_format_notification_time() {
        assert_eq!(
            format_notification_time(1686481721),
            "Sunday 11th of June 2023 11:08:41 AM"
        );
        // 2023-06-01, 2023-06-02, 2023-06-03, 2023-06-12
        assert!(format_notification_time(1685577600).contains(" 1st of "));
        assert!(format_notification_time(1685664000).contains(" 2nd of "));
        assert!(format_notification_time(1685750400).contains(" 3rd of "));
        assert!(format_notification_time(1686528000).contains(" 12th of "));
    }

    #[test]
    fn test_compose_message() {
        let sink = NotifySink::new(MockMailer::new(), "Site name");
        let message = sink
            .compose(
                &record(vec![LeafChange::new("name", "Drupal 8", "Drupal 9")]),
                "test@test.com",
            )
            .unwrap();

        assert_eq!(message.to, "test@test.com");
        assert_eq!(message.subject, "[Site name] Configuration change");
        assert_eq!(
            message.body,
            "User ID: 1\nConfiguration changed: system.site.name changed from Drupal 8 to Drupal 9 at Sunday 11th of June 2023 11:08:41 AM"
        );
    }

    #[test]
    fn test_one_message_for_many_changes() {
        let mut mailer = MockMailer::new();
        mailer
            .expect_send()
            .withf(|m| m.body.lines().count() == 3)
            .times(1)
            .returning(|_| Ok(()));

        let sink = NotifySink::new(mailer, "Site name");
        let outcome = sink
            .handle(
                &record(vec![
                    LeafChange::new("name", "a", "b"),
                    LeafChange::new("page.404", "/404", "/fourohfour"),
                ]),
                &settings_with_address(),
            )
            .unwrap();
        assert_eq!(outcome, SinkOutcome::Delivered);
    }

    #[test]
    fn test_no_changes_no_message() {
        let mut mailer = MockMailer::new();
        mailer.expect_send().never();
        let sink = NotifySink::new(mailer, "Site name");
        let outcome = sink
            .handle(&record(Vec::new()), &settings_with_address())
            .unwrap();
        assert_eq!(outcome, SinkOutcome::Skipped);
    }

    #[test]
    fn test_no_address_no_message() {
        let mut mailer = MockMailer::new();
        mailer.expect_send().never();
        let sink = NotifySink::new(mailer, "Site name");
        let outcome = sink
            .handle(
                &record(vec![LeafChange::new("name", "a", "b")]),
                &DestinationConfig::default(),
            )
            .unwrap();
        assert_eq!(outcome, SinkOutcome::Skipped);
    }

    #[test]
    fn test_delivery_failure_is_reported() {
        let mut mailer = MockMailer::new();
        mailer.expect_send().returning(|m| {
            Err(SinkError::Delivery {
                to: m.to.clone(),
                reason: "connection refused".to_string(),
            })
        });
        let sink = NotifySink::new(mailer, "Site name");
        let result = sink.handle(
            &record(vec![LeafChange::new("name", "a", "b")]),
            &settings_with_address(),
        );
        assert!(matches!(result, Err(SinkError::Delivery { .. })));
    }

    #[test]
    fn test_spool_mailer_writes_file() {
        let temp_dir = TempDir::new().unwrap();
        let spool = Utf8PathBuf::try_from(temp_dir.path().join("mail")).unwrap();
        let mailer = SpoolMailer::new(&spool);
        assert!(!spool.exists());

        let message = Message {
            to: "test@test.com".to_string(),
            subject: "[Site] Configuration change".to_string(),
            body: "User ID: 1".to_string(),
        };
        mailer.send(&message).unwrap();
        mailer.send(&message).unwrap();

        let files: Vec<_> = fs::read_dir(&spool).unwrap().collect();
        assert_eq!(files.len(), 2);
        let content = fs::read_to_string(files[0].as_ref().unwrap().path()).unwrap();
        assert!(content.starts_with("To: test@test.com\nSubject: [Site] Configuration change"));
    }

    #[test]
    fn test_unwritable_spool_fails_delivery_only() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = Utf8PathBuf::try_from(temp_dir.path().join("not_a_dir")).unwrap();
        fs::write(&blocker, "").unwrap();
        let mailer = SpoolMailer::new(blocker.join("mail"));

        let message = Message {
            to: "test@test.com".to_string(),
            subject: "[Site] Configuration change".to_string(),
            body: "User ID: 1".to_string(),
        };
        let result = mailer.send(&message);

        assert!(
            matches!(result, Err(SinkError::Delivery { ref to, .. }) if to == "test@test.com")
        );
    }
}
