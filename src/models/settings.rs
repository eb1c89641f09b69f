use serde::de::{self, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A named sink category that can be switched on or off.
///
/// The serialized names are the keys used by the host's settings file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Destination {
    /// Custom `config_log` table
    #[serde(rename = "custom")]
    Structured,
    /// Default logging system
    #[serde(rename = "default")]
    Text,
    /// Mail notification
    #[serde(rename = "mail")]
    Notify,
}

impl Destination {
    pub const ALL: [Destination; 3] = [
        Destination::Structured,
        Destination::Text,
        Destination::Notify,
    ];

    /// Look a destination up by its settings key.
    pub fn from_key(key: &str) -> Option<Destination> {
        Destination::ALL.into_iter().find(|d| d.key() == key)
    }

    pub fn key(&self) -> &'static str {
        match self {
            Destination::Structured => "custom",
            Destination::Text => "default",
            Destination::Notify => "mail",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Destination::Structured => "Custom table (\"config_log\")",
            Destination::Text => "Default logging system",
            Destination::Notify => "Mail notification",
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Settings consulted before each change event.
///
/// Field names follow the host's `config_log.settings` keys on disk.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DestinationConfig {
    /// `None` enables every destination; an empty list enables none.
    #[serde(
        rename = "log_destination",
        default,
        deserialize_with = "deserialize_destinations"
    )]
    pub enabled_destinations: Option<Vec<Destination>>,

    /// Shell-glob patterns matched against configuration names.
    #[serde(rename = "log_ignored_config", default)]
    pub ignore_patterns: Vec<String>,

    /// Log only the names matching `ignore_patterns`.
    #[serde(rename = "log_ignored_config_negate", default)]
    pub negate_ignore: bool,

    #[serde(rename = "ignore_config_import", default)]
    pub ignore_on_import: bool,

    #[serde(rename = "ignore_no_changes", default)]
    pub ignore_if_unchanged: bool,

    #[serde(rename = "log_email_address", default)]
    pub notify_target: Option<String>,
}

impl DestinationConfig {
    pub fn is_enabled(&self, destination: Destination) -> bool {
        match &self.enabled_destinations {
            None => true,
            Some(enabled) => enabled.contains(&destination),
        }
    }

    /// Notification address, if one is configured and non-blank.
    pub fn notify_target(&self) -> Option<&str> {
        self.notify_target
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// Accepts every shape the host stores `log_destination` in:
///
/// - a list of keys: `[custom, mail]`
/// - the checkbox map, where unchecked boxes are `0`: `{custom: custom, default: 0}`
/// - a comma-separated string of keys, as set through the environment
/// - an empty value (`~`, `0`, `''`, `false`), meaning every destination
fn deserialize_destinations<'de, D>(deserializer: D) -> Result<Option<Vec<Destination>>, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(DestinationsVisitor)
}

fn destination_key<E: de::Error>(key: &str) -> Result<Destination, E> {
    Destination::from_key(key).ok_or_else(|| {
        de::Error::invalid_value(
            de::Unexpected::Str(key),
            &"one of `custom`, `default`, `mail`",
        )
    })
}

struct DestinationsVisitor;

impl<'de> Visitor<'de> for DestinationsVisitor {
    type Value = Option<Vec<Destination>>;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a destination list, a checkbox map, or an empty value")
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
        deserializer.deserialize_any(self)
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Self::Value, E> {
        if v {
            return Err(de::Error::invalid_value(de::Unexpected::Bool(v), &self));
        }
        Ok(None)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        if v != 0 {
            return Err(de::Error::invalid_value(de::Unexpected::Signed(v), &self));
        }
        Ok(None)
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        if v != 0 {
            return Err(de::Error::invalid_value(de::Unexpected::Unsigned(v), &self));
        }
        Ok(None)
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        let v = v.trim();
        if v.is_empty() || v == "0" {
            return Ok(None);
        }
        v.split(',')
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .map(destination_key)
            .collect::<Result<Vec<_>, E>>()
            .map(Some)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let mut destinations = Vec::new();
        while let Some(key) = seq.next_element::<String>()? {
            destinations.push(destination_key(&key)?);
        }
        Ok(Some(destinations))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut destinations = Vec::new();
        while let Some((key, Checkbox(checked))) = map.next_entry::<String, Checkbox>()? {
            let destination = destination_key(&key)?;
            if checked && !destinations.contains(&destination) {
                destinations.push(destination);
            }
        }
        Ok(Some(destinations))
    }
}

/// A checkbox value from the host's form state: `0`, `false` and empty
/// strings are unchecked, anything else is checked.
struct Checkbox(bool);

impl<'de> Deserialize<'de> for Checkbox {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct CheckboxVisitor;

        impl<'de> Visitor<'de> for CheckboxVisitor {
            type Value = Checkbox;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a checkbox value")
            }

            fn visit_unit<E: de::Error>(self) -> Result<Checkbox, E> {
                Ok(Checkbox(false))
            }

            fn visit_bool<E: de::Error>(self, v: bool) -> Result<Checkbox, E> {
                Ok(Checkbox(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Checkbox, E> {
                Ok(Checkbox(v != 0))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Checkbox, E> {
                Ok(Checkbox(v != 0))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Checkbox, E> {
                Ok(Checkbox(!v.is_empty() && v != "0"))
            }
        }

        deserializer.deserialize_any(CheckboxVisitor)
    }
}

/// Values of the admin settings form.
///
/// The ignore list is edited as one configuration name per line; on submit
/// it is split into patterns and blank lines are dropped.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SettingsForm {
    pub log_destination: Vec<(Destination, bool)>,
    pub log_email_address: String,
    pub ignore_config_import: bool,
    pub ignore_no_changes: bool,
    pub log_ignored_config: String,
    pub log_ignored_config_negate: bool,
}

impl SettingsForm {
    /// Populate the form from stored settings.
    ///
    /// Checkboxes show the effective state, so a missing destination list
    /// shows every destination as checked.
    pub fn from_config(config: &DestinationConfig) -> Self {
        Self {
            log_destination: Destination::ALL
                .iter()
                .map(|d| (*d, config.is_enabled(*d)))
                .collect(),
            log_email_address: config.notify_target.clone().unwrap_or_default(),
            ignore_config_import: config.ignore_on_import,
            ignore_no_changes: config.ignore_if_unchanged,
            log_ignored_config: config.ignore_patterns.join("\n"),
            log_ignored_config_negate: config.negate_ignore,
        }
    }

    pub fn set_destination(&mut self, destination: Destination, checked: bool) {
        match self
            .log_destination
            .iter_mut()
            .find(|(d, _)| *d == destination)
        {
            Some(entry) => entry.1 = checked,
            None => self.log_destination.push((destination, checked)),
        }
    }

    /// Convert submitted form values into settings.
    ///
    /// A submitted form always carries an explicit destination list, so
    /// unchecking every box disables every destination.
    pub fn submit(&self) -> DestinationConfig {
        let email = self.log_email_address.trim();
        DestinationConfig {
            enabled_destinations: Some(
                self.log_destination
                    .iter()
                    .filter(|(_, checked)| *checked)
                    .map(|(d, _)| *d)
                    .collect(),
            ),
            ignore_patterns: split_ignore_list(&self.log_ignored_config),
            negate_ignore: self.log_ignored_config_negate,
            ignore_on_import: self.ignore_config_import,
            ignore_if_unchanged: self.ignore_no_changes,
            notify_target: (!email.is_empty()).then(|| email.to_string()),
        }
    }
}

/// Split a newline-delimited ignore list. Both `\n` and `\r` separate
/// entries; empty entries are dropped.
pub fn split_ignore_list(text: &str) -> Vec<String> {
    text.split(['\n', '\r'])
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

fn default_site_name() -> String {
    "Drupal".to_string()
}

fn default_database() -> String {
    "config_log.sqlite".to_string()
}

fn default_mail_spool() -> String {
    "mail".to_string()
}

/// Settings file for the command line front end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Site name used in notification subjects
    #[serde(default = "default_site_name")]
    pub site_name: String,

    /// SQLite database for the structured destination, relative to the
    /// configuration directory
    #[serde(default = "default_database")]
    pub database: String,

    /// Directory receiving notification messages, relative to the
    /// configuration directory
    #[serde(default = "default_mail_spool")]
    pub mail_spool: String,

    #[serde(default)]
    pub config_log: DestinationConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            site_name: default_site_name(),
            database: default_database(),
            mail_spool: default_mail_spool(),
            config_log: DestinationConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_destinations_enabled_by_default() {
        let config = DestinationConfig::default();
        for destination in Destination::ALL {
            assert!(config.is_enabled(destination));
        }
    }

    #[test]
    fn test_explicit_empty_list_disables_everything() {
        let config = DestinationConfig {
            enabled_destinations: Some(Vec::new()),
            ..Default::default()
        };
        for destination in Destination::ALL {
            assert!(!config.is_enabled(destination));
        }
    }

    #[test]
    fn test_blank_notify_target_is_none() {
        let config = DestinationConfig {
            notify_target: Some("  ".to_string()),
            ..Default::default()
        };
        assert_eq!(config.notify_target(), None);
    }

    #[test]
    fn test_split_ignore_list() {
        let patterns = split_ignore_list("user.settings\r\nviews.*\n\ncontact.settings\r");
        assert_eq!(
            patterns,
            vec!["user.settings", "views.*", "contact.settings"]
        );
    }

    #[test]
    fn test_form_submit() {
        let mut form = SettingsForm::from_config(&DestinationConfig::default());
        form.set_destination(Destination::Notify, false);
        form.log_email_address = " admin@example.com ".to_string();
        form.log_ignored_config = "user.*\nsystem.cron".to_string();
        form.log_ignored_config_negate = true;
        form.ignore_no_changes = true;

        let config = form.submit();
        assert!(config.is_enabled(Destination::Structured));
        assert!(config.is_enabled(Destination::Text));
        assert!(!config.is_enabled(Destination::Notify));
        assert_eq!(config.notify_target(), Some("admin@example.com"));
        assert_eq!(config.ignore_patterns, vec!["user.*", "system.cron"]);
        assert!(config.negate_ignore);
        assert!(config.ignore_if_unchanged);
        assert!(!config.ignore_on_import);
    }

    #[test]
    fn test_form_round_trip_keeps_patterns() {
        let config = DestinationConfig {
            ignore_patterns: vec!["a.*".to_string(), "b.?".to_string()],
            ..Default::default()
        };
        let form = SettingsForm::from_config(&config);
        assert_eq!(form.log_ignored_config, "a.*\nb.?");
        assert_eq!(form.submit().ignore_patterns, config.ignore_patterns);
    }

    #[test]
    fn test_host_keys_deserialize() {
        let yaml = "log_destination: [custom, mail]\nlog_ignored_config: ['user.*']\nignore_no_changes: true\n";
        let config: DestinationConfig = serde_yaml_ng::from_str(yaml).unwrap();
        assert!(config.is_enabled(Destination::Structured));
        assert!(!config.is_enabled(Destination::Text));
        assert!(config.is_enabled(Destination::Notify));
        assert_eq!(config.ignore_patterns, vec!["user.*"]);
        assert!(config.ignore_if_unchanged);
    }

    #[test]
    fn test_destination_from_key() {
        assert_eq!(Destination::from_key("custom"), Some(Destination::Structured));
        assert_eq!(Destination::from_key("mail"), Some(Destination::Notify));
        assert_eq!(Destination::from_key("syslog"), None);
    }

    #[test]
    fn test_checkbox_map_destinations() {
        let yaml = "log_destination:\n  custom: custom\n  default: 0\n  mail: 0\n";
        let config: DestinationConfig = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(config.enabled_destinations, Some(vec![Destination::Structured]));
        assert!(config.is_enabled(Destination::Structured));
        assert!(!config.is_enabled(Destination::Text));
        assert!(!config.is_enabled(Destination::Notify));
    }

    #[test]
    fn test_empty_destination_values_enable_everything() {
        for value in ["0", "~", "''", "false"] {
            let yaml = format!("log_destination: {}\n", value);
            let config: DestinationConfig = serde_yaml_ng::from_str(&yaml).unwrap();
            assert_eq!(config.enabled_destinations, None, "log_destination: {}", value);
            for destination in Destination::ALL {
                assert!(config.is_enabled(destination));
            }
        }
    }

    #[test]
    fn test_comma_separated_destinations() {
        let config: DestinationConfig =
            serde_yaml_ng::from_str("log_destination: 'custom, default'\n").unwrap();
        assert_eq!(
            config.enabled_destinations,
            Some(vec![Destination::Structured, Destination::Text])
        );
    }

    #[test]
    fn test_unknown_destination_is_rejected() {
        let seq = serde_yaml_ng::from_str::<DestinationConfig>("log_destination: [syslog]\n");
        let map = serde_yaml_ng::from_str::<DestinationConfig>("log_destination: {syslog: 1}\n");
        assert!(seq.is_err());
        assert!(map.is_err());
    }

    #[test]
    fn test_destination_list_serializes_as_keys() {
        let config = DestinationConfig {
            enabled_destinations: Some(vec![Destination::Notify]),
            ..Default::default()
        };
        let yaml = serde_yaml_ng::to_string(&config).unwrap();
        let reloaded: DestinationConfig = serde_yaml_ng::from_str(&yaml).unwrap();
        assert!(yaml.contains("- mail"));
        assert_eq!(reloaded, config);
    }
}
