use crate::models::{ConfigSnapshot, Destination, DestinationConfig, EventContext, Operation};
use regex::Regex;
use thiserror::Error;

/// Errors raised while evaluating the destination policy
#[derive(Error, Debug)]
pub enum PolicyError {
    #[error("Failed to encode snapshot for comparison: {0}")]
    Encode(#[from] serde_yaml_ng::Error),
}

/// Translate a shell glob into an anchored regular expression.
///
/// Supports `*`, `?`, bracket expressions (`[abc]`, `[a-z]`, `[!x]`, `[^x]`,
/// `[[:alpha:]]`) and backslash escapes. Matching is case-sensitive and `*`
/// crosses `.` separators. An unterminated `[` matches itself.
pub fn glob_to_regex(pattern: &str) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::with_capacity(pattern.len() * 2 + 2);
    out.push('^');

    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '\\' if i + 1 < chars.len() => {
                i += 1;
                out.push_str(&regex::escape(&chars[i].to_string()));
            }
            '[' => match bracket_end(&chars, i) {
                Some(end) => {
                    out.push_str(&bracket_class(&chars[i + 1..end]));
                    i = end;
                }
                None => out.push_str(r"\["),
            },
            c => out.push_str(&regex::escape(&c.to_string())),
        }
        i += 1;
    }

    out.push('$');
    out
}

/// Compile a glob, or `None` when it cannot match anything sensible
/// (a reversed range, an unknown character class).
pub fn compile_glob(pattern: &str) -> Option<Regex> {
    match Regex::new(&glob_to_regex(pattern)) {
        Ok(regex) => Some(regex),
        Err(e) => {
            tracing::warn!("Ignore pattern {:?} never matches: {}", pattern, e);
            None
        }
    }
}

/// Index of the `:]` closing a character class name opened at `start`
/// (the position of its `[`).
fn class_name_end(chars: &[char], start: usize) -> Option<usize> {
    if chars.get(start + 1) != Some(&':') {
        return None;
    }
    (start + 2..chars.len().saturating_sub(1)).find(|&k| chars[k] == ':' && chars[k + 1] == ']')
}

/// Index of the `]` closing the bracket expression opened at `start`.
fn bracket_end(chars: &[char], start: usize) -> Option<usize> {
    let mut j = start + 1;
    if j < chars.len() && (chars[j] == '!' || chars[j] == '^') {
        j += 1;
    }
    // A leading `]` is a literal member of the set.
    if j < chars.len() && chars[j] == ']' {
        j += 1;
    }
    while j < chars.len() {
        match chars[j] {
            ']' => return Some(j),
            '[' => match class_name_end(chars, j) {
                Some(end) => j = end + 2,
                None => j += 1,
            },
            _ => j += 1,
        }
    }
    None
}

fn bracket_class(body: &[char]) -> String {
    let mut class = String::from("[");
    let mut members = body;
    if matches!(members.first(), Some('!') | Some('^')) {
        class.push('^');
        members = &members[1..];
    }

    let mut k = 0;
    while k < members.len() {
        match members[k] {
            '[' => match class_name_end(members, k) {
                // `[:alpha:]` and friends use the same syntax in regex.
                Some(end) => {
                    class.extend(&members[k..end + 2]);
                    k = end + 1;
                }
                None => class.push_str(r"\["),
            },
            // Range dashes pass through; everything regex treats specially
            // inside a class is escaped.
            '-' => class.push('-'),
            c @ ('\\' | ']' | '^' | '&' | '~') => {
                class.push('\\');
                class.push(c);
            }
            other => class.push(other),
        }
        k += 1;
    }
    class.push(']');
    class
}

/// Decides whether a change is recorded and by which destinations.
///
/// Built once per event from the settings in force for that event. Pure:
/// no method has side effects.
#[derive(Debug)]
pub struct DestinationPolicy<'a> {
    settings: &'a DestinationConfig,
    patterns: Vec<Regex>,
}

impl<'a> DestinationPolicy<'a> {
    /// Compile the policy. Patterns that fail to compile are dropped with a
    /// warning and match nothing.
    pub fn new(settings: &'a DestinationConfig) -> Self {
        let patterns = settings
            .ignore_patterns
            .iter()
            .filter_map(|pattern| compile_glob(pattern))
            .collect();

        Self { settings, patterns }
    }

    pub fn settings(&self) -> &DestinationConfig {
        self.settings
    }

    /// Whether a destination may act at all.
    pub fn is_enabled(&self, destination: Destination) -> bool {
        self.settings.is_enabled(destination)
    }

    /// Whether the whole event is dropped because it belongs to an import.
    pub fn is_import_suppressed(&self, context: &EventContext) -> bool {
        context.importing && self.settings.ignore_on_import
    }

    /// Whether a configuration name is ignored by the pattern list.
    ///
    /// The first matching pattern decides; with `negate_ignore` a match
    /// means "log" and no match means "ignore".
    pub fn is_ignored(&self, subject_name: &str) -> bool {
        let negate = self.settings.negate_ignore;
        if self.patterns.iter().any(|p| p.is_match(subject_name)) {
            return !negate;
        }
        negate
    }

    /// Whether a change to `subject_name` should be recorded.
    pub fn should_log(
        &self,
        subject_name: &str,
        operation: Operation,
        context: &EventContext,
    ) -> bool {
        if self.is_import_suppressed(context) {
            tracing::debug!(
                "Skipping {} of {}: raised during configuration import",
                operation,
                subject_name
            );
            return false;
        }
        if self.is_ignored(subject_name) {
            tracing::debug!("Skipping {} of {}: ignored name", operation, subject_name);
            return false;
        }
        true
    }

    /// Whether an update should be recorded given its snapshots.
    ///
    /// Only suppresses when `ignore_if_unchanged` is set and both snapshots
    /// encode identically.
    pub fn should_log_unchanged(
        &self,
        before: &ConfigSnapshot,
        after: &ConfigSnapshot,
    ) -> Result<bool, PolicyError> {
        if !self.settings.ignore_if_unchanged {
            return Ok(true);
        }
        is_changed(before, after)
    }
}

/// True when the two snapshots serialize differently.
pub fn is_changed(before: &ConfigSnapshot, after: &ConfigSnapshot) -> Result<bool, PolicyError> {
    Ok(before.encode()? != after.encode()?)
}
