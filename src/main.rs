//! config-log - Configuration change audit logging
//!
//! Main entry point for the command line front end.
//!
//! Every event command (`record`, `delete`, `rename`, `import`) reads the
//! settings file fresh, builds the standard dispatcher and pushes a single
//! event through it:
//!
//! - structured destination: SQLite database in the config directory
//! - text destination: `tracing` lines, written to the daily log file
//! - notify destination: `.eml` files in the mail spool directory
//!
//! The browsing commands (`history`, `show`) read the structured log back
//! and render the stored YAML as a side-by-side line diff.
//!
//! # Configuration Files
//!
//! Expected in the `--config-dir` directory (created on first use):
//! - `config_log.settings.yml`: site name, storage paths and destination settings
//! - `config_log.sqlite`: the structured log
//! - `logs/`: daily rotating log files
//! - `mail/`: spooled notifications

use anyhow::{Context, Result, bail};
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use config_log::config::load_snapshot;
use config_log::models::{Changelist, SettingsForm, split_ignore_list};
use config_log::services::{differ, render_field};
use config_log::sinks::{
    RecordStore, SpoolMailer, SqliteRecordStore, StoreHandle, StoredRecord, TracingWriter,
};
use config_log::{
    APP_NAME, ConfigEvent, Destination, Dispatcher, EventContext, Operation, SettingsManager,
    VERSION,
};

#[derive(Debug, Parser)]
#[command(name = "config-log")]
#[command(version, about = "Configuration change audit logging", long_about = None)]
struct Cli {
    /// Directory holding settings, database, logs and mail spool
    #[arg(long, global = true, default_value = "config-log-data")]
    config_dir: Utf8PathBuf,

    /// Log at debug level
    #[arg(long, global = true)]
    debug: bool,

    /// Mark the event as part of a configuration import
    #[arg(long, global = true)]
    import: bool,

    /// Actor recorded with the event
    #[arg(long, global = true, default_value = "0")]
    actor: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Record a save of a configuration object
    Record(RecordArgs),
    /// Record a deletion
    Delete(DeleteArgs),
    /// Record a rename
    Rename(RenameArgs),
    /// Record an import batch
    Import(ImportArgs),
    /// Print the leaf changes between two snapshots
    Diff(DiffArgs),
    /// List stored changes, newest first
    History(HistoryArgs),
    /// Show one stored change with its full diff
    Show(ShowArgs),
    /// Show or change destination settings
    Settings(SettingsArgs),
    /// Create the structured log table
    Install,
    /// Drop the structured log table
    Uninstall,
}

#[derive(Debug, Args)]
struct RecordArgs {
    #[arg(long)]
    name: String,

    /// Snapshot before the save; omit for a newly created object
    #[arg(long)]
    before: Option<Utf8PathBuf>,

    #[arg(long)]
    after: Utf8PathBuf,
}

#[derive(Debug, Args)]
struct DeleteArgs {
    #[arg(long)]
    name: String,

    #[arg(long)]
    before: Utf8PathBuf,
}

#[derive(Debug, Args)]
struct RenameArgs {
    #[arg(long)]
    old_name: String,

    #[arg(long)]
    name: String,

    #[arg(long)]
    before: Utf8PathBuf,

    #[arg(long)]
    after: Utf8PathBuf,
}

#[derive(Debug, Args)]
struct ImportArgs {
    #[arg(long, value_delimiter = ',')]
    create: Vec<String>,

    #[arg(long, value_delimiter = ',')]
    update: Vec<String>,

    #[arg(long, value_delimiter = ',')]
    delete: Vec<String>,

    #[arg(long, value_delimiter = ',')]
    rename: Vec<String>,
}

#[derive(Debug, Args)]
struct DiffArgs {
    #[arg(long)]
    before: Utf8PathBuf,

    #[arg(long)]
    after: Utf8PathBuf,
}

#[derive(Debug, Args)]
struct HistoryArgs {
    #[arg(long, default_value_t = 20)]
    limit: usize,

    /// Print long diffs in full
    #[arg(long)]
    expand: bool,
}

#[derive(Debug, Args)]
struct ShowArgs {
    #[arg(long)]
    id: i64,
}

#[derive(Debug, Args)]
struct SettingsArgs {
    /// Enabled destinations (custom, default, mail)
    #[arg(long, value_delimiter = ',')]
    destinations: Option<Vec<String>>,

    /// Notification address; an empty value disables mail
    #[arg(long)]
    email: Option<String>,

    #[arg(long)]
    ignore_import: Option<bool>,

    #[arg(long)]
    ignore_unchanged: Option<bool>,

    /// Glob pattern to ignore; repeat for several, pass '' to clear the list
    #[arg(long)]
    ignored: Option<Vec<String>>,

    #[arg(long)]
    negate: Option<bool>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let manager = SettingsManager::new(&cli.config_dir)?;
    let _guard = config_log::logging::setup_logging_with_console(
        &manager.config_dir().join("logs"),
        cli.debug,
        cli.debug,
    )?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    let mut context = EventContext::now(cli.actor.clone());
    if cli.import {
        context = context.importing();
    }

    match cli.command {
        Commands::Record(args) => {
            let before = args.before.as_deref().map(load_snapshot).transpose()?;
            let event = ConfigEvent::Save {
                name: args.name,
                before,
                after: load_snapshot(&args.after)?,
            };
            dispatch(&manager, &event, &context)
        }
        Commands::Delete(args) => {
            let event = ConfigEvent::Delete {
                name: args.name,
                before: load_snapshot(&args.before)?,
            };
            dispatch(&manager, &event, &context)
        }
        Commands::Rename(args) => {
            let event = ConfigEvent::Rename {
                old_name: args.old_name,
                name: args.name,
                before: load_snapshot(&args.before)?,
                after: load_snapshot(&args.after)?,
            };
            dispatch(&manager, &event, &context)
        }
        Commands::Import(args) => {
            let mut changelist = Changelist::new();
            for (operation, names) in [
                (Operation::Create, args.create),
                (Operation::Update, args.update),
                (Operation::Delete, args.delete),
                (Operation::Rename, args.rename),
            ] {
                if !names.is_empty() {
                    changelist.insert(operation, names);
                }
            }
            dispatch(&manager, &ConfigEvent::Import { changelist }, &context)
        }
        Commands::Diff(args) => {
            let before = load_snapshot(&args.before)?;
            let after = load_snapshot(&args.after)?;
            let changes = differ::diff(&before, &after);
            if changes.is_empty() {
                println!("No change");
            }
            for change in changes {
                println!("{}: {} -> {}", change.path, change.old_value, change.new_value);
            }
            Ok(())
        }
        Commands::History(args) => {
            let store = open_installed_store(&manager)?;
            for record in store.recent(args.limit)? {
                print_record(&record, args.expand);
                println!();
            }
            Ok(())
        }
        Commands::Show(args) => {
            let store = open_installed_store(&manager)?;
            match store.get(args.id)? {
                Some(record) => {
                    print_record(&record, true);
                    Ok(())
                }
                None => bail!("No config log entry with id {}", args.id),
            }
        }
        Commands::Settings(args) => settings(&manager, args),
        Commands::Install => {
            open_store(&manager)?.install()?;
            println!("Installed config_log table");
            Ok(())
        }
        Commands::Uninstall => {
            open_store(&manager)?.uninstall()?;
            println!("Removed config_log table");
            Ok(())
        }
    }
}

fn open_store(manager: &SettingsManager) -> Result<SqliteRecordStore> {
    let settings = manager.load_settings()?;
    let path = manager.database_path(&settings);
    SqliteRecordStore::open(&path).with_context(|| format!("Failed to open database: {}", path))
}

fn open_installed_store(manager: &SettingsManager) -> Result<SqliteRecordStore> {
    let store = open_store(manager)?;
    if !store.table_exists()? {
        bail!("The config_log table is not installed, run `config-log install` first");
    }
    Ok(store)
}

/// Push one event through the standard sinks using freshly loaded settings.
fn dispatch(manager: &SettingsManager, event: &ConfigEvent, context: &EventContext) -> Result<()> {
    let settings = manager.load_settings()?;
    let store = StoreHandle::open(&manager.database_path(&settings));
    let mailer = SpoolMailer::new(manager.mail_spool_path(&settings));
    let dispatcher = Dispatcher::standard(store, TracingWriter, mailer, &settings.site_name);

    let report = dispatcher.dispatch(event, context, &settings.config_log)?;

    if report.is_suppressed() {
        println!("{} event not logged", event.kind());
    }
    for record in &report.records {
        println!(
            "Logged {} of {} ({} changes)",
            record.operation,
            record.subject_name,
            record.leaf_changes.len()
        );
    }
    if report.failures > 0 {
        println!("{} destination(s) failed, see the log for details", report.failures);
    }

    dispatcher.metrics().log_summary();
    Ok(())
}

fn format_created(created: i64) -> String {
    DateTime::<Utc>::from_timestamp(created, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| created.to_string())
}

fn print_record(record: &StoredRecord, expand: bool) {
    println!(
        "#{} {} uid={} {} {}",
        record.id,
        format_created(record.created),
        record.actor_id,
        record.operation,
        record.name
    );
    if let Some(old_name) = &record.old_name {
        println!("  renamed from {}", old_name);
    }
    let render = render_field(record.original_data.as_deref(), record.data.as_deref());
    println!("{}", render.to_text(expand));
}

fn print_form(form: &SettingsForm, path: &Utf8Path) {
    println!("Settings: {}", path);
    for (destination, checked) in &form.log_destination {
        println!(
            "  [{}] {} ({})",
            if *checked { "x" } else { " " },
            destination.label(),
            destination.key()
        );
    }
    println!("  Email address: {}", form.log_email_address);
    println!("  Ignore configuration import: {}", form.ignore_config_import);
    println!("  Ignore saves without changes: {}", form.ignore_no_changes);
    println!("  Negate ignore list: {}", form.log_ignored_config_negate);
    println!("  Ignored configuration:");
    for pattern in split_ignore_list(&form.log_ignored_config) {
        println!("    {}", pattern);
    }
}

/// Form text for the `--ignored` values, one pattern per line.
///
/// Commas belong to the pattern (`block.[a,b]*`), so values are never split.
fn ignored_list(values: &[String]) -> String {
    values.join("\n")
}

fn settings(manager: &SettingsManager, args: SettingsArgs) -> Result<()> {
    let mut settings = manager.load_settings()?;
    let mut form = SettingsForm::from_config(&settings.config_log);

    let changed = args.destinations.is_some()
        || args.email.is_some()
        || args.ignore_import.is_some()
        || args.ignore_unchanged.is_some()
        || args.ignored.is_some()
        || args.negate.is_some();

    if let Some(keys) = args.destinations {
        for destination in Destination::ALL {
            form.set_destination(destination, false);
        }
        for key in keys {
            let Some(destination) = Destination::from_key(&key) else {
                bail!("Unknown destination: {} (expected custom, default or mail)", key);
            };
            form.set_destination(destination, true);
        }
    }
    if let Some(email) = args.email {
        form.log_email_address = email;
    }
    if let Some(value) = args.ignore_import {
        form.ignore_config_import = value;
    }
    if let Some(value) = args.ignore_unchanged {
        form.ignore_no_changes = value;
    }
    if let Some(ignored) = args.ignored {
        form.log_ignored_config = ignored_list(&ignored);
    }
    if let Some(value) = args.negate {
        form.log_ignored_config_negate = value;
    }

    if changed {
        settings.config_log = form.submit();
        manager.save_settings(&settings)?;
        form = SettingsForm::from_config(&settings.config_log);
    }

    print_form(&form, manager.settings_path());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use config_log::models::DestinationConfig;

    fn settings_args(argv: &[&str]) -> SettingsArgs {
        let cli = Cli::try_parse_from(argv).unwrap();
        match cli.command {
            Commands::Settings(args) => args,
            other => panic!("expected settings command, got {:?}", other),
        }
    }

    #[test]
    fn test_ignored_pattern_keeps_commas() {
        let args = settings_args(&["config-log", "settings", "--ignored", "block.[a,b]*"]);
        let ignored = args.ignored.unwrap();
        assert_eq!(ignored, vec!["block.[a,b]*"]);

        let mut form = SettingsForm::from_config(&DestinationConfig::default());
        form.log_ignored_config = ignored_list(&ignored);
        assert_eq!(form.submit().ignore_patterns, vec!["block.[a,b]*"]);
    }

    #[test]
    fn test_ignored_is_repeatable() {
        let args = settings_args(&[
            "config-log",
            "settings",
            "--ignored",
            "user.*",
            "--ignored",
            "system.cron",
        ]);
        let ignored = args.ignored.unwrap();
        assert_eq!(ignored_list(&ignored), "user.*\nsystem.cron");
    }

    #[test]
    fn test_empty_ignored_clears_list() {
        let args = settings_args(&["config-log", "settings", "--ignored", ""]);
        let mut form = SettingsForm::from_config(&DestinationConfig {
            ignore_patterns: vec!["user.*".to_string()],
            ..Default::default()
        });
        form.log_ignored_config = ignored_list(&args.ignored.unwrap());
        assert!(form.submit().ignore_patterns.is_empty());
    }
}
