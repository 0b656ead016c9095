use chrono::Local;
use env_logger::Builder;
use log::LevelFilter;
use parking_lot::{const_mutex, Mutex};
use std::env;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::{Duration, SystemTime};

const ENABLE_ENV: &str = "SWITCHYARD_ENABLE_LOGS";
const RETENTION_ENV: &str = "SWITCHYARD_LOG_RETENTION_HOURS";
const DEFAULT_RETENTION_HOURS: u64 = 72;
const SECONDS_PER_HOUR: u64 = 3_600;

/// Open log file plus where it lives. Present only when file logging is on.
struct FileSink {
    path: PathBuf,
    writer: BufWriter<File>,
}

static FILE_SINK: Mutex<Option<FileSink>> = const_mutex(None);
static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Logging knobs resolved from the environment. Problems found while
/// resolving are kept and logged once the logger exists.
#[derive(Debug)]
struct LogSettings {
    to_file: bool,
    retention: Duration,
    directory: PathBuf,
    pending_warnings: Vec<String>,
}

impl LogSettings {
    fn from_env() -> Self {
        Self::resolve(|key| env::var(key).ok())
    }

    fn resolve(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut pending_warnings = Vec::new();
        let default_retention = hours(DEFAULT_RETENTION_HOURS);

        let retention = lookup(RETENTION_ENV).map_or(default_retention, |raw| {
            raw.trim().parse::<u64>().map(hours).unwrap_or_else(|_| {
                pending_warnings.push(format!(
                    "{RETENTION_ENV}='{raw}' is not a number of hours; keeping logs for {DEFAULT_RETENTION_HOURS}h"
                ));
                default_retention
            })
        });

        let default_to_file = cfg!(debug_assertions);
        let to_file = lookup(ENABLE_ENV).map_or(default_to_file, |raw| {
            parse_switch(&raw).unwrap_or_else(|| {
                pending_warnings.push(format!(
                    "{ENABLE_ENV}='{raw}' is not a recognised on/off value; file logging stays {}",
                    if default_to_file { "on" } else { "off" }
                ));
                default_to_file
            })
        });

        Self {
            to_file,
            retention,
            directory: get_log_dir(),
            pending_warnings,
        }
    }
}

fn hours(count: u64) -> Duration {
    Duration::from_secs(count.saturating_mul(SECONDS_PER_HOUR))
}

fn parse_switch(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn get_log_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("switchyard")
        .join("logs")
}

/// Path of the active log file, if file logging was enabled at init.
pub fn current_log_path() -> Option<PathBuf> {
    FILE_SINK.lock().as_ref().map(|sink| sink.path.clone())
}

fn log_file_name() -> String {
    format!("switchyard-{}.log", Local::now().format("%Y%m%d-%H%M%S"))
}

/// Install the global logger. Repeated calls are no-ops, and an embedding
/// application that already installed a logger keeps its own.
pub fn init_logging() {
    if LOGGER_INITIALIZED.set(()).is_err() {
        return;
    }

    let mut settings = LogSettings::from_env();
    if settings.to_file {
        attach_file_sink(&mut settings);
    }

    let mut builder = Builder::new();
    match env::var("RUST_LOG") {
        Ok(filters) => {
            builder.parse_filters(&filters);
        }
        Err(_) if settings.to_file => {
            builder
                .filter_level(LevelFilter::Warn)
                .filter_module("switchyard", LevelFilter::Debug);
        }
        Err(_) => {
            builder.filter_level(LevelFilter::Warn);
        }
    }

    builder
        .target(env_logger::Target::Stderr)
        .format(|buf, record| {
            let line = format!(
                "[{} {:<5} {}] {}",
                Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.target(),
                record.args()
            );
            if let Some(sink) = FILE_SINK.lock().as_mut() {
                let _ = writeln!(sink.writer, "{line}").and_then(|()| sink.writer.flush());
            }
            writeln!(buf, "{line}")
        });

    if builder.try_init().is_err() {
        return;
    }

    log::info!("switchyard v{} logging ready", env!("CARGO_PKG_VERSION"));
    if let Some(path) = current_log_path() {
        log::info!("Writing logs to {}", path.display());
    }
    for warning in settings.pending_warnings {
        log::warn!("{warning}");
    }
}

fn attach_file_sink(settings: &mut LogSettings) {
    if let Err(e) = fs::create_dir_all(&settings.directory) {
        settings.pending_warnings.push(format!(
            "Could not create log directory {}: {e}",
            settings.directory.display()
        ));
        return;
    }

    let swept = cleanup_old_logs(&settings.directory, settings.retention);
    settings.pending_warnings.extend(swept);

    let path = settings.directory.join(log_file_name());
    match OpenOptions::new().create(true).append(true).open(&path) {
        Ok(file) => {
            *FILE_SINK.lock() = Some(FileSink {
                path,
                writer: BufWriter::new(file),
            });
        }
        Err(e) => settings.pending_warnings.push(format!(
            "Could not open log file {}: {e}; logging to stderr only",
            path.display()
        )),
    }
}

/// Delete `.log` files in `log_dir` older than `retention`. A zero
/// retention keeps everything.
fn cleanup_old_logs(log_dir: &Path, retention: Duration) -> Vec<String> {
    let mut warnings = Vec::new();
    let cutoff = match SystemTime::now().checked_sub(retention) {
        Some(cutoff) if !retention.is_zero() => cutoff,
        _ => return warnings,
    };
    let Ok(entries) = fs::read_dir(log_dir) else {
        return warnings;
    };

    let stale = entries.flatten().map(|entry| entry.path()).filter(|path| {
        path.is_file() && path.extension().is_some_and(|ext| ext == "log")
    });
    for path in stale {
        let modified = fs::metadata(&path).and_then(|meta| meta.modified());
        match modified {
            Ok(at) if at >= cutoff => {}
            Ok(_) => {
                if let Err(e) = fs::remove_file(&path) {
                    warnings.push(format!("Could not delete {}: {e}", path.display()));
                }
            }
            Err(e) => warnings.push(format!(
                "Could not read age of {}: {e}",
                path.display()
            )),
        }
    }
    warnings
}
