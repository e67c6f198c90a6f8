use std::fs::File;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use env_logger::{Builder, Target};

pub const DEFAULT_FILTER: &str = "info,rocket=warn,_=warn";

/// `<log_dir>/<prefix>-<YYYYmmdd-HHMMSS>.log`
pub fn build_log_path(log_dir: &Path, prefix: &str, now: DateTime<Local>) -> PathBuf {
    log_dir.join(format!("{prefix}-{}.log", now.format("%Y%m%d-%H%M%S")))
}

/// Route the `log` facade into a fresh log file. Logs go to stderr if there is no
/// log directory or the file can't be created. Returns the log file in use, if any.
pub fn init(log_dir: Option<&Path>, prefix: &str, filter: Option<&str>) -> Option<PathBuf> {
    let mut builder = Builder::new();
    builder
        .parse_filters(filter.unwrap_or(DEFAULT_FILTER))
        .format(|buf, record| {
            writeln!(
                buf,
                "{} | {} | {}",
                Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.args()
            )
        });

    let Some(log_dir) = log_dir else {
        builder.target(Target::Stderr).init();
        return None;
    };
    let path = build_log_path(log_dir, prefix, Local::now());
    match create_log_file(&path) {
        Ok(file) => {
            builder.target(Target::Pipe(Box::new(file))).init();
            log::info!("yapcli {} logging to {}", env!("CARGO_PKG_VERSION"), path.display());
            Some(path)
        }
        Err(err) => {
            builder.target(Target::Stderr).init();
            log::warn!("Failed to create log file {}: {err}", path.display());
            None
        }
    }
}

fn create_log_file(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    File::create(path)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone as _;

    use super::*;

    #[test]
    fn log_path_is_timestamped() {
        let now = Local.with_ymd_and_hms(2026, 3, 7, 9, 5, 1).unwrap();
        assert_eq!(
            PathBuf::from("/logs/sandbox/link-20260307-090501.log"),
            build_log_path(Path::new("/logs/sandbox"), "link", now)
        );
    }

    #[test]
    fn creates_missing_log_dir() {
        let tempdir = tempfile::tempdir().unwrap();
        let path = tempdir.path().join("logs").join("sandbox").join("x.log");
        create_log_file(&path).unwrap();
        assert!(path.exists());
    }
}
