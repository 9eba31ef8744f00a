//! Dated error log.
//!
//! [`DailyErrorLog`] is a tracing layer that appends every ERROR event to
//! `<dir>/error-YYYY-MM-DD.log`, one file per UTC day:
//!
//! ```text
//! [2024-05-01T10:00:00.000Z] ERROR: Attempt 1/5 failed for fetching page 2 from farms
//! [2024-05-01T10:00:00.000Z] ERROR DETAILS: [57014] canceling statement due to statement timeout
//! ```

use chrono::{NaiveDate, SecondsFormat, Utc};
use std::fmt::Write as FmtWrite;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

/// Path of the log file for `date`.
pub fn error_log_path(dir: &Path, date: NaiveDate) -> PathBuf {
    dir.join(format!("error-{}.log", date.format("%Y-%m-%d")))
}

/// A tracing layer writing ERROR events to a per-day append-only file.
pub struct DailyErrorLog {
    dir: PathBuf,
    current: Mutex<Option<(NaiveDate, File)>>,
}

impl DailyErrorLog {
    /// Create a layer logging into `dir`. The directory is created on the
    /// first error, not here.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            current: Mutex::new(None),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn append(&self, text: &str) -> std::io::Result<()> {
        let today = Utc::now().date_naive();
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);

        if current.as_ref().map(|(date, _)| *date) != Some(today) {
            std::fs::create_dir_all(&self.dir)?;
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(error_log_path(&self.dir, today))?;
            *current = Some((today, file));
        }

        match current.as_mut() {
            Some((_, file)) => file.write_all(text.as_bytes()),
            None => Ok(()),
        }
    }
}

impl<S> Layer<S> for DailyErrorLog
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() != Level::ERROR {
            return;
        }

        let mut visitor = ErrorVisitor::default();
        event.record(&mut visitor);

        let ts = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let mut text = format!("[{}] ERROR: {}", ts, visitor.message);
        if !visitor.fields.is_empty() {
            let _ = write!(text, " ({})", visitor.fields.join(" "));
        }
        text.push('\n');
        if let Some(details) = visitor.details {
            let _ = writeln!(text, "[{}] ERROR DETAILS: {}", ts, details);
        }

        // Nowhere left to report a failing log sink.
        let _ = self.append(&text);
    }
}

/// Splits an event into its message, its `error` field and everything else.
#[derive(Default)]
struct ErrorVisitor {
    message: String,
    details: Option<String>,
    fields: Vec<String>,
}

impl tracing::field::Visit for ErrorVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        match field.name() {
            "message" => {
                let _ = write!(self.message, "{:?}", value);
            }
            "error" => self.details = Some(format!("{:?}", value)),
            name => self.fields.push(format!("{}={:?}", name, value)),
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        match field.name() {
            "message" => self.message.push_str(value),
            "error" => self.details = Some(value.to_string()),
            name => self.fields.push(format!("{}={}", name, value)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::layer::SubscriberExt;

    #[test]
    fn test_path_format() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        assert_eq!(
            error_log_path(Path::new("logs"), date),
            Path::new("logs/error-2024-03-07.log")
        );
    }

    #[test]
    fn test_only_errors_are_written() {
        let dir = tempfile::tempdir().unwrap();
        let log_dir = dir.path().join("logs");
        let subscriber = tracing_subscriber::registry().with(DailyErrorLog::new(&log_dir));

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("copied page 1");
            tracing::warn!("clear failed");
            tracing::error!(error = "[23505] duplicate key", "Attempt 1/5 failed for inserting chunk 1/1 into t");
            tracing::error!(entity = "farms", "Failed to clone");
        });

        let content =
            std::fs::read_to_string(error_log_path(&log_dir, Utc::now().date_naive())).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].ends_with("] ERROR: Attempt 1/5 failed for inserting chunk 1/1 into t"));
        assert!(lines[1].contains("] ERROR DETAILS: [23505] duplicate key"));
        assert!(lines[2].ends_with("ERROR: Failed to clone (entity=farms)"));
        assert!(!content.contains("copied page 1"));
    }
}
