//! Structured log sink
//!
//! Every record is one line of JSON appended to the log file. Events carry a
//! `component` and an `event` tag so individual transitions can be grepped
//! for. The terminal belongs to the TUI, so nothing is ever written to
//! stdout/stderr from here.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use tracing::Subscriber;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::MakeWriter;

use crate::config::{Config, LogLevel};

/// Append-only writer that never reports failure.
///
/// A full disk or a revoked permission must not take the process down, so
/// write errors are dropped here.
#[derive(Clone, Default)]
pub struct LogSink {
    file: Option<Arc<Mutex<File>>>,
}

impl LogSink {
    /// Open `path` for appending. Falls back to a discarding sink.
    pub fn open(path: &Path) -> Self {
        match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => Self {
                file: Some(Arc::new(Mutex::new(file))),
            },
            Err(_) => Self::discard(),
        }
    }

    pub fn discard() -> Self {
        Self { file: None }
    }

    pub fn is_discarding(&self) -> bool {
        self.file.is_none()
    }
}

impl Write for LogSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                let _ = file.write_all(buf);
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                let _ = file.flush();
            }
        }
        Ok(())
    }
}

/// Filter directive limiting output to this crate at `level`.
pub fn directive(level: LogLevel) -> String {
    format!("{}={}", env!("CARGO_CRATE_NAME"), level.as_str())
}

/// Build the newline-delimited JSON subscriber writing through `writer`.
pub fn subscriber<W>(level: LogLevel, writer: W) -> Box<dyn Subscriber + Send + Sync>
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let subscriber = tracing_subscriber::fmt()
        .json()
        .flatten_event(true)
        .with_current_span(false)
        .with_span_list(false)
        .with_target(false)
        .with_ansi(false)
        .with_env_filter(EnvFilter::new(directive(level)))
        .with_writer(writer)
        .finish();
    Box::new(subscriber)
}

/// Install the global subscriber for the configured log file.
pub fn init(config: &Config) {
    let sink = LogSink::open(&config.log_file);
    let discarding = sink.is_discarding();
    let subscriber = subscriber(config.log_level, move || sink.clone());

    // A second init (tests, embedding) keeps the first subscriber.
    if tracing::subscriber::set_global_default(subscriber).is_ok() {
        tracing::info!(
            component = "app",
            event = "logging_started",
            level = config.log_level.as_str(),
            file = %config.log_file.display(),
            discarding,
            "Logging initialised"
        );
    }
}
