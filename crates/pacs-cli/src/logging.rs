use crate::error::{CliError, Result};
use crate::ui::UiEvent;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;
use tokio::sync::mpsc;
use tracing_subscriber::{
    filter::LevelFilter,
    fmt::{self, MakeWriter},
    prelude::*,
};

/// Routes formatted console log lines through the UI task so they print above live progress bars.
#[derive(Clone)]
struct UiLogWriter {
    sender: mpsc::Sender<UiEvent>,
}

impl io::Write for UiLogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let line = String::from_utf8_lossy(buf).trim_end().to_string();
        if !line.is_empty() {
            if let Err(e) = self.sender.try_send(UiEvent::Log(line)) {
                // UI already gone (or saturated): write straight to stderr.
                let UiEvent::Log(line) = e.into_inner() else {
                    return Ok(buf.len());
                };
                eprintln!("{}", line);
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for UiLogWriter {
    type Writer = UiLogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

fn console_level(verbosity: u8, quiet: bool) -> LevelFilter {
    if quiet {
        LevelFilter::ERROR
    } else {
        match verbosity {
            0 => LevelFilter::WARN,
            1 => LevelFilter::INFO,
            2 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        }
    }
}

fn open_log_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| CliError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| CliError::Io {
            path: path.to_path_buf(),
            source,
        })
}

/// Installs the global subscriber: a compact console layer whose level follows `-v`/`-q`, and
/// when `log_file` is given an append-only plain-text layer that always records at DEBUG.
pub fn setup_logging(
    verbosity: u8,
    quiet: bool,
    log_file: Option<&Path>,
    ui_sender: mpsc::Sender<UiEvent>,
) -> Result<()> {
    let console_layer = fmt::layer()
        .with_writer(UiLogWriter { sender: ui_sender })
        .with_ansi(true)
        .with_target(false)
        .compact()
        .with_filter(console_level(verbosity, quiet));

    let file_layer = match log_file {
        Some(path) => Some(
            fmt::layer()
                .with_writer(open_log_file(path)?)
                .with_ansi(false)
                .with_thread_ids(true)
                .with_target(true)
                .with_filter(LevelFilter::DEBUG),
        ),
        None => None,
    };

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| CliError::Other(anyhow::anyhow!("Failed to install logger: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::thread;
    use std::time::Duration;
    use tracing::{debug, info, trace};

    #[test]
    fn verbosity_maps_to_console_level() {
        assert_eq!(console_level(0, false), LevelFilter::WARN);
        assert_eq!(console_level(1, false), LevelFilter::INFO);
        assert_eq!(console_level(2, false), LevelFilter::DEBUG);
        assert_eq!(console_level(7, false), LevelFilter::TRACE);
        assert_eq!(console_level(3, true), LevelFilter::ERROR);
    }

    #[test]
    #[serial]
    fn console_lines_are_forwarded_to_the_ui() {
        let (sender, mut receiver) = mpsc::channel(16);
        let layer = fmt::layer()
            .with_writer(UiLogWriter { sender })
            .with_ansi(false)
            .compact();
        let subscriber = tracing_subscriber::registry().with(layer);

        tracing::subscriber::with_default(subscriber, || {
            info!("cycle 3 started");
        });

        let Ok(UiEvent::Log(line)) = receiver.try_recv() else {
            panic!("expected a log line on the UI channel");
        };
        assert!(line.contains("cycle 3 started"));
        assert!(!line.ends_with('\n'));
    }

    #[test]
    #[serial]
    fn file_layer_appends_to_existing_run_log() {
        let temp_dir = tempfile::tempdir().unwrap();
        let log_path = temp_dir.path().join("nested").join("trial001.log");
        std::fs::create_dir_all(log_path.parent().unwrap()).unwrap();
        std::fs::write(&log_path, "earlier run\n").unwrap();

        let file_layer = fmt::layer()
            .with_writer(open_log_file(&log_path).unwrap())
            .with_ansi(false)
            .with_thread_ids(true)
            .with_filter(LevelFilter::DEBUG);
        let subscriber = tracing_subscriber::registry().with(file_layer);

        tracing::subscriber::with_default(subscriber, || {
            debug!("Message for file-only test.");
            trace!("Filtered out.");
        });

        thread::sleep(Duration::from_millis(100));

        let content = std::fs::read_to_string(log_path).unwrap();
        assert!(content.starts_with("earlier run\n"));
        assert!(content.contains("Message for file-only test."));
        assert!(content.contains("ThreadId"));
        assert!(!content.contains("Filtered out."));
    }

    #[test]
    #[serial]
    fn log_file_in_unwritable_location_is_an_io_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let blocker = temp_dir.path().join("file");
        std::fs::write(&blocker, "").unwrap();

        let result = open_log_file(&blocker.join("trial001.log"));

        assert!(matches!(result, Err(CliError::Io { .. })));
    }
}
