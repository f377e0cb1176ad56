//! Logger setup.
//!
//! Records go to stderr and, when a log file is given, are appended to it.
//! The default filter is `info`; `RUST_LOG` overrides it.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Logger already initialized: {0}")]
    AlreadyInitialized(#[from] log::SetLoggerError),
}

/// Writes every record to stderr and to an append-mode file.
struct TeeWriter {
    file: File,
}

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stderr().write_all(buf)?;
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()?;
        self.file.flush()
    }
}

/// Line layout: `MM-DD HH:MM - LEVEL    message`.
pub fn format_line(timestamp: &chrono::DateTime<chrono::Local>, level: log::Level, message: &str) -> String {
    format!("{} - {:<8} {}", timestamp.format("%m-%d %H:%M"), level, message)
}

/// Install the global logger.
pub fn init_logging(log_file: Option<&Path>) -> Result<(), LoggingError> {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    builder.format(|buf, record| {
        writeln!(
            buf,
            "{}",
            format_line(&chrono::Local::now(), record.level(), &record.args().to_string())
        )
    });

    if let Some(path) = log_file {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        builder.target(env_logger::Target::Pipe(Box::new(TeeWriter { file })));
    }

    builder.try_init()?;
    Ok(())
}
