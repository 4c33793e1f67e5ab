use simplelog::{
    ColorChoice, CombinedLogger, ConfigBuilder, LevelFilter, SharedLogger, TermLogger,
    TerminalMode, WriteLogger,
};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::paths::HelloPaths;

/// Append-only writer for the update log.
///
/// The poller can run for weeks, so the file is capped while writing: once
/// it grows past `max_size` the older half is dropped. A log file deleted
/// from under a running process is recreated on the next write.
struct UpdateLogWriter {
    path: PathBuf,
    max_size: u64,
    file: File,
}

impl UpdateLogWriter {
    fn open(path: PathBuf, max_size: u64) -> io::Result<Self> {
        trim_to_recent_half(&path, max_size);
        let file = open_append(&path)?;
        Ok(Self {
            path,
            max_size,
            file,
        })
    }

    fn reopen_if_removed(&mut self) -> io::Result<()> {
        if !self.path.exists() {
            if let Some(parent) = self.path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            self.file = open_append(&self.path)?;
        }
        Ok(())
    }

    fn enforce_size_cap(&mut self) -> io::Result<()> {
        if self.file.metadata()?.len() > self.max_size {
            self.file.flush()?;
            trim_to_recent_half(&self.path, self.max_size);
            self.file = open_append(&self.path)?;
        }
        Ok(())
    }
}

impl Write for UpdateLogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.reopen_if_removed()?;
        let written = self.file.write(buf)?;
        self.enforce_size_cap()?;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Keep the newer half of `log_path`, cut at a line boundary, when it is
/// larger than `max_size`.
fn trim_to_recent_half(log_path: &Path, max_size: u64) {
    if let Ok(metadata) = std::fs::metadata(log_path)
        && metadata.len() > max_size
        && let Ok(contents) = std::fs::read(log_path)
    {
        let half = contents.len() / 2;
        let keep_from = contents[half..]
            .iter()
            .position(|&b| b == b'\n')
            .map_or(half, |pos| half + pos + 1);
        let _ = std::fs::write(log_path, &contents[keep_from..]);
    }
}

/// Install terminal + file logging for the updater and the demo itself.
pub fn init_logging(debug_enabled: bool, max_log_size: u64) {
    let config = ConfigBuilder::new()
        .set_time_format_rfc3339()
        .add_filter_allow_str("relup")
        .build();

    let terminal_level = if debug_enabled {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        terminal_level,
        config.clone(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )];

    let log_path = HelloPaths::new().ok().and_then(|paths| {
        paths.ensure_dirs().ok()?;
        Some(paths.log_file())
    });
    if let Some(log_path) = &log_path
        && let Ok(writer) = UpdateLogWriter::open(log_path.clone(), max_log_size)
    {
        loggers.push(WriteLogger::new(LevelFilter::Debug, config, writer));
    }

    let _ = CombinedLogger::init(loggers);

    if let Some(log_path) = log_path {
        log::debug!("Logging initialized, log file: {}", log_path.display());
    }
}
