//! Best-effort CSV logging
//!
//! Two logs are written to the working directory: `timestamp.csv` (one line
//! per received mocap frame) and `log.csv` (one record per control tick).
//! Logging must never interfere with control, so creation failure leaves a
//! disabled logger and write errors are dropped after one warning.

use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};

/// Best-effort line-oriented CSV writer
pub struct CsvLog {
    writer: Option<BufWriter<File>>,
    warned: bool,
}

impl CsvLog {
    /// Create (truncating) a CSV file; on failure the log is disabled
    pub fn create(path: &str) -> Self {
        let writer = match File::create(path) {
            Ok(f) => Some(BufWriter::new(f)),
            Err(e) => {
                log::warn!("could not create {path}: {e}; logging disabled");
                None
            }
        };
        Self {
            writer,
            warned: false,
        }
    }

    /// A disabled logger that drops everything
    pub fn disabled() -> Self {
        Self {
            writer: None,
            warned: true,
        }
    }

    /// Write one line; errors are swallowed
    pub fn line(&mut self, args: fmt::Arguments) {
        let Some(writer) = self.writer.as_mut() else {
            return;
        };
        if writeln!(writer, "{args}").is_err() && !self.warned {
            log::warn!("CSV write failed; further failures are silent");
            self.warned = true;
        }
    }

    /// Flush buffered lines; errors are swallowed
    pub fn flush(&mut self) {
        if let Some(writer) = self.writer.as_mut() {
            let _ = writer.flush();
        }
    }
}

impl Drop for CsvLog {
    fn drop(&mut self) {
        self.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_lines_written() {
        let path = std::env::temp_dir().join("rollbot_csv_test.csv");
        let path_str = path.to_str().unwrap();
        {
            let mut log = CsvLog::create(path_str);
            log.line(format_args!("a,b"));
            log.line(format_args!("{},{}", 1, 2.5));
        }
        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "a,b\n1,2.5\n");
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_disabled_log_is_silent() {
        let mut log = CsvLog::disabled();
        log.line(format_args!("dropped"));
        log.flush();
    }
}
