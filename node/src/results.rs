//! # Results CSV
//!
//! Appends one `<round>, <error>` row per Vivaldi sampling round so
//! convergence can be plotted after a run. The file is opened, appended,
//! and closed on every write — correctness over performance; a crashed
//! node leaves a complete file behind.
//!
//! Disk trouble never disturbs the protocol: every I/O error is logged and
//! swallowed, and the round counter only advances on successful writes.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use tracing::warn;

/// Header written when the writer creates a fresh file.
const HEADER: &str = "Time, Error";

/// Append-only writer for the per-round error series.
pub struct ResultWriter {
    path: PathBuf,
    enabled: bool,
    round: u64,
}

impl ResultWriter {
    /// Creates a writer targeting `path`. A disabled writer ignores every
    /// append.
    pub fn new(path: PathBuf, enabled: bool) -> Self {
        Self {
            path,
            enabled,
            round: 0,
        }
    }

    /// Appends one row for the current round. Advances the round counter
    /// only when the row actually reached the file.
    pub fn append(&mut self, error: f64) {
        if !self.enabled {
            return;
        }
        match self.write_row(error) {
            Ok(()) => self.round += 1,
            Err(io_error) => {
                warn!(path = %self.path.display(), %io_error, "failed to append result row");
            }
        }
    }

    fn write_row(&self, error: f64) -> std::io::Result<()> {
        let fresh = self
            .path
            .metadata()
            .map(|meta| meta.len() == 0)
            .unwrap_or(true);

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        if fresh {
            writeln!(file, "{HEADER}")?;
        }
        writeln!(file, "{}, {:.6}", self.round, error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_header_then_rows_with_advancing_rounds() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("results.csv");
        let mut writer = ResultWriter::new(path.clone(), true);

        writer.append(1.0);
        writer.append(0.5);
        writer.append(0.25);

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines[0], "Time, Error");
        assert_eq!(lines[1], "0, 1.000000");
        assert_eq!(lines[2], "1, 0.500000");
        assert_eq!(lines[3], "2, 0.250000");
    }

    #[test]
    fn disabled_writer_touches_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("results.csv");
        let mut writer = ResultWriter::new(path.clone(), false);

        writer.append(1.0);
        assert!(!path.exists());
    }

    #[test]
    fn io_errors_are_swallowed_and_do_not_advance_the_round() {
        let dir = tempfile::tempdir().expect("tempdir");
        // The parent directory does not exist, so every open fails.
        let path = dir.path().join("missing").join("results.csv");
        let mut writer = ResultWriter::new(path, true);

        writer.append(1.0);
        writer.append(0.5);
        assert_eq!(writer.round, 0, "failed writes must not advance the round");
    }
}
