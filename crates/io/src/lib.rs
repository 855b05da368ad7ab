//! `idrecon-io` — report sink.
//!
//! Writes classified buckets as four CSV files plus one workbook. Every
//! artifact is attempted; a failed write is recorded and the rest continue.

pub mod csv;
pub mod error;
pub mod json;
pub mod row;
pub mod xlsx;

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use idrecon_recon::ReconResult;

pub use error::ReportError;

/// Name of the consolidated workbook written next to the CSV files.
pub const WORKBOOK_FILE_NAME: &str = "relatorio_divergencias.xlsx";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportOptions {
    /// Render tax IDs with the CPF/CNPJ display mask instead of as stored.
    pub mask_tax_ids: bool,
}

/// What was written and what failed.
#[derive(Debug, Default)]
pub struct ReportOutcome {
    pub written: Vec<PathBuf>,
    pub failures: Vec<ReportError>,
}

impl ReportOutcome {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    fn record(&mut self, result: Result<PathBuf, ReportError>) {
        match result {
            Ok(path) => {
                info!(path = %path.display(), "report written");
                self.written.push(path);
            }
            Err(e) => {
                warn!(path = %e.path().display(), error = %e, "report write failed");
                self.failures.push(e);
            }
        }
    }
}

/// Write the four CSV reports and the workbook into `dir`.
pub fn write_reports(dir: &Path, result: &ReconResult, options: &ReportOptions) -> ReportOutcome {
    let mut outcome = ReportOutcome::default();

    if let Err(source) = std::fs::create_dir_all(dir) {
        outcome.failures.push(ReportError::Io { path: dir.to_path_buf(), source });
        return outcome;
    }

    for (_, written) in crate::csv::export_all(dir, &result.buckets, options) {
        outcome.record(written);
    }

    let workbook_path = dir.join(WORKBOOK_FILE_NAME);
    let workbook = xlsx::export(&workbook_path, &result.buckets, options).map(|_| workbook_path);
    outcome.record(workbook);

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use idrecon_recon::engine::{run, ReconInput};
    use idrecon_recon::{Category, DivergenceRecord};
    use tempfile::tempdir;

    fn result() -> ReconResult {
        let input = ReconInput {
            records: vec![DivergenceRecord::from_raw("a1", "s1", "111", "222")],
            ..Default::default()
        };
        run(&input).unwrap()
    }

    #[test]
    fn writes_five_artifacts() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("out");
        let outcome = write_reports(&out, &result(), &ReportOptions::default());
        assert!(outcome.is_complete(), "{:?}", outcome.failures);
        assert_eq!(outcome.written.len(), 5);
        for c in Category::ALL {
            assert!(out.join(c.csv_file_name()).is_file());
        }
        assert!(out.join(WORKBOOK_FILE_NAME).is_file());
    }

    #[test]
    fn workbook_failure_keeps_csv_files() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join(WORKBOOK_FILE_NAME)).unwrap();

        let outcome = write_reports(dir.path(), &result(), &ReportOptions::default());
        assert_eq!(outcome.written.len(), 4);
        assert_eq!(outcome.failures.len(), 1);
        assert!(matches!(outcome.failures[0], ReportError::Xlsx { .. }));
    }
}
