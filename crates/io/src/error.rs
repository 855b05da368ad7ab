use std::path::PathBuf;

use thiserror::Error;

/// Failure to persist one report artifact. Never fatal for the run.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("cannot create {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("CSV write to {} failed: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("workbook {} failed: {source}", path.display())]
    Xlsx {
        path: PathBuf,
        #[source]
        source: rust_xlsxwriter::XlsxError,
    },
    #[error("JSON summary {} failed: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl ReportError {
    pub fn path(&self) -> &std::path::Path {
        match self {
            Self::Io { path, .. }
            | Self::Csv { path, .. }
            | Self::Xlsx { path, .. }
            | Self::Json { path, .. } => path,
        }
    }
}
