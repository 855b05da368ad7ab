use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("config parse error: {0}")]
    Parse(String),
    #[error("missing settings: {}", .0.join(", "))]
    Missing(Vec<String>),
    #[error("invalid setting: {0}")]
    Invalid(String),
}
