//! Source readers: where divergences, insured keys and contact e-mails come from.
//!
//! Live runs read PostgreSQL (`postgres`); offline runs read CSV exports
//! (`csv_files`). Both answer the same three batched questions.

pub mod csv_files;
pub mod postgres;

use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use idrecon_recon::DivergenceRecord;

pub use csv_files::{CsvPaths, CsvSources};
pub use postgres::PgSources;

#[async_trait]
pub trait ReconSource: Send + Sync {
    /// Identity pairs whose canonical tax IDs differ between management and accounts.
    async fn divergences(&self) -> Result<Vec<DivergenceRecord>, SourceError>;

    /// The subset of `keys` present in the insured-party table. One round trip.
    async fn existing_keys(&self, keys: &[String]) -> Result<Vec<String>, SourceError>;

    /// `(canonical_key, raw_email)` contact rows for `keys`. One round trip.
    async fn emails(&self, keys: &[String]) -> Result<Vec<(String, Option<String>)>, SourceError>;
}

/// The three directly-connected stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Store {
    Management,
    Contract,
    Person,
}

impl fmt::Display for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Management => write!(f, "management"),
            Self::Contract => write!(f, "contract"),
            Self::Person => write!(f, "person"),
        }
    }
}

/// Read phase, used to scope query failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Divergences,
    Existence,
    Emails,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Divergences => write!(f, "divergence fetch"),
            Self::Existence => write!(f, "insured-party lookup"),
            Self::Emails => write!(f, "contact e-mail lookup"),
        }
    }
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("cannot connect to {store} store ({target}): {source}")]
    Connectivity {
        store: Store,
        target: String,
        #[source]
        source: sqlx::Error,
    },
    #[error("{phase} failed: {source}")]
    Query {
        phase: Phase,
        #[source]
        source: sqlx::Error,
    },
    #[error("{phase} timed out after {}s", .after.as_secs())]
    Timeout { phase: Phase, after: Duration },
    #[error("{}: {message}", path.display())]
    Input { path: PathBuf, message: String },
}

/// Run one query future under a per-query timeout.
pub(crate) async fn timed<T, F>(phase: Phase, limit: Duration, fut: F) -> Result<T, SourceError>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(source)) => Err(SourceError::Query { phase, source }),
        Err(_) => Err(SourceError::Timeout { phase, after: limit }),
    }
}
