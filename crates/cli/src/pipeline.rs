//! Read + classify: divergences, one existence batch, one e-mail batch, engine.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use idrecon_recon::engine::ReconInput;
use idrecon_recon::{key_universe, EmailIndex, EmailTieBreak, ExistenceIndex, ReconError, ReconResult};

use crate::sources::{ReconSource, SourceError};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Recon(#[from] ReconError),
    #[error("reconciliation did not finish within {}s", .0.as_secs())]
    OverallTimeout(Duration),
}

/// Run `work` (connect, read, classify) under the overall deadline.
pub async fn with_deadline<T, F>(limit: Duration, work: F) -> Result<T, PipelineError>
where
    F: Future<Output = Result<T, PipelineError>>,
{
    match tokio::time::timeout(limit, work).await {
        Ok(result) => result,
        Err(_) => Err(PipelineError::OverallTimeout(limit)),
    }
}

/// Fetch divergences and classify them.
///
/// Returns `None` when there are no divergences; nothing else is queried then.
/// Existence and e-mails are each fetched in one call covering every distinct
/// non-empty key.
pub async fn reconcile(
    source: &dyn ReconSource,
    tie_break: EmailTieBreak,
    quiet: bool,
) -> Result<Option<ReconResult>, PipelineError> {
    let progress = |line: String| {
        if !quiet {
            eprintln!("{line}");
        }
    };

    progress("[1/4] fetching divergences".to_string());
    let records = source.divergences().await?;
    info!(records = records.len(), "divergences loaded");
    if records.is_empty() {
        return Ok(None);
    }

    let keys = key_universe(&records);
    progress(format!(
        "[2/4] checking insured parties ({} records, {} distinct tax IDs)",
        records.len(),
        keys.len()
    ));
    let existence = if keys.is_empty() {
        ExistenceIndex::default()
    } else {
        ExistenceIndex::from_keys(source.existing_keys(&keys).await?)
    };
    info!(found = existence.len(), requested = keys.len(), "insured keys loaded");

    progress("[3/4] loading contact e-mails".to_string());
    let emails = if keys.is_empty() {
        EmailIndex::default()
    } else {
        EmailIndex::from_rows(source.emails(&keys).await?, tie_break)
    };
    if emails.conflicting_rows() > 0 {
        warn!(
            rows = emails.conflicting_rows(),
            tie_break = %tie_break,
            "tax IDs with more than one contact e-mail"
        );
    }

    progress("[4/4] classifying".to_string());
    let input = ReconInput { records, existence, emails, email_tie_break: tie_break };
    let result = idrecon_recon::run(&input)?;
    Ok(Some(result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use idrecon_recon::{Category, DivergenceRecord};
    use std::sync::Mutex;

    /// Serves canned rows and records every batch it is asked for.
    #[derive(Default)]
    struct CountingSource {
        records: Vec<DivergenceRecord>,
        insured: Vec<String>,
        contacts: Vec<(String, Option<String>)>,
        existence_calls: Mutex<Vec<Vec<String>>>,
        email_calls: Mutex<Vec<Vec<String>>>,
    }

    #[async_trait]
    impl ReconSource for CountingSource {
        async fn divergences(&self) -> Result<Vec<DivergenceRecord>, SourceError> {
            Ok(self.records.clone())
        }

        async fn existing_keys(&self, keys: &[String]) -> Result<Vec<String>, SourceError> {
            self.existence_calls.lock().unwrap().push(keys.to_vec());
            Ok(self.insured.iter().filter(|k| keys.contains(k)).cloned().collect())
        }

        async fn emails(&self, keys: &[String]) -> Result<Vec<(String, Option<String>)>, SourceError> {
            self.email_calls.lock().unwrap().push(keys.to_vec());
            Ok(self.contacts.iter().filter(|(k, _)| keys.contains(k)).cloned().collect())
        }
    }

    #[tokio::test]
    async fn one_batch_per_lookup() {
        // 1000 records cycling over 10 distinct keys
        let records = (0..1000)
            .map(|i| {
                let a = format!("{:011}", i % 5);
                let m = format!("{:011}", 5 + i % 5);
                DivergenceRecord::from_raw(format!("a{i}"), format!("s{i}"), a, m)
            })
            .collect();
        let source = CountingSource { records, ..Default::default() };

        let result = reconcile(&source, EmailTieBreak::Last, true).await.unwrap().unwrap();
        assert_eq!(result.summary.total, 1000);
        assert_eq!(result.summary.distinct_keys, 10);

        let existence_calls = source.existence_calls.lock().unwrap();
        let email_calls = source.email_calls.lock().unwrap();
        assert_eq!(existence_calls.len(), 1);
        assert_eq!(email_calls.len(), 1);
        assert_eq!(existence_calls[0].len(), 10);
        assert_eq!(email_calls[0].len(), 10);
    }

    #[tokio::test]
    async fn no_divergences_queries_nothing_else() {
        let source = CountingSource::default();
        let result = reconcile(&source, EmailTieBreak::Last, true).await.unwrap();
        assert!(result.is_none());
        assert!(source.existence_calls.lock().unwrap().is_empty());
        assert!(source.email_calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn digitless_records_skip_lookups() {
        let source = CountingSource {
            records: vec![DivergenceRecord::from_raw("a1", "s1", "n/a", "--")],
            ..Default::default()
        };
        let result = reconcile(&source, EmailTieBreak::Last, true).await.unwrap().unwrap();
        assert_eq!(result.summary.both_missing, 1);
        assert_eq!(result.summary.malformed_keys, 1);
        assert!(source.existence_calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn classifies_with_loaded_indices() {
        let source = CountingSource {
            records: vec![
                DivergenceRecord::from_raw("a1", "s1", "111", "222"),
                DivergenceRecord::from_raw("a2", "s2", "333", "444"),
            ],
            insured: vec!["111".into(), "222".into(), "444".into()],
            contacts: vec![
                ("111".into(), Some(" dup@x.com ".into())),
                ("222".into(), Some("dup@x.com".into())),
            ],
            ..Default::default()
        };
        let result = reconcile(&source, EmailTieBreak::Last, true).await.unwrap().unwrap();
        assert_eq!(result.buckets.bucket(Category::EmailMatch).len(), 1);
        assert_eq!(result.buckets.bucket(Category::OneMissing).len(), 1);
    }

    #[tokio::test]
    async fn source_failure_propagates() {
        struct Failing;

        #[async_trait]
        impl ReconSource for Failing {
            async fn divergences(&self) -> Result<Vec<DivergenceRecord>, SourceError> {
                Err(SourceError::Input { path: "d.csv".into(), message: "bad row".into() })
            }
            async fn existing_keys(&self, _: &[String]) -> Result<Vec<String>, SourceError> {
                unreachable!()
            }
            async fn emails(&self, _: &[String]) -> Result<Vec<(String, Option<String>)>, SourceError> {
                unreachable!()
            }
        }

        let err = reconcile(&Failing, EmailTieBreak::Last, true).await.unwrap_err();
        assert!(matches!(err, PipelineError::Source(SourceError::Input { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_covers_the_whole_run() {
        let err = with_deadline(Duration::from_secs(900), async {
            tokio::time::sleep(Duration::from_secs(901)).await;
            Ok::<_, PipelineError>(())
        })
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "reconciliation did not finish within 900s");
    }
}
