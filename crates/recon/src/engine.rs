use tracing::{debug, warn};

use crate::classify::classify;
use crate::error::ReconError;
use crate::evidence::compute_summary;
use crate::index::{key_universe, EmailIndex, EmailTieBreak, ExistenceIndex};
use crate::model::{DivergenceRecord, ReconMeta, ReconResult, ReportBuckets};

/// Everything the classifier needs, loaded up front.
#[derive(Debug, Default)]
pub struct ReconInput {
    pub records: Vec<DivergenceRecord>,
    pub existence: ExistenceIndex,
    pub emails: EmailIndex,
    pub email_tie_break: EmailTieBreak,
}

/// Classify every record into its bucket. Returns buckets + summary.
///
/// Fails without classifying anything if a record's keys are not the
/// canonical form of its raw tax IDs.
pub fn run(input: &ReconInput) -> Result<ReconResult, ReconError> {
    for record in &input.records {
        record.check_keys()?;
    }

    let mut buckets = ReportBuckets::default();
    let mut malformed = 0;

    for record in &input.records {
        if record.has_empty_key() {
            malformed += 1;
            warn!(
                account_id = %record.account_id,
                management_id = %record.management_id,
                "tax ID without digits; that side reads as not insured"
            );
        }
        let classified = classify(record, &input.existence, &input.emails);
        debug!(account_id = %record.account_id, category = %classified.category, "classified");
        buckets.push(classified);
    }

    let summary = compute_summary(&buckets, key_universe(&input.records).len(), malformed);

    Ok(ReconResult {
        meta: ReconMeta {
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            run_at: chrono::Utc::now().to_rfc3339(),
            email_tie_break: input.email_tie_break,
        },
        summary,
        buckets,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Category;
    use proptest::prelude::*;

    fn key(n: u8) -> String {
        format!("{:011}", n)
    }

    #[test]
    fn inconsistent_key_aborts_whole_run() {
        let mut bad = DivergenceRecord::from_raw("a2", "s2", "1", "2");
        bad.tax_id_accounts_key = "9".into();
        let input = ReconInput {
            records: vec![DivergenceRecord::from_raw("a1", "s1", "1", "2"), bad],
            ..Default::default()
        };
        assert!(run(&input).is_err());
    }

    #[test]
    fn empty_keys_never_exist() {
        // Both sides empty must not collide into a spurious match
        let input = ReconInput {
            records: vec![DivergenceRecord::from_raw("a1", "s1", "n/a", "--")],
            existence: ExistenceIndex::from_keys([""]),
            emails: EmailIndex::from_rows([("", Some("x@x.com"))], EmailTieBreak::Last),
            email_tie_break: EmailTieBreak::Last,
        };
        let result = run(&input).unwrap();
        assert_eq!(result.summary.both_missing, 1);
        assert_eq!(result.summary.malformed_keys, 1);
        assert_eq!(result.summary.distinct_keys, 0);
    }

    #[test]
    fn empty_input_gives_empty_buckets() {
        let result = run(&ReconInput::default()).unwrap();
        assert_eq!(result.summary.total, 0);
        assert!(result.buckets.is_empty());
    }

    proptest! {
        #[test]
        fn buckets_partition_input(
            pairs in prop::collection::vec((0u8..12, 0u8..12), 0..200),
            insured in prop::collection::hash_set(0u8..12, 0..12),
            emails in prop::collection::vec((0u8..12, prop::option::of(0u8..3)), 0..24),
        ) {
            let records: Vec<_> = pairs
                .iter()
                .enumerate()
                .map(|(i, (a, m))| DivergenceRecord::from_raw(format!("a{i}"), format!("s{i}"), key(*a), key(*m)))
                .collect();
            let input = ReconInput {
                records: records.clone(),
                existence: ExistenceIndex::from_keys(insured.iter().map(|k| key(*k))),
                emails: EmailIndex::from_rows(
                    emails.iter().map(|(k, e)| (key(*k), e.map(|e| format!("u{e}@x.com")))),
                    EmailTieBreak::Last,
                ),
                email_tie_break: EmailTieBreak::Last,
            };
            let result = run(&input).unwrap();

            prop_assert_eq!(result.buckets.len(), records.len());
            let s = &result.summary;
            prop_assert_eq!(s.email_match + s.one_missing + s.both_missing + s.other, records.len());

            let mut seen: Vec<&str> = result
                .buckets
                .iter()
                .flat_map(|(_, recs)| recs.iter().map(|r| r.record.account_id.as_str()))
                .collect();
            seen.sort_unstable();
            seen.dedup();
            prop_assert_eq!(seen.len(), records.len());

            for (category, recs) in result.buckets.iter() {
                for r in recs {
                    prop_assert_eq!(r.category, category);
                    prop_assert_eq!(r.common_email.is_some(), category == Category::EmailMatch);
                }
            }
        }
    }
}
