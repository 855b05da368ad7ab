use std::collections::BTreeMap;

use crate::model::{Category, ReconSummary, ReportBuckets};

/// Compute summary statistics from filled buckets.
pub fn compute_summary(buckets: &ReportBuckets, distinct_keys: usize, malformed_keys: usize) -> ReconSummary {
    let mut bucket_counts = BTreeMap::new();
    for (category, records) in buckets.iter() {
        bucket_counts.insert(category.slug().to_string(), records.len());
    }

    ReconSummary {
        total: buckets.len(),
        email_match: buckets.bucket(Category::EmailMatch).len(),
        one_missing: buckets.bucket(Category::OneMissing).len(),
        both_missing: buckets.bucket(Category::BothMissing).len(),
        other: buckets.bucket(Category::Other).len(),
        distinct_keys,
        malformed_keys,
        bucket_counts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ClassifiedRecord, DivergenceRecord};

    fn classified(category: Category) -> ClassifiedRecord {
        ClassifiedRecord {
            record: DivergenceRecord::from_raw("a", "s", "1", "2"),
            exists_in_management_side: false,
            exists_in_accounts_side: false,
            common_email: None,
            category,
        }
    }

    #[test]
    fn summary_counts() {
        let mut buckets = ReportBuckets::default();
        for c in [
            Category::EmailMatch,
            Category::EmailMatch,
            Category::Other,
            Category::BothMissing,
            Category::OneMissing,
        ] {
            buckets.push(classified(c));
        }
        let summary = compute_summary(&buckets, 7, 1);
        assert_eq!(summary.total, 5);
        assert_eq!(summary.email_match, 2);
        assert_eq!(summary.one_missing, 1);
        assert_eq!(summary.both_missing, 1);
        assert_eq!(summary.other, 1);
        assert_eq!(summary.distinct_keys, 7);
        assert_eq!(summary.malformed_keys, 1);
        assert_eq!(summary.bucket_counts["email_match"], 2);
        assert_eq!(summary.count(Category::Other), 1);
    }

    #[test]
    fn empty_buckets_still_listed() {
        let summary = compute_summary(&ReportBuckets::default(), 0, 0);
        assert_eq!(summary.total, 0);
        assert_eq!(summary.bucket_counts.len(), 4);
        assert!(summary.bucket_counts.values().all(|&n| n == 0));
    }
}
