use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::ReconError;
use crate::index::EmailTieBreak;
use crate::normalize::canonical_key;

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// One identity pair whose tax ID disagrees between the management store and
/// the accounts store once both are compared canonically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DivergenceRecord {
    pub account_id: String,
    pub management_id: String,
    pub tax_id_accounts_raw: String,
    pub tax_id_management_raw: String,
    pub tax_id_accounts_key: String,
    pub tax_id_management_key: String,
}

impl DivergenceRecord {
    /// Build a record from display-format tax IDs, deriving both keys.
    pub fn from_raw(
        account_id: impl Into<String>,
        management_id: impl Into<String>,
        tax_id_accounts_raw: impl Into<String>,
        tax_id_management_raw: impl Into<String>,
    ) -> Self {
        let tax_id_accounts_raw = tax_id_accounts_raw.into();
        let tax_id_management_raw = tax_id_management_raw.into();
        Self {
            account_id: account_id.into(),
            management_id: management_id.into(),
            tax_id_accounts_key: canonical_key(&tax_id_accounts_raw),
            tax_id_management_key: canonical_key(&tax_id_management_raw),
            tax_id_accounts_raw,
            tax_id_management_raw,
        }
    }

    /// Verify `key == normalize(raw)` on both sides.
    pub fn check_keys(&self) -> Result<(), ReconError> {
        for (side, raw, key) in [
            ("accounts", &self.tax_id_accounts_raw, &self.tax_id_accounts_key),
            ("management", &self.tax_id_management_raw, &self.tax_id_management_key),
        ] {
            let expected = canonical_key(raw);
            if *key != expected {
                return Err(ReconError::InconsistentKey {
                    account_id: self.account_id.clone(),
                    side,
                    raw: raw.clone(),
                    key: key.clone(),
                });
            }
        }
        Ok(())
    }

    /// True when either canonical key is empty (no digits in the source value).
    pub fn has_empty_key(&self) -> bool {
        self.tax_id_accounts_key.is_empty() || self.tax_id_management_key.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Terminal outcome of classifying one divergence record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    EmailMatch,
    OneMissing,
    BothMissing,
    Other,
}

impl Category {
    /// Report order: email-match, one-missing, both-missing, other.
    pub const ALL: [Category; 4] = [
        Category::EmailMatch,
        Category::OneMissing,
        Category::BothMissing,
        Category::Other,
    ];

    pub fn slug(&self) -> &'static str {
        match self {
            Self::EmailMatch => "email_match",
            Self::OneMissing => "one_missing",
            Self::BothMissing => "both_missing",
            Self::Other => "other",
        }
    }

    /// File name of the per-category CSV report.
    pub fn csv_file_name(&self) -> &'static str {
        match self {
            Self::EmailMatch => "relatorio_email_duplicado.csv",
            Self::OneMissing => "relatorio_um_cpf_inexistente.csv",
            Self::BothMissing => "relatorio_ambos_cpf_inexistentes.csv",
            Self::Other => "relatorio_outros_erros.csv",
        }
    }

    /// Worksheet name in the consolidated workbook (max 31 chars).
    pub fn sheet_name(&self) -> &'static str {
        match self {
            Self::EmailMatch => "Email Duplicado",
            Self::OneMissing => "Um CPF Inexistente",
            Self::BothMissing => "Ambos Inexistentes",
            Self::Other => "Outros",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::EmailMatch => "both tax IDs insured, same e-mail on file",
            Self::OneMissing => "only one tax ID insured",
            Self::BothMissing => "neither tax ID insured",
            Self::Other => "both insured, e-mail differs or missing",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.slug())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassifiedRecord {
    #[serde(flatten)]
    pub record: DivergenceRecord,
    pub exists_in_management_side: bool,
    pub exists_in_accounts_side: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub common_email: Option<String>,
    pub category: Category,
}

impl ClassifiedRecord {
    /// The accounts side is treated as the real owner whenever its tax ID is insured.
    pub fn accounts_is_authoritative(&self) -> bool {
        self.exists_in_accounts_side
    }
}

// ---------------------------------------------------------------------------
// Buckets
// ---------------------------------------------------------------------------

/// Four ordered sequences of classified records, one per category.
///
/// Every pushed record lands in exactly one bucket; input order is kept
/// within a bucket.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReportBuckets {
    pub email_match: Vec<ClassifiedRecord>,
    pub one_missing: Vec<ClassifiedRecord>,
    pub both_missing: Vec<ClassifiedRecord>,
    pub other: Vec<ClassifiedRecord>,
}

impl ReportBuckets {
    pub fn push(&mut self, record: ClassifiedRecord) {
        self.bucket_mut(record.category).push(record);
    }

    pub fn bucket(&self, category: Category) -> &[ClassifiedRecord] {
        match category {
            Category::EmailMatch => &self.email_match,
            Category::OneMissing => &self.one_missing,
            Category::BothMissing => &self.both_missing,
            Category::Other => &self.other,
        }
    }

    fn bucket_mut(&mut self, category: Category) -> &mut Vec<ClassifiedRecord> {
        match category {
            Category::EmailMatch => &mut self.email_match,
            Category::OneMissing => &mut self.one_missing,
            Category::BothMissing => &mut self.both_missing,
            Category::Other => &mut self.other,
        }
    }

    /// Buckets in report order.
    pub fn iter(&self) -> impl Iterator<Item = (Category, &[ClassifiedRecord])> {
        Category::ALL.into_iter().map(move |c| (c, self.bucket(c)))
    }

    pub fn len(&self) -> usize {
        Category::ALL.iter().map(|c| self.bucket(*c).len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// Summary + Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconSummary {
    pub total: usize,
    pub email_match: usize,
    pub one_missing: usize,
    pub both_missing: usize,
    pub other: usize,
    pub distinct_keys: usize,
    pub malformed_keys: usize,
    pub bucket_counts: BTreeMap<String, usize>,
}

impl ReconSummary {
    pub fn count(&self, category: Category) -> usize {
        match category {
            Category::EmailMatch => self.email_match,
            Category::OneMissing => self.one_missing,
            Category::BothMissing => self.both_missing,
            Category::Other => self.other,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconMeta {
    pub engine_version: String,
    pub run_at: String,
    pub email_tie_break: EmailTieBreak,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconResult {
    pub meta: ReconMeta,
    pub summary: ReconSummary,
    #[serde(skip)]
    pub buckets: ReportBuckets,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_raw_derives_keys() {
        let r = DivergenceRecord::from_raw("acc-1", "sso-1", "123.456.789-09", "987.654.321-00");
        assert_eq!(r.tax_id_accounts_key, "12345678909");
        assert_eq!(r.tax_id_management_key, "98765432100");
        assert!(r.check_keys().is_ok());
        assert!(!r.has_empty_key());
    }

    #[test]
    fn check_keys_rejects_mismatch() {
        let mut r = DivergenceRecord::from_raw("acc-1", "sso-1", "123.456.789-09", "987.654.321-00");
        r.tax_id_management_key = "111".into();
        let err = r.check_keys().unwrap_err();
        assert!(err.to_string().contains("management"));
        assert!(err.to_string().contains("acc-1"));
    }

    #[test]
    fn empty_key_detected() {
        let r = DivergenceRecord::from_raw("acc-1", "sso-1", "n/a", "987.654.321-00");
        assert!(r.has_empty_key());
    }

    #[test]
    fn category_order_and_names() {
        let slugs: Vec<_> = Category::ALL.iter().map(|c| c.slug()).collect();
        assert_eq!(slugs, ["email_match", "one_missing", "both_missing", "other"]);
        for c in Category::ALL {
            assert!(c.sheet_name().len() <= 31);
            assert!(c.csv_file_name().ends_with(".csv"));
        }
    }
}
