use crate::index::{EmailLookup, ExistenceLookup};
use crate::model::{Category, ClassifiedRecord, DivergenceRecord};

/// Classify one divergence record. First match wins:
///
/// 1. neither tax ID insured → `BothMissing`
/// 2. exactly one insured → `OneMissing` (e-mails are not consulted)
/// 3. both insured, both e-mails present and equal → `EmailMatch`
/// 4. anything else → `Other`
pub fn classify<X, E>(record: &DivergenceRecord, existence: &X, emails: &E) -> ClassifiedRecord
where
    X: ExistenceLookup + ?Sized,
    E: EmailLookup + ?Sized,
{
    let exists_management = existence.exists(&record.tax_id_management_key);
    let exists_accounts = existence.exists(&record.tax_id_accounts_key);

    let (category, common_email) = match (exists_management, exists_accounts) {
        (false, false) => (Category::BothMissing, None),
        (true, false) | (false, true) => (Category::OneMissing, None),
        (true, true) => {
            let email_accounts = emails.email(&record.tax_id_accounts_key);
            let email_management = emails.email(&record.tax_id_management_key);
            match (email_accounts, email_management) {
                (Some(a), Some(m)) if !a.is_empty() && a == m => {
                    (Category::EmailMatch, Some(a.to_string()))
                }
                _ => (Category::Other, None),
            }
        }
    };

    ClassifiedRecord {
        record: record.clone(),
        exists_in_management_side: exists_management,
        exists_in_accounts_side: exists_accounts,
        common_email,
        category,
    }
}
