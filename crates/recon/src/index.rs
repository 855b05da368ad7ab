use std::collections::{BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::model::DivergenceRecord;

/// Every distinct, non-empty canonical key referenced by `records`, sorted.
///
/// This is the batch sent to the contract and person stores: one lookup per
/// store no matter how many records share a key.
pub fn key_universe(records: &[DivergenceRecord]) -> Vec<String> {
    let mut keys = BTreeSet::new();
    for r in records {
        for key in [&r.tax_id_accounts_key, &r.tax_id_management_key] {
            if !key.is_empty() {
                keys.insert(key.as_str());
            }
        }
    }
    keys.into_iter().map(str::to_string).collect()
}

// ---------------------------------------------------------------------------
// Lookups
// ---------------------------------------------------------------------------

/// "Does this canonical key appear in the contract store?"
pub trait ExistenceLookup {
    fn exists(&self, key: &str) -> bool;
}

/// Canonical key → e-mail on file, if any.
pub trait EmailLookup {
    fn email(&self, key: &str) -> Option<&str>;
}

// ---------------------------------------------------------------------------
// Existence index
// ---------------------------------------------------------------------------

/// Canonical keys confirmed present in the insured-party table.
#[derive(Debug, Clone, Default)]
pub struct ExistenceIndex {
    keys: HashSet<String>,
}

impl ExistenceIndex {
    /// Build from keys returned by the contract store. Empty keys are dropped.
    pub fn from_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keys = keys
            .into_iter()
            .map(Into::into)
            .filter(|k: &String| !k.is_empty())
            .collect();
        Self { keys }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl ExistenceLookup for ExistenceIndex {
    fn exists(&self, key: &str) -> bool {
        !key.is_empty() && self.keys.contains(key)
    }
}

// ---------------------------------------------------------------------------
// Email index
// ---------------------------------------------------------------------------

/// What to keep when one canonical key has several e-mails on file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmailTieBreak {
    /// Last row observed wins. Depends on the store's row order.
    #[default]
    Last,
    /// Lexicographically smallest e-mail wins. Deterministic.
    Smallest,
}

impl std::fmt::Display for EmailTieBreak {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Last => write!(f, "last"),
            Self::Smallest => write!(f, "smallest"),
        }
    }
}

impl std::str::FromStr for EmailTieBreak {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "last" => Ok(Self::Last),
            "smallest" => Ok(Self::Smallest),
            other => Err(format!("unknown e-mail tie-break '{other}' (expected 'last' or 'smallest')")),
        }
    }
}

/// Canonical key → trimmed e-mail.
#[derive(Debug, Clone, Default)]
pub struct EmailIndex {
    emails: HashMap<String, String>,
    duplicates: usize,
}

impl EmailIndex {
    /// Build from `(canonical_key, raw_email)` rows.
    ///
    /// Rows with an empty key or a null e-mail are skipped. Every other e-mail
    /// is stored trimmed, so a whitespace-only one is stored as `""` and reads
    /// as "no e-mail" to the classifier.
    pub fn from_rows<I, K, E>(rows: I, tie_break: EmailTieBreak) -> Self
    where
        I: IntoIterator<Item = (K, Option<E>)>,
        K: Into<String>,
        E: AsRef<str>,
    {
        let mut index = Self::default();
        for (key, email) in rows {
            let key = key.into();
            let Some(email) = email else { continue };
            if key.is_empty() {
                continue;
            }
            let email = email.as_ref().trim();
            index.insert(key, email, tie_break);
        }
        index
    }

    fn insert(&mut self, key: String, email: &str, tie_break: EmailTieBreak) {
        match self.emails.get_mut(&key) {
            Some(existing) => {
                if existing != email {
                    self.duplicates += 1;
                }
                let replace = match tie_break {
                    EmailTieBreak::Last => true,
                    // Blank never beats a real address
                    EmailTieBreak::Smallest => {
                        existing.is_empty() || (!email.is_empty() && email < existing.as_str())
                    }
                };
                if replace {
                    *existing = email.to_string();
                }
            }
            None => {
                self.emails.insert(key, email.to_string());
            }
        }
    }

    pub fn len(&self) -> usize {
        self.emails.len()
    }

    pub fn is_empty(&self) -> bool {
        self.emails.is_empty()
    }

    /// Number of rows that carried a different e-mail for an already-seen key.
    pub fn conflicting_rows(&self) -> usize {
        self.duplicates
    }
}

impl EmailLookup for EmailIndex {
    fn email(&self, key: &str) -> Option<&str> {
        if key.is_empty() {
            return None;
        }
        self.emails.get(key).map(String::as_str)
    }
}
