use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconError {
    /// A record's canonical key disagrees with its display value.
    #[error("record '{account_id}': {side} key '{key}' is not the canonical form of '{raw}'")]
    InconsistentKey {
        account_id: String,
        side: &'static str,
        raw: String,
        key: String,
    },
}
