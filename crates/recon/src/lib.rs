//! `idrecon-recon` — tax-ID divergence classification engine.
//!
//! Pure engine crate: receives pre-loaded divergence records and the two
//! lookup indices, returns classified buckets. No CLI or IO dependencies.

pub mod classify;
pub mod engine;
pub mod error;
pub mod evidence;
pub mod index;
pub mod model;
pub mod normalize;

pub use classify::classify;
pub use engine::run;
pub use error::ReconError;
pub use index::{key_universe, EmailIndex, EmailLookup, EmailTieBreak, ExistenceIndex, ExistenceLookup};
pub use model::{Category, ClassifiedRecord, DivergenceRecord, ReconResult, ReconSummary, ReportBuckets};
pub use normalize::{canonical_key, format_tax_id, normalize_tax_id};
