//! Offline source readers over CSV exports of the three stores.
//!
//! Three files:
//! - divergences: `account_id, management_id, tax_id_accounts, tax_id_management`
//!   (the report column names `id_accounts, sso_id_gestao, cpf_accounts, cpf_gestao`
//!   are accepted too)
//! - insured: `cpf_cnpj`
//! - contacts: `cpf_cnpj, email`
//!
//! Tax IDs are read raw and normalized at load time.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use idrecon_recon::{canonical_key, DivergenceRecord};

use super::{ReconSource, SourceError};

#[derive(Debug, Clone)]
pub struct CsvPaths {
    pub divergences: PathBuf,
    pub insured: PathBuf,
    pub contacts: PathBuf,
}

pub struct CsvSources {
    paths: CsvPaths,
}

impl CsvSources {
    pub fn new(paths: CsvPaths) -> Self {
        Self { paths }
    }
}

#[derive(Debug, Deserialize)]
struct DivergenceRow {
    #[serde(alias = "id_accounts", alias = "id_account")]
    account_id: String,
    #[serde(alias = "sso_id_gestao", alias = "sso_id")]
    management_id: String,
    #[serde(alias = "cpf_accounts", alias = "cpf_visual_accounts", default)]
    tax_id_accounts: String,
    #[serde(alias = "cpf_gestao", alias = "cpf_visual_gestao", default)]
    tax_id_management: String,
}

#[derive(Debug, Deserialize)]
struct InsuredRow {
    #[serde(alias = "cpf")]
    cpf_cnpj: String,
}

#[derive(Debug, Deserialize)]
struct ContactRow {
    #[serde(alias = "cpf")]
    cpf_cnpj: String,
    #[serde(alias = "valor", default)]
    email: Option<String>,
}

fn read_rows<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, SourceError> {
    let input_err = |e: csv::Error| SourceError::Input { path: path.to_path_buf(), message: e.to_string() };

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::Headers)
        .from_path(path)
        .map_err(input_err)?;

    let rows = reader
        .deserialize()
        .collect::<Result<Vec<T>, _>>()
        .map_err(input_err)?;
    debug!(path = %path.display(), rows = rows.len(), "csv loaded");
    Ok(rows)
}

#[async_trait]
impl ReconSource for CsvSources {
    async fn divergences(&self) -> Result<Vec<DivergenceRecord>, SourceError> {
        let rows: Vec<DivergenceRow> = read_rows(&self.paths.divergences)?;
        Ok(rows
            .into_iter()
            .map(|r| DivergenceRecord::from_raw(r.account_id, r.management_id, r.tax_id_accounts, r.tax_id_management))
            // Same filter the live query applies
            .filter(|r| r.tax_id_accounts_key != r.tax_id_management_key)
            .collect())
    }

    async fn existing_keys(&self, keys: &[String]) -> Result<Vec<String>, SourceError> {
        let wanted: HashSet<&str> = keys.iter().map(String::as_str).collect();
        let rows: Vec<InsuredRow> = read_rows(&self.paths.insured)?;

        let mut found: Vec<String> = rows
            .into_iter()
            .map(|r| canonical_key(&r.cpf_cnpj))
            .filter(|k| wanted.contains(k.as_str()))
            .collect();
        found.sort();
        found.dedup();
        Ok(found)
    }

    async fn emails(&self, keys: &[String]) -> Result<Vec<(String, Option<String>)>, SourceError> {
        let wanted: HashSet<&str> = keys.iter().map(String::as_str).collect();
        let rows: Vec<ContactRow> = read_rows(&self.paths.contacts)?;

        Ok(rows
            .into_iter()
            .map(|r| (canonical_key(&r.cpf_cnpj), r.email))
            .filter(|(k, _)| wanted.contains(k.as_str()))
            .collect())
    }
}
