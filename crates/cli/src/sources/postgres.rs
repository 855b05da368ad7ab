//! Live source readers over the three PostgreSQL stores.
//!
//! Canonical keys are computed in SQL with the same rule the engine uses
//! (`regexp_replace(x, '[^0-9]', '', 'g')`); the engine re-checks them.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use tracing::{debug, info};

use idrecon_config::{Settings, StoreConfig, TimeoutSettings};
use idrecon_recon::DivergenceRecord;

use super::{timed, Phase, ReconSource, SourceError, Store};

/// Management users joined with accounts users (over `dblink`) whose
/// canonical tax IDs differ. `$1` is the dblink connection string.
const DIVERGENCE_SQL: &str = r#"
SELECT
    a.id::text                                  AS account_id,
    s.sso_id::text                              AS management_id,
    a.cpf_cnpj                                  AS tax_id_accounts_raw,
    s.cpf_cnpj                                  AS tax_id_management_raw,
    regexp_replace(a.cpf_cnpj, '[^0-9]', '', 'g')   AS tax_id_accounts_key,
    regexp_replace(s.cpf_cnpj, '[^0-9]', '', 'g')   AS tax_id_management_key
FROM tb_usuario s
INNER JOIN dblink($1, 'SELECT cpf_cnpj, id FROM users')
    AS a(cpf_cnpj varchar(255), id uuid)
    ON s.sso_id = a.id
WHERE regexp_replace(s.cpf_cnpj, '[^0-9]', '', 'g') <> regexp_replace(a.cpf_cnpj, '[^0-9]', '', 'g')
ORDER BY a.id
"#;

const EXISTENCE_SQL: &str = r#"
SELECT DISTINCT regexp_replace(cpf_cnpj, '[^0-9]', '', 'g') AS tax_id_key
FROM segurado
WHERE regexp_replace(cpf_cnpj, '[^0-9]', '', 'g') = ANY($1)
"#;

const EMAIL_SQL: &str = r#"
SELECT regexp_replace(p.cpf_cnpj, '[^0-9]', '', 'g') AS tax_id_key, c.valor AS email
FROM pessoa p
INNER JOIN contato c ON p.id = c.pessoa_id
WHERE c.tipo = 'EMAIL'
  AND regexp_replace(p.cpf_cnpj, '[^0-9]', '', 'g') = ANY($1)
"#;

pub struct PgSources {
    management: PgPool,
    contract: PgPool,
    person: PgPool,
    dblink_conninfo: String,
    query_timeout: Duration,
}

impl PgSources {
    /// Open one connection to each store. Fails on the first unreachable store.
    pub async fn connect(settings: &Settings) -> Result<Self, SourceError> {
        let timeouts = &settings.timeouts;
        let management = connect_store(Store::Management, &settings.management, timeouts).await?;
        let contract = connect_store(Store::Contract, &settings.contract, timeouts).await?;
        let person = connect_store(Store::Person, &settings.person, timeouts).await?;

        Ok(Self {
            management,
            contract,
            person,
            dblink_conninfo: settings.accounts.dblink_conninfo(),
            query_timeout: timeouts.query(),
        })
    }

    /// Close all pools. Dropping also closes them, this just waits for it.
    pub async fn close(&self) {
        self.management.close().await;
        self.contract.close().await;
        self.person.close().await;
    }
}

pub(crate) fn connect_options(store: &StoreConfig) -> PgConnectOptions {
    let mut options = PgConnectOptions::new()
        .host(&store.host)
        .port(store.port)
        .database(&store.database)
        .username(&store.user)
        .application_name("idrecon");
    if let Some(ref password) = store.password {
        options = options.password(password);
    }
    options
}

async fn connect_store(store: Store, config: &StoreConfig, timeouts: &TimeoutSettings) -> Result<PgPool, SourceError> {
    info!(%store, target = %config.describe(), "connecting");

    let connect = PgPoolOptions::new()
        .max_connections(1)
        .acquire_timeout(timeouts.connect())
        .connect_with(connect_options(config));

    // connect_with can sit in TCP connect longer than acquire_timeout
    let result = match tokio::time::timeout(timeouts.connect(), connect).await {
        Ok(result) => result,
        Err(_) => Err(sqlx::Error::PoolTimedOut),
    };

    result.map_err(|source| SourceError::Connectivity {
        store,
        target: config.describe(),
        source,
    })
}

fn divergence_from_row(row: &PgRow) -> Result<DivergenceRecord, sqlx::Error> {
    let text = |column: &str| -> Result<String, sqlx::Error> {
        Ok(row.try_get::<Option<String>, _>(column)?.unwrap_or_default())
    };
    Ok(DivergenceRecord {
        account_id: text("account_id")?,
        management_id: text("management_id")?,
        tax_id_accounts_raw: text("tax_id_accounts_raw")?,
        tax_id_management_raw: text("tax_id_management_raw")?,
        tax_id_accounts_key: text("tax_id_accounts_key")?,
        tax_id_management_key: text("tax_id_management_key")?,
    })
}

#[async_trait]
impl ReconSource for PgSources {
    async fn divergences(&self) -> Result<Vec<DivergenceRecord>, SourceError> {
        let rows = timed(
            Phase::Divergences,
            self.query_timeout,
            sqlx::query(DIVERGENCE_SQL)
                .bind(&self.dblink_conninfo)
                .fetch_all(&self.management),
        )
        .await?;

        let records = rows
            .iter()
            .map(divergence_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|source| SourceError::Query { phase: Phase::Divergences, source })?;
        debug!(rows = records.len(), "divergences fetched");
        Ok(records)
    }

    async fn existing_keys(&self, keys: &[String]) -> Result<Vec<String>, SourceError> {
        let rows = timed(
            Phase::Existence,
            self.query_timeout,
            sqlx::query(EXISTENCE_SQL).bind(keys).fetch_all(&self.contract),
        )
        .await?;

        rows.iter()
            .map(|row| row.try_get::<Option<String>, _>("tax_id_key").map(Option::unwrap_or_default))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|source| SourceError::Query { phase: Phase::Existence, source })
    }

    async fn emails(&self, keys: &[String]) -> Result<Vec<(String, Option<String>)>, SourceError> {
        let rows = timed(
            Phase::Emails,
            self.query_timeout,
            sqlx::query(EMAIL_SQL).bind(keys).fetch_all(&self.person),
        )
        .await?;

        rows.iter()
            .map(|row| -> Result<_, sqlx::Error> {
                let key = row.try_get::<Option<String>, _>("tax_id_key")?.unwrap_or_default();
                let email = row.try_get::<Option<String>, _>("email")?;
                Ok((key, email))
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(|source| SourceError::Query { phase: Phase::Emails, source })
    }
}
