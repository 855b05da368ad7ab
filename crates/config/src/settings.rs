// Run settings
// Loaded once at startup from an optional TOML file, then overlaid with the
// process environment (DB_GESTAO_*, DB_CONTRATO_*, DB_PESSOA_*, DB_ACCOUNTS_*,
// IDRECON_*). Passed by reference to everything that needs it.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use idrecon_recon::EmailTieBreak;

use crate::error::ConfigError;

pub const DEFAULT_PG_PORT: u16 = 5432;

/// Connection parameters for one PostgreSQL store.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_PG_PORT,
            database: String::new(),
            user: String::new(),
            password: None,
        }
    }
}

impl StoreConfig {
    /// `user@host:port/database`, never the password.
    pub fn describe(&self) -> String {
        format!("{}@{}:{}/{}", self.user, self.host, self.port, self.database)
    }

    fn missing_fields(&self, section: &str, env_prefix: &str, out: &mut Vec<String>) {
        for (field, env, value) in [
            ("host", "HOST", &self.host),
            ("database", "NAME", &self.database),
            ("user", "USER", &self.user),
        ] {
            if value.trim().is_empty() {
                out.push(format!("{section}.{field} ({env_prefix}_{env})"));
            }
        }
    }
}

/// The accounts store, reached by the management server through `dblink`.
///
/// Its host is resolved on the management server, so it is never rewritten
/// by a local tunnel.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AccountsLinkConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: Option<String>,
}

impl Default for AccountsLinkConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_PG_PORT,
            database: "accounts_api".to_string(),
            user: "accounts_api".to_string(),
            password: None,
        }
    }
}

impl AccountsLinkConfig {
    /// libpq `keyword=value` connection string handed to `dblink()`.
    pub fn dblink_conninfo(&self) -> String {
        let mut parts = vec![
            format!("host={}", conninfo_value(&self.host)),
            format!("port={}", self.port),
            format!("dbname={}", conninfo_value(&self.database)),
            format!("user={}", conninfo_value(&self.user)),
        ];
        if let Some(ref password) = self.password {
            parts.push(format!("password={}", conninfo_value(password)));
        }
        parts.join(" ")
    }

    pub fn describe(&self) -> String {
        format!("{}@{}:{}/{} (dblink)", self.user, self.host, self.port, self.database)
    }
}

/// Quote a libpq conninfo value when it is empty or contains spaces, quotes
/// or backslashes.
fn conninfo_value(value: &str) -> String {
    let needs_quotes = value.is_empty()
        || value.chars().any(|c| c.is_whitespace() || c == '\'' || c == '\\');
    if !needs_quotes {
        return value.to_string();
    }
    let escaped = value.replace('\\', "\\\\").replace('\'', "\\'");
    format!("'{escaped}'")
}

/// SSH bastion used to forward local ports to the stores.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TunnelConfig {
    pub ssh_host: String,
    pub ssh_port: u16,
    pub ssh_user: String,
    pub identity_file: Option<PathBuf>,
    /// First local port; one port per distinct store `host:port`.
    pub local_port_base: u16,
    pub connect_timeout_secs: u64,
    /// Extra `ssh` arguments, passed before the destination.
    pub extra_args: Vec<String>,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            ssh_host: String::new(),
            ssh_port: 22,
            ssh_user: String::new(),
            identity_file: None,
            local_port_base: 15432,
            connect_timeout_secs: 20,
            extra_args: Vec::new(),
        }
    }
}

impl TunnelConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn destination(&self) -> String {
        if self.ssh_user.is_empty() {
            self.ssh_host.clone()
        } else {
            format!("{}@{}", self.ssh_user, self.ssh_host)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputSettings {
    pub dir: PathBuf,
    pub mask_tax_ids: bool,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self { dir: PathBuf::from("."), mask_tax_ids: false }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimeoutSettings {
    pub connect_secs: u64,
    pub query_secs: u64,
    pub overall_secs: u64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self { connect_secs: 15, query_secs: 120, overall_secs: 900 }
    }
}

impl TimeoutSettings {
    pub fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }

    pub fn query(&self) -> Duration {
        Duration::from_secs(self.query_secs)
    }

    pub fn overall(&self) -> Duration {
        Duration::from_secs(self.overall_secs)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub email_tie_break: EmailTieBreak,
    pub management: StoreConfig,
    pub contract: StoreConfig,
    pub person: StoreConfig,
    pub accounts: AccountsLinkConfig,
    pub tunnel: Option<TunnelConfig>,
    pub output: OutputSettings,
    pub timeouts: TimeoutSettings,
}

impl Settings {
    pub fn from_toml(input: &str) -> Result<Self, ConfigError> {
        toml::from_str(input).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load from an optional TOML file, overlay the process environment, validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut settings = match path {
            Some(path) => {
                let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
                Self::from_toml(&content)?
            }
            None => Self::default(),
        };
        settings.apply_env(|key| std::env::var(key).ok())?;
        settings.validate()?;
        Ok(settings)
    }

    /// Overlay values from `lookup` (usually the process environment).
    /// Present, non-empty variables win over file values.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        for (prefix, store) in [
            ("DB_GESTAO", &mut self.management),
            ("DB_CONTRATO", &mut self.contract),
            ("DB_PESSOA", &mut self.person),
        ] {
            if let Some(v) = get(&format!("{prefix}_HOST")) {
                store.host = v;
            }
            if let Some(v) = get(&format!("{prefix}_PORT")) {
                store.port = parse_env(&format!("{prefix}_PORT"), &v)?;
            }
            if let Some(v) = get(&format!("{prefix}_NAME")) {
                store.database = v;
            }
            if let Some(v) = get(&format!("{prefix}_USER")) {
                store.user = v;
            }
            if let Some(v) = get(&format!("{prefix}_PASS")) {
                store.password = Some(v);
            }
        }

        let accounts = &mut self.accounts;
        if let Some(v) = get("DB_ACCOUNTS_HOST") {
            accounts.host = v;
        }
        if let Some(v) = get("DB_ACCOUNTS_PORT") {
            accounts.port = parse_env("DB_ACCOUNTS_PORT", &v)?;
        }
        if let Some(v) = get("DB_ACCOUNTS_NAME") {
            accounts.database = v;
        }
        if let Some(v) = get("DB_ACCOUNTS_USER") {
            accounts.user = v;
        }
        if let Some(v) = get("DB_ACCOUNTS_PASS") {
            accounts.password = Some(v);
        }

        if let Some(host) = get("IDRECON_TUNNEL_HOST") {
            self.tunnel.get_or_insert_with(TunnelConfig::default).ssh_host = host;
        }
        if let Some(tunnel) = self.tunnel.as_mut() {
            if let Some(v) = get("IDRECON_TUNNEL_USER") {
                tunnel.ssh_user = v;
            }
            if let Some(v) = get("IDRECON_TUNNEL_PORT") {
                tunnel.ssh_port = parse_env("IDRECON_TUNNEL_PORT", &v)?;
            }
            if let Some(v) = get("IDRECON_TUNNEL_IDENTITY") {
                tunnel.identity_file = Some(PathBuf::from(v));
            }
            if let Some(v) = get("IDRECON_TUNNEL_LOCAL_PORT") {
                tunnel.local_port_base = parse_env("IDRECON_TUNNEL_LOCAL_PORT", &v)?;
            }
        }

        if let Some(v) = get("IDRECON_OUTPUT_DIR") {
            self.output.dir = PathBuf::from(v);
        }
        if let Some(v) = get("IDRECON_EMAIL_TIE_BREAK") {
            self.email_tie_break = v.parse().map_err(|e: String| ConfigError::Invalid(format!("IDRECON_EMAIL_TIE_BREAK: {e}")))?;
        }
        if let Some(v) = get("IDRECON_CONNECT_TIMEOUT_SECS") {
            self.timeouts.connect_secs = parse_env("IDRECON_CONNECT_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("IDRECON_QUERY_TIMEOUT_SECS") {
            self.timeouts.query_secs = parse_env("IDRECON_QUERY_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("IDRECON_OVERALL_TIMEOUT_SECS") {
            self.timeouts.overall_secs = parse_env("IDRECON_OVERALL_TIMEOUT_SECS", &v)?;
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut missing = Vec::new();
        self.management.missing_fields("management", "DB_GESTAO", &mut missing);
        self.contract.missing_fields("contract", "DB_CONTRATO", &mut missing);
        self.person.missing_fields("person", "DB_PESSOA", &mut missing);
        if self.accounts.host.trim().is_empty() {
            missing.push("accounts.host (DB_ACCOUNTS_HOST)".to_string());
        }
        if let Some(ref tunnel) = self.tunnel {
            if tunnel.ssh_host.trim().is_empty() {
                missing.push("tunnel.ssh_host (IDRECON_TUNNEL_HOST)".to_string());
            }
        }
        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }

        let t = &self.timeouts;
        if t.connect_secs == 0 || t.query_secs == 0 || t.overall_secs == 0 {
            return Err(ConfigError::Invalid("timeouts must be greater than zero".into()));
        }
        if let Some(ref tunnel) = self.tunnel {
            let needed = self.store_targets().len() as u32;
            if tunnel.local_port_base == 0 || u32::from(tunnel.local_port_base) + needed > u32::from(u16::MAX) + 1 {
                return Err(ConfigError::Invalid(format!(
                    "tunnel.local_port_base {} leaves no room for {needed} forwarded port(s)",
                    tunnel.local_port_base
                )));
            }
        }
        Ok(())
    }

    /// Distinct `(host, port)` pairs of the three directly-connected stores,
    /// in first-seen order (management, contract, person).
    pub fn store_targets(&self) -> Vec<(String, u16)> {
        let mut seen = BTreeSet::new();
        let mut targets = Vec::new();
        for store in [&self.management, &self.contract, &self.person] {
            let target = (store.host.clone(), store.port);
            if seen.insert(target.clone()) {
                targets.push(target);
            }
        }
        targets
    }

    /// Copy of these settings with each store target passed through `route`.
    ///
    /// `route` returns the replacement `(host, port)` or `None` to keep the
    /// original. The dblink accounts target is left alone.
    pub fn rerouted<F>(&self, route: F) -> Self
    where
        F: Fn(&str, u16) -> Option<(String, u16)>,
    {
        let mut settings = self.clone();
        for store in [&mut settings.management, &mut settings.contract, &mut settings.person] {
            if let Some((host, port)) = route(&store.host, store.port) {
                store.host = host;
                store.port = port;
            }
        }
        settings
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| ConfigError::Invalid(format!("{key}={value:?}: {e}")))
}
