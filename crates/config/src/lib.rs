// Configuration loading

pub mod error;
pub mod settings;

pub use error::ConfigError;
pub use settings::{AccountsLinkConfig, OutputSettings, Settings, StoreConfig, TimeoutSettings, TunnelConfig};
