//! Process settings.
//!
//! These are fixed for the lifetime of the process, unlike the reloadable
//! bridge configuration in `config/`. They are layered with `figment`:
//! defaults, then `AMMATRIX_`-prefixed environment variables, then flags.

use crate::cli::{Cli, LogFormat};
use anyhow::{Context, Result};
use figment::{
    providers::{Env, Serialized},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Settings for one process run.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Settings {
    /// The bridge configuration file.
    pub config_file: PathBuf,
    /// Listen address; `:port` means every interface.
    pub listen_address: String,
    /// Default log filter when `RUST_LOG` is not set.
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            config_file: PathBuf::from("ammatrix.yml"),
            listen_address: ":9751".to_string(),
            log_level: "info".to_string(),
            log_format: LogFormat::Logfmt,
        }
    }
}

impl Settings {
    /// Layers defaults, environment variables and the parsed flags.
    pub fn load(cli: &Cli) -> Result<Self> {
        let settings: Settings = Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            // e.g. AMMATRIX_LISTEN_ADDRESS=127.0.0.1:9751
            .merge(Env::prefixed("AMMATRIX_"))
            .merge(cli.clone())
            .extract()
            .context("invalid settings")?;
        Ok(settings)
    }

    /// The socket addresses to try binding, in order.
    ///
    /// A bare `:port` means every interface: the IPv6 wildcard first, which
    /// also accepts IPv4 on dual-stack hosts, then the IPv4 wildcard for
    /// hosts without IPv6.
    pub fn bind_addresses(&self) -> Vec<String> {
        if self.listen_address.starts_with(':') {
            vec![
                format!("[::]{}", self.listen_address),
                format!("0.0.0.0{}", self.listen_address),
            ]
        } else {
            vec![self.listen_address.clone()]
        }
    }
}
