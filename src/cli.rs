//! Command-Line Interface (CLI) argument parsing.
//!
//! Flags use the dotted names Prometheus-ecosystem tools use
//! (`--config.file`, `--web.listen-address`). They are merged on top of the
//! defaults and the `AMMATRIX_` environment variables, see `settings.rs`.

use clap::{Parser, ValueEnum};
use figment::{
    value::{Dict, Map, Value},
    Error, Metadata, Profile, Provider,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Output format of the log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Logfmt,
    Json,
}

impl LogFormat {
    fn as_str(self) -> &'static str {
        match self {
            LogFormat::Logfmt => "logfmt",
            LogFormat::Json => "json",
        }
    }
}

/// Forwards Alertmanager webhook notifications to Matrix rooms.
#[derive(Parser, Debug, Clone, Default)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the bridge configuration file.
    #[arg(long = "config.file", value_name = "FILE")]
    pub config_file: Option<PathBuf>,

    /// Address to listen on for webhooks and the web interface.
    #[arg(long = "web.listen-address", value_name = "ADDRESS")]
    pub listen_address: Option<String>,

    /// Validate the configuration file and exit.
    #[arg(long = "config.check")]
    pub config_check: bool,

    /// Only log messages with the given severity or above.
    #[arg(long = "log.level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Output format of log messages.
    #[arg(long = "log.format", value_enum, value_name = "FORMAT")]
    pub log_format: Option<LogFormat>,
}

impl Provider for Cli {
    fn metadata(&self) -> Metadata {
        Metadata::named("Command-Line Arguments")
    }

    fn data(&self) -> Result<Map<Profile, Dict>, Error> {
        let mut dict = Dict::new();

        if let Some(path) = &self.config_file {
            dict.insert(
                "config_file".into(),
                Value::from(path.to_string_lossy().into_owned()),
            );
        }

        if let Some(address) = &self.listen_address {
            dict.insert("listen_address".into(), Value::from(address.clone()));
        }

        if let Some(level) = &self.log_level {
            dict.insert("log_level".into(), Value::from(level.clone()));
        }

        if let Some(format) = self.log_format {
            dict.insert("log_format".into(), Value::from(format.as_str()));
        }

        // `--config.check` is an action, not a setting, and stays out of here.

        let mut map = Map::new();
        map.insert(Profile::Default, dict);
        Ok(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_dotted_flags() {
        let cli = Cli::try_parse_from([
            "alertmanager-matrix",
            "--config.file=/etc/ammatrix.yml",
            "--web.listen-address",
            "127.0.0.1:8080",
            "--config.check",
            "--log.format=json",
        ])
        .unwrap();

        assert_eq!(cli.config_file, Some(PathBuf::from("/etc/ammatrix.yml")));
        assert_eq!(cli.listen_address.as_deref(), Some("127.0.0.1:8080"));
        assert!(cli.config_check);
        assert_eq!(cli.log_format, Some(LogFormat::Json));
        assert_eq!(cli.log_level, None);
    }

    #[test]
    fn rejects_unknown_log_format() {
        assert!(Cli::try_parse_from(["alertmanager-matrix", "--log.format=xml"]).is_err());
    }

    #[test]
    fn provides_only_the_flags_that_were_given() {
        let cli = Cli {
            log_level: Some("debug".to_string()),
            ..Default::default()
        };
        let data = cli.data().unwrap();
        let dict = &data[&Profile::Default];
        assert_eq!(dict.len(), 1);
        assert_eq!(dict["log_level"], Value::from("debug"));
    }
}
