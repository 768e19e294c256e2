//! Bridge configuration.
//!
//! ```text
//! ammatrix.yml
//!     → Config (strict YAML schema, unknown fields rejected)
//!     → validation (URL scheme, transport combinations)
//!     → RenderableConfig (compiled template + built HTTP client)
//!     → ConfigStore (atomic swap, see store.rs)
//! ```
//!
//! A [`RenderableConfig`] is never modified after construction; a reload
//! builds a new one and replaces the old one whole.

pub mod http_client;
pub mod secret;
pub mod store;

use crate::error::{LoadError, LoadStage};
use crate::internal_metrics;
use crate::template::MessageTemplate;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;
use url::Url;

pub use http_client::{HttpClientConfig, HttpTransport};
pub use secret::Secret;
pub use store::ConfigStore;

/// The on-disk configuration file.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Base URL of the Matrix homeserver.
    pub homeserver_url: Url,
    /// Settings for the HTTP client talking to the homeserver.
    #[serde(default)]
    pub matrix_http_config: HttpClientConfig,
    /// Template used to render the message body.
    pub text: String,
}

impl Config {
    /// Parses a YAML document. Does not compile the template.
    pub fn from_yaml(yaml: &str) -> Result<Self, LoadError> {
        serde_yml::from_str(yaml).map_err(|e| LoadError::new(LoadStage::Parse, e.to_string()))
    }

    fn validate(&self) -> Result<(), LoadError> {
        if !matches!(self.homeserver_url.scheme(), "http" | "https") {
            return Err(LoadError::new(
                LoadStage::Validate,
                format!(
                    "homeserver_url must be an http or https URL, got {:?}",
                    self.homeserver_url.scheme()
                ),
            ));
        }
        if self.homeserver_url.cannot_be_a_base() {
            return Err(LoadError::new(
                LoadStage::Validate,
                "homeserver_url cannot be used as a base URL",
            ));
        }
        self.matrix_http_config
            .validate()
            .map_err(|e| LoadError::new(LoadStage::Validate, format!("matrix_http_config: {e}")))
    }

    /// Validates the configuration and builds everything a request needs.
    pub fn into_renderable(self) -> Result<RenderableConfig, LoadError> {
        self.validate()?;
        let template = MessageTemplate::compile(&self.text)
            .map_err(|e| LoadError::new(LoadStage::Template, e.to_string()))?;
        let transport = self
            .matrix_http_config
            .build()
            .map_err(|e| LoadError::new(LoadStage::Transport, e))?;
        Ok(RenderableConfig {
            config: self,
            template,
            transport,
        })
    }
}

/// One immutable, fully validated configuration snapshot.
#[derive(Debug)]
pub struct RenderableConfig {
    config: Config,
    template: MessageTemplate,
    transport: HttpTransport,
}

impl RenderableConfig {
    /// The homeserver base URL.
    pub fn endpoint(&self) -> &Url {
        &self.config.homeserver_url
    }

    pub fn transport(&self) -> &HttpTransport {
        &self.transport
    }

    pub fn template(&self) -> &MessageTemplate {
        &self.template
    }

    /// The parsed file this snapshot was built from.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The configuration as YAML, with secrets redacted.
    pub fn to_redacted_yaml(&self) -> Result<String, serde_yml::Error> {
        serde_yml::to_string(&self.config)
    }
}

/// Reads, parses, validates and compiles the configuration at `path`.
///
/// The reload gauges are updated whatever the outcome.
pub fn load(path: &Path) -> Result<RenderableConfig, LoadError> {
    let result = load_file(path);
    internal_metrics::record_config_reload(result.is_ok());
    result
}

fn load_file(path: &Path) -> Result<RenderableConfig, LoadError> {
    debug!(path = %path.display(), "Loading configuration");
    let yaml = std::fs::read_to_string(path)
        .map_err(|e| LoadError::new(LoadStage::Read, format!("{}: {e}", path.display())))?;
    Config::from_yaml(&yaml)?.into_renderable()
}
