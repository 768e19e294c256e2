//! Error types shared across the bridge.
//!
//! Each stage of the bridge owns one error type so the HTTP layer can tell a
//! broken configuration apart from a broken template or an unreachable
//! homeserver.

use std::error::Error as StdError;
use std::fmt;
use thiserror::Error;

/// The step of a configuration load that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStage {
    /// The file could not be opened or read.
    Read,
    /// The YAML did not match the schema (including unknown fields).
    Parse,
    /// The values parsed but are inconsistent with each other.
    Validate,
    /// The message template failed to compile.
    Template,
    /// The outbound HTTP client could not be built.
    Transport,
}

impl fmt::Display for LoadStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = match self {
            LoadStage::Read => "error reading config file",
            LoadStage::Parse => "error parsing config file",
            LoadStage::Validate => "invalid config",
            LoadStage::Template => "error compiling template",
            LoadStage::Transport => "error building HTTP client",
        };
        f.write_str(stage)
    }
}

/// A configuration load failed. No partial configuration is ever produced.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{stage}: {message}")]
pub struct LoadError {
    pub stage: LoadStage,
    pub message: String,
}

impl LoadError {
    pub fn new(stage: LoadStage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
        }
    }
}

/// The template could not be executed against an alert batch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct RenderError {
    pub message: String,
}

impl From<minijinja::Error> for RenderError {
    fn from(err: minijinja::Error) -> Self {
        Self {
            message: err.to_string(),
        }
    }
}

/// The outbound call to the homeserver failed before a response was read.
#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("Invalid room URL: {0}")]
    Url(String),

    #[error("Request to matrix: {}", report(.0))]
    Send(#[source] reqwest::Error),

    #[error("Read response body from Matrix: {}", report(.0))]
    ReadBody(#[source] reqwest::Error),
}

/// Everything that can go wrong while turning one webhook into one message.
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Template execution: {0}")]
    Render(#[from] RenderError),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}

/// A reload request did not produce a new configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReloadError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("reload coordinator is not running")]
    Unavailable,
}

/// Flattens an error and its sources into one line.
pub fn report(err: &dyn StdError) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}
