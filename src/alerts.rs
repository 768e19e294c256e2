//! The Alertmanager webhook payload.
//!
//! The bridge does not interpret these fields; they are decoded so templates
//! can address them by name. Field names in templates are the JSON names
//! Alertmanager sends (`status`, `alerts`, `commonLabels`, ...).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Labels and annotations. Ordered so templates iterate deterministically.
pub type KeyValues = BTreeMap<String, String>;

/// One webhook notification: a group of alerts plus grouping metadata.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AlertBatch {
    pub alerts: Vec<Alert>,
    pub common_annotations: KeyValues,
    pub common_labels: KeyValues,
    #[serde(rename = "externalURL")]
    pub external_url: String,
    pub group_key: String,
    pub group_labels: KeyValues,
    pub receiver: String,
    pub status: String,
    pub truncated_alerts: u64,
    pub version: String,
}

/// A single alert inside a batch.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Alert {
    pub annotations: KeyValues,
    pub ends_at: Option<DateTime<Utc>>,
    #[serde(rename = "generatorURL")]
    pub generator_url: String,
    pub labels: KeyValues,
    pub starts_at: Option<DateTime<Utc>>,
    pub status: String,
}
