//! alertmanager-matrix - forwards Alertmanager webhook notifications to Matrix
//!
//! Each webhook is rendered through a template from the configuration file
//! and sent as one `m.room.message` event to the room named in the query
//! string. The configuration can be reloaded at runtime with SIGHUP or
//! `POST /-/reload`.

pub mod alerts;
pub mod app;
pub mod cli;
pub mod config;
pub mod error;
pub mod internal_metrics;
pub mod lifecycle;
pub mod matrix;
pub mod reload;
pub mod server;
pub mod settings;
pub mod task_manager;
pub mod template;
