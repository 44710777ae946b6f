use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

use crate::config::GradebookConfig;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Daemon state. `config` holds defaults until a workspace is selected.
#[derive(Default)]
pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub config: GradebookConfig,
}
