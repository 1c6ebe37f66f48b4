//! Dashboard server command: `control-center serve`.

use anyhow::Result;
use std::path::PathBuf;

use control_center::config::{ControlConfig, DatabaseBackend};

/// CLI flags are the last configuration layer.
pub fn apply_flags(config: &mut ControlConfig, port: Option<u16>, db_path: Option<PathBuf>, dev: bool) {
    if let Some(port) = port {
        config.server.port = port;
    }
    if let Some(path) = db_path {
        config.database.backend = DatabaseBackend::Sqlite;
        config.database.path = path;
    }
    if dev {
        config.server.dev_mode = true;
    }
}

pub async fn cmd_serve(config: ControlConfig) -> Result<()> {
    control_center::dashboard::server::start_server(config).await
}
