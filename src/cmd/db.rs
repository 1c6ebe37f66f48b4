//! Database bootstrap commands: `control-center init-db` and `set-password`.

use anyhow::Result;

use control_center::config::{ControlConfig, DatabaseBackend};
use control_center::dashboard::auth::validate_password;
use control_center::dashboard::store::{PASSWORD_KEY, open_store};

pub async fn cmd_init_db(config: &ControlConfig) -> Result<()> {
    open_store(&config.database).await?;
    match config.database.backend {
        DatabaseBackend::Sqlite => {
            println!("Database initialized at {}", config.database.path.display())
        }
        DatabaseBackend::Remote => println!("Remote database schema is up to date"),
    }
    Ok(())
}

pub async fn cmd_set_password(config: &ControlConfig, password: &str) -> Result<()> {
    validate_password(password).map_err(anyhow::Error::msg)?;
    let store = open_store(&config.database).await?;
    store
        .set_config(PASSWORD_KEY.to_string(), password.to_string())
        .await?;
    tracing::info!("dashboard password updated");
    println!("Password updated.");
    Ok(())
}
