//! Configuration view: `control-center config`.

use anyhow::Result;

use control_center::config::ControlConfig;

pub fn cmd_config(config: &ControlConfig) -> Result<()> {
    print!("{}", config.to_redacted_toml()?);
    Ok(())
}
