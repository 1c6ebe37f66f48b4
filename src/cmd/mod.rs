//! CLI command implementations.
//!
//! | Module     | Commands handled          |
//! |------------|---------------------------|
//! | `serve`    | `Serve`                   |
//! | `db`       | `InitDb`, `SetPassword`   |
//! | `config`   | `Config`                  |

pub mod config;
pub mod db;
pub mod serve;

pub use config::cmd_config;
pub use db::{cmd_init_db, cmd_set_password};
pub use serve::cmd_serve;
