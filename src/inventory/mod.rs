//! Nugget inventory: markdown notes kept in a git-tracked "brain"
//! directory, reached over SSH (or a local shell when no host is set).
//!
//! Layout on the brain host:
//!
//! ```text
//! <brain_dir>/
//!   .git/
//!   nuggets/
//!     <name>/nugget.md
//! ```
//!
//! Every path that reaches a script is passed through [`shell_quote`];
//! nugget names are additionally restricted to `[A-Za-z0-9_-]+`.

pub mod git;
pub mod nuggets;
pub mod search;
pub mod shell;

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;

use crate::config::InventorySection;
use crate::errors::ControlError;

pub use git::{CommitOutcome, GitStatus};
pub use nuggets::{Nugget, NuggetContent};
pub use search::{Reindexed, SearchResult};
pub use shell::{LocalShell, Shell, ShellOutput, SshShell, shell_quote};

static NUGGET_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("valid nugget name regex"));

/// Reject names that could escape the nuggets directory.
pub fn validate_name(name: &str) -> Result<(), ControlError> {
    if NUGGET_NAME.is_match(name) {
        Ok(())
    } else {
        Err(ControlError::InvalidNuggetName {
            name: name.to_string(),
        })
    }
}

#[derive(Clone)]
pub struct Inventory {
    shell: Arc<dyn Shell>,
    brain_dir: String,
    qmd_bin: String,
    qmd_collection: String,
}

impl Inventory {
    pub fn new(shell: Arc<dyn Shell>, brain_dir: impl Into<String>, qmd_bin: impl Into<String>) -> Self {
        Self {
            shell,
            brain_dir: brain_dir.into().trim_end_matches('/').to_string(),
            qmd_bin: qmd_bin.into(),
            qmd_collection: "shared-brain".to_string(),
        }
    }

    pub fn with_qmd_collection(mut self, collection: impl Into<String>) -> Self {
        self.qmd_collection = collection.into();
        self
    }

    pub fn from_config(section: &InventorySection) -> Self {
        let timeout = Duration::from_secs(section.command_timeout_secs);
        let shell: Arc<dyn Shell> = match &section.ssh_host {
            Some(host) => Arc::new(SshShell::new(host.clone(), timeout)),
            None => Arc::new(LocalShell::new(timeout)),
        };
        Self::new(shell, section.brain_dir.clone(), section.qmd_bin.clone())
            .with_qmd_collection(section.qmd_collection.clone())
    }

    pub fn brain_dir(&self) -> &str {
        &self.brain_dir
    }

    fn nuggets_dir(&self) -> String {
        format!("{}/nuggets", self.brain_dir)
    }

    fn nugget_dir(&self, name: &str) -> String {
        format!("{}/{}", self.nuggets_dir(), name)
    }

    fn nugget_file(&self, name: &str) -> String {
        format!("{}/nugget.md", self.nugget_dir(name))
    }

    /// `cd` prefix for scripts that run inside the brain repository.
    fn in_brain(&self, command: &str) -> String {
        format!("cd {} && {}", shell_quote(&self.brain_dir), command)
    }
}
