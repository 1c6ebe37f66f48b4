use serde::Serialize;

use super::{Inventory, shell_quote};
use crate::errors::ControlError;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GitStatus {
    pub changes: Vec<String>,
    #[serde(rename = "hasChanges")]
    pub has_changes: bool,
}

impl GitStatus {
    pub fn from_porcelain(stdout: &str) -> Self {
        let changes: Vec<String> = stdout
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| line.trim_end().to_string())
            .collect();
        Self {
            has_changes: !changes.is_empty(),
            changes,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CommitOutcome {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
}

impl Inventory {
    /// `git status --short` of the brain repository.
    pub async fn git_status(&self) -> Result<GitStatus, ControlError> {
        let output = self
            .shell
            .run_checked(&self.in_brain("git status --short"))
            .await?;
        Ok(GitStatus::from_porcelain(&output.stdout))
    }

    /// Stage everything, commit with `message` and push. A clean tree is
    /// reported as success.
    pub async fn commit_and_push(&self, message: &str) -> Result<CommitOutcome, ControlError> {
        if message.trim().is_empty() {
            return Err(ControlError::BadRequest("Commit message required".into()));
        }

        self.shell.run_checked(&self.in_brain("git add -A")).await?;

        let script = self.in_brain(&format!("git commit -m {}", shell_quote(message)));
        let output = self.shell.run(&script).await?;
        if !output.success() {
            // git prints this on stdout; hooks may still write to stderr.
            if output.mentions("nothing to commit") {
                tracing::info!("brain repository has nothing to commit");
                return Ok(CommitOutcome {
                    success: true,
                    message: "Nothing to commit".into(),
                    commit: None,
                });
            }
            return Err(ControlError::Shell {
                command: script,
                stderr: output.error_text(),
            });
        }
        let commit = output.stdout;

        self.shell.run_checked(&self.in_brain("git push")).await?;
        tracing::info!("committed and pushed brain repository");

        Ok(CommitOutcome {
            success: true,
            message: "Committed and pushed successfully".into(),
            commit: Some(commit),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::*;
    use super::*;

    #[test]
    fn test_porcelain_drops_blank_lines() {
        let status = GitStatus::from_porcelain(" M nuggets/a/nugget.md\n?? nuggets/b/\n\n");
        assert_eq!(status.changes, vec![" M nuggets/a/nugget.md", "?? nuggets/b/"]);
        assert!(status.has_changes);
        assert!(!GitStatus::from_porcelain("").has_changes);
    }

    #[test]
    fn test_status_serializes_camel_case_flag() {
        let json = serde_json::to_value(GitStatus::from_porcelain("")).unwrap();
        assert_eq!(json["hasChanges"], false);
        assert!(json["changes"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_status_commit_and_push_roundtrip() {
        let root = tempfile::tempdir().unwrap();
        let brain = init_brain_repo(root.path());
        let inv = local_inventory(&brain, "qmd");

        assert!(!inv.git_status().await.unwrap().has_changes);

        write_nugget(&brain, "first", "# First\n");
        let status = inv.git_status().await.unwrap();
        assert!(status.has_changes);
        assert!(status.changes[0].contains("nuggets/"));

        let outcome = inv.commit_and_push("Add 'first' nugget").await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.message, "Committed and pushed successfully");
        assert!(outcome.commit.unwrap().contains("first"));
        assert!(!inv.git_status().await.unwrap().has_changes);

        let log = std::process::Command::new("git")
            .args(["log", "--all", "--format=%s"])
            .current_dir(root.path().join("remote.git"))
            .output()
            .unwrap();
        assert!(String::from_utf8_lossy(&log.stdout).contains("Add 'first' nugget"));
    }

    #[tokio::test]
    async fn test_clean_tree_is_nothing_to_commit() {
        let root = tempfile::tempdir().unwrap();
        let brain = init_brain_repo(root.path());
        write_nugget(&brain, "seed", "# Seed\n");
        git(&brain, &["add", "-A"]);
        git(&brain, &["commit", "-q", "-m", "seed"]);

        let inv = local_inventory(&brain, "qmd");
        let outcome = inv.commit_and_push("noop").await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.message, "Nothing to commit");
        assert!(outcome.commit.is_none());
    }

    #[tokio::test]
    async fn test_clean_tree_with_noisy_hook_is_nothing_to_commit() {
        use std::os::unix::fs::PermissionsExt;

        let root = tempfile::tempdir().unwrap();
        let brain = init_brain_repo(root.path());
        write_nugget(&brain, "seed", "# Seed\n");
        git(&brain, &["add", "-A"]);
        git(&brain, &["commit", "-q", "-m", "seed"]);

        let hook = brain.join(".git/hooks/pre-commit");
        std::fs::create_dir_all(hook.parent().unwrap()).unwrap();
        std::fs::write(&hook, "#!/bin/sh\necho 'lint: ok' >&2\n").unwrap();
        std::fs::set_permissions(&hook, std::fs::Permissions::from_mode(0o755)).unwrap();

        let inv = local_inventory(&brain, "qmd");
        let outcome = inv.commit_and_push("noop").await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.message, "Nothing to commit");
        assert!(outcome.commit.is_none());
    }

    #[tokio::test]
    async fn test_failed_commit_reports_shell_error() {
        use std::os::unix::fs::PermissionsExt;

        let root = tempfile::tempdir().unwrap();
        let brain = init_brain_repo(root.path());
        write_nugget(&brain, "draft", "# Draft\n");

        let hook = brain.join(".git/hooks/pre-commit");
        std::fs::create_dir_all(hook.parent().unwrap()).unwrap();
        std::fs::write(&hook, "#!/bin/sh\necho 'lint: failed' >&2\nexit 1\n").unwrap();
        std::fs::set_permissions(&hook, std::fs::Permissions::from_mode(0o755)).unwrap();

        let inv = local_inventory(&brain, "qmd");
        let err = inv.commit_and_push("draft").await.unwrap_err();
        match err {
            ControlError::Shell { stderr, .. } => assert!(stderr.contains("lint: failed")),
            other => panic!("Expected Shell error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_message_rejected() {
        let root = tempfile::tempdir().unwrap();
        let inv = local_inventory(root.path(), "qmd");
        let err = inv.commit_and_push("  ").await.unwrap_err();
        assert!(matches!(err, ControlError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_status_outside_repo_is_shell_error() {
        let root = tempfile::tempdir().unwrap();
        let inv = local_inventory(root.path(), "qmd");
        let err = inv.git_status().await.unwrap_err();
        assert!(matches!(err, ControlError::Shell { .. }));
    }
}
