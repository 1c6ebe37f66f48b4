use regex::Regex;
use serde::Serialize;

use super::{Inventory, shell_quote};
use crate::errors::ControlError;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SearchResult {
    pub names: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Reindexed {
    pub success: bool,
    pub output: String,
}

/// Nugget names referenced by qmd URIs in `stdout`, first occurrence
/// order, no duplicates. Both `qmd://<collection>/nuggets/<name>/nugget.md`
/// and the flat `qmd://<collection>/<name>.md` shape are recognised.
pub fn parse_qmd_names(collection: &str, stdout: &str) -> Vec<String> {
    let pattern = format!(
        r"qmd://{}/(?:nuggets/([A-Za-z0-9_-]+)/nugget\.md|([A-Za-z0-9_-]+)\.md)",
        regex::escape(collection)
    );
    let Ok(re) = Regex::new(&pattern) else {
        return Vec::new();
    };
    let mut names: Vec<String> = Vec::new();
    for caps in re.captures_iter(stdout) {
        let Some(name) = caps.get(1).or_else(|| caps.get(2)) else {
            continue;
        };
        let name = name.as_str();
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}

impl Inventory {
    /// Index failures are swallowed: search and reindex report what qmd
    /// printed, even when that is nothing.
    fn qmd(&self, args: &str) -> String {
        format!("{} {} 2>/dev/null || true", shell_quote(&self.qmd_bin), args)
    }

    pub async fn search(&self, query: &str) -> Result<SearchResult, ControlError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(SearchResult {
                names: Vec::new(),
                query: None,
            });
        }

        self.shell.run(&self.qmd("update")).await?;
        let output = self
            .shell
            .run(&self.qmd(&format!("search {}", shell_quote(query))))
            .await?;

        let names = parse_qmd_names(&self.qmd_collection, &output.stdout);
        tracing::debug!(query = %query, hits = names.len(), "nugget search");
        Ok(SearchResult {
            names,
            query: Some(query.to_string()),
        })
    }

    /// Refresh the qmd index and its embeddings.
    pub async fn reindex(&self) -> Result<Reindexed, ControlError> {
        self.shell.run(&self.qmd("update")).await?;
        let output = self.shell.run(&self.qmd("embed")).await?;
        tracing::info!("reindexed nuggets");
        Ok(Reindexed {
            success: true,
            output: output.stdout,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::super::testutil::*;
    use super::*;

    /// A stand-in `qmd` that logs its arguments and prints canned hits.
    fn fake_qmd(dir: &Path) -> String {
        use std::os::unix::fs::PermissionsExt;

        let log = dir.join("qmd.log");
        let script = format!(
            r#"#!/bin/sh
echo "$@" >> '{}'
case "$1" in
  search)
    echo "qmd://shared-brain/nuggets/rust-tips/nugget.md:1 #a1"
    echo "qmd://shared-brain/nuggets/async_io/nugget.md:4 #b2"
    echo "qmd://shared-brain/nuggets/rust-tips/nugget.md:9 #c3"
    echo "qmd://other/nuggets/elsewhere/nugget.md:1 #d4"
    ;;
  embed)
    echo "embedded 2 documents"
    ;;
esac
"#,
            log.display()
        );
        let path = dir.join("qmd");
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().to_string()
    }

    #[test]
    fn test_parse_dedups_in_first_seen_order() {
        let out = "qmd://shared-brain/nuggets/b/nugget.md:1\n\
                   noise\n\
                   qmd://shared-brain/nuggets/a/nugget.md:2\n\
                   qmd://shared-brain/nuggets/b/nugget.md:3\n";
        assert_eq!(parse_qmd_names("shared-brain", out), vec!["b", "a"]);
    }

    #[test]
    fn test_parse_ignores_other_collections_and_files() {
        let out = "qmd://other/nuggets/x/nugget.md\nqmd://shared-brain/nuggets/y/notes.md";
        assert!(parse_qmd_names("shared-brain", out).is_empty());
    }

    #[test]
    fn test_parse_accepts_flat_collection_uris() {
        let out = "qmd://shared-brain/rust.md:1 #a\nqmd://shared-brain/nuggets/go/nugget.md:2\n";
        assert_eq!(parse_qmd_names("shared-brain", out), vec!["rust", "go"]);
    }

    #[tokio::test]
    async fn test_collection_does_not_depend_on_brain_dir_name() {
        let tmp = tempfile::tempdir().unwrap();
        let qmd = fake_qmd(tmp.path());
        let inv = local_inventory(&tmp.path().join("brain"), &qmd);

        let result = inv.search("rust").await.unwrap();
        assert_eq!(result.names, vec!["rust-tips", "async_io"]);

        let inv = inv.with_qmd_collection("other");
        assert_eq!(inv.search("rust").await.unwrap().names, vec!["elsewhere"]);
    }

    #[tokio::test]
    async fn test_blank_query_returns_no_names_without_running_qmd() {
        let tmp = tempfile::tempdir().unwrap();
        let qmd = fake_qmd(tmp.path());
        let inv = local_inventory(&tmp.path().join("shared-brain"), &qmd);

        let result = inv.search("   ").await.unwrap();
        assert!(result.names.is_empty());
        assert!(result.query.is_none());
        assert!(!tmp.path().join("qmd.log").exists());
    }

    #[tokio::test]
    async fn test_search_updates_then_parses_hits() {
        let tmp = tempfile::tempdir().unwrap();
        let qmd = fake_qmd(tmp.path());
        let inv = local_inventory(&tmp.path().join("shared-brain"), &qmd);

        let result = inv.search(" it's rust ").await.unwrap();
        assert_eq!(result.names, vec!["rust-tips", "async_io"]);
        assert_eq!(result.query.as_deref(), Some("it's rust"));

        let log = std::fs::read_to_string(tmp.path().join("qmd.log")).unwrap();
        let calls: Vec<&str> = log.lines().collect();
        assert_eq!(calls, vec!["update", "search it's rust"]);
    }

    #[tokio::test]
    async fn test_search_tolerates_missing_qmd() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = tmp.path().join("no-such-qmd");
        let inv = local_inventory(tmp.path(), &missing.to_string_lossy());
        let result = inv.search("anything").await.unwrap();
        assert!(result.names.is_empty());
    }

    #[tokio::test]
    async fn test_reindex_runs_update_and_embed() {
        let tmp = tempfile::tempdir().unwrap();
        let qmd = fake_qmd(tmp.path());
        let inv = local_inventory(&tmp.path().join("shared-brain"), &qmd);

        let result = inv.reindex().await.unwrap();
        assert!(result.success);
        assert_eq!(result.output, "embedded 2 documents\n");
        let log = std::fs::read_to_string(tmp.path().join("qmd.log")).unwrap();
        assert_eq!(log.lines().collect::<Vec<_>>(), vec!["update", "embed"]);
    }
}
