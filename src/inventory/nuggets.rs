use serde::Serialize;

use super::{Inventory, shell_quote, validate_name};
use crate::errors::ControlError;

/// Exit code our scripts use for "the nugget is not there" (or, on
/// create, "it already is").
const EXIT_PRESENCE: i32 = 3;

/// Listing entry.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Nugget {
    pub name: String,
    /// Path relative to the brain directory.
    pub path: String,
    pub title: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NuggetContent {
    pub name: String,
    pub content: String,
    pub path: String,
}

/// Parse `name<TAB>first line` records emitted by the listing script.
pub fn parse_listing(stdout: &str) -> Vec<Nugget> {
    let mut nuggets: Vec<Nugget> = stdout
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let (name, first_line) = line.split_once('\t').unwrap_or((line, ""));
            let title = first_line
                .strip_prefix("# ")
                .map(|t| t.trim().to_string())
                .unwrap_or_else(|| name.to_string());
            Nugget {
                name: name.to_string(),
                path: format!("nuggets/{}/nugget.md", name),
                title,
            }
        })
        .collect();
    nuggets.sort_by(|a, b| a.name.cmp(&b.name));
    nuggets
}

impl Inventory {
    /// Every `nuggets/<name>/` that holds a `nugget.md`, sorted by name.
    /// An absent nuggets directory yields an empty list.
    pub async fn list_nuggets(&self) -> Result<Vec<Nugget>, ControlError> {
        let script = format!(
            r#"dir={}
[ -d "$dir" ] || exit 0
for d in "$dir"/*/; do
  [ -f "$d/nugget.md" ] || continue
  printf '%s\t%s\n' "$(basename "$d")" "$(head -n 1 "$d/nugget.md")"
done"#,
            shell_quote(&self.nuggets_dir())
        );
        let output = self.shell.run_checked(&script).await?;
        Ok(parse_listing(&output.stdout))
    }

    pub async fn get_nugget(&self, name: &str) -> Result<NuggetContent, ControlError> {
        validate_name(name)?;
        let path = self.nugget_file(name);
        let script = format!(
            r#"f={}
[ -f "$f" ] || exit {}
cat "$f""#,
            shell_quote(&path),
            EXIT_PRESENCE
        );
        let output = self.shell.run(&script).await?;
        match output.code {
            Some(0) => Ok(NuggetContent {
                name: name.to_string(),
                content: output.stdout,
                path,
            }),
            Some(EXIT_PRESENCE) => Err(ControlError::NuggetNotFound {
                name: name.to_string(),
            }),
            _ => Err(ControlError::Shell {
                command: format!("cat {}", path),
                stderr: output.error_text(),
            }),
        }
    }

    /// Overwrite (or create) a nugget. Returns the absolute file path.
    pub async fn save_nugget(&self, name: &str, content: &str) -> Result<String, ControlError> {
        validate_name(name)?;
        if content.is_empty() {
            return Err(ControlError::BadRequest("Content required".into()));
        }
        let path = self.nugget_file(name);
        let script = format!(
            "mkdir -p {} && cat > {}",
            shell_quote(&self.nugget_dir(name)),
            shell_quote(&path)
        );
        let output = self.shell.run_with_input(&script, Some(content)).await?;
        if !output.success() {
            return Err(ControlError::Shell {
                command: format!("write {}", path),
                stderr: output.error_text(),
            });
        }
        tracing::info!(nugget = %name, "saved nugget");
        Ok(path)
    }

    /// Create a new nugget; refuses to overwrite. An empty body becomes a
    /// `# <name>` heading.
    pub async fn create_nugget(&self, name: &str, content: &str) -> Result<String, ControlError> {
        validate_name(name)?;
        let body = if content.trim().is_empty() {
            format!("# {}\n", name)
        } else {
            content.to_string()
        };
        let path = self.nugget_file(name);
        let script = format!(
            r#"f={}
[ -e "$f" ] && exit {}
mkdir -p {} && cat > "$f""#,
            shell_quote(&path),
            EXIT_PRESENCE,
            shell_quote(&self.nugget_dir(name))
        );
        let output = self.shell.run_with_input(&script, Some(&body)).await?;
        match output.code {
            Some(0) => {
                tracing::info!(nugget = %name, "created nugget");
                Ok(path)
            }
            Some(EXIT_PRESENCE) => Err(ControlError::NuggetExists {
                name: name.to_string(),
            }),
            _ => Err(ControlError::Shell {
                command: format!("create {}", path),
                stderr: output.error_text(),
            }),
        }
    }

    pub async fn delete_nugget(&self, name: &str) -> Result<(), ControlError> {
        validate_name(name)?;
        let dir = self.nugget_dir(name);
        let script = format!(
            r#"d={}
[ -d "$d" ] || exit {}
rm -rf "$d""#,
            shell_quote(&dir),
            EXIT_PRESENCE
        );
        let output = self.shell.run(&script).await?;
        match output.code {
            Some(0) => {
                tracing::info!(nugget = %name, "deleted nugget");
                Ok(())
            }
            Some(EXIT_PRESENCE) => Err(ControlError::NuggetNotFound {
                name: name.to_string(),
            }),
            _ => Err(ControlError::Shell {
                command: format!("rm -rf {}", dir),
                stderr: output.error_text(),
            }),
        }
    }
}
