//! # Host capabilities
//!
//! Everything the agent core needs from its host editor is expressed by the
//! [`Workspace`] trait: file I/O, directory listing, file search, process
//! execution, diagnostics and symbols. Tools, checkpoints and the workflow
//! planner depend only on this trait, so a concrete adapter can be swapped per
//! host. [`LocalWorkspace`] is the adapter used by the CLI; it talks to the
//! local filesystem and spawns processes through `sh -c`.

use crate::symbols::{self, Symbol};
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use ignore::WalkBuilder;
use ignore::overrides::OverrideBuilder;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Mutex;
use tokio::process::{Child, Command};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Folder,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub path: String,
    pub line: usize,
    pub column: usize,
    pub severity: String,
    pub message: String,
}

#[async_trait]
pub trait Workspace: Send + Sync {
    /// Root folders of the workspace. The first one is the primary root.
    fn roots(&self) -> Vec<PathBuf>;

    async fn read_file(&self, path: &Path) -> Result<String>;

    /// Writes `content`, creating the file (and its parents) if needed.
    async fn write_file(&self, path: &Path, content: &str) -> Result<()>;

    async fn create_dir(&self, path: &Path) -> Result<()>;

    /// Returns `None` if nothing exists at `path`.
    async fn stat(&self, path: &Path) -> Result<Option<EntryKind>>;

    async fn read_dir(&self, path: &Path) -> Result<Vec<DirEntry>>;

    /// Finds files below the workspace roots matching a glob.
    async fn find_files(&self, pattern: &str, exclude: Option<&str>) -> Result<Vec<PathBuf>>;

    /// Runs a one-off command to completion.
    async fn run_command(&self, command: &str) -> Result<CommandOutput>;

    /// Starts a long-running command and returns its process id.
    async fn spawn_command(&self, command: &str) -> Result<u32>;

    async fn diagnostics(&self, _path: &Path) -> Result<Vec<Diagnostic>> {
        Ok(Vec::new())
    }

    async fn document_symbols(&self, path: &Path) -> Result<Vec<Symbol>> {
        let content = self.read_file(path).await?;
        Ok(symbols::outline(&content))
    }

    async fn workspace_symbols(&self, query: &str) -> Result<Vec<Symbol>> {
        let query = query.to_lowercase();
        let mut found = Vec::new();
        for file in self.find_files("**/*", None).await? {
            // Binary or unreadable files simply have no symbols.
            let Ok(content) = self.read_file(&file).await else {
                continue;
            };
            for mut symbol in symbols::outline(&content) {
                if symbol.name.to_lowercase().contains(&query) {
                    symbol.path = Some(file.to_string_lossy().into_owned());
                    found.push(symbol);
                }
            }
        }
        Ok(found)
    }

    /// Resolves a `file://` URI or a plain path. Relative paths are taken
    /// relative to the primary root.
    fn resolve_uri(&self, uri: &str) -> PathBuf {
        let uri = uri.trim();
        let path = match Url::parse(uri) {
            Ok(url) if url.scheme() == "file" => url
                .to_file_path()
                .unwrap_or_else(|_| PathBuf::from(url.path())),
            _ => PathBuf::from(uri),
        };
        if path.is_absolute() {
            return path;
        }
        match self.roots().first() {
            Some(root) => root.join(path),
            None => path,
        }
    }
}

/// Renders `path` as a `file://` URI, or as a plain path if it is relative.
pub fn to_uri(path: &Path) -> String {
    Url::from_file_path(path)
        .map(String::from)
        .unwrap_or_else(|_| path.display().to_string())
}

static DIAGNOSTIC_LINE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<path>[^:\s][^:]*):(?P<line>\d+):(?P<col>\d+):\s*(?P<severity>[A-Za-z]+)(?:\[[^\]]*\])?:\s*(?P<message>.*)$")
        .expect("Invalid regex")
});

/// Parses compiler-style `path:line:col: severity: message` lines.
pub fn parse_diagnostics(output: &str) -> Vec<Diagnostic> {
    output
        .lines()
        .filter_map(|line| {
            let cap = DIAGNOSTIC_LINE_REGEX.captures(line.trim())?;
            Some(Diagnostic {
                path: cap["path"].to_string(),
                line: cap["line"].parse().ok()?,
                column: cap["col"].parse().ok()?,
                severity: cap["severity"].to_lowercase(),
                message: cap["message"].trim().to_string(),
            })
        })
        .collect()
}

/// Local filesystem and process host.
pub struct LocalWorkspace {
    roots: Vec<PathBuf>,
    ignored_paths: Vec<String>,
    diagnostics_command: Option<String>,
    background: Mutex<Vec<Child>>,
}

impl LocalWorkspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            roots: vec![root.into()],
            ignored_paths: Vec::new(),
            diagnostics_command: None,
            background: Mutex::new(Vec::new()),
        }
    }

    pub fn with_ignored_paths(mut self, ignored_paths: Vec<String>) -> Self {
        self.ignored_paths = ignored_paths;
        self
    }

    pub fn with_diagnostics_command(mut self, command: Option<String>) -> Self {
        self.diagnostics_command = command;
        self
    }

    /// Reaps background processes that have exited and returns how many are
    /// still running.
    fn prune_background(background: &mut Vec<Child>) -> usize {
        background.retain_mut(|child| match child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                tracing::debug!(pid = ?child.id(), %status, "background command exited");
                false
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to poll background command");
                false
            }
        });
        background.len()
    }

    fn primary_root(&self) -> Result<&Path> {
        self.roots
            .first()
            .map(PathBuf::as_path)
            .ok_or_else(|| anyhow!("Workspace has no root folder"))
    }

    fn walk(&self, root: &Path, pattern: &str, exclude: Option<&str>) -> Result<Vec<PathBuf>> {
        let mut overrides = OverrideBuilder::new(root);
        overrides.add(pattern)?;
        if let Some(exclude) = exclude {
            overrides.add(&format!("!{exclude}"))?;
        }
        for ignored in &self.ignored_paths {
            overrides.add(&format!("!{ignored}"))?;
        }
        let overrides = overrides.build()?;

        let mut files: Vec<PathBuf> = WalkBuilder::new(root)
            .overrides(overrides)
            .build()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_some_and(|t| t.is_file()))
            .map(|entry| entry.into_path())
            .collect();
        files.sort();
        Ok(files)
    }
}

#[async_trait]
impl Workspace for LocalWorkspace {
    fn roots(&self) -> Vec<PathBuf> {
        self.roots.clone()
    }

    async fn read_file(&self, path: &Path) -> Result<String> {
        tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))
    }

    async fn write_file(&self, path: &Path, content: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(path, content)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))
    }

    async fn create_dir(&self, path: &Path) -> Result<()> {
        tokio::fs::create_dir_all(path)
            .await
            .with_context(|| format!("Failed to create directory {}", path.display()))
    }

    async fn stat(&self, path: &Path) -> Result<Option<EntryKind>> {
        match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_dir() => Ok(Some(EntryKind::Folder)),
            Ok(_) => Ok(Some(EntryKind::File)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn read_dir(&self, path: &Path) -> Result<Vec<DirEntry>> {
        let mut reader = tokio::fs::read_dir(path)
            .await
            .with_context(|| format!("Failed to read directory {}", path.display()))?;
        let mut entries = Vec::new();
        while let Some(entry) = reader.next_entry().await? {
            let kind = if entry.file_type().await?.is_dir() {
                EntryKind::Folder
            } else {
                EntryKind::File
            };
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                kind,
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn find_files(&self, pattern: &str, exclude: Option<&str>) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for root in &self.roots {
            files.extend(self.walk(root, pattern, exclude)?);
        }
        Ok(files)
    }

    async fn run_command(&self, command: &str) -> Result<CommandOutput> {
        let output = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(self.primary_root()?)
            .output()
            .await
            .with_context(|| format!("Failed to run `{command}`"))?;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
        })
    }

    async fn spawn_command(&self, command: &str) -> Result<u32> {
        let child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(self.primary_root()?)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            // Background commands keep running after the session ends.
            .kill_on_drop(false)
            .spawn()
            .with_context(|| format!("Failed to start `{command}`"))?;
        let pid = child
            .id()
            .ok_or_else(|| anyhow!("Process for `{command}` exited immediately"))?;
        let mut background = self
            .background
            .lock()
            .map_err(|_| anyhow!("background process list poisoned"))?;
        let running = Self::prune_background(&mut background);
        background.push(child);
        tracing::info!(pid, command, running, "started background command");
        Ok(pid)
    }

    async fn diagnostics(&self, path: &Path) -> Result<Vec<Diagnostic>> {
        let Some(command) = &self.diagnostics_command else {
            return Ok(Vec::new());
        };
        let output = self.run_command(command).await?;
        let root = self.primary_root()?;
        let target = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());

        let combined = format!("{}\n{}", output.stdout, output.stderr);
        Ok(parse_diagnostics(&combined)
            .into_iter()
            .filter(|d| {
                let reported = root.join(&d.path);
                reported.canonicalize().unwrap_or(reported) == target
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::Builder;

    fn setup_workspace() -> (tempfile::TempDir, LocalWorkspace) {
        let tmp_dir = Builder::new().prefix("test-workspace-").tempdir().unwrap();
        let root = tmp_dir.path();
        fs::write(root.join("main.rs"), "fn main() {}\n").unwrap();
        fs::create_dir(root.join("src")).unwrap();
        fs::write(root.join("src/lib.rs"), "pub struct Thing;\n").unwrap();
        fs::create_dir(root.join("node_modules")).unwrap();
        fs::write(root.join("node_modules/dep.js"), "function dep() {}\n").unwrap();
        let workspace = LocalWorkspace::new(root);
        (tmp_dir, workspace)
    }

    #[test]
    fn test_resolve_uri_variants() {
        let workspace = LocalWorkspace::new("/work");
        assert_eq!(
            workspace.resolve_uri("file:///tmp/a.rs"),
            PathBuf::from("/tmp/a.rs")
        );
        assert_eq!(workspace.resolve_uri("/abs/b.rs"), PathBuf::from("/abs/b.rs"));
        assert_eq!(
            workspace.resolve_uri("src/c.rs"),
            PathBuf::from("/work/src/c.rs")
        );
    }

    #[test]
    fn test_to_uri_round_trips_through_resolve() {
        let workspace = LocalWorkspace::new("/work");
        let uri = to_uri(Path::new("/work/src/lib.rs"));
        assert_eq!(uri, "file:///work/src/lib.rs");
        assert_eq!(workspace.resolve_uri(&uri), PathBuf::from("/work/src/lib.rs"));
        assert_eq!(to_uri(Path::new("relative.rs")), "relative.rs");
    }

    #[tokio::test]
    async fn test_find_files_with_exclude() {
        let (tmp_dir, workspace) = setup_workspace();
        let files = workspace
            .find_files("**/*", Some("**/node_modules/**"))
            .await
            .unwrap();
        let root = tmp_dir.path();
        assert_eq!(files, vec![root.join("main.rs"), root.join("src/lib.rs")]);
    }

    #[tokio::test]
    async fn test_find_files_by_extension() {
        let (tmp_dir, workspace) = setup_workspace();
        let files = workspace.find_files("**/*.js", None).await.unwrap();
        assert_eq!(files, vec![tmp_dir.path().join("node_modules/dep.js")]);
    }

    #[tokio::test]
    async fn test_read_dir_is_sorted_and_typed() {
        let (tmp_dir, workspace) = setup_workspace();
        let entries = workspace.read_dir(tmp_dir.path()).await.unwrap();
        assert_eq!(
            entries,
            vec![
                DirEntry {
                    name: "main.rs".to_string(),
                    kind: EntryKind::File
                },
                DirEntry {
                    name: "node_modules".to_string(),
                    kind: EntryKind::Folder
                },
                DirEntry {
                    name: "src".to_string(),
                    kind: EntryKind::Folder
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_write_file_creates_parents() {
        let (tmp_dir, workspace) = setup_workspace();
        let target = tmp_dir.path().join("new/nested/file.txt");
        workspace.write_file(&target, "hello").await.unwrap();
        assert_eq!(fs::read_to_string(&target).unwrap(), "hello");
        assert_eq!(workspace.stat(&target).await.unwrap(), Some(EntryKind::File));
        assert_eq!(
            workspace.stat(&tmp_dir.path().join("missing")).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_run_command_captures_output() {
        let (_tmp_dir, workspace) = setup_workspace();
        let output = workspace.run_command("echo out; echo err 1>&2").await.unwrap();
        assert!(output.success());
        assert_eq!(output.stdout, "out\n");
        assert_eq!(output.stderr, "err\n");
    }

    #[tokio::test]
    async fn test_exited_background_commands_are_reaped() {
        let (_tmp_dir, workspace) = setup_workspace();
        workspace.spawn_command("true").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(500)).await;
        workspace.spawn_command("sleep 5").await.unwrap();

        let mut background = workspace.background.lock().unwrap();
        assert_eq!(background.len(), 1);
        background[0].start_kill().unwrap();
    }

    #[tokio::test]
    async fn test_workspace_symbols_searches_all_files() {
        let (_tmp_dir, workspace) = setup_workspace();
        let symbols = workspace.workspace_symbols("thing").await.unwrap();
        assert_eq!(symbols.len(), 1);
        assert_eq!(symbols[0].name, "Thing");
        assert!(symbols[0].path.as_deref().unwrap().ends_with("src/lib.rs"));
    }

    #[tokio::test]
    async fn test_diagnostics_from_command_output() {
        let (tmp_dir, workspace) = setup_workspace();
        let workspace = workspace.with_diagnostics_command(Some(
            "echo 'src/lib.rs:1:12: error: expected item'; echo 'main.rs:1:1: warning: unused'"
                .to_string(),
        ));
        let diagnostics = workspace
            .diagnostics(&tmp_dir.path().join("src/lib.rs"))
            .await
            .unwrap();
        assert_eq!(
            diagnostics,
            vec![Diagnostic {
                path: "src/lib.rs".to_string(),
                line: 1,
                column: 12,
                severity: "error".to_string(),
                message: "expected item".to_string(),
            }]
        );
    }

    #[test]
    fn test_parse_diagnostics_with_codes() {
        let parsed = parse_diagnostics("src/a.rs:10:5: warning[E0001]: something odd\nnoise");
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].severity, "warning");
        assert_eq!(parsed[0].message, "something odd");
    }
}
