//! Filesystem-backed [`StorageAdapter`].
//!
//! A document source is a sub-directory of the configured root (the empty
//! string or `"."` means the root itself). Documents are the files under it
//! that match the include globs and none of the exclude globs; names are
//! `/`-separated paths relative to the source directory, sorted.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

use runbook_rag_core::collaborators::StorageAdapter;

use crate::config::StorageConfig;

pub struct FilesystemStorage {
    root: PathBuf,
    include: GlobSet,
    exclude: GlobSet,
    follow_symlinks: bool,
}

impl FilesystemStorage {
    pub fn new(config: &StorageConfig) -> Result<Self> {
        let mut default_excludes = vec!["**/.git/**".to_string(), "**/node_modules/**".to_string()];
        default_excludes.extend(config.exclude_globs.iter().cloned());

        Ok(Self {
            root: config.root.clone(),
            include: build_globset(&config.include_globs)?,
            exclude: build_globset(&default_excludes)?,
            follow_symlinks: config.follow_symlinks,
        })
    }

    /// Storage over `root` with the default `**/*.md` include glob.
    pub fn with_root(root: impl Into<PathBuf>) -> Result<Self> {
        Self::new(&StorageConfig {
            root: root.into(),
            ..StorageConfig::default()
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn source_dir(&self, source: &str) -> Result<PathBuf> {
        let source = source.trim();
        if source.is_empty() || source == "." {
            return Ok(self.root.clone());
        }
        Ok(self.root.join(checked_relative(source)?))
    }
}

#[async_trait]
impl StorageAdapter for FilesystemStorage {
    async fn list_documents(&self, source: &str) -> Result<Vec<String>> {
        let dir = self.source_dir(source)?;
        if !dir.is_dir() {
            bail!("Document source does not exist: {}", dir.display());
        }
        let include = self.include.clone();
        let exclude = self.exclude.clone();
        let follow = self.follow_symlinks;

        tokio::task::spawn_blocking(move || scan(&dir, &include, &exclude, follow))
            .await
            .context("document scan task failed")?
    }

    async fn get_document_content(&self, source: &str, name: &str) -> Result<Option<String>> {
        let path = self.source_dir(source)?.join(checked_relative(name)?);
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
        }
    }
}

fn scan(dir: &Path, include: &GlobSet, exclude: &GlobSet, follow: bool) -> Result<Vec<String>> {
    let mut names = Vec::new();

    for entry in WalkDir::new(dir).follow_links(follow) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(dir).unwrap_or(path);
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        // Apply exclude patterns
        if exclude.is_match(&name) {
            continue;
        }

        // Apply include patterns
        if !include.is_match(&name) {
            continue;
        }

        names.push(name);
    }

    // Sort for deterministic ordering
    names.sort();
    Ok(names)
}

/// Reject absolute paths and `..` so names cannot escape the root.
fn checked_relative(name: &str) -> Result<&Path> {
    let path = Path::new(name);
    let escapes = path
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes {
        bail!("Document path must be relative and inside the source: {}", name);
    }
    Ok(path)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("Invalid glob: {}", pattern))?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn fixture() -> TempDir {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("ops/db")).unwrap();
        fs::create_dir_all(root.join("ops/.git")).unwrap();
        fs::write(root.join("ops/memory.md"), "# Memory\n").unwrap();
        fs::write(root.join("ops/db/replication.md"), "# Replication\n").unwrap();
        fs::write(root.join("ops/notes.txt"), "not a runbook").unwrap();
        fs::write(root.join("ops/.git/HEAD.md"), "ignored").unwrap();
        fs::write(root.join("top.md"), "# Top\n").unwrap();
        dir
    }

    #[tokio::test]
    async fn test_lists_markdown_sorted_and_relative() {
        let dir = fixture();
        let storage = FilesystemStorage::with_root(dir.path()).unwrap();
        let names = storage.list_documents("ops").await.unwrap();
        assert_eq!(names, vec!["db/replication.md", "memory.md"]);

        let all = storage.list_documents("").await.unwrap();
        assert_eq!(all, vec!["ops/db/replication.md", "ops/memory.md", "top.md"]);
    }

    #[tokio::test]
    async fn test_exclude_globs_apply() {
        let dir = fixture();
        let storage = FilesystemStorage::new(&StorageConfig {
            root: dir.path().to_path_buf(),
            exclude_globs: vec!["db/**".to_string()],
            ..StorageConfig::default()
        })
        .unwrap();
        let names = storage.list_documents("ops").await.unwrap();
        assert_eq!(names, vec!["memory.md"]);
    }

    #[tokio::test]
    async fn test_get_content_and_missing_document() {
        let dir = fixture();
        let storage = FilesystemStorage::with_root(dir.path()).unwrap();
        let text = storage.get_document_content("ops", "memory.md").await.unwrap();
        assert_eq!(text.as_deref(), Some("# Memory\n"));
        let missing = storage.get_document_content("ops", "gone.md").await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_missing_source_is_error() {
        let dir = fixture();
        let storage = FilesystemStorage::with_root(dir.path()).unwrap();
        assert!(storage.list_documents("nope").await.is_err());
    }

    #[tokio::test]
    async fn test_rejects_escaping_paths() {
        let dir = fixture();
        let storage = FilesystemStorage::with_root(dir.path()).unwrap();
        assert!(storage.get_document_content("ops", "../top.md").await.is_err());
        assert!(storage.list_documents("../").await.is_err());
        assert!(storage.get_document_content("", "/etc/passwd").await.is_err());
    }
}
