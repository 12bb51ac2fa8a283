//! File storage backends.
//!
//! Setting file areas are addressed by storage URIs of the form
//! `local://{component}/{setting}{filepath}{filename}`.

use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

const LOCAL_SCHEME: &str = "local://";

/// File storage backend trait.
#[async_trait]
pub trait FileStorage: Send + Sync {
    /// Write data to storage at the given URI.
    async fn write(&self, uri: &str, data: &[u8]) -> Result<()>;

    /// Read data from storage at the given URI.
    async fn read(&self, uri: &str) -> Result<Vec<u8>>;

    /// Delete a file from storage.
    async fn delete(&self, uri: &str) -> Result<()>;

    /// Check if a file exists.
    async fn exists(&self, uri: &str) -> Result<bool>;

    /// URIs of all files below `prefix`, sorted.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Get the public URL for a file.
    fn public_url(&self, uri: &str) -> String;
}

/// URI of a file in a setting's file area.
///
/// `filepath` is normalised to start and end with `/`, so `""`, `"/"` and
/// `"/sub"` all work.
pub fn area_uri(component: &str, setting: &str, filepath: &str, filename: &str) -> Result<String> {
    if filename.is_empty() || filename.contains('/') || filename.contains('\\') {
        bail!("invalid file name '{filename}'");
    }
    if filename == "." || filename == ".." {
        bail!("invalid file name '{filename}'");
    }

    let trimmed = filepath.trim_matches('/');
    if filepath.contains('\\')
        || (!trimmed.is_empty()
            && trimmed
                .split('/')
                .any(|segment| segment.is_empty() || segment == "." || segment == ".."))
    {
        bail!("invalid file path '{filepath}'");
    }
    let filepath = if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{trimmed}/")
    };

    Ok(format!("{LOCAL_SCHEME}{component}/{setting}{filepath}{filename}"))
}

/// URI prefix covering a setting's whole file area.
pub fn area_prefix(component: &str, setting: &str) -> String {
    format!("{LOCAL_SCHEME}{component}/{setting}/")
}

/// Split an area URI back into `(filepath, filename)` relative to `prefix`.
pub fn split_area_uri<'a>(prefix: &str, uri: &'a str) -> Option<(String, &'a str)> {
    let rest = uri.strip_prefix(prefix)?;
    match rest.rsplit_once('/') {
        Some((dir, name)) => Some((format!("/{dir}/"), name)),
        None => Some(("/".to_string(), rest)),
    }
}

/// Local filesystem storage.
pub struct LocalFileStorage {
    /// Base path for file storage.
    base_path: PathBuf,
    /// Base URL for public file access.
    base_url: String,
}

impl LocalFileStorage {
    /// Create a new local file storage.
    pub fn new(base_path: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            base_path: base_path.into(),
            base_url: base_url.into(),
        }
    }

    /// Parse a local:// URI to get the filesystem path.
    ///
    /// Rejects paths containing `..` components to prevent directory traversal.
    fn parse_uri(&self, uri: &str) -> Result<PathBuf> {
        let path = uri
            .strip_prefix(LOCAL_SCHEME)
            .context("invalid local URI, must start with local://")?;
        for component in Path::new(path).components() {
            if matches!(component, Component::ParentDir | Component::RootDir) {
                bail!("directory traversal not allowed in storage URI");
            }
        }
        Ok(self.base_path.join(path))
    }
}

#[async_trait]
impl FileStorage for LocalFileStorage {
    async fn write(&self, uri: &str, data: &[u8]) -> Result<()> {
        let path = self.parse_uri(uri)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .context("failed to create directories")?;
        }

        let mut file = fs::File::create(&path)
            .await
            .context("failed to create file")?;
        file.write_all(data).await.context("failed to write file")?;
        file.flush().await.context("failed to flush file")?;

        debug!(uri = %uri, path = ?path, size = data.len(), "file written");
        Ok(())
    }

    async fn read(&self, uri: &str) -> Result<Vec<u8>> {
        let path = self.parse_uri(uri)?;
        let data = fs::read(&path)
            .await
            .with_context(|| format!("failed to read file {uri}"))?;
        debug!(uri = %uri, size = data.len(), "file read");
        Ok(data)
    }

    async fn delete(&self, uri: &str) -> Result<()> {
        let path = self.parse_uri(uri)?;

        if path.exists() {
            fs::remove_file(&path)
                .await
                .context("failed to delete file")?;
            debug!(uri = %uri, "file deleted");
        } else {
            warn!(uri = %uri, "file not found for deletion");
        }

        Ok(())
    }

    async fn exists(&self, uri: &str) -> Result<bool> {
        let path = self.parse_uri(uri)?;
        Ok(path.is_file())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let root = self.parse_uri(prefix)?;
        if !root.is_dir() {
            return Ok(Vec::new());
        }

        let mut uris = Vec::new();
        let mut pending = vec![root];
        while let Some(dir) = pending.pop() {
            let mut entries = fs::read_dir(&dir)
                .await
                .with_context(|| format!("failed to list {}", dir.display()))?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                    continue;
                }
                let Ok(relative) = path.strip_prefix(&self.base_path) else {
                    continue;
                };
                let relative = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                uris.push(format!("{LOCAL_SCHEME}{relative}"));
            }
        }

        uris.sort();
        Ok(uris)
    }

    fn public_url(&self, uri: &str) -> String {
        let path = uri.strip_prefix(LOCAL_SCHEME).unwrap_or(uri);
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }
}

impl std::fmt::Debug for LocalFileStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalFileStorage")
            .field("base_path", &self.base_path)
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[cfg(test)]
// Tests are allowed to use unwrap/expect freely.
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn area_uri_normalises_filepath() {
        let expected = "local://theme_tessera/logo/logo.png";
        assert_eq!(area_uri("theme_tessera", "logo", "", "logo.png").unwrap(), expected);
        assert_eq!(area_uri("theme_tessera", "logo", "/", "logo.png").unwrap(), expected);
        assert_eq!(
            area_uri("theme_tessera", "slides", "sub/dir", "a.jpg").unwrap(),
            "local://theme_tessera/slides/sub/dir/a.jpg"
        );
    }

    #[test]
    fn area_uri_rejects_bad_names() {
        assert!(area_uri("c", "s", "/", "").is_err());
        assert!(area_uri("c", "s", "/", "../x").is_err());
        assert!(area_uri("c", "s", "/", "..").is_err());
    }

    #[test]
    fn area_uri_rejects_bad_paths() {
        assert!(area_uri("c", "s", "/../../escape/", "a.png").is_err());
        assert!(area_uri("c", "s", "/sub/../", "a.png").is_err());
        assert!(area_uri("c", "s", "/./", "a.png").is_err());
        assert!(area_uri("c", "s", "/a//b/", "a.png").is_err());
        assert!(area_uri("c", "s", "\\windows\\", "a.png").is_err());
        assert!(area_uri("c", "s", "/sub.dir/", "a.png").is_ok());
    }

    #[test]
    fn split_area_uri_recovers_parts() {
        let prefix = area_prefix("theme_tessera", "slides");
        let (path, name) = split_area_uri(&prefix, "local://theme_tessera/slides/sub/a.jpg").unwrap();
        assert_eq!(path, "/sub/");
        assert_eq!(name, "a.jpg");

        let (path, name) = split_area_uri(&prefix, "local://theme_tessera/slides/b.jpg").unwrap();
        assert_eq!(path, "/");
        assert_eq!(name, "b.jpg");
    }

    #[test]
    fn traversal_is_rejected() {
        let storage = LocalFileStorage::new("/tmp/uploads", "/files");
        assert!(storage.parse_uri("local://../etc/passwd").is_err());
        assert!(storage.parse_uri("local://a/../../etc").is_err());
        assert!(storage.parse_uri("s3://bucket/key").is_err());
    }

    #[test]
    fn test_public_url() {
        let storage = LocalFileStorage::new("/tmp/uploads", "https://example.com/pluginfile/");
        let url = storage.public_url("local://theme_tessera/logo/logo.png");
        assert_eq!(url, "https://example.com/pluginfile/theme_tessera/logo/logo.png");
    }

    #[tokio::test]
    async fn write_read_list_delete() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalFileStorage::new(dir.path(), "/pluginfile");

        let a = area_uri("theme_tessera", "slides", "/", "a.jpg").unwrap();
        let b = area_uri("theme_tessera", "slides", "/sub/", "b.jpg").unwrap();
        let other = area_uri("theme_tessera", "logo", "/", "logo.png").unwrap();
        storage.write(&a, b"aaa").await.unwrap();
        storage.write(&b, b"bbb").await.unwrap();
        storage.write(&other, b"logo").await.unwrap();

        assert_eq!(storage.read(&b).await.unwrap(), b"bbb");
        assert!(storage.exists(&a).await.unwrap());

        let listed = storage
            .list(&area_prefix("theme_tessera", "slides"))
            .await
            .unwrap();
        assert_eq!(listed, vec![a.clone(), b.clone()]);

        storage.delete(&a).await.unwrap();
        assert!(!storage.exists(&a).await.unwrap());
        // Deleting a missing file is not an error.
        storage.delete(&a).await.unwrap();
    }

    #[tokio::test]
    async fn listing_a_missing_area_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalFileStorage::new(dir.path(), "/pluginfile");
        let listed = storage.list("local://theme_tessera/nothing/").await.unwrap();
        assert!(listed.is_empty());
    }
}
