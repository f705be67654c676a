//! Native file-editing tools built on the replace engine.

pub mod apply_patch;
pub mod edit;
pub mod multiedit;

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::errors::ToolError;
use crate::traits::AgentTool;

pub use apply_patch::ApplyPatchTool;
pub use edit::EditTool;
pub use multiedit::MultiEditTool;

/// Filesystem seam for the edit tools.
#[async_trait]
pub trait FileSystemOps: Send + Sync {
    /// Read a file as UTF-8.
    async fn read_to_string(&self, path: &Path) -> io::Result<String>;

    /// Write a file, creating parent directories.
    async fn write(&self, path: &Path, content: &str) -> io::Result<()>;
}

/// [`FileSystemOps`] over `tokio::fs`.
#[derive(Clone, Copy, Debug, Default)]
pub struct RealFs;

#[async_trait]
impl FileSystemOps for RealFs {
    async fn read_to_string(&self, path: &Path) -> io::Result<String> {
        tokio::fs::read_to_string(path).await
    }

    async fn write(&self, path: &Path, content: &str) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, content).await
    }
}

/// The native tool set over the given filesystem.
pub fn native_tools(fs: Arc<dyn FileSystemOps>) -> Vec<Arc<dyn AgentTool>> {
    vec![
        Arc::new(EditTool::new(Arc::clone(&fs))),
        Arc::new(MultiEditTool::new(fs)),
        Arc::new(ApplyPatchTool),
    ]
}

/// Resolve a file path against the app directory.
///
/// Absolute paths are returned unchanged.
pub fn resolve_path(file_path: &str, app_path: &Path) -> PathBuf {
    let path = Path::new(file_path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        app_path.join(path)
    }
}

/// Path shown in tool output: relative to the app directory when inside it.
pub(crate) fn display_path(path: &Path, app_path: &Path) -> String {
    path.strip_prefix(app_path)
        .unwrap_or(path)
        .to_string_lossy()
        .into_owned()
}

pub(crate) fn parse_input<T: DeserializeOwned>(input: Value) -> Result<T, ToolError> {
    serde_json::from_value(input).map_err(|e| ToolError::validation(e.to_string()))
}

/// Read `path`, treating a missing file as empty when `allow_missing`.
pub(crate) async fn read_existing(
    fs: &dyn FileSystemOps,
    path: &Path,
    allow_missing: bool,
) -> Result<String, ToolError> {
    match fs.read_to_string(path).await {
        Ok(content) => Ok(content),
        Err(e) if allow_missing && e.kind() == io::ErrorKind::NotFound => Ok(String::new()),
        Err(source) => Err(ToolError::Io {
            action: "reading",
            path: path.display().to_string(),
            source,
        }),
    }
}

pub(crate) async fn write_file(
    fs: &dyn FileSystemOps,
    path: &Path,
    content: &str,
) -> Result<(), ToolError> {
    fs.write(path, content).await.map_err(|source| ToolError::Io {
        action: "writing",
        path: path.display().to_string(),
        source,
    })
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_absolute_path_unchanged() {
        let result = resolve_path("/usr/bin/ls", Path::new("/home/user"));
        assert_eq!(result, PathBuf::from("/usr/bin/ls"));
    }

    #[test]
    fn resolve_relative_path_joined() {
        let result = resolve_path("src/main.rs", Path::new("/home/user/project"));
        assert_eq!(result, PathBuf::from("/home/user/project/src/main.rs"));
    }

    #[test]
    fn display_path_strips_app_dir() {
        let app = Path::new("/app");
        assert_eq!(display_path(Path::new("/app/src/a.rs"), app), "src/a.rs");
        assert_eq!(display_path(Path::new("/etc/hosts"), app), "/etc/hosts");
    }

    #[test]
    fn native_tool_ids() {
        let ids: Vec<String> = native_tools(Arc::new(RealFs))
            .iter()
            .map(|t| t.id().to_owned())
            .collect();
        assert_eq!(ids, vec!["edit", "multiedit", "apply_patch"]);
    }

    #[tokio::test]
    async fn real_fs_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a/b/c.txt");
        RealFs.write(&path, "hi").await.unwrap();
        assert_eq!(RealFs.read_to_string(&path).await.unwrap(), "hi");
    }

    #[tokio::test]
    async fn missing_file_allowed_reads_empty() {
        let fs = mock::MockFs::default();
        let got = read_existing(&fs, Path::new("/nope"), true).await.unwrap();
        assert!(got.is_empty());
        assert!(read_existing(&fs, Path::new("/nope"), false).await.is_err());
    }
}
