//! Mapping of request paths onto files below the document root.

use std::fs::Metadata;
use std::io;
use std::path::{Path, PathBuf};

use crate::server::error::Error;

/// Why a request path did not resolve to a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveError {
    /// The path tries to climb out of the document root.
    Forbidden,
    /// No regular file exists at the path.
    NotFound,
}

impl ResolveError {
    /// Convert into the server error reported for `request_path`.
    pub fn into_error(self, request_path: &str) -> Error {
        match self {
            ResolveError::Forbidden => Error::Forbidden(request_path.to_string()),
            ResolveError::NotFound => Error::NotFound(request_path.to_string()),
        }
    }
}

/// A regular file found below the document root.
#[derive(Debug, Clone)]
pub struct ResolvedFile {
    pub path: PathBuf,
    /// Metadata read while resolving; reused for the response headers
    pub metadata: Metadata,
}

/// Resolve `request_path` to a regular file below `root`.
///
/// Any query string or fragment is ignored. `/` and every path ending in `/`
/// map to the `index.html` of that directory. Paths containing `..` anywhere
/// are refused outright; this is a substring check rather than a
/// normalisation, so a file literally named `a..b` can never be served.
pub async fn resolve(request_path: &str, root: &Path) -> Result<ResolvedFile, ResolveError> {
    let relative = normalize_request_path(request_path)?;
    let path = join_root(root, &relative);

    match tokio::fs::metadata(&path).await {
        Ok(metadata) if metadata.is_file() => Ok(ResolvedFile { path, metadata }),
        Ok(_) => Err(ResolveError::NotFound),
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => Err(ResolveError::Forbidden),
        Err(_) => Err(ResolveError::NotFound),
    }
}

/// Apply the path rewriting rules without touching the filesystem.
///
/// Returns the rewritten path, still starting with `/`.
pub fn normalize_request_path(request_path: &str) -> Result<String, ResolveError> {
    let path = request_path
        .split(['?', '#'])
        .next()
        .unwrap_or_default();

    if !path.starts_with('/') {
        return Err(ResolveError::NotFound);
    }

    let mut path = path.to_string();
    if path.ends_with('/') {
        path.push_str("index.html");
    }

    if path.contains("..") {
        return Err(ResolveError::Forbidden);
    }

    Ok(path)
}

fn join_root(root: &Path, relative: &str) -> PathBuf {
    // Joining an absolute path would replace the root, so join the components
    let mut full_path = root.to_path_buf();
    for segment in relative.split('/').filter(|s| !s.is_empty()) {
        full_path.push(segment);
    }
    full_path
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn resolve_path(request_path: &str, root: &Path) -> Result<PathBuf, ResolveError> {
        resolve(request_path, root).await.map(|file| file.path)
    }

    fn document_root() -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "hi").unwrap();
        std::fs::create_dir(dir.path().join("docs")).unwrap();
        std::fs::write(dir.path().join("docs").join("index.html"), "docs").unwrap();
        std::fs::write(dir.path().join("docs").join("guide.txt"), "guide").unwrap();
        std::fs::create_dir(dir.path().join("empty")).unwrap();
        dir
    }

    #[tokio::test]
    async fn test_root_maps_to_index() {
        let root = document_root();
        let resolved = resolve_path("/", root.path()).await.unwrap();
        assert_eq!(resolved, root.path().join("index.html"));
    }

    #[tokio::test]
    async fn test_root_and_index_resolve_identically() {
        let root = document_root();
        let a = resolve_path("/", root.path()).await.unwrap();
        let b = resolve_path("/index.html", root.path()).await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_trailing_slash_appends_index() {
        let root = document_root();
        let resolved = resolve_path("/docs/", root.path()).await.unwrap();
        assert_eq!(resolved, root.path().join("docs").join("index.html"));
    }

    #[tokio::test]
    async fn test_nested_file() {
        let root = document_root();
        let resolved = resolve_path("/docs/guide.txt", root.path()).await.unwrap();
        assert_eq!(std::fs::read_to_string(resolved).unwrap(), "guide");
    }

    #[tokio::test]
    async fn test_directory_is_not_found() {
        let root = document_root();
        assert_eq!(resolve_path("/docs", root.path()).await, Err(ResolveError::NotFound));
        assert_eq!(resolve_path("/empty/", root.path()).await, Err(ResolveError::NotFound));
    }

    #[tokio::test]
    async fn test_missing_file_is_not_found() {
        let root = document_root();
        assert_eq!(resolve_path("/missing.html", root.path()).await, Err(ResolveError::NotFound));
    }

    #[tokio::test]
    async fn test_relative_path_is_not_found() {
        let root = document_root();
        assert_eq!(resolve_path("index.html", root.path()).await, Err(ResolveError::NotFound));
        assert_eq!(resolve_path("", root.path()).await, Err(ResolveError::NotFound));
    }

    #[tokio::test]
    async fn test_parent_segments_are_forbidden() {
        let root = document_root();
        for path in ["/../outside.txt", "/docs/../../outside.txt", "/..", "/a/..", "/..%2f", "/x..y"] {
            assert_eq!(resolve_path(path, root.path()).await, Err(ResolveError::Forbidden), "{path}");
        }
    }

    #[tokio::test]
    async fn test_query_and_fragment_are_ignored() {
        let root = document_root();
        let resolved = resolve_path("/index.html?v=2#top", root.path()).await.unwrap();
        assert_eq!(resolved, root.path().join("index.html"));
        let resolved = resolve_path("/?lang=en", root.path()).await.unwrap();
        assert_eq!(resolved, root.path().join("index.html"));
    }

    #[test]
    fn test_normalize_request_path() {
        assert_eq!(normalize_request_path("/").unwrap(), "/index.html");
        assert_eq!(normalize_request_path("/a/b/").unwrap(), "/a/b/index.html");
        assert_eq!(normalize_request_path("/a.css").unwrap(), "/a.css");
        assert_eq!(normalize_request_path("/../"), Err(ResolveError::Forbidden));
        assert_eq!(normalize_request_path("a.css"), Err(ResolveError::NotFound));
    }

    #[test]
    fn test_into_error() {
        let error = ResolveError::Forbidden.into_error("/../x");
        assert!(matches!(error, Error::Forbidden(ref p) if p == "/../x"));
        let error = ResolveError::NotFound.into_error("/y");
        assert!(matches!(error, Error::NotFound(ref p) if p == "/y"));
    }

    #[tokio::test]
    async fn test_metadata_describes_resolved_file() {
        let root = document_root();
        let file = resolve("/docs/guide.txt", root.path()).await.unwrap();
        assert!(file.metadata.is_file());
        assert_eq!(file.metadata.len(), 5);
    }
}
