//! Location reference handling: `file://` URIs and path resolution

use std::io;
use std::path::{Component, Path, PathBuf};

/// Path utilities for location references
pub struct PathUtils;

impl PathUtils {
    /// Turn a location reference into a filesystem path.
    ///
    /// Accepts plain paths and `file://` URIs (percent-escapes decoded).
    pub fn location_to_path(location: &str) -> PathBuf {
        let trimmed = location.trim();
        match trimmed.strip_prefix("file://") {
            Some(rest) => {
                // file://localhost/tmp/a.mp4 and file:///tmp/a.mp4 name the same file
                let rest = rest.strip_prefix("localhost").unwrap_or(rest);
                PathBuf::from(Self::percent_decode(rest))
            }
            None => PathBuf::from(trimmed),
        }
    }

    /// Resolve a location to an absolute path.
    ///
    /// Existing files are canonicalized. For files that do not exist yet the
    /// parent directory is canonicalized when possible, otherwise the path is
    /// normalized lexically.
    pub fn resolve(location: &str) -> io::Result<PathBuf> {
        let path = Self::location_to_path(location);
        let absolute = if path.is_absolute() {
            path
        } else {
            std::env::current_dir()?.join(path)
        };
        let normalized = Self::normalize_lexically(&absolute);

        if let Ok(canonical) = normalized.canonicalize() {
            return Ok(canonical);
        }

        match (normalized.parent(), normalized.file_name()) {
            (Some(parent), Some(name)) => match parent.canonicalize() {
                Ok(parent) => Ok(parent.join(name)),
                Err(_) => Ok(normalized),
            },
            _ => Ok(normalized),
        }
    }

    /// Remove `.` and `..` components without touching the filesystem
    pub fn normalize_lexically(path: &Path) -> PathBuf {
        let mut out = PathBuf::new();
        for component in path.components() {
            match component {
                Component::CurDir => {}
                Component::ParentDir => {
                    if !out.pop() {
                        out.push(component.as_os_str());
                    }
                }
                other => out.push(other.as_os_str()),
            }
        }
        out
    }

    fn percent_decode(input: &str) -> String {
        let bytes = input.as_bytes();
        let mut decoded = Vec::with_capacity(bytes.len());
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] == b'%' && i + 2 < bytes.len() {
                let value = std::str::from_utf8(&bytes[i + 1..i + 3])
                    .ok()
                    .and_then(|hex| u8::from_str_radix(hex, 16).ok());
                if let Some(value) = value {
                    decoded.push(value);
                    i += 3;
                    continue;
                }
            }
            decoded.push(bytes[i]);
            i += 1;
        }
        String::from_utf8_lossy(&decoded).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_path_passes_through() {
        assert_eq!(
            PathUtils::location_to_path("videos/a.mp4"),
            PathBuf::from("videos/a.mp4")
        );
    }

    #[test]
    fn test_file_uri_is_decoded() {
        assert_eq!(
            PathUtils::location_to_path("file:///tmp/my%20clip.mp4"),
            PathBuf::from("/tmp/my clip.mp4")
        );
        assert_eq!(
            PathUtils::location_to_path("file://localhost/tmp/a.mp4"),
            PathBuf::from("/tmp/a.mp4")
        );
    }

    #[test]
    fn test_truncated_escape_is_kept_verbatim() {
        assert_eq!(
            PathUtils::location_to_path("file:///tmp/a%2"),
            PathBuf::from("/tmp/a%2")
        );
    }

    #[test]
    fn test_normalize_lexically() {
        assert_eq!(
            PathUtils::normalize_lexically(Path::new("/a/./b/../c.mp4")),
            PathBuf::from("/a/c.mp4")
        );
    }

    #[test]
    fn test_resolve_makes_relative_paths_absolute() {
        let resolved = PathUtils::resolve("some-dir/../clip.mp4").unwrap();
        assert!(resolved.is_absolute());
        assert!(resolved.ends_with("clip.mp4"));
    }

    #[test]
    fn test_resolve_equates_aliases_of_existing_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("a.mp4");
        std::fs::write(&file, b"data").unwrap();

        let direct = PathUtils::resolve(file.to_str().unwrap()).unwrap();
        let dotted = dir.path().join("sub").join("..").join("a.mp4");
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let aliased = PathUtils::resolve(dotted.to_str().unwrap()).unwrap();

        assert_eq!(direct, aliased);
    }
}
