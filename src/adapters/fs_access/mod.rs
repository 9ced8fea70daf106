// Filesystem access gate - read/write permission checks for job resources

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::domain::model::*;
use crate::ports::*;
use crate::utils::path::PathUtils;

/// Grants access based on filesystem permissions and an optional allow-list
#[derive(Debug, Clone, Default)]
pub struct FsAccessAdapter {
    allowed_roots: Vec<PathBuf>,
}

impl FsAccessAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict both reads and writes to paths under `roots`
    pub fn with_allowed_roots<I, P>(mut self, roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        self.allowed_roots = roots
            .into_iter()
            .map(|root| {
                let root = root.as_ref();
                root.canonicalize()
                    .unwrap_or_else(|_| PathUtils::normalize_lexically(root))
            })
            .collect();
        self
    }

    fn within_roots(&self, path: &Path) -> bool {
        self.allowed_roots.is_empty() || self.allowed_roots.iter().any(|root| path.starts_with(root))
    }

    /// A source that does not exist is not an access problem; opening it
    /// fails later as an unreadable source.
    fn can_read(path: &Path) -> bool {
        match fs::File::open(path) {
            Ok(_) => true,
            Err(e) => e.kind() != ErrorKind::PermissionDenied,
        }
    }

    fn can_write(path: &Path) -> bool {
        if let Ok(metadata) = fs::metadata(path) {
            if metadata.is_dir() || metadata.permissions().readonly() {
                return false;
            }
        }
        let parent = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(parent) => parent,
            None => Path::new("."),
        };
        match fs::metadata(parent) {
            Ok(metadata) => metadata.is_dir() && !metadata.permissions().readonly(),
            Err(_) => false,
        }
    }
}

impl AccessPort for FsAccessAdapter {
    fn has_access(&self, resource: &Resource) -> bool {
        let granted = match resource {
            Resource::Read(path) => self.within_roots(path) && Self::can_read(path),
            Resource::Write(path) => self.within_roots(path) && Self::can_write(path),
        };
        debug!(?resource, granted, "Access check");
        granted
    }
}
