use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::PathError;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub i64);

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl From<$name> for i64 {
            fn from(value: $name) -> Self {
                value.0
            }
        }
    };
}

id_newtype!(LocationId);

/// Reference to a document inside a location. Operations never take raw paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocRef {
    pub location_id: LocationId,
    pub rel_path: PathBuf,
}

impl DocRef {
    pub fn new(location_id: LocationId, rel_path: impl AsRef<Path>) -> Result<Self, PathError> {
        let rel_path = normalize_relative_path(rel_path.as_ref())?;
        Ok(Self {
            location_id,
            rel_path,
        })
    }

    pub fn resolve(&self, location_root: &Path) -> PathBuf {
        location_root.join(&self.rel_path)
    }
}

/// Stable identity of a document; same shape as [`DocRef`] but hashable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocId {
    pub location_id: LocationId,
    pub rel_path: PathBuf,
}

impl DocId {
    pub fn new(location_id: LocationId, rel_path: impl AsRef<Path>) -> Result<Self, PathError> {
        let rel_path = normalize_relative_path(rel_path.as_ref())?;
        Ok(Self {
            location_id,
            rel_path,
        })
    }

    pub fn to_doc_ref(&self) -> DocRef {
        DocRef {
            location_id: self.location_id,
            rel_path: self.rel_path.clone(),
        }
    }
}

impl From<DocRef> for DocId {
    fn from(value: DocRef) -> Self {
        Self {
            location_id: value.location_id,
            rel_path: value.rel_path,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SaveStatus {
    #[default]
    Idle,
    Dirty,
    Saving,
    Saved,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FsEntryKind {
    File,
    Directory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FsChangeKind {
    Created,
    Modified,
    Deleted,
    Renamed,
}

/// Normalizes a location-relative path, rejecting anything that would leave the root.
pub fn normalize_relative_path(path: &Path) -> Result<PathBuf, PathError> {
    if path.as_os_str().is_empty() {
        return Err(PathError::EmptyPath);
    }

    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(name) => normalized.push(name),
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    return Err(PathError::PathTraversalAttempt);
                }
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(PathError::InvalidPath(
                    "absolute paths are not allowed as relative paths".to_string(),
                ));
            }
        }
    }

    if normalized.as_os_str().is_empty() {
        return Err(PathError::EmptyPath);
    }

    Ok(normalized)
}
