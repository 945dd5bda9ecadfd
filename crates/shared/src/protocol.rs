use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    domain::{DocId, FsChangeKind, FsEntryKind, LocationId, SaveStatus},
    error::AppError,
};

/// Channel the backend pushes [`BackendEvent`]s on.
pub const BACKEND_EVENT_CHANNEL: &str = "backend-event";

/// Alternate response envelope: `{"Ok": value}` or `{"Err": error}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CommandResult<T> {
    Ok(T),
    Err(AppError),
}

impl<T> CommandResult<T> {
    pub fn ok(value: T) -> Self {
        Self::Ok(value)
    }

    pub fn err(error: AppError) -> Self {
        Self::Err(error)
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }

    pub fn is_err(&self) -> bool {
        matches!(self, Self::Err(_))
    }

    pub fn into_result(self) -> Result<T, AppError> {
        match self {
            Self::Ok(value) => Ok(value),
            Self::Err(error) => Err(error),
        }
    }
}

impl<T> From<Result<T, AppError>> for CommandResult<T> {
    fn from(value: Result<T, AppError>) -> Self {
        match value {
            Ok(value) => Self::Ok(value),
            Err(error) => Self::Err(error),
        }
    }
}

/// Unsolicited notifications pushed by the backend process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BackendEvent {
    #[serde(alias = "location_missing")]
    LocationMissing {
        location_id: LocationId,
        path: PathBuf,
    },
    #[serde(alias = "location_changed")]
    LocationChanged {
        location_id: LocationId,
        old_path: PathBuf,
        new_path: PathBuf,
    },
    #[serde(alias = "reconciliation_complete")]
    ReconciliationComplete {
        checked: usize,
        missing: Vec<LocationId>,
    },
    #[serde(alias = "conflict_detected")]
    ConflictDetected {
        location_id: LocationId,
        rel_path: PathBuf,
        conflict_filename: String,
    },
    #[serde(alias = "doc_modified_externally")]
    DocModifiedExternally {
        doc_id: DocId,
        new_mtime: DateTime<Utc>,
    },
    #[serde(alias = "filesystem_changed")]
    FilesystemChanged {
        location_id: LocationId,
        entry_kind: FsEntryKind,
        change_kind: FsChangeKind,
        rel_path: PathBuf,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        old_rel_path: Option<PathBuf>,
    },
    #[serde(alias = "save_status_changed")]
    SaveStatusChanged { doc_id: DocId, status: SaveStatus },
}

impl BackendEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            BackendEvent::LocationMissing { .. } => "LocationMissing",
            BackendEvent::LocationChanged { .. } => "LocationChanged",
            BackendEvent::ReconciliationComplete { .. } => "ReconciliationComplete",
            BackendEvent::ConflictDetected { .. } => "ConflictDetected",
            BackendEvent::DocModifiedExternally { .. } => "DocModifiedExternally",
            BackendEvent::FilesystemChanged { .. } => "FilesystemChanged",
            BackendEvent::SaveStatusChanged { .. } => "SaveStatusChanged",
        }
    }
}
