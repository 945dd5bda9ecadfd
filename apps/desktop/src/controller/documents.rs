//! Document editing: the save flow, watching the selected location, and the
//! document list for that location.

use std::path::{Path, PathBuf};

use client_core::{Command, RequestSeq, RequestToken};
use serde::{Deserialize, Serialize};
use serde_json::json;
use shared::{
    domain::{DocRef, LocationId, SaveStatus},
    AppError, BackendEvent,
};

pub const DOC_SAVE: &str = "doc_save";
pub const DOC_LIST: &str = "doc_list";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocListing {
    pub rel_path: PathBuf,
    #[serde(default)]
    pub title: Option<String>,
}

/// The save whose answer is still outstanding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InFlightSave {
    pub doc: DocRef,
    /// Text revision captured in the save payload.
    pub revision: u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentsModel {
    pub location: Option<LocationId>,
    pub doc: Option<DocRef>,
    pub text: String,
    /// Bumped on every edit.
    pub revision: u64,
    pub status: SaveStatus,
    pub in_flight: Option<InFlightSave>,
    pub error: Option<AppError>,
    pub docs: Vec<DocListing>,
    pub list_seq: RequestSeq,
    /// Drafts named so far; the next one is `untitled-<n + 1>.md`.
    pub drafts: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DocumentsMsg {
    LocationSelected(LocationId),
    TextEdited(String),
    SaveRequested,
    SaveFinished(DocRef),
    SaveFailed {
        doc: DocRef,
        error: AppError,
    },
    RefreshDocuments,
    DocumentsLoaded {
        token: RequestToken,
        docs: Vec<DocListing>,
    },
    DocumentsFailed {
        token: RequestToken,
        error: AppError,
    },
    Backend(BackendEvent),
}

impl DocumentsMsg {
    /// Continuations only ever answer saves and list requests.
    pub fn is_follow_up(&self) -> bool {
        matches!(
            self,
            Self::SaveFinished(_)
                | Self::SaveFailed { .. }
                | Self::DocumentsLoaded { .. }
                | Self::DocumentsFailed { .. }
        )
    }
}

pub fn update(model: &DocumentsModel, msg: DocumentsMsg) -> (DocumentsModel, Command<DocumentsMsg>) {
    let mut next = model.clone();
    let cmd = match msg {
        DocumentsMsg::LocationSelected(location) => select_location(&mut next, location),
        DocumentsMsg::TextEdited(text) => {
            next.text = text;
            next.revision += 1;
            if next.status != SaveStatus::Saving {
                next.status = SaveStatus::Dirty;
            }
            Command::none()
        }
        DocumentsMsg::SaveRequested => request_save(&mut next),
        DocumentsMsg::SaveFinished(doc) => {
            let Some(saved) = take_in_flight(&mut next, &doc) else {
                return (next, Command::none());
            };
            if next.doc.as_ref() != Some(&doc) {
                return (next, Command::none());
            }
            next.status = if saved.revision == next.revision {
                SaveStatus::Saved
            } else {
                SaveStatus::Dirty
            };
            next.error = None;
            match next.location {
                Some(location) if !next.docs.iter().any(|d| d.rel_path == doc.rel_path) => {
                    list_documents(&mut next, location)
                }
                _ => Command::none(),
            }
        }
        DocumentsMsg::SaveFailed { doc, error } => {
            if take_in_flight(&mut next, &doc).is_some() && next.doc.as_ref() == Some(&doc) {
                next.status = SaveStatus::Error;
                next.error = Some(error);
            }
            Command::none()
        }
        DocumentsMsg::RefreshDocuments => match next.location {
            Some(location) => list_documents(&mut next, location),
            None => Command::none(),
        },
        DocumentsMsg::DocumentsLoaded { token, docs } => {
            if next.list_seq.is_current(token) {
                next.docs = docs;
            }
            Command::none()
        }
        DocumentsMsg::DocumentsFailed { token, error } => {
            if next.list_seq.is_current(token) {
                next.error = Some(error);
            }
            Command::none()
        }
        DocumentsMsg::Backend(event) => on_backend_event(&mut next, event),
    };
    (next, cmd)
}

fn select_location(model: &mut DocumentsModel, location: LocationId) -> Command<DocumentsMsg> {
    let previous = model.location.replace(location);
    if previous == Some(location) {
        return Command::none();
    }

    // A save still in flight belongs to the old document; its answer is
    // matched against `in_flight` and no longer drives `status`.
    model.doc = None;
    model.status = SaveStatus::Idle;
    model.docs.clear();
    model.error = None;

    let mut effects = Vec::with_capacity(3);
    if let Some(previous) = previous {
        effects.push(Command::stop_watch(previous));
    }
    effects.push(Command::start_watch(location));
    effects.push(list_documents(model, location));
    Command::batch(effects)
}

fn request_save(model: &mut DocumentsModel) -> Command<DocumentsMsg> {
    if model.status == SaveStatus::Saving {
        return Command::none();
    }

    let doc = match (&model.doc, model.location) {
        (Some(doc), _) => doc.clone(),
        (None, Some(location)) => {
            let name = format!("untitled-{}.md", model.drafts + 1);
            match DocRef::new(location, &name) {
                Ok(doc) => {
                    model.drafts += 1;
                    model.doc = Some(doc.clone());
                    doc
                }
                Err(err) => {
                    model.status = SaveStatus::Error;
                    model.error = Some(err.into());
                    return Command::none();
                }
            }
        }
        (None, None) => {
            model.status = SaveStatus::Error;
            model.error = Some(AppError::invalid_path("select a location before saving"));
            return Command::none();
        }
    };

    model.status = SaveStatus::Saving;
    model.error = None;
    model.in_flight = Some(InFlightSave {
        doc: doc.clone(),
        revision: model.revision,
    });
    let saved = doc.clone();
    let failed = doc.clone();
    Command::invoke(
        DOC_SAVE,
        &json!({ "doc_ref": doc, "text": model.text }),
        move |_| Some(DocumentsMsg::SaveFinished(saved)),
        move |error| Some(DocumentsMsg::SaveFailed { doc: failed, error }),
    )
}

/// Clears and returns the in-flight save when `doc` is the one it was for.
fn take_in_flight(model: &mut DocumentsModel, doc: &DocRef) -> Option<InFlightSave> {
    if model.in_flight.as_ref().is_some_and(|save| &save.doc == doc) {
        model.in_flight.take()
    } else {
        None
    }
}

fn list_documents(model: &mut DocumentsModel, location: LocationId) -> Command<DocumentsMsg> {
    let token = model.list_seq.issue();
    Command::invoke_typed(
        DOC_LIST,
        &json!({ "location_id": location }),
        move |docs: Vec<DocListing>| Some(DocumentsMsg::DocumentsLoaded { token, docs }),
        move |error| Some(DocumentsMsg::DocumentsFailed { token, error }),
    )
}

fn on_backend_event(model: &mut DocumentsModel, event: BackendEvent) -> Command<DocumentsMsg> {
    let Some(location) = model.location else {
        return Command::none();
    };

    match event {
        BackendEvent::FilesystemChanged { location_id, .. } if location_id == location => {
            list_documents(model, location)
        }
        BackendEvent::LocationMissing { location_id, path } if location_id == location => {
            model.error = Some(
                AppError::not_found("location is no longer available")
                    .with_context(path.display().to_string()),
            );
            Command::none()
        }
        BackendEvent::ConflictDetected {
            location_id,
            rel_path,
            conflict_filename,
        } if is_current_doc(model, location_id, &rel_path) => {
            model.error = Some(
                AppError::conflict("document changed on disk while editing")
                    .with_context(conflict_filename),
            );
            Command::none()
        }
        BackendEvent::SaveStatusChanged { doc_id, status }
            if is_current_doc(model, doc_id.location_id, &doc_id.rel_path) =>
        {
            model.status = status;
            Command::none()
        }
        _ => Command::none(),
    }
}

fn is_current_doc(model: &DocumentsModel, location_id: LocationId, rel_path: &Path) -> bool {
    model
        .doc
        .as_ref()
        .is_some_and(|doc| doc.location_id == location_id && doc.rel_path == rel_path)
}
