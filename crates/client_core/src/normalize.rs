//! Collapses every wire envelope the backend may answer with into one
//! `Result<Value, AppError>`, and every push payload into one [`BackendEvent`].

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use shared::{AppError, BackendEvent, ErrorCode};
use thiserror::Error;
use tracing::debug;

/// Spellings are compared after lowercasing and dropping `_`, `-` and spaces.
const ERROR_CODE_TABLE: &[(&str, ErrorCode)] = &[
    ("notfound", ErrorCode::NotFound),
    ("permissiondenied", ErrorCode::PermissionDenied),
    ("invalidpath", ErrorCode::InvalidPath),
    ("ioerror", ErrorCode::IoError),
    ("io", ErrorCode::IoError),
    ("parseerror", ErrorCode::ParseError),
    ("parse", ErrorCode::ParseError),
    ("indexerror", ErrorCode::IndexError),
    ("index", ErrorCode::IndexError),
    ("conflict", ErrorCode::Conflict),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EnvelopeTag {
    Ok,
    Err,
}

/// Accepts `{kind|type: "ok"|"err", value|error}`, `{Ok: v}`/`{Err: e}`, or a
/// bare value (implicit success).
pub fn normalize(raw: Value, operation: &str) -> Result<Value, AppError> {
    let Value::Object(mut map) = raw else {
        return Ok(raw);
    };

    if let Some(tag) = envelope_tag(&map) {
        return match tag {
            EnvelopeTag::Ok => Ok(map.remove("value").unwrap_or(Value::Null)),
            EnvelopeTag::Err => Err(normalize_error(
                map.remove("error").unwrap_or(Value::Null),
                operation,
            )),
        };
    }

    if map.len() == 1 {
        if let Some(value) = map.remove("Ok") {
            return Ok(value);
        }
        if let Some(error) = map.remove("Err") {
            return Err(normalize_error(error, operation));
        }
    }

    Ok(Value::Object(map))
}

fn envelope_tag(map: &Map<String, Value>) -> Option<EnvelopeTag> {
    ["kind", "type"]
        .into_iter()
        .filter_map(|key| map.get(key).and_then(Value::as_str))
        .find_map(|tag| {
            if tag.eq_ignore_ascii_case("ok") {
                Some(EnvelopeTag::Ok)
            } else if tag.eq_ignore_ascii_case("err") {
                Some(EnvelopeTag::Err)
            } else {
                None
            }
        })
}

pub fn normalize_error(raw: Value, operation: &str) -> AppError {
    let fallback_message = || format!("{operation} failed");
    match raw {
        Value::Object(map) => {
            let code = normalize_error_code(map.get("code").unwrap_or(&Value::Null));
            let message = map
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_owned)
                .unwrap_or_else(fallback_message);
            let error = AppError::new(code, message);
            match map.get("context").and_then(Value::as_str) {
                Some(context) => error.with_context(context),
                None => error,
            }
        }
        Value::String(message) => AppError::io(message),
        Value::Null => AppError::io(fallback_message()),
        other => {
            debug!(operation, error = %other, "non-object error payload");
            AppError::io(other.to_string())
        }
    }
}

/// Maps any spelling of a taxonomy member onto [`ErrorCode`]; everything else
/// (unknown strings, numbers, `null`) becomes `IO_ERROR`.
pub fn normalize_error_code(code: &Value) -> ErrorCode {
    let Some(raw) = code.as_str() else {
        return ErrorCode::IoError;
    };
    let key: String = raw
        .chars()
        .filter(|c| !matches!(c, '_' | '-') && !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect();
    ERROR_CODE_TABLE
        .iter()
        .find(|(alias, _)| *alias == key)
        .map(|(_, code)| *code)
        .unwrap_or(ErrorCode::IoError)
}

pub fn decode<T: DeserializeOwned>(value: Value, operation: &str) -> Result<T, AppError> {
    serde_json::from_value(value).map_err(|err| {
        AppError::parse(format!("unexpected response shape: {err}"))
            .with_context(format!("Command: {operation}"))
    })
}

#[derive(Debug, Error)]
pub enum EventShapeError {
    #[error("event payload is not an object")]
    NotAnObject,
    #[error("event payload carries no variant tag")]
    MissingTag,
    #[error("malformed `{tag}` event: {source}")]
    Malformed {
        tag: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Accepts `{type: "Variant", ...fields}` or `{"Variant": {...fields}}`.
pub fn normalize_event(raw: Value) -> Result<BackendEvent, EventShapeError> {
    let Value::Object(mut map) = raw else {
        return Err(EventShapeError::NotAnObject);
    };

    let wrapped = match map.remove("type") {
        Some(Value::String(tag)) => {
            let mut wrapper = Map::with_capacity(1);
            wrapper.insert(tag, Value::Object(map));
            wrapper
        }
        Some(_) => return Err(EventShapeError::MissingTag),
        None if map.len() == 1 => map,
        None => return Err(EventShapeError::MissingTag),
    };

    let tag = wrapped.keys().next().cloned().unwrap_or_default();
    serde_json::from_value(Value::Object(wrapped))
        .map_err(|source| EventShapeError::Malformed { tag, source })
}

#[cfg(test)]
#[path = "tests/normalize_tests.rs"]
mod tests;
