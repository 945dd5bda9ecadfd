use serde_json::json;
use shared::{domain::LocationId, ErrorCode};

use super::*;

#[test]
fn success_is_shape_transparent() {
    let value = json!({ "title": "Draft", "words": 120 });
    let canonical = normalize(json!({ "kind": "ok", "value": value.clone() }), "doc_open");
    let typed = normalize(json!({ "type": "ok", "value": value.clone() }), "doc_open");
    let alternate = normalize(json!({ "Ok": value.clone() }), "doc_open");
    let raw = normalize(value.clone(), "doc_open");

    assert_eq!(canonical, Ok(value.clone()));
    assert_eq!(typed, canonical);
    assert_eq!(alternate, canonical);
    assert_eq!(raw, canonical);
}

#[test]
fn failure_is_shape_transparent() {
    let error = json!({ "code": "NOT_FOUND", "message": "missing", "context": "doc 4" });
    let canonical = normalize(json!({ "kind": "err", "error": error.clone() }), "doc_open");
    let alternate = normalize(json!({ "Err": error }), "doc_open");

    let expected = AppError::not_found("missing").with_context("doc 4");
    assert_eq!(canonical, Err(expected));
    assert_eq!(alternate, canonical);
}

#[test]
fn alternate_envelope_uses_foreign_code_spelling() {
    let result = normalize(
        json!({ "Err": { "code": "PermissionDenied", "message": "read only" } }),
        "doc_save",
    );
    assert_eq!(result.expect_err("err").code, ErrorCode::PermissionDenied);
}

#[test]
fn scalar_and_array_values_are_implicit_success() {
    assert_eq!(normalize(json!(true), "doc_exists"), Ok(json!(true)));
    assert_eq!(normalize(json!([1, 2]), "doc_list"), Ok(json!([1, 2])));
    assert_eq!(normalize(Value::Null, "watch_enable"), Ok(Value::Null));
}

#[test]
fn objects_with_unrelated_type_field_pass_through() {
    let entry = json!({ "type": "file", "name": "a.md" });
    assert_eq!(normalize(entry.clone(), "doc_list"), Ok(entry));

    let two_keys = json!({ "Ok": 1, "extra": 2 });
    assert_eq!(normalize(two_keys.clone(), "doc_list"), Ok(two_keys));
}

#[test]
fn type_key_is_consulted_when_kind_is_not_a_tag() {
    let raw = json!({ "kind": "document", "type": "ok", "value": { "id": 4 } });
    assert_eq!(normalize(raw, "doc_open"), Ok(json!({ "id": 4 })));

    let raw = json!({ "kind": "document", "type": "err", "error": { "code": "NOT_FOUND" } });
    assert_eq!(
        normalize(raw, "doc_open").map_err(|e| e.code),
        Err(ErrorCode::NotFound)
    );
}

#[test]
fn ok_envelope_without_value_is_null() {
    assert_eq!(normalize(json!({ "kind": "OK" }), "doc_save"), Ok(Value::Null));
}

#[test]
fn every_spelling_maps_into_the_closed_set() {
    let cases = [
        ("NOT_FOUND", ErrorCode::NotFound),
        ("not_found", ErrorCode::NotFound),
        ("NotFound", ErrorCode::NotFound),
        ("notFound", ErrorCode::NotFound),
        ("PERMISSION_DENIED", ErrorCode::PermissionDenied),
        ("permission-denied", ErrorCode::PermissionDenied),
        ("InvalidPath", ErrorCode::InvalidPath),
        ("IO_ERROR", ErrorCode::IoError),
        ("Io", ErrorCode::IoError),
        ("io", ErrorCode::IoError),
        ("PARSE_ERROR", ErrorCode::ParseError),
        ("Parse", ErrorCode::ParseError),
        ("INDEX_ERROR", ErrorCode::IndexError),
        ("Index", ErrorCode::IndexError),
        ("CONFLICT", ErrorCode::Conflict),
        ("Conflict", ErrorCode::Conflict),
    ];
    for (spelling, expected) in cases {
        assert_eq!(
            normalize_error_code(&json!(spelling)),
            expected,
            "spelling {spelling}"
        );
    }
}

#[test]
fn unknown_and_non_string_codes_default_to_io_error() {
    for code in [
        json!("TEAPOT"),
        json!(""),
        json!(404),
        json!(null),
        json!({ "nested": "NOT_FOUND" }),
        json!(["NOT_FOUND"]),
    ] {
        assert_eq!(normalize_error_code(&code), ErrorCode::IoError, "code {code}");
    }
}

#[test]
fn error_payload_variants_are_normalized() {
    let bare = normalize_error(json!("disk unplugged"), "doc_save");
    assert_eq!(bare, AppError::io("disk unplugged"));

    let missing = normalize_error(Value::Null, "doc_save");
    assert_eq!(missing.message, "doc_save failed");

    let no_message = normalize_error(json!({ "code": "CONFLICT" }), "doc_save");
    assert_eq!(no_message, AppError::conflict("doc_save failed"));

    let numeric = normalize_error(json!(17), "doc_save");
    assert_eq!(numeric, AppError::io("17"));
}

#[test]
fn decode_failure_is_parse_error_with_operation_context() {
    let err = decode::<Vec<String>>(json!({ "not": "a list" }), "doc_list").expect_err("err");
    assert_eq!(err.code, ErrorCode::ParseError);
    assert_eq!(err.context.as_deref(), Some("Command: doc_list"));
}

#[test]
fn tagged_and_wrapped_events_normalize_identically() {
    let tagged = normalize_event(json!({
        "type": "LocationMissing",
        "location_id": 3,
        "path": "/notes"
    }))
    .expect("tagged");
    let wrapped = normalize_event(json!({
        "LocationMissing": { "location_id": 3, "path": "/notes" }
    }))
    .expect("wrapped");

    assert_eq!(tagged, wrapped);
    assert_eq!(
        tagged,
        BackendEvent::LocationMissing {
            location_id: LocationId(3),
            path: "/notes".into(),
        }
    );
}

#[test]
fn reconciliation_event_with_snake_case_tag_is_accepted() {
    let event = normalize_event(json!({
        "type": "reconciliation_complete",
        "checked": 4,
        "missing": [2]
    }))
    .expect("event");
    assert_eq!(
        event,
        BackendEvent::ReconciliationComplete {
            checked: 4,
            missing: vec![LocationId(2)],
        }
    );
}

#[test]
fn malformed_events_are_rejected_without_panicking() {
    assert!(matches!(
        normalize_event(json!("LocationMissing")),
        Err(EventShapeError::NotAnObject)
    ));
    assert!(matches!(
        normalize_event(json!({ "a": 1, "b": 2 })),
        Err(EventShapeError::MissingTag)
    ));
    assert!(matches!(
        normalize_event(json!({ "type": 7, "checked": 1 })),
        Err(EventShapeError::MissingTag)
    ));
    assert!(matches!(
        normalize_event(json!({ "type": "SomethingNew", "x": 1 })),
        Err(EventShapeError::Malformed { .. })
    ));
    assert!(matches!(
        normalize_event(json!({ "LocationMissing": { "location_id": "three" } })),
        Err(EventShapeError::Malformed { .. })
    ));
}
