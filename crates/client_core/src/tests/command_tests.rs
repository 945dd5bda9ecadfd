use std::collections::HashMap;

use serde_json::json;
use shared::ErrorCode;

use super::*;

#[test]
fn count_walks_nested_batches() {
    let cmd: Command<()> = Command::batch([
        Command::start_watch(1),
        Command::none(),
        Command::batch([
            Command::fire_and_forget("doc_list", &json!({})),
            Command::stop_watch(2),
        ]),
    ]);
    assert_eq!(cmd.type_name(), "Batch");
    assert_eq!(cmd.count(), 3);
}

#[test]
fn unserializable_payload_is_captured_not_panicked() {
    let mut payload = HashMap::new();
    payload.insert((1, 2), "tuple keys cannot become JSON object keys");
    let cmd: Command<()> = Command::fire_and_forget("doc_save", &payload);

    let Command::Invoke(invoke) = cmd else {
        panic!("expected invoke");
    };
    assert!(invoke.payload().is_none());
    let error = invoke.payload.expect_err("serialization error");
    assert_eq!(error.code, ErrorCode::ParseError);
    assert_eq!(error.context.as_deref(), Some("Command: doc_save"));
}

#[test]
fn invoke_typed_routes_decode_failure_to_on_failure() {
    let cmd: Command<Result<u32, ErrorCode>> = Command::invoke_typed::<u32, _, _, _>(
        "doc_count",
        &json!({}),
        |count| Some(Ok(count)),
        |error| Some(Err(error.code)),
    );
    let Command::Invoke(invoke) = cmd else {
        panic!("expected invoke");
    };

    assert_eq!(
        (invoke.on_success)(json!("not a number")),
        Some(Err(ErrorCode::ParseError))
    );
}

#[test]
fn invoke_typed_decodes_success_value() {
    let cmd: Command<Result<u32, ErrorCode>> = Command::invoke_typed::<u32, _, _, _>(
        "doc_count",
        &json!({}),
        |count| Some(Ok(count)),
        |error| Some(Err(error.code)),
    );
    let Command::Invoke(invoke) = cmd else {
        panic!("expected invoke");
    };
    assert_eq!((invoke.on_success)(json!(12)), Some(Ok(12)));
}

#[test]
fn map_lifts_continuations_into_parent_messages() {
    #[derive(Debug, PartialEq)]
    enum Parent {
        Child(u64),
        Failed(ErrorCode),
    }

    let child: Command<u64> = Command::batch([
        Command::invoke(
            "doc_size",
            &json!({}),
            |value| value.as_u64(),
            |_| Some(0),
        ),
        Command::start_watch(9),
    ]);
    let parent: Command<Parent> = child.map(Parent::Child);

    let Command::Batch(mut items) = parent else {
        panic!("expected batch");
    };
    assert!(matches!(items[1], Command::StartWatch { subject_id: 9 }));
    let Command::Invoke(invoke) = items.remove(0) else {
        panic!("expected invoke");
    };
    assert_eq!((invoke.on_success)(json!(41)), Some(Parent::Child(41)));

    let failing: Command<Parent> =
        Command::<ErrorCode>::invoke("doc_size", &json!({}), |_| None, |e| Some(e.code))
            .map(Parent::Failed);
    let Command::Invoke(invoke) = failing else {
        panic!("expected invoke");
    };
    assert_eq!(
        (invoke.on_failure)(shared::AppError::conflict("stale")),
        Some(Parent::Failed(ErrorCode::Conflict))
    );
}

#[test]
fn debug_output_hides_continuations() {
    let cmd: Command<()> = Command::fire_and_forget("doc_open", &json!({ "id": 1 }));
    let rendered = format!("{cmd:?}");
    assert!(rendered.contains("doc_open"));
    assert!(rendered.contains(".."));
}
