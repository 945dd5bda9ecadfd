use std::{collections::HashMap, io::Write};

use super::*;

#[test]
fn defaults_are_valid_and_have_no_timeout() {
    let settings = RuntimeSettings::default();
    settings.validate().expect("defaults validate");
    assert_eq!(settings.event_channel, BACKEND_EVENT_CHANNEL);
    assert_eq!(settings.invoke_timeout, None);
}

#[test]
fn env_overrides_replace_file_values() {
    let env: HashMap<&str, &str> = HashMap::from([
        ("APP__BACKEND_URL", "https://backend.internal:8443"),
        ("APP__WATCH_ENABLE_OP", "location_watch_on"),
        ("APP__INVOKE_TIMEOUT_MS", "2500"),
    ]);
    let mut settings = RuntimeSettings::default();
    apply_env_overrides(&mut settings, |key| env.get(key).map(|v| v.to_string()));

    assert_eq!(settings.backend_url, "https://backend.internal:8443");
    assert_eq!(settings.watch_enable_op, "location_watch_on");
    assert_eq!(settings.watch_disable_op, "watch_disable");
    assert_eq!(settings.invoke_timeout, Some(Duration::from_millis(2500)));
}

#[test]
fn unparseable_or_zero_timeout_is_ignored_or_disabling() {
    let mut settings = RuntimeSettings::default();
    apply_env_overrides(&mut settings, |key| {
        (key == "APP__INVOKE_TIMEOUT_MS").then(|| "soon".to_string())
    });
    assert_eq!(settings.invoke_timeout, None);

    settings.invoke_timeout = Some(Duration::from_secs(1));
    apply_env_overrides(&mut settings, |key| {
        (key == "APP__INVOKE_TIMEOUT_MS").then(|| "0".to_string())
    });
    assert_eq!(settings.invoke_timeout, None);
}

#[test]
fn loads_explicit_settings_file() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    writeln!(
        file,
        "backend_url = \"http://127.0.0.1:7000\"\nevent_channel = \"writer-events\"\ninvoke_timeout_ms = 1500"
    )
    .expect("write settings");

    let settings = load_settings_from(file.path()).expect("load settings");
    assert_eq!(settings.event_channel, "writer-events");
    assert_eq!(settings.invoke_timeout, Some(Duration::from_millis(1500)));
}

#[test]
fn malformed_settings_file_is_an_error() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    writeln!(file, "backend_url = [").expect("write settings");
    let err = load_settings_from(file.path()).expect_err("must fail");
    assert!(err.to_string().contains("failed to parse settings file"));
}

#[test]
fn validate_rejects_non_http_backends_and_empty_names() {
    let settings = RuntimeSettings {
        backend_url: "ftp://files.example".into(),
        ..RuntimeSettings::default()
    };
    assert!(matches!(
        settings.validate(),
        Err(ConfigError::UnsupportedScheme(_))
    ));

    let settings = RuntimeSettings {
        event_channel: "  ".into(),
        ..RuntimeSettings::default()
    };
    assert!(matches!(
        settings.validate(),
        Err(ConfigError::Empty("event_channel"))
    ));

    let settings = RuntimeSettings {
        backend_url: "::".into(),
        ..RuntimeSettings::default()
    };
    assert!(matches!(
        settings.validate(),
        Err(ConfigError::InvalidBackendUrl { .. })
    ));
}
