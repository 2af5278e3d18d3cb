use super::*;
use std::{collections::HashMap, io::Write};

use shared::domain::CategoryId;

#[test]
fn defaults_use_mock_engine_and_sixteen_mib_limit() {
    let settings = ClientSettings::default();
    assert_eq!(settings.engine, EngineKind::Mock);
    assert_eq!(settings.max_upload_bytes, 16 * 1024 * 1024);
    assert_eq!(settings.inference_timeout_secs, 30);
}

#[test]
fn file_values_override_defaults() {
    let mut settings = ClientSettings::default();
    apply_file(
        &mut settings,
        r#"
        engine = "http"
        inference_url = "http://127.0.0.1:5000"
        inference_timeout_secs = 5
        "#,
    )
    .expect("parse");

    assert_eq!(settings.engine, EngineKind::Http);
    assert_eq!(
        settings.inference_url.as_deref(),
        Some("http://127.0.0.1:5000")
    );
    assert_eq!(settings.inference_timeout_secs, 5);
    assert_eq!(settings.max_upload_bytes, DEFAULT_MAX_UPLOAD_BYTES);
}

#[test]
fn env_overrides_file_and_skips_malformed_numbers() {
    let mut settings = ClientSettings::default();
    apply_file(&mut settings, "max_upload_bytes = 1024").expect("parse");

    let env: HashMap<&str, &str> = HashMap::from([
        ("APP__ENGINE", "HTTP"),
        ("APP__MAX_UPLOAD_BYTES", "not-a-number"),
        ("APP__MOCK_LATENCY_MS", "250"),
    ]);
    apply_env(&mut settings, |key| env.get(key).map(|v| v.to_string()));

    assert_eq!(settings.engine, EngineKind::Http);
    assert_eq!(settings.max_upload_bytes, 1024);
    assert_eq!(settings.mock_latency_ms, Some(250));
}

#[test]
fn http_engine_without_url_falls_back_to_missing_engine() {
    let settings = ClientSettings {
        engine: EngineKind::Http,
        ..ClientSettings::default()
    };
    let engine = build_engine(&settings).expect("engine");
    assert_eq!(engine.name(), "missing");
}

#[test]
fn builds_configured_engines() {
    let mock = build_engine(&ClientSettings::default()).expect("mock");
    assert_eq!(mock.name(), "mock");

    let http = build_engine(&ClientSettings {
        engine: EngineKind::Http,
        inference_url: Some("http://127.0.0.1:5000".to_string()),
        ..ClientSettings::default()
    })
    .expect("http");
    assert_eq!(http.name(), "http");
}

#[test]
fn catalog_path_loads_custom_catalog() {
    let mut file = tempfile::NamedTempFile::new().expect("tempfile");
    write!(
        file,
        r#"
        [[categories]]
        id = "retina-scan"
        name = "Retina Scan"
        accepted_formats = ["image/png"]
        processing_secs = 1.0
        description = "Fundus photography"
        "#
    )
    .expect("write");

    let settings = ClientSettings {
        catalog_path: Some(file.path().display().to_string()),
        ..ClientSettings::default()
    };
    let catalog = load_catalog(&settings).expect("catalog");
    assert!(catalog.get(&CategoryId::new("retina-scan")).is_some());
    assert!(catalog.get(&CategoryId::new("kidney-stone")).is_none());
}
