use std::{collections::HashMap, fs};

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub server_bind: String,
    pub max_upload_bytes: u64,
    pub simulated_latency_ms: Option<u64>,
    pub catalog_path: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_bind: "127.0.0.1:5000".into(),
            max_upload_bytes: 16 * 1024 * 1024,
            simulated_latency_ms: None,
            catalog_path: None,
        }
    }
}

pub fn load_settings() -> Settings {
    let raw = fs::read_to_string("server.toml").ok();
    settings_from(raw.as_deref(), |key| std::env::var(key).ok())
}

pub(crate) fn settings_from(
    file_raw: Option<&str>,
    env: impl Fn(&str) -> Option<String>,
) -> Settings {
    let mut settings = Settings::default();

    if let Some(raw) = file_raw {
        if let Ok(file_cfg) = toml::from_str::<HashMap<String, toml::Value>>(raw) {
            if let Some(v) = file_cfg.get("bind_addr").and_then(|v| v.as_str()) {
                settings.server_bind = v.to_string();
            }
            if let Some(v) = file_cfg.get("max_upload_bytes").and_then(|v| v.as_integer()) {
                if let Ok(v) = u64::try_from(v) {
                    settings.max_upload_bytes = v;
                }
            }
            if let Some(v) = file_cfg
                .get("simulated_latency_ms")
                .and_then(|v| v.as_integer())
            {
                settings.simulated_latency_ms = u64::try_from(v).ok();
            }
            if let Some(v) = file_cfg.get("catalog_path").and_then(|v| v.as_str()) {
                settings.catalog_path = Some(v.to_string());
            }
        }
    }

    if let Some(v) = env("SERVER_BIND") {
        settings.server_bind = v;
    }
    if let Some(v) = env("APP__BIND_ADDR") {
        settings.server_bind = v;
    }

    if let Some(v) = env("APP__MAX_UPLOAD_BYTES") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.max_upload_bytes = parsed;
        }
    }

    if let Some(v) = env("APP__SIMULATED_LATENCY_MS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.simulated_latency_ms = Some(parsed);
        }
    }

    if let Some(v) = env("APP__CATALOG_PATH") {
        settings.catalog_path = Some(v);
    }

    settings
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn defaults_bind_locally_with_sixteen_mib_limit() {
        let settings = settings_from(None, no_env);
        assert_eq!(settings.server_bind, "127.0.0.1:5000");
        assert_eq!(settings.max_upload_bytes, 16 * 1024 * 1024);
        assert_eq!(settings.simulated_latency_ms, None);
    }

    #[test]
    fn file_then_env_layering() {
        let raw = r#"
            bind_addr = "0.0.0.0:9000"
            max_upload_bytes = 2048
            simulated_latency_ms = 150
        "#;
        let settings = settings_from(Some(raw), |key| match key {
            "APP__BIND_ADDR" => Some("127.0.0.1:7000".to_string()),
            "APP__MAX_UPLOAD_BYTES" => Some("oops".to_string()),
            _ => None,
        });

        assert_eq!(settings.server_bind, "127.0.0.1:7000");
        assert_eq!(settings.max_upload_bytes, 2048);
        assert_eq!(settings.simulated_latency_ms, Some(150));
    }

    #[test]
    fn malformed_file_keeps_defaults() {
        let settings = settings_from(Some("this is = = not toml"), no_env);
        assert_eq!(settings.server_bind, "127.0.0.1:5000");
    }
}
