use std::{fs, path::Path, sync::Arc, time::Duration};

use anyhow::{bail, Context};
use inference::{
    HttpInferenceEngine, InferenceEngine, MissingInferenceEngine, MockInferenceEngine,
    DEFAULT_HTTP_TIMEOUT,
};
use serde::Deserialize;
use tracing::warn;

use crate::{catalog::Catalog, ingest::DEFAULT_MAX_UPLOAD_BYTES};

pub const SETTINGS_FILE: &str = "scan.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    Mock,
    Http,
}

impl std::str::FromStr for EngineKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mock" => Ok(Self::Mock),
            "http" => Ok(Self::Http),
            other => bail!("unknown inference engine '{other}' (expected mock or http)"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClientSettings {
    pub engine: EngineKind,
    pub inference_url: Option<String>,
    pub inference_timeout_secs: u64,
    pub max_upload_bytes: u64,
    pub mock_latency_ms: Option<u64>,
    pub catalog_path: Option<String>,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            engine: EngineKind::Mock,
            inference_url: None,
            inference_timeout_secs: DEFAULT_HTTP_TIMEOUT.as_secs(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            mock_latency_ms: None,
            catalog_path: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    engine: Option<EngineKind>,
    inference_url: Option<String>,
    inference_timeout_secs: Option<u64>,
    max_upload_bytes: Option<u64>,
    mock_latency_ms: Option<u64>,
    catalog_path: Option<String>,
}

/// Defaults, then `scan.toml` in the working directory, then `APP__*`
/// environment variables.
pub fn load_settings() -> anyhow::Result<ClientSettings> {
    let mut settings = ClientSettings::default();
    if Path::new(SETTINGS_FILE).exists() {
        let raw = fs::read_to_string(SETTINGS_FILE)
            .with_context(|| format!("failed to read {SETTINGS_FILE}"))?;
        apply_file(&mut settings, &raw)?;
    }
    apply_env(&mut settings, |key| std::env::var(key).ok());
    Ok(settings)
}

pub fn apply_file(settings: &mut ClientSettings, raw: &str) -> anyhow::Result<()> {
    let file: FileSettings = toml::from_str(raw).context("invalid scan settings file")?;
    if let Some(v) = file.engine {
        settings.engine = v;
    }
    if let Some(v) = file.inference_url {
        settings.inference_url = Some(v);
    }
    if let Some(v) = file.inference_timeout_secs {
        settings.inference_timeout_secs = v;
    }
    if let Some(v) = file.max_upload_bytes {
        settings.max_upload_bytes = v;
    }
    if let Some(v) = file.mock_latency_ms {
        settings.mock_latency_ms = Some(v);
    }
    if let Some(v) = file.catalog_path {
        settings.catalog_path = Some(v);
    }
    Ok(())
}

/// Malformed numeric or engine values are ignored with a warning.
pub fn apply_env(settings: &mut ClientSettings, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("APP__ENGINE") {
        match v.parse() {
            Ok(engine) => settings.engine = engine,
            Err(error) => warn!(%error, "ignoring APP__ENGINE"),
        }
    }
    if let Some(v) = lookup("APP__INFERENCE_URL") {
        settings.inference_url = Some(v);
    }
    if let Some(v) = lookup("APP__INFERENCE_TIMEOUT_SECS") {
        match v.parse() {
            Ok(parsed) => settings.inference_timeout_secs = parsed,
            Err(_) => warn!(value = %v, "ignoring APP__INFERENCE_TIMEOUT_SECS"),
        }
    }
    if let Some(v) = lookup("APP__MAX_UPLOAD_BYTES") {
        match v.parse() {
            Ok(parsed) => settings.max_upload_bytes = parsed,
            Err(_) => warn!(value = %v, "ignoring APP__MAX_UPLOAD_BYTES"),
        }
    }
    if let Some(v) = lookup("APP__MOCK_LATENCY_MS") {
        match v.parse() {
            Ok(parsed) => settings.mock_latency_ms = Some(parsed),
            Err(_) => warn!(value = %v, "ignoring APP__MOCK_LATENCY_MS"),
        }
    }
    if let Some(v) = lookup("APP__CATALOG_PATH") {
        settings.catalog_path = Some(v);
    }
}

pub fn build_engine(settings: &ClientSettings) -> anyhow::Result<Arc<dyn InferenceEngine>> {
    match settings.engine {
        EngineKind::Mock => {
            let mut engine = MockInferenceEngine::new();
            if let Some(ms) = settings.mock_latency_ms {
                engine = engine.with_latency(Duration::from_millis(ms));
            }
            Ok(Arc::new(engine))
        }
        EngineKind::Http => match settings.inference_url.as_deref() {
            Some(url) => Ok(Arc::new(HttpInferenceEngine::new(
                url,
                Duration::from_secs(settings.inference_timeout_secs),
            )?)),
            None => {
                warn!("http engine selected without inference_url; analysis will fail");
                Ok(Arc::new(MissingInferenceEngine))
            }
        },
    }
}

pub fn load_catalog(settings: &ClientSettings) -> anyhow::Result<Catalog> {
    match settings.catalog_path.as_deref() {
        Some(path) => Catalog::load_file(Path::new(path))
            .with_context(|| format!("failed to load catalog from '{path}'")),
        None => Ok(Catalog::builtin()),
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
