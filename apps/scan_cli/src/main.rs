use std::{path::PathBuf, sync::Arc};

use anyhow::{bail, Context, Result};
use clap::Parser;
use scan_core::{
    config::{build_engine, load_catalog, load_settings, EngineKind},
    Authenticator, CandidateFile, Credentials, FileIngestionValidator, SubmitOutcome,
};
use shared::domain::CategoryId;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Runs one scan headlessly and prints the outcome as JSON.
#[derive(Parser, Debug)]
struct Cli {
    #[arg(long)]
    username: String,
    #[arg(long, default_value = "")]
    password: String,
    #[arg(long, default_value = "kidney-stone")]
    category: String,
    #[arg(long)]
    file: PathBuf,
    /// Overrides the type guessed from the file extension.
    #[arg(long)]
    media_type: Option<String>,
    #[arg(long)]
    engine: Option<EngineKind>,
    #[arg(long)]
    server_url: Option<String>,
    /// Extra attempts after a retryable analysis failure.
    #[arg(long, default_value_t = 0)]
    retries: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut settings = load_settings()?;
    if let Some(engine) = cli.engine {
        settings.engine = engine;
    }
    if let Some(url) = cli.server_url {
        settings.inference_url = Some(url);
    }

    let engine = build_engine(&settings)?;
    let catalog = Arc::new(load_catalog(&settings)?);
    let mut auth = Authenticator::new(
        catalog,
        engine,
        FileIngestionValidator::new(settings.max_upload_bytes),
    );

    let mut session = auth.login(&Credentials::new(cli.username, cli.password))?;
    info!(user = %session.profile().username, "signed in");

    let controller = session.controller_mut();
    controller.select_category(&CategoryId::new(cli.category))?;

    let candidate = match cli.media_type {
        Some(media_type) => CandidateFile::from_path(cli.file, media_type),
        None => CandidateFile::from_path_guessing_type(cli.file),
    };
    match controller.submit_files(vec![candidate]).await? {
        SubmitOutcome::Accepted { file_name } => info!(%file_name, "file accepted"),
        SubmitOutcome::Ignored => bail!("no file was offered"),
    }

    let mut attempts_left = cli.retries;
    let outcome = loop {
        let Some(ready) = controller.ready() else {
            bail!("session is not ready to analyze");
        };
        match ready.run_analysis().await {
            Ok(result) => break Ok(result),
            Err(error) if error.is_retryable() && attempts_left > 0 => {
                attempts_left -= 1;
                warn!(%error, attempts_left, "analysis failed, retrying");
            }
            Err(error) => break Err(error),
        }
    };

    let mut snapshot = controller.snapshot();
    snapshot.preview_data_uri = None;
    let report = serde_json::json!({
        "user": session.profile(),
        "session": snapshot,
        "history": session.controller().history_entries(),
    });
    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("failed to render report")?
    );

    let profile = session.logout();
    info!(user = %profile.username, "signed out");

    outcome.map(|_| ()).context("analysis failed")
}
