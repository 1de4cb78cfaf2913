//! `cms-server`: serves a content bundle over HTTP.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use cms_rs::cache::ContentVersions;
use cms_rs::core::logging::setup_logging;
use cms_rs::core::settings::SETTINGS;
use cms_rs::core::settings_loader;
use cms_rs::prelude::*;

#[derive(Debug, Parser)]
#[command(name = "cms-server", version, about = "Serves CMS pages over HTTP")]
struct Args {
    /// Settings file. `.json` files are read as JSON, anything else as TOML.
    #[arg(long)]
    settings: Option<PathBuf>,

    /// JSON bundle of pages, partials and layouts to serve.
    #[arg(long)]
    content: Option<PathBuf>,

    /// Address to bind, overriding `server.bind_address`.
    #[arg(long)]
    addr: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run(Args::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("cms-server: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> CmsResult<()> {
    SETTINGS.configure(load_settings(args.settings.as_deref())?);
    let settings = SETTINGS.get();
    setup_logging(settings);

    let versions = Arc::new(ContentVersions::from_settings(&settings.cache)?);
    let repo = Arc::new(InMemoryRepository::new(Arc::clone(&versions)));
    if let Some(path) = &args.content {
        let json = std::fs::read_to_string(path)
            .map_err(|e| CmsError::Io(format!("Failed to read {}: {e}", path.display())))?;
        repo.load(ContentBundle::from_json_str(&json)?)?;
        tracing::info!(path = %path.display(), "content loaded");
    }

    let site = Site::builder(settings.clone())
        .versions(versions)
        .repository(repo)
        .build()?;
    let addr = args
        .addr
        .unwrap_or_else(|| settings.server.bind_address.clone());
    CmsApp::new(site).run(&addr).await
}

fn load_settings(path: Option<&Path>) -> CmsResult<Settings> {
    match path {
        Some(path) if path.extension().is_some_and(|ext| ext == "json") => {
            let mut settings = settings_loader::from_json_file(path)?;
            settings_loader::apply_env_overrides(&mut settings);
            Ok(settings)
        }
        Some(path) => settings_loader::from_toml_file_with_env(path),
        None => Ok(settings_loader::from_env()),
    }
}
