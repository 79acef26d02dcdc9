mod config;
mod forecast;
mod server;

use anyhow::{Context, Result};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::forecast::artifact::PredictionArtifact;

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = Config::load().context("invalid configuration")?;

    // refuse to start without a model
    let artifact = PredictionArtifact::load(&config.artifact_path).with_context(|| {
        format!(
            "failed to load prediction artifact from {}",
            config.artifact_path.display()
        )
    })?;

    match artifact.metadata() {
        Some(metadata) => tracing::info!(
            path = %config.artifact_path.display(),
            model_id = %metadata.model_id,
            version = metadata.version.as_deref().unwrap_or("unknown"),
            trained_at = ?metadata.trained_at,
            features = ?metadata.feature_names,
            "loaded prediction artifact"
        ),
        None => tracing::info!(
            path = %config.artifact_path.display(),
            "loaded prediction artifact"
        ),
    }

    server::start_server(&config, artifact).await
}
