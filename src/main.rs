mod concepts;
mod config;
mod error;
mod gemini;
mod memory;
mod models;
mod pdf;
mod pipeline;
mod prompts;
mod render;
mod routes;
mod store;
mod submission;
mod supabase;
mod surprise;
#[cfg(test)]
mod testing;

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use crate::{
    concepts::SpecGenerator,
    config::Config,
    gemini::GeminiClient,
    memory::{LocalSeed, MemoryBackend},
    pipeline::DesignPipeline,
    render::ImageRenderer,
    routes::AppState,
    store::{Authenticator, DesignStore, ObjectStore},
    supabase::SupabaseClient,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let config = Config::from_env()?;
    info!(
        text_model = %config.text_model,
        image_model = %config.image_model,
        timeout_secs = config.ai_call_timeout.as_secs(),
        "Using Gemini gateway at {}",
        config.gemini_api_base
    );

    let gemini = Arc::new(
        GeminiClient::new(config.gemini_api_key.clone(), config.gemini_api_base.clone())
            .with_models(config.text_model.clone(), config.image_model.clone()),
    );

    let (objects, designs, auth): (Option<Arc<dyn ObjectStore>>, Arc<dyn DesignStore>, Arc<dyn Authenticator>) =
        match config.supabase.clone() {
            Some(supabase) => {
                info!(url = %supabase.url, bucket = %supabase.storage_bucket, "Using Supabase backend");
                let client = Arc::new(SupabaseClient::new(supabase));
                let objects: Arc<dyn ObjectStore> = client.clone();
                let designs: Arc<dyn DesignStore> = client.clone();
                let auth: Arc<dyn Authenticator> = client;
                (Some(objects), designs, auth)
            }
            None => {
                warn!("⚠️ SUPABASE_URL not set; running in local mode with in-memory designs and inline images");
                let backend = Arc::new(MemoryBackend::default());
                match &config.local_seed_file {
                    Some(path) => {
                        let raw = std::fs::read_to_string(path)
                            .with_context(|| format!("failed to read {}", path.display()))?;
                        let seed: LocalSeed = serde_json::from_str(&raw)
                            .with_context(|| format!("invalid local seed file {}", path.display()))?;
                        info!(
                            path = %path.display(),
                            designs = seed.designs.len(),
                            sessions = seed.sessions.len(),
                            "🌱 Local seed loaded"
                        );
                        backend.seed(seed);
                    }
                    None => warn!(
                        "LOCAL_SEED_FILE not set; submit-design-for-cad and spec-sheet export will answer 401/404"
                    ),
                }
                let designs: Arc<dyn DesignStore> = backend.clone();
                let auth: Arc<dyn Authenticator> = backend;
                (None, designs, auth)
            }
        };

    let pipeline = DesignPipeline::new(
        SpecGenerator::new(gemini.clone(), config.ai_call_timeout),
        ImageRenderer::new(gemini, objects, config.ai_call_timeout),
    );
    let app = routes::router(AppState {
        pipeline: Arc::new(pipeline),
        designs,
        auth,
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "Starting server");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}
