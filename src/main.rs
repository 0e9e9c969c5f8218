use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use rowgen::batch::BatchDispatcher;
use rowgen::config::Settings;
use rowgen::downstream::OllamaClient;
use rowgen::server::{self, AppState};
use rowgen::telemetry::{self, LogFormat};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::register(LogFormat::from_env());

    let settings = Settings::from_env();
    let client = OllamaClient::new(&settings.ollama_url)
        .with_context(|| format!("Invalid OLLAMA_URL {:?}", settings.ollama_url))?;
    info!(endpoint = %client.endpoint(), "Using Ollama backend");

    let dispatcher = BatchDispatcher::new(Arc::new(client), settings.dispatch_config());
    server::serve(settings.port, AppState::new(dispatcher))
        .await
        .context("Remote function server failed")?;

    Ok(())
}
