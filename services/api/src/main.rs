use anyhow::{Context, Result};
use clap::Parser;
use realtime_middle_tier::{MiddleTier, SessionSettings, UpstreamConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::fmt::time::ChronoLocal;
use voicerag_api::config::Config;
use voicerag_api::credentials::{COGNITIVE_SERVICES_SCOPE, SEARCH_SCOPE, credential_for};
use voicerag_api::progress::ProgressTracker;
use voicerag_api::prompts::{load_prompts, system_prompt};
use voicerag_api::ragtools::{AzureSearchClient, attach_rag_tools};
use voicerag_api::server::{AppState, router};

#[derive(Parser)]
#[command(version, about = "Voice tutor backend relaying realtime audio sessions")]
struct Cli {
    /// Address to listen on, overriding BIND_ADDRESS
    #[arg(long)]
    bind: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load application configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(ChronoLocal::rfc_3339())
        .init();
    if std::env::var_os("RUNNING_IN_PRODUCTION").is_none() {
        tracing::info!("Running in development mode, .env file loaded if present");
    }

    // --- 3. Load Prompts ---
    let prompts = load_prompts(&config.prompts_dir).context("Failed to load LLM prompts")?;
    let instructions = system_prompt(&prompts)?;
    tracing::info!("Loaded {} prompts successfully.", prompts.len());

    // --- 4. Credentials ---
    if config.needs_token_credentials() {
        tracing::info!("An API key is missing, falling back to Azure CLI tokens");
    }
    let tenant_id = config.tenant_id.as_deref();
    let llm_credential = credential_for(
        config.openai_api_key.clone(),
        COGNITIVE_SERVICES_SCOPE,
        tenant_id,
    )
    .await?;
    let search_credential =
        credential_for(config.search.api_key.clone(), SEARCH_SCOPE, tenant_id).await?;

    // --- 5. Middle Tier and Tools ---
    let upstream = UpstreamConfig::builder(
        &config.openai_endpoint,
        &config.openai_deployment,
        llm_credential,
    )
    .build();
    upstream
        .url()
        .context("AZURE_OPENAI_ENDPOINT is not a usable endpoint")?;
    let settings = SessionSettings::builder()
        .with_instructions(instructions)
        .with_voice(&config.voice_choice)
        .build();

    tracing::info!("Attaching RAG tools to the middle tier...");
    let search_index = Arc::new(AzureSearchClient::new(
        &config.search.endpoint,
        &config.search.index,
        search_credential,
    ));
    let middle_tier = attach_rag_tools(
        MiddleTier::builder(upstream).with_settings(settings),
        search_index,
        config.search.fields.clone(),
    )
    .build();
    tracing::info!(
        "RAG tools attached. Available tools: {:?}",
        middle_tier.tools().names()
    );

    // --- 6. Progress Storage ---
    let progress = ProgressTracker::new(&config.progress_dir)
        .context("Failed to prepare the progress directory")?;
    tracing::info!("Storing learning progress in {}", progress.dir().display());

    // --- 7. Serve ---
    let state = AppState {
        middle_tier: Arc::new(middle_tier),
        progress: Arc::new(progress),
    };
    let app = router(state, &config.static_dir);

    let addr = args.bind.unwrap_or(config.bind_address);
    tracing::info!("Starting server, listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
