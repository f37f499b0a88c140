mod agents;
mod config;
mod errors;
mod evidence;
mod llm_client;
mod pipeline;
mod results;
mod routes;
mod session;
mod state;
mod validation;

use anyhow::Result;
use std::net::SocketAddr;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use std::sync::Arc;

use crate::agents::analysis::AnalysisOptions;
use crate::agents::{
    GenerationBackend, LoaderOptions, MatchingAgent, PdfTextExtractor, ScreeningAgent,
};
use crate::config::Config;
use crate::evidence::SearchOptions;
use crate::llm_client::LlmClient;
use crate::pipeline::{Orchestrator, PipelineOptions};
use crate::routes::build_router;
use crate::session::store::InMemorySessionStore;
use crate::state::AppState;
use crate::validation::ResultValidator;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}={}",
                env!("CARGO_PKG_NAME").replace('-', "_"),
                &config.rust_log
            ))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting RoleFit API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize LLM client
    let llm: Arc<dyn GenerationBackend> = Arc::new(LlmClient::new(
        config.anthropic_api_key.clone(),
    )?);
    info!("LLM client initialized (model: {})", llm_client::MODEL);

    let analysis = AnalysisOptions {
        max_tool_turns: config.max_tool_turns,
        search: SearchOptions::default(),
    };
    let orchestrator = Orchestrator::new(
        Arc::new(InMemorySessionStore::new()),
        Arc::new(PdfTextExtractor),
        Arc::new(ScreeningAgent::new(llm.clone(), analysis)),
        Arc::new(MatchingAgent::new(llm, analysis)),
        ResultValidator::new(config.evidence_strictness),
        PipelineOptions {
            loader: LoaderOptions {
                max_document_chars: config.max_document_chars,
                extraction_timeout: config.extraction_timeout,
            },
            agent_timeout: config.agent_timeout,
        },
    );
    info!(
        "Pipeline ready: agent_timeout={:?}, max_tool_turns={}, evidence={:?}",
        config.agent_timeout, config.max_tool_turns, config.evidence_strictness
    );

    // Build app state
    let state = AppState {
        config: config.clone(),
        orchestrator: Arc::new(orchestrator),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
