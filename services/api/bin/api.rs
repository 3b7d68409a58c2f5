//! Main Entrypoint for the Interviewer API Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Loading the knowledge graph, prompt templates and question source.
//! 3. Initializing shared services (the LLM client and speech adapters).
//! 4. Constructing the Axum router and applying middleware.
//! 5. Starting the web server and handling graceful shutdown.

use anyhow::Context;
use async_openai::config::OpenAIConfig;
use interviewer_api::{
    config::{Config, RetrievalSource},
    router::create_router,
    state::AppState,
};
use interviewer_core::{
    InterviewSettings, Interviewer,
    graph::KnowledgeGraph,
    llm_client::{LLMClient, OpenAICompatibleClient},
    prompts::Prompts,
    retrieval::{HttpRetrievalIndex, PassageFormat, QuestionBank, RetrievalIndex},
    session::SessionStore,
    speech::{HttpSpeechToText, HttpTextToSpeech, SpeechToText, TextToSpeech},
};
use std::{net::SocketAddr, sync::Arc};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = ?e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal. Shutting down gracefully...");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing application state...");

    // --- 3. Load Interview Data ---
    let graph = KnowledgeGraph::load(&config.graph_path).with_context(|| {
        format!(
            "Failed to load knowledge graph from '{}'",
            config.graph_path.display()
        )
    })?;

    let prompts = if config.prompts_path.is_dir() {
        Prompts::from_dir(&config.prompts_path).context("Failed to load prompt templates")?
    } else {
        warn!(
            path = %config.prompts_path.display(),
            "Prompts directory not found; using built-in templates"
        );
        Prompts::builtin()
    };

    let passage_format = PassageFormat {
        question_prefix: config.question_prefix.clone(),
        answer_marker: config.answer_marker.clone(),
    };
    let index: Arc<dyn RetrievalIndex> = match &config.retrieval {
        RetrievalSource::Http(url) => {
            info!(url = %url, "Using remote retrieval service.");
            Arc::new(HttpRetrievalIndex::new(url.clone()))
        }
        RetrievalSource::QuestionBank(path) => {
            info!(path = %path.display(), "Using in-process question bank.");
            Arc::new(QuestionBank::load(path, &passage_format)?)
        }
    };

    // --- 4. Initialize Shared Services ---
    let mut openai_config = OpenAIConfig::new().with_api_base(&config.llm_base_url);
    if let Some(api_key) = &config.llm_api_key {
        openai_config = openai_config.with_api_key(api_key);
    }
    let llm_client: Arc<dyn LLMClient> = Arc::new(OpenAICompatibleClient::new(
        openai_config,
        config.memory_window,
    ));

    let stt = config
        .stt_url
        .as_ref()
        .map(|url| Arc::new(HttpSpeechToText::new(url.clone())) as Arc<dyn SpeechToText>);
    let tts = config
        .tts_url
        .as_ref()
        .map(|url| Arc::new(HttpTextToSpeech::new(url.clone())) as Arc<dyn TextToSpeech>);
    if stt.is_none() || tts.is_none() {
        info!(
            stt = stt.is_some(),
            tts = tts.is_some(),
            "Speech adapters partially configured; audio features limited."
        );
    }

    let settings = InterviewSettings {
        keyword_threshold: config.keyword_threshold,
        call_timeout: config.call_timeout,
        passage_format,
        ..InterviewSettings::default()
    };
    let interviewer = Interviewer::new(
        Arc::new(graph),
        index,
        llm_client,
        prompts,
        SessionStore::new(config.session_capacity, config.session_idle),
        settings,
    );

    let app_state = Arc::new(AppState {
        interviewer: Arc::new(interviewer),
        stt,
        tts,
        config: Arc::new(config.clone()),
    });

    // --- 5. Create Router and Apply Middleware ---
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(app_state).layer(cors);

    // --- 6. Start Server ---
    info!(
        llm_base_url = %config.llm_base_url,
        guided_model = %config.guided_model,
        direct_model = %config.direct_model,
        bind_address = %config.bind_address,
        "Service configured. Starting server..."
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server has shut down.");
    Ok(())
}
