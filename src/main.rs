use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use trip_planner::config::{InferenceBackendKind, PlannerConfig};
use trip_planner::trip::{ConversationManager, PlannerRouteState, planner_routes};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = PlannerConfig::from_env().context("Failed to load configuration")?;

    eprintln!("🧳 Trip Planner v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Chat API: http://0.0.0.0:{}/api/chat", config.port);
    eprintln!("   Itinerary service: {}", config.itinerary_api_base);

    match config.backend {
        InferenceBackendKind::Rest => {
            eprintln!("   Inference: REST chat backend at {}", config.chat_api_base)
        }
        InferenceBackendKind::Model => {
            if let Some(llm) = &config.llm {
                eprintln!("   Inference: model {} via {}", llm.model, llm.base_url);
            }
        }
    }

    let manager = Arc::new(
        ConversationManager::from_config(&config).context("Failed to build conversation manager")?,
    );

    // Periodically prune idle conversations
    {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(600)); // 10 min
            interval.tick().await; // Skip immediate first tick
            loop {
                interval.tick().await;
                manager.prune_stale_sessions().await;
            }
        });
    }

    let backend = manager.backend_name().to_string();
    let app = planner_routes(PlannerRouteState { manager }, &config.cors_origins);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port))
        .await
        .with_context(|| format!("Failed to bind port {}", config.port))?;
    tracing::info!(port = config.port, backend = %backend, "Trip planner server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    eprintln!("Shutting down.");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
