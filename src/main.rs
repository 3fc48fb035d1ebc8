use anyhow::Result;
use axum::Router;
use parking_lot::Mutex;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

mod config;
mod controller;
mod error;
mod logging;
mod routes;
mod services;
pub mod models;

use controller::Controller;
use services::llm_agent::{AnalysisService, OpenAiAnalyst};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    logging::init_logging()?;

    // Load configuration
    let config = config::load_config()?;
    let addr = config.bind_addr;
    let max_file_size = config.max_file_size;

    // Build our application state
    let analyst: Arc<dyn AnalysisService> = Arc::new(OpenAiAnalyst::new(&config));
    let state = Arc::new(AppState::new(config, analyst));

    // Build our application with a route
    let app = Router::new()
        .merge(routes::routes())
        .merge(routes::sheets::routes(max_file_size))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Run it
    tracing::info!("listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// Application state
pub struct AppState {
    config: config::Config,
    controller: Mutex<Controller>,
    analyst: Arc<dyn AnalysisService>,
}

impl AppState {
    fn new(config: config::Config, analyst: Arc<dyn AnalysisService>) -> Self {
        Self {
            config,
            controller: Mutex::new(Controller::new()),
            analyst,
        }
    }
}
