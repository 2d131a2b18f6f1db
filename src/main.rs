//! Search Automator - standalone server
//!
//! Runs the automation service with an HTTP control API.
//!
//! Environment variables:
//! - `SEARCH_AUTOMATOR_PORT` - Server port (default: 8080)

use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _guard = app_lib::init_logging();

    info!("Starting Search Automator");

    if let Some(dir) = app_lib::log_dir() {
        info!("Log files saved to: {}", dir.display());
    }

    let port: u16 = std::env::var("SEARCH_AUTOMATOR_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);

    let state = Arc::new(app_lib::AppState::new());

    // No display means the browser can only run headless
    {
        let mut config = state.config.write().await;
        let has_display = std::env::var("DISPLAY").map(|d| !d.is_empty()).unwrap_or(false);

        if !has_display && !config.headless {
            info!("No DISPLAY available - forcing headless=true");
            config.headless = true;
            config.save();
        }
    }

    // Re-arm a saved daily schedule and start watching it
    app_lib::spawn_schedule_monitor(state.clone()).await;

    info!("Control API: http://0.0.0.0:{}/api", port);

    app_lib::web::start_server(state, port).await?;

    Ok(())
}
