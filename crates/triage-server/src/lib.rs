pub mod error;
pub mod routes;
pub mod sign;
pub mod state;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

use state::AppState;

/// Build the axum Router with all API routes and middleware.
/// Used by `serve()` and available for integration testing.
pub fn build_router(app_state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(routes::health::health))
        .route("/webhook/siem", post(routes::webhook::webhook_siem))
        .route("/ws/incidents/{incident_id}", get(routes::ws::ws_incident))
        .route("/incidents/{incident_id}", get(routes::incidents::get_incident))
        .layer(cors)
        .with_state(app_state)
}

/// Start the triage API server on a pre-bound listener.
///
/// Accepting a bound `TcpListener` lets the caller read the actual port
/// before starting (useful when `port = 0` and the OS picks a free one).
pub async fn serve_on(app_state: AppState, listener: tokio::net::TcpListener) -> anyhow::Result<()> {
    let actual_port = listener.local_addr()?.port();
    let app = build_router(app_state);

    tracing::info!("triage API listening on http://localhost:{actual_port}");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Bind and start the triage API server.
pub async fn serve(app_state: AppState, port: u16) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    serve_on(app_state, listener).await
}
