use axum::extract::connect_info::ConnectInfo;
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::connection::handle_socket;
use crate::server::Gateway;

/// Build the HTTP router: the WebSocket endpoint plus a plain-text
/// fallback for anyone poking the port with a browser.
pub fn create_router(gateway: Arc<Gateway>, cors_origins: &str) -> Router {
    let cors = if cors_origins == "*" {
        CorsLayer::permissive()
    } else {
        let origins: Vec<_> = cors_origins
            .split(',')
            .filter_map(|s| s.trim().parse::<axum::http::HeaderValue>().ok())
            .collect();

        if origins.is_empty() {
            tracing::warn!("No valid CORS origins configured, using permissive CORS");
            CorsLayer::permissive()
        } else {
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    };

    Router::new()
        .route("/ws", get(ws_handler))
        .fallback(|| async { "Nightfall server. Connect via WebSocket on /ws." })
        .with_state(gateway)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

async fn ws_handler(
    State(gateway): State<Arc<Gateway>>,
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, gateway, addr))
}
