//! Web server setup and routing

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use eyedesk_core::overlay::DRAW_ENDPOINT;
use eyedesk_core::ChannelKind;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tracing::info;

use crate::api;
use crate::config::TlsConfig;
use crate::state::AppState;
use crate::ws;

/// Build the router: channel sockets, publish API, frontend and assets
pub fn router(state: Arc<AppState>) -> Router {
    // Frontend first, then models and the object manifest from the asset tree
    let static_files = ServeDir::new(&state.config.assets.web_dir)
        .fallback(ServeDir::new(&state.config.assets.assets_dir));

    Router::new()
        // Publish API
        .route("/api/robot", post(api::publish_robot))
        .route("/api/objects", post(api::publish_objects))
        .route("/api/camera", post(api::rotate_camera))
        .route("/api/channels", get(api::list_channels))
        .route("/api/arucos", get(api::get_arucos).post(api::report_arucos))
        // Projector overlay
        .route("/api/draw", post(api::draw))
        .route("/api/draw/size", get(api::drawable_size))
        .route("/api/draw/arucos", post(api::draw_arucos))
        .route("/api/draw/texts", post(api::draw_texts))
        .route("/api/draw/circles", post(api::draw_circles))
        .route("/api/draw/lines", post(api::draw_lines))
        .route("/api/draw/rects", post(api::draw_rects))
        // Scene channels
        .route(ChannelKind::Kinematic.endpoint(), get(ws::kinematic_handler))
        .route(ChannelKind::Object.endpoint(), get(ws::objects_handler))
        .route(ChannelKind::Control.endpoint(), get(ws::controls_handler))
        .route(DRAW_ENDPOINT, get(ws::draw_handler))
        .fallback_service(static_files)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Run the web server (HTTP or HTTPS depending on config)
pub async fn run(state: Arc<AppState>, bind: &str, tls: Option<&TlsConfig>) -> Result<()> {
    let app = router(state);

    if let Some(tls_config) = tls {
        run_https(app, bind, tls_config).await
    } else {
        run_http(app, bind).await
    }
}

/// Run plain HTTP server
async fn run_http(app: Router, bind: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(address = %bind, protocol = "HTTP", "Starting web server");
    axum::serve(listener, app).await?;
    Ok(())
}

/// Run HTTPS server with TLS
async fn run_https(app: Router, bind: &str, tls: &TlsConfig) -> Result<()> {
    use axum_server::tls_rustls::RustlsConfig;
    use std::path::PathBuf;

    let cert_path = PathBuf::from(&tls.cert);
    let key_path = PathBuf::from(&tls.key);

    if !cert_path.exists() {
        anyhow::bail!("TLS certificate file not found: {}", tls.cert);
    }
    if !key_path.exists() {
        anyhow::bail!("TLS key file not found: {}", tls.key);
    }

    let rustls_config = RustlsConfig::from_pem_file(&cert_path, &key_path).await?;

    let addr: std::net::SocketAddr = bind.parse()?;
    info!(address = %bind, protocol = "HTTPS", cert = %tls.cert, "Starting web server with TLS");

    axum_server::bind_rustls(addr, rustls_config)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}
