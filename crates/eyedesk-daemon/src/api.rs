//! REST API handlers

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use eyedesk_core::{
    from_corners_to_position, ArucoDetections, ArucoPositions, ArucosRequest, ChannelMessage, CirclesRequest, ControlDelta, DrawObject, DrawableSize,
    JointFrame, LinesRequest, ObjectsUpdate, PublishResponse, RectsRequest, RobotUpdate,
    TextsRequest,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::state::{AppState, ProjectorError};

/// API error response
#[derive(Serialize)]
struct ApiError {
    error: String,
}

impl ApiError {
    fn new(msg: impl Into<String>) -> Self {
        Self { error: msg.into() }
    }
}

fn projector_error(e: ProjectorError) -> axum::response::Response {
    let status = match e {
        ProjectorError::NoProjector => StatusCode::SERVICE_UNAVAILABLE,
        ProjectorError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
    };
    (status, Json(ApiError::new(e.to_string()))).into_response()
}

/// Publish joint angles to the kinematic channel
pub async fn publish_robot(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RobotUpdate>,
) -> impl IntoResponse {
    let expected = state.joint_count();
    if req.joints.len() != expected {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiError::new(format!(
                "Expected {} joint angles, got {}",
                expected,
                req.joints.len()
            ))),
        )
            .into_response();
    }

    let count = req.joints.len();
    let viewers = state
        .publish(ChannelMessage::Kinematic(JointFrame::new(req.joints)))
        .await;
    debug!(viewers, "Published joint frame");
    Json(PublishResponse::ok(count)).into_response()
}

/// Publish an object snapshot to the object channel
pub async fn publish_objects(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ObjectsUpdate>,
) -> impl IntoResponse {
    let count = req.objects.len();
    let viewers = state.publish(ChannelMessage::Object(req.objects)).await;
    debug!(objects = count, viewers, "Published object snapshot");
    Json(PublishResponse::ok(count))
}

/// Publish a relative camera rotation to the control channel
pub async fn rotate_camera(
    State(state): State<Arc<AppState>>,
    Json(delta): Json<ControlDelta>,
) -> impl IntoResponse {
    let viewers = state.publish(ChannelMessage::Control(delta)).await;
    debug!(
        rotate_left = delta.rotate_left,
        rotate_up = delta.rotate_up,
        viewers,
        "Published camera rotation"
    );
    Json(PublishResponse::ok(1))
}

/// Per-channel subscriber and publish counters
pub async fn list_channels(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.channel_stats().await)
}

async fn queue_draw(state: &AppState, objects: Vec<DrawObject>) -> Json<PublishResponse> {
    let pending = state.projector.queue(objects).await;
    Json(PublishResponse::ok(pending))
}

pub async fn draw_arucos(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ArucosRequest>,
) -> impl IntoResponse {
    queue_draw(&state, req.markers.into_iter().map(DrawObject::from).collect()).await
}

pub async fn draw_texts(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TextsRequest>,
) -> impl IntoResponse {
    queue_draw(&state, req.texts.into_iter().map(DrawObject::from).collect()).await
}

pub async fn draw_circles(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CirclesRequest>,
) -> impl IntoResponse {
    queue_draw(&state, req.circles.into_iter().map(DrawObject::from).collect()).await
}

pub async fn draw_lines(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LinesRequest>,
) -> impl IntoResponse {
    queue_draw(&state, req.lines.into_iter().map(DrawObject::from).collect()).await
}

pub async fn draw_rects(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RectsRequest>,
) -> impl IntoResponse {
    queue_draw(&state, req.rects.into_iter().map(DrawObject::from).collect()).await
}

/// Flush the pending draw batch to the projectors
pub async fn draw(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.projector.flush().await {
        Ok(count) => Json(PublishResponse::ok(count)).into_response(),
        Err(e) => {
            warn!(error = %e, "Draw flush failed");
            projector_error(e)
        }
    }
}

/// Replace the stored marker positions with a new detection pass
pub async fn report_arucos(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ArucoDetections>,
) -> impl IntoResponse {
    let positions = from_corners_to_position(&req.arucos);
    let count = positions.len();
    *state.arucos.write().await = positions;
    debug!(markers = count, "Stored marker positions");
    Json(PublishResponse::ok(count))
}

/// Marker positions from the last detection pass
pub async fn get_arucos(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(ArucoPositions {
        arucos: state.arucos.read().await.clone(),
    })
}

/// Ask a projector for its drawable size
pub async fn drawable_size(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.projector.request_drawable_size().await {
        Ok((width, height)) => {
            info!(width, height, "Projector reported drawable size");
            Json(DrawableSize { width, height }).into_response()
        }
        Err(e) => projector_error(e),
    }
}
