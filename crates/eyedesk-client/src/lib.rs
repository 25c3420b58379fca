//! Eyedesk Client - publish updates to a running Eyedesk daemon
//!
//! Producers (robot drivers, vision pipelines, test scripts) use this client
//! to push joint angles, object snapshots and camera rotations to every
//! connected viewer, to draw on the projector overlay, and to report or
//! read the marker positions seen by the desk camera.

use eyedesk_core::{
    ArucoDetection, ArucoDetections, ArucoMarker, ArucoPosition, ArucoPositions, ArucosRequest, ChannelStats, CircleShape, CirclesRequest, ControlDelta,
    DrawableSize, LineSegment, LinesRequest, ObjectRecord, ObjectsUpdate, PublishResponse,
    RectShape, RectsRequest, RobotUpdate, TextLabel, TextsRequest,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Daemon address used by [`EyedeskClient::connect_default`]
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Daemon returned {status}: {message}")]
    Api { status: u16, message: String },
}

/// Error body returned by the daemon
#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// Handle to one daemon
#[derive(Debug, Clone)]
pub struct EyedeskClient {
    http: reqwest::Client,
    base_url: String,
}

impl EyedeskClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn connect_default() -> Result<Self, ClientError> {
        Self::new(DEFAULT_BASE_URL)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<PublishResponse, ClientError> {
        debug!(path, "POST");
        let response = self.http.post(self.url(path)).json(body).send().await?;
        parse(response).await
    }

    /// Show the virtual robot at the given joint angles (radians)
    pub async fn update_virtual_robot(&self, joints: &[f64]) -> Result<(), ClientError> {
        let body = RobotUpdate {
            joints: joints.to_vec(),
        };
        self.post("/api/robot", &body).await.map(|_| ())
    }

    /// Replace the set of visible objects
    pub async fn update_virtual_objects(
        &self,
        objects: Vec<ObjectRecord>,
    ) -> Result<(), ClientError> {
        self.post("/api/objects", &ObjectsUpdate { objects })
            .await
            .map(|_| ())
    }

    /// Orbit every viewer's camera as if dragged by (-left, -up) pixels
    pub async fn rotate_camera(&self, rotate_left: f64, rotate_up: f64) -> Result<(), ClientError> {
        let delta = ControlDelta {
            rotate_left,
            rotate_up,
        };
        self.post("/api/camera", &delta).await.map(|_| ())
    }

    pub async fn place_arucos(&self, markers: Vec<ArucoMarker>) -> Result<(), ClientError> {
        self.post("/api/draw/arucos", &ArucosRequest { markers })
            .await
            .map(|_| ())
    }

    pub async fn place_texts(&self, texts: Vec<TextLabel>) -> Result<(), ClientError> {
        self.post("/api/draw/texts", &TextsRequest { texts })
            .await
            .map(|_| ())
    }

    pub async fn place_circles(&self, circles: Vec<CircleShape>) -> Result<(), ClientError> {
        self.post("/api/draw/circles", &CirclesRequest { circles })
            .await
            .map(|_| ())
    }

    pub async fn place_lines(&self, lines: Vec<LineSegment>) -> Result<(), ClientError> {
        self.post("/api/draw/lines", &LinesRequest { lines })
            .await
            .map(|_| ())
    }

    pub async fn place_rects(&self, rects: Vec<RectShape>) -> Result<(), ClientError> {
        self.post("/api/draw/rects", &RectsRequest { rects })
            .await
            .map(|_| ())
    }

    /// Replace the projector overlay with everything placed since the last call
    pub async fn clear_and_draw(&self) -> Result<(), ClientError> {
        let response = self.http.post(self.url("/api/draw")).send().await?;
        parse::<PublishResponse>(response).await.map(|_| ())
    }

    /// Projector surface size in logical pixels
    pub async fn get_drawable_size(&self) -> Result<(f64, f64), ClientError> {
        let response = self.http.get(self.url("/api/draw/size")).send().await?;
        let size: DrawableSize = parse(response).await?;
        Ok((size.width, size.height))
    }

    /// Store a detection pass; replaces the previous positions
    pub async fn report_arucos(&self, arucos: Vec<ArucoDetection>) -> Result<(), ClientError> {
        self.post("/api/arucos", &ArucoDetections { arucos })
            .await
            .map(|_| ())
    }

    /// Marker positions from the last detection pass
    pub async fn get_arucos(&self) -> Result<Vec<ArucoPosition>, ClientError> {
        let response = self.http.get(self.url("/api/arucos")).send().await?;
        let positions: ArucoPositions = parse(response).await?;
        Ok(positions.arucos)
    }

    pub async fn channel_stats(&self) -> Result<Vec<ChannelStats>, ClientError> {
        let response = self.http.get(self.url("/api/channels")).send().await?;
        parse(response).await
    }
}

async fn parse<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json().await?);
    }
    let message = match response.json::<ErrorBody>().await {
        Ok(body) => body.error,
        Err(_) => status.canonical_reason().unwrap_or("unknown error").to_string(),
    };
    Err(ClientError::Api {
        status: status.as_u16(),
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::State,
        http::StatusCode,
        routing::{get, post},
        Json, Router,
    };
    use serde_json::{json, Value};
    use std::sync::{Arc, Mutex};

    type Seen = Arc<Mutex<Vec<Value>>>;

    async fn record(State(seen): State<Seen>, Json(body): Json<Value>) -> Json<Value> {
        seen.lock().unwrap().push(body);
        Json(json!({ "success": true, "count": 1 }))
    }

    async fn serve() -> (EyedeskClient, Seen) {
        let seen: Seen = Arc::default();
        let app = Router::new()
            .route("/api/robot", post(record))
            .route("/api/objects", post(record))
            .route("/api/draw/circles", post(record))
            .route(
                "/api/arucos",
                get(|| async {
                    Json(json!({ "arucos": [{ "id": 4, "x": 20.0, "y": 30.0, "rot": 0.0, "size": 20.0 }] }))
                })
                .post(record),
            )
            .route(
                "/api/draw",
                post(|| async {
                    (
                        StatusCode::SERVICE_UNAVAILABLE,
                        Json(json!({ "error": "No projector connected" })),
                    )
                }),
            )
            .route(
                "/api/draw/size",
                get(|| async { Json(json!({ "width": 1920.0, "height": 1080.0 })) }),
            )
            .with_state(seen.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (EyedeskClient::new(format!("http://{}/", addr)).unwrap(), seen)
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let client = EyedeskClient::new("http://localhost:8000/").unwrap();
        assert_eq!(client.base_url(), "http://localhost:8000");
        assert_eq!(client.url("/api/robot"), "http://localhost:8000/api/robot");
        assert_eq!(EyedeskClient::connect_default().unwrap().base_url(), DEFAULT_BASE_URL);
    }

    #[tokio::test]
    async fn test_publish_bodies() {
        let (client, seen) = serve().await;
        client
            .update_virtual_robot(&[0.0, -0.785, 0.0, -2.356, 0.0, 1.571, 0.785])
            .await
            .unwrap();
        client
            .update_virtual_objects(vec![ObjectRecord {
                id: 3,
                x: 0.1,
                y: 0.2,
                z: 0.0,
                rot: 0.0,
            }])
            .await
            .unwrap();
        client
            .place_circles(vec![CircleShape {
                x: 0.0,
                y: 0.0,
                radius: 200.0,
                fill: false,
            }])
            .await
            .unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0]["joints"].as_array().unwrap().len(), 7);
        assert_eq!(seen[1]["objects"][0]["id"], 3);
        assert_eq!(seen[2]["circles"][0]["radius"], 200.0);
    }

    #[tokio::test]
    async fn test_error_body_surfaces() {
        let (client, _) = serve().await;
        match client.clear_and_draw().await {
            Err(ClientError::Api { status, message }) => {
                assert_eq!(status, 503);
                assert_eq!(message, "No projector connected");
            }
            other => panic!("unexpected: {:?}", other),
        }
        assert_eq!(client.get_drawable_size().await.unwrap(), (1920.0, 1080.0));
    }

    #[tokio::test]
    async fn test_report_and_get_arucos() {
        let (client, seen) = serve().await;
        client
            .report_arucos(vec![ArucoDetection {
                id: 4,
                corners: [[10.0, 20.0], [30.0, 20.0], [30.0, 40.0], [10.0, 40.0]],
            }])
            .await
            .unwrap();
        assert_eq!(seen.lock().unwrap()[0]["arucos"][0]["corners"][1][0], 30.0);

        let arucos = client.get_arucos().await.unwrap();
        assert_eq!(
            arucos,
            vec![ArucoPosition {
                id: 4,
                x: 20.0,
                y: 30.0,
                rot: 0.0,
                size: 20.0,
            }]
        );
    }
}
