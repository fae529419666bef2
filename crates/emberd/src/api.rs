use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::Path;
use axum::extract::State;
use axum::http::header;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use axum::Json;
use axum::Router;
use serde::Deserialize;
use serde::Serialize;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::engine::Engine;
use crate::engine::EngineError;

/// Response for the /v1/ping endpoint
#[derive(Serialize)]
struct PingResponse {
    status: String,
}

/// Response for the /v1/info endpoint
#[derive(Serialize)]
struct InfoResponse {
    version: String,
    hostname: String,
}

/// Body of every non-2xx response
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug, Deserialize)]
struct TemperatureRequest {
    temperature: f64,
}

#[derive(Debug, Deserialize)]
struct AwayModeRequest {
    on: bool,
}

/// Shared application state
#[derive(Clone)]
struct AppState {
    version: &'static str,
    engine: Arc<Engine>,
}

fn error_response(status: StatusCode, error: impl ToString) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
        .into_response()
}

fn engine_error_response(err: EngineError) -> Response {
    match err {
        EngineError::UnknownEntity(_) => error_response(StatusCode::NOT_FOUND, err),
        EngineError::IntegrationUnavailable(_) | EngineError::NoReply(_) => {
            error_response(StatusCode::SERVICE_UNAVAILABLE, err)
        }
    }
}

/// Handler for GET /v1/ping
#[tracing::instrument]
async fn ping() -> impl IntoResponse {
    tracing::debug!("Handling /v1/ping request");
    (
        StatusCode::OK,
        Json(PingResponse {
            status: "ok".to_string(),
        }),
    )
}

/// Handler for GET /v1/info
#[tracing::instrument(skip(state))]
async fn info(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    tracing::debug!("Handling /v1/info request");

    let hostname = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());

    (
        StatusCode::OK,
        Json(InfoResponse {
            version: state.version.to_string(),
            hostname,
        }),
    )
}

/// Handler for GET /v1/states
#[tracing::instrument(skip(state))]
async fn states(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.engine.state_snapshot();
    (StatusCode::OK, Json(snapshot.as_ref().clone()))
}

/// Handler for GET /v1/cameras/:entity_id/image
#[tracing::instrument(skip(state))]
async fn camera_image(
    State(state): State<Arc<AppState>>,
    Path(entity_id): Path<String>,
) -> Response {
    if !state.engine.state_snapshot().cameras.contains_key(&entity_id) {
        return error_response(StatusCode::NOT_FOUND, format!("Unknown camera: {}", entity_id));
    }

    match state.engine.camera_image(entity_id.clone()).await {
        Ok(Some(image)) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "image/jpeg")],
            image,
        )
            .into_response(),
        Ok(None) => error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            format!("No image available for {}", entity_id),
        ),
        Err(e) => engine_error_response(e),
    }
}

/// Reject commands for entities that are not known thermostats
fn require_thermostat(state: &AppState, entity_id: &str) -> Result<(), Response> {
    if state.engine.state_snapshot().thermostats.contains_key(entity_id) {
        Ok(())
    } else {
        Err(error_response(
            StatusCode::NOT_FOUND,
            format!("Unknown thermostat: {}", entity_id),
        ))
    }
}

/// Handler for POST /v1/climate/:entity_id/temperature
#[tracing::instrument(skip(state))]
async fn set_temperature(
    State(state): State<Arc<AppState>>,
    Path(entity_id): Path<String>,
    Json(request): Json<TemperatureRequest>,
) -> Response {
    if let Err(response) = require_thermostat(&state, &entity_id) {
        return response;
    }

    match state.engine.set_temperature(entity_id, request.temperature) {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(e) => engine_error_response(e),
    }
}

/// Handler for POST /v1/climate/:entity_id/away
#[tracing::instrument(skip(state))]
async fn set_away_mode(
    State(state): State<Arc<AppState>>,
    Path(entity_id): Path<String>,
    Json(request): Json<AwayModeRequest>,
) -> Response {
    if let Err(response) = require_thermostat(&state, &entity_id) {
        return response;
    }

    match state.engine.set_away_mode(entity_id, request.on) {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(e) => engine_error_response(e),
    }
}

/// Create the API router with all endpoints
fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/ping", get(ping))
        .route("/v1/info", get(info))
        .route("/v1/states", get(states))
        .route("/v1/cameras/:entity_id/image", get(camera_image))
        .route("/v1/climate/:entity_id/temperature", post(set_temperature))
        .route("/v1/climate/:entity_id/away", post(set_away_mode))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

/// Start the HTTP API server
///
/// Binds to `listen:port` and serves the API until `shutdown_rx` fires.
/// Returns an error only if the server fails to start or crashes.
pub async fn serve(
    engine: Arc<Engine>,
    listen: String,
    port: u16,
    shutdown_rx: tokio::sync::oneshot::Receiver<()>,
) -> anyhow::Result<()> {
    let version = env!("CARGO_PKG_VERSION");

    let state = Arc::new(AppState { version, engine });
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", listen, port)
        .parse()
        .with_context(|| format!("Invalid API listen address {}:{}", listen, port))?;
    tracing::info!("Starting HTTP API server on {}", addr);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_rx.await.ok();
            tracing::info!("HTTP API server shutting down gracefully");
        })
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use tokio::sync::mpsc;
    use tower::ServiceExt;

    use super::*;
    use crate::engine::CameraState;
    use crate::engine::FromIntegrationMessage;
    use crate::engine::FromIntegrationSender;
    use crate::engine::Integration;
    use crate::engine::Operation;
    use crate::engine::ThermostatState;
    use crate::engine::ToIntegrationMessage;

    /// Integration serving a fixed image and recording thermostat commands
    struct StubIntegration {
        image: Option<Vec<u8>>,
        commands: mpsc::UnboundedSender<String>,
    }

    #[async_trait]
    impl Integration for StubIntegration {
        fn name(&self) -> &str {
            "stub"
        }

        async fn setup(&mut self, _tx: FromIntegrationSender) -> Result<(), Box<dyn Error + Send>> {
            Ok(())
        }

        async fn handle_message(
            &mut self,
            msg: ToIntegrationMessage,
        ) -> Result<(), Box<dyn Error + Send>> {
            match msg {
                ToIntegrationMessage::CameraImage { reply, .. } => {
                    let _ = reply.send(self.image.clone());
                }
                ToIntegrationMessage::SetTemperature {
                    entity_id,
                    temperature,
                } => {
                    let _ = self
                        .commands
                        .send(format!("{} temperature {}", entity_id, temperature));
                }
                ToIntegrationMessage::SetAwayMode { entity_id, on } => {
                    let _ = self.commands.send(format!("{} away {}", entity_id, on));
                }
            }
            Ok(())
        }

        async fn shutdown(&mut self) -> Result<(), Box<dyn Error + Send>> {
            Ok(())
        }
    }

    /// Router over an engine owning `climate.hallway` and `camera.backyard`
    fn test_router(image: Option<Vec<u8>>) -> (Router, mpsc::UnboundedReceiver<String>) {
        let mut engine = Engine::new();
        let (commands, rx) = mpsc::unbounded_channel();
        engine.register_integration(
            "stub".to_string(),
            Box::new(StubIntegration { image, commands }),
        );

        for entity_id in ["climate.hallway", "camera.backyard"] {
            engine.handle_event(FromIntegrationMessage::EntityDiscovered {
                entity_id: entity_id.to_string(),
                integration_name: "stub".to_string(),
            });
        }
        engine.handle_event(FromIntegrationMessage::ThermostatStateChanged {
            entity_id: "climate.hallway".to_string(),
            state: ThermostatState {
                name: "Hallway".to_string(),
                current_temperature: Some(72.5),
                target_temperature: Some(76.0),
                operation: Operation::Cool,
                away_mode: false,
                unit: "°F".to_string(),
                fan: Some("Auto".to_string()),
                mode: Some("Cool".to_string()),
            },
        });
        engine.handle_event(FromIntegrationMessage::CameraStateChanged {
            entity_id: "camera.backyard".to_string(),
            state: CameraState {
                name: "Backyard".to_string(),
                device_id: "A1".to_string(),
                image_url: None,
            },
        });

        let state = Arc::new(AppState {
            version: "test",
            engine: Arc::new(engine),
        });
        (create_router(state), rx)
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_bytes(response: Response) -> Vec<u8> {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    #[tokio::test]
    async fn test_ping() {
        let (router, _rx) = test_router(None);

        let response = router.oneshot(get_request("/v1/ping")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_bytes(response).await, br#"{"status":"ok"}"#);
    }

    #[tokio::test]
    async fn test_info_reports_version() {
        let (router, _rx) = test_router(None);

        let response = router.oneshot(get_request("/v1/info")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(body["version"], "test");
    }

    #[tokio::test]
    async fn test_states_lists_entities() {
        let (router, _rx) = test_router(None);

        let response = router.oneshot(get_request("/v1/states")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(body["thermostats"]["climate.hallway"]["target_temperature"], 76.0);
        assert_eq!(body["thermostats"]["climate.hallway"]["operation"], "cool");
        assert_eq!(body["cameras"]["camera.backyard"]["device_id"], "A1");
    }

    #[tokio::test]
    async fn test_camera_image_served_as_jpeg() {
        let (router, _rx) = test_router(Some(b"jpeg bytes".to_vec()));

        let response = router
            .oneshot(get_request("/v1/cameras/camera.backyard/image"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/jpeg");
        assert_eq!(body_bytes(response).await, b"jpeg bytes");
    }

    #[tokio::test]
    async fn test_camera_without_image_is_unavailable() {
        let (router, _rx) = test_router(None);

        let response = router
            .oneshot(get_request("/v1/cameras/camera.backyard/image"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_unknown_camera_is_not_found() {
        let (router, _rx) = test_router(Some(b"jpeg".to_vec()));

        let response = router
            .clone()
            .oneshot(get_request("/v1/cameras/camera.nowhere/image"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        // Thermostats are not cameras
        let response = router
            .oneshot(get_request("/v1/cameras/climate.hallway/image"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_set_temperature_is_routed() {
        let (router, mut rx) = test_router(None);

        let response = router
            .oneshot(post_json(
                "/v1/climate/climate.hallway/temperature",
                r#"{"temperature": 74.5}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(rx.recv().await.unwrap(), "climate.hallway temperature 74.5");
    }

    #[tokio::test]
    async fn test_set_away_mode_is_routed() {
        let (router, mut rx) = test_router(None);

        let response = router
            .oneshot(post_json("/v1/climate/climate.hallway/away", r#"{"on": true}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(rx.recv().await.unwrap(), "climate.hallway away true");
    }

    #[tokio::test]
    async fn test_climate_command_for_unknown_entity() {
        let (router, _rx) = test_router(None);

        let response = router
            .oneshot(post_json("/v1/climate/climate.attic/away", r#"{"on": false}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        insta::assert_snapshot!(
            body["error"].as_str().unwrap(),
            @"Unknown thermostat: climate.attic"
        );
    }

    #[tokio::test]
    async fn test_malformed_command_body_is_rejected() {
        let (router, mut rx) = test_router(None);

        let response = router
            .oneshot(post_json(
                "/v1/climate/climate.hallway/temperature",
                r#"{"temperature": "warm"}"#,
            ))
            .await
            .unwrap();

        assert!(response.status().is_client_error());
        assert!(rx.try_recv().is_err());
    }
}
