/// HTTP front controller: REST snapshots, model switch, manual restart, and
/// the per-observer SSE stream.
///
/// Each observer connection gets its own poll task owning its own tail
/// state; the task dies with the connection and never touches other
/// observers' delivery.
use crate::config::MonitorConfig;
use crate::hub::{Hub, StreamMessage};
use crate::models;
use crate::snapshot;
use crate::tailer::{log_file_path, LogTailer};
use crate::watchdog::{RestartAction, ShellRestart, Watchdog};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::Html;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;
use tower_http::cors::CorsLayer;

/// Per-observer tail poll cadence.
const POLL_INTERVAL: Duration = Duration::from_secs(1);

static DASHBOARD: &str = include_str!("../assets/index.html");

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<MonitorConfig>,
    pub hub: Arc<Hub>,
    pub watchdog: Arc<Watchdog>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(dashboard))
        .route("/api/session", get(api_session))
        .route("/api/messages", get(api_messages))
        .route("/api/models", get(api_models))
        .route("/api/model/switch", post(api_model_switch))
        .route("/api/system/restart", post(api_system_restart))
        .route("/api/events", get(api_events))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

pub async fn run(config: MonitorConfig) -> Result<(), Box<dyn std::error::Error>> {
    let config = Arc::new(config);
    let hub = Arc::new(Hub::new());
    let action: Box<dyn RestartAction> = Box::new(ShellRestart {
        command: config.restart_cmd.clone(),
    });
    let watchdog = Arc::new(Watchdog::new(hub.clone(), action));

    let app = router(AppState {
        config: config.clone(),
        hub,
        watchdog,
    });

    let addr = format!("127.0.0.1:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(
        addr = %listener.local_addr()?,
        log = %log_file_path(&config.log_dir).display(),
        "clawmon listening"
    );
    axum::serve(listener, app).await?;
    Ok(())
}

async fn dashboard() -> Html<&'static str> {
    Html(DASHBOARD)
}

async fn api_session(State(state): State<AppState>) -> Json<snapshot::SessionInfo> {
    Json(snapshot::read_sessions(&state.config.sessions_file()))
}

async fn api_messages(State(state): State<AppState>) -> Json<snapshot::MessageFeed> {
    Json(snapshot::read_messages(&state.config.sessions_dir()))
}

async fn api_models(State(state): State<AppState>) -> Json<models::ModelCatalog> {
    Json(models::read_models(&state.config.gateway_config()))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SwitchRequest {
    model_id: String,
}

async fn api_model_switch(
    State(state): State<AppState>,
    body: Result<Json<SwitchRequest>, JsonRejection>,
) -> (StatusCode, Json<Value>) {
    let Json(request) = match body {
        Ok(json) => json,
        Err(rejection) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"success": false, "error": rejection.to_string()})),
            );
        }
    };

    match models::switch_primary_model(&state.config.gateway_config(), &request.model_id) {
        Ok(old_model) => {
            // Privileged: a user-initiated switch always restarts exactly
            // once, even right after a generic watchdog restart.
            state
                .watchdog
                .trigger_restart_privileged(&format!("模型切换: {}", request.model_id));
            (
                StatusCode::OK,
                Json(json!({
                    "success": true,
                    "oldModel": old_model,
                    "newModel": request.model_id,
                    "restarted": true,
                })),
            )
        }
        Err(e) => (
            StatusCode::OK,
            Json(json!({"success": false, "error": e.to_string()})),
        ),
    }
}

async fn api_system_restart(State(state): State<AppState>) -> Json<Value> {
    state.watchdog.trigger_restart("用户手动请求重启");
    Json(json!({"success": true, "message": "Restart triggered"}))
}

/// One observer: subscribe to the hub, push the initial snapshots, spawn the
/// poll task, and stream the channel out as SSE.
async fn api_events(
    State(state): State<AppState>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, axum::Error>>> {
    let (tx, rx) = state.hub.subscribe();
    tracing::info!(observers = state.hub.observer_count(), "observer connected");

    let _ = tx.send(StreamMessage::Session(snapshot::read_sessions(
        &state.config.sessions_file(),
    )));
    let _ = tx.send(StreamMessage::Messages(snapshot::read_messages(
        &state.config.sessions_dir(),
    )));

    tokio::spawn(observe(state.config.clone(), state.watchdog.clone(), tx));

    let stream = UnboundedReceiverStream::new(rx).map(|msg| Event::default().json_data(&msg));
    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// The observer's recurring tick: tail the log, feed the watchdog, refresh
/// the session snapshot. Exits as soon as the observer's channel closes.
async fn observe(config: Arc<MonitorConfig>, watchdog: Arc<Watchdog>, tx: UnboundedSender<StreamMessage>) {
    let mut tailer = LogTailer::new(config.log_dir.clone());

    // Replay history without feeding the watchdog: these lines were already
    // counted when they first appeared.
    for event in tailer.attach() {
        if tx.send(StreamMessage::Log(event)).is_err() {
            return;
        }
    }

    let mut ticker = tokio::time::interval(POLL_INTERVAL);
    loop {
        ticker.tick().await;
        for event in tailer.poll() {
            watchdog.check(&event);
            if tx.send(StreamMessage::Log(event)).is_err() {
                tracing::info!("observer disconnected");
                return;
            }
        }
        let session = snapshot::read_sessions(&config.sessions_file());
        if tx.send(StreamMessage::Session(session)).is_err() {
            tracing::info!("observer disconnected");
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;
    use tower::ServiceExt;

    struct CountingRestart(Arc<AtomicUsize>);

    impl RestartAction for CountingRestart {
        fn restart(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn test_app(home: &TempDir) -> (Router, Arc<AtomicUsize>) {
        let config = Arc::new(MonitorConfig {
            port: 0,
            home: home.path().to_path_buf(),
            log_dir: home.path().join("logs"),
            restart_cmd: "true".to_string(),
        });
        let hub = Arc::new(Hub::new());
        let restarts = Arc::new(AtomicUsize::new(0));
        let watchdog = Arc::new(Watchdog::new(
            hub.clone(),
            Box::new(CountingRestart(restarts.clone())),
        ));
        let app = router(AppState {
            config,
            hub,
            watchdog,
        });
        (app, restarts)
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let home = TempDir::new().unwrap();
        let (app, _) = test_app(&home);
        let response = app
            .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_dashboard_serves_html() {
        let home = TempDir::new().unwrap();
        let (app, _) = test_app(&home);
        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(std::str::from_utf8(&bytes).unwrap().contains("<html"));
    }

    #[tokio::test]
    async fn test_api_session_empty_when_no_registry() {
        let home = TempDir::new().unwrap();
        let (app, _) = test_app(&home);
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/session")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({"sessions": []}));
    }

    #[tokio::test]
    async fn test_api_models_reads_gateway_config() {
        let home = TempDir::new().unwrap();
        std::fs::write(
            home.path().join("openclaw.json"),
            r#"{"models":{"providers":{"p":{"models":[{"id":"m"}]}}},
                "agents":{"defaults":{"model":{"primary":"p/m"}}}}"#,
        )
        .unwrap();
        let (app, _) = test_app(&home);
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/models")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["currentPrimary"], "p/m");
        assert_eq!(body["models"][0]["id"], "p/m");
    }

    #[tokio::test]
    async fn test_model_switch_bad_body_is_400() {
        let home = TempDir::new().unwrap();
        let (app, restarts) = test_app(&home);
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/model/switch")
                    .header("content-type", "application/json")
                    .body(Body::from("{not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(restarts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_model_switch_rewrites_config_and_restarts() {
        let home = TempDir::new().unwrap();
        std::fs::write(
            home.path().join("openclaw.json"),
            r#"{"agents":{"defaults":{"model":{"primary":"old/model"}}}}"#,
        )
        .unwrap();
        let (app, restarts) = test_app(&home);

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/model/switch")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"modelId":"new/model"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["oldModel"], "old/model");
        assert_eq!(body["newModel"], "new/model");
        assert_eq!(body["restarted"], true);
        assert_eq!(restarts.load(Ordering::SeqCst), 1);

        let rewritten = std::fs::read_to_string(home.path().join("openclaw.json")).unwrap();
        assert!(rewritten.contains("new/model"));
    }

    #[tokio::test]
    async fn test_model_switch_fires_even_inside_cooldown() {
        let home = TempDir::new().unwrap();
        std::fs::write(home.path().join("openclaw.json"), "{}").unwrap();
        let (app, restarts) = test_app(&home);

        // A manual restart opens the cooldown window...
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/system/restart")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(restarts.load(Ordering::SeqCst), 1);

        // ...but an explicit model switch still restarts.
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/model/switch")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"modelId":"p/m"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["restarted"], true);
        assert_eq!(restarts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_model_switch_missing_config_reports_error() {
        let home = TempDir::new().unwrap();
        let (app, restarts) = test_app(&home);
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/model/switch")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"modelId":"p/m"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().contains("failed to read"));
        // A failed switch must not restart the gateway.
        assert_eq!(restarts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_manual_restart_respects_cooldown() {
        let home = TempDir::new().unwrap();
        let (app, restarts) = test_app(&home);
        for _ in 0..3 {
            let response = app
                .clone()
                .oneshot(
                    Request::builder()
                        .method("POST")
                        .uri("/api/system/restart")
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            let body = body_json(response).await;
            assert_eq!(body["success"], true);
        }
        // Only the first one fires inside the cooldown window.
        assert_eq!(restarts.load(Ordering::SeqCst), 1);
    }
}
