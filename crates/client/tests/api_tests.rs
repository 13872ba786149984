//! Integration tests for [`HunyuanApi`] against an in-process fake server.
//!
//! The fake is an `axum` router bound to an ephemeral port that mimics the
//! `/send`, `/status/{uid}`, and `/health` endpoints.

use std::net::SocketAddr;

use assert_matches::assert_matches;
use axum::extract::Path;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use hunyuan3d_client::messages::JobSpec;
use hunyuan3d_client::{ClientError, HunyuanApi, RemoteJobClient, RemoteStatus};
use hunyuan3d_core::generation::GenerationOptions;
use serde_json::{json, Value};

const GLB_BYTES: &[u8] = b"glTF\x02\x00\x00\x00fake-binary-model";

async fn spawn_server(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr: SocketAddr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("fake server");
    });
    format!("http://{addr}")
}

fn happy_router() -> Router {
    Router::new()
        .route(
            "/send",
            post(|Json(body): Json<Value>| async move {
                // Options are flattened next to the image.
                if body.get("image").is_none() || body.get("seed").is_none() {
                    return (StatusCode::BAD_REQUEST, Json(json!({"error": "bad body"})));
                }
                (StatusCode::OK, Json(json!({"uid": "job-123"})))
            }),
        )
        .route(
            "/status/{uid}",
            get(|Path(uid): Path<String>| async move {
                match uid.as_str() {
                    "job-123" => Json(json!({
                        "status": "completed",
                        "model_base64": STANDARD.encode(GLB_BYTES),
                    })),
                    "job-running" => Json(json!({"status": "texturing"})),
                    "job-empty" => Json(json!({"status": "completed"})),
                    "job-garbled" => Json(json!({
                        "status": "completed",
                        "model_base64": "%%% not base64 %%%",
                    })),
                    _ => Json(json!({"status": "error", "message": "worker crashed"})),
                }
            }),
        )
        .route(
            "/health",
            get(|| async { Json(json!({"status": "healthy", "worker_id": "w-1"})) }),
        )
}

fn api() -> HunyuanApi {
    HunyuanApi::new(std::time::Duration::from_secs(5)).expect("build client")
}

fn job() -> JobSpec {
    JobSpec::from_image_bytes(b"png-bytes", GenerationOptions::default())
}

// ---------------------------------------------------------------------------
// Test: happy path
// ---------------------------------------------------------------------------

#[tokio::test]
async fn submit_returns_remote_uid() {
    let base = spawn_server(happy_router()).await;
    let uid = api().submit(&base, &job()).await.expect("submit");
    assert_eq!(uid, "job-123");
}

#[tokio::test]
async fn submit_tolerates_trailing_slash_on_endpoint() {
    let base = spawn_server(happy_router()).await;
    let uid = api()
        .submit(&format!("{base}/"), &job())
        .await
        .expect("submit");
    assert_eq!(uid, "job-123");
}

#[tokio::test]
async fn poll_interprets_status_strings() {
    let base = spawn_server(happy_router()).await;
    let api = api();

    assert_eq!(api.poll(&base, "job-123").await.unwrap(), RemoteStatus::Complete);
    assert_eq!(
        api.poll(&base, "job-running").await.unwrap(),
        RemoteStatus::InProgress {
            status: "texturing".into()
        }
    );
    assert_eq!(
        api.poll(&base, "job-broken").await.unwrap(),
        RemoteStatus::Error {
            message: "worker crashed".into()
        }
    );
}

#[tokio::test]
async fn fetch_decodes_model_payload() {
    let base = spawn_server(happy_router()).await;
    let bytes = api().fetch(&base, "job-123").await.expect("fetch");
    assert_eq!(bytes, GLB_BYTES);
}

#[tokio::test]
async fn health_reports_worker() {
    let base = spawn_server(happy_router()).await;
    let health = api().health(&base).await.expect("health");
    assert!(health.is_healthy());
    assert_eq!(health.worker_id, "w-1");
}

// ---------------------------------------------------------------------------
// Test: failure mapping
// ---------------------------------------------------------------------------

#[tokio::test]
async fn fetch_before_completion_is_not_ready() {
    let base = spawn_server(happy_router()).await;
    let err = api().fetch(&base, "job-running").await.unwrap_err();
    assert_matches!(err, ClientError::NotReady(status) if status == "texturing");
}

#[tokio::test]
async fn fetch_without_model_is_missing_model() {
    let base = spawn_server(happy_router()).await;
    let err = api().fetch(&base, "job-empty").await.unwrap_err();
    assert_matches!(err, ClientError::MissingModel);
}

#[tokio::test]
async fn fetch_with_garbled_payload_is_decode_error() {
    let base = spawn_server(happy_router()).await;
    let err = api().fetch(&base, "job-garbled").await.unwrap_err();
    assert_matches!(err, ClientError::Decode(_));
}

#[tokio::test]
async fn unprocessable_entity_is_parsed_into_details() {
    let router = Router::new().route(
        "/send",
        post(|| async {
            (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({
                    "detail": [{
                        "loc": ["body", "seed"],
                        "msg": "value is not a valid integer",
                        "type": "type_error.integer"
                    }]
                })),
            )
        }),
    );
    let base = spawn_server(router).await;

    let err = api().submit(&base, &job()).await.unwrap_err();
    assert_matches!(err, ClientError::Validation(ref details) if details.len() == 1);
    assert!(err.to_string().contains("value is not a valid integer"));
}

#[tokio::test]
async fn server_error_keeps_status_and_body() {
    let router = Router::new().route(
        "/send",
        post(|| async { (StatusCode::SERVICE_UNAVAILABLE, "queue full") }),
    );
    let base = spawn_server(router).await;

    let err = api().submit(&base, &job()).await.unwrap_err();
    assert_matches!(err, ClientError::Api { status: 503, ref body } if body == "queue full");
}

#[tokio::test]
async fn unreachable_server_is_request_error() {
    // Bind then drop to obtain a port with nothing listening.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = api().health(&format!("http://{addr}")).await.unwrap_err();
    assert_matches!(err, ClientError::Request(_));
}
