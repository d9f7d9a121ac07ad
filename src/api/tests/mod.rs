use super::*;
use crate::downloader::test_helpers::{Script, ScriptedExecutor, wait_for_terminal};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use std::time::Duration;
use tower::ServiceExt;


/// Helper to create a test UrlDownloader instance wrapped in Arc
async fn create_test_downloader() -> (Arc<UrlDownloader>, Arc<ScriptedExecutor>, tempfile::TempDir) {
    let (downloader, executor, temp_dir) =
        crate::downloader::test_helpers::create_test_downloader().await;
    (Arc::new(downloader), executor, temp_dir)
}

fn router_for(downloader: &Arc<UrlDownloader>) -> Router {
    create_router(downloader.clone(), downloader.config.clone())
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn server_stops_when_downloader_shuts_down() {
    let (downloader, _executor, _temp_dir) = create_test_downloader().await;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    let server = tokio::spawn(serve(
        listener,
        downloader.clone(),
        downloader.config.clone(),
    ));

    let client = reqwest::Client::new();
    let created: serde_json::Value = client
        .post(format!("http://{address}/tasks"))
        .json(&serde_json::json!({ "urls": ["https://ok.test/a"] }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let id: crate::types::TaskId = created["task_id"].as_str().unwrap().parse().unwrap();
    wait_for_terminal(&downloader, id).await;

    let fetched: serde_json::Value = client
        .get(format!("http://{address}/tasks/{id}"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(fetched["status"], "completed");

    downloader.shutdown().await.unwrap();

    let result = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("server must stop after shutdown")
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn bind_failure_is_reported() {
    let (downloader, _executor, _temp_dir) = create_test_downloader().await;

    let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let mut config = (*downloader.config).clone();
    config.server.api.bind_address = taken.local_addr().unwrap();

    let result = start_api_server(downloader, Arc::new(config)).await;
    assert!(matches!(result, Err(crate::Error::Io(_))));
}

#[tokio::test]
async fn cors_headers_present_when_enabled() {
    let (downloader, _executor, _temp_dir) = create_test_downloader().await;

    let mut config = (*downloader.config).clone();
    config.server.api.cors_enabled = true;
    config.server.api.cors_origins = vec!["*".to_string()];
    let app = create_router(downloader, Arc::new(config));

    let request = Request::builder()
        .uri("/health")
        .header("Origin", "http://localhost:3000")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response
            .headers()
            .contains_key("access-control-allow-origin")
    );
}

#[tokio::test]
async fn cors_restricted_to_listed_origins() {
    let (downloader, _executor, _temp_dir) = create_test_downloader().await;

    let mut config = (*downloader.config).clone();
    config.server.api.cors_origins = vec!["https://dashboard.test".to_string()];
    let app = create_router(downloader, Arc::new(config));

    let allowed = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/health")
                .header("Origin", "https://dashboard.test")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(
        allowed.headers().get("access-control-allow-origin").unwrap(),
        "https://dashboard.test"
    );

    let other = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .header("Origin", "https://elsewhere.test")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert!(!other.headers().contains_key("access-control-allow-origin"));
}

#[tokio::test]
async fn cors_disabled_adds_no_headers() {
    let (downloader, _executor, _temp_dir) = create_test_downloader().await;

    let mut config = (*downloader.config).clone();
    config.server.api.cors_enabled = false;
    let app = create_router(downloader, Arc::new(config));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .header("Origin", "http://localhost:3000")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert!(
        !response
            .headers()
            .contains_key("access-control-allow-origin")
    );
}

#[tokio::test]
async fn swagger_ui_follows_config() {
    let (downloader, _executor, _temp_dir) = create_test_downloader().await;

    let enabled = router_for(&downloader)
        .oneshot(get("/swagger-ui/index.html"))
        .await
        .unwrap();
    assert_eq!(enabled.status(), StatusCode::OK);

    let mut config = (*downloader.config).clone();
    config.server.api.swagger_ui = false;
    let disabled = create_router(downloader, Arc::new(config))
        .oneshot(get("/swagger-ui/index.html"))
        .await
        .unwrap();
    assert_eq!(disabled.status(), StatusCode::NOT_FOUND);
}
