//! Instagram client against a local Graph API / image host stub
//!
//! The stub records every request so tests can check the exact sequence of
//! calls each publishing flow makes.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use libcrosspost::config::Config;
use libcrosspost::factory::ProviderFactory;
use libcrosspost::platforms::instagram::{InstagramClient, InstagramCredentials};
use libcrosspost::platforms::ProviderClient;
use libcrosspost::service::events::EventBus;
use libcrosspost::store::memory::MemoryStore;
use libcrosspost::{CredentialKind, DecodedCredential, PlatformError, PostingService, SocialPlatform};
use serde_json::json;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

type Params = HashMap<String, String>;

#[derive(Default)]
struct Stub {
    requests: Mutex<Vec<(String, Params)>>,
    uploads: AtomicUsize,
    children: AtomicUsize,
    fail_upload: AtomicBool,
    fail_publish: AtomicBool,
    malformed_container: AtomicBool,
}

impl Stub {
    fn record(&self, endpoint: &str, params: Params) {
        self.requests
            .lock()
            .unwrap()
            .push((endpoint.to_string(), params));
    }

    fn requests(&self) -> Vec<(String, Params)> {
        self.requests.lock().unwrap().clone()
    }

    fn endpoints(&self) -> Vec<String> {
        self.requests().into_iter().map(|(e, _)| e).collect()
    }
}

async fn upload(State(stub): State<Arc<Stub>>, Query(mut params): Query<Params>, body: Bytes) -> Response {
    let has_image_field = String::from_utf8_lossy(&body).contains("name=\"image\"");
    params.insert("has_image_field".to_string(), has_image_field.to_string());
    stub.record("upload", params);

    if stub.fail_upload.load(Ordering::SeqCst) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "storage unavailable").into_response();
    }
    let n = stub.uploads.fetch_add(1, Ordering::SeqCst);
    Json(json!({ "data": { "url": format!("https://img.example/{}.jpg", n) } })).into_response()
}

async fn create_media(
    State(stub): State<Arc<Stub>>,
    Path(user): Path<String>,
    Query(params): Query<Params>,
) -> Response {
    let id = if params.get("media_type").map(String::as_str) == Some("CAROUSEL") {
        "carousel-1".to_string()
    } else if params.contains_key("is_carousel_item") {
        format!("child-{}", stub.children.fetch_add(1, Ordering::SeqCst))
    } else {
        "container-1".to_string()
    };
    stub.record(&format!("{}/media", user), params);

    if stub.malformed_container.load(Ordering::SeqCst) {
        return (StatusCode::OK, "<html>oops</html>").into_response();
    }
    Json(json!({ "id": id })).into_response()
}

async fn publish(
    State(stub): State<Arc<Stub>>,
    Path(user): Path<String>,
    Query(params): Query<Params>,
) -> Response {
    stub.record(&format!("{}/media_publish", user), params);

    if stub.fail_publish.load(Ordering::SeqCst) {
        return (
            StatusCode::BAD_REQUEST,
            r#"{"error":{"message":"Media ID is not available"}}"#,
        )
            .into_response();
    }
    Json(json!({ "id": "17999" })).into_response()
}

async fn media(
    State(stub): State<Arc<Stub>>,
    Path(id): Path<String>,
    Query(params): Query<Params>,
) -> Response {
    let fields = params.get("fields").cloned().unwrap_or_default();
    stub.record(&format!("GET {}", id), params);

    if id == "404" {
        return (StatusCode::NOT_FOUND, "{}").into_response();
    }
    match fields.as_str() {
        "permalink" => Json(json!({ "permalink": "https://www.instagram.com/p/abc123/" })).into_response(),
        "like_count,comments_count" => {
            Json(json!({ "like_count": 12, "comments_count": 3, "id": id })).into_response()
        }
        _ => (StatusCode::BAD_REQUEST, "unknown fields").into_response(),
    }
}

async fn spawn_stub() -> (Arc<Stub>, String) {
    let stub = Arc::new(Stub::default());
    let app = Router::new()
        .route("/img/upload", post(upload))
        .route("/v21.0/{user}/media", post(create_media))
        .route("/v21.0/{user}/media_publish", post(publish))
        .route("/v21.0/{id}", get(media))
        .with_state(stub.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (stub, format!("http://{}", addr))
}

fn client(base: &str) -> InstagramClient {
    InstagramClient::new(
        reqwest::Client::new(),
        &format!("{}/v21.0", base),
        &format!("{}/img/upload", base),
        InstagramCredentials::new("token-abc", "1784", "imgbb-key"),
    )
}

fn images(dir: &TempDir, count: usize) -> Vec<PathBuf> {
    (0..count)
        .map(|i| {
            let path = dir.path().join(format!("photo{}.png", i));
            std::fs::write(&path, b"\x89PNG\r\n\x1a\n").unwrap();
            path
        })
        .collect()
}

#[tokio::test]
async fn test_single_image_flow() {
    let (stub, base) = spawn_stub().await;
    let dir = TempDir::new().unwrap();

    let published = client(&base)
        .create_post("One picture", &images(&dir, 1), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(published.platform, SocialPlatform::Instagram);
    assert_eq!(published.channel_id, "1784");
    assert_eq!(published.remote_id, "17999");
    assert_eq!(stub.endpoints(), vec!["upload", "1784/media", "1784/media_publish"]);

    let requests = stub.requests();
    assert_eq!(requests[0].1["key"], "imgbb-key");
    assert_eq!(requests[0].1["has_image_field"], "true");

    let container = &requests[1].1;
    assert_eq!(container["image_url"], "https://img.example/0.jpg");
    assert_eq!(container["caption"], "One picture");
    assert_eq!(container["access_token"], "token-abc");
    assert!(!container.contains_key("is_carousel_item"));
    assert!(!container.contains_key("media_type"));

    assert_eq!(requests[2].1["creation_id"], "container-1");
}

#[tokio::test]
async fn test_carousel_flow() {
    let (stub, base) = spawn_stub().await;
    let dir = TempDir::new().unwrap();

    let published = client(&base)
        .create_post("Three pictures", &images(&dir, 3), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(published.remote_id, "17999");

    assert_eq!(
        stub.endpoints(),
        vec![
            "upload",
            "upload",
            "upload",
            "1784/media",
            "1784/media",
            "1784/media",
            "1784/media",
            "1784/media_publish",
        ]
    );

    let requests = stub.requests();
    for (i, (_, child)) in requests[3..6].iter().enumerate() {
        assert_eq!(child["image_url"], format!("https://img.example/{}.jpg", i));
        assert_eq!(child["is_carousel_item"], "true");
        assert!(!child.contains_key("caption"));
    }

    let carousel = &requests[6].1;
    assert_eq!(carousel["media_type"], "CAROUSEL");
    assert_eq!(carousel["children"], "child-0,child-1,child-2");
    assert_eq!(carousel["caption"], "Three pictures");

    assert_eq!(requests[7].1["creation_id"], "carousel-1");
}

#[tokio::test]
async fn test_upload_failure_stops_before_graph_calls() {
    let (stub, base) = spawn_stub().await;
    stub.fail_upload.store(true, Ordering::SeqCst);
    let dir = TempDir::new().unwrap();

    let err = client(&base)
        .create_post("x", &images(&dir, 2), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, PlatformError::UploadFailed(_)), "{:?}", err);
    assert!(err.to_string().contains("storage unavailable"));
    assert_eq!(stub.endpoints(), vec!["upload"]);
}

#[tokio::test]
async fn test_publish_failure_reports_status_and_body() {
    let (stub, base) = spawn_stub().await;
    stub.fail_publish.store(true, Ordering::SeqCst);
    let dir = TempDir::new().unwrap();

    let err = client(&base)
        .create_post("x", &images(&dir, 1), &CancellationToken::new())
        .await
        .unwrap_err();

    match &err {
        PlatformError::RemoteApi {
            context,
            status,
            body,
        } => {
            assert_eq!(context, "Publish media");
            assert_eq!(*status, 400);
            assert!(body.contains("Media ID is not available"));
        }
        other => panic!("Expected RemoteApi, got {:?}", other),
    }
}

#[tokio::test]
async fn test_malformed_container_response_aborts() {
    let (stub, base) = spawn_stub().await;
    stub.malformed_container.store(true, Ordering::SeqCst);
    let dir = TempDir::new().unwrap();

    let err = client(&base)
        .create_post("x", &images(&dir, 1), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, PlatformError::RemoteApi { status: 200, .. }), "{:?}", err);
    assert!(err.to_string().starts_with("Create media container failed"));
    assert!(!stub.endpoints().iter().any(|e| e.ends_with("media_publish")));
}

#[tokio::test]
async fn test_engagement_stats() {
    let (stub, base) = spawn_stub().await;

    let stats = client(&base)
        .engagement_stats("17999", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(stats.reactions, 12);
    assert_eq!(stats.comments, 3);
    assert_eq!(stats.views, -1);
    assert_eq!(stats.forwards, -1);

    let requests = stub.requests();
    assert_eq!(requests[0].0, "GET 17999");
    assert_eq!(requests[0].1["fields"], "like_count,comments_count");
}

#[tokio::test]
async fn test_post_link_uses_permalink() {
    let (_stub, base) = spawn_stub().await;

    let link = client(&base)
        .post_link("17999", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(link, "https://www.instagram.com/p/abc123/");
}

#[tokio::test]
async fn test_missing_media_is_not_found() {
    let (_stub, base) = spawn_stub().await;

    let result = client(&base)
        .post_link("404", &CancellationToken::new())
        .await;

    assert!(matches!(result, Err(PlatformError::NotFound(_))));
}

#[tokio::test]
async fn test_unreachable_host_is_network_error() {
    let client = InstagramClient::new(
        reqwest::Client::new(),
        "http://127.0.0.1:1/v21.0",
        "http://127.0.0.1:1/img/upload",
        InstagramCredentials::new("t", "1784", "k"),
    );

    let result = client.post_link("1", &CancellationToken::new()).await;
    assert!(matches!(result, Err(PlatformError::Network(_))), "{:?}", result);
}

#[tokio::test]
async fn test_orchestrated_instagram_post_is_recorded() {
    let (stub, base) = spawn_stub().await;
    let dir = TempDir::new().unwrap();

    let mut config = Config::default();
    config.instagram.graph_api_url = format!("{}/v21.0", base);
    config.instagram.image_host_url = format!("{}/img/upload", base);

    let store = Arc::new(MemoryStore::with_credentials(vec![
        DecodedCredential::new(5, CredentialKind::InstagramAccessToken, "token-abc"),
        DecodedCredential::new(5, CredentialKind::InstagramUserId, "1784"),
        DecodedCredential::new(5, CredentialKind::ImageHostApiKey, "imgbb-key"),
    ]));
    let service = PostingService::new(
        store.clone(),
        store.clone(),
        Arc::new(ProviderFactory::new(config.clone()).unwrap()),
        Arc::new(config),
        EventBus::default(),
    );

    let outcome = service
        .create_post(5, "From the orchestrator", &images(&dir, 2), &CancellationToken::new())
        .await;

    assert!(outcome.success, "{}", outcome.message);
    let media = store.all_media();
    assert_eq!(media.len(), 1);
    assert_eq!(media[0].platform, SocialPlatform::Instagram);
    assert_eq!(media[0].channel_id, "1784");
    assert_eq!(media[0].remote_message_id, "17999");
    assert!(stub.endpoints().contains(&"1784/media_publish".to_string()));
}
