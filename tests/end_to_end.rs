//! End-to-end pipeline tests
//!
//! Real fetcher and Gemini client, pointed at local stub servers standing in
//! for the image host and the generateContent endpoint.

use std::io::Write;
use std::sync::{Arc, Mutex};

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode, Uri};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};

use moderation_relay::config::ModelConfig;
use moderation_relay::media::{FetchConfig, ModelClientHandle, ReferenceFetcher};
use moderation_relay::moderation::{ModerationPipeline, ModerationRequest, PipelineError};

const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10];

#[derive(Clone, Default)]
struct Captured {
    uri: Arc<Mutex<Option<String>>>,
    api_key: Arc<Mutex<Option<String>>>,
    body: Arc<Mutex<Option<Value>>>,
}

async fn spawn(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn spawn_image_host() -> String {
    let app = Router::new()
        .route(
            "/protest.png",
            get(|| async { ([(header::CONTENT_TYPE, "image/png")], Bytes::from_static(JPEG)) }),
        )
        .route("/gone.jpg", get(|| async { StatusCode::NOT_FOUND }));
    spawn(app).await
}

async fn model_handler(
    State((captured, reply)): State<(Captured, Value)>,
    uri: Uri,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    *captured.uri.lock().unwrap() = Some(uri.path().to_string());
    *captured.api_key.lock().unwrap() = headers
        .get("x-goog-api-key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    *captured.body.lock().unwrap() = Some(body);
    Json(reply)
}

async fn spawn_model(reply: Value) -> (String, Captured) {
    let captured = Captured::default();
    let app = Router::new()
        .fallback(model_handler)
        .with_state((captured.clone(), reply));
    (spawn(app).await, captured)
}

fn text_reply(text: &str) -> Value {
    json!({
        "candidates": [{
            "content": { "role": "model", "parts": [{ "text": text }] },
            "finishReason": "STOP"
        }],
        "usageMetadata": { "promptTokenCount": 300, "candidatesTokenCount": 80 }
    })
}

fn pipeline(model_base: &str) -> ModerationPipeline {
    let config = ModelConfig {
        model_name: Some("gemini-test".to_string()),
        api_key: Some("test-key".to_string()),
        base_url: model_base.to_string(),
        ..ModelConfig::default()
    };
    // Stub hosts live on loopback, and one test reads a temp file.
    let fetcher = ReferenceFetcher::new(&FetchConfig {
        allow_local: true,
        allow_private_hosts: true,
        ..FetchConfig::default()
    })
    .unwrap();
    ModerationPipeline::new(Arc::new(fetcher), ModelClientHandle::initialize(&config))
}

const VERDICT_TEXT: &str = "```json\n{\"details\":\"People marching with banners.\",\"category\":\"Protest\",\"isViolence\":false,\"isPornographic\":false,\"isProfanity\":false,\"isLikelyAI_Score\":0.1,\"isLikelyAI_Explanation\":\"Consistent shadows.\"}\n```";

#[tokio::test]
async fn test_remote_image_round_trip() {
    let images = spawn_image_host().await;
    let (model_base, captured) = spawn_model(text_reply(VERDICT_TEXT)).await;

    let verdict = pipeline(&model_base)
        .process(&ModerationRequest::new(format!("{images}/protest.png")))
        .await
        .unwrap();
    assert_eq!(verdict.category, "Protest");
    assert!(!verdict.is_flagged());

    assert_eq!(
        captured.uri.lock().unwrap().as_deref(),
        Some("/v1beta/models/gemini-test:generateContent")
    );
    assert_eq!(captured.api_key.lock().unwrap().as_deref(), Some("test-key"));

    let body = captured.body.lock().unwrap().clone().unwrap();
    let parts = body["contents"][0]["parts"].as_array().unwrap();
    assert_eq!(parts.len(), 2);
    assert_eq!(parts[0]["inlineData"]["mimeType"], "image/png");
    assert!(parts[1]["text"]
        .as_str()
        .unwrap()
        .starts_with("Return a JSON object with the following fields:"));
}

#[tokio::test]
async fn test_local_file_uses_extension_mime() {
    let (model_base, captured) = spawn_model(text_reply(VERDICT_TEXT)).await;
    let mut file = tempfile::Builder::new().suffix(".webp").tempfile().unwrap();
    file.write_all(JPEG).unwrap();

    pipeline(&model_base)
        .process(&ModerationRequest::new(file.path().to_string_lossy()))
        .await
        .unwrap();

    let body = captured.body.lock().unwrap().clone().unwrap();
    assert_eq!(
        body["contents"][0]["parts"][0]["inlineData"]["mimeType"],
        "image/webp"
    );
}

#[tokio::test]
async fn test_missing_image_never_calls_model() {
    let images = spawn_image_host().await;
    let (model_base, captured) = spawn_model(text_reply(VERDICT_TEXT)).await;

    let err = pipeline(&model_base)
        .process(&ModerationRequest::new(format!("{images}/gone.jpg")))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::FetchFailed(_)), "{err:?}");
    assert!(captured.uri.lock().unwrap().is_none());
}

#[tokio::test]
async fn test_blocked_prompt_surfaces_feedback() {
    let images = spawn_image_host().await;
    let (model_base, _) = spawn_model(json!({
        "promptFeedback": { "blockReason": "SAFETY" }
    }))
    .await;

    let err = pipeline(&model_base)
        .process(&ModerationRequest::new(format!("{images}/protest.png")))
        .await
        .unwrap_err();
    match err {
        PipelineError::ModelBlocked(feedback) => assert!(feedback.contains("SAFETY")),
        other => panic!("expected ModelBlocked, got {other:?}"),
    }
}

#[tokio::test]
async fn test_prose_reply_keeps_raw_text() {
    let images = spawn_image_host().await;
    let (model_base, _) = spawn_model(text_reply("Sorry, I can't describe this image.")).await;

    let err = pipeline(&model_base)
        .process(&ModerationRequest::new(format!("{images}/protest.png")))
        .await
        .unwrap_err();
    assert_eq!(
        err.raw_response(),
        Some("Sorry, I can't describe this image.")
    );
}

#[tokio::test]
async fn test_missing_api_key_makes_model_unavailable() {
    let config = ModelConfig {
        model_name: Some("gemini-test".to_string()),
        ..ModelConfig::default()
    };
    let fetcher = ReferenceFetcher::new(&FetchConfig::default()).unwrap();
    let pipeline =
        ModerationPipeline::new(Arc::new(fetcher), ModelClientHandle::initialize(&config));
    assert!(!pipeline.model_ready());

    let err = pipeline
        .process(&ModerationRequest::new("./nowhere.jpg"))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::ModelUnavailable(_)), "{err:?}");
}
