use super::*;
use axum::{body, body::Body, http::Request};
use shared::domain::CategoryId;
use tower::ServiceExt;

fn test_app(max_upload_bytes: usize) -> Router {
    build_router(Arc::new(AppState {
        catalog: Catalog::builtin(),
        engine: Arc::new(MockInferenceEngine::seeded(11).with_latency(Duration::ZERO)),
        max_upload_bytes,
    }))
}

fn predict_request(body: &serde_json::Value) -> Request<Body> {
    let raw = body.to_string();
    Request::post("/predict")
        .header("content-type", "application/json")
        .header("content-length", raw.len())
        .body(Body::from(raw))
        .expect("request")
}

fn predict_body(category: &str, media_type: &str, image: &[u8]) -> serde_json::Value {
    serde_json::json!({
        "category_id": category,
        "file_name": "scan.jpg",
        "media_type": media_type,
        "image_b64": STANDARD.encode(image),
    })
}

async fn read_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
    let body = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&body).expect("json")
}

#[tokio::test]
async fn healthz_reports_ok() {
    let request = Request::get("/healthz")
        .body(Body::empty())
        .expect("request");
    let response = test_app(1024).oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let body = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    assert_eq!(body.as_ref(), b"ok");
}

#[tokio::test]
async fn categories_lists_builtin_catalog() {
    let request = Request::get("/categories")
        .body(Body::empty())
        .expect("request");
    let response = test_app(1024).oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let dto: CategoryListResponse = read_json(response).await;
    assert!(dto
        .categories
        .iter()
        .any(|category| category.id == CategoryId::new("kidney-stone")));
}

#[tokio::test]
async fn predict_returns_well_formed_result() {
    let response = test_app(1024)
        .oneshot(predict_request(&predict_body(
            "kidney-stone",
            "image/jpeg",
            &[0xFF, 0xD8, 0xFF, 0xE0],
        )))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let dto: PredictResponse = read_json(response).await;
    assert!((0.0..=1.0).contains(&dto.confidence));
    assert!(!dto.recommendations.is_empty());
    let result = dto.into_detection_result().expect("valid result");
    if !result.detected() {
        assert!(result.size().is_none());
        assert!(result.location().is_none());
    }
}

#[tokio::test]
async fn predict_rejects_unknown_category() {
    let response = test_app(1024)
        .oneshot(predict_request(&predict_body(
            "retina-scan",
            "image/png",
            b"png",
        )))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let err: ApiError = read_json(response).await;
    assert_eq!(err.code, ErrorCode::Validation);
    assert!(err.message.contains("retina-scan"));
}

#[tokio::test]
async fn predict_rejects_non_image_media_type() {
    let response = test_app(1024)
        .oneshot(predict_request(&predict_body(
            "kidney-stone",
            "application/pdf",
            b"%PDF-1.4",
        )))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let err: ApiError = read_json(response).await;
    assert_eq!(err.message, "unsupported type: application/pdf");
}

#[tokio::test]
async fn predict_rejects_bad_base64_and_empty_images() {
    let app = test_app(1024);

    let mut bad = predict_body("kidney-stone", "image/png", b"x");
    bad["image_b64"] = serde_json::Value::String("***not base64***".to_string());
    let response = app
        .clone()
        .oneshot(predict_request(&bad))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .oneshot(predict_request(&predict_body("kidney-stone", "image/png", b"")))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let err: ApiError = read_json(response).await;
    assert_eq!(err.message, "image body cannot be empty");
}

#[tokio::test]
async fn predict_rejects_decoded_image_over_limit() {
    let response = test_app(1024)
        .oneshot(predict_request(&predict_body(
            "kidney-stone",
            "image/png",
            &vec![7u8; 2048],
        )))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);

    let err: ApiError = read_json(response).await;
    assert_eq!(err.code, ErrorCode::Validation);
}

#[tokio::test]
async fn oversized_request_body_is_refused_before_parsing() {
    let raw = "x".repeat(transport_limit(1024) + 1);
    let request = Request::post("/predict")
        .header("content-type", "application/json")
        .header("content-length", raw.len())
        .body(Body::from(raw))
        .expect("request");
    let response = test_app(1024).oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn engine_failures_map_to_api_errors() {
    let app = build_router(Arc::new(AppState {
        catalog: Catalog::builtin(),
        engine: Arc::new(MockInferenceEngine::failing("model crashed").with_latency(Duration::ZERO)),
        max_upload_bytes: 1024,
    }));
    let response = app
        .oneshot(predict_request(&predict_body(
            "kidney-stone",
            "image/png",
            b"png",
        )))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let err: ApiError = read_json(response).await;
    assert_eq!(err.code, ErrorCode::Internal);
    assert!(err.message.contains("model crashed"));

    let (status, Json(err)) = analysis_failure(&AnalysisError::Timeout(Duration::from_secs(1)));
    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(err.code, ErrorCode::Timeout);
}

#[test]
fn transport_limit_covers_base64_expansion() {
    let encoded = STANDARD.encode(vec![0u8; 1024]);
    assert!(encoded.len() + 200 <= transport_limit(1024));
}
