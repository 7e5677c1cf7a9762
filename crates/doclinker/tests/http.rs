use std::sync::Arc;

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use tower::util::ServiceExt;

use doclinker::handlers::{AppState, router};
use doclinker::Linker;
use doclinker_types::{CatalogRecord, ItemId, TermRecord};

fn make_state() -> AppState {
    let terms = vec![TermRecord {
        id: Some(ItemId::Int(1)),
        title: Some("Центральный банк (ЦБ)".into()),
    }];
    let catalog = vec![
        CatalogRecord {
            number: Some("12".into()),
            date: Some("01.02.2020".into()),
            id: Some(ItemId::Int(7)),
        },
        CatalogRecord {
            number: Some("12".into()),
            date: None,
            id: Some(ItemId::Int(9)),
        },
    ];
    let normalizer = Arc::new(|word: &str| word.to_lowercase());
    let linker = Linker::from_records(&terms, &catalog, normalizer).unwrap();
    AppState {
        linker: Arc::new(linker),
        max_body_bytes: 64 * 1024,
    }
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let body_bytes = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
    serde_json::from_slice(&body_bytes).unwrap()
}

#[tokio::test]
async fn healthz_ok() {
    let app = router(make_state());
    let response = app
        .oneshot(
            Request::builder()
                .uri("/healthz")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn link_endpoint_returns_annotated_html() {
    let app = router(make_state());
    let response = app
        .oneshot(post_json(
            "/v1/link",
            serde_json::json!({"html": "<p>ЦБ: письмо № 12 от 01.02.2020</p>"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["glossary_links"], 1);
    assert_eq!(body["reference_links"], 1);
    let html = body["html"].as_str().unwrap();
    assert!(html.contains(r#"<span class="abbr" data-glossary-item-id="1">ЦБ</span>"#));
    assert!(html.contains(r#"href="/library/e-library/document/7">№ 12 от 01.02.2020</a>"#));
}

#[tokio::test]
async fn link_endpoint_honours_pass_switches() {
    let app = router(make_state());
    let response = app
        .oneshot(post_json(
            "/v1/link",
            serde_json::json!({"html": "ЦБ № 12", "glossary": false}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["glossary_links"], 0);
    assert!(body["html"].as_str().unwrap().starts_with("ЦБ <a "));
}

#[tokio::test]
async fn link_endpoint_rejects_empty_html() {
    let app = router(make_state());
    let response = app
        .oneshot(post_json("/v1/link", serde_json::json!({"html": "  "})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert!(body["error"].as_str().unwrap_or_default().contains("html"));
}

#[tokio::test]
async fn link_endpoint_rejects_missing_body_element() {
    let app = router(make_state());
    let response = app
        .oneshot(post_json(
            "/v1/link",
            serde_json::json!({"html": "<p>ЦБ</p>", "body_only": true}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert!(body["error"].as_str().unwrap_or_default().contains("body"));
}

#[tokio::test]
async fn references_endpoint_lists_detections() {
    let app = router(make_state());
    let response = app
        .oneshot(post_json(
            "/v1/references",
            serde_json::json!({"text": "№ 12 от 01.02.2020, № 40, пункт 2.3"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    let items = body.as_array().unwrap();
    assert_eq!(items.len(), 3);

    assert_eq!(items[0]["kind"], "chapter");
    assert_eq!(items[0]["chapter"], "2_3");
    assert_eq!(items[1]["number"], "40");
    assert!(items[1]["resolved_id"].is_null());
    assert_eq!(items[2]["family"], "regular_inverse");
    assert_eq!(items[2]["date"], "2020-02-01");
    assert_eq!(items[2]["resolved_id"], 7);
    assert_eq!(items[2]["start"], 0);
}

#[tokio::test]
async fn references_endpoint_handles_long_texts() {
    let app = router(make_state());
    let text = "письмо № 12 от 01.02.2020; ".repeat(1_000);
    let response = app
        .oneshot(post_json("/v1/references", serde_json::json!({"text": text})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    let items = body.as_array().unwrap();
    assert_eq!(items.len(), 1_000);
    assert!(items.iter().all(|item| item["resolved_id"] == 7));
}

#[tokio::test]
async fn oversized_bodies_are_refused() {
    let mut state = make_state();
    state.max_body_bytes = 16;
    let app = router(state);
    let response = app
        .oneshot(post_json(
            "/v1/link",
            serde_json::json!({"html": "x".repeat(64)}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}
