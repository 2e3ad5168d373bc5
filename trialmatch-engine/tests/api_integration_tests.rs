//! HTTP API over an in-memory database

mod helpers;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use helpers::{record, seed, test_state, FakeEmbeddings};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::util::ServiceExt;
use trialmatch_engine::{build_router, AppState};
use uuid::Uuid;

async fn send(state: &AppState, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string())),
        None => request.body(Body::empty()),
    }
    .unwrap();

    let response = build_router(state.clone()).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

#[tokio::test]
async fn health_reports_module() {
    let state = test_state(FakeEmbeddings::new(2)).await;
    let (status, body) = send(&state, "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "trialmatch-engine");
    assert_eq!(body["pending_reviews"], 0);
}

#[tokio::test]
async fn resolve_then_fetch_status() {
    let state = test_state(FakeEmbeddings::new(2)).await;
    seed(&state.db, &[record("ABC-101", "A study of drug X in adults", None, None)]).await;
    let job = Uuid::new_v4();

    let (status, body) = send(
        &state,
        "POST",
        "/matching/resolve",
        Some(json!({
            "processing_job_id": job,
            "source_file_path": "/incoming/abc.pdf",
            "protocol_number": "ABC-101",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["review_status"], "approved");

    let (status, body) = send(&state, "GET", &format!("/matching/status/{}", job), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["processing_job_id"], job.to_string());

    let (status, body) = send(&state, "GET", &format!("/matching/status/{}", Uuid::new_v4()), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn reject_requires_reviewer() {
    let state = test_state(FakeEmbeddings::new(2)).await;
    let (status, _) = send(
        &state,
        "POST",
        &format!("/matching/{}/reject", Uuid::new_v4()),
        Some(json!({ "reviewer_id": "" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn review_item_lifecycle_over_http() {
    let state = test_state(FakeEmbeddings::new(2)).await;
    let job = Uuid::new_v4();

    let (status, item) = send(
        &state,
        "POST",
        "/review/items",
        Some(json!({
            "job_id": job,
            "review_type": "trial_matching",
            "priority": "high",
            "reasons": ["Low confidence match: 0.65"],
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = item["id"].as_str().unwrap().to_string();

    let (status, queue) = send(&state, "GET", "/review/queue?priority=high", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(queue["statistics"]["total_items"], 1);
    assert_eq!(queue["queue"][0]["priority"], "high");
    assert_eq!(queue["queue"][0]["items"][0]["id"], id.as_str());

    let assign = format!("/review/items/{}/assign", id);
    let (status, _) = send(&state, "POST", &assign, Some(json!({ "reviewer_id": "alice" }))).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = send(&state, "POST", &assign, Some(json!({ "reviewer_id": "bob" }))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "CONFLICT");

    let (status, done) = send(
        &state,
        "POST",
        &format!("/review/items/{}/complete", id),
        Some(json!({ "reviewer_id": "alice", "decision": "escalated", "notes": "second opinion" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(done["item"]["status"], "escalated");
    assert_eq!(done["escalation"]["priority"], "critical");

    let (status, metrics) = send(&state, "GET", "/review/metrics", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(metrics["total_reviews"], 1);
    assert_eq!(metrics["pending"]["critical"], 1);

    let (status, dashboard) = send(&state, "GET", "/review/reviewers/alice/dashboard", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(dashboard["statistics"]["total_completed"], 1);
}

#[tokio::test]
async fn unknown_priority_filter_is_bad_request() {
    let state = test_state(FakeEmbeddings::new(2)).await;
    let (status, _) = send(&state, "GET", "/review/queue?priority=urgent", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn job_outcome_is_assessed() {
    let state = test_state(FakeEmbeddings::new(2)).await;
    let (status, body) = send(
        &state,
        "POST",
        "/review/jobs",
        Some(json!({
            "job_id": Uuid::new_v4(),
            "status": "completed",
            "match_confidence": 0.72,
            "match_status": "pending",
            "quality": { "field_coverage_percentage": 80.0, "extraction_confidence": 0.9 },
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["queued"], true);
    assert_eq!(body["review"]["priority"], "medium");
    assert_eq!(body["review"]["review_type"], "trial_matching");
}

#[tokio::test]
async fn similarity_endpoints() {
    let embeddings = FakeEmbeddings::new(2)
        .vector("Age 18 or older", vec![1.0, 0.0])
        .vector("Adults aged 18+", vec![0.95, 0.05]);
    let state = test_state(embeddings).await;

    let (status, body) = send(
        &state,
        "POST",
        "/similarity/compare",
        Some(json!({
            "set_a": [{ "id": "a1", "text": "Age 18 or older" }],
            "set_b": [{ "id": "b1", "text": "Adults aged 18+" }],
            "concept_tag": "eligibility-age",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["matches"].as_array().unwrap().len(), 1);

    let (status, body) = send(
        &state,
        "POST",
        "/similarity/corrections",
        Some(json!({
            "criterion_a": "a1",
            "criterion_b": "b1",
            "action": "separate",
            "similarity": 0.97,
            "concept_tag": "eligibility-age",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let new_threshold = body["new_threshold"].as_f64().unwrap();
    assert!((new_threshold - 0.80).abs() < 1e-9);

    let (status, body) = send(&state, "GET", "/similarity/thresholds/eligibility-age", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!((body["threshold"].as_f64().unwrap() - new_threshold).abs() < 1e-9);

    let (status, _) = send(
        &state,
        "POST",
        "/similarity/corrections",
        Some(json!({
            "criterion_a": "a1",
            "criterion_b": "b1",
            "action": "merge",
            "similarity": 3.0,
            "concept_tag": "eligibility-age",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
