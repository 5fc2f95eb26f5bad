use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use cm_common::matching::normalize::RawCompatibility;
use cm_common::matching::{EngineConfig, LocalCatalog, ProviderError};
use cm_common::{GigSummary, TalentProfile, UserSummary};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

const KEY: &str = "test-key";

fn gig(id: &str) -> GigSummary {
    GigSummary {
        id: id.into(),
        title: format!("Gig {id}"),
        status: Some("PUBLISHED".into()),
        ..GigSummary::default()
    }
}

fn score(value: f64) -> RawCompatibility {
    RawCompatibility::ScoreOnly {
        compatibility_score: Some(value),
    }
}

fn catalog() -> LocalCatalog {
    LocalCatalog::new()
        .with_talent(TalentProfile {
            profile_id: "p-1".into(),
            display_name: Some("Ana".into()),
            ..TalentProfile::default()
        })
        .with_gig(gig("a"))
        .with_gig(gig("b"))
        .with_gig(gig("c"))
        .with_scripted_score("a", score(72.0))
        .with_scripted_score("b", score(40.0))
        .with_scripted_score("c", score(95.0))
        .with_user(UserSummary {
            id: "u-1".into(),
            display_name: Some("Lighting Lena".into()),
            ..UserSummary::default()
        })
}

fn no_fallback() -> EngineConfig {
    EngineConfig {
        fallback_to_local: false,
        ..EngineConfig::default()
    }
}

fn app(catalog: LocalCatalog) -> Router {
    cm_api::create_router(cm_api::test_state_with(KEY, catalog, no_fallback()))
}

async fn get(app: Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .uri(uri)
                .header("x-api-key", KEY)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    read(response).await
}

async fn post(app: Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("x-api-key", KEY)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    read(response).await
}

async fn read(response: axum::response::Response) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

fn ids(body: &Value) -> Vec<&str> {
    body["recommendations"]
        .as_array()
        .unwrap()
        .iter()
        .map(|rec| rec["id"].as_str().unwrap())
        .collect()
}

#[tokio::test]
async fn lists_gigs_inside_default_window_best_first() {
    let (status, body) = get(app(catalog()), "/api/profiles/p-1/recommendations").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(ids(&body), vec!["c", "a"]);
    assert_eq!(body["stats"]["total"], 2);
    assert_eq!(body["stats"]["high"], 1);
    assert_eq!(body["stats"]["medium"], 1);
    assert_eq!(body["stats"]["avg_compatibility"], 84);
    assert_eq!(body["band_averages"]["high"], 95);
    assert_eq!(body["band_averages"]["medium"], 72);
    assert!(body["band_averages"]["low"].is_null());
    assert_eq!(body["recommendations"][0]["type"], "gig");
    assert_eq!(body["recommendations"][0]["priority"], "high");
    assert_eq!(body["partial"], false);
    assert_eq!(body["provider"], "local");
}

#[tokio::test]
async fn limit_truncates_and_reports_total_matches() {
    let (status, body) = get(
        app(catalog()),
        "/api/profiles/p-1/recommendations?limit=1&compatibility_min=0",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(ids(&body), vec!["c"]);
    assert_eq!(body["total_matches"], 3);
    assert_eq!(body["stats"]["total"], 1);
}

#[tokio::test]
async fn failed_lookups_mark_the_response_partial() {
    let catalog = catalog().with_failure("b", ProviderError::Unavailable("rpc down".into()));

    let (status, body) = get(
        app(catalog),
        "/api/profiles/p-1/recommendations?compatibility_min=0",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(ids(&body), vec!["c", "a"]);
    assert_eq!(body["partial"], true);
    assert_eq!(body["failures"][0]["candidate_id"], "b");
    assert_eq!(body["failures"][0]["transient"], true);
}

#[tokio::test]
async fn inverted_window_is_a_bad_request() {
    let (status, body) = get(
        app(catalog()),
        "/api/profiles/p-1/recommendations?compatibility_min=90&compatibility_max=10",
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "bad_request");
}

#[tokio::test]
async fn unknown_profile_is_not_found() {
    let (status, _) = get(app(catalog()), "/api/profiles/nobody/recommendations").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn oversized_limit_is_rejected() {
    let (status, _) = get(app(catalog()), "/api/profiles/p-1/recommendations?limit=500").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn user_search_returns_placeholder_scores() {
    let (status, body) = post(
        app(catalog()),
        "/api/profiles/p-1/search",
        json!({ "kind": "user", "query": "lena" }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(ids(&body), vec!["u-1"]);
    assert_eq!(body["recommendations"][0]["compatibility_score"], 75.0);
    assert_eq!(body["recommendations"][0]["priority"], "medium");
    assert_eq!(body["recommendations"][0]["reason"], "Matches search criteria");
}

#[tokio::test]
async fn single_pair_lookup_is_normalized() {
    let (status, body) = get(app(catalog()), "/api/profiles/p-1/gigs/a/compatibility").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["compatibility_score"], 72.0);
    assert_eq!(body["priority"], "medium");
    assert_eq!(body["source"], "local");
}

#[tokio::test]
async fn saved_searches_need_a_database() {
    let (status, body) = get(app(catalog()), "/api/users/u-1/saved-searches").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], "service_unavailable");
}

#[tokio::test]
async fn gig_candidates_are_users() {
    let (status, body) = get(app(catalog()), "/api/gigs/a/candidates").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(ids(&body), vec!["p-1"]);
    assert_eq!(body["recommendations"][0]["type"], "user");

    let (status, _) = get(app(catalog()), "/api/gigs/missing/candidates").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
