use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use std::sync::Arc;
use tower::ServiceExt;
use warden::api::AppState;
use warden::auth::TokenIssuer;
use warden::config::Config;

fn test_config() -> Config {
    let mut config = Config::default();
    config.general.database_url = "sqlite::memory:".to_string();
    // Keep Argon2 cheap so registration-heavy tests stay fast
    config.security.argon2_memory_cost_kib = 1024;
    config.security.argon2_time_cost = 1;
    config
}

async fn spawn_app() -> (Router, Arc<AppState>) {
    let state = warden::api::create_app_state_from_config(test_config(), None)
        .await
        .expect("Failed to create app state");
    (warden::api::router(state.clone()), state)
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

fn post_json(uri: &str, body: &serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Body::from(serde_json::to_string(body).unwrap()))
        .unwrap()
}

async fn register(app: &Router, username: &str, email: &str, password: &str) -> StatusCode {
    let body = serde_json::json!({
        "username": username,
        "email": email,
        "password": password,
    });
    app.clone()
        .oneshot(post_json("/register", &body))
        .await
        .unwrap()
        .status()
}

async fn login(app: &Router, username: &str, password: &str) -> Option<String> {
    let body = serde_json::json!({ "username": username, "password": password });
    let response = app
        .clone()
        .oneshot(post_json("/login", &body))
        .await
        .unwrap();

    if response.status() != StatusCode::OK {
        return None;
    }

    let json = body_json(response).await;
    json["data"]["access_token"].as_str().map(String::from)
}

async fn create_record(app: &Router, token: &str, record_type: &str, title: &str) -> i64 {
    let body = serde_json::json!({ "record_type": record_type, "title": title });
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/actions/create_record")
                .header("Authorization", format!("Bearer {token}"))
                .header("Content-Type", "application/json")
                .body(Body::from(serde_json::to_string(&body).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await["data"]["id"].as_i64().unwrap()
}

async fn read_records(app: &Router, token: &str, query: &str) -> serde_json::Value {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/actions/read_records{query}"))
                .header("Authorization", format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await
}

async fn delete_record(app: &Router, token: &str, record_id: i64) -> StatusCode {
    app.clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/actions/delete_record?record_id={record_id}"))
                .header("Authorization", format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap()
        .status()
}

#[tokio::test]
async fn health_is_public() {
    let (app, _state) = spawn_app().await;

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "healthy");
}

#[tokio::test]
async fn seeded_admin_can_login() {
    let (app, _state) = spawn_app().await;

    let body = serde_json::json!({ "username": "admin", "password": "admin123" });
    let response = app
        .clone()
        .oneshot(post_json("/login", &body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["token_type"], "bearer");
    assert_eq!(json["data"]["is_admin"], true);
}

#[tokio::test]
async fn register_login_record_lifecycle() {
    let (app, _state) = spawn_app().await;

    assert_eq!(
        register(&app, "alice", "a@x.com", "pw123").await,
        StatusCode::OK
    );

    let token = login(&app, "alice", "pw123").await.expect("login failed");

    let record_id = create_record(&app, &token, "order", "T1").await;

    let listing = read_records(&app, &token, "").await;
    let titles: Vec<&str> = listing["data"]["records"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["title"].as_str().unwrap())
        .collect();
    assert!(titles.contains(&"T1"));

    // First delete returns the soft-deleted record
    assert_eq!(delete_record(&app, &token, record_id).await, StatusCode::OK);

    let listing = read_records(&app, &token, "").await;
    assert_eq!(listing["data"]["count"], 0);

    // Second delete of the same id observes NotFound
    assert_eq!(
        delete_record(&app, &token, record_id).await,
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn duplicate_registration_is_conflict() {
    let (app, _state) = spawn_app().await;

    assert_eq!(
        register(&app, "bob", "bob@x.com", "pw").await,
        StatusCode::OK
    );

    // Same username, different email
    assert_eq!(
        register(&app, "bob", "other@x.com", "pw").await,
        StatusCode::CONFLICT
    );

    // Same email, different username
    assert_eq!(
        register(&app, "robert", "bob@x.com", "pw").await,
        StatusCode::CONFLICT
    );
}

#[tokio::test]
async fn concurrent_duplicate_registration_yields_one_account() {
    let (app, state) = spawn_app().await;

    let body = serde_json::json!({
        "username": "carol",
        "email": "carol@x.com",
        "password": "pw",
    });

    let (first, second) = tokio::join!(
        app.clone().oneshot(post_json("/register", &body)),
        app.clone().oneshot(post_json("/register", &body)),
    );

    let statuses = [first.unwrap().status(), second.unwrap().status()];
    assert!(statuses.contains(&StatusCode::OK));
    assert!(statuses.contains(&StatusCode::CONFLICT));

    let user = state.store.find_user("carol").await.unwrap();
    assert!(user.is_some());
}

#[tokio::test]
async fn register_rejects_empty_fields() {
    let (app, _state) = spawn_app().await;

    assert_eq!(
        register(&app, "", "x@x.com", "pw").await,
        StatusCode::BAD_REQUEST
    );
    assert_eq!(register(&app, "x", "", "pw").await, StatusCode::BAD_REQUEST);
    assert_eq!(
        register(&app, "x", "x@x.com", "").await,
        StatusCode::BAD_REQUEST
    );
}

#[tokio::test]
async fn wrong_password_is_rejected_without_lockout() {
    let (app, _state) = spawn_app().await;

    register(&app, "dave", "dave@x.com", "right").await;

    // Repeated failures never lock the account
    for _ in 0..3 {
        assert!(login(&app, "dave", "wrong").await.is_none());
    }

    assert!(login(&app, "dave", "right").await.is_some());
}

#[tokio::test]
async fn unknown_user_login_is_rejected() {
    let (app, _state) = spawn_app().await;
    assert!(login(&app, "nobody", "pw").await.is_none());
}

#[tokio::test]
async fn protected_routes_require_valid_token() {
    let (app, _state) = spawn_app().await;

    // No token
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/actions/read_records")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Garbage token
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/actions/read_records")
                .header("Authorization", "Bearer not-a-jwt")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn tampered_token_is_rejected() {
    let (app, _state) = spawn_app().await;

    register(&app, "erin", "erin@x.com", "pw").await;
    let token = login(&app, "erin", "pw").await.unwrap();

    let mut tampered = token.clone();
    let last = tampered.pop().unwrap();
    tampered.push(if last == 'A' { 'B' } else { 'A' });

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/verify")
                .header("Authorization", format!("Bearer {tampered}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn expired_token_is_rejected() {
    let (app, state) = spawn_app().await;

    // Correctly signed with the service secret, but already expired
    let expired_issuer = TokenIssuer::new(&state.config.auth.jwt_secret, -1);
    let token = expired_issuer.issue("admin", true).unwrap();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/verify")
                .header("Authorization", format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn verify_returns_account_details() {
    let (app, _state) = spawn_app().await;

    register(&app, "frank", "frank@x.com", "pw").await;
    let token = login(&app, "frank", "pw").await.unwrap();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/verify")
                .header("Authorization", format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["username"], "frank");
    assert_eq!(json["data"]["email"], "frank@x.com");
    assert_eq!(json["data"]["is_admin"], false);
}

#[tokio::test]
async fn list_respects_type_filter_and_limit() {
    let (app, _state) = spawn_app().await;

    register(&app, "grace", "grace@x.com", "pw").await;
    let token = login(&app, "grace", "pw").await.unwrap();

    for title in ["O1", "O2", "O3"] {
        create_record(&app, &token, "order", title).await;
    }
    create_record(&app, &token, "report", "R1").await;

    let listing = read_records(&app, &token, "?record_type=order&limit=2").await;
    let records = listing["data"]["records"].as_array().unwrap();

    assert_eq!(records.len(), 2);
    for record in records {
        assert_eq!(record["record_type"], "order");
        assert_eq!(record["is_active"], true);
    }

    // Stable ordering: repeated identical calls return the same page
    let again = read_records(&app, &token, "?record_type=order&limit=2").await;
    assert_eq!(listing["data"], again["data"]);
}

#[tokio::test]
async fn soft_deleted_records_stay_hidden() {
    let (app, _state) = spawn_app().await;

    register(&app, "henry", "henry@x.com", "pw").await;
    let token = login(&app, "henry", "pw").await.unwrap();

    let keep = create_record(&app, &token, "order", "keep").await;
    let doomed = create_record(&app, &token, "order", "drop").await;

    assert_eq!(delete_record(&app, &token, doomed).await, StatusCode::OK);

    let listing = read_records(&app, &token, "?record_type=order").await;
    let ids: Vec<i64> = listing["data"]["records"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["id"].as_i64().unwrap())
        .collect();

    assert!(ids.contains(&keep));
    assert!(!ids.contains(&doomed));

    // Updating a soft-deleted record is NotFound too
    let body = serde_json::json!({ "record_id": doomed, "title": "resurrected" });
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/actions/update_record")
                .header("Authorization", format!("Bearer {token}"))
                .header("Content-Type", "application/json")
                .body(Body::from(serde_json::to_string(&body).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn update_is_partial_and_refreshes_updated_at() {
    let (app, _state) = spawn_app().await;

    register(&app, "iris", "iris@x.com", "pw").await;
    let token = login(&app, "iris", "pw").await.unwrap();

    let body = serde_json::json!({
        "record_type": "config",
        "title": "original",
        "description": "keep me",
    });
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/actions/create_record")
                .header("Authorization", format!("Bearer {token}"))
                .header("Content-Type", "application/json")
                .body(Body::from(serde_json::to_string(&body).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();
    let created = body_json(response).await;
    let record_id = created["data"]["id"].as_i64().unwrap();

    // Update the title only; the description must survive
    let body = serde_json::json!({ "record_id": record_id, "title": "renamed" });
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/actions/update_record")
                .header("Authorization", format!("Bearer {token}"))
                .header("Content-Type", "application/json")
                .body(Body::from(serde_json::to_string(&body).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let updated = body_json(response).await;
    assert_eq!(updated["data"]["title"], "renamed");
    assert_eq!(updated["data"]["description"], "keep me");
    assert!(
        updated["data"]["updated_at"].as_str().unwrap()
            >= created["data"]["updated_at"].as_str().unwrap()
    );
}

#[tokio::test]
async fn any_authenticated_caller_may_edit_any_record() {
    let (app, _state) = spawn_app().await;

    register(&app, "owner", "owner@x.com", "pw").await;
    register(&app, "other", "other@x.com", "pw").await;

    let owner_token = login(&app, "owner", "pw").await.unwrap();
    let other_token = login(&app, "other", "pw").await.unwrap();

    let record_id = create_record(&app, &owner_token, "order", "shared").await;

    // Flat authorization: "other" did not create the record but may delete it
    assert_eq!(
        delete_record(&app, &other_token, record_id).await,
        StatusCode::OK
    );
}

/// The trust boundary is deliberately inconsistent: /verify re-reads the
/// account and rejects a deactivated one, while record mutations trust the
/// token's subject without re-checking activity. This pins that policy.
#[tokio::test]
async fn deactivation_blocks_verify_but_not_record_mutation() {
    let (app, state) = spawn_app().await;

    register(&app, "judy", "judy@x.com", "pw").await;
    let token = login(&app, "judy", "pw").await.unwrap();

    state.store.set_user_active("judy", false).await.unwrap();

    // Fresh logins fail
    assert!(login(&app, "judy", "pw").await.is_none());

    // /verify re-checks activity and rejects
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/verify")
                .header("Authorization", format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // But the already-issued token still authorizes record mutation
    let body = serde_json::json!({ "record_type": "order", "title": "stale" });
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/actions/create_record")
                .header("Authorization", format!("Bearer {token}"))
                .header("Content-Type", "application/json")
                .body(Body::from(serde_json::to_string(&body).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn last_login_is_recorded() {
    let (app, state) = spawn_app().await;

    register(&app, "kate", "kate@x.com", "pw").await;

    let before = state.store.find_user("kate").await.unwrap().unwrap();
    assert!(before.last_login.is_none());

    login(&app, "kate", "pw").await.unwrap();

    let after = state.store.find_user("kate").await.unwrap().unwrap();
    assert!(after.last_login.is_some());
}

#[tokio::test]
async fn db_status_reports_up() {
    let (app, _state) = spawn_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/db/status")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["database"], "up");
}
