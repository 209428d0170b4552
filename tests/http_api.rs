use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;
use ulid::Ulid;

use cowork::engine::Engine;
use cowork::http::{AppState, router};

const WEBHOOK_SECRET: &str = "whsec_test";

// ── Test infrastructure ──────────────────────────────────────

fn test_wal_path() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("cowork_http_test_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    dir.join("cowork.wal")
}

fn app() -> Router {
    let engine = Arc::new(Engine::new(test_wal_path()).unwrap());
    router(AppState::new(engine, Some(WEBHOOK_SECRET.to_string())))
}

#[derive(Clone, Copy)]
struct User {
    id: Ulid,
    role: &'static str,
}

impl User {
    fn customer() -> Self {
        Self { id: Ulid::new(), role: "customer" }
    }

    fn manager() -> Self {
        Self { id: Ulid::new(), role: "manager" }
    }
}

async fn call(
    app: &Router,
    method: Method,
    uri: &str,
    user: Option<User>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        req = req
            .header("x-user-id", user.id.to_string())
            .header("x-user-role", user.role);
    }
    let req = match body {
        Some(body) => req
            .header("content-type", "application/json")
            .body(Body::from(body.to_string())),
        None => req.body(Body::empty()),
    }
    .unwrap();

    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

/// Commit a location with a desk at 10.00/h through the wizard; returns the desk id.
async fn setup_desk(app: &Router) -> String {
    let (status, body) = call(
        app,
        Method::POST,
        "/admin/wizard/commit",
        Some(User::manager()),
        Some(json!({
            "location": {
                "name": "Navigli Hub",
                "city": "Milano",
                "address": "Ripa di Porta Ticinese 7",
                "services": "wifi, coffee"
            },
            "spaces": [
                { "name": "Desk 1", "type": "desk", "price_per_hour": 10.0 },
                { "name": "Sala Volta", "type": "meeting_room", "capacity": 8, "price_per_hour": 25.0 }
            ]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["ok"], true);
    assert_eq!(body["location"]["services"], json!(["coffee", "wifi"]));
    body["spaces"][0]["id"].as_str().unwrap().to_string()
}

fn booking(space_id: &str, start: &str, end: &str) -> Value {
    json!({ "space_id": space_id, "start": start, "end": end })
}

// ── Tests ────────────────────────────────────────────────────

#[tokio::test]
async fn book_then_conflict() {
    let app = app();
    let desk = setup_desk(&app).await;
    let alice = User::customer();

    let (status, created) = call(
        &app,
        Method::POST,
        "/bookings",
        Some(alice),
        Some(booking(&desk, "2026-01-02T10:00:00Z", "2026-01-02T12:00:00Z")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{created}");
    assert_eq!(created["price"], 20.0);
    assert_eq!(created["status"], "pending");
    assert_eq!(created["payment_status"], "pending");
    assert_eq!(created["user_id"], alice.id.to_string());

    let (status, body) = call(
        &app,
        Method::POST,
        "/bookings",
        Some(User::customer()),
        Some(booking(&desk, "2026-01-02T11:00:00Z", "2026-01-02T13:00:00Z")),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "slot_unavailable");

    // Back-to-back is fine.
    let (status, _) = call(
        &app,
        Method::POST,
        "/bookings",
        Some(User::customer()),
        Some(booking(&desk, "2026-01-02T12:00:00Z", "2026-01-02T13:00:00Z")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = call(
        &app,
        Method::GET,
        &format!(
            "/bookings/availability?space_id={desk}&start=2026-01-02T09:00:00Z&end=2026-01-02T10:00:00Z"
        ),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["available"], true);
}

#[tokio::test]
async fn invalid_range_is_400() {
    let app = app();
    let desk = setup_desk(&app).await;
    let (status, body) = call(
        &app,
        Method::POST,
        "/bookings",
        Some(User::customer()),
        Some(booking(&desk, "2026-01-02T12:00:00Z", "2026-01-02T12:00:00Z")),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_range");

    let (status, _) = call(
        &app,
        Method::POST,
        "/bookings",
        Some(User::customer()),
        Some(json!({ "space_id": desk, "start": "tomorrow" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn identity_is_required_and_checked() {
    let app = app();
    let desk = setup_desk(&app).await;
    let body = booking(&desk, "2026-01-02T10:00:00Z", "2026-01-02T11:00:00Z");

    let (status, err) = call(&app, Method::POST, "/bookings", None, Some(body.clone())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(err["code"], "unauthorized");

    let req = Request::builder()
        .method(Method::POST)
        .uri("/bookings")
        .header("x-user-id", "not-a-ulid")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = app.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let bogus_role = User { id: Ulid::new(), role: "root" };
    let (status, _) = call(&app, Method::POST, "/bookings", Some(bogus_role), Some(body)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Catalog reads are public.
    let (status, list) = call(&app, Method::GET, "/locations", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn customers_cannot_touch_others_bookings() {
    let app = app();
    let desk = setup_desk(&app).await;
    let alice = User::customer();
    let bob = User::customer();

    let (_, created) = call(
        &app,
        Method::POST,
        "/bookings",
        Some(alice),
        Some(booking(&desk, "2026-01-02T10:00:00Z", "2026-01-02T11:00:00Z")),
    )
    .await;
    let id = created["id"].as_str().unwrap().to_string();

    let (status, _) = call(&app, Method::GET, &format!("/bookings/{id}"), Some(bob), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = call(&app, Method::DELETE, &format!("/bookings/{id}"), Some(bob), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = call(
        &app,
        Method::GET,
        &format!("/bookings?user_id={}", alice.id),
        Some(bob),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, mine) = call(&app, Method::GET, "/bookings", Some(alice), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(mine.as_array().unwrap().len(), 1);

    let (status, _) = call(
        &app,
        Method::DELETE,
        &format!("/bookings/{id}"),
        Some(User::manager()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, cancelled) = call(&app, Method::GET, &format!("/bookings/{id}"), Some(alice), None).await;
    assert_eq!(cancelled["status"], "cancelled");
}

#[tokio::test]
async fn pay_twice_then_cancel_and_pay_again() {
    let app = app();
    let desk = setup_desk(&app).await;
    let alice = User::customer();

    let (_, created) = call(
        &app,
        Method::POST,
        "/bookings",
        Some(alice),
        Some(booking(&desk, "2026-01-02T10:00:00Z", "2026-01-02T11:00:00Z")),
    )
    .await;
    let id = created["id"].as_str().unwrap().to_string();

    for _ in 0..2 {
        let (status, paid) = call(&app, Method::POST, &format!("/bookings/{id}/pay"), Some(alice), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(paid["status"], "confirmed");
        assert_eq!(paid["payment_status"], "paid");
    }

    let (_, other) = call(
        &app,
        Method::POST,
        "/bookings",
        Some(alice),
        Some(booking(&desk, "2026-01-02T14:00:00Z", "2026-01-02T15:00:00Z")),
    )
    .await;
    let other = other["id"].as_str().unwrap().to_string();
    let (status, _) = call(&app, Method::DELETE, &format!("/bookings/{other}"), Some(alice), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, body) = call(&app, Method::POST, &format!("/bookings/{other}/pay"), Some(alice), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "invalid_transition");
}

#[tokio::test]
async fn duplicate_location_is_409() {
    let app = app();
    let manager = User::manager();
    let location = json!({ "name": "Isola", "city": "Milano", "address": "Via Borsieri 3" });

    let (status, _) = call(&app, Method::POST, "/locations", Some(manager), Some(location)).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = call(
        &app,
        Method::POST,
        "/locations",
        Some(manager),
        Some(json!({ "name": " isola ", "city": "MILANO", "address": "via borsieri 3" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "already_exists");

    let (status, _) = call(
        &app,
        Method::POST,
        "/locations",
        Some(User::customer()),
        Some(json!({ "name": "Other", "city": "Milano", "address": "Via Roma 1" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn wizard_reports_field_errors() {
    let app = app();
    let (status, body) = call(
        &app,
        Method::POST,
        "/admin/wizard/validate",
        Some(User::manager()),
        Some(json!({
            "location": { "name": "", "city": "Milano", "address": "Via Roma 1" },
            "spaces": [
                { "name": "Desk", "type": "desk" },
                { "name": "desk", "type": "hammock" }
            ]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "validation_failed");
    let paths: Vec<&str> = body["errors"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["path"].as_str().unwrap())
        .collect();
    assert_eq!(paths, vec!["location.name", "spaces[1].kind", "spaces[1].name"]);

    // Validation writes nothing.
    let (_, list) = call(&app, Method::GET, "/locations", None, None).await;
    assert_eq!(list, json!([]));
}

#[tokio::test]
async fn add_spaces_and_search() {
    let app = app();
    setup_desk(&app).await;
    let manager = User::manager();
    let (_, list) = call(&app, Method::GET, "/locations?city=mil&services=wifi", None, None).await;
    let location_id = list[0]["id"].as_str().unwrap().to_string();

    let (status, body) = call(
        &app,
        Method::POST,
        &format!("/locations/{location_id}/spaces"),
        Some(manager),
        Some(json!({ "spaces": [{ "name": "DESK 1", "type": "desk" }] })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "duplicate_name");

    let (status, added) = call(
        &app,
        Method::POST,
        &format!("/locations/{location_id}/spaces"),
        Some(manager),
        Some(json!({ "spaces": [{ "name": "Booth", "type": "phone", "price_per_hour": 4.5 }] })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(added[0]["type"], "phone");
    assert_eq!(added[0]["price_per_hour"], 4.5);

    let (status, free) = call(
        &app,
        Method::GET,
        &format!(
            "/spaces/available?start=2026-01-02T10:00:00Z&end=2026-01-02T11:00:00Z&location_id={location_id}"
        ),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = free
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Booth", "Desk 1", "Sala Volta"]);

    let (status, _) = call(&app, Method::GET, "/locations?type=hammock", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn webhook_confirms_payment() {
    let app = app();
    let desk = setup_desk(&app).await;
    let alice = User::customer();
    let (_, created) = call(
        &app,
        Method::POST,
        "/bookings",
        Some(alice),
        Some(booking(&desk, "2026-01-02T10:00:00Z", "2026-01-02T11:00:00Z")),
    )
    .await;
    let id = created["id"].as_str().unwrap().to_string();
    let event = json!({
        "type": "checkout.session.completed",
        "data": { "object": { "metadata": { "booking_id": id } } }
    });

    let (status, _) = call(&app, Method::POST, "/payments/webhook", None, Some(event.clone())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let req = Request::builder()
        .method(Method::POST)
        .uri("/payments/webhook")
        .header("x-webhook-secret", WEBHOOK_SECRET)
        .header("content-type", "application/json")
        .body(Body::from(event.to_string()))
        .unwrap();
    let response = app.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let (_, paid) = call(&app, Method::GET, &format!("/bookings/{id}"), Some(alice), None).await;
    assert_eq!(paid["payment_status"], "paid");
    assert_eq!(paid["status"], "confirmed");
}

#[tokio::test]
async fn admin_listing_is_paginated() {
    let app = app();
    let desk = setup_desk(&app).await;
    for hour in 8..13 {
        let (status, _) = call(
            &app,
            Method::POST,
            "/bookings",
            Some(User::customer()),
            Some(booking(
                &desk,
                &format!("2026-01-02T{hour:02}:00:00Z"),
                &format!("2026-01-02T{hour:02}:30:00Z"),
            )),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, _) = call(&app, Method::GET, "/admin/bookings", Some(User::customer()), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, page) = call(
        &app,
        Method::GET,
        "/admin/bookings?limit=2&offset=1",
        Some(User::manager()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["limit"], 2);
    assert_eq!(page["offset"], 1);
    let items = page["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["start"], "2026-01-02T11:00:00Z");
}

#[tokio::test]
async fn malformed_ids_and_bodies_get_the_error_envelope() {
    let app = app();

    let (status, body) = call(&app, Method::GET, "/bookings/not-a-ulid", Some(User::customer()), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "bad_request");
    assert!(body["error"].is_string());

    let (status, body) = call(&app, Method::DELETE, "/locations/123", Some(User::manager()), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "bad_request");

    let req = Request::builder()
        .method(Method::POST)
        .uri("/payments/webhook")
        .header("x-webhook-secret", WEBHOOK_SECRET)
        .header("content-type", "application/json")
        .body(Body::from("{\"type\": "))
        .unwrap();
    let response = app.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["code"], "bad_request");
}

#[tokio::test]
async fn manager_report_and_admin_metrics() {
    let app = app();
    let desk = setup_desk(&app).await;
    let alice = User::customer();
    let (_, created) = call(
        &app,
        Method::POST,
        "/bookings",
        Some(alice),
        Some(booking(&desk, "2026-01-02T10:00:00Z", "2026-01-02T12:00:00Z")),
    )
    .await;
    let id = created["id"].as_str().unwrap().to_string();
    let (status, _) = call(&app, Method::POST, &format!("/bookings/{id}/pay"), Some(alice), None).await;
    assert_eq!(status, StatusCode::OK);

    for uri in ["/manager/report", "/admin/metrics", "/admin/wizard/prefill"] {
        let (status, _) = call(&app, Method::GET, uri, Some(alice), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{uri}");
    }

    let (status, report) = call(&app, Method::GET, "/manager/report", Some(User::manager()), None).await;
    assert_eq!(status, StatusCode::OK);
    let rows = report.as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["location"], "Navigli Hub");
    assert_eq!(rows[0]["space"], "Desk 1");
    assert_eq!(rows[0]["bookings"], 1);
    assert_eq!(rows[0]["revenue"], 20.0);
    assert_eq!(rows[1]["space"], "Sala Volta");
    assert_eq!(rows[1]["revenue"], 0.0);

    let (status, metrics) = call(&app, Method::GET, "/admin/metrics", Some(User::manager()), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        metrics,
        json!({ "locations_count": 1, "spaces_count": 2, "bookings_count": 1 })
    );

    let (status, prefill) = call(&app, Method::GET, "/admin/wizard/prefill", Some(User::manager()), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(prefill["space_types"], json!(["desk", "meeting", "office", "phone", "event"]));
    assert_eq!(prefill["defaults"]["capacity"], 1);
    assert!(prefill["services_catalog"].as_array().unwrap().contains(&json!("wifi")));
}
