//! Booking API tests
//!
//! Conflict reports, lifecycle actions, edits and re-parsing through the HTTP
//! surface.

mod helpers;

use axum::http::StatusCode;
use helpers::{test_app, TestApp};
use serde_json::{json, Value};

async fn create(app: &TestApp, body: Value) -> Value {
    let (status, created) = app.post_json("/bookings", body).await;
    assert_eq!(status, StatusCode::CREATED, "{}", created);
    created
}

fn gig(title: &str, date: &str) -> Value {
    json!({
        "userId": "sam",
        "title": title,
        "clientName": "Client",
        "eventDate": date,
    })
}

fn id_of(created: &Value) -> String {
    created["booking"]["id"].as_str().unwrap().to_string()
}

async fn act(app: &TestApp, id: &str, action: &str, body: Option<Value>) -> (StatusCode, Value) {
    let uri = format!("/bookings/{}/actions/{}", id, action);
    match body {
        Some(body) => app.post_json(&uri, body).await,
        None => app.post_empty(&uri).await,
    }
}

async fn confirm(app: &TestApp, id: &str) {
    let (status, body) = act(app, id, "send-contract", None).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    let (status, body) = act(app, id, "sign-contract", None).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["booking"]["status"], "confirmed");
}

#[tokio::test]
async fn test_confirmed_sibling_makes_conflict_high() {
    let app = test_app().await;
    app.register_user("sam", "sam").await;

    let confirmed = create(&app, gig("Corporate dinner", "2025-09-20")).await;
    let enquiry = create(&app, gig("Wedding", "2025-09-20")).await;
    confirm(&app, &id_of(&confirmed)).await;

    let (status, report) = app
        .get(&format!("/bookings/{}/conflicts", id_of(&enquiry)))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["conflicts"].as_array().unwrap().len(), 1);
    assert_eq!(report["conflicts"][0]["conflictingStatus"], "confirmed");
    assert_eq!(report["analysis"]["severity"], "high");
    assert_eq!(report["analysis"]["canReschedule"], false);
}

#[tokio::test]
async fn test_two_separate_enquiries_are_low() {
    let app = test_app().await;
    app.register_user("sam", "sam").await;

    let mut morning = gig("Brunch set", "2025-09-20");
    morning["eventTime"] = json!("10:00");
    morning["eventEndTime"] = json!("11:30");
    morning["venue"] = json!("Riverside Cafe");
    let mut evening = gig("Evening reception", "2025-09-20");
    evening["eventTime"] = json!("19:00");
    evening["eventEndTime"] = json!("23:00");
    evening["venue"] = json!("The Grand Hotel");

    create(&app, morning).await;
    let created = create(&app, evening).await;

    // Creation already reports the conflict, advisory only
    let report = &created["conflicts"];
    assert_eq!(report["conflicts"][0]["timeOverlap"], false);
    assert_eq!(report["conflicts"][0]["sameVenue"], false);
    assert_eq!(report["analysis"]["severity"], "low");
    assert_eq!(report["analysis"]["canReschedule"], true);
}

#[tokio::test]
async fn test_deleted_sibling_leaves_no_conflict() {
    let app = test_app().await;
    app.register_user("sam", "sam").await;

    let first = create(&app, gig("First", "2025-09-20")).await;
    let second = create(&app, gig("Second", "2025-09-20")).await;
    let (_, report) = app.get(&format!("/bookings/{}/conflicts", id_of(&second))).await;
    assert_eq!(report["conflicts"].as_array().unwrap().len(), 1);

    // Bulk removal outside the API; nothing cached may survive it
    sqlx::query("DELETE FROM bookings WHERE id = ?")
        .bind(id_of(&first))
        .execute(&app.pool)
        .await
        .unwrap();

    let (status, report) = app.get(&format!("/bookings/{}/conflicts", id_of(&second))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(report["conflicts"].as_array().unwrap().is_empty());
    assert_eq!(report["analysis"], Value::Null);
}

#[tokio::test]
async fn test_cancelled_sibling_is_not_a_conflict() {
    let app = test_app().await;
    app.register_user("sam", "sam").await;

    let first = create(&app, gig("First", "2025-09-20")).await;
    let second = create(&app, gig("Second", "2025-09-20")).await;

    let (status, rejected) = act(&app, &id_of(&first), "reject", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rejected["booking"]["status"], "cancelled");

    let (_, report) = app.get(&format!("/bookings/{}/conflicts", id_of(&second))).await;
    assert!(report["conflicts"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_resolving_a_conflict() {
    let app = test_app().await;
    app.register_user("sam", "sam").await;

    let first = create(&app, gig("First", "2025-09-20")).await;
    let second = create(&app, gig("Second", "2025-09-20")).await;

    let (status, report) = app
        .post_empty(&format!(
            "/bookings/{}/conflicts/{}/resolve",
            id_of(&second),
            id_of(&first)
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["conflicts"][0]["resolved"], true);
    assert_eq!(report["analysis"], Value::Null);
}

#[tokio::test]
async fn test_lifecycle_through_http() {
    let app = test_app().await;
    app.register_user("sam", "sam").await;
    let id = id_of(&create(&app, gig("Past gig", "2025-06-01")).await);

    // Signing before a contract exists is not a valid transition
    let (status, body) = act(&app, &id, "sign-contract", None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "CONFLICT");

    confirm(&app, &id).await;

    let (status, body) = act(&app, &id, "send-invoice", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{}", body);

    let (status, body) = act(&app, &id, "send-invoice", Some(json!({"amountMinor": 45000}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["booking"]["status"], "confirmed");
    assert_eq!(body["progress"]["invoiceSent"], true);
    assert_eq!(body["progress"]["paidInFull"], false);
    let invoice_id = body["invoice"]["id"].as_str().unwrap().to_string();

    let (status, body) = act(&app, &id, "mark-paid", Some(json!({"invoiceId": invoice_id}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["booking"]["status"], "completed");
    assert_eq!(body["progress"]["paidInFull"], true);

    // Terminal
    let (status, _) = act(&app, &id, "reject", None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, detail) = app.get(&format!("/bookings/{}", id)).await;
    assert_eq!(
        detail["progress"],
        json!({"contractSent": true, "contractSigned": true, "invoiceSent": true, "paidInFull": true})
    );
    assert_eq!(detail["contracts"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_unknown_action_and_booking() {
    let app = test_app().await;
    app.register_user("sam", "sam").await;
    let id = id_of(&create(&app, gig("Gig", "2025-09-20")).await);

    let (status, _) = act(&app, &id, "pay-everything", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let missing = uuid::Uuid::new_v4();
    let (status, body) = app.get(&format!("/bookings/{}", missing)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_patch_edits_details_but_not_status() {
    let app = test_app().await;
    app.register_user("sam", "sam").await;
    let id = id_of(&create(&app, gig("Gig", "2025-09-20")).await);

    let (status, body) = app
        .patch_json(
            &format!("/bookings/{}", id),
            json!({"venue": "Town Hall", "eventTime": "18:30", "eventDate": "not a date"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["booking"]["venue"], "Town Hall");
    assert_eq!(body["booking"]["eventTime"], "18:30");
    assert_eq!(body["booking"]["eventDate"], Value::Null);

    let (status, _) = app
        .patch_json(&format!("/bookings/{}", id), json!({"status": "confirmed"}))
        .await;
    assert!(status.is_client_error());

    let (_, detail) = app.get(&format!("/bookings/{}", id)).await;
    assert_eq!(detail["booking"]["status"], "enquiry");
}

#[tokio::test]
async fn test_manual_booking_for_unknown_user() {
    let app = test_app().await;
    let (status, _) = app.post_json("/bookings", gig("Gig", "2025-09-20")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_routing_prefix_must_be_unique() {
    let app = test_app().await;
    app.register_user("sam", "sam").await;
    let (status, body) = app
        .post_json("/users", json!({"id": "sam2", "name": "Sam", "routingPrefix": "SAM"}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{}", body);
}

#[tokio::test]
async fn test_reparse_refills_only_empty_fields() {
    let app = test_app().await;
    let r = app
        .webhook(&[
            ("sender", "Jane Doe <jane@example.com>"),
            ("subject", "Wedding enquiry"),
            ("body-plain", "Wedding on 2025-09-20 at The Grand Hotel, 7pm"),
        ])
        .await;
    let id = r["enquiryId"].as_str().unwrap().to_string();

    let (status, _) = app
        .patch_json(
            &format!("/bookings/{}", id),
            json!({"venue": null, "clientName": "Jane & Tom"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, b) = app.post_empty(&format!("/bookings/{}/reparse", id)).await;
    assert_eq!(status, StatusCode::OK, "{}", b);
    assert_eq!(b["venue"], "The Grand Hotel");
    assert_eq!(b["clientName"], "Jane & Tom");
    assert_eq!(b["eventDate"], "2025-09-20");
}

#[tokio::test]
async fn test_reparse_of_manual_booking_is_rejected() {
    let app = test_app().await;
    app.register_user("sam", "sam").await;
    let id = id_of(&create(&app, gig("Gig", "2025-09-20")).await);

    let (status, _) = app.post_empty(&format!("/bookings/{}/reparse", id)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_health() {
    let app = test_app().await;
    let (status, body) = app.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "gigflow-ingest");
    assert_eq!(body["ai_fallback"], false);
}
