mod common;

use common::TestApp;
use reqwest::StatusCode;
use serde_json::{json, Value};

#[tokio::test]
async fn create_get_and_update_customer() {
    let app = TestApp::spawn().await;
    let customer_id = app.create_customer("Salim Al Harthy").await;

    let response = app
        .get(&format!("/customers/{}", customer_id), &app.admin_token)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["full_name"], "Salim Al Harthy");

    let response = app
        .patch(
            &format!("/customers/{}", customer_id),
            &app.admin_token,
            json!({ "national_id": "12345678" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["national_id"], "12345678");
    assert_eq!(body["full_name"], "Salim Al Harthy");
}

#[tokio::test]
async fn search_matches_name_and_national_id() {
    let app = TestApp::spawn().await;
    app.create_customer("Salim Al Harthy").await;
    app.create_customer("Maryam Al Balushi").await;

    let body: Value = app
        .get("/customers?q=balushi", &app.admin_token)
        .await
        .json()
        .await
        .unwrap();
    let names: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["full_name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Maryam Al Balushi"]);

    let body: Value = app.get("/customers", &app.admin_token).await.json().await.unwrap();
    assert_eq!(body.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn empty_name_is_unprocessable_and_bad_json_is_bad_request() {
    let app = TestApp::spawn().await;

    let response = app
        .post("/customers", &app.admin_token, json!({ "full_name": "" }))
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let response = app
        .client
        .post(app.url("/customers"))
        .bearer_auth(&app.admin_token)
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_customer_is_not_found() {
    let app = TestApp::spawn().await;

    let response = app.get("/customers/9999", &app.admin_token).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .post("/customers/9999/notes", &app.admin_token, json!({ "content": "hello" }))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn notes_are_listed_newest_first() {
    let app = TestApp::spawn().await;
    let customer_id = app.create_customer("Salim Al Harthy").await;
    let (staff_id, token) = app.create_staff("clerk", json!({})).await;

    for content in ["Brought passport copy", "Called about renewal"] {
        let response = app
            .post(
                &format!("/customers/{}/notes", customer_id),
                &token,
                json!({ "content": content }),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    let body: Value = app
        .get(&format!("/customers/{}/notes", customer_id), &token)
        .await
        .json()
        .await
        .unwrap();
    let notes = body.as_array().unwrap();
    assert_eq!(notes.len(), 2);
    assert_eq!(notes[0]["content"], "Called about renewal");
    assert_eq!(notes[0]["created_by"], staff_id);
}

#[tokio::test]
async fn history_lists_tickets_and_invoices() {
    let app = TestApp::spawn().await;
    let customer_id = app.create_customer("Salim Al Harthy").await;
    let service_id = app
        .create_fixed_service("Visa renewal", "3.00", "10.00", true)
        .await;

    let response = app
        .post(
            "/tickets",
            &app.admin_token,
            json!({ "customer_id": customer_id, "service_id": service_id }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .post(
            "/invoices",
            &app.admin_token,
            json!({ "customer_id": customer_id, "items": [{ "service_id": service_id }] }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let body: Value = app
        .get(&format!("/customers/{}/history", customer_id), &app.admin_token)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["customer"]["id"], customer_id);
    assert_eq!(body["tickets"].as_array().unwrap().len(), 1);
    assert_eq!(body["invoices"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn customer_with_invoice_cannot_be_deleted() {
    let app = TestApp::spawn().await;
    let customer_id = app.create_customer("Salim Al Harthy").await;
    let service_id = app
        .create_fixed_service("Visa renewal", "3.00", "10.00", true)
        .await;
    app.post(
        "/invoices",
        &app.admin_token,
        json!({ "customer_id": customer_id, "items": [{ "service_id": service_id }] }),
    )
    .await;

    let response = app
        .delete(&format!("/customers/{}", customer_id), &app.admin_token)
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let other_id = app.create_customer("Maryam Al Balushi").await;
    let response = app
        .delete(&format!("/customers/{}", other_id), &app.admin_token)
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn contacts_keep_a_single_primary() {
    let app = TestApp::spawn().await;
    let customer_id = app.create_customer("Salim Al Harthy").await;
    let path = format!("/customers/{}/contacts", customer_id);

    let response = app
        .post(&path, &app.admin_token, json!({ "value": "+968 9111 1111", "is_primary": true }))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let first: Value = response.json().await.unwrap();
    assert_eq!(first["kind"], "phone");
    assert_eq!(first["is_primary"], true);

    app.post(&path, &app.admin_token, json!({ "kind": "email", "value": "salim@example.com" }))
        .await;
    let response = app
        .post(
            &path,
            &app.admin_token,
            json!({ "kind": "WhatsApp", "value": "+968 9222 2222", "is_primary": true }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let contacts: Value = app.get(&path, &app.admin_token).await.json().await.unwrap();
    let contacts = contacts.as_array().unwrap();
    assert_eq!(contacts.len(), 3);
    assert_eq!(contacts[0]["kind"], "whatsapp");
    assert_eq!(contacts[0]["is_primary"], true);
    assert_eq!(
        contacts.iter().filter(|c| c["is_primary"] == true).count(),
        1
    );

    let response = app
        .post(&path, &app.admin_token, json!({ "value": "   " }))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .post("/customers/9999/contacts", &app.admin_token, json!({ "value": "x" }))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
