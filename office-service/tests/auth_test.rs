mod common;

use common::{TestApp, ADMIN_PASSWORD, ADMIN_USERNAME, STAFF_PASSWORD};
use reqwest::StatusCode;
use serde_json::{json, Value};

#[tokio::test]
async fn login_returns_token_and_user() {
    let app = TestApp::spawn().await;

    let response = app
        .client
        .post(app.url("/auth/login"))
        .json(&json!({ "username": ADMIN_USERNAME, "password": ADMIN_PASSWORD }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["token_type"], "Bearer");
    assert!(body["access_token"].as_str().unwrap().len() > 20);
    assert_eq!(body["user"]["username"], ADMIN_USERNAME);
    assert_eq!(body["user"]["role"], "admin");
    assert!(body["user"].get("password_hash").is_none());
}

#[tokio::test]
async fn wrong_password_is_unauthorized() {
    let app = TestApp::spawn().await;

    let response = app
        .client
        .post(app.url("/auth/login"))
        .json(&json!({ "username": ADMIN_USERNAME, "password": "not-the-password" }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn missing_or_bad_token_is_unauthorized() {
    let app = TestApp::spawn().await;

    let response = app.client.get(app.url("/customers")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app.get("/customers", "not-a-jwt").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn me_returns_current_user() {
    let app = TestApp::spawn().await;
    let (staff_id, token) = app.create_staff("clerk", json!({})).await;

    let response = app.get("/auth/me", &token).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["id"], staff_id);
    assert_eq!(body["role"], "staff");
}

#[tokio::test]
async fn staff_cannot_reach_admin_endpoints() {
    let app = TestApp::spawn().await;
    let (_, token) = app.create_staff("clerk", json!({})).await;

    for path in ["/admin/employees", "/admin/stats", "/admin/stats/by-authority", "/incomes"] {
        let response = app.get(path, &token).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN, "{}", path);
    }
}

#[tokio::test]
async fn duplicate_username_conflicts() {
    let app = TestApp::spawn().await;
    app.create_staff("clerk", json!({})).await;

    let response = app
        .post(
            "/admin/employees",
            &app.admin_token,
            json!({
                "username": "clerk",
                "email": "other@office.test",
                "password": STAFF_PASSWORD,
            }),
        )
        .await;

    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn invalid_employee_payload_is_unprocessable() {
    let app = TestApp::spawn().await;

    let response = app
        .post(
            "/admin/employees",
            &app.admin_token,
            json!({ "username": "x", "email": "not-an-email", "password": "short" }),
        )
        .await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn admin_cannot_delete_themself() {
    let app = TestApp::spawn().await;
    let me: Value = app.get("/auth/me", &app.admin_token).await.json().await.unwrap();
    let admin_id = me["id"].as_i64().unwrap();

    let response = app
        .delete(&format!("/admin/employees/{}", admin_id), &app.admin_token)
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let (staff_id, _) = app.create_staff("clerk", json!({})).await;
    let response = app
        .delete(&format!("/admin/employees/{}", staff_id), &app.admin_token)
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn deleted_employee_token_stops_working() {
    let app = TestApp::spawn().await;
    let (staff_id, token) = app.create_staff("clerk", json!({})).await;

    app.delete(&format!("/admin/employees/{}", staff_id), &app.admin_token)
        .await;

    let response = app.get("/auth/me", &token).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn change_password_requires_current_password() {
    let app = TestApp::spawn().await;
    let (_, token) = app.create_staff("clerk", json!({})).await;

    let response = app
        .post(
            "/auth/password",
            &token,
            json!({ "current_password": "wrong-password", "new_password": "brand-new-pass" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .post(
            "/auth/password",
            &token,
            json!({ "current_password": STAFF_PASSWORD, "new_password": "brand-new-pass" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    app.login("clerk", "brand-new-pass").await;
}

#[tokio::test]
async fn promoted_staff_gains_admin_access_immediately() {
    let app = TestApp::spawn().await;
    let (staff_id, token) = app.create_staff("clerk", json!({})).await;

    let response = app
        .patch(
            &format!("/admin/employees/{}", staff_id),
            &app.admin_token,
            json!({ "role": "admin" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.get("/admin/employees", &token).await;
    assert_eq!(response.status(), StatusCode::OK);
    let employees: Value = response.json().await.unwrap();
    assert_eq!(employees.as_array().unwrap().len(), 2);
}
