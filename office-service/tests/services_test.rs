mod common;

use common::{TestApp, AUTHORITY};
use reqwest::StatusCode;
use serde_json::{json, Value};

fn service_body(name: &str) -> Value {
    json!({
        "name": name,
        "authority": AUTHORITY,
        "office_fee": "3.00",
        "gov_fee_type": "fixed",
        "gov_fee_value": "10.00",
    })
}

#[tokio::test]
async fn catalog_mutations_need_permission() {
    let app = TestApp::spawn().await;
    let (_, clerk) = app.create_staff("clerk", json!({})).await;
    let (_, editor) = app
        .create_staff("editor", json!({ "manage_catalog": true }))
        .await;

    let response = app.post("/services", &clerk, service_body("Visa renewal")).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app.post("/services", &editor, service_body("Visa renewal")).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["office_fee"], "3.00");
    assert_eq!(body["vat_applicable"], true);

    // Reads are open to every employee.
    let response = app.get("/services", &clerk).await;
    assert_eq!(response.status(), StatusCode::OK);
    let services: Value = response.json().await.unwrap();
    assert_eq!(services.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn unknown_authority_is_rejected() {
    let app = TestApp::spawn().await;

    let mut body = service_body("Visa renewal");
    body["authority"] = json!("Ministry of Magic");
    let response = app.post("/services", &app.admin_token, body).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let authorities: Value = app
        .get("/catalog/authorities", &app.admin_token)
        .await
        .json()
        .await
        .unwrap();
    assert!(authorities
        .as_array()
        .unwrap()
        .iter()
        .any(|a| a == AUTHORITY));
}

#[tokio::test]
async fn services_filter_by_authority() {
    let app = TestApp::spawn().await;
    app.create_fixed_service("Visa renewal", "3.00", "10.00", true)
        .await;

    let mut body = service_body("Driving licence");
    body["authority"] = json!("Royal Oman Police");
    app.post("/services", &app.admin_token, body).await;

    let services: Value = app
        .get("/services?authority=Royal%20Oman%20Police", &app.admin_token)
        .await
        .json()
        .await
        .unwrap();
    let services = services.as_array().unwrap();
    assert_eq!(services.len(), 1);
    assert_eq!(services[0]["name"], "Driving licence");
}

#[tokio::test]
async fn quote_prices_a_line_without_saving() {
    let app = TestApp::spawn().await;
    let fixed = app
        .create_fixed_service("Visa renewal", "3.00", "10.00", true)
        .await;
    let variable = app.create_variable_service("Court fee filing", "5.00").await;

    let body: Value = app
        .post(&format!("/services/{}/quote", fixed), &app.admin_token, json!({}))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["office_fee_total"], "3.00");
    assert_eq!(body["vat_amount"], "0.15");
    assert_eq!(body["line_total"], "13.15");

    let body: Value = app
        .post(
            &format!("/services/{}/quote", variable),
            &app.admin_token,
            json!({ "qty": 2, "gov_fee_override": "7.255" }),
        )
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["gov_fee_total"], "7.26");
    assert_eq!(body["line_total"], "17.76");

    let response = app
        .post(&format!("/services/{}/quote", variable), &app.admin_token, json!({}))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn update_changes_catalog_but_not_existing_invoices() {
    let app = TestApp::spawn().await;
    let customer_id = app.create_customer("Salim Al Harthy").await;
    let service_id = app
        .create_fixed_service("Visa renewal", "3.00", "10.00", true)
        .await;

    let invoice: Value = app
        .post(
            "/invoices",
            &app.admin_token,
            json!({ "customer_id": customer_id, "items": [{ "service_id": service_id }] }),
        )
        .await
        .json()
        .await
        .unwrap();

    let response = app
        .patch(
            &format!("/services/{}", service_id),
            &app.admin_token,
            json!({ "office_fee": "4.00" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["office_fee"], "4.00");

    let detail: Value = app
        .get(&format!("/invoices/{}", invoice["id"]), &app.admin_token)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(detail["grand_total"], "13.15");
}

#[tokio::test]
async fn referenced_service_cannot_be_deleted() {
    let app = TestApp::spawn().await;
    let customer_id = app.create_customer("Salim Al Harthy").await;
    let used = app
        .create_fixed_service("Visa renewal", "3.00", "10.00", true)
        .await;
    let unused = app
        .create_fixed_service("Typing service", "1.00", "0.00", false)
        .await;

    app.post(
        "/invoices",
        &app.admin_token,
        json!({ "customer_id": customer_id, "items": [{ "service_id": used }] }),
    )
    .await;

    let response = app.delete(&format!("/services/{}", used), &app.admin_token).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app
        .delete(&format!("/services/{}", unused), &app.admin_token)
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app.get(&format!("/services/{}", unused), &app.admin_token).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
