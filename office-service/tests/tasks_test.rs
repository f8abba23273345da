mod common;

use common::TestApp;
use reqwest::StatusCode;
use serde_json::{json, Value};

async fn create_task(app: &TestApp, token: &str, assignee_id: Option<i64>) -> i64 {
    let response = app
        .post(
            "/tasks",
            token,
            json!({
                "title": "Collect signed forms",
                "priority": "high",
                "due_date": "2030-01-15",
                "assignee_id": assignee_id,
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "todo");
    assert_eq!(body["priority"], "high");
    body["id"].as_i64().unwrap()
}

#[tokio::test]
async fn assignee_can_update_but_not_delete() {
    let app = TestApp::spawn().await;
    let (assignee_id, assignee) = app.create_staff("assignee", json!({})).await;
    let (_, creator) = app.create_staff("creator", json!({})).await;
    let task_id = create_task(&app, &creator, Some(assignee_id)).await;

    let response = app
        .patch(
            &format!("/tasks/{}", task_id),
            &assignee,
            json!({ "status": "in_progress" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "in_progress");

    let response = app.delete(&format!("/tasks/{}", task_id), &assignee).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app.delete(&format!("/tasks/{}", task_id), &creator).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn bystander_cannot_edit() {
    let app = TestApp::spawn().await;
    let (_, creator) = app.create_staff("creator", json!({})).await;
    let (_, bystander) = app.create_staff("bystander", json!({})).await;
    let task_id = create_task(&app, &creator, None).await;

    let response = app
        .patch(
            &format!("/tasks/{}", task_id),
            &bystander,
            json!({ "status": "done" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Admins may edit any task.
    let response = app
        .patch(
            &format!("/tasks/{}", task_id),
            &app.admin_token,
            json!({ "status": "done" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn tasks_filter_by_assignee_and_status() {
    let app = TestApp::spawn().await;
    let (assignee_id, _) = app.create_staff("assignee", json!({})).await;
    create_task(&app, &app.admin_token, Some(assignee_id)).await;
    create_task(&app, &app.admin_token, None).await;

    let mine: Value = app
        .get(&format!("/tasks?assignee_id={}", assignee_id), &app.admin_token)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(mine.as_array().unwrap().len(), 1);

    let done: Value = app
        .get("/tasks?status=done", &app.admin_token)
        .await
        .json()
        .await
        .unwrap();
    assert!(done.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn empty_title_is_unprocessable() {
    let app = TestApp::spawn().await;

    let response = app
        .post("/tasks", &app.admin_token, json!({ "title": "" }))
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}
