//! Test helper module for office-service integration tests.
//!
//! Each test gets its own application on a random port, backed by a SQLite
//! file in a temporary directory.

#![allow(dead_code)]

use office_service::config::OfficeConfig;
use office_service::services::Database;
use office_service::startup::Application;
use reqwest::{Client, Response, StatusCode};
use serde_json::{json, Value};
use service_core::config::Config as CoreConfig;
use std::collections::HashMap;
use tempfile::TempDir;

pub const ADMIN_USERNAME: &str = "admin";
pub const ADMIN_PASSWORD: &str = "admin-password-123";
pub const STAFF_PASSWORD: &str = "staff-password-123";
pub const AUTHORITY: &str = "Ministry of Commerce";

pub struct TestApp {
    pub address: String,
    pub port: u16,
    pub db: Database,
    pub client: Client,
    pub admin_token: String,
    _dir: TempDir,
}

impl TestApp {
    pub async fn spawn() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = dir.path().join("office.db");

        let vars: HashMap<&str, String> = HashMap::from([
            ("DATABASE_URL", format!("sqlite://{}", db_path.display())),
            ("DATABASE_MAX_CONNECTIONS", "5".to_string()),
            ("JWT_SECRET", "integration-test-secret".to_string()),
            ("BOOTSTRAP_ADMIN_USERNAME", ADMIN_USERNAME.to_string()),
            ("BOOTSTRAP_ADMIN_PASSWORD", ADMIN_PASSWORD.to_string()),
            ("LOG_LEVEL", "error".to_string()),
        ]);

        let common = CoreConfig {
            host: "127.0.0.1".to_string(),
            port: 0, // Random port for testing
        };
        let config = OfficeConfig::from_lookup(common, |key| vars.get(key).cloned())
            .expect("Failed to build configuration");

        let app = Application::build(config)
            .await
            .expect("Failed to build test application");

        let port = app.http_port();
        let db = app.db().clone();
        let address = format!("http://127.0.0.1:{}", port);

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        let client = Client::new();
        let health_url = format!("{}/health", address);
        for _ in 0..50 {
            if client.get(&health_url).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        }

        let mut app = TestApp {
            address,
            port,
            db,
            client,
            admin_token: String::new(),
            _dir: dir,
        };
        app.admin_token = app.login(ADMIN_USERNAME, ADMIN_PASSWORD).await;
        app
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    /// Log in and return the access token.
    pub async fn login(&self, username: &str, password: &str) -> String {
        let response = self
            .client
            .post(self.url("/auth/login"))
            .json(&json!({ "username": username, "password": password }))
            .send()
            .await
            .expect("Failed to execute request");
        assert_eq!(response.status(), StatusCode::OK, "login failed for {}", username);

        let body: Value = response.json().await.expect("Failed to parse JSON");
        body["access_token"]
            .as_str()
            .expect("Missing access_token")
            .to_string()
    }

    pub async fn get(&self, path: &str, token: &str) -> Response {
        self.client
            .get(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn post(&self, path: &str, token: &str, body: Value) -> Response {
        self.client
            .post(self.url(path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn patch(&self, path: &str, token: &str, body: Value) -> Response {
        self.client
            .patch(self.url(path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn delete(&self, path: &str, token: &str) -> Response {
        self.client
            .delete(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .expect("Failed to execute request")
    }

    /// Create a staff account and return its id and token.
    pub async fn create_staff(&self, username: &str, permissions: Value) -> (i64, String) {
        let response = self
            .post(
                "/admin/employees",
                &self.admin_token,
                json!({
                    "username": username,
                    "email": format!("{}@office.test", username),
                    "password": STAFF_PASSWORD,
                    "role": "staff",
                    "permissions": permissions,
                }),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let body: Value = response.json().await.expect("Failed to parse JSON");
        let id = body["id"].as_i64().expect("Missing employee id");
        (id, self.login(username, STAFF_PASSWORD).await)
    }

    pub async fn create_customer(&self, full_name: &str) -> i64 {
        let response = self
            .post(
                "/customers",
                &self.admin_token,
                json!({ "full_name": full_name, "phone": "+968 9000 0000" }),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let body: Value = response.json().await.expect("Failed to parse JSON");
        body["id"].as_i64().expect("Missing customer id")
    }

    /// Create a fixed-fee service and return its id.
    pub async fn create_fixed_service(
        &self,
        name: &str,
        office_fee: &str,
        gov_fee: &str,
        vat_applicable: bool,
    ) -> i64 {
        self.create_service(json!({
            "name": name,
            "authority": AUTHORITY,
            "office_fee": office_fee,
            "gov_fee_type": "fixed",
            "gov_fee_value": gov_fee,
            "vat_applicable": vat_applicable,
        }))
        .await
    }

    /// Create a variable-fee service and return its id.
    pub async fn create_variable_service(&self, name: &str, office_fee: &str) -> i64 {
        self.create_service(json!({
            "name": name,
            "authority": AUTHORITY,
            "office_fee": office_fee,
            "gov_fee_type": "variable",
            "vat_applicable": true,
        }))
        .await
    }

    async fn create_service(&self, body: Value) -> i64 {
        let response = self.post("/services", &self.admin_token, body).await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let body: Value = response.json().await.expect("Failed to parse JSON");
        body["id"].as_i64().expect("Missing service id")
    }

    /// Create a managed transaction and return its id.
    pub async fn create_managed(&self, fee: &str, status: &str) -> i64 {
        let response = self
            .post(
                "/managed-transactions",
                &self.admin_token,
                json!({
                    "authority": AUTHORITY,
                    "service": "Commercial registration renewal",
                    "fee": fee,
                    "status": status,
                }),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let body: Value = response.json().await.expect("Failed to parse JSON");
        body["id"].as_i64().expect("Missing transaction id")
    }

    /// Count ledger rows for one source directly in the database.
    pub async fn income_rows(&self, source: &str, source_id: i64) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM incomes WHERE source = ?1 AND source_id = ?2")
            .bind(source)
            .bind(source_id)
            .fetch_one(self.db.pool())
            .await
            .expect("Failed to count incomes")
    }
}
