use mongodb::{Client, Database, options::ClientOptions};
use std::net::SocketAddr;
use std::sync::Arc;
use taskhub_api::{build_router, state::AppState};
use taskhub_config::Settings;
use taskhub_db::indexes::ensure_indexes;
use taskhub_services::dispatch::{self, DispatchClient, MockDispatchClient};
use taskhub_services::email::{EmailProvider, MockEmailProvider};
use tokio::net::TcpListener;

pub const TEST_WEBHOOK_SECRET: &str = "test-webhook-secret";

/// A running test application with its own MongoDB database.
///
/// Dispatch and email go through in-memory mocks; the handles stay on the
/// struct so tests can inspect recorded calls and inject failures.
pub struct TestApp {
    pub addr: SocketAddr,
    pub base_url: String,
    pub db: Database,
    pub settings: Settings,
    pub client: reqwest::Client,
    pub dispatch: Arc<MockDispatchClient>,
    pub email: Arc<MockEmailProvider>,
}

impl TestApp {
    /// Spawn a new test server connected to the test MongoDB.
    ///
    /// Requires a running MongoDB at localhost:27017.
    /// Set TASKHUB__DATABASE__URL env var to override the connection string.
    /// Each test gets a unique database name for isolation.
    pub async fn spawn() -> Self {
        Self::spawn_with_settings(|_| {}).await
    }

    /// Spawn a test server with customized settings.
    ///
    /// The `mutator` closure receives a `&mut Settings` after the test
    /// defaults are applied, allowing tests to tweak specific fields.
    pub async fn spawn_with_settings(mutator: impl FnOnce(&mut Settings)) -> Self {
        let db_name = format!("taskhub_test_{}", uuid::Uuid::new_v4().simple());

        let mut settings = Settings::load().unwrap_or_else(|_| test_settings());
        if let Ok(url) = std::env::var("TASKHUB__DATABASE__URL") {
            settings.database.url = url;
        }
        settings.database.name = db_name.clone();
        settings.dispatch.mock = true;
        settings.dispatch.webhook_secret = TEST_WEBHOOK_SECRET.to_string();
        settings.email.mock = true;

        // Apply caller's customizations
        mutator(&mut settings);

        let client_options = ClientOptions::parse(&settings.database.url)
            .await
            .expect("Failed to parse MongoDB URL");
        let mongo_client =
            Client::with_options(client_options).expect("Failed to create MongoDB client");
        let db = mongo_client.database(&db_name);

        ensure_indexes(&db).await.expect("Failed to create indexes");

        let dispatch = Arc::new(MockDispatchClient::new());
        let email = Arc::new(MockEmailProvider::new());
        let app_state = AppState::with_collaborators(
            db.clone(),
            settings.clone(),
            dispatch.clone() as Arc<dyn DispatchClient>,
            email.clone() as Arc<dyn EmailProvider>,
        );
        let app = build_router(app_state);

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let base_url = format!("http://{}", addr);
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .build()
            .expect("Failed to build HTTP client");

        Self {
            addr,
            base_url,
            db,
            settings,
            client,
            dispatch,
            email,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn auth_get(&self, path: &str, token: &str) -> reqwest::RequestBuilder {
        self.client
            .get(self.url(path))
            .header("Authorization", format!("Bearer {}", token))
    }

    pub fn auth_post(&self, path: &str, token: &str) -> reqwest::RequestBuilder {
        self.client
            .post(self.url(path))
            .header("Authorization", format!("Bearer {}", token))
    }

    pub fn auth_put(&self, path: &str, token: &str) -> reqwest::RequestBuilder {
        self.client
            .put(self.url(path))
            .header("Authorization", format!("Bearer {}", token))
    }

    pub fn auth_delete(&self, path: &str, token: &str) -> reqwest::RequestBuilder {
        self.client
            .delete(self.url(path))
            .header("Authorization", format!("Bearer {}", token))
    }

    /// Deliver a dispatch webhook the way the real service would: the
    /// recorded payload, signed with the shared webhook secret.
    pub async fn post_webhook(
        &self,
        notification_id: &str,
        kind: &str,
        entity_id: &str,
    ) -> reqwest::Response {
        let body = serde_json::json!({
            "notificationId": notification_id,
            "type": kind,
            "entityId": entity_id,
        })
        .to_string();
        self.post_webhook_raw(&body, Some(TEST_WEBHOOK_SECRET)).await
    }

    /// Deliver a raw webhook body, optionally signed with the given secret.
    /// Passing `None` omits the signature header entirely.
    pub async fn post_webhook_raw(
        &self,
        body: &str,
        secret: Option<&str>,
    ) -> reqwest::Response {
        let mut req = self
            .client
            .post(self.url("/api/webhook/dispatch"))
            .header("Content-Type", "application/json")
            .body(body.to_string());

        if let Some(secret) = secret {
            let header = dispatch::signature_header(
                secret,
                chrono::Utc::now().timestamp(),
                body.as_bytes(),
            );
            req = req.header("x-dispatch-signature", header);
        }

        req.send().await.expect("Webhook request failed")
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        let db = self.db.clone();
        // Best effort cleanup: drop the test database
        tokio::spawn(async move {
            let _ = db.drop().await;
        });
    }
}

fn test_settings() -> Settings {
    Settings {
        app: taskhub_config::AppSettings {
            host: "127.0.0.1".to_string(),
            port: 0,
            cors_origins: vec![],
        },
        database: taskhub_config::DatabaseSettings {
            url: "mongodb://localhost:27017".to_string(),
            name: "taskhub_test".to_string(),
            max_pool_size: Some(5),
            min_pool_size: Some(1),
        },
        jwt: taskhub_config::JwtSettings {
            secret: "test-secret-key-for-jwt-signing-minimum-32-chars".to_string(),
            access_token_ttl_secs: 3600,
            refresh_token_ttl_secs: 604800,
            issuer: "taskhub".to_string(),
        },
        dispatch: taskhub_config::DispatchSettings {
            base_url: "http://localhost:5002".to_string(),
            token: "test-dispatch-token".to_string(),
            webhook_secret: TEST_WEBHOOK_SECRET.to_string(),
            callback_url: "http://localhost:3000/api/webhook/dispatch".to_string(),
            mock: true,
        },
        email: taskhub_config::EmailSettings {
            base_url: "http://localhost:5003".to_string(),
            api_key: "test-email-key".to_string(),
            from: "Taskhub Tests <tests@taskhub.test>".to_string(),
            mock: true,
        },
        notification: taskhub_config::NotificationSettings {
            default_send_time: None,
        },
    }
}
