use async_trait::async_trait;
use axum::{
    body::{self, Body},
    http::{self, Request, StatusCode},
    Router,
};
use nlq::{chat::ChatBackend, config::AppConfig, server::Server};
use serde::Serialize;
use serde_json::Value;
use std::{env, future::Future, net::SocketAddr, sync::Arc, time::Duration};
use tokio_postgres::NoTls;
use tower::ServiceExt;

const FIXTURE_SCHEMA: &str = include_str!("../fixtures/schema.sql");
const FIXTURE_SEED: &str = include_str!("../fixtures/seed.sql");

/// Chat backend returning a canned completion; lets the tests pin the SQL the
/// "model" produces.
pub struct ScriptedChat {
    reply: String,
}

impl ScriptedChat {
    pub fn new(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
        })
    }
}

#[async_trait]
impl ChatBackend for ScriptedChat {
    async fn complete(&self, _system: &str, _user: &str) -> anyhow::Result<String> {
        Ok(self.reply.clone())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Chat backend that always errors, for the 500-propagation paths.
pub struct FailingChat {
    message: String,
}

impl FailingChat {
    pub fn new(message: &str) -> Arc<Self> {
        Arc::new(Self {
            message: message.to_string(),
        })
    }
}

#[async_trait]
impl ChatBackend for FailingChat {
    async fn complete(&self, _system: &str, _user: &str) -> anyhow::Result<String> {
        anyhow::bail!("{}", self.message)
    }

    fn name(&self) -> &str {
        "failing"
    }
}

#[derive(Clone)]
pub struct TestHarness {
    router: Router,
}

impl TestHarness {
    pub fn from_router(router: Router) -> Self {
        Self { router }
    }

    pub async fn get(&self, path: &str) -> http::Response<Body> {
        let request = Request::builder()
            .method("GET")
            .uri(path)
            .body(Body::empty())
            .expect("failed to build harness request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router should handle harness request")
    }

    pub async fn post_json<T>(&self, path: &str, payload: &T) -> http::Response<Body>
    where
        T: Serialize,
    {
        let body = serde_json::to_vec(payload).expect("request payload should serialize");
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header(http::header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .expect("failed to build harness request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router should handle harness request")
    }
}

pub async fn read_json(response: http::Response<Body>) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .expect("response body should deserialize");
    let value =
        serde_json::from_slice::<Value>(&bytes).expect("response body should be valid JSON");
    (status, value)
}

fn base_config(database_url: String) -> AppConfig {
    AppConfig {
        listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
        database_url,
        groq_api_key: None,
        model: "test-model".to_string(),
        chat_base_url: None,
        cors_origins: vec!["http://localhost:3000".to_string()],
        max_pool_size: 5,
        connect_timeout: Duration::from_secs(1),
        request_timeout: Duration::from_secs(5),
    }
}

/// Unroutable port: the startup probe fails fast and every SQL execution
/// errors, which is exactly what the degraded-startup tests need.
const OFFLINE_DATABASE_URL: &str = "postgres://nlq@127.0.0.1:9/analytics_db";

pub fn offline_config() -> AppConfig {
    base_config(OFFLINE_DATABASE_URL.to_string())
}

pub async fn offline_harness(backend: Arc<dyn ChatBackend>) -> TestHarness {
    let server = Server::with_chat(offline_config(), backend)
        .await
        .expect("failed to boot service without a database");
    TestHarness {
        router: server.router(),
    }
}

/// Runs a test against the seeded Postgres fixture. Skips (like the rest of
/// the suite's database-bound tests) when NLQ_TEST_DATABASE_URL is unset.
pub async fn with_fixture_harness<F, Fut>(backend: Arc<dyn ChatBackend>, test: F)
where
    F: FnOnce(TestHarness) -> Fut,
    Fut: Future<Output = ()>,
{
    let Ok(database_url) = env::var("NLQ_TEST_DATABASE_URL") else {
        eprintln!("[nlq-test] skipping fixture harness: NLQ_TEST_DATABASE_URL is not set");
        return;
    };

    seed_fixture_database(&database_url)
        .await
        .expect("failed to seed fixture database");

    let server = Server::with_chat(base_config(database_url), backend)
        .await
        .expect("failed to boot service against the fixture database");

    test(TestHarness {
        router: server.router(),
    })
    .await;
}

async fn seed_fixture_database(database_url: &str) -> anyhow::Result<()> {
    let config: tokio_postgres::Config = database_url.parse()?;
    let (client, connection) = config.connect(NoTls).await?;
    let task = tokio::spawn(async move {
        if let Err(err) = connection.await {
            eprintln!("[nlq-test] fixture connection closed with error: {err}");
        }
    });

    client.batch_execute(FIXTURE_SCHEMA).await?;
    client.batch_execute(FIXTURE_SEED).await?;

    drop(client);
    let _ = task.await;
    Ok(())
}
