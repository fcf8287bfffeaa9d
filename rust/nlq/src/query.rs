use crate::{
    chat::ChatBackend,
    db::PgPool,
    error::{Result, ServiceError},
    rows,
};
use anyhow::Context;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tracing::{debug, error};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueryRequest {
    pub question: String,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct QueryResponse {
    pub sql: String,
    pub results: Vec<Value>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct TrainRequest {
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default)]
    pub sql: Option<String>,
    #[serde(default)]
    pub ddl: Option<String>,
}

impl TrainRequest {
    pub fn into_item(self) -> Result<TrainingItem> {
        let question = non_empty(self.question);
        let sql = non_empty(self.sql);
        let ddl = non_empty(self.ddl);

        match (question, sql, ddl) {
            (Some(question), Some(sql), None) => Ok(TrainingItem::Example { question, sql }),
            (None, None, Some(ddl)) => Ok(TrainingItem::Ddl(ddl)),
            _ => Err(ServiceError::InvalidRequest(
                "provide either question and sql together, or ddl alone".to_string(),
            )),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.and_then(|text| {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

#[derive(Debug, Clone)]
pub enum TrainingItem {
    Ddl(String),
    Example { question: String, sql: String },
}

#[derive(Default)]
struct TrainingStore {
    ddl: Vec<String>,
    examples: Vec<(String, String)>,
}

/// The composed adapter: database capability plus one chat-completion
/// capability plus the process-lifetime training store. Cloning shares all
/// three.
#[derive(Clone)]
pub struct QueryEngine {
    pool: PgPool,
    chat: Arc<dyn ChatBackend>,
    store: Arc<RwLock<TrainingStore>>,
    connected: Arc<AtomicBool>,
}

impl QueryEngine {
    pub fn new(pool: PgPool, chat: Arc<dyn ChatBackend>, connected: bool) -> Self {
        Self {
            pool,
            chat,
            store: Arc::new(RwLock::new(TrainingStore::default())),
            connected: Arc::new(AtomicBool::new(connected)),
        }
    }

    /// Translates a natural-language question into SQL. An empty string means
    /// the model declined to answer; errors mean the backend itself failed.
    pub async fn generate_sql(&self, question: &str) -> Result<String> {
        let system = self.system_prompt();
        let raw = self
            .chat
            .complete(&system, question)
            .await
            .context("failed to generate SQL")?;
        let sql = strip_sql_fences(&raw);
        debug!(%sql, "generated SQL");
        Ok(sql)
    }

    /// Executes generated SQL over the simple-query protocol and normalizes
    /// the rows. Also refreshes the coarse connectivity flag behind /health.
    pub async fn run_sql(&self, sql: &str) -> Result<Vec<Value>> {
        let conn = match self.pool.get().await {
            Ok(conn) => conn,
            Err(err) => {
                self.connected.store(false, Ordering::Relaxed);
                error!(error = ?err, "failed to acquire database connection");
                return Err(ServiceError::Internal(anyhow::anyhow!(
                    "failed to acquire database connection: {err:?}"
                )));
            }
        };

        match conn.simple_query(sql).await {
            Ok(messages) => {
                self.connected.store(true, Ordering::Relaxed);
                Ok(rows::normalize(messages))
            }
            Err(err) => {
                if conn.is_closed() {
                    self.connected.store(false, Ordering::Relaxed);
                }
                Err(ServiceError::Internal(
                    anyhow::Error::new(err).context("SQL execution failed"),
                ))
            }
        }
    }

    /// Records a schema or example item for later prompt assembly.
    pub fn train(&self, item: TrainingItem) -> Result<()> {
        let mut store = self.store.write();
        match item {
            TrainingItem::Ddl(ddl) => {
                debug!("recorded DDL training item");
                store.ddl.push(ddl);
            }
            TrainingItem::Example { question, sql } => {
                debug!(%question, "recorded example training item");
                store.examples.push((question, sql));
            }
        }
        Ok(())
    }

    pub fn database_status(&self) -> &'static str {
        if self.connected.load(Ordering::Relaxed) {
            "connected"
        } else {
            "disconnected"
        }
    }

    /// The whole store fits in one prompt, so assembly includes everything
    /// rather than retrieving a top-k subset.
    fn system_prompt(&self) -> String {
        let store = self.store.read();
        let mut prompt = String::from(
            "You are a PostgreSQL analyst. Answer the user's question with exactly one SQL \
             statement and nothing else: no prose, no markdown. If the question cannot be \
             answered against the schema below, respond with an empty string.",
        );

        if !store.ddl.is_empty() {
            prompt.push_str("\n\nSchema:\n");
            for ddl in &store.ddl {
                prompt.push_str(ddl.trim());
                prompt.push('\n');
            }
        }

        if !store.examples.is_empty() {
            prompt.push_str("\nExamples of questions and their SQL:\n");
            for (question, sql) in &store.examples {
                prompt.push_str("-- ");
                prompt.push_str(question);
                prompt.push('\n');
                prompt.push_str(sql.trim());
                prompt.push('\n');
            }
        }

        prompt
    }
}

/// Models wrap SQL in markdown fences despite instructions; strip one layer.
fn strip_sql_fences(raw: &str) -> String {
    let trimmed = raw.trim();
    let inner = trimmed
        .strip_prefix("```sql")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    inner.strip_suffix("```").unwrap_or(inner).trim().to_string()
}
