//! Record-lookup demo pipeline: auth -> logging -> db
//!
//! Used by the `pipechain` binary. Each stage fails with its own error type,
//! and only the logging stage ever sees those failures.

use crate::core::{
    CancellationToken, ContinuationStep, ErrorAwareStep, Halt, Next, Outcome, PipelineSettings,
    ResultNext, TerminalStep,
};
use crate::execution::Pipeline;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Incoming lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupRequest {
    pub user: String,
}

/// Lookup after authentication
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthedRequest {
    pub user: String,
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("request has no user")]
    MissingUser,
}

/// Error the db stage reports for unknown users
pub const NOT_FOUND: &str = "not-found";

/// Attaches a session token before handing the request on
pub struct AuthStep {
    token: String,
}

impl AuthStep {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl ContinuationStep<LookupRequest, Record> for AuthStep {
    type NextRequest = AuthedRequest;
    type NextResponse = Record;

    fn name(&self) -> &str {
        "auth"
    }

    async fn handle(
        &self,
        request: LookupRequest,
        next: Next<AuthedRequest, Record>,
        _cancel: &CancellationToken,
    ) -> Result<Record, Halt> {
        if request.user.trim().is_empty() {
            return Err(Halt::error(AuthError::MissingUser));
        }

        debug!("Authenticated {}", request.user);
        next.run(AuthedRequest {
            user: request.user,
            token: self.token.clone(),
        })
        .await
    }
}

/// Logs downstream failures and passes every outcome through untouched
pub struct LoggingStep;

#[async_trait]
impl<Req, Res> ErrorAwareStep<Req, Res> for LoggingStep
where
    Req: Send + 'static,
    Res: Send + 'static,
{
    type NextRequest = Req;
    type NextResponse = Res;

    fn name(&self) -> &str {
        "logging"
    }

    async fn handle(
        &self,
        request: Req,
        next: ResultNext<Req, Res>,
        _cancel: &CancellationToken,
    ) -> Outcome<Res> {
        let outcome = next.run(request).await;
        match &outcome {
            Outcome::Ok(_) => debug!("Downstream succeeded"),
            Outcome::Error(payload) if payload.is_cancelled() => info!("Downstream cancelled"),
            Outcome::Error(payload) => warn!(
                "Downstream failed with {}: {:?}",
                payload.type_name(),
                payload
            ),
        }
        outcome
    }
}

/// In-memory user table standing in for a database
pub struct DbStep {
    records: HashMap<String, u64>,
    latency: Duration,
}

impl DbStep {
    pub fn new(records: HashMap<String, u64>, latency: Duration) -> Self {
        Self { records, latency }
    }
}

#[async_trait]
impl TerminalStep<AuthedRequest, Record> for DbStep {
    fn name(&self) -> &str {
        "db"
    }

    async fn handle(&self, request: AuthedRequest, cancel: &CancellationToken) -> Outcome<Record> {
        tokio::select! {
            _ = cancel.cancelled() => return Outcome::cancelled(),
            _ = tokio::time::sleep(self.latency) => {}
        }

        match self.records.get(&request.user) {
            Some(&id) => Outcome::ok(Record { id }),
            None => Outcome::error(NOT_FOUND),
        }
    }
}

/// Demo binary configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemoConfig {
    #[serde(default = "default_pipeline")]
    pub pipeline: PipelineSettings,

    /// Token the auth stage hands out
    #[serde(default = "default_token")]
    pub token: String,

    /// Simulated db latency
    #[serde(default)]
    pub latency_ms: u64,

    /// Cancel the run after this long
    #[serde(default)]
    pub timeout_ms: Option<u64>,

    /// user -> record id
    #[serde(default = "default_records")]
    pub records: HashMap<String, u64>,
}

fn default_pipeline() -> PipelineSettings {
    PipelineSettings::named("lookup")
}

fn default_token() -> String {
    "t1".to_string()
}

fn default_records() -> HashMap<String, u64> {
    HashMap::from([("bob".to_string(), 42), ("alice".to_string(), 7)])
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            pipeline: default_pipeline(),
            token: default_token(),
            latency_ms: 0,
            timeout_ms: None,
            records: default_records(),
        }
    }
}

impl DemoConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: DemoConfig = serde_yaml::from_str(yaml).context("Invalid demo config")?;
        config.pipeline.validate()?;
        Ok(config)
    }
}

/// Assemble the auth -> logging -> db pipeline
pub fn build_pipeline(config: &DemoConfig) -> Pipeline<LookupRequest, Record> {
    Pipeline::builder_with(config.pipeline.clone())
        .step(AuthStep::new(config.token.clone()))
        .error_aware(LoggingStep)
        .terminal(DbStep::new(
            config.records.clone(),
            Duration::from_millis(config.latency_ms),
        ))
}

/// JSON summary of a run for the command line
pub fn report(outcome: &Outcome<Record>) -> Value {
    match outcome {
        Outcome::Ok(record) => json!({ "status": "ok", "record": record }),
        Outcome::Error(payload) if payload.is_cancelled() => json!({ "status": "cancelled" }),
        Outcome::Error(payload) => json!({
            "status": "error",
            "error_type": payload.type_name(),
            "error": format!("{}", payload),
        }),
    }
}
