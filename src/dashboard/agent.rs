//! HTTP client for the external agent that owns quest execution.
//!
//! The endpoint is resolved on every call so that edits on the settings
//! page take effect without a restart: the `gateway_url` /
//! `gateway_token` settings rows win over the `[agent]` config section.

use std::time::Duration;

use anyhow::Context;
use reqwest::Method;
use serde::Deserialize;
use serde_json::Value;

use super::store::SharedStore;
use crate::config::AgentSection;
use crate::errors::ControlError;

pub const GATEWAY_URL_KEY: &str = "gateway_url";
pub const GATEWAY_TOKEN_KEY: &str = "gateway_token";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const STATUS_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq)]
pub struct AgentEndpoint {
    pub url: String,
    pub token: Option<String>,
}

impl AgentEndpoint {
    fn join(&self, path: &str) -> String {
        format!("{}/{}", self.url, path.trim_start_matches('/'))
    }
}

#[derive(Deserialize)]
struct StatusReply {
    status: String,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub struct AgentClient {
    http: reqwest::Client,
    store: SharedStore,
    fallback: AgentSection,
}

impl AgentClient {
    pub fn new(store: SharedStore, fallback: AgentSection) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("control-center/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build agent HTTP client")?;
        Ok(Self {
            http,
            store,
            fallback,
        })
    }

    /// Current agent endpoint, or `None` when neither settings nor config
    /// name one.
    pub async fn endpoint(&self) -> Result<Option<AgentEndpoint>, ControlError> {
        let settings = self.store.list_settings().await?;
        let url = non_empty(settings.get(GATEWAY_URL_KEY).cloned())
            .or_else(|| non_empty(self.fallback.url.clone()));
        let Some(url) = url else {
            return Ok(None);
        };
        let token = non_empty(settings.get(GATEWAY_TOKEN_KEY).cloned())
            .or_else(|| non_empty(self.fallback.token.clone()));
        Ok(Some(AgentEndpoint {
            url: url.trim_end_matches('/').to_string(),
            token,
        }))
    }

    /// Whether `token` matches the configured gateway token.
    pub async fn token_matches(&self, token: &str) -> Result<bool, ControlError> {
        Ok(match self.endpoint().await? {
            Some(AgentEndpoint {
                token: Some(expected),
                ..
            }) => !token.is_empty() && expected == token,
            _ => false,
        })
    }

    async fn send(&self, method: Method, path: &str) -> Result<Value, ControlError> {
        let endpoint = self
            .endpoint()
            .await?
            .ok_or(ControlError::AgentNotConfigured)?;
        let url = endpoint.join(path);

        let mut request = self.http.request(method.clone(), &url);
        if let Some(token) = &endpoint.token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await.map_err(|e| {
            tracing::warn!(url = %url, error = %e, "agent request failed");
            ControlError::Agent(format!("{} {}: {}", method, path, e))
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ControlError::Agent(format!("Failed to read agent response: {}", e)))?;

        if !status.is_success() {
            let message = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_string))
                .unwrap_or_else(|| body.trim().to_string());
            tracing::warn!(url = %url, status = %status, "agent returned an error");
            return Err(ControlError::Agent(format!("{} ({})", message, status)));
        }

        if body.trim().is_empty() {
            return Ok(Value::Object(Default::default()));
        }
        serde_json::from_str(&body)
            .map_err(|e| ControlError::Agent(format!("Agent returned invalid JSON: {}", e)))
    }

    /// Advance the next ready quest by one step.
    pub async fn step(&self) -> Result<Value, ControlError> {
        self.send(Method::POST, "quests/step").await
    }

    /// What `step` would do, without doing it.
    pub async fn dry_run(&self) -> Result<Value, ControlError> {
        self.send(Method::GET, "quests/step/dry-run").await
    }

    pub async fn latest_logs(&self) -> Result<Value, ControlError> {
        self.send(Method::GET, "quests/logs/latest").await
    }

    pub async fn run_quest(&self, id: i64) -> Result<Value, ControlError> {
        self.send(Method::POST, &format!("quests/{}/run", id)).await
    }

    /// Poll `GET <url>/status`. `Ok(None)` when no agent is configured.
    pub async fn fetch_status(&self) -> Result<Option<String>, ControlError> {
        let Some(endpoint) = self.endpoint().await? else {
            return Ok(None);
        };
        let mut request = self
            .http
            .get(endpoint.join("status"))
            .timeout(STATUS_TIMEOUT);
        if let Some(token) = &endpoint.token {
            request = request.bearer_auth(token);
        }
        let reply = request
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ControlError::Agent(e.to_string()))?
            .json::<StatusReply>()
            .await
            .map_err(|e| ControlError::Agent(e.to_string()))?;
        Ok(Some(reply.status))
    }
}
