//! Capability provider reached over HTTP.
//!
//! The tool's arguments are POSTed as a JSON body; a JSON response is the
//! tool result, any other body is returned as a string. Non-2xx statuses
//! are errors.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::header::CONTENT_TYPE;
use serde_json::Value;

use wf_domain::config::ToolEndpointConfig;
use wf_domain::tool::ToolDefinition;

use crate::catalog;
use crate::registry::Capability;

pub struct HttpCapability {
    definition: ToolDefinition,
    url: String,
    client: reqwest::Client,
}

impl HttpCapability {
    /// Build from config. The catalogue supplies the description and schema
    /// unless the endpoint overrides them.
    pub fn from_config(cfg: &ToolEndpointConfig, timeout_ms: u64) -> Result<Self> {
        let base = catalog::definition(&cfg.name);
        let description = cfg
            .description
            .clone()
            .or_else(|| base.as_ref().map(|d| d.description.clone()))
            .unwrap_or_else(|| format!("External capability {}", cfg.name));
        let parameters = cfg
            .parameters
            .clone()
            .or_else(|| base.map(|d| d.parameters))
            .unwrap_or_else(|| serde_json::json!({ "type": "object" }));

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .with_context(|| format!("build reqwest client for {}", cfg.name))?;

        Ok(Self {
            definition: ToolDefinition {
                name: cfg.name.clone(),
                description,
                parameters,
            },
            url: cfg.url.clone(),
            client,
        })
    }
}

#[async_trait::async_trait]
impl Capability for HttpCapability {
    fn definition(&self) -> ToolDefinition {
        self.definition.clone()
    }

    async fn call(&self, args: Value) -> Result<Value> {
        let resp = self
            .client
            .post(&self.url)
            .json(&args)
            .send()
            .await
            .with_context(|| format!("{} request failed", self.definition.name))?;

        let status = resp.status();
        let is_json = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("json"));
        let body = resp.text().await.context("reading response body")?;

        if !status.is_success() {
            bail!("HTTP {} - {}", status.as_u16(), body);
        }
        if is_json {
            return serde_json::from_str(&body).context("decoding JSON response");
        }
        Ok(Value::String(body))
    }
}
