//! Connector speaking JSON over HTTP to an RFC gateway
//!
//! ## Protocol
//!
//! ```text
//! POST   {url}/sessions              connection parameters -> {"session": "<id>"}
//! POST   {url}/sessions/{id}/call    {"function", "params"} -> tables
//! DELETE {url}/sessions/{id}
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use crate::{
    config::{GatewayConfig, ServerTarget, SystemTarget},
    error::{CollectError, CollectResult},
    value::{Row, Value},
};

use super::{Connector, Session};

/// Connection parameters forwarded to the gateway
#[derive(Debug, Serialize)]
struct ConnectionParameters<'a> {
    dest: &'a str,
    user: &'a str,
    passwd: &'a str,
    client: &'a str,
    lang: &'a str,
    ashost: &'a str,
    sysnr: &'a str,
}

#[derive(Debug, Deserialize)]
struct SessionCreated {
    session: String,
}

#[derive(Debug, Serialize)]
struct CallRequest<'a> {
    function: &'a str,
    params: &'a BTreeMap<String, Value>,
}

/// Connector opening sessions through the gateway
///
/// The HTTP client is shared by all sessions.
#[derive(Debug, Clone)]
pub struct GatewayConnector {
    client: reqwest::Client,
    url: String,
}

impl GatewayConnector {
    pub fn new(config: &GatewayConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            url: config.url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl Connector for GatewayConnector {
    async fn connect(
        &self,
        system: &SystemTarget,
        server: &ServerTarget,
    ) -> CollectResult<Box<dyn Session>> {
        let params = ConnectionParameters {
            dest: &system.name,
            user: &system.user,
            passwd: system.password.as_deref().unwrap_or_default(),
            client: &system.client,
            lang: &system.lang,
            ashost: &server.name,
            sysnr: &server.sysnr,
        };

        let response = self
            .client
            .post(format!("{}/sessions", self.url))
            .json(&params)
            .send()
            .await
            .map_err(|e| CollectError::Connection(e.to_string()))?;

        if !response.status().is_success() {
            return Err(CollectError::Connection(format!(
                "gateway answered with {}",
                response.status()
            )));
        }

        let created: SessionCreated = response
            .json()
            .await
            .map_err(|e| CollectError::Connection(format!("invalid session response: {e}")))?;

        trace!(system = %system.name, server = %server.name, session = %created.session, "opened session");

        Ok(Box::new(GatewaySession {
            client: self.client.clone(),
            url: format!("{}/sessions/{}", self.url, created.session),
        }))
    }
}

struct GatewaySession {
    client: reqwest::Client,
    url: String,
}

#[async_trait]
impl Session for GatewaySession {
    async fn call(
        &mut self,
        function: &str,
        params: &BTreeMap<String, Value>,
    ) -> CollectResult<Row> {
        let response = self
            .client
            .post(format!("{}/call", self.url))
            .json(&CallRequest { function, params })
            .send()
            .await
            .map_err(|e| CollectError::Call(e.to_string()))?;

        if !response.status().is_success() {
            return Err(CollectError::Call(format!(
                "{function} answered with {}",
                response.status()
            )));
        }

        response
            .json::<Row>()
            .await
            .map_err(|e| CollectError::MalformedResponse(format!("{function}: {e}")))
    }

    async fn close(&mut self) {
        match self.client.delete(&self.url).send().await {
            Ok(response) if response.status().is_success() => trace!("closed session {}", self.url),
            Ok(response) => warn!("closing session {} answered with {}", self.url, response.status()),
            Err(e) => warn!("failed to close session {}: {e}", self.url),
        }
    }
}
