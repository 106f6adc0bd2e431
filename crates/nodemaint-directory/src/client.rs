use std::time::Duration;

use async_trait::async_trait;
use nodemaint_core::config::DirectoryConfig;
use nodemaint_core::NodeId;
use nodemaint_scheduler::authority::{
    Authority, AuthorityError, EndRequest, PostponeRequest, ScheduleReply, ScheduleRequest,
};
use reqwest::{Method, Url};
use serde::Serialize;
use tracing::{debug, warn};

/// HTTP client for the fleet directory's maintenance API.
pub struct DirectoryClient {
    client: reqwest::Client,
    base_url: Url,
    token: Option<String>,
    node: NodeId,
}

#[derive(Serialize)]
struct ScheduleBody<'a> {
    requests: &'a ScheduleRequest,
}

#[derive(Serialize)]
struct ServiceBody {
    in_service: bool,
}

impl DirectoryClient {
    pub fn new(config: &DirectoryConfig, node: NodeId) -> Result<Self, AuthorityError> {
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            AuthorityError::Transport(format!("invalid directory URL {:?}: {e}", config.base_url))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(AuthorityError::Transport(format!(
                "directory URL {:?} cannot carry a path",
                config.base_url
            )));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AuthorityError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base_url,
            token: config.token.clone(),
            node,
        })
    }

    /// `{base}/v1/nodes/{node}/{tail..}`, with every segment percent-encoded.
    fn node_url(&self, node: &NodeId, tail: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["v1", "nodes", node.as_str()])
                .extend(tail);
        }
        url
    }

    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: Url,
        body: &B,
    ) -> Result<reqwest::Response, AuthorityError> {
        debug!(%method, %url, "calling directory");

        let mut req = self
            .client
            .request(method, url.clone())
            .header("content-type", "application/json")
            .json(body);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }

        let resp = req.send().await.map_err(|e| {
            if e.is_connect() || e.is_timeout() {
                AuthorityError::Unavailable(e.to_string())
            } else {
                AuthorityError::Transport(e.to_string())
            }
        })?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, %url, body = %text, "directory API error");
            return Err(AuthorityError::Api {
                status,
                message: text,
            });
        }
        Ok(resp)
    }
}

#[async_trait]
impl Authority for DirectoryClient {
    fn name(&self) -> &str {
        "directory"
    }

    async fn schedule_maintenance(
        &self,
        requests: &ScheduleRequest,
    ) -> Result<ScheduleReply, AuthorityError> {
        let url = self.node_url(&self.node, &["maintenance", "schedule"]);
        let resp = self
            .send(Method::POST, url, &ScheduleBody { requests })
            .await?;
        resp.json()
            .await
            .map_err(|e| AuthorityError::Parse(e.to_string()))
    }

    async fn postpone_maintenance(&self, requests: &PostponeRequest) -> Result<(), AuthorityError> {
        let url = self.node_url(&self.node, &["maintenance", "postpone"]);
        self.send(Method::POST, url, requests).await?;
        Ok(())
    }

    async fn end_maintenance(&self, requests: &EndRequest) -> Result<(), AuthorityError> {
        let url = self.node_url(&self.node, &["maintenance", "end"]);
        self.send(Method::POST, url, requests).await?;
        Ok(())
    }

    async fn mark_node_service_status(
        &self,
        node: &NodeId,
        in_service: bool,
    ) -> Result<(), AuthorityError> {
        let url = self.node_url(node, &["service"]);
        self.send(Method::PUT, url, &ServiceBody { in_service })
            .await?;
        Ok(())
    }
}
