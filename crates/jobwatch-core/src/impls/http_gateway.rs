//! HttpExecutionGateway - DeepOrigin Platform の executions REST API
//!
//! ```text
//! GET   {base}tools/{org}/tools/executions/{id}
//! GET   {base}tools/{org}/tools/executions?page=&pageSize=&order=&filter=
//! PATCH {base}tools/{org}/tools/executions/{id}:cancel
//! PATCH {base}tools/{org}/tools/executions/{id}:confirm
//! ```

use async_trait::async_trait;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client as ReqwestClient, Method, Response, Url};
use serde::de::DeserializeOwned;
use tracing::{debug, error};

use crate::config::ClientConfig;
use crate::domain::{ExecutionDto, ExecutionId};
use crate::ports::{ExecutionGateway, ExecutionPage, GatewayError, ListQuery};

/// Gateway backed by the platform REST API. Cheap to clone (pooled connection).
#[derive(Clone)]
pub struct HttpExecutionGateway {
    client: ReqwestClient,
    executions_url: Url,
}

impl HttpExecutionGateway {
    pub fn new(config: &ClientConfig) -> Result<Self, GatewayError> {
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", config.token))
            .map_err(|e| GatewayError::Unauthorized(format!("invalid token: {e}")))?;
        auth.set_sensitive(true);
        headers.insert(header::AUTHORIZATION, auth);
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));

        let client = ReqwestClient::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        let mut executions_url = Url::parse(&config.base_url)
            .map_err(|e| GatewayError::Transport(format!("invalid base url: {e}")))?;
        executions_url
            .path_segments_mut()
            .map_err(|_| GatewayError::Transport("base url cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(["tools", config.org_key.as_str(), "tools", "executions"]);

        Ok(Self {
            client,
            executions_url,
        })
    }

    /// `executions/{id}` or `executions/{id}{suffix}` (e.g. `:cancel`).
    fn execution_url(&self, id: &ExecutionId, suffix: &str) -> Url {
        let mut url = self.executions_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.push(&format!("{id}{suffix}"));
        }
        url
    }

    async fn send<T: DeserializeOwned>(&self, method: Method, url: Url) -> Result<T, GatewayError> {
        debug!(%method, %url, "gateway request");
        let response = self
            .client
            .request(method, url)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "request failed");
                if e.is_timeout() {
                    GatewayError::Timeout
                } else {
                    GatewayError::Transport(e.to_string())
                }
            })?;
        handle_response(response).await
    }
}

async fn handle_response<T: DeserializeOwned>(response: Response) -> Result<T, GatewayError> {
    let status = response.status();
    if status.is_success() {
        return response.json().await.map_err(|e| {
            if e.is_timeout() {
                GatewayError::Timeout
            } else {
                error!(error = %e, "failed to decode response");
                GatewayError::Decode(e.to_string())
            }
        });
    }

    let status_code = status.as_u16();
    let body = response.text().await.unwrap_or_default();
    error!(status = status_code, body = %body, "request failed with non-success status");
    match status_code {
        401 | 403 => Err(GatewayError::Unauthorized(body)),
        404 => Err(GatewayError::NotFound(body)),
        _ => Err(GatewayError::Api {
            status: status_code,
            body,
        }),
    }
}

#[async_trait]
impl ExecutionGateway for HttpExecutionGateway {
    async fn get(&self, id: &ExecutionId) -> Result<ExecutionDto, GatewayError> {
        self.send(Method::GET, self.execution_url(id, "")).await
    }

    async fn list(&self, query: &ListQuery) -> Result<ExecutionPage, GatewayError> {
        let mut url = self.executions_url.clone();
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("page", &query.page.to_string())
                .append_pair("pageSize", &query.page_size.to_string());
            if let Some(order) = &query.order {
                pairs.append_pair("order", order);
            }
            if let Some(filter) = &query.filter {
                pairs.append_pair("filter", filter);
            }
        }
        self.send(Method::GET, url).await
    }

    async fn cancel(&self, id: &ExecutionId) -> Result<ExecutionDto, GatewayError> {
        self.send(Method::PATCH, self.execution_url(id, ":cancel"))
            .await
    }

    async fn confirm(&self, id: &ExecutionId) -> Result<ExecutionDto, GatewayError> {
        self.send(Method::PATCH, self.execution_url(id, ":confirm"))
            .await
    }
}
