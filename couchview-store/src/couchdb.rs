//! CouchDB connection over HTTP.
//!
//! Uses the CouchDB HTTP API for design documents and view queries.

use crate::error::{StoreError, StoreResult};
use crate::StoreConnection;
use async_trait::async_trait;
use couchview_types::{DesignDocument, QueryParams, ViewResponse, DESIGN_PREFIX};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// CouchDB connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchDbConfig {
    /// Server base URL (e.g. `http://127.0.0.1:5984`).
    pub url: String,
    /// Database name.
    pub database: String,
    /// Basic auth user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Basic auth password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Per-request timeout (in seconds).
    pub timeout_secs: u64,
}

impl Default for CouchDbConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:5984".to_string(),
            database: "couchview".to_string(),
            username: None,
            password: None,
            timeout_secs: 30,
        }
    }
}

/// Body of a successful document write.
#[derive(Debug, Deserialize)]
struct PutResponse {
    rev: String,
}

/// A connection to one CouchDB database.
pub struct CouchDbConnection {
    config: CouchDbConfig,
    client: Client,
    name: String,
}

impl CouchDbConnection {
    /// Creates a connection. No request is made until first use.
    pub fn new(config: CouchDbConfig) -> StoreResult<Self> {
        if config.database.is_empty() {
            return Err(StoreError::InvalidConfig("database name is empty".to_string()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| StoreError::InvalidConfig(format!("failed to create HTTP client: {e}")))?;

        let name = format!("couchdb:{}/{}", config.url.trim_end_matches('/'), config.database);
        Ok(Self {
            config,
            client,
            name,
        })
    }

    pub fn config(&self) -> &CouchDbConfig {
        &self.config
    }

    fn database_url(&self) -> String {
        format!(
            "{}/{}",
            self.config.url.trim_end_matches('/'),
            urlencoding::encode(&self.config.database)
        )
    }

    /// Document URL. The `_design/` prefix stays a literal path segment.
    fn document_url(&self, id: &str) -> String {
        match id.strip_prefix(DESIGN_PREFIX) {
            Some(namespace) => format!(
                "{}/_design/{}",
                self.database_url(),
                urlencoding::encode(namespace)
            ),
            None => format!("{}/{}", self.database_url(), urlencoding::encode(id)),
        }
    }

    fn request(&self, method: Method, url: String) -> RequestBuilder {
        let request = self.client.request(method, url);
        match &self.config.username {
            Some(user) => request.basic_auth(user, self.config.password.as_deref()),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder, what: &str) -> StoreResult<Response> {
        request
            .send()
            .await
            .map_err(|e| StoreError::Network(format!("{what} failed: {e}")))
    }
}

async fn read_body(response: Response, what: &str) -> StoreResult<String> {
    response
        .text()
        .await
        .map_err(|e| StoreError::Network(format!("read {what} body failed: {e}")))
}

async fn http_error(response: Response) -> StoreError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    StoreError::Http { status, body }
}

#[async_trait]
impl StoreConnection for CouchDbConnection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get_design_document(&self, id: &str) -> StoreResult<Option<DesignDocument>> {
        debug!("Fetching design document {} from {}", id, self.name);

        let request = self.request(Method::GET, self.document_url(id));
        let response = self.send(request, "design document fetch").await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(http_error(response).await);
        }

        let body = read_body(response, "design document").await?;
        Ok(Some(serde_json::from_str(&body)?))
    }

    async fn put_design_document(&self, doc: &DesignDocument) -> StoreResult<String> {
        debug!("Writing design document {} to {}", doc.id, self.name);

        let request = self.request(Method::PUT, self.document_url(&doc.id)).json(doc);
        let response = self.send(request, "design document write").await?;

        if response.status() == StatusCode::CONFLICT {
            return Err(StoreError::Conflict(doc.id.clone()));
        }
        if !response.status().is_success() {
            return Err(http_error(response).await);
        }

        let body = read_body(response, "design document write").await?;
        let written: PutResponse = serde_json::from_str(&body)?;

        info!("Wrote design document {} (rev {})", doc.id, written.rev);
        Ok(written.rev)
    }

    async fn query_view(
        &self,
        design_id: &str,
        view: &str,
        params: &QueryParams,
    ) -> StoreResult<ViewResponse> {
        let url = format!(
            "{}/_view/{}",
            self.document_url(design_id),
            urlencoding::encode(view)
        );
        let pairs = params.to_query_pairs()?;

        debug!("Querying view {}/{} on {} {:?}", design_id, view, self.name, pairs);

        let request = self.request(Method::GET, url).query(&pairs);
        let response = self.send(request, "view query").await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound(format!("{design_id}/_view/{view}")));
        }
        if !response.status().is_success() {
            return Err(http_error(response).await);
        }

        let body = read_body(response, "view query").await?;
        Ok(serde_json::from_str(&body)?)
    }
}
