use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use serde_json::Value;
use std::time::Duration;

use crate::config::Credentials;
use crate::error::ProbeError;

const USER_AGENT: &str = concat!("supabase_handshake/", env!("CARGO_PKG_VERSION"));

/// Minimal client for the PostgREST endpoint of a Supabase project.
pub struct RestClient {
    http: reqwest::Client,
    base: reqwest::Url,
    host: String,
}

/// Rows returned by a read query.
#[derive(Debug, Clone)]
pub struct QueryResult {
    pub status: u16,
    pub rows: Vec<Value>,
}

impl QueryResult {
    pub fn count(&self) -> usize {
        self.rows.len()
    }
}

impl RestClient {
    pub fn new(creds: &Credentials, timeout: Duration) -> Result<Self, ProbeError> {
        let mut headers = HeaderMap::new();
        let mut apikey = HeaderValue::from_str(creds.key()).map_err(|_| {
            ProbeError::Config("api key contains characters not allowed in an HTTP header".into())
        })?;
        apikey.set_sensitive(true);
        let mut bearer = HeaderValue::from_str(&format!("Bearer {}", creds.key()))
            .map_err(|_| ProbeError::Config("api key is not a valid bearer token".into()))?;
        bearer.set_sensitive(true);
        headers.insert("apikey", apikey);
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| ProbeError::Config(format!("failed to build http client: {}", e)))?;

        Ok(RestClient {
            http,
            base: creds.url().clone(),
            host: creds.host().to_string(),
        })
    }

    /// Start a query against `table`.
    pub fn from<'a>(&'a self, table: &'a str) -> QueryBuilder<'a> {
        QueryBuilder {
            client: self,
            table,
            columns: "*".to_string(),
            limit: None,
        }
    }

    fn table_url(&self, table: &str) -> Result<reqwest::Url, ProbeError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| {
                ProbeError::Config(format!("url '{}' cannot be used as a base", self.base))
            })?
            .pop_if_empty()
            .extend(["rest", "v1", table]);
        url.set_query(None);
        Ok(url)
    }
}

pub struct QueryBuilder<'a> {
    client: &'a RestClient,
    table: &'a str,
    columns: String,
    limit: Option<u32>,
}

impl<'a> QueryBuilder<'a> {
    pub fn select(mut self, columns: &str) -> Self {
        self.columns = columns.to_string();
        self
    }

    pub fn limit(mut self, n: u32) -> Self {
        self.limit = Some(n);
        self
    }

    pub async fn execute(self) -> Result<QueryResult, ProbeError> {
        let url = self.client.table_url(self.table)?;
        let mut params = vec![("select", self.columns.clone())];
        if let Some(n) = self.limit {
            params.push(("limit", n.to_string()));
        }

        tracing::debug!(
            host = %self.client.host,
            table = self.table,
            limit = ?self.limit,
            "GET {}",
            url.path()
        );
        let resp = self
            .client
            .http
            .get(url)
            .query(&params)
            .send()
            .await
            .map_err(|source| ProbeError::Connection {
                host: self.client.host.clone(),
                source,
            })?;

        let status = resp.status();
        let body = resp.text().await.map_err(|source| ProbeError::Connection {
            host: self.client.host.clone(),
            source,
        })?;
        tracing::debug!(
            status = status.as_u16(),
            bytes = body.len(),
            "response received"
        );

        if !status.is_success() {
            return Err(ProbeError::from_response(status.as_u16(), self.table, &body));
        }

        let rows: Vec<Value> = serde_json::from_str(&body)
            .map_err(|e| ProbeError::Decode(format!("expected a JSON array of rows: {}", e)))?;
        Ok(QueryResult {
            status: status.as_u16(),
            rows,
        })
    }
}
