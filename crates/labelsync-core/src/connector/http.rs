//! Shared HTTP plumbing for the REST connectors.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, LINK};
use reqwest::{Method, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::connector::ConnectorResult;
use crate::domain::ConnectorError;

pub const USER_AGENT: &str = "labelsync";

/// Page size requested from list endpoints (the maximum both services allow).
pub const PER_PAGE: u32 = 100;

/// Percent-encode one path segment (label names may contain spaces or `/`).
pub fn encode_segment(segment: &str) -> String {
    urlencoding::encode(segment).into_owned()
}

/// Extract the `rel="next"` target from an RFC 8288 `Link` header.
pub fn next_page_link(headers: &HeaderMap) -> Option<String> {
    let link = headers.get(LINK)?.to_str().ok()?;
    link.split(',').find_map(|entry| {
        let mut parts = entry.split(';');
        let target = parts.next()?.trim();
        let is_next = parts.any(|param| {
            let param = param.trim();
            param == "rel=\"next\"" || param == "rel=next"
        });
        if !is_next {
            return None;
        }
        target
            .strip_prefix('<')
            .and_then(|t| t.strip_suffix('>'))
            .map(str::to_string)
    })
}

/// reqwest client with fixed auth headers and error mapping.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    timeout: Duration,
}

impl ApiClient {
    /// Build a client that sends `auth_header: auth_value` on every request.
    pub fn new(auth_header: &'static str, auth_value: &str, timeout: Duration) -> ConnectorResult<Self> {
        let mut headers = HeaderMap::new();
        let mut value = HeaderValue::from_str(auth_value)
            .map_err(|e| ConnectorError::Transport(format!("invalid credential header: {e}")))?;
        value.set_sensitive(true);
        headers.insert(HeaderName::from_static(auth_header), value);

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| ConnectorError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, timeout })
    }

    fn map_error(&self, err: reqwest::Error) -> ConnectorError {
        if err.is_timeout() {
            ConnectorError::timeout(self.timeout)
        } else {
            ConnectorError::from(err)
        }
    }

    /// GET `url` and every page linked after it, concatenating the results.
    pub async fn get_all<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> ConnectorResult<Vec<T>> {
        let first = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| self.map_error(e))?;
        let mut response = ensure_success(first).await?;
        let mut items = Vec::new();

        loop {
            let next = next_page_link(response.headers());
            let page: Vec<T> = response
                .json()
                .await
                .map_err(|e| ConnectorError::Decode(e.to_string()))?;
            items.extend(page);

            let Some(next) = next else { break };
            debug!(url = %next, "following next page");
            let resp = self
                .client
                .get(&next)
                .send()
                .await
                .map_err(|e| self.map_error(e))?;
            response = ensure_success(resp).await?;
        }

        Ok(items)
    }

    /// Send a JSON body and discard the response body.
    pub async fn send_json<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: &str,
        body: &B,
    ) -> ConnectorResult<()> {
        let resp = self
            .client
            .request(method, url)
            .json(body)
            .send()
            .await
            .map_err(|e| self.map_error(e))?;
        ensure_success(resp).await.map(|_| ())
    }

    pub async fn delete(&self, url: &str) -> ConnectorResult<()> {
        let resp = self
            .client
            .delete(url)
            .send()
            .await
            .map_err(|e| self.map_error(e))?;
        ensure_success(resp).await.map(|_| ())
    }
}

/// Turn a non-2xx response into [`ConnectorError::Status`].
pub async fn ensure_success(resp: Response) -> ConnectorResult<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let message = resp
        .text()
        .await
        .unwrap_or_else(|e| format!("<unreadable body: {e}>"));
    Err(ConnectorError::Status {
        status: status.as_u16(),
        message,
    })
}
