//! JSON-over-HTTP transport for a GitHub-style REST API.
//!
//! Keys are paths relative to the configured base URL. Status codes map onto
//! the content conventions of the core:
//!
//! | Response                                  | Content          |
//! |-------------------------------------------|------------------|
//! | `204 No Content` on `GET` or `PUT`        | `true`           |
//! | `204 No Content` on `DELETE`              | `false`          |
//! | `404 Not Found` on a `GET` presence check | `false`          |
//! | `404 Not Found` on any other `GET`        | `null` (absent)  |
//! | 2xx with an empty body                    | `null`           |
//! | 2xx with a JSON body                      | the parsed body  |
//! | anything else                             | transport error  |
//!
//! Presence checks are endpoints such as `user/starred/{owner}/{name}` that
//! answer "is this relationship there" with 204 or 404, so "no" is cached as
//! content rather than treated as a missing resource.
//!
//! A `null` write payload is sent as `DELETE`, anything else as `PUT`.

use anyhow::{Context, Result, bail};
use futures::FutureExt;
use futures::future::BoxFuture;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{Client, Method, Response, StatusCode};
use serde_json::Value;

use super::Transport;
use crate::config::TransportConfig;
use crate::core::ResourceKey;

const ACCEPT_JSON: &str = "application/vnd.github+json";

/// Key prefixes of endpoints that answer with 204 (yes) or 404 (no).
const PRESENCE_PREFIXES: &[&str] = &["user/starred/", "user/following/"];

/// A [`Transport`] backed by a `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    /// Build a client from transport settings.
    pub fn new(config: &TransportConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_JSON));
        if let Some(token) = &config.token {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
                .context("Access token contains invalid header characters")?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .default_headers(headers)
            .timeout(config.timeout())
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// The absolute URL for `key`.
    pub fn url_for(&self, key: &ResourceKey) -> String {
        format!("{}/{}", self.base_url, key)
    }

    async fn send(&self, method: Method, key: &ResourceKey, body: Option<&Value>) -> Result<Value> {
        let url = self.url_for(key);
        tracing::debug!(target: "transport", "{method} {url}");

        let mut request = self.client.request(method.clone(), &url);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await.with_context(|| format!("{method} {url} failed"))?;

        into_content(&method, key, response)
            .await
            .with_context(|| format!("{method} {url} failed"))
    }
}

fn is_presence_check(key: &ResourceKey) -> bool {
    PRESENCE_PREFIXES.iter().any(|prefix| key.as_str().starts_with(prefix))
}

/// Content implied by the status line alone, without reading a body.
fn status_content(method: &Method, key: &ResourceKey, status: StatusCode) -> Option<Value> {
    match status {
        StatusCode::NO_CONTENT => Some(Value::Bool(*method != Method::DELETE)),
        StatusCode::NOT_FOUND if *method == Method::GET && is_presence_check(key) => {
            Some(Value::Bool(false))
        }
        StatusCode::NOT_FOUND if *method == Method::GET => Some(Value::Null),
        _ => None,
    }
}

async fn into_content(method: &Method, key: &ResourceKey, response: Response) -> Result<Value> {
    let status = response.status();
    if let Some(content) = status_content(method, key, status) {
        return Ok(content);
    }

    match status {
        status if status.is_success() => {
            let body = response.bytes().await.context("Failed to read response body")?;
            if body.iter().all(u8::is_ascii_whitespace) {
                return Ok(Value::Null);
            }
            serde_json::from_slice(&body).context("Response body is not valid JSON")
        }
        status => {
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|value| value.get("message").and_then(Value::as_str).map(str::to_string))
                .unwrap_or(body);
            if detail.is_empty() {
                bail!("HTTP {status}");
            }
            bail!("HTTP {status}: {detail}")
        }
    }
}

impl Transport for HttpTransport {
    fn fetch<'a>(&'a self, key: &'a ResourceKey) -> BoxFuture<'a, Result<Value>> {
        self.send(Method::GET, key, None).boxed()
    }

    fn write<'a>(
        &'a self,
        key: &'a ResourceKey,
        payload: &'a Value,
    ) -> BoxFuture<'a, Result<Value>> {
        if payload.is_null() {
            self.send(Method::DELETE, key, None).boxed()
        } else {
            self.send(Method::PUT, key, Some(payload)).boxed()
        }
    }
}
