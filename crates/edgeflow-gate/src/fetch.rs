//! Metrics retrieval over plain HTTP/1.1.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use edgeflow_core::{EdgeflowConfig, RetryPolicy, parse_duration};
use http_body_util::{BodyExt, Empty};
use serde_json::Value;
use tracing::debug;

use crate::error::GateError;
use crate::evaluate::MetricSnapshot;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Default per-request timeout for metrics endpoints.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const USER_AGENT: &str = concat!("edgeflow-gate/", env!("CARGO_PKG_VERSION"));

/// GET `url` and decode the body as JSON.
///
/// Connection failures, non-2xx statuses, undecodable bodies and the
/// timeout all map to [`GateError::MetricsFetch`].
pub async fn fetch_json(url: &str, timeout: Duration) -> Result<Value, GateError> {
    let uri: http::Uri = url.parse().map_err(|e| GateError::fetch(url, format!("invalid URL: {e}")))?;
    if uri.scheme_str().is_some_and(|s| s != "http") {
        return Err(GateError::fetch(url, "only http:// endpoints are supported"));
    }
    let host = uri
        .host()
        .ok_or_else(|| GateError::fetch(url, "URL has no host"))?
        .to_string();
    let port = uri.port_u16().unwrap_or(80);
    let authority = format!("{host}:{port}");
    let path = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/").to_string();

    let result = tokio::time::timeout(timeout, async {
        let stream = tokio::net::TcpStream::connect(&authority)
            .await
            .map_err(|e| GateError::fetch(url, format!("connection failed: {e}")))?;

        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| GateError::fetch(url, format!("handshake failed: {e}")))?;

        tokio::spawn(async move {
            let _ = conn.await;
        });

        let req = http::Request::builder()
            .method("GET")
            .uri(&path)
            .header("host", &authority)
            .header("user-agent", USER_AGENT)
            .header("accept", "application/json")
            .body(Empty::<Bytes>::new())
            .map_err(|e| GateError::fetch(url, e))?;

        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| GateError::fetch(url, format!("request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            debug!(%status, %url, "metrics endpoint non-2xx");
            return Err(GateError::fetch(url, format!("HTTP {status}")));
        }

        let body = resp
            .into_body()
            .collect()
            .await
            .map_err(|e| GateError::fetch(url, format!("reading body: {e}")))?
            .to_bytes();
        serde_json::from_slice::<Value>(&body)
            .map_err(|e| GateError::fetch(url, format!("invalid JSON: {e}")))
    })
    .await;

    match result {
        Ok(value) => value,
        Err(_) => {
            debug!(%url, "metrics fetch timed out");
            Err(GateError::fetch(url, format!("timed out after {}s", timeout.as_secs_f64())))
        }
    }
}

/// Fetch `url` and extract its numeric fields.
pub async fn fetch_metrics(url: &str, timeout: Duration) -> Result<MetricSnapshot, GateError> {
    let value = fetch_json(url, timeout).await?;
    MetricSnapshot::from_json(&value).map_err(|reason| GateError::fetch(url, reason))
}

/// Where a gate reads the current metrics of a target.
pub trait MetricsSource: Send + Sync {
    fn fetch<'a>(&'a self, target: &'a str) -> BoxFuture<'a, Result<MetricSnapshot, GateError>>;
}

/// Metrics read from per-target HTTP endpoints.
#[derive(Debug, Clone)]
pub struct HttpMetricsSource {
    endpoints: BTreeMap<String, String>,
    fallback: Option<String>,
    timeout: Duration,
    retry: RetryPolicy,
}

impl HttpMetricsSource {
    /// One URL for every target.
    pub fn single(url: impl Into<String>) -> Self {
        Self {
            endpoints: BTreeMap::new(),
            fallback: Some(url.into()),
            timeout: DEFAULT_TIMEOUT,
            retry: RetryPolicy::none(),
        }
    }

    /// Endpoints from each site's `metrics_url`, with the configured gate
    /// timeout and retry policy.
    pub fn from_config(config: &EdgeflowConfig) -> Result<Self, edgeflow_core::ConfigError> {
        let endpoints = config
            .sites
            .iter()
            .filter_map(|(site, c)| c.metrics_url.clone().map(|url| (site.clone(), url)))
            .collect();
        Ok(Self {
            endpoints,
            fallback: None,
            timeout: parse_duration(&config.rollout.gate_timeout)?,
            retry: config.rollout.retry.policy()?,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn endpoint(&self, target: &str) -> Option<&str> {
        self.endpoints
            .get(target)
            .or(self.fallback.as_ref())
            .map(String::as_str)
    }
}

impl MetricsSource for HttpMetricsSource {
    fn fetch<'a>(&'a self, target: &'a str) -> BoxFuture<'a, Result<MetricSnapshot, GateError>> {
        Box::pin(async move {
            let url = self.endpoint(target).ok_or_else(|| GateError::MetricsFetch {
                url: String::new(),
                reason: format!("no metrics endpoint configured for target {target:?}"),
            })?;
            debug!(%target, %url, "fetching metrics");
            self.retry
                .run(&format!("metrics fetch for {target}"), |_| fetch_metrics(url, self.timeout))
                .await
        })
    }
}

/// Fixed per-target snapshots, for dry runs and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticMetricsSource {
    snapshots: BTreeMap<String, MetricSnapshot>,
}

impl StaticMetricsSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, target: impl Into<String>, snapshot: MetricSnapshot) -> Self {
        self.snapshots.insert(target.into(), snapshot);
        self
    }
}

impl MetricsSource for StaticMetricsSource {
    fn fetch<'a>(&'a self, target: &'a str) -> BoxFuture<'a, Result<MetricSnapshot, GateError>> {
        Box::pin(async move {
            self.snapshots
                .get(target)
                .cloned()
                .ok_or_else(|| GateError::MetricsFetch {
                    url: format!("static://{target}"),
                    reason: "no snapshot recorded".to_string(),
                })
        })
    }
}
