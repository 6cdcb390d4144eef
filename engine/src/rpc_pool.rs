use crate::config::RpcConfig;
use crate::errors::RpcError;
use anyhow::{Context, Result};
use prometheus::{HistogramVec, IntCounterVec, IntGaugeVec, Registry};
use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE},
    Client, ClientBuilder,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;

/// JSON-RPC 2.0 over a pooled HTTP client.
#[derive(Clone)]
pub struct RpcPool {
    client: Client,
    url: Url,
    next_id: Arc<AtomicU64>,
    metrics: Arc<RpcMetrics>,
}

impl RpcPool {
    pub fn new(cfg: &RpcConfig, registry: &Registry) -> Result<Self> {
        Self::with_url("node", &cfg.url, cfg, registry)
    }

    /// Pool for a different endpoint sharing the same client settings.
    /// `endpoint` tells the pools apart in exported metrics.
    pub fn with_url(endpoint: &str, url: &str, cfg: &RpcConfig, registry: &Registry) -> Result<Self> {
        let client = ClientBuilder::new()
            .tcp_keepalive(Some(Duration::from_secs(30)))
            .pool_max_idle_per_host(cfg.max_connections)
            .gzip(true)
            .connect_timeout(Duration::from_millis(cfg.timeout_ms))
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()
            .context("build reqwest client")?;
        let url = Url::parse(&http_url(url)).context("parse rpc url")?;
        Ok(Self {
            client,
            url,
            next_id: Arc::new(AtomicU64::new(1)),
            metrics: Arc::new(RpcMetrics::new(endpoint, registry)),
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    fn default_headers() -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(ACCEPT, HeaderValue::from_static("application/json"));
        h.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        h
    }

    /// Issues one call and returns its `result`. JSON-RPC level errors come
    /// back as `RpcError::Rpc` so callers can tell reverts from transport failures.
    pub async fn request(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let start = Instant::now();
        self.metrics.inflight.with_label_values(&[method]).inc();
        self.metrics.req_total.with_label_values(&[method]).inc();
        let res = self.send(method, &body).await;
        let dur = start.elapsed().as_secs_f64();
        self.metrics.inflight.with_label_values(&[method]).dec();
        self.metrics
            .latency
            .with_label_values(&[method])
            .observe(dur);
        if res.is_err() {
            self.metrics.fail_total.with_label_values(&[method]).inc();
        }
        let dur_ms = (dur * 1000.0) as u64;
        tracing::debug!(target: "rpc", method=%method, id=%id, ok=%res.is_ok(), latency_ms=%dur_ms, "rpc call completed");
        res
    }

    async fn send(&self, method: &str, body: &Value) -> Result<Value, RpcError> {
        let resp = self
            .client
            .post(self.url.clone())
            .headers(Self::default_headers())
            .json(body)
            .send()
            .await?;
        let status = resp.status();
        let bytes = resp.bytes().await?;
        if !status.is_success() {
            return Err(RpcError::HttpStatus {
                status,
                text: String::from_utf8_lossy(&bytes).to_string(),
            });
        }
        let js: Value = serde_json::from_slice(&bytes)?;
        Self::parse_envelope(method, js)
    }

    fn parse_envelope(method: &str, mut js: Value) -> Result<Value, RpcError> {
        if let Some(err) = js.get("error").filter(|e| !e.is_null()) {
            let code = err.get("code").and_then(|v| v.as_i64()).unwrap_or(0);
            let message = err
                .get("message")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();
            let data = err.get("data").cloned();
            return Err(RpcError::Rpc {
                code,
                message,
                data,
            });
        }
        match js.get_mut("result") {
            Some(v) => Ok(v.take()),
            None => Err(RpcError::MissingResult {
                method: method.to_string(),
            }),
        }
    }
}

/// Providers are often configured with their websocket URL; JSON-RPC over
/// HTTP lives on the same host.
fn http_url(url: &str) -> String {
    if url.starts_with("wss://") {
        url.replacen("wss://", "https://", 1)
    } else if url.starts_with("ws://") {
        url.replacen("ws://", "http://", 1)
    } else {
        url.to_string()
    }
}

#[derive(Clone)]
struct RpcMetrics {
    req_total: IntCounterVec,
    fail_total: IntCounterVec,
    inflight: IntGaugeVec,
    latency: HistogramVec,
}

impl RpcMetrics {
    fn new(endpoint: &str, registry: &Registry) -> Self {
        let req_total = IntCounterVec::new(
            prometheus::Opts::new("rpc_requests_total", "JSON-RPC requests total")
                .const_label("endpoint", endpoint),
            &["method"],
        )
        .unwrap();
        let fail_total = IntCounterVec::new(
            prometheus::Opts::new("rpc_failures_total", "JSON-RPC failures total")
                .const_label("endpoint", endpoint),
            &["method"],
        )
        .unwrap();
        let inflight = IntGaugeVec::new(
            prometheus::Opts::new("rpc_inflight", "JSON-RPC inflight requests")
                .const_label("endpoint", endpoint),
            &["method"],
        )
        .unwrap();
        let latency = HistogramVec::new(
            prometheus::HistogramOpts::new("rpc_latency_seconds", "JSON-RPC latency seconds")
                .const_label("endpoint", endpoint)
                .buckets(vec![
                    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
                ]),
            &["method"],
        )
        .unwrap();
        registry.register(Box::new(req_total.clone())).ok();
        registry.register(Box::new(fail_total.clone())).ok();
        registry.register(Box::new(inflight.clone())).ok();
        registry.register(Box::new(latency.clone())).ok();
        Self {
            req_total,
            fail_total,
            inflight,
            latency,
        }
    }
}
