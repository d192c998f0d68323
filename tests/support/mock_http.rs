use std::{
    collections::HashMap,
    convert::Infallible,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use anyhow::{Context, Result};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

pub const MOCK_ADDRESS: &str = "3MockConsolidationAddress";

/// Scripted upstream serving a BitGo-style listing and blockbook-style transaction records.
#[derive(Clone)]
pub struct MockUpstream {
    inner: Arc<MockUpstreamInner>,
}

struct MockUpstreamInner {
    unspents: Vec<Value>,
    max_page_size: AtomicUsize,
    listing_requests: Mutex<Vec<(usize, u64)>>,
    detail_failures: Mutex<HashMap<String, usize>>,
    malformed: Mutex<HashMap<String, bool>>,
    delays: Mutex<HashMap<String, Duration>>,
    detail_hits: Mutex<HashMap<String, usize>>,
}

impl MockUpstream {
    pub fn new(count: usize) -> Self {
        let unspents = (0..count).map(mock_unspent).collect();
        Self {
            inner: Arc::new(MockUpstreamInner {
                unspents,
                max_page_size: AtomicUsize::new(usize::MAX),
                listing_requests: Mutex::new(Vec::new()),
                detail_failures: Mutex::new(HashMap::new()),
                malformed: Mutex::new(HashMap::new()),
                delays: Mutex::new(HashMap::new()),
                detail_hits: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Listing requests with a larger `limit` answer HTTP 500.
    pub fn set_max_page_size(&self, size: usize) {
        self.inner.max_page_size.store(size, Ordering::SeqCst);
    }

    /// The next `count` detail requests for `txid` answer HTTP 503.
    pub fn fail_detail(&self, txid: &str, count: usize) {
        self.inner
            .detail_failures
            .lock()
            .expect("mock state poisoned")
            .insert(txid.to_string(), count);
    }

    /// Every detail request for `txid` answers 200 with a non-JSON body.
    pub fn malformed_detail(&self, txid: &str) {
        self.inner
            .malformed
            .lock()
            .expect("mock state poisoned")
            .insert(txid.to_string(), true);
    }

    /// The first detail request for `txid` is delayed by `delay`.
    pub fn delay_detail(&self, txid: &str, delay: Duration) {
        self.inner
            .delays
            .lock()
            .expect("mock state poisoned")
            .insert(txid.to_string(), delay);
    }

    pub fn listing_requests(&self) -> Vec<(usize, u64)> {
        self.inner
            .listing_requests
            .lock()
            .expect("mock state poisoned")
            .clone()
    }

    pub fn detail_hits(&self, txid: &str) -> usize {
        self.inner
            .detail_hits
            .lock()
            .expect("mock state poisoned")
            .get(txid)
            .copied()
            .unwrap_or(0)
    }

    fn listing_page(&self, limit: usize, skip: u64) -> Option<Value> {
        self.inner
            .listing_requests
            .lock()
            .expect("mock state poisoned")
            .push((limit, skip));
        if limit > self.inner.max_page_size.load(Ordering::SeqCst) {
            return None;
        }

        let total = self.inner.unspents.len();
        let start = (skip as usize).min(total);
        let end = start.saturating_add(limit).min(total);
        let page: Vec<Value> = self.inner.unspents[start..end].to_vec();
        Some(json!({
            "start": skip,
            "count": page.len(),
            "total": total,
            "unspents": page,
        }))
    }

    fn detail_reply(&self, shard: &str, txid: &str) -> (StatusCode, String, Option<Duration>) {
        *self
            .inner
            .detail_hits
            .lock()
            .expect("mock state poisoned")
            .entry(txid.to_string())
            .or_default() += 1;

        let delay = self
            .inner
            .delays
            .lock()
            .expect("mock state poisoned")
            .remove(txid);

        {
            let mut failures = self.inner.detail_failures.lock().expect("mock state poisoned");
            if let Some(remaining) = failures.get_mut(txid) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return (
                        StatusCode::SERVICE_UNAVAILABLE,
                        "rate limited".to_string(),
                        delay,
                    );
                }
            }
        }

        if self
            .inner
            .malformed
            .lock()
            .expect("mock state poisoned")
            .contains_key(txid)
        {
            return (StatusCode::OK, "<html>busy</html>".to_string(), delay);
        }

        let body = json!({
            "txid": txid,
            "version": 2,
            "vin": [],
            "vout": [],
            "served_by": shard,
        });
        (StatusCode::OK, body.to_string(), delay)
    }
}

/// Hex txid of the `index`-th mock unspent.
pub fn mock_txid(index: usize) -> String {
    format!("{:064x}", index + 1)
}

fn mock_unspent(index: usize) -> Value {
    let block_height = match index % 3 {
        0 => json!(800_000 + index),
        1 => json!((800_000 + index).to_string()),
        _ => Value::Null,
    };
    json!({
        "address": MOCK_ADDRESS,
        "tx_hash": mock_txid(index),
        "tx_output_n": index % 4,
        "value": 1_000 * (index as u64 + 1),
        "confirmations": if block_height.is_null() { 0 } else { 6 },
        "blockHeight": block_height,
        "script": "a914000000000000000000000000000000000000000087",
        "date": "2024-01-01T00:00:00.000Z",
    })
}

pub struct MockHttpServer {
    url: String,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl MockHttpServer {
    pub async fn start(upstream: MockUpstream) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .context("failed to bind mock HTTP listener")?;
        let addr = listener
            .local_addr()
            .context("failed to read mock listener address")?;
        let std_listener = listener
            .into_std()
            .context("failed to convert mock listener")?;
        std_listener
            .set_nonblocking(true)
            .context("failed to set mock listener non-blocking")?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let make_service = make_service_fn(move |_| {
            let upstream = upstream.clone();
            async move {
                Ok::<_, Infallible>(service_fn(move |req| serve_request(upstream.clone(), req)))
            }
        });

        let server = Server::from_tcp(std_listener)
            .context("failed to build mock HTTP server")?
            .serve(make_service);
        let graceful = server.with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        });

        let handle = tokio::spawn(async move {
            if let Err(err) = graceful.await {
                eprintln!("mock HTTP server stopped: {err}");
            }
        });

        Ok(Self {
            url: format!("http://{}", addr),
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    /// Base URL of the listing API.
    pub fn listing_url(&self) -> String {
        format!("{}/api/v1", self.url)
    }

    /// Base URL of detail shard `index`.
    pub fn shard_url(&self, index: usize) -> String {
        format!("{}/shard{index}/tx", self.url)
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

async fn serve_request(
    upstream: MockUpstream,
    req: Request<Body>,
) -> Result<Response<Body>, Infallible> {
    if req.method() != Method::GET {
        return Ok(text(StatusCode::METHOD_NOT_ALLOWED, "unsupported method"));
    }

    let path = req.uri().path().to_string();
    let query = req.uri().query().unwrap_or_default().to_string();
    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();

    match segments.as_slice() {
        ["api", "v1", "address", _address, "unspents"] => {
            let params = parse_query(&query);
            let limit = params
                .get("limit")
                .and_then(|value| value.parse::<usize>().ok())
                .unwrap_or(0);
            let skip = params
                .get("skip")
                .and_then(|value| value.parse::<u64>().ok())
                .unwrap_or(0);
            match upstream.listing_page(limit, skip) {
                Some(page) => Ok(json_response(StatusCode::OK, page.to_string())),
                None => Ok(json_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "too many results requested" }).to_string(),
                )),
            }
        }
        [shard, "tx", txid] => {
            let (status, body, delay) = upstream.detail_reply(shard, txid);
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            Ok(json_response(status, body))
        }
        _ => Ok(text(StatusCode::NOT_FOUND, "not found")),
    }
}

fn parse_query(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

fn json_response(status: StatusCode, body: String) -> Response<Body> {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("application/json"),
    );
    response
}

fn text(status: StatusCode, body: &'static str) -> Response<Body> {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response
}
