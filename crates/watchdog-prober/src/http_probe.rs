//! HTTP reachability checks over a plain hyper connection.

use std::time::Duration;

use async_trait::async_trait;
use http::StatusCode;
use tracing::debug;

use watchdog_core::{ApiError, ApiResult, Endpoint, ProbeClient};

const USER_AGENT: &str = "dependency-watchdog/0.1";

/// [`ProbeClient`] issuing `GET http://{address}{path}`.
///
/// 2xx counts as reachable. 401, 403 and 429 map to the errors the prober
/// ignores; everything else, including connection failures, is a failure.
#[derive(Debug, Clone)]
pub struct HttpProbeClient {
    timeout: Duration,
}

impl HttpProbeClient {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl ProbeClient for HttpProbeClient {
    async fn check(&self, endpoint: &Endpoint) -> ApiResult<()> {
        let uri = format!("http://{}{}", endpoint.address, endpoint.path);
        match tokio::time::timeout(self.timeout, get(&endpoint.address, &uri)).await {
            Ok(result) => result,
            Err(_) => {
                debug!(%uri, "probe timed out");
                Err(ApiError::Timeout(format!("{uri}: no response within {:?}", self.timeout)))
            }
        }
    }
}

async fn get(address: &str, uri: &str) -> ApiResult<()> {
    let stream = tokio::net::TcpStream::connect(address).await.map_err(|e| {
        debug!(error = %e, %uri, "probe connection failed");
        ApiError::Other(format!("connect {address}: {e}"))
    })?;

    let io = hyper_util::rt::TokioIo::new(stream);
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
        .await
        .map_err(|e| ApiError::Other(format!("handshake with {address}: {e}")))?;

    tokio::spawn(async move {
        let _ = conn.await;
    });

    let req = http::Request::builder()
        .method("GET")
        .uri(uri)
        .header("host", address)
        .header("user-agent", USER_AGENT)
        .body(http_body_util::Empty::<bytes::Bytes>::new())
        .map_err(|e| ApiError::Other(format!("invalid probe request for {uri}: {e}")))?;

    let resp = sender
        .send_request(req)
        .await
        .map_err(|e| ApiError::Other(format!("request to {uri}: {e}")))?;

    classify(resp.status(), uri)
}

fn classify(status: StatusCode, uri: &str) -> ApiResult<()> {
    if status.is_success() {
        return Ok(());
    }
    debug!(%status, %uri, "probe returned non-2xx");
    let msg = format!("{uri} returned {status}");
    Err(match status {
        StatusCode::UNAUTHORIZED => ApiError::Unauthorized(msg),
        StatusCode::FORBIDDEN => ApiError::Forbidden(msg),
        StatusCode::TOO_MANY_REQUESTS => ApiError::TooManyRequests(msg),
        StatusCode::NOT_FOUND => ApiError::NotFound(msg),
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => ApiError::Timeout(msg),
        _ => ApiError::Other(msg),
    })
}
