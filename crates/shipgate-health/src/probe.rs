//! Health probes.
//!
//! A probe answers one question (is this service healthy right now?)
//! and is safe to ask repeatedly. Every check runs under the probe's own
//! timeout; a check that does not finish in time counts as `Unhealthy`.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use http::{header, Method, Request, Uri};
use http_body_util::Empty;
use tracing::debug;

/// Boxed future returned by probe and action trait objects.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Per-check ceiling for probes that do not set their own.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Result of a single health probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The service reported healthy.
    Healthy,
    /// Not healthy yet; expected while a service is starting. Retried.
    Unhealthy,
    /// The probe itself is misconfigured. Never retried.
    Error(String),
}

/// A repeatable, side-effect-free health check.
pub trait HealthProbe: Send + Sync {
    fn check(&self) -> BoxFuture<'_, ProbeOutcome>;

    /// Upper bound for a single `check`.
    fn timeout(&self) -> Duration {
        DEFAULT_PROBE_TIMEOUT
    }

    /// Short label for logs and reports.
    fn describe(&self) -> String;
}

/// Run one check, mapping an elapsed timeout to `Unhealthy`.
pub async fn check_with_timeout(probe: &dyn HealthProbe) -> ProbeOutcome {
    let limit = probe.timeout();
    match tokio::time::timeout(limit, probe.check()).await {
        Ok(outcome) => outcome,
        Err(_) => {
            debug!(probe = %probe.describe(), timeout = ?limit, "health probe timed out");
            ProbeOutcome::Unhealthy
        }
    }
}

// ── HTTP ──────────────────────────────────────────────────────────

/// `Healthy` iff a GET to `url` answers with the expected status.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    url: String,
    target: Result<HttpTarget, String>,
    expect_status: u16,
    timeout: Duration,
}

#[derive(Debug, Clone)]
struct HttpTarget {
    /// `host:port` to connect to.
    address: String,
    /// Value for the `Host` header.
    host: String,
    /// Origin-form request target.
    path: String,
}

impl HttpProbe {
    /// The URL is validated here; an invalid one makes every check an `Error`.
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        let target = parse_target(&url);
        Self {
            url,
            target,
            expect_status: 200,
            timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    /// Status code that counts as healthy. Defaults to 200.
    pub fn with_expected_status(mut self, status: u16) -> Self {
        self.expect_status = status;
        self
    }

    /// Upper bound for connect, request and response together.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Why the URL was rejected, if it was. Lets callers refuse a bad
    /// probe before any startup action runs.
    pub fn validate(&self) -> Result<(), String> {
        self.target.as_ref().map(|_| ()).map_err(Clone::clone)
    }

    async fn probe(&self) -> ProbeOutcome {
        let target = match &self.target {
            Ok(target) => target,
            Err(reason) => return ProbeOutcome::Error(reason.clone()),
        };
        let url = &self.url;

        let stream = match tokio::net::TcpStream::connect(&target.address).await {
            Ok(s) => s,
            Err(e) => {
                debug!(error = %e, %url, "health probe connection failed");
                return ProbeOutcome::Unhealthy;
            }
        };

        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = match hyper::client::conn::http1::handshake(io).await {
            Ok(pair) => pair,
            Err(e) => {
                debug!(error = %e, %url, "health probe handshake failed");
                return ProbeOutcome::Unhealthy;
            }
        };

        // Drive the connection in the background.
        tokio::spawn(async move {
            let _ = conn.await;
        });

        let req = match Request::builder()
            .method(Method::GET)
            .uri(target.path.as_str())
            .header(header::HOST, target.host.as_str())
            .header(header::USER_AGENT, "shipgate-health/0.1")
            .body(Empty::<Bytes>::new())
        {
            Ok(req) => req,
            Err(e) => return ProbeOutcome::Error(format!("cannot build request for '{url}': {e}")),
        };

        match sender.send_request(req).await {
            Ok(resp) if resp.status().as_u16() == self.expect_status => ProbeOutcome::Healthy,
            Ok(resp) => {
                debug!(status = %resp.status(), expected = self.expect_status, %url, "health probe status mismatch");
                ProbeOutcome::Unhealthy
            }
            Err(e) => {
                debug!(error = %e, %url, "health probe request failed");
                ProbeOutcome::Unhealthy
            }
        }
    }
}

impl HealthProbe for HttpProbe {
    fn check(&self) -> BoxFuture<'_, ProbeOutcome> {
        Box::pin(self.probe())
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn describe(&self) -> String {
        format!("http {} (expect {})", self.url, self.expect_status)
    }
}

fn parse_target(url: &str) -> Result<HttpTarget, String> {
    let uri: Uri = url
        .trim()
        .parse()
        .map_err(|e| format!("invalid url '{url}': {e}"))?;

    match uri.scheme_str() {
        Some("http") => {}
        Some(other) => return Err(format!("unsupported scheme '{other}' in '{url}'")),
        None => return Err(format!("url '{url}' has no scheme")),
    }

    let authority = uri
        .authority()
        .ok_or_else(|| format!("url '{url}' has no host"))?;
    if authority.host().is_empty() {
        return Err(format!("url '{url}' has no host"));
    }
    let port = authority.port_u16().unwrap_or(80);

    Ok(HttpTarget {
        address: format!("{}:{port}", authority.host()),
        host: authority.as_str().to_string(),
        path: uri
            .path_and_query()
            .map(|p| p.as_str().to_string())
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| "/".to_string()),
    })
}

// ── TCP ───────────────────────────────────────────────────────────

/// `Healthy` iff a TCP connection to `host:port` can be established.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    address: String,
    valid: Result<(), String>,
    timeout: Duration,
}

impl TcpProbe {
    pub fn new(address: impl Into<String>) -> Self {
        let address = address.into();
        let valid = validate_address(&address);
        Self {
            address,
            valid,
            timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    /// Upper bound for the connect.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Why the address was rejected, if it was.
    pub fn validate(&self) -> Result<(), String> {
        self.valid.clone()
    }

    async fn probe(&self) -> ProbeOutcome {
        if let Err(reason) = &self.valid {
            return ProbeOutcome::Error(reason.clone());
        }
        match tokio::net::TcpStream::connect(&self.address).await {
            Ok(_) => ProbeOutcome::Healthy,
            Err(e) => {
                debug!(error = %e, address = %self.address, "tcp probe connect failed");
                ProbeOutcome::Unhealthy
            }
        }
    }
}

impl HealthProbe for TcpProbe {
    fn check(&self) -> BoxFuture<'_, ProbeOutcome> {
        Box::pin(self.probe())
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn describe(&self) -> String {
        format!("tcp {}", self.address)
    }
}

fn validate_address(address: &str) -> Result<(), String> {
    let (host, port) = address
        .rsplit_once(':')
        .ok_or_else(|| format!("address '{address}' has no port"))?;
    if host.is_empty() {
        return Err(format!("address '{address}' has no host"));
    }
    match port.parse::<u16>() {
        Ok(0) | Err(_) => Err(format!("address '{address}' has an invalid port")),
        Ok(_) => Ok(()),
    }
}
