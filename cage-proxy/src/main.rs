mod addon;
mod ca;
mod config;
mod error;
mod logging;
mod policy;
mod scanner;

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Empty, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;

use crate::ca::CertAuthority;
use crate::config::ProxyConfig;
use crate::scanner::SecretScanner;

type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

fn full_body(data: impl Into<Bytes>) -> BoxBody {
    Full::new(data.into())
        .map_err(|never| match never {})
        .boxed()
}

fn empty_body() -> BoxBody {
    Empty::new().map_err(|never| match never {}).boxed()
}

fn text_response(status: StatusCode, body: impl Into<Bytes>) -> Response<BoxBody> {
    Response::builder()
        .status(status)
        .header("content-type", "text/plain")
        .body(full_body(body))
        .unwrap_or_else(|_| Response::new(empty_body()))
}

struct ProxyState {
    config: &'static ProxyConfig,
    ca: Arc<CertAuthority>,
    scanner: Arc<SecretScanner>,
    upstream: reqwest::Client,
}

fn setup_log() {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{fmt, EnvFilter};
    let _ = tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .try_init();
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    setup_log();

    let config = ProxyConfig::load();
    let scanner = Arc::new(SecretScanner::new(config));
    scanner.check_availability().await;

    let ca = Arc::new(
        CertAuthority::generate()
            .unwrap_or_else(|err| panic!("failed to generate egress proxy root CA: {err}")),
    );
    tracing::info!(
        root_ca_fingerprint_len = ca.root_cert_pem().len(),
        "generated in-memory root CA"
    );

    let upstream = reqwest::Client::builder()
        .build()
        .unwrap_or_else(|err| panic!("failed to build upstream HTTP client: {err}"));

    let state = Arc::new(ProxyState {
        config,
        ca,
        scanner,
        upstream,
    });

    let addr: SocketAddr = config
        .bind_addr
        .parse()
        .unwrap_or_else(|_| "0.0.0.0:8080".parse().unwrap());

    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "starting yolo-cage egress proxy");

    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let state = state.clone();
        tokio::spawn(async move {
            let service = service_fn(move |req| handle_request(req, state.clone()));
            if let Err(err) = hyper::server::conn::http1::Builder::new()
                .serve_connection(io, service)
                .with_upgrades()
                .await
            {
                tracing::debug!(error = %err, "connection closed with error");
            }
        });
    }
}

async fn handle_request(
    req: Request<Incoming>,
    state: Arc<ProxyState>,
) -> Result<Response<BoxBody>, Infallible> {
    if req.method() == hyper::Method::CONNECT {
        return Ok(handle_connect(req, state));
    }
    Ok(forward_plain(req, state).await)
}

/// Accept the CONNECT tunnel immediately, then terminate TLS on the
/// upgraded stream with a host-specific leaf certificate and serve HTTP/1.1
/// requests inside it.
fn handle_connect(req: Request<Incoming>, state: Arc<ProxyState>) -> Response<BoxBody> {
    let authority = req.uri().authority().map(|a| a.to_string());

    tokio::spawn(async move {
        let Some(authority) = authority else {
            tracing::warn!("CONNECT request missing authority");
            return;
        };
        let host = authority
            .rsplit_once(':')
            .map(|(host, _port)| host.to_string())
            .unwrap_or(authority);

        match hyper::upgrade::on(req).await {
            Ok(upgraded) => {
                if let Err(err) = serve_tls_tunnel(upgraded, host, state).await {
                    tracing::error!(error = %err, "tls tunnel failed");
                }
            }
            Err(err) => tracing::error!(error = %err, "CONNECT upgrade failed"),
        }
    });

    Response::new(empty_body())
}

async fn serve_tls_tunnel(
    upgraded: hyper::upgrade::Upgraded,
    host: String,
    state: Arc<ProxyState>,
) -> std::io::Result<()> {
    let io = TokioIo::new(upgraded);
    let server_config = state
        .ca
        .server_config_for(&host)
        .map_err(|err| std::io::Error::other(err.to_string()))?;

    let tls_stream = TlsAcceptor::from(server_config).accept(io).await?;
    let tls_io = TokioIo::new(tls_stream);

    let service = service_fn(move |req| {
        let host = host.clone();
        let state = state.clone();
        async move { Ok::<_, Infallible>(process_request(req, host, true, state).await) }
    });

    hyper::server::conn::http1::Builder::new()
        .serve_connection(tls_io, service)
        .await
        .map_err(std::io::Error::other)
}

/// Plain (non-CONNECT) forward proxying, used when a client issues absolute-form
/// HTTP requests directly rather than tunneling through CONNECT.
async fn forward_plain(req: Request<Incoming>, state: Arc<ProxyState>) -> Response<BoxBody> {
    let host = match req.uri().host() {
        Some(host) => host.to_string(),
        None => return text_response(StatusCode::BAD_GATEWAY, "Blocked: missing request host"),
    };
    process_request(req, host, false, state).await
}

async fn process_request(
    req: Request<Incoming>,
    host: String,
    is_tls: bool,
    state: Arc<ProxyState>,
) -> Response<BoxBody> {
    let method = req.method().to_string();
    let path = req.uri().path().to_string();
    let query = req.uri().query().unwrap_or("").to_string();
    let headers: Vec<(String, String)> = req
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();

    let (parts, body) = req.into_parts();
    let body_bytes = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(err) => {
            tracing::error!(error = %err, "failed to read request body");
            return text_response(StatusCode::BAD_GATEWAY, "Blocked: failed to read request body");
        }
    };
    let body_text = String::from_utf8_lossy(&body_bytes).into_owned();

    let scheme = if is_tls { "https" } else { "http" };
    let query_suffix = if query.is_empty() {
        String::new()
    } else {
        format!("?{query}")
    };
    let url = format!("{scheme}://{host}{path}{query_suffix}");

    let view = addon::RequestView {
        method: &method,
        host: &host,
        path: &path,
        query: &query,
        url: &url,
        body: &body_text,
        headers: &headers,
    };

    match addon::evaluate(&view, state.config, &state.scanner).await {
        addon::Decision::Block { message, .. } => text_response(StatusCode::FORBIDDEN, message),
        addon::Decision::Allow => forward_upstream(&parts.method, &parts.headers, &url, body_bytes, &state).await,
    }
}

/// Headers that are connection-scoped and must never be replayed upstream
/// or back to the tunnel client.
fn is_hop_by_hop(name: &str) -> bool {
    matches!(
        name,
        "host" | "connection" | "proxy-connection" | "content-length" | "transfer-encoding"
    )
}

async fn forward_upstream(
    method: &hyper::Method,
    headers: &hyper::HeaderMap,
    url: &str,
    body: Bytes,
    state: &ProxyState,
) -> Response<BoxBody> {
    let method = match reqwest::Method::from_bytes(method.as_str().as_bytes()) {
        Ok(m) => m,
        Err(_) => return text_response(StatusCode::BAD_GATEWAY, "Blocked: unsupported method"),
    };

    let mut builder = state.upstream.request(method, url);
    for (name, value) in headers.iter() {
        if is_hop_by_hop(name.as_str()) {
            continue;
        }
        if let Ok(value_str) = value.to_str() {
            builder = builder.header(name.as_str(), value_str);
        }
    }
    if !body.is_empty() {
        builder = builder.body(body.to_vec());
    }

    match builder.send().await {
        Ok(resp) => {
            let status = resp.status().as_u16();
            let mut response = Response::builder().status(status);
            for (name, value) in resp.headers().iter() {
                if is_hop_by_hop(name.as_str()) {
                    continue;
                }
                response = response.header(name, value);
            }
            let body = resp.bytes().await.unwrap_or_default();
            response
                .body(full_body(body))
                .unwrap_or_else(|_| text_response(StatusCode::BAD_GATEWAY, "Blocked: malformed upstream response"))
        }
        Err(err) => {
            tracing::error!(error = %err, "upstream request failed");
            text_response(StatusCode::BAD_GATEWAY, "Blocked: upstream request failed")
        }
    }
}
