//! HTTP Server
//!
//! HTTP/1 on hyper, one tokio task per connection. Bodies are collected in
//! full and handed to the [`Router`].

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::header::{self, HeaderValue};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use super::router::{Reply, Router, CONTENT_TYPE};
use crate::error::{Error, Result};

impl Reply {
    fn into_response(self) -> Response<Full<Bytes>> {
        let mut response = Response::new(Full::new(self.body));
        *response.status_mut() = self.status;
        let headers = response.headers_mut();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE));
        if self.close {
            headers.insert(header::CONNECTION, HeaderValue::from_static("close"));
        }
        response
    }
}

async fn handle(
    router: Arc<Router>,
    access_log: bool,
    req: Request<Incoming>,
) -> std::result::Result<Response<Full<Bytes>>, Infallible> {
    let started = Instant::now();
    let method = req.method().clone();
    let target = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());

    let body = match req.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!(method = %method, path = %target, error = %e, "failed to read request body");
            let mut response = Response::new(Full::new(Bytes::new()));
            *response.status_mut() = StatusCode::BAD_REQUEST;
            return Ok(response);
        }
    };

    let reply = router.handle(&method, &target, &body);

    if access_log {
        info!(
            method = %method,
            path = %target,
            status = reply.status.as_u16(),
            latency_us = started.elapsed().as_micros() as u64,
            "request"
        );
    }

    Ok(reply.into_response())
}

/// Bind `addr` and serve until the task is dropped
pub async fn serve(addr: SocketAddr, router: Arc<Router>, access_log: bool) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Internal(format!("Failed to bind {}: {}", addr, e)))?;

    info!("HTTP server listening on {}", addr);
    serve_listener(listener, router, access_log).await
}

/// Serve connections from an already bound listener
pub async fn serve_listener(
    listener: TcpListener,
    router: Arc<Router>,
    access_log: bool,
) -> Result<()> {
    loop {
        let (stream, peer) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let router = Arc::clone(&router);

        tokio::spawn(async move {
            let service = service_fn(move |req| handle(Arc::clone(&router), access_log, req));
            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                debug!(%peer, "connection error: {}", e);
            }
        });
    }
}
