//! HTTP server for the Prometheus metrics endpoint

use super::Metrics;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use prometheus::{Encoder, TextEncoder};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, error, info};

/// HTTP server that exposes the gateway counters in Prometheus text format
pub struct MetricsServer {
    metrics: Arc<Metrics>,
    addr: SocketAddr,
}

impl MetricsServer {
    pub fn new(metrics: Arc<Metrics>, addr: SocketAddr) -> Self {
        Self { metrics, addr }
    }

    /// Serve until the shutdown signal fires
    pub async fn run(
        self,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let listener = TcpListener::bind(self.addr).await?;
        info!("Metrics server listening on http://{}/metrics", self.addr);

        loop {
            let stream = tokio::select! {
                accepted = listener.accept() => accepted?.0,
                _ = shutdown_rx.recv() => {
                    debug!("Metrics server shutting down");
                    return Ok(());
                }
            };

            let io = TokioIo::new(stream);
            let metrics = self.metrics.clone();

            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let metrics = metrics.clone();
                    async move { Ok::<_, Infallible>(render(req, &metrics)) }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    error!("Error serving metrics connection: {:?}", err);
                }
            });
        }
    }
}

fn text(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(body.as_bytes())));
    *response.status_mut() = status;
    response
}

fn render<B>(req: Request<B>, metrics: &Metrics) -> Response<Full<Bytes>> {
    match req.uri().path() {
        "/metrics" => {
            let encoder = TextEncoder::new();
            let mut buffer = Vec::new();

            match encoder.encode(&metrics.registry.gather(), &mut buffer) {
                Ok(()) => {
                    let mut response = Response::new(Full::new(Bytes::from(buffer)));
                    if let Ok(value) = encoder.format_type().parse() {
                        response
                            .headers_mut()
                            .insert(hyper::header::CONTENT_TYPE, value);
                    }
                    response
                }
                Err(e) => {
                    error!("Failed to encode metrics: {}", e);
                    text(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Failed to encode metrics",
                    )
                }
            }
        }
        "/health" | "/ready" => text(StatusCode::OK, "OK"),
        _ => text(StatusCode::NOT_FOUND, "Not Found"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn test_metrics_endpoint_renders_counters() {
        let metrics = Metrics::new();
        metrics.bridged_publishes.inc();
        metrics.record_response(200);

        let req = Request::get("/metrics").body(()).unwrap();
        let response = render(req, &metrics);
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let body = String::from_utf8(body.to_vec()).unwrap();
        assert!(body.contains("http2mqtt_bridged_publishes_total 1"));
        assert!(body.contains("http2mqtt_http_responses_total{status=\"200\"} 1"));
    }

    #[test]
    fn test_unknown_path_is_not_found() {
        let req = Request::get("/nope").body(()).unwrap();
        assert_eq!(
            render(req, &Metrics::new()).status(),
            StatusCode::NOT_FOUND
        );
    }
}
