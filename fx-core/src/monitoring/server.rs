//! Minimal `/metrics` HTTP endpoint, teacher-style (`monitoring/server.rs`).

use super::metrics::CoreMetrics;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use prometheus::Encoder;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

pub async fn serve_metrics(addr: SocketAddr, metrics: Arc<CoreMetrics>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "metrics endpoint listening");

    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let service = service_fn(move |_req: Request<hyper::body::Incoming>| {
                let metrics = metrics.clone();
                async move { Ok::<_, std::convert::Infallible>(render_metrics(&metrics)) }
            });

            if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                tracing::warn!(?err, "metrics connection closed with an error");
            }
        });
    }
}

fn render_metrics(metrics: &CoreMetrics) -> Response<Full<Bytes>> {
    let encoder = prometheus::TextEncoder::new();
    let metric_families = metrics.registry.gather();
    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => Response::new(Full::new(Bytes::from(buffer))),
        Err(err) => {
            tracing::error!(?err, "failed to encode metrics");
            Response::new(Full::new(Bytes::from_static(b"")))
        }
    }
}
