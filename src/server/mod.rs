//! HTTP Front Door
//!
//! Accepts HTTP/1.1 connections and hands every request to the [`Gateway`].
//! Requests are served concurrently, one task per connection. A panicking
//! handler turns into a 500 for that request only.
//!
//! On shutdown the listener closes, open connections finish their current
//! request, and stragglers are aborted once the grace period runs out.

use std::any::Any;
use std::convert::Infallible;
use std::io;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::TokioIo;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::gateway::{Gateway, GatewayError};

pub struct HttpServer {
    listener: TcpListener,
    gateway: Arc<Gateway>,
}

impl HttpServer {
    /// Bind the listener. Fails if the address is unavailable.
    pub async fn bind(addr: SocketAddr, gateway: Arc<Gateway>) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener, gateway })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve until the shutdown signal fires, then drain connections for at
    /// most `grace`
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>, grace: Duration) {
        if let Ok(addr) = self.listener.local_addr() {
            info!("HTTP server listening on http://{}", addr);
        }

        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!("HTTP connection from {}", peer);
                        connections.spawn(serve_connection(
                            stream,
                            self.gateway.clone(),
                            shutdown_rx.resubscribe(),
                        ));
                    }
                    Err(e) => {
                        // Usually fd exhaustion; back off instead of spinning
                        error!("Accept error: {}", e);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                },
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
                _ = shutdown_rx.recv() => {
                    info!("HTTP server shutting down");
                    break;
                }
            }
        }

        drop(self.listener);

        let drain = async { while connections.join_next().await.is_some() {} };
        if tokio::time::timeout(grace, drain).await.is_err() {
            warn!(
                "{} connection(s) still open after {:?}, aborting",
                connections.len(),
                grace
            );
            connections.abort_all();
        }
    }
}

async fn serve_connection(
    stream: TcpStream,
    gateway: Arc<Gateway>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let io = TokioIo::new(stream);

    let service = service_fn(move |req: Request<Incoming>| {
        let gateway = gateway.clone();
        async move {
            let method = req.method().clone();
            let response = match AssertUnwindSafe(gateway.handle(req)).catch_unwind().await {
                Ok(response) => response,
                Err(panic) => {
                    let e = GatewayError::Panic(panic_message(panic.as_ref()));
                    gateway.finish(gateway.internal_error(&method, &e))
                }
            };
            Ok::<_, Infallible>(response)
        }
    });

    let conn = http1::Builder::new().serve_connection(io, service);
    tokio::pin!(conn);

    let result = tokio::select! {
        result = conn.as_mut() => result,
        _ = shutdown_rx.recv() => {
            conn.as_mut().graceful_shutdown();
            conn.await
        }
    };

    if let Err(e) = result {
        debug!("HTTP connection error: {}", e);
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
