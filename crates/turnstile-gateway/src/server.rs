//! HTTP/1.1 listener.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::config::GatewayConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::handler::Gateway;
use crate::shutdown::{ConnectionTracker, ShutdownSignal};

/// Accepts connections and hands each request to the [`Gateway`].
pub struct GatewayServer {
    gateway: Arc<Gateway>,
    addr: SocketAddr,
    shutdown_timeout: Duration,
}

impl GatewayServer {
    /// Create a server from validated configuration.
    pub fn new(config: &GatewayConfig) -> GatewayResult<Self> {
        Ok(Self {
            gateway: Arc::new(Gateway::from_config(config)?),
            addr: config.socket_addr()?,
            shutdown_timeout: config.server.shutdown_timeout,
        })
    }

    /// Create a server around an existing gateway.
    pub fn with_gateway(gateway: Gateway, addr: SocketAddr, shutdown_timeout: Duration) -> Self {
        Self {
            gateway: Arc::new(gateway),
            addr,
            shutdown_timeout,
        }
    }

    /// Configured listen address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Bind the configured address and serve until SIGTERM or SIGINT.
    pub async fn run(self) -> GatewayResult<()> {
        let listener = TcpListener::bind(self.addr)
            .await
            .map_err(|e| GatewayError::server(format!("failed to bind {}: {e}", self.addr)))?;
        self.serve(listener, ShutdownSignal::with_os_signals()).await
    }

    /// Serve on `listener` until `shutdown` is triggered, then drain.
    ///
    /// Open connections finish their in-flight exchange and are closed
    /// instead of being kept alive.
    pub async fn serve(self, listener: TcpListener, shutdown: ShutdownSignal) -> GatewayResult<()> {
        let local = listener.local_addr()?;
        info!(
            addr = %local,
            routes = self.gateway.routes().len(),
            "turnstile listening"
        );

        let tracker = ConnectionTracker::new();
        let mut stop = shutdown.recv();

        loop {
            let (stream, peer) = tokio::select! {
                () = &mut stop => break,
                accepted = listener.accept() => match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        error!(error = %e, "failed to accept connection");
                        continue;
                    }
                },
            };

            let gateway = Arc::clone(&self.gateway);
            let token = tracker.acquire();
            let mut closing = shutdown.recv();

            tokio::spawn(async move {
                let _token = token;
                let io = TokioIo::new(stream);
                let service = service_fn(move |req| {
                    let gateway = Arc::clone(&gateway);
                    async move { Ok::<_, Infallible>(gateway.handle(req, Some(peer.ip())).await) }
                });

                let conn = http1::Builder::new()
                    .keep_alive(true)
                    .serve_connection(io, service);
                tokio::pin!(conn);

                let result = tokio::select! {
                    res = conn.as_mut() => res,
                    () = &mut closing => {
                        conn.as_mut().graceful_shutdown();
                        conn.as_mut().await
                    }
                };
                if let Err(e) = result {
                    debug!(%peer, error = %e, "connection error");
                }
            });
        }

        drop(listener);
        info!(
            active = tracker.active_connections(),
            "shutdown requested, draining connections"
        );
        if tracker.drain(self.shutdown_timeout).await {
            info!("all connections closed");
        } else {
            warn!(
                active = tracker.active_connections(),
                timeout_secs = self.shutdown_timeout.as_secs(),
                "drain deadline passed, exiting with open connections"
            );
        }
        Ok(())
    }
}
