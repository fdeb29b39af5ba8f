//! Listeners and the accept loop.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::balancer::Balancer;
use crate::config::Config;
use crate::error::Result;
use crate::session;
use crate::socket;

/// The dispatcher: bound listeners plus the shared balancer.
pub struct Server {
    listeners: Vec<TcpListener>,
    balancer: Arc<Balancer>,
    cancel: CancellationToken,
}

impl Server {
    /// Binds every configured endpoint. A bind or listen failure here is
    /// fatal to startup.
    pub fn bind(config: &Config) -> Result<Self> {
        config.validate()?;

        let balancer = Arc::new(Balancer::from_specs(config.ifaces.iter().copied()));
        for spec in &config.ifaces {
            info!(iface = %spec, "dispatching via");
        }

        let mut listeners = Vec::with_capacity(config.binds.len());
        for endpoint in &config.binds {
            let listener = socket::listen(endpoint)?;
            if let Ok(addr) = listener.local_addr() {
                info!(%addr, "listening");
            }
            listeners.push(listener);
        }

        Ok(Server {
            listeners,
            balancer,
            cancel: CancellationToken::new(),
        })
    }

    /// Addresses actually bound, in configuration order.
    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        self.listeners
            .iter()
            .filter_map(|listener| listener.local_addr().ok())
            .collect()
    }

    /// Shared balancer handle.
    pub fn balancer(&self) -> Arc<Balancer> {
        Arc::clone(&self.balancer)
    }

    /// Token that stops the accept loops when cancelled. Sessions already
    /// running finish naturally.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Runs all accept loops until the cancel token fires.
    pub async fn run(self) {
        let mut tasks = Vec::with_capacity(self.listeners.len());
        for listener in self.listeners {
            let balancer = Arc::clone(&self.balancer);
            let cancel = self.cancel.clone();
            tasks.push(tokio::spawn(accept_loop(listener, balancer, cancel)));
        }
        for task in tasks {
            if let Err(err) = task.await {
                error!(error = %err, "listener task aborted");
            }
        }
    }
}

async fn accept_loop(listener: TcpListener, balancer: Arc<Balancer>, cancel: CancellationToken) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                if let Ok(addr) = listener.local_addr() {
                    info!(%addr, "listener shutting down");
                }
                break;
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        debug!(%peer, "accepted");
                        let balancer = Arc::clone(&balancer);
                        tokio::spawn(async move {
                            if let Err(err) = session::run(stream, peer, balancer).await {
                                debug!(%peer, error = %err, "session ended with error");
                            }
                        });
                    }
                    // The listener stays up across accept failures.
                    Err(err) => error!(error = %err, "accept failed"),
                }
            }
        }
    }
}
