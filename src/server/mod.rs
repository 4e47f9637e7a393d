//! Request frontend
//!
//! Serves one client stream at a time: stdin/stdout when no listen address is
//! configured, otherwise TCP connections accepted one after another.

mod connection;

pub use connection::handle;

use crate::config::ServerConfig;
use crate::metrics::Metrics;
use crate::scheduler::Scheduler;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Main server struct
pub struct Server {
    pub(crate) config: ServerConfig,
    pub(crate) scheduler: Arc<Scheduler>,
    pub(crate) cancel_token: CancellationToken,
}

impl Server {
    /// Create a new server
    pub fn new(
        config: ServerConfig,
        scheduler: Arc<Scheduler>,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            config,
            scheduler,
            cancel_token,
        }
    }

    pub(crate) fn metrics(&self) -> &Metrics {
        self.scheduler.metrics()
    }

    /// Run the server until the stream ends or shutdown is requested
    pub async fn run(self: Arc<Self>) -> anyhow::Result<()> {
        if self.config.listen_addr.is_empty() {
            self.serve_stdio().await
        } else {
            self.serve_tcp().await
        }
    }

    async fn serve_stdio(self: Arc<Self>) -> anyhow::Result<()> {
        info!("Serving requests on stdin");
        let reader = BufReader::new(tokio::io::stdin());
        let writer = tokio::io::stdout();
        connection::handle(self, reader, writer).await
    }

    async fn serve_tcp(self: Arc<Self>) -> anyhow::Result<()> {
        let addr: SocketAddr = self.config.listen_addr.parse()?;
        let listener = TcpListener::bind(addr).await?;
        info!("Server listening on {}", addr);

        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    info!("Server shutting down");
                    break;
                }
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            if let Err(e) = stream.set_nodelay(true) {
                                warn!("Failed to set TCP_NODELAY: {}", e);
                            }
                            debug!("Accepted connection from {}", peer_addr);

                            // the next client waits in the backlog until this one is done
                            let (read_half, write_half) = stream.into_split();
                            let reader = BufReader::new(read_half);
                            if let Err(e) = connection::handle(Arc::clone(&self), reader, write_half).await {
                                debug!("Connection error: {}", e);
                            }
                            debug!("Connection from {} closed", peer_addr);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SchedulerConfig, StoreConfig};
    use crate::scheduler::DispatchTable;
    use crate::storage::CacheStore;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    #[tokio::test]
    async fn test_tcp_round_trip() {
        let store_config = StoreConfig::default();
        let scheduler = Scheduler::new(
            &SchedulerConfig { workers: 2 },
            store_config.max_value_length,
            Arc::new(CacheStore::new(16)),
            DispatchTable::new(&store_config),
            Arc::new(Metrics::new()),
        )
        .unwrap();

        // reserve a free port
        let reserved = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = reserved.local_addr().unwrap();
        drop(reserved);

        let cancel = CancellationToken::new();
        let config = ServerConfig {
            listen_addr: addr.to_string(),
            ..ServerConfig::default()
        };
        let server = Arc::new(Server::new(config, Arc::new(scheduler), cancel.clone()));
        let task = tokio::spawn(Arc::clone(&server).run());

        let mut stream = loop {
            match TcpStream::connect(addr).await {
                Ok(stream) => break stream,
                Err(_) => tokio::time::sleep(std::time::Duration::from_millis(10)).await,
            }
        };

        stream.write_all(b"set k 0 0 2\r\nhi\r\nget k\r\n").await.unwrap();
        stream.shutdown().await.unwrap();
        let mut out = String::new();
        stream.read_to_string(&mut out).await.unwrap();
        assert_eq!(out, "STORED\r\nVALUE k 0 2\r\nhi\r\n");

        cancel.cancel();
        task.await.unwrap().unwrap();
    }
}
