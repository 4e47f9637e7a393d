//! Health, readiness and metrics endpoint (plain HTTP/1.1, synchronous)

use crate::config::MetricsConfig;
use crate::metrics::Metrics;
use crate::storage::CacheStore;
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{error, info};

/// A response ready to be written
#[derive(Debug, PartialEq, Eq)]
struct Response {
    status: u16,
    content_type: &'static str,
    body: String,
}

impl Response {
    fn json(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: "application/json",
            body: body.into(),
        }
    }

    fn text(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: "text/plain",
            body: body.into(),
        }
    }

    fn reason(&self) -> &'static str {
        match self.status {
            200 => "OK",
            400 => "Bad Request",
            404 => "Not Found",
            405 => "Method Not Allowed",
            503 => "Service Unavailable",
            _ => "Unknown",
        }
    }
}

/// Health server state
pub struct HealthServer {
    metrics: Arc<Metrics>,
    store: Arc<CacheStore>,
    ready: AtomicBool,
    running: AtomicBool,
}

impl HealthServer {
    pub fn new(metrics: Arc<Metrics>, store: Arc<CacheStore>) -> Self {
        Self {
            metrics,
            store,
            ready: AtomicBool::new(false),
            running: AtomicBool::new(true),
        }
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Ask the accept loop to exit
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Serve until stopped. Blocks, so run it on its own thread.
    pub fn run(self: Arc<Self>, config: &MetricsConfig) -> std::io::Result<()> {
        let listener = TcpListener::bind(&config.listen_addr)?;
        listener.set_nonblocking(true)?;
        info!("Health server listening on {}", config.listen_addr);

        while self.running.load(Ordering::SeqCst) {
            match listener.accept() {
                Ok((stream, _)) => {
                    if let Err(e) = self.handle_connection(stream) {
                        error!("Health connection error: {}", e);
                    }
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    std::thread::sleep(Duration::from_millis(100));
                }
                Err(e) => {
                    error!("Health server accept error: {}", e);
                }
            }
        }

        info!("Health server stopped");
        Ok(())
    }

    fn handle_connection(&self, mut stream: TcpStream) -> std::io::Result<()> {
        stream.set_nonblocking(false)?;

        let mut request_line = String::new();
        BufReader::new(&stream).read_line(&mut request_line)?;

        let response = self.route(&request_line);
        let head = format!(
            "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            response.status,
            response.reason(),
            response.content_type,
            response.body.len(),
        );
        stream.write_all(head.as_bytes())?;
        stream.write_all(response.body.as_bytes())?;
        stream.flush()
    }

    /// Map a request line such as `GET /ready HTTP/1.1` to its response
    fn route(&self, request_line: &str) -> Response {
        let mut parts = request_line.split_whitespace();
        let (Some(method), Some(path)) = (parts.next(), parts.next()) else {
            return Response::text(400, "Bad Request");
        };
        if method != "GET" {
            return Response::text(405, "Method Not Allowed");
        }

        match path {
            "/health" | "/healthz" => Response::json(200, r#"{"status":"healthy"}"#),
            "/ready" | "/readyz" if self.is_ready() => {
                Response::json(200, r#"{"status":"ready"}"#)
            }
            "/ready" | "/readyz" => Response::json(503, r#"{"status":"not ready"}"#),
            "/stats" => {
                let stats = self.store.stats();
                Response::json(
                    200,
                    format!(
                        r#"{{"buckets":{},"items":{},"purged":{}}}"#,
                        self.store.buckets(),
                        stats.items,
                        stats.purged
                    ),
                )
            }
            "/metrics" => Response {
                status: 200,
                content_type: "text/plain; version=0.0.4",
                body: self.metrics.gather(&self.store),
            },
            _ => Response::text(404, "Not Found"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn server() -> HealthServer {
        HealthServer::new(Arc::new(Metrics::new()), Arc::new(CacheStore::new(8)))
    }

    #[test]
    fn test_ready_state() {
        let server = server();
        assert!(!server.is_ready());
        assert_eq!(server.route("GET /ready HTTP/1.1").status, 503);

        server.set_ready(true);
        assert!(server.is_ready());
        assert_eq!(server.route("GET /readyz HTTP/1.1").status, 200);
    }

    #[test]
    fn test_routes() {
        let server = server();
        assert_eq!(server.route("GET /health HTTP/1.1").status, 200);
        assert_eq!(server.route("POST /health HTTP/1.1").status, 405);
        assert_eq!(server.route("GET /nope HTTP/1.1").status, 404);
        assert_eq!(server.route("garbage").status, 400);
    }

    #[test]
    fn test_stats_and_metrics() {
        let server = server();
        server
            .store
            .set(Bytes::from_static(b"k"), Bytes::from_static(b"v"), 0, 0)
            .unwrap();

        let stats = server.route("GET /stats HTTP/1.1");
        assert_eq!(stats.body, r#"{"buckets":8,"items":1,"purged":0}"#);

        let metrics = server.route("GET /metrics HTTP/1.1");
        assert!(metrics.body.contains("jeapcached_items 1"));
    }
}
