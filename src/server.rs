pub mod lifecycle;

use std::future::Future;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, FromRequest, Request as HttpRequest};
use axum::response::IntoResponse;
use axum::Router;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};

use crate::api::Api;
use crate::error::Error;
use crate::request::Request;

pub use lifecycle::{LifecycleManager, LoggingStateListener, ServerState, StateListener};

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8000;
/// Largest request body read by default: 2 MiB.
pub const DEFAULT_BODY_LIMIT: usize = 2 * 1024 * 1024;

/// Where to listen.
///
/// If the `PORT` environment variable is set it wins over the configured
/// port, and the host defaults to `0.0.0.0` instead of `127.0.0.1`.
/// Request bodies larger than the body limit are answered with a 413.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerConfig {
    host: Option<String>,
    port: Option<u16>,
    body_limit: Option<usize>,
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn body_limit(mut self, limit: usize) -> Self {
        self.body_limit = Some(limit);
        self
    }

    pub fn max_body_size(&self) -> usize {
        self.body_limit.unwrap_or(DEFAULT_BODY_LIMIT)
    }

    /// `host:port` to bind, reading `PORT` from the environment.
    pub fn address(&self) -> Result<String, Error> {
        self.address_with(std::env::var("PORT").ok().as_deref())
    }

    fn address_with(&self, env_port: Option<&str>) -> Result<String, Error> {
        let (host, port) = match env_port {
            Some(raw) => {
                let port = raw
                    .trim()
                    .parse::<u16>()
                    .map_err(|_| Error::configuration(format!("Invalid PORT value '{}'", raw)))?;
                (self.host.as_deref().unwrap_or("0.0.0.0"), port)
            }
            None => (
                self.host.as_deref().unwrap_or(DEFAULT_HOST),
                self.port.unwrap_or(DEFAULT_PORT),
            ),
        };
        Ok(format!("{}:{}", host, port))
    }
}

/// Serves an [`Api`] over HTTP.
pub struct Server {
    api: Arc<Api>,
    config: ServerConfig,
    lifecycle: LifecycleManager,
}

impl Server {
    pub fn new(api: Api, config: ServerConfig) -> Self {
        Server {
            api: Arc::new(api),
            config,
            lifecycle: LifecycleManager::new(),
        }
    }

    pub fn lifecycle(&self) -> &LifecycleManager {
        &self.lifecycle
    }

    /// Bind and serve until Ctrl-C or SIGTERM.
    pub async fn run(self) -> Result<(), Error> {
        self.lifecycle.add_listener(Box::new(LoggingStateListener)).await;
        let env_port = std::env::var("PORT").ok();
        self.start(env_port.as_deref(), shutdown_signal()).await
    }

    async fn start<F>(self, env_port: Option<&str>, shutdown: F) -> Result<(), Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.lifecycle.transition_to(ServerState::Initializing).await?;

        let address = match self.config.address_with(env_port) {
            Ok(address) => address,
            Err(e) => {
                error!("Invalid server address: {}", e);
                self.lifecycle.transition_to(ServerState::Failed).await?;
                return Err(e);
            }
        };
        let listener = match TcpListener::bind(&address).await {
            Ok(listener) => listener,
            Err(e) => {
                error!("Failed to bind to {}: {}", address, e);
                self.lifecycle.transition_to(ServerState::Failed).await?;
                return Err(e.into());
            }
        };
        self.lifecycle.transition_to(ServerState::Initialized).await?;

        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` completes.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<(), Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.lifecycle.current_state().await == ServerState::Created {
            self.lifecycle.transition_to(ServerState::Initializing).await?;
            self.lifecycle.transition_to(ServerState::Initialized).await?;
        }

        let local_addr = listener.local_addr()?;
        let app = router(self.api.clone(), self.config.max_body_size());

        self.lifecycle.transition_to(ServerState::Running).await?;
        info!("Listening on http://{}", local_addr);

        let result = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await;

        if let Err(e) = result {
            error!("Server error: {}", e);
            self.lifecycle.transition_to(ServerState::Failed).await?;
            return Err(e.into());
        }

        info!("Shutting down");
        self.lifecycle.transition_to(ServerState::Stopping).await?;
        self.lifecycle.transition_to(ServerState::Stopped).await?;
        Ok(())
    }
}

/// Router that sends every request to `api`, reading at most `body_limit`
/// bytes of body.
fn router(api: Arc<Api>, body_limit: usize) -> Router {
    Router::new()
        .fallback(move |request: HttpRequest| {
            let api = api.clone();
            async move {
                let (parts, body) = request.into_parts();
                let buffered = HttpRequest::from_parts(parts.clone(), body);
                let bytes = match Bytes::from_request(buffered, &()).await {
                    Ok(bytes) => bytes,
                    Err(rejection) => {
                        warn!("Failed to read request body: {}", rejection.body_text());
                        return rejection.into_response();
                    }
                };
                let request = Request::from_http(parts, bytes, "http");
                api.handle(request).await.into_http()
            }
        })
        .layer(DefaultBodyLimit::max(body_limit))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::Response;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio::sync::oneshot;

    #[test]
    fn test_address_resolution() {
        let config = ServerConfig::new();
        assert_eq!(config.address_with(None).unwrap(), "127.0.0.1:8000");
        assert_eq!(config.address_with(Some("9000")).unwrap(), "0.0.0.0:9000");

        let config = ServerConfig::new().host("localhost").port(5000);
        assert_eq!(config.address_with(None).unwrap(), "localhost:5000");
        assert_eq!(config.address_with(Some("9000")).unwrap(), "localhost:9000");

        assert!(matches!(
            config.address_with(Some("nope")),
            Err(Error::Configuration(_))
        ));
    }

    async fn exchange(addr: std::net::SocketAddr, raw_request: &[u8]) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(raw_request).await.unwrap();
        let mut raw = String::new();
        stream.read_to_string(&mut raw).await.unwrap();
        raw
    }

    #[test]
    fn test_body_limit_default() {
        assert_eq!(ServerConfig::new().max_body_size(), DEFAULT_BODY_LIMIT);
        assert_eq!(ServerConfig::new().body_limit(16).max_body_size(), 16);
    }

    #[tokio::test]
    async fn test_oversized_body_is_rejected() {
        let api = Api::bare();
        api.route("/echo")
            .methods(["post"])
            .to(|req: Request, mut res: Response, _params| async move {
                res.text(req.text()?);
                Ok(res)
            })
            .unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let server = Server::new(api, ServerConfig::new().body_limit(8));
        let handle = tokio::spawn(server.serve(listener, async move {
            let _ = shutdown_rx.await;
        }));

        let raw = exchange(
            addr,
            b"POST /echo HTTP/1.1\r\nHost: localhost\r\nContent-Length: 4\r\nConnection: close\r\n\r\nsmol",
        )
        .await;
        assert!(raw.starts_with("HTTP/1.1 200 OK"));
        assert!(raw.ends_with("smol"));

        let raw = exchange(
            addr,
            b"POST /echo HTTP/1.1\r\nHost: localhost\r\nContent-Length: 32\r\nConnection: close\r\n\r\nthis body is much too long......",
        )
        .await;
        assert!(raw.starts_with("HTTP/1.1 413"));

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_invalid_port_fails_lifecycle() {
        let server = Server::new(Api::bare(), ServerConfig::new());
        let lifecycle = server.lifecycle().clone();

        let result = server.start(Some("nope"), std::future::ready(())).await;
        assert!(matches!(result, Err(Error::Configuration(_))));
        assert_eq!(lifecycle.current_state().await, ServerState::Failed);
    }

    #[tokio::test]
    async fn test_serves_over_tcp() {
        let api = Api::bare();
        api.route("/hello/{name}")
            .to(|_req, mut res: Response, params: crate::Params| async move {
                res.text(format!("hi {}", params.get("name").unwrap_or_default()));
                Ok(res)
            })
            .unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let server = Server::new(api, ServerConfig::new());
        let lifecycle = server.lifecycle().clone();
        let handle = tokio::spawn(server.serve(listener, async move {
            let _ = shutdown_rx.await;
        }));

        let raw = exchange(
            addr,
            b"GET /hello/bob HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
        )
        .await;

        assert!(raw.starts_with("HTTP/1.1 200 OK"));
        assert!(raw.ends_with("hi bob"));

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap().unwrap();
        assert_eq!(lifecycle.current_state().await, ServerState::Stopped);
    }
}
