//! HTTP server.
//!
//! A thin hyper adapter: each connection is served on its own task, request
//! bodies are buffered up to the configured limit, and the [`App`] turns
//! every request into exactly one response.
//!
//! # Example
//!
//! ```rust,ignore
//! use portcullis::{App, Server};
//! use portcullis_config::ServerConfig;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let app = App::builder().group(routes()?).build();
//!     Server::new(app, ServerConfig::default()).run().await?;
//!     Ok(())
//! }
//! ```

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use http_body_util::{BodyExt, Limited};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use portcullis_config::ServerConfig;
use portcullis_core::{Problem, RequestContext, Response};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinSet;

use crate::app::App;
use crate::error::ServerError;

/// Serves an [`App`] over HTTP/1.1.
#[derive(Debug)]
pub struct Server {
    app: Arc<App>,
    max_body_bytes: usize,
    shutdown_timeout: Duration,
    http_addr: String,
}

impl Server {
    /// Creates a server.
    #[must_use]
    pub fn new(app: App, config: ServerConfig) -> Self {
        Self {
            app: Arc::new(app),
            max_body_bytes: config.max_body_bytes,
            shutdown_timeout: Duration::from_secs(config.shutdown_timeout_secs),
            http_addr: config.http_addr,
        }
    }

    /// Returns the application.
    #[must_use]
    pub fn app(&self) -> &Arc<App> {
        &self.app
    }

    /// Binds the configured address and serves until Ctrl-C.
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_with_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
            }
        })
        .await
    }

    /// Binds the configured address and serves until `shutdown` completes.
    pub async fn run_with_shutdown<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send,
    {
        let addr: SocketAddr = self
            .http_addr
            .parse()
            .map_err(|_| ServerError::InvalidAddress(self.http_addr.clone()))?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        self.serve(listener, shutdown).await;
        Ok(())
    }

    /// Serves connections from a bound listener until `shutdown` completes.
    ///
    /// In-flight connections are asked to finish and given the configured
    /// shutdown timeout.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F)
    where
        F: Future<Output = ()> + Send,
    {
        if let Ok(addr) = listener.local_addr() {
            tracing::info!(%addr, "server listening");
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let mut connections = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, remote)) => {
                        connections.spawn(serve_connection(
                            Arc::clone(&self.app),
                            self.max_body_bytes,
                            stream,
                            remote,
                            stop_rx.clone(),
                        ));
                    }
                    Err(e) => tracing::error!(error = %e, "failed to accept connection"),
                },
                () = &mut shutdown => {
                    tracing::info!("shutdown signal received, stopping server");
                    break;
                }
            }
        }

        let _ = stop_tx.send(true);
        let drained = tokio::time::timeout(self.shutdown_timeout, async {
            while connections.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            tracing::warn!(
                remaining = connections.len(),
                "shutdown timeout reached, aborting connections"
            );
            connections.abort_all();
        }
        tracing::info!("server stopped");
    }
}

async fn serve_connection(
    app: Arc<App>,
    max_body_bytes: usize,
    stream: TcpStream,
    remote: SocketAddr,
    mut stop: watch::Receiver<bool>,
) {
    let service = service_fn(move |request: hyper::Request<Incoming>| {
        let app = Arc::clone(&app);
        async move { Ok::<_, Infallible>(handle(&app, request, max_body_bytes).await) }
    });

    let conn = http1::Builder::new().serve_connection(TokioIo::new(stream), service);
    tokio::pin!(conn);

    let result = tokio::select! {
        result = conn.as_mut() => result,
        _ = stop.changed() => {
            conn.as_mut().graceful_shutdown();
            conn.await
        }
    };
    if let Err(e) = result {
        tracing::debug!(%remote, error = %e, "connection closed with error");
    }
}

async fn handle(app: &App, request: hyper::Request<Incoming>, max_body_bytes: usize) -> Response {
    let (parts, body) = request.into_parts();
    let context = RequestContext::from_headers(parts.method.clone(), parts.uri.path(), &parts.headers);

    match Limited::new(body, max_body_bytes).collect().await {
        Ok(collected) => {
            let request = http::Request::from_parts(parts, collected.to_bytes());
            app.dispatch(request, context).await
        }
        Err(e) => {
            let problem = if e.is::<http_body_util::LengthLimitError>() {
                Problem::bad_request(format!("request body exceeds {max_body_bytes} bytes"))
            } else {
                Problem::bad_request("failed to read request body")
            };
            app.reject(problem, &context)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::RouteGroup;
    use crate::route::post;
    use portcullis_core::Json;
    use portcullis_middleware::Call;
    use portcullis_router::PathTemplate;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn echo_app() -> App {
        let group = RouteGroup::new()
            .route(
                post(PathTemplate::parse("/echo").unwrap())
                    .unsecured()
                    .json_body::<serde_json::Value>()
                    .handle(|call: Call<(), (), serde_json::Value>| async move { Json(call.body) }),
            )
            .unwrap();
        App::builder().group(group).build()
    }

    async fn exchange(addr: SocketAddr, raw: String) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(raw.as_bytes()).await.unwrap();
        let mut response = Vec::new();
        stream.read_to_end(&mut response).await.unwrap();
        String::from_utf8(response).unwrap()
    }

    fn post_echo(body: &str) -> String {
        format!(
            "POST /echo HTTP/1.1\r\nhost: localhost\r\ncontent-type: application/json\r\n\
             content-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        )
    }

    #[tokio::test]
    async fn test_serves_until_shutdown() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let config = ServerConfig {
            max_body_bytes: 64,
            shutdown_timeout_secs: 1,
            ..ServerConfig::default()
        };
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let server = tokio::spawn(Server::new(echo_app(), config).serve(listener, async {
            let _ = rx.await;
        }));

        let ok = exchange(addr, post_echo(r#"{"a":1}"#)).await;
        assert!(ok.starts_with("HTTP/1.1 200"), "{ok}");
        assert!(ok.contains("x-request-id"));
        assert!(ok.ends_with(r#"{"a":1}"#));

        let too_big = exchange(addr, post_echo(&format!(r#"{{"a":"{}"}}"#, "x".repeat(100)))).await;
        assert!(too_big.starts_with("HTTP/1.1 400"), "{too_big}");
        assert!(too_big.contains("application/problem+json"));

        tx.send(()).unwrap();
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_address() {
        let config = ServerConfig {
            http_addr: "not an address".into(),
            ..ServerConfig::default()
        };
        let result = Server::new(echo_app(), config)
            .run_with_shutdown(async {})
            .await;
        assert!(matches!(result, Err(ServerError::InvalidAddress(_))));
    }
}
