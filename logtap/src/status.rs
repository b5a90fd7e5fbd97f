//! HTTP status endpoint.
//!
//! Any `GET`, whatever the path, answers with a snapshot of the running task
//! as indented JSON. Errors are JSON too, of the shape
//! `{"code":<status>,"reason":"...","message":"..."}`, `message` only being
//! present when there is something more to say than the reason.

use std::{net::SocketAddr, sync::Arc};

use bytes::Bytes;
use http::{HeaderValue, Method, StatusCode, header};
use http_body_util::{BodyExt, Full, combinators::BoxBody};
use hyper::{Request, Response};
use hyper_util::{
    rt::{TokioExecutor, TokioIo},
    server::conn::auto,
};
use logtap_signal::Watcher;
use serde::Serialize;
use tokio::{
    net::TcpListener,
    pin,
    sync::{Semaphore, TryAcquireError},
    task::JoinSet,
};
use tracing::{debug, error, info, warn};

use crate::{field_path::FieldPath, runner::Runner, task::validate_task};

/// Connections served at once. Further connections are dropped.
pub const CONCURRENCY_LIMIT: usize = 16;

#[derive(thiserror::Error, Debug)]
/// Errors produced by [`Server`].
pub enum Error {
    /// Wrapper for [`std::io::Error`].
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// A response body could not be serialized.
    #[error("Failed to serialize response: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Serialize)]
struct HttpError {
    code: u16,
    reason: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

/// Body of every status response.
pub type Body = BoxBody<Bytes, hyper::Error>;

fn full(bytes: impl Into<Bytes>) -> Body {
    Full::new(bytes.into())
        .map_err(|never| match never {})
        .boxed()
}

fn json_response(status: StatusCode, body: Vec<u8>) -> Response<Body> {
    let mut response = Response::new(full(body));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    response
}

fn error_response(
    status: StatusCode,
    reason: &'static str,
    message: Option<String>,
) -> Response<Body> {
    let body = HttpError {
        code: status.as_u16(),
        reason,
        message,
    };
    json_response(status, serde_json::to_vec(&body).unwrap_or_default())
}

/// Answer a request made with `method` about `runner`.
///
/// The request path is not consulted.
#[must_use]
pub fn handle(method: &Method, runner: Option<&Runner>) -> Response<Body> {
    if *method != Method::GET {
        return error_response(StatusCode::METHOD_NOT_ALLOWED, "method not allowed", None);
    }
    let Some(runner) = runner else {
        return error_response(
            StatusCode::NOT_FOUND,
            "target not found",
            Some("Cannot find the requested LogTask object.".to_string()),
        );
    };

    let task = runner.task();
    if let Err(err) = validate_task(&FieldPath::with_root("logTask"), &task) {
        error!("status snapshot is invalid: {err}");
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "invalid data",
            Some(err.to_string()),
        );
    }

    match render(&task) {
        Ok(body) => json_response(StatusCode::OK, body),
        Err(err) => {
            error!("failed to serialize status snapshot: {err}");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "serialization failed",
                Some(err.to_string()),
            )
        }
    }
}

/// Serialize `value` as JSON indented by four spaces.
fn render<T: Serialize>(value: &T) -> Result<Vec<u8>, Error> {
    let mut body = Vec::with_capacity(512);
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut body, formatter);
    value.serialize(&mut serializer)?;
    Ok(body)
}

#[derive(Debug)]
/// Serves [`handle`] over HTTP until shut down.
pub struct Server {
    addr: SocketAddr,
    runner: Option<Arc<Runner>>,
    shutdown: Watcher,
}

impl Server {
    /// Create a new [`Server`]. Nothing is bound until [`Server::run`].
    #[must_use]
    pub fn new(addr: SocketAddr, runner: Option<Arc<Runner>>, shutdown: Watcher) -> Self {
        Self {
            addr,
            runner,
            shutdown,
        }
    }

    /// Bind and serve until the shutdown signal arrives. In-flight
    /// connections are allowed to finish.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn run(self) -> Result<(), Error> {
        let listener = TcpListener::bind(self.addr).await?;
        info!("status server listening on {addr}", addr = self.addr);
        serve(listener, self.runner, self.shutdown).await;
        Ok(())
    }
}

async fn serve(listener: TcpListener, runner: Option<Arc<Runner>>, shutdown: Watcher) {
    let sem = Arc::new(Semaphore::new(CONCURRENCY_LIMIT));
    let mut join_set = JoinSet::new();

    let shutdown_fut = shutdown.recv();
    pin!(shutdown_fut);
    loop {
        tokio::select! {
            () = &mut shutdown_fut => {
                info!("Shutdown signal received, stopping status server.");
                break;
            }

            incoming = listener.accept() => {
                let (stream, addr) = match incoming {
                    Ok(sa) => sa,
                    Err(e) => {
                        error!("Error accepting connection: {e}");
                        continue;
                    }
                };
                debug!("Accepted connection from {addr}");

                let sem = Arc::clone(&sem);
                let runner = runner.clone();

                join_set.spawn(async move {
                    let permit = match sem.try_acquire() {
                        Ok(p) => p,
                        Err(TryAcquireError::Closed) => {
                            error!("Semaphore closed");
                            return;
                        }
                        Err(TryAcquireError::NoPermits) => {
                            warn!("status server over connection capacity, load shedding");
                            drop(stream);
                            return;
                        }
                    };

                    let service = hyper::service::service_fn(
                        move |req: Request<hyper::body::Incoming>| {
                            let response = handle(req.method(), runner.as_deref());
                            async move { Ok::<_, hyper::Error>(response) }
                        },
                    );
                    let builder = auto::Builder::new(TokioExecutor::new());
                    if let Err(e) = builder.serve_connection(TokioIo::new(stream), service).await {
                        error!("Error serving {addr}: {e}");
                    }
                    drop(permit);
                });
            }
        }
    }

    drop(listener);
    while join_set.join_next().await.is_some() {}
}
