//! Scoped static file server
//!
//! Serves files below one root directory over plain HTTP GET so a peer hub
//! can fetch resources referenced by calls. Every request path is resolved
//! with symlinks followed; anything landing outside the root is refused with
//! 403, never just logged. No directory listings.
//!
//! | Request                         | Status |
//! |---------------------------------|--------|
//! | file inside the root            | 200    |
//! | resolves outside the root       | 403    |
//! | missing path or a directory     | 404    |
//! | any method other than GET       | 405    |

use crate::{Result, TransportError};
use bytes::Bytes;
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Client, Method, Request, Response, Server, StatusCode, Uri};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct FileServer {
    root: PathBuf,
}

impl FileServer {
    /// Serve files below `root`, which must be an existing directory
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = std::fs::canonicalize(root.as_ref()).map_err(|e| {
            TransportError::configuration(
                format!("File server root {:?}: {}", root.as_ref(), e),
                Some("file_server.root"),
            )
        })?;
        if !root.is_dir() {
            return Err(TransportError::configuration(
                format!("File server root {:?} is not a directory", root),
                Some("file_server.root"),
            ));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a request path to a file inside the root
    pub async fn resolve(&self, request_path: &str) -> std::result::Result<PathBuf, StatusCode> {
        let relative = request_path.trim_start_matches('/');
        if relative.is_empty() || relative.contains('\0') {
            return Err(StatusCode::NOT_FOUND);
        }
        let resolved = tokio::fs::canonicalize(self.root.join(relative))
            .await
            .map_err(|_| StatusCode::NOT_FOUND)?;
        if !resolved.starts_with(&self.root) {
            return Err(StatusCode::FORBIDDEN);
        }
        let metadata = tokio::fs::metadata(&resolved)
            .await
            .map_err(|_| StatusCode::NOT_FOUND)?;
        if !metadata.is_file() {
            return Err(StatusCode::NOT_FOUND);
        }
        Ok(resolved)
    }

    /// Serve on an already bound listener until the runtime shuts down
    pub async fn serve(self, listener: std::net::TcpListener) -> Result<()> {
        let addr = listener.local_addr()?;
        let server = Arc::new(self);

        let make_svc = make_service_fn(move |_conn| {
            let server = Arc::clone(&server);
            async move {
                Ok::<_, Infallible>(service_fn(move |req| {
                    let server = Arc::clone(&server);
                    handle_request(req, server)
                }))
            }
        });

        let server = Server::from_tcp(listener)?.serve(make_svc);
        info!("File server listening on http://{}", addr);

        if let Err(e) = server.await {
            error!("File server error: {}", e);
            return Err(e.into());
        }
        Ok(())
    }
}

fn status_response(status: StatusCode, text: &'static str) -> Response<Body> {
    let mut response = Response::new(Body::from(text));
    *response.status_mut() = status;
    response
}

/// Handle one file request
async fn handle_request(
    req: Request<Body>,
    server: Arc<FileServer>,
) -> std::result::Result<Response<Body>, Infallible> {
    let path = req.uri().path();
    debug!("File request: {} {}", req.method(), path);

    if req.method() != Method::GET {
        return Ok(status_response(
            StatusCode::METHOD_NOT_ALLOWED,
            "Method not allowed",
        ));
    }

    let resolved = match server.resolve(path).await {
        Ok(resolved) => resolved,
        Err(StatusCode::FORBIDDEN) => {
            warn!("Refusing file request outside the root: {}", path);
            return Ok(status_response(StatusCode::FORBIDDEN, "Forbidden"));
        }
        Err(status) => return Ok(status_response(status, "Not found")),
    };

    match tokio::fs::read(&resolved).await {
        Ok(contents) => Ok(Response::new(Body::from(contents))),
        Err(e) => {
            warn!("Failed to read {:?}: {}", resolved, e);
            Ok(status_response(StatusCode::NOT_FOUND, "Not found"))
        }
    }
}

/// Fetch `path` from a peer's file server
pub async fn fetch_resource(addr: SocketAddr, path: &str) -> Result<Bytes> {
    let uri: Uri = format!("http://{}/{}", addr, path.trim_start_matches('/'))
        .parse()
        .map_err(|e| TransportError::http(format!("Invalid resource path {:?}: {}", path, e), None))?;

    let response = Client::new().get(uri).await?;
    let status = response.status();
    if status != StatusCode::OK {
        return Err(TransportError::http(
            format!("Fetching {:?} from {} failed with {}", path, addr, status),
            Some(status.as_u16()),
        ));
    }
    Ok(hyper::body::to_bytes(response.into_body()).await?)
}
