use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use axum::http::{header, HeaderValue, Method, StatusCode};
use tracing::debug;

use crate::api::App;
use crate::error::Error;
use crate::request::Request;
use crate::response::Response;

/// Serve the files under `directory`. Mount the result on an [`crate::Api`].
pub fn static_files(directory: impl Into<PathBuf>) -> StaticFiles {
    StaticFiles::new(directory)
}

/// A mountable app answering `GET` and `HEAD` with file contents.
#[derive(Debug, Clone)]
pub struct StaticFiles {
    directory: PathBuf,
}

impl StaticFiles {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        StaticFiles {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    async fn resolve(&self, path: &str) -> Result<Option<PathBuf>, Response> {
        let base_dir = match tokio::fs::canonicalize(&self.directory).await {
            Ok(dir) => dir,
            Err(_) => return Ok(None),
        };

        let requested = base_dir.join(path.trim_start_matches('/'));
        let resolved = match tokio::fs::canonicalize(&requested).await {
            Ok(resolved) => resolved,
            Err(_) => return Ok(None),
        };

        if !resolved.starts_with(&base_dir) {
            debug!(path = %path, "Rejected static path outside of directory");
            return Err(Response::plain(StatusCode::FORBIDDEN, "Forbidden"));
        }

        match tokio::fs::metadata(&resolved).await {
            Ok(metadata) if metadata.is_file() => Ok(Some(resolved)),
            _ => Ok(None),
        }
    }
}

#[async_trait]
impl App for StaticFiles {
    async fn call(&self, req: Request) -> Result<Response, Error> {
        let head = match *req.method() {
            Method::GET => false,
            Method::HEAD => true,
            _ => return Ok(Response::plain(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed")),
        };

        let resolved = match self.resolve(req.path()).await {
            Ok(Some(resolved)) => resolved,
            Ok(None) => return Ok(Response::plain(StatusCode::NOT_FOUND, "Not Found")),
            Err(response) => return Ok(response),
        };

        let bytes = match tokio::fs::read(&resolved).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Ok(Response::plain(StatusCode::NOT_FOUND, "Not Found"))
            }
            Err(e) => return Err(e.into()),
        };

        let mut response = Response::default();
        if head {
            response.content(Vec::new(), content_type(&resolved));
            response
                .headers_mut()
                .insert(header::CONTENT_LENGTH, HeaderValue::from(bytes.len()));
        } else {
            response.content(bytes, content_type(&resolved));
        }
        Ok(response)
    }
}

fn content_type(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase()
        .as_str()
    {
        "html" | "htm" => "text/html; charset=utf-8",
        "txt" => "text/plain; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" | "mjs" => "application/javascript",
        "json" => "application/json",
        "xml" => "application/xml",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "ico" => "image/x-icon",
        "webp" => "image/webp",
        "pdf" => "application/pdf",
        "woff2" => "font/woff2",
        "woff" => "font/woff",
        _ => "application/octet-stream",
    }
}
