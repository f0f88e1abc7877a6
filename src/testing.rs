//! In-process client for exercising an [`Api`] without a socket.

use axum::body::Bytes;
use axum::http::{header, Method};
use serde::Serialize;

use crate::api::Api;
use crate::error::Error;
use crate::request::{Request, Url};
use crate::response::Response;

/// Sends requests straight into [`Api::handle`].
///
/// Requests go to `http://testserver` unless another base URL is set, and
/// always carry a matching `Host` header.
pub struct TestClient<'a> {
    api: &'a Api,
    base_url: Url,
}

impl<'a> TestClient<'a> {
    pub(crate) fn new(api: &'a Api) -> Self {
        TestClient {
            api,
            base_url: Url::new("http", "testserver", "/"),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Result<Self, Error> {
        self.base_url = Url::parse(base_url)?;
        Ok(self)
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Start a request; add headers or a body, then [`TestRequest::send`] it.
    pub fn request(&self, method: Method, path: &str) -> TestRequest<'a> {
        let url = Url::new(self.base_url.scheme(), self.base_url.host(), path)
            .with_port(self.base_url.port());
        let request = Request::new(method, url).with_header(header::HOST.as_str(), &self.base_url.netloc());
        TestRequest {
            api: self.api,
            request,
        }
    }

    pub async fn get(&self, path: &str) -> Response {
        self.request(Method::GET, path).dispatch().await
    }

    pub async fn post(&self, path: &str) -> Response {
        self.request(Method::POST, path).dispatch().await
    }

    pub async fn put(&self, path: &str) -> Response {
        self.request(Method::PUT, path).dispatch().await
    }

    pub async fn patch(&self, path: &str) -> Response {
        self.request(Method::PATCH, path).dispatch().await
    }

    pub async fn delete(&self, path: &str) -> Response {
        self.request(Method::DELETE, path).dispatch().await
    }

    pub async fn head(&self, path: &str) -> Response {
        self.request(Method::HEAD, path).dispatch().await
    }

    pub async fn options(&self, path: &str) -> Response {
        self.request(Method::OPTIONS, path).dispatch().await
    }
}

pub struct TestRequest<'a> {
    api: &'a Api,
    request: Result<Request, Error>,
}

impl<'a> TestRequest<'a> {
    /// Set a header, replacing the default `Host` if `name` is `host`.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.request = self.request.and_then(|req| req.with_header(name, value));
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.request = self.request.map(|req| req.with_body(body));
        self
    }

    pub fn json<T: Serialize + ?Sized>(self, value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(body) => self.header("content-type", "application/json").body(body),
            Err(err) => TestRequest {
                api: self.api,
                request: Err(err.into()),
            },
        }
    }

    /// Fails only when the request itself could not be built.
    pub async fn send(self) -> Result<Response, Error> {
        let request = self.request?;
        Ok(self.api.handle(request).await)
    }

    async fn dispatch(self) -> Response {
        match self.send().await {
            Ok(response) => response,
            Err(err) => Response::plain(
                axum::http::StatusCode::BAD_REQUEST,
                format!("Could not build test request: {}", err),
            ),
        }
    }
}
