use async_trait::async_trait;
use axum::http::StatusCode;
use tracing::debug;

use crate::error::Error;
use crate::middleware::{Middleware, Next};
use crate::request::Request;
use crate::response::Response;

/// Redirects `http` and `ws` requests to `https` and `wss`.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpsRedirectMiddleware;

impl HttpsRedirectMiddleware {
    pub fn new() -> Self {
        HttpsRedirectMiddleware
    }
}

#[async_trait]
impl Middleware for HttpsRedirectMiddleware {
    async fn handle(&self, req: Request, next: Next<'_>) -> Result<Response, Error> {
        let scheme = match req.url().scheme() {
            "http" => "https",
            "ws" => "wss",
            _ => return next.run(req).await,
        };

        let url = req.url().clone();
        let port = url.port().filter(|port| *port != 80 && *port != 443);
        let location = url.with_scheme(scheme).with_port(port).to_string();
        debug!(location = %location, "Redirecting to secure scheme");

        let mut response = Response::plain(StatusCode::TEMPORARY_REDIRECT, "");
        response.set_header("location", &location)?;
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Api;

    fn api() -> Api {
        let mut api = Api::bare();
        api.add_middleware(HttpsRedirectMiddleware::new());
        api.route("/").to(|_req, res, _params| async move { Ok(res) }).unwrap();
        api
    }

    #[tokio::test]
    async fn test_http_is_redirected() {
        let api = api();

        let res = api.client().get("/?a=1").await;
        assert_eq!(res.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(res.header("location"), Some("https://testserver/?a=1"));

        let client = api.client().with_base_url("http://testserver:80").unwrap();
        let res = client.get("/").await;
        assert_eq!(res.header("location"), Some("https://testserver/"));

        let client = api.client().with_base_url("http://testserver:8080").unwrap();
        let res = client.get("/").await;
        assert_eq!(res.header("location"), Some("https://testserver:8080/"));
    }

    #[tokio::test]
    async fn test_https_passes_through() {
        let api = api();
        let client = api.client().with_base_url("https://testserver").unwrap();
        assert_eq!(client.get("/").await.status_code(), 200);
    }
}
