use async_trait::async_trait;
use axum::http::StatusCode;
use tracing::debug;

use crate::error::Error;
use crate::middleware::{Middleware, Next};
use crate::request::Request;
use crate::response::Response;

/// Rejects requests whose `Host` header is not in the allowed list.
///
/// Patterns are exact hosts, `*` for any host, or `*.example.com` for any
/// subdomain of `example.com`. Ports are ignored when matching.
#[derive(Debug, Clone)]
pub struct TrustedHostMiddleware {
    allowed_hosts: Vec<String>,
    allow_any: bool,
    www_redirect: bool,
}

impl TrustedHostMiddleware {
    pub fn new<I, S>(allowed_hosts: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let allowed_hosts: Vec<String> = allowed_hosts.into_iter().map(Into::into).collect();
        for pattern in &allowed_hosts {
            let valid = pattern == "*"
                || !pattern.contains('*')
                || pattern
                    .strip_prefix("*.")
                    .is_some_and(|rest| !rest.contains('*'));
            if !valid {
                return Err(Error::configuration(format!(
                    "Domain wildcard patterns must be like '*.example.com', got '{}'",
                    pattern
                )));
            }
        }

        Ok(TrustedHostMiddleware {
            allow_any: allowed_hosts.iter().any(|pattern| pattern == "*"),
            allowed_hosts,
            www_redirect: true,
        })
    }

    /// Redirect `example.com` to `www.example.com` when only the latter is
    /// allowed. On by default.
    pub fn www_redirect(mut self, enabled: bool) -> Self {
        self.www_redirect = enabled;
        self
    }

    pub fn allowed_hosts(&self) -> &[String] {
        &self.allowed_hosts
    }

    pub fn is_allowed(&self, host: &str) -> bool {
        self.allow_any
            || self.allowed_hosts.iter().any(|pattern| match pattern.strip_prefix('*') {
                Some(suffix) => host.ends_with(suffix),
                None => host == pattern,
            })
    }
}

#[async_trait]
impl Middleware for TrustedHostMiddleware {
    async fn handle(&self, req: Request, next: Next<'_>) -> Result<Response, Error> {
        if self.allow_any {
            return next.run(req).await;
        }

        let host = req
            .header("host")
            .map(|value| value.split(':').next().unwrap_or_default().to_string())
            .unwrap_or_default();

        if self.is_allowed(&host) {
            return next.run(req).await;
        }

        let www_host = format!("www.{}", host);
        if self.www_redirect && self.allowed_hosts.contains(&www_host) {
            let url = req.url().clone().with_host(www_host).to_string();
            debug!(host = %host, url = %url, "Redirecting to www host");
            let mut response = Response::plain(StatusCode::TEMPORARY_REDIRECT, "");
            response.set_header("location", &url)?;
            return Ok(response);
        }

        debug!(host = %host, "Rejected request with untrusted host");
        Ok(Response::plain(StatusCode::BAD_REQUEST, "Invalid host header"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Api;

    fn api_with(middleware: TrustedHostMiddleware) -> Api {
        let mut api = Api::bare();
        api.add_middleware(middleware);
        api.route("/").to(|_req, res, _params| async move { Ok(res) }).unwrap();
        api
    }

    #[test]
    fn test_invalid_wildcard_pattern() {
        assert!(TrustedHostMiddleware::new(["example.*.com"]).is_err());
        assert!(TrustedHostMiddleware::new(["*.*.com"]).is_err());
        assert!(TrustedHostMiddleware::new(["*", "*.example.com", "example.com"]).is_ok());
    }

    #[test]
    fn test_is_allowed() {
        let middleware = TrustedHostMiddleware::new(["testserver", "*.example.com"]).unwrap();
        assert!(middleware.is_allowed("testserver"));
        assert!(middleware.is_allowed("api.example.com"));
        assert!(!middleware.is_allowed("example.org"));
    }

    #[tokio::test]
    async fn test_rejects_untrusted_host() {
        let api = api_with(TrustedHostMiddleware::new(["testserver", "*.testserver"]).unwrap());

        assert_eq!(api.client().get("/").await.status_code(), 200);

        let res = api
            .client()
            .request(axum::http::Method::GET, "/")
            .header("host", "sub.testserver:8000")
            .send()
            .await
            .unwrap();
        assert_eq!(res.status_code(), 200);

        let res = api
            .client()
            .request(axum::http::Method::GET, "/")
            .header("host", "evil.com")
            .send()
            .await
            .unwrap();
        assert_eq!(res.status_code(), 400);
        assert_eq!(res.body_text(), "Invalid host header");
    }

    #[tokio::test]
    async fn test_www_redirect() {
        let api = api_with(TrustedHostMiddleware::new(["www.example.com"]).unwrap());
        let client = api.client().with_base_url("https://example.com").unwrap();

        let res = client.get("/").await;
        assert_eq!(res.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(res.header("location"), Some("https://www.example.com/"));
    }
}
