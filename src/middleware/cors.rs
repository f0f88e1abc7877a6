use async_trait::async_trait;
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Error;
use crate::middleware::{Middleware, Next};
use crate::request::Request;
use crate::response::Response;

const ALL_METHODS: [&str; 7] = ["DELETE", "GET", "HEAD", "OPTIONS", "PATCH", "POST", "PUT"];
const SAFELISTED_HEADERS: [&str; 4] = ["accept", "accept-language", "content-language", "content-type"];

/// Cross-origin resource sharing options.
///
/// Everything is denied by default. Deserializes from a `cors_config`
/// settings map; missing keys keep their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    pub allow_origins: Vec<String>,
    pub allow_origin_regex: Option<String>,
    pub allow_methods: Vec<String>,
    pub allow_headers: Vec<String>,
    pub allow_credentials: bool,
    pub expose_headers: Vec<String>,
    pub max_age: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        CorsConfig {
            allow_origins: Vec::new(),
            allow_origin_regex: None,
            allow_methods: vec!["GET".to_string()],
            allow_headers: Vec::new(),
            allow_credentials: false,
            expose_headers: Vec::new(),
            max_age: 600,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CorsMiddleware {
    allow_origins: Vec<String>,
    allow_origin_regex: Option<Regex>,
    allow_methods: Vec<String>,
    allow_headers: Vec<String>,
    allow_all_origins: bool,
    allow_all_headers: bool,
    preflight_explicit_allow_origin: bool,
    simple_headers: HeaderMap,
    preflight_headers: HeaderMap,
}

impl CorsMiddleware {
    pub fn new(config: CorsConfig) -> Result<Self, Error> {
        let allow_origin_regex = config
            .allow_origin_regex
            .as_deref()
            .map(|pattern| {
                Regex::new(&format!("^(?:{})$", pattern)).map_err(|e| {
                    Error::configuration(format!("Invalid allow_origin_regex '{}': {}", pattern, e))
                })
            })
            .transpose()?;

        let allow_all_origins = config.allow_origins.iter().any(|origin| origin == "*");
        let allow_all_headers = config.allow_headers.iter().any(|h| h == "*");
        let preflight_explicit_allow_origin = !allow_all_origins || config.allow_credentials;

        let allow_methods: Vec<String> = if config.allow_methods.iter().any(|m| m == "*") {
            ALL_METHODS.iter().map(|m| m.to_string()).collect()
        } else {
            config.allow_methods.iter().map(|m| m.to_uppercase()).collect()
        };

        let mut allow_headers: Vec<String> = SAFELISTED_HEADERS
            .iter()
            .map(|h| h.to_string())
            .chain(config.allow_headers.iter().map(|h| h.to_lowercase()))
            .collect();
        allow_headers.sort();
        allow_headers.dedup();

        let mut simple_headers = HeaderMap::new();
        if allow_all_origins {
            simple_headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
        }
        if config.allow_credentials {
            simple_headers.insert(
                header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
                HeaderValue::from_static("true"),
            );
        }
        if !config.expose_headers.is_empty() {
            simple_headers.insert(
                header::ACCESS_CONTROL_EXPOSE_HEADERS,
                header_value(&config.expose_headers.join(", "))?,
            );
        }

        let mut preflight_headers = HeaderMap::new();
        if preflight_explicit_allow_origin {
            preflight_headers.insert(header::VARY, HeaderValue::from_static("Origin"));
        } else {
            preflight_headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
        }
        preflight_headers.insert(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            header_value(&allow_methods.join(", "))?,
        );
        preflight_headers.insert(header::ACCESS_CONTROL_MAX_AGE, HeaderValue::from(config.max_age));
        if !allow_all_headers && !allow_headers.is_empty() {
            preflight_headers.insert(
                header::ACCESS_CONTROL_ALLOW_HEADERS,
                header_value(&allow_headers.join(", "))?,
            );
        }
        if config.allow_credentials {
            preflight_headers.insert(
                header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
                HeaderValue::from_static("true"),
            );
        }

        Ok(CorsMiddleware {
            allow_origins: config.allow_origins,
            allow_origin_regex,
            allow_methods,
            allow_headers,
            allow_all_origins,
            allow_all_headers,
            preflight_explicit_allow_origin,
            simple_headers,
            preflight_headers,
        })
    }

    pub fn is_allowed_origin(&self, origin: &str) -> bool {
        self.allow_all_origins
            || self
                .allow_origin_regex
                .as_ref()
                .is_some_and(|regex| regex.is_match(origin))
            || self.allow_origins.iter().any(|allowed| allowed == origin)
    }

    fn preflight_response(&self, req: &Request, origin: &str) -> Result<Response, Error> {
        let requested_method = req.header("access-control-request-method").unwrap_or_default();
        let requested_headers = req.header("access-control-request-headers");

        let mut headers = self.preflight_headers.clone();
        let mut failures = Vec::new();

        if self.is_allowed_origin(origin) {
            if self.preflight_explicit_allow_origin {
                headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, header_value(origin)?);
            }
        } else {
            failures.push("origin");
        }

        if !self.allow_methods.iter().any(|m| m == requested_method) {
            failures.push("method");
        }

        match requested_headers {
            Some(requested) if self.allow_all_headers => {
                headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, header_value(requested)?);
            }
            Some(requested) => {
                let disallowed = requested
                    .split(',')
                    .map(|h| h.trim().to_lowercase())
                    .any(|h| !self.allow_headers.contains(&h));
                if disallowed {
                    failures.push("headers");
                }
            }
            None => {}
        }

        let mut response = if failures.is_empty() {
            Response::plain(StatusCode::OK, "OK")
        } else {
            debug!(origin = %origin, failures = ?failures, "Rejected CORS preflight");
            Response::plain(
                StatusCode::BAD_REQUEST,
                format!("Disallowed CORS {}", failures.join(", ")),
            )
        };
        response.headers_mut().extend(headers);
        Ok(response)
    }

    fn decorate_simple(&self, origin: &str, has_cookie: bool, res: &mut Response) -> Result<(), Error> {
        res.headers_mut().extend(self.simple_headers.clone());

        let echo_origin = if self.allow_all_origins {
            has_cookie
        } else {
            self.is_allowed_origin(origin)
        };

        if echo_origin {
            res.headers_mut()
                .insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, header_value(origin)?);
            let vary = match res.header("vary") {
                Some(existing) => format!("{}, Origin", existing),
                None => "Origin".to_string(),
            };
            res.set_header("vary", &vary)?;
        }
        Ok(())
    }
}

#[async_trait]
impl Middleware for CorsMiddleware {
    async fn handle(&self, req: Request, next: Next<'_>) -> Result<Response, Error> {
        let origin = match req.header("origin") {
            Some(origin) => origin.to_string(),
            None => return next.run(req).await,
        };

        if req.method() == Method::OPTIONS && req.headers().contains_key("access-control-request-method") {
            return self.preflight_response(&req, &origin);
        }

        let has_cookie = req.headers().contains_key(header::COOKIE);
        let mut res = next.run(req).await?;
        self.decorate_simple(&origin, has_cookie, &mut res)?;
        Ok(res)
    }
}

fn header_value(value: &str) -> Result<HeaderValue, Error> {
    HeaderValue::from_str(value).map_err(|e| Error::Header(format!("{}: {}", value, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Api;

    fn api(config: CorsConfig) -> Api {
        let mut api = Api::bare();
        api.add_middleware(CorsMiddleware::new(config).unwrap());
        api.route("/")
            .to(|_req, mut res: Response, _params| async move {
                res.text("Homepage");
                Ok(res)
            })
            .unwrap();
        api
    }

    #[tokio::test]
    async fn test_allow_all() {
        let api = api(CorsConfig {
            allow_origins: vec!["*".into()],
            allow_methods: vec!["*".into()],
            allow_headers: vec!["*".into()],
            expose_headers: vec!["X-Status".into()],
            allow_credentials: true,
            ..CorsConfig::default()
        });

        let res = api
            .client()
            .request(Method::OPTIONS, "/")
            .header("origin", "https://example.org")
            .header("access-control-request-method", "GET")
            .header("access-control-request-headers", "X-Example")
            .send()
            .await
            .unwrap();
        assert_eq!(res.status_code(), 200);
        assert_eq!(res.body_text(), "OK");
        assert_eq!(res.header("access-control-allow-origin"), Some("https://example.org"));
        assert_eq!(res.header("access-control-allow-headers"), Some("X-Example"));
        assert_eq!(res.header("access-control-allow-credentials"), Some("true"));
        assert_eq!(res.header("vary"), Some("Origin"));

        let res = api
            .client()
            .request(Method::GET, "/")
            .header("origin", "https://example.org")
            .send()
            .await
            .unwrap();
        assert_eq!(res.body_text(), "Homepage");
        assert_eq!(res.header("access-control-allow-origin"), Some("*"));
        assert_eq!(res.header("access-control-expose-headers"), Some("X-Status"));

        let res = api.client().get("/").await;
        assert!(res.header("access-control-allow-origin").is_none());
    }

    #[tokio::test]
    async fn test_specific_origin() {
        let api = api(CorsConfig {
            allow_origins: vec!["https://example.org".into()],
            allow_headers: vec!["X-Example".into(), "Content-Type".into()],
            ..CorsConfig::default()
        });

        let res = api
            .client()
            .request(Method::OPTIONS, "/")
            .header("origin", "https://example.org")
            .header("access-control-request-method", "GET")
            .header("access-control-request-headers", "X-Example, Content-Type")
            .send()
            .await
            .unwrap();
        assert_eq!(res.status_code(), 200);
        assert_eq!(res.header("access-control-allow-origin"), Some("https://example.org"));
        assert_eq!(
            res.header("access-control-allow-headers"),
            Some("accept, accept-language, content-language, content-type, x-example")
        );
        assert_eq!(res.header("access-control-max-age"), Some("600"));

        let res = api
            .client()
            .request(Method::OPTIONS, "/")
            .header("origin", "https://another.org")
            .header("access-control-request-method", "POST")
            .header("access-control-request-headers", "X-Nope")
            .send()
            .await
            .unwrap();
        assert_eq!(res.status_code(), 400);
        assert_eq!(res.body_text(), "Disallowed CORS origin, method, headers");

        let res = api
            .client()
            .request(Method::GET, "/")
            .header("origin", "https://example.org")
            .send()
            .await
            .unwrap();
        assert_eq!(res.header("access-control-allow-origin"), Some("https://example.org"));
        assert_eq!(res.header("vary"), Some("Origin"));
    }

    #[tokio::test]
    async fn test_origin_regex() {
        let api = api(CorsConfig {
            allow_origin_regex: Some(r"https://.*\.example\.org".into()),
            ..CorsConfig::default()
        });

        let res = api
            .client()
            .request(Method::GET, "/")
            .header("origin", "https://api.example.org")
            .send()
            .await
            .unwrap();
        assert_eq!(res.header("access-control-allow-origin"), Some("https://api.example.org"));

        let res = api
            .client()
            .request(Method::GET, "/")
            .header("origin", "https://api.example.org.evil.com")
            .send()
            .await
            .unwrap();
        assert!(res.header("access-control-allow-origin").is_none());
    }

    #[test]
    fn test_invalid_regex_is_rejected() {
        let config = CorsConfig {
            allow_origin_regex: Some("(".into()),
            ..CorsConfig::default()
        };
        assert!(matches!(CorsMiddleware::new(config), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_config_from_partial_json() {
        let config: CorsConfig =
            serde_json::from_value(serde_json::json!({ "allow_origins": ["*"] })).unwrap();
        assert_eq!(config.allow_origins, vec!["*"]);
        assert_eq!(config.allow_methods, vec!["GET"]);
        assert_eq!(config.max_age, 600);
    }
}
