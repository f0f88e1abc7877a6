use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use axum::body::Bytes;
use axum::http::{header, request::Parts, HeaderMap, HeaderName, HeaderValue, Method, Uri};
use serde::de::DeserializeOwned;

use crate::error::Error;
use crate::state::AppState;

/// The URL a request was made to, as seen by the application.
///
/// The path is kept percent-decoded and encoded again for display. The
/// query string is kept as received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Url {
    scheme: String,
    host: String,
    port: Option<u16>,
    path: String,
    query: Option<String>,
}

impl Url {
    pub fn new(scheme: impl Into<String>, host: impl Into<String>, path: impl Into<String>) -> Self {
        let path = path.into();
        let (path, query) = match path.split_once('?') {
            Some((path, query)) => (path.to_string(), Some(query.to_string())),
            None => (path, None),
        };
        Url {
            scheme: scheme.into(),
            host: host.into(),
            port: None,
            path: decode_path(&path),
            query,
        }
    }

    /// Parse an absolute URL such as `http://testserver:8000/a?b=c`.
    pub fn parse(raw: &str) -> Result<Self, Error> {
        let uri: Uri = raw
            .parse()
            .map_err(|e| Error::configuration(format!("Invalid URL '{}': {}", raw, e)))?;
        let scheme = uri
            .scheme_str()
            .ok_or_else(|| Error::configuration(format!("URL '{}' has no scheme", raw)))?;
        let authority = uri
            .authority()
            .ok_or_else(|| Error::configuration(format!("URL '{}' has no host", raw)))?;

        Ok(Url {
            scheme: scheme.to_string(),
            host: authority.host().to_string(),
            port: authority.port_u16(),
            path: decode_path(uri.path()),
            query: uri.query().map(str::to_string),
        })
    }

    fn from_parts(parts: &Parts, default_scheme: &str) -> Self {
        let scheme = parts.uri.scheme_str().unwrap_or(default_scheme).to_string();

        let authority = parts
            .uri
            .authority()
            .map(|authority| authority.as_str().to_string())
            .or_else(|| {
                parts
                    .headers
                    .get(header::HOST)
                    .and_then(|value| value.to_str().ok())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| "localhost".to_string());

        let (host, port) = split_host_port(&authority);

        Url {
            scheme,
            host,
            port,
            path: decode_path(parts.uri.path()),
            query: parts.uri.query().map(str::to_string),
        }
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// `host[:port]`
    pub fn netloc(&self) -> String {
        match self.port {
            Some(port) => format!("{}:{}", self.host, port),
            None => self.host.clone(),
        }
    }

    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: Option<u16>) -> Self {
        self.port = port;
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = normalize_path(path.into());
        self
    }
}

impl fmt::Display for Url {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}{}", self.scheme, self.netloc(), encode_path(&self.path))?;
        if let Some(query) = &self.query {
            write!(f, "?{}", query)?;
        }
        Ok(())
    }
}

fn normalize_path(path: String) -> String {
    if path.starts_with('/') {
        path
    } else {
        format!("/{}", path)
    }
}

fn decode_path(raw: &str) -> String {
    normalize_path(decode(raw))
}

fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Percent-decode, leaving the input untouched when it does not decode to UTF-8.
fn decode(raw: &str) -> String {
    urlencoding::decode(raw)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}

/// `application/x-www-form-urlencoded` component: `+` is a space.
fn decode_form(raw: &str) -> String {
    decode(&raw.replace('+', " "))
}

fn split_host_port(authority: &str) -> (String, Option<u16>) {
    if let Some(rest) = authority.strip_prefix('[') {
        if let Some((host, port)) = rest.split_once("]:") {
            if let Ok(port) = port.parse::<u16>() {
                return (format!("[{}]", host), Some(port));
            }
        }
        return (authority.to_string(), None);
    }

    match authority.rsplit_once(':') {
        Some((host, port)) => match port.parse::<u16>() {
            Ok(port) => (host.to_string(), Some(port)),
            Err(_) => (authority.to_string(), None),
        },
        None => (authority.to_string(), None),
    }
}

/// An incoming HTTP request. Cloning is cheap: the body is reference counted.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: Bytes,
    state: AppState,
}

impl Request {
    pub fn new(method: Method, url: Url) -> Self {
        Request {
            method,
            url,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            state: AppState::default(),
        }
    }

    /// Build a request from what the HTTP server handed us.
    pub fn from_http(parts: Parts, body: Bytes, default_scheme: &str) -> Self {
        let url = Url::from_parts(&parts, default_scheme);
        Request {
            method: parts.method,
            url,
            headers: parts.headers,
            body,
            state: AppState::default(),
        }
    }

    /// Set a header, replacing any previous value.
    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self, Error> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| Error::Header(format!("{}: {}", name, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| Error::Header(format!("{}: {}", name, e)))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub(crate) fn with_state(mut self, state: AppState) -> Self {
        self.state = state;
        self
    }

    /// The same request as seen by an app mounted at `prefix`.
    pub(crate) fn strip_prefix(mut self, prefix: &str) -> Self {
        let remaining = self.url.path.strip_prefix(prefix).unwrap_or(&self.url.path);
        self.url.path = normalize_path(remaining.to_string());
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn path(&self) -> &str {
        self.url.path()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// First value of a header, if it is present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn text(&self) -> Result<String, Error> {
        String::from_utf8(self.body.to_vec()).map_err(|e| Error::Body(e.to_string()))
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, Error> {
        serde_json::from_slice(&self.body).map_err(|e| Error::Body(e.to_string()))
    }

    /// Decoded query string pairs. A repeated key keeps its last value.
    pub fn query(&self) -> HashMap<String, String> {
        self.url
            .query()
            .map(|query| {
                query
                    .split('&')
                    .filter(|pair| !pair.is_empty())
                    .map(|pair| {
                        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
                        (decode_form(key), decode_form(value))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Shared state provided by the application or one of its extensions.
    pub fn state<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.state.get::<T>()
    }

    pub fn try_state<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, Error> {
        self.state::<T>()
            .ok_or(Error::MissingState(std::any::type_name::<T>()))
    }
}
