use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Error;
use crate::media::Media;

/// The response a view builds up. Views receive a fresh one with status 200
/// and return it once they are done.
#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    content: Bytes,
    media: Media,
}

impl Response {
    pub fn new(media: Media) -> Self {
        Response {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            content: Bytes::new(),
            media,
        }
    }

    /// A plain-text response, used by middleware that answer on their own.
    pub fn plain(status: StatusCode, text: impl Into<String>) -> Self {
        let mut response = Response::new(Media::default());
        response.set_status(status);
        response.text(text);
        response
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn status_code(&self) -> u16 {
        self.status.as_u16()
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    pub fn set_status_code(&mut self, code: u16) -> Result<(), Error> {
        self.status = StatusCode::from_u16(code).map_err(|_| Error::InvalidStatus(code))?;
        Ok(())
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// Set a header, replacing existing values.
    pub fn set_header(&mut self, name: &str, value: &str) -> Result<(), Error> {
        let (name, value) = parse_header(name, value)?;
        self.headers.insert(name, value);
        Ok(())
    }

    /// Add a header value, keeping existing ones.
    pub fn append_header(&mut self, name: &str, value: &str) -> Result<(), Error> {
        let (name, value) = parse_header(name, value)?;
        self.headers.append(name, value);
        Ok(())
    }

    pub fn text(&mut self, text: impl Into<String>) {
        self.set_content(text.into(), "text/plain; charset=utf-8");
    }

    pub fn html(&mut self, html: impl Into<String>) {
        self.set_content(html.into(), "text/html; charset=utf-8");
    }

    /// Serialize `value` with the application's media handler.
    pub fn media<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), Error> {
        let value = serde_json::to_value(value)?;
        let body = self.media.serialize(&value)?;
        let content_type = self.media.media_type().to_string();
        self.set_content(body, &content_type);
        Ok(())
    }

    pub fn content(&mut self, content: impl Into<Bytes>, content_type: &str) {
        self.set_content(content, content_type);
    }

    fn set_content(&mut self, content: impl Into<Bytes>, content_type: &str) {
        self.content = content.into();
        if let Ok(value) = HeaderValue::from_str(content_type) {
            self.headers.insert(header::CONTENT_TYPE, value);
        }
    }

    pub fn body(&self) -> &Bytes {
        &self.content
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.content).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, Error> {
        Ok(serde_json::from_slice(&self.content)?)
    }

    pub fn media_type(&self) -> &str {
        self.media.media_type()
    }

    /// Final touches before the response leaves the application: bodyless
    /// statuses lose their content, everything else gets a content-length.
    pub(crate) fn finalize(mut self) -> Self {
        if is_bodyless(self.status) {
            self.content = Bytes::new();
            self.headers.remove(header::CONTENT_TYPE);
            self.headers.remove(header::CONTENT_LENGTH);
        } else if !self.headers.contains_key(header::CONTENT_LENGTH) {
            self.headers
                .insert(header::CONTENT_LENGTH, HeaderValue::from(self.content.len()));
        }
        self
    }

    pub fn into_http(self) -> axum::response::Response {
        let mut response = axum::response::Response::new(Body::from(self.content));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

impl Default for Response {
    fn default() -> Self {
        Response::new(Media::default())
    }
}

fn is_bodyless(status: StatusCode) -> bool {
    status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED
}

fn parse_header(name: &str, value: &str) -> Result<(HeaderName, HeaderValue), Error> {
    let header_name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|e| Error::Header(format!("{}: {}", name, e)))?;
    let header_value = HeaderValue::from_str(value)
        .map_err(|e| Error::Header(format!("{}: {}", name, e)))?;
    Ok((header_name, header_value))
}
