use std::any::Any;
use std::error::Error as StdError;

use axum::http::StatusCode;
use thiserror::Error;

use crate::redirection::Redirection;

/// An error that maps directly onto an HTTP status.
///
/// The default error handler installed on every [`crate::Api`] turns it into
/// a response carrying that status and its reason phrase.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{status}")]
pub struct HttpError {
    status: StatusCode,
    detail: Option<String>,
}

impl HttpError {
    pub fn new(status: StatusCode) -> Self {
        HttpError {
            status,
            detail: None,
        }
    }

    pub fn from_u16(code: u16) -> Result<Self, Error> {
        StatusCode::from_u16(code)
            .map(Self::new)
            .map_err(|_| Error::InvalidStatus(code))
    }

    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND)
    }

    pub fn method_not_allowed() -> Self {
        Self::new(StatusCode::METHOD_NOT_ALLOWED)
    }

    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST).with_detail(detail)
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn status_code(&self) -> u16 {
        self.status.as_u16()
    }

    /// Reason phrase, e.g. `Not Found`.
    pub fn title(&self) -> &str {
        self.status.canonical_reason().unwrap_or("Unknown Status")
    }

    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Http(#[from] HttpError),

    #[error("Redirection to {0}")]
    Redirect(Redirection),

    #[error("Route declaration error: {0}")]
    RouteDeclaration(String),

    #[error("Missing route parameter: {0}")]
    RouteParameter(String),

    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("Invalid status code: {0}")]
    InvalidStatus(u16),

    #[error("Invalid header: {0}")]
    Header(String),

    #[error("Invalid request body: {0}")]
    Body(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("No state of type {0} was provided")]
    MissingState(&'static str),

    #[error("Lifecycle error: {0}")]
    Lifecycle(String),

    #[error("Template error: {0}")]
    Template(#[from] minijinja::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Custom(Box<dyn StdError + Send + Sync>),
}

impl Error {
    /// Wrap an application-defined error so error handlers can match on it.
    pub fn custom<E>(err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Error::Custom(Box::new(err))
    }

    pub fn route_declaration<S: Into<String>>(msg: S) -> Self {
        Error::RouteDeclaration(msg.into())
    }

    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        Error::Configuration(msg.into())
    }

    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Error::Internal(msg.into())
    }

    /// Look at this error as an `E`.
    ///
    /// `Error` itself always matches, so a handler registered for `Error`
    /// catches everything. Otherwise the wrapped error is inspected:
    /// [`HttpError`], the IO/serde/template sources, and anything passed to
    /// [`Error::custom`].
    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        if let Some(err) = (self as &dyn Any).downcast_ref::<E>() {
            return Some(err);
        }

        match self {
            Error::Http(err) => (err as &dyn Any).downcast_ref::<E>(),
            Error::Template(err) => (err as &dyn Any).downcast_ref::<E>(),
            Error::Serialization(err) => (err as &dyn Any).downcast_ref::<E>(),
            Error::Io(err) => (err as &dyn Any).downcast_ref::<E>(),
            Error::Custom(err) => err.downcast_ref::<E>(),
            _ => None,
        }
    }

    pub fn is_redirect(&self) -> bool {
        matches!(self, Error::Redirect(_))
    }
}

impl From<Redirection> for Error {
    fn from(redirection: Redirection) -> Self {
        Error::Redirect(redirection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("custom failure")]
    struct CustomError;

    #[test]
    fn test_http_error_title() {
        let err = HttpError::not_found();
        assert_eq!(err.status_code(), 404);
        assert_eq!(err.title(), "Not Found");
        assert_eq!(err.to_string(), "404 Not Found");
    }

    #[test]
    fn test_invalid_status() {
        assert!(HttpError::from_u16(418).is_ok());
        assert!(matches!(HttpError::from_u16(1000), Err(Error::InvalidStatus(1000))));
    }

    #[test]
    fn test_downcast() {
        let err: Error = HttpError::method_not_allowed().into();
        assert_eq!(err.downcast_ref::<HttpError>().map(|e| e.status_code()), Some(405));
        assert!(err.downcast_ref::<Error>().is_some());
        assert!(err.downcast_ref::<CustomError>().is_none());

        let err = Error::custom(CustomError);
        assert!(err.downcast_ref::<CustomError>().is_some());
        assert!(err.downcast_ref::<HttpError>().is_none());
    }
}
