use std::fmt;

use axum::http::{header, StatusCode};

use crate::error::Error;
use crate::media::Media;
use crate::response::Response;
use crate::routing::Params;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectTarget {
    Url(String),
    Route { name: String, params: Params },
}

/// Short-circuits dispatch with a 301 or 302 response.
///
/// Return it from a view, hook or routing middleware as an error:
///
/// ```ignore
/// return Err(Redirection::to_route("home", Params::new()).permanent().into());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirection {
    target: RedirectTarget,
    permanent: bool,
}

impl Redirection {
    pub fn to_url(url: impl Into<String>) -> Self {
        Redirection {
            target: RedirectTarget::Url(url.into()),
            permanent: false,
        }
    }

    /// Redirect to a named route. The name is resolved when the request is
    /// dispatched; an unknown name results in a 404.
    pub fn to_route(name: impl Into<String>, params: Params) -> Self {
        Redirection {
            target: RedirectTarget::Route {
                name: name.into(),
                params,
            },
            permanent: false,
        }
    }

    pub fn permanent(mut self) -> Self {
        self.permanent = true;
        self
    }

    pub fn is_permanent(&self) -> bool {
        self.permanent
    }

    pub fn target(&self) -> &RedirectTarget {
        &self.target
    }

    pub fn status(&self) -> StatusCode {
        if self.permanent {
            StatusCode::MOVED_PERMANENTLY
        } else {
            StatusCode::FOUND
        }
    }

    pub(crate) fn response(&self, url: &str, media: Media) -> Result<Response, Error> {
        let mut response = Response::new(media);
        response.set_status(self.status());
        response.set_header(header::LOCATION.as_str(), url)?;
        Ok(response)
    }
}

impl fmt::Display for Redirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.target {
            RedirectTarget::Url(url) => write!(f, "{}", url),
            RedirectTarget::Route { name, .. } => write!(f, "route '{}'", name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redirect_status() {
        assert_eq!(Redirection::to_url("/a").status(), StatusCode::FOUND);
        assert_eq!(
            Redirection::to_url("/a").permanent().status(),
            StatusCode::MOVED_PERMANENTLY
        );
    }

    #[test]
    fn test_redirect_response_sets_location() {
        let response = Redirection::to_url("https://example.com")
            .response("https://example.com", Media::default())
            .unwrap();
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.header("location"), Some("https://example.com"));
    }
}
