pub mod cors;
pub mod https_redirect;
pub mod trusted_host;

use std::sync::Arc;

use async_trait::async_trait;

use crate::api::Api;
use crate::error::Error;
use crate::request::Request;
use crate::response::Response;

pub use cors::{CorsConfig, CorsMiddleware};
pub use https_redirect::HttpsRedirectMiddleware;
pub use trusted_host::TrustedHostMiddleware;

/// Middleware wrapping the whole application.
///
/// Call `next.run(req)` to pass the request inward, or answer directly.
#[async_trait]
pub trait Middleware: Send + Sync + 'static {
    async fn handle(&self, req: Request, next: Next<'_>) -> Result<Response, Error>;
}

/// Callbacks around route dispatch.
///
/// They only run for requests that matched a route with an allowed method,
/// and errors they return go through the application's error handlers.
#[async_trait]
pub trait RoutingMiddleware: Send + Sync + 'static {
    async fn before_dispatch(&self, _req: &Request) -> Result<(), Error> {
        Ok(())
    }

    async fn after_dispatch(&self, _req: &Request, _res: &mut Response) -> Result<(), Error> {
        Ok(())
    }
}

/// The rest of the middleware stack, ending with route dispatch.
pub struct Next<'a> {
    middleware: &'a [Arc<dyn Middleware>],
    api: &'a Api,
}

impl<'a> Next<'a> {
    pub(crate) fn new(middleware: &'a [Arc<dyn Middleware>], api: &'a Api) -> Self {
        Next { middleware, api }
    }

    pub async fn run(self, req: Request) -> Result<Response, Error> {
        match self.middleware.split_first() {
            Some((current, rest)) => {
                current
                    .handle(req, Next::new(rest, self.api))
                    .await
            }
            None => self.api.dispatch(req).await,
        }
    }
}
