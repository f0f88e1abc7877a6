//! The application object.

use std::collections::HashMap;
use std::error::Error as StdError;
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::StatusCode;
use tracing::{debug, error};

use crate::builder::ApiBuilder;
use crate::error::{Error, HttpError};
use crate::extension::ExtensionError;
use crate::media::{Media, MediaHandler};
use crate::middleware::{Middleware, Next, RoutingMiddleware};
use crate::redirection::{RedirectTarget, Redirection};
use crate::request::Request;
use crate::response::Response;
use crate::routing::{Interrupted, Params, RouteBuilder, Routes};
use crate::server::{Server, ServerConfig};
use crate::state::AppState;
use crate::testing::TestClient;

/// Anything that can answer a request: an [`Api`], a static file server, or
/// an application-defined service. Used as the target of [`Api::mount`].
#[async_trait]
pub trait App: Send + Sync + 'static {
    async fn call(&self, req: Request) -> Result<Response, Error>;
}

/// Returns `true` when it handled the error.
type ErrorHandler = Arc<dyn Fn(&Request, &mut Response, &Error) -> bool + Send + Sync>;

pub struct Api {
    routes: Routes,
    error_handlers: Vec<ErrorHandler>,
    mounts: Vec<(String, Arc<dyn App>)>,
    media: Media,
    middleware: Vec<Arc<dyn Middleware>>,
    routing_middleware: Vec<Arc<dyn RoutingMiddleware>>,
    state: AppState,
}

impl Api {
    /// An application with the built-in extensions and default settings.
    pub fn new() -> Result<Self, ExtensionError> {
        ApiBuilder::new().build()
    }

    pub fn builder() -> ApiBuilder {
        ApiBuilder::new()
    }

    /// An application without any extension.
    pub fn bare() -> Self {
        Self::with_media(Media::default())
    }

    pub(crate) fn with_media(media: Media) -> Self {
        let routes = Routes::new();
        let mut state = AppState::new();
        state.insert(routes.clone());

        let mut api = Api {
            routes,
            error_handlers: Vec::new(),
            mounts: Vec::new(),
            media,
            middleware: Vec::new(),
            routing_middleware: Vec::new(),
            state,
        };
        api.add_error_handler::<HttpError, _>(handle_http_error);
        api
    }

    /// Declare a route, e.g. `api.route("/greet/{person}").methods(["post"]).to(greet)`.
    pub fn route(&self, pattern: impl Into<String>) -> RouteBuilder {
        RouteBuilder::new(self.routes.clone(), pattern)
    }

    pub fn routes(&self) -> &Routes {
        &self.routes
    }

    /// URL path of a named route. An unknown name is a 404 [`HttpError`].
    pub fn url_for(&self, name: &str, params: &Params) -> Result<String, Error> {
        self.routes.url_for(name, params)
    }

    /// Register a handler for errors of type `E`.
    ///
    /// At most one handler runs per error: the most recently added one
    /// that matches. Register a handler for [`Error`] to catch everything.
    pub fn add_error_handler<E, F>(&mut self, handler: F)
    where
        E: StdError + 'static,
        F: Fn(&Request, &mut Response, &E) + Send + Sync + 'static,
    {
        let handler: ErrorHandler = Arc::new(move |req: &Request, res: &mut Response, err: &Error| {
            match err.downcast_ref::<E>() {
                Some(err) => {
                    handler(req, res, err);
                    true
                }
                None => false,
            }
        });
        self.error_handlers.insert(0, handler);
    }

    /// Add middleware around the whole application. The last one added
    /// sees requests first.
    pub fn add_middleware(&mut self, middleware: impl Middleware) {
        self.add_middleware_arc(Arc::new(middleware));
    }

    pub fn add_middleware_arc(&mut self, middleware: Arc<dyn Middleware>) {
        self.middleware.insert(0, middleware);
    }

    pub fn add_routing_middleware(&mut self, middleware: impl RoutingMiddleware) {
        self.routing_middleware.push(Arc::new(middleware));
    }

    /// Serve `app` under `prefix`. The app sees paths with the prefix removed.
    pub fn mount(&mut self, prefix: &str, app: impl App) {
        self.mount_arc(prefix, Arc::new(app));
    }

    pub fn mount_arc(&mut self, prefix: &str, app: Arc<dyn App>) {
        let mut prefix = if prefix.starts_with('/') {
            prefix.to_string()
        } else {
            format!("/{}", prefix)
        };
        while prefix.len() > 1 && prefix.ends_with('/') {
            prefix.pop();
        }
        debug!(prefix = %prefix, "Mounting app");
        self.mounts.push((prefix, app));
    }

    pub fn media_type(&self) -> &str {
        self.media.media_type()
    }

    pub fn set_media_type(&mut self, media_type: impl Into<String>) -> Result<(), Error> {
        self.media.set_media_type(media_type)
    }

    pub fn media_handlers(&self) -> &HashMap<String, MediaHandler> {
        self.media.handlers()
    }

    pub fn set_media_handlers(&mut self, handlers: HashMap<String, MediaHandler>) -> Result<(), Error> {
        self.media.set_handlers(handlers)
    }

    /// Share a value with every handler, see [`Request::state`].
    pub fn provide<T: Send + Sync + 'static>(&mut self, value: T) {
        self.state.insert(value);
    }

    pub fn state<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.state.get::<T>()
    }

    pub fn client(&self) -> TestClient<'_> {
        TestClient::new(self)
    }

    /// Serve the application until Ctrl-C or SIGTERM.
    pub async fn run(self, config: ServerConfig) -> Result<(), Error> {
        Server::new(self, config).run().await
    }

    /// Handle one request end to end. Errors no handler took care of are
    /// logged and answered with a 500.
    pub async fn handle(&self, req: Request) -> Response {
        let req = req.with_state(self.state.clone());
        let method = req.method().clone();
        let path = req.path().to_string();

        let result = match self.find_mount(&path) {
            Some((prefix, app)) => {
                debug!(prefix = %prefix, path = %path, "Forwarding to mounted app");
                app.call(req.strip_prefix(prefix)).await
            }
            None => Next::new(&self.middleware, self).run(req).await,
        };

        let response = match result {
            Ok(response) => response,
            Err(err) => {
                error!(method = %method, path = %path, error = %err, "Unhandled error");
                Response::plain(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
            }
        };
        debug!(method = %method, path = %path, status = response.status_code(), "Handled request");
        response.finalize()
    }

    fn find_mount(&self, path: &str) -> Option<(&str, &Arc<dyn App>)> {
        self.mounts
            .iter()
            .find(|(prefix, _)| {
                prefix == "/"
                    || path == prefix
                    || path
                        .strip_prefix(prefix.as_str())
                        .is_some_and(|rest| rest.starts_with('/'))
            })
            .map(|(prefix, app)| (prefix.as_str(), app))
    }

    /// Route dispatch, with redirections and error handlers applied.
    ///
    /// Error handlers work on the response the failing stage left behind,
    /// or on a new one when the view itself failed.
    pub(crate) async fn dispatch(&self, req: Request) -> Result<Response, Error> {
        match self.dispatch_route(&req).await {
            Ok(res) => Ok(res),
            Err(Interrupted {
                error: Error::Redirect(redirection),
                ..
            }) => self
                .redirect(&redirection)
                .or_else(|err| self.handle_error(&req, None, err)),
            Err(Interrupted { response, error }) => self.handle_error(&req, response, error),
        }
    }

    async fn dispatch_route(&self, req: &Request) -> Result<Response, Interrupted> {
        let (route, params) = self
            .routes
            .find(req.path())
            .ok_or_else(|| Error::from(HttpError::not_found()))?;

        if !route.allows(req.method()) {
            return Err(Error::from(HttpError::method_not_allowed()).into());
        }

        for middleware in &self.routing_middleware {
            middleware.before_dispatch(req).await?;
        }

        let mut res = route
            .call(req.clone(), Response::new(self.media.clone()), params)
            .await?;

        for middleware in self.routing_middleware.iter().rev() {
            if let Err(error) = middleware.after_dispatch(req, &mut res).await {
                return Err(Interrupted::with_response(res, error));
            }
        }
        Ok(res)
    }

    fn redirect(&self, redirection: &Redirection) -> Result<Response, Error> {
        let url = match redirection.target() {
            RedirectTarget::Url(url) => url.clone(),
            RedirectTarget::Route { name, params } => self.url_for(name, params)?,
        };
        debug!(url = %url, permanent = redirection.is_permanent(), "Redirecting");
        redirection.response(&url, self.media.clone())
    }

    fn handle_error(&self, req: &Request, res: Option<Response>, err: Error) -> Result<Response, Error> {
        let mut res = res.unwrap_or_else(|| Response::new(self.media.clone()));
        for handler in &self.error_handlers {
            if handler(req, &mut res, &err) {
                return Ok(res);
            }
        }
        Err(err)
    }
}

#[async_trait]
impl App for Api {
    async fn call(&self, req: Request) -> Result<Response, Error> {
        Ok(self.handle(req).await)
    }
}

fn handle_http_error(_req: &Request, res: &mut Response, err: &HttpError) {
    res.set_status(err.status());
    match err.detail() {
        Some(detail) => res.text(detail),
        None => res.text(err.title()),
    }
}
