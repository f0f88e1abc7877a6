use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::Method;

use crate::error::{Error, HttpError};
use crate::request::Request;
use crate::response::Response;
use crate::routing::{handler_fn, Handler, Params};

/// A view with one handler per HTTP method.
///
/// The methods a `MethodView` implements are exactly the methods its route
/// accepts; any `methods` declared on the route are ignored.
#[derive(Clone, Default)]
pub struct MethodView {
    handlers: HashMap<Method, Arc<dyn Handler>>,
}

macro_rules! method_shortcut {
    ($name:ident, $method:expr) => {
        pub fn $name<F, Fut>(self, f: F) -> Self
        where
            F: Fn(Request, Response, Params) -> Fut + Send + Sync + 'static,
            Fut: Future<Output = Result<Response, Error>> + Send + 'static,
        {
            self.on($method, handler_fn(f))
        }
    };
}

impl MethodView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, method: Method, handler: impl Handler) -> Self {
        self.handlers.insert(method, Arc::new(handler));
        self
    }

    method_shortcut!(get, Method::GET);
    method_shortcut!(post, Method::POST);
    method_shortcut!(put, Method::PUT);
    method_shortcut!(patch, Method::PATCH);
    method_shortcut!(delete, Method::DELETE);
    method_shortcut!(head, Method::HEAD);
    method_shortcut!(options, Method::OPTIONS);

    pub fn allows(&self, method: &Method) -> bool {
        self.handlers.contains_key(method)
    }

    pub fn methods(&self) -> Vec<Method> {
        let mut methods: Vec<Method> = self.handlers.keys().cloned().collect();
        methods.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        methods
    }
}

#[async_trait]
impl Handler for MethodView {
    async fn call(&self, req: Request, res: Response, params: Params) -> Result<Response, Error> {
        let handler = self
            .handlers
            .get(req.method())
            .cloned()
            .ok_or_else(HttpError::method_not_allowed)?;
        handler.call(req, res, params).await
    }
}
