pub mod handler;
pub mod hooks;
pub mod pattern;
pub mod view;

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};

use axum::http::Method;
use tracing::debug;

use crate::error::{Error, HttpError};
use crate::request::Request;
use crate::response::Response;

pub use handler::{handler_fn, FnHandler, Handler, Hooked};
pub use hooks::{FnHook, Hook, HookChain};
pub(crate) use hooks::Interrupted;
pub use pattern::{ParamSpec, RoutePattern};
pub use view::MethodView;

pub const ALL_HTTP_METHODS: [&str; 9] = [
    "CONNECT", "DELETE", "GET", "HEAD", "OPTIONS", "PATCH", "POST", "PUT", "TRACE",
];

/// Values captured from the path by a route pattern.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    values: HashMap<String, String>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl fmt::Display) -> Self {
        self.values.insert(name.into(), value.to_string());
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Convert a captured value, e.g. `params.parse::<i64>("x")`.
    pub fn parse<T: FromStr>(&self, name: &str) -> Result<T, Error> {
        let raw = self
            .get(name)
            .ok_or_else(|| Error::RouteParameter(name.to_string()))?;
        raw.parse::<T>().map_err(|_| {
            HttpError::bad_request(format!("Invalid value '{}' for parameter '{}'", raw, name))
                .into()
        })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Upper-case and validate declared route methods.
pub fn parse_methods<I, S>(methods: I) -> Result<Vec<Method>, Error>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    methods
        .into_iter()
        .map(|method| {
            let upper = method.as_ref().to_uppercase();
            if !ALL_HTTP_METHODS.contains(&upper.as_str()) {
                return Err(Error::route_declaration(format!(
                    "'{}' is not a valid HTTP method",
                    method.as_ref()
                )));
            }
            Method::from_bytes(upper.as_bytes())
                .map_err(|e| Error::route_declaration(e.to_string()))
        })
        .collect()
}

pub struct Route {
    pattern: RoutePattern,
    name: Option<String>,
    methods: Vec<Method>,
    handler: Arc<dyn Handler>,
    hooks: HookChain,
}

impl Route {
    pub fn pattern(&self) -> &RoutePattern {
        &self.pattern
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    pub fn allows(&self, method: &Method) -> bool {
        self.methods.contains(method)
    }

    pub fn matches(&self, path: &str) -> Option<Params> {
        self.pattern.matches(path)
    }

    pub fn url(&self, params: &Params) -> Result<String, Error> {
        self.pattern.url(params)
    }

    pub(crate) async fn call(
        &self,
        req: Request,
        res: Response,
        params: Params,
    ) -> Result<Response, Interrupted> {
        self.hooks
            .run_interruptible(self.handler.as_ref(), req, res, params)
            .await
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("pattern", &self.pattern.as_str())
            .field("name", &self.name)
            .field("methods", &self.methods)
            .finish()
    }
}

/// Routes in registration order, plus the index of named routes.
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: Vec<Arc<Route>>,
    named: HashMap<String, Arc<Route>>,
}

impl RouteTable {
    /// Add a route. A route with the same pattern is replaced in place.
    pub fn insert(&mut self, route: Route) {
        let route = Arc::new(route);

        match self
            .routes
            .iter_mut()
            .find(|existing| existing.pattern() == route.pattern())
        {
            Some(slot) => {
                if let Some(old_name) = slot.name() {
                    let points_to_slot = self
                        .named
                        .get(old_name)
                        .map(|named| Arc::ptr_eq(named, slot))
                        .unwrap_or(false);
                    if points_to_slot {
                        self.named.remove(old_name);
                    }
                }
                *slot = route.clone();
            }
            None => self.routes.push(route.clone()),
        }

        if let Some(name) = route.name() {
            self.named.insert(name.to_string(), route.clone());
        }
    }

    /// First route, in registration order, whose pattern matches `path`.
    pub fn find(&self, path: &str) -> Option<(Arc<Route>, Params)> {
        self.routes
            .iter()
            .find_map(|route| route.matches(path).map(|params| (route.clone(), params)))
    }

    pub fn get_named(&self, name: &str) -> Option<Arc<Route>> {
        self.named.get(name).cloned()
    }

    /// URL path of a named route. Unknown names are a 404.
    pub fn url_for(&self, name: &str, params: &Params) -> Result<String, Error> {
        let route = self.named.get(name).ok_or_else(HttpError::not_found)?;
        route.url(params)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Shared handle on an application's route table.
///
/// Clones see the same table, so a template engine created during startup
/// can resolve routes registered afterwards.
#[derive(Debug, Clone, Default)]
pub struct Routes {
    table: Arc<RwLock<RouteTable>>,
}

impl Routes {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, RouteTable> {
        self.table.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert(&self, route: Route) {
        let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);
        table.insert(route);
    }

    pub fn find(&self, path: &str) -> Option<(Arc<Route>, Params)> {
        self.read().find(path)
    }

    pub fn get_named(&self, name: &str) -> Option<Arc<Route>> {
        self.read().get_named(name)
    }

    pub fn url_for(&self, name: &str, params: &Params) -> Result<String, Error> {
        self.read().url_for(name, params)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

/// Declares a route; finish with [`RouteBuilder::to`], [`RouteBuilder::handler`]
/// or [`RouteBuilder::view`].
pub struct RouteBuilder {
    routes: Routes,
    pattern: String,
    methods: Option<Vec<String>>,
    name: Option<String>,
    hooks: HookChain,
}

impl RouteBuilder {
    pub(crate) fn new(routes: Routes, pattern: impl Into<String>) -> Self {
        RouteBuilder {
            routes,
            pattern: pattern.into(),
            methods: None,
            name: None,
            hooks: HookChain::default(),
        }
    }

    /// Methods accepted by a function view. Defaults to every HTTP method.
    /// Ignored for a [`MethodView`].
    pub fn methods<I, S>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.methods = Some(
            methods
                .into_iter()
                .map(|method| method.as_ref().to_string())
                .collect(),
        );
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn before<F>(self, hook: F) -> Self
    where
        F: Fn(&Request, &mut Response, &Params) -> Result<(), Error> + Send + Sync + 'static,
    {
        self.before_hook(FnHook::new(hook))
    }

    pub fn before_hook(mut self, hook: impl Hook) -> Self {
        self.hooks.push_before(hook);
        self
    }

    pub fn after<F>(self, hook: F) -> Self
    where
        F: Fn(&Request, &mut Response, &Params) -> Result<(), Error> + Send + Sync + 'static,
    {
        self.after_hook(FnHook::new(hook))
    }

    pub fn after_hook(mut self, hook: impl Hook) -> Self {
        self.hooks.push_after(hook);
        self
    }

    /// Register an async function view.
    pub fn to<F, Fut>(self, f: F) -> Result<(), Error>
    where
        F: Fn(Request, Response, Params) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Response, Error>> + Send + 'static,
    {
        self.handler(handler_fn(f))
    }

    pub fn handler(self, handler: impl Handler) -> Result<(), Error> {
        let methods = match &self.methods {
            Some(methods) => parse_methods(methods)?,
            None => parse_methods(ALL_HTTP_METHODS)?,
        };
        self.register(methods, Arc::new(handler))
    }

    pub fn view(self, view: MethodView) -> Result<(), Error> {
        let methods = view.methods();
        self.register(methods, Arc::new(view))
    }

    fn register(self, methods: Vec<Method>, handler: Arc<dyn Handler>) -> Result<(), Error> {
        let pattern = RoutePattern::parse(&self.pattern)?;
        debug!(pattern = %pattern, name = ?self.name, methods = ?methods, "Registering route");

        self.routes.insert(Route {
            pattern,
            name: self.name,
            methods,
            handler,
            hooks: self.hooks,
        });
        Ok(())
    }
}
