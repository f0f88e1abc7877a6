use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Error;
use crate::request::Request;
use crate::response::Response;
use crate::routing::hooks::{FnHook, Hook, HookChain};
use crate::routing::Params;

/// Something that turns a request into a response.
///
/// Plain async functions and closures become handlers through
/// [`handler_fn`]; the route builder does that for you.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn call(&self, req: Request, res: Response, params: Params) -> Result<Response, Error>;
}

pub struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(Request, Response, Params) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response, Error>> + Send + 'static,
{
    async fn call(&self, req: Request, res: Response, params: Params) -> Result<Response, Error> {
        (self.0)(req, res, params).await
    }
}

pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(Request, Response, Params) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response, Error>> + Send + 'static,
{
    FnHandler(f)
}

/// A handler with its own before and after hooks.
///
/// Used to hook a single method of a [`crate::MethodView`].
pub struct Hooked {
    handler: Arc<dyn Handler>,
    hooks: HookChain,
}

impl Hooked {
    pub fn new(handler: impl Handler) -> Self {
        Hooked {
            handler: Arc::new(handler),
            hooks: HookChain::default(),
        }
    }

    pub fn from_fn<F, Fut>(f: F) -> Self
    where
        F: Fn(Request, Response, Params) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Response, Error>> + Send + 'static,
    {
        Self::new(handler_fn(f))
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
}

#[async_trait]
impl Handler for Hooked {
    async fn call(&self, req: Request, res: Response, params: Params) -> Result<Response, Error> {
        self.hooks.run(self.handler.as_ref(), req, res, params).await
    }
}
