use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Error;
use crate::request::Request;
use crate::response::Response;
use crate::routing::{Handler, Params};

/// Code that runs before or after a view.
///
/// Closures are wrapped in [`FnHook`]. Implement the trait on a struct for
/// async hooks or hooks that carry their own arguments.
#[async_trait]
pub trait Hook: Send + Sync + 'static {
    async fn call(&self, req: &Request, res: &mut Response, params: &Params) -> Result<(), Error>;
}

pub struct FnHook<F>(F);

impl<F> FnHook<F>
where
    F: Fn(&Request, &mut Response, &Params) -> Result<(), Error> + Send + Sync + 'static,
{
    pub fn new(hook: F) -> Self {
        FnHook(hook)
    }
}

#[async_trait]
impl<F> Hook for FnHook<F>
where
    F: Fn(&Request, &mut Response, &Params) -> Result<(), Error> + Send + Sync + 'static,
{
    async fn call(&self, req: &Request, res: &mut Response, params: &Params) -> Result<(), Error> {
        (self.0)(req, res, params)
    }
}

/// An error raised while a route was answering, with the response as it
/// stood at that point. A failing handler consumes its response, so none is
/// left behind in that case.
pub(crate) struct Interrupted {
    pub(crate) response: Option<Response>,
    pub(crate) error: Error,
}

impl Interrupted {
    pub(crate) fn with_response(response: Response, error: Error) -> Self {
        Interrupted {
            response: Some(response),
            error,
        }
    }
}

impl From<Error> for Interrupted {
    fn from(error: Error) -> Self {
        Interrupted { response: None, error }
    }
}

/// Ordered before and after hooks around a handler.
#[derive(Clone, Default)]
pub struct HookChain {
    before: Vec<Arc<dyn Hook>>,
    after: Vec<Arc<dyn Hook>>,
}

impl HookChain {
    pub fn push_before(&mut self, hook: impl Hook) {
        self.before.push(Arc::new(hook));
    }

    pub fn push_after(&mut self, hook: impl Hook) {
        self.after.push(Arc::new(hook));
    }

    pub fn is_empty(&self) -> bool {
        self.before.is_empty() && self.after.is_empty()
    }

    pub async fn run<H>(
        &self,
        handler: &H,
        req: Request,
        res: Response,
        params: Params,
    ) -> Result<Response, Error>
    where
        H: Handler + ?Sized,
    {
        self.run_interruptible(handler, req, res, params)
            .await
            .map_err(|interrupted| interrupted.error)
    }

    /// Like [`HookChain::run`], but a failing hook hands back the response
    /// it was working on.
    pub(crate) async fn run_interruptible<H>(
        &self,
        handler: &H,
        req: Request,
        mut res: Response,
        params: Params,
    ) -> Result<Response, Interrupted>
    where
        H: Handler + ?Sized,
    {
        for hook in &self.before {
            if let Err(error) = hook.call(&req, &mut res, &params).await {
                return Err(Interrupted::with_response(res, error));
            }
        }

        let mut res = handler.call(req.clone(), res, params.clone()).await?;

        for hook in &self.after {
            if let Err(error) = hook.call(&req, &mut res, &params).await {
                return Err(Interrupted::with_response(res, error));
            }
        }
        Ok(res)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Url;
    use crate::routing::handler_fn;
    use axum::http::Method;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Hook for Counter {
        async fn call(&self, _req: &Request, _res: &mut Response, _params: &Params) -> Result<(), Error> {
            tokio::task::yield_now().await;
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_hooks_run_around_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut chain = HookChain::default();
        chain.push_before(FnHook::new(|_req: &Request, res: &mut Response, _params: &Params| {
            res.set_header("x-before", "1")
        }));
        chain.push_after(Counter { calls: calls.clone() });
        chain.push_after(FnHook::new(|_req: &Request, res: &mut Response, _params: &Params| {
            assert_eq!(res.body_text(), "seen before");
            res.set_header("x-after", "1")
        }));

        let handler = handler_fn(|_req, mut res: Response, _params| async move {
            let seen = res.header("x-before").is_some();
            res.text(if seen { "seen before" } else { "no before" });
            Ok(res)
        });

        let req = Request::new(Method::GET, Url::new("http", "testserver", "/"));
        let res = chain
            .run(&handler, req, Response::default(), Params::new())
            .await
            .unwrap();

        assert_eq!(res.header("x-after"), Some("1"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failing_before_hook_skips_handler() {
        let mut chain = HookChain::default();
        chain.push_before(FnHook::new(|_req: &Request, _res: &mut Response, _params: &Params| {
            Err(Error::internal("stop"))
        }));

        let handled = Arc::new(AtomicUsize::new(0));
        let counter = handled.clone();
        let handler = handler_fn(move |_req, res, _params| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move { Ok(res) }
        });

        let req = Request::new(Method::GET, Url::new("http", "testserver", "/"));
        let result = chain.run(&handler, req, Response::default(), Params::new()).await;
        assert!(matches!(result, Err(Error::Internal(_))));
        assert_eq!(handled.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failing_after_hook_hands_back_response() {
        let mut chain = HookChain::default();
        chain.push_after(FnHook::new(|_req: &Request, _res: &mut Response, _params: &Params| {
            Err(Error::internal("late"))
        }));
        let handler = handler_fn(|_req, mut res: Response, _params| async move {
            res.text("done");
            Ok(res)
        });

        let req = Request::new(Method::GET, Url::new("http", "testserver", "/"));
        let interrupted = match chain
            .run_interruptible(&handler, req, Response::default(), Params::new())
            .await
        {
            Ok(_) => panic!("after hook should have failed"),
            Err(interrupted) => interrupted,
        };
        assert!(matches!(interrupted.error, Error::Internal(_)));
        assert_eq!(interrupted.response.map(|res| res.body_text()), Some("done".to_string()));
    }
}
