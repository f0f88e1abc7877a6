use std::sync::Arc;

use tracing::debug;

use crate::api::Api;
use crate::extension::{Extension, ExtensionError};
use crate::middleware::Middleware;
use crate::settings::Settings;

type MiddlewareFactory =
    Box<dyn Fn(&Settings) -> Result<Arc<dyn Middleware>, ExtensionError> + Send + Sync>;

/// An extension that adds one middleware built from the settings.
///
/// With a flag key the middleware is only added when that boolean setting
/// is `true`; without one it is always added.
pub struct MiddlewareExtension {
    name: String,
    flag: Option<String>,
    factory: MiddlewareFactory,
}

impl MiddlewareExtension {
    pub fn new<F, M>(name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&Settings) -> Result<M, ExtensionError> + Send + Sync + 'static,
        M: Middleware,
    {
        MiddlewareExtension {
            name: name.into(),
            flag: None,
            factory: Box::new(move |settings: &Settings| {
                let middleware: Arc<dyn Middleware> = Arc::new(factory(settings)?);
                Ok(middleware)
            }),
        }
    }

    pub fn with_flag(mut self, key: impl Into<String>) -> Self {
        self.flag = Some(key.into());
        self
    }

    pub fn is_enabled(&self, settings: &Settings) -> Result<bool, ExtensionError> {
        match &self.flag {
            Some(key) => Ok(settings.get_boolean(key)?.unwrap_or(false)),
            None => Ok(true),
        }
    }
}

impl Extension for MiddlewareExtension {
    fn name(&self) -> &str {
        &self.name
    }

    fn init(&self, api: &mut Api, settings: &Settings) -> Result<(), ExtensionError> {
        if !self.is_enabled(settings)? {
            debug!("Middleware extension '{}' is disabled", self.name);
            return Ok(());
        }
        api.add_middleware_arc((self.factory)(settings)?);
        Ok(())
    }
}
