use std::sync::Arc;

use tracing::{debug, error, info};

use crate::api::Api;
use crate::extension::{Extension, ExtensionError};
use crate::settings::Settings;

/// Extensions in registration order.
#[derive(Clone, Default)]
pub struct ExtensionRegistry {
    extensions: Vec<Arc<dyn Extension>>,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, extension: impl Extension) {
        self.register_arc(Arc::new(extension));
    }

    pub fn register_arc(&mut self, extension: Arc<dyn Extension>) {
        debug!("Registering extension '{}'", extension.name());
        self.extensions.push(extension);
    }

    pub fn names(&self) -> Vec<&str> {
        self.extensions.iter().map(|extension| extension.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.extensions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }

    /// Run every extension's `init`, in order. Stops at the first failure.
    pub fn init_all(&self, api: &mut Api, settings: &Settings) -> Result<(), ExtensionError> {
        for extension in &self.extensions {
            debug!("Initializing extension '{}'", extension.name());
            extension.init(api, settings).map_err(|e| {
                error!("Extension '{}' failed: {}", extension.name(), e);
                ExtensionError::failed(extension.name(), e)
            })?;
        }
        info!("Initialized {} extension(s)", self.extensions.len());
        Ok(())
    }
}

impl std::fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionRegistry")
            .field("extensions", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recording {
        name: &'static str,
        calls: Arc<Mutex<Vec<&'static str>>>,
        fail: bool,
    }

    impl Extension for Recording {
        fn name(&self) -> &str {
            self.name
        }

        fn init(&self, _api: &mut Api, _settings: &Settings) -> Result<(), ExtensionError> {
            self.calls.lock().unwrap().push(self.name);
            if self.fail {
                return Err(ExtensionError::initialization("nope"));
            }
            Ok(())
        }
    }

    fn recording(name: &'static str, calls: &Arc<Mutex<Vec<&'static str>>>, fail: bool) -> Recording {
        Recording {
            name,
            calls: calls.clone(),
            fail,
        }
    }

    #[test]
    fn test_init_in_registration_order() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ExtensionRegistry::new();
        registry.register(recording("first", &calls, false));
        registry.register(recording("second", &calls, false));
        registry.register(recording("third", &calls, false));

        let mut api = Api::bare();
        registry.init_all(&mut api, &Settings::new()).unwrap();

        assert_eq!(*calls.lock().unwrap(), vec!["first", "second", "third"]);
        assert_eq!(registry.names(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_first_failure_stops_init() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ExtensionRegistry::new();
        registry.register(recording("ok", &calls, false));
        registry.register(recording("broken", &calls, true));
        registry.register(recording("never", &calls, false));

        let mut api = Api::bare();
        let err = registry.init_all(&mut api, &Settings::new()).unwrap_err();

        assert_eq!(err.extension_name(), Some("broken"));
        assert_eq!(*calls.lock().unwrap(), vec!["ok", "broken"]);
    }
}
