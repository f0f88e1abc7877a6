use tracing::{info, warn};

use crate::api::Api;
use crate::extension::{builtin_extensions, Extension, ExtensionError, ExtensionRegistry};
use crate::media::{Media, JSON};
use crate::settings::{SettingValue, Settings};

/// Collects settings and extensions, then builds an [`Api`].
pub struct ApiBuilder {
    settings: Settings,
    extensions: ExtensionRegistry,
}

impl ApiBuilder {
    /// A builder with the built-in extensions registered.
    pub fn new() -> Self {
        let mut builder = Self::bare();
        for extension in builtin_extensions() {
            builder.extensions.register_arc(extension);
        }
        builder
    }

    /// A builder without any extension.
    pub fn bare() -> Self {
        ApiBuilder {
            settings: Settings::new(),
            extensions: ExtensionRegistry::new(),
        }
    }

    pub fn setting<T: Into<SettingValue>>(self, key: impl Into<String>, value: T) -> Self {
        let key = key.into();
        if let Err(e) = self.settings.set(key.clone(), value) {
            warn!("Ignoring setting '{}': {}", key, e);
        }
        self
    }

    /// Add every value of `settings`, replacing keys set before.
    pub fn settings(mut self, settings: Settings) -> Self {
        if let Err(e) = self.settings.merge(&settings) {
            warn!("Failed to merge settings: {}", e);
        }
        self
    }

    /// Register an extension. It runs after those registered before it.
    pub fn extension(mut self, extension: impl Extension) -> Self {
        self.extensions.register(extension);
        self
    }

    pub fn extensions(&self) -> &ExtensionRegistry {
        &self.extensions
    }

    /// Create the application, then run every extension's `init` on it.
    pub fn build(self) -> Result<Api, ExtensionError> {
        let media_type = self
            .settings
            .get_string("media_type")?
            .unwrap_or_else(|| JSON.to_string());
        let mut api = Api::with_media(Media::new(media_type)?);

        self.extensions.init_all(&mut api, &self.settings)?;
        info!(
            "Application built with extensions {:?}",
            self.extensions.names()
        );
        Ok(api)
    }
}

impl Default for ApiBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::Response;
    use crate::settings::Settings;

    struct Hello;

    impl Extension for Hello {
        fn name(&self) -> &str {
            "hello"
        }

        fn init(&self, api: &mut Api, settings: &Settings) -> Result<(), ExtensionError> {
            let greeting = settings
                .get_string("greeting")?
                .ok_or_else(|| ExtensionError::configuration("greeting is required"))?;
            api.route("/hello").to(move |_req, mut res: Response, _params| {
                let greeting = greeting.clone();
                async move {
                    res.text(greeting);
                    Ok(res)
                }
            })?;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_extension_adds_route() {
        let api = ApiBuilder::new()
            .setting("greeting", "Hello, extension!")
            .extension(Hello)
            .build()
            .unwrap();

        let res = api.client().get("/hello").await;
        assert_eq!(res.body_text(), "Hello, extension!");
    }

    #[test]
    fn test_extension_failure_aborts_build() {
        let result = ApiBuilder::bare().extension(Hello).build();
        let err = result.err().unwrap();
        assert_eq!(err.extension_name(), Some("hello"));
    }

    #[test]
    fn test_media_type_setting() {
        let settings = Settings::from_json(serde_json::json!({ "media_type": "text/plain" })).unwrap();
        let api = ApiBuilder::bare().settings(settings).build().unwrap();
        assert_eq!(api.media_type(), "text/plain");

        let result = ApiBuilder::bare().setting("media_type", "application/x-nope").build();
        assert!(result.is_err());
    }

    #[test]
    fn test_builtins_registered_by_default() {
        assert_eq!(ApiBuilder::new().extensions().len(), 5);
        assert!(ApiBuilder::bare().extensions().is_empty());
    }
}
