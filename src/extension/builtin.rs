use std::sync::Arc;

use tracing::debug;

use crate::api::Api;
use crate::extension::{Extension, ExtensionError, MiddlewareExtension};
use crate::middleware::{CorsConfig, CorsMiddleware, HttpsRedirectMiddleware, TrustedHostMiddleware};
use crate::settings::{SettingValue, Settings};
use crate::staticfiles::static_files;
use crate::templates::Templates;

pub const DEFAULT_STATIC_DIR: &str = "static";
pub const DEFAULT_STATIC_ROOT: &str = "static";
pub const DEFAULT_TEMPLATES_DIR: &str = "templates";

/// The extensions every [`crate::ApiBuilder::new`] starts with, in order.
pub fn builtin_extensions() -> Vec<Arc<dyn Extension>> {
    vec![
        Arc::new(allowed_hosts()),
        Arc::new(StaticExtension),
        Arc::new(cors()),
        Arc::new(hsts()),
        Arc::new(TemplatesExtension),
    ]
}

/// `allowed_hosts` (default `["*"]`) through [`TrustedHostMiddleware`].
pub fn allowed_hosts() -> MiddlewareExtension {
    MiddlewareExtension::new("allowed_hosts", |settings| {
        let hosts = settings
            .get_string_list("allowed_hosts")?
            .unwrap_or_else(|| vec!["*".to_string()]);
        Ok(TrustedHostMiddleware::new(hosts)?)
    })
}

/// [`CorsMiddleware`] configured by `cors_config`, when `enable_cors` is set.
pub fn cors() -> MiddlewareExtension {
    MiddlewareExtension::new("cors", |settings| {
        let config = match settings.get("cors_config")? {
            Some(SettingValue::Map(map)) => {
                let json = SettingValue::Map(map).to_json();
                serde_json::from_value::<CorsConfig>(json).map_err(|e| {
                    ExtensionError::configuration(format!("Invalid cors_config: {}", e))
                })?
            }
            Some(SettingValue::Null) | None => CorsConfig::default(),
            Some(other) => {
                return Err(ExtensionError::configuration(format!(
                    "cors_config must be a map, found {:?}",
                    other
                )))
            }
        };
        Ok(CorsMiddleware::new(config)?)
    })
    .with_flag("enable_cors")
}

/// HTTPS redirection, when `enable_hsts` is set.
pub fn hsts() -> MiddlewareExtension {
    MiddlewareExtension::new("hsts", |_settings| Ok(HttpsRedirectMiddleware::new()))
        .with_flag("enable_hsts")
}

/// Mounts the files of `static_dir` at `static_root`.
///
/// A null `static_dir` disables static files; a null `static_root` mounts
/// them under the directory's own name.
pub struct StaticExtension;

impl Extension for StaticExtension {
    fn name(&self) -> &str {
        "static"
    }

    fn init(&self, api: &mut Api, settings: &Settings) -> Result<(), ExtensionError> {
        let directory = match optional_string(settings, "static_dir", DEFAULT_STATIC_DIR)? {
            Some(directory) => directory,
            None => {
                debug!("Static files are disabled");
                return Ok(());
            }
        };
        let root = optional_string(settings, "static_root", DEFAULT_STATIC_ROOT)?
            .unwrap_or_else(|| directory.clone());

        debug!("Serving static files from '{}' at '{}'", directory, root);
        api.mount(&root, static_files(directory));
        Ok(())
    }
}

/// Provides [`Templates`] for `templates_dir` as application state.
pub struct TemplatesExtension;

impl Extension for TemplatesExtension {
    fn name(&self) -> &str {
        "templates"
    }

    fn init(&self, api: &mut Api, settings: &Settings) -> Result<(), ExtensionError> {
        let directory = settings
            .get_string("templates_dir")?
            .unwrap_or_else(|| DEFAULT_TEMPLATES_DIR.to_string());
        let templates = Templates::new(&directory, api.routes().clone())?;
        api.provide(templates);
        Ok(())
    }
}

/// `Some(default)` when absent, `None` when explicitly null.
fn optional_string(settings: &Settings, key: &str, default: &str) -> Result<Option<String>, ExtensionError> {
    match settings.get(key)? {
        None => Ok(Some(default.to_string())),
        Some(SettingValue::Null) => Ok(None),
        Some(SettingValue::String(value)) => Ok(Some(value)),
        Some(other) => Err(ExtensionError::configuration(format!(
            "Setting '{}' must be a string or null, found {:?}",
            key, other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ApiBuilder;
    use crate::response::Response;
    use crate::templates::Templates;
    use axum::http::Method;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn ok_route(api: &Api) {
        api.route("/").to(|_req, res: Response, _params| async move { Ok(res) }).unwrap();
    }

    #[test]
    fn test_builtin_order() {
        let names: Vec<String> = builtin_extensions()
            .iter()
            .map(|extension| extension.name().to_string())
            .collect();
        assert_eq!(names, vec!["allowed_hosts", "static", "cors", "hsts", "templates"]);
    }

    #[tokio::test]
    async fn test_allowed_hosts_setting() {
        let api = ApiBuilder::new()
            .setting("allowed_hosts", vec!["example.com"])
            .build()
            .unwrap();
        ok_route(&api);

        assert_eq!(api.client().get("/").await.status_code(), 400);
        let client = api.client().with_base_url("http://example.com").unwrap();
        assert_eq!(client.get("/").await.status_code(), 200);
    }

    #[tokio::test]
    async fn test_static_dir_and_root() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("app.js"), "let x;").unwrap();
        let static_dir = dir.path().to_string_lossy().into_owned();

        let api = ApiBuilder::new()
            .setting("static_dir", static_dir.as_str())
            .setting("static_root", "assets")
            .build()
            .unwrap();
        let res = api.client().get("/assets/app.js").await;
        assert_eq!(res.status_code(), 200);
        assert_eq!(res.header("content-type"), Some("application/javascript"));

        let api = ApiBuilder::new()
            .setting("static_dir", SettingValue::Null)
            .build()
            .unwrap();
        assert_eq!(api.client().get("/static/app.js").await.status_code(), 404);
    }

    #[tokio::test]
    async fn test_cors_is_opt_in() {
        let mut cors_config = HashMap::new();
        cors_config.insert("allow_origins".to_string(), SettingValue::from(vec!["*"]));

        let api = ApiBuilder::new()
            .setting("cors_config", cors_config.clone())
            .build()
            .unwrap();
        ok_route(&api);
        let res = api
            .client()
            .request(Method::GET, "/")
            .header("origin", "https://example.org")
            .send()
            .await
            .unwrap();
        assert!(res.header("access-control-allow-origin").is_none());

        let api = ApiBuilder::new()
            .setting("enable_cors", true)
            .setting("cors_config", cors_config)
            .build()
            .unwrap();
        ok_route(&api);
        let res = api
            .client()
            .request(Method::GET, "/")
            .header("origin", "https://example.org")
            .send()
            .await
            .unwrap();
        assert_eq!(res.header("access-control-allow-origin"), Some("*"));
    }

    #[test]
    fn test_invalid_cors_config_fails_build() {
        let result = ApiBuilder::new()
            .setting("enable_cors", true)
            .setting("cors_config", "everything")
            .build();
        let err = result.err().unwrap();
        assert_eq!(err.extension_name(), Some("cors"));
    }

    #[tokio::test]
    async fn test_hsts() {
        let api = ApiBuilder::new().setting("enable_hsts", true).build().unwrap();
        ok_route(&api);
        let res = api.client().get("/").await;
        assert_eq!(res.status_code(), 307);
        assert_eq!(res.header("location"), Some("https://testserver/"));
    }

    #[test]
    fn test_templates_are_provided() {
        let dir = TempDir::new().unwrap();
        let api = ApiBuilder::new()
            .setting("templates_dir", dir.path().to_string_lossy().into_owned())
            .build()
            .unwrap();
        let templates = api.state::<Templates>().unwrap();
        assert_eq!(templates.templates_dir(), dir.path());
    }
}
