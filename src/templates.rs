use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use minijinja::value::{Kwargs, Value};
use minijinja::{AutoEscape, Environment, ErrorKind};
use serde::Serialize;
use tracing::debug;

use crate::error::Error;
use crate::routing::{Params, Routes};

/// Jinja templates loaded from a directory.
///
/// Files ending in `.html`, `.htm` or `.xml` are auto-escaped. Templates can
/// call `url_for(name, **params)` to build the path of a named route.
#[derive(Clone)]
pub struct Templates {
    inner: Arc<RwLock<Inner>>,
    routes: Routes,
}

struct Inner {
    directory: PathBuf,
    env: Arc<Environment<'static>>,
}

impl Templates {
    pub fn new(directory: impl AsRef<Path>, routes: Routes) -> Result<Self, Error> {
        let directory = absolute(directory.as_ref())?;
        let env = Arc::new(environment(&directory, &routes));
        Ok(Templates {
            inner: Arc::new(RwLock::new(Inner { directory, env })),
            routes,
        })
    }

    pub fn templates_dir(&self) -> PathBuf {
        self.read(|inner| inner.directory.clone())
    }

    /// Load templates from another directory from now on.
    pub fn set_templates_dir(&self, directory: impl AsRef<Path>) -> Result<(), Error> {
        let directory = absolute(directory.as_ref())?;
        let env = Arc::new(environment(&directory, &self.routes));
        debug!(directory = %directory.display(), "Switching templates directory");

        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.directory = directory;
        inner.env = env;
        Ok(())
    }

    /// Render a template file on the blocking thread pool.
    pub async fn render<S: Serialize + ?Sized>(&self, name: &str, ctx: &S) -> Result<String, Error> {
        let env = self.env();
        let ctx = Value::from_serialize(ctx);
        let name = name.to_string();

        tokio::task::spawn_blocking(move || -> Result<String, Error> {
            Ok(env.get_template(&name)?.render(ctx)?)
        })
        .await
        .map_err(|e| Error::internal(format!("Template rendering task failed: {}", e)))?
    }

    pub fn render_sync<S: Serialize + ?Sized>(&self, name: &str, ctx: &S) -> Result<String, Error> {
        let env = self.env();
        let template = env.get_template(name)?;
        Ok(template.render(Value::from_serialize(ctx))?)
    }

    /// Render template source that does not live in a file. Not auto-escaped.
    pub fn render_string<S: Serialize + ?Sized>(&self, source: &str, ctx: &S) -> Result<String, Error> {
        Ok(self.env().render_str(source, Value::from_serialize(ctx))?)
    }

    fn env(&self) -> Arc<Environment<'static>> {
        self.read(|inner| inner.env.clone())
    }

    fn read<T>(&self, f: impl FnOnce(&Inner) -> T) -> T {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        f(&inner)
    }
}

fn absolute(directory: &Path) -> Result<PathBuf, Error> {
    if directory.is_absolute() {
        Ok(directory.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(directory))
    }
}

fn environment(directory: &Path, routes: &Routes) -> Environment<'static> {
    let mut env = Environment::new();
    env.set_loader(minijinja::path_loader(directory.to_path_buf()));
    env.set_auto_escape_callback(|name: &str| match name.rsplit_once('.') {
        Some((_, "html" | "htm" | "xml")) => AutoEscape::Html,
        _ => AutoEscape::None,
    });

    let routes = routes.clone();
    env.add_function(
        "url_for",
        move |name: String, kwargs: Kwargs| -> Result<Value, minijinja::Error> {
            let mut params = Params::new();
            for key in kwargs.args() {
                let value: Value = kwargs.get(key)?;
                params.insert(key, value.to_string());
            }
            routes
                .url_for(&name, &params)
                .map(Value::from_safe_string)
                .map_err(|e| minijinja::Error::new(ErrorKind::InvalidOperation, e.to_string()))
        },
    );
    env
}

impl std::fmt::Debug for Templates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Templates")
            .field("directory", &self.templates_dir())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Request;
    use crate::response::Response;
    use crate::routing::RouteBuilder;
    use serde_json::json;
    use tempfile::TempDir;

    fn routes() -> Routes {
        let routes = Routes::new();
        RouteBuilder::new(routes.clone(), "/about/{who}")
            .name("about")
            .to(|_req: Request, res: Response, _params| async move { Ok(res) })
            .unwrap();
        routes
    }

    fn write(dir: &Path, name: &str, source: &str) {
        std::fs::write(dir.join(name), source).unwrap();
    }

    #[tokio::test]
    async fn test_render_file_with_autoescape() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "hello.html", "<p>{{ name }}</p>");
        write(dir.path(), "hello.txt", "{{ name }}");

        let templates = Templates::new(dir.path(), routes()).unwrap();
        let html = templates.render("hello.html", &json!({ "name": "<b>" })).await.unwrap();
        assert_eq!(html, "<p>&lt;b&gt;</p>");

        let text = templates.render_sync("hello.txt", &json!({ "name": "<b>" })).unwrap();
        assert_eq!(text, "<b>");
    }

    #[test]
    fn test_url_for_global() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "link.html", r#"<a href="{{ url_for('about', who=name) }}">"#);

        let templates = Templates::new(dir.path(), routes()).unwrap();
        let html = templates.render_sync("link.html", &json!({ "name": "bob" })).unwrap();
        assert_eq!(html, r#"<a href="/about/bob">"#);

        let result = templates.render_string("{{ url_for('missing') }}", &json!({}));
        assert!(matches!(result, Err(Error::Template(_))));
    }

    #[test]
    fn test_missing_template_and_dir_change() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        write(second.path(), "page.txt", "second");

        let templates = Templates::new(first.path(), Routes::new()).unwrap();
        assert!(matches!(
            templates.render_sync("page.txt", &json!({})),
            Err(Error::Template(_))
        ));

        templates.set_templates_dir(second.path()).unwrap();
        assert_eq!(templates.templates_dir(), second.path());
        assert_eq!(templates.render_sync("page.txt", &json!({})).unwrap(), "second");
    }
}
