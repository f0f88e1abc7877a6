//! A small async web framework built around extensions.
//!
//! ```no_run
//! use tostada::{Api, Params, Response, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let api = Api::new()?;
//!     api.route("/greet/{person}").to(|_req, mut res: Response, params: Params| async move {
//!         res.text(format!("Hello, {}!", params.get("person").unwrap_or("stranger")));
//!         Ok(res)
//!     })?;
//!     api.run(ServerConfig::new()).await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod builder;
pub mod error;
pub mod extension;
pub mod media;
pub mod middleware;
pub mod redirection;
pub mod request;
pub mod response;
pub mod routing;
pub mod server;
pub mod settings;
pub mod state;
pub mod staticfiles;
pub mod templates;
pub mod testing;

pub use api::{Api, App};
pub use builder::ApiBuilder;
pub use error::{Error, HttpError};
pub use extension::{Extension, ExtensionError, ExtensionRegistry, MiddlewareExtension};
pub use media::Media;
pub use middleware::{Middleware, Next, RoutingMiddleware};
pub use redirection::Redirection;
pub use request::{Request, Url};
pub use response::Response;
pub use routing::{Hook, Hooked, MethodView, Params};
pub use server::{Server, ServerConfig};
pub use settings::{SettingValue, Settings};
pub use staticfiles::{static_files, StaticFiles};
pub use templates::Templates;
pub use testing::TestClient;

pub use axum::http::{Method, StatusCode};
