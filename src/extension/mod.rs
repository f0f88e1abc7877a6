pub mod builtin;
pub mod error;
pub mod middleware;
pub mod registry;
pub mod traits;

pub use builtin::{allowed_hosts, builtin_extensions, cors, hsts, StaticExtension, TemplatesExtension};
pub use error::ExtensionError;
pub use middleware::MiddlewareExtension;
pub use registry::ExtensionRegistry;
pub use traits::Extension;
