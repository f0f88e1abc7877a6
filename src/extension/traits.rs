use crate::api::Api;
use crate::extension::ExtensionError;
use crate::settings::Settings;

/// A plugin that configures an [`Api`] while it is being built.
///
/// `init` runs once per application, after the application object exists
/// and in the order extensions were registered. It may add routes,
/// middleware, mounted apps or shared state.
pub trait Extension: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn init(&self, api: &mut Api, settings: &Settings) -> Result<(), ExtensionError>;
}
