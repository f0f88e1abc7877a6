use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtensionError {
    #[error("Initialization failed: {0}")]
    InitializationError(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Registration failed: {0}")]
    RegistrationError(String),

    #[error("Extension '{name}' failed to initialize: {source}")]
    ExtensionFailed {
        name: String,
        #[source]
        source: Box<ExtensionError>,
    },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    ApiError(#[from] crate::error::Error),
}

impl ExtensionError {
    pub fn initialization<S: Into<String>>(msg: S) -> Self {
        ExtensionError::InitializationError(msg.into())
    }

    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        ExtensionError::ConfigurationError(msg.into())
    }

    pub fn registration<S: Into<String>>(msg: S) -> Self {
        ExtensionError::RegistrationError(msg.into())
    }

    pub fn failed(name: impl Into<String>, source: ExtensionError) -> Self {
        ExtensionError::ExtensionFailed {
            name: name.into(),
            source: Box::new(source),
        }
    }

    /// Name of the extension whose `init` failed, if this error came from one.
    pub fn extension_name(&self) -> Option<&str> {
        match self {
            ExtensionError::ExtensionFailed { name, .. } => Some(name),
            _ => None,
        }
    }
}
