use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::error::Error;

pub const JSON: &str = "application/json";
pub const PLAIN_TEXT: &str = "text/plain";

/// Serializes a media value into a response body.
pub type MediaHandler = Arc<dyn Fn(&Value) -> Result<String, Error> + Send + Sync>;

pub fn default_handlers() -> HashMap<String, MediaHandler> {
    let mut handlers: HashMap<String, MediaHandler> = HashMap::new();
    handlers.insert(
        JSON.to_string(),
        Arc::new(|value: &Value| serde_json::to_string(value).map_err(Error::from)),
    );
    handlers.insert(
        PLAIN_TEXT.to_string(),
        Arc::new(|value: &Value| -> Result<String, Error> {
            Ok(match value {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            })
        }),
    );
    handlers
}

/// Decides how values given to [`crate::Response::media`] are serialized.
#[derive(Clone)]
pub struct Media {
    media_type: String,
    handlers: Arc<HashMap<String, MediaHandler>>,
}

impl Media {
    pub fn new(media_type: impl Into<String>) -> Result<Self, Error> {
        let mut media = Media {
            media_type: JSON.to_string(),
            handlers: Arc::new(default_handlers()),
        };
        media.set_media_type(media_type)?;
        Ok(media)
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn set_media_type(&mut self, media_type: impl Into<String>) -> Result<(), Error> {
        let media_type = media_type.into();
        if !self.handlers.contains_key(&media_type) {
            return Err(Error::UnsupportedMediaType(media_type));
        }
        self.media_type = media_type;
        Ok(())
    }

    pub fn handlers(&self) -> &HashMap<String, MediaHandler> {
        &self.handlers
    }

    /// Replace the handler table. The current media type must stay supported.
    pub fn set_handlers(&mut self, handlers: HashMap<String, MediaHandler>) -> Result<(), Error> {
        if !handlers.contains_key(&self.media_type) {
            return Err(Error::UnsupportedMediaType(self.media_type.clone()));
        }
        self.handlers = Arc::new(handlers);
        Ok(())
    }

    pub fn serialize(&self, value: &Value) -> Result<String, Error> {
        let handler = self
            .handlers
            .get(&self.media_type)
            .ok_or_else(|| Error::UnsupportedMediaType(self.media_type.clone()))?;
        handler(value)
    }
}

impl Default for Media {
    fn default() -> Self {
        Media {
            media_type: JSON.to_string(),
            handlers: Arc::new(default_handlers()),
        }
    }
}

impl fmt::Debug for Media {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut supported: Vec<&String> = self.handlers.keys().collect();
        supported.sort();
        f.debug_struct("Media")
            .field("media_type", &self.media_type)
            .field("handlers", &supported)
            .finish()
    }
}
