use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

use serde_json::Value;

use crate::extension::ExtensionError;

/// Named values handed to every extension's `init`.
#[derive(Clone, Debug)]
pub struct Settings {
    values: Arc<RwLock<HashMap<String, SettingValue>>>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum SettingValue {
    Null,
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    List(Vec<SettingValue>),
    Map(HashMap<String, SettingValue>),
}

impl SettingValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SettingValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SettingValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            SettingValue::Null => Value::Null,
            SettingValue::String(s) => Value::String(s.clone()),
            SettingValue::Integer(i) => Value::from(*i),
            SettingValue::Float(f) => Value::from(*f),
            SettingValue::Boolean(b) => Value::Bool(*b),
            SettingValue::List(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            SettingValue::Map(map) => Value::Object(
                map.iter()
                    .map(|(key, value)| (key.clone(), value.to_json()))
                    .collect(),
            ),
        }
    }
}

impl Settings {
    pub fn new() -> Self {
        Settings {
            values: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Build settings from a JSON object. Nested objects become maps.
    pub fn from_json(value: Value) -> Result<Self, ExtensionError> {
        let Value::Object(object) = value else {
            return Err(ExtensionError::configuration(
                "Settings must be a JSON object",
            ));
        };

        let settings = Settings::new();
        for (key, value) in object {
            settings.set(key, value)?;
        }
        Ok(settings)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ExtensionError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let value: Value = serde_json::from_str(&raw).map_err(|e| {
            ExtensionError::configuration(format!(
                "Invalid settings file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json(value)
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<SettingValue>) -> Result<(), ExtensionError> {
        let mut values = self.values.write()
            .map_err(|_| ExtensionError::configuration("Settings lock poisoned"))?;
        values.insert(key.into(), value.into());
        Ok(())
    }

    pub fn get(&self, key: &str) -> Result<Option<SettingValue>, ExtensionError> {
        let values = self.values.read()
            .map_err(|_| ExtensionError::configuration("Settings lock poisoned"))?;
        Ok(values.get(key).cloned())
    }

    pub fn contains(&self, key: &str) -> Result<bool, ExtensionError> {
        Ok(self.get(key)?.is_some())
    }

    pub fn get_string(&self, key: &str) -> Result<Option<String>, ExtensionError> {
        match self.get(key)? {
            Some(SettingValue::String(s)) => Ok(Some(s)),
            Some(_) => Ok(None),
            None => Ok(None),
        }
    }

    pub fn get_integer(&self, key: &str) -> Result<Option<i64>, ExtensionError> {
        match self.get(key)? {
            Some(SettingValue::Integer(i)) => Ok(Some(i)),
            Some(_) => Ok(None),
            None => Ok(None),
        }
    }

    pub fn get_float(&self, key: &str) -> Result<Option<f64>, ExtensionError> {
        match self.get(key)? {
            Some(SettingValue::Float(f)) => Ok(Some(f)),
            Some(SettingValue::Integer(i)) => Ok(Some(i as f64)),
            Some(_) => Ok(None),
            None => Ok(None),
        }
    }

    pub fn get_boolean(&self, key: &str) -> Result<Option<bool>, ExtensionError> {
        match self.get(key)? {
            Some(SettingValue::Boolean(b)) => Ok(Some(b)),
            Some(_) => Ok(None),
            None => Ok(None),
        }
    }

    /// A list of strings. Any non-string item is a configuration error.
    pub fn get_string_list(&self, key: &str) -> Result<Option<Vec<String>>, ExtensionError> {
        match self.get(key)? {
            Some(SettingValue::List(items)) => items
                .into_iter()
                .map(|item| match item {
                    SettingValue::String(s) => Ok(s),
                    other => Err(ExtensionError::configuration(format!(
                        "Setting '{}' must only contain strings, found {:?}",
                        key, other
                    ))),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Some),
            Some(SettingValue::String(s)) => Ok(Some(vec![s])),
            Some(SettingValue::Null) | None => Ok(None),
            Some(other) => Err(ExtensionError::configuration(format!(
                "Setting '{}' must be a list of strings, found {:?}",
                key, other
            ))),
        }
    }

    pub fn get_map(&self, key: &str) -> Result<Option<HashMap<String, SettingValue>>, ExtensionError> {
        match self.get(key)? {
            Some(SettingValue::Map(map)) => Ok(Some(map)),
            Some(_) => Ok(None),
            None => Ok(None),
        }
    }

    pub fn merge(&mut self, other: &Settings) -> Result<(), ExtensionError> {
        if Arc::ptr_eq(&self.values, &other.values) {
            return Ok(());
        }
        let mut values = self.values.write()
            .map_err(|_| ExtensionError::configuration("Settings lock poisoned"))?;
        let other_values = other.values.read()
            .map_err(|_| ExtensionError::configuration("Settings lock poisoned"))?;
        for (key, value) in other_values.iter() {
            values.insert(key.clone(), value.clone());
        }
        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::new()
    }
}

impl From<String> for SettingValue {
    fn from(value: String) -> Self {
        SettingValue::String(value)
    }
}

impl From<&str> for SettingValue {
    fn from(value: &str) -> Self {
        SettingValue::String(value.to_string())
    }
}

impl From<i64> for SettingValue {
    fn from(value: i64) -> Self {
        SettingValue::Integer(value)
    }
}

impl From<i32> for SettingValue {
    fn from(value: i32) -> Self {
        SettingValue::Integer(value as i64)
    }
}

impl From<u16> for SettingValue {
    fn from(value: u16) -> Self {
        SettingValue::Integer(value as i64)
    }
}

impl From<f64> for SettingValue {
    fn from(value: f64) -> Self {
        SettingValue::Float(value)
    }
}

impl From<f32> for SettingValue {
    fn from(value: f32) -> Self {
        SettingValue::Float(value as f64)
    }
}

impl From<bool> for SettingValue {
    fn from(value: bool) -> Self {
        SettingValue::Boolean(value)
    }
}

impl<T: Into<SettingValue>> From<Option<T>> for SettingValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(SettingValue::Null)
    }
}

impl<T: Into<SettingValue>> From<Vec<T>> for SettingValue {
    fn from(values: Vec<T>) -> Self {
        SettingValue::List(values.into_iter().map(Into::into).collect())
    }
}

impl From<HashMap<String, SettingValue>> for SettingValue {
    fn from(map: HashMap<String, SettingValue>) -> Self {
        SettingValue::Map(map)
    }
}

impl From<Value> for SettingValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => SettingValue::Null,
            Value::Bool(b) => SettingValue::Boolean(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => SettingValue::Integer(i),
                None => SettingValue::Float(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => SettingValue::String(s),
            Value::Array(items) => SettingValue::List(items.into_iter().map(Into::into).collect()),
            Value::Object(map) => SettingValue::Map(
                map.into_iter()
                    .map(|(key, value)| (key, value.into()))
                    .collect(),
            ),
        }
    }
}
