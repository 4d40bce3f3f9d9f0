//! Stage settings loaded from the `-c/--config` file.
//!
//! Settings belong to the transform; the runtime only loads them. Nested
//! tables are flattened into dotted keys so every format ends up as the
//! same flat string map.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::Serialize;
use serde_json::Value;

use crate::error::StageError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Settings {
    values: BTreeMap<String, String>,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a settings file, picking the format from its extension.
    ///
    /// `.json` is always understood, `.toml` and `.yaml`/`.yml` with the
    /// matching features. Anything else is read as INI (`KEY=VALUE` lines,
    /// `[section]` headers) with the `ini` feature.
    pub fn load(path: &Path) -> Result<Self, StageError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            StageError::config(format!("Cannot read settings file '{}': {e}", path.display()))
        })?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        let parsed = match ext.as_deref() {
            Some("json") => Self::from_json_str(&text),
            #[cfg(feature = "toml")]
            Some("toml") => Self::from_toml_str(&text),
            #[cfg(feature = "yaml")]
            Some("yaml" | "yml") => Self::from_yaml_str(&text),
            #[cfg(feature = "ini")]
            _ => Self::from_ini_str(&text),
            #[cfg(not(feature = "ini"))]
            _ => Err(StageError::config("key/value settings need the `ini` feature")),
        };
        parsed.map_err(|e| match e {
            StageError::Config(msg) => {
                StageError::config(format!("Invalid settings file '{}': {msg}", path.display()))
            }
            other => other,
        })
    }

    pub fn from_json_str(text: &str) -> Result<Self, StageError> {
        let value: Value = serde_json::from_str(text).map_err(|e| StageError::config(e.to_string()))?;
        Self::from_value(&value)
    }

    #[cfg(feature = "toml")]
    pub fn from_toml_str(text: &str) -> Result<Self, StageError> {
        let table: toml::Table = toml::from_str(text).map_err(|e| StageError::config(e.to_string()))?;
        let value = serde_json::to_value(table).map_err(|e| StageError::config(e.to_string()))?;
        Self::from_value(&value)
    }

    #[cfg(feature = "yaml")]
    pub fn from_yaml_str(text: &str) -> Result<Self, StageError> {
        let doc: serde_yaml::Value =
            serde_yaml::from_str(text).map_err(|e| StageError::config(e.to_string()))?;
        let value = serde_json::to_value(doc).map_err(|e| StageError::config(e.to_string()))?;
        Self::from_value(&value)
    }

    /// Keys before the first `[section]` stay bare, the rest become
    /// `section.key`.
    #[cfg(feature = "ini")]
    pub fn from_ini_str(text: &str) -> Result<Self, StageError> {
        let value: Value = serde_ini::from_str(text).map_err(|e| StageError::config(e.to_string()))?;
        Self::from_value(&value)
    }

    /// Flatten a JSON object into dotted keys.
    pub fn from_value(value: &Value) -> Result<Self, StageError> {
        let Value::Object(map) = value else {
            return Err(StageError::config("settings must be a table of key/value pairs"));
        };
        let mut values = BTreeMap::new();
        for (key, value) in map {
            flatten(key, value, &mut values);
        }
        Ok(Self { values })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    /// Parse the value of `key`; `Ok(None)` when it is absent.
    pub fn get_parsed<T>(&self, key: &str) -> Result<Option<T>, StageError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        match self.get(key) {
            None => Ok(None),
            Some(raw) => raw
                .parse()
                .map(Some)
                .map_err(|e| StageError::config(format!("Invalid value for '{key}': {e}"))),
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

fn flatten(prefix: &str, value: &Value, out: &mut BTreeMap<String, String>) {
    match value {
        Value::Object(map) => {
            for (key, nested) in map {
                flatten(&format!("{prefix}.{key}"), nested, out);
            }
        }
        Value::String(s) => {
            out.insert(prefix.to_string(), s.clone());
        }
        Value::Null => {
            out.insert(prefix.to_string(), String::new());
        }
        other => {
            out.insert(prefix.to_string(), other.to_string());
        }
    }
}
