// Environment variable loading

use crate::{ConfigError, Result};
use std::collections::HashMap;
use std::env;
use std::str::FromStr;

/// Environment variable loader
///
/// Reads the process environment, or a fixed map when built with
/// [`EnvLoader::from_map`] so settings can be tested without touching
/// global state.
#[derive(Debug, Clone, Default)]
pub struct EnvLoader {
    prefix: Option<String>,
    fixed: Option<HashMap<String, String>>,
}

impl EnvLoader {
    /// Create a new environment loader
    pub fn new(prefix: Option<String>) -> Self {
        Self {
            prefix,
            fixed: None,
        }
    }

    /// Loader answering from `vars` instead of the process environment
    pub fn from_map<K, V>(vars: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            prefix: None,
            fixed: Some(
                vars.into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }

    fn full_key(&self, key: &str) -> String {
        match self.prefix {
            Some(ref prefix) => format!("{}_{}", prefix, key.to_uppercase()),
            None => key.to_uppercase(),
        }
    }

    fn raw(&self, key: &str) -> Option<String> {
        let full_key = self.full_key(key);
        let value = match self.fixed {
            Some(ref vars) => vars.get(&full_key).cloned(),
            None => env::var(&full_key).ok(),
        };
        value.filter(|v| !v.trim().is_empty())
    }

    /// Load a specific environment variable
    pub fn load_var(&self, key: &str) -> Result<String> {
        self.raw(key)
            .ok_or_else(|| ConfigError::KeyNotFound(self.full_key(key)))
    }

    /// Load an optional variable; empty values count as missing
    pub fn load_opt(&self, key: &str) -> Option<String> {
        self.raw(key)
    }

    /// Load with default value
    pub fn load_var_or(&self, key: &str, default: &str) -> String {
        self.raw(key).unwrap_or_else(|| default.to_string())
    }

    /// Parse a variable, falling back to `default` when it is unset
    pub fn load_parsed<T>(&self, key: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.raw(key) {
            Some(value) => value.trim().parse().map_err(|e: T::Err| {
                ConfigError::ParseError(format!("{}={}: {}", self.full_key(key), value, e))
            }),
            None => Ok(default),
        }
    }

    /// Parse an optional variable
    pub fn load_parsed_opt<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.raw(key) {
            Some(value) => value.trim().parse().map(Some).map_err(|e: T::Err| {
                ConfigError::ParseError(format!("{}={}: {}", self.full_key(key), value, e))
            }),
            None => Ok(None),
        }
    }

    /// Boolean flag: `1`, `true`, `yes` and `on` are true
    pub fn load_flag(&self, key: &str, default: bool) -> bool {
        self.raw(key)
            .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
            .unwrap_or(default)
    }

    /// Comma-separated list, blanks dropped
    pub fn load_list(&self, key: &str) -> Vec<String> {
        self.raw(key)
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default()
    }
}
