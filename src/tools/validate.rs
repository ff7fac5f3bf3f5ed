//! Argument validation against a tool descriptor.
//!
//! Validation is pure: it never touches the cluster. Declared parameters are
//! checked in declaration order, so the first reported error is stable for a
//! given input.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::str::FromStr;

use super::registry::ToolDescriptor;
use crate::types::{Error, Result};

/// Arguments that passed validation, with defaults filled.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidatedArgs {
    values: Map<String, Value>,
}

/// Validate raw arguments. `raw` must be an object; `null` means no arguments.
pub fn validate(descriptor: &ToolDescriptor, raw: &Value) -> Result<ValidatedArgs> {
    let empty = Map::new();
    let provided = match raw {
        Value::Null => &empty,
        Value::Object(map) => map,
        other => {
            return Err(Error::validation(format!(
                "arguments for '{}' must be a JSON object, got {}",
                descriptor.name,
                type_name(other)
            )))
        }
    };

    let mut values = Map::new();
    for param in &descriptor.params {
        match provided.get(&param.name) {
            None | Some(Value::Null) => {
                if param.is_required() {
                    return Err(Error::invalid_argument(&param.name, "is required"));
                }
                if let Some(default) = &param.default {
                    values.insert(param.name.clone(), default.clone());
                }
            }
            Some(value) => {
                param
                    .param_type
                    .check(value)
                    .map_err(|reason| Error::invalid_argument(&param.name, reason))?;
                values.insert(param.name.clone(), value.clone());
            }
        }
    }

    let mut unknown: Vec<&String> = provided
        .keys()
        .filter(|k| descriptor.param_def(k).is_none())
        .collect();
    unknown.sort();
    if let Some(first) = unknown.first() {
        let allowed: Vec<&str> = descriptor.params.iter().map(|p| p.name.as_str()).collect();
        return Err(Error::invalid_argument(
            first.as_str(),
            format!(
                "unknown argument for '{}' (accepted: {})",
                descriptor.name,
                if allowed.is_empty() {
                    "none".to_string()
                } else {
                    allowed.join(", ")
                }
            ),
        ));
    }

    Ok(ValidatedArgs { values })
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

impl ValidatedArgs {
    /// Build directly from a map. Intended for handler tests.
    pub fn from_map(values: Map<String, Value>) -> Self {
        Self { values }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.values
    }

    pub fn opt_str(&self, name: &str) -> Option<&str> {
        self.values.get(name).and_then(Value::as_str)
    }

    pub fn str(&self, name: &str) -> Result<&str> {
        self.opt_str(name)
            .ok_or_else(|| Error::invalid_argument(name, "is required"))
    }

    pub fn opt_int(&self, name: &str) -> Option<i64> {
        self.values.get(name).and_then(Value::as_i64)
    }

    pub fn int(&self, name: &str) -> Result<i64> {
        self.opt_int(name)
            .ok_or_else(|| Error::invalid_argument(name, "is required"))
    }

    /// Boolean flag; absent means false.
    pub fn flag(&self, name: &str) -> bool {
        self.values
            .get(name)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn opt_string_list(&self, name: &str) -> Option<Vec<String>> {
        self.values.get(name).and_then(Value::as_array).map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
    }

    /// String map in key order.
    pub fn opt_string_map(&self, name: &str) -> Option<BTreeMap<String, String>> {
        self.values.get(name).and_then(Value::as_object).map(|obj| {
            obj.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
    }

    /// Decode a structured argument into `T`. Shape errors name the argument.
    pub fn opt_decode<T>(&self, name: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned,
    {
        match self.values.get(name) {
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|e| Error::invalid_argument(name, e.to_string())),
            None => Ok(None),
        }
    }

    /// Parse an enum-valued argument.
    pub fn parse<T>(&self, name: &str) -> Result<T>
    where
        T: FromStr<Err = String>,
    {
        self.str(name)?
            .parse()
            .map_err(|reason: String| Error::invalid_argument(name, reason))
    }

    pub fn opt_parse<T>(&self, name: &str) -> Result<Option<T>>
    where
        T: FromStr<Err = String>,
    {
        match self.opt_str(name) {
            Some(raw) => raw
                .parse()
                .map(Some)
                .map_err(|reason: String| Error::invalid_argument(name, reason)),
            None => Ok(None),
        }
    }
}
