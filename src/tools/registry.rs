//! Tool registry: typed descriptors, JSON Schema rendering, prompt lines.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;

use super::definitions::{self, ToolId};
use crate::types::{Error, Result};

// =============================================================================
// Parameter types
// =============================================================================

/// Parameter type for tool inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    String,
    Int,
    Bool,
    StringList,
    /// Object whose values are all strings (labels, selectors, env).
    StringMap,
    /// Array of JSON objects, decoded by the handler (ingress rules, TLS entries).
    ObjectList,
    Enum(Vec<String>),
    Optional(Box<ParamType>),
}

impl ParamType {
    /// Enum over the given values.
    pub fn one_of(values: &[&str]) -> Self {
        ParamType::Enum(values.iter().map(|v| v.to_string()).collect())
    }

    pub fn optional(inner: ParamType) -> Self {
        ParamType::Optional(Box::new(inner))
    }

    /// Check a JSON value against this type. Returns the reason on mismatch.
    pub fn check(&self, value: &Value) -> std::result::Result<(), String> {
        match self {
            ParamType::String => {
                if value.is_string() {
                    Ok(())
                } else {
                    Err(format!("expected string, got {}", value_type_name(value)))
                }
            }
            ParamType::Int => {
                if value.is_i64() {
                    Ok(())
                } else if value.is_u64() {
                    Err("integer out of range".to_string())
                } else {
                    Err(format!("expected integer, got {}", value_type_name(value)))
                }
            }
            ParamType::Bool => {
                if value.is_boolean() {
                    Ok(())
                } else {
                    Err(format!("expected boolean, got {}", value_type_name(value)))
                }
            }
            ParamType::StringList => {
                let arr = value
                    .as_array()
                    .ok_or_else(|| format!("expected array, got {}", value_type_name(value)))?;
                for (i, item) in arr.iter().enumerate() {
                    if !item.is_string() {
                        return Err(format!(
                            "expected string at index {}, got {}",
                            i,
                            value_type_name(item)
                        ));
                    }
                }
                Ok(())
            }
            ParamType::StringMap => {
                let map = value
                    .as_object()
                    .ok_or_else(|| format!("expected object, got {}", value_type_name(value)))?;
                for (key, item) in map {
                    if !item.is_string() {
                        return Err(format!(
                            "expected string value for key '{}', got {}",
                            key,
                            value_type_name(item)
                        ));
                    }
                }
                Ok(())
            }
            ParamType::ObjectList => {
                let arr = value
                    .as_array()
                    .ok_or_else(|| format!("expected array, got {}", value_type_name(value)))?;
                for (i, item) in arr.iter().enumerate() {
                    if !item.is_object() {
                        return Err(format!(
                            "expected object at index {}, got {}",
                            i,
                            value_type_name(item)
                        ));
                    }
                }
                Ok(())
            }
            ParamType::Enum(variants) => {
                let s = value.as_str().ok_or_else(|| {
                    format!("expected string for enum, got {}", value_type_name(value))
                })?;
                if variants.iter().any(|v| v == s) {
                    Ok(())
                } else {
                    Err(format!(
                        "invalid value '{}', expected one of: {}",
                        s,
                        variants.join(", ")
                    ))
                }
            }
            ParamType::Optional(inner) => {
                if value.is_null() {
                    Ok(())
                } else {
                    inner.check(value)
                }
            }
        }
    }

    /// Human-readable type name for prompt generation.
    pub fn display_name(&self) -> String {
        match self {
            ParamType::String => "string".to_string(),
            ParamType::Int => "integer".to_string(),
            ParamType::Bool => "boolean".to_string(),
            ParamType::StringList => "string[]".to_string(),
            ParamType::StringMap => "map<string,string>".to_string(),
            ParamType::ObjectList => "object[]".to_string(),
            ParamType::Enum(variants) => format!("enum({})", variants.join("|")),
            ParamType::Optional(inner) => inner.display_name(),
        }
    }

    /// JSON Schema fragment for this type. `Optional` renders as its inner
    /// type; optionality is expressed by the `required` list.
    pub fn json_schema(&self) -> Value {
        match self {
            ParamType::String => json!({ "type": "string" }),
            ParamType::Int => json!({ "type": "integer" }),
            ParamType::Bool => json!({ "type": "boolean" }),
            ParamType::StringList => json!({ "type": "array", "items": { "type": "string" } }),
            ParamType::StringMap => {
                json!({ "type": "object", "additionalProperties": { "type": "string" } })
            }
            ParamType::ObjectList => json!({ "type": "array", "items": { "type": "object" } }),
            ParamType::Enum(variants) => json!({ "type": "string", "enum": variants }),
            ParamType::Optional(inner) => inner.json_schema(),
        }
    }
}

fn value_type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// =============================================================================
// Parameter definition
// =============================================================================

/// A single parameter definition for a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamDef {
    pub name: String,
    pub param_type: ParamType,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl ParamDef {
    /// Required parameter.
    pub fn required(name: &str, param_type: ParamType, description: &str) -> Self {
        Self {
            name: name.to_string(),
            param_type,
            description: description.to_string(),
            default: None,
        }
    }

    /// Optional parameter with no default; absent stays absent.
    pub fn optional(name: &str, param_type: ParamType, description: &str) -> Self {
        Self::required(name, ParamType::optional(param_type), description)
    }

    /// Parameter filled with `default` when absent.
    pub fn with_default(
        name: &str,
        param_type: ParamType,
        default: Value,
        description: &str,
    ) -> Self {
        Self {
            default: Some(default),
            ..Self::required(name, param_type, description)
        }
    }

    pub fn is_required(&self) -> bool {
        self.default.is_none() && !matches!(self.param_type, ParamType::Optional(_))
    }
}

// =============================================================================
// Tool descriptor
// =============================================================================

/// Risk classification of a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskSemantic {
    ReadOnly,
    Write,
    Destructive,
}

impl RiskSemantic {
    /// Whether the tool changes cluster state.
    pub fn is_mutating(self) -> bool {
        !matches!(self, RiskSemantic::ReadOnly)
    }
}

/// Complete tool metadata plus its handler binding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub id: ToolId,
    pub description: String,
    pub params: Vec<ParamDef>,
    pub risk: RiskSemantic,
}

impl ToolDescriptor {
    pub fn new(id: ToolId, risk: RiskSemantic, description: &str) -> Self {
        Self {
            name: id.as_str().to_string(),
            id,
            description: description.to_string(),
            params: Vec::new(),
            risk,
        }
    }

    /// Append a parameter.
    pub fn param(mut self, param: ParamDef) -> Self {
        self.params.push(param);
        self
    }

    pub fn param_def(&self, name: &str) -> Option<&ParamDef> {
        self.params.iter().find(|p| p.name == name)
    }

    /// JSON Schema object describing the tool's arguments.
    pub fn input_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for p in &self.params {
            let mut schema = p.param_type.json_schema();
            if let Some(obj) = schema.as_object_mut() {
                obj.insert("description".to_string(), Value::String(p.description.clone()));
                if let Some(default) = &p.default {
                    obj.insert("default".to_string(), default.clone());
                }
            }
            properties.insert(p.name.clone(), schema);
            if p.is_required() {
                required.push(Value::String(p.name.clone()));
            }
        }
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false,
        })
    }

    /// Generate a prompt line for this tool.
    ///
    /// Format: `- tool_name(param1: type, param2?: type): description`
    pub fn to_prompt_line(&self) -> String {
        let params: Vec<String> = self
            .params
            .iter()
            .map(|p| {
                let optional = if p.is_required() { "" } else { "?" };
                format!("{}{}: {}", p.name, optional, p.param_type.display_name())
            })
            .collect();

        format!("- {}({}): {}", self.name, params.join(", "), self.description)
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Read-only after startup; shared by `Arc`.
#[derive(Debug, Default)]
pub struct ToolRegistry {
    entries: HashMap<String, ToolDescriptor>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Registry populated with every built-in tool.
    pub fn builtin() -> Result<Self> {
        let mut registry = Self::new();
        for descriptor in definitions::builtin_descriptors() {
            registry.register(descriptor)?;
        }
        tracing::debug!("Registered {} built-in tools", registry.len());
        Ok(registry)
    }

    /// Register a descriptor. Names must be non-empty and unique.
    pub fn register(&mut self, descriptor: ToolDescriptor) -> Result<()> {
        if descriptor.name.is_empty() {
            return Err(Error::validation("tool name cannot be empty"));
        }
        if self.entries.contains_key(&descriptor.name) {
            return Err(Error::validation(format!(
                "tool '{}' is already registered",
                descriptor.name
            )));
        }
        self.entries.insert(descriptor.name.clone(), descriptor);
        Ok(())
    }

    /// Resolve a tool by name.
    pub fn lookup(&self, name: &str) -> Result<&ToolDescriptor> {
        self.entries
            .get(name)
            .ok_or_else(|| Error::unknown_tool(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// All descriptors, sorted by name.
    pub fn list(&self) -> Vec<&ToolDescriptor> {
        let mut entries: Vec<&ToolDescriptor> = self.entries.values().collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        entries
    }

    /// Prompt section listing the given descriptors.
    pub fn generate_prompt<'a>(descriptors: impl IntoIterator<Item = &'a ToolDescriptor>) -> String {
        let lines: Vec<String> = descriptors
            .into_iter()
            .map(ToolDescriptor::to_prompt_line)
            .collect();
        if lines.is_empty() {
            return String::new();
        }
        format!("Available tools:\n{}", lines.join("\n"))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
