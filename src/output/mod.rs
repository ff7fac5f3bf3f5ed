//! Output formatting for tool results.
//!
//! Lists render as table, wide, json, yaml or name. Single objects render as
//! describe text, json or yaml. Rendering is a pure function of the objects
//! and the formatter's reference time, so repeated calls on unchanged state
//! produce identical output.

mod describe;
mod logs;
mod table;

pub use logs::{truncate_lines, LogStream, LogStreamSettings};

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::cluster::{ClusterObject, ResourceKind};
use crate::types::Result;

/// Result payload of a successful tool call.
pub enum ToolOutput {
    Text(String),
    Json(Value),
    /// Lazy follow-mode log lines.
    Stream(LogStream),
}

impl ToolOutput {
    pub fn text(s: impl Into<String>) -> Self {
        ToolOutput::Text(s.into())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ToolOutput::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            ToolOutput::Json(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_stream(&self) -> bool {
        matches!(self, ToolOutput::Stream(_))
    }

    /// Text form of a non-stream output. JSON is pretty-printed.
    pub fn render(&self) -> Result<Option<String>> {
        match self {
            ToolOutput::Text(s) => Ok(Some(s.clone())),
            ToolOutput::Json(v) => Ok(Some(serde_json::to_string_pretty(v)?)),
            ToolOutput::Stream(_) => Ok(None),
        }
    }
}

impl fmt::Debug for ToolOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolOutput::Text(s) => f.debug_tuple("Text").field(s).finish(),
            ToolOutput::Json(v) => f.debug_tuple("Json").field(v).finish(),
            ToolOutput::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

// =============================================================================
// Formats
// =============================================================================

/// Output mode of get-style tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListFormat {
    #[default]
    Table,
    Wide,
    Json,
    Yaml,
    Name,
}

impl ListFormat {
    pub const VALUES: &'static [&'static str] = &["table", "wide", "json", "yaml", "name"];
}

impl FromStr for ListFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "table" => Ok(ListFormat::Table),
            "wide" => Ok(ListFormat::Wide),
            "json" => Ok(ListFormat::Json),
            "yaml" => Ok(ListFormat::Yaml),
            "name" => Ok(ListFormat::Name),
            other => Err(format!(
                "invalid value '{}', expected one of: {}",
                other,
                Self::VALUES.join(", ")
            )),
        }
    }
}

/// Output mode of describe-style tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DetailFormat {
    #[default]
    Text,
    Json,
    Yaml,
}

impl DetailFormat {
    pub const VALUES: &'static [&'static str] = &["text", "json", "yaml"];
}

impl FromStr for DetailFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "text" => Ok(DetailFormat::Text),
            "json" => Ok(DetailFormat::Json),
            "yaml" => Ok(DetailFormat::Yaml),
            other => Err(format!(
                "invalid value '{}', expected one of: {}",
                other,
                Self::VALUES.join(", ")
            )),
        }
    }
}

// =============================================================================
// Formatter
// =============================================================================

/// Renders cluster objects relative to a fixed reference time.
#[derive(Debug, Clone, Copy)]
pub struct Formatter {
    now: DateTime<Utc>,
}

impl Formatter {
    /// Formatter whose AGE columns are computed against `now`.
    pub fn at(now: DateTime<Utc>) -> Self {
        Self { now }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// Render a list of objects of one kind.
    ///
    /// `namespace` is the namespace the list was scoped to; `None` on a
    /// namespaced kind means the list spans all namespaces.
    pub fn list(
        &self,
        kind: ResourceKind,
        objects: &[ClusterObject],
        format: ListFormat,
        namespace: Option<&str>,
    ) -> Result<ToolOutput> {
        match format {
            ListFormat::Json => {
                let items = objects
                    .iter()
                    .map(ClusterObject::to_value)
                    .collect::<Result<Vec<_>>>()?;
                Ok(ToolOutput::Json(Value::Array(items)))
            }
            ListFormat::Yaml => Ok(ToolOutput::Text(to_yaml_documents(objects)?)),
            ListFormat::Name => Ok(ToolOutput::Text(
                objects
                    .iter()
                    .map(ClusterObject::qualified_name)
                    .collect::<Vec<_>>()
                    .join("\n"),
            )),
            ListFormat::Table | ListFormat::Wide => {
                if objects.is_empty() {
                    return Ok(ToolOutput::Text(no_resources(kind, namespace)));
                }
                let all_namespaces = kind.is_namespaced() && namespace.is_none();
                let wide = format == ListFormat::Wide;
                Ok(ToolOutput::Text(table::render(
                    kind,
                    objects,
                    wide,
                    all_namespaces,
                    self.now,
                )))
            }
        }
    }

    /// Render one object.
    pub fn detail(&self, object: &ClusterObject, format: DetailFormat) -> Result<ToolOutput> {
        match format {
            DetailFormat::Json => Ok(ToolOutput::Json(object.to_value()?)),
            DetailFormat::Yaml => Ok(ToolOutput::Text(to_yaml(&object.to_value()?)?)),
            DetailFormat::Text => Ok(ToolOutput::Text(describe::render(object, self.now))),
        }
    }
}

fn no_resources(kind: ResourceKind, namespace: Option<&str>) -> String {
    match namespace {
        Some(ns) if kind.is_namespaced() => format!("No resources found in {} namespace.", ns),
        _ => "No resources found.".to_string(),
    }
}

fn to_yaml(value: &Value) -> Result<String> {
    serde_yaml::to_string(value)
        .map_err(|e| crate::types::Error::internal(format!("yaml encoding failed: {}", e)))
}

fn to_yaml_documents(objects: &[ClusterObject]) -> Result<String> {
    let docs = objects
        .iter()
        .map(|o| o.to_value().and_then(|v| to_yaml(&v)))
        .collect::<Result<Vec<_>>>()?;
    Ok(docs.join("---\n"))
}

/// kubectl-style relative age: `45s`, `3m12s`, `5h`, `12d`, `2y30d`.
pub fn human_age(created: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let Some(created) = created else {
        return "<unknown>".to_string();
    };
    let secs = (now - created).num_seconds();
    if secs < -1 {
        return "<invalid>".to_string();
    }
    let secs = secs.max(0);
    let minutes = secs / 60;
    let hours = secs / 3600;
    let days = hours / 24;
    let years = days / 365;

    if secs < 120 {
        format!("{}s", secs)
    } else if minutes < 10 {
        let s = secs % 60;
        if s == 0 {
            format!("{}m", minutes)
        } else {
            format!("{}m{}s", minutes, s)
        }
    } else if minutes < 180 {
        format!("{}m", minutes)
    } else if hours < 8 {
        let m = minutes % 60;
        if m == 0 {
            format!("{}h", hours)
        } else {
            format!("{}h{}m", hours, m)
        }
    } else if hours < 48 {
        format!("{}h", hours)
    } else if hours < 24 * 8 {
        let h = hours % 24;
        if h == 0 {
            format!("{}d", days)
        } else {
            format!("{}d{}h", days, h)
        }
    } else if days < 365 * 2 {
        format!("{}d", days)
    } else if days < 365 * 8 {
        let d = days % 365;
        if d == 0 {
            format!("{}y", years)
        } else {
            format!("{}y{}d", years, d)
        }
    } else {
        format!("{}y", years)
    }
}
