//! Port declarations.
//!
//! A [`Port`] names one slot of input or output data on a task and describes
//! its shape with a semantic `type` (for example `"geo"` or `"number"`) and a
//! concrete `format` (for example `"GeoJSON"`). Ports are purely descriptive:
//! they are built once, with the builder methods below, and never change
//! afterwards.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::DuplicatePort;

/// The tag used for ports that accept anything.
pub const UNCONSTRAINED: &str = "object";

fn unconstrained() -> String {
    UNCONSTRAINED.to_string()
}

/// Which side of a task a port belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Input,
    Output,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Input => write!(f, "input"),
            Side::Output => write!(f, "output"),
        }
    }
}

/// A named, typed slot for one unit of task data.
///
/// Serialized as `{"name": .., "type": .., "format": .., "validate": ..}`
/// with any additional attributes flattened alongside.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Port {
    name: String,
    #[serde(rename = "type", default = "unconstrained")]
    kind: String,
    #[serde(default = "unconstrained")]
    format: String,
    #[serde(default)]
    validate: bool,
    #[serde(flatten)]
    extra: BTreeMap<String, serde_json::Value>,
}

impl Port {
    /// Creates an unconstrained, unvalidated port.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: unconstrained(),
            format: unconstrained(),
            validate: false,
            extra: BTreeMap::new(),
        }
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = format.into();
        self
    }

    pub fn with_validate(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    /// Applies a named attribute. The keys `type`, `format` and `validate`
    /// set the corresponding fields, `name` is ignored, and anything else is
    /// kept as an extra attribute.
    pub fn with_attribute(mut self, key: &str, value: serde_json::Value) -> Self {
        fn text(value: serde_json::Value) -> String {
            match value {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            }
        }

        match key {
            "name" => {}
            "type" => self.kind = text(value),
            "format" => self.format = text(value),
            "validate" => self.validate = value.as_bool().unwrap_or(false),
            _ => {
                self.extra.insert(key.to_string(), value);
            }
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The semantic type tag, serialized as `type`.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn format(&self) -> &str {
        &self.format
    }

    /// Whether data bound to this port is checked against its format.
    pub fn validate(&self) -> bool {
        self.validate
    }

    pub fn attribute(&self, key: &str) -> Option<&serde_json::Value> {
        self.extra.get(key)
    }

    pub fn attributes(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.extra
    }
}

/// An ordered list of ports with unique names.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Port>", into = "Vec<Port>")]
pub struct PortList(Vec<Port>);

impl PortList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ports named `"0"`, `"1"`, ... used by operators and forks.
    pub fn positional(count: usize) -> Self {
        Self((0..count).map(|i| Port::new(i.to_string())).collect())
    }

    /// Appends a port, refusing duplicate names.
    pub fn push(&mut self, port: Port) -> Result<(), DuplicatePort> {
        if self.contains(port.name()) {
            return Err(DuplicatePort(port.name().to_string()));
        }
        self.0.push(port);
        Ok(())
    }

    /// Appends a port, replacing any earlier port of the same name. The
    /// replacement takes the position of the new declaration.
    pub(crate) fn replace_last(&mut self, port: Port) {
        self.0.retain(|p| p.name() != port.name());
        self.0.push(port);
    }

    pub fn get(&self, name: &str) -> Option<&Port> {
        self.0.iter().find(|p| p.name() == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Port> {
        self.0.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(Port::name)
    }

    pub fn first(&self) -> Option<&Port> {
        self.0.first()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl TryFrom<Vec<Port>> for PortList {
    type Error = DuplicatePort;

    fn try_from(ports: Vec<Port>) -> Result<Self, Self::Error> {
        let mut list = PortList::new();
        for port in ports {
            list.push(port)?;
        }
        Ok(list)
    }
}

impl From<PortList> for Vec<Port> {
    fn from(list: PortList) -> Self {
        list.0
    }
}

impl<'a> IntoIterator for &'a PortList {
    type Item = &'a Port;
    type IntoIter = std::slice::Iter<'a, Port>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_json() {
        let port: Port =
            serde_json::from_str(r#"{"name": "a", "type": "number", "format": "json"}"#).unwrap();
        assert_eq!(port.name(), "a");
        assert_eq!(port.kind(), "number");
        assert_eq!(port.format(), "json");
        assert!(!port.validate());

        let port: Port = serde_json::from_str(r#"{"name": "b", "path": "x.shp"}"#).unwrap();
        assert_eq!(port.kind(), UNCONSTRAINED);
        assert_eq!(port.attribute("path"), Some(&serde_json::json!("x.shp")));

        let json = serde_json::to_value(&port).unwrap();
        assert_eq!(json["type"], "object");
        assert_eq!(json["path"], "x.shp");
    }

    #[test]
    fn test_attributes() {
        let port = Port::new("x")
            .with_attribute("format", serde_json::json!("GeoJSON"))
            .with_attribute("validate", serde_json::json!(true))
            .with_attribute("driver", serde_json::json!("fiona"));
        assert_eq!(port.format(), "GeoJSON");
        assert!(port.validate());
        assert_eq!(port.attributes().len(), 1);
    }

    #[test]
    fn test_unique_names() {
        let mut list = PortList::new();
        list.push(Port::new("z")).unwrap();
        assert_eq!(list.push(Port::new("z")), Err(DuplicatePort("z".into())));

        let parsed: Result<PortList, _> =
            serde_json::from_str(r#"[{"name": "a"}, {"name": "a"}]"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_replace_last_reanchors() {
        let mut list = PortList::new();
        list.replace_last(Port::new("a").with_format("A"));
        list.replace_last(Port::new("b"));
        list.replace_last(Port::new("a").with_format("B"));

        assert_eq!(list.names().collect::<Vec<_>>(), ["b", "a"]);
        assert_eq!(list.get("a").unwrap().format(), "B");
    }
}
