//! Capability bundle: the name → URL map a region hands out when a seed
//! capability is queried.

use serde_json::{Map, Value};

/// Structured map of capability name → URL.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CapabilityBundle(pub Map<String, Value>);

impl CapabilityBundle {
    pub fn from_value(v: Value) -> Option<Self> {
        match v {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    pub fn url(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Replace a capability URL in place.
    pub fn set_url(&mut self, name: &str, url: impl Into<String>) {
        self.0.insert(name.to_string(), Value::String(url.into()));
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}
