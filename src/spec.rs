//! Declarative task specifications.

use serde::{Deserialize, Serialize};

use crate::core::Hash32;
use crate::port::PortList;

/// The only execution mode tasks can be built with.
pub const SCRIPT_MODE: &str = "script";

fn script_mode() -> String {
    SCRIPT_MODE.to_string()
}

/// A hand-written or extracted description of a script task: its name, its
/// port signature and the script computing the outputs from the inputs.
///
/// ```json
/// {
///   "name": "sum",
///   "mode": "script",
///   "inputs": [{"name": "a"}, {"name": "b"}],
///   "outputs": [{"name": "c"}],
///   "script": "c = a + b"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Specification {
    #[serde(default)]
    pub name: String,
    #[serde(default = "script_mode")]
    pub mode: String,
    #[serde(default)]
    pub inputs: PortList,
    #[serde(default)]
    pub outputs: PortList,
    pub script: String,
}

impl Specification {
    pub fn new(name: impl Into<String>, script: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mode: script_mode(),
            inputs: PortList::new(),
            outputs: PortList::new(),
            script: script.into(),
        }
    }

    pub fn with_inputs(mut self, inputs: PortList) -> Self {
        self.inputs = inputs;
        self
    }

    pub fn with_outputs(mut self, outputs: PortList) -> Self {
        self.outputs = outputs;
        self
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Content digest over the canonical JSON form. The task name takes part
    /// in it, so identically scripted tasks with different names differ.
    pub fn digest(&self) -> Hash32 {
        // Fields serialize in declaration order and extra attributes sorted.
        match serde_json::to_vec(self) {
            Ok(bytes) => Hash32::hash(bytes),
            Err(_) => Hash32::hash(self.script.as_bytes()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::Port;

    #[test]
    fn test_from_json() {
        let spec = Specification::from_json(
            r#"{
                "name": "sum",
                "inputs": [{"name": "a"}, {"name": "b", "type": "number"}],
                "outputs": [{"name": "c"}],
                "script": "c = a + b"
            }"#,
        )
        .unwrap();

        assert_eq!(spec.mode, SCRIPT_MODE);
        assert_eq!(spec.inputs.names().collect::<Vec<_>>(), ["a", "b"]);
        assert_eq!(spec.inputs.get("b").unwrap().kind(), "number");
        assert_eq!(spec.outputs.len(), 1);
    }

    #[test]
    fn test_duplicate_ports_are_rejected() {
        let spec = Specification::from_json(
            r#"{"inputs": [{"name": "a"}, {"name": "a"}], "script": ""}"#,
        );
        assert!(spec.is_err());
    }

    #[test]
    fn test_digest() {
        let a = Specification::new("x", "y = 1")
            .with_outputs(PortList::try_from(vec![Port::new("y")]).unwrap());
        let b = Specification::from_json(&a.to_json().unwrap()).unwrap();
        assert_eq!(a.digest(), b.digest());

        let c = Specification::new("x", "y = 2")
            .with_outputs(PortList::try_from(vec![Port::new("y")]).unwrap());
        assert_ne!(a.digest(), c.digest());
    }
}
