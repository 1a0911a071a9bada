//! Tasks and the types they exchange.
//!
//! A [`Task`] is a unit of computation with a fixed list of input ports and a
//! fixed list of output ports. Tasks themselves are stateless; bindings,
//! evaluation state and the output cache live in the
//! [`Pipeline`](crate::Pipeline) a task instance is added to.

mod handle;
mod operator;
mod script;
mod source;

use std::collections::BTreeMap;

pub use crate::engine::handle::{OutputRef, TaskHandle};
pub use crate::engine::operator::{Fork, Operation, Operator};
pub use crate::engine::script::{ScriptDefinition, ScriptTask};
pub(crate) use crate::engine::source::Source;

use crate::core::TaskContext;
use crate::error::{ConversionError, TaskError};
use crate::port::PortList;
use crate::value::Shared;

/// Values produced by one run of a task, keyed by output port name.
pub type Outputs = BTreeMap<String, Shared>;

/// The core trait for all tasks in a pipeline.
///
/// The pipeline calls [`Task::run`] at most once per evaluation, after every
/// declared input port has been resolved, and caches the returned outputs.
/// Every declared output port must be present in the result.
pub trait Task: Send + Sync {
    fn get_name(&self) -> String;

    fn inputs(&self) -> &PortList;

    fn outputs(&self) -> &PortList;

    fn run(&self, context: &TaskContext, inputs: &Inputs) -> Result<Outputs, TaskError>;
}

/// The formats data can be declared in, and how to move between them.
///
/// Implemented by [`ConversionGraph`](crate::ConversionGraph). Script tasks
/// consult it for input ports declared with `validate` and for inputs bound
/// with [`Binding::Formatted`](crate::Binding::Formatted).
pub trait FormatRegistry: Send + Sync {
    /// Whether `value` conforms to `kind.format`.
    fn validate(&self, kind: &str, format: &str, value: &Shared) -> Result<bool, ConversionError>;

    fn contains(&self, kind: &str, format: &str) -> bool;

    /// Converts `value` from `kind.from` to `kind.to`.
    fn convert(&self, kind: &str, value: Shared, from: &str, to: &str) -> Result<Shared, ConversionError>;
}

/// The resolved input values of a task, in port order.
#[derive(Debug, Clone, Default)]
pub struct Inputs {
    values: Vec<(String, Shared)>,
    formats: BTreeMap<String, String>,
}

impl Inputs {
    pub(crate) fn new(values: Vec<(String, Shared)>) -> Self {
        Self {
            values,
            formats: BTreeMap::new(),
        }
    }

    /// Records the formats of inputs whose binding declared one.
    pub(crate) fn with_formats(mut self, formats: BTreeMap<String, String>) -> Self {
        self.formats = formats;
        self
    }

    pub fn get(&self, name: &str) -> Option<&Shared> {
        self.values
            .iter()
            .find(|(port, _)| port == name)
            .map(|(_, value)| value)
    }

    /// Like [`Inputs::get`], failing for ports without data.
    pub fn require(&self, name: &str) -> Result<&Shared, TaskError> {
        self.get(name)
            .ok_or_else(|| TaskError::MissingInput(name.to_string()))
    }

    /// Values of the ports named `"0"`, `"1"`, ... in ascending order,
    /// stopping at the first index without data.
    pub fn positional(&self) -> Vec<&Shared> {
        (0..)
            .map_while(|i: usize| self.get(&i.to_string()))
            .collect()
    }

    /// The format the value of `name` was bound in, if the binding said.
    pub fn format(&self, name: &str) -> Option<&str> {
        self.formats.get(name).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Shared)> {
        self.values.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
