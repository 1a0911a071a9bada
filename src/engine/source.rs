use crate::core::TaskContext;
use crate::engine::{Inputs, Outputs, Task};
use crate::error::TaskError;
use crate::port::PortList;
use crate::value::Shared;

/// A task without inputs emitting a constant on output `"0"`.
pub(crate) struct Source {
    value: Shared,
    outputs: PortList,
    inputs: PortList,
}

impl Source {
    pub(crate) fn new(value: Shared) -> Self {
        Self {
            value,
            outputs: PortList::positional(1),
            inputs: PortList::new(),
        }
    }
}

impl Task for Source {
    fn get_name(&self) -> String {
        format!("Source({})", self.value.type_name())
    }

    fn inputs(&self) -> &PortList {
        &self.inputs
    }

    fn outputs(&self) -> &PortList {
        &self.outputs
    }

    fn run(&self, _: &TaskContext, _: &Inputs) -> Result<Outputs, TaskError> {
        Ok(Outputs::from([("0".to_string(), self.value.clone())]))
    }
}
