use petgraph::graph::NodeIndex;

/// A reference to a task instance in a [`Pipeline`](crate::Pipeline).
///
/// A `TaskHandle` is a lightweight, copyable token returned when a task is
/// added. It is only meaningful for the pipeline that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskHandle(pub(crate) NodeIndex);

impl TaskHandle {
    /// Returns the underlying `NodeIndex` of the task in the graph.
    pub fn index(&self) -> NodeIndex {
        self.0
    }

    /// A reference to one of this task's output ports, usable as an input
    /// binding for a downstream task.
    pub fn output(self, port: impl Into<String>) -> OutputRef {
        OutputRef {
            task: self,
            port: port.into(),
        }
    }
}

/// An upstream `(task, output port)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OutputRef {
    pub task: TaskHandle,
    pub port: String,
}

impl From<TaskHandle> for OutputRef {
    /// The first output port, `"0"`, which is where operators, forks and
    /// sources put their results.
    fn from(task: TaskHandle) -> Self {
        task.output("0")
    }
}
