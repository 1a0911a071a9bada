use std::collections::BTreeMap;
use std::sync::Arc;

use petgraph::Direction;
use petgraph::Graph;
use petgraph::graph::NodeIndex;
use petgraph::visit::{Dfs, EdgeRef};

use crate::core::TaskContext;
use crate::engine::{Inputs, OutputRef, Outputs, Source, Task, TaskHandle};
use crate::error::{PipelineError, TaskError};
use crate::port::Side;
use crate::value::{Shared, Value};

/// What an input port of a task instance is bound to.
#[derive(Debug, Clone)]
pub enum Binding {
    /// A literal value.
    Data(Shared),
    /// An output port of an upstream task.
    Upstream(OutputRef),
    /// A literal value in a known format, converted to the format of the
    /// port it is bound to before the task runs.
    Formatted { format: String, value: Shared },
}

impl Binding {
    pub fn formatted(format: impl Into<String>, value: impl Into<Shared>) -> Self {
        Binding::Formatted {
            format: format.into(),
            value: value.into(),
        }
    }
}

impl From<Value> for Binding {
    fn from(value: Value) -> Self {
        Binding::Data(Arc::new(value))
    }
}

impl From<Shared> for Binding {
    fn from(value: Shared) -> Self {
        Binding::Data(value)
    }
}

impl From<OutputRef> for Binding {
    fn from(output: OutputRef) -> Self {
        Binding::Upstream(output)
    }
}

impl From<TaskHandle> for Binding {
    fn from(task: TaskHandle) -> Self {
        Binding::Upstream(task.into())
    }
}

enum NodeState {
    Unevaluated,
    Evaluating,
    Evaluated(Outputs),
}

struct Node {
    task: Arc<dyn Task>,
    bindings: BTreeMap<String, Binding>,
    state: NodeState,
}

/// Connects an upstream output port to a downstream input port.
struct Wire {
    output: String,
    input: String,
}

/// A graph of task instances.
///
/// The pipeline owns, for each task instance, its input bindings, its
/// evaluation state and its output cache. Evaluation is lazy: reading an
/// output runs the task if needed, which first pulls every upstream task it
/// is bound to. A task runs at most once until it is invalidated.
///
/// # Example
///
/// ```rust
/// use pipewright::{Operator, Pipeline, Value};
///
/// let mut pipeline = Pipeline::new();
/// let add = pipeline.add(Operator::add());
/// pipeline.set_inputs(add, [Value::Int(2), Value::Int(3)]).unwrap();
///
/// let sum = pipeline.output_data(add, "0").unwrap();
/// assert_eq!(*sum, Value::Int(5));
/// ```
pub struct Pipeline {
    graph: Graph<Node, Wire>,
}

impl Pipeline {
    /// Creates a new, empty pipeline.
    pub fn new() -> Self {
        Self {
            graph: Graph::new(),
        }
    }

    /// Adds a task instance with all inputs unbound.
    pub fn add(&mut self, task: impl Task + 'static) -> TaskHandle {
        self.add_shared(Arc::new(task))
    }

    pub fn add_shared(&mut self, task: Arc<dyn Task>) -> TaskHandle {
        let index = self.graph.add_node(Node {
            task,
            bindings: BTreeMap::new(),
            state: NodeState::Unevaluated,
        });
        TaskHandle(index)
    }

    /// Adds a task emitting `value` on its output `"0"`.
    pub fn source(&mut self, value: impl Into<Shared>) -> TaskHandle {
        self.add(Source::new(value.into()))
    }

    /// Number of task instances.
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn task(&self, task: TaskHandle) -> Result<&dyn Task, PipelineError> {
        Ok(self.node(task)?.task.as_ref())
    }

    fn node(&self, task: TaskHandle) -> Result<&Node, PipelineError> {
        self.graph
            .node_weight(task.0)
            .ok_or(PipelineError::UnknownTask(task.0.index()))
    }

    fn check_port(&self, task: TaskHandle, side: Side, port: &str) -> Result<(), PipelineError> {
        let node = self.node(task)?;
        let ports = match side {
            Side::Input => node.task.inputs(),
            Side::Output => node.task.outputs(),
        };

        if ports.contains(port) {
            Ok(())
        } else {
            Err(PipelineError::UnknownPort {
                task: node.task.get_name(),
                side,
                port: port.to_string(),
            })
        }
    }

    /// Binds an input port of `task` to a value or an upstream output. Any
    /// previous binding of the port is replaced, and `task` together with
    /// everything downstream of it is invalidated.
    pub fn set_input(
        &mut self,
        task: TaskHandle,
        port: &str,
        binding: impl Into<Binding>,
    ) -> Result<(), PipelineError> {
        let binding = binding.into();
        self.check_port(task, Side::Input, port)?;

        if let Binding::Upstream(upstream) = &binding {
            self.check_port(upstream.task, Side::Output, &upstream.port)?;
        }

        let mut stale: Vec<_> = self
            .graph
            .edges_directed(task.0, Direction::Incoming)
            .filter(|edge| edge.weight().input == port)
            .map(|edge| edge.id())
            .collect();
        stale.sort_unstable_by(|a, b| b.cmp(a));
        for edge in stale {
            self.graph.remove_edge(edge);
        }

        if let Binding::Upstream(upstream) = &binding {
            self.graph.add_edge(
                upstream.task.0,
                task.0,
                Wire {
                    output: upstream.port.clone(),
                    input: port.to_string(),
                },
            );
        }

        self.graph[task.0].bindings.insert(port.to_string(), binding);
        self.invalidate(task)
    }

    /// Binds the positional ports `"0"`, `"1"`, ... in order.
    pub fn set_inputs<I>(&mut self, task: TaskHandle, bindings: I) -> Result<(), PipelineError>
    where
        I: IntoIterator,
        I::Item: Into<Binding>,
    {
        for (i, binding) in bindings.into_iter().enumerate() {
            self.set_input(task, &i.to_string(), binding)?;
        }
        Ok(())
    }

    /// Marks `task` and every task downstream of it as unevaluated, dropping
    /// their cached outputs.
    pub fn invalidate(&mut self, task: TaskHandle) -> Result<(), PipelineError> {
        self.node(task)?;

        let mut dfs = Dfs::new(&self.graph, task.0);
        while let Some(index) = dfs.next(&self.graph) {
            let node = &mut self.graph[index];
            if matches!(node.state, NodeState::Evaluated(_)) {
                tracing::debug!(task = %node.task.get_name(), "invalidated");
            }
            node.state = NodeState::Unevaluated;
        }

        Ok(())
    }

    pub fn is_evaluated(&self, task: TaskHandle) -> bool {
        self.graph
            .node_weight(task.0)
            .is_some_and(|node| matches!(node.state, NodeState::Evaluated(_)))
    }

    /// Runs `task`, pulling upstream tasks first. Running an already
    /// evaluated task does nothing.
    pub fn run(&mut self, task: TaskHandle) -> Result<(), PipelineError> {
        self.node(task)?;
        self.evaluate(task.0)
    }

    /// Reads an output of `task`, running it first if its outputs are not
    /// cached.
    pub fn output_data(&mut self, task: TaskHandle, port: &str) -> Result<Shared, PipelineError> {
        self.check_port(task, Side::Output, port)?;
        self.pull(&task.output(port))
    }

    /// Reads the value bound to an input of `task`, pulling it from upstream
    /// if needed.
    pub fn input_data(&mut self, task: TaskHandle, port: &str) -> Result<Shared, PipelineError> {
        self.check_port(task, Side::Input, port)?;
        Ok(self.resolve(task.0, port)?.0)
    }

    /// The value bound to `port`, with its format when the binding gave one.
    fn resolve(&mut self, index: NodeIndex, port: &str) -> Result<(Shared, Option<String>), PipelineError> {
        let node = &self.graph[index];
        match node.bindings.get(port) {
            Some(Binding::Data(value)) => Ok((value.clone(), None)),
            Some(Binding::Formatted { format, value }) => Ok((value.clone(), Some(format.clone()))),
            Some(Binding::Upstream(upstream)) => {
                let upstream = upstream.clone();
                Ok((self.pull(&upstream)?, None))
            }
            None => Err(PipelineError::UnconnectedInput {
                task: node.task.get_name(),
                port: port.to_string(),
            }),
        }
    }

    fn pull(&mut self, output: &OutputRef) -> Result<Shared, PipelineError> {
        self.evaluate(output.task.0)?;

        let node = &self.graph[output.task.0];
        let cached = match &node.state {
            NodeState::Evaluated(outputs) => outputs.get(&output.port).cloned(),
            _ => None,
        };

        cached.ok_or_else(|| PipelineError::UnknownPort {
            task: node.task.get_name(),
            side: Side::Output,
            port: output.port.clone(),
        })
    }

    fn evaluate(&mut self, index: NodeIndex) -> Result<(), PipelineError> {
        let node = &self.graph[index];
        match node.state {
            NodeState::Evaluated(_) => {
                tracing::trace!(task = %node.task.get_name(), "cache hit");
                return Ok(());
            }
            NodeState::Evaluating => {
                return Err(PipelineError::CyclicDependency(node.task.get_name()));
            }
            NodeState::Unevaluated => {}
        }

        self.graph[index].state = NodeState::Evaluating;

        match self.compute(index) {
            Ok(outputs) => {
                self.graph[index].state = NodeState::Evaluated(outputs);
                Ok(())
            }
            Err(error) => {
                self.graph[index].state = NodeState::Unevaluated;
                Err(error)
            }
        }
    }

    fn compute(&mut self, index: NodeIndex) -> Result<Outputs, PipelineError> {
        let task = self.graph[index].task.clone();

        let mut values = Vec::with_capacity(task.inputs().len());
        let mut formats = BTreeMap::new();
        for port in task.inputs() {
            let (value, format) = self.resolve(index, port.name())?;
            if let Some(format) = format {
                formats.insert(port.name().to_string(), format);
            }
            values.push((port.name().to_string(), value));
        }

        let name = task.get_name();
        let context = TaskContext::new(&name);
        let _enter = context.span.enter();

        let failed = |error: TaskError| PipelineError::Task {
            task: name.clone(),
            error,
        };

        let inputs = Inputs::new(values).with_formats(formats);
        let outputs = task.run(&context, &inputs).map_err(failed)?;

        if let Some(port) = task.outputs().names().find(|port| !outputs.contains_key(*port)) {
            return Err(failed(TaskError::UnboundOutput(port.to_string())));
        }

        tracing::debug!("evaluated");
        Ok(outputs)
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "graph LR")?;

        for index in self.graph.node_indices() {
            let name = self.graph[index].task.get_name().replace('"', "\\\"");
            writeln!(f, "    {:?}[\"{}\"]", index.index(), name)?;
        }

        for edge in self.graph.edge_references() {
            let wire = edge.weight();
            writeln!(
                f,
                "    {:?} -- \"{} → {}\" --> {:?}",
                edge.source().index(),
                wire.output,
                wire.input,
                edge.target().index()
            )?;
        }

        Ok(())
    }
}
