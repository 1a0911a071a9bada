use std::fmt;
use std::sync::Arc;

use crate::engine::{FormatRegistry, ScriptDefinition};
use crate::error::FactoryError;
use crate::port::UNCONSTRAINED;
use crate::script::{Script, Vocabulary};
use crate::spec::{SCRIPT_MODE, Specification};

/// Builds reusable task definitions out of [`Specification`]s.
///
/// ```rust
/// use pipewright::{Pipeline, Specification, TaskFactory, Value};
///
/// let spec = Specification::from_json(r#"{
///     "name": "sum",
///     "inputs": [{"name": "a"}, {"name": "b"}],
///     "outputs": [{"name": "c"}],
///     "script": "c = a + b"
/// }"#).unwrap();
///
/// let sum = TaskFactory::new().build(&spec).unwrap();
///
/// let mut pipeline = Pipeline::new();
/// let task = pipeline.add(sum.instantiate());
/// pipeline.set_input(task, "a", Value::Int(1)).unwrap();
/// pipeline.set_input(task, "b", Value::Int(2)).unwrap();
/// assert_eq!(*pipeline.output_data(task, "c").unwrap(), Value::Int(3));
/// ```
#[derive(Clone, Default)]
pub struct TaskFactory {
    vocabulary: Vocabulary,
    registry: Option<Arc<dyn FormatRegistry>>,
    check_formats: bool,
}

impl TaskFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the type wrappers scripts may call.
    pub fn with_vocabulary(mut self, vocabulary: Vocabulary) -> Self {
        self.vocabulary = vocabulary;
        self
    }

    /// Enables checking of inputs declared with `validate` and conversion of
    /// inputs bound in another format than their port's.
    pub fn with_registry(mut self, registry: Arc<dyn FormatRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Makes [`TaskFactory::build`] reject ports whose format is not
    /// [`UNCONSTRAINED`] and not known to the registry.
    pub fn with_format_check(mut self, enabled: bool) -> Self {
        self.check_formats = enabled;
        self
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    /// Parses the script eagerly, so syntax errors surface here rather than
    /// on the first run.
    pub fn build(&self, spec: &Specification) -> Result<ScriptDefinition, FactoryError> {
        if spec.mode != SCRIPT_MODE {
            return Err(FactoryError::UnsupportedMode(spec.mode.clone()));
        }

        let script = Script::parse(spec.script.as_str()).map_err(|error| FactoryError::Syntax {
            task: spec.name.clone(),
            error,
        })?;

        if self.check_formats {
            self.check_port_formats(spec)?;
        }

        tracing::debug!(task = %spec.name, inputs = spec.inputs.len(), outputs = spec.outputs.len(), "built script task");

        Ok(ScriptDefinition::new(
            spec.name.clone(),
            spec.inputs.clone(),
            spec.outputs.clone(),
            script,
            spec.digest(),
            self.vocabulary.clone(),
            self.registry.clone(),
        ))
    }

    fn check_port_formats(&self, spec: &Specification) -> Result<(), FactoryError> {
        let known = |kind: &str, format: &str| {
            self.registry
                .as_ref()
                .is_some_and(|registry| registry.contains(kind, format))
        };

        let unknown = spec
            .inputs
            .iter()
            .chain(spec.outputs.iter())
            .find(|port| port.format() != UNCONSTRAINED && !known(port.kind(), port.format()));

        match unknown {
            Some(port) => Err(FactoryError::UnknownFormat {
                task: spec.name.clone(),
                port: port.name().to_string(),
                kind: port.kind().to_string(),
                format: port.format().to_string(),
            }),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for TaskFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskFactory")
            .field("vocabulary", &self.vocabulary)
            .field("registry", &self.registry.is_some())
            .field("check_formats", &self.check_formats)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::ConversionGraph;
    use crate::engine::Operator;
    use crate::error::{ConversionError, PipelineError, ScriptError, TaskError};
    use crate::pipeline::{Binding, Pipeline};
    use crate::port::{Port, PortList};
    use crate::value::{Shared, Value};

    fn sum() -> Specification {
        Specification::from_json(
            r#"{
                "name": "sum",
                "mode": "script",
                "inputs": [{"name": "a"}, {"name": "b"}],
                "outputs": [{"name": "c"}],
                "script": "c = a + b"
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_scripted_sums_feed_an_operator() {
        let definition = TaskFactory::new().build(&sum()).unwrap();
        let mut pipeline = Pipeline::new();

        let left = pipeline.add(definition.instantiate());
        pipeline.set_input(left, "a", Value::Int(1)).unwrap();
        pipeline.set_input(left, "b", Value::Int(2)).unwrap();

        let right = pipeline.add(definition.instantiate());
        pipeline.set_input(right, "a", Value::Int(3)).unwrap();
        pipeline.set_input(right, "b", Value::Int(4)).unwrap();

        let product = pipeline.add(Operator::multiply());
        pipeline
            .set_inputs(product, [left.output("c"), right.output("c")])
            .unwrap();

        assert_eq!(*pipeline.output_data(product, "0").unwrap(), Value::Int(21));
        assert_eq!(*pipeline.output_data(left, "c").unwrap(), Value::Int(3));
    }

    #[test]
    fn test_unsupported_mode() {
        let mut spec = sum();
        spec.mode = "python".into();
        assert_eq!(
            TaskFactory::new().build(&spec).unwrap_err(),
            FactoryError::UnsupportedMode("python".into())
        );
    }

    #[test]
    fn test_syntax_error_at_build_time() {
        let spec = Specification::new("broken", "c = (a +");
        assert!(matches!(
            TaskFactory::new().build(&spec),
            Err(FactoryError::Syntax { task, .. }) if task == "broken"
        ));
    }

    #[test]
    fn test_unbound_output() {
        let spec = sum().with_outputs(PortList::try_from(vec![Port::new("d")]).unwrap());
        let mut pipeline = Pipeline::new();
        let task = pipeline.add(TaskFactory::new().build(&spec).unwrap().instantiate());
        pipeline.set_input(task, "a", Value::Int(1)).unwrap();
        pipeline.set_input(task, "b", Value::Int(1)).unwrap();

        let err = pipeline.output_data(task, "d").unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Task { error: TaskError::UnboundOutput(port), .. } if port == "d"
        ));
    }

    #[test]
    fn test_runtime_error_lists_script() {
        let spec = Specification::new("half", "x = a\ny = x / 0")
            .with_inputs(PortList::try_from(vec![Port::new("a")]).unwrap())
            .with_outputs(PortList::try_from(vec![Port::new("y")]).unwrap());
        let mut pipeline = Pipeline::new();
        let task = pipeline.add(TaskFactory::new().build(&spec).unwrap().instantiate());
        pipeline.set_input(task, "a", Value::Int(1)).unwrap();

        let err = pipeline.run(task).unwrap_err();
        let PipelineError::Task {
            task,
            error: TaskError::Script { error, listing },
        } = err
        else {
            panic!("expected a script failure");
        };

        assert_eq!(task, "half");
        assert!(matches!(error, ScriptError::Value { line: 2, .. }));
        assert_eq!(listing, "1 | x = a\n2 | y = x / 0");
    }

    /// Accepts only integers, whatever the declared format.
    struct IntegersOnly;

    impl FormatRegistry for IntegersOnly {
        fn validate(&self, _: &str, _: &str, value: &Shared) -> Result<bool, ConversionError> {
            Ok(matches!(**value, Value::Int(_)))
        }

        fn contains(&self, _: &str, _: &str) -> bool {
            true
        }

        fn convert(&self, kind: &str, _: Shared, from: &str, to: &str) -> Result<Shared, ConversionError> {
            Err(ConversionError::NoConversionPath {
                kind: kind.to_string(),
                from: from.to_string(),
                to: to.to_string(),
            })
        }
    }

    /// Knows no formats at all.
    struct Broken;

    impl FormatRegistry for Broken {
        fn validate(&self, kind: &str, format: &str, _: &Shared) -> Result<bool, ConversionError> {
            Err(ConversionError::UnknownFormat {
                kind: kind.to_string(),
                format: format.to_string(),
            })
        }

        fn contains(&self, _: &str, _: &str) -> bool {
            false
        }

        fn convert(&self, kind: &str, _: Shared, format: &str, _: &str) -> Result<Shared, ConversionError> {
            Err(ConversionError::UnknownFormat {
                kind: kind.to_string(),
                format: format.to_string(),
            })
        }
    }

    fn builtin() -> Arc<ConversionGraph> {
        Arc::new(ConversionGraph::new().with_builtin_formats().unwrap())
    }

    /// `y = x + 1` over a `number.number` input.
    fn increment(validate: bool) -> Specification {
        Specification::new("increment", "y = x + 1")
            .with_inputs(
                PortList::try_from(vec![
                    Port::new("x")
                        .with_kind("number")
                        .with_format("number")
                        .with_validate(validate),
                ])
                .unwrap(),
            )
            .with_outputs(PortList::try_from(vec![Port::new("y")]).unwrap())
    }

    #[test]
    fn test_validated_inputs() {
        let spec = Specification::new("double", "y = x * 2")
            .with_inputs(
                PortList::try_from(vec![Port::new("x").with_kind("number").with_validate(true)])
                    .unwrap(),
            )
            .with_outputs(PortList::try_from(vec![Port::new("y")]).unwrap());
        let definition = TaskFactory::new()
            .with_registry(Arc::new(IntegersOnly))
            .build(&spec)
            .unwrap();

        let mut pipeline = Pipeline::new();
        let task = pipeline.add(definition.instantiate());

        pipeline.set_input(task, "x", Value::Int(4)).unwrap();
        assert_eq!(*pipeline.output_data(task, "y").unwrap(), Value::Int(8));

        pipeline.set_input(task, "x", Binding::from(Value::from("4"))).unwrap();
        let err = pipeline.output_data(task, "y").unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Task { error: TaskError::Validation { port, .. }, .. } if port == "x"
        ));
    }

    #[test]
    fn test_formatted_inputs_are_converted() {
        let definition = TaskFactory::new()
            .with_registry(builtin())
            .build(&increment(true))
            .unwrap();

        let mut pipeline = Pipeline::new();
        let task = pipeline.add(definition.instantiate());

        pipeline.set_input(task, "x", Binding::formatted("json", Value::from("3"))).unwrap();
        assert_eq!(*pipeline.output_data(task, "y").unwrap(), Value::Int(4));

        // Already in the port's format, nothing to convert.
        pipeline.set_input(task, "x", Binding::formatted("number", Value::Int(9))).unwrap();
        assert_eq!(*pipeline.output_data(task, "y").unwrap(), Value::Int(10));

        // Unformatted data is taken as already being in the port's format.
        pipeline.set_input(task, "x", Value::Int(1)).unwrap();
        assert_eq!(*pipeline.output_data(task, "y").unwrap(), Value::Int(2));
    }

    #[test]
    fn test_formatted_inputs_are_validated() {
        let definition = TaskFactory::new()
            .with_registry(builtin())
            .build(&increment(true))
            .unwrap();

        let mut pipeline = Pipeline::new();
        let task = pipeline.add(definition.instantiate());

        pipeline.set_input(task, "x", Binding::formatted("json", Value::from("\"3\""))).unwrap();
        let err = pipeline.output_data(task, "y").unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Task { error: TaskError::Validation { port, format, .. }, .. }
                if port == "x" && format == "json"
        ));

        // Without validation the bad text reaches the reader and fails there.
        let definition = TaskFactory::new()
            .with_registry(builtin())
            .build(&increment(false))
            .unwrap();
        let task = pipeline.add(definition.instantiate());
        pipeline.set_input(task, "x", Binding::formatted("json", Value::from("nope"))).unwrap();
        assert!(matches!(
            pipeline.output_data(task, "y").unwrap_err(),
            PipelineError::Task {
                error: TaskError::Conversion { error, .. },
                ..
            } if matches!(*error, ConversionError::Step { .. })
        ));
    }

    #[test]
    fn test_conversion_errors() {
        let mut pipeline = Pipeline::new();

        let definition = TaskFactory::new().build(&increment(false)).unwrap();
        let task = pipeline.add(definition.instantiate());
        pipeline.set_input(task, "x", Binding::formatted("json", Value::from("3"))).unwrap();
        assert!(matches!(
            pipeline.output_data(task, "y").unwrap_err(),
            PipelineError::Task {
                error: TaskError::Conversion { port, error },
                ..
            } if port == "x" && matches!(*error, ConversionError::NoConversionPath { .. })
        ));

        let definition = TaskFactory::new()
            .with_registry(Arc::new(Broken))
            .build(&increment(true))
            .unwrap();
        let task = pipeline.add(definition.instantiate());
        pipeline.set_input(task, "x", Value::Int(3)).unwrap();
        assert!(matches!(
            pipeline.output_data(task, "y").unwrap_err(),
            PipelineError::Task {
                error: TaskError::Conversion { error, .. },
                ..
            } if matches!(*error, ConversionError::UnknownFormat { .. })
        ));
    }

    #[test]
    fn test_format_check() {
        let factory = TaskFactory::new().with_registry(builtin()).with_format_check(true);
        assert!(factory.build(&increment(false)).is_ok());
        assert!(factory.build(&sum()).is_ok());

        let spec = Specification::new("bad", "y = x")
            .with_inputs(PortList::try_from(vec![Port::new("x")]).unwrap())
            .with_outputs(
                PortList::try_from(vec![Port::new("y").with_kind("number").with_format("invalid")])
                    .unwrap(),
            );
        assert!(matches!(
            factory.build(&spec),
            Err(FactoryError::UnknownFormat { port, format, .. }) if port == "y" && format == "invalid"
        ));

        // Unchecked by default, and an unregistered format is unknown.
        assert!(TaskFactory::new().with_registry(builtin()).build(&spec).is_ok());
        assert!(matches!(
            TaskFactory::new().with_format_check(true).build(&increment(false)),
            Err(FactoryError::UnknownFormat { .. })
        ));
    }

    #[test]
    fn test_definitions_share_digest() {
        let factory = TaskFactory::new();
        let a = factory.build(&sum()).unwrap();
        let b = factory.build(&sum()).unwrap();
        assert_eq!(a.digest(), b.digest());
        assert_eq!(a.instantiate().definition().name(), "sum");
    }
}
