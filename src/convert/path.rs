use std::fmt;

use crate::convert::FormatKey;
use crate::engine::ScriptDefinition;
use crate::error::{ConversionError, PipelineError};
use crate::pipeline::Pipeline;
use crate::value::Shared;

/// One converter in a resolved chain.
#[derive(Debug, Clone)]
pub struct ConversionStep {
    name: String,
    definition: ScriptDefinition,
}

impl ConversionStep {
    pub(crate) fn new(name: &str, definition: ScriptDefinition) -> Self {
        Self {
            name: name.to_string(),
            definition,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn definition(&self) -> &ScriptDefinition {
        &self.definition
    }
}

/// A chain of converters found by [`ConversionGraph::resolve`].
///
/// The chain is independent of the graph it came from and can be executed
/// any number of times.
///
/// [`ConversionGraph::resolve`]: crate::ConversionGraph::resolve
#[derive(Debug, Clone)]
pub struct ConversionPath {
    from: FormatKey,
    to: FormatKey,
    steps: Vec<ConversionStep>,
}

impl ConversionPath {
    pub(crate) fn new(from: FormatKey, to: FormatKey, steps: Vec<ConversionStep>) -> Self {
        Self { from, to, steps }
    }

    pub fn from(&self) -> &FormatKey {
        &self.from
    }

    pub fn to(&self) -> &FormatKey {
        &self.to
    }

    pub fn steps(&self) -> &[ConversionStep] {
        &self.steps
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().map(ConversionStep::name)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Feeds `value` through every converter of the chain. An empty chain
    /// hands the value back untouched.
    ///
    /// The converters are wired into a fresh [`Pipeline`], one after the
    /// other, and pulled in order so a failure names the converter it
    /// happened in.
    pub fn execute(&self, value: Shared) -> Result<Shared, ConversionError> {
        let _span = tracing::debug_span!("convert", from = %self.from, to = %self.to).entered();

        let mut pipeline = Pipeline::new();
        let mut upstream = pipeline.source(value.clone());
        let mut port = String::from("0");

        for step in &self.steps {
            let failed = |error: PipelineError| ConversionError::Step {
                step: step.name.clone(),
                error,
            };

            let definition = &step.definition;
            let (Some(input), Some(output)) =
                (definition.inputs().first(), definition.outputs().first())
            else {
                return Err(ConversionError::InvalidConverter {
                    name: step.name.clone(),
                    reason: "expected one input and one output".to_string(),
                });
            };

            let task = pipeline.add(definition.instantiate());
            pipeline
                .set_input(task, input.name(), upstream.output(port.as_str()))
                .map_err(failed)?;
            pipeline.run(task).map_err(failed)?;

            tracing::debug!(step = %step.name, "converted");
            upstream = task;
            port = output.name().to_string();
        }

        if self.steps.is_empty() {
            return Ok(value);
        }

        pipeline
            .output_data(upstream, &port)
            .map_err(|error| ConversionError::Step {
                step: self.names().last().unwrap_or_default().to_string(),
                error,
            })
    }
}

impl fmt::Display for ConversionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<_> = self.names().collect();
        write!(f, "{} => [{}] => {}", self.from, names.join(", "), self.to)
    }
}
