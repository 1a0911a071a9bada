use std::fmt;
use std::sync::Arc;

use crate::core::{Hash32, TaskContext};
use crate::engine::{FormatRegistry, Inputs, Outputs, Task};
use crate::error::{ConversionError, TaskError};
use crate::port::{Port, PortList, UNCONSTRAINED};
use crate::script::{Scope, Script, Vocabulary};
use crate::value::Shared;
use crate::utils::number_lines;

struct Definition {
    name: String,
    inputs: PortList,
    outputs: PortList,
    script: Script,
    digest: Hash32,
    vocabulary: Vocabulary,
    registry: Option<Arc<dyn FormatRegistry>>,
}

/// A reusable, already parsed script task, built by the
/// [`TaskFactory`](crate::TaskFactory).
///
/// Cloning is cheap; every clone and every instance share the same parsed
/// script.
#[derive(Clone)]
pub struct ScriptDefinition(Arc<Definition>);

impl ScriptDefinition {
    pub(crate) fn new(
        name: String,
        inputs: PortList,
        outputs: PortList,
        script: Script,
        digest: Hash32,
        vocabulary: Vocabulary,
        registry: Option<Arc<dyn FormatRegistry>>,
    ) -> Self {
        Self(Arc::new(Definition {
            name,
            inputs,
            outputs,
            script,
            digest,
            vocabulary,
            registry,
        }))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn inputs(&self) -> &PortList {
        &self.0.inputs
    }

    pub fn outputs(&self) -> &PortList {
        &self.0.outputs
    }

    pub fn script(&self) -> &Script {
        &self.0.script
    }

    /// Digest of the specification this definition was built from.
    pub fn digest(&self) -> Hash32 {
        self.0.digest
    }

    /// Creates a fresh task instance of this definition.
    pub fn instantiate(&self) -> ScriptTask {
        ScriptTask {
            definition: self.clone(),
        }
    }
}

impl fmt::Debug for ScriptDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptDefinition")
            .field("name", &self.0.name)
            .field("inputs", &self.0.inputs)
            .field("outputs", &self.0.outputs)
            .field("digest", &self.0.digest)
            .field("registry", &self.0.registry.is_some())
            .finish()
    }
}

/// A task whose computation is a script.
///
/// Each input value is bound under its port name, the script runs, and each
/// declared output is read back from the variable of the same name.
#[derive(Debug, Clone)]
pub struct ScriptTask {
    definition: ScriptDefinition,
}

impl ScriptTask {
    pub fn definition(&self) -> &ScriptDefinition {
        &self.definition
    }

    /// Checks an input value against its port and brings it into the port's
    /// format. `format` is the format the value was bound in, when known;
    /// otherwise the value is taken to be in the port's own format.
    fn prepare(
        &self,
        context: &TaskContext,
        port: &Port,
        format: Option<&str>,
        value: Shared,
    ) -> Result<Shared, TaskError> {
        let registry = self.definition.0.registry.as_deref();
        let format = format.unwrap_or(port.format());
        let failed = |error: ConversionError| TaskError::Conversion {
            port: port.name().to_string(),
            error: Box::new(error),
        };

        if port.validate() {
            if let Some(registry) = registry {
                if !registry.validate(port.kind(), format, &value).map_err(failed)? {
                    return Err(TaskError::Validation {
                        port: port.name().to_string(),
                        kind: port.kind().to_string(),
                        format: format.to_string(),
                    });
                }
                tracing::debug!(parent: &context.span, port = port.name(), format, "input validated");
            }
        }

        if format == port.format() || port.format() == UNCONSTRAINED {
            return Ok(value);
        }

        let Some(registry) = registry else {
            return Err(failed(ConversionError::NoConversionPath {
                kind: port.kind().to_string(),
                from: format.to_string(),
                to: port.format().to_string(),
            }));
        };

        let value = registry
            .convert(port.kind(), value, format, port.format())
            .map_err(failed)?;
        tracing::debug!(parent: &context.span, port = port.name(), from = format, to = port.format(), "input converted");
        Ok(value)
    }
}

impl Task for ScriptTask {
    fn get_name(&self) -> String {
        self.definition.name().to_string()
    }

    fn inputs(&self) -> &PortList {
        self.definition.inputs()
    }

    fn outputs(&self) -> &PortList {
        self.definition.outputs()
    }

    fn run(&self, context: &TaskContext, inputs: &Inputs) -> Result<Outputs, TaskError> {
        let def = &self.definition.0;

        let mut scope = Scope::new();
        for (name, value) in inputs.iter() {
            let value = match def.inputs.get(name) {
                Some(port) => self.prepare(context, port, inputs.format(name), value.clone())?,
                None => value.clone(),
            };
            scope.insert(name.to_string(), value);
        }

        def.script
            .run(&def.vocabulary, &mut scope)
            .map_err(|error| TaskError::Script {
                error,
                listing: number_lines(def.script.source()),
            })?;

        def.outputs
            .names()
            .map(|name| match scope.remove(name) {
                Some(value) => Ok((name.to_string(), value)),
                None => Err(TaskError::UnboundOutput(name.to_string())),
            })
            .collect()
    }
}
