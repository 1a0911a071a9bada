use thiserror::Error;

use crate::port::Side;

pub use anyhow::Error as RuntimeError;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValueError {
    #[error("unsupported operand types for {method}: '{left}' and '{right}'")]
    UnsupportedOperands {
        method: &'static str,
        left: &'static str,
        right: &'static str,
    },

    #[error("unsupported operand type for {method}: '{operand}'")]
    UnsupportedOperand {
        method: &'static str,
        operand: &'static str,
    },

    #[error("division by zero")]
    ZeroDivision,

    #[error("integer overflow in {0}")]
    Overflow(&'static str),

    #[error("index {index} out of range for length {len}")]
    IndexOutOfRange { index: i64, len: usize },

    #[error("key '{0}' not found")]
    MissingKey(String),

    #[error("'{container}' cannot be indexed by '{key}'")]
    NotIndexable {
        container: &'static str,
        key: &'static str,
    },

    #[error("out of range float value {0} is not JSON compliant")]
    NotJsonCompliant(f64),

    #[error("cannot unpack {found} values into {expected} targets")]
    Unpack { expected: usize, found: usize },
}

/// Script text that does not parse.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("line {line}, column {column}: {message}")]
pub struct SyntaxError {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

/// Failures raised while a script executes.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ScriptError {
    #[error("line {line}: name '{name}' is not defined")]
    UndefinedName { line: usize, name: String },

    #[error("line {line}: {error}")]
    Value { line: usize, error: ValueError },

    #[error("line {line}: {function}() {message}")]
    Call {
        line: usize,
        function: String,
        message: String,
    },

    #[error("line {line}: '{name}' is not callable")]
    NotCallable { line: usize, name: String },
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExtractError {
    #[error("Couldn't parse script.\n{0}")]
    Syntax(#[from] SyntaxError),

    #[error("Unsupported syntax at line {line}: {reason}")]
    UnsupportedSyntax { line: usize, reason: String },
}

#[derive(Debug, Error, Clone, PartialEq)]
#[error("A port named '{0}' already exists")]
pub struct DuplicatePort(pub String);

#[derive(Debug, Error, Clone, PartialEq)]
pub enum FactoryError {
    #[error("Unsupported execution mode '{0}'")]
    UnsupportedMode(String),

    #[error("Task '{task}': couldn't parse script.\n{error}")]
    Syntax { task: String, error: SyntaxError },

    #[error("Task '{task}': port '{port}' declares unknown format \"{kind}.{format}\"")]
    UnknownFormat {
        task: String,
        port: String,
        kind: String,
        format: String,
    },
}

/// Failures raised by a single task while it runs.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("Operation '{method}' is not supported by an operand of type '{operand}'")]
    InvalidOperation {
        method: &'static str,
        operand: &'static str,
    },

    #[error("Output '{0}' was not bound by the task")]
    UnboundOutput(String),

    #[error("Input '{0}' has no data")]
    MissingInput(String),

    #[error("Input '{port}' is not of the expected type ('{kind}') and format ('{format}')")]
    Validation {
        port: String,
        kind: String,
        format: String,
    },

    #[error(transparent)]
    Value(#[from] ValueError),

    #[error("{error}\nScript:\n{listing}")]
    Script { error: ScriptError, listing: String },

    #[error("Input '{port}':\n{error}")]
    Conversion {
        port: String,
        error: Box<ConversionError>,
    },

    #[error(transparent)]
    Userland(#[from] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Task #{0} does not exist in this pipeline")]
    UnknownTask(usize),

    #[error("Task '{task}' has no {side} port named '{port}'")]
    UnknownPort {
        task: String,
        side: Side,
        port: String,
    },

    #[error("Task '{task}': input '{port}' is not connected")]
    UnconnectedInput { task: String, port: String },

    #[error("Cyclic dependency detected at task '{0}'")]
    CyclicDependency(String),

    #[error("Task '{task}':\n{error}")]
    Task { task: String, error: TaskError },
}

#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("Unknown format \"{kind}.{format}\"")]
    UnknownFormat { kind: String, format: String },

    #[error("No conversion path from \"{kind}.{from}\" to \"{kind}.{to}\"")]
    NoConversionPath {
        kind: String,
        from: String,
        to: String,
    },

    #[error("Converter '{name}': {reason}")]
    InvalidConverter { name: String, reason: String },

    #[error("Validator for \"{kind}.{format}\": {reason}")]
    InvalidValidator {
        kind: String,
        format: String,
        reason: String,
    },

    #[error("Data is not of the expected type (\"{kind}\") and format (\"{format}\")")]
    Validation { kind: String, format: String },

    #[error(transparent)]
    Factory(#[from] FactoryError),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error("Conversion step '{step}':\n{error}")]
    Step { step: String, error: PipelineError },
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Error while extracting the task signature:\n{0}")]
    Extract(#[from] ExtractError),

    #[error("Error while building the task:\n{0}")]
    Factory(#[from] FactoryError),

    #[error("Error while running the pipeline:\n{0}")]
    Pipeline(#[from] PipelineError),

    #[error("Error while converting data:\n{0}")]
    Conversion(#[from] ConversionError),

    #[error("Couldn't read specification.\n{0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Port(#[from] DuplicatePort),
}
