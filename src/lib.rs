#![forbid(unsafe_code)]
#![doc = include_str!("../README.md")]

mod convert;
mod core;
pub mod engine;
mod error;
mod extract;
mod factory;
mod pipeline;
mod plugin;
mod port;
pub mod script;
mod spec;
mod utils;
mod value;

pub use crate::convert::{
    ConversionGraph, ConversionPath, ConversionStep, ConverterInfo, FormatKey, ValidatorInfo,
};
pub use crate::core::{Hash32, TaskContext};
pub use crate::engine::{
    FormatRegistry, Fork, Inputs, Operation, Operator, OutputRef, Outputs, ScriptDefinition,
    ScriptTask, Task, TaskHandle,
};
pub use crate::error::*;
pub use crate::extract::SpecExtractor;
pub use crate::factory::TaskFactory;
pub use crate::pipeline::{Binding, Pipeline};
pub use crate::plugin::{FormatCodec, FormatFamily};
pub use crate::port::{Port, PortList, Side, UNCONSTRAINED};
pub use crate::script::{Scope, Script, Vocabulary};
pub use crate::spec::{SCRIPT_MODE, Specification};
#[cfg(feature = "logging")]
pub use crate::utils::init_logging;
pub use crate::value::{Shared, Value};
