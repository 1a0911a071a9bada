//! The embedded script language.
//!
//! Scripts are small, line-oriented programs in a Python-flavoured syntax:
//!
//! ```text
//! # inputs are plain names, outputs are assigned
//! data = Geo(input, format="GeoJSON")
//! output = Output(dumps(data), type="geo", format="GeoJSON text")
//! ```
//!
//! There are no loops, function definitions, imports or attribute access.
//! Function calls resolve against a closed table: the type wrappers from a
//! [`Vocabulary`], `Output`, and a handful of conversion and inspection
//! builtins. The same parsed form serves both static signature extraction
//! and execution.

mod ast;
mod interp;
mod lexer;
mod parser;

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{ScriptError, SyntaxError};
use crate::value::Shared;

pub(crate) use crate::script::ast::{Expr, ExprKind, Program, StmtKind, Target};

/// Name of the marker function declaring an output port.
pub const OUTPUT: &str = "Output";

/// Variables visible to a running script.
pub type Scope = BTreeMap<String, Shared>;

/// The set of type-wrapper function names.
///
/// A call `Wrapper(name, ...)` declares `name` as an input port whose type is
/// the wrapper name lower-cased. At run time wrappers return their first
/// argument unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vocabulary {
    wrappers: BTreeSet<String>,
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self {
            wrappers: ["Table", "Geo", "Number", "String", "Boolean"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl Vocabulary {
    /// A vocabulary without any wrappers.
    pub fn empty() -> Self {
        Self {
            wrappers: BTreeSet::new(),
        }
    }

    pub fn with_wrapper(mut self, name: impl Into<String>) -> Self {
        self.wrappers.insert(name.into());
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.wrappers.contains(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.wrappers.iter().map(String::as_str)
    }
}

/// A parsed script, ready to run any number of times.
#[derive(Debug, Clone, PartialEq)]
pub struct Script {
    source: String,
    program: Program,
}

impl Script {
    pub fn parse(source: impl Into<String>) -> Result<Self, SyntaxError> {
        let source = source.into();
        let program = parser::parse(&source)?;
        Ok(Self { source, program })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub(crate) fn program(&self) -> &Program {
        &self.program
    }

    /// Runs the script against `scope`, which supplies the inputs and
    /// receives every assigned variable.
    pub fn run(&self, vocabulary: &Vocabulary, scope: &mut Scope) -> Result<(), ScriptError> {
        interp::Interpreter::new(vocabulary, scope).execute(&self.program)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::value::Value;

    #[test]
    fn test_custom_wrapper() {
        let vocabulary = Vocabulary::empty().with_wrapper("Raster");
        assert!(vocabulary.contains("Raster"));
        assert!(!vocabulary.contains("Geo"));

        let mut scope = Scope::new();
        scope.insert("r".into(), Arc::new(Value::Int(3)));
        Script::parse("out = Raster(r) * 2")
            .unwrap()
            .run(&vocabulary, &mut scope)
            .unwrap();
        assert_eq!(*scope["out"], Value::Int(6));

        let err = Script::parse("out = Geo(r)")
            .unwrap()
            .run(&vocabulary, &mut scope)
            .unwrap_err();
        assert!(matches!(err, ScriptError::UndefinedName { .. }));
    }

    #[test]
    fn test_source_is_kept() {
        let script = Script::parse("x = 1\n").unwrap();
        assert_eq!(script.source(), "x = 1\n");
        assert!(Script::parse("x = (").is_err());
    }
}
