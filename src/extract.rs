//! Static derivation of a task signature from its script.
//!
//! The extractor never runs the script. It looks for two shapes:
//!
//! * `Wrapper(name, key=literal, ...)` with `Wrapper` in the vocabulary
//!   declares the input port `name`, typed after the wrapper;
//! * `name = Output(..., key=literal, ...)` declares the output port `name`.
//!
//! Statements are visited in source order and expressions depth-first, so a
//! port declared twice ends up where its last declaration is, with the
//! attributes of that declaration.

use crate::error::ExtractError;
use crate::port::{Port, PortList};
use crate::script::{Expr, ExprKind, OUTPUT, Script, StmtKind, Target, Vocabulary};
use crate::spec::Specification;

#[derive(Debug, Clone, Default)]
pub struct SpecExtractor {
    vocabulary: Vocabulary,
}

impl SpecExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_vocabulary(mut self, vocabulary: Vocabulary) -> Self {
        self.vocabulary = vocabulary;
        self
    }

    /// Returns the input and output ports declared by `script`.
    pub fn extract(&self, script: &str) -> Result<(PortList, PortList), ExtractError> {
        let script = Script::parse(script)?;
        let mut inputs = PortList::new();
        let mut outputs = PortList::new();

        for stmt in &script.program().statements {
            match &stmt.kind {
                StmtKind::Pass => {}
                StmtKind::Expr(expr) => self.scan(expr, &mut inputs)?,
                StmtKind::Assign { targets, value } => match (&value.kind, targets.as_slice()) {
                    (ExprKind::Call { function, args, keywords }, targets) if function == OUTPUT => {
                        let [Target::Name(name)] = targets else {
                            return Err(unsupported(
                                stmt.line,
                                "Output(...) must be assigned to exactly one name",
                            ));
                        };

                        let mut port = Port::new(name.as_str());
                        for keyword in keywords {
                            port = port.with_attribute(&keyword.name, literal(&keyword.value, OUTPUT, &keyword.name)?);
                        }

                        for arg in args {
                            self.scan(arg, &mut inputs)?;
                        }
                        for keyword in keywords {
                            self.scan(&keyword.value, &mut inputs)?;
                        }

                        outputs.replace_last(port);
                    }
                    _ => self.scan(value, &mut inputs)?,
                },
            }
        }

        tracing::debug!(inputs = inputs.len(), outputs = outputs.len(), "extracted signature");
        Ok((inputs, outputs))
    }

    /// Like [`SpecExtractor::extract`], packaged as a script specification.
    pub fn extract_spec(&self, name: &str, script: &str) -> Result<Specification, ExtractError> {
        let (inputs, outputs) = self.extract(script)?;
        Ok(Specification::new(name, script)
            .with_inputs(inputs)
            .with_outputs(outputs))
    }

    fn scan(&self, expr: &Expr, inputs: &mut PortList) -> Result<(), ExtractError> {
        expr.walk(&mut |expr: &Expr| {
            let ExprKind::Call {
                function,
                args,
                keywords,
            } = &expr.kind
            else {
                return Ok(());
            };

            if function == OUTPUT {
                return Err(unsupported(
                    expr.line,
                    "Output(...) may only be the whole right-hand side of an assignment",
                ));
            }

            if !self.vocabulary.contains(function) {
                return Ok(());
            }

            let Some(Expr {
                kind: ExprKind::Name(name),
                ..
            }) = args.first()
            else {
                return Err(unsupported(
                    expr.line,
                    &format!("the first argument of {function}(...) must be a variable name"),
                ));
            };

            let mut port = Port::new(name.as_str()).with_kind(function.to_lowercase());
            for keyword in keywords {
                port = port.with_attribute(&keyword.name, literal(&keyword.value, function, &keyword.name)?);
            }

            inputs.replace_last(port);
            Ok(())
        })
    }
}

fn unsupported(line: usize, reason: &str) -> ExtractError {
    ExtractError::UnsupportedSyntax {
        line,
        reason: reason.to_string(),
    }
}

fn literal(expr: &Expr, function: &str, keyword: &str) -> Result<serde_json::Value, ExtractError> {
    if keyword == "name" {
        return Err(unsupported(
            expr.line,
            &format!("keyword 'name' of {function}(...) is reserved"),
        ));
    }

    expr.as_literal().and_then(|value| value.to_json().ok()).ok_or_else(|| {
        unsupported(
            expr.line,
            &format!("keyword '{keyword}' of {function}(...) must be a literal"),
        )
    })
}
