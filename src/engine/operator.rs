use std::cmp::Ordering;
use std::sync::Arc;

use crate::core::TaskContext;
use crate::engine::{Inputs, Outputs, Task};
use crate::error::{TaskError, ValueError};
use crate::port::PortList;
use crate::value::Value;

/// The closed set of operations an [`Operator`] can apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Add,
    Subtract,
    Multiply,
    Divide,
    FloorDivide,
    Modulo,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Negate,
    Not,
}

impl Operation {
    /// The method name of the operation, as it appears in error messages.
    pub fn method(self) -> &'static str {
        match self {
            Operation::Add => "add",
            Operation::Subtract => "sub",
            Operation::Multiply => "mul",
            Operation::Divide => "truediv",
            Operation::FloorDivide => "floordiv",
            Operation::Modulo => "mod",
            Operation::Equal => "eq",
            Operation::NotEqual => "ne",
            Operation::Less => "lt",
            Operation::LessEqual => "le",
            Operation::Greater => "gt",
            Operation::GreaterEqual => "ge",
            Operation::Negate => "neg",
            Operation::Not => "not",
        }
    }

    /// Number of operands, the first one included.
    pub fn arity(self) -> usize {
        match self {
            Operation::Negate | Operation::Not => 1,
            _ => 2,
        }
    }

    /// Whether a value of this type may be the first operand.
    pub fn supports(self, operand: &Value) -> bool {
        match self {
            Operation::Add | Operation::Multiply => {
                operand.is_number() || matches!(operand, Value::Str(_) | Value::List(_))
            }
            Operation::Subtract
            | Operation::Divide
            | Operation::FloorDivide
            | Operation::Modulo
            | Operation::Negate => operand.is_number(),
            Operation::Less
            | Operation::LessEqual
            | Operation::Greater
            | Operation::GreaterEqual => operand.is_number() || matches!(operand, Value::Str(_)),
            Operation::Equal | Operation::NotEqual | Operation::Not => true,
        }
    }

    /// Applies the operation to `first` and the remaining operands.
    /// Arithmetic folds left over all of them.
    pub fn apply(self, first: &Value, rest: &[&Value]) -> Result<Value, ValueError> {
        let fold = |arith: fn(&Value, &Value) -> Result<Value, ValueError>| {
            rest.iter()
                .try_fold(first.clone(), |acc, operand| arith(&acc, operand))
        };

        let other = || {
            rest.first().copied().ok_or(ValueError::Unpack {
                expected: self.arity(),
                found: rest.len() + 1,
            })
        };

        let ordering = |wanted: fn(Ordering) -> bool| -> Result<Value, ValueError> {
            Ok(Value::Bool(wanted(first.compare(other()?, self.method())?)))
        };

        match self {
            Operation::Add => fold(Value::add),
            Operation::Subtract => fold(Value::sub),
            Operation::Multiply => fold(Value::mul),
            Operation::Divide => fold(Value::truediv),
            Operation::FloorDivide => fold(Value::floordiv),
            Operation::Modulo => fold(Value::rem),
            Operation::Negate => first.neg(),
            Operation::Not => Ok(Value::Bool(!first.is_truthy())),
            Operation::Equal => Ok(Value::Bool(first.loose_eq(other()?))),
            Operation::NotEqual => Ok(Value::Bool(!first.loose_eq(other()?))),
            Operation::Less => ordering(Ordering::is_lt),
            Operation::LessEqual => ordering(Ordering::is_le),
            Operation::Greater => ordering(Ordering::is_gt),
            Operation::GreaterEqual => ordering(Ordering::is_ge),
        }
    }
}

/// A task applying an [`Operation`] of its first input to the others.
///
/// Inputs are the positional ports `"0"`, `"1"`, ...; the result is put on
/// output `"0"`.
#[derive(Debug, Clone)]
pub struct Operator {
    operation: Operation,
    inputs: PortList,
    outputs: PortList,
}

impl Operator {
    pub fn new(operation: Operation) -> Self {
        Self {
            operation,
            inputs: PortList::positional(operation.arity()),
            outputs: PortList::positional(1),
        }
    }

    pub fn add() -> Self {
        Self::new(Operation::Add)
    }

    pub fn subtract() -> Self {
        Self::new(Operation::Subtract)
    }

    pub fn multiply() -> Self {
        Self::new(Operation::Multiply)
    }

    pub fn divide() -> Self {
        Self::new(Operation::Divide)
    }

    pub fn equal() -> Self {
        Self::new(Operation::Equal)
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }
}

impl Task for Operator {
    fn get_name(&self) -> String {
        format!("{:?}", self.operation)
    }

    fn inputs(&self) -> &PortList {
        &self.inputs
    }

    fn outputs(&self) -> &PortList {
        &self.outputs
    }

    fn run(&self, _: &TaskContext, inputs: &Inputs) -> Result<Outputs, TaskError> {
        let values = inputs.positional();
        if values.len() < self.operation.arity() {
            return Err(TaskError::MissingInput(values.len().to_string()));
        }

        let (first, rest) = (values[0], &values[1..]);
        if !self.operation.supports(first) {
            return Err(TaskError::InvalidOperation {
                method: self.operation.method(),
                operand: first.type_name(),
            });
        }

        let rest: Vec<&Value> = rest.iter().map(|v| v.as_ref()).collect();
        let result = self.operation.apply(first, &rest)?;

        Ok(Outputs::from([("0".to_string(), Arc::new(result))]))
    }
}

/// A task copying its single input to each of its outputs.
///
/// Every output holds the very same shared value as the input.
#[derive(Debug, Clone)]
pub struct Fork {
    inputs: PortList,
    outputs: PortList,
}

impl Fork {
    /// A fork with `outputs` output ports, at least one.
    pub fn new(outputs: usize) -> Self {
        Self {
            inputs: PortList::positional(1),
            outputs: PortList::positional(outputs.max(1)),
        }
    }
}

impl Default for Fork {
    fn default() -> Self {
        Self::new(2)
    }
}

impl Task for Fork {
    fn get_name(&self) -> String {
        format!("Fork({})", self.outputs.len())
    }

    fn inputs(&self) -> &PortList {
        &self.inputs
    }

    fn outputs(&self) -> &PortList {
        &self.outputs
    }

    fn run(&self, _: &TaskContext, inputs: &Inputs) -> Result<Outputs, TaskError> {
        let value = inputs.require("0")?;

        Ok(self
            .outputs
            .names()
            .map(|name| (name.to_string(), value.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Shared;

    fn run(task: &dyn Task, values: &[Value]) -> Result<Outputs, TaskError> {
        let inputs = Inputs::new(
            values
                .iter()
                .enumerate()
                .map(|(i, v)| (i.to_string(), Arc::new(v.clone())))
                .collect(),
        );
        task.run(&TaskContext::new("test"), &inputs)
    }

    fn result(operator: Operator, a: Value, b: Value) -> Value {
        run(&operator, &[a, b]).unwrap()["0"].as_ref().clone()
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(result(Operator::add(), Value::Int(2), Value::Int(3)), Value::Int(5));
        assert_eq!(result(Operator::subtract(), Value::Int(2), Value::Int(3)), Value::Int(-1));
        assert_eq!(result(Operator::multiply(), Value::Int(2), Value::Int(3)), Value::Int(6));
        assert_eq!(result(Operator::divide(), Value::Int(6), Value::Int(3)), Value::Float(2.0));
    }

    #[test]
    fn test_comparison() {
        assert_eq!(result(Operator::equal(), Value::Int(1), Value::Float(1.0)), Value::Bool(true));
        assert_eq!(
            result(Operator::new(Operation::Less), Value::from("a"), Value::from("b")),
            Value::Bool(true)
        );
        assert_eq!(
            result(Operator::new(Operation::GreaterEqual), Value::Int(2), Value::Int(3)),
            Value::Bool(false)
        );
    }

    #[test]
    fn test_unary() {
        let out = run(&Operator::new(Operation::Negate), &[Value::Int(4)]).unwrap();
        assert_eq!(*out["0"], Value::Int(-4));
        let out = run(&Operator::new(Operation::Not), &[Value::from("")]).unwrap();
        assert_eq!(*out["0"], Value::Bool(true));
    }

    #[test]
    fn test_invalid_first_operand() {
        let err = run(&Operator::subtract(), &[Value::from("x"), Value::Int(1)]).unwrap_err();
        assert!(matches!(
            err,
            TaskError::InvalidOperation {
                method: "sub",
                operand: "str"
            }
        ));
    }

    #[test]
    fn test_invalid_other_operand() {
        let err = run(&Operator::add(), &[Value::Int(1), Value::from("x")]).unwrap_err();
        assert!(matches!(
            err,
            TaskError::Value(ValueError::UnsupportedOperands { method: "add", .. })
        ));

        let err = run(&Operator::divide(), &[Value::Int(1), Value::Int(0)]).unwrap_err();
        assert!(matches!(err, TaskError::Value(ValueError::ZeroDivision)));

        let err = run(&Operator::multiply(), &[Value::from("ab"), Value::Int(i64::MAX)]).unwrap_err();
        assert!(matches!(err, TaskError::Value(ValueError::Overflow("mul"))));
    }

    #[test]
    fn test_fork_shares_input() {
        for n in 1..=4 {
            let input: Shared = Arc::new(Value::from("payload"));
            let inputs = Inputs::new(vec![("0".into(), input.clone())]);
            let outputs = Fork::new(n).run(&TaskContext::new("fork"), &inputs).unwrap();

            assert_eq!(outputs.len(), n);
            assert!(outputs.values().all(|v| Arc::ptr_eq(v, &input)));
        }
    }
}
