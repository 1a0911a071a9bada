use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{ScriptError, ValueError};
use crate::script::ast::*;
use crate::script::{OUTPUT, Scope, Vocabulary};
use crate::value::{Shared, Value};

/// Names of the builtin functions, besides the type wrappers and `Output`.
pub(crate) const BUILTINS: &[&str] = &[
    "len",
    "str",
    "int",
    "float",
    "bool",
    "abs",
    "min",
    "max",
    "dumps",
    "loads",
    "is_number",
    "is_string",
    "is_bool",
    "is_list",
    "is_map",
    "is_json",
    "has_key",
    "type_name",
];

pub(crate) struct Interpreter<'a> {
    vocabulary: &'a Vocabulary,
    scope: &'a mut Scope,
}

enum Failure {
    Message(String),
    Value(ValueError),
}

impl From<ValueError> for Failure {
    fn from(error: ValueError) -> Self {
        Failure::Value(error)
    }
}

impl<'a> Interpreter<'a> {
    pub(crate) fn new(vocabulary: &'a Vocabulary, scope: &'a mut Scope) -> Self {
        Self { vocabulary, scope }
    }

    pub(crate) fn execute(&mut self, program: &Program) -> Result<(), ScriptError> {
        for stmt in &program.statements {
            match &stmt.kind {
                StmtKind::Pass => {}
                StmtKind::Expr(expr) => {
                    self.eval(expr)?;
                }
                StmtKind::Assign { targets, value } => {
                    let value = self.eval(value)?;
                    for target in targets {
                        self.assign(target, &value, stmt.line)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn assign(&mut self, target: &Target, value: &Shared, line: usize) -> Result<(), ScriptError> {
        match target {
            Target::Name(name) => {
                self.scope.insert(name.clone(), value.clone());
            }
            Target::Tuple(names) => {
                let Value::List(items) = value.as_ref() else {
                    return Err(ScriptError::Value {
                        line,
                        error: ValueError::UnsupportedOperand {
                            method: "unpack",
                            operand: value.type_name(),
                        },
                    });
                };
                if items.len() != names.len() {
                    return Err(ScriptError::Value {
                        line,
                        error: ValueError::Unpack {
                            expected: names.len(),
                            found: items.len(),
                        },
                    });
                }
                for (name, item) in names.iter().zip(items) {
                    self.scope.insert(name.clone(), Arc::new(item.clone()));
                }
            }
        }
        Ok(())
    }

    fn eval(&mut self, expr: &Expr) -> Result<Shared, ScriptError> {
        let line = expr.line;
        let value_error = |error| ScriptError::Value { line, error };

        let value = match &expr.kind {
            ExprKind::Literal(value) => value.clone(),
            ExprKind::Name(name) => {
                return self
                    .scope
                    .get(name)
                    .cloned()
                    .ok_or_else(|| ScriptError::UndefinedName {
                        line,
                        name: name.clone(),
                    });
            }
            ExprKind::List(items) => Value::List(
                items
                    .iter()
                    .map(|item| self.eval(item).map(|v| v.as_ref().clone()))
                    .collect::<Result<_, _>>()?,
            ),
            ExprKind::Map(entries) => {
                let mut map = BTreeMap::new();
                for (key, value) in entries {
                    let key = self.eval(key)?;
                    let Value::Str(key) = key.as_ref() else {
                        return Err(value_error(ValueError::UnsupportedOperand {
                            method: "map key",
                            operand: key.type_name(),
                        }));
                    };
                    let value = self.eval(value)?;
                    map.insert(key.clone(), value.as_ref().clone());
                }
                Value::Map(map)
            }
            ExprKind::Unary(op, inner) => {
                let inner = self.eval(inner)?;
                match op {
                    UnaryOp::Not => Value::Bool(!inner.is_truthy()),
                    UnaryOp::Neg => inner.neg().map_err(value_error)?,
                    UnaryOp::Pos if inner.is_number() => inner.as_ref().clone(),
                    UnaryOp::Pos => {
                        return Err(value_error(ValueError::UnsupportedOperand {
                            method: "pos",
                            operand: inner.type_name(),
                        }));
                    }
                }
            }
            ExprKind::Binary(op, lhs, rhs) => {
                let lhs = self.eval(lhs)?;
                let rhs = self.eval(rhs)?;
                let result = match op {
                    BinaryOp::Add => lhs.add(&rhs),
                    BinaryOp::Sub => lhs.sub(&rhs),
                    BinaryOp::Mul => lhs.mul(&rhs),
                    BinaryOp::Div => lhs.truediv(&rhs),
                    BinaryOp::FloorDiv => lhs.floordiv(&rhs),
                    BinaryOp::Mod => lhs.rem(&rhs),
                };
                result.map_err(value_error)?
            }
            ExprKind::Compare(first, rest) => {
                let mut lhs = self.eval(first)?;
                for (op, rhs) in rest {
                    let rhs = self.eval(rhs)?;
                    if !compare(*op, &lhs, &rhs).map_err(value_error)? {
                        return Ok(Arc::new(Value::Bool(false)));
                    }
                    lhs = rhs;
                }
                Value::Bool(true)
            }
            ExprKind::And(lhs, rhs) => {
                let lhs = self.eval(lhs)?;
                return if lhs.is_truthy() { self.eval(rhs) } else { Ok(lhs) };
            }
            ExprKind::Or(lhs, rhs) => {
                let lhs = self.eval(lhs)?;
                return if lhs.is_truthy() { Ok(lhs) } else { self.eval(rhs) };
            }
            ExprKind::Index(container, key) => {
                let container = self.eval(container)?;
                let key = self.eval(key)?;
                container.index(&key).map_err(value_error)?
            }
            ExprKind::Call {
                function,
                args,
                keywords,
            } => return self.call(line, function, args, keywords),
        };

        Ok(Arc::new(value))
    }

    fn call(
        &mut self,
        line: usize,
        function: &str,
        args: &[Expr],
        keywords: &[Keyword],
    ) -> Result<Shared, ScriptError> {
        if self.scope.contains_key(function) {
            return Err(ScriptError::NotCallable {
                line,
                name: function.to_string(),
            });
        }

        let is_wrapper = self.vocabulary.contains(function);
        if !is_wrapper && function != OUTPUT && !BUILTINS.contains(&function) {
            return Err(ScriptError::UndefinedName {
                line,
                name: function.to_string(),
            });
        }

        let args = args
            .iter()
            .map(|arg| self.eval(arg))
            .collect::<Result<Vec<_>, _>>()?;

        // Keywords on wrappers and Output describe ports and are otherwise inert.
        for keyword in keywords {
            self.eval(&keyword.value)?;
        }

        let failure = |message: String| ScriptError::Call {
            line,
            function: function.to_string(),
            message,
        };

        if is_wrapper {
            return args
                .first()
                .cloned()
                .ok_or_else(|| failure("missing required argument".to_string()));
        }

        if function == OUTPUT {
            return Ok(args.first().cloned().unwrap_or_default());
        }

        if let Some(keyword) = keywords.first() {
            return Err(failure(format!(
                "got an unexpected keyword argument '{}'",
                keyword.name
            )));
        }

        match builtin(function, &args) {
            Ok(value) => Ok(Arc::new(value)),
            Err(Failure::Message(message)) => Err(failure(message)),
            Err(Failure::Value(error)) => Err(ScriptError::Value { line, error }),
        }
    }
}

fn compare(op: CompareOp, lhs: &Value, rhs: &Value) -> Result<bool, ValueError> {
    Ok(match op {
        CompareOp::Eq => lhs.loose_eq(rhs),
        CompareOp::Ne => !lhs.loose_eq(rhs),
        CompareOp::Lt => lhs.compare(rhs, "lt")? == Ordering::Less,
        CompareOp::Le => lhs.compare(rhs, "le")? != Ordering::Greater,
        CompareOp::Gt => lhs.compare(rhs, "gt")? == Ordering::Greater,
        CompareOp::Ge => lhs.compare(rhs, "ge")? != Ordering::Less,
    })
}

fn exactly<const N: usize>(args: &[Shared]) -> Result<[&Value; N], Failure> {
    if args.len() != N {
        let noun = if N == 1 { "argument" } else { "arguments" };
        return Err(Failure::Message(format!(
            "takes exactly {N} {noun} ({} given)",
            args.len()
        )));
    }
    Ok(std::array::from_fn(|i| args[i].as_ref()))
}

fn builtin(function: &str, args: &[Shared]) -> Result<Value, Failure> {
    let message = |text: String| Failure::Message(text);

    let value = match function {
        "len" => {
            let [x] = exactly::<1>(args)?;
            let len = match x {
                Value::Str(s) => s.chars().count(),
                Value::List(l) => l.len(),
                Value::Map(m) => m.len(),
                other => {
                    return Err(message(format!(
                        "object of type '{}' has no len()",
                        other.type_name()
                    )));
                }
            };
            Value::Int(len as i64)
        }
        "str" => {
            let [x] = exactly::<1>(args)?;
            Value::Str(x.to_string())
        }
        "int" => {
            let [x] = exactly::<1>(args)?;
            match x {
                Value::Int(i) => Value::Int(*i),
                Value::Bool(b) => Value::Int(*b as i64),
                Value::Float(f) => {
                    let t = f.trunc();
                    if !t.is_finite() || t < i64::MIN as f64 || t >= i64::MAX as f64 {
                        return Err(message(format!("cannot convert float {x} to integer")));
                    }
                    Value::Int(t as i64)
                }
                Value::Str(s) => s.trim().parse().map(Value::Int).map_err(|_| {
                    message(format!("invalid literal for int(): {}", x.repr()))
                })?,
                other => {
                    return Err(message(format!(
                        "argument must be a string or a number, not '{}'",
                        other.type_name()
                    )));
                }
            }
        }
        "float" => {
            let [x] = exactly::<1>(args)?;
            match x {
                Value::Int(_) | Value::Float(_) => Value::Float(x.as_f64().unwrap_or_default()),
                Value::Bool(b) => Value::Float(if *b { 1.0 } else { 0.0 }),
                Value::Str(s) => s.trim().parse().map(Value::Float).map_err(|_| {
                    message(format!("could not convert string to float: {}", x.repr()))
                })?,
                other => {
                    return Err(message(format!(
                        "argument must be a string or a number, not '{}'",
                        other.type_name()
                    )));
                }
            }
        }
        "bool" => {
            let [x] = exactly::<1>(args)?;
            Value::Bool(x.is_truthy())
        }
        "abs" => {
            let [x] = exactly::<1>(args)?;
            match x {
                Value::Int(i) => i.checked_abs().map(Value::Int).ok_or(ValueError::Overflow("abs"))?,
                Value::Float(f) => Value::Float(f.abs()),
                other => {
                    return Err(ValueError::UnsupportedOperand {
                        method: "abs",
                        operand: other.type_name(),
                    }
                    .into());
                }
            }
        }
        "min" | "max" => {
            let items: Vec<&Value> = match args {
                [] => return Err(message("expected at least 1 argument, got 0".to_string())),
                [single] => match single.as_ref() {
                    Value::List(items) => items.iter().collect(),
                    other => {
                        return Err(message(format!(
                            "'{}' object is not iterable",
                            other.type_name()
                        )));
                    }
                },
                many => many.iter().map(|v| v.as_ref()).collect(),
            };

            let wanted = if function == "min" {
                Ordering::Less
            } else {
                Ordering::Greater
            };

            let mut iter = items.into_iter();
            let Some(mut best) = iter.next() else {
                return Err(message("arg is an empty sequence".to_string()));
            };
            for item in iter {
                if item.compare(best, if function == "min" { "lt" } else { "gt" })? == wanted {
                    best = item;
                }
            }
            best.clone()
        }
        "dumps" => {
            let [x] = exactly::<1>(args)?;
            serde_json::to_string(&x.to_json()?)
                .map(Value::Str)
                .map_err(|e| message(e.to_string()))?
        }
        "loads" => {
            let [x] = exactly::<1>(args)?;
            let Value::Str(s) = x else {
                return Err(message(format!(
                    "the JSON object must be str, not '{}'",
                    x.type_name()
                )));
            };
            serde_json::from_str::<serde_json::Value>(s)
                .map(Value::from)
                .map_err(|e| message(format!("invalid JSON: {e}")))?
        }
        "is_number" => {
            let [x] = exactly::<1>(args)?;
            Value::Bool(x.is_number())
        }
        "is_string" => {
            let [x] = exactly::<1>(args)?;
            Value::Bool(matches!(x, Value::Str(_)))
        }
        "is_bool" => {
            let [x] = exactly::<1>(args)?;
            Value::Bool(matches!(x, Value::Bool(_)))
        }
        "is_list" => {
            let [x] = exactly::<1>(args)?;
            Value::Bool(matches!(x, Value::List(_)))
        }
        "is_map" => {
            let [x] = exactly::<1>(args)?;
            Value::Bool(matches!(x, Value::Map(_)))
        }
        "is_json" => {
            let [x] = exactly::<1>(args)?;
            Value::Bool(
                x.as_str()
                    .is_some_and(|s| serde_json::from_str::<serde_json::Value>(s).is_ok()),
            )
        }
        // False for anything that is not a map keyed by the given string.
        "has_key" => {
            let [map, key] = exactly::<2>(args)?;
            Value::Bool(match (map, key) {
                (Value::Map(map), Value::Str(key)) => map.contains_key(key),
                _ => false,
            })
        }
        "type_name" => {
            let [x] = exactly::<1>(args)?;
            Value::Str(x.type_name().to_string())
        }
        other => return Err(message(format!("unknown builtin '{other}'"))),
    };

    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::Script;

    fn run(source: &str) -> Result<Scope, ScriptError> {
        let mut scope = Scope::new();
        Script::parse(source)
            .unwrap()
            .run(&Vocabulary::default(), &mut scope)?;
        Ok(scope)
    }

    fn get(scope: &Scope, name: &str) -> Value {
        scope[name].as_ref().clone()
    }

    #[test]
    fn test_arithmetic() {
        let scope = run("a = 1 + 2 * 3\nb = -a // 2\nc = 6 / 3\nd = 7 % 3").unwrap();
        assert_eq!(get(&scope, "a"), Value::Int(7));
        assert_eq!(get(&scope, "b"), Value::Int(-4));
        assert_eq!(get(&scope, "c"), Value::Float(2.0));
        assert_eq!(get(&scope, "d"), Value::Int(1));
    }

    #[test]
    fn test_logic() {
        let scope = run("a = 1 < 2 <= 2\nb = 0 or 'x'\nc = 0 and loads('{')\nd = not []").unwrap();
        assert_eq!(get(&scope, "a"), Value::Bool(true));
        assert_eq!(get(&scope, "b"), Value::from("x"));
        assert_eq!(get(&scope, "c"), Value::Int(0));
        assert_eq!(get(&scope, "d"), Value::Bool(true));
    }

    #[test]
    fn test_collections() {
        let scope = run("m = {'k': [1, 2]}\nx = m['k'][-1]\na, b = m['k']\nn = len(m)").unwrap();
        assert_eq!(get(&scope, "x"), Value::Int(2));
        assert_eq!(get(&scope, "a"), Value::Int(1));
        assert_eq!(get(&scope, "n"), Value::Int(1));

        let err = run("a, b = [1]").unwrap_err();
        assert_eq!(
            err,
            ScriptError::Value {
                line: 1,
                error: ValueError::Unpack { expected: 2, found: 1 }
            }
        );
    }

    #[test]
    fn test_wrappers_alias_their_argument() {
        let mut scope = Scope::new();
        let input = Arc::new(Value::from("shared"));
        scope.insert("input".into(), input.clone());

        Script::parse("data = Geo(input, format='GeoJSON')\nout = Output(data)")
            .unwrap()
            .run(&Vocabulary::default(), &mut scope)
            .unwrap();

        assert!(Arc::ptr_eq(&scope["out"], &input));
    }

    #[test]
    fn test_builtins() {
        let scope = run(concat!(
            "a = int('42') + int(2.9)\n",
            "b = float('1.5')\n",
            "c = max([3, 9, 4])\n",
            "d = min(3, 1, 2)\n",
            "e = loads(dumps({'x': [1, True, None]}))\n",
            "f = is_json('[1') or is_json('[1]')\n",
            "g = has_key(e, 'x') and not has_key(1, 'x')\n",
            "h = type_name(b) + str(abs(-2))\n",
            "i = Output()\n",
        ))
        .unwrap();
        assert_eq!(get(&scope, "a"), Value::Int(44));
        assert_eq!(get(&scope, "b"), Value::Float(1.5));
        assert_eq!(get(&scope, "c"), Value::Int(9));
        assert_eq!(get(&scope, "d"), Value::Int(1));
        assert_eq!(get(&scope, "f"), Value::Bool(true));
        assert_eq!(get(&scope, "g"), Value::Bool(true));
        assert_eq!(get(&scope, "h"), Value::from("float2"));
        assert_eq!(get(&scope, "i"), Value::None);
    }

    #[test]
    fn test_unrepresentable_results_are_errors() {
        let mut scope = Scope::new();
        scope.insert("s".into(), Arc::new(Value::from("ab")));
        let err = Script::parse("y = s * 9223372036854775807")
            .unwrap()
            .run(&Vocabulary::default(), &mut scope)
            .unwrap_err();
        assert_eq!(
            err,
            ScriptError::Value {
                line: 1,
                error: ValueError::Overflow("mul")
            }
        );

        assert!(matches!(
            run("x = 1\ny = dumps([float('nan')])").unwrap_err(),
            ScriptError::Value {
                line: 2,
                error: ValueError::NotJsonCompliant(_)
            }
        ));
        assert!(matches!(
            run("y = dumps(float('inf'))").unwrap_err(),
            ScriptError::Value { line: 1, .. }
        ));
    }

    #[test]
    fn test_errors_carry_lines() {
        assert_eq!(
            run("a = 1\nb = c").unwrap_err(),
            ScriptError::UndefinedName {
                line: 2,
                name: "c".into()
            }
        );
        assert!(matches!(
            run("x = 1\ny = 1 / 0").unwrap_err(),
            ScriptError::Value {
                line: 2,
                error: ValueError::ZeroDivision
            }
        ));
        assert!(matches!(
            run("len = 1\nlen([])").unwrap_err(),
            ScriptError::NotCallable { line: 2, .. }
        ));
        assert!(matches!(
            run("len(1, 2)").unwrap_err(),
            ScriptError::Call { line: 1, .. }
        ));
        assert!(matches!(
            run("eval('1')").unwrap_err(),
            ScriptError::UndefinedName { .. }
        ));
    }
}
