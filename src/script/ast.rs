use crate::value::Value;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Program {
    pub statements: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Stmt {
    pub line: usize,
    pub kind: StmtKind,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum StmtKind {
    /// `t1 = t2 = ... = value`, assigned right to left.
    Assign { targets: Vec<Target>, value: Expr },
    Expr(Expr),
    Pass,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Target {
    Name(String),
    Tuple(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Expr {
    pub line: usize,
    pub kind: ExprKind,
    depth: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ExprKind {
    Literal(Value),
    Name(String),
    List(Vec<Expr>),
    Map(Vec<(Expr, Expr)>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    /// `a < b <= c`, evaluated pairwise with short-circuiting.
    Compare(Box<Expr>, Vec<(CompareOp, Expr)>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Call {
        function: String,
        args: Vec<Expr>,
        keywords: Vec<Keyword>,
    },
    Index(Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Keyword {
    pub name: String,
    pub value: Expr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UnaryOp {
    Neg,
    Pos,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Expr {
    pub(crate) fn new(line: usize, kind: ExprKind) -> Self {
        fn deepest<'a>(exprs: impl Iterator<Item = &'a Expr>) -> usize {
            exprs.map(|e| e.depth).max().unwrap_or(0)
        }

        let children = match &kind {
            ExprKind::Literal(_) | ExprKind::Name(_) => 0,
            ExprKind::List(items) => deepest(items.iter()),
            ExprKind::Map(entries) => deepest(entries.iter().flat_map(|(k, v)| [k, v])),
            ExprKind::Unary(_, inner) => inner.depth,
            ExprKind::Binary(_, lhs, rhs)
            | ExprKind::And(lhs, rhs)
            | ExprKind::Or(lhs, rhs)
            | ExprKind::Index(lhs, rhs) => lhs.depth.max(rhs.depth),
            ExprKind::Compare(first, rest) => {
                first.depth.max(deepest(rest.iter().map(|(_, e)| e)))
            }
            ExprKind::Call { args, keywords, .. } => {
                deepest(args.iter().chain(keywords.iter().map(|kw| &kw.value)))
            }
        };

        Self {
            line,
            kind,
            depth: children + 1,
        }
    }

    /// Height of the expression tree, a leaf counting as 1.
    pub(crate) fn depth(&self) -> usize {
        self.depth
    }

    /// The literal this expression denotes, if it is built from literals
    /// only. Negated numbers, lists and maps of literals count.
    pub(crate) fn as_literal(&self) -> Option<Value> {
        match &self.kind {
            ExprKind::Literal(value) => Some(value.clone()),
            ExprKind::Unary(UnaryOp::Neg, inner) => match inner.as_literal()? {
                value @ (Value::Int(_) | Value::Float(_)) => value.neg().ok(),
                _ => None,
            },
            ExprKind::List(items) => items
                .iter()
                .map(Expr::as_literal)
                .collect::<Option<Vec<_>>>()
                .map(Value::List),
            ExprKind::Map(entries) => entries
                .iter()
                .map(|(k, v)| match k.as_literal()? {
                    Value::Str(k) => Some((k, v.as_literal()?)),
                    _ => None,
                })
                .collect::<Option<_>>()
                .map(Value::Map),
            _ => None,
        }
    }

    /// Visits this expression and every nested expression, parents before
    /// children and call arguments left to right.
    pub(crate) fn walk<'a, E>(
        &'a self,
        visit: &mut impl FnMut(&'a Expr) -> Result<(), E>,
    ) -> Result<(), E> {
        visit(self)?;
        match &self.kind {
            ExprKind::Literal(_) | ExprKind::Name(_) => Ok(()),
            ExprKind::List(items) => items.iter().try_for_each(|e| e.walk(visit)),
            ExprKind::Map(entries) => entries.iter().try_for_each(|(k, v)| {
                k.walk(visit)?;
                v.walk(visit)
            }),
            ExprKind::Unary(_, inner) => inner.walk(visit),
            ExprKind::Binary(_, lhs, rhs)
            | ExprKind::And(lhs, rhs)
            | ExprKind::Or(lhs, rhs)
            | ExprKind::Index(lhs, rhs) => {
                lhs.walk(visit)?;
                rhs.walk(visit)
            }
            ExprKind::Compare(first, rest) => {
                first.walk(visit)?;
                rest.iter().try_for_each(|(_, e)| e.walk(visit))
            }
            ExprKind::Call { args, keywords, .. } => {
                args.iter().try_for_each(|e| e.walk(visit))?;
                keywords.iter().try_for_each(|kw| kw.value.walk(visit))
            }
        }
    }
}
