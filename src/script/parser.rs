use crate::error::SyntaxError;
use crate::script::ast::*;
use crate::script::lexer::{Tok, Token, tokenize};
use crate::value::Value;

/// Bound on both the nesting of the source and the height of every
/// expression tree, which keeps parsing, evaluation and drop off the end of
/// the stack.
pub(crate) const MAX_DEPTH: usize = 100;

pub(crate) fn parse(source: &str) -> Result<Program, SyntaxError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    parser.program()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        // The token stream always ends with Eof, which is never consumed.
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn at(&self, tok: &Tok) -> bool {
        &self.peek().tok == tok
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if token.tok != Tok::Eof {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.at(tok) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn unexpected(&self, expected: &str) -> SyntaxError {
        let token = self.peek();
        SyntaxError {
            line: token.line,
            column: token.column,
            message: format!("expected {expected}, found {}", token.tok.describe()),
        }
    }

    fn too_deep(&self) -> SyntaxError {
        let token = self.peek();
        SyntaxError {
            line: token.line,
            column: token.column,
            message: "expression nested too deeply".to_string(),
        }
    }

    /// Runs `parse` one nesting level down.
    fn nested<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<T, SyntaxError>,
    ) -> Result<T, SyntaxError> {
        if self.depth >= MAX_DEPTH {
            return Err(self.too_deep());
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn node(&self, line: usize, kind: ExprKind) -> Result<Expr, SyntaxError> {
        let expr = Expr::new(line, kind);
        if expr.depth() > MAX_DEPTH {
            return Err(self.too_deep());
        }
        Ok(expr)
    }

    fn expect(&mut self, tok: Tok, expected: &str) -> Result<Token, SyntaxError> {
        if self.at(&tok) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn program(&mut self) -> Result<Program, SyntaxError> {
        let mut statements = Vec::new();

        loop {
            while self.eat(&Tok::Newline) || self.eat(&Tok::Semicolon) {}
            if self.at(&Tok::Eof) {
                break;
            }

            statements.push(self.statement()?);

            if !(self.eat(&Tok::Newline) || self.eat(&Tok::Semicolon) || self.at(&Tok::Eof)) {
                return Err(self.unexpected("end of statement"));
            }
        }

        Ok(Program { statements })
    }

    fn statement(&mut self) -> Result<Stmt, SyntaxError> {
        let start = self.peek().clone();

        if self.eat(&Tok::Pass) {
            return Ok(Stmt {
                line: start.line,
                kind: StmtKind::Pass,
            });
        }

        let mut parts = vec![self.expression_list()?];
        while self.eat(&Tok::Assign) {
            parts.push(self.expression_list()?);
        }

        let value = match parts.pop() {
            Some(ExprList::Single(expr)) => expr,
            Some(ExprList::Tuple(_)) => {
                return Err(SyntaxError {
                    line: start.line,
                    column: start.column,
                    message: "tuple values are not supported, use a list".to_string(),
                });
            }
            None => return Err(self.unexpected("expression")),
        };

        let kind = if parts.is_empty() {
            StmtKind::Expr(value)
        } else {
            let targets = parts
                .into_iter()
                .map(|part| self.target(part, &start))
                .collect::<Result<_, _>>()?;
            StmtKind::Assign { targets, value }
        };

        Ok(Stmt {
            line: start.line,
            kind,
        })
    }

    fn target(&self, part: ExprList, start: &Token) -> Result<Target, SyntaxError> {
        let invalid = |what: &str| SyntaxError {
            line: start.line,
            column: start.column,
            message: format!("cannot assign to {what}"),
        };

        fn name(expr: Expr) -> Option<String> {
            match expr.kind {
                ExprKind::Name(name) => Some(name),
                _ => None,
            }
        }

        match part {
            ExprList::Single(expr) => name(expr).map(Target::Name).ok_or_else(|| invalid("expression")),
            ExprList::Tuple(exprs) => exprs
                .into_iter()
                .map(name)
                .collect::<Option<Vec<_>>>()
                .map(Target::Tuple)
                .ok_or_else(|| invalid("expression in tuple")),
        }
    }

    fn expression_list(&mut self) -> Result<ExprList, SyntaxError> {
        let first = self.expression()?;
        if !self.at(&Tok::Comma) {
            return Ok(ExprList::Single(first));
        }

        let mut items = vec![first];
        while self.eat(&Tok::Comma) {
            if matches!(self.peek().tok, Tok::Assign | Tok::Newline | Tok::Semicolon | Tok::Eof) {
                break;
            }
            items.push(self.expression()?);
        }
        Ok(ExprList::Tuple(items))
    }

    fn expression(&mut self) -> Result<Expr, SyntaxError> {
        self.nested(Self::or)
    }

    fn or(&mut self) -> Result<Expr, SyntaxError> {
        let mut lhs = self.and()?;
        while self.at(&Tok::Or) {
            let line = self.advance().line;
            let rhs = self.and()?;
            lhs = self.node(line, ExprKind::Or(Box::new(lhs), Box::new(rhs)))?;
        }
        Ok(lhs)
    }

    fn and(&mut self) -> Result<Expr, SyntaxError> {
        let mut lhs = self.not()?;
        while self.at(&Tok::And) {
            let line = self.advance().line;
            let rhs = self.not()?;
            lhs = self.node(line, ExprKind::And(Box::new(lhs), Box::new(rhs)))?;
        }
        Ok(lhs)
    }

    fn not(&mut self) -> Result<Expr, SyntaxError> {
        if self.at(&Tok::Not) {
            let line = self.advance().line;
            let inner = self.nested(Self::not)?;
            return self.node(line, ExprKind::Unary(UnaryOp::Not, Box::new(inner)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr, SyntaxError> {
        let first = self.arith()?;
        let mut rest = Vec::new();

        loop {
            let op = match self.peek().tok {
                Tok::EqEq => CompareOp::Eq,
                Tok::NotEq => CompareOp::Ne,
                Tok::Lt => CompareOp::Lt,
                Tok::Le => CompareOp::Le,
                Tok::Gt => CompareOp::Gt,
                Tok::Ge => CompareOp::Ge,
                _ => break,
            };
            self.advance();
            rest.push((op, self.arith()?));
        }

        if rest.is_empty() {
            Ok(first)
        } else {
            self.node(first.line, ExprKind::Compare(Box::new(first), rest))
        }
    }

    fn arith(&mut self) -> Result<Expr, SyntaxError> {
        let mut lhs = self.term()?;
        loop {
            let op = match self.peek().tok {
                Tok::Plus => BinaryOp::Add,
                Tok::Minus => BinaryOp::Sub,
                _ => break,
            };
            let line = self.advance().line;
            let rhs = self.term()?;
            lhs = self.node(line, ExprKind::Binary(op, Box::new(lhs), Box::new(rhs)))?;
        }
        Ok(lhs)
    }

    fn term(&mut self) -> Result<Expr, SyntaxError> {
        let mut lhs = self.factor()?;
        loop {
            let op = match self.peek().tok {
                Tok::Star => BinaryOp::Mul,
                Tok::Slash => BinaryOp::Div,
                Tok::DoubleSlash => BinaryOp::FloorDiv,
                Tok::Percent => BinaryOp::Mod,
                _ => break,
            };
            let line = self.advance().line;
            let rhs = self.factor()?;
            lhs = self.node(line, ExprKind::Binary(op, Box::new(lhs), Box::new(rhs)))?;
        }
        Ok(lhs)
    }

    fn factor(&mut self) -> Result<Expr, SyntaxError> {
        let op = match self.peek().tok {
            Tok::Minus => UnaryOp::Neg,
            Tok::Plus => UnaryOp::Pos,
            _ => return self.postfix(),
        };
        let line = self.advance().line;
        let inner = self.nested(Self::factor)?;
        self.node(line, ExprKind::Unary(op, Box::new(inner)))
    }

    fn postfix(&mut self) -> Result<Expr, SyntaxError> {
        let mut expr = self.atom()?;

        loop {
            if self.at(&Tok::LParen) {
                let open = self.advance();
                let ExprKind::Name(function) = expr.kind else {
                    return Err(SyntaxError {
                        line: open.line,
                        column: open.column,
                        message: "only named functions can be called".to_string(),
                    });
                };
                let (args, keywords) = self.arguments()?;
                expr = self.node(
                    expr.line,
                    ExprKind::Call {
                        function,
                        args,
                        keywords,
                    },
                )?;
            } else if self.eat(&Tok::LBracket) {
                let key = self.expression()?;
                self.expect(Tok::RBracket, "']'")?;
                expr = self.node(expr.line, ExprKind::Index(Box::new(expr), Box::new(key)))?;
            } else {
                return Ok(expr);
            }
        }
    }

    fn arguments(&mut self) -> Result<(Vec<Expr>, Vec<Keyword>), SyntaxError> {
        let mut args = Vec::new();
        let mut keywords: Vec<Keyword> = Vec::new();

        while !self.at(&Tok::RParen) {
            let keyword = match (&self.peek().tok, self.tokens.get(self.pos + 1)) {
                (Tok::Name(name), Some(Token { tok: Tok::Assign, .. })) => Some(name.clone()),
                _ => None,
            };

            if let Some(name) = keyword {
                let token = self.advance();
                self.advance();
                if keywords.iter().any(|kw| kw.name == name) {
                    return Err(SyntaxError {
                        line: token.line,
                        column: token.column,
                        message: format!("keyword argument repeated: {name}"),
                    });
                }
                let value = self.expression()?;
                keywords.push(Keyword { name, value });
            } else {
                if !keywords.is_empty() {
                    return Err(SyntaxError {
                        line: self.peek().line,
                        column: self.peek().column,
                        message: "positional argument follows keyword argument".to_string(),
                    });
                }
                args.push(self.expression()?);
            }

            if !self.eat(&Tok::Comma) {
                break;
            }
        }

        self.expect(Tok::RParen, "')'")?;
        Ok((args, keywords))
    }

    fn atom(&mut self) -> Result<Expr, SyntaxError> {
        let token = self.peek().clone();
        let literal = |value: Value| Expr::new(token.line, ExprKind::Literal(value));

        let expr = match &token.tok {
            Tok::Name(name) => Expr::new(token.line, ExprKind::Name(name.clone())),
            Tok::Int(i) => literal(Value::Int(*i)),
            Tok::Float(f) => literal(Value::Float(*f)),
            Tok::Str(s) => literal(Value::Str(s.clone())),
            Tok::True => literal(Value::Bool(true)),
            Tok::False => literal(Value::Bool(false)),
            Tok::None => literal(Value::None),
            Tok::LParen => {
                self.advance();
                let inner = self.expression()?;
                self.expect(Tok::RParen, "')'")?;
                return Ok(inner);
            }
            Tok::LBracket => {
                self.advance();
                let mut items = Vec::new();
                while !self.at(&Tok::RBracket) {
                    items.push(self.expression()?);
                    if !self.eat(&Tok::Comma) {
                        break;
                    }
                }
                self.expect(Tok::RBracket, "']'")?;
                return self.node(token.line, ExprKind::List(items));
            }
            Tok::LBrace => {
                self.advance();
                let mut entries = Vec::new();
                while !self.at(&Tok::RBrace) {
                    let key = self.expression()?;
                    self.expect(Tok::Colon, "':'")?;
                    let value = self.expression()?;
                    entries.push((key, value));
                    if !self.eat(&Tok::Comma) {
                        break;
                    }
                }
                self.expect(Tok::RBrace, "'}'")?;
                return self.node(token.line, ExprKind::Map(entries));
            }
            _ => return Err(self.unexpected("expression")),
        };

        self.advance();
        Ok(expr)
    }
}

enum ExprList {
    Single(Expr),
    Tuple(Vec<Expr>),
}
