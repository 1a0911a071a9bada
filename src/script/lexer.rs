use crate::error::SyntaxError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Tok {
    Name(String),
    Int(i64),
    Float(f64),
    Str(String),

    True,
    False,
    None,
    And,
    Or,
    Not,
    Pass,

    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Semicolon,
    Assign,

    Plus,
    Minus,
    Star,
    Slash,
    DoubleSlash,
    Percent,

    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,

    Newline,
    Eof,
}

impl Tok {
    pub(crate) fn describe(&self) -> String {
        match self {
            Tok::Name(name) => format!("name '{name}'"),
            Tok::Int(i) => format!("number {i}"),
            Tok::Float(f) => format!("number {f}"),
            Tok::Str(_) => "string literal".to_string(),
            Tok::Newline => "end of line".to_string(),
            Tok::Eof => "end of script".to_string(),
            other => format!("'{}'", other.symbol()),
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            Tok::True => "True",
            Tok::False => "False",
            Tok::None => "None",
            Tok::And => "and",
            Tok::Or => "or",
            Tok::Not => "not",
            Tok::Pass => "pass",
            Tok::LParen => "(",
            Tok::RParen => ")",
            Tok::LBracket => "[",
            Tok::RBracket => "]",
            Tok::LBrace => "{",
            Tok::RBrace => "}",
            Tok::Comma => ",",
            Tok::Colon => ":",
            Tok::Semicolon => ";",
            Tok::Assign => "=",
            Tok::Plus => "+",
            Tok::Minus => "-",
            Tok::Star => "*",
            Tok::Slash => "/",
            Tok::DoubleSlash => "//",
            Tok::Percent => "%",
            Tok::EqEq => "==",
            Tok::NotEq => "!=",
            Tok::Lt => "<",
            Tok::Le => "<=",
            Tok::Gt => ">",
            Tok::Ge => ">=",
            _ => "?",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Token {
    pub tok: Tok,
    pub line: usize,
    pub column: usize,
}

struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: usize,
    column: usize,
    depth: usize,
    tokens: Vec<Token>,
}

pub(crate) fn tokenize(source: &str) -> Result<Vec<Token>, SyntaxError> {
    let mut lexer = Lexer {
        chars: source.chars().peekable(),
        line: 1,
        column: 1,
        depth: 0,
        tokens: Vec::new(),
    };
    lexer.run()?;
    Ok(lexer.tokens)
}

impl Lexer<'_> {
    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn error(&self, line: usize, column: usize, message: impl Into<String>) -> SyntaxError {
        SyntaxError {
            line,
            column,
            message: message.into(),
        }
    }

    fn push(&mut self, tok: Tok, line: usize, column: usize) {
        self.tokens.push(Token { tok, line, column });
    }

    fn run(&mut self) -> Result<(), SyntaxError> {
        while let Some(&c) = self.chars.peek() {
            let (line, column) = (self.line, self.column);

            match c {
                '\n' => {
                    self.bump();
                    let blank = matches!(
                        self.tokens.last(),
                        None | Some(Token { tok: Tok::Newline, .. })
                    );
                    if self.depth == 0 && !blank {
                        self.push(Tok::Newline, line, column);
                    }
                }
                ' ' | '\t' | '\r' => {
                    self.bump();
                }
                '#' => {
                    while self.chars.peek().is_some_and(|&c| c != '\n') {
                        self.bump();
                    }
                }
                '\\' => {
                    self.bump();
                    if self.chars.peek() == Some(&'\r') {
                        self.bump();
                    }
                    if self.bump() != Some('\n') {
                        return Err(self.error(line, column, "unexpected character after line continuation"));
                    }
                }
                '"' | '\'' => {
                    let s = self.string(c, line, column)?;
                    self.push(Tok::Str(s), line, column);
                }
                '0'..='9' => {
                    let tok = self.number(line, column)?;
                    self.push(tok, line, column);
                }
                '.' => {
                    let tok = self.number(line, column)?;
                    self.push(tok, line, column);
                }
                c if c.is_alphabetic() || c == '_' => {
                    let tok = self.word();
                    self.push(tok, line, column);
                }
                _ => {
                    let tok = self.symbol(line, column)?;
                    self.push(tok, line, column);
                }
            }
        }

        let (line, column) = (self.line, self.column);
        if !matches!(
            self.tokens.last(),
            None | Some(Token { tok: Tok::Newline, .. })
        ) {
            self.push(Tok::Newline, line, column);
        }
        self.push(Tok::Eof, line, column);
        Ok(())
    }

    fn word(&mut self) -> Tok {
        let mut acc = String::new();
        while let Some(&c) = self.chars.peek() {
            if c.is_alphanumeric() || c == '_' {
                acc.push(c);
                self.bump();
            } else {
                break;
            }
        }

        match acc.as_str() {
            "True" => Tok::True,
            "False" => Tok::False,
            "None" => Tok::None,
            "and" => Tok::And,
            "or" => Tok::Or,
            "not" => Tok::Not,
            "pass" => Tok::Pass,
            _ => Tok::Name(acc),
        }
    }

    fn digits(&mut self, acc: &mut String) {
        while let Some(&c) = self.chars.peek() {
            if c.is_ascii_digit() {
                acc.push(c);
                self.bump();
            } else if c == '_' {
                self.bump();
            } else {
                break;
            }
        }
    }

    fn number(&mut self, line: usize, column: usize) -> Result<Tok, SyntaxError> {
        let mut acc = String::new();
        let mut float = false;

        self.digits(&mut acc);

        if self.chars.peek() == Some(&'.') {
            float = true;
            acc.push('.');
            self.bump();
            self.digits(&mut acc);
        }

        if matches!(self.chars.peek(), Some('e' | 'E')) {
            float = true;
            acc.push('e');
            self.bump();
            if let Some(&sign @ ('+' | '-')) = self.chars.peek() {
                acc.push(sign);
                self.bump();
            }
            self.digits(&mut acc);
        }

        if acc == "." {
            return Err(self.error(line, column, "unexpected character '.'"));
        }

        if float {
            acc.parse::<f64>()
                .map(Tok::Float)
                .map_err(|_| self.error(line, column, format!("invalid number literal '{acc}'")))
        } else {
            acc.parse::<i64>()
                .map(Tok::Int)
                .map_err(|_| self.error(line, column, format!("integer literal '{acc}' is too large")))
        }
    }

    fn string(&mut self, quote: char, line: usize, column: usize) -> Result<String, SyntaxError> {
        self.bump();
        let mut acc = String::new();

        loop {
            match self.bump() {
                None | Some('\n') => {
                    return Err(self.error(line, column, "unterminated string literal"));
                }
                Some(c) if c == quote => return Ok(acc),
                Some('\\') => match self.bump() {
                    Some('n') => acc.push('\n'),
                    Some('t') => acc.push('\t'),
                    Some('r') => acc.push('\r'),
                    Some('0') => acc.push('\0'),
                    Some('\\') => acc.push('\\'),
                    Some('\'') => acc.push('\''),
                    Some('"') => acc.push('"'),
                    Some('\n') => {}
                    Some(other) => {
                        acc.push('\\');
                        acc.push(other);
                    }
                    None => {
                        return Err(self.error(line, column, "unterminated string literal"));
                    }
                },
                Some(c) => acc.push(c),
            }
        }
    }

    fn symbol(&mut self, line: usize, column: usize) -> Result<Tok, SyntaxError> {
        let Some(c) = self.bump() else {
            return Err(self.error(line, column, "unexpected end of script"));
        };
        let next = self.chars.peek().copied();

        let tok = match (c, next) {
            ('/', Some('/')) => Tok::DoubleSlash,
            ('=', Some('=')) => Tok::EqEq,
            ('!', Some('=')) => Tok::NotEq,
            ('<', Some('=')) => Tok::Le,
            ('>', Some('=')) => Tok::Ge,
            _ => {
                let tok = match c {
                    '(' => {
                        self.depth += 1;
                        Tok::LParen
                    }
                    '[' => {
                        self.depth += 1;
                        Tok::LBracket
                    }
                    '{' => {
                        self.depth += 1;
                        Tok::LBrace
                    }
                    ')' => {
                        self.depth = self.depth.saturating_sub(1);
                        Tok::RParen
                    }
                    ']' => {
                        self.depth = self.depth.saturating_sub(1);
                        Tok::RBracket
                    }
                    '}' => {
                        self.depth = self.depth.saturating_sub(1);
                        Tok::RBrace
                    }
                    ',' => Tok::Comma,
                    ':' => Tok::Colon,
                    ';' => Tok::Semicolon,
                    '=' => Tok::Assign,
                    '+' => Tok::Plus,
                    '-' => Tok::Minus,
                    '*' => Tok::Star,
                    '/' => Tok::Slash,
                    '%' => Tok::Percent,
                    '<' => Tok::Lt,
                    '>' => Tok::Gt,
                    other => {
                        return Err(self.error(line, column, format!("unexpected character '{other}'")));
                    }
                };
                return Ok(tok);
            }
        };

        self.bump();
        Ok(tok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Tok> {
        tokenize(source).unwrap().into_iter().map(|t| t.tok).collect()
    }

    #[test]
    fn test_statement() {
        assert_eq!(
            kinds("c = a // 2 # halve"),
            [
                Tok::Name("c".into()),
                Tok::Assign,
                Tok::Name("a".into()),
                Tok::DoubleSlash,
                Tok::Int(2),
                Tok::Newline,
                Tok::Eof,
            ]
        );
    }

    #[test]
    fn test_newlines_inside_brackets() {
        assert_eq!(
            kinds("x = [1,\n 2.5]\n\n"),
            [
                Tok::Name("x".into()),
                Tok::Assign,
                Tok::LBracket,
                Tok::Int(1),
                Tok::Comma,
                Tok::Float(2.5),
                Tok::RBracket,
                Tok::Newline,
                Tok::Eof,
            ]
        );
    }

    #[test]
    fn test_strings() {
        assert_eq!(
            kinds(r#"'it\'s' "a\tb""#)[..2],
            [Tok::Str("it's".into()), Tok::Str("a\tb".into())]
        );
        let err = tokenize("x = 'open").unwrap_err();
        assert_eq!((err.line, err.column), (1, 5));
    }

    #[test]
    fn test_positions() {
        let tokens = tokenize("a = 1\n  b = 2").unwrap();
        let b = tokens.iter().find(|t| t.tok == Tok::Name("b".into())).unwrap();
        assert_eq!((b.line, b.column), (2, 3));
    }

    #[test]
    fn test_bad_character() {
        assert!(tokenize("a = $").is_err());
        assert!(tokenize("a = 99999999999999999999").is_err());
    }
}
