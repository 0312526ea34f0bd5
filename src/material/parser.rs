//! Recursive-descent parser for material expressions.
//!
//! ```text
//! expr  := bxdf "(" [param ("," param)*] ")"
//!        | "mix" "(" expr "," expr "," number ")"
//!        | "mixMap" "(" expr "," expr "," string ")"
//!        | "bumpMap" "(" expr "," string ")"
//!        | "normalMap" "(" expr "," string ")"
//!        | "disperse" "(" expr "," "intIOR" ":" value "," "extIOR" ":" value ")"
//!        | identifier
//! param := name ":" value
//! value := number | "{" number "," number "," number "}" | string
//! ```

use super::ast::{BxdfParam, BxdfType, Expr, ParamType, ParamValue};
use crate::util::{ParseError, Vec3};

/// Deepest operator nesting a single expression may use.
pub const MAX_NESTING: usize = 256;

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Ident(String),
    Number(f32),
    Str(String),
    LParen,
    RParen,
    LBrace,
    RBrace,
    Comma,
    Colon,
    End,
}

impl TokenKind {
    fn describe(&self) -> String {
        match self {
            Self::Ident(s) => format!("identifier `{s}`"),
            Self::Number(n) => format!("number {n}"),
            Self::Str(s) => format!("string \"{s}\""),
            Self::LParen => "`(`".into(),
            Self::RParen => "`)`".into(),
            Self::LBrace => "`{`".into(),
            Self::RBrace => "`}`".into(),
            Self::Comma => "`,`".into(),
            Self::Colon => "`:`".into(),
            Self::End => "end of expression".into(),
        }
    }
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    /// 1-based column.
    column: usize,
    len: usize,
}

fn tokenize(src: &str) -> Result<Vec<Token>, ParseError> {
    let chars: Vec<char> = src.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let start = i;
        let single = match c {
            '(' => Some(TokenKind::LParen),
            ')' => Some(TokenKind::RParen),
            '{' => Some(TokenKind::LBrace),
            '}' => Some(TokenKind::RBrace),
            ',' => Some(TokenKind::Comma),
            ':' => Some(TokenKind::Colon),
            _ => None,
        };

        if let Some(kind) = single {
            tokens.push(Token { kind, column: start + 1, len: 1 });
            i += 1;
        } else if c.is_whitespace() {
            i += 1;
        } else if c.is_ascii_alphabetic() || c == '_' {
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            tokens.push(Token {
                kind: TokenKind::Ident(chars[start..i].iter().collect()),
                column: start + 1,
                len: i - start,
            });
        } else if c.is_ascii_digit() || c == '.' || c == '-' || c == '+' {
            i += 1;
            while i < chars.len() {
                let d = chars[i];
                let exp_sign = (d == '-' || d == '+') && matches!(chars[i - 1], 'e' | 'E');
                if d.is_ascii_digit() || d == '.' || d == 'e' || d == 'E' || exp_sign {
                    i += 1;
                } else {
                    break;
                }
            }
            let text: String = chars[start..i].iter().collect();
            let value = text
                .parse::<f32>()
                .map_err(|_| ParseError::new(format!("invalid number `{text}`"), src, start + 1, i - start))?;
            tokens.push(Token {
                kind: TokenKind::Number(value),
                column: start + 1,
                len: i - start,
            });
        } else if c == '"' {
            i += 1;
            while i < chars.len() && chars[i] != '"' {
                i += 1;
            }
            if i == chars.len() {
                return Err(ParseError::new("unterminated string", src, start + 1, i - start));
            }
            let text: String = chars[start + 1..i].iter().collect();
            i += 1;
            tokens.push(Token {
                kind: TokenKind::Str(text),
                column: start + 1,
                len: i - start,
            });
        } else {
            return Err(ParseError::new(format!("unexpected character `{c}`"), src, start + 1, 1));
        }
    }

    tokens.push(Token {
        kind: TokenKind::End,
        column: chars.len() + 1,
        len: 1,
    });
    Ok(tokens)
}

struct Parser<'a> {
    src: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> &Token {
        // tokenize always terminates the stream with End
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn next(&mut self) -> Token {
        let tok = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn error_at(&self, tok: &Token, message: impl Into<String>) -> ParseError {
        ParseError::new(message, self.src, tok.column, tok.len)
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token, ParseError> {
        let tok = self.next();
        if tok.kind == kind {
            Ok(tok)
        } else {
            Err(self.error_at(
                &tok,
                format!("expected {}, found {}", kind.describe(), tok.kind.describe()),
            ))
        }
    }

    fn expect_keyword(&mut self, word: &str) -> Result<(), ParseError> {
        let tok = self.next();
        match &tok.kind {
            TokenKind::Ident(s) if s == word => Ok(()),
            other => Err(self.error_at(&tok, format!("expected `{word}`, found {}", other.describe()))),
        }
    }

    fn number(&mut self) -> Result<f32, ParseError> {
        let tok = self.next();
        match tok.kind {
            TokenKind::Number(n) => Ok(n),
            ref other => Err(self.error_at(&tok, format!("expected number, found {}", other.describe()))),
        }
    }

    fn string(&mut self) -> Result<String, ParseError> {
        let tok = self.next();
        match tok.kind {
            TokenKind::Str(s) => Ok(s),
            ref other => Err(self.error_at(&tok, format!("expected string, found {}", other.describe()))),
        }
    }

    /// `string_is_ior` selects how a quoted value is read.
    fn value(&mut self, string_is_ior: bool) -> Result<ParamValue, ParseError> {
        let tok = self.next();
        match tok.kind {
            TokenKind::Number(n) => Ok(ParamValue::Scalar(n)),
            TokenKind::Str(s) if string_is_ior => Ok(ParamValue::KnownIor(s)),
            TokenKind::Str(s) => Ok(ParamValue::Texture(s)),
            TokenKind::LBrace => {
                let x = self.number()?;
                self.expect(TokenKind::Comma)?;
                let y = self.number()?;
                self.expect(TokenKind::Comma)?;
                let z = self.number()?;
                self.expect(TokenKind::RBrace)?;
                Ok(ParamValue::Vector(Vec3::new(x, y, z)))
            }
            ref other => Err(self.error_at(&tok, format!("expected value, found {}", other.describe()))),
        }
    }

    fn param(&mut self) -> Result<BxdfParam, ParseError> {
        let tok = self.next();
        let param = match &tok.kind {
            TokenKind::Ident(name) => ParamType::from_name(name)
                .ok_or_else(|| self.error_at(&tok, format!("unknown parameter `{name}`")))?,
            other => return Err(self.error_at(&tok, format!("expected parameter name, found {}", other.describe()))),
        };
        self.expect(TokenKind::Colon)?;
        let value = self.value(param.is_ior())?;
        Ok(BxdfParam { param, value })
    }

    fn expr(&mut self) -> Result<Expr, ParseError> {
        if self.depth == MAX_NESTING {
            let tok = self.peek().clone();
            return Err(self.error_at(&tok, format!("expression nested deeper than {MAX_NESTING} levels")));
        }
        self.depth += 1;
        let expr = self.term();
        self.depth -= 1;
        expr
    }

    fn term(&mut self) -> Result<Expr, ParseError> {
        let tok = self.next();
        let name = match &tok.kind {
            TokenKind::Ident(name) => name.clone(),
            other => return Err(self.error_at(&tok, format!("expected expression, found {}", other.describe()))),
        };

        if self.peek().kind != TokenKind::LParen {
            return Ok(Expr::MaterialRef(name));
        }
        self.next();

        let expr = if let Some(bxdf) = BxdfType::from_name(&name) {
            let mut params = Vec::new();
            if self.peek().kind != TokenKind::RParen {
                params.push(self.param()?);
                while self.peek().kind == TokenKind::Comma {
                    self.next();
                    params.push(self.param()?);
                }
            }
            Expr::Bxdf { bxdf, params }
        } else {
            match name.as_str() {
                "mix" => {
                    let left = Box::new(self.expr()?);
                    self.expect(TokenKind::Comma)?;
                    let right = Box::new(self.expr()?);
                    self.expect(TokenKind::Comma)?;
                    let weight = self.number()?;
                    Expr::Mix { left, right, weight }
                }
                "mixMap" => {
                    let left = Box::new(self.expr()?);
                    self.expect(TokenKind::Comma)?;
                    let right = Box::new(self.expr()?);
                    self.expect(TokenKind::Comma)?;
                    let texture = self.string()?;
                    Expr::MixMap { left, right, texture }
                }
                "bumpMap" | "normalMap" => {
                    let child = Box::new(self.expr()?);
                    self.expect(TokenKind::Comma)?;
                    let texture = self.string()?;
                    if name == "bumpMap" {
                        Expr::BumpMap { child, texture }
                    } else {
                        Expr::NormalMap { child, texture }
                    }
                }
                "disperse" => {
                    let child = Box::new(self.expr()?);
                    self.expect(TokenKind::Comma)?;
                    self.expect_keyword("intIOR")?;
                    self.expect(TokenKind::Colon)?;
                    let int_ior = self.value(true)?;
                    self.expect(TokenKind::Comma)?;
                    self.expect_keyword("extIOR")?;
                    self.expect(TokenKind::Colon)?;
                    let ext_ior = self.value(true)?;
                    Expr::Disperse { child, int_ior, ext_ior }
                }
                _ => return Err(self.error_at(&tok, format!("unknown function `{name}`"))),
            }
        };

        self.expect(TokenKind::RParen)?;
        Ok(expr)
    }
}

/// Parse a complete material expression.
pub fn parse_expr(src: &str) -> Result<Expr, ParseError> {
    let mut parser = Parser {
        src,
        tokens: tokenize(src)?,
        pos: 0,
        depth: 0,
    };
    let expr = parser.expr()?;
    let tok = parser.next();
    if tok.kind != TokenKind::End {
        return Err(parser.error_at(&tok, format!("unexpected {} after expression", tok.kind.describe())));
    }
    Ok(expr)
}
