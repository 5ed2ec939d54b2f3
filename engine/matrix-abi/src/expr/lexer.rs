use std::fmt;

use crate::error::{MatrixError, MatrixResult};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TokenKind {
    LParen,
    RParen,
    Comma,
    Question,
    Colon,
    Dot,
    /// Operator spelled as in the source (`==`, `??`, `|`, ...).
    Op(&'static str),
    Ident(String),
    /// `@name`, without the sigil.
    CallName(String),
    Str(String),
    Number(String),
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::LParen => f.write_str("("),
            TokenKind::RParen => f.write_str(")"),
            TokenKind::Comma => f.write_str(","),
            TokenKind::Question => f.write_str("?"),
            TokenKind::Colon => f.write_str(":"),
            TokenKind::Dot => f.write_str("."),
            TokenKind::Op(op) => f.write_str(op),
            TokenKind::Ident(name) => f.write_str(name),
            TokenKind::CallName(name) => write!(f, "@{name}"),
            TokenKind::Str(text) => write!(f, "'{text}'"),
            TokenKind::Number(text) => f.write_str(text),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    /// Byte offset of the first character.
    pub offset: usize,
}

const TWO_CHAR_OPS: [&str; 7] = ["==", "!=", "<=", ">=", "||", "&&", "??"];
const ONE_CHAR_OPS: [&str; 11] = ["+", "-", "*", "/", "%", "<", ">", "&", "|", "!", "="];

pub fn tokenize(input: &str) -> MatrixResult<Vec<Token>> {
    Lexer { input, pos: 0 }.run()
}

struct Lexer<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn run(mut self) -> MatrixResult<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            self.skip_ws();
            let Some(ch) = self.peek() else {
                return Ok(tokens);
            };
            let offset = self.pos;
            let kind = match ch {
                '(' => self.single(TokenKind::LParen),
                ')' => self.single(TokenKind::RParen),
                ',' => self.single(TokenKind::Comma),
                ':' => self.single(TokenKind::Colon),
                '\'' | '"' => self.lex_string(ch)?,
                '@' => self.lex_call_name()?,
                '.' if self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) => self.lex_number(),
                '.' => self.single(TokenKind::Dot),
                c if c.is_ascii_digit() => self.lex_number(),
                c if is_ident_start(c) => TokenKind::Ident(self.lex_ident()),
                _ => self.lex_operator()?,
            };
            tokens.push(Token { kind, offset });
        }
    }

    fn single(&mut self, kind: TokenKind) -> TokenKind {
        self.pos += 1;
        kind
    }

    fn lex_operator(&mut self) -> MatrixResult<TokenKind> {
        let rest = &self.input[self.pos..];
        if let Some(op) = TWO_CHAR_OPS.into_iter().find(|op| rest.starts_with(op)) {
            self.pos += 2;
            return Ok(TokenKind::Op(op));
        }
        if rest.starts_with('?') {
            self.pos += 1;
            return Ok(TokenKind::Question);
        }
        match ONE_CHAR_OPS.into_iter().find(|op| rest.starts_with(op)) {
            // A lone `=` is not an operator of the language.
            Some(op) if op != "=" => {
                self.pos += 1;
                Ok(TokenKind::Op(op))
            }
            _ => Err(self.error_here("unexpected character")),
        }
    }

    fn lex_string(&mut self, quote: char) -> MatrixResult<TokenKind> {
        let start = self.pos;
        self.bump();
        let mut text = String::new();
        loop {
            match self.bump() {
                None => {
                    return Err(MatrixError::Syntax {
                        message: format!("unterminated string starting at offset {start}"),
                        token: Some(self.input[start..].to_string()),
                    })
                }
                Some(c) if c == quote => return Ok(TokenKind::Str(text)),
                Some('\\') => {
                    let escaped = match self.bump() {
                        Some('\\') => '\\',
                        Some('\'') => '\'',
                        Some('"') => '"',
                        Some('n') => '\n',
                        Some('r') => '\r',
                        Some('t') => '\t',
                        other => {
                            return Err(MatrixError::Syntax {
                                message: format!("invalid escape at offset {}", self.pos),
                                token: other.map(|c| format!("\\{c}")),
                            })
                        }
                    };
                    text.push(escaped);
                }
                Some(c) => text.push(c),
            }
        }
    }

    fn lex_call_name(&mut self) -> MatrixResult<TokenKind> {
        self.bump();
        if !self.peek().is_some_and(is_ident_start) {
            return Err(MatrixError::Syntax {
                message: format!("expected call name after '@' at offset {}", self.pos - 1),
                token: Some("@".to_string()),
            });
        }
        Ok(TokenKind::CallName(self.lex_ident()))
    }

    fn lex_ident(&mut self) -> String {
        let start = self.pos;
        while self.peek().is_some_and(is_ident_continue) {
            self.pos += 1;
        }
        self.input[start..self.pos].to_string()
    }

    fn lex_number(&mut self) -> TokenKind {
        let start = self.pos;
        self.eat_digits();
        if self.peek() == Some('.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
            self.eat_digits();
        }
        TokenKind::Number(self.input[start..self.pos].to_string())
    }

    fn eat_digits(&mut self) {
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn peek_at(&self, skip: usize) -> Option<char> {
        self.input[self.pos..].chars().nth(skip)
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn error_here(&self, message: &str) -> MatrixError {
        MatrixError::Syntax {
            message: format!("{message} at offset {}", self.pos),
            token: self.peek().map(String::from),
        }
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

#[cfg(test)]
mod tests {
    use super::{tokenize, TokenKind};

    fn kinds(input: &str) -> Vec<TokenKind> {
        tokenize(input)
            .expect("tokenize")
            .into_iter()
            .map(|token| token.kind)
            .collect()
    }

    #[test]
    fn scans_operators_longest_first() {
        assert_eq!(
            kinds("a ?? b ? c : d"),
            vec![
                TokenKind::Ident("a".into()),
                TokenKind::Op("??"),
                TokenKind::Ident("b".into()),
                TokenKind::Question,
                TokenKind::Ident("c".into()),
                TokenKind::Colon,
                TokenKind::Ident("d".into()),
            ]
        );
        assert_eq!(
            kinds("1<=2!=!x"),
            vec![
                TokenKind::Number("1".into()),
                TokenKind::Op("<="),
                TokenKind::Number("2".into()),
                TokenKind::Op("!="),
                TokenKind::Op("!"),
                TokenKind::Ident("x".into()),
            ]
        );
    }

    #[test]
    fn scans_numbers_calls_and_params() {
        assert_eq!(
            kinds("@pow(.5, 12.25) + params.boost"),
            vec![
                TokenKind::CallName("pow".into()),
                TokenKind::LParen,
                TokenKind::Number(".5".into()),
                TokenKind::Comma,
                TokenKind::Number("12.25".into()),
                TokenKind::RParen,
                TokenKind::Op("+"),
                TokenKind::Ident("params".into()),
                TokenKind::Dot,
                TokenKind::Ident("boost".into()),
            ]
        );
    }

    #[test]
    fn decodes_string_escapes() {
        assert_eq!(
            kinds(r#"'it\'s' "a\"b\\c\n""#),
            vec![
                TokenKind::Str("it's".into()),
                TokenKind::Str("a\"b\\c\n".into()),
            ]
        );
    }

    #[test]
    fn records_byte_offsets() {
        let tokens = tokenize(" (x)").expect("tokenize");
        assert_eq!(tokens[0].offset, 1);
        assert_eq!(tokens[2].offset, 3);
    }

    #[test]
    fn rejects_unknown_characters() {
        for input in ["1 # 2", "a = b", "é_x", "'open", "@ 1", r"'\q'"] {
            let err = tokenize(input).expect_err(input);
            assert_eq!(err.code(), "SYNTAX", "{input}");
        }
    }
}
