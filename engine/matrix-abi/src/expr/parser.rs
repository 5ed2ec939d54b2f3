use crate::error::{MatrixError, MatrixResult};
use crate::expr::ast::{BinaryOp, Expr, UnaryOp};
use crate::expr::lexer::{tokenize, Token, TokenKind};

/// Deepest syntactic nesting the parser accepts. Each level costs a full
/// descent through the precedence functions, so this stays well inside a
/// 2 MiB thread stack in unoptimized builds.
pub const MAX_NESTING: usize = 64;

pub fn parse(input: &str) -> MatrixResult<Expr> {
    let tokens = tokenize(input)?;
    parse_tokens(&tokens)
}

pub fn parse_tokens(tokens: &[Token]) -> MatrixResult<Expr> {
    let mut parser = Parser {
        tokens,
        pos: 0,
        nesting: 0,
    };
    let expr = parser.parse_expr()?;
    if let Some(token) = parser.peek_token() {
        return Err(unexpected(token, "unexpected tokens at end of input"));
    }
    Ok(expr)
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    nesting: usize,
}

impl<'a> Parser<'a> {
    fn parse_expr(&mut self) -> MatrixResult<Expr> {
        self.enter()?;
        let cond = self.parse_or()?;
        let expr = if self.eat(&TokenKind::Question) {
            let then = self.parse_expr()?;
            self.expect(&TokenKind::Colon)?;
            let otherwise = self.parse_expr()?;
            Expr::Ternary {
                cond: Box::new(cond),
                then: Box::new(then),
                otherwise: Box::new(otherwise),
            }
        } else {
            cond
        };
        self.leave(1);
        Ok(expr)
    }

    fn parse_or(&mut self) -> MatrixResult<Expr> {
        self.parse_chain(Self::parse_and, |kind| match kind {
            TokenKind::Op("|" | "||") => Some(BinaryOp::Or),
            _ => None,
        })
    }

    fn parse_and(&mut self) -> MatrixResult<Expr> {
        self.parse_chain(Self::parse_equality, |kind| match kind {
            TokenKind::Op("&" | "&&") => Some(BinaryOp::And),
            _ => None,
        })
    }

    fn parse_equality(&mut self) -> MatrixResult<Expr> {
        self.parse_chain(Self::parse_relational, |kind| match kind {
            TokenKind::Op("==") => Some(BinaryOp::Eq),
            TokenKind::Op("!=") => Some(BinaryOp::Ne),
            _ => None,
        })
    }

    fn parse_relational(&mut self) -> MatrixResult<Expr> {
        self.parse_chain(Self::parse_additive, |kind| match kind {
            TokenKind::Op("<") => Some(BinaryOp::Lt),
            TokenKind::Op("<=") => Some(BinaryOp::Le),
            TokenKind::Op(">") => Some(BinaryOp::Gt),
            TokenKind::Op(">=") => Some(BinaryOp::Ge),
            _ => None,
        })
    }

    fn parse_additive(&mut self) -> MatrixResult<Expr> {
        self.parse_chain(Self::parse_multiplicative, |kind| match kind {
            TokenKind::Op("+") => Some(BinaryOp::Add),
            TokenKind::Op("-") => Some(BinaryOp::Sub),
            _ => None,
        })
    }

    fn parse_multiplicative(&mut self) -> MatrixResult<Expr> {
        self.parse_chain(Self::parse_unary, |kind| match kind {
            TokenKind::Op("*") => Some(BinaryOp::Mul),
            TokenKind::Op("/") => Some(BinaryOp::Div),
            TokenKind::Op("%") => Some(BinaryOp::Rem),
            _ => None,
        })
    }

    /// Left-associative binary level. Every link of the chain counts as one
    /// level of nesting because it deepens the tree by one.
    fn parse_chain(
        &mut self,
        operand: fn(&mut Self) -> MatrixResult<Expr>,
        operator: fn(&TokenKind) -> Option<BinaryOp>,
    ) -> MatrixResult<Expr> {
        let mut left = operand(self)?;
        let mut links = 0;
        while let Some(op) = self.peek_kind().and_then(operator) {
            self.pos += 1;
            self.enter()?;
            links += 1;
            let right = operand(self)?;
            left = Expr::binary(op, left, right);
        }
        self.leave(links);
        Ok(left)
    }

    fn parse_unary(&mut self) -> MatrixResult<Expr> {
        let op = match self.peek_kind() {
            Some(TokenKind::Op("!")) => UnaryOp::Not,
            Some(TokenKind::Op("-")) => UnaryOp::Neg,
            Some(TokenKind::Op("+")) => UnaryOp::Plus,
            _ => return self.parse_postfix(),
        };
        self.pos += 1;
        self.enter()?;
        let expr = self.parse_unary()?;
        self.leave(1);
        Ok(Expr::Unary {
            op,
            expr: Box::new(expr),
        })
    }

    fn parse_postfix(&mut self) -> MatrixResult<Expr> {
        let left = self.parse_primary()?;
        if self.eat(&TokenKind::Op("??")) {
            let right = self.parse_primary()?;
            return Ok(Expr::Coalesce {
                left: Box::new(left),
                right: Box::new(right),
            });
        }
        Ok(left)
    }

    fn parse_primary(&mut self) -> MatrixResult<Expr> {
        let Some(token) = self.next_token() else {
            return Err(end_of_input("expected an expression"));
        };
        match &token.kind {
            TokenKind::LParen => {
                let expr = self.parse_expr()?;
                self.expect(&TokenKind::RParen)?;
                Ok(expr)
            }
            TokenKind::Number(text) => Ok(Expr::number(text.clone())),
            TokenKind::Str(text) => Ok(Expr::string(text.clone())),
            TokenKind::CallName(name) => self.parse_call(name.clone()),
            TokenKind::Ident(name) => match name.as_str() {
                "_score" => Ok(Expr::Score),
                "true" => Ok(Expr::Bool { value: true }),
                "false" => Ok(Expr::Bool { value: false }),
                "null" => Ok(Expr::Null),
                "params" => self.parse_param(),
                _ => Err(unexpected(token, "unexpected identifier")),
            },
            _ => Err(unexpected(token, "unexpected token")),
        }
    }

    fn parse_param(&mut self) -> MatrixResult<Expr> {
        self.expect(&TokenKind::Dot)?;
        match self.next_token() {
            Some(Token {
                kind: TokenKind::Ident(name),
                ..
            }) => Ok(Expr::Param { name: name.clone() }),
            Some(token) => Err(unexpected(token, "expected parameter name after 'params.'")),
            None => Err(end_of_input("expected parameter name after 'params.'")),
        }
    }

    fn parse_call(&mut self, name: String) -> MatrixResult<Expr> {
        self.expect(&TokenKind::LParen)?;
        let mut args = Vec::new();
        if !self.eat(&TokenKind::RParen) {
            loop {
                args.push(self.parse_expr()?);
                if self.eat(&TokenKind::Comma) {
                    continue;
                }
                self.expect(&TokenKind::RParen)?;
                break;
            }
        }
        Ok(Expr::Call { name, args })
    }

    fn enter(&mut self) -> MatrixResult<()> {
        self.nesting += 1;
        if self.nesting > MAX_NESTING {
            let token = self.peek_token().map(|token| token.kind.to_string());
            return Err(MatrixError::Syntax {
                message: format!("expression nesting exceeds {MAX_NESTING}"),
                token,
            });
        }
        Ok(())
    }

    fn leave(&mut self, levels: usize) {
        self.nesting -= levels;
    }

    fn expect(&mut self, kind: &TokenKind) -> MatrixResult<()> {
        match self.next_token() {
            Some(token) if &token.kind == kind => Ok(()),
            Some(token) => Err(unexpected(token, &format!("expected '{kind}'"))),
            None => Err(end_of_input(&format!("expected '{kind}'"))),
        }
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek_kind() == Some(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn peek_token(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self) -> Option<&'a TokenKind> {
        self.peek_token().map(|token| &token.kind)
    }

    fn next_token(&mut self) -> Option<&'a Token> {
        let token = self.tokens.get(self.pos)?;
        self.pos += 1;
        Some(token)
    }
}

fn unexpected(token: &Token, message: &str) -> MatrixError {
    MatrixError::Syntax {
        message: format!("{message}: '{}' at offset {}", token.kind, token.offset),
        token: Some(token.kind.to_string()),
    }
}

fn end_of_input(message: &str) -> MatrixError {
    MatrixError::Syntax {
        message: format!("{message}, found end of input"),
        token: None,
    }
}

#[cfg(test)]
mod tests {
    use super::{parse, MAX_NESTING};
    use crate::error::MatrixError;
    use crate::expr::ast::{BinaryOp, Expr, UnaryOp};

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        let ast = parse("1 + 2 * 3").expect("parse");
        assert_eq!(
            ast,
            Expr::binary(
                BinaryOp::Add,
                Expr::number("1"),
                Expr::binary(BinaryOp::Mul, Expr::number("2"), Expr::number("3")),
            )
        );
    }

    #[test]
    fn single_bar_and_ampersand_normalize_to_logical_ops() {
        let ast = parse("1 | 0 & 1").expect("parse");
        assert_eq!(
            ast,
            Expr::binary(
                BinaryOp::Or,
                Expr::number("1"),
                Expr::binary(BinaryOp::And, Expr::number("0"), Expr::number("1")),
            )
        );
    }

    #[test]
    fn ternary_is_right_associative() {
        let ast = parse("_score > 1 ? 1 : _score > 0 ? 2 : 3").expect("parse");
        let Expr::Ternary { otherwise, .. } = ast else {
            panic!("expected ternary");
        };
        assert!(matches!(*otherwise, Expr::Ternary { .. }));
    }

    #[test]
    fn coalesce_is_single_level() {
        let ast = parse("params.a ?? 7").expect("parse");
        assert!(matches!(ast, Expr::Coalesce { .. }));
        let err = parse("params.a ?? params.b ?? 7").expect_err("chained coalesce");
        assert!(matches!(err, MatrixError::Syntax { token: Some(ref t), .. } if t == "??"));
    }

    #[test]
    fn parses_literals_and_unary_chains() {
        let ast = parse("!-true").expect("parse");
        assert_eq!(
            ast,
            Expr::Unary {
                op: UnaryOp::Not,
                expr: Box::new(Expr::Unary {
                    op: UnaryOp::Neg,
                    expr: Box::new(Expr::Bool { value: true }),
                }),
            }
        );
        assert_eq!(parse("null").expect("parse"), Expr::Null);
    }

    #[test]
    fn reports_offending_tokens() {
        let cases = [
            ("(1 + 2", None),
            ("@min(1 2)", Some("2")),
            ("1 +", None),
            ("1 2", Some("2")),
            ("foo", Some("foo")),
            ("params.", None),
            ("@clamp", None),
            ("1 ? 2", None),
        ];
        for (input, token) in cases {
            match parse(input) {
                Err(MatrixError::Syntax { token: got, .. }) => {
                    assert_eq!(got.as_deref(), token, "input {input}")
                }
                other => panic!("{input}: expected syntax error, got {other:?}"),
            }
        }
    }

    #[test]
    fn rejects_excessive_nesting() {
        let deep = format!("{}1{}", "(".repeat(MAX_NESTING), ")".repeat(MAX_NESTING));
        let err = parse(&deep).expect_err("too deep");
        assert_eq!(err.code(), "SYNTAX");

        let long_chain = vec!["1"; MAX_NESTING + 2].join(" + ");
        assert!(parse(&long_chain).is_err());

        let shallow = format!("{}1{}", "(".repeat(MAX_NESTING - 1), ")".repeat(MAX_NESTING - 1));
        assert_eq!(parse(&shallow).expect("parse"), Expr::number("1"));
    }

    #[test]
    fn deepest_accepted_nesting_fits_a_small_stack() {
        let worker = std::thread::Builder::new()
            .stack_size(2 * 1024 * 1024)
            .spawn(|| {
                let at_limit = format!(
                    "{}-1{}",
                    "(".repeat(MAX_NESTING - 2),
                    ")".repeat(MAX_NESTING - 2)
                );
                let accepted = parse(&at_limit).is_ok();
                let over = format!("{}1{}", "(".repeat(MAX_NESTING * 4), ")".repeat(MAX_NESTING * 4));
                (accepted, parse(&over).map_err(|err| err.code()))
            })
            .expect("spawn parser thread");
        let (accepted, over) = worker.join().expect("parser thread completes");
        assert!(accepted);
        assert_eq!(over, Err("SYNTAX"));
    }
}
