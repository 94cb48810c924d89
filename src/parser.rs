//! Recursive-descent parser with standard precedence climbing. Consumes
//! a token stream and emits an immutable AST, or the first syntactic
//! violation encountered; no partial AST is ever returned.

use crate::ast::{BinaryOp, Expr, Literal, UnaryOp};
use crate::error::ParseError;
use crate::token::{Token, TokenKind};

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(tokens: &'a [Token]) -> Self {
        Parser { tokens, pos: 0 }
    }

    fn current(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current().kind == kind
    }

    fn advance(&mut self) -> &Token {
        let tok = &self.tokens[self.pos];
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn expect(&mut self, kind: TokenKind, expected: &str) -> Result<&Token, ParseError> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        let tok = self.current();
        if tok.is_eof() {
            ParseError::UnexpectedEof {
                expected: expected.to_string(),
                line: tok.line,
                column: tok.column,
            }
        } else {
            ParseError::UnexpectedToken {
                found: tok.text.clone(),
                expected: expected.to_string(),
                line: tok.line,
                column: tok.column,
            }
        }
    }

    fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_and()?;
        while self.check(TokenKind::Or) {
            self.advance();
            let right = self.parse_and()?;
            left = Expr::binary(BinaryOp::Or, left, right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_equality()?;
        while self.check(TokenKind::And) {
            self.advance();
            let right = self.parse_equality()?;
            left = Expr::binary(BinaryOp::And, left, right);
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_comparison()?;
        loop {
            let op = match self.current().kind {
                TokenKind::EqEq => BinaryOp::Eq,
                TokenKind::NotEq => BinaryOp::NotEq,
                _ => break,
            };
            self.advance();
            let right = self.parse_comparison()?;
            left = Expr::binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.current().kind {
                TokenKind::Lt => BinaryOp::Lt,
                TokenKind::LtEq => BinaryOp::LtEq,
                TokenKind::Gt => BinaryOp::Gt,
                TokenKind::GtEq => BinaryOp::GtEq,
                TokenKind::In => BinaryOp::In,
                TokenKind::Matches => BinaryOp::Matches,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        if self.check(TokenKind::Not) {
            self.advance();
            let inner = self.parse_unary()?;
            return Ok(Expr::unary(UnaryOp::Not, inner));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.current().kind {
                TokenKind::Dot => {
                    self.advance();
                    let name_tok = self.expect(TokenKind::Identifier, "field name after '.'")?;
                    let extra: Vec<String> =
                        name_tok.text.split('.').map(|s| s.to_string()).collect();
                    let (line, column) = (name_tok.line, name_tok.column);
                    match expr {
                        Expr::FieldAccess { root, mut fields } => {
                            fields.extend(extra);
                            expr = Expr::FieldAccess { root, fields };
                        }
                        _ => {
                            return Err(ParseError::UnexpectedToken {
                                found: ".".to_string(),
                                expected: "field access is only valid after another field access"
                                    .to_string(),
                                line,
                                column,
                            });
                        }
                    }
                }
                TokenKind::LeftBracket => {
                    self.advance();
                    let index = self.parse_expr()?;
                    self.expect(TokenKind::RightBracket, "']'")?;
                    expr = Expr::index(expr, index);
                }
                TokenKind::LeftParen => {
                    let function = field_access_to_dotted_name(&expr).ok_or_else(|| {
                        ParseError::UnexpectedToken {
                            found: "(".to_string(),
                            expected: "a callable (dotted) name before '('".to_string(),
                            line: self.current().line,
                            column: self.current().column,
                        }
                    })?;
                    self.advance();
                    let args = self.parse_args()?;
                    self.expect(TokenKind::RightParen, "')'")?;
                    expr = Expr::call(function, args);
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_args(&mut self) -> Result<Vec<Expr>, ParseError> {
        let mut args = Vec::new();
        if self.check(TokenKind::RightParen) {
            return Ok(args);
        }
        args.push(self.parse_expr()?);
        while self.check(TokenKind::Comma) {
            self.advance();
            args.push(self.parse_expr()?);
        }
        Ok(args)
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let tok = self.current().clone();
        match tok.kind {
            TokenKind::String => {
                self.advance();
                Ok(Expr::Literal(Literal::Str(tok.text)))
            }
            TokenKind::Number => {
                self.advance();
                let value: f64 = tok.text.parse().expect("lexer validated number syntax");
                Ok(Expr::Literal(Literal::Num(value)))
            }
            TokenKind::Boolean => {
                self.advance();
                Ok(Expr::Literal(Literal::Bool(tok.text == "true")))
            }
            TokenKind::Identifier => {
                self.advance();
                let mut segments = tok.text.split('.').map(|s| s.to_string());
                let root = segments.next().unwrap_or_default();
                let fields: Vec<String> = segments.collect();
                Ok(Expr::FieldAccess { root, fields })
            }
            TokenKind::LeftParen => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect(TokenKind::RightParen, "')'")?;
                Ok(inner)
            }
            _ => Err(self.unexpected(
                "a literal, identifier, or parenthesized expression",
            )),
        }
    }
}

/// A `FieldAccess` with no index/call in between collapses to a single
/// dotted name, used both for call targets (`trace.has`) and nothing
/// else — once postfix builds an `IndexAccess`/`Call`, it's no longer a
/// valid call target.
fn field_access_to_dotted_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::FieldAccess { root, fields } if fields.is_empty() => Some(root.clone()),
        Expr::FieldAccess { root, fields } => Some(format!("{root}.{}", fields.join("."))),
        _ => None,
    }
}

/// Parse a full token stream (as produced by [`crate::lexer::lex`]) into
/// an AST. Fails on the first syntactic violation or on trailing tokens
/// after a complete expression.
pub fn parse(tokens: &[Token]) -> Result<Expr, ParseError> {
    // Empty or all-whitespace source: there is no token to point a finger
    // at, so name the only position that makes sense, the very start.
    if tokens.first().map_or(true, Token::is_eof) {
        return Err(ParseError::UnexpectedEof {
            expected: "an expression".to_string(),
            line: 1,
            column: 1,
        });
    }
    let mut parser = Parser::new(tokens);
    let expr = parser.parse_expr()?;
    if !parser.check(TokenKind::Eof) {
        let tok = parser.current();
        return Err(ParseError::UnexpectedToken {
            found: tok.text.clone(),
            expected: "end of input".to_string(),
            line: tok.line,
            column: tok.column,
        });
    }
    Ok(expr)
}

/// Lex then parse rule text in one call; the entry point `Load` uses.
pub fn parse_str(source: &str) -> Result<Expr, ParseError> {
    let tokens = crate::lexer::lex(source)?;
    parse(&tokens)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ast(src: &str) -> Expr {
        parse_str(src).unwrap_or_else(|e| panic!("failed to parse {src:?}: {e}"))
    }

    #[test]
    fn simple_scalar_equality() {
        let e = ast(r#"span.status == "ERROR""#);
        assert_eq!(
            e,
            Expr::binary(
                BinaryOp::Eq,
                Expr::field_access("span", vec!["status".into()]),
                Expr::Literal(Literal::Str("ERROR".into())),
            )
        );
    }

    #[test]
    fn dotted_field_access_and_and_or_precedence() {
        let e = ast(r#"span.status == "ERROR" and span.attributes["http.method"] == "POST""#);
        match e {
            Expr::Binary {
                op: BinaryOp::And, ..
            } => {}
            other => panic!("expected top-level and, got {other:?}"),
        }
    }

    #[test]
    fn call_from_dotted_name() {
        let e = ast("trace.has(k8s.pod.name/app-v1@prod)");
        match e {
            Expr::Call { function, args } => {
                assert_eq!(function, "trace.has");
                assert_eq!(args.len(), 1);
            }
            other => panic!("expected call, got {other:?}"),
        }
    }

    #[test]
    fn operator_precedence_or_lowest() {
        // a or b and c  ==  a or (b and c)
        let e = ast("a or b and c");
        match e {
            Expr::Binary {
                op: BinaryOp::Or,
                left,
                right,
            } => {
                assert_eq!(*left, Expr::field_access("a", vec![]));
                assert!(matches!(
                    *right,
                    Expr::Binary {
                        op: BinaryOp::And,
                        ..
                    }
                ));
            }
            other => panic!("unexpected shape: {other:?}"),
        }
    }

    #[test]
    fn left_associativity_of_and() {
        // a and b and c == (a and b) and c
        let e = ast("a and b and c");
        match e {
            Expr::Binary {
                op: BinaryOp::And,
                left,
                ..
            } => {
                assert!(matches!(
                    *left,
                    Expr::Binary {
                        op: BinaryOp::And,
                        ..
                    }
                ));
            }
            other => panic!("unexpected shape: {other:?}"),
        }
    }

    #[test]
    fn not_binds_tighter_than_comparison_operands_via_parens() {
        let e = ast("not (a == b)");
        assert!(matches!(e, Expr::Unary { .. }));
    }

    #[test]
    fn index_access_on_field() {
        let e = ast(r#"span.attributes["http.method"]"#);
        match e {
            Expr::IndexAccess { object, index } => {
                assert_eq!(*object, Expr::field_access("span", vec!["attributes".into()]));
                assert_eq!(*index, Expr::Literal(Literal::Str("http.method".into())));
            }
            other => panic!("unexpected shape: {other:?}"),
        }
    }

    #[test]
    fn empty_input_is_a_parse_error_at_column_one() {
        let err = parse_str("   ").unwrap_err();
        assert_eq!(err.column(), 1);
    }

    #[test]
    fn trailing_tokens_are_a_parse_error() {
        let err = parse_str("true true").unwrap_err();
        assert!(matches!(err, ParseError::UnexpectedToken { .. }));
    }

    #[test]
    fn incomplete_comparison_is_a_parse_error() {
        let err = parse_str("span.status ==").unwrap_err();
        assert!(matches!(
            err,
            ParseError::UnexpectedEof { .. } | ParseError::UnexpectedToken { .. }
        ));
    }

    proptest! {
        /// Property-based version of the round-trip law: any
        /// syntactically valid combination of a field name, a
        /// comparison operator, and a string literal must survive a
        /// print/re-lex/re-parse cycle as a structurally equal AST.
        #[test]
        fn round_trip_holds_for_generated_scalar_comparisons(
            field in "[a-z][a-z_]{0,8}",
            op in prop_oneof![
                Just("==".to_string()),
                Just("!=".to_string()),
                Just("<".to_string()),
                Just(">".to_string()),
            ],
            value in "[a-zA-Z0-9]{0,8}",
        ) {
            let src = format!(r#"span.{field} {op} "{value}""#);
            let first = parse_str(&src).unwrap();
            let printed = first.to_string();
            let second = parse_str(&printed).unwrap();
            prop_assert_eq!(first, second);
        }
    }

    #[test]
    fn round_trip_law_print_then_reparse() {
        let sources = [
            r#"span.status == "ERROR""#,
            r#"span.attributes["http.method"] == "POST" and span.duration > 100"#,
            "not trace.has(checkout)",
            "a.b.c in d",
        ];
        for src in sources {
            let first = ast(src);
            let printed = first.to_string();
            let second = parse_str(&printed)
                .unwrap_or_else(|e| panic!("failed to reparse {printed:?}: {e}"));
            assert_eq!(first, second, "round-trip mismatch for {src:?}");
        }
    }
}
