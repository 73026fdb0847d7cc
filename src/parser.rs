// Thin wrapper around the LALRPOP-generated `grammar` module (spec §4.1).
// Converts lalrpop's `ParseError` into our own `SyntaxError(position, message)`.

use crate::ast::Expr;
use crate::error::{Result, XdfError};
use lalrpop_util::ParseError;

pub fn parse(source: &str) -> Result<Expr> {
    crate::grammar::ExprParser::new()
        .parse(source)
        .map_err(|err| to_syntax_error(source, err))
}

fn to_syntax_error(source: &str, err: ParseError<usize, lalrpop_util::lexer::Token<'_>, &str>) -> XdfError {
    let (position, message) = match err {
        ParseError::InvalidToken { location } => (location, "invalid token".to_string()),
        ParseError::UnrecognizedEof { location, expected } => {
            (location, format!("unexpected end of input, expected one of: {}", expected.join(", ")))
        }
        ParseError::UnrecognizedToken { token: (l, tok, _), expected } => {
            (l, format!("unexpected token '{}', expected one of: {}", tok.1, expected.join(", ")))
        }
        ParseError::ExtraToken { token: (l, tok, _) } => {
            (l, format!("unexpected extra token '{}'", tok.1))
        }
        ParseError::User { error } => (0, error.to_string()),
    };
    let _ = source;
    XdfError::SyntaxError { position, message }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BinOp::*, Expr, Literal};

    fn assert_parses_to(text: &'static str, ast: Expr) {
        assert_eq!(parse(text).unwrap(), ast);
    }

    #[test]
    fn test_terms() {
        assert_parses_to("42", Expr::int(42));
        assert_parses_to("42.0", Expr::num(42.0));
        assert_parses_to("(42)", Expr::int(42));
        assert_parses_to("foo", Expr::Name(String::from("foo")));
    }

    #[test]
    fn test_relational() {
        assert_parses_to(
            "3 + 4 < 3 * 4",
            Expr::bin(
                Lt,
                Expr::bin(Add, Expr::int(3), Expr::int(4)),
                Expr::bin(Mul, Expr::int(3), Expr::int(4)),
            ),
        );

        assert_parses_to(
            "3 + 4 >= 3 * 4",
            Expr::bin(
                Gte,
                Expr::bin(Add, Expr::int(3), Expr::int(4)),
                Expr::bin(Mul, Expr::int(3), Expr::int(4)),
            ),
        );
    }

    #[test]
    fn test_precedence_bitwise_tighter_than_arith() {
        // per spec.md §4.1, bitwise/shift bind *tighter* than +/-, unlike C.
        assert_parses_to(
            "1 + 2 & 3",
            Expr::bin(Add, Expr::int(1), Expr::bin(BitAnd, Expr::int(2), Expr::int(3))),
        );
    }

    #[test]
    fn test_call_with_semicolon_args() {
        assert_parses_to(
            "IF(x; 1; 2)",
            Expr::Call(
                "IF".to_string(),
                vec![Expr::Name("x".to_string()), Expr::int(1), Expr::int(2)],
            ),
        );
    }

    #[test]
    fn test_hex_literal() {
        assert_parses_to("0x2A", Expr::int(42));
    }

    #[test]
    fn test_case_insensitive_bool() {
        assert_parses_to("true", Expr::boolean(true));
        assert_parses_to("FALSE", Expr::boolean(false));
    }

    #[test]
    fn test_nor_nand() {
        assert_parses_to(
            "1 !| 2",
            Expr::bin(BitNor, Expr::int(1), Expr::int(2)),
        );
        assert_parses_to(
            "1 !& 2",
            Expr::bin(BitNand, Expr::int(1), Expr::int(2)),
        );
    }

    #[test]
    fn test_unary_minus_chains() {
        assert_parses_to("--5", Expr::un(crate::ast::UnOp::Neg, Expr::un(crate::ast::UnOp::Neg, Expr::int(5))));
    }

    #[test]
    fn test_syntax_error_reports_position() {
        let err = parse("1 + ").unwrap_err();
        match err {
            XdfError::SyntaxError { .. } => {}
            other => panic!("expected SyntaxError, got {:?}", other),
        }
    }

    #[test]
    fn test_float_literal() {
        assert_parses_to("3.5", Expr::Literal(Literal::Float(3.5)));
    }
}
