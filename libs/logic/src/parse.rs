//! The Boolean expression parser.
//!
//! Grammar, loosest-binding first: `|`, then `^`/`~^`/`^~`, then `&`, then
//! unary `~`/`!`, with parenthesized grouping. Operand names match `\w+`.

use arcstr::ArcStr;
use nom::branch::alt;
use nom::bytes::complete::{tag, take_while1};
use nom::character::complete::{char, multispace0};
use nom::combinator::map;
use nom::multi::many0;
use nom::sequence::{delimited, pair, preceded};
use nom::IResult;

use crate::{Error, Expr, Result};

/// Parses an expression, requiring the entire input to be consumed.
pub fn parse_expr(source: &str) -> Result<Expr> {
    match or_expr(source) {
        Ok((rest, expr)) if rest.trim().is_empty() => Ok(expr),
        Ok((rest, _)) => Err(Error::Parse {
            expr: source.to_string(),
            message: format!("unexpected trailing input `{}`", rest.trim()),
        }),
        Err(e) => Err(Error::Parse {
            expr: source.to_string(),
            message: e.to_string(),
        }),
    }
}

fn operand(input: &str) -> IResult<&str, Expr> {
    map(
        take_while1(|c: char| c.is_alphanumeric() || c == '_'),
        |name: &str| Expr::Var(ArcStr::from(name)),
    )(input)
}

fn primary(input: &str) -> IResult<&str, Expr> {
    preceded(
        multispace0,
        alt((
            map(
                preceded(alt((char('~'), char('!'))), primary),
                |e| e.not(),
            ),
            delimited(
                char('('),
                or_expr,
                preceded(multispace0, char(')')),
            ),
            operand,
        )),
    )(input)
}

fn and_expr(input: &str) -> IResult<&str, Expr> {
    let (input, first) = primary(input)?;
    let (input, rest) = many0(preceded(preceded(multispace0, char('&')), primary))(input)?;
    Ok((input, rest.into_iter().fold(first, Expr::and)))
}

fn xor_expr(input: &str) -> IResult<&str, Expr> {
    let (input, first) = and_expr(input)?;
    let (input, rest) = many0(pair(
        preceded(multispace0, alt((tag("~^"), tag("^~"), tag("^")))),
        and_expr,
    ))(input)?;
    Ok((input, rest.into_iter().fold(first, |acc, (op, rhs)| {
        if op == "^" {
            acc.xor(rhs)
        } else {
            Expr::Xnor(Box::new(acc), Box::new(rhs))
        }
    })))
}

fn or_expr(input: &str) -> IResult<&str, Expr> {
    let (input, first) = xor_expr(input)?;
    let (input, rest) = many0(preceded(preceded(multispace0, char('|')), xor_expr))(input)?;
    Ok((input, rest.into_iter().fold(first, Expr::or)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precedence_binds_and_over_xor_over_or() {
        let e = parse_expr("A | B & C ^ D").unwrap();
        assert_eq!(e.to_string(), "A|B&C^D");
        assert_eq!(
            e,
            Expr::var("A").or(Expr::var("B").and(Expr::var("C")).xor(Expr::var("D")))
        );
    }

    #[test]
    fn both_negation_forms_parse() {
        assert_eq!(parse_expr("~A").unwrap(), parse_expr("!A").unwrap());
        assert_eq!(parse_expr("~(A & B)").unwrap().to_string(), "!(A&B)");
    }

    #[test]
    fn xnor_forms_parse() {
        let a = parse_expr("A ~^ B").unwrap();
        let b = parse_expr("A ^~ B").unwrap();
        assert_eq!(a, b);
        assert!(matches!(a, Expr::Xnor(..)));
    }

    #[test]
    fn parentheses_group() {
        let e = parse_expr("(A | B) & C").unwrap();
        assert_eq!(e.to_string(), "(A|B)&C");
    }

    #[test]
    fn malformed_expressions_are_rejected() {
        assert!(parse_expr("A &").is_err());
        assert!(parse_expr("(A").is_err());
        assert!(parse_expr("A B").is_err());
        assert!(parse_expr("").is_err());
    }
}
