//! Grammar for a single constraint statement.
//!
//! ```text
//! constraint := term comparator sum ( '!' strength )?
//! sum        := product ( ( '+' | '-' ) product )*
//! product    := unary ( ( '*' | '/' ) unary )*
//! unary      := '-' unary | primary
//! primary    := '(' sum ')' | number unit? | term
//! term       := region '.' attribute
//! unit       := 'dp' | 'px'
//! ```

use winnow::ascii::multispace0;
use winnow::combinator::{alt, cut_err, opt};
use winnow::error::{ContextError, ErrMode, StrContext, StrContextValue};
use winnow::prelude::*;
use winnow::token::{one_of, take_while};

use super::ast::{
    Attribute, AttributeRef, BinaryOp, Comparator, Expr, ParsedConstraint, Strength, Unit,
};
use crate::error::{LayoutError, Result};

/// Parse one constraint statement.
pub fn parse(text: &str) -> Result<ParsedConstraint> {
    let mut input = text;
    let (target, comparator, expr, strength) = statement
        .parse_next(&mut input)
        .map_err(|err| syntax_error(text, input, describe(err)))?;

    if !input.is_empty() {
        return Err(syntax_error(text, input, "unexpected trailing input".to_string()));
    }

    let parsed = ParsedConstraint {
        text: text.to_string(),
        target,
        comparator,
        expr,
        strength,
    };
    check_supported(&parsed)?;
    Ok(parsed)
}

fn syntax_error(text: &str, rest: &str, message: String) -> LayoutError {
    LayoutError::Syntax {
        text: text.to_string(),
        offset: text.len().saturating_sub(rest.len()),
        message,
    }
}

fn describe(err: ErrMode<ContextError>) -> String {
    match err {
        ErrMode::Backtrack(inner) | ErrMode::Cut(inner) => {
            let message = inner.to_string();
            if message.is_empty() {
                "malformed constraint".to_string()
            } else {
                message.replace('\n', "; ")
            }
        }
        ErrMode::Incomplete(_) => "incomplete constraint".to_string(),
    }
}

fn unsupported(parsed: &ParsedConstraint, reason: impl Into<String>) -> LayoutError {
    LayoutError::UnsupportedExpression {
        text: parsed.text.clone(),
        reason: reason.into(),
    }
}

/// Reject statements that are well formed but cannot become a linear relation.
fn check_supported(parsed: &ParsedConstraint) -> Result<()> {
    if parsed.target.attribute.is_intrinsic() {
        return Err(unsupported(
            parsed,
            format!("`{}` is measured by the host and cannot be assigned", parsed.target),
        ));
    }
    check_linear(parsed, &parsed.expr)
}

fn check_linear(parsed: &ParsedConstraint, expr: &Expr) -> Result<()> {
    match expr {
        Expr::Literal { .. } | Expr::Attribute(_) => Ok(()),
        Expr::Neg(inner) => check_linear(parsed, inner),
        Expr::Binary { op, lhs, rhs } => {
            check_linear(parsed, lhs)?;
            check_linear(parsed, rhs)?;
            match op {
                BinaryOp::Mul if !lhs.is_constant() && !rhs.is_constant() => Err(unsupported(
                    parsed,
                    "multiplying two attribute terms is not linear",
                )),
                BinaryOp::Div if !rhs.is_constant() => Err(unsupported(
                    parsed,
                    "dividing by an attribute term is not linear",
                )),
                _ => Ok(()),
            }
        }
    }
}

fn skip_space(input: &mut &str) {
    let _: ModalResult<&str> = multispace0.parse_next(input);
}

fn statement(input: &mut &str) -> ModalResult<(AttributeRef, Comparator, Expr, Strength)> {
    skip_space(input);
    let target = term
        .context(StrContext::Expected(StrContextValue::Description(
            "`region.attribute` on the left-hand side",
        )))
        .parse_next(input)?;
    skip_space(input);
    let comparator = cut_err(comparator).parse_next(input)?;
    let expr = cut_err(sum).parse_next(input)?;
    skip_space(input);
    let strength = opt(strength_suffix).parse_next(input)?.unwrap_or_default();
    skip_space(input);
    Ok((target, comparator, expr, strength))
}

fn comparator(input: &mut &str) -> ModalResult<Comparator> {
    alt((
        "==".value(Comparator::Equal),
        ">=".value(Comparator::GreaterOrEqual),
        "<=".value(Comparator::LessOrEqual),
    ))
    .context(StrContext::Expected(StrContextValue::Description(
        "`==`, `>=` or `<=`",
    )))
    .parse_next(input)
}

fn strength_suffix(input: &mut &str) -> ModalResult<Strength> {
    let _ = '!'.parse_next(input)?;
    cut_err(identifier.verify_map(Strength::from_name))
        .context(StrContext::Expected(StrContextValue::Description(
            "`required`, `strong`, `medium` or `weak`",
        )))
        .parse_next(input)
}

fn sum(input: &mut &str) -> ModalResult<Expr> {
    let mut acc = product.parse_next(input)?;
    loop {
        skip_space(input);
        let op = opt(alt(('+'.value(BinaryOp::Add), '-'.value(BinaryOp::Sub)))).parse_next(input)?;
        let Some(op) = op else {
            return Ok(acc);
        };
        let rhs = cut_err(product).parse_next(input)?;
        acc = Expr::binary(op, acc, rhs);
    }
}

fn product(input: &mut &str) -> ModalResult<Expr> {
    let mut acc = unary.parse_next(input)?;
    loop {
        skip_space(input);
        let op = opt(alt(('*'.value(BinaryOp::Mul), '/'.value(BinaryOp::Div)))).parse_next(input)?;
        let Some(op) = op else {
            return Ok(acc);
        };
        let rhs = cut_err(unary).parse_next(input)?;
        acc = Expr::binary(op, acc, rhs);
    }
}

fn unary(input: &mut &str) -> ModalResult<Expr> {
    skip_space(input);
    if opt('-').parse_next(input)?.is_some() {
        let inner = cut_err(unary).parse_next(input)?;
        return Ok(Expr::Neg(Box::new(inner)));
    }
    primary.parse_next(input)
}

fn primary(input: &mut &str) -> ModalResult<Expr> {
    skip_space(input);
    if opt('(').parse_next(input)?.is_some() {
        let inner = cut_err(sum).parse_next(input)?;
        skip_space(input);
        let _ = cut_err(')')
            .context(StrContext::Expected(StrContextValue::CharLiteral(')')))
            .parse_next(input)?;
        return Ok(inner);
    }
    alt((literal, term.map(Expr::Attribute)))
        .context(StrContext::Expected(StrContextValue::Description(
            "a number or `region.attribute`",
        )))
        .parse_next(input)
}

fn literal(input: &mut &str) -> ModalResult<Expr> {
    let value = number.parse_next(input)?;
    let unit = opt(alt(("dp".value(Unit::Dp), "px".value(Unit::Px))))
        .parse_next(input)?
        .unwrap_or(Unit::None);
    Ok(Expr::Literal { value, unit })
}

fn number(input: &mut &str) -> ModalResult<f64> {
    (
        take_while(1.., |c: char| c.is_ascii_digit()),
        opt(('.', take_while(1.., |c: char| c.is_ascii_digit()))),
    )
        .take()
        .try_map(str::parse::<f64>)
        .parse_next(input)
}

fn identifier<'a>(input: &mut &'a str) -> ModalResult<&'a str> {
    (
        one_of(|c: char| c.is_ascii_alphabetic() || c == '_'),
        take_while(0.., |c: char| c.is_ascii_alphanumeric() || c == '_'),
    )
        .take()
        .parse_next(input)
}

fn term(input: &mut &str) -> ModalResult<AttributeRef> {
    let region = identifier.parse_next(input)?;
    let _ = '.'.parse_next(input)?;
    let attribute = cut_err(identifier.verify_map(Attribute::from_name))
        .context(StrContext::Expected(StrContextValue::Description(
            "an attribute (left, x, top, y, width, height, centerX, centerY, intrinsicWidth, intrinsicHeight)",
        )))
        .parse_next(input)?;
    Ok(AttributeRef::new(region, attribute))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attr(region: &str, attribute: Attribute) -> Expr {
        Expr::Attribute(AttributeRef::new(region, attribute))
    }

    #[test]
    fn parses_simple_equality_with_unit() {
        let parsed = parse("blue.width == 120dp").unwrap();
        assert_eq!(parsed.target, AttributeRef::new("blue", Attribute::Width));
        assert_eq!(parsed.comparator, Comparator::Equal);
        assert_eq!(
            parsed.expr,
            Expr::Literal {
                value: 120.0,
                unit: Unit::Dp
            }
        );
        assert_eq!(parsed.strength, Strength::Required);
    }

    #[test]
    fn parses_parenthesised_quotient() {
        let parsed = parse("blue.height == (blue.width + 200dp) / 2px").unwrap();
        assert_eq!(
            parsed.expr,
            Expr::binary(
                BinaryOp::Div,
                Expr::binary(
                    BinaryOp::Add,
                    attr("blue", Attribute::Width),
                    Expr::Literal {
                        value: 200.0,
                        unit: Unit::Dp
                    },
                ),
                Expr::Literal {
                    value: 2.0,
                    unit: Unit::Px
                },
            )
        );
    }

    #[test]
    fn aliases_map_to_primary_attributes() {
        let parsed = parse("green.x >= blue.x + blue.width + 10dp").unwrap();
        assert_eq!(parsed.target.attribute, Attribute::Left);
        assert_eq!(parsed.comparator, Comparator::GreaterOrEqual);
        let names: Vec<String> = parsed.attributes().iter().map(|r| r.to_string()).collect();
        assert_eq!(names, vec!["green.left", "blue.left", "blue.width"]);
    }

    #[test]
    fn operator_precedence_binds_products_first() {
        let parsed = parse("a.left <= b.left + b.width * 2").unwrap();
        match parsed.expr {
            Expr::Binary {
                op: BinaryOp::Add,
                rhs,
                ..
            } => assert!(matches!(*rhs, Expr::Binary { op: BinaryOp::Mul, .. })),
            other => panic!("unexpected tree {other:?}"),
        }
    }

    #[test]
    fn strength_suffix_is_optional() {
        assert_eq!(
            parse("a.width == 10 !weak").unwrap().strength,
            Strength::Weak
        );
        assert!(matches!(
            parse("a.width == 10 !sometimes"),
            Err(LayoutError::Syntax { .. })
        ));
    }

    #[test]
    fn malformed_text_is_a_syntax_error() {
        for text in [
            "",
            "blue.width",
            "blue.width = 10",
            "blue.depth == 10",
            "blue.width == (10 + 2",
            "blue.width == 10 10",
            "10 == blue.width",
            "blue.width + 1 == 10",
        ] {
            let err = parse(text).unwrap_err();
            assert!(
                matches!(err, LayoutError::Syntax { .. }),
                "{text:?} produced {err:?}"
            );
        }
    }

    #[test]
    fn syntax_error_reports_offset() {
        match parse("blue.width == 10 10").unwrap_err() {
            LayoutError::Syntax { offset, .. } => assert_eq!(offset, 17),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn term_products_are_unsupported() {
        let err = parse("red.width == blue.width * blue.height").unwrap_err();
        assert!(matches!(err, LayoutError::UnsupportedExpression { .. }));

        let err = parse("red.width == 100 / blue.height").unwrap_err();
        assert!(matches!(err, LayoutError::UnsupportedExpression { .. }));
    }

    #[test]
    fn intrinsic_attributes_cannot_be_assigned() {
        let err = parse("label.intrinsicWidth == 10").unwrap_err();
        assert!(matches!(err, LayoutError::UnsupportedExpression { .. }));
        assert!(parse("label.width == label.intrinsicWidth").is_ok());
    }
}
