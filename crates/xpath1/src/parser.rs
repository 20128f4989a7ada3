//! A `nom`-based parser for the XPath 1.0 expression language.
//!
//! The building blocks (`step`, `predicate`, `function_call`, `q_name`, ...) are public so
//! that hosts can assemble restricted grammars, such as match patterns, from the same
//! pieces.

use super::ast::*;
use crate::error::XPathError;
use crate::name::{QualifiedName, is_name_char, is_name_start_char};
use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{tag, take_while},
    character::complete::{char, digit0, digit1, multispace0, satisfy},
    combinator::{map, map_res, not, opt, recognize, value},
    multi::{many0, separated_list0},
    sequence::{delimited, pair, preceded, terminated},
};

// --- Main Public Parser ---

pub fn parse_expression(input: &str) -> Result<Expression, XPathError> {
    parse_all(input, expression)
}

/// Runs `parser` over the whole of `input`, surrounded by optional whitespace, and maps
/// failures to a `ParseError` carrying the offset where parsing stopped.
pub fn parse_all<'a, O, P>(input: &'a str, parser: P) -> Result<O, XPathError>
where
    P: Parser<&'a str, Output = O, Error = nom::error::Error<&'a str>>,
{
    match ws(parser).parse(input) {
        Ok(("", parsed)) => Ok(parsed),
        Ok((rem, _)) => Err(parse_error(input, rem, "unexpected trailing input")),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            Err(parse_error(input, e.input, "invalid expression"))
        }
        Err(nom::Err::Incomplete(_)) => Err(parse_error(input, "", "incomplete expression")),
    }
}

fn parse_error(input: &str, remaining: &str, message: &str) -> XPathError {
    let offset = input.len() - remaining.len();
    let near: String = remaining.chars().take(16).collect();
    let message = if near.is_empty() {
        format!("{} at end of input", message)
    } else {
        format!("{} near '{}'", message, near)
    };
    XPathError::ParseError {
        expression: input.to_string(),
        offset,
        message,
    }
}

// --- Combinators & Helpers ---

pub fn ws<'a, F, O, E>(inner: F) -> impl Parser<&'a str, Output = O, Error = E>
where
    F: Parser<&'a str, Output = O, Error = E>,
    E: nom::error::ParseError<&'a str>,
{
    delimited(multispace0, inner, multispace0)
}

/// A keyword that must not run on into a longer name (`or` but not `order`).
fn keyword<'a>(
    word: &'static str,
) -> impl Parser<&'a str, Output = &'a str, Error = nom::error::Error<&'a str>> {
    terminated(tag(word), not(satisfy(is_name_char)))
}

fn build_binary_expr_parser<'a, F, G>(
    sub_expr_parser: F,
    op_parser: G,
) -> impl FnMut(&'a str) -> IResult<&'a str, Expression>
where
    F: Parser<&'a str, Output = Expression, Error = nom::error::Error<&'a str>> + Clone,
    G: Parser<&'a str, Output = BinaryOperator, Error = nom::error::Error<&'a str>> + Clone,
{
    move |input: &str| {
        let (input, mut left) = sub_expr_parser.clone().parse(input)?;
        let (input, remainder) =
            many0(pair(ws(op_parser.clone()), sub_expr_parser.clone())).parse(input)?;

        for (op, right) in remainder {
            left = Expression::BinaryOp {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }
        Ok((input, left))
    }
}

// --- Expression Parsers (in order of precedence) ---

pub fn expression(input: &str) -> IResult<&str, Expression> {
    or_expr(input)
}

fn or_op(input: &str) -> IResult<&str, BinaryOperator> {
    value(BinaryOperator::Or, keyword("or")).parse(input)
}

fn and_op(input: &str) -> IResult<&str, BinaryOperator> {
    value(BinaryOperator::And, keyword("and")).parse(input)
}

fn equality_op(input: &str) -> IResult<&str, BinaryOperator> {
    alt((
        value(BinaryOperator::NotEquals, tag("!=")),
        value(BinaryOperator::Equals, tag("=")),
    ))
    .parse(input)
}

fn relational_op(input: &str) -> IResult<&str, BinaryOperator> {
    alt((
        value(BinaryOperator::LessThanOrEqual, tag("<=")),
        value(BinaryOperator::GreaterThanOrEqual, tag(">=")),
        value(BinaryOperator::LessThan, tag("<")),
        value(BinaryOperator::GreaterThan, tag(">")),
    ))
    .parse(input)
}

fn additive_op(input: &str) -> IResult<&str, BinaryOperator> {
    alt((
        value(BinaryOperator::Plus, char('+')),
        value(BinaryOperator::Minus, char('-')),
    ))
    .parse(input)
}

fn multiplicative_op(input: &str) -> IResult<&str, BinaryOperator> {
    alt((
        value(BinaryOperator::Multiply, char('*')),
        value(BinaryOperator::Divide, keyword("div")),
        value(BinaryOperator::Modulo, keyword("mod")),
    ))
    .parse(input)
}

fn union_op(input: &str) -> IResult<&str, BinaryOperator> {
    value(BinaryOperator::Union, char('|')).parse(input)
}

fn or_expr(input: &str) -> IResult<&str, Expression> {
    build_binary_expr_parser(and_expr, or_op)(input)
}

fn and_expr(input: &str) -> IResult<&str, Expression> {
    build_binary_expr_parser(equality_expr, and_op)(input)
}

fn equality_expr(input: &str) -> IResult<&str, Expression> {
    build_binary_expr_parser(relational_expr, equality_op)(input)
}

fn relational_expr(input: &str) -> IResult<&str, Expression> {
    build_binary_expr_parser(additive_expr, relational_op)(input)
}

fn additive_expr(input: &str) -> IResult<&str, Expression> {
    build_binary_expr_parser(multiplicative_expr, additive_op)(input)
}

fn multiplicative_expr(input: &str) -> IResult<&str, Expression> {
    build_binary_expr_parser(unary_expr, multiplicative_op)(input)
}

fn unary_expr(input: &str) -> IResult<&str, Expression> {
    alt((
        map(preceded(ws(char('-')), unary_expr), |expr| {
            Expression::UnaryOp {
                op: UnaryOperator::Minus,
                expr: Box::new(expr),
            }
        }),
        union_expr,
    ))
    .parse(input)
}

fn union_expr(input: &str) -> IResult<&str, Expression> {
    build_binary_expr_parser(path_expr, union_op)(input)
}

/// A location path, or a filter expression optionally continued by relative steps
/// (`$var/item`, `key('k', 'v')//x`).
///
/// Primary expressions are tried first, because a function call like `position()` would
/// otherwise be read as a step named `position`.
fn path_expr(input: &str) -> IResult<&str, Expression> {
    let (input, _) = multispace0(input)?;
    if let Ok((i, start)) = filter_expr(input) {
        let (i, steps) = trailing_steps(i)?;
        if steps.is_empty() {
            return Ok((i, start));
        }
        return Ok((
            i,
            Expression::LocationPath(LocationPath {
                start_point: Some(Box::new(start)),
                is_absolute: false,
                steps,
            }),
        ));
    }
    map(location_path, Expression::LocationPath).parse(input)
}

fn filter_expr(input: &str) -> IResult<&str, Expression> {
    let (i, primary) = primary_expr(input)?;
    let (i, predicates) = many0(predicate).parse(i)?;
    if predicates.is_empty() {
        return Ok((i, primary));
    }
    Ok((
        i,
        Expression::Filter {
            primary: Box::new(primary),
            predicates,
        },
    ))
}

fn primary_expr(input: &str) -> IResult<&str, Expression> {
    ws(alt((
        variable_reference,
        map(number, Expression::Number),
        map(string_literal, Expression::Literal),
        function_call,
        delimited(ws(char('(')), expression, ws(char(')'))),
    )))
    .parse(input)
}

// --- Literal Parsers ---

/// `Digits ('.' Digits?)? | '.' Digits`. Exponents and named values are not XPath numbers.
pub fn number(input: &str) -> IResult<&str, f64> {
    map_res(
        alt((
            recognize(pair(digit1, opt(pair(char('.'), digit0)))),
            recognize(pair(char('.'), digit1)),
        )),
        |s: &str| s.parse::<f64>(),
    )
    .parse(input)
}

pub fn string_literal(input: &str) -> IResult<&str, String> {
    map(
        alt((
            delimited(char('\''), take_while(|c| c != '\''), char('\'')),
            delimited(char('"'), take_while(|c| c != '"'), char('"')),
        )),
        |s: &str| s.to_string(),
    )
    .parse(input)
}

fn variable_reference(input: &str) -> IResult<&str, Expression> {
    map(preceded(char('$'), q_name), Expression::Variable).parse(input)
}

// --- Name and NodeTest Parsers ---

pub fn nc_name(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        satisfy(is_name_start_char),
        take_while(is_name_char),
    ))
    .parse(input)
}

pub fn q_name(input: &str) -> IResult<&str, QualifiedName> {
    map(
        pair(nc_name, opt(preceded(char(':'), nc_name))),
        |(first, second)| match second {
            Some(local) => QualifiedName::new(Some(first), local),
            None => QualifiedName::local(first),
        },
    )
    .parse(input)
}

const NODE_TYPE_NAMES: [&str; 4] = ["comment", "text", "processing-instruction", "node"];

fn node_type_test(input: &str) -> IResult<&str, NodeTypeTest> {
    let (i, name) = nc_name(input)?;
    let (i, _) = ws(char('(')).parse(i)?;
    let (i, test) = match name {
        "text" => (i, NodeTypeTest::Text),
        "node" => (i, NodeTypeTest::Node),
        "comment" => (i, NodeTypeTest::Comment),
        "processing-instruction" => {
            let (i, target) = opt(ws(string_literal)).parse(i)?;
            (i, NodeTypeTest::ProcessingInstruction(target))
        }
        _ => {
            return Err(nom::Err::Error(nom::error::Error::new(
                input,
                nom::error::ErrorKind::Tag,
            )));
        }
    };
    let (i, _) = char(')').parse(i)?;
    Ok((i, test))
}

pub fn node_test(input: &str) -> IResult<&str, NodeTest> {
    alt((
        map(char('*'), |_| NodeTest::Wildcard),
        map(node_type_test, NodeTest::NodeType),
        map(terminated(nc_name, tag(":*")), |prefix| {
            NodeTest::NamespaceWildcard(prefix.to_string())
        }),
        map(q_name, NodeTest::Name),
    ))
    .parse(input)
}

// --- Path Parsers ---

fn axis_name(input: &str) -> IResult<&str, Axis> {
    alt((
        value(Axis::AncestorOrSelf, tag("ancestor-or-self")),
        value(Axis::Ancestor, tag("ancestor")),
        value(Axis::Attribute, tag("attribute")),
        value(Axis::Child, tag("child")),
        value(Axis::DescendantOrSelf, tag("descendant-or-self")),
        value(Axis::Descendant, tag("descendant")),
        value(Axis::FollowingSibling, tag("following-sibling")),
        value(Axis::Following, tag("following")),
        value(Axis::Namespace, tag("namespace")),
        value(Axis::Parent, tag("parent")),
        value(Axis::PrecedingSibling, tag("preceding-sibling")),
        value(Axis::Preceding, tag("preceding")),
        value(Axis::SelfAxis, tag("self")),
    ))
    .parse(input)
}

pub fn axis(input: &str) -> IResult<&str, Axis> {
    terminated(axis_name, ws(tag("::"))).parse(input)
}

pub fn predicate(input: &str) -> IResult<&str, Expression> {
    delimited(ws(char('[')), expression, ws(char(']'))).parse(input)
}

/// A single step, including the abbreviations `.`, `..` and `@`.
pub fn step(input: &str) -> IResult<&str, Step> {
    if let Ok((i, _)) = tag::<&str, &str, nom::error::Error<&str>>("..").parse(input) {
        return Ok((
            i,
            Step::new(Axis::Parent, NodeTest::NodeType(NodeTypeTest::Node)),
        ));
    }
    if let Ok((i, _)) = terminated(
        tag::<&str, &str, nom::error::Error<&str>>("."),
        not(satisfy(|c: char| c.is_ascii_digit())),
    )
    .parse(input)
    {
        return Ok((
            i,
            Step::new(Axis::SelfAxis, NodeTest::NodeType(NodeTypeTest::Node)),
        ));
    }

    let (i, (axis, node_test)) = alt((
        map(preceded(ws(char('@')), node_test), |nt| {
            (Axis::Attribute, nt)
        }),
        map(pair(opt(axis), node_test), |(ax, nt)| {
            (ax.unwrap_or(Axis::Child), nt)
        }),
    ))
    .parse(input)?;
    let (i, predicates) = many0(predicate).parse(i)?;
    Ok((
        i,
        Step {
            axis,
            node_test,
            predicates,
        },
    ))
}

fn path_separator(input: &str) -> IResult<&str, &str> {
    ws(alt((tag("//"), tag("/")))).parse(input)
}

/// Zero or more `/step` or `//step` continuations, with `//` expanded.
pub fn trailing_steps(input: &str) -> IResult<&str, Vec<Step>> {
    let (i, remainder) = many0(pair(path_separator, step)).parse(input)?;
    let mut steps = Vec::with_capacity(remainder.len());
    for (sep, next_step) in remainder {
        if sep.trim() == "//" {
            steps.push(Step::descendant_or_self_node());
        }
        steps.push(next_step);
    }
    Ok((i, steps))
}

pub fn location_path(input: &str) -> IResult<&str, LocationPath> {
    let (i, (is_absolute, mut steps)) =
        if let Ok((rem, _)) = tag::<&str, &str, nom::error::Error<&str>>("//").parse(input) {
            let (rem, first) = preceded(multispace0, step).parse(rem)?;
            (rem, (true, vec![Step::descendant_or_self_node(), first]))
        } else if let Ok((rem, _)) = tag::<&str, &str, nom::error::Error<&str>>("/").parse(input)
        {
            match preceded(multispace0, step).parse(rem) {
                Ok((rem, first)) => (rem, (true, vec![first])),
                // The root on its own.
                Err(_) => (rem, (true, vec![])),
            }
        } else {
            let (rem, first) = step(input)?;
            (rem, (false, vec![first]))
        };

    if steps.is_empty() {
        return Ok((
            i,
            LocationPath {
                start_point: None,
                is_absolute,
                steps,
            },
        ));
    }

    let (i, rest) = trailing_steps(i)?;
    steps.extend(rest);
    Ok((
        i,
        LocationPath {
            start_point: None,
            is_absolute,
            steps,
        },
    ))
}

// --- Function Call Parser ---

pub fn function_call(input: &str) -> IResult<&str, Expression> {
    let (i, name) = q_name(input)?;

    // Node-type tests like text() look like calls but belong to the step grammar.
    if name.prefix.is_none() && NODE_TYPE_NAMES.contains(&name.local_name.as_str()) {
        return Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Verify,
        )));
    }

    let (i, args) = delimited(
        ws(char('(')),
        separated_list0(ws(char(',')), ws(expression)),
        char(')'),
    )
    .parse(i)?;

    Ok((i, Expression::FunctionCall { name, args }))
}
