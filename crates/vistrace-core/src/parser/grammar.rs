//! Vistrace script grammar using nom
//!
//! # EBNF Grammar
//!
//! ```ebnf
//! program     = {statement};
//! statement   = function | if | while | for | return | break | continue
//!             | assignment | expression, ";";
//! function    = "fn", ident, "(", [ident, {",", ident}], ")", block;
//! block       = "{", {statement}, "}";
//! if          = "if", expr, block, ["else", (if | block)];
//! while       = "while", expr, block;
//! for         = "for", ident, "in", expr, block;
//! return      = "return", [expr], ";";
//! assignment  = target, {"=", target}, "=", expr, ";"
//!             | target, ",", target, {",", target}, "=", expr, ";";
//! target      = ident, {"[", expr, "]"};
//!
//! expr        = or;
//! or          = and, {"or", and};
//! and         = not, {"and", not};
//! not         = "not", not | comparison;
//! comparison  = sum, {("==" | "!=" | "<=" | ">=" | "<" | ">"), sum};
//! sum         = term, {("+" | "-"), term};
//! term        = unary, {("*" | "/" | "%"), unary};
//! unary       = "-", unary | postfix;
//! postfix     = primary, {"[", expr, "]"};
//! primary     = float | integer | string | "true" | "false" | "null"
//!             | "[", [expr, {",", expr}], "]"
//!             | ident, "(", [expr, {",", expr}], ")"
//!             | ident | "(", expr, ")";
//! comment     = "#", {any_char_except_newline};
//! ```

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while},
    character::complete::{char, digit1, multispace1, none_of, not_line_ending, satisfy},
    combinator::{map, map_res, not, opt, peek, recognize, value, verify},
    error::{Error as NomError, ErrorKind},
    multi::{many0, separated_list0},
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};

use crate::ast::{BinaryOp, Expr, FunctionDef, LineSpan, Literal, Program, Stmt, UnaryOp};

use super::ParseError;

type PResult<'a, O> = IResult<&'a str, O>;

const KEYWORDS: &[&str] = &[
    "fn", "if", "else", "while", "for", "in", "return", "break", "continue", "true", "false",
    "null", "and", "or", "not",
];

/// Skip whitespace and `#` comments
fn ws(input: &str) -> PResult<'_, ()> {
    value(
        (),
        many0(alt((
            multispace1,
            recognize(pair(char('#'), not_line_ending)),
        ))),
    )(input)
}

/// Punctuation token preceded by optional whitespace
fn symbol<'a>(s: &'static str) -> impl FnMut(&'a str) -> PResult<'a, &'a str> {
    preceded(ws, tag(s))
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Keyword that is not the prefix of a longer identifier
fn keyword<'a>(kw: &'static str) -> impl FnMut(&'a str) -> PResult<'a, &'a str> {
    preceded(ws, terminated(tag(kw), not(peek(satisfy(is_ident_char)))))
}

fn identifier(input: &str) -> PResult<'_, String> {
    map(
        verify(
            preceded(
                ws,
                recognize(pair(
                    satisfy(|c| c.is_ascii_alphabetic() || c == '_'),
                    take_while(is_ident_char),
                )),
            ),
            |name: &str| !KEYWORDS.contains(&name),
        ),
        str::to_string,
    )(input)
}

fn parse_float(input: &str) -> PResult<'_, f64> {
    map_res(
        preceded(ws, recognize(tuple((digit1, char('.'), digit1)))),
        |s: &str| s.parse::<f64>(),
    )(input)
}

fn parse_integer(input: &str) -> PResult<'_, i64> {
    map_res(preceded(ws, digit1), |s: &str| s.parse::<i64>())(input)
}

fn parse_string(input: &str) -> PResult<'_, String> {
    let escaped = preceded(
        char('\\'),
        alt((
            value('"', char('"')),
            value('\\', char('\\')),
            value('\n', char('n')),
            value('\t', char('t')),
        )),
    );
    map(
        preceded(
            ws,
            delimited(char('"'), many0(alt((escaped, none_of("\"\\")))), char('"')),
        ),
        |chars: Vec<char>| chars.into_iter().collect::<String>(),
    )(input)
}

fn binary_operator<'a>(
    ops: &'static [(&'static str, BinaryOp)],
) -> impl FnMut(&'a str) -> PResult<'a, BinaryOp> {
    move |input: &'a str| {
        for &(text, op) in ops {
            let is_word = text.chars().all(|c| c.is_ascii_alphabetic());
            let result = if is_word {
                keyword(text)(input)
            } else {
                symbol(text)(input)
            };
            if let Ok((rest, _)) = result {
                return Ok((rest, op));
            }
        }
        Err(nom::Err::Error(NomError::new(input, ErrorKind::Tag)))
    }
}

// Longer operators first so `<=` is not read as `<`
const COMPARISON_OPS: &[(&str, BinaryOp)] = &[
    ("==", BinaryOp::Equal),
    ("!=", BinaryOp::NotEqual),
    ("<=", BinaryOp::LessEqual),
    (">=", BinaryOp::GreaterEqual),
    ("<", BinaryOp::LessThan),
    (">", BinaryOp::GreaterThan),
];
const SUM_OPS: &[(&str, BinaryOp)] = &[("+", BinaryOp::Add), ("-", BinaryOp::Subtract)];
const TERM_OPS: &[(&str, BinaryOp)] = &[
    ("*", BinaryOp::Multiply),
    ("/", BinaryOp::Divide),
    ("%", BinaryOp::Modulo),
];
const AND_OPS: &[(&str, BinaryOp)] = &[("and", BinaryOp::And)];
const OR_OPS: &[(&str, BinaryOp)] = &[("or", BinaryOp::Or)];

/// Left-associative fold of one precedence level
fn binary_level<'a>(
    input: &'a str,
    ops: &'static [(&'static str, BinaryOp)],
    next: fn(&'a str) -> PResult<'a, Expr>,
) -> PResult<'a, Expr> {
    let (mut input, mut left) = next(input)?;
    loop {
        match binary_operator(ops)(input) {
            Ok((rest, op)) => {
                let (rest, right) = next(rest)?;
                left = Expr::binary(op, left, right);
                input = rest;
            }
            Err(nom::Err::Error(_)) => return Ok((input, left)),
            Err(e) => return Err(e),
        }
    }
}

pub(super) fn expression(input: &str) -> PResult<'_, Expr> {
    or_expr(input)
}

fn or_expr(input: &str) -> PResult<'_, Expr> {
    binary_level(input, OR_OPS, and_expr)
}

fn and_expr(input: &str) -> PResult<'_, Expr> {
    binary_level(input, AND_OPS, not_expr)
}

fn not_expr(input: &str) -> PResult<'_, Expr> {
    alt((
        map(preceded(keyword("not"), not_expr), |operand| Expr::Unary {
            op: UnaryOp::Not,
            operand: Box::new(operand),
        }),
        comparison,
    ))(input)
}

fn comparison(input: &str) -> PResult<'_, Expr> {
    binary_level(input, COMPARISON_OPS, sum)
}

fn sum(input: &str) -> PResult<'_, Expr> {
    binary_level(input, SUM_OPS, term)
}

fn term(input: &str) -> PResult<'_, Expr> {
    binary_level(input, TERM_OPS, unary)
}

fn unary(input: &str) -> PResult<'_, Expr> {
    alt((
        map(preceded(symbol("-"), unary), |operand| match operand {
            Expr::Literal(Literal::Integer(n)) => Expr::Literal(Literal::Integer(-n)),
            Expr::Literal(Literal::Float(f)) => Expr::Literal(Literal::Float(-f)),
            operand => Expr::Unary {
                op: UnaryOp::Negate,
                operand: Box::new(operand),
            },
        }),
        postfix,
    ))(input)
}

fn postfix(input: &str) -> PResult<'_, Expr> {
    let (input, base) = primary(input)?;
    let (input, indices) = many0(delimited(symbol("["), expression, symbol("]")))(input)?;
    let expr = indices
        .into_iter()
        .fold(base, |object, index| Expr::index(object, index));
    Ok((input, expr))
}

fn arguments(input: &str) -> PResult<'_, Vec<Expr>> {
    delimited(
        symbol("("),
        separated_list0(symbol(","), expression),
        symbol(")"),
    )(input)
}

fn primary(input: &str) -> PResult<'_, Expr> {
    alt((
        map(parse_float, |f| Expr::Literal(Literal::Float(f))),
        map(parse_integer, |n| Expr::Literal(Literal::Integer(n))),
        map(parse_string, |s| Expr::Literal(Literal::String(s))),
        value(Expr::Literal(Literal::Boolean(true)), keyword("true")),
        value(Expr::Literal(Literal::Boolean(false)), keyword("false")),
        value(Expr::Literal(Literal::Null), keyword("null")),
        map(
            delimited(
                symbol("["),
                separated_list0(symbol(","), expression),
                symbol("]"),
            ),
            |elements| Expr::List { elements },
        ),
        map(pair(identifier, arguments), |(function, args)| Expr::Call {
            function,
            args,
        }),
        map(identifier, Expr::Identifier),
        delimited(symbol("("), expression, symbol(")")),
    ))(input)
}

/// Statement parser that knows the full source so it can attach line numbers
pub(super) struct StatementParser<'s> {
    source: &'s str,
    line_starts: Vec<usize>,
}

impl<'s> StatementParser<'s> {
    pub(super) fn new(source: &'s str) -> Self {
        let line_starts = std::iter::once(0)
            .chain(source.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self {
            source,
            line_starts,
        }
    }

    fn offset(&self, rest: &str) -> usize {
        self.source.len() - rest.len()
    }

    /// 1-based line containing the byte at `offset`
    pub(super) fn line_at(&self, offset: usize) -> usize {
        match self.line_starts.binary_search(&offset) {
            Ok(line) => line + 1,
            Err(line) => line,
        }
    }

    /// Line of the last character consumed before `rest`
    fn end_line(&self, rest: &str) -> usize {
        self.line_at(self.offset(rest).saturating_sub(1))
    }

    pub(super) fn program(&self, input: &'s str) -> Result<Program, ParseError> {
        let (rest, body) = many0(|i| self.statement(i))(input).map_err(|e| self.error(e))?;
        let (rest, _) = ws(rest).map_err(|e| self.error(e))?;
        if !rest.is_empty() {
            return Err(ParseError::Syntax {
                line: self.line_at(self.offset(rest)),
                message: format!("unexpected input near {:?}", snippet(rest)),
            });
        }
        Ok(Program::new(body))
    }

    fn error(&self, err: nom::Err<NomError<&'s str>>) -> ParseError {
        match err {
            nom::Err::Incomplete(_) => ParseError::Syntax {
                line: self.line_at(self.source.len()),
                message: "unexpected end of input".to_string(),
            },
            nom::Err::Error(e) | nom::Err::Failure(e) => ParseError::Syntax {
                line: self.line_at(self.offset(e.input)),
                message: format!("{:?} near {:?}", e.code, snippet(e.input)),
            },
        }
    }

    fn statement(&self, input: &'s str) -> PResult<'s, Stmt> {
        let (input, _) = ws(input)?;
        let begin = self.line_at(self.offset(input));
        alt((
            move |i| self.function(i, begin),
            move |i| self.if_statement(i, begin),
            move |i| self.while_statement(i, begin),
            move |i| self.for_statement(i, begin),
            move |i| self.return_statement(i, begin),
            move |i| self.jump_statement(i, begin),
            move |i| self.simple_statement(i, begin),
        ))(input)
    }

    fn block(&self, input: &'s str) -> PResult<'s, Vec<Stmt>> {
        delimited(symbol("{"), many0(|i| self.statement(i)), symbol("}"))(input)
    }

    /// Header span runs from the keyword to the opening brace of the body
    fn header_span(&self, begin: usize, before_block: &'s str) -> LineSpan {
        let (brace, _) = ws(before_block).unwrap_or((before_block, ()));
        LineSpan::new(begin, self.line_at(self.offset(brace)))
    }

    fn function(&self, input: &'s str, begin: usize) -> PResult<'s, Stmt> {
        let (input, _) = keyword("fn")(input)?;
        let (input, name) = identifier(input)?;
        let (input, params) = delimited(
            symbol("("),
            separated_list0(symbol(","), identifier),
            symbol(")"),
        )(input)?;
        let span = self.header_span(begin, input);
        let (input, body) = self.block(input)?;
        Ok((
            input,
            Stmt::FunctionDef(FunctionDef {
                name,
                params,
                body,
                link: None,
                span,
            }),
        ))
    }

    fn if_statement(&self, input: &'s str, begin: usize) -> PResult<'s, Stmt> {
        let (input, _) = keyword("if")(input)?;
        let (input, condition) = expression(input)?;
        let span = self.header_span(begin, input);
        let (input, then_branch) = self.block(input)?;
        let (input, else_branch) = opt(preceded(keyword("else"), |i: &'s str| {
            let (i, _) = ws(i)?;
            let else_line = self.line_at(self.offset(i));
            alt((
                map(move |i: &'s str| self.if_statement(i, else_line), |stmt| vec![stmt]),
                |i: &'s str| self.block(i),
            ))(i)
        }))(input)?;
        Ok((
            input,
            Stmt::If {
                condition,
                then_branch,
                else_branch,
                span,
            },
        ))
    }

    fn while_statement(&self, input: &'s str, begin: usize) -> PResult<'s, Stmt> {
        let (input, _) = keyword("while")(input)?;
        let (input, condition) = expression(input)?;
        let span = self.header_span(begin, input);
        let (input, body) = self.block(input)?;
        Ok((
            input,
            Stmt::While {
                condition,
                body,
                span,
            },
        ))
    }

    fn for_statement(&self, input: &'s str, begin: usize) -> PResult<'s, Stmt> {
        let (input, _) = keyword("for")(input)?;
        let (input, variable) = identifier(input)?;
        let (input, _) = keyword("in")(input)?;
        let (input, iterable) = expression(input)?;
        let span = self.header_span(begin, input);
        let (input, body) = self.block(input)?;
        Ok((
            input,
            Stmt::For {
                variable,
                iterable,
                body,
                span,
            },
        ))
    }

    fn return_statement(&self, input: &'s str, begin: usize) -> PResult<'s, Stmt> {
        let (input, _) = keyword("return")(input)?;
        let (input, value) = opt(expression)(input)?;
        let (input, _) = symbol(";")(input)?;
        let span = LineSpan::new(begin, self.end_line(input));
        Ok((input, Stmt::Return { value, span }))
    }

    fn jump_statement(&self, input: &'s str, begin: usize) -> PResult<'s, Stmt> {
        let (input, is_break) = alt((
            value(true, keyword("break")),
            value(false, keyword("continue")),
        ))(input)?;
        let (input, _) = symbol(";")(input)?;
        let span = LineSpan::new(begin, self.end_line(input));
        let stmt = if is_break {
            Stmt::Break { span }
        } else {
            Stmt::Continue { span }
        };
        Ok((input, stmt))
    }

    /// Assignment forms and expression statements share a prefix
    fn simple_statement(&self, input: &'s str, begin: usize) -> PResult<'s, Stmt> {
        let (input, first) = expression(input)?;

        // `a, b = value;`
        let (after_targets, more) = many0(preceded(symbol(","), expression))(input)?;
        if !more.is_empty() {
            let (rest, _) = assign_symbol(after_targets)?;
            let (rest, value) = expression(rest)?;
            let (rest, _) = symbol(";")(rest)?;
            let mut targets = vec![first];
            targets.extend(more);
            check_targets(input, &targets)?;
            let span = LineSpan::new(begin, self.end_line(rest));
            return Ok((
                rest,
                Stmt::Destructure {
                    targets,
                    value,
                    span,
                },
            ));
        }

        // `target = target = ... = value;` or a bare expression
        let (input, rest_chain) = many0(preceded(assign_symbol, expression))(input)?;
        let (input, _) = symbol(";")(input)?;
        let span = LineSpan::new(begin, self.end_line(input));

        let mut chain = vec![first];
        chain.extend(rest_chain);
        let value = chain.pop().ok_or_else(|| {
            nom::Err::Failure(NomError::new(input, ErrorKind::Verify))
        })?;

        let stmt = match chain.len() {
            0 => Stmt::Expression { expr: value, span },
            1 => {
                check_targets(input, &chain)?;
                let target = chain.remove(0);
                Stmt::Assign {
                    target,
                    value,
                    span,
                }
            }
            _ => {
                check_targets(input, &chain)?;
                Stmt::MultiAssign {
                    targets: chain,
                    value,
                    span,
                }
            }
        };
        Ok((input, stmt))
    }
}

/// `=` that is not the start of `==`
fn assign_symbol(input: &str) -> PResult<'_, &str> {
    preceded(ws, terminated(tag("="), not(peek(char('=')))))(input)
}

fn check_targets<'a>(input: &'a str, targets: &[Expr]) -> Result<(), nom::Err<NomError<&'a str>>> {
    if targets.iter().all(Expr::is_assignable) {
        Ok(())
    } else {
        Err(nom::Err::Failure(NomError::new(input, ErrorKind::Verify)))
    }
}

fn snippet(input: &str) -> String {
    input.trim_start().chars().take(20).collect()
}
