//! Hand-written recursive descent parser for CEL expressions.
//!
//! The parser uses `nom` for low-level token recognition and implements
//! precedence climbing manually. The output is the [`Expr`] IR defined in
//! `armor-rules`; macros are applied afterwards by [`crate::macros`].
//!
//! Precedence, lowest first: `?:`, `||`, `&&`, relations (`==`, `!=`, `<`,
//! `<=`, `>`, `>=`, `in`), `+ -`, `* / %`, unary `! -`, then postfix
//! selection, indexing and calls.

use nom::{
    IResult,
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char, digit1, multispace0, one_of},
    combinator::{opt, recognize},
    error::{Error, ErrorKind},
    multi::separated_list0,
    sequence::{delimited, tuple},
};

use armor_rules::RuleError;
use armor_rules::ir::expr::{BinaryOp, Expr, UnaryOp};

/// Identifiers the language reserves; they cannot name variables or
/// functions.
const RESERVED: &[&str] = &[
    "as", "break", "const", "continue", "else", "for", "function", "if", "import", "in", "let",
    "loop", "package", "namespace", "return", "var", "void", "while",
];

/// Deepest nesting of parentheses, brackets, calls, unary operators and
/// operator chains the parser accepts.
pub const MAX_RECURSION_DEPTH: usize = 64;

/// Parse a complete CEL expression string into an [`Expr`].
///
/// Returns a [`RuleError::Parse`] if the input cannot be parsed or has
/// trailing tokens.
pub fn parse_cel_expr(input: &str) -> Result<Expr, RuleError> {
    if input.trim().is_empty() {
        return Err(RuleError::Parse("empty expression".to_owned()));
    }
    let (rest, expr) = parse_ternary(input, 0).map_err(|e| syntax_error(input, e))?;
    let trailing = rest.trim_start();
    if !trailing.is_empty() {
        let offset = input.len() - trailing.len();
        return Err(RuleError::Parse(format!(
            "unexpected input at offset {offset}: {:?}",
            snippet(trailing)
        )));
    }
    Ok(expr)
}

fn syntax_error(source: &str, err: nom::Err<Error<&str>>) -> RuleError {
    match err {
        nom::Err::Failure(e) if e.code == ErrorKind::TooLarge => {
            RuleError::Parse("expression recursion limit exceeded".to_owned())
        }
        nom::Err::Error(e) | nom::Err::Failure(e) => {
            let offset = source.len() - e.input.len();
            if e.input.trim().is_empty() {
                RuleError::Parse(format!("unexpected end of input at offset {offset}"))
            } else {
                RuleError::Parse(format!(
                    "syntax error at offset {offset} near {:?}",
                    snippet(e.input)
                ))
            }
        }
        nom::Err::Incomplete(_) => RuleError::Parse("incomplete input".to_owned()),
    }
}

fn snippet(input: &str) -> String {
    input.chars().take(20).collect()
}

fn fail<T>(input: &str, kind: ErrorKind) -> IResult<&str, T> {
    Err(nom::Err::Failure(Error::new(input, kind)))
}

fn reject<T>(input: &str, kind: ErrorKind) -> IResult<&str, T> {
    Err(nom::Err::Error(Error::new(input, kind)))
}

/// Fail once `depth` passes [`MAX_RECURSION_DEPTH`].
fn guard(input: &str, depth: usize) -> Result<(), nom::Err<Error<&str>>> {
    if depth > MAX_RECURSION_DEPTH {
        return Err(nom::Err::Failure(Error::new(input, ErrorKind::TooLarge)));
    }
    Ok(())
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Consume optional whitespace around a parser.
fn ws<'a, F, O>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    delimited(multispace0, inner, multispace0)
}

// ---------------------------------------------------------------------------
// Atoms (literals, identifiers, parenthesised expressions, lists, maps)
// ---------------------------------------------------------------------------

/// Parse an atom: literal, identifier, call, parenthesised expression,
/// list, or map.
fn parse_atom(input: &str, depth: usize) -> IResult<&str, Expr> {
    let (input, _) = multispace0(input)?;
    alt((
        parse_keyword_literal,
        parse_number,
        parse_string_literal,
        |i| parse_list_literal(i, depth),
        |i| parse_map_literal(i, depth),
        |i| parse_paren(i, depth),
        |i| parse_function_or_ident(i, depth),
    ))(input)
}

/// Parse `null`, `true` and `false`.
fn parse_keyword_literal(input: &str) -> IResult<&str, Expr> {
    let (rest, word) = alt((tag("null"), tag("true"), tag("false")))(input)?;
    // Ensure it's not just a prefix of an identifier.
    if rest.starts_with(is_ident_char) {
        return reject(input, ErrorKind::Tag);
    }
    let expr = match word {
        "null" => Expr::Null,
        "true" => Expr::Bool(true),
        _ => Expr::Bool(false),
    };
    Ok((rest, expr))
}

fn parse_number(input: &str) -> IResult<&str, Expr> {
    parse_signed_number(input, false)
}

/// Parse an integer (decimal or hex) or double literal. The sign is
/// folded in here so that `-9223372036854775808` is representable.
fn parse_signed_number(input: &str, negative: bool) -> IResult<&str, Expr> {
    let sign = if negative { "-" } else { "" };

    let (rest, expr) = if let Some(hex) = input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
    {
        let (rest, digits) = take_while1(|c: char| c.is_ascii_hexdigit())(hex)?;
        match i64::from_str_radix(&format!("{sign}{digits}"), 16) {
            Ok(n) => (rest, Expr::Int(n)),
            Err(_) => return fail(input, ErrorKind::HexDigit),
        }
    } else {
        let (rest, text) = recognize(tuple((
            digit1,
            opt(tuple((char('.'), digit1))),
            opt(tuple((one_of("eE"), opt(one_of("+-")), digit1))),
        )))(input)?;
        if text.contains(['.', 'e', 'E']) {
            match format!("{sign}{text}").parse::<f64>() {
                Ok(f) => (rest, Expr::Float(f)),
                Err(_) => return fail(input, ErrorKind::Float),
            }
        } else {
            match format!("{sign}{text}").parse::<i64>() {
                Ok(n) => (rest, Expr::Int(n)),
                Err(_) => return fail(input, ErrorKind::Digit),
            }
        }
    };

    // `12abc` and unsigned literals such as `1u` are not supported.
    if rest.starts_with(is_ident_char) {
        return fail(rest, ErrorKind::Digit);
    }
    Ok((rest, expr))
}

/// Parse a quoted string literal: single or double quotes, optionally
/// prefixed with `r` for a raw string in which escapes are not processed.
fn parse_string_literal(input: &str) -> IResult<&str, Expr> {
    let (body, raw) = match input.strip_prefix(['r', 'R']) {
        Some(rest) => (rest, true),
        None => (input, false),
    };
    let quote = match body.chars().next() {
        Some(q @ ('"' | '\'')) => q,
        _ => return reject(input, ErrorKind::Char),
    };
    let content = &body[1..];

    let mut result = String::new();
    let mut chars = content.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            c if c == quote => return Ok((&content[i + 1..], Expr::String(result))),
            '\n' | '\r' => return fail(&content[i..], ErrorKind::Char),
            '\\' if !raw => match parse_escape(&mut chars) {
                Some(unescaped) => result.push(unescaped),
                None => return fail(&content[i..], ErrorKind::Escaped),
            },
            c => result.push(c),
        }
    }
    fail(input, ErrorKind::Char)
}

/// Decode the escape sequence following a backslash.
fn parse_escape(chars: &mut std::str::CharIndices<'_>) -> Option<char> {
    let (_, c) = chars.next()?;
    let decoded = match c {
        'a' => '\u{07}',
        'b' => '\u{08}',
        'f' => '\u{0c}',
        'n' => '\n',
        'r' => '\r',
        't' => '\t',
        'v' => '\u{0b}',
        '\\' | '\'' | '"' | '`' | '?' => c,
        'x' | 'X' => char::from_u32(take_digits(chars, 2, 16)?)?,
        'u' => char::from_u32(take_digits(chars, 4, 16)?)?,
        'U' => char::from_u32(take_digits(chars, 8, 16)?)?,
        '0'..='3' => {
            let rest = take_digits(chars, 2, 8)?;
            char::from_u32(c.to_digit(8)? * 64 + rest)?
        }
        _ => return None,
    };
    Some(decoded)
}

fn take_digits(chars: &mut std::str::CharIndices<'_>, count: usize, radix: u32) -> Option<u32> {
    (0..count).try_fold(0_u32, |acc, _| {
        let (_, c) = chars.next()?;
        Some(acc * radix + c.to_digit(radix)?)
    })
}

/// Parse a list literal: `[expr, expr, ...]`, trailing comma allowed.
fn parse_list_literal(input: &str, depth: usize) -> IResult<&str, Expr> {
    let (input, _) = char('[')(input)?;
    let (input, _) = multispace0(input)?;
    let (input, items) =
        separated_list0(ws(char(',')), |i| parse_ternary(i, depth + 1))(input)?;
    let (input, _) = opt(ws(char(',')))(input)?;
    let (input, _) = multispace0(input)?;
    let (input, _) = char(']')(input)?;
    Ok((input, Expr::List(items)))
}

/// Parse a map literal: `{'key': value, ...}`. Keys must be string
/// literals.
fn parse_map_literal(input: &str, depth: usize) -> IResult<&str, Expr> {
    let (input, _) = char('{')(input)?;
    let (input, _) = multispace0(input)?;
    let (input, entries) =
        separated_list0(ws(char(',')), |i| parse_map_entry(i, depth + 1))(input)?;
    let (input, _) = opt(ws(char(',')))(input)?;
    let (input, _) = multispace0(input)?;
    let (input, _) = char('}')(input)?;
    Ok((input, Expr::Map(entries)))
}

/// Parse a single map entry: `key: value`.
fn parse_map_entry(input: &str, depth: usize) -> IResult<&str, (String, Expr)> {
    let (input, _) = multispace0(input)?;
    let (rest, key) = parse_string_literal(input)?;
    let Expr::String(key) = key else {
        return reject(input, ErrorKind::Char);
    };
    let (rest, _) = ws(char(':'))(rest)?;
    let (rest, value) = parse_ternary(rest, depth)?;
    Ok((rest, (key, value)))
}

/// Parse a parenthesised expression.
fn parse_paren(input: &str, depth: usize) -> IResult<&str, Expr> {
    let (input, _) = char('(')(input)?;
    let (input, expr) = parse_ternary(input, depth + 1)?;
    let (input, _) = multispace0(input)?;
    let (input, _) = char(')')(input)?;
    Ok((input, expr))
}

/// Parse a bare identifier string matching `[a-zA-Z_][a-zA-Z0-9_]*`.
fn parse_ident_str(input: &str) -> IResult<&str, &str> {
    recognize(tuple((
        take_while1(|c: char| c.is_ascii_alphabetic() || c == '_'),
        take_while(is_ident_char),
    )))(input)
}

/// Parse a field name after `.`: a plain identifier or a backtick-quoted
/// name such as `` `key-one` ``.
fn parse_field_name(input: &str) -> IResult<&str, (&str, bool)> {
    if let Some(quoted) = input.strip_prefix('`') {
        let (rest, name) = take_while1(|c: char| c != '`' && c != '\n')(quoted)?;
        let (rest, _) = char('`')(rest)?;
        return Ok((rest, (name, true)));
    }
    let (rest, name) = parse_ident_str(input)?;
    Ok((rest, (name, false)))
}

/// Parse the parenthesised argument list of a call.
fn parse_args(input: &str, depth: usize) -> IResult<&str, Vec<Expr>> {
    let (input, _) = char('(')(input)?;
    let (input, _) = multispace0(input)?;
    let (input, args) = separated_list0(ws(char(',')), |i| parse_ternary(i, depth + 1))(input)?;
    let (input, _) = multispace0(input)?;
    let (input, _) = char(')')(input)?;
    Ok((input, args))
}

/// Parse a global function call or a plain identifier.
fn parse_function_or_ident(input: &str, depth: usize) -> IResult<&str, Expr> {
    let (rest, ident) = parse_ident_str(input)?;
    if RESERVED.contains(&ident) {
        return reject(input, ErrorKind::Tag);
    }
    let (after_ws, _) = multispace0(rest)?;
    if after_ws.starts_with('(') {
        let (rest, args) = parse_args(after_ws, depth)?;
        return Ok((rest, Expr::call(ident, args)));
    }
    Ok((rest, Expr::Ident(ident.to_owned())))
}

// ---------------------------------------------------------------------------
// Postfix: field access, index access, method calls
// ---------------------------------------------------------------------------

/// Parse postfix operations: `.field`, `[index]`, `.method(args)`.
/// Each step wraps the expression built so far, so it counts towards the
/// nesting depth.
fn parse_postfix(input: &str, depth: usize) -> IResult<&str, Expr> {
    let (mut input, mut expr) = parse_atom(input, depth)?;
    let mut depth = depth;

    loop {
        let (next, _) = multispace0(input)?;
        if next.starts_with(['.', '[']) {
            depth += 1;
            guard(next, depth)?;
        }

        // Field access or method call: `.ident`, `` .`name` `` or `.ident(args)`
        if let Some(rest) = next.strip_prefix('.') {
            let (rest, _) = multispace0(rest)?;
            let (rest, (field, quoted)) = parse_field_name(rest)?;
            let (after_ws, _) = multispace0(rest)?;

            if !quoted && after_ws.starts_with('(') {
                let (rest, args) = parse_args(after_ws, depth)?;
                expr = Expr::member_call(expr, field, args);
                input = rest;
                continue;
            }

            expr = Expr::Field(Box::new(expr), field.to_owned());
            input = rest;
            continue;
        }

        // Index access: `[expr]`
        if let Some(rest) = next.strip_prefix('[') {
            let (rest, index_expr) = parse_ternary(rest, depth + 1)?;
            let (rest, _) = multispace0(rest)?;
            let (rest, _) = char(']')(rest)?;
            expr = Expr::Index(Box::new(expr), Box::new(index_expr));
            input = rest;
            continue;
        }

        break;
    }

    Ok((input, expr))
}

// ---------------------------------------------------------------------------
// Unary operators
// ---------------------------------------------------------------------------

/// Parse unary operators `!` and `-`. A minus directly in front of a
/// numeric literal is folded into the literal.
fn parse_unary(input: &str, depth: usize) -> IResult<&str, Expr> {
    let (input, _) = multispace0(input)?;

    if let Some(rest) = input.strip_prefix('!') {
        guard(input, depth + 1)?;
        let (rest, operand) = parse_unary(rest, depth + 1)?;
        return Ok((rest, Expr::Unary(UnaryOp::Not, Box::new(operand))));
    }

    if let Some(rest) = input.strip_prefix('-') {
        let (rest, _) = multispace0(rest)?;
        if rest.starts_with(|c: char| c.is_ascii_digit()) {
            return parse_signed_number(rest, true);
        }
        guard(input, depth + 1)?;
        let (rest, operand) = parse_unary(rest, depth + 1)?;
        return Ok((rest, Expr::Unary(UnaryOp::Neg, Box::new(operand))));
    }

    parse_postfix(input, depth)
}

// ---------------------------------------------------------------------------
// Binary operators with precedence climbing
// ---------------------------------------------------------------------------

/// Parse a left-associative chain of `operand (op operand)*`, where `op`
/// recognises an operator token and returns its length. Every operator
/// nests the chain one level deeper.
fn parse_chain<'a>(
    input: &'a str,
    depth: usize,
    operand: fn(&'a str, usize) -> IResult<&'a str, Expr>,
    op: fn(&str) -> Option<(BinaryOp, usize)>,
) -> IResult<&'a str, Expr> {
    let (mut input, mut left) = operand(input, depth)?;
    let mut depth = depth;

    loop {
        let (next, _) = multispace0(input)?;
        let Some((op, len)) = op(next) else {
            break;
        };
        depth += 1;
        guard(next, depth)?;
        let (rest, right) = operand(&next[len..], depth)?;
        left = Expr::Binary(op, Box::new(left), Box::new(right));
        input = rest;
    }

    Ok((input, left))
}

/// `*`, `/`, `%`
fn parse_mul(input: &str, depth: usize) -> IResult<&str, Expr> {
    parse_chain(input, depth, parse_unary, |next| match next.chars().next() {
        Some('*') => Some((BinaryOp::Mul, 1)),
        Some('/') => Some((BinaryOp::Div, 1)),
        Some('%') => Some((BinaryOp::Mod, 1)),
        _ => None,
    })
}

/// `+`, `-`
fn parse_add(input: &str, depth: usize) -> IResult<&str, Expr> {
    parse_chain(input, depth, parse_mul, |next| match next.chars().next() {
        Some('+') => Some((BinaryOp::Add, 1)),
        Some('-') => Some((BinaryOp::Sub, 1)),
        _ => None,
    })
}

/// Relations share one precedence level: `==`, `!=`, `<`, `<=`, `>`,
/// `>=`, `in`.
fn parse_relation(input: &str, depth: usize) -> IResult<&str, Expr> {
    parse_chain(input, depth, parse_add, |next| {
        if next.starts_with("==") {
            Some((BinaryOp::Eq, 2))
        } else if next.starts_with("!=") {
            Some((BinaryOp::Ne, 2))
        } else if next.starts_with("<=") {
            Some((BinaryOp::Le, 2))
        } else if next.starts_with(">=") {
            Some((BinaryOp::Ge, 2))
        } else if next.starts_with('<') {
            Some((BinaryOp::Lt, 1))
        } else if next.starts_with('>') {
            Some((BinaryOp::Gt, 1))
        } else if next
            .strip_prefix("in")
            .is_some_and(|after| !after.starts_with(is_ident_char))
        {
            Some((BinaryOp::In, 2))
        } else {
            None
        }
    })
}

/// `&&`
fn parse_and(input: &str, depth: usize) -> IResult<&str, Expr> {
    parse_chain(input, depth, parse_relation, |next| {
        next.starts_with("&&").then_some((BinaryOp::And, 2))
    })
}

/// `||`
fn parse_or(input: &str, depth: usize) -> IResult<&str, Expr> {
    parse_chain(input, depth, parse_and, |next| {
        next.starts_with("||").then_some((BinaryOp::Or, 2))
    })
}

/// Top-level expression: ternary `condition ? then : else`
fn parse_ternary(input: &str, depth: usize) -> IResult<&str, Expr> {
    guard(input, depth)?;
    let (input, cond) = parse_or(input, depth)?;
    let (after_ws, _) = multispace0(input)?;

    let Some(rest) = after_ws.strip_prefix('?') else {
        return Ok((input, cond));
    };
    let (rest, then_expr) = parse_or(rest, depth + 1)?;
    let (rest, _) = ws(char(':'))(rest)?;
    let (rest, else_expr) = parse_ternary(rest, depth + 1)?;
    Ok((
        rest,
        Expr::Ternary(Box::new(cond), Box::new(then_expr), Box::new(else_expr)),
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
