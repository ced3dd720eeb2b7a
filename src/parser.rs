//! Schema compiler.
//!
//! Turns bracketed selection text into a [`Selection`] tree.
//!
//! # Syntax Overview
//!
//! ```text
//! author: user(id) { id name posts { title } }
//! ──┬───  ─┬── ─┬─ ─────────────┬──────────────
//!   │      │    │               │
//!   │      │    │               └── Group (nested selection)
//!   │      │    └── Params (named references or literals)
//!   │      └── Name (dotted paths allowed: profile.avatar)
//!   └── Alias (output key)
//! ```
//!
//! Items are separated by whitespace only. The compiler walks the input with
//! a cursor and keeps a stack of open groups; every item is inserted into the
//! innermost open group, merging with an identical sibling instead of
//! duplicating it.

use nom::{
    bytes::complete::{take_while, take_while1},
    character::complete::{char, multispace0, space0},
    combinator::{opt, verify},
    sequence::{delimited, terminated, tuple},
    IResult,
};

use crate::ast::{Call, Param, Selection};
use crate::error::{ApiqlError, ApiqlResult};

/// Compile schema text into a selection tree.
pub fn compile(text: &str) -> ApiqlResult<Selection> {
    let mut root = Selection::new();
    // (index of the call owning the group in its parent, input at its `{`)
    let mut open: Vec<(usize, &str)> = Vec::new();
    let mut last: Option<usize> = None;
    let mut rest = text;

    loop {
        rest = rest.trim_start();
        let Some(next) = rest.chars().next() else {
            break;
        };

        match next {
            '{' => {
                let Some(index) = last.take() else {
                    return Err(ApiqlError::parse("group without a preceding call", rest));
                };
                target(&mut root, &open).group_mut(index);
                open.push((index, rest));
                rest = &rest[1..];
            }
            '}' => {
                if open.pop().is_none() {
                    return Err(ApiqlError::parse("unmatched '}'", rest));
                }
                last = None;
                rest = &rest[1..];
            }
            _ => {
                let (remaining, call) =
                    parse_call(rest).map_err(|_| ApiqlError::parse("expected a call", rest))?;
                last = Some(target(&mut root, &open).insert(call));
                rest = remaining;
            }
        }
    }

    if let Some((_, group)) = open.last() {
        return Err(ApiqlError::parse("unterminated group", *group));
    }

    Ok(root)
}

/// Innermost open group.
fn target<'s>(root: &'s mut Selection, open: &[(usize, &str)]) -> &'s mut Selection {
    open.iter()
        .fold(root, |selection, (index, _)| selection.group_mut(*index))
}

/// Parse one item header: `[alias ':'] name ['(' params ')']`.
fn parse_call(input: &str) -> IResult<&str, Call> {
    let (input, alias) = opt(parse_alias)(input)?;
    let (input, name) = parse_name(input)?;
    let (input, params) = opt(parse_params)(input)?;

    let mut call = Call::new(name);
    if let Some(alias) = alias {
        call = call.alias(alias);
    }
    if let Some(params) = params {
        call = call.params(split_params(params));
    }
    Ok((input, call))
}

/// Parse a name (word characters and dots, no empty segments).
fn parse_name(input: &str) -> IResult<&str, &str> {
    verify(
        take_while1(|c: char| c.is_alphanumeric() || c == '_' || c == '.'),
        |s: &str| s.split('.').all(|segment| !segment.is_empty()),
    )(input)
}

/// Parse `alias:`.
fn parse_alias(input: &str) -> IResult<&str, &str> {
    terminated(parse_name, tuple((space0, char(':'), multispace0)))(input)
}

/// Parse the raw text between parentheses.
fn parse_params(input: &str) -> IResult<&str, &str> {
    delimited(char('('), take_while(|c: char| c != ')'), char(')'))(input)
}

fn split_params(raw: &str) -> Vec<Param> {
    if raw.trim().is_empty() {
        return Vec::new();
    }
    raw.split(',').map(Param::from_token).collect()
}
