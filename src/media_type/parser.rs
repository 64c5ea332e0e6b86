//! # Content-Type Grammar
//!
//! nom combinators for the RFC 2045 `Content-Type` grammar:
//!
//! ```text
//! content-type := type "/" subtype *( ";" attribute "=" value )
//! value        := token | quoted-string
//! ```
//!
//! RFC 822 comments (`(like this)`) may appear wherever linear whitespace is
//! allowed. Comments nest and honor backslash escapes. Once a `;`, `"` or `(`
//! has been consumed the parser commits, so error messages point at the
//! construct that was left unfinished.

use nom::{
    branch::alt,
    bytes::complete::take_while1,
    character::complete::{anychar, char, multispace1, none_of},
    combinator::{all_consuming, cut, map, value},
    error::{context, VerboseError, VerboseErrorKind},
    multi::many0,
    sequence::{preceded, terminated, tuple},
    IResult,
};

pub(crate) type ParserResult<'a, T> = IResult<&'a str, T, VerboseError<&'a str>>;

/// Raw parse output. Names are already lowercased, values are untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ParsedMediaType {
    pub media_type: String,
    pub subtype: String,
    pub params: Vec<(String, String)>,
}

pub(crate) fn is_token_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || "!#$%&'*+.^_`{|}-".contains(c)
}

fn token(input: &str) -> ParserResult<&str> {
    take_while1(is_token_char)(input)
}

fn comment(input: &str) -> ParserResult<()> {
    context(
        "comment",
        value(
            (),
            preceded(
                char('('),
                cut(terminated(
                    many0(alt((
                        comment,
                        value((), preceded(char('\\'), anychar)),
                        value((), none_of("()\\")),
                    ))),
                    char(')'),
                )),
            ),
        ),
    )(input)
}

/// Linear whitespace and comments.
fn lws(input: &str) -> ParserResult<()> {
    value((), many0(alt((value((), multispace1), comment))))(input)
}

fn quoted_string(input: &str) -> ParserResult<String> {
    context(
        "quoted string",
        preceded(
            char('"'),
            cut(terminated(
                map(
                    many0(alt((preceded(char('\\'), anychar), none_of("\"\\")))),
                    |chars| chars.into_iter().collect(),
                ),
                char('"'),
            )),
        ),
    )(input)
}

fn parameter(input: &str) -> ParserResult<(String, String)> {
    preceded(
        char(';'),
        cut(map(
            tuple((
                lws,
                context("parameter name", token),
                lws,
                context("parameter separator", char('=')),
                lws,
                context(
                    "parameter value",
                    alt((quoted_string, map(token, String::from))),
                ),
                lws,
            )),
            |(_, name, _, _, _, value, _)| (name.to_ascii_lowercase(), value),
        )),
    )(input)
}

#[tracing::instrument(level = "debug", skip(input))]
pub(crate) fn parse_media_type(input: &str) -> ParserResult<ParsedMediaType> {
    all_consuming(map(
        tuple((
            lws,
            context("media type", token),
            lws,
            context("subtype separator", char('/')),
            lws,
            context("subtype", token),
            lws,
            many0(parameter),
        )),
        |(_, media_type, _, _, _, subtype, _, params)| ParsedMediaType {
            media_type: media_type.to_ascii_lowercase(),
            subtype: subtype.to_ascii_lowercase(),
            params,
        },
    ))(input)
}

/// Turns a nom failure into a one-line diagnostic.
pub(crate) fn describe_error(input: &str, error: nom::Err<VerboseError<&str>>) -> String {
    match error {
        nom::Err::Error(e) | nom::Err::Failure(e) => {
            let position = e
                .errors
                .first()
                .map(|(rest, _)| input.len() - rest.len())
                .unwrap_or(0);
            let context = e.errors.iter().find_map(|(_, kind)| match kind {
                VerboseErrorKind::Context(c) => Some(*c),
                _ => None,
            });
            match context {
                Some(c) => format!("Failed to parse {} at position {}", c, position),
                None => format!("Unexpected input at position {}", position),
            }
        }
        nom::Err::Incomplete(_) => "Incomplete content type".to_string(),
    }
}
