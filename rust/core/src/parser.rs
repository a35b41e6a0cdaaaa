// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! STEP tokenizer built on nom
//!
//! Zero-copy tokens for a single `#id=TYPE(...);` instance line. Entity type
//! names are kept as text; the element index only cares about a handful of
//! relationship types and the rooted attributes every element shares.

use nom::{
    branch::alt,
    bytes::complete::{take_while, take_while1},
    character::complete::{char, digit1, one_of},
    combinator::{map, map_res, opt, recognize},
    multi::separated_list0,
    sequence::{delimited, pair, preceded, tuple},
    IResult,
};

use crate::error::{Error, Result};

/// STEP token
#[derive(Debug, Clone, PartialEq)]
pub enum Token<'a> {
    /// Entity reference: #123
    EntityRef(u32),
    /// String literal, still escaped: 'it''s'
    String(&'a str),
    /// Integer: 42
    Integer(i64),
    /// Float: 3.14, 0., 1.5E-10
    Float(f64),
    /// Enum: .T., .ELEMENT.
    Enum(&'a str),
    /// List: (1, 2, 3)
    List(Vec<Token<'a>>),
    /// Typed value: IFCLABEL('x'), IFCBOOLEAN(.T.)
    TypedValue(&'a str, Vec<Token<'a>>),
    /// Unset value: $
    Null,
    /// Derived value: *
    Derived,
}

impl<'a> Token<'a> {
    /// Entity reference target, if this is a reference.
    pub fn as_ref_id(&self) -> Option<u32> {
        match self {
            Token::EntityRef(id) => Some(*id),
            _ => None,
        }
    }

    /// Raw (escaped) string content.
    pub fn as_raw_str(&self) -> Option<&'a str> {
        match self {
            Token::String(s) => Some(s),
            _ => None,
        }
    }

    /// Decoded string content.
    pub fn as_text(&self) -> Option<String> {
        self.as_raw_str().map(decode_step_string)
    }

    /// All entity references in a list token.
    pub fn ref_list(&self) -> Vec<u32> {
        match self {
            Token::List(items) => items.iter().filter_map(Token::as_ref_id).collect(),
            Token::EntityRef(id) => vec![*id],
            _ => Vec::new(),
        }
    }

    /// Human readable rendering used for property values.
    pub fn display_value(&self) -> Option<String> {
        match self {
            Token::String(s) => Some(decode_step_string(s)),
            Token::Integer(i) => Some(i.to_string()),
            Token::Float(f) => Some(f.to_string()),
            Token::Enum(e) => Some(match *e {
                "T" => "true".to_string(),
                "F" => "false".to_string(),
                "U" => "unknown".to_string(),
                other => other.to_string(),
            }),
            Token::EntityRef(id) => Some(format!("#{}", id)),
            Token::TypedValue(_, args) => {
                let parts: Vec<String> = args.iter().filter_map(Token::display_value).collect();
                if parts.is_empty() {
                    None
                } else {
                    Some(parts.join(", "))
                }
            }
            Token::List(items) => {
                let parts: Vec<String> = items.iter().filter_map(Token::display_value).collect();
                Some(format!("({})", parts.join(", ")))
            }
            Token::Null | Token::Derived => None,
        }
    }
}

/// Decode the STEP string escapes IFC exporters emit: doubled quotes,
/// `\X\hh` (ISO 8859-1) and `\X2\hhhh...\X0\` (UCS-2) runs.
pub fn decode_step_string(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;

    while !rest.is_empty() {
        if let Some(tail) = rest.strip_prefix("''") {
            out.push('\'');
            rest = tail;
        } else if let Some(tail) = rest.strip_prefix("\\X2\\") {
            let end = tail.find("\\X0\\").unwrap_or(tail.len());
            let hex = &tail[..end];
            let mut units = Vec::with_capacity(hex.len() / 4);
            for chunk in hex.as_bytes().chunks(4) {
                if let Some(unit) = std::str::from_utf8(chunk)
                    .ok()
                    .and_then(|s| u16::from_str_radix(s, 16).ok())
                {
                    units.push(unit);
                }
            }
            out.extend(char::decode_utf16(units).map(|c| c.unwrap_or('\u{FFFD}')));
            rest = tail.get(end + 4..).unwrap_or("");
        } else if let Some(tail) = rest.strip_prefix("\\X\\") {
            match tail.get(..2).and_then(|h| u8::from_str_radix(h, 16).ok()) {
                Some(byte) => {
                    out.push(byte as char);
                    rest = &tail[2..];
                }
                None => {
                    out.push_str("\\X\\");
                    rest = tail;
                }
            }
        } else {
            let mut chars = rest.chars();
            if let Some(c) = chars.next() {
                out.push(c);
            }
            rest = chars.as_str();
        }
    }

    out
}

fn entity_ref(input: &str) -> IResult<&str, Token> {
    map(
        preceded(char('#'), map_res(digit1, |s: &str| s.parse::<u32>())),
        Token::EntityRef,
    )(input)
}

/// Body of a quoted string; `''` is an escaped quote and does not terminate.
fn quoted_body(input: &str) -> IResult<&str, &str> {
    let bytes = input.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\'' {
            if bytes.get(i + 1) == Some(&b'\'') {
                i += 2;
                continue;
            }
            return Ok((&input[i..], &input[..i]));
        }
        i += 1;
    }
    Err(nom::Err::Error(nom::error::Error::new(
        input,
        nom::error::ErrorKind::Char,
    )))
}

fn string_literal(input: &str) -> IResult<&str, Token> {
    map(delimited(char('\''), quoted_body, char('\'')), Token::String)(input)
}

fn integer(input: &str) -> IResult<&str, Token> {
    map_res(recognize(pair(opt(one_of("+-")), digit1)), |s: &str| {
        s.parse::<i64>().map(Token::Integer)
    })(input)
}

fn float(input: &str) -> IResult<&str, Token> {
    map_res(
        recognize(tuple((
            opt(one_of("+-")),
            digit1,
            char('.'),
            opt(digit1),
            opt(tuple((one_of("eE"), opt(one_of("+-")), digit1))),
        ))),
        |s: &str| s.parse::<f64>().map(Token::Float),
    )(input)
}

fn enum_value(input: &str) -> IResult<&str, Token> {
    map(
        delimited(
            char('.'),
            take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_'),
            char('.'),
        ),
        Token::Enum,
    )(input)
}

fn keyword(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_')(input)
}

fn args(input: &str) -> IResult<&str, Vec<Token>> {
    delimited(
        char('('),
        separated_list0(delimited(ws, char(','), ws), token),
        preceded(ws, char(')')),
    )(input)
}

fn typed_value(input: &str) -> IResult<&str, Token> {
    map(pair(keyword, preceded(ws, args)), |(name, values)| {
        Token::TypedValue(name, values)
    })(input)
}

fn list(input: &str) -> IResult<&str, Token> {
    map(args, Token::List)(input)
}

fn ws(input: &str) -> IResult<&str, ()> {
    map(take_while(|c: char| c.is_whitespace()), |_| ())(input)
}

fn token(input: &str) -> IResult<&str, Token> {
    delimited(
        ws,
        alt((
            float,
            integer,
            entity_ref,
            string_literal,
            enum_value,
            list,
            typed_value,
            map(char('$'), |_| Token::Null),
            map(char('*'), |_| Token::Derived),
        )),
        ws,
    )(input)
}

/// Parse one instance line: `#123=IFCWALL('guid',$,...);`
///
/// Returns the entity id, its upper-case type name and the attribute tokens.
pub fn parse_entity(input: &str) -> Result<(u32, &str, Vec<Token>)> {
    let result: IResult<&str, (u32, &str, Vec<Token>)> = tuple((
        delimited(
            ws,
            preceded(char('#'), map_res(digit1, |s: &str| s.parse::<u32>())),
            ws,
        ),
        preceded(char('='), delimited(ws, keyword, ws)),
        args,
    ))(input);

    match result {
        Ok((rest, (id, type_name, attributes))) => {
            let rest = rest.trim_start();
            if !rest.starts_with(';') {
                return Err(Error::parse(
                    input.len() - rest.len(),
                    format!("expected ';' after entity #{}", id),
                ));
            }
            Ok((id, type_name, attributes))
        }
        Err(e) => Err(Error::parse(0, format!("Failed to parse entity: {}", e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalars() {
        assert_eq!(entity_ref("#123"), Ok(("", Token::EntityRef(123))));
        assert_eq!(integer("-42"), Ok(("", Token::Integer(-42))));
        assert_eq!(float("0."), Ok(("", Token::Float(0.0))));
        assert_eq!(float("1.5E-10"), Ok(("", Token::Float(1.5e-10))));
        assert_eq!(enum_value(".ELEMENT."), Ok(("", Token::Enum("ELEMENT"))));
    }

    #[test]
    fn test_string_with_escaped_quote() {
        assert_eq!(
            string_literal("'it''s'"),
            Ok(("", Token::String("it''s")))
        );
        assert_eq!(decode_step_string("it''s"), "it's");
    }

    #[test]
    fn test_decode_unicode_escapes() {
        assert_eq!(decode_step_string("W\\X2\\00E4\\X0\\nde"), "Wände");
        assert_eq!(decode_step_string("Stra\\X\\DFe"), "Straße");
        assert_eq!(decode_step_string("plain"), "plain");
    }

    #[test]
    fn test_parse_entity() {
        let (id, type_name, attrs) =
            parse_entity("#123=IFCWALL('2O2Fr$t4X7Zf8NOew3FLOH',#5,'Wall',$,$,$,$,$);").unwrap();
        assert_eq!(id, 123);
        assert_eq!(type_name, "IFCWALL");
        assert_eq!(attrs.len(), 8);
        assert_eq!(attrs[1], Token::EntityRef(5));
        assert_eq!(attrs[2].as_text().as_deref(), Some("Wall"));
    }

    #[test]
    fn test_parse_entity_with_typed_value_and_lists() {
        let (_, type_name, attrs) = parse_entity(
            "#9 = IFCPROPERTYSINGLEVALUE('IsExternal',$,IFCBOOLEAN(.T.),$);",
        )
        .unwrap();
        assert_eq!(type_name, "IFCPROPERTYSINGLEVALUE");
        assert_eq!(attrs[2].display_value().as_deref(), Some("true"));

        let (_, _, attrs) = parse_entity("#10=IFCRELAGGREGATES('g',$,$,$,#1,(#2,#3));").unwrap();
        assert_eq!(attrs[5].ref_list(), vec![2, 3]);
    }

    #[test]
    fn test_parse_entity_rejects_garbage() {
        assert!(parse_entity("#1=IFCWALL('unterminated);").is_err());
        assert!(parse_entity("#1=IFCWALL($,$)").is_err());
        assert!(parse_entity("not an entity").is_err());
    }
}
