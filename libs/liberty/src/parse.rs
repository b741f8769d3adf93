//! A liberty reader.
//!
//! Parses the subset of liberty needed to round-trip this crate's writer
//! output and to load third-party libraries for comparison: groups, simple
//! and complex attributes, quoted strings, and backslash-continued `values`
//! blocks. Everything parses into plain [`Group`]s; lookup tables appear as
//! groups whose `index_1`/`values` attributes hold quoted numeric lists,
//! which [`Value::numbers`] extracts.

use arcstr::ArcStr;
use nom::branch::alt;
use nom::bytes::complete::{is_not, take_while1};
use nom::character::complete::char;
use nom::combinator::{map, opt};
use nom::multi::{many0, separated_list0};
use nom::sequence::{delimited, preceded};
use nom::IResult;

use crate::{Error, Group, Result, Value};

/// Parses a complete liberty source into its top-level group.
pub fn parse_library(input: &str) -> Result<Group> {
    let (rest, stmt) = preceded(ws, statement)(input)
        .map_err(|e| Error::Parse(e.to_string()))?;
    let (rest, _) = ws(rest).map_err(|e: nom::Err<nom::error::Error<&str>>| {
        Error::Parse(e.to_string())
    })?;
    if !rest.is_empty() {
        return Err(Error::Parse(format!(
            "trailing input after top-level group: {:.40}...",
            rest
        )));
    }
    match stmt {
        Statement::Group(group) => Ok(group),
        Statement::Attribute(name, _) => Err(Error::Parse(format!(
            "expected a top-level group, found attribute `{name}`"
        ))),
    }
}

enum Statement {
    Attribute(ArcStr, Value),
    Group(Group),
}

/// Whitespace, block and line comments, and backslash line continuations.
fn ws(input: &str) -> IResult<&str, ()> {
    let mut rest = input;
    loop {
        let trimmed = rest.trim_start();
        if let Some(after) = trimmed.strip_prefix("/*") {
            match after.find("*/") {
                Some(end) => rest = &after[end + 2..],
                None => {
                    return Err(nom::Err::Failure(nom::error::Error::new(
                        rest,
                        nom::error::ErrorKind::TakeUntil,
                    )))
                }
            }
        } else if let Some(after) = trimmed.strip_prefix("//") {
            rest = after.split_once('\n').map_or("", |(_, r)| r);
        } else if let Some(after) = trimmed.strip_prefix('\\') {
            rest = after;
        } else {
            return Ok((trimmed, ()));
        }
    }
}

fn identifier(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_alphanumeric() || c == '_')(input)
}

fn quoted(input: &str) -> IResult<&str, Value> {
    map(
        delimited(char('"'), opt(is_not("\"")), char('"')),
        |s: Option<&str>| {
            // Strip continuation backslashes inside multi-line strings.
            let s = s.unwrap_or("");
            if s.contains('\\') {
                Value::Str(ArcStr::from(s.replace('\\', " ")))
            } else {
                Value::Str(ArcStr::from(s))
            }
        },
    )(input)
}

fn bare(input: &str) -> IResult<&str, Value> {
    map(is_not(" \t\r\n,;(){}\"\\"), classify)(input)
}

fn classify(token: &str) -> Value {
    if let Ok(i) = token.parse::<i64>() {
        Value::Int(i)
    } else if let Ok(f) = token.parse::<f64>() {
        Value::Float(f)
    } else if token == "true" {
        Value::Bool(true)
    } else if token == "false" {
        Value::Bool(false)
    } else {
        Value::Str(ArcStr::from(token))
    }
}

fn argument(input: &str) -> IResult<&str, Value> {
    preceded(ws, alt((quoted, bare)))(input)
}

fn arguments(input: &str) -> IResult<&str, Vec<Value>> {
    separated_list0(preceded(ws, char(',')), argument)(input)
}

fn statement(input: &str) -> IResult<&str, Statement> {
    let (input, name) = preceded(ws, identifier)(input)?;
    let (input, _) = ws(input)?;
    if let Ok((input, _)) = char::<_, nom::error::Error<&str>>(':')(input) {
        let (input, value) = argument(input)?;
        let (input, _) = preceded(ws, char(';'))(input)?;
        return Ok((input, Statement::Attribute(ArcStr::from(name), value)));
    }
    let (input, args) = delimited(
        char('('),
        arguments,
        preceded(ws, char(')')),
    )(input)?;
    let (input, _) = ws(input)?;
    if let Ok((input, _)) = char::<_, nom::error::Error<&str>>(';')(input) {
        return Ok((
            input,
            Statement::Attribute(ArcStr::from(name), Value::List(args)),
        ));
    }
    let (input, body) = delimited(
        char('{'),
        many0(preceded(ws, statement)),
        preceded(ws, char('}')),
    )(input)?;
    let group = build_group(name, args, body);
    Ok((input, Statement::Group(group)))
}

fn build_group(name: &str, args: Vec<Value>, body: Vec<Statement>) -> Group {
    let identifier = args.first().and_then(|v| match v {
        Value::Str(s) => Some(s.clone()),
        _ => None,
    });
    let mut group = match (Group::new(name), identifier) {
        (Ok(g), None) => g,
        (Ok(_), Some(id)) => Group::with_identifier(name, id.as_str())
            .unwrap_or_else(|_| Group::new(name).unwrap()),
        (Err(_), _) => unreachable!("identifier charset is a subset of \\w"),
    };
    for (i, stmt) in body.into_iter().enumerate() {
        match stmt {
            Statement::Attribute(name, value) => group.add_attribute(name, value),
            Statement::Group(child) => {
                // Anonymous children (several `timing ()` under one pin)
                // must stay distinct, so tag them with their ordinal.
                let child = if child.identifier().is_none() {
                    child.with_tag(arcstr::format!("parsed_{i}"))
                } else {
                    child
                };
                group.add_group(child);
            }
        }
    }
    group
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = r#"
library (demo) {
  /* header */
  technology (cmos);
  delay_model : table_lookup;
  time_unit : "1ns";
  cell (INV) {
    area : 1.2;
    pin (Y) {
      direction : output;
      function : "!A";
      timing () {
        related_pin : A;
        cell_rise (delay_template) {
          index_1 ("0.1, 0.5");
          values ( \
            "0.11, 0.25" \
          );
        }
      }
    }
  }
}
"#;

    #[test]
    fn parses_nested_groups_and_attributes() {
        let lib = parse_library(SOURCE).unwrap();
        assert_eq!(lib.name(), "library");
        assert_eq!(lib.identifier().map(|s| s.as_str()), Some("demo"));
        assert_eq!(lib.attribute("time_unit").unwrap().as_str(), Some("1ns"));
        let cell = lib.sub_group("cell", Some("INV")).unwrap();
        let pin = cell.sub_group("pin", Some("Y")).unwrap();
        assert_eq!(pin.attribute("function").unwrap().as_str(), Some("!A"));
        let timing = pin.sub_groups().find(|g| g.name() == "timing").unwrap();
        let lut = timing.sub_group("cell_rise", Some("delay_template")).unwrap();
        assert_eq!(lut.attribute("index_1").unwrap().numbers(), vec![0.1, 0.5]);
        assert_eq!(lut.attribute("values").unwrap().numbers(), vec![0.11, 0.25]);
    }

    #[test]
    fn anonymous_children_stay_distinct() {
        let lib = parse_library(
            "library (l) { cell (c) { pin (p) { timing () { related_pin : A; } timing () { related_pin : B; } } } }",
        )
        .unwrap();
        let pin = lib
            .sub_group("cell", Some("c"))
            .unwrap()
            .sub_group("pin", Some("p"))
            .unwrap();
        assert_eq!(pin.sub_groups().count(), 2);
    }

    #[test]
    fn trailing_garbage_is_an_error() {
        assert!(parse_library("library (l) { } extra").is_err());
    }
}
