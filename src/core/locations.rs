//! Locations file format
//!
//! One work item per line, written as a tuple literal of `(lon, lat)` pairs:
//!
//! ```text
//! ((4.351721, 50.850346), (4.402464, 51.219448))
//! (4.351721, 50.850346)
//! ```
//!
//! The reader also accepts `[]` brackets and trailing commas so files written
//! by other tools load unchanged.

use std::io::{BufRead, Write};

use crate::core::error::{Error, Result};
use crate::core::geo::Coordinate;
use crate::core::sampler::LocationPair;

/// Format a float the way the literal format expects (`1.0`, never `1`)
pub(crate) fn format_number(value: f64) -> String {
    let s = format!("{value}");
    if s.contains('.') || s.contains("inf") || s.contains("NaN") {
        s
    } else {
        format!("{s}.0")
    }
}

pub fn format_coordinate(c: Coordinate) -> String {
    format!("({}, {})", format_number(c.lon), format_number(c.lat))
}

pub fn format_pair(pair: &LocationPair) -> String {
    format!(
        "({}, {})",
        format_coordinate(pair.origin),
        format_coordinate(pair.destination)
    )
}

/// Write one pair per line
pub fn write_pairs<W: Write>(writer: &mut W, pairs: &[LocationPair]) -> Result<()> {
    for pair in pairs {
        writeln!(writer, "{}", format_pair(pair))?;
    }
    Ok(())
}

/// Write one coordinate per line (matrix layout)
pub fn write_coordinates<W: Write>(writer: &mut W, coords: &[Coordinate]) -> Result<()> {
    for c in coords {
        writeln!(writer, "{}", format_coordinate(*c))?;
    }
    Ok(())
}

/// Parsed literal value
#[derive(Debug, PartialEq)]
enum Literal {
    Number(f64),
    Seq(Vec<Literal>),
}

struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input: input.as_bytes(),
            pos: 0,
        }
    }

    fn skip_whitespace(&mut self) {
        while self.pos < self.input.len() && self.input[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> Option<u8> {
        self.skip_whitespace();
        self.input.get(self.pos).copied()
    }

    fn parse_value(&mut self) -> std::result::Result<Literal, String> {
        match self.peek() {
            Some(b'(') => self.parse_seq(b')'),
            Some(b'[') => self.parse_seq(b']'),
            Some(_) => self.parse_number(),
            None => Err("unexpected end of line".to_string()),
        }
    }

    fn parse_seq(&mut self, close: u8) -> std::result::Result<Literal, String> {
        self.pos += 1; // opening bracket
        let mut items = Vec::new();

        loop {
            match self.peek() {
                Some(c) if c == close => {
                    self.pos += 1;
                    return Ok(Literal::Seq(items));
                }
                Some(_) => {
                    items.push(self.parse_value()?);
                    match self.peek() {
                        Some(b',') => self.pos += 1,
                        Some(c) if c == close => {}
                        Some(c) => {
                            return Err(format!(
                                "expected ',' or '{}' at column {}, found '{}'",
                                close as char,
                                self.pos + 1,
                                c as char
                            ))
                        }
                        None => return Err(format!("missing closing '{}'", close as char)),
                    }
                }
                None => return Err(format!("missing closing '{}'", close as char)),
            }
        }
    }

    fn parse_number(&mut self) -> std::result::Result<Literal, String> {
        let start = self.pos;
        while self.pos < self.input.len() {
            match self.input[self.pos] {
                b'0'..=b'9' | b'-' | b'+' | b'.' | b'e' | b'E' => self.pos += 1,
                _ => break,
            }
        }

        let token = std::str::from_utf8(&self.input[start..self.pos]).unwrap_or_default();
        if token.is_empty() {
            return Err(format!("unexpected character at column {}", start + 1));
        }
        token
            .parse::<f64>()
            .map(Literal::Number)
            .map_err(|_| format!("{token:?} is not a number"))
    }
}

fn literal_to_coordinate(lit: &Literal) -> Option<Coordinate> {
    match lit {
        Literal::Seq(items) => match items.as_slice() {
            [Literal::Number(lon), Literal::Number(lat)] => Some(Coordinate::new(*lon, *lat)),
            _ => None,
        },
        Literal::Number(_) => None,
    }
}

/// Parse one line into its coordinates
///
/// A single `(lon, lat)` pair yields one coordinate; a sequence of pairs
/// yields them in order.
pub fn parse_line(line: &str) -> std::result::Result<Vec<Coordinate>, String> {
    let mut parser = Parser::new(line);
    let value = parser.parse_value()?;
    if parser.peek().is_some() {
        return Err(format!("trailing characters at column {}", parser.pos + 1));
    }

    if let Some(c) = literal_to_coordinate(&value) {
        return Ok(vec![c]);
    }

    match value {
        Literal::Seq(items) => items
            .iter()
            .map(|item| {
                literal_to_coordinate(item)
                    .ok_or_else(|| "expected a sequence of (lon, lat) pairs".to_string())
            })
            .collect(),
        Literal::Number(_) => Err("expected a (lon, lat) pair or a sequence of pairs".to_string()),
    }
}

/// Read every non-blank line of a locations file
pub fn read_locations<R: BufRead>(reader: R) -> Result<Vec<Vec<Coordinate>>> {
    let mut items = Vec::new();

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let coords = parse_line(&line).map_err(|message| Error::Parse {
            line: idx + 1,
            message,
        })?;
        items.push(coords);
    }

    Ok(items)
}

/// Read a route-action file: every line must hold exactly two coordinates
pub fn read_pairs<R: BufRead>(reader: R) -> Result<Vec<LocationPair>> {
    let mut pairs = Vec::new();

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let coords = parse_line(&line).map_err(|message| Error::Parse {
            line: idx + 1,
            message,
        })?;
        match coords.as_slice() {
            [origin, destination] => pairs.push(LocationPair::new(*origin, *destination)),
            other => {
                return Err(Error::Parse {
                    line: idx + 1,
                    message: format!("expected 2 locations for a route, found {}", other.len()),
                })
            }
        }
    }

    Ok(pairs)
}
