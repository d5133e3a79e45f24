//! Dot-path traversal over JSON values.
//!
//! Grammar: `field`, `field.field`, `field[index]`, and chains of those such
//! as `texture_urls[0].base_color`. A path may start with an index (`[0].url`).
//! The empty path addresses the value itself.

use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use crate::error::ResolveError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
  Field(String),
  Index(usize),
}

/// A parsed path into a JSON document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonPath {
  raw: String,
  segments: Vec<Segment>,
}

impl JsonPath {
  pub fn parse(path: &str) -> Result<Self, ResolveError> {
    let invalid = |reason: &str| ResolveError::InvalidPath {
      path: path.to_string(),
      reason: reason.to_string(),
    };

    let mut segments = Vec::new();
    let mut field = String::new();
    // Whether the current dot-separated part has produced a segment yet.
    let mut part_has_content = false;
    let mut chars = path.chars();

    if path.is_empty() {
      return Ok(Self {
        raw: String::new(),
        segments,
      });
    }

    while let Some(c) = chars.next() {
      match c {
        '.' => {
          if !field.is_empty() {
            segments.push(Segment::Field(std::mem::take(&mut field)));
            part_has_content = true;
          }
          if !part_has_content {
            return Err(invalid("empty segment"));
          }
          part_has_content = false;
        }
        '[' => {
          if field.is_empty() && !segments.is_empty() && !part_has_content {
            return Err(invalid("expected a field name after '.'"));
          }
          if !field.is_empty() {
            segments.push(Segment::Field(std::mem::take(&mut field)));
          }
          let mut digits = String::new();
          loop {
            match chars.next() {
              Some(']') => break,
              Some(d) if d.is_ascii_digit() => digits.push(d),
              Some(_) => return Err(invalid("index must be a non-negative integer")),
              None => return Err(invalid("unterminated index")),
            }
          }
          let index = digits
            .parse::<usize>()
            .map_err(|_| invalid("empty index"))?;
          segments.push(Segment::Index(index));
          part_has_content = true;
        }
        ']' => return Err(invalid("unexpected ']'")),
        _ => {
          if field.is_empty() && part_has_content {
            return Err(invalid("expected '.' or '[' after index"));
          }
          field.push(c);
        }
      }
    }

    if !field.is_empty() {
      segments.push(Segment::Field(field));
    } else if !part_has_content {
      return Err(invalid("empty segment"));
    }

    Ok(Self {
      raw: path.to_string(),
      segments,
    })
  }

  pub fn segments(&self) -> &[Segment] {
    &self.segments
  }

  /// Follow the path. Returns `None` at the first missing link or type mismatch.
  pub fn lookup<'v>(&self, value: &'v Value) -> Option<&'v Value> {
    let mut current = value;
    for segment in &self.segments {
      current = match (segment, current) {
        (Segment::Field(name), Value::Object(map)) => map.get(name)?,
        (Segment::Field(name), Value::Array(items)) => items.get(name.parse::<usize>().ok()?)?,
        (Segment::Index(index), Value::Array(items)) => items.get(*index)?,
        _ => return None,
      };
    }
    Some(current)
  }
}

impl FromStr for JsonPath {
  type Err = ResolveError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Self::parse(s)
  }
}

impl fmt::Display for JsonPath {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.raw)
  }
}

/// Parse `path` and follow it through `value`.
pub fn extract<'v>(value: &'v Value, path: &str) -> Result<Option<&'v Value>, ResolveError> {
  Ok(JsonPath::parse(path)?.lookup(value))
}
