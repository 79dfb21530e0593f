//! Ordered JSON record reader.
//!
//! Catalog and instance files are JSON objects whose top-level keys repeat
//! (`"sensor": {..}, "sensor": {..}`).  Such an object is an ordered list
//! of records, not a map, so it is read through a visitor that keeps every
//! `(key, value)` pair in file order.  Nested values are plain
//! [`serde_json::Value`]s and are converted record by record.
//!
//! Hand-edited loop files are not always strict JSON, so the text first
//! goes through [`relax`]:
//!
//! ```text
//!   'single quoted'        ->  "single quoted"
//!   // line, /* block */   ->  (dropped)
//!   [1, 2, ]   { .., }     ->  trailing comma dropped
//!   'a;'  'b;'             ->  missing comma inserted between values
//!   raw tab / newline      ->  escaped inside strings
//! ```

use core::fmt;

use serde::Deserialize;
use serde::de::{DeserializeOwned, MapAccess, Visitor};
use serde_json::Value;

use crate::error::CatalogError;

/// Top-level object with duplicate keys preserved in order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderedObject(pub Vec<(String, Value)>);

impl OrderedObject {
    pub fn parse(text: &str) -> Result<Self, CatalogError> {
        serde_json::from_str(&relax(text)).map_err(|e| CatalogError::Parse(e.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<'de> Deserialize<'de> for OrderedObject {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct RecordsVisitor;

        impl<'de> Visitor<'de> for RecordsVisitor {
            type Value = OrderedObject;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a JSON object of records")
            }

            fn visit_map<A>(self, mut map: A) -> Result<OrderedObject, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut records = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((key, value)) = map.next_entry::<String, Value>()? {
                    records.push((key, value));
                }
                Ok(OrderedObject(records))
            }
        }

        deserializer.deserialize_map(RecordsVisitor)
    }
}

// ───────────────────────────────────────────────────────────────
// Relaxed syntax
// ───────────────────────────────────────────────────────────────

/// Rewrite relaxed JSON into strict JSON. Line breaks outside strings are
/// kept so parse errors still point at the right line. Malformed input is
/// passed through for `serde_json` to reject.
pub fn relax(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + text.len() / 16);
    let mut chars = text.chars().peekable();
    // Previous token ended a value (or a key).
    let mut after_value = false;
    // Position of a comma that a closing bracket would make trailing.
    let mut comma_at: Option<usize> = None;

    while let Some(c) = chars.next() {
        match c {
            c if c.is_whitespace() => out.push(c),
            '/' if chars.peek() == Some(&'/') => {
                while chars.peek().is_some_and(|c| *c != '\n') {
                    chars.next();
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for c in chars.by_ref() {
                    if c == '\n' {
                        out.push('\n');
                    }
                    if prev == '*' && c == '/' {
                        break;
                    }
                    prev = c;
                }
            }
            ',' => {
                comma_at = after_value.then_some(out.len());
                out.push(',');
                after_value = false;
            }
            '}' | ']' => {
                if let Some(i) = comma_at.take() {
                    out.replace_range(i..=i, " ");
                }
                out.push(c);
                after_value = true;
            }
            ':' => {
                comma_at = None;
                out.push(':');
                after_value = false;
            }
            _ => {
                comma_at = None;
                if after_value {
                    out.push(',');
                }
                match c {
                    '{' | '[' => {
                        out.push(c);
                        after_value = false;
                        continue;
                    }
                    '"' | '\'' => string(c, &mut chars, &mut out),
                    _ => {
                        out.push(c);
                        while let Some(&n) = chars.peek() {
                            if n.is_whitespace() || "{}[],:\"'/".contains(n) {
                                break;
                            }
                            out.push(n);
                            chars.next();
                        }
                    }
                }
                after_value = true;
            }
        }
    }
    out
}

/// Copy one string literal opened by `quote` as a double-quoted JSON string.
fn string(quote: char, chars: &mut core::iter::Peekable<core::str::Chars<'_>>, out: &mut String) {
    out.push('"');
    while let Some(c) = chars.next() {
        match c {
            c if c == quote => break,
            '\\' => match chars.next() {
                Some('\'') => out.push('\''),
                Some(e @ ('"' | '\\' | '/' | 'b' | 'f' | 'n' | 'r' | 't' | 'u')) => {
                    out.push('\\');
                    out.push(e);
                }
                // Escapes JSON lacks reach the script lexer unchanged.
                Some(e) => {
                    out.push_str("\\\\");
                    out.push(e);
                }
                None => out.push_str("\\\\"),
            },
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => out.push_str(&format!("\\u{:04x}", u32::from(c))),
            c => out.push(c),
        }
    }
    out.push('"');
}

/// Convert one record, tagging the error with the record key and position.
pub fn record<T: DeserializeOwned>(key: &str, position: usize, value: &Value) -> Result<T, CatalogError> {
    T::deserialize(value).map_err(|e| CatalogError::Parse(format!("{key} record #{position}: {e}")))
}

/// A field that may be written as a single number or a list of numbers.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum OneOrMany {
    One(u32),
    Many(Vec<u32>),
}

impl OneOrMany {
    pub fn into_vec(self) -> Vec<u32> {
        match self {
            Self::One(v) => vec![v],
            Self::Many(v) => v,
        }
    }
}

impl Default for OneOrMany {
    fn default() -> Self {
        Self::Many(Vec::new())
    }
}

/// Script source written either as an array of lines or as one string.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum ScriptLines {
    Lines(Vec<String>),
    Text(String),
}

impl ScriptLines {
    pub fn source(&self) -> String {
        match self {
            Self::Lines(lines) => lines.join("\n"),
            Self::Text(text) => text.clone(),
        }
    }
}
