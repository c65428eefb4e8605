//! LDAP-style requirement filters (RFC 1960), as used by OSGi requirements.
//!
//! Supported syntax: `(&...)`, `(|...)`, `(!...)`, `(attr=value)`,
//! `(attr>=value)`, `(attr<=value)`, `(attr~=value)`, presence `(attr=*)`
//! and substring wildcards `(attr=org.*.api)`. A backslash escapes the next
//! character inside values.

use std::cmp::Ordering;
use std::fmt;

use bundlewire_util::errors::WiringError;

use crate::model::{AttrValue, Attributes};
use crate::version::Version;

/// A parsed filter expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Equal { attr: String, value: String },
    Approx { attr: String, value: String },
    GreaterEq { attr: String, value: String },
    LessEq { attr: String, value: String },
    Present { attr: String },
    /// `parts` are the literal pieces between `*` wildcards; the first and
    /// last piece are anchored and may be empty.
    Substring { attr: String, parts: Vec<String> },
}

impl Filter {
    pub fn parse(text: &str) -> Result<Self, WiringError> {
        let mut parser = Parser {
            text,
            chars: text.chars().collect(),
            pos: 0,
        };
        parser.skip_ws();
        let filter = parser.parse_filter()?;
        parser.skip_ws();
        if parser.pos != parser.chars.len() {
            return Err(parser.error("unexpected trailing characters"));
        }
        Ok(filter)
    }

    /// Evaluate the filter against a capability's attributes.
    pub fn matches(&self, attrs: &Attributes) -> bool {
        match self {
            Filter::And(items) => items.iter().all(|f| f.matches(attrs)),
            Filter::Or(items) => items.iter().any(|f| f.matches(attrs)),
            Filter::Not(inner) => !inner.matches(attrs),
            Filter::Present { attr } => lookup(attrs, attr).is_some(),
            Filter::Equal { attr, value } => lookup(attrs, attr)
                .is_some_and(|v| compare(v, value, |o| o == Ordering::Equal)),
            Filter::GreaterEq { attr, value } => lookup(attrs, attr)
                .is_some_and(|v| compare(v, value, |o| o != Ordering::Less)),
            Filter::LessEq { attr, value } => lookup(attrs, attr)
                .is_some_and(|v| compare(v, value, |o| o != Ordering::Greater)),
            Filter::Approx { attr, value } => {
                let wanted = normalize_approx(value);
                lookup(attrs, attr).is_some_and(|v| match v {
                    AttrValue::List(items) => items.iter().any(|s| normalize_approx(s) == wanted),
                    other => normalize_approx(&other.to_string()) == wanted,
                })
            }
            Filter::Substring { attr, parts } => lookup(attrs, attr).is_some_and(|v| match v {
                AttrValue::List(items) => items.iter().any(|s| wildcard_match(s, parts)),
                other => wildcard_match(&other.to_string(), parts),
            }),
        }
    }

    /// The value this filter requires for `attr` through a top-level
    /// equality, looking inside a top-level `&`.
    pub fn equality_value(&self, attr: &str) -> Option<&str> {
        match self {
            Filter::Equal { attr: a, value } if a == attr => Some(value),
            Filter::And(items) => items.iter().find_map(|f| f.equality_value(attr)),
            _ => None,
        }
    }
}

fn lookup<'a>(attrs: &'a Attributes, attr: &str) -> Option<&'a AttrValue> {
    attrs.get(attr).or_else(|| {
        attrs
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(attr))
            .map(|(_, v)| v)
    })
}

fn compare(actual: &AttrValue, wanted: &str, accept: impl Fn(Ordering) -> bool) -> bool {
    match actual {
        AttrValue::String(s) => accept(s.as_str().cmp(wanted)),
        AttrValue::Long(n) => wanted
            .trim()
            .parse::<i64>()
            .is_ok_and(|w| accept(n.cmp(&w))),
        AttrValue::Version(v) => Version::parse(wanted).is_ok_and(|w| accept(v.cmp(&w))),
        AttrValue::List(items) => items.iter().any(|s| accept(s.as_str().cmp(wanted))),
    }
}

fn normalize_approx(s: &str) -> String {
    s.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

fn wildcard_match(value: &str, parts: &[String]) -> bool {
    let (first, rest) = match parts.split_first() {
        Some(split) => split,
        None => return true,
    };
    let Some(mut remaining) = value.strip_prefix(first.as_str()) else {
        return false;
    };
    let (last, middle) = match rest.split_last() {
        Some(split) => split,
        None => return remaining.is_empty(),
    };
    for part in middle {
        match remaining.find(part.as_str()) {
            Some(idx) => remaining = &remaining[idx + part.len()..],
            None => return false,
        }
    }
    remaining.len() >= last.len() && remaining.ends_with(last.as_str())
}

struct Parser<'a> {
    text: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl Parser<'_> {
    fn error(&self, message: &str) -> WiringError {
        WiringError::Filter {
            filter: self.text.to_string(),
            message: format!("{message} at position {}", self.pos),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, c: char) -> Result<(), WiringError> {
        if self.peek() == Some(c) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(&format!("expected `{c}`")))
        }
    }

    fn parse_filter(&mut self) -> Result<Filter, WiringError> {
        self.expect('(')?;
        self.skip_ws();
        let filter = match self.peek() {
            Some('&') => {
                self.pos += 1;
                Filter::And(self.parse_list()?)
            }
            Some('|') => {
                self.pos += 1;
                Filter::Or(self.parse_list()?)
            }
            Some('!') => {
                self.pos += 1;
                self.skip_ws();
                Filter::Not(Box::new(self.parse_filter()?))
            }
            Some(_) => self.parse_item()?,
            None => return Err(self.error("unexpected end of filter")),
        };
        self.skip_ws();
        self.expect(')')?;
        Ok(filter)
    }

    fn parse_list(&mut self) -> Result<Vec<Filter>, WiringError> {
        let mut items = Vec::new();
        self.skip_ws();
        while self.peek() == Some('(') {
            items.push(self.parse_filter()?);
            self.skip_ws();
        }
        if items.is_empty() {
            return Err(self.error("empty filter list"));
        }
        Ok(items)
    }

    fn parse_item(&mut self) -> Result<Filter, WiringError> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if matches!(c, '=' | '<' | '>' | '~' | '(' | ')') {
                break;
            }
            self.pos += 1;
        }
        let attr: String = self.chars[start..self.pos].iter().collect();
        let attr = attr.trim().to_string();
        if attr.is_empty() {
            return Err(self.error("missing attribute name"));
        }

        let op = match self.peek() {
            Some('=') => {
                self.pos += 1;
                '='
            }
            Some(c @ ('<' | '>' | '~')) => {
                self.pos += 1;
                self.expect('=')?;
                c
            }
            _ => return Err(self.error("expected comparison operator")),
        };

        let parts = self.parse_value()?;
        match op {
            '=' if parts.len() == 2 && parts.iter().all(String::is_empty) => {
                Ok(Filter::Present { attr })
            }
            '=' if parts.len() > 1 => Ok(Filter::Substring { attr, parts }),
            _ => {
                if parts.len() > 1 {
                    return Err(self.error("wildcards are only allowed with `=`"));
                }
                let value = parts.into_iter().next().unwrap_or_default();
                Ok(match op {
                    '=' => Filter::Equal { attr, value },
                    '>' => Filter::GreaterEq { attr, value },
                    '<' => Filter::LessEq { attr, value },
                    _ => Filter::Approx { attr, value },
                })
            }
        }
    }

    /// Reads a value up to the closing `)`, split on unescaped `*`.
    fn parse_value(&mut self) -> Result<Vec<String>, WiringError> {
        let mut parts = vec![String::new()];
        loop {
            match self.peek() {
                None => return Err(self.error("unterminated value")),
                Some(')') => break,
                Some('(') => return Err(self.error("unescaped `(` in value")),
                Some('\\') => {
                    self.pos += 1;
                    let escaped = self
                        .peek()
                        .ok_or_else(|| self.error("dangling escape"))?;
                    self.pos += 1;
                    if let Some(last) = parts.last_mut() {
                        last.push(escaped);
                    }
                }
                Some('*') => {
                    self.pos += 1;
                    parts.push(String::new());
                }
                Some(c) => {
                    self.pos += 1;
                    if let Some(last) = parts.last_mut() {
                        last.push(c);
                    }
                }
            }
        }
        Ok(parts)
    }
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '(' | ')' | '*' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::And(items) | Filter::Or(items) => {
                f.write_str(if matches!(self, Filter::And(_)) { "(&" } else { "(|" })?;
                for item in items {
                    write!(f, "{item}")?;
                }
                f.write_str(")")
            }
            Filter::Not(inner) => write!(f, "(!{inner})"),
            Filter::Equal { attr, value } => write!(f, "({attr}={})", escape(value)),
            Filter::Approx { attr, value } => write!(f, "({attr}~={})", escape(value)),
            Filter::GreaterEq { attr, value } => write!(f, "({attr}>={})", escape(value)),
            Filter::LessEq { attr, value } => write!(f, "({attr}<={})", escape(value)),
            Filter::Present { attr } => write!(f, "({attr}=*)"),
            Filter::Substring { attr, parts } => {
                let joined: Vec<String> = parts.iter().map(|p| escape(p)).collect();
                write!(f, "({attr}={})", joined.join("*"))
            }
        }
    }
}
