//! Attribute schema model: the typed description of every column of an ARFF
//! document.
//!
//! A [`DocumentSchema`] is produced once by the parser and then shared
//! read-only (behind an `Arc`) by every downstream stage of a conversion.

use crate::error::{ArffError, ArffResult};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use std::collections::HashMap;
use std::fmt::Write as _;

/// Default ARFF date pattern (ISO-8601 without zone).
pub const DEFAULT_DATE_PATTERN: &str = "yyyy-MM-dd'T'HH:mm:ss";

/// Ordered set of labels a nominal attribute may take.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Domain {
    labels: Vec<String>,
    lookup: HashMap<String, usize>,
}

impl Domain {
    /// Build a domain from labels in declaration order.
    ///
    /// Returns the first repeated label as the error value.
    pub fn new<I, S>(labels: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut out = Self {
            labels: Vec::new(),
            lookup: HashMap::new(),
        };
        for label in labels {
            let label = label.into();
            if out.lookup.contains_key(&label) {
                return Err(label);
            }
            out.lookup.insert(label.clone(), out.labels.len());
            out.labels.push(label);
        }
        Ok(out)
    }

    #[must_use]
    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.lookup.get(label).copied()
    }

    #[must_use]
    pub fn label(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    #[must_use]
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// An ARFF date pattern together with its chrono translation.
///
/// ARFF declares date formats with Java `SimpleDateFormat` letters
/// (`yyyy-MM-dd HH:mm:ss`). The pattern is translated once, at header parse
/// time, into a chrono format string used for both parsing and rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateFormat {
    pattern: String,
    chrono: String,
    has_date: bool,
    has_time: bool,
    has_zone: bool,
}

impl Default for DateFormat {
    fn default() -> Self {
        // The default pattern only uses supported letters.
        Self::new(DEFAULT_DATE_PATTERN).unwrap_or_else(|_| Self {
            pattern: DEFAULT_DATE_PATTERN.to_string(),
            chrono: "%Y-%m-%dT%H:%M:%S".to_string(),
            has_date: true,
            has_time: true,
            has_zone: false,
        })
    }
}

impl DateFormat {
    /// Translate a `SimpleDateFormat` pattern.
    ///
    /// Returns the offending pattern letter when it has no chrono equivalent.
    pub fn new(pattern: &str) -> Result<Self, char> {
        let chars: Vec<char> = pattern.chars().collect();
        let mut out = String::with_capacity(pattern.len() * 2);
        let (mut has_date, mut has_time, mut has_zone) = (false, false, false);
        let mut i = 0;
        while i < chars.len() {
            let c = chars[i];
            if c == '\'' {
                // '' is a literal quote; 'text' is literal text
                if chars.get(i + 1) == Some(&'\'') {
                    out.push('\'');
                    i += 2;
                    continue;
                }
                i += 1;
                while i < chars.len() {
                    if chars[i] == '\'' {
                        if chars.get(i + 1) == Some(&'\'') {
                            out.push('\'');
                            i += 2;
                            continue;
                        }
                        break;
                    }
                    push_literal(&mut out, chars[i]);
                    i += 1;
                }
                i += 1;
                continue;
            }
            if !c.is_ascii_alphabetic() {
                push_literal(&mut out, c);
                i += 1;
                continue;
            }
            let mut run = 1;
            while chars.get(i + run) == Some(&c) {
                run += 1;
            }
            let spec = match (c, run) {
                ('y', 2) => "%y",
                ('y', _) => "%Y",
                ('M', 1) => "%-m",
                ('M', 2) => "%m",
                ('M', 3) => "%b",
                ('M', _) => "%B",
                ('d', 1) => "%-d",
                ('d', _) => "%d",
                ('D', _) => "%j",
                ('E', 1..=3) => "%a",
                ('E', _) => "%A",
                ('H', 1) => "%-H",
                ('H', _) => "%H",
                ('h', 1) => "%-I",
                ('h', _) => "%I",
                ('m', _) => "%M",
                ('s', _) => "%S",
                ('S', _) => "%3f",
                ('a', _) => "%p",
                ('Z', _) => "%z",
                ('X', _) => "%:z",
                _ => return Err(c),
            };
            match c {
                'y' | 'M' | 'd' | 'D' | 'E' => has_date = true,
                'H' | 'h' | 'm' | 's' | 'S' | 'a' => has_time = true,
                _ => has_zone = true,
            }
            out.push_str(spec);
            i += run;
        }
        Ok(Self {
            pattern: pattern.to_string(),
            chrono: out,
            has_date,
            has_time,
            has_zone,
        })
    }

    /// The pattern as declared in the ARFF header.
    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// The translated chrono format string.
    #[must_use]
    pub fn chrono_format(&self) -> &str {
        &self.chrono
    }

    /// Parse a token; zoned patterns are normalized to UTC.
    #[must_use]
    pub fn parse(&self, token: &str) -> Option<NaiveDateTime> {
        if self.has_zone {
            return chrono::DateTime::parse_from_str(token, &self.chrono)
                .ok()
                .map(|dt| dt.naive_utc());
        }
        match (self.has_date, self.has_time) {
            (_, true) if self.has_date => NaiveDateTime::parse_from_str(token, &self.chrono).ok(),
            (false, true) => NaiveTime::parse_from_str(token, &self.chrono)
                .ok()
                .and_then(|t| NaiveDate::from_ymd_opt(1970, 1, 1).map(|d| d.and_time(t))),
            _ => NaiveDate::parse_from_str(token, &self.chrono)
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0)),
        }
    }

    /// Render a timestamp back into the declared pattern.
    #[must_use]
    pub fn format(&self, value: &NaiveDateTime) -> String {
        let mut s = String::new();
        // DateTime<Utc> carries an offset, so zone specifiers always render.
        if write!(s, "{}", value.and_utc().format(&self.chrono)).is_err() {
            s = value.format("%Y-%m-%dT%H:%M:%S").to_string();
        }
        s
    }
}

fn push_literal(out: &mut String, c: char) {
    if c == '%' {
        out.push_str("%%");
    } else {
        out.push(c);
    }
}

/// Declared kind of an attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeKind {
    /// `numeric` or `real`.
    Numeric,
    Integer,
    String,
    Nominal(Domain),
    Date(DateFormat),
}

impl AttributeKind {
    /// Lower-case kind name (`numeric`, `integer`, `string`, `nominal`, `date`).
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            AttributeKind::Numeric => "numeric",
            AttributeKind::Integer => "integer",
            AttributeKind::String => "string",
            AttributeKind::Nominal(_) => "nominal",
            AttributeKind::Date(_) => "date",
        }
    }

    #[must_use]
    pub fn is_numeric(&self) -> bool {
        matches!(self, AttributeKind::Numeric | AttributeKind::Integer)
    }
}

/// One column of the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeSchema {
    pub name: String,
    pub kind: AttributeKind,
    /// Position in the header; fixes output column order.
    pub source_ordinal: usize,
}

impl AttributeSchema {
    #[must_use]
    pub fn domain(&self) -> Option<&Domain> {
        match &self.kind {
            AttributeKind::Nominal(d) => Some(d),
            _ => None,
        }
    }

    #[must_use]
    pub fn date_format(&self) -> Option<&DateFormat> {
        match &self.kind {
            AttributeKind::Date(f) => Some(f),
            _ => None,
        }
    }
}

/// Relation name plus the ordered attribute sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSchema {
    relation: String,
    attributes: Vec<AttributeSchema>,
    by_name: HashMap<String, usize>,
}

impl DocumentSchema {
    pub fn new(relation: impl Into<String>) -> Self {
        Self {
            relation: relation.into(),
            attributes: Vec::new(),
            by_name: HashMap::new(),
        }
    }

    /// Append an attribute; `line` is reported on duplicate names.
    pub fn add_attribute(
        &mut self,
        name: impl Into<String>,
        kind: AttributeKind,
        line: usize,
    ) -> ArffResult<()> {
        let name = name.into();
        if self.by_name.contains_key(&name) {
            return Err(ArffError::schema(
                line,
                format!("duplicate attribute name `{name}`"),
            ));
        }
        let ordinal = self.attributes.len();
        self.by_name.insert(name.clone(), ordinal);
        self.attributes.push(AttributeSchema {
            name,
            kind,
            source_ordinal: ordinal,
        });
        Ok(())
    }

    /// Builder-style variant of [`add_attribute`](Self::add_attribute).
    pub fn with_attribute(mut self, name: impl Into<String>, kind: AttributeKind) -> ArffResult<Self> {
        let line = self.attributes.len() + 2;
        self.add_attribute(name, kind, line)?;
        Ok(self)
    }

    #[must_use]
    pub fn relation(&self) -> &str {
        &self.relation
    }

    #[must_use]
    pub fn attributes(&self) -> &[AttributeSchema] {
        &self.attributes
    }

    #[must_use]
    pub fn attribute(&self, index: usize) -> Option<&AttributeSchema> {
        self.attributes.get(index)
    }

    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.attributes.iter().map(|a| a.name.as_str())
    }

    /// Render the schema as an ARFF header, including the `@data` line.
    #[must_use]
    pub fn to_arff_header(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "@relation {}", quote_arff(&self.relation));
        out.push('\n');
        for attr in &self.attributes {
            let ty = match &attr.kind {
                AttributeKind::Numeric => "numeric".to_string(),
                AttributeKind::Integer => "integer".to_string(),
                AttributeKind::String => "string".to_string(),
                AttributeKind::Date(f) => format!("date {}", quote_arff(f.pattern())),
                AttributeKind::Nominal(d) => {
                    let labels: Vec<String> = d.labels().iter().map(|l| quote_arff(l)).collect();
                    format!("{{{}}}", labels.join(","))
                }
            };
            let _ = writeln!(out, "@attribute {} {}", quote_arff(&attr.name), ty);
        }
        out.push_str("\n@data\n");
        out
    }
}

/// Quote a value for an ARFF header or data line when it needs it.
#[must_use]
pub fn quote_arff(value: &str) -> String {
    let needs = value.is_empty()
        || value == "?"
        || value.chars().any(|c| {
            c.is_whitespace() || matches!(c, ',' | '\'' | '"' | '{' | '}' | '%' | '\\')
        });
    if !needs {
        return value.to_string();
    }
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for c in value.chars() {
        match c {
            '\'' => out.push_str("\\'"),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out.push('\'');
    out
}
