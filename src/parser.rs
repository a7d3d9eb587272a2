//! ARFF reader: header grammar, dense/sparse row tokenizer, and the lazy
//! record stream.
//!
//! [`ArffReader::new`] consumes the header eagerly (everything up to and
//! including `@data`) and returns a reader whose iterator yields one
//! [`Record`] per data line. A record holds the unescaped tokens of the line;
//! typing them is the job of [`CoercionPolicy`](crate::coerce::CoercionPolicy).
//!
//! ```
//! use arffbeam::parser::{ArffReader, ParseOptions};
//!
//! let text = "@relation t\n@attribute a numeric\n@attribute b {X,Y}\n@data\n1.5,X\n?,Y\n";
//! let reader = ArffReader::new(text.as_bytes(), ParseOptions::default())?;
//! assert_eq!(reader.schema().len(), 2);
//! let records: Vec<_> = reader.collect::<Result<_, _>>()?;
//! assert_eq!(records.len(), 2);
//! # Ok::<(), arffbeam::error::ArffError>(())
//! ```
//!
//! # Grammar notes
//! - Keywords (`@relation`, `@attribute`, `@data`, type names) are case-insensitive.
//! - Lines starting with `%` and blank lines are skipped everywhere.
//! - Values may be quoted with `'` or `"`; a backslash escapes the next character.
//! - A bare `?` is Missing; a quoted `'?'` is the literal text `?`.
//! - Input that is not valid UTF-8 is decoded line by line as Latin-1.

use crate::cell::Row;
use crate::coerce::CoercionPolicy;
use crate::error::{ArffError, ArffResult};
use crate::schema::{AttributeKind, DateFormat, DocumentSchema, Domain};
use crate::warnings::{ConversionWarning, WarningCollector, WarningKind};
use std::io::BufRead;
use std::sync::Arc;

/// One unescaped value from a data line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub text: String,
    pub quoted: bool,
}

impl Token {
    pub fn bare(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            quoted: false,
        }
    }

    pub fn quoted(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            quoted: true,
        }
    }

    #[must_use]
    pub fn missing() -> Self {
        Self::bare("?")
    }

    #[must_use]
    pub fn is_missing(&self) -> bool {
        !self.quoted && self.text == "?"
    }
}

/// Values of one data line, in the encoding the line used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordValues {
    /// One token per attribute, in declared order.
    Dense(Vec<Token>),
    /// `(attribute index, token)` pairs, strictly increasing by index.
    Sparse(Vec<(usize, Token)>),
}

/// A tokenized data line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// 1-based source line.
    pub line: usize,
    pub values: RecordValues,
    /// Shape repairs applied in fast mode.
    pub warnings: Vec<ConversionWarning>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseOptions {
    /// Tolerate field-count mismatches and unsorted sparse indices.
    pub fast_mode: bool,
}

/// Streaming ARFF reader over any buffered byte source.
pub struct ArffReader<R> {
    input: R,
    schema: Arc<DocumentSchema>,
    options: ParseOptions,
    line_no: usize,
    raw: Vec<u8>,
    line: String,
    done: bool,
}

impl<R: BufRead> ArffReader<R> {
    /// Read the header and position the reader at the first data line.
    pub fn new(input: R, options: ParseOptions) -> ArffResult<Self> {
        let mut reader = Self {
            input,
            schema: Arc::new(DocumentSchema::new("")),
            options,
            line_no: 0,
            raw: Vec::with_capacity(256),
            line: String::with_capacity(256),
            done: false,
        };
        reader.schema = Arc::new(reader.read_header()?);
        Ok(reader)
    }

    #[must_use]
    pub fn schema(&self) -> &Arc<DocumentSchema> {
        &self.schema
    }

    /// Number of source lines consumed so far.
    #[must_use]
    pub fn lines_read(&self) -> usize {
        self.line_no
    }

    /// Typed rows, coerced with `policy`. Fast-mode repairs accumulate in
    /// [`Rows::warnings`].
    pub fn rows(self, policy: CoercionPolicy) -> Rows<R> {
        Rows {
            reader: self,
            policy,
            warnings: WarningCollector::new(),
        }
    }

    /// Read the next significant line into `self.line`. Returns `false` at EOF.
    fn next_line(&mut self) -> ArffResult<bool> {
        loop {
            self.raw.clear();
            let n = self.input.read_until(b'\n', &mut self.raw)?;
            if n == 0 {
                return Ok(false);
            }
            self.line_no += 1;
            decode_line(&self.raw, &mut self.line);
            let trimmed = self.line.trim();
            if trimmed.is_empty() || trimmed.starts_with('%') {
                continue;
            }
            return Ok(true);
        }
    }

    fn read_header(&mut self) -> ArffResult<DocumentSchema> {
        let mut schema: Option<DocumentSchema> = None;
        loop {
            if !self.next_line()? {
                return Err(ArffError::parse(
                    self.line_no,
                    "",
                    "unexpected end of input before @data",
                ));
            }
            let line = self.line.trim();
            let (keyword, rest) = split_keyword(line);
            let keyword = keyword.to_ascii_lowercase();
            if keyword == "@relation" {
                if schema.is_some() {
                    return Err(ArffError::parse(self.line_no, line, "duplicate @relation"));
                }
                let mut sc = Scanner::new(rest, self.line_no);
                let name = sc.name()?;
                sc.expect_end()?;
                schema = Some(DocumentSchema::new(name));
                continue;
            }
            let Some(s) = schema.as_mut() else {
                return Err(ArffError::parse(
                    self.line_no,
                    line,
                    "expected @relation declaration",
                ));
            };
            match keyword.as_str() {
                "@attribute" => {
                    let (name, kind) = parse_attribute(rest, self.line_no)?;
                    s.add_attribute(name, kind, self.line_no)?;
                }
                "@data" => {
                    if s.is_empty() {
                        return Err(ArffError::schema(self.line_no, "no attributes declared"));
                    }
                    break;
                }
                _ => {
                    return Err(ArffError::parse(
                        self.line_no,
                        keyword,
                        "unexpected header declaration",
                    ));
                }
            }
        }
        schema.ok_or_else(|| ArffError::parse(self.line_no, "@data", "missing @relation"))
    }

    /// Parse the next data line, or `None` at end of input.
    pub fn next_record(&mut self) -> ArffResult<Option<Record>> {
        if !self.next_line()? {
            return Ok(None);
        }
        let line = self.line.trim();
        parse_data_line(line, self.line_no, &self.schema, self.options).map(Some)
    }
}

impl<R: BufRead> Iterator for ArffReader<R> {
    type Item = ArffResult<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_record() {
            Ok(Some(rec)) => Some(Ok(rec)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Iterator of typed rows; see [`ArffReader::rows`].
pub struct Rows<R> {
    reader: ArffReader<R>,
    policy: CoercionPolicy,
    warnings: WarningCollector,
}

impl<R> Rows<R> {
    #[must_use]
    pub fn schema(&self) -> &Arc<DocumentSchema> {
        &self.reader.schema
    }

    #[must_use]
    pub fn warnings(&self) -> &WarningCollector {
        &self.warnings
    }
}

impl<R: BufRead> Iterator for Rows<R> {
    type Item = ArffResult<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        let record = match self.reader.next()? {
            Ok(r) => r,
            Err(e) => return Some(Err(e)),
        };
        match self.policy.coerce_record(&self.reader.schema, record) {
            Ok((row, warnings)) => {
                self.warnings.extend(warnings);
                Some(Ok(row))
            }
            Err(e) => {
                self.reader.done = true;
                Some(Err(e))
            }
        }
    }
}

fn decode_line(raw: &[u8], out: &mut String) {
    out.clear();
    match std::str::from_utf8(raw) {
        Ok(s) => out.push_str(s),
        Err(_) => out.extend(raw.iter().map(|&b| b as char)),
    }
}

fn split_keyword(line: &str) -> (&str, &str) {
    match line.find(char::is_whitespace) {
        Some(i) => (&line[..i], line[i..].trim_start()),
        None => (line, ""),
    }
}

fn parse_attribute(rest: &str, line: usize) -> ArffResult<(String, AttributeKind)> {
    let mut sc = Scanner::new(rest, line);
    let name = sc.name()?;
    sc.skip_ws();
    let ty = sc.remainder().trim();
    if ty.is_empty() {
        return Err(ArffError::parse(line, name, "missing attribute type"));
    }
    if let Some(inner) = ty.strip_prefix('{') {
        let inner = inner
            .strip_suffix('}')
            .ok_or_else(|| ArffError::parse(line, ty, "unterminated nominal domain"))?;
        let labels = split_list(inner, line)?;
        if labels.is_empty() {
            return Err(ArffError::schema(line, format!("empty domain for `{name}`")));
        }
        let domain = Domain::new(labels.into_iter().map(|t| t.text)).map_err(|dup| {
            ArffError::schema(line, format!("repeated label `{dup}` in domain of `{name}`"))
        })?;
        return Ok((name, AttributeKind::Nominal(domain)));
    }
    let (word, tail) = split_keyword(ty);
    let kind = match word.to_ascii_lowercase().as_str() {
        "numeric" | "real" => AttributeKind::Numeric,
        "integer" => AttributeKind::Integer,
        "string" => AttributeKind::String,
        "date" => {
            let format = if tail.is_empty() {
                DateFormat::default()
            } else {
                // Unquoted patterns may embed quoted literals ('T'), so they
                // run to the end of the line.
                let pattern = if tail.starts_with(['\'', '"']) {
                    let mut fs = Scanner::new(tail, line);
                    let pattern = fs.name()?;
                    fs.expect_end()?;
                    pattern
                } else {
                    tail.to_string()
                };
                DateFormat::new(&pattern).map_err(|c| {
                    ArffError::schema(line, format!("unsupported date pattern letter `{c}` in `{pattern}`"))
                })?
            };
            return Ok((name, AttributeKind::Date(format)));
        }
        _ => return Err(ArffError::parse(line, word, "unknown attribute type")),
    };
    if !tail.is_empty() {
        return Err(ArffError::parse(line, tail, "unexpected text after attribute type"));
    }
    Ok((name, kind))
}

/// Parse one data line against `schema`.
pub fn parse_data_line(
    line: &str,
    line_no: usize,
    schema: &DocumentSchema,
    options: ParseOptions,
) -> ArffResult<Record> {
    let mut warnings = Vec::new();
    let values = if let Some(inner) = line.strip_prefix('{') {
        let inner = inner
            .strip_suffix('}')
            .ok_or_else(|| ArffError::parse(line_no, line, "unterminated sparse row"))?;
        RecordValues::Sparse(parse_sparse(inner, line_no, schema, options, &mut warnings)?)
    } else {
        let mut tokens = split_list(line, line_no)?;
        let expected = schema.len();
        if tokens.len() != expected {
            if !options.fast_mode {
                let token = tokens
                    .get(expected)
                    .or(tokens.last())
                    .map(|t| t.text.clone())
                    .unwrap_or_default();
                return Err(ArffError::parse(
                    line_no,
                    token,
                    format!("expected {expected} values, found {}", tokens.len()),
                ));
            }
            let (kind, verb) = if tokens.len() < expected {
                (WarningKind::PaddedRow, "padded")
            } else {
                (WarningKind::TruncatedRow, "truncated")
            };
            warnings.push(ConversionWarning::new(
                line_no,
                kind,
                format!("{verb} row of {} values to {expected}", tokens.len()),
            ));
            tokens.resize_with(expected, Token::missing);
        }
        RecordValues::Dense(tokens)
    };
    Ok(Record {
        line: line_no,
        values,
        warnings,
    })
}

fn parse_sparse(
    inner: &str,
    line_no: usize,
    schema: &DocumentSchema,
    options: ParseOptions,
    warnings: &mut Vec<ConversionWarning>,
) -> ArffResult<Vec<(usize, Token)>> {
    let mut pairs: Vec<(usize, Token)> = Vec::new();
    let mut sc = Scanner::new(inner, line_no);
    sc.skip_ws();
    if sc.at_end() {
        return Ok(pairs);
    }
    let mut ordered = true;
    loop {
        sc.skip_ws();
        let idx_text = sc.word();
        let index: usize = idx_text
            .parse()
            .map_err(|_| ArffError::parse(line_no, idx_text, "expected sparse attribute index"))?;
        if index >= schema.len() {
            return Err(ArffError::parse(
                line_no,
                idx_text,
                format!("sparse index out of range (0..{})", schema.len()),
            ));
        }
        if let Some(&(prev, _)) = pairs.last()
            && index <= prev
        {
            if !options.fast_mode {
                return Err(ArffError::parse(
                    line_no,
                    idx_text,
                    "sparse indices must be strictly increasing",
                ));
            }
            ordered = false;
        }
        sc.skip_ws();
        let token = sc.value()?;
        pairs.push((index, token));
        if !sc.separator()? {
            break;
        }
    }
    if !ordered {
        // Stable sort keeps source order among repeats; the last one wins.
        pairs.sort_by_key(|(i, _)| *i);
        let mut deduped: Vec<(usize, Token)> = Vec::with_capacity(pairs.len());
        for (i, t) in pairs {
            match deduped.last_mut() {
                Some(last) if last.0 == i => last.1 = t,
                _ => deduped.push((i, t)),
            }
        }
        pairs = deduped;
        warnings.push(ConversionWarning::new(
            line_no,
            WarningKind::UnsortedSparse,
            "sparse indices out of order; row sorted",
        ));
    }
    Ok(pairs)
}

/// Split a comma-separated list of (possibly quoted) values.
fn split_list(s: &str, line: usize) -> ArffResult<Vec<Token>> {
    let mut out = Vec::new();
    let mut sc = Scanner::new(s, line);
    loop {
        sc.skip_ws();
        out.push(sc.value()?);
        if !sc.separator()? {
            break;
        }
    }
    Ok(out)
}

/// Byte cursor over one line. All delimiters are ASCII, so slicing at their
/// positions always lands on UTF-8 boundaries.
struct Scanner<'a> {
    s: &'a str,
    pos: usize,
    line: usize,
}

impl<'a> Scanner<'a> {
    fn new(s: &'a str, line: usize) -> Self {
        Self { s, pos: 0, line }
    }

    fn peek(&self) -> Option<u8> {
        self.s.as_bytes().get(self.pos).copied()
    }

    fn at_end(&self) -> bool {
        self.pos >= self.s.len()
    }

    fn remainder(&self) -> &'a str {
        &self.s[self.pos..]
    }

    fn skip_ws(&mut self) {
        while let Some(b) = self.peek() {
            if !b.is_ascii_whitespace() {
                break;
            }
            self.pos += 1;
        }
    }

    /// Bare run of characters up to whitespace, a quote, `,` or `{`.
    fn word(&mut self) -> &'a str {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b.is_ascii_whitespace() || matches!(b, b',' | b'{' | b'\'' | b'"') {
                break;
            }
            self.pos += 1;
        }
        &self.s[start..self.pos]
    }

    /// A relation/attribute name or date pattern: quoted, or a bare word.
    fn name(&mut self) -> ArffResult<String> {
        self.skip_ws();
        match self.peek() {
            Some(q @ (b'\'' | b'"')) => self.quoted(q),
            Some(_) => {
                let w = self.word();
                if w.is_empty() {
                    Err(ArffError::parse(self.line, self.remainder(), "expected a name"))
                } else {
                    Ok(w.to_string())
                }
            }
            None => Err(ArffError::parse(self.line, "", "expected a name")),
        }
    }

    fn expect_end(&mut self) -> ArffResult<()> {
        self.skip_ws();
        if self.at_end() {
            Ok(())
        } else {
            Err(ArffError::parse(self.line, self.remainder(), "unexpected trailing text"))
        }
    }

    /// One list value: quoted (unescaped) or bare up to the next comma.
    fn value(&mut self) -> ArffResult<Token> {
        match self.peek() {
            Some(q @ (b'\'' | b'"')) => Ok(Token::quoted(self.quoted(q)?)),
            _ => {
                let start = self.pos;
                while let Some(b) = self.peek() {
                    if b == b',' {
                        break;
                    }
                    self.pos += 1;
                }
                Ok(Token::bare(self.s[start..self.pos].trim_end()))
            }
        }
    }

    /// After a value: `true` if a comma was consumed, `false` at end of input.
    fn separator(&mut self) -> ArffResult<bool> {
        self.skip_ws();
        match self.peek() {
            None => Ok(false),
            Some(b',') => {
                self.pos += 1;
                Ok(true)
            }
            Some(_) => Err(ArffError::parse(
                self.line,
                self.remainder(),
                "expected `,` after value",
            )),
        }
    }

    fn quoted(&mut self, q: u8) -> ArffResult<String> {
        let open = self.pos;
        self.pos += 1;
        let mut out = String::new();
        let mut chunk = self.pos;
        while let Some(b) = self.peek() {
            if b == q {
                out.push_str(&self.s[chunk..self.pos]);
                self.pos += 1;
                return Ok(out);
            }
            if b == b'\\' {
                out.push_str(&self.s[chunk..self.pos]);
                self.pos += 1;
                let Some(c) = self.s[self.pos..].chars().next() else {
                    break;
                };
                out.push(match c {
                    'n' => '\n',
                    'r' => '\r',
                    't' => '\t',
                    'b' => '\u{8}',
                    'f' => '\u{c}',
                    '0' => '\0',
                    other => other,
                });
                self.pos += c.len_utf8();
                chunk = self.pos;
                continue;
            }
            self.pos += 1;
        }
        Err(ArffError::parse(self.line, &self.s[open..], "unterminated quoted value"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn schema(n: usize) -> DocumentSchema {
        let mut s = DocumentSchema::new("t");
        for i in 0..n {
            s.add_attribute(format!("a{i}"), AttributeKind::String, i + 2).unwrap();
        }
        s
    }

    fn texts(rec: &Record) -> Vec<String> {
        match &rec.values {
            RecordValues::Dense(t) => t.iter().map(|t| t.text.clone()).collect(),
            RecordValues::Sparse(p) => p.iter().map(|(i, t)| format!("{i}:{}", t.text)).collect(),
        }
    }

    #[test]
    fn quoted_commas_are_not_split() {
        let rec = parse_data_line("'a,b', \"c d\" ,e", 1, &schema(3), ParseOptions::default()).unwrap();
        assert_eq!(texts(&rec), vec!["a,b", "c d", "e"]);
    }

    #[test]
    fn escapes_are_unescaped_once() {
        let rec = parse_data_line(r"'it\'s', 'back\\slash'", 1, &schema(2), ParseOptions::default())
            .unwrap();
        assert_eq!(texts(&rec), vec!["it's", r"back\slash"]);
    }

    #[test]
    fn quoted_question_mark_is_not_missing() {
        let rec = parse_data_line("?,'?'", 1, &schema(2), ParseOptions::default()).unwrap();
        let RecordValues::Dense(t) = rec.values else { panic!("dense expected") };
        assert!(t[0].is_missing());
        assert!(!t[1].is_missing());
    }

    #[test]
    fn field_count_mismatch_strict_vs_fast() {
        let err = parse_data_line("1,2,3", 9, &schema(2), ParseOptions::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parse);
        assert_eq!(err.line(), Some(9));

        let fast = ParseOptions { fast_mode: true };
        let rec = parse_data_line("1", 9, &schema(3), fast).unwrap();
        assert_eq!(texts(&rec), vec!["1", "?", "?"]);
        assert_eq!(rec.warnings[0].kind, WarningKind::PaddedRow);
        let rec = parse_data_line("1,2,3,4", 9, &schema(3), fast).unwrap();
        assert_eq!(texts(&rec), vec!["1", "2", "3"]);
        assert_eq!(rec.warnings[0].kind, WarningKind::TruncatedRow);
    }

    #[test]
    fn sparse_rows_parse_pairs() {
        let rec = parse_data_line("{0 1.5, 2 'x y'}", 4, &schema(3), ParseOptions::default()).unwrap();
        assert_eq!(texts(&rec), vec!["0:1.5", "2:x y"]);
        let empty = parse_data_line("{}", 4, &schema(3), ParseOptions::default()).unwrap();
        assert_eq!(empty.values, RecordValues::Sparse(vec![]));
    }

    #[test]
    fn sparse_order_violation_strict_vs_fast() {
        let err = parse_data_line("{2 a, 0 b}", 5, &schema(3), ParseOptions::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parse);

        let rec = parse_data_line("{2 a, 0 b, 2 c}", 5, &schema(3), ParseOptions { fast_mode: true })
            .unwrap();
        assert_eq!(texts(&rec), vec!["0:b", "2:c"]);
        assert_eq!(rec.warnings[0].kind, WarningKind::UnsortedSparse);
    }

    #[test]
    fn sparse_index_out_of_range_is_fatal_in_both_modes() {
        for fast_mode in [false, true] {
            let err = parse_data_line("{5 a}", 3, &schema(3), ParseOptions { fast_mode }).unwrap_err();
            assert!(matches!(err, ArffError::Parse { ref token, .. } if token == "5"));
        }
    }

    #[test]
    fn header_parses_all_kinds() {
        let text = "% comment\n\n@RELATION 'my rel'\n@attribute a NUMERIC\n@attribute 'b c' integer\n\
                    @attribute s string\n@attribute d date 'yyyy-MM-dd'\n@attribute n {'x y',z}\n@data\n";
        let r = ArffReader::new(text.as_bytes(), ParseOptions::default()).unwrap();
        let s = r.schema();
        assert_eq!(s.relation(), "my rel");
        let kinds: Vec<&str> = s.attributes().iter().map(|a| a.kind.name()).collect();
        assert_eq!(kinds, vec!["numeric", "integer", "string", "date", "nominal"]);
        assert_eq!(s.attribute(1).unwrap().name, "b c");
        assert_eq!(s.attribute(4).unwrap().domain().unwrap().labels(), &["x y", "z"]);
    }

    #[test]
    fn unknown_type_and_duplicates_fail() {
        let bad_type = "@relation r\n@attribute a complex\n@data\n";
        let err = ArffReader::new(bad_type.as_bytes(), ParseOptions::default()).err().unwrap();
        assert!(matches!(err, ArffError::Parse { line: 2, ref token, .. } if token == "complex"));

        let dup = "@relation r\n@attribute a numeric\n@attribute a string\n@data\n";
        let err = ArffReader::new(dup.as_bytes(), ParseOptions::default()).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Schema);
        assert_eq!(err.line(), Some(3));
    }

    #[test]
    fn missing_data_section_is_parse_error() {
        let text = "@relation r\n@attribute a numeric\n";
        let err = ArffReader::new(text.as_bytes(), ParseOptions::default()).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Parse);
    }

    #[test]
    fn latin1_lines_are_decoded() {
        let mut bytes = b"@relation r\n@attribute s string\n@data\n'caf".to_vec();
        bytes.push(0xE9);
        bytes.extend_from_slice(b"'\n");
        let mut r = ArffReader::new(bytes.as_slice(), ParseOptions::default()).unwrap();
        let rec = r.next_record().unwrap().unwrap();
        assert_eq!(texts(&rec), vec!["café"]);
    }

    #[test]
    fn comments_in_data_are_skipped_and_lines_counted() {
        let text = "@relation r\n@attribute a numeric\n@data\n% c\n1\n\n2\n";
        let r = ArffReader::new(text.as_bytes(), ParseOptions::default()).unwrap();
        let lines: Vec<usize> = r.map(|rec| rec.unwrap().line).collect();
        assert_eq!(lines, vec![5, 7]);
    }
}
