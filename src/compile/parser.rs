//! Record-set specification parser
//!
//! Parses the bracketed query language appended to a series name:
//!
//! ```text
//! series_name [filter] [filter] ...
//! filter      := '[' ( raw_query | record_list )? ']'
//! raw_query   := ('?'|'!') sql_fragment SAMECHAR      -- '!' selects all versions
//! record_list := ':' index_ranges | '#'-ranges (recnum) | [key=] ranges
//! ```
//!
//! All parse state — the byte offset, the positional prime-key cursor, and
//! collected advisories — lives in a per-call [`Parser`] value, so
//! concurrent compiles never interfere.
//!
//! An empty bracket `[]` advances the positional cursor without adding a
//! filter. A positional bracket always binds the prime key at the current
//! cursor, in declared order, even when earlier brackets named keywords
//! explicitly: with prime keys `[a, b]`, `series[b=20][10]` binds the
//! trailing bracket to `a`. Callers depend on this.

use nom::{
    branch::alt,
    bytes::complete::{take_while, take_while1},
    character::complete::{char, digit1},
    combinator::{map_res, opt, recognize},
    sequence::{delimited, pair, tuple},
    IResult,
};

use crate::compile::ast::{Filter, IndexRange, RecordList, RecordSetSpec, Value, ValueRange};
use crate::compile::error::{Advisory, CompileError, CompileResult};
use crate::compile::{resolver, time};
use crate::schema::{Keyword, KeywordType, SchemaProvider, SeriesSchema};

/// A parsed specification plus any non-fatal advisories
#[derive(Debug)]
pub struct ParseOutput {
    pub spec: RecordSetSpec,
    pub warnings: Vec<Advisory>,
}

/// Parse a record-set specification against the series catalog
pub fn parse<P: SchemaProvider>(provider: &P, input: &str) -> CompileResult<ParseOutput> {
    let mut pos = next_non_space(input, 0);

    let (rest, series) = lex::name(&input[pos..])
        .map_err(|_| CompileError::syntax("expected a series name", pos))?;
    pos += input[pos..].len() - rest.len();
    pos = next_non_space(input, pos);

    if pos == input.len() {
        return Ok(ParseOutput {
            spec: RecordSetSpec {
                series: series.to_string(),
                filters: Vec::new(),
                allvers: false,
            },
            warnings: Vec::new(),
        });
    }
    if input.as_bytes()[pos] != b'[' {
        return Err(CompileError::syntax(
            "series name must be followed by '['",
            pos,
        ));
    }

    let schema = provider
        .series(series)
        .ok_or_else(|| CompileError::Schema(format!("unknown series '{series}'")))?;

    let mut parser = Parser {
        input,
        pos,
        schema,
        prime_cursor: 0,
        allvers: false,
        warnings: Vec::new(),
    };
    let filters = parser.filters()?;

    let tail = next_non_space(input, parser.pos);
    if tail != input.len() {
        return Err(CompileError::syntax(
            format!("unexpected input after record-set: '{}'", &input[tail..]),
            tail,
        ));
    }

    tracing::debug!(
        "parsed record-set for series '{}': {} filter(s), allvers={}",
        series,
        filters.len(),
        parser.allvers
    );

    Ok(ParseOutput {
        spec: RecordSetSpec {
            series: series.to_string(),
            filters,
            allvers: parser.allvers,
        },
        warnings: parser.warnings,
    })
}

fn next_non_space(input: &str, pos: usize) -> usize {
    input[pos..]
        .find(|c: char| !c.is_whitespace())
        .map_or(input.len(), |off| pos + off)
}

/// Per-call parse state over an immutable input and a byte offset
struct Parser<'a> {
    input: &'a str,
    pos: usize,
    schema: &'a SeriesSchema,
    /// Next declared prime key a positional bracket will bind
    prime_cursor: usize,
    allvers: bool,
    warnings: Vec<Advisory>,
}

impl<'a> Parser<'a> {
    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<u8> {
        self.rest().as_bytes().first().copied()
    }

    fn bump(&mut self) {
        self.pos += 1;
    }

    fn skip_spaces(&mut self) {
        self.pos = next_non_space(self.input, self.pos);
    }

    fn syntax(&self, message: impl Into<String>) -> CompileError {
        CompileError::syntax(message, self.pos)
    }

    /// Advance past a nom-matched prefix of `rest()`
    fn advance_to(&mut self, rest: &str) {
        self.pos = self.input.len() - rest.len();
    }

    fn filters(&mut self) -> CompileResult<Vec<Filter>> {
        let mut filters = Vec::new();
        loop {
            self.skip_spaces();
            if self.peek() != Some(b'[') {
                break;
            }
            self.bump();
            self.skip_spaces();
            match self.peek() {
                Some(b']') => {
                    // Empty set: consumes one positional prime key, constrains nothing.
                    self.prime_cursor += 1;
                    self.bump();
                }
                Some(open @ (b'?' | b'!')) => {
                    let sql = self.raw_query(open)?;
                    if open == b'!' {
                        self.allvers = true;
                    }
                    filters.push(Filter::raw(sql));
                    self.expect_close()?;
                }
                Some(_) => {
                    let list = self.record_list()?;
                    filters.push(Filter::list(list));
                    self.expect_close()?;
                }
                None => return Err(self.syntax("unterminated filter bracket")),
            }
        }
        Ok(filters)
    }

    fn expect_close(&mut self) -> CompileResult<()> {
        self.skip_spaces();
        if self.peek() == Some(b']') {
            self.bump();
            Ok(())
        } else {
            Err(self.syntax("expected ']' to close filter"))
        }
    }

    /// Scan a `[? ... ?]` / `[! ... !]` body up to the matching close char.
    ///
    /// Quoted spans are copied through opaquely (`]` and the close char
    /// included); `$(time)` macros are replaced by floating epoch-seconds
    /// constants.
    fn raw_query(&mut self, open: u8) -> CompileResult<String> {
        self.bump();
        let mut sql = String::new();
        loop {
            match self.peek() {
                None => return Err(self.syntax("unterminated raw query")),
                Some(quote @ (b'\'' | b'"')) => {
                    sql.push(quote as char);
                    self.bump();
                    loop {
                        match self.rest().chars().next() {
                            None => {
                                return Err(self.syntax("unterminated string in raw query"))
                            }
                            Some(c) => {
                                sql.push(c);
                                self.pos += c.len_utf8();
                                if c == quote as char {
                                    break;
                                }
                            }
                        }
                    }
                }
                Some(b'$') if self.rest().as_bytes().get(1) == Some(&b'(') => {
                    let body_start = self.pos + 2;
                    let close = self.input[body_start..]
                        .find(')')
                        .ok_or_else(|| self.syntax("unterminated $() macro in raw query"))?;
                    let text = &self.input[body_start..body_start + close];
                    let seconds = time::macro_seconds(text).ok_or_else(|| {
                        self.syntax(format!("invalid time '{text}' in $() macro"))
                    })?;
                    sql.push_str(&format!("{seconds:?}"));
                    self.pos = body_start + close + 1;
                }
                Some(c) if c == open && self.rest().as_bytes().get(1) == Some(&b']') => {
                    self.bump();
                    return Ok(sql.trim().to_string());
                }
                Some(_) => {
                    if let Some(c) = self.rest().chars().next() {
                        sql.push(c);
                        self.pos += c.len_utf8();
                    }
                }
            }
        }
    }

    fn record_list(&mut self) -> CompileResult<RecordList> {
        match self.peek() {
            Some(b':') => {
                self.bump();
                Ok(RecordList::Recnum(self.index_set()?))
            }
            // A bare '#' range addresses record numbers and leaves the
            // positional prime-key cursor alone.
            Some(b'#') => Ok(RecordList::Recnum(self.index_set()?)),
            _ => self.primekey_list(),
        }
    }

    fn primekey_list(&mut self) -> CompileResult<RecordList> {
        if self.schema.prime_keys.is_empty() {
            return Err(CompileError::Schema(format!(
                "prime-key query issued for series '{}' with no prime keys",
                self.schema.name
            )));
        }

        self.skip_spaces();
        let keyword = match self.explicit_keyword()? {
            Some(keyword) => keyword,
            None => {
                let keynum = self.prime_cursor;
                self.prime_cursor += 1;
                self.schema.prime_keys.get(keynum).ok_or_else(|| {
                    CompileError::Schema(format!(
                        "more prime keys implied than declared ({}) for series '{}'",
                        self.schema.prime_keys.len(),
                        self.schema.name
                    ))
                })?
            }
        };

        let body = if self.peek() == Some(b'#') {
            resolver::RangeInput::Index(self.index_set()?)
        } else {
            resolver::RangeInput::Value(self.value_set(keyword)?)
        };

        let set = resolver::resolve(keyword, body, &mut self.warnings)?;
        Ok(RecordList::PrimeKey(set))
    }

    /// Try to consume a `name =` prefix and resolve it against the schema.
    ///
    /// Rewinds and returns `None` when the bracket is positional. A name
    /// that is neither a prime key nor a slotted keyword is a schema error.
    fn explicit_keyword(&mut self) -> CompileResult<Option<&'a Keyword>> {
        let start = self.pos;
        let Ok((rest, name)) = lex::name(self.rest()) else {
            return Ok(None);
        };
        let after_name = self.input.len() - rest.len();
        let eq = next_non_space(self.input, after_name);
        if self.input.as_bytes().get(eq) != Some(&b'=') {
            self.pos = start;
            return Ok(None);
        }
        self.pos = next_non_space(self.input, eq + 1);

        if let Some(position) = self.schema.prime_position(name) {
            return Ok(Some(&self.schema.prime_keys[position]));
        }
        match self.schema.lookup(name) {
            Some(keyword) if keyword.is_slotted() => Ok(Some(keyword)),
            Some(_) => Err(CompileError::Schema(format!(
                "'{}' is not a prime key of series '{}'",
                name, self.schema.name
            ))),
            None => Err(CompileError::Schema(format!(
                "'{}' is not a keyword of series '{}'",
                name, self.schema.name
            ))),
        }
    }

    /// Comma-separated `#` index ranges
    fn index_set(&mut self) -> CompileResult<Vec<IndexRange>> {
        let mut ranges = Vec::new();
        loop {
            if self.peek() != Some(b'#') {
                return Err(self.syntax("index range must start with '#'"));
            }
            self.bump();
            let range = match self.peek() {
                Some(b'^') => {
                    self.bump();
                    IndexRange::First
                }
                Some(b'$') => {
                    self.bump();
                    IndexRange::Last
                }
                Some(b'-') => {
                    self.bump();
                    if self.peek() == Some(b'#') {
                        self.bump();
                    }
                    match self.try_integer() {
                        Some(end) => IndexRange::RangeEnd {
                            end,
                            skip: self.index_skip()?,
                        },
                        None => IndexRange::All {
                            skip: self.index_skip()?,
                        },
                    }
                }
                _ => {
                    let start = self.integer("expected integer start in index range")?;
                    match self.peek() {
                        Some(b'-') => {
                            self.bump();
                            // Legacy form writes the end as '#n'.
                            if self.peek() == Some(b'#') {
                                self.bump();
                            }
                            match self.try_integer() {
                                Some(end) => IndexRange::StartEnd {
                                    start,
                                    end,
                                    skip: self.index_skip()?,
                                },
                                None => IndexRange::RangeStart {
                                    start,
                                    skip: self.index_skip()?,
                                },
                            }
                        }
                        Some(b'/') => {
                            self.bump();
                            let count =
                                self.integer("expected integer count in index range")?;
                            IndexRange::StartCount {
                                start,
                                count,
                                skip: self.index_skip()?,
                            }
                        }
                        _ => IndexRange::Single { start },
                    }
                }
            };
            ranges.push(range);
            if self.peek() == Some(b',') {
                self.bump();
            } else {
                return Ok(ranges);
            }
        }
    }

    fn index_skip(&mut self) -> CompileResult<Option<i64>> {
        if self.peek() != Some(b'@') {
            return Ok(None);
        }
        self.bump();
        let skip = self.integer("expected integer stride after '@'")?;
        if skip < 1 {
            return Err(self.syntax("stride must be a positive integer"));
        }
        Ok(Some(skip))
    }

    fn integer(&mut self, message: &str) -> CompileResult<i64> {
        self.try_integer().ok_or_else(|| self.syntax(message))
    }

    fn try_integer(&mut self) -> Option<i64> {
        let (rest, value) = lex::integer(self.rest()).ok()?;
        self.advance_to(rest);
        Some(value)
    }

    /// Comma-separated value-domain ranges, scanned by the keyword's type
    fn value_set(&mut self, keyword: &Keyword) -> CompileResult<Vec<ValueRange>> {
        let mut ranges = Vec::new();
        loop {
            self.skip_spaces();
            let range = match self.peek() {
                Some(b'^') => {
                    self.bump();
                    ValueRange::First
                }
                Some(b'$') => {
                    self.bump();
                    ValueRange::Last
                }
                _ => self.value_range(keyword)?,
            };
            ranges.push(range);
            if self.peek() == Some(b',') {
                self.bump();
            } else {
                return Ok(ranges);
            }
        }
    }

    fn value_range(&mut self, keyword: &Keyword) -> CompileResult<ValueRange> {
        let start = self.start_value(keyword)?;
        match self.peek() {
            Some(b'-') => {
                self.bump();
                let end = self.scan_value(keyword)?;
                let skip = self.value_skip(keyword)?;
                Ok(ValueRange::StartEnd { start, end, skip })
            }
            Some(b'/') => {
                self.bump();
                let duration = self.scan_width(keyword)?;
                let skip = self.value_skip(keyword)?;
                Ok(ValueRange::StartDuration {
                    start,
                    duration,
                    skip,
                })
            }
            _ => Ok(ValueRange::Single { start }),
        }
    }

    /// A range start. On slotted continuous keywords this may be a duration
    /// literal, read as an offset from the slot base.
    fn start_value(&mut self, keyword: &Keyword) -> CompileResult<Value> {
        if let Some(slot) = keyword.slot.as_ref() {
            if keyword.data_type.is_continuous() && time::is_duration(self.rest()) {
                let offset = self.scan_width(keyword)?;
                let base = slot.base.ok_or_else(|| {
                    CompileError::SlotResolution(format!(
                        "keyword '{}' has no slot base",
                        keyword.name
                    ))
                })?;
                return Ok(match keyword.data_type {
                    KeywordType::Time => Value::Time(base + offset),
                    _ => Value::Float(base + offset),
                });
            }
        }
        self.scan_value(keyword)
    }

    /// One value of the keyword's type
    fn scan_value(&mut self, keyword: &Keyword) -> CompileResult<Value> {
        match keyword.data_type {
            KeywordType::Time => {
                if let Some(scan) = time::scan_time_value(self.rest()) {
                    self.pos += scan.len;
                    return Ok(Value::Time(scan.seconds));
                }
                // Times are epoch-second doubles internally; accept a bare
                // number as one.
                if let Ok((rest, value)) = lex::float(self.rest()) {
                    self.advance_to(rest);
                    return Ok(Value::Time(value));
                }
                Err(self.syntax(format!(
                    "expected time value for keyword '{}'",
                    keyword.name
                )))
            }
            KeywordType::Float => {
                let (rest, value) = lex::float(self.rest()).map_err(|_| {
                    self.syntax(format!(
                        "expected float value for keyword '{}'",
                        keyword.name
                    ))
                })?;
                self.advance_to(rest);
                Ok(Value::Float(value))
            }
            KeywordType::Int => {
                let (rest, value) = lex::integer(self.rest()).map_err(|_| {
                    self.syntax(format!(
                        "expected integer value for keyword '{}'",
                        keyword.name
                    ))
                })?;
                self.advance_to(rest);
                Ok(Value::Int(value))
            }
            KeywordType::String => {
                if let Ok((rest, text)) = lex::quoted(self.rest()) {
                    self.advance_to(rest);
                    return Ok(Value::Str(text.to_string()));
                }
                let (rest, text) = lex::bare_token(self.rest()).map_err(|_| {
                    self.syntax(format!(
                        "expected string value for keyword '{}'",
                        keyword.name
                    ))
                })?;
                self.advance_to(rest);
                Ok(Value::Str(text.to_string()))
            }
        }
    }

    /// A range width (after `/`) in the keyword's units
    fn scan_width(&mut self, keyword: &Keyword) -> CompileResult<f64> {
        match keyword.data_type {
            KeywordType::Time | KeywordType::Float => {
                let scan = self
                    .scan_duration_literal()
                    .ok_or_else(|| self.syntax("expected duration (e.g. 5d, 30m, 100u)"))?;
                self.duration_seconds(keyword, scan)
            }
            KeywordType::Int => {
                let value = self.integer("expected integer width after '/'")?;
                if self.peek().is_some_and(|c| c.is_ascii_alphabetic()) {
                    return Err(CompileError::Type(format!(
                        "unit durations are not valid for integer keyword '{}'",
                        keyword.name
                    )));
                }
                Ok(value as f64)
            }
            KeywordType::String => Err(CompileError::Type(format!(
                "duration ranges are not valid for string keyword '{}'",
                keyword.name
            ))),
        }
    }

    fn scan_duration_literal(&mut self) -> Option<time::DurationScan> {
        let scan = time::scan_duration(self.rest())?;
        self.pos += scan.len;
        Some(scan)
    }

    /// Convert a scanned duration to the keyword's value domain. The `u`
    /// unit means slot widths and needs the keyword's step.
    fn duration_seconds(
        &self,
        keyword: &Keyword,
        scan: time::DurationScan,
    ) -> CompileResult<f64> {
        match scan.unit.seconds() {
            Some(factor) => Ok(scan.value * factor),
            None => {
                let slot = keyword.slot.as_ref().ok_or_else(|| {
                    CompileError::Type(format!(
                        "'u' durations require a slotted keyword, '{}' is not",
                        keyword.name
                    ))
                })?;
                let step = slot.step.filter(|s| s.is_finite() && *s != 0.0).ok_or_else(
                    || {
                        CompileError::SlotResolution(format!(
                            "keyword '{}' has no usable slot step",
                            keyword.name
                        ))
                    },
                )?;
                Ok(scan.value * step)
            }
        }
    }

    /// An optional `@stride`, scanned like the range's values
    fn value_skip(&mut self, keyword: &Keyword) -> CompileResult<Option<f64>> {
        if self.peek() != Some(b'@') {
            return Ok(None);
        }
        self.bump();
        let skip = match keyword.data_type {
            KeywordType::Time | KeywordType::Float => {
                let scan = self
                    .scan_duration_literal()
                    .ok_or_else(|| self.syntax("expected duration stride after '@'"))?;
                self.duration_seconds(keyword, scan)?
            }
            KeywordType::Int => self.integer("expected integer stride after '@'")? as f64,
            KeywordType::String => {
                return Err(CompileError::Type(format!(
                    "sampling strides are not valid for string keyword '{}'",
                    keyword.name
                )))
            }
        };
        if skip <= 0.0 {
            return Err(self.syntax("stride must be positive"));
        }
        Ok(Some(skip))
    }
}

/// Lexical layer shared by the parser, in nom
mod lex {
    use super::*;

    /// `alpha (alnum | '_' | '.')*` — series and keyword names
    pub(super) fn name(input: &str) -> IResult<&str, &str> {
        recognize(pair(
            take_while1(|c: char| c.is_ascii_alphabetic()),
            take_while(|c: char| c.is_ascii_alphanumeric() || c == '_' || c == '.'),
        ))(input)
    }

    pub(super) fn integer(input: &str) -> IResult<&str, i64> {
        map_res(recognize(pair(opt(char('-')), digit1)), |s: &str| s.parse())(input)
    }

    pub(super) fn float(input: &str) -> IResult<&str, f64> {
        map_res(
            recognize(tuple((opt(char('-')), digit1, opt(pair(char('.'), digit1))))),
            |s: &str| s.parse(),
        )(input)
    }

    /// Single- or double-quoted string; embedded `,` and `]` are fine
    pub(super) fn quoted(input: &str) -> IResult<&str, &str> {
        alt((
            delimited(char('\''), take_while(|c| c != '\''), char('\'')),
            delimited(char('"'), take_while(|c| c != '"'), char('"')),
        ))(input)
    }

    /// Unquoted string value, up to a structural character
    pub(super) fn bare_token(input: &str) -> IResult<&str, &str> {
        take_while1(|c: char| {
            !matches!(c, ',' | ']' | '-' | '/' | '@') && !c.is_whitespace()
        })(input)
    }
}
