//! Record-set abstract syntax tree
//!
//! One parse call builds a [`RecordSetSpec`]; the SQL generator consumes it
//! once; then it is dropped. The tree is single-owner throughout — sum types
//! with owned children — so a failed parse releases every partially built
//! node on the early return, with no cleanup code on the error paths.
//!
//! After semantic resolution, range sets over slotted keywords are expressed
//! in the index domain: [`PrimeKeyRangeSet::keyword`] names the slot's index
//! keyword and the generator never sees slot-domain values.

use crate::schema::{Keyword, KeywordType, SlotInfo};

/// A fully parsed record-set specification
#[derive(Debug)]
pub struct RecordSetSpec {
    /// Series the query addresses
    pub series: String,
    /// Bracket filters, in query order; AND'd together by the generator
    pub filters: Vec<Filter>,
    /// True when a raw query used the `!` form, requesting every record
    /// version instead of only the latest
    pub allvers: bool,
}

/// One bracket group of the query
#[derive(Debug)]
pub enum Filter {
    /// Embedded SQL predicate, copied through mostly opaquely
    Raw(RawQuery),
    /// Structured range filter
    List(RecordList),
}

impl Filter {
    pub(crate) fn raw(sql: String) -> Self {
        #[cfg(test)]
        drop_counter::created();
        Filter::Raw(RawQuery { sql })
    }

    pub(crate) fn list(list: RecordList) -> Self {
        #[cfg(test)]
        drop_counter::created();
        Filter::List(list)
    }
}

#[cfg(test)]
impl Drop for Filter {
    fn drop(&mut self) {
        drop_counter::dropped();
    }
}


/// An embedded SQL fragment from a `[? ... ?]` / `[! ... !]` bracket
///
/// `$(time)` macros have already been expanded into floating epoch-seconds
/// constants by the parser.
#[derive(Debug, Clone, PartialEq)]
pub struct RawQuery {
    pub sql: String,
}

/// A structured range filter
#[derive(Debug)]
pub enum RecordList {
    /// Ranges over the internal record number
    Recnum(Vec<IndexRange>),
    /// Ranges over a prime (or slotted) keyword
    PrimeKey(PrimeKeyRangeSet),
}

/// Ranges bound to one keyword
#[derive(Debug)]
pub struct PrimeKeyRangeSet {
    /// Target keyword; for slotted keys this is the index keyword after
    /// resolution
    pub keyword: KeywordRef,
    /// The parsed ranges
    pub body: RangeBody,
}

/// Index-domain or value-domain body of a prime-key filter
#[derive(Debug)]
pub enum RangeBody {
    Index(Vec<IndexRange>),
    Value(Vec<ValueRange>),
}

/// Snapshot of the keyword metadata the generator needs
#[derive(Debug, Clone, PartialEq)]
pub struct KeywordRef {
    /// Column name to compare against
    pub name: String,
    /// Scalar type of the column
    pub data_type: KeywordType,
    /// True when the column stores raw slot numbers
    pub is_index: bool,
    /// Base/step context retained for index-range scaling
    pub slot: Option<SlotInfo>,
}

impl From<&Keyword> for KeywordRef {
    fn from(keyword: &Keyword) -> Self {
        Self {
            name: keyword.name.clone(),
            data_type: keyword.data_type,
            is_index: keyword.is_index,
            slot: keyword.slot.clone(),
        }
    }
}

/// One element of an index-domain range set (`#`-prefixed, or recnum)
///
/// Elements of a set are OR'd. First/Last structurally carry no stride.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexRange {
    /// `#n` — a single slot/record number
    Single { start: i64 },
    /// `#a-b` — closed interval
    StartEnd { start: i64, end: i64, skip: Option<i64> },
    /// `#a/n` — half-open interval of n slots
    StartCount { start: i64, count: i64, skip: Option<i64> },
    /// `#a-` — unbounded above
    RangeStart { start: i64, skip: Option<i64> },
    /// `#-b` — unbounded below
    RangeEnd { end: i64, skip: Option<i64> },
    /// `#-` — everything
    All { skip: Option<i64> },
    /// `#^` — minimum of the column
    First,
    /// `#$` — maximum of the column
    Last,
}

/// One element of a value-domain range set
#[derive(Debug, Clone, PartialEq)]
pub enum ValueRange {
    /// `v`
    Single { start: Value },
    /// `a-b` — closed interval
    StartEnd { start: Value, end: Value, skip: Option<f64> },
    /// `a/dur` — half-open interval of the given width
    StartDuration { start: Value, duration: f64, skip: Option<f64> },
    /// `^` — minimum of the column
    First,
    /// `$` — maximum of the column
    Last,
}

/// A scanned keyword value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Str(String),
    /// Seconds since the epoch
    Time(f64),
}

impl Value {
    /// Numeric view of the value, if it has one
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) | Value::Time(v) => Some(*v),
            Value::Str(_) => None,
        }
    }

    /// Render as a SQL literal
    pub fn sql_literal(&self) -> String {
        match self {
            Value::Int(v) => v.to_string(),
            Value::Float(v) | Value::Time(v) => format!("{v:?}"),
            Value::Str(s) => format!("'{}'", s.replace('\'', "''")),
        }
    }
}
