//! Series schema metadata
//!
//! The compiler resolves record-set queries against the metadata of a
//! *series*: its ordered prime keywords, their scalar types, and — for
//! slotted keywords — the companion index keyword plus base/step that map
//! continuous values onto integer slots.
//!
//! Schemas are consumed only. The caller supplies a [`SchemaProvider`]
//! (typically backed by the series catalog in the database); one lookup is
//! performed per compile.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Scalar type of a keyword value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeywordType {
    /// Integer-valued keyword
    Int,
    /// Floating-point keyword
    Float,
    /// String keyword
    String,
    /// Time keyword, stored as seconds since the epoch
    Time,
}

impl KeywordType {
    /// Whether values of this type live on a continuous axis
    pub fn is_continuous(&self) -> bool {
        matches!(self, Self::Float | Self::Time)
    }
}

impl std::fmt::Display for KeywordType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int => write!(f, "int"),
            Self::Float => write!(f, "float"),
            Self::String => write!(f, "string"),
            Self::Time => write!(f, "time"),
        }
    }
}

/// Slot metadata tying a continuous keyword to its integer index keyword
///
/// A slotted keyword quantizes values into buckets of width `step` starting
/// at `base`; the bucket number is stored in the companion `index_keyword`
/// column. `base`/`step` may be absent when the series definition is
/// incomplete; resolution then fails with a slot-resolution error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotInfo {
    /// Name of the integer index keyword backing this slotted keyword
    pub index_keyword: String,
    /// Value mapped to slot 0
    pub base: Option<f64>,
    /// Slot width in the keyword's natural unit
    pub step: Option<f64>,
}

impl SlotInfo {
    /// Create slot metadata with base and step present
    pub fn new(index_keyword: impl Into<String>, base: f64, step: f64) -> Self {
        Self {
            index_keyword: index_keyword.into(),
            base: Some(base),
            step: Some(step),
        }
    }
}

/// A keyword declared by a series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keyword {
    /// Keyword (column) name
    pub name: String,
    /// Scalar type of stored values
    pub data_type: KeywordType,
    /// Slot metadata, present iff the keyword is slotted
    pub slot: Option<SlotInfo>,
    /// True for integer index columns that store slot numbers directly
    pub is_index: bool,
}

impl Keyword {
    /// Create a plain keyword
    pub fn new(name: impl Into<String>, data_type: KeywordType) -> Self {
        Self {
            name: name.into(),
            data_type,
            slot: None,
            is_index: false,
        }
    }

    /// Attach slot metadata (index keyword name, base, step)
    pub fn slotted(mut self, index_keyword: impl Into<String>, base: f64, step: f64) -> Self {
        self.slot = Some(SlotInfo::new(index_keyword, base, step));
        self
    }

    /// Mark this keyword as a raw index column
    pub fn index(mut self) -> Self {
        self.is_index = true;
        self
    }

    /// Whether this keyword is slotted
    pub fn is_slotted(&self) -> bool {
        self.slot.is_some()
    }
}

/// Schema of one series: ordered prime keywords plus auxiliary keywords
///
/// Positional brackets in a record-set query bind to `prime_keys` in
/// declared order. `aux_keys` holds non-prime keywords that may still be
/// named explicitly in a query — in practice, slotted keywords whose index
/// companion is the actual prime key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesSchema {
    /// Series name
    pub name: String,
    /// Declared prime keywords, in order
    pub prime_keys: Vec<Keyword>,
    /// Non-prime keywords addressable by name
    pub aux_keys: Vec<Keyword>,
}

impl SeriesSchema {
    /// Create a schema with the given prime keywords
    pub fn new(name: impl Into<String>, prime_keys: Vec<Keyword>) -> Self {
        Self {
            name: name.into(),
            prime_keys,
            aux_keys: Vec::new(),
        }
    }

    /// Add a non-prime keyword
    pub fn aux_key(mut self, keyword: Keyword) -> Self {
        self.aux_keys.push(keyword);
        self
    }

    /// Position of `name` among the prime keys (case-insensitive)
    pub fn prime_position(&self, name: &str) -> Option<usize> {
        self.prime_keys
            .iter()
            .position(|k| k.name.eq_ignore_ascii_case(name))
    }

    /// Look up a keyword by name, prime or auxiliary (case-insensitive)
    pub fn lookup(&self, name: &str) -> Option<&Keyword> {
        self.prime_keys
            .iter()
            .chain(self.aux_keys.iter())
            .find(|k| k.name.eq_ignore_ascii_case(name))
    }
}

/// Source of series schemas, one lookup per compile
pub trait SchemaProvider {
    /// Fetch the schema for `name`, or `None` if the series is unknown
    fn series(&self, name: &str) -> Option<&SeriesSchema>;
}

/// In-memory schema catalog
///
/// Suitable for tests and for callers that prefetch series metadata before
/// invoking the compiler. Lookup is case-insensitive.
#[derive(Debug, Clone, Default)]
pub struct MemoryCatalog {
    series: HashMap<String, SeriesSchema>,
}

impl MemoryCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a schema, replacing any previous one for the same name
    pub fn register(&mut self, schema: SeriesSchema) {
        self.series.insert(schema.name.to_ascii_lowercase(), schema);
    }

    /// Build a catalog from a list of schemas
    pub fn with_series(schemas: Vec<SeriesSchema>) -> Self {
        let mut catalog = Self::new();
        for schema in schemas {
            catalog.register(schema);
        }
        catalog
    }
}

impl SchemaProvider for MemoryCatalog {
    fn series(&self, name: &str) -> Option<&SeriesSchema> {
        self.series.get(&name.to_ascii_lowercase())
    }
}
