//! Record-set specification compiler
//!
//! Compiles the bracketed query language appended to a series name into a
//! SQL boolean expression over that series' table:
//!
//! ```text
//! series[key=10-20@3][#^]
//! series[2014.01.01_00:00:00_UTC-2014.01.02_00:00:00_UTC]
//! series[? quality >= 0 ?][:#100-#200]
//! ```
//!
//! - **AST**: owned tree of filters and range sets
//! - **Parser**: grammar + positional prime-key binding, per-call state
//! - **Resolver**: slotted-keyword rewriting into the index domain
//! - **SQL**: WHERE-fragment generation and the query-character flags
//!
//! # Example
//!
//! ```rust
//! use recset::{compile, Keyword, KeywordType, MemoryCatalog, SeriesSchema};
//!
//! let catalog = MemoryCatalog::with_series(vec![SeriesSchema::new(
//!     "frames",
//!     vec![Keyword::new("recnum", KeywordType::Int)],
//! )]);
//!
//! let out = compile(&catalog, "frames[#10-20@3]").unwrap();
//! assert_eq!(out.sql, "( ( 10<=recnum AND recnum<=20 AND (recnum-10)%3=0 ) )");
//! assert!(out.recnum_only);
//! ```
//!
//! The compiler is a pure, synchronous transform: no I/O, no shared state
//! across calls, one schema lookup per compile.

mod ast;
mod error;
mod parser;
mod resolver;
mod sql;
mod time;

pub use ast::{
    Filter, IndexRange, KeywordRef, PrimeKeyRangeSet, RangeBody, RawQuery, RecordList,
    RecordSetSpec, Value, ValueRange,
};
pub use error::{Advisory, CompileError, CompileResult};
pub use parser::{parse, ParseOutput};
pub use sql::{generate, Generated};

use crate::schema::SchemaProvider;
use serde::Serialize;

/// Result of compiling one record-set specification
#[derive(Debug, Clone, Serialize)]
pub struct Compiled {
    /// Series the query addresses
    pub series: String,
    /// Boolean expression for `SELECT .. FROM <series> WHERE <sql>`;
    /// empty when the specification had no filters
    pub sql: String,
    /// A raw query requested every record version
    pub allvers: bool,
    /// Every structured filter addressed record numbers
    pub recnum_only: bool,
    /// Both a raw query and a structured filter are present
    pub mixed: bool,
    /// Non-fatal notices collected along the way
    pub warnings: Vec<Advisory>,
}

/// Parse, resolve, and generate in one call
pub fn compile<P: SchemaProvider>(provider: &P, input: &str) -> CompileResult<Compiled> {
    let ParseOutput { spec, warnings } = parse(provider, input)?;
    let generated = generate(&spec);
    Ok(Compiled {
        series: spec.series.clone(),
        sql: generated.sql,
        allvers: generated.allvers,
        recnum_only: generated.recnum_only,
        mixed: generated.mixed,
        warnings,
    })
}
