//! # Recset
//!
//! Record-set specification compiler for scientific series catalogs: parses
//! the bracketed query language appended to a series name, resolves it
//! against the series' declared prime keys and slotted keywords, and emits
//! an equivalent SQL boolean expression plus flags describing the query's
//! character.
//!
//! ## Features
//!
//! - **Bracket grammar**: positional and named prime-key filters, record
//!   number ranges, embedded raw SQL predicates
//! - **Time literals**: greedy extended calendar-literal scanning with
//!   backtracking at ambiguous range separators
//! - **Slot resolution**: value-domain queries over slotted keywords are
//!   rewritten into the integer index domain before SQL generation
//! - **Reentrant**: all compile state is per call; no globals
//!
//! ## Modules
//!
//! - [`schema`]: series metadata model and the [`SchemaProvider`] seam
//! - [`compile`]: parser, resolver, and SQL generator
//!
//! ## Quick Start
//!
//! ```rust
//! use recset::{compile, Keyword, KeywordType, MemoryCatalog, SeriesSchema};
//!
//! let catalog = MemoryCatalog::with_series(vec![SeriesSchema::new(
//!     "obs.mag_45s",
//!     vec![
//!         Keyword::new("t_rec", KeywordType::Time).slotted("t_rec_index", 0.0, 45.0),
//!         Keyword::new("camera", KeywordType::Int),
//!     ],
//! )]);
//!
//! let out = compile(&catalog, "obs.mag_45s[0-900][camera=1]").unwrap();
//! println!("WHERE {}", out.sql);
//! assert!(!out.mixed);
//! ```

pub mod compile;
pub mod schema;

// Re-export top-level types for convenience
pub use compile::{
    compile, generate, parse, Advisory, Compiled, CompileError, CompileResult, Generated,
    ParseOutput, RecordSetSpec,
};

pub use schema::{
    Keyword, KeywordType, MemoryCatalog, SchemaProvider, SeriesSchema, SlotInfo,
};
