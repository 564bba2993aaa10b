//! SQL generation
//!
//! Walks a resolved [`RecordSetSpec`] and emits the WHERE-clause fragment:
//! bracket filters AND'd, ranges within a set OR'd and individually
//! parenthesized.
//!
//! First/last ranges compile to a correlated `min()`/`max()` subquery.
//! When such a range sits in any filter position other than the first, the
//! subquery's own WHERE clause embeds the conjunction of every previously
//! generated predicate: "first among the rows the earlier brackets kept" is
//! not the same set as "first overall, intersected with the other filters".
//! The builder keeps the completed predicates as structured strings and
//! never rescans serialized SQL to find them.

use crate::compile::ast::{
    Filter, IndexRange, KeywordRef, RangeBody, RecordList, RecordSetSpec, Value, ValueRange,
};
use crate::schema::KeywordType;

/// Tolerance for the floating-point stride membership test
const STRIDE_EPSILON: f64 = 1e-9;

/// Generator output: the WHERE fragment plus the query-character flags
#[derive(Debug, Clone, PartialEq)]
pub struct Generated {
    /// Boolean expression for `SELECT .. FROM <series> WHERE <sql>`
    pub sql: String,
    /// A raw query used the `!` form
    pub allvers: bool,
    /// Every structured filter addressed record numbers
    pub recnum_only: bool,
    /// Both a raw query and a structured filter are present
    pub mixed: bool,
}

/// Generate SQL and flags for a resolved record-set specification
pub fn generate(spec: &RecordSetSpec) -> Generated {
    let mut builder = SqlBuilder {
        series: &spec.series,
        completed: Vec::new(),
    };
    for filter in &spec.filters {
        let predicate = builder.filter(filter);
        builder.completed.push(predicate);
    }
    let sql = builder
        .completed
        .iter()
        .map(|p| format!("( {p} )"))
        .collect::<Vec<_>>()
        .join(" AND ");

    let mut has_raw = false;
    let mut has_list = false;
    let mut recnum_only = true;
    for filter in &spec.filters {
        match filter {
            Filter::Raw(_) => has_raw = true,
            Filter::List(list) => {
                has_list = true;
                if !matches!(list, RecordList::Recnum(_)) {
                    recnum_only = false;
                }
            }
        }
    }

    tracing::debug!(
        "generated WHERE fragment for series '{}': {}",
        spec.series,
        sql
    );

    Generated {
        sql,
        allvers: spec.allvers,
        recnum_only,
        mixed: has_raw && has_list,
    }
}

/// Anchor of a stride predicate: the range start, or the series minimum for
/// ranges with no lower bound
enum StrideAnchor {
    Start(i64),
    SeriesMin,
}

struct SqlBuilder<'a> {
    series: &'a str,
    /// Predicates of the filters generated so far, in order
    completed: Vec<String>,
}

impl SqlBuilder<'_> {
    fn filter(&self, filter: &Filter) -> String {
        match filter {
            Filter::Raw(raw) => raw.sql.clone(),
            Filter::List(list) => self.record_list(list),
        }
    }

    fn record_list(&self, list: &RecordList) -> String {
        match list {
            RecordList::Recnum(set) => self.index_set(set, "recnum", None),
            RecordList::PrimeKey(pk) => match &pk.body {
                RangeBody::Index(set) => {
                    self.index_set(set, &pk.keyword.name, index_scale(&pk.keyword))
                }
                RangeBody::Value(set) => self.value_set(set, &pk.keyword),
            },
        }
    }

    fn index_set(&self, set: &[IndexRange], col: &str, scale: Option<(f64, f64)>) -> String {
        set.iter()
            .map(|range| format!("( {} )", self.index_range(range, col, scale)))
            .collect::<Vec<_>>()
            .join(" OR ")
    }

    fn index_range(&self, range: &IndexRange, col: &str, scale: Option<(f64, f64)>) -> String {
        let bound = |index: i64| index_bound(index, scale);
        match range {
            IndexRange::First => self.extremal(col, "min"),
            IndexRange::Last => self.extremal(col, "max"),
            IndexRange::Single { start } => format!("{col}={}", bound(*start)),
            IndexRange::StartEnd { start, end, skip } => self.with_index_stride(
                format!("{}<={col} AND {col}<={}", bound(*start), bound(*end)),
                col,
                scale,
                StrideAnchor::Start(*start),
                *skip,
            ),
            IndexRange::StartCount { start, count, skip } => self.with_index_stride(
                format!("{}<={col} AND {col}<{}", bound(*start), bound(start + count)),
                col,
                scale,
                StrideAnchor::Start(*start),
                *skip,
            ),
            IndexRange::RangeStart { start, skip } => self.with_index_stride(
                format!("{}<={col}", bound(*start)),
                col,
                scale,
                StrideAnchor::Start(*start),
                *skip,
            ),
            IndexRange::RangeEnd { end, skip } => self.with_index_stride(
                format!("{col}<={}", bound(*end)),
                col,
                scale,
                StrideAnchor::SeriesMin,
                *skip,
            ),
            IndexRange::All { skip } => self.with_index_stride(
                "1=1".to_string(),
                col,
                scale,
                StrideAnchor::SeriesMin,
                *skip,
            ),
        }
    }

    fn with_index_stride(
        &self,
        predicate: String,
        col: &str,
        scale: Option<(f64, f64)>,
        anchor: StrideAnchor,
        skip: Option<i64>,
    ) -> String {
        let Some(skip) = skip.filter(|s| *s > 1) else {
            return predicate;
        };
        let anchor = match anchor {
            StrideAnchor::Start(start) => index_bound(start, scale),
            StrideAnchor::SeriesMin => {
                format!("(select min({col}) from {})", self.series)
            }
        };
        let stride = match scale {
            None => format!("({col}-{anchor})%{skip}=0"),
            Some((_, step)) => {
                format!("(cast(round(({col}-{anchor})/{step:?}) as integer)%{skip})=0")
            }
        };
        format!("{predicate} AND {stride}")
    }

    fn value_set(&self, set: &[ValueRange], keyword: &KeywordRef) -> String {
        set.iter()
            .map(|range| format!("( {} )", self.value_range(range, keyword)))
            .collect::<Vec<_>>()
            .join(" OR ")
    }

    fn value_range(&self, range: &ValueRange, keyword: &KeywordRef) -> String {
        let col = keyword.name.as_str();
        match range {
            ValueRange::First => self.extremal(col, "min"),
            ValueRange::Last => self.extremal(col, "max"),
            ValueRange::Single { start } => format!("{col}={}", start.sql_literal()),
            ValueRange::StartEnd { start, end, skip } => {
                let predicate = format!(
                    "{}<={col} AND {col}<={}",
                    start.sql_literal(),
                    end.sql_literal()
                );
                self.with_value_stride(predicate, keyword, start, *skip)
            }
            ValueRange::StartDuration {
                start,
                duration,
                skip,
            } => {
                let width = match keyword.data_type {
                    KeywordType::Int => (*duration as i64).to_string(),
                    _ => format!("{duration:?}"),
                };
                let predicate = format!(
                    "{}<={col} AND {col}<( {} + {width} )",
                    start.sql_literal(),
                    start.sql_literal()
                );
                self.with_value_stride(predicate, keyword, start, *skip)
            }
        }
    }

    fn with_value_stride(
        &self,
        predicate: String,
        keyword: &KeywordRef,
        start: &Value,
        skip: Option<f64>,
    ) -> String {
        let Some(skip) = skip else {
            return predicate;
        };
        let col = keyword.name.as_str();
        let start = start.sql_literal();
        let stride = match keyword.data_type {
            KeywordType::Int => {
                let skip = skip as i64;
                if skip <= 1 {
                    return predicate;
                }
                format!("({col}-{start})%{skip}=0")
            }
            // Non-integral columns: tolerance-based membership test.
            _ => format!(
                "abs((({col}-{start})/{skip:?})-round(({col}-{start})/{skip:?}))<{STRIDE_EPSILON:?}"
            ),
        };
        format!("{predicate} AND {stride}")
    }

    /// `col = (select min|max(col) from series [where <prior filters>])`
    ///
    /// Outside the first filter position the subquery restricts itself to
    /// the rows already selected by the earlier brackets.
    fn extremal(&self, col: &str, func: &str) -> String {
        if self.completed.is_empty() {
            format!("{col}=(select {func}({col}) from {})", self.series)
        } else {
            let prior = self
                .completed
                .iter()
                .map(|p| format!("( {p} )"))
                .collect::<Vec<_>>()
                .join(" AND ");
            format!(
                "{col}=(select {func}({col}) from {} where {prior})",
                self.series
            )
        }
    }
}

/// Render an index bound; keywords that are not true index columns scale
/// back into the value domain with `index*step + base`
fn index_bound(index: i64, scale: Option<(f64, f64)>) -> String {
    match scale {
        None => index.to_string(),
        Some((base, step)) => format!("(({index}*{step:?})+{base:?})"),
    }
}

fn index_scale(keyword: &KeywordRef) -> Option<(f64, f64)> {
    if keyword.is_index {
        return None;
    }
    keyword
        .slot
        .as_ref()
        .map(|slot| (slot.base.unwrap_or(0.0), slot.step.unwrap_or(1.0)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::ast::PrimeKeyRangeSet;
    use crate::compile::compile;
    use crate::schema::{Keyword, MemoryCatalog, SeriesSchema, SlotInfo};
    use rusqlite::Connection;

    fn catalog() -> MemoryCatalog {
        MemoryCatalog::with_series(vec![
            // Oracle table: recnum doubles as the only prime key.
            SeriesSchema::new("frames", vec![Keyword::new("recnum", KeywordType::Int)]),
            SeriesSchema::new(
                "scans",
                vec![
                    Keyword::new("t", KeywordType::Time),
                    Keyword::new("camera", KeywordType::Int),
                ],
            ),
            SeriesSchema::new(
                "mag45",
                vec![Keyword::new("t_rec", KeywordType::Time).slotted(
                    "t_rec_index",
                    1388534400.0,
                    45.0,
                )],
            ),
        ])
    }

    fn sql_for(query: &str) -> String {
        compile(&catalog(), query).unwrap().sql
    }

    /// Rows 0..40 with recnum n, quality n%7, t = n*10 seconds
    fn oracle_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "create table frames (recnum integer, quality integer);
             create table scans (recnum integer, t real, camera integer);",
        )
        .unwrap();
        for n in 0..40i64 {
            conn.execute(
                "insert into frames values (?1, ?2)",
                rusqlite::params![n, n % 7],
            )
            .unwrap();
            conn.execute(
                "insert into scans values (?1, ?2, ?3)",
                rusqlite::params![n, (n * 10) as f64, n % 2],
            )
            .unwrap();
        }
        conn
    }

    fn select_recnums(conn: &Connection, table: &str, where_clause: &str) -> Vec<i64> {
        let mut stmt = conn
            .prepare(&format!(
                "select recnum from {table} where {where_clause} order by recnum"
            ))
            .unwrap();
        let rows = stmt.query_map([], |row| row.get(0)).unwrap();
        rows.collect::<Result<Vec<i64>, _>>().unwrap()
    }

    /// Compile `query` and check the SQL selects exactly `expect` over the
    /// synthetic rows
    fn assert_selects(query: &str, table: &str, expect: Vec<i64>) {
        let conn = oracle_conn();
        let sql = sql_for(query);
        assert_eq!(
            select_recnums(&conn, table, &sql),
            expect,
            "query {query} compiled to {sql}"
        );
    }

    #[test]
    fn test_brackets_and_commas_compose() {
        let sql = sql_for("scans[100-200,300][camera=1]");
        assert_eq!(
            sql,
            "( ( 100.0<=t AND t<=200.0 ) OR ( t=300.0 ) ) AND ( ( camera=1 ) )"
        );
    }

    #[test]
    fn test_recnum_range_with_stride() {
        let sql = sql_for("frames[#10-20@3]");
        assert_eq!(sql, "( ( 10<=recnum AND recnum<=20 AND (recnum-10)%3=0 ) )");
        assert_selects(
            "frames[#10-20@3]",
            "frames",
            (10..=20).filter(|n| (n - 10) % 3 == 0).collect(),
        );
    }

    #[test]
    fn test_extremal_after_filter_nests_prior_predicates() {
        let out = compile(&catalog(), "frames[100-200][#^]").unwrap();
        // The min() runs over the rows the first bracket kept, not the
        // whole series: the subquery's WHERE embeds the earlier predicate.
        let subquery = out
            .sql
            .find("recnum=(select min(recnum) from frames where")
            .unwrap_or_else(|| panic!("missing nested subquery in {}", out.sql));
        assert!(
            out.sql[subquery..].contains("100<=recnum AND recnum<=200"),
            "subquery does not embed the prior predicate: {}",
            out.sql
        );
        assert!(!out.recnum_only);
        assert!(!out.mixed);
    }

    #[test]
    fn test_extremal_first_position_is_unconditional() {
        let sql = sql_for("frames[#$]");
        assert_eq!(sql, "( ( recnum=(select max(recnum) from frames) ) )");
    }

    #[test]
    fn test_nested_extremal_selects_filtered_minimum() {
        // Oracle check of the nesting semantics: min over recnum in [10,20],
        // not the global minimum 0.
        assert_selects("frames[10-20][#^]", "frames", vec![10]);
    }

    #[test]
    fn test_slotted_time_range_compiles_in_index_domain() {
        let sql =
            sql_for("mag45[2014.01.01_00:00:00_UTC-2014.01.02_00:00:00_UTC]");
        assert_eq!(sql, "( ( 0<=t_rec_index AND t_rec_index<=1920 ) )");
    }

    #[test]
    fn test_slotted_stride_counts_slots() {
        let sql = sql_for("mag45[1388534400/5d@1d]");
        assert_eq!(
            sql,
            "( ( 0<=t_rec_index AND t_rec_index<9600 AND (t_rec_index-0)%1920=0 ) )"
        );
    }

    #[test]
    fn test_plain_time_stride_stays_in_seconds() {
        let sql = sql_for("scans[100/1000s@200s]");
        assert_eq!(
            sql,
            "( ( 100.0<=t AND t<( 100.0 + 1000.0 ) AND \
             abs(((t-100.0)/200.0)-round((t-100.0)/200.0))<1e-9 ) )"
        );
        // t = n*10 for n < 40: in [100, 1100) on a 200s grid from 100.
        assert_selects("scans[100/1000s@200s]", "scans", vec![10, 30]);
    }

    #[test]
    fn test_raw_query_flags() {
        let out = compile(&catalog(), "frames[? quality >= 3 ?]").unwrap();
        assert_eq!(out.sql, "( quality >= 3 )");
        assert!(out.recnum_only, "vacuously recnum-only without record lists");
        assert!(!out.mixed);
        assert!(!out.allvers);

        let out = compile(&catalog(), "frames[! quality >= 3 !][#0-9]").unwrap();
        assert!(out.allvers);
        assert!(out.mixed);
        assert!(out.recnum_only);
    }

    #[test]
    fn test_mixed_query_oracle() {
        assert_selects(
            "frames[? quality = 3 ?][#-20]",
            "frames",
            (0..=20).filter(|n| n % 7 == 3).collect(),
        );
    }

    #[test]
    fn test_index_range_kinds_match_direct_interpretation() {
        assert_selects("frames[#5]", "frames", vec![5]);
        assert_selects("frames[#35-]", "frames", (35..40).collect());
        assert_selects(
            "frames[#-9@2]",
            "frames",
            (0..=9).filter(|n| n % 2 == 0).collect(),
        );
        assert_selects("frames[#10/5]", "frames", (10..15).collect());
        assert_selects("frames[#-]", "frames", (0..40).collect());
        assert_selects("frames[#3,#7,#11]", "frames", vec![3, 7, 11]);
        assert_selects("frames[#^,#$]", "frames", vec![0, 39]);
    }

    #[test]
    fn test_value_range_kinds_match_direct_interpretation() {
        assert_selects("frames[17]", "frames", vec![17]);
        assert_selects("frames[10-20]", "frames", (10..=20).collect());
        assert_selects(
            "frames[10-20@3]",
            "frames",
            (10..=20).filter(|n| (n - 10) % 3 == 0).collect(),
        );
        assert_selects("frames[10/5]", "frames", (10..15).collect());
        assert_selects("frames[^,$]", "frames", vec![0, 39]);
        assert_selects("frames[1,2,30-32]", "frames", vec![1, 2, 30, 31, 32]);
    }

    #[test]
    fn test_scaled_index_bounds_for_non_index_keyword() {
        // A keyword that carries slot metadata without being an index
        // column reconstructs the value domain inline.
        let keyword = KeywordRef {
            name: "t_rec".into(),
            data_type: KeywordType::Time,
            is_index: false,
            slot: Some(SlotInfo::new("t_rec_index", 100.0, 45.0)),
        };
        let spec = RecordSetSpec {
            series: "mag45".into(),
            filters: vec![Filter::list(RecordList::PrimeKey(PrimeKeyRangeSet {
                keyword,
                body: RangeBody::Index(vec![IndexRange::Single { start: 5 }]),
            }))],
            allvers: false,
        };
        let generated = generate(&spec);
        assert_eq!(generated.sql, "( ( t_rec=((5*45.0)+100.0) ) )");
    }

    #[test]
    fn test_string_values_quote_for_sql() {
        let catalog = MemoryCatalog::with_series(vec![SeriesSchema::new(
            "notes",
            vec![Keyword::new("tag", KeywordType::String)],
        )]);
        let out = compile(&catalog, "notes['a,b]c']").unwrap();
        assert_eq!(out.sql, "( ( tag='a,b]c' ) )");
    }

    #[test]
    fn test_empty_spec_generates_empty_fragment() {
        let out = compile(&catalog(), "frames").unwrap();
        assert_eq!(out.sql, "");
    }
}
