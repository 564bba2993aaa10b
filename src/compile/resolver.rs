//! Slotted-keyword resolution
//!
//! A slotted keyword quantizes a continuous value axis into integer slots:
//! `index = round((value - base) / step)`. Queries are written in the value
//! domain but the database stores only the slot number, so every
//! value-domain range over a slotted keyword is rewritten here into an
//! index-domain range over the companion index keyword before SQL
//! generation. First/last markers pass through untouched — they select
//! extrema of the index column directly.

use crate::compile::ast::{IndexRange, KeywordRef, PrimeKeyRangeSet, RangeBody, ValueRange};
use crate::compile::error::{Advisory, CompileError, CompileResult};
use crate::schema::{Keyword, KeywordType, SlotInfo};

/// Relative tolerance for deciding a stride is a whole number of slots
const STRIDE_TOLERANCE: f64 = 1e-11;

/// Parsed range body before resolution
#[derive(Debug)]
pub(crate) enum RangeInput {
    Index(Vec<IndexRange>),
    Value(Vec<ValueRange>),
}

/// Bind a parsed range body to its keyword, rewriting slotted keywords into
/// the index domain
pub(crate) fn resolve(
    keyword: &Keyword,
    input: RangeInput,
    warnings: &mut Vec<Advisory>,
) -> CompileResult<PrimeKeyRangeSet> {
    let Some(slot) = keyword.slot.as_ref().filter(|_| !keyword.is_index) else {
        // Plain keyword: body is used as written.
        let body = match input {
            RangeInput::Index(set) => RangeBody::Index(set),
            RangeInput::Value(set) => RangeBody::Value(set),
        };
        return Ok(PrimeKeyRangeSet {
            keyword: KeywordRef::from(keyword),
            body,
        });
    };

    let body = match input {
        // '#' ranges are already slot numbers.
        RangeInput::Index(set) => RangeBody::Index(set),
        RangeInput::Value(set) => {
            RangeBody::Index(convert_set(keyword, slot, set, warnings)?)
        }
    };

    Ok(PrimeKeyRangeSet {
        keyword: KeywordRef {
            name: slot.index_keyword.clone(),
            data_type: KeywordType::Int,
            is_index: true,
            slot: Some(slot.clone()),
        },
        body,
    })
}

fn convert_set(
    keyword: &Keyword,
    slot: &SlotInfo,
    set: Vec<ValueRange>,
    warnings: &mut Vec<Advisory>,
) -> CompileResult<Vec<IndexRange>> {
    let base = slot.base.ok_or_else(|| {
        CompileError::SlotResolution(format!("keyword '{}' has no slot base", keyword.name))
    })?;
    let step = slot.step.filter(|s| s.is_finite() && *s != 0.0).ok_or_else(|| {
        CompileError::SlotResolution(format!(
            "keyword '{}' has no usable slot step",
            keyword.name
        ))
    })?;

    set.into_iter()
        .map(|range| convert_range(keyword, base, step, range, warnings))
        .collect()
}

fn convert_range(
    keyword: &Keyword,
    base: f64,
    step: f64,
    range: ValueRange,
    warnings: &mut Vec<Advisory>,
) -> CompileResult<IndexRange> {
    let to_index = |value: &crate::compile::ast::Value| -> CompileResult<i64> {
        let value = value.as_f64().ok_or_else(|| {
            CompileError::Type(format!(
                "slotted keyword '{}' takes numeric values",
                keyword.name
            ))
        })?;
        Ok(((value - base) / step).round() as i64)
    };

    Ok(match range {
        ValueRange::Single { start } => IndexRange::Single {
            start: to_index(&start)?,
        },
        ValueRange::StartEnd { start, end, skip } => IndexRange::StartEnd {
            start: to_index(&start)?,
            end: to_index(&end)?,
            skip: skip.map(|s| convert_stride(keyword, step, s, warnings)),
        },
        ValueRange::StartDuration {
            start,
            duration,
            skip,
        } => IndexRange::StartCount {
            start: to_index(&start)?,
            count: (duration / step).round() as i64,
            skip: skip.map(|s| convert_stride(keyword, step, s, warnings)),
        },
        ValueRange::First => IndexRange::First,
        ValueRange::Last => IndexRange::Last,
    })
}

/// Convert a value-domain stride to slots, with advisories when it is not
/// an exact multiple of the step or smaller than one slot
fn convert_stride(
    keyword: &Keyword,
    step: f64,
    stride: f64,
    warnings: &mut Vec<Advisory>,
) -> i64 {
    let quotient = stride / step;
    let rounded = quotient.round();
    if (quotient - rounded).abs() > STRIDE_TOLERANCE * quotient.abs().max(1.0) {
        tracing::debug!(
            "stride {} on '{}' rounds to {} slots",
            stride,
            keyword.name,
            rounded
        );
        warnings.push(Advisory::new(
            &keyword.name,
            format!(
                "stride {stride} is not a whole number of slots (step {step}); using {rounded}"
            ),
        ));
    }
    if (rounded as i64) < 1 {
        warnings.push(Advisory::new(
            &keyword.name,
            format!("stride {stride} is smaller than one slot (step {step}); using 1"),
        ));
        return 1;
    }
    rounded as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::ast::Value;

    fn slotted() -> Keyword {
        Keyword::new("t_rec", KeywordType::Time).slotted("t_rec_index", 1000.0, 45.0)
    }

    fn resolve_values(
        keyword: &Keyword,
        set: Vec<ValueRange>,
    ) -> (PrimeKeyRangeSet, Vec<Advisory>) {
        let mut warnings = Vec::new();
        let set = resolve(keyword, RangeInput::Value(set), &mut warnings).unwrap();
        (set, warnings)
    }

    #[test]
    fn test_plain_keyword_passes_through() {
        let keyword = Keyword::new("camera", KeywordType::Int);
        let (set, warnings) = resolve_values(
            &keyword,
            vec![ValueRange::Single {
                start: Value::Int(2),
            }],
        );
        assert_eq!(set.keyword.name, "camera");
        assert!(!set.keyword.is_index);
        assert!(matches!(set.body, RangeBody::Value(_)));
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_bounds_round_to_nearest_slot() {
        let (set, _) = resolve_values(
            &slotted(),
            vec![ValueRange::StartEnd {
                start: Value::Time(1000.0),
                end: Value::Time(1000.0 + 86400.0),
                skip: None,
            }],
        );
        assert_eq!(set.keyword.name, "t_rec_index");
        assert!(set.keyword.is_index);
        let RangeBody::Index(ranges) = &set.body else {
            panic!("expected index body");
        };
        assert_eq!(
            ranges[0],
            IndexRange::StartEnd {
                start: 0,
                end: 1920,
                skip: None
            }
        );
    }

    #[test]
    fn test_exact_stride_converts_silently() {
        let (set, warnings) = resolve_values(
            &slotted(),
            vec![ValueRange::StartEnd {
                start: Value::Time(1000.0),
                end: Value::Time(1900.0),
                skip: Some(90.0),
            }],
        );
        assert!(warnings.is_empty());
        let RangeBody::Index(ranges) = &set.body else {
            panic!("expected index body");
        };
        assert_eq!(
            ranges[0],
            IndexRange::StartEnd {
                start: 0,
                end: 20,
                skip: Some(2)
            }
        );
    }

    #[test]
    fn test_inexact_stride_warns_and_rounds() {
        let (_, warnings) = resolve_values(
            &slotted(),
            vec![ValueRange::StartEnd {
                start: Value::Time(1000.0),
                end: Value::Time(1900.0),
                skip: Some(100.0),
            }],
        );
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].keyword, "t_rec");
    }

    #[test]
    fn test_sub_slot_stride_clamped() {
        let mut warnings = Vec::new();
        let stride = convert_stride(&slotted(), 45.0, 10.0, &mut warnings);
        assert_eq!(stride, 1);
        assert!(!warnings.is_empty());
    }

    #[test]
    fn test_first_last_pass_through() {
        let (set, warnings) =
            resolve_values(&slotted(), vec![ValueRange::First, ValueRange::Last]);
        assert!(warnings.is_empty());
        let RangeBody::Index(ranges) = &set.body else {
            panic!("expected index body");
        };
        assert_eq!(ranges, &[IndexRange::First, IndexRange::Last]);
    }

    #[test]
    fn test_missing_base_is_slot_resolution_error() {
        let mut keyword = slotted();
        keyword.slot.as_mut().unwrap().base = None;
        let mut warnings = Vec::new();
        let err = resolve(
            &keyword,
            RangeInput::Value(vec![ValueRange::Single {
                start: Value::Time(1000.0),
            }]),
            &mut warnings,
        )
        .unwrap_err();
        assert!(matches!(err, CompileError::SlotResolution(_)), "{err:?}");
    }

    #[test]
    fn test_index_body_rewrites_keyword_only() {
        let mut keyword = slotted();
        // Even with incomplete slot metadata, '#' ranges need no conversion.
        keyword.slot.as_mut().unwrap().step = None;
        let mut warnings = Vec::new();
        let set = resolve(
            &keyword,
            RangeInput::Index(vec![IndexRange::Single { start: 5 }]),
            &mut warnings,
        )
        .unwrap();
        assert_eq!(set.keyword.name, "t_rec_index");
        assert!(set.keyword.is_index);
    }
}
