//! Benchmarks for the record-set compiler
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use recset::{compile, Keyword, KeywordType, MemoryCatalog, SeriesSchema};

fn bench_catalog() -> MemoryCatalog {
    MemoryCatalog::with_series(vec![SeriesSchema::new(
        "obs.mag_45s",
        vec![
            Keyword::new("t_rec", KeywordType::Time).slotted("t_rec_index", 1388534400.0, 45.0),
            Keyword::new("camera", KeywordType::Int),
            Keyword::new("wavelength", KeywordType::Float),
        ],
    )])
}

fn bench_compile(c: &mut Criterion) {
    let catalog = bench_catalog();

    let mut group = c.benchmark_group("compile");

    let queries = [
        ("positional_int", "obs.mag_45s[][2]"),
        ("recnum_stride", "obs.mag_45s[#1000-200000@16]"),
        (
            "time_range",
            "obs.mag_45s[2014.01.01_00:00:00_UTC-2014.01.02_00:00:00_UTC@90s]",
        ),
        (
            "mixed",
            "obs.mag_45s[? quality >= 0 ?][1388534400/5d@1d][camera=1][#^]",
        ),
        (
            "many_ranges",
            "obs.mag_45s[:#1,#5,#10-20@2,#100/50,#-,#^,#$][2014.01.01_12:00_UTC][wavelength=171.0]",
        ),
    ];

    for (label, query) in queries {
        group.throughput(Throughput::Bytes(query.len() as u64));
        group.bench_function(label, |b| {
            b.iter(|| compile(&catalog, black_box(query)).unwrap())
        });
    }

    group.finish();
}

criterion_group!(benches, bench_compile);
criterion_main!(benches);
