//! Benchmarks for the result cache and request preparation.

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use mathpool::cache::ResultCache;
use mathpool::equation::{ConversionResult, Equation};
use mathpool::pool::sanitize_content;
use std::sync::Arc;

/// A full cache of `capacity` display-mode equations.
fn filled_cache(capacity: usize) -> ResultCache {
    let cache = ResultCache::new(capacity);
    for i in 0..capacity {
        let eq = Equation::tex_display(format!("x_{{{i}}}^2"));
        cache.put(eq, Arc::new(ConversionResult::new("<svg/>", "<math/>")));
    }
    cache
}

fn bench_cache_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache_get");

    for size in [100, 1000].iter() {
        let cache = filled_cache(*size);

        let hit = Equation::tex_display("x_{50}^2");
        group.bench_with_input(BenchmarkId::new("hit", size), size, |b, _| {
            b.iter(|| black_box(cache.get(black_box(&hit))));
        });

        // Same content, different font: a distinct key.
        let miss = Equation::tex_display("x_{50}^2").with_font(Some("STIX-Web"));
        group.bench_with_input(BenchmarkId::new("miss", size), size, |b, _| {
            b.iter(|| black_box(cache.get(black_box(&miss))));
        });
    }

    group.finish();
}

fn bench_cache_put_evicting(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache_put");

    for size in [100, 1000].iter() {
        let cache = filled_cache(*size);
        let result = Arc::new(ConversionResult::new("<svg/>", "<math/>"));
        let mut n = 0u64;
        group.bench_with_input(BenchmarkId::new("evicting", size), size, |b, _| {
            b.iter(|| {
                n += 1;
                cache.put(Equation::tex_inline(n.to_string()), Arc::clone(&result));
            });
        });
    }

    group.finish();
}

fn bench_sanitize(c: &mut Criterion) {
    let content = "\\begin{aligned}\r\n  a &= b + c \\\\\r\n\r\n  d &= e\r\n\\end{aligned}\n".repeat(20);
    c.bench_function("sanitize_content", |b| {
        b.iter(|| black_box(sanitize_content(black_box(&content))));
    });
}

criterion_group!(
    benches,
    bench_cache_get,
    bench_cache_put_evicting,
    bench_sanitize
);
criterion_main!(benches);
