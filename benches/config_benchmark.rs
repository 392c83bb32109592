use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use magento_cloud_scd::php;
use magento_cloud_scd::snapshot::reduce;
use magento_cloud_scd::tree::{flatten, merge_at_path, ConfigTree, ConfigValue, KeyMatch, PathSpec};

const LOCALES: [&str; 5] = ["en_US", "fr_FR", "de_DE", "nl_NL", "es_ES"];

/// Build a config dump with N stores, each carrying a handful of settings
fn create_dump(stores: usize) -> ConfigTree {
    let mut tree = ConfigTree::new();
    for i in 0..stores {
        let code = format!("store{}", i);
        let locale = LOCALES[i % LOCALES.len()];
        let entries = [
            (format!("scopes/stores/{}/code", code), ConfigValue::from(code.as_str())),
            (format!("scopes/stores/{}/website_id", code), ConfigValue::from(1i64)),
            (format!("system/stores/{}/general/locale/code", code), ConfigValue::from(locale)),
            (format!("system/stores/{}/web/unsecure/base_url", code), ConfigValue::from("https://example.com/")),
            (format!("system/stores/{}/design/theme/theme_id", code), ConfigValue::from(3i64)),
        ];
        for (path, value) in entries {
            if let Ok(path) = PathSpec::parse(&path) {
                tree = merge_at_path(tree, &path, value);
            }
        }
    }
    for (i, module) in ["Magento_Store", "Magento_Theme", "Magento_Catalog"].iter().enumerate() {
        if let Ok(path) = PathSpec::parse(&format!("modules/{}", module)) {
            tree = merge_at_path(tree, &path, ConfigValue::from(i as i64));
        }
    }
    tree
}

/// Benchmark flattening and filtering of increasingly large dumps
fn bench_flatten_filter(c: &mut Criterion) {
    let mut group = c.benchmark_group("flatten_filter");

    for stores in [10, 100, 1000].iter() {
        let tree = create_dump(*stores);

        group.throughput(Throughput::Elements(*stores as u64));
        group.bench_with_input(BenchmarkId::new("flatten", stores), stores, |b, _| {
            b.iter(|| flatten(black_box(&tree)))
        });

        let flat = flatten(&tree);
        group.bench_with_input(BenchmarkId::new("filter_locales", stores), stores, |b, _| {
            b.iter(|| black_box(&flat).filter("general/locale/code", KeyMatch::Suffix).len())
        });
    }

    group.finish();
}

/// Benchmark the full dump reduction
fn bench_reduce(c: &mut Criterion) {
    let mut group = c.benchmark_group("reduce");
    let admin_locales = vec!["de_DE".to_string(), "ja_JP".to_string()];

    for stores in [10, 100, 1000].iter() {
        let tree = create_dump(*stores);

        group.throughput(Throughput::Elements(*stores as u64));
        group.bench_with_input(BenchmarkId::from_parameter(stores), stores, |b, _| {
            b.iter(|| reduce(black_box(&tree), black_box(&admin_locales)).unwrap())
        });
    }

    group.finish();
}

/// Benchmark reading and writing config.php
fn bench_php_roundtrip(c: &mut Criterion) {
    let source = php::render(&create_dump(200));

    c.bench_function("php_parse_200_stores", |b| {
        b.iter(|| php::parse(black_box(&source)).unwrap())
    });

    let tree = create_dump(200);
    c.bench_function("php_render_200_stores", |b| b.iter(|| php::render(black_box(&tree))));
}

criterion_group!(benches, bench_flatten_filter, bench_reduce, bench_php_roundtrip);
criterion_main!(benches);
