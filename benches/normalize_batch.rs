use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use crate_evolve::catalog::{flatten, rebuild};
use crate_evolve::config::ConflictStrategy;
use crate_evolve::ddl::diff_statements;
use crate_evolve::normalize::Normalizer;
use crate_evolve::schema::SchemaType;
use crate_evolve::value::Value;

fn generate_events(count: usize) -> Vec<Value> {
    (0..count)
        .map(|i| {
            let id = if i % 17 == 0 {
                Value::from(format!("ext-{i}"))
            } else {
                Value::Integer(i as i64)
            };
            let status = match i % 3 {
                0 => "shipped",
                1 => "pending",
                _ => "processing",
            };
            let items: Vec<Value> = (0..(i % 4))
                .map(|n| {
                    Value::object([
                        ("sku", Value::from(format!("sku-{n}"))),
                        ("qty", Value::Integer(n as i64 + 1)),
                    ])
                })
                .collect();
            let mut fields = vec![
                ("id", id),
                ("status", Value::from(status)),
                ("amount", Value::Float(i as f64 * 1.25)),
                ("items", Value::Array(items)),
            ];
            if i % 5 == 0 {
                fields.push(("meta", Value::object([("source", Value::from("replica"))])));
            }
            Value::object(fields)
        })
        .collect()
}

fn bench_normalize_batch(c: &mut Criterion) {
    let events = generate_events(5_000);
    let mut group = c.benchmark_group("normalize_batch");

    for strategy in [ConflictStrategy::SuffixAndFragment, ConflictStrategy::PreserveAsFragment] {
        let normalizer = Normalizer::new(strategy);
        group.bench_function(strategy.as_str(), |b| {
            b.iter_batched(
                SchemaType::empty_object,
                |schema| {
                    normalizer
                        .normalize_batch(&schema, &events)
                        .expect("normalize events")
                },
                BatchSize::SmallInput,
            );
        });
    }

    let (learned, _) = Normalizer::default()
        .normalize_batch(&SchemaType::empty_object(), &events)
        .expect("learn schema");
    group.bench_function("catalog_round_trip", |b| {
        b.iter(|| rebuild(&flatten(&learned).expect("flatten")).expect("rebuild"));
    });
    group.bench_function("ddl_from_empty", |b| {
        b.iter(|| diff_statements(&SchemaType::empty_object(), &learned, "events").expect("diff"));
    });

    group.finish();
}

criterion_group!(benches, bench_normalize_batch);
criterion_main!(benches);
