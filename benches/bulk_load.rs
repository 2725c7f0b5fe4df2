use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion, Throughput};

use sz_quickstart::operations::{BulkLoader, ConfigSynchronizer};
use sz_quickstart::record::DataSourceSet;
use sz_quickstart::{InMemorySenzing, SzAbstractFactory, SzFlags};

const RECORDS: usize = 1_000;

fn make_input() -> String {
    let sources = ["CUSTOMERS", "REFERENCE", "WATCHLIST"];
    (0..RECORDS)
        .map(|i| {
            format!(
                r#"{{"DATA_SOURCE":"{}","RECORD_ID":"{i}","NAME_FULL":"Person {i}","DATE_OF_BIRTH":"1/{}/1980"}}"#,
                sources[i % sources.len()],
                i % 28 + 1
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn bench_scan(c: &mut Criterion) {
    let input = make_input();
    let mut group = c.benchmark_group("scan");
    group.throughput(Throughput::Elements(RECORDS as u64));
    group.bench_function("data_sources", |b| {
        b.iter(|| {
            let mut set = DataSourceSet::new();
            set.scan_lines(input.lines());
            assert_eq!(set.len(), 3);
        });
    });
    group.finish();
}

fn bench_load(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let input = make_input();

    let mut group = c.benchmark_group("load");
    group.throughput(Throughput::Elements(RECORDS as u64));
    for (name, flags) in [("with_info", SzFlags::WITH_INFO), ("no_info", SzFlags::NONE)] {
        group.bench_function(name, |b| {
            b.iter(|| {
                runtime.block_on(async {
                    let service = Arc::new(InMemorySenzing::new());
                    let engine = service.create_engine().await.unwrap();
                    let labels: Vec<String> = DataSourceSet::from_iter(["CUSTOMERS", "REFERENCE", "WATCHLIST"])
                        .into_iter()
                        .collect();
                    ConfigSynchronizer::new(service.clone())
                        .await
                        .unwrap()
                        .synchronize(&labels, "bench")
                        .await
                        .unwrap();
                    let report = BulkLoader::new(engine)
                        .with_flags(flags)
                        .load(input.as_bytes(), |_| {})
                        .await
                        .unwrap();
                    assert_eq!(report.succeeded, RECORDS);
                });
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_scan, bench_load);
criterion_main!(benches);
