//! Lookup Pipeline Benchmarks
//!
//! Benchmarks for the per-entity work done after a store hit:
//! - Key template resolution
//! - JSON parsing of stored values
//! - Summary tag extraction
//! - A full batch over the in-memory store

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use kvlookup::store::memory::MemoryConnector;
use kvlookup::{parse, resolve_key, summarize, ConnectionConfig, Entity, Lookup, LookupOptions, ParsedValue};

const RECORD: &str = r#"{
    "org": {"name": "Google LLC", "asn": 15169},
    "country": "US",
    "ports": [53, 443, 853],
    "tags": ["dns", "anycast"],
    "score": 0.12
}"#;

fn bench_resolve_key(c: &mut Criterion) {
    c.bench_function("resolve_key_identity", |b| {
        b.iter(|| resolve_key(black_box("8.8.8.8"), black_box("{{entity}}")));
    });

    c.bench_function("resolve_key_template", |b| {
        b.iter(|| resolve_key(black_box("8.8.8.8"), black_box("threat:{{ENTITY}}:ip")));
    });
}

fn bench_parse(c: &mut Criterion) {
    c.bench_function("parse_structured", |b| {
        b.iter(|| parse(black_box(RECORD), true));
    });

    c.bench_function("parse_invalid", |b| {
        b.iter(|| parse(black_box("not json at all"), true));
    });
}

fn bench_summarize(c: &mut Criterion) {
    let parsed = parse(RECORD, true);
    let spec = "Org:org.name, ASN:org.asn, country, First Port:ports[0], tags.1, missing.path";
    c.bench_function("summarize_structured", |b| {
        b.iter(|| summarize(black_box(&parsed), black_box(spec)));
    });

    let text = ParsedValue::Plain("a long plain text value that will be truncated".to_string());
    c.bench_function("summarize_text", |b| {
        b.iter(|| summarize(black_box(&text), ""));
    });
}

fn bench_batch(c: &mut Criterion) {
    let connector = MemoryConnector::new();
    let entities: Vec<Entity> = (0..100).map(|i| Entity::new(format!("10.0.0.{i}"))).collect();
    for entity in &entities {
        connector.insert(0, format!("ip:{}", entity.value), RECORD);
    }
    let options = LookupOptions::new(ConnectionConfig::new("memory", 6379))
        .with_key_template("ip:{{entity}}")
        .with_summary_tags("Org:org.name, country");

    let runtime = tokio::runtime::Runtime::new().unwrap();
    let mut lookup = Lookup::new(connector);

    c.bench_function("batch_100_entities", |b| {
        b.iter(|| runtime.block_on(lookup.lookup_all(black_box(&entities), black_box(&options))));
    });
}

criterion_group!(benches, bench_resolve_key, bench_parse, bench_summarize, bench_batch);
criterion_main!(benches);
