//! Benchmarks for parcel-mesh
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion};

const NODE_ID: &str = "deployment=aether.site=site-a.pod=pod-7.node=parcel-node";

fn benchmark_identifier(c: &mut Criterion) {
    use parcel_mesh::identity::Identifier;

    c.bench_function("identifier_parse", |b| {
        b.iter(|| black_box(Identifier::parse(black_box(NODE_ID)).unwrap()))
    });

    c.bench_function("identifier_render_escaped", |b| {
        let id = Identifier::new("file", "archive.2024=final.tar").unwrap();
        b.iter(|| black_box(id.render()))
    });
}

fn benchmark_parcel_json(c: &mut Criterion) {
    use chrono::Utc;
    use parcel_mesh::identity::Identifier;
    use parcel_mesh::task::{Parcel, UnitOfWork};

    let id = |s: &str| Identifier::parse(s).unwrap();
    let uow = UnitOfWork::new(id("function=ingest.hash=abc123"), id("function=ingest"))
        .with_ingress("x".repeat(256));
    let parcel = Parcel::register(
        id("wup=wup-1"),
        id("function=ingest"),
        uow,
        None,
        Utc::now(),
        chrono::Duration::seconds(60),
    );

    c.bench_function("parcel_to_json", |b| b.iter(|| black_box(parcel.to_json().unwrap())));

    let json = parcel.to_json().unwrap();
    let key = parcel.key();
    c.bench_function("parcel_from_json", |b| {
        b.iter(|| black_box(Parcel::from_json(&key, &json).unwrap()))
    });
}

criterion_group!(benches, benchmark_identifier, benchmark_parcel_json);
criterion_main!(benches);
