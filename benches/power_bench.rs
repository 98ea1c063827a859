//! Calculator and parser throughput.
//!
//! Run with: `cargo bench`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use clanstats::power::{
    total_power_full, total_power_lite, Member, Mode, MultiplierTable, Race, Roster,
};
use clanstats::stats::{format_stat, parse_stat, MemberStore};

fn roster_of(size: usize) -> Roster {
    let races = [Race::Cat, Race::Dog, Race::Frog];
    Roster::from_members(
        (0..size)
            .map(|i| Member::new(races[i % races.len()].clone(), 1_000 + i as u64 * 37, 1))
            .collect(),
    )
}

fn bench_totals(c: &mut Criterion) {
    let table = MultiplierTable::standard();
    let mut group = c.benchmark_group("power_totals");

    for size in [10usize, 100, 1_000] {
        let roster = roster_of(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("full", size), &roster, |b, roster| {
            b.iter(|| black_box(total_power_full(roster, Mode::Atk, &table)));
        });
        group.bench_with_input(BenchmarkId::new("lite", size), &roster, |b, roster| {
            b.iter(|| black_box(total_power_lite(roster, Mode::Def, 5_000_000, &table)));
        });
    }

    group.finish();
}

fn bench_magnitudes(c: &mut Criterion) {
    let inputs = ["2M", "4.1M", " 2.2 m ", "500K", "1234", "abc"];
    let mut group = c.benchmark_group("magnitude");
    group.throughput(Throughput::Elements(inputs.len() as u64));

    group.bench_function("parse_stat", |b| {
        b.iter(|| {
            for input in inputs {
                black_box(parse_stat(black_box(input)));
            }
        });
    });
    group.bench_function("format_stat", |b| {
        b.iter(|| {
            for value in [999u64, 1_500, 4_100_000] {
                black_box(format_stat(black_box(value)));
            }
        });
    });

    let mut store = MemberStore::new();
    for i in 0..500u64 {
        store
            .upsert(&format!("member-{i}"), i * 1_000, i * 2_000)
            .unwrap_or_else(|err| panic!("bench fixture: {err}"));
    }
    group.bench_function("store_totals_500", |b| {
        b.iter(|| black_box(store.totals()));
    });

    group.finish();
}

criterion_group!(benches, bench_totals, bench_magnitudes);
criterion_main!(benches);
