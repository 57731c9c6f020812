//! # lastirc Performance Benchmarks
//!
//! Benchmarks for the pieces that run on every chat message.
//!
//! ## Benchmark Categories
//!
//! - **Algorithm**: Mainstream scoring and friend ranking
//! - **Routing**: Matching text against the command table
//! - **Identity store**: Association writes and lookups
//!
//! ## Running Benchmarks
//!
//! ```bash
//! cargo bench
//! cargo bench algorithm
//! ```

use chrono::{Duration, Utc};
use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use std::collections::HashSet;
use std::hint::black_box;
use tempfile::TempDir;

use lastirc::db::IdentityStore;
use lastirc::models::{TopArtist, Track};
use lastirc::{algorithm, format, router};

fn create_top_artists(count: usize) -> Vec<TopArtist> {
    (0..count)
        .map(|i| TopArtist {
            name: format!("Artist {i}"),
            playcount: (i as u64 % 97) + 1,
        })
        .collect()
}

/// Every third artist charts.
fn create_chart(count: usize) -> HashSet<String> {
    (0..count).step_by(3).map(|i| format!("Artist {i}")).collect()
}

fn benchmark_algorithm(c: &mut Criterion) {
    let mut group = c.benchmark_group("algorithm");

    let chart = create_chart(1000);
    for size in [10, 50, 200, 1000].iter() {
        let artists = create_top_artists(*size);

        group.bench_with_input(BenchmarkId::new("hipster_score", size), &artists, |b, artists| {
            b.iter(|| algorithm::hipster_score(black_box(artists), black_box(&chart)))
        });
    }

    let scores: Vec<(String, f64)> = (0..500)
        .map(|i| (format!("friend{i}"), f64::from(i % 101) / 100.0))
        .collect();

    group.bench_function("best_friend_500", |b| {
        b.iter(|| algorithm::best_friend(black_box(&scores)))
    });

    group.bench_function("battle_winner_500", |b| {
        b.iter(|| algorithm::battle_winner(black_box(&scores)))
    });

    group.finish();
}

fn benchmark_routing(c: &mut Criterion) {
    let mut group = c.benchmark_group("routing");

    let inputs = [
        ("first_row", "assoc? bob"),
        ("middle_row", "hipster -7day rj"),
        ("last_row", "help toptrack"),
        ("no_match", "this is just someone talking"),
    ];

    for (name, text) in inputs.iter() {
        group.bench_with_input(BenchmarkId::new("parse_command", name), text, |b, text| {
            b.iter(|| router::parse_command(black_box(text)))
        });
    }

    let now = Utc::now();
    let track = Track {
        artist: "Low".to_string(),
        name: "Sunflower".to_string(),
        album: Some("Things We Lost in the Fire".to_string()),
        now_playing: false,
        played_at: Some(now - Duration::hours(5)),
    };
    group.bench_function("format_track", |b| {
        b.iter(|| format::format_track(black_box(&track), black_box(now)))
    });

    group.finish();
}

fn benchmark_identity_store(c: &mut Criterion) {
    let mut group = c.benchmark_group("identity_store");

    group.bench_function("open_and_associate", |b| {
        b.iter_batched(
            || TempDir::new().expect("Failed to create temp directory"),
            |temp_dir| {
                let mut store =
                    IdentityStore::open(&temp_dir.path().join("bench.db")).expect("Failed to open store");
                store.set("alice", "rj").expect("Failed to associate");
                black_box(store)
            },
            BatchSize::SmallInput,
        )
    });

    let mut store = IdentityStore::open_in_memory().expect("Failed to open store");
    for i in 0..1000 {
        store
            .set(&format!("nick{i}"), &format!("user{i}"))
            .expect("Failed to associate");
    }

    group.bench_function("resolve_associated", |b| {
        b.iter(|| store.resolve(black_box("nick500"), None).expect("Failed to resolve"))
    });

    group.bench_function("resolve_unassociated", |b| {
        b.iter(|| store.resolve(black_box("stranger"), None).expect("Failed to resolve"))
    });

    group.finish();
}

criterion_group!(
    benches,
    benchmark_algorithm,
    benchmark_routing,
    benchmark_identity_store
);

criterion_main!(benches);
