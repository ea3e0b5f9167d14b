//! Performance benchmarks for match search and rating settlement

use arena_room::config::{MmrWindowConfig, PlaylistConfig, RatingConfig};
use arena_room::matching::MatchFinder;
use arena_room::queue::{MmrWindowPolicy, QueueEntry};
use arena_room::rating::{RatingService, SettlementMember};
use arena_room::types::{InputMode, Playlist, Team};
use chrono::{DateTime, Duration, Utc};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use uuid::Uuid;

fn entry(index: usize, party_size: usize, rating: f64, joined_at: DateTime<Utc>) -> QueueEntry {
    QueueEntry {
        connection_id: Uuid::new_v4(),
        party_id: format!("player_{}", index),
        nickname: format!("Player {}", index),
        party_size,
        rating,
        region: "eu".to_string(),
        playlist: Playlist::Doubles,
        input_mode: if index % 3 == 0 {
            InputMode::Gamepad
        } else {
            InputMode::Any
        },
        max_ping_ms: 150,
        latency_ms: 20 + (index as u32 * 7) % 90,
        joined_at,
        enqueued_at: joined_at,
    }
}

/// A bucket of mixed solos and duos spread over a wide rating range
fn bucket(size: usize, now: DateTime<Utc>) -> Vec<QueueEntry> {
    (0..size)
        .map(|i| {
            let party_size = if i % 4 == 0 { 2 } else { 1 };
            let rating = 800.0 + ((i * 137) % 900) as f64;
            entry(i, party_size, rating, now - Duration::seconds((size - i) as i64))
        })
        .collect()
}

fn finder() -> MatchFinder {
    let policy = MmrWindowPolicy::new(MmrWindowConfig::default()).unwrap();
    MatchFinder::new(12, policy)
}

fn bench_find_match(c: &mut Criterion) {
    let now = Utc::now();
    let finder = finder();
    let playlist = PlaylistConfig::get(Playlist::Doubles);

    for size in [4, 8, 12, 24] {
        let entries = bucket(size, now);
        c.bench_function(&format!("find_match_doubles_{}_entries", size), |b| {
            b.iter(|| black_box(finder.find_match(black_box(&entries), playlist, now)))
        });
    }
}

fn bench_find_match_no_solution(c: &mut Criterion) {
    let now = Utc::now();
    let finder = finder();
    let playlist = PlaylistConfig::get(Playlist::Doubles);

    // ratings far apart so every subset is rejected on skill
    let entries: Vec<QueueEntry> = (0..12)
        .map(|i| entry(i, 1, 500.0 + i as f64 * 400.0, now))
        .collect();

    c.bench_function("find_match_doubles_exhaustive_miss", |b| {
        b.iter(|| black_box(finder.find_match(black_box(&entries), playlist, now)))
    });
}

fn bench_rating_settlement(c: &mut Criterion) {
    let service = RatingService::new(RatingConfig::default()).unwrap();
    let members: Vec<SettlementMember> = (0..4)
        .map(|i| SettlementMember {
            player_id: format!("player_{}", i),
            nickname: format!("Player {}", i),
            team: if i < 2 { Team::A } else { Team::B },
            seats: vec![i],
            party_size: 1,
            rating: 1000.0 + i as f64 * 50.0,
            abandoned: i == 3,
            reconnect_count: 0,
        })
        .collect();

    c.bench_function("rating_settlement_4_players", |b| {
        b.iter(|| black_box(service.settle(black_box(&members), Some(Team::A))))
    });
}

criterion_group!(
    benches,
    bench_find_match,
    bench_find_match_no_solution,
    bench_rating_settlement
);
criterion_main!(benches);
