//! Integration tests for the arena-room service
//!
//! These tests drive a complete arena core through its public operations:
//! - Queueing, match search and ready checks
//! - Room lifecycle, end conditions and rating settlement
//! - Reconnection with rotating tokens and the grace window
//! - Persistence of match results and shutdown

mod fixtures;

use arena_room::protocol::{ClientEvent, ServerEvent};
use arena_room::types::{BucketKey, EndReason, Playlist, RatingChange, Score, Team};
use fixtures::{TestArena, REGION};

fn change_for<'a>(changes: &'a [RatingChange], player_id: &str) -> &'a RatingChange {
    changes
        .iter()
        .find(|c| c.player_id == player_id)
        .unwrap_or_else(|| panic!("no rating change for {}", player_id))
}

fn ended(event: &ServerEvent) -> (EndReason, Option<Team>, Score, Vec<RatingChange>) {
    match event {
        ServerEvent::MatchEnded {
            reason,
            winner_team,
            score,
            rating_changes,
        } => (*reason, *winner_team, *score, rating_changes.clone()),
        other => panic!("expected match-ended, got {:?}", other),
    }
}

#[tokio::test]
async fn test_duel_pairs_two_solos_on_opposite_teams() {
    let mut arena = TestArena::new();
    let (a, b, match_id) = arena.start_duel(("Ace", 1000.0), ("Bo", 1000.0)).await;

    let grant_a = arena.seat_grant(a.0);
    let grant_b = arena.seat_grant(b.0);
    assert_eq!(grant_a.room_id, match_id);
    assert_eq!(grant_b.room_id, match_id);
    assert_eq!(grant_a.seats, vec![0]);
    assert_eq!(grant_b.seats, vec![2]);
    assert_ne!(grant_a.reconnect_token, grant_b.reconnect_token);

    let room = arena.core.rooms().room(match_id).expect("room is live");
    assert_eq!(room.playlist(), Playlist::Duel);
    assert!(room.is_inactive(1));
    assert!(room.is_inactive(3));
    let teams: Vec<Team> = room.members().iter().map(|m| m.team).collect();
    assert_eq!(teams, vec![Team::A, Team::B]);
}

#[tokio::test]
async fn test_doubles_solos_team_up_against_duo() {
    let mut arena = TestArena::new();
    let (s1, i1) = arena.connect_new("Solo1", 1000.0).await;
    let (s2, i2) = arena.connect_new("Solo2", 1000.0).await;
    let (duo, i3) = arena.connect_new("Duo", 1200.0).await;
    arena.join(s1, Playlist::Doubles, 1);
    arena.join(s2, Playlist::Doubles, 1);
    arena.join(duo, Playlist::Doubles, 2);

    assert_eq!(arena.core.scan(arena.now), 1);

    let roster = match arena.notifier.kinds_for(s1, "ready-check").last() {
        Some(ServerEvent::ReadyCheck { roster, .. }) => roster.clone(),
        other => panic!("expected ready-check, got {:?}", other),
    };
    let entry = |id: &str| {
        roster
            .iter()
            .find(|r| r.player_id == id)
            .cloned()
            .expect("member in roster")
    };
    let (r1, r2, r3) = (
        entry(i1.player.id.as_str()),
        entry(i2.player.id.as_str()),
        entry(i3.player.id.as_str()),
    );

    assert_eq!(r1.team, r2.team);
    assert_ne!(r1.team, r3.team);
    assert_eq!(r1.seats, vec![0]);
    assert_eq!(r2.seats, vec![1]);
    assert_eq!(r3.seats, vec![2, 3]);

    let mut seats: Vec<_> = roster.iter().flat_map(|r| r.seats.clone()).collect();
    seats.sort_unstable();
    assert_eq!(seats, vec![0, 1, 2, 3]);
}

#[tokio::test]
async fn test_score_limit_ends_match_and_persists_ratings() {
    let mut arena = TestArena::new();
    let (a, b, room_id) = arena.start_duel(("Ace", 1000.0), ("Bo", 1000.0)).await;

    arena.engines.set_latest_score(Score::new(7, 0));
    assert_eq!(arena.tick(), 1);
    assert!(arena.core.rooms().room(room_id).is_none());

    let endings = arena.match_endings(a.0);
    assert_eq!(endings.len(), 1);
    let (reason, winner, score, changes) = ended(&endings[0]);
    assert_eq!(reason, EndReason::ScoreLimit);
    assert_eq!(winner, Some(Team::A));
    assert_eq!(score, Score::new(7, 0));

    let winner_change = change_for(&changes, &a.1.player.id);
    let loser_change = change_for(&changes, &b.1.player.id);
    assert!(winner_change.delta > 0.0);
    assert_eq!(loser_change.delta, -winner_change.delta);
    assert_eq!(arena.match_endings(b.0).len(), 1);

    assert_eq!(arena.flush_jobs().await, 1);
    let records = arena.store.match_records().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id, room_id);
    assert_eq!(records[0].winner_team, Some(Team::A));

    let stored = arena.store.player(&a.1.player.id).unwrap().unwrap();
    assert_eq!(stored.rating, winner_change.rating_after);
    assert_eq!(stored.stats.wins, 1);
    assert_eq!(stored.stats.games, 1);
}

#[tokio::test]
async fn test_two_end_triggers_settle_once() {
    let mut arena = TestArena::new();
    let (a, _, _) = arena.start_duel(("Ace", 1000.0), ("Bo", 1000.0)).await;

    // score limit and time limit both hold on the same tick
    arena.engines.set_latest_score(Score::new(7, 2));
    arena.advance(301);
    assert_eq!(arena.tick(), 1);
    assert_eq!(arena.tick(), 0);

    let endings = arena.match_endings(a.0);
    assert_eq!(endings.len(), 1);
    assert_eq!(ended(&endings[0]).0, EndReason::ScoreLimit);
    assert_eq!(arena.flush_jobs().await, 1);
    assert_eq!(arena.store.match_records().unwrap().len(), 1);
    assert_eq!(arena.core.stats().matches_ended, 1);
}

#[tokio::test]
async fn test_expired_ready_check_requeues_acceptor_ahead_of_new_arrivals() {
    let mut arena = TestArena::new();
    let (a, _) = arena.connect_new("Ace", 1000.0).await;
    let (b, _) = arena.connect_new("Bo", 1000.0).await;
    arena.join(a, Playlist::Duel, 1);
    arena.join(b, Playlist::Duel, 1);
    arena.core.scan(arena.now);

    let match_id = arena.ready_check_id(a);
    arena.respond(a, match_id, true);

    arena.advance(16);
    arena.core.scan(arena.now);
    assert_eq!(arena.core.ready_checks().pending_count(), 0);
    assert_eq!(arena.notifier.kinds_for(b, "ready-cancelled").len(), 1);
    assert!(!arena.core.queue().is_queued(b));

    let (c, _) = arena.connect_new("Cy", 1000.0).await;
    arena.join(c, Playlist::Duel, 1);

    let key = BucketKey::new(Playlist::Duel, REGION);
    let entries = arena.core.queue().bucket_entries(&key);
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].connection_id, a);
    assert_eq!(entries[1].connection_id, c);
    assert!(entries[0].joined_at < entries[1].joined_at);
}

#[tokio::test]
async fn test_latency_above_tolerance_blocks_match() {
    let mut arena = TestArena::new();
    let (a, _) = arena.connect_new("Ace", 1000.0).await;
    let (b, _) = arena.connect_new("Bo", 1000.0).await;

    // b measures 200 ms; a only accepts 50 ms
    let sent_at = arena.now.timestamp_millis() - 200;
    arena
        .core
        .handle(b, ClientEvent::LatencyProbeResponse { sent_at }, arena.now);
    assert_eq!(arena.core.session(b).unwrap().latency_ms, 200);

    arena.core.handle(
        a,
        ClientEvent::JoinQueue {
            nickname: None,
            party_size: Some(1),
            playlist: Some(Playlist::Duel),
            region: Some(REGION.to_string()),
            input_mode: None,
            max_ping_ms: Some(50),
        },
        arena.now,
    );
    arena.join(b, Playlist::Duel, 1);

    assert_eq!(arena.core.scan(arena.now), 0);
    assert!(arena.core.queue().is_queued(a));
    assert!(arena.core.queue().is_queued(b));
}

#[tokio::test]
async fn test_reconnect_within_grace_rotates_token() {
    let mut arena = TestArena::new();
    let (a, b, room_id) = arena.start_duel(("Ace", 1000.0), ("Bo", 1000.0)).await;
    let original = arena.seat_grant(a.0);

    arena.core.disconnect(a.0, arena.now);
    assert!(arena
        .notifier
        .kinds_for(b.0, "presence")
        .contains(&ServerEvent::Presence {
            seats: vec![0],
            connected: false,
        }));

    arena.advance(10);
    let rejoined = arena
        .reconnect(&a.1, Some((room_id, original.reconnect_token.clone())))
        .await;
    let grant = arena.seat_grant(rejoined);
    assert_eq!(arena.notifier.kinds_for(rejoined, "match-rejoined").len(), 1);
    assert_eq!(grant.room_id, room_id);
    assert_eq!(grant.seats, vec![0]);
    assert_ne!(grant.reconnect_token, original.reconnect_token);
    assert!(arena
        .notifier
        .kinds_for(b.0, "presence")
        .contains(&ServerEvent::Presence {
            seats: vec![0],
            connected: true,
        }));

    let room = arena.core.rooms().room(room_id).unwrap();
    assert_eq!(room.members()[0].reconnect_count, 1);
    assert_eq!(arena.core.stats().reconnects_accepted, 1);

    // the spent token no longer works
    let replay = arena
        .reconnect(&a.1, Some((room_id, original.reconnect_token)))
        .await;
    assert_eq!(
        arena.notifier.kinds_for(replay, "server-notice"),
        vec![ServerEvent::notice(
            "Reconnect token is not valid for this match"
        )]
    );
}

#[tokio::test]
async fn test_reconnect_after_grace_is_rejected() {
    let mut arena = TestArena::new();
    let (a, _, room_id) = arena.start_duel(("Ace", 1000.0), ("Bo", 1000.0)).await;
    let token = arena.seat_grant(a.0).reconnect_token;

    arena.core.disconnect(a.0, arena.now);
    arena.advance(31);
    let late = arena.reconnect(&a.1, Some((room_id, token))).await;

    assert_eq!(
        arena.notifier.kinds_for(late, "server-notice"),
        vec![ServerEvent::notice(
            "The reconnect window for this match has closed"
        )]
    );
    assert!(arena.notifier.kinds_for(late, "match-rejoined").is_empty());
    assert_eq!(arena.core.stats().reconnects_rejected, 1);
}

#[tokio::test]
async fn test_token_is_bound_to_its_room() {
    let mut arena = TestArena::new();
    let (a, _, _) = arena.start_duel(("Ace", 1000.0), ("Bo", 1000.0)).await;
    let (_, _, other_room) = arena.start_duel(("Cy", 1000.0), ("Di", 1000.0)).await;
    let token = arena.seat_grant(a.0).reconnect_token;

    let wrong = arena.reconnect(&a.1, Some((other_room, token))).await;
    assert_eq!(
        arena.notifier.kinds_for(wrong, "server-notice"),
        vec![ServerEvent::notice(
            "Reconnect token is not valid for this match"
        )]
    );
}

#[tokio::test]
async fn test_leaving_match_forfeits_to_opponent() {
    let mut arena = TestArena::new();
    let (a, b, room_id) = arena.start_duel(("Ace", 1000.0), ("Bo", 1000.0)).await;

    arena.core.handle(a.0, ClientEvent::LeaveMatch, arena.now);
    assert_eq!(
        arena.notifier.kinds_for(b.0, "player-left"),
        vec![ServerEvent::PlayerLeft {
            seats: vec![0],
            reason: "left".to_string(),
        }]
    );
    let room = arena.core.rooms().room(room_id).unwrap();
    assert!(room.members()[0].reconnect_token.is_none());

    assert_eq!(arena.tick(), 1);
    let endings = arena.match_endings(b.0);
    assert_eq!(endings.len(), 1);
    let (reason, winner, _, changes) = ended(&endings[0]);
    assert_eq!(reason, EndReason::Abandoned);
    assert_eq!(winner, Some(Team::B));

    let leaver = change_for(&changes, &a.1.player.id);
    let stayer = change_for(&changes, &b.1.player.id);
    assert!(leaver.abandoned);
    assert!(!stayer.abandoned);
    assert!(stayer.delta > 0.0);
    assert!(leaver.delta < -stayer.delta);

    // a left player may queue again
    arena.join(a.0, Playlist::Duel, 1);
    assert!(arena.core.queue().is_queued(a.0));
}

#[tokio::test]
async fn test_snapshots_carry_increasing_sequence() {
    let mut arena = TestArena::new();
    let (a, _, room_id) = arena.start_duel(("Ace", 1000.0), ("Bo", 1000.0)).await;

    for _ in 0..12 {
        arena.tick();
    }

    let sequences: Vec<u64> = arena
        .notifier
        .kinds_for(a.0, "world-snapshot")
        .into_iter()
        .map(|event| match event {
            ServerEvent::WorldSnapshot {
                room_id: id,
                sequence,
                ..
            } => {
                assert_eq!(id, room_id);
                sequence
            }
            other => panic!("expected world-snapshot, got {:?}", other),
        })
        .collect();

    assert!(sequences.len() >= 2);
    assert!(sequences.windows(2).all(|w| w[0] < w[1]));
}

#[tokio::test]
async fn test_shutdown_settles_live_rooms() {
    let mut arena = TestArena::new();
    let (a, b, room_id) = arena.start_duel(("Ace", 1000.0), ("Bo", 1000.0)).await;
    let (c, _) = arena.connect_new("Cy", 1000.0).await;
    arena.join(c, Playlist::Doubles, 1);

    assert_eq!(arena.core.shutdown(arena.now), 1);

    for conn in [a.0, b.0] {
        let endings = arena.match_endings(conn);
        assert_eq!(endings.len(), 1);
        assert_eq!(ended(&endings[0]).0, EndReason::ServerShutdown);
    }
    assert!(!arena.core.queue().is_queued(c));
    assert_eq!(arena.notifier.kinds_for(c, "server-notice").len(), 1);

    assert_eq!(arena.flush_jobs().await, 1);
    let records = arena.store.match_records().unwrap();
    assert_eq!(records[0].id, room_id);
    assert_eq!(records[0].end_reason, EndReason::ServerShutdown);
}

#[tokio::test]
async fn test_returning_player_gets_settled_rating() {
    let mut arena = TestArena::new();
    let (a, _, _) = arena.start_duel(("Ace", 1000.0), ("Bo", 1000.0)).await;
    arena.engines.set_latest_score(Score::new(7, 1));
    arena.tick();

    let settled = arena.core.session(a.0).unwrap().rating;
    assert!(settled > 1000.0);
    arena.flush_jobs().await;

    arena.core.disconnect(a.0, arena.now);
    let again = arena.reconnect(&a.1, None).await;
    match arena.notifier.kinds_for(again, "identity").last() {
        Some(ServerEvent::Identity {
            player_id,
            rating,
            stats,
            ..
        }) => {
            assert_eq!(player_id, &a.1.player.id);
            assert_eq!(*rating, settled);
            assert_eq!(stats.wins, 1);
        }
        other => panic!("expected identity, got {:?}", other),
    }
}

#[tokio::test]
async fn test_oversized_party_is_clamped_with_notice() {
    let mut arena = TestArena::new();
    let (a, _) = arena.connect_new("Ace", 1000.0).await;
    arena.join(a, Playlist::Duel, 2);

    let notices = arena.notifier.kinds_for(a, "server-notice");
    assert_eq!(notices.len(), 1);
    match &notices[0] {
        ServerEvent::ServerNotice { message } => assert!(message.contains("queued as 1")),
        other => panic!("expected notice, got {:?}", other),
    }
    let key = BucketKey::new(Playlist::Duel, REGION);
    assert_eq!(arena.core.queue().bucket_entries(&key)[0].party_size, 1);
    assert_eq!(arena.notifier.kinds_for(a, "queued").len(), 1);
}
