//! Combination search over one bucket
//!
//! This module finds the best seat-exact, pairwise-compatible, team-balanced
//! combination among the oldest entries of a bucket:
//! - subsets reaching exactly the playlist's seat count, pruned on overflow
//! - latency, input-mode and MMR-window compatibility between every pair
//! - a team split with exactly `team_size` seats per side, minimizing the skill gap
//! - tie-break on oldest join, spread, gap and average latency, in that order

use crate::config::PlaylistConfig;
use crate::queue::{MmrWindowPolicy, QueueEntry};
use crate::types::{ConnectionId, SeatIndex, Team};
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use tracing::debug;

/// A queue entry with its assigned team and seats
#[derive(Debug, Clone, PartialEq)]
pub struct SeatedEntry {
    pub entry: QueueEntry,
    pub team: Team,
    pub seats: Vec<SeatIndex>,
}

/// The best combination found in a bucket
#[derive(Debug, Clone, PartialEq)]
pub struct MatchProposal {
    /// Members ordered by their first seat
    pub members: Vec<SeatedEntry>,
    pub oldest_join: DateTime<Utc>,
    /// Highest minus lowest rating across the combination
    pub spread: f64,
    /// Absolute difference of the party-size-weighted team averages
    pub team_gap: f64,
    pub avg_latency: f64,
}

impl MatchProposal {
    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        self.members.iter().map(|m| m.entry.connection_id).collect()
    }
}

/// Best team split of a subset
#[derive(Debug, Clone, PartialEq)]
pub struct TeamPartition {
    /// Team of each subset member, same order as the input
    pub teams: Vec<Team>,
    pub gap: f64,
}

#[derive(Debug, Clone)]
struct Candidate {
    indices: Vec<usize>,
    partition: TeamPartition,
    oldest_join: DateTime<Utc>,
    spread: f64,
    avg_latency: f64,
}

impl Candidate {
    fn rank(&self, other: &Candidate) -> Ordering {
        self.oldest_join
            .cmp(&other.oldest_join)
            .then_with(|| self.spread.total_cmp(&other.spread))
            .then_with(|| self.partition.gap.total_cmp(&other.partition.gap))
            .then_with(|| self.avg_latency.total_cmp(&other.avg_latency))
    }
}

/// Finds balanced combinations for a playlist
#[derive(Debug, Clone)]
pub struct MatchFinder {
    search_window: usize,
    window: MmrWindowPolicy,
}

impl MatchFinder {
    pub fn new(search_window: usize, window: MmrWindowPolicy) -> Self {
        Self {
            search_window: search_window.max(2),
            window,
        }
    }

    /// Pairwise compatibility of two entries given their current MMR windows
    pub fn compatible(a: &QueueEntry, b: &QueueEntry, window_a: f64, window_b: f64) -> bool {
        if b.latency_ms > a.max_ping_ms || a.latency_ms > b.max_ping_ms {
            return false;
        }
        if !a.input_mode.is_compatible_with(b.input_mode) {
            return false;
        }
        (a.rating - b.rating).abs() <= window_a.min(window_b)
    }

    /// Split a subset into two teams of exactly `team_size` seats, minimizing the gap
    ///
    /// The first member is pinned to team A, so mirrored splits are not revisited.
    pub fn partition_teams(members: &[&QueueEntry], team_size: usize) -> Option<TeamPartition> {
        let count = members.len();
        if count < 2 || count > 16 {
            return None;
        }

        let mut best: Option<TeamPartition> = None;
        // bit i set => member i on team B; bit 0 always clear
        for mask in 0u32..(1 << (count - 1)) {
            let mask = mask << 1;
            let mut seats = [0usize; 2];
            let mut weighted = [0.0f64; 2];
            for (i, member) in members.iter().enumerate() {
                let side = ((mask >> i) & 1) as usize;
                seats[side] += member.party_size;
                weighted[side] += member.rating * member.party_size as f64;
            }
            if seats[0] != team_size || seats[1] != team_size {
                continue;
            }

            let gap = (weighted[0] / seats[0] as f64 - weighted[1] / seats[1] as f64).abs();
            if best.as_ref().map_or(true, |b| gap < b.gap) {
                let teams = (0..count)
                    .map(|i| {
                        if (mask >> i) & 1 == 0 {
                            Team::A
                        } else {
                            Team::B
                        }
                    })
                    .collect();
                best = Some(TeamPartition { teams, gap });
            }
        }
        best
    }

    /// Give each member its seats: per team, larger parties first, then join order
    ///
    /// Returns seat lists in input order, or `None` when a team's seats cannot be
    /// filled exactly.
    pub fn assign_seats(
        members: &[&QueueEntry],
        teams: &[Team],
        playlist: &PlaylistConfig,
    ) -> Option<Vec<Vec<SeatIndex>>> {
        if members.len() != teams.len() {
            return None;
        }

        let mut assigned = vec![Vec::new(); members.len()];
        for team in Team::ALL {
            let mut order: Vec<usize> = (0..members.len()).filter(|&i| teams[i] == team).collect();
            order.sort_by(|&x, &y| {
                members[y]
                    .party_size
                    .cmp(&members[x].party_size)
                    .then(members[x].joined_at.cmp(&members[y].joined_at))
                    .then(x.cmp(&y))
            });

            let seats = playlist.seats_for(team);
            let mut next = 0;
            for i in order {
                let size = members[i].party_size;
                if next + size > seats.len() {
                    return None;
                }
                assigned[i] = seats[next..next + size].to_vec();
                next += size;
            }
            if next != seats.len() {
                return None;
            }
        }
        Some(assigned)
    }

    /// Find the best combination among the oldest entries of a bucket
    ///
    /// `entries` must be ordered oldest join first, as a bucket keeps them.
    pub fn find_match(
        &self,
        entries: &[QueueEntry],
        playlist: &PlaylistConfig,
        now: DateTime<Utc>,
    ) -> Option<MatchProposal> {
        let pool: Vec<&QueueEntry> = entries
            .iter()
            .filter(|e| e.party_size >= 1 && e.party_size <= playlist.max_party_size)
            .take(self.search_window)
            .collect();

        let total_pool_seats: usize = pool.iter().map(|e| e.party_size).sum();
        if total_pool_seats < playlist.total_seats {
            return None;
        }

        let windows: Vec<f64> = pool
            .iter()
            .map(|e| self.window.window_since(e.joined_at, now))
            .collect();

        let n = pool.len();
        let mut compat = vec![vec![false; n]; n];
        for i in 0..n {
            for j in (i + 1)..n {
                let ok = Self::compatible(pool[i], pool[j], windows[i], windows[j]);
                compat[i][j] = ok;
                compat[j][i] = ok;
            }
        }

        let mut search = Search {
            pool: &pool,
            compat: &compat,
            playlist,
            chosen: Vec::new(),
            best: None,
            evaluated: 0,
        };
        search.descend(0, 0);

        let evaluated = search.evaluated;
        let best = search.best?;
        debug!(
            "Best of {} seat-exact subsets in {}: gap {:.1}, spread {:.1}",
            evaluated, playlist.playlist, best.partition.gap, best.spread
        );

        let members: Vec<&QueueEntry> = best.indices.iter().map(|&i| pool[i]).collect();
        let seats = Self::assign_seats(&members, &best.partition.teams, playlist)?;

        let mut seated: Vec<SeatedEntry> = members
            .iter()
            .zip(best.partition.teams.iter())
            .zip(seats)
            .map(|((entry, team), seats)| SeatedEntry {
                entry: (*entry).clone(),
                team: *team,
                seats,
            })
            .collect();
        seated.sort_by_key(|m| m.seats.first().copied().unwrap_or(usize::MAX));

        Some(MatchProposal {
            members: seated,
            oldest_join: best.oldest_join,
            spread: best.spread,
            team_gap: best.partition.gap,
            avg_latency: best.avg_latency,
        })
    }
}

struct Search<'a> {
    pool: &'a [&'a QueueEntry],
    compat: &'a [Vec<bool>],
    playlist: &'a PlaylistConfig,
    chosen: Vec<usize>,
    best: Option<Candidate>,
    evaluated: usize,
}

impl Search<'_> {
    fn descend(&mut self, start: usize, seats: usize) {
        if seats == self.playlist.total_seats {
            self.evaluate();
            return;
        }

        for i in start..self.pool.len() {
            let size = self.pool[i].party_size;
            if seats + size > self.playlist.total_seats {
                continue;
            }
            if !self.chosen.iter().all(|&c| self.compat[c][i]) {
                continue;
            }
            self.chosen.push(i);
            self.descend(i + 1, seats + size);
            self.chosen.pop();
        }
    }

    fn evaluate(&mut self) {
        self.evaluated += 1;
        let members: Vec<&QueueEntry> = self.chosen.iter().map(|&i| self.pool[i]).collect();
        let Some(partition) = MatchFinder::partition_teams(&members, self.playlist.team_size)
        else {
            return;
        };
        if MatchFinder::assign_seats(&members, &partition.teams, self.playlist).is_none() {
            return;
        }

        let oldest_join = members
            .iter()
            .map(|m| m.joined_at)
            .min()
            .unwrap_or_else(Utc::now);
        let (low, high) = members.iter().fold((f64::MAX, f64::MIN), |(lo, hi), m| {
            (lo.min(m.rating), hi.max(m.rating))
        });
        let avg_latency =
            members.iter().map(|m| m.latency_ms as f64).sum::<f64>() / members.len() as f64;

        let candidate = Candidate {
            indices: self.chosen.clone(),
            partition,
            oldest_join,
            spread: high - low,
            avg_latency,
        };

        let better = match &self.best {
            None => true,
            Some(current) => candidate.rank(current) == Ordering::Less,
        };
        if better {
            self.best = Some(candidate);
        }
    }
}
