//! Static playlist layouts
//!
//! Every engine instance carries [`ENGINE_SEATS`] seats. A playlist decides how
//! many of them are in play, which team owns which seat, and how large a party
//! may be.

use crate::error::{MatchmakingError, Result};
use crate::types::{Playlist, SeatIndex, Team, ENGINE_SEATS};

/// Seat layout and party limits for one playlist
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaylistConfig {
    pub playlist: Playlist,
    /// Seats per team
    pub team_size: usize,
    /// Seats in play for the whole match
    pub total_seats: usize,
    /// Seat indices owned by team A and team B, in fill order
    pub team_seats: [&'static [SeatIndex]; 2],
    /// Largest party allowed to queue
    pub max_party_size: usize,
}

static DOUBLES: PlaylistConfig = PlaylistConfig {
    playlist: Playlist::Doubles,
    team_size: 2,
    total_seats: 4,
    team_seats: [&[0, 1], &[2, 3]],
    max_party_size: 2,
};

static DUEL: PlaylistConfig = PlaylistConfig {
    playlist: Playlist::Duel,
    team_size: 1,
    total_seats: 2,
    team_seats: [&[0], &[2]],
    max_party_size: 1,
};

impl PlaylistConfig {
    /// Layout for a playlist
    pub fn get(playlist: Playlist) -> &'static PlaylistConfig {
        match playlist {
            Playlist::Doubles => &DOUBLES,
            Playlist::Duel => &DUEL,
        }
    }

    pub fn seats_for(&self, team: Team) -> &'static [SeatIndex] {
        self.team_seats[team.index()]
    }

    /// Team owning a seat, `None` for seats outside the playlist
    pub fn team_of_seat(&self, seat: SeatIndex) -> Option<Team> {
        Team::ALL
            .into_iter()
            .find(|team| self.seats_for(*team).contains(&seat))
    }

    /// All seats in play, team A first
    pub fn active_seats(&self) -> Vec<SeatIndex> {
        self.team_seats.iter().flat_map(|s| s.iter().copied()).collect()
    }

    /// Engine seats this playlist never uses
    pub fn inactive_seats(&self) -> Vec<SeatIndex> {
        (0..ENGINE_SEATS)
            .filter(|seat| self.team_of_seat(*seat).is_none())
            .collect()
    }

    /// Check the seat layout
    pub fn validate(&self) -> Result<()> {
        if self.team_size * 2 != self.total_seats {
            return Err(MatchmakingError::ConfigurationError {
                message: format!(
                    "{}: team size {} does not fill {} seats",
                    self.playlist, self.team_size, self.total_seats
                ),
            }
            .into());
        }

        if self.max_party_size == 0 || self.max_party_size > self.team_size {
            return Err(MatchmakingError::ConfigurationError {
                message: format!(
                    "{}: max party size must be between 1 and {}",
                    self.playlist, self.team_size
                ),
            }
            .into());
        }

        let mut seen = [false; ENGINE_SEATS];
        for team in Team::ALL {
            let seats = self.seats_for(team);
            if seats.len() != self.team_size {
                return Err(MatchmakingError::ConfigurationError {
                    message: format!(
                        "{}: team {} has {} seats, expected {}",
                        self.playlist,
                        team,
                        seats.len(),
                        self.team_size
                    ),
                }
                .into());
            }
            for &seat in seats {
                if seat >= ENGINE_SEATS || seen[seat] {
                    return Err(MatchmakingError::ConfigurationError {
                        message: format!("{}: seat {} is invalid or shared", self.playlist, seat),
                    }
                    .into());
                }
                seen[seat] = true;
            }
        }

        Ok(())
    }
}
