//! Post-match rating settlement
//!
//! Team ratings are party-size-weighted averages of their members. One Elo delta
//! is computed for team A, team B receives its negation, then each member gets
//! its own abandon penalty and the floor/ceiling clamp.

use crate::config::RatingConfig;
use crate::error::{MatchmakingError, Result};
use crate::rating::calculator::{EloRatingCalculator, RatingCalculator};
use crate::types::{MatchResult, PlayerId, RatingChange, SeatIndex, Team};
use std::sync::Arc;
use tracing::debug;

/// One room member as seen by the settlement
#[derive(Debug, Clone, PartialEq)]
pub struct SettlementMember {
    pub player_id: PlayerId,
    pub nickname: String,
    pub team: Team,
    pub seats: Vec<SeatIndex>,
    pub party_size: usize,
    pub rating: f64,
    pub abandoned: bool,
    pub reconnect_count: u32,
}

/// Computes rating changes once per finished room
pub struct RatingService {
    config: RatingConfig,
    calculator: Arc<dyn RatingCalculator>,
}

impl RatingService {
    pub fn new(config: RatingConfig) -> Result<Self> {
        config.validate()?;
        let calculator = Arc::new(EloRatingCalculator::new(config.k_factor));
        Ok(Self { config, calculator })
    }

    /// Use a custom calculator (tests, alternative systems)
    pub fn with_calculator(config: RatingConfig, calculator: Arc<dyn RatingCalculator>) -> Self {
        Self { config, calculator }
    }

    pub fn config(&self) -> &RatingConfig {
        &self.config
    }

    /// Party-size-weighted average rating of one team
    pub fn team_rating(members: &[SettlementMember], team: Team) -> Option<f64> {
        let (weighted, weight) = members
            .iter()
            .filter(|m| m.team == team)
            .fold((0.0, 0usize), |(sum, w), m| {
                (sum + m.rating * m.party_size as f64, w + m.party_size)
            });
        if weight == 0 {
            None
        } else {
            Some(weighted / weight as f64)
        }
    }

    /// Compute every member's rating change for a finished match
    pub fn settle(
        &self,
        members: &[SettlementMember],
        winner: Option<Team>,
    ) -> Result<Vec<RatingChange>> {
        let rating_a = Self::team_rating(members, Team::A).ok_or_else(|| {
            MatchmakingError::RatingCalculationFailed {
                reason: "team A has no members".to_string(),
            }
        })?;
        let rating_b = Self::team_rating(members, Team::B).ok_or_else(|| {
            MatchmakingError::RatingCalculationFailed {
                reason: "team B has no members".to_string(),
            }
        })?;

        let delta_a =
            self.calculator
                .team_delta(rating_a, rating_b, MatchResult::for_team(Team::A, winner));

        debug!(
            "Settling match: team A {:.1} vs team B {:.1}, winner {:?}, team delta {:.2}",
            rating_a, rating_b, winner, delta_a
        );

        let changes = members
            .iter()
            .map(|member| {
                let team_delta = match member.team {
                    Team::A => delta_a,
                    Team::B => -delta_a,
                };
                let penalty = if member.abandoned {
                    self.config.abandon_penalty
                } else {
                    0.0
                };
                let rating_after = self.config.clamp(member.rating + team_delta - penalty);

                RatingChange {
                    player_id: member.player_id.clone(),
                    nickname: member.nickname.clone(),
                    rating_before: member.rating,
                    rating_after,
                    delta: rating_after - member.rating,
                    result: MatchResult::for_team(member.team, winner),
                    abandoned: member.abandoned,
                    reconnect_count: member.reconnect_count,
                    team: member.team,
                    seats: member.seats.clone(),
                    party_size: member.party_size,
                }
            })
            .collect();

        Ok(changes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(id: &str, team: Team, rating: f64, party_size: usize) -> SettlementMember {
        SettlementMember {
            player_id: id.to_string(),
            nickname: id.to_string(),
            team,
            seats: vec![],
            party_size,
            rating,
            abandoned: false,
            reconnect_count: 0,
        }
    }

    fn service() -> RatingService {
        RatingService::new(RatingConfig::default()).unwrap()
    }

    #[test]
    fn test_equal_ratings_decisive_win_is_symmetric() {
        let members = vec![
            member("a", Team::A, 1000.0, 1),
            member("b", Team::B, 1000.0, 1),
        ];
        let changes = service().settle(&members, Some(Team::A)).unwrap();

        assert!(changes[0].delta > 0.0);
        assert_eq!(changes[1].delta, -changes[0].delta);
        assert_eq!(changes[0].result, MatchResult::Win);
        assert_eq!(changes[1].result, MatchResult::Loss);
    }

    #[test]
    fn test_equal_ratings_draw_is_zero() {
        let members = vec![
            member("a", Team::A, 1000.0, 1),
            member("b", Team::B, 1000.0, 1),
        ];
        let changes = service().settle(&members, None).unwrap();
        assert!(changes.iter().all(|c| c.delta == 0.0));
        assert!(changes.iter().all(|c| c.result == MatchResult::Draw));
    }

    #[test]
    fn test_abandon_penalty_applies_only_to_abandoner() {
        let mut leaver = member("b", Team::B, 1000.0, 1);
        leaver.abandoned = true;
        let members = vec![member("a", Team::A, 1000.0, 1), leaver];

        let changes = service().settle(&members, Some(Team::A)).unwrap();
        assert!((changes[0].delta - 16.0).abs() < 1e-9);
        assert!((changes[1].delta + 16.0 + 15.0).abs() < 1e-9);
        assert!(changes[1].abandoned);
    }

    #[test]
    fn test_team_rating_weighted_by_party_size() {
        let members = vec![
            member("duo", Team::A, 1200.0, 2),
            member("solo", Team::A, 900.0, 1),
            member("x", Team::B, 1000.0, 1),
        ];
        let rating = RatingService::team_rating(&members, Team::A).unwrap();
        assert!((rating - 1100.0).abs() < 1e-9);
    }

    #[test]
    fn test_ratings_clamped_to_floor() {
        let mut loser = member("b", Team::B, 105.0, 1);
        loser.abandoned = true;
        let members = vec![member("a", Team::A, 105.0, 1), loser];
        let changes = service().settle(&members, Some(Team::A)).unwrap();
        assert_eq!(changes[1].rating_after, 100.0);
        assert_eq!(changes[1].delta, -5.0);
    }

    #[test]
    fn test_missing_team_is_an_error() {
        let members = vec![member("a", Team::A, 1000.0, 1)];
        assert!(service().settle(&members, Some(Team::A)).is_err());
    }
}
