//! Rating calculator trait and implementations
//!
//! This module defines the interface for two-team rating calculations and
//! provides an Elo implementation backed by the skillratings crate.

use crate::types::MatchResult;
use skillratings::elo::{elo, expected_score, EloConfig, EloRating};
use skillratings::Outcomes;

/// Trait for calculating the team-level rating delta of a finished match
pub trait RatingCalculator: Send + Sync {
    /// Probability that a team rated `team_rating` beats `opponent_rating`
    fn expected_score(&self, team_rating: f64, opponent_rating: f64) -> f64;

    /// Signed rating delta for the team whose result is `result`
    ///
    /// The opposing team's delta is always the exact negation.
    fn team_delta(&self, team_rating: f64, opponent_rating: f64, result: MatchResult) -> f64;
}

/// Elo calculator with a fixed K-factor
#[derive(Debug, Clone)]
pub struct EloRatingCalculator {
    config: EloConfig,
}

impl EloRatingCalculator {
    pub fn new(k_factor: f64) -> Self {
        Self {
            config: EloConfig { k: k_factor },
        }
    }

    pub fn k_factor(&self) -> f64 {
        self.config.k
    }
}

impl Default for EloRatingCalculator {
    fn default() -> Self {
        Self::new(32.0)
    }
}

fn outcome_of(result: MatchResult) -> Outcomes {
    match result {
        MatchResult::Win => Outcomes::WIN,
        MatchResult::Loss => Outcomes::LOSS,
        MatchResult::Draw => Outcomes::DRAW,
    }
}

impl RatingCalculator for EloRatingCalculator {
    fn expected_score(&self, team_rating: f64, opponent_rating: f64) -> f64 {
        let (expected, _) = expected_score(
            &EloRating {
                rating: team_rating,
            },
            &EloRating {
                rating: opponent_rating,
            },
        );
        expected
    }

    fn team_delta(&self, team_rating: f64, opponent_rating: f64, result: MatchResult) -> f64 {
        let team = EloRating {
            rating: team_rating,
        };
        let opponent = EloRating {
            rating: opponent_rating,
        };
        let (updated, _) = elo(&team, &opponent, &outcome_of(result), &self.config);
        updated.rating - team_rating
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expected_score_equal_ratings() {
        let calculator = EloRatingCalculator::default();
        let expected = calculator.expected_score(1000.0, 1000.0);
        assert!((expected - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_expected_score_favors_higher_rating() {
        let calculator = EloRatingCalculator::default();
        assert!(calculator.expected_score(1400.0, 1000.0) > 0.9);
        assert!(calculator.expected_score(1000.0, 1400.0) < 0.1);
    }

    #[test]
    fn test_even_win_is_half_k() {
        let calculator = EloRatingCalculator::new(32.0);
        let delta = calculator.team_delta(1000.0, 1000.0, MatchResult::Win);
        assert!((delta - 16.0).abs() < 1e-9);
        let loss = calculator.team_delta(1000.0, 1000.0, MatchResult::Loss);
        assert!((loss + 16.0).abs() < 1e-9);
    }

    #[test]
    fn test_even_draw_is_zero() {
        let calculator = EloRatingCalculator::default();
        let delta = calculator.team_delta(1000.0, 1000.0, MatchResult::Draw);
        assert!(delta.abs() < 1e-9);
    }

    #[test]
    fn test_upset_moves_more() {
        let calculator = EloRatingCalculator::default();
        let upset = calculator.team_delta(1000.0, 1300.0, MatchResult::Win);
        let expected_win = calculator.team_delta(1300.0, 1000.0, MatchResult::Win);
        assert!(upset > expected_win);
    }
}
