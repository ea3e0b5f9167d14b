//! Bot backfill for seats without a connected owner

use crate::room::engine::{approaching, distance_to_wall, wall_coordinate, WorldSnapshot};
use crate::types::SeatIndex;

/// Input a bot wants for one seat this tick
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BotCommand {
    pub axis: f32,
    pub fire: bool,
}

/// Steers one seat from the latest world state
pub trait BotPilot: Send {
    fn steer(&mut self, seat: SeatIndex, snapshot: &WorldSnapshot) -> BotCommand;
}

/// Follows the nearest inbound ball along its wall and fires when it is close
///
/// Fire cooldown is enforced by the room, not here.
#[derive(Debug, Clone)]
pub struct HeuristicPilot {
    /// Paddle offset treated as aligned
    dead_zone: f32,
    /// Distance from the wall at which the bot fires
    fire_range: f32,
}

impl Default for HeuristicPilot {
    fn default() -> Self {
        Self {
            dead_zone: 0.02,
            fire_range: 0.1,
        }
    }
}

impl HeuristicPilot {
    pub fn new(dead_zone: f32, fire_range: f32) -> Self {
        Self {
            dead_zone,
            fire_range,
        }
    }
}

impl BotPilot for HeuristicPilot {
    fn steer(&mut self, seat: SeatIndex, snapshot: &WorldSnapshot) -> BotCommand {
        let Some(state) = snapshot.seats.iter().find(|s| s.seat == seat) else {
            return BotCommand::default();
        };
        if !state.active {
            return BotCommand::default();
        }

        let target = snapshot
            .balls
            .iter()
            .filter(|ball| approaching(seat, ball))
            .min_by(|a, b| distance_to_wall(seat, a).total_cmp(&distance_to_wall(seat, b)));

        let Some(ball) = target else {
            // drift back to the middle
            let offset = 0.5 - state.paddle;
            return BotCommand {
                axis: if offset.abs() <= self.dead_zone {
                    0.0
                } else {
                    offset.signum()
                },
                fire: false,
            };
        };

        let offset = wall_coordinate(seat, ball) - state.paddle;
        let axis = if offset.abs() <= self.dead_zone {
            0.0
        } else {
            (offset * 10.0).clamp(-1.0, 1.0)
        };

        BotCommand {
            axis,
            fire: distance_to_wall(seat, ball) <= self.fire_range,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::room::engine::{BallState, SeatState};
    use crate::types::Score;

    fn snapshot(paddle: f32, ball: BallState) -> WorldSnapshot {
        WorldSnapshot {
            tick: 1,
            score: Score::default(),
            seats: (0..4)
                .map(|seat| SeatState {
                    seat,
                    paddle,
                    health: 3,
                    active: seat != 3,
                })
                .collect(),
            balls: vec![ball],
            extra: serde_json::Value::Null,
        }
    }

    #[test]
    fn test_tracks_inbound_ball() {
        let mut pilot = HeuristicPilot::default();
        let snap = snapshot(
            0.5,
            BallState {
                x: 0.9,
                y: 0.5,
                vx: 0.0,
                vy: -0.4,
            },
        );
        let command = pilot.steer(0, &snap);
        assert!(command.axis > 0.0);
        assert!(!command.fire);
    }

    #[test]
    fn test_fires_when_ball_is_close() {
        let mut pilot = HeuristicPilot::default();
        let snap = snapshot(
            0.3,
            BallState {
                x: 0.3,
                y: 0.05,
                vx: 0.0,
                vy: -0.4,
            },
        );
        let command = pilot.steer(0, &snap);
        assert_eq!(command.axis, 0.0);
        assert!(command.fire);
    }

    #[test]
    fn test_returns_to_center_when_ball_leaves() {
        let mut pilot = HeuristicPilot::default();
        let snap = snapshot(
            0.1,
            BallState {
                x: 0.5,
                y: 0.5,
                vx: 0.0,
                vy: 0.4,
            },
        );
        assert_eq!(pilot.steer(0, &snap).axis, 1.0);
    }

    #[test]
    fn test_inactive_seat_stays_idle() {
        let mut pilot = HeuristicPilot::default();
        let snap = snapshot(
            0.1,
            BallState {
                x: 0.95,
                y: 0.5,
                vx: 0.4,
                vy: 0.0,
            },
        );
        assert_eq!(pilot.steer(3, &snap), BotCommand::default());
    }
}
