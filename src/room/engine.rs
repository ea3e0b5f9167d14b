//! Simulation engine seam
//!
//! A room drives one engine instance per match. The engine is opaque apart from
//! [`SimulationEngine`]: it advances by a time step with per-seat input and
//! returns a serializable [`WorldSnapshot`].
//!
//! [`DrillEngine`] is a small deterministic stand-in so the service runs without
//! the full physics crate. The arena is the unit square; seat 0 defends the
//! bottom wall, seat 1 the left, seat 2 the top and seat 3 the right.

use crate::types::{Playlist, Score, SeatIndex, Team, ENGINE_SEATS};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Merged input for one tick
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickInput {
    /// Movement axis per seat, in [-1, 1]
    pub axes: [f32; ENGINE_SEATS],
    /// Seats firing this tick
    pub fires: Vec<SeatIndex>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatState {
    pub seat: SeatIndex,
    /// Paddle center along the seat's wall, in [0, 1]
    pub paddle: f32,
    pub health: u32,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BallState {
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
}

/// Complete authoritative state of one match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub tick: u64,
    pub score: Score,
    pub seats: Vec<SeatState>,
    pub balls: Vec<BallState>,
    /// Engine-specific state the core does not interpret
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub extra: serde_json::Value,
}

/// One match's physics and rules
pub trait SimulationEngine: Send {
    /// Step the world by `delta_seconds`
    fn advance(&mut self, delta_seconds: f64, input: &TickInput) -> WorldSnapshot;

    fn current_snapshot(&self) -> WorldSnapshot;

    /// Force a seat to zero health and out of play
    fn deactivate_seat(&mut self, seat: SeatIndex);
}

/// Builds engine instances for new rooms
pub trait EngineFactory: Send + Sync {
    fn create(&self, seed: u64, playlist: Playlist) -> Box<dyn SimulationEngine>;
}

/// Distance of a ball from a seat's wall
pub fn distance_to_wall(seat: SeatIndex, ball: &BallState) -> f32 {
    match seat {
        0 => ball.y,
        1 => ball.x,
        2 => 1.0 - ball.y,
        _ => 1.0 - ball.x,
    }
}

/// Position of a ball projected on a seat's wall
pub fn wall_coordinate(seat: SeatIndex, ball: &BallState) -> f32 {
    match seat {
        0 | 2 => ball.x,
        _ => ball.y,
    }
}

/// True when a ball is moving toward a seat's wall
pub fn approaching(seat: SeatIndex, ball: &BallState) -> bool {
    match seat {
        0 => ball.vy < 0.0,
        1 => ball.vx < 0.0,
        2 => ball.vy > 0.0,
        _ => ball.vx > 0.0,
    }
}

/// Team defending a wall in the drill arena
fn defending_team(seat: SeatIndex) -> Team {
    if seat < 2 {
        Team::A
    } else {
        Team::B
    }
}

const PADDLE_HALF_WIDTH: f32 = 0.12;
const PADDLE_SPEED: f32 = 1.2;
const BALL_SPEED: f32 = 0.45;
const FIRE_REACH: f32 = 0.15;
const FIRE_BOOST: f32 = 1.25;
const MAX_BALL_SPEED: f32 = 1.5;
const START_HEALTH: u32 = 3;

/// Minimal deterministic engine: paddles on four walls and one ball
pub struct DrillEngine {
    rng: StdRng,
    tick: u64,
    score: Score,
    seats: Vec<SeatState>,
    ball: BallState,
}

impl DrillEngine {
    pub fn new(seed: u64) -> Self {
        let mut engine = Self {
            rng: StdRng::seed_from_u64(seed),
            tick: 0,
            score: Score::default(),
            seats: (0..ENGINE_SEATS)
                .map(|seat| SeatState {
                    seat,
                    paddle: 0.5,
                    health: START_HEALTH,
                    active: true,
                })
                .collect(),
            ball: BallState {
                x: 0.5,
                y: 0.5,
                vx: 0.0,
                vy: 0.0,
            },
        };
        engine.serve();
        engine
    }

    fn serve(&mut self) {
        let angle: f32 = self.rng.gen_range(0.0..std::f32::consts::TAU);
        // keep away from the pure axes so every wall sees play
        let angle = angle + 0.3;
        self.ball = BallState {
            x: 0.5,
            y: 0.5,
            vx: BALL_SPEED * angle.cos(),
            vy: BALL_SPEED * angle.sin(),
        };
    }

    fn reflect(&mut self, seat: SeatIndex) {
        match seat {
            0 | 2 => self.ball.vy = -self.ball.vy,
            _ => self.ball.vx = -self.ball.vx,
        }
    }

    fn wall_hit(&self) -> Option<SeatIndex> {
        (0..ENGINE_SEATS).find(|&seat| {
            distance_to_wall(seat, &self.ball) <= 0.0 && approaching(seat, &self.ball)
        })
    }
}

impl SimulationEngine for DrillEngine {
    fn advance(&mut self, delta_seconds: f64, input: &TickInput) -> WorldSnapshot {
        let dt = delta_seconds as f32;
        self.tick += 1;

        for state in self.seats.iter_mut() {
            if !state.active {
                continue;
            }
            let axis = input.axes[state.seat].clamp(-1.0, 1.0);
            state.paddle = (state.paddle + axis * PADDLE_SPEED * dt).clamp(0.0, 1.0);
        }

        for &seat in &input.fires {
            if seat >= ENGINE_SEATS || !self.seats[seat].active {
                continue;
            }
            if distance_to_wall(seat, &self.ball) <= FIRE_REACH && !approaching(seat, &self.ball)
            {
                let speed = (self.ball.vx.hypot(self.ball.vy) * FIRE_BOOST).min(MAX_BALL_SPEED);
                let norm = self.ball.vx.hypot(self.ball.vy).max(f32::EPSILON);
                self.ball.vx = self.ball.vx / norm * speed;
                self.ball.vy = self.ball.vy / norm * speed;
            }
        }

        self.ball.x += self.ball.vx * dt;
        self.ball.y += self.ball.vy * dt;

        if let Some(seat) = self.wall_hit() {
            let (active, paddle) = (self.seats[seat].active, self.seats[seat].paddle);
            let saved = (wall_coordinate(seat, &self.ball) - paddle).abs() <= PADDLE_HALF_WIDTH;
            if !active || saved {
                self.reflect(seat);
            } else {
                match defending_team(seat).opponent() {
                    Team::A => self.score.a += 1,
                    Team::B => self.score.b += 1,
                }
                self.serve();
            }
            self.ball.x = self.ball.x.clamp(0.0, 1.0);
            self.ball.y = self.ball.y.clamp(0.0, 1.0);
        }

        self.current_snapshot()
    }

    fn current_snapshot(&self) -> WorldSnapshot {
        WorldSnapshot {
            tick: self.tick,
            score: self.score,
            seats: self.seats.clone(),
            balls: vec![self.ball.clone()],
            extra: serde_json::Value::Null,
        }
    }

    fn deactivate_seat(&mut self, seat: SeatIndex) {
        if let Some(state) = self.seats.get_mut(seat) {
            state.active = false;
            state.health = 0;
        }
    }
}

/// Factory for [`DrillEngine`]
#[derive(Debug, Default, Clone)]
pub struct DrillEngineFactory;

impl EngineFactory for DrillEngineFactory {
    fn create(&self, seed: u64, _playlist: Playlist) -> Box<dyn SimulationEngine> {
        Box::new(DrillEngine::new(seed))
    }
}

/// Engine whose score is set from outside, for tests
///
/// Every `advance` records its input so tests can inspect what the room sent.
pub struct ScriptedEngine {
    state: std::sync::Arc<std::sync::Mutex<ScriptedState>>,
}

/// Shared view into a [`ScriptedEngine`]
#[derive(Debug, Default)]
pub struct ScriptedState {
    pub tick: u64,
    pub score: Score,
    pub inactive: Vec<SeatIndex>,
    pub inputs: Vec<TickInput>,
}

impl ScriptedEngine {
    pub fn with_state() -> (Self, std::sync::Arc<std::sync::Mutex<ScriptedState>>) {
        let state = std::sync::Arc::new(std::sync::Mutex::new(ScriptedState::default()));
        (
            Self {
                state: state.clone(),
            },
            state,
        )
    }

    fn snapshot_of(state: &ScriptedState) -> WorldSnapshot {
        WorldSnapshot {
            tick: state.tick,
            score: state.score,
            seats: (0..ENGINE_SEATS)
                .map(|seat| {
                    let active = !state.inactive.contains(&seat);
                    SeatState {
                        seat,
                        paddle: 0.5,
                        health: if active { START_HEALTH } else { 0 },
                        active,
                    }
                })
                .collect(),
            balls: vec![BallState {
                x: 0.5,
                y: 0.5,
                vx: 0.0,
                vy: -0.5,
            }],
            extra: serde_json::Value::Null,
        }
    }
}

impl SimulationEngine for ScriptedEngine {
    fn advance(&mut self, _delta_seconds: f64, input: &TickInput) -> WorldSnapshot {
        match self.state.lock() {
            Ok(mut state) => {
                state.tick += 1;
                state.inputs.push(input.clone());
                Self::snapshot_of(&state)
            }
            Err(poisoned) => Self::snapshot_of(&poisoned.into_inner()),
        }
    }

    fn current_snapshot(&self) -> WorldSnapshot {
        match self.state.lock() {
            Ok(state) => Self::snapshot_of(&state),
            Err(poisoned) => Self::snapshot_of(&poisoned.into_inner()),
        }
    }

    fn deactivate_seat(&mut self, seat: SeatIndex) {
        if let Ok(mut state) = self.state.lock() {
            if !state.inactive.contains(&seat) {
                state.inactive.push(seat);
            }
        }
    }
}

/// Hands out pre-built scripted engines, keeping their shared state per room seed
#[derive(Default)]
pub struct ScriptedEngineFactory {
    created: std::sync::Mutex<Vec<(u64, std::sync::Arc<std::sync::Mutex<ScriptedState>>)>>,
}

impl ScriptedEngineFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared state of every engine created so far, oldest first
    pub fn engines(&self) -> Vec<std::sync::Arc<std::sync::Mutex<ScriptedState>>> {
        self.created
            .lock()
            .map(|c| c.iter().map(|(_, s)| s.clone()).collect())
            .unwrap_or_default()
    }

    /// Set the score of the most recently created engine
    pub fn set_latest_score(&self, score: Score) {
        if let Some(state) = self.engines().last() {
            if let Ok(mut state) = state.lock() {
                state.score = score;
            }
        }
    }
}

impl EngineFactory for ScriptedEngineFactory {
    fn create(&self, seed: u64, _playlist: Playlist) -> Box<dyn SimulationEngine> {
        let (engine, state) = ScriptedEngine::with_state();
        if let Ok(mut created) = self.created.lock() {
            created.push((seed, state));
        }
        Box::new(engine)
    }
}
