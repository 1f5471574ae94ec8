//! Authoritative match state
//!
//! [`GameInstance`] owns everything that makes up one table: ball, paddles,
//! score, phase, sessions and the rematch ready-set. All mutation happens
//! through its handlers, which run to completion and report outbound traffic
//! through a [`Broadcaster`]. Nothing here touches the network or the clock,
//! so tests drive it tick by tick.

use crate::physics::{self, Ball, Paddle, TickEvent};
use crate::session::{ClientId, SessionRegistry};
use log::{debug, info};
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::{
    BallSnapshot, GameSnapshot, Packet, PaddleSnapshot, Role, Score, Side, Sides, BASE_SPEED,
    TABLE_HEIGHT, TABLE_WIDTH, WINNING_SCORE,
};
use std::collections::HashSet;

/// Outbound side of the transport.
pub trait Broadcaster {
    /// Queues a packet for a single connection.
    fn send_to(&mut self, client_id: ClientId, packet: Packet);
    /// Queues a packet for every connection, spectators included.
    fn broadcast(&mut self, packet: Packet);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GamePhase {
    Waiting,
    Active,
    GameOver,
}

pub struct GameInstance {
    phase: GamePhase,
    score: Score,
    ball: Ball,
    paddles: Sides<Paddle>,
    sessions: SessionRegistry,
    ready: HashSet<ClientId>,
    tick: u32,
    rng: StdRng,
}

impl GameInstance {
    pub fn new() -> Self {
        Self::from_rng(StdRng::from_entropy())
    }

    /// Same as [`GameInstance::new`] but with reproducible serves.
    pub fn with_seed(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }

    fn from_rng(rng: StdRng) -> Self {
        Self {
            phase: GamePhase::Waiting,
            score: Score::default(),
            ball: Ball::centered(BASE_SPEED, BASE_SPEED),
            paddles: Sides::new(Paddle::centered(), Paddle::centered()),
            sessions: SessionRegistry::new(),
            ready: HashSet::new(),
            tick: 0,
            rng,
        }
    }

    pub fn phase(&self) -> GamePhase {
        self.phase
    }

    pub fn score(&self) -> Score {
        self.score
    }

    pub fn tick(&self) -> u32 {
        self.tick
    }

    pub fn ball(&self) -> &Ball {
        &self.ball
    }

    pub fn paddle(&self, side: Side) -> &Paddle {
        &self.paddles[side]
    }

    pub fn role(&self, client_id: ClientId) -> Option<Role> {
        self.sessions.role(client_id)
    }

    pub fn active_players(&self) -> usize {
        self.sessions.active_count()
    }

    pub fn ready_count(&self) -> usize {
        self.ready.len()
    }

    /// Registers a new connection and tells it who it is.
    pub fn join(&mut self, client_id: ClientId, out: &mut impl Broadcaster) -> Role {
        let role = self.sessions.assign(client_id);
        out.send_to(client_id, Packet::PlayerSide { side: role });
        out.send_to(client_id, Packet::ScoreUpdate { score: self.score });
        self.reevaluate_roster(out);
        role
    }

    /// Drops a connection along with any pending ready-up.
    pub fn leave(&mut self, client_id: ClientId, out: &mut impl Broadcaster) {
        self.ready.remove(&client_id);
        if let Some(role) = self.sessions.release(client_id) {
            info!("Client {} left ({:?})", client_id, role);
        }
        self.reevaluate_roster(out);
    }

    /// Moves a paddle if the sender owns that side. Returns whether it moved.
    ///
    /// `y` is the normalized top offset and must already be validated.
    pub fn move_paddle(&mut self, client_id: ClientId, side: Side, y: f32) -> bool {
        if self.sessions.role(client_id) != Some(Role::Player(side)) {
            debug!("Ignoring {:?} paddle move from client {}", side, client_id);
            return false;
        }
        self.paddles[side].y = y * TABLE_HEIGHT;
        true
    }

    /// Records a rematch request; restarts once both players agree.
    pub fn request_restart(&mut self, client_id: ClientId, out: &mut impl Broadcaster) {
        if self.phase != GamePhase::GameOver {
            debug!("Ignoring restart from client {} outside game over", client_id);
            return;
        }
        if !self.sessions.role(client_id).is_some_and(Role::is_player) {
            debug!("Ignoring restart from non-player client {}", client_id);
            return;
        }

        self.ready.insert(client_id);
        let active = self.sessions.active_count();

        if self.ready.len() == active && active == 2 {
            info!("Both players ready, restarting");
            self.paddles = Sides::new(Paddle::centered(), Paddle::centered());
            self.reevaluate_roster(out);
        } else {
            info!("Client {} is ready, waiting for opponent", client_id);
        }
    }

    /// Runs one fixed step and broadcasts the resulting snapshot.
    pub fn step(&mut self, out: &mut impl Broadcaster) {
        if self.phase == GamePhase::Active {
            if let Some(TickEvent::Scored(side)) = physics::tick(&mut self.ball, &self.paddles) {
                self.award_point(side, out);
            }
        }

        self.tick = self.tick.wrapping_add(1);
        out.broadcast(Packet::GameState {
            tick: self.tick,
            state: self.snapshot(),
        });

        if self.tick % 60 == 0 {
            debug!(
                "Tick {}: {:?}, score {}-{}, {} sessions",
                self.tick,
                self.phase,
                self.score.left,
                self.score.right,
                self.sessions.len()
            );
        }
    }

    /// The table expressed in fractions of its dimensions.
    pub fn snapshot(&self) -> GameSnapshot {
        GameSnapshot {
            ball: BallSnapshot {
                x: self.ball.x / TABLE_WIDTH,
                y: self.ball.y / TABLE_HEIGHT,
                size: self.ball.size / TABLE_WIDTH,
            },
            paddles: self.paddles.map(|paddle| PaddleSnapshot {
                y: paddle.y / TABLE_HEIGHT,
            }),
        }
    }

    fn award_point(&mut self, side: Side, out: &mut impl Broadcaster) {
        self.score[side] += 1;
        info!(
            "{:?} scores ({}-{})",
            side, self.score.left, self.score.right
        );
        out.broadcast(Packet::ScoreUpdate { score: self.score });

        if self.score[side] >= WINNING_SCORE {
            info!("Game over, {:?} wins", side);
            self.phase = GamePhase::GameOver;
            self.ready.clear();
            out.broadcast(Packet::GameOver { winner: side });
        } else {
            self.ball = Ball::serve(&mut self.rng);
        }
    }

    fn reevaluate_roster(&mut self, out: &mut impl Broadcaster) {
        self.ready.clear();

        if self.sessions.active_count() == 2 {
            info!("Both players connected, starting game");
            self.phase = GamePhase::Active;
            self.score = Score::default();
            self.ball = Ball::serve(&mut self.rng);
            out.broadcast(Packet::GameStart { score: self.score });
        } else {
            info!("Waiting for players");
            self.phase = GamePhase::Waiting;
            out.broadcast(Packet::WaitingForPlayers);
        }
    }
}

impl Default for GameInstance {
    fn default() -> Self {
        Self::new()
    }
}
