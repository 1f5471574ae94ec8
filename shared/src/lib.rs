use serde::{Deserialize, Serialize};
use std::ops::{Index, IndexMut};
use thiserror::Error;

pub const TABLE_WIDTH: f32 = 800.0;
pub const TABLE_HEIGHT: f32 = 600.0;
pub const PADDLE_WIDTH: f32 = 20.0;
pub const PADDLE_HEIGHT: f32 = 100.0;
pub const BALL_SIZE: f32 = 15.0;
pub const BASE_SPEED: f32 = 5.0;
pub const SPEED_MULTIPLIER: f32 = 1.05;
pub const WINNING_SCORE: u32 = 7;
pub const TICK_INTERVAL_MS: u64 = 16;
pub const PROTOCOL_VERSION: u32 = 1;

/// One of the two playing sides of the table.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::Left, Side::Right];

    pub fn opponent(self) -> Side {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }
}

/// What a connected session is allowed to do.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Player(Side),
    Spectator,
}

impl Role {
    pub fn side(self) -> Option<Side> {
        match self {
            Role::Player(side) => Some(side),
            Role::Spectator => None,
        }
    }

    pub fn is_player(self) -> bool {
        matches!(self, Role::Player(_))
    }
}

/// A value held once per side, indexed directly by [`Side`].
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq)]
pub struct Sides<T> {
    pub left: T,
    pub right: T,
}

impl<T> Sides<T> {
    pub fn new(left: T, right: T) -> Self {
        Self { left, right }
    }

    pub fn map<U>(&self, mut f: impl FnMut(&T) -> U) -> Sides<U> {
        Sides {
            left: f(&self.left),
            right: f(&self.right),
        }
    }
}

impl<T> Index<Side> for Sides<T> {
    type Output = T;

    fn index(&self, side: Side) -> &T {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }
}

impl<T> IndexMut<Side> for Sides<T> {
    fn index_mut(&mut self, side: Side) -> &mut T {
        match side {
            Side::Left => &mut self.left,
            Side::Right => &mut self.right,
        }
    }
}

pub type Score = Sides<u32>;

/// Ball position and size as fractions of the table dimensions.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct BallSnapshot {
    pub x: f32,
    pub y: f32,
    pub size: f32,
}

/// Paddle top offset as a fraction of the table height.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct PaddleSnapshot {
    pub y: f32,
}

/// Resolution independent view of the table sent every tick.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct GameSnapshot {
    pub ball: BallSnapshot,
    pub paddles: Sides<PaddleSnapshot>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Packet {
    Connect {
        client_version: u32,
    },
    MovePaddle {
        side: Side,
        y: f32,
    },
    RestartGame,
    Heartbeat,
    Disconnect,

    Connected {
        client_id: u32,
    },
    PlayerSide {
        side: Role,
    },
    ScoreUpdate {
        score: Score,
    },
    WaitingForPlayers,
    GameStart {
        score: Score,
    },
    GameOver {
        winner: Side,
    },
    GameState {
        tick: u32,
        state: GameSnapshot,
    },
    Disconnected {
        reason: String,
    },
}

#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    #[error("paddle coordinate is not a finite number")]
    NonFiniteCoordinate,
    #[error("paddle coordinate {0} outside [0, 1]")]
    CoordinateOutOfRange(f32),
}

impl Packet {
    /// Rejects payloads the game must never see.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        if let Packet::MovePaddle { y, .. } = self {
            if !y.is_finite() {
                return Err(ProtocolError::NonFiniteCoordinate);
            }
            if !(0.0..=1.0).contains(y) {
                return Err(ProtocolError::CoordinateOutOfRange(*y));
            }
        }
        Ok(())
    }

    pub fn encode(&self) -> bincode::Result<Vec<u8>> {
        bincode::serialize(self)
    }

    pub fn decode(bytes: &[u8]) -> bincode::Result<Packet> {
        bincode::deserialize(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_sides_indexing() {
        let mut score = Score::default();
        score[Side::Right] += 1;
        score[Side::Right] += 1;
        score[Side::Left] += 1;

        assert_eq!(score.left, 1);
        assert_eq!(score.right, 2);
        assert_eq!(score[Side::Right], 2);
    }

    #[test]
    fn test_sides_map() {
        let offsets = Sides::new(300.0_f32, 150.0_f32);
        let normalized = offsets.map(|y| y / TABLE_HEIGHT);

        assert_approx_eq!(normalized.left, 0.5);
        assert_approx_eq!(normalized.right, 0.25);
    }

    #[test]
    fn test_side_opponent() {
        assert_eq!(Side::Left.opponent(), Side::Right);
        assert_eq!(Side::Right.opponent(), Side::Left);
    }

    #[test]
    fn test_role_side() {
        assert_eq!(Role::Player(Side::Left).side(), Some(Side::Left));
        assert_eq!(Role::Spectator.side(), None);
        assert!(Role::Player(Side::Right).is_player());
        assert!(!Role::Spectator.is_player());
    }

    #[test]
    fn test_validate_accepts_range_bounds() {
        for y in [0.0, 0.5, 1.0] {
            let packet = Packet::MovePaddle { side: Side::Left, y };
            assert!(packet.validate().is_ok());
        }
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let packet = Packet::MovePaddle {
            side: Side::Right,
            y: 1.5,
        };
        assert_eq!(
            packet.validate(),
            Err(ProtocolError::CoordinateOutOfRange(1.5))
        );

        let packet = Packet::MovePaddle {
            side: Side::Right,
            y: -0.1,
        };
        assert!(packet.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_nan() {
        let packet = Packet::MovePaddle {
            side: Side::Left,
            y: f32::NAN,
        };
        assert_eq!(packet.validate(), Err(ProtocolError::NonFiniteCoordinate));
    }

    #[test]
    fn test_validate_ignores_other_packets() {
        assert!(Packet::RestartGame.validate().is_ok());
        assert!(Packet::Connect { client_version: 7 }.validate().is_ok());
    }

    #[test]
    fn test_packet_serialization_game_state() {
        let state = GameSnapshot {
            ball: BallSnapshot {
                x: 0.5,
                y: 0.5,
                size: BALL_SIZE / TABLE_WIDTH,
            },
            paddles: Sides::new(PaddleSnapshot { y: 0.1 }, PaddleSnapshot { y: 0.9 }),
        };
        let packet = Packet::GameState { tick: 42, state };

        let bytes = packet.encode().unwrap();
        match Packet::decode(&bytes).unwrap() {
            Packet::GameState { tick, state } => {
                assert_eq!(tick, 42);
                assert_approx_eq!(state.ball.size, 0.01875);
                assert_approx_eq!(state.paddles[Side::Right].y, 0.9);
            }
            _ => panic!("Wrong packet type after deserialization"),
        }
    }

    #[test]
    fn test_packet_serialization_player_side() {
        let packet = Packet::PlayerSide {
            side: Role::Spectator,
        };
        let bytes = packet.encode().unwrap();
        assert_eq!(Packet::decode(&bytes).unwrap(), packet);
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(Packet::decode(&[0xff, 0xff, 0xff, 0xff, 0xff]).is_err());
    }
}
