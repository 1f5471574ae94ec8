//! # Pong Server Library
//!
//! Authoritative server for a two-player paddle-and-ball game. The server owns
//! the canonical table, runs the ball simulation at a fixed tick, decides
//! scoring and match phases, and broadcasts a normalized snapshot to every
//! connected client each tick.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Simulation
//! Clients only ever send paddle positions and rematch requests. Ball motion,
//! collisions and scoring are computed here and nowhere else.
//!
//! ### Roster and Match Phases
//! The first two connections play (left, then right); everyone after that
//! watches. A match starts as soon as both sides are taken, ends when a side
//! reaches the winning score, and restarts when both players ready up. Losing
//! a player at any point drops the table back to waiting.
//!
//! ### State Broadcasting
//! Every tick, whatever the phase, a snapshot scaled to `[0, 1]` is sent to
//! everyone so idle clients still render a consistent table.
//!
//! ## Architecture Design
//!
//! ### Single-Threaded Event Loop
//! One loop owns the [`game::GameInstance`] and processes inbound packets and
//! tick events one at a time, each to completion. No state is shared with the
//! network tasks except the connection table, so the game needs no locking.
//!
//! ### UDP-Based Communication
//! Clients talk to the server over UDP with bincode-encoded
//! [`shared::Packet`]s. Connection liveness is tracked with heartbeats and a
//! timeout sweep.
//!
//! ## Module Organization
//!
//! - `session`: role assignment per connection
//! - `physics`: one-step ball movement, wall bounces, paddle deflection
//! - `game`: match phases, scoring, ready-up and snapshots
//! - `client_manager`: socket address bookkeeping and timeouts
//! - `network`: socket tasks and the main loop
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::Server;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = Server::new(
//!         "127.0.0.1:3000",
//!         Duration::from_millis(16),
//!         32,
//!         Duration::from_secs(5),
//!     )
//!     .await?;
//!
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod client_manager;
pub mod game;
pub mod network;
pub mod physics;
pub mod session;
