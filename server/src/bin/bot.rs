//! Headless client that plays by following the ball.
//!
//! Useful for soak testing a server without a graphical client: start two
//! bots and they will play matches against each other indefinitely, readying
//! up after every game over.

use clap::Parser;
use log::{debug, info, warn};
use shared::{
    GameSnapshot, Packet, Role, BALL_SIZE, PADDLE_HEIGHT, PROTOCOL_VERSION, TABLE_HEIGHT,
};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::interval;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:3000")]
    server: String,

    /// Largest paddle move per state update, as a fraction of table height
    #[arg(short = 'r', long, default_value = "0.012")]
    reaction: f32,

    /// Milliseconds between heartbeats
    #[arg(long, default_value = "1000", value_parser = clap::value_parser!(u64).range(1..))]
    heartbeat_ms: u64,
}

/// Next paddle top offset when chasing the ball, limited to `reaction` per call.
fn steer(paddle_y: f32, state: &GameSnapshot, reaction: f32) -> f32 {
    let paddle_height = PADDLE_HEIGHT / TABLE_HEIGHT;
    let ball_center = state.ball.y + BALL_SIZE / TABLE_HEIGHT / 2.0;
    let target = (ball_center - paddle_height / 2.0).clamp(0.0, 1.0 - paddle_height);

    paddle_y + (target - paddle_y).clamp(-reaction, reaction)
}

async fn send(socket: &UdpSocket, packet: &Packet) -> Result<(), Box<dyn std::error::Error>> {
    socket.send(&packet.encode()?).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Args::parse();
    let server_addr: SocketAddr = args.server.parse()?;

    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    socket.connect(server_addr).await?;
    info!("Bot bound to {}, joining {}", socket.local_addr()?, server_addr);

    send(
        &socket,
        &Packet::Connect {
            client_version: PROTOCOL_VERSION,
        },
    )
    .await?;

    let mut role = Role::Spectator;
    let mut paddle_y = 0.5 - PADDLE_HEIGHT / TABLE_HEIGHT / 2.0;
    let mut heartbeat = interval(Duration::from_millis(args.heartbeat_ms));
    let mut buf = [0u8; 2048];

    loop {
        tokio::select! {
            received = socket.recv(&mut buf) => {
                let len = received?;
                let packet = match Packet::decode(&buf[..len]) {
                    Ok(packet) => packet,
                    Err(e) => {
                        warn!("Failed to deserialize packet: {}", e);
                        continue;
                    }
                };

                match packet {
                    Packet::Connected { client_id } => info!("Connected as client {}", client_id),
                    Packet::PlayerSide { side } => {
                        info!("Playing as {:?}", side);
                        role = side;
                    }
                    Packet::ScoreUpdate { score } => info!("Score {}-{}", score.left, score.right),
                    Packet::WaitingForPlayers => info!("Waiting for players"),
                    Packet::GameStart { .. } => info!("Game started"),
                    Packet::GameOver { winner } => {
                        info!("Game over, {:?} wins", winner);
                        if role.is_player() {
                            send(&socket, &Packet::RestartGame).await?;
                        }
                    }
                    Packet::GameState { tick, state } => {
                        if let Role::Player(side) = role {
                            let next = steer(paddle_y, &state, args.reaction);
                            if next != paddle_y {
                                paddle_y = next;
                                send(&socket, &Packet::MovePaddle { side, y: paddle_y }).await?;
                            }
                        }
                        if tick % 300 == 0 {
                            debug!("Tick {}: ball at ({:.3}, {:.3})", tick, state.ball.x, state.ball.y);
                        }
                    }
                    Packet::Disconnected { reason } => {
                        warn!("Disconnected: {}", reason);
                        break;
                    }
                    other => warn!("Unexpected packet: {:?}", other),
                }
            }

            _ = heartbeat.tick() => {
                send(&socket, &Packet::Heartbeat).await?;
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Leaving");
                send(&socket, &Packet::Disconnect).await?;
                break;
            }
        }
    }

    Ok(())
}
