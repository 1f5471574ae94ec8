//! Server network layer handling UDP communications and game loop coordination

use crate::client_manager::ClientManager;
use crate::game::{Broadcaster, GameInstance};
use crate::session::ClientId;
use log::{debug, error, info, warn};
use shared::{Packet, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::time::{interval, MissedTickBehavior};

/// Messages sent from network tasks to main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived { packet: Packet, addr: SocketAddr },
    ClientTimeout { client_id: ClientId },
    Shutdown,
}

/// Messages sent from game loop to network tasks
#[derive(Debug)]
pub enum GameMessage {
    SendPacket { packet: Packet, client_id: ClientId },
    SendToAddr { packet: Packet, addr: SocketAddr },
    BroadcastPacket { packet: Packet },
}

impl Broadcaster for mpsc::UnboundedSender<GameMessage> {
    fn send_to(&mut self, client_id: ClientId, packet: Packet) {
        if let Err(e) = self.send(GameMessage::SendPacket { packet, client_id }) {
            error!("Failed to queue packet for client {}: {}", client_id, e);
        }
    }

    fn broadcast(&mut self, packet: Packet) {
        if let Err(e) = self.send(GameMessage::BroadcastPacket { packet }) {
            error!("Failed to queue broadcast packet: {}", e);
        }
    }
}

/// Records outbound traffic instead of sending it.
impl Broadcaster for Vec<GameMessage> {
    fn send_to(&mut self, client_id: ClientId, packet: Packet) {
        self.push(GameMessage::SendPacket { packet, client_id });
    }

    fn broadcast(&mut self, packet: Packet) {
        self.push(GameMessage::BroadcastPacket { packet });
    }
}

/// Main server coordinating networking and game simulation
pub struct Server {
    socket: Arc<UdpSocket>,
    clients: Arc<RwLock<ClientManager>>,
    game: GameInstance,
    tick_duration: Duration,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    game_tx: mpsc::UnboundedSender<GameMessage>,
    game_rx: mpsc::UnboundedReceiver<GameMessage>,
}

impl Server {
    /// Binds the UDP socket and prepares an empty table
    ///
    /// `tick_duration` is the fixed interval between simulation steps and
    /// must be non-zero. `max_clients` caps connections including spectators,
    /// and clients silent for longer than `client_timeout` are dropped.
    /// Nothing runs until [`Server::run`] is awaited.
    pub async fn new(
        addr: &str,
        tick_duration: Duration,
        max_clients: usize,
        client_timeout: Duration,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        if tick_duration.is_zero() {
            return Err("tick duration must be non-zero".into());
        }

        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket,
            clients: Arc::new(RwLock::new(ClientManager::new(max_clients, client_timeout))),
            game: GameInstance::new(),
            tick_duration,
            server_tx,
            server_rx,
            game_tx,
            game_rx,
        })
    }

    /// Returns the address the server socket is bound to
    ///
    /// Useful when binding to port 0 and letting the OS pick one.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Returns a sender into the main loop's message queue
    ///
    /// Sending [`ServerMessage::Shutdown`] through it makes [`Server::run`]
    /// return after the message currently being processed. Network tasks
    /// spawned by `run` are left to the runtime.
    pub fn control(&self) -> mpsc::UnboundedSender<ServerMessage> {
        self.server_tx.clone()
    }

    /// Spawns task that continuously listens for incoming packets
    ///
    /// Decoded packets are forwarded to the main loop. Undecodable datagrams
    /// are logged and dropped here.
    fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 2048];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => match Packet::decode(&buffer[0..len]) {
                        Ok(packet) => {
                            if let Err(e) =
                                server_tx.send(ServerMessage::PacketReceived { packet, addr })
                            {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        }
                        Err(e) => warn!("Failed to deserialize packet from {}: {}", addr, e),
                    },
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that processes outgoing packet queue
    ///
    /// Resolves client IDs to addresses at send time, so packets queued for a
    /// client that has since left are dropped.
    fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let clients = Arc::clone(&self.clients);
        let mut game_rx = std::mem::replace(&mut self.game_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(message) = game_rx.recv().await {
                match message {
                    GameMessage::SendPacket { packet, client_id } => {
                        let addr = clients.read().await.get_addr(client_id);
                        match addr {
                            Some(addr) => {
                                if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await
                                {
                                    error!("Failed to send to client {}: {}", client_id, e);
                                }
                            }
                            None => debug!("Dropping packet for departed client {}", client_id),
                        }
                    }
                    GameMessage::SendToAddr { packet, addr } => {
                        if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                            error!("Failed to send packet to {}: {}", addr, e);
                        }
                    }
                    GameMessage::BroadcastPacket { packet } => {
                        let client_addrs = clients.read().await.get_client_addrs();

                        for (client_id, addr) in client_addrs {
                            if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                                error!("Failed to send to client {}: {}", client_id, e);
                            }
                        }
                    }
                }
            }
        });
    }

    /// Spawns task that monitors client timeouts
    fn spawn_timeout_checker(&self) {
        let clients = Arc::clone(&self.clients);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let timed_out = clients.write().await.check_timeouts();

                for client_id in timed_out {
                    if let Err(e) = server_tx.send(ServerMessage::ClientTimeout { client_id }) {
                        error!("Failed to send timeout message: {}", e);
                        return;
                    }
                }
            }
        });
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &Packet,
        addr: SocketAddr,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let data = packet.encode()?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    fn send_to_addr(&self, packet: Packet, addr: SocketAddr) {
        if let Err(e) = self.game_tx.send(GameMessage::SendToAddr { packet, addr }) {
            error!("Failed to queue packet for {}: {}", addr, e);
        }
    }

    /// Refreshes the sender's liveness and resolves its client ID
    async fn touch(&self, addr: SocketAddr) -> Option<ClientId> {
        let client_id = self.clients.write().await.touch(addr);
        if client_id.is_none() {
            debug!("Ignoring packet from unknown address {}", addr);
        }
        client_id
    }

    /// Processes one loop message. Returns false when the server should stop.
    async fn handle_message(&mut self, message: ServerMessage) -> bool {
        match message {
            ServerMessage::PacketReceived { packet, addr } => {
                self.handle_packet(packet, addr).await;
                true
            }
            ServerMessage::ClientTimeout { client_id } => {
                self.game.leave(client_id, &mut self.game_tx);
                true
            }
            ServerMessage::Shutdown => false,
        }
    }

    /// Validates an incoming packet and feeds it to the game
    ///
    /// Packets failing [`Packet::validate`] are dropped with a warning.
    /// Everything except `Connect` must come from a known address. Whether a
    /// client may actually move a paddle or ready up is decided by the game.
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        if let Err(e) = packet.validate() {
            warn!("Rejected packet from {}: {}", addr, e);
            return;
        }

        match packet {
            Packet::Connect { client_version } => {
                self.handle_connect(client_version, addr).await;
            }

            Packet::MovePaddle { side, y } => {
                if let Some(client_id) = self.touch(addr).await {
                    self.game.move_paddle(client_id, side, y);
                }
            }

            Packet::RestartGame => {
                if let Some(client_id) = self.touch(addr).await {
                    self.game.request_restart(client_id, &mut self.game_tx);
                }
            }

            Packet::Heartbeat => {
                self.touch(addr).await;
            }

            Packet::Disconnect => {
                let client_id = self.clients.read().await.find_client_by_addr(addr);

                if let Some(client_id) = client_id {
                    self.clients.write().await.remove_client(&client_id);
                    self.game.leave(client_id, &mut self.game_tx);
                }
            }

            _ => {
                warn!("Unexpected packet type from client at {}", addr);
            }
        }
    }

    /// Admits a client after checking protocol version and capacity
    ///
    /// A repeated `Connect` from a known address first releases the old
    /// identity with full disconnect semantics. Refusals are answered with
    /// `Disconnected` sent straight to the address.
    async fn handle_connect(&mut self, client_version: u32, addr: SocketAddr) {
        info!(
            "Client connecting from {} (version: {})",
            addr, client_version
        );

        if client_version != PROTOCOL_VERSION {
            self.send_to_addr(
                Packet::Disconnected {
                    reason: "Protocol version mismatch".to_string(),
                },
                addr,
            );
            return;
        }

        // Remove existing connection if present
        let existing_client_id = self.clients.read().await.find_client_by_addr(addr);
        if let Some(existing_id) = existing_client_id {
            info!("Removing existing client {} from {}", existing_id, addr);
            self.clients.write().await.remove_client(&existing_id);
            self.game.leave(existing_id, &mut self.game_tx);
        }

        let client_id = self.clients.write().await.add_client(addr);

        match client_id {
            Some(client_id) => {
                self.game_tx.send_to(client_id, Packet::Connected { client_id });
                self.game.join(client_id, &mut self.game_tx);
            }
            None => {
                self.send_to_addr(
                    Packet::Disconnected {
                        reason: "Server full".to_string(),
                    },
                    addr,
                );
            }
        }
    }

    /// Main server loop coordinating all operations
    ///
    /// Spawns the receiver, sender and timeout tasks, then processes inbound
    /// messages and tick events one at a time on this task. Each tick steps
    /// the game and queues the snapshot broadcast, so the broadcast always
    /// reflects the step that produced it. Returns once a shutdown message
    /// arrives or every message sender is gone.
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.spawn_network_receiver();
        self.spawn_network_sender();
        self.spawn_timeout_checker();

        let mut tick_interval = interval(self.tick_duration);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("Server started successfully");

        loop {
            tokio::select! {
                message = self.server_rx.recv() => {
                    let keep_running = match message {
                        Some(message) => self.handle_message(message).await,
                        None => false,
                    };
                    if !keep_running {
                        info!("Server shutting down");
                        break;
                    }
                },

                _ = tick_interval.tick() => {
                    self.game.step(&mut self.game_tx);
                },
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::GamePhase;
    use shared::{Role, Side};

    async fn test_server(max_clients: usize) -> Server {
        Server::new(
            "127.0.0.1:0",
            Duration::from_millis(16),
            max_clients,
            Duration::from_secs(5),
        )
        .await
        .unwrap()
    }

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    fn drain(server: &mut Server) -> Vec<GameMessage> {
        let mut messages = Vec::new();
        while let Ok(message) = server.game_rx.try_recv() {
            messages.push(message);
        }
        messages
    }

    async fn connect(server: &mut Server, port: u16) {
        server
            .handle_packet(Packet::Connect { client_version: PROTOCOL_VERSION }, addr(port))
            .await;
    }

    #[test]
    fn test_channel_broadcaster_queues_messages() {
        let (mut tx, mut rx) = mpsc::unbounded_channel::<GameMessage>();

        tx.send_to(7, Packet::WaitingForPlayers);
        tx.broadcast(Packet::GameOver { winner: Side::Left });

        match rx.try_recv().unwrap() {
            GameMessage::SendPacket { packet, client_id } => {
                assert_eq!(client_id, 7);
                assert_eq!(packet, Packet::WaitingForPlayers);
            }
            other => panic!("Unexpected message {:?}", other),
        }
        match rx.try_recv().unwrap() {
            GameMessage::BroadcastPacket { packet } => {
                assert_eq!(packet, Packet::GameOver { winner: Side::Left });
            }
            other => panic!("Unexpected message {:?}", other),
        }
    }

    #[test]
    fn test_closed_channel_does_not_panic() {
        let (mut tx, rx) = mpsc::unbounded_channel::<GameMessage>();
        drop(rx);

        tx.broadcast(Packet::WaitingForPlayers);
        tx.send_to(1, Packet::RestartGame);
    }

    #[tokio::test]
    async fn test_connect_sends_connected_first() {
        let mut server = test_server(4).await;
        connect(&mut server, 5000).await;

        let messages = drain(&mut server);
        match &messages[0] {
            GameMessage::SendPacket { packet, client_id } => {
                assert_eq!(*client_id, 1);
                assert_eq!(*packet, Packet::Connected { client_id: 1 });
            }
            other => panic!("Unexpected message {:?}", other),
        }
        assert_eq!(server.game.role(1), Some(Role::Player(Side::Left)));
    }

    #[tokio::test]
    async fn test_two_connections_start_game() {
        let mut server = test_server(4).await;
        connect(&mut server, 5000).await;
        connect(&mut server, 5001).await;

        assert_eq!(server.game.phase(), GamePhase::Active);
        assert_eq!(server.clients.read().await.len(), 2);
    }

    #[tokio::test]
    async fn test_version_mismatch_rejected() {
        let mut server = test_server(4).await;
        server
            .handle_packet(Packet::Connect { client_version: 99 }, addr(5000))
            .await;

        assert!(server.clients.read().await.is_empty());
        match drain(&mut server).as_slice() {
            [GameMessage::SendToAddr { packet, addr: to }] => {
                assert_eq!(*to, addr(5000));
                assert_eq!(
                    *packet,
                    Packet::Disconnected {
                        reason: "Protocol version mismatch".to_string()
                    }
                );
            }
            other => panic!("Unexpected messages {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_server_full_rejected() {
        let mut server = test_server(1).await;
        connect(&mut server, 5000).await;
        drain(&mut server);

        connect(&mut server, 5001).await;

        assert_eq!(server.clients.read().await.len(), 1);
        assert!(drain(&mut server).iter().any(|message| matches!(
            message,
            GameMessage::SendToAddr {
                packet: Packet::Disconnected { .. },
                ..
            }
        )));
    }

    #[tokio::test]
    async fn test_reconnect_from_same_addr_replaces_client() {
        let mut server = test_server(4).await;
        connect(&mut server, 5000).await;
        connect(&mut server, 5000).await;

        assert_eq!(server.clients.read().await.len(), 1);
        assert_eq!(server.game.role(1), None);
        assert_eq!(server.game.role(2), Some(Role::Player(Side::Left)));
    }

    #[tokio::test]
    async fn test_out_of_range_move_is_dropped() {
        let mut server = test_server(4).await;
        connect(&mut server, 5000).await;
        let before = server.game.paddle(Side::Left).y;

        server
            .handle_packet(Packet::MovePaddle { side: Side::Left, y: 2.0 }, addr(5000))
            .await;
        assert_eq!(server.game.paddle(Side::Left).y, before);

        server
            .handle_packet(Packet::MovePaddle { side: Side::Left, y: 0.0 }, addr(5000))
            .await;
        assert_eq!(server.game.paddle(Side::Left).y, 0.0);
    }

    #[tokio::test]
    async fn test_unknown_address_is_ignored() {
        let mut server = test_server(4).await;
        connect(&mut server, 5000).await;
        let before = server.game.paddle(Side::Left).y;

        server
            .handle_packet(Packet::MovePaddle { side: Side::Left, y: 0.0 }, addr(6000))
            .await;
        server.handle_packet(Packet::Disconnect, addr(6000)).await;

        assert_eq!(server.game.paddle(Side::Left).y, before);
        assert_eq!(server.clients.read().await.len(), 1);
    }

    #[tokio::test]
    async fn test_disconnect_returns_to_waiting() {
        let mut server = test_server(4).await;
        connect(&mut server, 5000).await;
        connect(&mut server, 5001).await;

        server.handle_packet(Packet::Disconnect, addr(5000)).await;

        assert_eq!(server.game.phase(), GamePhase::Waiting);
        assert_eq!(server.game.role(1), None);
        assert_eq!(server.clients.read().await.len(), 1);
    }

    #[tokio::test]
    async fn test_timeout_message_releases_player() {
        let mut server = test_server(4).await;
        connect(&mut server, 5000).await;
        connect(&mut server, 5001).await;

        let keep_running = server
            .handle_message(ServerMessage::ClientTimeout { client_id: 2 })
            .await;

        assert!(keep_running);
        assert_eq!(server.game.phase(), GamePhase::Waiting);
        assert_eq!(server.game.role(2), None);
    }

    #[tokio::test]
    async fn test_zero_tick_duration_rejected() {
        let result = Server::new(
            "127.0.0.1:0",
            Duration::ZERO,
            4,
            Duration::from_secs(5),
        )
        .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_shutdown_message_stops_loop() {
        let mut server = test_server(4).await;
        assert!(!server.handle_message(ServerMessage::Shutdown).await);
    }

    #[tokio::test]
    async fn test_server_packets_from_clients_are_ignored() {
        let mut server = test_server(4).await;
        connect(&mut server, 5000).await;
        drain(&mut server);

        server
            .handle_packet(Packet::GameOver { winner: Side::Right }, addr(5000))
            .await;

        assert!(drain(&mut server).is_empty());
        assert_eq!(server.game.phase(), GamePhase::Waiting);
    }
}
