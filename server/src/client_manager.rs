//! Connection tracking for the UDP transport
//!
//! This module handles the server-side bookkeeping of connected clients:
//! - Client connection lifecycle (connect, disconnect, timeout)
//! - Mapping between socket addresses and client identities
//! - Connection health monitoring and automatic cleanup
//! - Client capacity management
//!
//! Roles and game state live elsewhere; a client here is just an address the
//! server has agreed to talk to.

use crate::session::ClientId;
use log::info;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// A connected client as seen by the transport
#[derive(Debug)]
pub struct Client {
    /// Unique client identifier assigned by the server
    pub id: ClientId,
    /// Network address for sending responses
    pub addr: SocketAddr,
    /// Last time we received any packet from this client
    pub last_seen: Instant,
}

impl Client {
    /// Creates a new client with the given ID and network address
    ///
    /// The client starts out as recently active.
    pub fn new(id: ClientId, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            last_seen: Instant::now(),
        }
    }

    /// Marks the client as alive right now
    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    /// Checks if the client has exceeded the connection timeout
    ///
    /// Returns true if nothing has been heard from this client within
    /// `timeout`, indicating a likely disconnect.
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Manages all connected clients
///
/// Client IDs start from 1 and are never reused within a server run, so a
/// late packet can not be attributed to a newer connection.
pub struct ClientManager {
    /// Connected clients indexed by their unique ID
    clients: HashMap<ClientId, Client>,
    /// Next available client ID for new connections
    next_client_id: ClientId,
    /// Maximum number of concurrent clients allowed
    max_clients: usize,
    /// Silence after which a client is considered gone
    timeout: Duration,
}

impl ClientManager {
    /// Creates a new client manager with the specified capacity limit
    ///
    /// Initializes an empty client roster. Spectators count towards
    /// `max_clients` just like players, and `timeout` is the silence after
    /// which [`ClientManager::check_timeouts`] drops a client.
    pub fn new(max_clients: usize, timeout: Duration) -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
            max_clients,
            timeout,
        }
    }

    /// Attempts to add a new client connection
    ///
    /// Assigns the next unused ID and records `addr` as the client's reply
    /// address. Returns None if the server is at capacity, in which case no
    /// ID is consumed.
    pub fn add_client(&mut self, addr: SocketAddr) -> Option<ClientId> {
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        info!("Client {} connected from {}", client_id, addr);
        self.clients.insert(client_id, Client::new(client_id, addr));

        Some(client_id)
    }

    /// Removes a client from the roster
    ///
    /// Returns false if it was already gone, so a disconnect racing a
    /// timeout is only reported once.
    pub fn remove_client(&mut self, client_id: &ClientId) -> bool {
        if let Some(client) = self.clients.remove(client_id) {
            info!("Client {} disconnected", client.id);
            true
        } else {
            false
        }
    }

    /// Finds the client ID associated with a network address
    ///
    /// Used to resolve incoming packets to client identities.
    pub fn find_client_by_addr(&self, addr: SocketAddr) -> Option<ClientId> {
        self.clients
            .iter()
            .find(|(_, client)| client.addr == addr)
            .map(|(id, _)| *id)
    }

    /// Reply address of a connected client
    pub fn get_addr(&self, client_id: ClientId) -> Option<SocketAddr> {
        self.clients.get(&client_id).map(|client| client.addr)
    }

    /// Refreshes the client sending from `addr` and returns its ID
    ///
    /// Any packet from a known address counts as a sign of life. Returns
    /// None for addresses that never completed the connect handshake.
    pub fn touch(&mut self, addr: SocketAddr) -> Option<ClientId> {
        self.clients
            .values_mut()
            .find(|client| client.addr == addr)
            .map(|client| {
                client.touch();
                client.id
            })
    }

    /// Removes clients that went silent and returns their IDs
    ///
    /// Called periodically by the server's timeout task. The caller is
    /// responsible for releasing the returned IDs from the game.
    pub fn check_timeouts(&mut self) -> Vec<ClientId> {
        let timeout = self.timeout;
        let timed_out: Vec<ClientId> = self
            .clients
            .iter()
            .filter(|(_, client)| client.is_timed_out(timeout))
            .map(|(id, _)| *id)
            .collect();

        for client_id in &timed_out {
            info!("Client {} timed out", client_id);
            self.remove_client(client_id);
        }

        timed_out
    }

    /// All client IDs with their addresses, used for broadcasting
    pub fn get_client_addrs(&self) -> Vec<(ClientId, SocketAddr)> {
        self.clients
            .iter()
            .map(|(id, client)| (*id, client.addr))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
