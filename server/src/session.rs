//! Role assignment for connected sessions
//!
//! The registry hands out the two playing sides first-come-first-served and
//! turns everyone else into a spectator. It never drives phase changes on its
//! own; the game re-evaluates the roster after every join or leave.

use log::info;
use shared::{Role, Side};
use std::collections::HashMap;

pub type ClientId = u32;

#[derive(Debug, Default)]
pub struct SessionRegistry {
    roles: HashMap<ClientId, Role>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assigns the first free side, or spectator when both are taken.
    ///
    /// An identity that already holds a role keeps it.
    pub fn assign(&mut self, client_id: ClientId) -> Role {
        if let Some(role) = self.roles.get(&client_id) {
            return *role;
        }

        let role = Side::BOTH
            .into_iter()
            .find(|side| self.holder(*side).is_none())
            .map(Role::Player)
            .unwrap_or(Role::Spectator);

        info!("Client {} assigned {:?}", client_id, role);
        self.roles.insert(client_id, role);
        role
    }

    /// Forgets the identity. Unknown identities are ignored.
    pub fn release(&mut self, client_id: ClientId) -> Option<Role> {
        self.roles.remove(&client_id)
    }

    pub fn role(&self, client_id: ClientId) -> Option<Role> {
        self.roles.get(&client_id).copied()
    }

    /// Returns the identity currently playing `side`.
    pub fn holder(&self, side: Side) -> Option<ClientId> {
        self.roles
            .iter()
            .find(|(_, role)| **role == Role::Player(side))
            .map(|(id, _)| *id)
    }

    pub fn active_count(&self) -> usize {
        self.roles.values().filter(|role| role.is_player()).count()
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}
