//! Session context shared by the sync engine and the mutation gateway.
//!
//! Token issuance and refresh belong to the host application; this module only
//! mirrors the outcome: whether the user is signed in, who they are, their role
//! and whether they are assigned to the current project. Changes are published on
//! a `tokio::sync::watch` channel so the engine can react to the authentication
//! falling edge.

use std::sync::Arc;

use log::debug;
use tokio::sync::watch;

use crate::permissions::{capabilities_for, CapabilitySet, Role};

/// Snapshot of the session as seen by the core.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionState {
    pub authenticated: bool,
    pub member_id: Option<String>,
    pub role: Role,
    pub is_assigned_to_project: bool,
}

impl SessionState {
    pub fn signed_in(member_id: &str, role: Role, is_assigned_to_project: bool) -> Self {
        Self {
            authenticated: true,
            member_id: Some(member_id.to_string()),
            role,
            is_assigned_to_project,
        }
    }

    /// Capabilities for this snapshot. Signed-out sessions get none.
    pub fn capabilities(&self) -> CapabilitySet {
        if !self.authenticated {
            return CapabilitySet::default();
        }
        capabilities_for(self.role, self.is_assigned_to_project)
    }
}

/// Explicit session context. Cheap to clone; all clones observe the same state.
#[derive(Debug, Clone)]
pub struct Session {
    tx: Arc<watch::Sender<SessionState>>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(SessionState::default())
    }
}

impl Session {
    pub fn new(initial: SessionState) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    pub fn snapshot(&self) -> SessionState {
        self.tx.borrow().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.tx.borrow().authenticated
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.tx.subscribe()
    }

    pub fn sign_in(&self, member_id: &str, role: Role, is_assigned_to_project: bool) {
        debug!("Session signed in as {} ({})", member_id, role);
        self.tx
            .send_replace(SessionState::signed_in(member_id, role, is_assigned_to_project));
    }

    pub fn sign_out(&self) {
        debug!("Session signed out");
        self.tx.send_replace(SessionState::default());
    }

    pub fn set_role(&self, role: Role) {
        self.tx.send_modify(|state| state.role = role);
    }

    pub fn set_project_assignment(&self, is_assigned_to_project: bool) {
        self.tx
            .send_modify(|state| state.is_assigned_to_project = is_assigned_to_project);
    }
}
