//! Role and assignment based capability policy.
//!
//! The policy is a pure function of `(role, assigned)` and is re-evaluated before
//! every command, since either input can change between two evaluations.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Organization role of the acting member.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Viewer,
    Member,
    Admin,
    Owner,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Viewer => "viewer",
            Role::Member => "member",
            Role::Admin => "admin",
            Role::Owner => "owner",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "viewer" => Ok(Role::Viewer),
            "member" => Ok(Role::Member),
            "admin" => Ok(Role::Admin),
            "owner" => Ok(Role::Owner),
            other => Err(AppError::ValidationError(format!("Unknown role `{}`", other))),
        }
    }
}

/// A single gated operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    CreateCard,
    EditCard,
    DeleteCard,
    CreateColumn,
    EditColumn,
    DeleteColumn,
    InviteMember,
    DragCard,
}

impl Capability {
    pub const ALL: [Capability; 8] = [
        Capability::CreateCard,
        Capability::EditCard,
        Capability::DeleteCard,
        Capability::CreateColumn,
        Capability::EditColumn,
        Capability::DeleteColumn,
        Capability::InviteMember,
        Capability::DragCard,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Capability::CreateCard => "createCard",
            Capability::EditCard => "editCard",
            Capability::DeleteCard => "deleteCard",
            Capability::CreateColumn => "createColumn",
            Capability::EditColumn => "editColumn",
            Capability::DeleteColumn => "deleteColumn",
            Capability::InviteMember => "inviteMember",
            Capability::DragCard => "dragCard",
        }
    }
}

/// The capabilities granted to one role/assignment combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CapabilitySet {
    pub create_card: bool,
    pub edit_card: bool,
    pub delete_card: bool,
    pub create_column: bool,
    pub edit_column: bool,
    pub delete_column: bool,
    pub invite_member: bool,
    pub drag_card: bool,
}

impl CapabilitySet {
    fn uniform(granted: bool) -> Self {
        Self {
            create_card: granted,
            edit_card: granted,
            delete_card: granted,
            create_column: granted,
            edit_column: granted,
            delete_column: granted,
            invite_member: granted,
            drag_card: granted,
        }
    }

    pub fn allows(&self, capability: Capability) -> bool {
        match capability {
            Capability::CreateCard => self.create_card,
            Capability::EditCard => self.edit_card,
            Capability::DeleteCard => self.delete_card,
            Capability::CreateColumn => self.create_column,
            Capability::EditColumn => self.edit_column,
            Capability::DeleteColumn => self.delete_column,
            Capability::InviteMember => self.invite_member,
            Capability::DragCard => self.drag_card,
        }
    }

    /// Returns `PermissionDenied` unless `capability` is granted.
    pub fn require(&self, capability: Capability) -> Result<(), AppError> {
        if self.allows(capability) {
            Ok(())
        } else {
            Err(AppError::PermissionDenied(format!(
                "missing capability `{}`",
                capability.as_str()
            )))
        }
    }
}

/// Maps a role and project assignment to its capability set.
///
/// - viewers get nothing;
/// - members get everything but `inviteMember`, and only while assigned to the project;
/// - admins and owners get everything regardless of assignment.
pub fn capabilities_for(role: Role, is_assigned_to_project: bool) -> CapabilitySet {
    match role {
        Role::Viewer => CapabilitySet::uniform(false),
        Role::Member => CapabilitySet {
            invite_member: false,
            ..CapabilitySet::uniform(is_assigned_to_project)
        },
        Role::Admin | Role::Owner => CapabilitySet::uniform(true),
    }
}
