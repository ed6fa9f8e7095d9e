#![doc = "The `boardsync` library crate."]
#![doc = ""]
#![doc = "This crate keeps a client-held mirror of a project board (board, columns, cards)"]
#![doc = "consistent with an authoritative backend. It contains the load/reconciliation"]
#![doc = "engine, the permission-gated command gateway, filtered views, the offline cache,"]
#![doc = "and the session context that ties them to the authentication lifecycle."]

pub mod backend;
pub mod cache;
pub mod config;
pub mod error;
pub mod filter;
pub mod gateway;
pub mod models;
pub mod permissions;
pub mod session;
pub mod sync;

pub use crate::error::AppError;
pub use crate::gateway::{CommandOutcome, MutationGateway};
pub use crate::sync::{Mirror, ReconcileReport, SyncEngine, SyncState};
