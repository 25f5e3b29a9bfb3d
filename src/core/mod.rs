//! Core state types.
//!
//! This module contains the building blocks every other layer relies on:
//! - State behaviour via the `State` trait
//! - Node identity (`StateId`) and composition kind (`NodeKind`)
//! - Capability registration and typed message handlers

mod capability;
mod state;

pub use capability::{Capabilities, CapabilityTable, Handler};
pub use state::{AsAny, EnterWith, NodeKind, State, StateId};

pub(crate) use state::short_type_name;
