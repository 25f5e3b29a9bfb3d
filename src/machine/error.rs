//! Machine-level errors.

use crate::core::StateId;
use crate::machine::MachineStatus;
use crate::tree::InitializationError;
use thiserror::Error;

/// Errors returned by [`StateMachine`](crate::machine::StateMachine) and
/// [`ConcurrentStateMachine`](crate::concurrent::ConcurrentStateMachine).
#[derive(Debug, Error)]
pub enum MachineError {
    #[error("{machine} failed to initialize ({} problem(s)): {}", .errors.len(), join(.errors))]
    Initialization {
        machine: String,
        errors: Vec<InitializationError>,
    },

    #[error("cannot {operation} while the machine is {status}")]
    InvalidState {
        operation: &'static str,
        status: MachineStatus,
    },

    #[error("state {0} is not part of this machine")]
    UnknownState(StateId),

    #[error("{transitions} transition(s) and {messages} message(s) left undelivered at shutdown")]
    UndeliveredWork { transitions: usize, messages: usize },
}

fn join(errors: &[InitializationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors that can occur when building a machine.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BuildError {
    #[error("State tree not specified. Call .tree(tree) before .build()")]
    MissingTree,

    #[error("Root state not specified. Call .root(id) before .build()")]
    MissingRoot,

    #[error("Root state {0} is not part of the tree")]
    UnknownRoot(StateId),
}
