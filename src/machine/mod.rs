//! The state machine: lifecycle, sessions and the public messaging API.
//!
//! A [`StateMachine`] owns a [`StateTree`] and an actor. Each public entry
//! point runs one session and then drains whatever the session queued:
//! transitions first, then messages, each in submission order.

mod builder;
mod context;
mod error;
mod log;
pub(crate) mod runtime;

pub use builder::{MachineConfig, StateMachineBuilder};
pub use context::Context;
pub use error::{BuildError, MachineError};
pub use log::{default_sink, LogSink};

pub(crate) use runtime::Runtime;

use crate::core::{Handler, StateId};
use crate::message::{Message, MessagePool};
use crate::tree::{FieldsMode, MachineSnapshot, StateTree};
use self::log::MachineLog;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Lifecycle of a machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MachineStatus {
    Offline,
    Initializing,
    Initialized,
    ShuttingDown,
}

impl fmt::Display for MachineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Offline => "offline",
            Self::Initializing => "initializing",
            Self::Initialized => "initialized",
            Self::ShuttingDown => "shutting down",
        };
        f.write_str(text)
    }
}

/// Hierarchical state machine bound to an actor of type `A`.
pub struct StateMachine<A> {
    id: Uuid,
    root: StateId,
    status: MachineStatus,
    rt: Runtime<A>,
}

impl<A: 'static> StateMachine<A> {
    /// Machine with default configuration and the `tracing` log sink.
    pub fn new(name: impl Into<String>, tree: StateTree<A>, root: StateId) -> Self {
        let config = MachineConfig::default();
        let pool = Arc::new(MessagePool::with_capacity(config.pool_capacity));
        let log = MachineLog::new(default_sink(), config.trace_enter_exit);
        Self::from_parts(name.into(), tree, root, pool, log)
    }

    pub fn builder(name: impl Into<String>) -> StateMachineBuilder<A> {
        StateMachineBuilder::new(name)
    }

    pub(crate) fn from_parts(
        name: String,
        tree: StateTree<A>,
        root: StateId,
        pool: Arc<MessagePool>,
        log: MachineLog,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            root,
            status: MachineStatus::Offline,
            rt: Runtime::new(name, tree, pool, log),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.rt.name
    }

    pub fn root(&self) -> StateId {
        self.root
    }

    pub fn status(&self) -> MachineStatus {
        self.status
    }

    pub fn is_initialized(&self) -> bool {
        self.status == MachineStatus::Initialized
    }

    pub fn tree(&self) -> &StateTree<A> {
        &self.rt.tree
    }

    /// The message pool, shared with any wrapper around this machine.
    pub fn pool(&self) -> &Arc<MessagePool> {
        &self.rt.pool
    }

    /// Toggle "entering"/"exiting" lines on the log sink.
    pub fn set_trace_enter_exit(&mut self, enabled: bool) {
        self.rt.log.trace_enter_exit = enabled;
    }

    /// The actor, while the machine is running.
    pub fn actor(&self) -> Option<&A> {
        self.rt.actor.as_ref()
    }

    pub fn actor_mut(&mut self) -> Option<&mut A> {
        self.rt.actor.as_mut()
    }

    /// Borrow the concrete state behind `id`.
    pub fn state<S: Any>(&self, id: StateId) -> Option<&S> {
        self.rt.tree.state::<S>(id)
    }

    /// Whether `id` is on the active path.
    pub fn is_active(&self, id: StateId) -> bool {
        self.rt.tree.node(id).is_some_and(|node| node.entered)
    }

    /// Active node of the root region.
    pub fn active_leaf(&self) -> Option<StateId> {
        if !self.is_initialized() {
            return None;
        }
        self.rt.regions.first().map(|region| region.active)
    }

    /// Active leaves of every region, in branch order.
    pub fn active_leaves(&self) -> Vec<StateId> {
        self.rt.active_leaves()
    }

    /// Active child of an exclusive composite.
    pub fn active_child(&self, composite: StateId) -> Option<StateId> {
        self.rt.active_child(composite)
    }

    /// Read-only view of the tree.
    pub fn snapshot(&self, mode: FieldsMode) -> MachineSnapshot {
        let root = if self.is_initialized() {
            self.rt.tree.snapshot(self.root, mode)
        } else {
            None
        };
        MachineSnapshot {
            machine: self.rt.name.clone(),
            machine_id: self.id,
            status: self.status,
            taken_at: Utc::now(),
            root,
        }
    }

    /// Wire the tree, enter the root and drain whatever the hooks queued.
    ///
    /// Every declaration problem in the tree is reported at once; the machine
    /// stays offline in that case.
    pub fn initialize(&mut self, actor: A) -> Result<(), MachineError> {
        self.require(MachineStatus::Offline, "initialize")?;
        self.status = MachineStatus::Initializing;
        self.rt.log.write(&format!("{} initializing", self.rt.name));
        tracing::debug!(machine = %self.rt.name, id = %self.id, "initializing state machine");

        self.rt.actor = Some(actor);
        if let Err(errors) = self.rt.build(self.root) {
            for error in &errors {
                tracing::error!(machine = %self.rt.name, %error, "invalid state tree");
            }
            self.rt.discard_pending();
            self.rt.actor = None;
            self.status = MachineStatus::Offline;
            return Err(MachineError::Initialization {
                machine: self.rt.name.clone(),
                errors,
            });
        }

        self.status = MachineStatus::Initialized;
        self.rt.session.consumed = false;
        self.rt.enter(self.root);
        self.drain()
    }

    /// Exit the active path, run every `on_shutdown` hook and drop the actor.
    ///
    /// Work still queued once the tree is down is discarded and reported as
    /// [`MachineError::UndeliveredWork`]; the machine is offline either way.
    pub fn shutdown(&mut self) -> Result<(), MachineError> {
        self.require(MachineStatus::Initialized, "shut down")?;
        self.status = MachineStatus::ShuttingDown;
        self.rt.log.write(&format!("{} shutting down", self.rt.name));
        tracing::debug!(machine = %self.rt.name, id = %self.id, "shutting down state machine");

        self.rt.exit(self.root);
        self.rt.shutdown_tree(self.root);
        let (transitions, messages) = self.rt.discard_pending();
        self.rt.actor = None;
        self.status = MachineStatus::Offline;

        if transitions + messages > 0 {
            tracing::error!(
                machine = %self.rt.name,
                transitions,
                messages,
                "work left undelivered at shutdown"
            );
            return Err(MachineError::UndeliveredWork {
                transitions,
                messages,
            });
        }
        Ok(())
    }

    /// Offer a message to every active state answering to capability `C`.
    pub fn send<C: ?Sized + 'static>(&mut self, handler: Handler<A, C>) -> Result<(), MachineError> {
        self.send_with(handler, ())
    }

    pub fn send_with<C, T>(&mut self, handler: Handler<A, C, T>, arg: T) -> Result<(), MachineError>
    where
        C: ?Sized + 'static,
        T: Send + Sync + 'static,
    {
        self.require(MachineStatus::Initialized, "send")?;
        let message = Message::new(&self.rt.pool, handler, arg);
        self.run_session(message)
    }

    /// Make `dest` active.
    ///
    /// The nearest active exclusive composite that lists `dest` as a child
    /// performs the switch. If there is none the request has no effect.
    pub fn transition(&mut self, dest: StateId) -> Result<(), MachineError> {
        self.require(MachineStatus::Initialized, "transition")?;
        self.require_known(dest)?;
        let message = Message::transition::<()>(&self.rt.pool, dest, None);
        self.run_session(message)
    }

    /// Make `dest` active and hand it `arg` through
    /// [`EnterWith`](crate::core::EnterWith).
    pub fn transition_with<T>(&mut self, dest: StateId, arg: T) -> Result<(), MachineError>
    where
        T: Send + Sync + 'static,
    {
        self.require(MachineStatus::Initialized, "transition")?;
        self.require_known(dest)?;
        let message = Message::transition(&self.rt.pool, dest, Some(arg));
        self.run_session(message)
    }

    /// Run one queued item handed over by a wrapper.
    pub(crate) fn accept(&mut self, message: Message<A>) -> Result<(), MachineError> {
        if let Err(err) = self.require(MachineStatus::Initialized, "handle messages") {
            message.recycle(&self.rt.pool);
            return Err(err);
        }
        self.run_session(message)
    }

    pub(crate) fn contains(&self, id: StateId) -> bool {
        self.rt.tree.contains(id)
    }

    fn run_session(&mut self, message: Message<A>) -> Result<(), MachineError> {
        self.rt.execute(message);
        self.drain()
    }

    /// Run queued work until both queues are empty or the machine stops.
    fn drain(&mut self) -> Result<(), MachineError> {
        while self.status == MachineStatus::Initialized {
            if self.rt.session.shutdown_requested {
                self.rt.session.shutdown_requested = false;
                return self.shutdown();
            }
            let Some(next) = self.rt.session.next() else {
                break;
            };
            self.rt.execute(next);
        }
        Ok(())
    }

    fn require(&self, expected: MachineStatus, operation: &'static str) -> Result<(), MachineError> {
        if self.status == expected {
            Ok(())
        } else {
            Err(MachineError::InvalidState {
                operation,
                status: self.status,
            })
        }
    }

    fn require_known(&self, dest: StateId) -> Result<(), MachineError> {
        if self.contains(dest) {
            Ok(())
        } else {
            Err(MachineError::UnknownState(dest))
        }
    }
}

impl<A> fmt::Debug for StateMachine<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateMachine")
            .field("name", &self.rt.name)
            .field("id", &self.id)
            .field("status", &self.status)
            .field("tree", &self.rt.tree)
            .finish_non_exhaustive()
    }
}
