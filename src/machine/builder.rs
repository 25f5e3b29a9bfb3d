//! Builder and configuration for state machines.

use crate::core::StateId;
use crate::machine::error::BuildError;
use crate::machine::log::{default_sink, LogSink, MachineLog};
use crate::machine::StateMachine;
use crate::message::MessagePool;
use crate::tree::StateTree;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Tunables of a machine, loadable from any serde format.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineConfig {
    /// Write "entering"/"exiting" lines to the log sink.
    pub trace_enter_exit: bool,
    /// Free slots kept per message shape.
    pub pool_capacity: usize,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            trace_enter_exit: false,
            pool_capacity: MessagePool::DEFAULT_CAPACITY,
        }
    }
}

/// Builder for constructing state machines with a fluent API.
pub struct StateMachineBuilder<A> {
    name: String,
    tree: Option<StateTree<A>>,
    root: Option<StateId>,
    config: MachineConfig,
    sink: Option<LogSink>,
    pool: Option<Arc<MessagePool>>,
}

impl<A: 'static> StateMachineBuilder<A> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tree: None,
            root: None,
            config: MachineConfig::default(),
            sink: None,
            pool: None,
        }
    }

    /// Set the state tree (required).
    pub fn tree(mut self, tree: StateTree<A>) -> Self {
        self.tree = Some(tree);
        self
    }

    /// Set the root state (required).
    pub fn root(mut self, root: StateId) -> Self {
        self.root = Some(root);
        self
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: MachineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn trace_enter_exit(mut self, enabled: bool) -> Self {
        self.config.trace_enter_exit = enabled;
        self
    }

    pub fn pool_capacity(mut self, capacity: usize) -> Self {
        self.config.pool_capacity = capacity;
        self
    }

    /// Receive lifecycle and trace lines instead of the `tracing` default.
    pub fn log_sink<F>(mut self, sink: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.sink = Some(Arc::new(sink));
        self
    }

    /// Share an existing pool. `pool_capacity` is ignored in that case.
    pub fn pool(mut self, pool: Arc<MessagePool>) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Build the state machine.
    /// Returns an error if required fields are missing.
    pub fn build(self) -> Result<StateMachine<A>, BuildError> {
        let tree = self.tree.ok_or(BuildError::MissingTree)?;
        let root = self.root.ok_or(BuildError::MissingRoot)?;
        if !tree.contains(root) {
            return Err(BuildError::UnknownRoot(root));
        }

        let pool = self
            .pool
            .unwrap_or_else(|| Arc::new(MessagePool::with_capacity(self.config.pool_capacity)));
        let log = MachineLog::new(
            self.sink.unwrap_or_else(default_sink),
            self.config.trace_enter_exit,
        );

        Ok(StateMachine::from_parts(self.name, tree, root, pool, log))
    }
}
