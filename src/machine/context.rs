//! The view a running hook or handler has of its machine.

use crate::core::{Handler, StateId};
use crate::machine::log::MachineLog;
use crate::machine::runtime::Session;
use crate::message::{Message, MessagePool};
use crate::tree::StateTree;
use std::any::Any;

/// Access to the actor, the tree and the request queues from inside a hook.
///
/// A context only exists while a session is running, so everything it sends
/// or transitions is queued and executes after the current dispatch returns.
/// Handlers can never re-enter the tree.
pub struct Context<'a, A> {
    node: StateId,
    tree: &'a StateTree<A>,
    session: &'a mut Session<A>,
    actor: &'a mut A,
    pool: &'a MessagePool,
    log: &'a MachineLog,
    machine: &'a str,
}

impl<'a, A: 'static> Context<'a, A> {
    pub(crate) fn new(
        node: StateId,
        tree: &'a StateTree<A>,
        session: &'a mut Session<A>,
        actor: &'a mut A,
        pool: &'a MessagePool,
        log: &'a MachineLog,
        machine: &'a str,
    ) -> Self {
        Self {
            node,
            tree,
            session,
            actor,
            pool,
            log,
            machine,
        }
    }

    /// Id of the state whose hook is running.
    pub fn id(&self) -> StateId {
        self.node
    }

    pub fn parent(&self) -> Option<StateId> {
        self.tree.parent_of(self.node)
    }

    /// Name of the state whose hook is running.
    pub fn name(&self) -> &str {
        self.tree.name_of(self.node)
    }

    pub fn machine_name(&self) -> &str {
        self.machine
    }

    pub fn actor(&self) -> &A {
        &*self.actor
    }

    pub fn actor_mut(&mut self) -> &mut A {
        &mut *self.actor
    }

    pub fn tree(&self) -> &StateTree<A> {
        self.tree
    }

    /// Borrow another state of the tree.
    ///
    /// The running state itself is not reachable this way; it is the
    /// receiver of the hook.
    pub fn state<S: Any>(&self, id: StateId) -> Option<&S> {
        self.tree.state::<S>(id)
    }

    /// Borrow the parent state as its concrete type.
    pub fn parent_state<S: Any>(&self) -> Option<&S> {
        self.state::<S>(self.parent()?)
    }

    /// Whether `id` is currently entered.
    pub fn is_active(&self, id: StateId) -> bool {
        self.tree.node(id).is_some_and(|node| node.entered)
    }

    /// Let the current message continue to the next ancestor even though
    /// this state handled it.
    pub fn propagate_message(&mut self) {
        self.session.consumed = false;
    }

    /// Ask the machine to shut down once the current item finishes.
    pub fn request_shutdown(&mut self) {
        self.session.shutdown_requested = true;
    }

    /// Write a line to the machine's log sink.
    pub fn log(&self, line: &str) {
        self.log.write(line);
    }
}

impl<'a, A: 'static> Context<'a, A> {
    /// Queue a message for every state answering to capability `C`.
    pub fn send<C: ?Sized + 'static>(&mut self, handler: Handler<A, C>) {
        self.send_with(handler, ());
    }

    /// Queue a message carrying `arg`.
    pub fn send_with<C, T>(&mut self, handler: Handler<A, C, T>, arg: T)
    where
        C: ?Sized + 'static,
        T: Send + Sync + 'static,
    {
        let message = Message::new(self.pool, handler, arg);
        self.session.messages.push_back(message);
    }

    /// Queue a transition to `dest`.
    pub fn transit_to(&mut self, dest: StateId) {
        self.queue_transition::<()>(dest, None);
    }

    /// Queue a transition whose destination receives `arg` through
    /// [`EnterWith`](crate::core::EnterWith).
    pub fn transit_to_with<T: Send + Sync + 'static>(&mut self, dest: StateId, arg: T) {
        self.queue_transition(dest, Some(arg));
    }

    fn queue_transition<T: Send + Sync + 'static>(&mut self, dest: StateId, arg: Option<T>) {
        if !self.tree.contains(dest) {
            tracing::warn!(
                machine = self.machine,
                from = self.name(),
                dest = %dest,
                "ignoring transition to a state outside this machine"
            );
            return;
        }
        let message = Message::transition(self.pool, dest, arg);
        self.session.transitions.push_back(message);
    }
}
