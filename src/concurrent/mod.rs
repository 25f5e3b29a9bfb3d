//! Thread-safe front end for a [`StateMachine`].
//!
//! Producers on any thread enqueue messages and transitions into lock-free
//! queues. One consumer at a time pumps them into the machine under the
//! writer lock with [`ConcurrentStateMachine::handle_messages`]. An optional
//! callback is raised when the queues go from idle to pending, so a consumer
//! can sleep until there is work.

use crate::core::{Handler, StateId};
use crate::machine::{MachineError, MachineStatus, StateMachine};
use crate::message::{Message, MessagePool};
use crate::tree::{FieldsMode, MachineSnapshot};
use crossbeam::queue::SegQueue;
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

type Notify = Box<dyn Fn() + Send + Sync>;

/// Multi-producer, single-consumer wrapper around a [`StateMachine`].
pub struct ConcurrentStateMachine<A> {
    machine: RwLock<StateMachine<A>>,
    transitions: SegQueue<Message<A>>,
    messages: SegQueue<Message<A>>,
    pending: AtomicBool,
    accepting: AtomicBool,
    notify: Option<Notify>,
    pool: Arc<MessagePool>,
    states: usize,
}

impl<A: Send + Sync + 'static> ConcurrentStateMachine<A> {
    pub fn new(machine: StateMachine<A>) -> Self {
        let pool = Arc::clone(machine.pool());
        let states = machine.tree().len();
        let accepting = machine.is_initialized();
        Self {
            machine: RwLock::new(machine),
            transitions: SegQueue::new(),
            messages: SegQueue::new(),
            pending: AtomicBool::new(false),
            accepting: AtomicBool::new(accepting),
            notify: None,
            pool,
            states,
        }
    }

    /// Wrapper that calls `notify` whenever work becomes available after an
    /// idle period.
    ///
    /// The callback runs on the producer's thread and should only wake the
    /// consumer.
    pub fn with_notify<F>(machine: StateMachine<A>, notify: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let mut wrapper = Self::new(machine);
        wrapper.notify = Some(Box::new(notify));
        wrapper
    }

    /// Initialize the machine and start accepting work.
    ///
    /// Anything a producer slipped into the queues while the machine was
    /// offline belongs to an earlier run and is discarded first.
    pub fn initialize(&self, actor: A) -> Result<(), MachineError> {
        let mut machine = self.machine.write();
        if machine.status() == MachineStatus::Offline {
            let (transitions, messages) = self.discard_queued();
            if transitions + messages > 0 {
                tracing::warn!(
                    machine = machine.name(),
                    transitions,
                    messages,
                    "discarding work queued while the machine was offline"
                );
            }
            self.pending.store(false, Ordering::Release);
        }
        machine.initialize(actor)?;
        self.accepting.store(true, Ordering::Release);
        drop(machine);
        self.signal_if_queued();
        Ok(())
    }

    /// Shut the machine down.
    ///
    /// Items still waiting in the wrapper's queues are discarded and counted
    /// into [`MachineError::UndeliveredWork`].
    pub fn shutdown(&self) -> Result<(), MachineError> {
        let mut machine = self.machine.write();
        self.accepting.store(false, Ordering::Release);
        let result = machine.shutdown();
        let result = self.discard_after_stop(machine.name(), result);
        drop(machine);
        self.pending.store(false, Ordering::Release);
        result
    }

    /// Queue a message. Never blocks on the machine.
    pub fn send<C: ?Sized + 'static>(&self, handler: Handler<A, C>) -> Result<(), MachineError> {
        self.send_with(handler, ())
    }

    pub fn send_with<C, T>(&self, handler: Handler<A, C, T>, arg: T) -> Result<(), MachineError>
    where
        C: ?Sized + 'static,
        T: Send + Sync + 'static,
    {
        self.require_accepting("send")?;
        self.messages.push(Message::new(&self.pool, handler, arg));
        self.signal();
        Ok(())
    }

    /// Queue a transition. Never blocks on the machine.
    pub fn transition(&self, dest: StateId) -> Result<(), MachineError> {
        self.queue_transition::<()>(dest, None)
    }

    pub fn transition_with<T>(&self, dest: StateId, arg: T) -> Result<(), MachineError>
    where
        T: Send + Sync + 'static,
    {
        self.queue_transition(dest, Some(arg))
    }

    fn queue_transition<T>(&self, dest: StateId, arg: Option<T>) -> Result<(), MachineError>
    where
        T: Send + Sync + 'static,
    {
        self.require_accepting("transition")?;
        if dest.index() >= self.states {
            return Err(MachineError::UnknownState(dest));
        }
        self.transitions.push(Message::transition(&self.pool, dest, arg));
        self.signal();
        Ok(())
    }

    /// Feed queued work into the machine.
    ///
    /// `None` drains until the queues are empty, `Some(n)` handles at most `n`
    /// items and `Some(0)` only reports whether anything is queued. Returns
    /// whether work remains.
    pub fn handle_messages(&self, max_count: Option<usize>) -> Result<bool, MachineError> {
        let result = {
            let mut machine = self.machine.write();
            let result = self.pump(&mut machine, max_count);
            if !machine.is_initialized() {
                self.accepting.store(false, Ordering::Release);
            }
            result
        };
        self.pending.store(false, Ordering::Release);
        self.signal_if_queued();
        result
    }

    fn pump(&self, machine: &mut StateMachine<A>, max_count: Option<usize>) -> Result<bool, MachineError> {
        let mut budget = max_count;
        while machine.is_initialized() {
            if budget == Some(0) {
                return Ok(self.has_queued());
            }
            let Some(message) = self.transitions.pop().or_else(|| self.messages.pop()) else {
                return Ok(false);
            };
            if let Some(remaining) = budget.as_mut() {
                *remaining -= 1;
            }
            if let Err(err) = machine.accept(message) {
                if machine.is_initialized() {
                    return Err(err);
                }
                return self.discard_after_stop(machine.name(), Err(err)).map(|()| false);
            }
        }

        // Stopped from inside a handler.
        self.discard_after_stop(machine.name(), Ok(())).map(|()| false)
    }

    /// Drop what is still queued once the machine has stopped, folding the
    /// count into the machine's own result.
    fn discard_after_stop(
        &self,
        machine: &str,
        result: Result<(), MachineError>,
    ) -> Result<(), MachineError> {
        let (transitions, messages) = self.discard_queued();
        if transitions + messages > 0 {
            tracing::error!(machine, transitions, messages, "queued work discarded after stop");
        }
        match result {
            Err(MachineError::UndeliveredWork {
                transitions: inner_transitions,
                messages: inner_messages,
            }) => Err(MachineError::UndeliveredWork {
                transitions: inner_transitions + transitions,
                messages: inner_messages + messages,
            }),
            Ok(()) if transitions + messages > 0 => Err(MachineError::UndeliveredWork {
                transitions,
                messages,
            }),
            other => other,
        }
    }

    /// Whether any transition or message is waiting.
    pub fn has_queued(&self) -> bool {
        !self.transitions.is_empty() || !self.messages.is_empty()
    }

    /// Number of items waiting.
    pub fn queued_len(&self) -> usize {
        self.transitions.len() + self.messages.len()
    }

    pub fn status(&self) -> MachineStatus {
        self.machine.read().status()
    }

    pub fn snapshot(&self, mode: FieldsMode) -> MachineSnapshot {
        self.machine.read().snapshot(mode)
    }

    /// Run `f` with shared access to the machine.
    pub fn inspect<R>(&self, f: impl FnOnce(&StateMachine<A>) -> R) -> R {
        f(&self.machine.read())
    }

    pub fn pool(&self) -> &Arc<MessagePool> {
        &self.pool
    }

    /// Unwrap the machine. Queued work is dropped.
    pub fn into_inner(self) -> StateMachine<A> {
        self.machine.into_inner()
    }

    fn require_accepting(&self, operation: &'static str) -> Result<(), MachineError> {
        if self.accepting.load(Ordering::Acquire) {
            return Ok(());
        }
        Err(MachineError::InvalidState {
            operation,
            status: self.status(),
        })
    }

    /// Raise the pending flag, notifying only on the idle-to-pending edge.
    fn signal(&self) {
        if !self.pending.swap(true, Ordering::AcqRel) {
            if let Some(notify) = &self.notify {
                notify();
            }
        }
    }

    fn signal_if_queued(&self) {
        if self.has_queued() {
            self.signal();
        }
    }

    fn discard_queued(&self) -> (usize, usize) {
        let mut transitions = 0;
        while let Some(message) = self.transitions.pop() {
            message.recycle(&self.pool);
            transitions += 1;
        }
        let mut messages = 0;
        while let Some(message) = self.messages.pop() {
            message.recycle(&self.pool);
            messages += 1;
        }
        (transitions, messages)
    }
}

impl<A> fmt::Debug for ConcurrentStateMachine<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConcurrentStateMachine")
            .field("transitions", &self.transitions.len())
            .field("messages", &self.messages.len())
            .field("pending", &self.pending.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
