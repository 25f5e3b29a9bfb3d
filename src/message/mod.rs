//! Pooled messages.
//!
//! A message is one pending unit of work: a capability handler plus its
//! argument, or a transition request plus its optional entry argument. Bodies
//! come from the machine's [`MessagePool`], travel through the queues as owned
//! boxes and go back to the pool, cleared, once they have been dispatched.

mod pool;

pub use pool::{MessagePool, PoolStats};

use crate::core::{CapabilityTable, EnterWith, Handler, NodeKind, State, StateId};
use crate::machine::{Context, Runtime};
use std::fmt;

/// Type-erased message body.
pub(crate) trait Dispatch<A>: Send + Sync {
    /// Offer the message to `node`.
    ///
    /// Returns `true` if the node answers to the addressed capability. The
    /// runtime's consumed flag tells whether propagation should stop.
    fn offer(&mut self, rt: &mut Runtime<A>, node: StateId) -> bool;

    fn receiver_name(&self) -> &'static str;

    /// Clear the body and hand it back to `pool`.
    fn recycle(self: Box<Self>, pool: &MessagePool);
}

/// Body of a capability message.
pub(crate) struct MessageSlot<A, C: ?Sized, T> {
    handler: Option<Handler<A, C, T>>,
    arg: Option<T>,
}

impl<A, C: ?Sized, T> Default for MessageSlot<A, C, T> {
    fn default() -> Self {
        Self {
            handler: None,
            arg: None,
        }
    }
}

impl<A, C, T> Dispatch<A> for MessageSlot<A, C, T>
where
    A: 'static,
    C: ?Sized + 'static,
    T: Send + Sync + 'static,
{
    fn offer(&mut self, rt: &mut Runtime<A>, node: StateId) -> bool {
        let (Some(handler), Some(arg)) = (self.handler, self.arg.as_ref()) else {
            return false;
        };
        rt.invoke::<C, _>(node, |receiver, ctx| handler.invoke(receiver, ctx, arg))
    }

    fn receiver_name(&self) -> &'static str {
        std::any::type_name::<C>()
    }

    fn recycle(mut self: Box<Self>, pool: &MessagePool) {
        self.handler = None;
        self.arg = None;
        pool.give_back(self);
    }
}

/// Body of a transition request.
///
/// Exclusive composites answer to transitions: the first one on the walk
/// that lists `dest` among its children performs the switch. Any other
/// composite lets the request propagate.
pub(crate) struct TransitionSlot<T> {
    dest: Option<StateId>,
    arg: Option<T>,
}

impl<T> Default for TransitionSlot<T> {
    fn default() -> Self {
        Self {
            dest: None,
            arg: None,
        }
    }
}

impl<A, T> Dispatch<A> for TransitionSlot<T>
where
    A: 'static,
    T: Send + Sync + 'static,
{
    fn offer(&mut self, rt: &mut Runtime<A>, node: StateId) -> bool {
        let Some(dest) = self.dest else {
            return false;
        };
        if rt.tree.kind_of(node) != Some(NodeKind::Exclusive) {
            return false;
        }

        if !rt.tree.is_exclusive_child(node, dest) {
            rt.session.consumed = false;
            return true;
        }

        rt.session.consumed = true;
        match self.arg.take() {
            None => rt.transit(node, dest, |state, _, ctx| state.enter(ctx)),
            Some(arg) => rt.transit(node, dest, move |state, caps, ctx| {
                enter_with(state, caps, ctx, arg)
            }),
        }
        true
    }

    fn receiver_name(&self) -> &'static str {
        "transition"
    }

    fn recycle(mut self: Box<Self>, pool: &MessagePool) {
        self.dest = None;
        self.arg = None;
        pool.give_back(self);
    }
}

/// Run the argument-carrying entry behaviour, falling back to `enter`.
fn enter_with<A: 'static, T: 'static>(
    state: &mut Box<dyn State<A>>,
    caps: &CapabilityTable,
    ctx: &mut Context<'_, A>,
    arg: T,
) {
    if let Some(receiver) = caps.cast::<dyn EnterWith<A, T>>((**state).as_any_mut()) {
        receiver.enter_with(ctx, arg);
        return;
    }
    tracing::warn!(
        machine = ctx.machine_name(),
        state = ctx.name(),
        arg = std::any::type_name::<T>(),
        "state does not accept a transition argument; running plain enter"
    );
    state.enter(ctx);
}

/// One queued unit of work.
pub(crate) struct Message<A> {
    body: Box<dyn Dispatch<A>>,
    transition: bool,
}

impl<A: 'static> Message<A> {
    pub(crate) fn new<C, T>(pool: &MessagePool, handler: Handler<A, C, T>, arg: T) -> Self
    where
        C: ?Sized + 'static,
        T: Send + Sync + 'static,
    {
        let mut slot = pool.take::<MessageSlot<A, C, T>>();
        slot.handler = Some(handler);
        slot.arg = Some(arg);
        Self {
            body: slot,
            transition: false,
        }
    }

    /// A transition to `dest`. `None` runs the plain entry behaviour.
    pub(crate) fn transition<T>(pool: &MessagePool, dest: StateId, arg: Option<T>) -> Self
    where
        T: Send + Sync + 'static,
    {
        let mut slot = pool.take::<TransitionSlot<T>>();
        slot.dest = Some(dest);
        slot.arg = arg;
        Self {
            body: slot,
            transition: true,
        }
    }
}

impl<A> Message<A> {
    pub(crate) fn is_transition(&self) -> bool {
        self.transition
    }

    pub(crate) fn receiver_name(&self) -> &'static str {
        self.body.receiver_name()
    }

    pub(crate) fn body_mut(&mut self) -> &mut dyn Dispatch<A> {
        self.body.as_mut()
    }

    pub(crate) fn recycle(self, pool: &MessagePool) {
        self.body.recycle(pool);
    }
}

impl<A> fmt::Debug for Message<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("receiver", &self.receiver_name())
            .field("transition", &self.transition)
            .finish()
    }
}
