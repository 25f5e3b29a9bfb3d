//! Core State trait for state tree nodes.
//!
//! A state is a piece of behaviour that lives at one node of a state tree.
//! The tree decides how the state is composed (leaf, exclusive or parallel);
//! the state itself only supplies hooks and the capabilities it answers to.

use crate::core::capability::Capabilities;
use crate::machine::Context;
use crate::tree::{Children, DebugFields};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;

/// Stable handle of a node inside a [`StateTree`](crate::tree::StateTree).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StateId(pub(crate) usize);

impl StateId {
    /// Position of the node in its tree.
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// How a node composes its children.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// No children.
    Leaf,
    /// Exactly one active child at a time.
    Exclusive,
    /// Every child is active, each in its own region.
    Parallel,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Leaf => "leaf",
            Self::Exclusive => "exclusive",
            Self::Parallel => "parallel",
        };
        f.write_str(text)
    }
}

/// Upcast helper so trait objects can be downcast to their concrete state.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Trait for state tree nodes.
///
/// `A` is the actor type: the external object the machine's behaviour is bound
/// to. Every hook receives a [`Context`] giving access to the actor and to the
/// machine's request queues.
///
/// All hooks have empty defaults, so a plain marker struct is already a valid
/// leaf state.
///
/// # Example
///
/// ```rust
/// use orthostate::core::{Capabilities, Handler, State};
/// use orthostate::machine::{Context, StateMachine};
/// use orthostate::tree::StateTree;
///
/// trait Ping {
///     fn ping(&mut self, ctx: &mut Context<'_, Vec<&'static str>>);
/// }
///
/// struct Idle;
///
/// impl Ping for Idle {
///     fn ping(&mut self, ctx: &mut Context<'_, Vec<&'static str>>) {
///         ctx.actor_mut().push("pong");
///     }
/// }
///
/// impl State<Vec<&'static str>> for Idle {
///     fn capabilities(caps: &mut Capabilities<Self>) {
///         caps.add::<dyn Ping>(|s| s);
///     }
/// }
///
/// let mut tree = StateTree::new();
/// let idle = tree.leaf(Idle);
/// let mut machine = StateMachine::new("ping", tree, idle);
/// machine.initialize(Vec::new()).unwrap();
///
/// let ping: Handler<Vec<&'static str>, dyn Ping> = Handler::new(|s, ctx, _| s.ping(ctx));
/// machine.send(ping).unwrap();
/// assert_eq!(machine.actor(), Some(&vec!["pong"]));
/// ```
pub trait State<A>: AsAny + Send + Sync {
    /// Name used for logging and debug views.
    ///
    /// Defaults to the unqualified type name.
    fn name(&self) -> &str {
        short_type_name(std::any::type_name::<Self>())
    }

    /// Register the capabilities this state answers to.
    fn capabilities(_caps: &mut Capabilities<Self>)
    where
        Self: Sized,
    {
    }

    /// Declare children. Only meaningful for composite nodes.
    fn declare(&self, _children: &mut Children) {}

    /// Runs once, after the node has been wired into the tree.
    fn on_initialize(&mut self, _ctx: &mut Context<'_, A>) {}

    /// Entry behaviour of a transition without an argument.
    fn enter(&mut self, _ctx: &mut Context<'_, A>) {}

    /// Runs after every entry, before children are entered.
    fn on_enter(&mut self, _ctx: &mut Context<'_, A>) {}

    /// Runs after active children have exited.
    fn on_exit(&mut self, _ctx: &mut Context<'_, A>) {}

    /// Runs once when the machine shuts down, after children.
    fn on_shutdown(&mut self, _ctx: &mut Context<'_, A>) {}

    /// Contribute fields to debug snapshots.
    fn debug_fields(&self, _fields: &mut DebugFields) {}
}

/// Entry behaviour of a transition that carries an argument of type `T`.
///
/// Register it as a capability (`caps.add::<dyn EnterWith<A, T>>(|s| s)`) on
/// states that expect [`transition_with`](crate::machine::StateMachine::transition_with).
pub trait EnterWith<A, T> {
    fn enter_with(&mut self, ctx: &mut Context<'_, A>, arg: T);
}

/// Strip the module path (and generic arguments) from a type name.
pub(crate) fn short_type_name(full: &str) -> &str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}
