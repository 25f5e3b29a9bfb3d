//! Capability tables and typed message handlers.
//!
//! A capability is a trait object type such as `dyn Update`. Messages are
//! addressed by capability instead of by concrete state: every node whose
//! state registered the capability is a candidate receiver.

use crate::machine::Context;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;

type Caster<C> = Box<dyn Fn(&mut dyn Any) -> Option<&mut C> + Send + Sync>;

struct Entry {
    caster: Box<dyn Any + Send + Sync>,
    name: &'static str,
}

/// Type-erased capability table of one node.
#[derive(Default)]
pub struct CapabilityTable {
    entries: HashMap<TypeId, Entry>,
}

impl CapabilityTable {
    /// Whether the node answers to capability `C`.
    pub fn implements<C: ?Sized + 'static>(&self) -> bool {
        self.entries.contains_key(&TypeId::of::<C>())
    }

    /// Cast a state to capability `C`, if registered.
    pub(crate) fn cast<'a, C: ?Sized + 'static>(&self, state: &'a mut dyn Any) -> Option<&'a mut C> {
        let caster = self
            .entries
            .get(&TypeId::of::<C>())?
            .caster
            .downcast_ref::<Caster<C>>()?;
        caster(state)
    }

    /// Names of the registered capabilities, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.entries.values().map(|e| e.name).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for CapabilityTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.names()).finish()
    }
}

// Pins the closure signature so the returned borrow is tied to the argument.
fn caster<C: ?Sized, F>(f: F) -> F
where
    F: Fn(&mut dyn Any) -> Option<&mut C>,
{
    f
}

/// Capability registration for a concrete state type `S`.
///
/// Passed to [`State::capabilities`](crate::core::State::capabilities). The
/// cast function is almost always the identity closure `|s| s`, which the
/// compiler coerces to the trait object.
pub struct Capabilities<S> {
    table: CapabilityTable,
    _state: PhantomData<fn(&mut S)>,
}

impl<S: Any> Capabilities<S> {
    pub(crate) fn new() -> Self {
        Self {
            table: CapabilityTable::default(),
            _state: PhantomData,
        }
    }

    /// Register capability `C`.
    pub fn add<C: ?Sized + 'static>(&mut self, cast: fn(&mut S) -> &mut C) -> &mut Self {
        let caster: Caster<C> = Box::new(caster(move |state| state.downcast_mut::<S>().map(cast)));
        self.table.entries.insert(
            TypeId::of::<C>(),
            Entry {
                caster: Box::new(caster),
                name: std::any::type_name::<C>(),
            },
        );
        self
    }

    pub(crate) fn into_table(self) -> CapabilityTable {
        self.table
    }
}

/// Typed message handler: "call this on any state implementing `C`".
///
/// `A` is the actor type, `C` the capability (a trait object type) and `T`
/// the argument type, `()` for argument-less messages. The argument is passed
/// by reference because a single message may be offered to several states.
pub struct Handler<A, C: ?Sized, T = ()> {
    call: fn(&mut C, &mut Context<'_, A>, &T),
}

impl<A, C: ?Sized, T> Handler<A, C, T> {
    pub const fn new(call: fn(&mut C, &mut Context<'_, A>, &T)) -> Self {
        Self { call }
    }

    pub(crate) fn invoke(&self, receiver: &mut C, ctx: &mut Context<'_, A>, arg: &T) {
        (self.call)(receiver, ctx, arg)
    }
}

impl<A, C: ?Sized + 'static, T> Handler<A, C, T> {
    /// Type name of the addressed capability.
    pub fn capability_name(&self) -> &'static str {
        std::any::type_name::<C>()
    }
}

impl<A, C: ?Sized, T> Clone for Handler<A, C, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<A, C: ?Sized, T> Copy for Handler<A, C, T> {}

impl<A, C: ?Sized + 'static, T> fmt::Debug for Handler<A, C, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("capability", &self.capability_name())
            .finish()
    }
}
