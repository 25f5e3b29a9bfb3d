//! State tree arena.
//!
//! States are registered into a [`StateTree`] before the machine is built.
//! Registration decides the composition kind of each node and hands back a
//! [`StateId`]; composites name their children by id, either through presets
//! given at registration or through their [`State::declare`] hook. Parent
//! links, regions and active children are wired when the machine initializes.

mod children;
mod snapshot;

pub use children::{Children, InitializationError};
pub use snapshot::{DebugField, DebugFields, FieldsMode, MachineSnapshot, StateSnapshot};

use crate::core::{Capabilities, CapabilityTable, NodeKind, State, StateId};
use std::any::Any;
use std::fmt;

/// Runtime wiring of a node, filled in during initialization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) enum Composition {
    #[default]
    Unwired,
    Leaf,
    Exclusive {
        children: Vec<StateId>,
        entry: Option<StateId>,
        active: Option<StateId>,
    },
    Parallel {
        branches: Vec<StateId>,
        first_region: usize,
    },
}

pub(crate) struct Node<A> {
    pub(crate) state: Option<Box<dyn State<A>>>,
    pub(crate) name: String,
    pub(crate) kind: NodeKind,
    pub(crate) caps: CapabilityTable,
    pub(crate) preset: Children,
    pub(crate) parent: Option<StateId>,
    pub(crate) attached: bool,
    pub(crate) region: usize,
    pub(crate) composition: Composition,
    pub(crate) entered: bool,
    pub(crate) initialized: bool,
}

impl<A> Node<A> {
    pub(crate) fn reset_wiring(&mut self) {
        self.parent = None;
        self.attached = false;
        self.region = 0;
        self.composition = Composition::Unwired;
        self.entered = false;
        self.initialized = false;
    }
}

/// Arena holding every state of one machine.
pub struct StateTree<A> {
    nodes: Vec<Node<A>>,
}

impl<A: 'static> Default for StateTree<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: 'static> StateTree<A> {
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    /// Register a leaf state.
    pub fn leaf<S: State<A>>(&mut self, state: S) -> StateId {
        self.register(state, NodeKind::Leaf, Children::new())
    }

    /// Register an exclusive composite whose children come from `declare`.
    pub fn exclusive<S: State<A>>(&mut self, state: S) -> StateId {
        self.register(state, NodeKind::Exclusive, Children::new())
    }

    /// Register an exclusive composite with a preset entry and child list.
    pub fn exclusive_of<S, I>(&mut self, state: S, entry: StateId, children: I) -> StateId
    where
        S: State<A>,
        I: IntoIterator<Item = StateId>,
    {
        let mut preset = Children::new();
        preset.extend(children).entry(entry);
        self.register(state, NodeKind::Exclusive, preset)
    }

    /// Register a parallel composite whose branches come from `declare`.
    pub fn parallel<S: State<A>>(&mut self, state: S) -> StateId {
        self.register(state, NodeKind::Parallel, Children::new())
    }

    /// Register a parallel composite with a preset list of branch roots.
    pub fn parallel_of<S, I>(&mut self, state: S, branches: I) -> StateId
    where
        S: State<A>,
        I: IntoIterator<Item = StateId>,
    {
        let mut preset = Children::new();
        preset.extend(branches);
        self.register(state, NodeKind::Parallel, preset)
    }

    fn register<S: State<A>>(&mut self, state: S, kind: NodeKind, preset: Children) -> StateId {
        let mut caps = Capabilities::<S>::new();
        S::capabilities(&mut caps);
        let id = StateId(self.nodes.len());
        self.nodes.push(Node {
            name: state.name().to_string(),
            state: Some(Box::new(state)),
            kind,
            caps: caps.into_table(),
            preset,
            parent: None,
            attached: false,
            region: 0,
            composition: Composition::Unwired,
            entered: false,
            initialized: false,
        });
        id
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: StateId) -> bool {
        id.0 < self.nodes.len()
    }

    /// Name of a node, or `"?"` for an unknown id.
    pub fn name_of(&self, id: StateId) -> &str {
        self.node(id).map_or("?", |node| node.name.as_str())
    }

    pub fn kind_of(&self, id: StateId) -> Option<NodeKind> {
        self.node(id).map(|node| node.kind)
    }

    pub fn capabilities_of(&self, id: StateId) -> Option<&CapabilityTable> {
        self.node(id).map(|node| &node.caps)
    }

    /// Parent of a node once the tree has been wired.
    pub fn parent_of(&self, id: StateId) -> Option<StateId> {
        self.node(id).and_then(|node| node.parent)
    }

    /// Borrow the concrete state behind `id`.
    ///
    /// Returns `None` for unknown ids, type mismatches, and for the node whose
    /// hook is currently running.
    pub fn state<S: Any>(&self, id: StateId) -> Option<&S> {
        self.node(id)?.state.as_deref()?.as_any().downcast_ref::<S>()
    }

    pub(crate) fn node(&self, id: StateId) -> Option<&Node<A>> {
        self.nodes.get(id.0)
    }

    pub(crate) fn node_mut(&mut self, id: StateId) -> Option<&mut Node<A>> {
        self.nodes.get_mut(id.0)
    }

    pub(crate) fn implements<C: ?Sized + 'static>(&self, id: StateId) -> bool {
        self.node(id).is_some_and(|node| node.caps.implements::<C>())
    }

    /// Children declared for `id`: registration preset first, then the hook.
    pub(crate) fn declared_children(&self, id: StateId) -> Children {
        let Some(node) = self.node(id) else {
            return Children::new();
        };
        let mut declared = node.preset.clone();
        if let Some(state) = node.state.as_deref() {
            let mut hook = Children::new();
            state.declare(&mut hook);
            declared.merge(hook);
        }
        declared
    }

    /// Whether `dest` is a declared child of the exclusive composite `parent`.
    pub(crate) fn is_exclusive_child(&self, parent: StateId, dest: StateId) -> bool {
        matches!(
            self.node(parent).map(|node| &node.composition),
            Some(Composition::Exclusive { children, .. }) if children.contains(&dest)
        )
    }

    pub(crate) fn take_state(&mut self, id: StateId) -> Option<Box<dyn State<A>>> {
        self.node_mut(id)?.state.take()
    }

    pub(crate) fn restore_state(&mut self, id: StateId, state: Box<dyn State<A>>) {
        if let Some(node) = self.node_mut(id) {
            node.state = Some(state);
        }
    }

    pub(crate) fn reset_wiring(&mut self) {
        for node in &mut self.nodes {
            node.reset_wiring();
        }
    }
}

impl<A> fmt::Debug for StateTree<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.nodes.iter().map(|node| (&node.name, node.kind)))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Marker {}

    struct Lamp {
        watts: u32,
    }

    impl Marker for Lamp {}

    impl State<()> for Lamp {
        fn capabilities(caps: &mut Capabilities<Self>) {
            caps.add::<dyn Marker>(|s| s);
        }
    }

    struct Room {
        lamp: StateId,
    }

    impl State<()> for Room {
        fn declare(&self, children: &mut Children) {
            children.entry(self.lamp);
        }
    }

    #[test]
    fn registration_assigns_sequential_ids() {
        let mut tree = StateTree::<()>::new();
        let a = tree.leaf(Lamp { watts: 40 });
        let b = tree.leaf(Lamp { watts: 60 });
        assert_eq!(a.index(), 0);
        assert_eq!(b.index(), 1);
        assert_eq!(tree.len(), 2);
        assert!(tree.contains(b));
        assert!(!tree.contains(StateId(2)));
    }

    #[test]
    fn registration_records_kind_name_and_capabilities() {
        let mut tree = StateTree::<()>::new();
        let lamp = tree.leaf(Lamp { watts: 40 });
        let room = tree.exclusive(Room { lamp });

        assert_eq!(tree.kind_of(lamp), Some(NodeKind::Leaf));
        assert_eq!(tree.kind_of(room), Some(NodeKind::Exclusive));
        assert_eq!(tree.name_of(room), "Room");
        assert_eq!(tree.name_of(StateId(7)), "?");
        assert!(tree.implements::<dyn Marker>(lamp));
        assert!(!tree.implements::<dyn Marker>(room));
    }

    #[test]
    fn state_downcasts_to_concrete_type() {
        let mut tree = StateTree::<()>::new();
        let lamp = tree.leaf(Lamp { watts: 40 });
        assert_eq!(tree.state::<Lamp>(lamp).map(|l| l.watts), Some(40));
        assert!(tree.state::<Room>(lamp).is_none());
    }

    #[test]
    fn declared_children_merge_preset_and_hook() {
        let mut tree = StateTree::<()>::new();
        let lamp = tree.leaf(Lamp { watts: 40 });
        let spare = tree.leaf(Lamp { watts: 60 });
        let room = tree.exclusive_of(Room { lamp }, spare, [spare]);

        let declared = tree.declared_children(room);
        assert_eq!(declared.states, vec![spare]);
        assert_eq!(declared.entry, Some(lamp));
    }

    #[test]
    fn taken_state_is_invisible_until_restored() {
        let mut tree = StateTree::<()>::new();
        let lamp = tree.leaf(Lamp { watts: 40 });

        let state = tree.take_state(lamp).unwrap();
        assert!(tree.state::<Lamp>(lamp).is_none());
        tree.restore_state(lamp, state);
        assert!(tree.state::<Lamp>(lamp).is_some());
    }
}
