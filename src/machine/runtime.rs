//! Tree mutation: wiring, enter/exit, dispatch and sessions.
//!
//! Every region (the whole tree, plus one per parallel branch) keeps a pointer
//! to its active node. Dispatch starts there and walks toward the region
//! boundary. A state is taken out of its node while one of its hooks runs, so
//! the hook's [`Context`] can read the rest of the tree.

use crate::core::{short_type_name, CapabilityTable, NodeKind, State, StateId};
use crate::machine::log::MachineLog;
use crate::machine::Context;
use crate::message::{Dispatch, Message, MessagePool};
use crate::tree::{Composition, InitializationError, StateTree};
use std::collections::VecDeque;
use std::sync::Arc;

/// Region of the whole tree. Parallel branches get the following indices.
pub(crate) const ROOT_REGION: usize = 0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Region {
    pub(crate) boundary: StateId,
    pub(crate) active: StateId,
}

/// Requests issued while a session runs, plus the dispatch flags.
pub(crate) struct Session<A> {
    pub(crate) transitions: VecDeque<Message<A>>,
    pub(crate) messages: VecDeque<Message<A>>,
    pub(crate) consumed: bool,
    pub(crate) shutdown_requested: bool,
}

impl<A> Default for Session<A> {
    fn default() -> Self {
        Self {
            transitions: VecDeque::new(),
            messages: VecDeque::new(),
            consumed: false,
            shutdown_requested: false,
        }
    }
}

impl<A> Session<A> {
    /// Next queued item, transitions first.
    pub(crate) fn next(&mut self) -> Option<Message<A>> {
        self.transitions
            .pop_front()
            .or_else(|| self.messages.pop_front())
    }
}

pub(crate) struct Runtime<A> {
    pub(crate) name: String,
    pub(crate) tree: StateTree<A>,
    pub(crate) regions: Vec<Region>,
    pub(crate) session: Session<A>,
    pub(crate) actor: Option<A>,
    pub(crate) pool: Arc<MessagePool>,
    pub(crate) log: MachineLog,
}

impl<A: 'static> Runtime<A> {
    pub(crate) fn new(name: String, tree: StateTree<A>, pool: Arc<MessagePool>, log: MachineLog) -> Self {
        Self {
            name,
            tree,
            regions: Vec::new(),
            session: Session::default(),
            actor: None,
            pool,
            log,
        }
    }

    /// Run `f` on the state of `id` with a context for that node.
    ///
    /// Returns `None` without calling `f` if the node is unknown, its state is
    /// already borrowed, or no actor is installed.
    pub(crate) fn with_state<R, F>(&mut self, id: StateId, f: F) -> Option<R>
    where
        F: FnOnce(&mut Box<dyn State<A>>, &CapabilityTable, &mut Context<'_, A>) -> R,
    {
        let actor = self.actor.as_mut()?;
        let mut state = self.tree.take_state(id)?;
        let result = self.tree.node(id).map(|node| {
            let mut ctx = Context::new(
                id,
                &self.tree,
                &mut self.session,
                actor,
                &self.pool,
                &self.log,
                &self.name,
            );
            f(&mut state, &node.caps, &mut ctx)
        });
        self.tree.restore_state(id, state);
        result
    }

    /// Call `f` on the state of `node` viewed as capability `C`.
    ///
    /// Returns whether the node answers to `C`. The consumed flag is set just
    /// before `f` runs.
    pub(crate) fn invoke<C, F>(&mut self, node: StateId, f: F) -> bool
    where
        C: ?Sized + 'static,
        F: FnOnce(&mut C, &mut Context<'_, A>),
    {
        if !self.tree.implements::<C>(node) {
            return false;
        }
        self.session.consumed = true;
        self.with_state(node, |state, caps, ctx| {
            if let Some(receiver) = caps.cast::<C>((**state).as_any_mut()) {
                f(receiver, ctx);
            }
        });
        true
    }

    /// Offer a message to a region, starting at its active node.
    ///
    /// Returns whether some state consumed it.
    pub(crate) fn deliver(&mut self, region: usize, message: &mut dyn Dispatch<A>) -> bool {
        let Some(Region { boundary, active }) = self.regions.get(region).copied() else {
            return false;
        };

        if let Some(branch_regions) = self.branch_regions(active) {
            let mut any_branch = false;
            for branch in branch_regions {
                self.session.consumed = false;
                let consumed = self.deliver(branch, message);
                self.report_branch(branch, message.receiver_name(), consumed);
                any_branch |= consumed;
            }
            if any_branch {
                return true;
            }
        }

        let mut node = active;
        loop {
            tracing::trace!(
                machine = %self.name,
                state = self.tree.name_of(node),
                receiver = message.receiver_name(),
                "offering message"
            );
            if message.offer(self, node) && self.session.consumed {
                return true;
            }
            if node == boundary {
                return false;
            }
            match self.tree.parent_of(node) {
                Some(parent) => node = parent,
                None => return false,
            }
        }
    }

    /// Record whether the branch rooted at `region` consumed a message.
    fn report_branch(&self, region: usize, receiver: &'static str, consumed: bool) {
        let Some(region) = self.regions.get(region) else {
            return;
        };
        let branch = self.tree.name_of(region.boundary);
        let receiver = short_type_name(receiver);
        tracing::debug!(machine = %self.name, branch, receiver, consumed, "branch dispatch");
        self.log.trace(|| {
            if consumed {
                format!("{} {} branch consumed {}", self.name, branch, receiver)
            } else {
                format!("{} {} branch did not consume {}", self.name, branch, receiver)
            }
        });
    }

    /// Regions of the branches of a parallel node.
    fn branch_regions(&self, id: StateId) -> Option<std::ops::Range<usize>> {
        match &self.tree.node(id)?.composition {
            Composition::Parallel {
                branches,
                first_region,
            } => Some(*first_region..*first_region + branches.len()),
            _ => None,
        }
    }

    /// Dispatch one message from the root region and return it to the pool.
    pub(crate) fn execute(&mut self, mut message: Message<A>) {
        self.session.consumed = false;
        let consumed = self.deliver(ROOT_REGION, message.body_mut());
        if !consumed {
            if message.is_transition() {
                tracing::debug!(machine = %self.name, "transition missed every active composite");
                self.log.trace(|| format!("{} transition not taken", self.name));
            } else {
                tracing::trace!(
                    machine = %self.name,
                    receiver = message.receiver_name(),
                    "message not consumed"
                );
            }
        }
        message.recycle(&self.pool);
    }

    /// Empty both queues, returning what was left in each.
    pub(crate) fn discard_pending(&mut self) -> (usize, usize) {
        let transitions: Vec<_> = self.session.transitions.drain(..).collect();
        let messages: Vec<_> = self.session.messages.drain(..).collect();
        let counts = (transitions.len(), messages.len());
        for message in transitions.into_iter().chain(messages) {
            message.recycle(&self.pool);
        }
        self.session.shutdown_requested = false;
        counts
    }

    fn enter_begin(&mut self, id: StateId) {
        let Some(node) = self.tree.node_mut(id) else {
            return;
        };
        node.entered = true;
        if let Composition::Exclusive { entry, active, .. } = &mut node.composition {
            *active = *entry;
        }
        let region = node.region;
        if let Some(region) = self.regions.get_mut(region) {
            region.active = id;
        }

        let state = self.tree.name_of(id);
        tracing::debug!(machine = %self.name, state, "entering state");
        self.log.trace(|| format!("{} entering {}", self.name, state));
    }

    fn enter_end(&mut self, id: StateId) {
        self.with_state(id, |state, _, ctx| state.on_enter(ctx));
        match self.tree.node(id).map(|node| node.composition.clone()) {
            Some(Composition::Exclusive {
                entry: Some(entry), ..
            }) => self.enter(entry),
            Some(Composition::Parallel { branches, .. }) => {
                for branch in branches {
                    self.enter(branch);
                }
            }
            _ => {}
        }
    }

    /// Enter triple with a custom entry step.
    pub(crate) fn enter_by<F>(&mut self, id: StateId, step: F)
    where
        F: FnOnce(&mut Box<dyn State<A>>, &CapabilityTable, &mut Context<'_, A>),
    {
        self.enter_begin(id);
        self.with_state(id, step);
        self.enter_end(id);
    }

    pub(crate) fn enter(&mut self, id: StateId) {
        self.enter_by(id, |state, _, ctx| state.enter(ctx));
    }

    /// Exit `id` and everything active below it.
    pub(crate) fn exit(&mut self, id: StateId) {
        let Some(node) = self.tree.node(id) else {
            return;
        };
        if !node.entered {
            return;
        }
        match node.composition.clone() {
            Composition::Exclusive {
                active: Some(active),
                ..
            } => self.exit(active),
            Composition::Parallel { branches, .. } => {
                for branch in branches {
                    self.exit(branch);
                }
            }
            _ => {}
        }

        self.with_state(id, |state, _, ctx| state.on_exit(ctx));

        let state = self.tree.name_of(id);
        tracing::debug!(machine = %self.name, state, "exiting state");
        self.log.trace(|| format!("{} exiting {}", self.name, state));

        let Some(node) = self.tree.node_mut(id) else {
            return;
        };
        node.entered = false;
        if let Composition::Exclusive { active, .. } = &mut node.composition {
            *active = None;
        }
        let parent = node.parent;
        if let Some(region) = self.regions.get_mut(node.region) {
            region.active = match parent {
                Some(parent) if region.boundary != id => parent,
                _ => id,
            };
        }
    }

    /// Switch the active child of the exclusive composite `parent` to `dest`.
    pub(crate) fn transit<F>(&mut self, parent: StateId, dest: StateId, step: F)
    where
        F: FnOnce(&mut Box<dyn State<A>>, &CapabilityTable, &mut Context<'_, A>),
    {
        if let Some(active) = self.active_child(parent) {
            self.exit(active);
        }
        if let Some(node) = self.tree.node_mut(parent) {
            if let Composition::Exclusive { active, .. } = &mut node.composition {
                *active = Some(dest);
            }
        }
        tracing::debug!(
            machine = %self.name,
            composite = self.tree.name_of(parent),
            dest = self.tree.name_of(dest),
            "transition"
        );
        self.enter_by(dest, step);
    }

    pub(crate) fn active_child(&self, id: StateId) -> Option<StateId> {
        match &self.tree.node(id)?.composition {
            Composition::Exclusive { active, .. } => *active,
            _ => None,
        }
    }

    /// Active node of every region reachable from the root, leaves only.
    pub(crate) fn active_leaves(&self) -> Vec<StateId> {
        let mut leaves = Vec::new();
        self.collect_active(ROOT_REGION, &mut leaves);
        leaves
    }

    fn collect_active(&self, region: usize, out: &mut Vec<StateId>) {
        let Some(region) = self.regions.get(region) else {
            return;
        };
        let active = region.active;
        if !self.tree.node(active).is_some_and(|node| node.entered) {
            return;
        }
        match self.branch_regions(active) {
            Some(branches) if !branches.is_empty() => {
                for branch in branches {
                    self.collect_active(branch, out);
                }
            }
            _ => out.push(active),
        }
    }

    /// Wire the tree below `root` and run every `on_initialize` hook.
    ///
    /// All declaration problems are collected. On failure the tree is rolled
    /// back to its unwired state.
    pub(crate) fn build(&mut self, root: StateId) -> Result<(), Vec<InitializationError>> {
        let Some(node) = self.tree.node_mut(root) else {
            return Err(vec![InitializationError::UnknownRoot(root)]);
        };
        node.attached = true;
        node.region = ROOT_REGION;
        self.regions.clear();
        self.regions.push(Region {
            boundary: root,
            active: root,
        });

        let mut errors = Vec::new();
        self.wire(root, &mut errors);
        if errors.is_empty() {
            return Ok(());
        }

        self.shutdown_node(root);
        self.tree.reset_wiring();
        self.regions.clear();
        Err(errors)
    }

    fn wire(&mut self, id: StateId, errors: &mut Vec<InitializationError>) {
        let declared = self.tree.declared_children(id);
        let declaration = match self.tree.validate(id, declared) {
            Ok(declaration) => declaration,
            Err(found) => {
                errors.extend(found);
                return;
            }
        };

        let Some(node) = self.tree.node(id) else {
            return;
        };
        let kind = node.kind;
        let region = node.region;
        let first_region = self.regions.len();
        let parallel = kind == NodeKind::Parallel;

        for (index, child) in declaration.children.iter().enumerate() {
            let child_region = if parallel {
                self.regions.push(Region {
                    boundary: *child,
                    active: *child,
                });
                first_region + index
            } else {
                region
            };
            if let Some(child) = self.tree.node_mut(*child) {
                child.parent = Some(id);
                child.attached = true;
                child.region = child_region;
            }
        }

        let composition = match kind {
            NodeKind::Leaf => Composition::Leaf,
            NodeKind::Exclusive => Composition::Exclusive {
                children: declaration.children.clone(),
                entry: declaration.entry,
                active: None,
            },
            NodeKind::Parallel => Composition::Parallel {
                branches: declaration.children.clone(),
                first_region,
            },
        };
        if let Some(node) = self.tree.node_mut(id) {
            node.composition = composition;
            node.initialized = true;
        }
        self.with_state(id, |state, _, ctx| state.on_initialize(ctx));

        for child in declaration.children {
            self.wire(child, errors);
        }
    }

    /// Run `on_shutdown` children first and release the wiring.
    pub(crate) fn shutdown_tree(&mut self, root: StateId) {
        self.shutdown_node(root);
        self.tree.reset_wiring();
        self.regions.clear();
    }

    fn shutdown_node(&mut self, id: StateId) {
        let children = match self.tree.node(id).map(|node| &node.composition) {
            Some(Composition::Exclusive { children, .. }) => children.clone(),
            Some(Composition::Parallel { branches, .. }) => branches.clone(),
            _ => Vec::new(),
        };
        for child in children {
            self.shutdown_node(child);
        }
        if self.tree.node(id).is_some_and(|node| node.initialized) {
            self.with_state(id, |state, _, ctx| state.on_shutdown(ctx));
        }
    }
}
