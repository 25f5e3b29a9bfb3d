//! Child declarations and their validation.

use crate::core::{NodeKind, StateId};
use crate::tree::StateTree;
use stillwater::validation::Validation;
use stillwater::NonEmptyVec;
use thiserror::Error;

/// Errors found while wiring a state tree.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InitializationError {
    #[error("{parent} declares {child}, which is not part of this tree")]
    UnknownState { parent: String, child: StateId },

    #[error("the root {0} is not part of this tree")]
    UnknownRoot(StateId),

    #[error("cannot add {child} as a child of {parent}: it already has a parent")]
    AlreadyParented { parent: String, child: String },

    #[error("{parent} declares {child} more than once")]
    DuplicateChild { parent: String, child: String },

    #[error("leaf state {0} cannot declare children")]
    LeafWithChildren(String),

    #[error("parallel state {0} cannot declare an entry child")]
    ParallelEntry(String),
}

/// Children declared by a composite state.
///
/// Filled by [`State::declare`](crate::core::State::declare) and by the
/// presets given at registration time.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Children {
    pub(crate) entry: Option<StateId>,
    pub(crate) states: Vec<StateId>,
}

impl Children {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the entry child of an exclusive composite.
    ///
    /// The entry child is added to the child list if it is not already there.
    pub fn entry(&mut self, id: StateId) -> &mut Self {
        self.entry = Some(id);
        self
    }

    pub fn add(&mut self, id: StateId) -> &mut Self {
        self.states.push(id);
        self
    }

    pub fn extend<I: IntoIterator<Item = StateId>>(&mut self, ids: I) -> &mut Self {
        self.states.extend(ids);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entry.is_none() && self.states.is_empty()
    }

    pub(crate) fn merge(&mut self, other: Children) {
        if other.entry.is_some() {
            self.entry = other.entry;
        }
        self.states.extend(other.states);
    }
}

/// A validated declaration, ready to be wired.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct Declaration {
    pub(crate) children: Vec<StateId>,
    pub(crate) entry: Option<StateId>,
}

type Check = Validation<(), NonEmptyVec<InitializationError>>;

impl<A: 'static> StateTree<A> {
    /// Validate the declaration of `parent`, accumulating every problem.
    pub(crate) fn validate(
        &self,
        parent: StateId,
        declared: Children,
    ) -> Result<Declaration, Vec<InitializationError>> {
        let parent_name = self.name_of(parent).to_string();
        let kind = self.kind_of(parent);

        let mut children = declared.states;
        if let Some(entry) = declared.entry {
            if !children.contains(&entry) {
                children.push(entry);
            }
        }

        let mut checks: Vec<Check> = Vec::new();
        if kind == Some(NodeKind::Leaf) && !children.is_empty() {
            checks.push(Validation::fail(InitializationError::LeafWithChildren(
                parent_name.clone(),
            )));
        }
        if kind == Some(NodeKind::Parallel) && declared.entry.is_some() {
            checks.push(Validation::fail(InitializationError::ParallelEntry(
                parent_name.clone(),
            )));
        }
        for (index, child) in children.iter().enumerate() {
            checks.push(self.check_child(&parent_name, *child, &children[..index]));
        }

        match Validation::all_vec(checks) {
            Validation::Success(_) => Ok(Declaration {
                children,
                entry: declared.entry,
            }),
            Validation::Failure(errors) => Err(errors.iter().cloned().collect()),
        }
    }

    fn check_child(&self, parent: &str, child: StateId, earlier: &[StateId]) -> Check {
        let Some(node) = self.node(child) else {
            return Validation::fail(InitializationError::UnknownState {
                parent: parent.to_string(),
                child,
            });
        };
        if earlier.contains(&child) {
            return Validation::fail(InitializationError::DuplicateChild {
                parent: parent.to_string(),
                child: node.name.clone(),
            });
        }
        if node.attached {
            return Validation::fail(InitializationError::AlreadyParented {
                parent: parent.to_string(),
                child: node.name.clone(),
            });
        }
        Validation::success(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::State;

    struct Blank;
    impl State<()> for Blank {}

    struct Group;
    impl State<()> for Group {}

    #[test]
    fn entry_outside_declared_set_is_appended() {
        let mut tree = StateTree::<()>::new();
        let a = tree.leaf(Blank);
        let b = tree.leaf(Blank);
        let group = tree.exclusive(Group);

        let mut declared = Children::new();
        declared.add(a).entry(b);

        let declaration = tree.validate(group, declared).unwrap();
        assert_eq!(declaration.children, vec![a, b]);
        assert_eq!(declaration.entry, Some(b));
    }

    #[test]
    fn all_problems_are_reported_together() {
        let mut tree = StateTree::<()>::new();
        let a = tree.leaf(Blank);
        let group = tree.exclusive(Group);
        let foreign = StateId(99);

        let mut declared = Children::new();
        declared.add(a).add(a).add(foreign);

        let errors = tree.validate(group, declared).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors
            .iter()
            .any(|e| matches!(e, InitializationError::DuplicateChild { .. })));
        assert!(errors.iter().any(|e| matches!(
            e,
            InitializationError::UnknownState { child, .. } if *child == foreign
        )));
    }

    #[test]
    fn attached_child_is_rejected() {
        let mut tree = StateTree::<()>::new();
        let a = tree.leaf(Blank);
        let group = tree.exclusive(Group);
        tree.node_mut(a).unwrap().attached = true;

        let mut declared = Children::new();
        declared.add(a);

        let errors = tree.validate(group, declared).unwrap_err();
        assert_eq!(
            errors,
            vec![InitializationError::AlreadyParented {
                parent: "Group".to_string(),
                child: "Blank".to_string(),
            }]
        );
    }

    #[test]
    fn leaf_cannot_declare_children() {
        let mut tree = StateTree::<()>::new();
        let a = tree.leaf(Blank);
        let b = tree.leaf(Blank);

        let mut declared = Children::new();
        declared.add(b);

        let errors = tree.validate(a, declared).unwrap_err();
        assert_eq!(errors, vec![InitializationError::LeafWithChildren("Blank".to_string())]);
    }

    #[test]
    fn parallel_cannot_declare_entry() {
        let mut tree = StateTree::<()>::new();
        let a = tree.leaf(Blank);
        let group = tree.parallel(Group);

        let mut declared = Children::new();
        declared.entry(a);

        let errors = tree.validate(group, declared).unwrap_err();
        assert_eq!(errors, vec![InitializationError::ParallelEntry("Group".to_string())]);
    }

    #[test]
    fn merge_keeps_order_and_latest_entry() {
        let mut preset = Children::new();
        preset.add(StateId(1)).entry(StateId(1));
        let mut hook = Children::new();
        hook.extend([StateId(2), StateId(3)]).entry(StateId(3));

        preset.merge(hook);
        assert_eq!(preset.states, vec![StateId(1), StateId(2), StateId(3)]);
        assert_eq!(preset.entry, Some(StateId(3)));
        assert!(!preset.is_empty());
    }
}
