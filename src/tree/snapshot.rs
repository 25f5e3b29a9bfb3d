//! Read-only views of a state tree for debug tooling.

use crate::core::{NodeKind, StateId};
use crate::machine::MachineStatus;
use crate::tree::{Composition, StateTree};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Which debug fields a snapshot includes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldsMode {
    #[default]
    None,
    /// Only fields marked with [`DebugFields::show`].
    Shown,
    /// Every reported field.
    All,
}

/// One named value reported by a state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugField {
    pub name: String,
    pub value: String,
    pub shown: bool,
}

/// Collector passed to [`State::debug_fields`](crate::core::State::debug_fields).
#[derive(Debug, Default)]
pub struct DebugFields {
    fields: Vec<DebugField>,
}

impl DebugFields {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Report a field that is always displayed.
    pub fn show(&mut self, name: &str, value: impl fmt::Display) -> &mut Self {
        self.push(name, value, true)
    }

    /// Report a field that is only displayed in [`FieldsMode::All`].
    pub fn field(&mut self, name: &str, value: impl fmt::Display) -> &mut Self {
        self.push(name, value, false)
    }

    fn push(&mut self, name: &str, value: impl fmt::Display, shown: bool) -> &mut Self {
        self.fields.push(DebugField {
            name: name.to_string(),
            value: value.to_string(),
            shown,
        });
        self
    }

    pub(crate) fn select(self, mode: FieldsMode) -> Vec<DebugField> {
        match mode {
            FieldsMode::None => Vec::new(),
            FieldsMode::Shown => self.fields.into_iter().filter(|f| f.shown).collect(),
            FieldsMode::All => self.fields,
        }
    }
}

/// Snapshot of one node and its wired children.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub id: StateId,
    pub name: String,
    pub kind: NodeKind,
    pub active: bool,
    pub capabilities: Vec<String>,
    pub fields: Vec<DebugField>,
    pub children: Vec<StateSnapshot>,
}

impl StateSnapshot {
    /// Depth-first search by name.
    pub fn find(&self, name: &str) -> Option<&StateSnapshot> {
        if self.name == name {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(name))
    }

    fn render(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let marker = if self.active { '*' } else { ' ' };
        let indent = "  ".repeat(depth);
        match self.kind {
            NodeKind::Leaf => writeln!(f, "{indent}{marker} {}", self.name)?,
            kind => writeln!(f, "{indent}{marker} {} ({kind})", self.name)?,
        }
        for field in &self.fields {
            writeln!(f, "{indent}    {}: {}", field.name, field.value)?;
        }
        for child in &self.children {
            child.render(f, depth + 1)?;
        }
        Ok(())
    }
}

/// Snapshot of a whole machine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MachineSnapshot {
    pub machine: String,
    pub machine_id: Uuid,
    pub status: MachineStatus,
    pub taken_at: DateTime<Utc>,
    /// `None` unless the machine is initialized.
    pub root: Option<StateSnapshot>,
}

impl fmt::Display for MachineSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} [{}]", self.machine, self.status)?;
        match &self.root {
            Some(root) => root.render(f, 0),
            None => writeln!(f, "  (not initialized)"),
        }
    }
}

impl<A: 'static> StateTree<A> {
    pub(crate) fn snapshot(&self, id: StateId, mode: FieldsMode) -> Option<StateSnapshot> {
        let node = self.node(id)?;

        let mut fields = DebugFields::new();
        if mode != FieldsMode::None {
            if let Some(state) = node.state.as_deref() {
                state.debug_fields(&mut fields);
            }
        }

        let child_ids: &[StateId] = match &node.composition {
            Composition::Exclusive { children, .. } => children,
            Composition::Parallel { branches, .. } => branches,
            Composition::Leaf | Composition::Unwired => &[],
        };

        Some(StateSnapshot {
            id,
            name: node.name.clone(),
            kind: node.kind,
            active: node.entered,
            capabilities: node.caps.names().into_iter().map(String::from).collect(),
            fields: fields.select(mode),
            children: child_ids
                .iter()
                .filter_map(|child| self.snapshot(*child, mode))
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(name: &str, active: bool) -> StateSnapshot {
        StateSnapshot {
            id: StateId(0),
            name: name.to_string(),
            kind: NodeKind::Leaf,
            active,
            capabilities: Vec::new(),
            fields: Vec::new(),
            children: Vec::new(),
        }
    }

    #[test]
    fn fields_mode_filters_hidden_fields() {
        let build = || {
            let mut fields = DebugFields::new();
            fields.show("speed", 0.5).field("target", 1);
            fields
        };

        assert!(build().select(FieldsMode::None).is_empty());
        let shown = build().select(FieldsMode::Shown);
        assert_eq!(shown.len(), 1);
        assert_eq!(shown[0].name, "speed");
        assert_eq!(shown[0].value, "0.5");
        assert_eq!(build().select(FieldsMode::All).len(), 2);
    }

    #[test]
    fn find_searches_depth_first() {
        let mut root = leaf("Door", true);
        root.kind = NodeKind::Exclusive;
        root.children = vec![leaf("Open", false), leaf("Closed", true)];

        assert_eq!(root.find("Closed").map(|s| s.active), Some(true));
        assert!(root.find("Ajar").is_none());
    }

    #[test]
    fn display_renders_an_outline() {
        let mut root = leaf("Door", true);
        root.kind = NodeKind::Exclusive;
        let mut closed = leaf("Closed", true);
        closed.fields.push(DebugField {
            name: "locked".to_string(),
            value: "true".to_string(),
            shown: true,
        });
        root.children = vec![leaf("Open", false), closed];

        let snapshot = MachineSnapshot {
            machine: "door".to_string(),
            machine_id: Uuid::nil(),
            status: MachineStatus::Initialized,
            taken_at: Utc::now(),
            root: Some(root),
        };

        let text = snapshot.to_string();
        assert_eq!(
            text,
            "door [initialized]\n* Door (exclusive)\n    Open\n  * Closed\n      locked: true\n"
        );
    }

    #[test]
    fn display_reports_uninitialized_machines() {
        let snapshot = MachineSnapshot {
            machine: "door".to_string(),
            machine_id: Uuid::nil(),
            status: MachineStatus::Offline,
            taken_at: Utc::now(),
            root: None,
        };
        assert!(snapshot.to_string().contains("not initialized"));
    }
}
