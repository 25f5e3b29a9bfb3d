//! Orthostate: hierarchical, message-driven state machines
//!
//! Behaviour is composed from a tree of states. Exclusive composites keep one
//! active child at a time; parallel composites keep every branch active at
//! once. Messages are addressed by capability (a trait object type) rather
//! than by state, start at the active leaf of each region and walk upward
//! until some state consumes them.
//!
//! # Core Concepts
//!
//! - **State**: behaviour at one node of the tree, via the `State` trait
//! - **StateTree**: arena of states, registered as leaf, exclusive or parallel
//! - **Handler**: typed message addressing every state with a capability
//! - **StateMachine**: lifecycle, sessions, queued sends and transitions
//! - **ConcurrentStateMachine**: lock-free producers, one pumping consumer
//!
//! # Example
//!
//! ```rust
//! use orthostate::core::{Capabilities, Handler, State};
//! use orthostate::machine::{Context, StateMachine};
//! use orthostate::tree::{Children, StateTree};
//! use orthostate::StateId;
//!
//! trait Toggle {
//!     fn toggle(&mut self, ctx: &mut Context<'_, u32>);
//! }
//!
//! struct Off;
//! struct On;
//!
//! impl State<u32> for Off {}
//!
//! impl State<u32> for On {
//!     fn enter(&mut self, ctx: &mut Context<'_, u32>) {
//!         *ctx.actor_mut() += 1;
//!     }
//! }
//!
//! struct Switch {
//!     off: StateId,
//!     on: StateId,
//! }
//!
//! impl State<u32> for Switch {
//!     fn capabilities(caps: &mut Capabilities<Self>) {
//!         caps.add::<dyn Toggle>(|s| s);
//!     }
//!
//!     fn declare(&self, children: &mut Children) {
//!         children.add(self.off).add(self.on).entry(self.off);
//!     }
//! }
//!
//! impl Toggle for Switch {
//!     fn toggle(&mut self, ctx: &mut Context<'_, u32>) {
//!         let next = if ctx.is_active(self.off) { self.on } else { self.off };
//!         ctx.transit_to(next);
//!     }
//! }
//!
//! let mut tree = StateTree::new();
//! let off = tree.leaf(Off);
//! let on = tree.leaf(On);
//! let switch = tree.exclusive(Switch { off, on });
//!
//! let mut machine = StateMachine::new("switch", tree, switch);
//! machine.initialize(0).unwrap();
//! assert_eq!(machine.active_leaf(), Some(off));
//!
//! let toggle: Handler<u32, dyn Toggle> = Handler::new(|s, ctx, _| s.toggle(ctx));
//! machine.send(toggle).unwrap();
//! assert_eq!(machine.active_leaf(), Some(on));
//! assert_eq!(machine.actor(), Some(&1));
//! ```

pub mod concurrent;
pub mod core;
pub mod machine;
pub mod message;
pub mod tree;

// Re-export commonly used types
pub use concurrent::ConcurrentStateMachine;
pub use core::{Capabilities, EnterWith, Handler, NodeKind, State, StateId};
pub use machine::{Context, MachineConfig, MachineError, MachineStatus, StateMachine};
pub use tree::{Children, FieldsMode, InitializationError, StateTree};
