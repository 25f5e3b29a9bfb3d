//! Door and Lever
//!
//! A lever and a door run side by side under a parallel root. Clicking the
//! button asks the door to open or close depending on the lever position;
//! ticks move the door.
//!
//! Key concepts:
//! - Exclusive composites with an entry child
//! - A parallel root driving two independent regions
//! - Messages addressed by capability, propagated upward
//! - Transitions carrying an argument into the destination state
//! - A concurrent front end fed from another thread
//!
//! Run with: RUST_LOG=debug cargo run --example door_and_lever

use orthostate::core::{Capabilities, EnterWith, Handler, State, StateId};
use orthostate::machine::{Context, StateMachine};
use orthostate::tree::{Children, DebugFields, FieldsMode, StateTree};
use orthostate::ConcurrentStateMachine;
use std::sync::Arc;
use std::thread;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Default)]
struct Panel {
    door_position: f32,
    lever_on: bool,
}

trait ClickLever {
    fn click_lever(&mut self, ctx: &mut Context<'_, Panel>);
}

trait ClickButton {
    fn click_button(&mut self, ctx: &mut Context<'_, Panel>);
}

trait SetDoor {
    fn set_door(&mut self, ctx: &mut Context<'_, Panel>, open: bool);
}

trait Tick {
    fn tick(&mut self, ctx: &mut Context<'_, Panel>, dt: f32);
}

const CLICK_LEVER: Handler<Panel, dyn ClickLever> = Handler::new(|s, ctx, _| s.click_lever(ctx));
const CLICK_BUTTON: Handler<Panel, dyn ClickButton> = Handler::new(|s, ctx, _| s.click_button(ctx));
const SET_DOOR: Handler<Panel, dyn SetDoor, bool> = Handler::new(|s, ctx, open| s.set_door(ctx, *open));
const TICK: Handler<Panel, dyn Tick, f32> = Handler::new(|s, ctx, dt| s.tick(ctx, *dt));

// Lever: one state per position, the button asks the door to follow.

struct Lever {
    on: StateId,
    off: StateId,
}

impl State<Panel> for Lever {
    fn declare(&self, children: &mut Children) {
        children.add(self.on).add(self.off).entry(self.off);
    }
}

struct Position {
    on: bool,
}

impl State<Panel> for Position {
    fn name(&self) -> &str {
        if self.on {
            "LeverOn"
        } else {
            "LeverOff"
        }
    }

    fn capabilities(caps: &mut Capabilities<Self>) {
        caps.add::<dyn ClickLever>(|s| s).add::<dyn ClickButton>(|s| s);
    }

    fn enter(&mut self, ctx: &mut Context<'_, Panel>) {
        ctx.actor_mut().lever_on = self.on;
    }
}

impl ClickLever for Position {
    fn click_lever(&mut self, ctx: &mut Context<'_, Panel>) {
        let other = ctx
            .parent_state::<Lever>()
            .map(|lever| if self.on { lever.off } else { lever.on });
        if let Some(other) = other {
            ctx.transit_to(other);
        }
    }
}

impl ClickButton for Position {
    fn click_button(&mut self, ctx: &mut Context<'_, Panel>) {
        ctx.send_with(SET_DOOR, self.on);
    }
}

// Door: resting states hand over to moving states, which carry a speed.

struct Door {
    resting_open: StateId,
    resting_closed: StateId,
    moving: StateId,
}

impl State<Panel> for Door {
    fn declare(&self, children: &mut Children) {
        children
            .extend([self.resting_open, self.resting_closed, self.moving])
            .entry(self.resting_closed);
    }
}

struct Resting {
    open: bool,
}

impl State<Panel> for Resting {
    fn name(&self) -> &str {
        if self.open {
            "Open"
        } else {
            "Closed"
        }
    }

    fn capabilities(caps: &mut Capabilities<Self>) {
        caps.add::<dyn SetDoor>(|s| s);
    }
}

impl SetDoor for Resting {
    fn set_door(&mut self, ctx: &mut Context<'_, Panel>, open: bool) {
        if open == self.open {
            return;
        }
        let speed = if open { 0.25_f32 } else { -0.5 };
        if let Some(moving) = ctx.parent_state::<Door>().map(|door| door.moving) {
            ctx.transit_to_with(moving, speed);
        }
    }
}

#[derive(Default)]
struct Moving {
    speed: f32,
}

impl State<Panel> for Moving {
    fn capabilities(caps: &mut Capabilities<Self>) {
        caps.add::<dyn Tick>(|s| s)
            .add::<dyn SetDoor>(|s| s)
            .add::<dyn EnterWith<Panel, f32>>(|s| s);
    }

    fn debug_fields(&self, fields: &mut DebugFields) {
        fields.show("speed", self.speed);
    }
}

impl EnterWith<Panel, f32> for Moving {
    fn enter_with(&mut self, _ctx: &mut Context<'_, Panel>, speed: f32) {
        self.speed = speed;
    }
}

impl SetDoor for Moving {
    fn set_door(&mut self, _ctx: &mut Context<'_, Panel>, open: bool) {
        self.speed = if open { self.speed.abs() } else { -self.speed.abs() };
    }
}

impl Tick for Moving {
    fn tick(&mut self, ctx: &mut Context<'_, Panel>, dt: f32) {
        let panel = ctx.actor_mut();
        panel.door_position = (panel.door_position + self.speed * dt).clamp(0.0, 1.0);
        let position = panel.door_position;

        let door = ctx
            .parent_state::<Door>()
            .map(|door| (door.resting_open, door.resting_closed));
        match door {
            Some((open, _)) if position >= 1.0 => ctx.transit_to(open),
            Some((_, closed)) if position <= 0.0 => ctx.transit_to(closed),
            _ => {}
        }
    }
}

struct Panels;

impl State<Panel> for Panels {}

fn build_tree() -> (StateTree<Panel>, StateId) {
    let mut tree = StateTree::new();

    let on = tree.leaf(Position { on: true });
    let off = tree.leaf(Position { on: false });
    let lever = tree.exclusive(Lever { on, off });

    let resting_open = tree.leaf(Resting { open: true });
    let resting_closed = tree.leaf(Resting { open: false });
    let moving = tree.leaf(Moving::default());
    let door = tree.exclusive(Door {
        resting_open,
        resting_closed,
        moving,
    });

    let root = tree.parallel_of(Panels, [lever, door]);
    (tree, root)
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("=== Door and Lever ===\n");

    let (tree, root) = build_tree();
    let mut machine = StateMachine::builder("panel")
        .tree(tree)
        .root(root)
        .trace_enter_exit(true)
        .build()
        .unwrap();
    machine.initialize(Panel::default()).unwrap();
    println!("{}", machine.snapshot(FieldsMode::Shown));

    println!("Pressing the button with the lever off does nothing:");
    machine.send(CLICK_BUTTON).unwrap();
    println!("  door at {:.2}\n", machine.actor().unwrap().door_position);

    println!("Flip the lever, press the button, let time pass:");
    machine.send(CLICK_LEVER).unwrap();
    machine.send(CLICK_BUTTON).unwrap();
    println!("{}", machine.snapshot(FieldsMode::Shown));

    // Ticks come from another thread through the concurrent front end.
    let panel = Arc::new(ConcurrentStateMachine::new(machine));
    let ticker = {
        let panel = Arc::clone(&panel);
        thread::spawn(move || {
            for _ in 0..6 {
                panel.send_with(TICK, 1.0_f32).unwrap();
            }
        })
    };
    ticker.join().unwrap();
    while panel.handle_messages(Some(2)).unwrap() {}

    panel.inspect(|machine| {
        println!("  door at {:.2}", machine.actor().unwrap().door_position);
    });
    println!("{}", panel.snapshot(FieldsMode::Shown));

    panel.shutdown().unwrap();
    println!("=== Example Complete ===");
}
