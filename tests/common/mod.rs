//! Door-and-lever fixture shared by the integration tests.
//!
//! A lever with two positions and a door that opens and closes over time, run
//! side by side under a parallel root.

#![allow(dead_code)]

use orthostate::core::{Capabilities, EnterWith, Handler, State, StateId};
use orthostate::machine::Context;
use orthostate::tree::{Children, DebugFields, StateTree};

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Panel {
    pub door_position: f32,
    pub lever_on_icon: bool,
    pub lever_off_icon: bool,
    pub journal: Vec<String>,
}

impl Panel {
    fn note(&mut self, line: impl Into<String>) {
        self.journal.push(line.into());
    }
}

pub trait Tick {
    fn tick(&mut self, ctx: &mut Context<'_, Panel>, dt: f32);
}

pub trait ClickLever {
    fn click_lever(&mut self, ctx: &mut Context<'_, Panel>);
}

pub trait ClickButton {
    fn click_button(&mut self, ctx: &mut Context<'_, Panel>);
}

pub trait SetDoorDestination {
    fn set_door_destination(&mut self, ctx: &mut Context<'_, Panel>, open: bool);
}

/// Nobody answers to this one.
pub trait Ignored {
    fn ignored(&mut self);
}

pub const TICK: Handler<Panel, dyn Tick, f32> = Handler::new(|s, ctx, dt| s.tick(ctx, *dt));
pub const CLICK_LEVER: Handler<Panel, dyn ClickLever> = Handler::new(|s, ctx, _| s.click_lever(ctx));
pub const CLICK_BUTTON: Handler<Panel, dyn ClickButton> =
    Handler::new(|s, ctx, _| s.click_button(ctx));
pub const SET_DOOR: Handler<Panel, dyn SetDoorDestination, bool> =
    Handler::new(|s, ctx, open| s.set_door_destination(ctx, *open));
pub const IGNORED: Handler<Panel, dyn Ignored> = Handler::new(|s, _, _| s.ignored());

// Lever

pub struct LeverRoot {
    pub on: StateId,
    pub off: StateId,
}

impl State<Panel> for LeverRoot {
    fn declare(&self, children: &mut Children) {
        children.add(self.on).add(self.off).entry(self.on);
    }

    fn on_enter(&mut self, ctx: &mut Context<'_, Panel>) {
        let panel = ctx.actor_mut();
        panel.lever_on_icon = false;
        panel.lever_off_icon = false;
    }
}

pub struct SwitchedOn;

impl State<Panel> for SwitchedOn {
    fn capabilities(caps: &mut Capabilities<Self>) {
        caps.add::<dyn ClickLever>(|s| s).add::<dyn ClickButton>(|s| s);
    }

    fn enter(&mut self, ctx: &mut Context<'_, Panel>) {
        ctx.actor_mut().lever_on_icon = true;
    }

    fn on_exit(&mut self, ctx: &mut Context<'_, Panel>) {
        ctx.actor_mut().lever_on_icon = false;
    }
}

impl ClickLever for SwitchedOn {
    fn click_lever(&mut self, ctx: &mut Context<'_, Panel>) {
        ctx.actor_mut().note("lever switched off");
        if let Some(off) = ctx.parent_state::<LeverRoot>().map(|lever| lever.off) {
            ctx.transit_to(off);
        }
    }
}

impl ClickButton for SwitchedOn {
    fn click_button(&mut self, ctx: &mut Context<'_, Panel>) {
        ctx.actor_mut().note("button pressed");
        ctx.send_with(SET_DOOR, true);
        ctx.actor_mut().note("button released");
    }
}

pub struct SwitchedOff;

impl State<Panel> for SwitchedOff {
    fn capabilities(caps: &mut Capabilities<Self>) {
        caps.add::<dyn ClickLever>(|s| s).add::<dyn ClickButton>(|s| s);
    }

    fn enter(&mut self, ctx: &mut Context<'_, Panel>) {
        ctx.actor_mut().lever_off_icon = true;
    }

    fn on_exit(&mut self, ctx: &mut Context<'_, Panel>) {
        ctx.actor_mut().lever_off_icon = false;
    }
}

impl ClickLever for SwitchedOff {
    fn click_lever(&mut self, ctx: &mut Context<'_, Panel>) {
        ctx.actor_mut().note("lever switched on");
        if let Some(on) = ctx.parent_state::<LeverRoot>().map(|lever| lever.on) {
            ctx.transit_to(on);
        }
    }
}

impl ClickButton for SwitchedOff {
    fn click_button(&mut self, ctx: &mut Context<'_, Panel>) {
        ctx.send_with(SET_DOOR, false);
    }
}

// Door

pub struct DoorRoot {
    pub open: StateId,
    pub closed: StateId,
    pub opening: StateId,
    pub closing: StateId,
}

impl State<Panel> for DoorRoot {
    fn name(&self) -> &str {
        "Door"
    }

    fn declare(&self, children: &mut Children) {
        children
            .extend([self.open, self.closed, self.opening, self.closing])
            .entry(self.closed);
    }
}

pub struct Open;

impl State<Panel> for Open {
    fn capabilities(caps: &mut Capabilities<Self>) {
        caps.add::<dyn SetDoorDestination>(|s| s);
    }

    fn enter(&mut self, ctx: &mut Context<'_, Panel>) {
        ctx.actor_mut().door_position = 1.0;
    }
}

impl SetDoorDestination for Open {
    fn set_door_destination(&mut self, ctx: &mut Context<'_, Panel>, open: bool) {
        if open {
            return;
        }
        if let Some(closing) = ctx.parent_state::<DoorRoot>().map(|door| door.closing) {
            ctx.transit_to_with(closing, 0.5_f32);
        }
    }
}

pub struct Closed;

impl State<Panel> for Closed {
    fn capabilities(caps: &mut Capabilities<Self>) {
        caps.add::<dyn SetDoorDestination>(|s| s);
    }

    fn enter(&mut self, ctx: &mut Context<'_, Panel>) {
        ctx.actor_mut().door_position = 0.0;
    }
}

impl SetDoorDestination for Closed {
    fn set_door_destination(&mut self, ctx: &mut Context<'_, Panel>, open: bool) {
        if !open {
            return;
        }
        ctx.actor_mut().note("door opening");
        if let Some(opening) = ctx.parent_state::<DoorRoot>().map(|door| door.opening) {
            ctx.transit_to_with(opening, 0.2_f32);
        }
    }
}

/// Door travel toward `target`, handing over to `then` on arrival.
pub struct Motion {
    pub target: f32,
    pub then: StateId,
    pub speed: f32,
}

impl Motion {
    fn advance(&mut self, ctx: &mut Context<'_, Panel>, dt: f32) {
        ctx.propagate_message();
        let panel = ctx.actor_mut();
        let step = dt * self.speed;
        let remaining = self.target - panel.door_position;
        if remaining.abs() <= step {
            panel.door_position = self.target;
            ctx.transit_to(self.then);
        } else {
            panel.door_position += step.copysign(remaining);
        }
    }
}

pub struct Opening(pub Motion);

impl State<Panel> for Opening {
    fn capabilities(caps: &mut Capabilities<Self>) {
        caps.add::<dyn Tick>(|s| s)
            .add::<dyn SetDoorDestination>(|s| s)
            .add::<dyn EnterWith<Panel, f32>>(|s| s);
    }

    fn debug_fields(&self, fields: &mut DebugFields) {
        fields.show("speed", self.0.speed).field("target", self.0.target);
    }
}

impl EnterWith<Panel, f32> for Opening {
    fn enter_with(&mut self, _ctx: &mut Context<'_, Panel>, speed: f32) {
        self.0.speed = speed;
    }
}

impl Tick for Opening {
    fn tick(&mut self, ctx: &mut Context<'_, Panel>, dt: f32) {
        self.0.advance(ctx, dt);
    }
}

impl SetDoorDestination for Opening {
    fn set_door_destination(&mut self, ctx: &mut Context<'_, Panel>, open: bool) {
        if open {
            self.0.speed += 0.2;
        } else if let Some(closing) = ctx.parent_state::<DoorRoot>().map(|door| door.closing) {
            ctx.transit_to_with(closing, 0.5_f32);
        }
    }
}

pub struct Closing(pub Motion);

impl State<Panel> for Closing {
    fn capabilities(caps: &mut Capabilities<Self>) {
        caps.add::<dyn Tick>(|s| s).add::<dyn EnterWith<Panel, f32>>(|s| s);
    }

    fn debug_fields(&self, fields: &mut DebugFields) {
        fields.show("speed", self.0.speed).field("target", self.0.target);
    }
}

impl EnterWith<Panel, f32> for Closing {
    fn enter_with(&mut self, _ctx: &mut Context<'_, Panel>, speed: f32) {
        self.0.speed = speed;
    }
}

impl Tick for Closing {
    fn tick(&mut self, ctx: &mut Context<'_, Panel>, dt: f32) {
        self.0.advance(ctx, dt);
    }
}

pub struct Root;

impl State<Panel> for Root {}

#[derive(Clone, Copy, Debug)]
pub struct DoorIds {
    pub door: StateId,
    pub open: StateId,
    pub closed: StateId,
    pub opening: StateId,
    pub closing: StateId,
}

#[derive(Clone, Copy, Debug)]
pub struct LeverIds {
    pub lever: StateId,
    pub on: StateId,
    pub off: StateId,
}

pub fn register_door(tree: &mut StateTree<Panel>) -> DoorIds {
    let open = tree.leaf(Open);
    let closed = tree.leaf(Closed);
    let opening = tree.leaf(Opening(Motion {
        target: 1.0,
        then: open,
        speed: 0.0,
    }));
    let closing = tree.leaf(Closing(Motion {
        target: 0.0,
        then: closed,
        speed: 0.0,
    }));
    let door = tree.exclusive(DoorRoot {
        open,
        closed,
        opening,
        closing,
    });
    DoorIds {
        door,
        open,
        closed,
        opening,
        closing,
    }
}

pub fn register_lever(tree: &mut StateTree<Panel>) -> LeverIds {
    let on = tree.leaf(SwitchedOn);
    let off = tree.leaf(SwitchedOff);
    let lever = tree.exclusive(LeverRoot { on, off });
    LeverIds { lever, on, off }
}

/// Door alone, rooted at the door composite.
pub fn door_tree() -> (StateTree<Panel>, DoorIds) {
    let mut tree = StateTree::new();
    let ids = register_door(&mut tree);
    (tree, ids)
}

/// Lever and door side by side under a parallel root.
pub fn door_and_lever_tree() -> (StateTree<Panel>, StateId, LeverIds, DoorIds) {
    let mut tree = StateTree::new();
    let lever = register_lever(&mut tree);
    let door = register_door(&mut tree);
    let root = tree.parallel_of(Root, [lever.lever, door.door]);
    (tree, root, lever, door)
}
