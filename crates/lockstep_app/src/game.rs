//! The demo game: ships steered by player input, drifting rocks, and a
//! collision scoreboard.

use anyhow::Result;
use glam::Vec2;
use lockstep_collision::{Collidable, CollisionSystem};
use lockstep_component::{Component, ComponentError, Entity, World};
use lockstep_index::{GroupMask, GroupRegistry, IndexSystem, Indexed};
use lockstep_math::{Transform, Velocity};
use lockstep_packet::{Packet, PacketError, TypeTag, WireSink};
use lockstep_sync::{AddGameObject, Command, PlayerInput, Timeline};
use lockstep_system::{Message, MotionSystem, SimError, Simulation, System, SystemContext};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::AppConfig;

pub const SHIP_RADIUS: f32 = 4.0;
pub const SHIP_SPEED: f32 = 2.0;
pub const ROCK_RADIUS: f32 = 6.0;

/// Which player steers this entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pilot {
    pub player: u32,
}

impl TypeTag for Pilot {
    const TYPE_TAG: &'static str = "demo.Pilot";
}

impl Component for Pilot {}

/// Input actions. Pressing sets the speed on that axis, releasing stops it.
pub mod action {
    pub const LEFT: u16 = 0;
    pub const RIGHT: u16 = 1;
    pub const DOWN: u16 = 2;
    pub const UP: u16 = 3;
}

/// Turns [`Message::Input`] into ship velocity.
#[derive(Debug, Default)]
pub struct Steering;

impl System for Steering {
    fn name(&self) -> &'static str {
        "steering"
    }

    fn receive(&mut self, ctx: &mut SystemContext<'_>, message: &Message) -> Result<(), SimError> {
        let Message::Input {
            player,
            action,
            pressed,
        } = *message
        else {
            return Ok(());
        };
        let ships: Vec<Entity> = ctx
            .world()
            .store::<Pilot>()?
            .iter()
            .filter(|(_, pilot, _)| pilot.player == player)
            .map(|(entity, _, _)| entity)
            .collect();
        let speed = if pressed { SHIP_SPEED } else { 0.0 };
        for ship in ships {
            let Some(velocity) = ctx.world_mut().get_mut::<Velocity>(ship) else {
                continue;
            };
            match action {
                action::LEFT => velocity.linear.x = -speed,
                action::RIGHT => velocity.linear.x = speed,
                action::DOWN => velocity.linear.y = -speed,
                action::UP => velocity.linear.y = speed,
                _ => {}
            }
        }
        Ok(())
    }
}

/// Counts collisions. The count is simulation state and travels in
/// snapshots.
#[derive(Debug, Default)]
pub struct Scoreboard {
    collisions: u32,
}

impl Scoreboard {
    pub fn collisions(&self) -> u32 {
        self.collisions
    }
}

impl System for Scoreboard {
    fn name(&self) -> &'static str {
        "scoreboard"
    }

    fn receive(&mut self, ctx: &mut SystemContext<'_>, message: &Message) -> Result<(), SimError> {
        if let Message::Collision { first, second } = *message {
            self.collisions += 1;
            debug!(frame = ctx.frame(), %first, %second, total = self.collisions, "collision");
        }
        Ok(())
    }

    fn write_state(&self, sink: &mut dyn WireSink) -> Result<(), PacketError> {
        sink.write_u32(self.collisions);
        Ok(())
    }

    fn read_state(&mut self, packet: &mut Packet) -> Result<(), PacketError> {
        self.collisions = packet.read_u32()?;
        Ok(())
    }
}

pub fn register_components(world: &mut World) -> Result<(), ComponentError> {
    world.register::<Transform>()?;
    world.register::<Velocity>()?;
    world.register::<Indexed>()?;
    world.register::<Collidable>()?;
    world.register::<Pilot>()?;
    Ok(())
}

/// A peer's simulation, set up identically on every process.
pub struct Game {
    pub timeline: Timeline,
    pub rocks: GroupMask,
}

pub fn build(config: &AppConfig) -> Result<Game> {
    let mut sim = Simulation::new(&config.simulation)?;
    register_components(sim.world_mut())?;
    sim.register(Steering)?;
    sim.register_parallel_system(MotionSystem)?;
    let index = sim.register(IndexSystem::new(config.index.clone()))?;
    sim.register_component_system(CollisionSystem::new(index))?;
    sim.register(Scoreboard::default())?;

    let mut groups = GroupRegistry::new();
    let rocks = groups.allocate("rocks")?.mask();
    let mut ctx = sim.context();
    for player in 1..=config.session.players {
        let group = groups.allocate(&format!("player{player}"))?.mask();
        let ship = ctx.spawn();
        let position = Vec2::new(player as f32 * 40.0 - 80.0, 0.0);
        ctx.attach(ship, Transform::from_position(position))?;
        ctx.attach(ship, Velocity::default())?;
        ctx.attach(ship, Pilot { player })?;
        ctx.attach(ship, Indexed::new(group, SHIP_RADIUS))?;
        ctx.attach(ship, Collidable::new(SHIP_RADIUS, group))?;
    }

    Ok(Game {
        timeline: Timeline::new(sim, config.timeline.clone()),
        rocks,
    })
}

/// Entity blob for a rock entering from the top edge.
pub fn rock_blob(seed: u64, rocks: GroupMask) -> Result<Vec<u8>> {
    let mut template = World::new();
    register_components(&mut template)?;
    let rock = template.spawn();
    let x = (seed % 7) as f32 * 20.0 - 60.0;
    template.attach(rock, Transform::from_position(Vec2::new(x, 80.0)))?;
    template.attach(rock, Velocity::new(0.0, -1.5))?;
    template.attach(rock, Indexed::new(rocks, ROCK_RADIUS))?;
    template.attach(rock, Collidable::new(ROCK_RADIUS, rocks))?;
    let mut blob = Packet::new();
    template.write_entity(rock, &mut blob)?;
    Ok(blob.into_bytes())
}

/// The server's scripted commands for `frame`.
///
/// Every eighth frame one player presses or releases a direction; every
/// fiftieth frame (offset by 25) a rock is added.
pub fn scripted_commands(frame: u64, players: u32, rocks: GroupMask) -> Result<Vec<Command>> {
    let mut commands = Vec::new();
    if players > 0 && frame > 0 && frame % 8 == 0 {
        let step = frame / 8;
        let player = (step % u64::from(players)) as u32 + 1;
        let input = PlayerInput {
            action: ((step / u64::from(players)) % 4) as u16,
            pressed: step % 2 == 0,
        };
        commands.push(Command::new(frame, player, &input)?);
    }
    if frame % 50 == 25 {
        let add = AddGameObject {
            blob: rock_blob(frame, rocks)?,
        };
        commands.push(Command::new(frame, 0, &add)?);
    }
    Ok(commands)
}

#[cfg(test)]
mod tests {
    use lockstep_system::SimulationConfig;

    use super::*;

    fn config() -> AppConfig {
        AppConfig {
            simulation: SimulationConfig::default().with_worker_threads(1),
            ..AppConfig::default()
        }
    }

    #[test]
    fn test_build_spawns_one_ship_per_player() {
        let game = build(&config()).unwrap();
        let world = game.timeline.simulation().world();
        assert_eq!(world.entity_count(), 3);
        assert_eq!(world.store::<Pilot>().unwrap().len(), 3);
        assert_eq!(game.rocks, GroupMask(1));
    }

    #[test]
    fn test_builds_are_identical() {
        let a = build(&config()).unwrap();
        let b = build(&config()).unwrap();
        assert_eq!(
            a.timeline.simulation().state_hash().unwrap(),
            b.timeline.simulation().state_hash().unwrap()
        );
    }

    #[test]
    fn test_script_steers_and_spawns() {
        let mut game = build(&config()).unwrap();
        for frame in 0..30 {
            for command in scripted_commands(frame, 3, game.rocks).unwrap() {
                game.timeline.schedule(command).unwrap();
            }
            game.timeline.advance().unwrap();
        }
        let world = game.timeline.simulation().world();
        // Three ships and the rock from frame 25.
        assert_eq!(world.entity_count(), 4);
        let moving = world
            .store::<Velocity>()
            .unwrap()
            .iter()
            .filter(|(_, velocity, _)| velocity.linear != Vec2::ZERO)
            .count();
        assert!(moving >= 2);
    }

    #[test]
    fn test_scoreboard_state_round_trip() {
        let mut board = Scoreboard { collisions: 7 };
        let mut packet = Packet::new();
        board.write_state(&mut packet).unwrap();
        board.collisions = 0;
        board.read_state(&mut packet).unwrap();
        assert_eq!(board.collisions(), 7);
    }

    #[test]
    fn test_script_is_deterministic() {
        let rocks = GroupMask(1);
        for frame in [8, 25, 40, 75] {
            assert_eq!(
                scripted_commands(frame, 3, rocks).unwrap(),
                scripted_commands(frame, 3, rocks).unwrap()
            );
        }
        assert!(scripted_commands(3, 3, rocks).unwrap().is_empty());
    }
}
