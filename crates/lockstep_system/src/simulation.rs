//! The system manager.
//!
//! A [`Simulation`] owns the world, the ordered list of systems and a bounded
//! worker pool. Each [`Simulation::update`] runs one frame: every system's
//! pass in registration order, with messages delivered synchronously in
//! between.

use lockstep_component::{Entity, World};
use lockstep_packet::{Packet, PacketError, StateHasher, WireSink};
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, info};

use crate::config::SimulationConfig;
use crate::context::{SystemContext, SystemSlot};
use crate::error::SimError;
use crate::message::Message;
use crate::parallel::{ParallelPass, ParallelSystem};
use crate::system::{ComponentPass, ComponentSystem, System, SystemHandle};

pub struct Simulation {
    world: World,
    systems: Vec<SystemSlot>,
    /// Index of the next frame to run; also the number of completed frames.
    frame: u64,
    started: bool,
    pool: ThreadPool,
}

impl std::fmt::Debug for Simulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulation")
            .field("frame", &self.frame)
            .field(
                "systems",
                &self.systems.iter().map(|slot| slot.name).collect::<Vec<_>>(),
            )
            .field("world", &self.world)
            .finish()
    }
}

impl Simulation {
    /// Create an empty simulation.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::ThreadPool`] if the worker pool cannot be built.
    pub fn new(config: &SimulationConfig) -> Result<Self, SimError> {
        let threads = config.effective_threads();
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("lockstep-worker-{i}"))
            .build()?;
        info!(threads, "simulation created");
        Ok(Self {
            world: World::new(),
            systems: Vec::new(),
            frame: 0,
            started: false,
            pool,
        })
    }

    /// Register a system. Order of registration is the order of passes and
    /// of message delivery.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::RegistrationClosed`] once the first frame has run
    /// or a context has been opened.
    pub fn register<S: System>(&mut self, system: S) -> Result<SystemHandle<S>, SimError> {
        if self.started {
            return Err(SimError::RegistrationClosed(system.name()));
        }
        let index = self.systems.len();
        info!(system = system.name(), index, "registered system");
        self.systems.push(SystemSlot::new(Box::new(system)));
        Ok(SystemHandle::new(index))
    }

    pub fn register_component_system<S: ComponentSystem>(
        &mut self,
        system: S,
    ) -> Result<SystemHandle<ComponentPass<S>>, SimError> {
        self.register(ComponentPass::new(system))
    }

    pub fn register_parallel_system<S: ParallelSystem>(
        &mut self,
        system: S,
    ) -> Result<SystemHandle<ParallelPass<S>>, SimError> {
        self.register(ParallelPass::new(system))
    }

    /// Index of the next frame [`Simulation::update`] will run.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    /// Direct world access for setup, such as registering component types.
    /// Changes made here broadcast nothing.
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn system_count(&self) -> usize {
        self.systems.len()
    }

    /// Borrow a registered system between frames.
    pub fn system<S: System>(&self, handle: SystemHandle<S>) -> Option<&S> {
        self.systems[handle.index()]
            .system
            .as_deref()?
            .as_any()
            .downcast_ref::<S>()
    }

    pub fn system_mut<S: System>(&mut self, handle: SystemHandle<S>) -> Option<&mut S> {
        self.systems[handle.index()]
            .system
            .as_deref_mut()?
            .as_any_mut()
            .downcast_mut::<S>()
    }

    /// A context for acting on the simulation from outside a system, such as
    /// applying network commands. Closes registration.
    pub fn context(&mut self) -> SystemContext<'_> {
        self.started = true;
        SystemContext::new(self.frame, &mut self.world, &mut self.systems, &self.pool)
    }

    /// Broadcast a message from outside any system.
    pub fn send(&mut self, message: Message) -> Result<(), SimError> {
        self.context().send(message)
    }

    /// Spawn an entity from a blob written by
    /// [`World::write_entity`](lockstep_component::World::write_entity).
    pub fn spawn_from_blob(&mut self, blob: &mut Packet) -> Result<Entity, SimError> {
        self.context().spawn_from_blob(blob)
    }

    /// Run one frame.
    pub fn update(&mut self) -> Result<(), SimError> {
        self.started = true;
        debug!(frame = self.frame, systems = self.systems.len(), "frame start");
        for index in 0..self.systems.len() {
            let mut ctx =
                SystemContext::new(self.frame, &mut self.world, &mut self.systems, &self.pool);
            ctx.run_update(index)?;
        }
        self.frame += 1;
        Ok(())
    }

    /// Let every system draw, in registration order.
    pub fn draw(&self) {
        for slot in &self.systems {
            if let Some(system) = slot.system.as_deref() {
                system.draw(&self.world);
            }
        }
    }

    // ── Snapshots ───────────────────────────────────────────────────

    /// Write the full simulation state: frame, each system's own state as a
    /// byte array in registration order, then the world.
    pub fn write_snapshot(&self, sink: &mut dyn WireSink) -> Result<(), SimError> {
        sink.write_u64(self.frame);
        sink.write_len(self.systems.len())?;
        let mut state = Packet::new();
        for slot in &self.systems {
            state.clear();
            if let Some(system) = slot.system.as_deref() {
                system.write_state(&mut state)?;
            }
            sink.write_string(Some(slot.name))?;
            sink.write_bytes(Some(state.as_bytes()))?;
        }
        self.world.write_state(sink)?;
        Ok(())
    }

    pub fn snapshot(&self) -> Result<Packet, SimError> {
        let mut packet = Packet::new();
        self.write_snapshot(&mut packet)?;
        Ok(packet)
    }

    /// Fingerprint of the full state, fed the same stream as
    /// [`Simulation::write_snapshot`].
    pub fn state_hash(&self) -> Result<u32, SimError> {
        let mut hasher = StateHasher::new();
        self.write_snapshot(&mut hasher)?;
        Ok(hasher.value())
    }

    /// Replace the whole state with a snapshot, then broadcast
    /// [`Message::Restored`].
    ///
    /// The simulation must have the same systems and component types,
    /// registered in the same order, as the one that wrote the snapshot. The
    /// snapshot is read and validated in full before anything is replaced;
    /// on error the simulation is left as it was.
    pub fn load_snapshot(&mut self, packet: &mut Packet) -> Result<(), SimError> {
        let frame = packet.read_u64()?;
        let count = packet.read_len()?.ok_or(PacketError::UnexpectedNull)?;
        if count != self.systems.len() {
            return Err(SimError::SystemCountMismatch {
                expected: self.systems.len(),
                found: count,
            });
        }
        let mut states = Vec::with_capacity(count);
        for slot in &self.systems {
            let name = packet.read_string()?.ok_or(PacketError::UnexpectedNull)?;
            if name != slot.name {
                return Err(SimError::SystemNameMismatch {
                    expected: slot.name,
                    found: name,
                });
            }
            states.push(packet.read_bytes()?.ok_or(PacketError::UnexpectedNull)?);
        }
        let world = self.world.stage_state(packet)?;

        let backups = self.system_states()?;
        for (index, bytes) in states.into_iter().enumerate() {
            if let Err(err) = self.read_system_state(index, bytes) {
                for (index, bytes) in backups.into_iter().enumerate().take(index + 1) {
                    self.read_system_state(index, bytes)?;
                }
                return Err(err);
            }
        }
        self.world.commit_state(world);
        self.frame = frame;
        info!(frame, entities = self.world.entity_count(), "snapshot loaded");
        self.send(Message::Restored)
    }

    /// Each system's own state, in registration order.
    fn system_states(&self) -> Result<Vec<Vec<u8>>, SimError> {
        let mut states = Vec::with_capacity(self.systems.len());
        for slot in &self.systems {
            let system = slot
                .system
                .as_deref()
                .ok_or(SimError::SystemBusy(slot.name))?;
            let mut state = Packet::new();
            system.write_state(&mut state)?;
            states.push(state.into_bytes());
        }
        Ok(states)
    }

    fn read_system_state(&mut self, index: usize, bytes: Vec<u8>) -> Result<(), SimError> {
        let slot = &mut self.systems[index];
        let system = slot
            .system
            .as_deref_mut()
            .ok_or(SimError::SystemBusy(slot.name))?;
        system.read_state(&mut Packet::from_bytes(bytes))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use glam::Vec2;
    use lockstep_component::Component;
    use lockstep_math::{Transform, Velocity};
    use lockstep_packet::TypeTag;
    use serde::{Deserialize, Serialize};

    use super::*;
    use crate::MotionSystem;

    type Log = Arc<Mutex<Vec<String>>>;

    fn sim() -> Simulation {
        let mut sim = Simulation::new(&SimulationConfig::default()).unwrap();
        sim.world_mut().register::<Transform>().unwrap();
        sim.world_mut().register::<Velocity>().unwrap();
        sim.world_mut().register::<Counter>().unwrap();
        sim
    }

    fn entries(log: &Log) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    struct Counter(u32);

    impl TypeTag for Counter {
        const TYPE_TAG: &'static str = "test.Counter";
    }

    impl Component for Counter {}

    /// Logs its pass and every message it receives.
    struct Recorder {
        name: &'static str,
        log: Log,
        ping_in_update: bool,
    }

    impl System for Recorder {
        fn name(&self) -> &'static str {
            self.name
        }

        fn update(&mut self, ctx: &mut SystemContext<'_>) -> Result<(), SimError> {
            self.log.lock().unwrap().push(format!("{}.update", self.name));
            if self.ping_in_update {
                ctx.send(Message::custom(self.name))?;
            }
            self.log.lock().unwrap().push(format!("{}.done", self.name));
            Ok(())
        }

        fn receive(&mut self, _ctx: &mut SystemContext<'_>, message: &Message) -> Result<(), SimError> {
            let label = match message {
                Message::Moved { entity, .. } => format!("moved:{}", entity.index()),
                Message::Custom(_) => "custom".to_string(),
                Message::ComponentAdded { .. } => "added".to_string(),
                Message::Restored => "restored".to_string(),
                _ => "other".to_string(),
            };
            self.log.lock().unwrap().push(format!("{}<-{label}", self.name));
            Ok(())
        }
    }

    fn recorder(name: &'static str, log: &Log) -> Recorder {
        Recorder {
            name,
            log: Arc::clone(log),
            ping_in_update: false,
        }
    }

    /// Counts passes per component; optionally disables a later component
    /// while visiting the first one.
    #[derive(Default)]
    struct Tally {
        visited: Vec<Entity>,
        added: usize,
        removed: usize,
        disable_on_first: Option<Entity>,
        passes: u32,
    }

    impl ComponentSystem for Tally {
        type Component = Counter;

        fn name(&self) -> &'static str {
            "tally"
        }

        fn update_component(&mut self, ctx: &mut SystemContext<'_>, entity: Entity) -> Result<(), SimError> {
            if self.visited.is_empty()
                && let Some(target) = self.disable_on_first
            {
                ctx.world_mut().set_enabled::<Counter>(target, false);
            }
            self.visited.push(entity);
            if let Some(counter) = ctx.world_mut().get_mut::<Counter>(entity) {
                counter.0 += 1;
            }
            Ok(())
        }

        fn end_pass(&mut self, _ctx: &mut SystemContext<'_>) -> Result<(), SimError> {
            self.passes += 1;
            Ok(())
        }

        fn on_component_added(&mut self, _ctx: &mut SystemContext<'_>, _entity: Entity) -> Result<(), SimError> {
            self.added += 1;
            Ok(())
        }

        fn on_component_removed(&mut self, _ctx: &mut SystemContext<'_>, _entity: Entity) -> Result<(), SimError> {
            self.removed += 1;
            Ok(())
        }

        fn write_state(&self, sink: &mut dyn WireSink) -> Result<(), PacketError> {
            sink.write_u32(self.passes);
            Ok(())
        }

        fn read_state(&mut self, packet: &mut Packet) -> Result<(), PacketError> {
            self.passes = packet.read_u32()?;
            Ok(())
        }
    }

    fn spawn_mover(sim: &mut Simulation, position: Vec2, velocity: Vec2) -> Entity {
        let mut ctx = sim.context();
        let entity = ctx.spawn();
        ctx.attach(entity, Transform::from_position(position)).unwrap();
        ctx.attach(entity, Velocity { linear: velocity }).unwrap();
        entity
    }

    #[test]
    fn test_systems_run_in_registration_order() {
        let log = Log::default();
        let mut sim = sim();
        sim.register(recorder("b", &log)).unwrap();
        sim.register(recorder("a", &log)).unwrap();
        sim.update().unwrap();
        assert_eq!(entries(&log), vec!["b.update", "b.done", "a.update", "a.done"]);
        assert_eq!(sim.frame(), 1);
    }

    #[test]
    fn test_registration_closes_after_first_frame() {
        let log = Log::default();
        let mut sim = sim();
        sim.update().unwrap();
        assert!(matches!(
            sim.register(recorder("late", &log)),
            Err(SimError::RegistrationClosed("late"))
        ));
    }

    #[test]
    fn test_busy_system_gets_message_when_idle() {
        let log = Log::default();
        let mut sim = sim();
        sim.register(Recorder {
            ping_in_update: true,
            ..recorder("a", &log)
        })
        .unwrap();
        sim.register(recorder("b", &log)).unwrap();
        sim.update().unwrap();
        assert_eq!(
            entries(&log)[..4],
            ["a.update", "b<-custom", "a.done", "a<-custom"]
        );
    }

    #[test]
    fn test_attach_notifies_before_returning() {
        let mut sim = sim();
        let tally = sim.register_component_system(Tally::default()).unwrap();
        let mut ctx = sim.context();
        let e = ctx.spawn();
        ctx.attach(e, Counter(0)).unwrap();
        assert_eq!(ctx.system(tally).unwrap().added, 1);
        ctx.destroy(e).unwrap();
        assert_eq!(ctx.system(tally).unwrap().removed, 1);
    }

    #[test]
    fn test_component_pass_order_and_skip() {
        let mut sim = sim();
        let tally = sim.register_component_system(Tally::default()).unwrap();
        let mut ctx = sim.context();
        let a = ctx.spawn();
        let b = ctx.spawn();
        let c = ctx.spawn();
        ctx.attach(c, Counter(0)).unwrap();
        ctx.attach(a, Counter(0)).unwrap();
        ctx.attach(b, Counter(0)).unwrap();
        ctx.system(tally).unwrap().disable_on_first = Some(a);

        sim.update().unwrap();
        let tally = sim.system(tally).unwrap();
        assert_eq!(tally.visited, vec![c, b]);
        assert_eq!(sim.world().get::<Counter>(a), Some(&Counter(0)));
    }

    #[test]
    fn test_self_lookup_is_busy() {
        struct Selfish(Option<SystemHandle<Selfish>>);

        impl System for Selfish {
            fn name(&self) -> &'static str {
                "selfish"
            }

            fn update(&mut self, ctx: &mut SystemContext<'_>) -> Result<(), SimError> {
                match self.0 {
                    Some(handle) => ctx.system(handle).map(|_| ()),
                    None => Ok(()),
                }
            }
        }

        let mut sim = sim();
        let handle = sim.register(Selfish(None)).unwrap();
        sim.system_mut(handle).unwrap().0 = Some(handle);
        assert!(matches!(sim.update(), Err(SimError::SystemBusy("selfish"))));
    }

    #[test]
    fn test_parallel_pass_matches_sequential_order() {
        let run = |threads: usize| {
            let log = Log::default();
            let mut sim = Simulation::new(&SimulationConfig::default().with_worker_threads(threads)).unwrap();
            sim.world_mut().register::<Transform>().unwrap();
            sim.world_mut().register::<Velocity>().unwrap();
            sim.register_parallel_system(MotionSystem).unwrap();
            sim.register(recorder("r", &log)).unwrap();
            for i in (0..32).rev() {
                spawn_mover(&mut sim, Vec2::new(i as f32, 0.0), Vec2::new(0.5, i as f32 * 0.25));
            }
            log.lock().unwrap().clear();
            for _ in 0..3 {
                sim.update().unwrap();
            }
            (sim.state_hash().unwrap(), entries(&log))
        };
        let (hash_one, log_one) = run(1);
        let (hash_many, log_many) = run(4);
        assert_eq!(hash_one, hash_many);
        assert_eq!(log_one, log_many);
        // Moved messages follow attachment order, not position.
        assert_eq!(log_one[..2], ["r<-moved:0", "r<-moved:1"]);
    }

    #[test]
    fn test_motion_skips_zero_velocity() {
        let log = Log::default();
        let mut sim = sim();
        sim.register_parallel_system(MotionSystem).unwrap();
        sim.register(recorder("r", &log)).unwrap();
        let still = spawn_mover(&mut sim, Vec2::ZERO, Vec2::ZERO);
        let moving = spawn_mover(&mut sim, Vec2::ZERO, Vec2::new(1.0, -1.0));
        log.lock().unwrap().clear();
        sim.update().unwrap();
        assert_eq!(sim.world().get::<Transform>(still).unwrap().position, Vec2::ZERO);
        assert_eq!(
            sim.world().get::<Transform>(moving).unwrap().position,
            Vec2::new(1.0, -1.0)
        );
        assert_eq!(entries(&log), vec!["r<-moved:1", "r.update", "r.done"]);
    }

    #[test]
    fn test_snapshot_round_trip() {
        let build = || {
            let mut sim = sim();
            let tally = sim.register_component_system(Tally::default()).unwrap();
            sim.register_parallel_system(MotionSystem).unwrap();
            (sim, tally)
        };
        let (mut source, _) = build();
        for i in 0..3 {
            let e = spawn_mover(&mut source, Vec2::new(i as f32, 1.0), Vec2::new(1.0, 0.0));
            source.context().attach(e, Counter(i)).unwrap();
        }
        source.update().unwrap();
        source.update().unwrap();

        let mut packet = source.snapshot().unwrap();
        let (mut target, tally) = build();
        target.load_snapshot(&mut packet).unwrap();

        assert_eq!(target.frame(), 2);
        assert_eq!(target.world().entity_count(), 3);
        assert_eq!(target.system(tally).unwrap().passes, 2);
        assert_eq!(target.state_hash().unwrap(), source.state_hash().unwrap());

        source.update().unwrap();
        target.update().unwrap();
        assert_eq!(target.state_hash().unwrap(), source.state_hash().unwrap());
    }

    #[test]
    fn test_snapshot_with_different_systems_is_rejected() {
        let mut source = sim();
        source.register_parallel_system(MotionSystem).unwrap();
        let mut packet = source.snapshot().unwrap();
        let mut target = sim();
        assert!(matches!(
            target.load_snapshot(&mut packet),
            Err(SimError::SystemCountMismatch { expected: 0, found: 1 })
        ));
    }

    #[test]
    fn test_truncated_snapshot_leaves_state_untouched() {
        let build = || {
            let mut sim = sim();
            let tally = sim.register_component_system(Tally::default()).unwrap();
            sim.register_parallel_system(MotionSystem).unwrap();
            (sim, tally)
        };
        let (mut source, _) = build();
        spawn_mover(&mut source, Vec2::new(4.0, 4.0), Vec2::new(-1.0, 0.0));
        source.update().unwrap();
        let bytes = source.snapshot().unwrap().into_bytes();
        let mut truncated = Packet::from_bytes(bytes[..bytes.len() - 2].to_vec());

        let (mut target, tally) = build();
        let e = spawn_mover(&mut target, Vec2::ZERO, Vec2::new(0.0, 1.0));
        target.update().unwrap();
        target.update().unwrap();
        let before = target.state_hash().unwrap();

        assert!(target.load_snapshot(&mut truncated).is_err());
        assert_eq!(target.state_hash().unwrap(), before);
        assert_eq!(target.frame(), 2);
        assert_eq!(target.system(tally).unwrap().passes, 2);
        assert_eq!(target.world().get::<Velocity>(e), Some(&Velocity::new(0.0, 1.0)));
    }

    /// Keeps one byte of state and refuses to load a zero.
    struct Fussy(u8);

    impl System for Fussy {
        fn name(&self) -> &'static str {
            "fussy"
        }

        fn write_state(&self, sink: &mut dyn WireSink) -> Result<(), PacketError> {
            sink.write_u8(self.0);
            Ok(())
        }

        fn read_state(&mut self, packet: &mut Packet) -> Result<(), PacketError> {
            match packet.read_u8()? {
                0 => Err(PacketError::Custom("zero state".to_string())),
                value => {
                    self.0 = value;
                    Ok(())
                }
            }
        }
    }

    #[test]
    fn test_rejected_system_state_restores_earlier_systems() {
        let mut source = sim();
        source.register_component_system(Tally::default()).unwrap();
        source.register(Fussy(0)).unwrap();
        source.update().unwrap();
        let mut packet = source.snapshot().unwrap();

        let mut target = sim();
        let tally = target.register_component_system(Tally::default()).unwrap();
        let fussy = target.register(Fussy(3)).unwrap();
        for _ in 0..5 {
            target.update().unwrap();
        }
        let before = target.state_hash().unwrap();

        assert!(matches!(
            target.load_snapshot(&mut packet),
            Err(SimError::Packet(PacketError::Custom(_)))
        ));
        assert_eq!(target.system(tally).unwrap().passes, 5);
        assert_eq!(target.system(fussy).unwrap().0, 3);
        assert_eq!(target.state_hash().unwrap(), before);
        assert_eq!(target.frame(), 5);
    }

    #[test]
    fn test_single_float_divergence_shows_from_that_frame() {
        let build = || {
            let mut sim = sim();
            sim.register_parallel_system(MotionSystem).unwrap();
            for i in 0..3 {
                spawn_mover(&mut sim, Vec2::new(i as f32, 0.0), Vec2::new(0.0, 1.0));
            }
            sim
        };
        let mut a = build();
        let mut b = build();
        for frame in 0..6u64 {
            if frame == 3 {
                let e = b.world().entities().nth(1).unwrap();
                b.world_mut().get_mut::<Transform>(e).unwrap().position.x += 0.001;
            }
            a.update().unwrap();
            b.update().unwrap();
            let same = a.state_hash().unwrap() == b.state_hash().unwrap();
            assert_eq!(same, frame < 3, "frame {frame}");
        }
    }
}
