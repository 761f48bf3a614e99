//! Rollback-and-replay over a [`Simulation`].

use std::cmp::Ordering;
use std::collections::BTreeMap;

use lockstep_packet::{Packet, StateHasher, WireSink};
use lockstep_system::{Message, Simulation, SystemContext};
use tracing::{debug, info, warn};

use crate::command::{
    AddGameObject, Command, CommandKind, GameStateResponse, PlayerInput, RemoveGameObject,
    Synchronize,
};
use crate::config::TimelineConfig;
use crate::error::SyncError;

/// Result of comparing a peer's hash with the local one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashCheck {
    Match,
    Desync { frame: u64, local: u32, remote: u32 },
    /// The frame is outside the local hash log.
    Unknown,
}

/// What [`Timeline::handle`] did with a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Stored for a frame that has not run yet.
    Queued,
    /// Rolled back to `from` and replayed `frames` frames.
    Replayed { from: u64, frames: u64 },
    /// A [`Synchronize`] was compared against the local hash log.
    Checked { clock: u64, check: HashCheck },
    /// A command to send back to the requester.
    Reply(Command),
    /// Local state was replaced by a snapshot taken at `frame`.
    Resynchronized { frame: u64 },
}

/// Owns a [`Simulation`] and the recent history needed to apply commands at
/// the frame they were issued for.
///
/// Before each frame runs, its starting state is checkpointed and hashed.
/// Frame-bound commands are then applied in canonical order, and the frame is
/// updated. A command for a past frame still within the last
/// `history_frames` restores that frame's checkpoint and replays forward, so
/// the outcome is the same as if it had arrived in time.
///
/// A frame's hash always describes its state before its own commands.
pub struct Timeline {
    sim: Simulation,
    config: TimelineConfig,
    checkpoints: BTreeMap<u64, Packet>,
    hashes: BTreeMap<u64, u32>,
    commands: BTreeMap<u64, Vec<Command>>,
}

impl Timeline {
    pub fn new(sim: Simulation, config: TimelineConfig) -> Self {
        Self {
            sim,
            config,
            checkpoints: BTreeMap::new(),
            hashes: BTreeMap::new(),
            commands: BTreeMap::new(),
        }
    }

    /// The next frame to run.
    pub fn frame(&self) -> u64 {
        self.sim.frame()
    }

    pub fn simulation(&self) -> &Simulation {
        &self.sim
    }

    /// Direct access to the simulation. Changes made here are not recorded
    /// and are lost on rollback to an earlier checkpoint.
    pub fn simulation_mut(&mut self) -> &mut Simulation {
        &mut self.sim
    }

    /// Oldest frame a command can still be applied to.
    pub fn oldest_frame(&self) -> u64 {
        self.checkpoints
            .keys()
            .next()
            .copied()
            .unwrap_or_else(|| self.sim.frame())
    }

    /// Checkpoint, apply this frame's commands, and run it.
    pub fn advance(&mut self) -> Result<(), SyncError> {
        let frame = self.sim.frame();
        let checkpoint = self.sim.snapshot()?;
        let mut hasher = StateHasher::new();
        hasher.write_raw(checkpoint.as_bytes());
        self.hashes.insert(frame, hasher.value());
        self.checkpoints.insert(frame, checkpoint);

        if let Some(commands) = self.commands.get(&frame) {
            let mut ctx = self.sim.context();
            for command in commands {
                apply(&mut ctx, command)?;
            }
        }
        self.sim.update()?;
        self.prune();
        Ok(())
    }

    /// Hash of the state at the start of `frame`, before its commands.
    /// `None` once `frame` has left the log, or for a future frame.
    pub fn local_hash(&self, frame: u64) -> Result<Option<u32>, SyncError> {
        if frame == self.sim.frame() {
            return Ok(Some(self.sim.state_hash()?));
        }
        Ok(self.hashes.get(&frame).copied())
    }

    /// Compare a peer's hash for `frame` with ours.
    pub fn check_remote(&self, frame: u64, remote: u32) -> Result<HashCheck, SyncError> {
        let check = match self.local_hash(frame)? {
            None => HashCheck::Unknown,
            Some(local) if local == remote => HashCheck::Match,
            Some(local) => {
                warn!(frame, local, remote, "state hash mismatch");
                HashCheck::Desync {
                    frame,
                    local,
                    remote,
                }
            }
        };
        Ok(check)
    }

    /// Store a frame-bound command, replaying history if it is late.
    ///
    /// # Errors
    ///
    /// [`SyncError::NotFrameBound`] for kinds that are not applied at a
    /// frame, [`SyncError::TooOld`] if the origin frame's checkpoint is gone.
    pub fn schedule(&mut self, command: Command) -> Result<Outcome, SyncError> {
        if !command.kind.is_frame_bound() {
            return Err(SyncError::NotFrameBound(command.kind));
        }
        let current = self.sim.frame();
        let frame = command.origin_frame;
        if frame < current && !self.checkpoints.contains_key(&frame) {
            return Err(SyncError::TooOld {
                frame,
                oldest: self.oldest_frame(),
            });
        }

        debug!(frame, player = command.player, kind = ?command.kind, "scheduled command");
        let queue = self.commands.entry(frame).or_default();
        let at = queue.partition_point(|queued| queued.canonical_cmp(&command) != Ordering::Greater);
        queue.insert(at, command);

        if frame >= current {
            return Ok(Outcome::Queued);
        }
        self.rollback(frame, current)?;
        Ok(Outcome::Replayed {
            from: frame,
            frames: current - frame,
        })
    }

    /// The full state at the start of the next frame.
    pub fn snapshot_response(&self) -> Result<GameStateResponse, SyncError> {
        Ok(GameStateResponse {
            frame: self.sim.frame(),
            snapshot: self.sim.snapshot()?.into_bytes(),
        })
    }

    /// Replace local state with a peer's snapshot and drop history older
    /// than it. Commands for the snapshot frame or later are kept.
    pub fn resynchronize(&mut self, response: &GameStateResponse) -> Result<(), SyncError> {
        let mut packet = Packet::from_bytes(response.snapshot.clone());
        self.sim.load_snapshot(&mut packet)?;
        let frame = self.sim.frame();
        self.checkpoints.clear();
        self.hashes.clear();
        self.commands = self.commands.split_off(&frame);
        info!(frame, "resynchronized from snapshot");
        Ok(())
    }

    /// Dispatch any received command.
    pub fn handle(&mut self, command: Command) -> Result<Outcome, SyncError> {
        match command.kind {
            CommandKind::Synchronize => {
                let sync: Synchronize = command.decode()?;
                let check = self.check_remote(sync.clock, sync.hash)?;
                Ok(Outcome::Checked {
                    clock: sync.clock,
                    check,
                })
            }
            CommandKind::GameStateRequest => {
                let response = self.snapshot_response()?;
                let reply = Command::new(response.frame, command.player, &response)?;
                Ok(Outcome::Reply(reply))
            }
            CommandKind::GameStateResponse => {
                let response: GameStateResponse = command.decode()?;
                self.resynchronize(&response)?;
                Ok(Outcome::Resynchronized {
                    frame: self.sim.frame(),
                })
            }
            _ => self.schedule(command),
        }
    }

    fn rollback(&mut self, from: u64, to: u64) -> Result<(), SyncError> {
        let mut checkpoint = self
            .checkpoints
            .get(&from)
            .cloned()
            .ok_or(SyncError::TooOld {
                frame: from,
                oldest: self.oldest_frame(),
            })?;
        checkpoint.rewind();
        info!(from, to, "rolling back");
        self.sim.load_snapshot(&mut checkpoint)?;
        while self.sim.frame() < to {
            self.advance()?;
        }
        Ok(())
    }

    fn prune(&mut self) {
        let horizon = self
            .sim
            .frame()
            .saturating_sub(self.config.history_frames as u64);
        self.checkpoints = self.checkpoints.split_off(&horizon);
        self.hashes = self.hashes.split_off(&horizon);
        self.commands = self.commands.split_off(&horizon);
    }
}

impl std::fmt::Debug for Timeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Timeline")
            .field("frame", &self.sim.frame())
            .field("checkpoints", &self.checkpoints.len())
            .field("pending", &self.commands.values().map(Vec::len).sum::<usize>())
            .finish()
    }
}

fn apply(ctx: &mut SystemContext<'_>, command: &Command) -> Result<(), SyncError> {
    match command.kind {
        CommandKind::AddGameObject => {
            let add: AddGameObject = command.decode()?;
            let entity = ctx.spawn_from_blob(&mut Packet::from_bytes(add.blob))?;
            debug!(frame = ctx.frame(), %entity, "game object added");
        }
        CommandKind::RemoveGameObject => {
            let remove: RemoveGameObject = command.decode()?;
            if ctx.world().is_alive(remove.entity) {
                ctx.destroy(remove.entity)?;
            } else {
                warn!(frame = ctx.frame(), entity = %remove.entity, "remove for dead entity ignored");
            }
        }
        CommandKind::PlayerInput => {
            let input: PlayerInput = command.decode()?;
            ctx.send(Message::Input {
                player: command.player,
                action: input.action,
                pressed: input.pressed,
            })?;
        }
        kind => return Err(SyncError::NotFrameBound(kind)),
    }
    Ok(())
}
