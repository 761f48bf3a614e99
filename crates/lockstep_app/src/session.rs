//! A server and its clients, each in its own task, exchanging encoded
//! commands over channels.
//!
//! The server is authoritative. It runs the scripted commands, applies them
//! locally, broadcasts them ahead of their origin frame, and periodically
//! broadcasts a `Synchronize` carrying its clock and state hash. Clients
//! apply the same commands, pace themselves toward the server clock, and
//! compare hashes. On a mismatch a client asks for the full state and
//! resynchronizes from the response.

use std::collections::BTreeMap;
use std::time::Instant as StdInstant;

use anyhow::{Context, Result};
use lockstep_index::GroupMask;
use lockstep_math::Transform;
use lockstep_sync::{
    Command, CommandKind, FramePacer, GameStateRequest, HashCheck, Outcome, SyncError, Synchronize,
    Timeline,
};
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::{AppConfig, SessionConfig};
use crate::game;
use crate::tick::TickConfig;

type Upstream = mpsc::Sender<(usize, Vec<u8>)>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientReport {
    pub id: usize,
    pub frame: u64,
    pub hash: u32,
    pub desyncs: u32,
    pub resyncs: u32,
    pub rollbacks: u32,
}

#[derive(Debug, Clone)]
pub struct SessionReport {
    pub frame: u64,
    pub hash: u32,
    pub clients: Vec<ClientReport>,
}

/// Run a whole session to the configured tick limit.
pub async fn run(config: AppConfig) -> Result<SessionReport> {
    let (upstream, requests) = mpsc::channel(256);
    let mut outboxes = Vec::with_capacity(config.session.clients);
    let mut handles = Vec::with_capacity(config.session.clients);
    for id in 0..config.session.clients {
        let (outbox, inbox) = mpsc::channel(1024);
        outboxes.push(outbox);
        let client = Client::new(id, &config, inbox, upstream.clone())?;
        handles.push(tokio::spawn(client.run()));
    }
    drop(upstream);

    let server = Server::new(&config, outboxes, requests)?;
    let (frame, hash) = server.run().await?;

    let mut clients = Vec::with_capacity(handles.len());
    for handle in handles {
        clients.push(handle.await.context("client task panicked")??);
    }
    Ok(SessionReport {
        frame,
        hash,
        clients,
    })
}

struct Server {
    timeline: Timeline,
    rocks: GroupMask,
    tick: TickConfig,
    session: SessionConfig,
    outboxes: Vec<mpsc::Sender<Vec<u8>>>,
    requests: mpsc::Receiver<(usize, Vec<u8>)>,
}

impl Server {
    fn new(
        config: &AppConfig,
        outboxes: Vec<mpsc::Sender<Vec<u8>>>,
        requests: mpsc::Receiver<(usize, Vec<u8>)>,
    ) -> Result<Self> {
        let game = game::build(config)?;
        Ok(Self {
            timeline: game.timeline,
            rocks: game.rocks,
            tick: config.tick.clone(),
            session: config.session.clone(),
            outboxes,
            requests,
        })
    }

    async fn run(mut self) -> Result<(u64, u32)> {
        info!(
            tick_rate = self.tick.tick_rate,
            max_ticks = self.tick.max_ticks,
            clients = self.outboxes.len(),
            "server starting"
        );
        let mut ticker = time::interval(self.tick.duration());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        while !self.tick.reached_limit(self.timeline.frame()) {
            tokio::select! {
                _ = ticker.tick() => self.step().await?,
                Some((client, bytes)) = self.requests.recv() => self.on_request(client, bytes).await?,
            }
        }
        let frame = self.timeline.frame();
        let hash = self.synchronize().await?;
        info!(frame, hash, "server finished");
        Ok((frame, hash))
    }

    async fn step(&mut self) -> Result<()> {
        let started = StdInstant::now();
        let issue_for = self.timeline.frame() + self.session.input_delay;
        for command in game::scripted_commands(issue_for, self.session.players, self.rocks)? {
            self.timeline.schedule(command.clone())?;
            self.broadcast(&command).await?;
        }
        self.timeline.advance()?;
        let frame = self.timeline.frame();
        self.tick.check_budget(frame, started.elapsed());
        if self.session.sync_interval > 0 && frame % self.session.sync_interval == 0 {
            self.synchronize().await?;
        }
        Ok(())
    }

    /// Broadcast the clock and hash of the next frame. Returns the hash.
    async fn synchronize(&mut self) -> Result<u32> {
        let frame = self.timeline.frame();
        let hash = self
            .timeline
            .local_hash(frame)?
            .context("current frame always has a hash")?;
        debug!(frame, hash, "broadcasting synchronize");
        let sync = Command::new(frame, 0, &Synchronize { clock: frame, hash })?;
        self.broadcast(&sync).await?;
        Ok(hash)
    }

    async fn on_request(&mut self, client: usize, bytes: Vec<u8>) -> Result<()> {
        let command = Command::from_bytes(bytes)?;
        if command.kind != CommandKind::GameStateRequest {
            warn!(client, kind = ?command.kind, "ignoring unexpected client command");
            return Ok(());
        }
        if let Outcome::Reply(reply) = self.timeline.handle(command)? {
            info!(client, frame = reply.origin_frame, "sending game state");
            let Some(outbox) = self.outboxes.get(client) else {
                warn!(client, "state request from unknown client");
                return Ok(());
            };
            if outbox.send(reply.to_bytes()?).await.is_err() {
                warn!(client, "client gone before state reply");
            }
        }
        Ok(())
    }

    async fn broadcast(&self, command: &Command) -> Result<()> {
        let bytes = command.to_bytes()?;
        for (client, outbox) in self.outboxes.iter().enumerate() {
            if outbox.send(bytes.clone()).await.is_err() {
                warn!(client, "client channel closed");
            }
        }
        Ok(())
    }
}

struct Client {
    id: usize,
    timeline: Timeline,
    pacer: FramePacer,
    inbox: mpsc::Receiver<Vec<u8>>,
    upstream: Upstream,
    /// Server hashes for frames this client has not reached yet.
    pending_checks: BTreeMap<u64, u32>,
    awaiting_state: bool,
    inject_at: Option<u64>,
    report: ClientReport,
}

impl Client {
    fn new(
        id: usize,
        config: &AppConfig,
        inbox: mpsc::Receiver<Vec<u8>>,
        upstream: Upstream,
    ) -> Result<Self> {
        let game = game::build(config)?;
        let inject_at = match config.session.desync_client {
            Some(client) if client == id => config.session.desync_frame,
            _ => None,
        };
        Ok(Self {
            id,
            timeline: game.timeline,
            pacer: config.tick.pacer(),
            inbox,
            upstream,
            pending_checks: BTreeMap::new(),
            awaiting_state: false,
            inject_at,
            report: ClientReport {
                id,
                frame: 0,
                hash: 0,
                desyncs: 0,
                resyncs: 0,
                rollbacks: 0,
            },
        })
    }

    async fn run(mut self) -> Result<ClientReport> {
        info!(client = self.id, "client starting");
        let mut next = Instant::now();
        loop {
            tokio::select! {
                _ = time::sleep_until(next) => {
                    next += self.pacer.tick_duration();
                    self.step().await?;
                }
                message = self.inbox.recv() => match message {
                    Some(bytes) => self.on_command(bytes).await?,
                    None => break,
                },
            }
        }
        self.report.frame = self.timeline.frame();
        self.report.hash = self.timeline.simulation().state_hash()?;
        info!(
            client = self.id,
            frame = self.report.frame,
            hash = self.report.hash,
            desyncs = self.report.desyncs,
            resyncs = self.report.resyncs,
            rollbacks = self.report.rollbacks,
            "client finished"
        );
        Ok(self.report)
    }

    async fn step(&mut self) -> Result<()> {
        if self.inject_at == Some(self.timeline.frame()) {
            self.inject_at = None;
            self.diverge()?;
        }
        self.timeline.advance()?;
        self.evaluate_checks().await
    }

    /// Nudge the first transform by a thousandth of a unit.
    fn diverge(&mut self) -> Result<()> {
        let world = self.timeline.simulation_mut().world_mut();
        let Some(&target) = world.store::<Transform>()?.entities().first() else {
            return Ok(());
        };
        if let Some(transform) = world.get_mut::<Transform>(target) {
            transform.position.x += 0.001;
            warn!(client = self.id, entity = %target, "injected divergence");
        }
        Ok(())
    }

    async fn on_command(&mut self, bytes: Vec<u8>) -> Result<()> {
        let command = Command::from_bytes(bytes)?;
        if command.kind == CommandKind::Synchronize {
            let sync: Synchronize = command.decode()?;
            self.pacer.observe(self.timeline.frame(), sync.clock);
            self.pending_checks.insert(sync.clock, sync.hash);
            return self.evaluate_checks().await;
        }
        match self.timeline.handle(command) {
            Ok(Outcome::Replayed { from, frames }) => {
                self.report.rollbacks += 1;
                debug!(client = self.id, from, frames, "replayed late command");
            }
            Ok(Outcome::Resynchronized { frame }) => {
                self.report.resyncs += 1;
                self.awaiting_state = false;
                self.pending_checks = self.pending_checks.split_off(&frame);
                self.pacer.reset();
                info!(client = self.id, frame, "resynchronized");
            }
            Ok(_) => {}
            Err(SyncError::TooOld { frame, oldest }) => {
                warn!(client = self.id, frame, oldest, "command too old to replay");
                self.request_state().await?;
            }
            Err(err) => return Err(err.into()),
        }
        Ok(())
    }

    /// Compare every server hash for a frame this client has reached.
    async fn evaluate_checks(&mut self) -> Result<()> {
        if self.awaiting_state {
            return Ok(());
        }
        let frame = self.timeline.frame();
        let later = self.pending_checks.split_off(&(frame + 1));
        let ready = std::mem::replace(&mut self.pending_checks, later);
        for (at, remote) in ready {
            match self.timeline.check_remote(at, remote)? {
                HashCheck::Match => {}
                HashCheck::Unknown => debug!(client = self.id, frame = at, "hash outside history"),
                HashCheck::Desync { local, remote, .. } => {
                    self.report.desyncs += 1;
                    warn!(client = self.id, frame = at, local, remote, "desync detected");
                    return self.request_state().await;
                }
            }
        }
        Ok(())
    }

    async fn request_state(&mut self) -> Result<()> {
        if self.awaiting_state {
            return Ok(());
        }
        self.awaiting_state = true;
        self.pending_checks.clear();
        let request = Command::new(self.timeline.frame(), self.id as u32, &GameStateRequest)?;
        if self.upstream.send((self.id, request.to_bytes()?)).await.is_err() {
            warn!(client = self.id, "server gone, state request dropped");
        }
        Ok(())
    }
}
