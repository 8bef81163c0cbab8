//! Match Session
//!
//! One tokio task per match. The task owns the handler and its state and is
//! the only thing that ever calls into them: commands arrive over an mpsc
//! channel and ticks fire from an interval, both handled one at a time in a
//! single `select!` loop.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::game::input::MatchData;
use crate::game::state::PlayerId;
use crate::network::protocol::ServerMessage;
use crate::runtime::handler::{
    Dispatcher, JoinDecision, Match, MatchContext, MatchId, MatchParams,
};
use crate::runtime::RuntimeError;

/// Channel a presence receives its messages on.
pub type Outbox = mpsc::Sender<ServerMessage>;

/// Configuration for a match session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Maximum actions queued between two ticks. Overflow is dropped.
    pub input_queue_size: usize,
    /// Capacity of the session's command channel.
    pub command_buffer: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            input_queue_size: 128,
            command_buffer: 64,
        }
    }
}

/// Requests handled by the session task.
enum SessionCommand {
    Join {
        presence: PlayerId,
        metadata: BTreeMap<String, String>,
        outbox: Outbox,
        reply: oneshot::Sender<Result<(), RuntimeError>>,
    },
    Leave {
        presence: PlayerId,
    },
    Data(MatchData),
    Signal {
        data: String,
        reply: oneshot::Sender<String>,
    },
    Terminate {
        grace_seconds: u32,
    },
}

/// Cloneable handle to a running match.
#[derive(Clone, Debug)]
pub struct MatchHandle {
    id: MatchId,
    label: String,
    tick_rate: u32,
    created_at: DateTime<Utc>,
    size: Arc<AtomicUsize>,
    commands: mpsc::Sender<SessionCommand>,
}

impl std::fmt::Debug for SessionCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionCommand::Join { presence, .. } => write!(f, "Join({presence})"),
            SessionCommand::Leave { presence } => write!(f, "Leave({presence})"),
            SessionCommand::Data(data) => write!(f, "Data({}, op {})", data.sender, data.op_code),
            SessionCommand::Signal { .. } => f.write_str("Signal"),
            SessionCommand::Terminate { grace_seconds } => write!(f, "Terminate({grace_seconds})"),
        }
    }
}

impl MatchHandle {
    /// Match identifier.
    pub fn id(&self) -> MatchId {
        self.id
    }

    /// Label returned by the match's `init`.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Ticks per second.
    pub fn tick_rate(&self) -> u32 {
        self.tick_rate
    }

    /// When the match was created.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Presences currently in the match.
    pub fn size(&self) -> usize {
        self.size.load(Ordering::Relaxed)
    }

    /// Whether the session task has finished.
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    async fn send(&self, command: SessionCommand) -> Result<(), RuntimeError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| RuntimeError::MatchClosed(self.id))
    }

    /// Ask to join. Resolves once the match has accepted (and run its join
    /// callback) or rejected the presence.
    pub async fn join(
        &self,
        presence: PlayerId,
        metadata: BTreeMap<String, String>,
        outbox: Outbox,
    ) -> Result<(), RuntimeError> {
        let (reply, response) = oneshot::channel();
        self.send(SessionCommand::Join { presence, metadata, outbox, reply }).await?;
        response.await.map_err(|_| RuntimeError::MatchClosed(self.id))?
    }

    /// Remove a presence.
    pub async fn leave(&self, presence: PlayerId) -> Result<(), RuntimeError> {
        self.send(SessionCommand::Leave { presence }).await
    }

    /// Queue an action for the next tick.
    pub async fn send_data(&self, data: MatchData) -> Result<(), RuntimeError> {
        self.send(SessionCommand::Data(data)).await
    }

    /// Send an out-of-band signal and wait for the match's reply.
    pub async fn signal(&self, data: String) -> Result<String, RuntimeError> {
        let (reply, response) = oneshot::channel();
        self.send(SessionCommand::Signal { data, reply }).await?;
        response.await.map_err(|_| RuntimeError::MatchClosed(self.id))
    }

    /// Stop the match.
    pub async fn terminate(&self, grace_seconds: u32) -> Result<(), RuntimeError> {
        self.send(SessionCommand::Terminate { grace_seconds }).await
    }
}

/// Sends broadcasts to every presence's outbox.
struct PresenceDispatcher<'a> {
    match_id: MatchId,
    presences: &'a BTreeMap<PlayerId, Outbox>,
}

impl Dispatcher for PresenceDispatcher<'_> {
    fn broadcast(&mut self, op_code: i64, data: Vec<u8>) {
        let data = match String::from_utf8(data) {
            Ok(text) => text,
            Err(e) => {
                warn!(match_id = %self.match_id, "Dropping non-UTF-8 broadcast: {}", e);
                return;
            }
        };

        let message = ServerMessage::MatchData {
            match_id: self.match_id,
            op_code,
            data,
        };

        for (player, outbox) in self.presences {
            if let Err(e) = outbox.try_send(message.clone()) {
                warn!(match_id = %self.match_id, player = %player, "Broadcast not delivered: {}", e);
            }
        }
    }
}

/// A running match.
pub struct MatchSession<M: Match> {
    handler: M,
    ctx: MatchContext,
    state: M::State,
    label: String,
    config: SessionConfig,
    presences: BTreeMap<PlayerId, Outbox>,
    queue: Vec<MatchData>,
    size: Arc<AtomicUsize>,
}

impl<M: Match> MatchSession<M> {
    /// Initialize `handler` and start its session task.
    ///
    /// Must be called from inside a tokio runtime.
    pub fn spawn(
        handler: M,
        id: MatchId,
        params: &MatchParams,
        config: SessionConfig,
    ) -> Result<MatchHandle, RuntimeError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| RuntimeError::NoRuntime)?;

        let ctx = MatchContext::new(id);
        let init = handler.init(&ctx, params);
        let tick_rate = init.tick_rate.max(1);
        let size = Arc::new(AtomicUsize::new(0));
        let (commands_tx, commands_rx) = mpsc::channel(config.command_buffer.max(1));

        let session = MatchSession {
            handler,
            ctx,
            state: init.state,
            label: init.label.clone(),
            queue: Vec::with_capacity(config.input_queue_size),
            config,
            presences: BTreeMap::new(),
            size: size.clone(),
        };

        runtime.spawn(session.run(tick_rate, commands_rx));
        info!(match_id = %id, label = %init.label, tick_rate, "Match created");

        Ok(MatchHandle {
            id,
            label: init.label,
            tick_rate,
            created_at: Utc::now(),
            size,
            commands: commands_tx,
        })
    }

    async fn run(mut self, tick_rate: u32, mut commands: mpsc::Receiver<SessionCommand>) {
        let tick_duration = Duration::from_micros(1_000_000 / tick_rate as u64);
        let mut ticker = interval(tick_duration);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut grace_seconds = 0;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_tick();
                }
                command = commands.recv() => {
                    match command {
                        Some(SessionCommand::Terminate { grace_seconds: grace }) => {
                            grace_seconds = grace;
                            break;
                        }
                        Some(command) => {
                            if !self.handle_command(command) {
                                break;
                            }
                        }
                        None => {
                            debug!(match_id = %self.ctx.match_id, "All match handles dropped");
                            break;
                        }
                    }
                }
            }
        }

        commands.close();
        self.finish(grace_seconds);
    }

    fn run_tick(&mut self) {
        self.ctx.tick += 1;
        let batch = std::mem::take(&mut self.queue);
        let mut dispatcher = PresenceDispatcher {
            match_id: self.ctx.match_id,
            presences: &self.presences,
        };
        self.handler.tick(&self.ctx, &mut dispatcher, &mut self.state, batch);
    }

    /// Returns `false` when the session should stop.
    fn handle_command(&mut self, command: SessionCommand) -> bool {
        match command {
            SessionCommand::Join { presence, metadata, outbox, reply } => {
                let result = self.handle_join(presence, &metadata, outbox);
                let _ = reply.send(result);
            }
            SessionCommand::Leave { presence } => {
                if self.presences.remove(&presence).is_some() {
                    self.size.store(self.presences.len(), Ordering::Relaxed);
                    let mut dispatcher = PresenceDispatcher {
                        match_id: self.ctx.match_id,
                        presences: &self.presences,
                    };
                    self.handler.leave(&self.ctx, &mut dispatcher, &mut self.state, &[presence]);

                    if self.presences.is_empty() {
                        info!(match_id = %self.ctx.match_id, "Last presence left");
                        return false;
                    }
                }
            }
            SessionCommand::Data(data) => {
                if !self.presences.contains_key(&data.sender) {
                    debug!(match_id = %self.ctx.match_id, sender = %data.sender, "Data from non-presence dropped");
                } else if self.queue.len() >= self.config.input_queue_size {
                    warn!(match_id = %self.ctx.match_id, sender = %data.sender, "Input queue full, dropping data");
                } else {
                    self.queue.push(data);
                }
            }
            SessionCommand::Signal { data, reply } => {
                let mut dispatcher = PresenceDispatcher {
                    match_id: self.ctx.match_id,
                    presences: &self.presences,
                };
                let response = self.handler.signal(&self.ctx, &mut dispatcher, &mut self.state, data);
                let _ = reply.send(response);
            }
            SessionCommand::Terminate { .. } => return false,
        }
        true
    }

    fn handle_join(
        &mut self,
        presence: PlayerId,
        metadata: &BTreeMap<String, String>,
        outbox: Outbox,
    ) -> Result<(), RuntimeError> {
        match self.handler.join_attempt(&self.ctx, &self.state, &presence, metadata) {
            JoinDecision::Reject(reason) => {
                debug!(match_id = %self.ctx.match_id, player = %presence, reason = %reason, "Join rejected");
                Err(RuntimeError::JoinRejected(reason))
            }
            JoinDecision::Accept => {
                // Acknowledge before the join callback so the joiner sees
                // the ack ahead of any broadcast it triggers.
                let _ = outbox.try_send(ServerMessage::MatchJoined {
                    match_id: self.ctx.match_id,
                    label: self.label.clone(),
                });
                self.presences.insert(presence, outbox);
                self.size.store(self.presences.len(), Ordering::Relaxed);

                let mut dispatcher = PresenceDispatcher {
                    match_id: self.ctx.match_id,
                    presences: &self.presences,
                };
                self.handler.join(&self.ctx, &mut dispatcher, &mut self.state, &[presence]);
                Ok(())
            }
        }
    }

    fn finish(self, grace_seconds: u32) {
        let MatchSession { handler, ctx, state, presences, size, .. } = self;
        size.store(0, Ordering::Relaxed);

        let mut dispatcher = PresenceDispatcher {
            match_id: ctx.match_id,
            presences: &presences,
        };
        let _final_state = handler.terminate(&ctx, &mut dispatcher, state, grace_seconds);
        info!(match_id = %ctx.match_id, ticks = ctx.tick, "Match session ended");
    }
}
