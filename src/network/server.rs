//! WebSocket Game Server
//!
//! Async WebSocket server for multiplayer connections.
//! Handles device authentication, matchmaking, and routing of match data
//! between clients and match sessions.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::time::{interval, timeout};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, instrument, warn};

use crate::game::input::MatchData;
use crate::game::state::PlayerId;
use crate::network::protocol::{ClientMessage, ErrorCode, ServerMessage};
use crate::runtime::{MatchHandle, MatchId, MatchRegistry, Matchmaker, RuntimeError};

/// Shortest device id accepted.
pub const MIN_DEVICE_ID_LEN: usize = 10;

/// Longest device id accepted.
pub const MAX_DEVICE_ID_LEN: usize = 128;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Disconnect clients silent for this long.
    pub idle_timeout: Duration,
    /// How often the matchmaker pairs waiting players.
    pub matchmaker_interval: Duration,
    /// Tickets older than this are dropped.
    pub matchmaker_timeout: Duration,
    /// How often ended matches are swept from the registry.
    pub cleanup_interval: Duration,
    /// Per-connection outbound queue length.
    pub outbox_size: usize,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 7350)),
            max_connections: 1000,
            idle_timeout: Duration::from_secs(300),
            matchmaker_interval: Duration::from_secs(1),
            matchmaker_timeout: Duration::from_secs(120),
            cleanup_interval: Duration::from_secs(60),
            outbox_size: 64,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Match runtime error.
    #[error("Runtime error: {0}")]
    Runtime(#[from] RuntimeError),
}

/// Connected client state.
struct ConnectedClient {
    /// Player identifier (after auth).
    player_id: Option<PlayerId>,
    /// Match the client is in.
    match_id: Option<MatchId>,
    /// Message sender (for direct messaging to client).
    sender: mpsc::Sender<ServerMessage>,
}

type Clients = Arc<RwLock<BTreeMap<SocketAddr, ConnectedClient>>>;

/// State shared by the accept loop, connection tasks and background loops.
#[derive(Clone)]
struct Shared {
    config: Arc<ServerConfig>,
    registry: Arc<MatchRegistry>,
    clients: Clients,
    matchmaker: Arc<RwLock<Matchmaker>>,
}

impl Shared {
    async fn player_of(&self, addr: SocketAddr) -> Option<PlayerId> {
        self.clients.read().await.get(&addr).and_then(|c| c.player_id)
    }

    async fn match_of(&self, addr: SocketAddr) -> Option<MatchId> {
        self.clients.read().await.get(&addr).and_then(|c| c.match_id)
    }

    async fn set_match(&self, addr: SocketAddr, match_id: Option<MatchId>) {
        if let Some(client) = self.clients.write().await.get_mut(&addr) {
            client.match_id = match_id;
        }
    }

    /// Senders of every connection authenticated as `player_id`.
    async fn senders_of(&self, player_id: &PlayerId) -> Vec<mpsc::Sender<ServerMessage>> {
        self.clients
            .read()
            .await
            .values()
            .filter(|c| c.player_id.as_ref() == Some(player_id))
            .map(|c| c.sender.clone())
            .collect()
    }

    async fn notify(&self, player_id: &PlayerId, msg: ServerMessage) {
        for sender in self.senders_of(player_id).await {
            let _ = sender.send(msg.clone()).await;
        }
    }
}

/// The game server.
pub struct GameServer {
    shared: Shared,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Create a server hosting matches from `registry`.
    pub fn new(config: ServerConfig, registry: MatchRegistry) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            shared: Shared {
                config: Arc::new(config),
                registry: Arc::new(registry),
                clients: Arc::new(RwLock::new(BTreeMap::new())),
                matchmaker: Arc::new(RwLock::new(Matchmaker::new())),
            },
            shutdown_tx,
        }
    }

    /// Bind the configured address and serve until shutdown.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = TcpListener::bind(&self.shared.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener until shutdown.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), GameServerError> {
        info!("Game server listening on {}", listener.local_addr()?);

        let matchmaking_handle = tokio::spawn(Self::run_matchmaking_loop(self.shared.clone()));
        let cleanup_handle = tokio::spawn(Self::run_cleanup_loop(self.shared.clone()));

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let clients_count = self.shared.clients.read().await.len();
                            if clients_count >= self.shared.config.max_connections {
                                warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            }

                            info!("New connection from {}", addr);
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        matchmaking_handle.abort();
        cleanup_handle.abort();
        self.shared.registry.terminate_all(0).await;

        Ok(())
    }

    /// Handle a new WebSocket connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let shared = self.shared.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    error!("WebSocket handshake failed for {}: {}", addr, e);
                    return;
                }
            };

            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(shared.config.outbox_size);

            shared.clients.write().await.insert(
                addr,
                ConnectedClient {
                    player_id: None,
                    match_id: None,
                    sender: msg_tx.clone(),
                },
            );

            let sender_task = tokio::spawn(async move {
                while let Some(msg) = msg_rx.recv().await {
                    let text = match msg.to_json() {
                        Ok(t) => t,
                        Err(e) => {
                            error!("Failed to serialize message: {}", e);
                            continue;
                        }
                    };
                    if ws_sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
            });

            let idle_timeout = shared.config.idle_timeout;
            loop {
                tokio::select! {
                    msg = timeout(idle_timeout, ws_receiver.next()) => {
                        match msg {
                            Err(_) => {
                                info!("Client {} idle for {:?}, disconnecting", addr, idle_timeout);
                                break;
                            }
                            Ok(Some(Ok(Message::Text(text)))) => {
                                match ClientMessage::from_json(&text) {
                                    Ok(client_msg) => {
                                        Self::handle_client_message(&shared, addr, client_msg, &msg_tx).await;
                                    }
                                    Err(e) => {
                                        debug!("Invalid message from {}: {}", addr, e);
                                        let _ = msg_tx
                                            .send(ServerMessage::error(ErrorCode::InvalidMessage, "Invalid message format"))
                                            .await;
                                    }
                                }
                            }
                            Ok(Some(Ok(Message::Close(_)))) | Ok(None) => {
                                debug!("Client {} disconnected", addr);
                                break;
                            }
                            Ok(Some(Err(e))) => {
                                error!("WebSocket error for {}: {}", addr, e);
                                break;
                            }
                            Ok(Some(Ok(_))) => {}
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        let _ = msg_tx.send(ServerMessage::Shutdown {
                            reason: "Server shutting down".to_string(),
                        }).await;
                        break;
                    }
                }
            }

            Self::disconnect(&shared, addr).await;

            // Give queued messages (the shutdown notice included) a moment to flush.
            drop(msg_tx);
            let mut sender_task = sender_task;
            if timeout(Duration::from_secs(1), &mut sender_task).await.is_err() {
                sender_task.abort();
            }
            info!("Client {} cleaned up", addr);
        });
    }

    /// Drop a connection's matchmaker ticket and match presence.
    async fn disconnect(shared: &Shared, addr: SocketAddr) {
        let client = shared.clients.write().await.remove(&addr);
        let Some(client) = client else { return };
        let Some(player_id) = client.player_id else { return };

        shared.matchmaker.write().await.remove_player(&player_id);

        if let Some(handle) = client.match_id.and_then(|id| shared.registry.get(&id)) {
            if let Err(e) = handle.leave(player_id).await {
                debug!("Leave on disconnect skipped: {}", e);
            }
        }
    }

    /// Handle a client message.
    async fn handle_client_message(
        shared: &Shared,
        addr: SocketAddr,
        msg: ClientMessage,
        sender: &mpsc::Sender<ServerMessage>,
    ) {
        if let ClientMessage::Ping { timestamp } = msg {
            let _ = sender
                .send(ServerMessage::Pong {
                    timestamp,
                    server_time: Utc::now().timestamp_millis(),
                })
                .await;
            return;
        }

        if let ClientMessage::Authenticate { device_id } = msg {
            Self::handle_authenticate(shared, addr, &device_id, sender).await;
            return;
        }

        let Some(player_id) = shared.player_of(addr).await else {
            let _ = sender
                .send(ServerMessage::error(ErrorCode::NotAuthenticated, "Must authenticate first"))
                .await;
            return;
        };

        let reply = match msg {
            ClientMessage::AddMatchmaker => Self::handle_add_matchmaker(shared, addr, player_id).await,
            ClientMessage::RemoveMatchmaker { ticket } => {
                let mut matchmaker = shared.matchmaker.write().await;
                if matchmaker.ticket_of(&player_id) == Some(ticket) {
                    matchmaker.remove(ticket);
                    debug!("Player {} left matchmaking", player_id);
                } else {
                    debug!("Ignoring ticket {} not held by {}", ticket, player_id);
                }
                None
            }
            ClientMessage::JoinMatch { match_id } => {
                Self::handle_join_match(shared, addr, player_id, match_id, sender).await
            }
            ClientMessage::MatchData { match_id, op_code, data } => {
                Self::handle_match_data(shared, addr, player_id, match_id, op_code, data).await
            }
            ClientMessage::LeaveMatch { match_id } => {
                Self::handle_leave_match(shared, addr, player_id, match_id).await
            }
            ClientMessage::Authenticate { .. } | ClientMessage::Ping { .. } => None,
        };

        if let Some(reply) = reply {
            let _ = sender.send(reply).await;
        }
    }

    /// Handle device authentication.
    async fn handle_authenticate(
        shared: &Shared,
        addr: SocketAddr,
        device_id: &str,
        sender: &mpsc::Sender<ServerMessage>,
    ) {
        let len = device_id.len();
        if !(MIN_DEVICE_ID_LEN..=MAX_DEVICE_ID_LEN).contains(&len) {
            let _ = sender
                .send(ServerMessage::error(
                    ErrorCode::InvalidDeviceId,
                    format!("Device id must be {}-{} bytes", MIN_DEVICE_ID_LEN, MAX_DEVICE_ID_LEN),
                ))
                .await;
            return;
        }

        let player_id = PlayerId::from_device_id(device_id);
        let previous = {
            let mut clients = shared.clients.write().await;
            let Some(client) = clients.get_mut(&addr) else { return };
            let previous = client.player_id.filter(|p| *p != player_id);

            // Switching users would strand the old presence in its match.
            if previous.is_some() && client.match_id.is_some() {
                drop(clients);
                let _ = sender
                    .send(ServerMessage::error(
                        ErrorCode::AlreadyInMatch,
                        "Leave the current match before switching users",
                    ))
                    .await;
                return;
            }

            client.player_id = Some(player_id);
            previous
        };

        // The old user's ticket goes too, unless another connection still speaks for them.
        if let Some(previous) = previous {
            if shared.senders_of(&previous).await.is_empty() {
                shared.matchmaker.write().await.remove_player(&previous);
            }
        }

        let _ = sender
            .send(ServerMessage::Authenticated {
                user_id: player_id,
                server_version: shared.config.version.clone(),
            })
            .await;

        debug!("Client {} authenticated as {}", addr, player_id);
    }

    async fn handle_add_matchmaker(
        shared: &Shared,
        addr: SocketAddr,
        player_id: PlayerId,
    ) -> Option<ServerMessage> {
        if shared.match_of(addr).await.is_some() {
            return Some(ServerMessage::error(ErrorCode::AlreadyInMatch, "Already in a match"));
        }

        let ticket = shared.matchmaker.write().await.add(player_id);
        debug!("Player {} queued with ticket {}", player_id, ticket);
        Some(ServerMessage::MatchmakerTicket { ticket })
    }

    async fn handle_join_match(
        shared: &Shared,
        addr: SocketAddr,
        player_id: PlayerId,
        match_id: MatchId,
        sender: &mpsc::Sender<ServerMessage>,
    ) -> Option<ServerMessage> {
        if shared.match_of(addr).await.is_some() {
            return Some(ServerMessage::error(ErrorCode::AlreadyInMatch, "Already in a match"));
        }

        let Some(handle) = shared.registry.get(&match_id) else {
            return Some(ServerMessage::error(ErrorCode::MatchNotFound, "Match not found"));
        };

        shared.matchmaker.write().await.remove_player(&player_id);

        match handle.join(player_id, BTreeMap::new(), sender.clone()).await {
            Ok(()) => {
                shared.set_match(addr, Some(match_id)).await;
                None
            }
            Err(RuntimeError::JoinRejected(reason)) => {
                Some(ServerMessage::error(ErrorCode::MatchJoinRejected, reason))
            }
            Err(RuntimeError::MatchClosed(_)) => {
                Some(ServerMessage::error(ErrorCode::MatchNotFound, "Match not found"))
            }
            Err(e) => {
                error!("Join failed for {}: {}", player_id, e);
                Some(ServerMessage::error(ErrorCode::InternalError, "Join failed"))
            }
        }
    }

    async fn handle_match_data(
        shared: &Shared,
        addr: SocketAddr,
        player_id: PlayerId,
        match_id: MatchId,
        op_code: i64,
        data: String,
    ) -> Option<ServerMessage> {
        let handle = match Self::current_match(shared, addr, match_id).await {
            Ok(handle) => handle,
            Err(reply) => return Some(reply),
        };

        let data = MatchData::new(player_id, op_code, data.into_bytes());
        match handle.send_data(data).await {
            Ok(()) => None,
            Err(_) => {
                shared.set_match(addr, None).await;
                Some(ServerMessage::error(ErrorCode::MatchNotFound, "Match has ended"))
            }
        }
    }

    async fn handle_leave_match(
        shared: &Shared,
        addr: SocketAddr,
        player_id: PlayerId,
        match_id: MatchId,
    ) -> Option<ServerMessage> {
        let handle = match Self::current_match(shared, addr, match_id).await {
            Ok(handle) => handle,
            Err(reply) => return Some(reply),
        };

        shared.set_match(addr, None).await;
        if let Err(e) = handle.leave(player_id).await {
            debug!("Leave skipped: {}", e);
        }
        None
    }

    /// The handle of `match_id`, provided this connection is in it.
    async fn current_match(
        shared: &Shared,
        addr: SocketAddr,
        match_id: MatchId,
    ) -> Result<MatchHandle, ServerMessage> {
        if shared.match_of(addr).await != Some(match_id) {
            return Err(ServerMessage::error(ErrorCode::NotInMatch, "Not in that match"));
        }

        match shared.registry.get(&match_id) {
            Some(handle) => Ok(handle),
            None => {
                shared.set_match(addr, None).await;
                Err(ServerMessage::error(ErrorCode::MatchNotFound, "Match has ended"))
            }
        }
    }

    /// Pair queued players and create their matches.
    async fn run_matchmaking_loop(shared: Shared) {
        let mut interval = interval(shared.config.matchmaker_interval);

        loop {
            interval.tick().await;

            let (groups, expired) = {
                let mut matchmaker = shared.matchmaker.write().await;
                let expired = matchmaker.expire(shared.config.matchmaker_timeout);
                (matchmaker.take_matches(), expired)
            };

            for entry in expired {
                shared
                    .notify(
                        &entry.player_id,
                        ServerMessage::error(ErrorCode::MatchmakerFailed, "Matchmaking timed out"),
                    )
                    .await;
            }

            for group in groups {
                match shared.registry.matchmaker_matched(&group) {
                    Ok(match_id) => {
                        let user_ids: Vec<PlayerId> = group.iter().map(|e| e.player_id).collect();
                        let matched = ServerMessage::MatchmakerMatched { match_id, user_ids };
                        for entry in &group {
                            shared.notify(&entry.player_id, matched.clone()).await;
                        }
                        info!("Matched {} players into {}", group.len(), match_id);
                    }
                    Err(e) => {
                        error!("Matchmaker matched hook failed: {}", e);
                        for entry in &group {
                            shared
                                .notify(
                                    &entry.player_id,
                                    ServerMessage::error(ErrorCode::MatchmakerFailed, e.to_string()),
                                )
                                .await;
                        }
                    }
                }
            }
        }
    }

    /// Sweep ended matches.
    async fn run_cleanup_loop(shared: Shared) {
        let mut interval = interval(shared.config.cleanup_interval);

        loop {
            interval.tick().await;

            let removed = shared.registry.cleanup();

            let mut clients = shared.clients.write().await;
            for client in clients.values_mut() {
                if let Some(id) = client.match_id {
                    if shared.registry.get(&id).is_none() {
                        client.match_id = None;
                    }
                }
            }

            if removed > 0 {
                info!("Cleanup removed {} ended matches", removed);
            }
        }
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Get active connection count.
    pub async fn connection_count(&self) -> usize {
        self.shared.clients.read().await.len()
    }

    /// Get live match count.
    pub fn match_count(&self) -> usize {
        self.shared.registry.list().len()
    }

    /// Get matchmaking queue size.
    pub async fn queue_size(&self) -> usize {
        self.shared.matchmaker.read().await.len()
    }
}
