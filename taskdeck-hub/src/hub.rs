//! Hub server core: shared state, WebSocket handler, client registry, and
//! change-feed fan-out.
//!
//! The hub accepts WebSocket connections, greets each client with a
//! hello/welcome handshake, executes store operations against the
//! in-memory [`Tables`], and pushes every resulting row change to the
//! subscriptions whose filter matches.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use taskdeck_proto::codec;
use taskdeck_proto::ids::{AccountId, ClientId, MeetingId, SubscriptionId};
use taskdeck_proto::store::{ChangeEvent, ChangeKind, RowFilter, Table};
use taskdeck_proto::wire::{ClientFrame, HubFrame, OpOutcome, StoreOp};
use tokio::sync::{RwLock, mpsc};

use crate::tables::Tables;

/// Default maximum allowed frame size in bytes (64 KB).
const DEFAULT_MAX_FRAME_SIZE: usize = 64 * 1024;

/// One client's change-feed subscription.
struct Subscription {
    client_id: ClientId,
    table: Table,
    filter: RowFilter,
}

/// Shared hub state holding the client registry, open subscriptions, and
/// the tables.
pub struct HubState {
    /// Maps client id to a channel sender for delivering WebSocket messages.
    connections: RwLock<HashMap<ClientId, mpsc::UnboundedSender<Message>>>,
    /// Open change-feed subscriptions across all clients.
    subscriptions: RwLock<HashMap<SubscriptionId, Subscription>>,
    /// Row storage.
    pub tables: Tables,
    /// Maximum allowed frame size in bytes.
    max_frame_size: usize,
}

impl Default for HubState {
    fn default() -> Self {
        Self::new()
    }
}

impl HubState {
    /// Creates a new hub state with empty registry and tables, using the
    /// default frame size limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(DEFAULT_MAX_FRAME_SIZE)
    }

    /// Creates a new hub state with a custom frame size limit.
    #[must_use]
    pub fn with_config(max_frame_size: usize) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            subscriptions: RwLock::new(HashMap::new()),
            tables: Tables::new(),
            max_frame_size,
        }
    }

    /// Registers a client, storing the sender half of its message channel.
    ///
    /// If the client was already registered, the old sender is replaced and
    /// the old channel is effectively closed (the previous WebSocket writer
    /// task will detect the channel closure and shut down).
    pub async fn register(
        &self,
        client_id: ClientId,
        sender: mpsc::UnboundedSender<Message>,
    ) -> Option<mpsc::UnboundedSender<Message>> {
        let mut conns = self.connections.write().await;
        conns.insert(client_id, sender)
    }

    /// Removes a client from the registry together with all of its
    /// subscriptions, returning the sender if it existed.
    pub async fn unregister(&self, client_id: ClientId) -> Option<mpsc::UnboundedSender<Message>> {
        {
            let mut subs = self.subscriptions.write().await;
            subs.retain(|_, sub| sub.client_id != client_id);
        }
        let mut conns = self.connections.write().await;
        conns.remove(&client_id)
    }

    /// Returns a clone of the sender for the given client, if registered.
    pub async fn get_sender(&self, client_id: ClientId) -> Option<mpsc::UnboundedSender<Message>> {
        let conns = self.connections.read().await;
        conns.get(&client_id).cloned()
    }

    /// Opens a change-feed subscription for a client.
    pub async fn subscribe(
        &self,
        client_id: ClientId,
        table: Table,
        filter: RowFilter,
    ) -> SubscriptionId {
        let subscription_id = SubscriptionId::new();
        let mut subs = self.subscriptions.write().await;
        subs.insert(
            subscription_id,
            Subscription {
                client_id,
                table,
                filter,
            },
        );
        subscription_id
    }

    /// Closes a subscription, returning whether it existed.
    pub async fn unsubscribe(&self, subscription_id: SubscriptionId) -> bool {
        let mut subs = self.subscriptions.write().await;
        subs.remove(&subscription_id).is_some()
    }

    /// Number of open subscriptions across all clients.
    pub async fn subscription_count(&self) -> usize {
        let subs = self.subscriptions.read().await;
        subs.len()
    }

    /// Delivers a change event to every subscription whose table and filter
    /// match the affected row.
    pub async fn publish(&self, event: &ChangeEvent) {
        let subs = self.subscriptions.read().await;
        let conns = self.connections.read().await;
        for (subscription_id, sub) in subs.iter() {
            if sub.table != event.row.table() || !sub.filter.matches(&event.row) {
                continue;
            }
            let Some(sender) = conns.get(&sub.client_id) else {
                continue;
            };
            let frame = HubFrame::Change {
                subscription_id: *subscription_id,
                event: event.clone(),
            };
            match codec::encode(&frame) {
                Ok(bytes) => {
                    if sender.send(Message::Binary(bytes.into())).is_err() {
                        tracing::warn!(
                            client_id = %sub.client_id,
                            "change delivery failed, writer gone"
                        );
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "failed to encode change frame");
                }
            }
        }
    }

    /// Send a WebSocket Close frame to all connected clients.
    ///
    /// Each client's writer task forwards the close frame, which the
    /// client-side reader sees as a disconnect. Used for graceful shutdown
    /// and testing.
    pub async fn close_all_connections(&self) {
        let conns = self.connections.read().await;
        for (client_id, sender) in conns.iter() {
            tracing::info!(client_id = %client_id, "sending close frame to client");
            let _ = sender.send(Message::Close(None));
        }
    }
}

/// Hello frame contents, captured before the client is registered.
struct HelloInfo {
    client_id: ClientId,
    account_id: AccountId,
    meeting_id: MeetingId,
}

/// Handles an upgraded WebSocket connection for a single client.
///
/// The connection lifecycle:
/// 1. Wait for a `Hello` frame.
/// 2. Register the client and send `Welcome` back.
/// 3. Enter the frame loop, executing store operations and replying.
/// 4. On disconnect, unregister the client and drop its subscriptions.
pub async fn handle_socket(socket: WebSocket, state: Arc<HubState>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Wait for the Hello frame.
    let Some(hello) = wait_for_hello(&mut ws_receiver).await else {
        tracing::warn!("connection closed before hello");
        return;
    };
    let HelloInfo {
        client_id,
        account_id,
        meeting_id,
    } = hello;

    tracing::info!(
        client_id = %client_id,
        account_id = %account_id,
        meeting_id = %meeting_id,
        "client hello"
    );

    // Create a channel for sending frames to this client's WebSocket writer.
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    // Register the client (replaces the old connection if duplicate).
    if state.register(client_id, tx).await.is_some() {
        tracing::info!(client_id = %client_id, "replaced existing connection (duplicate hello)");
        // Old sender is dropped, closing the old channel.
    }

    // Send Welcome acknowledgment.
    let welcome = HubFrame::Welcome { client_id };
    if let Err(e) = send_frame(&mut ws_sender, &welcome).await {
        tracing::error!(client_id = %client_id, error = %e, "failed to send welcome");
        state.unregister(client_id).await;
        return;
    }

    tracing::info!(client_id = %client_id, "client registered");

    // Spawn a writer task that forwards frames from the channel to the WebSocket.
    let mut write_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(msg).await.is_err() {
                tracing::warn!(client_id = %client_id, "WebSocket write failed");
                break;
            }
        }
    });

    // Reader loop: process incoming frames from this client.
    let reader_state = Arc::clone(&state);
    let mut read_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            match msg {
                Message::Binary(data) => {
                    handle_binary_frame(client_id, &data, &reader_state).await;
                }
                Message::Close(_) => {
                    tracing::info!(client_id = %client_id, "received close frame");
                    break;
                }
                _ => {
                    // Ignore text, ping, pong frames.
                }
            }
        }
    });

    // Wait for either task to finish, then abort the other.
    tokio::select! {
        _ = &mut read_task => {
            write_task.abort();
        }
        _ = &mut write_task => {
            read_task.abort();
        }
    }

    // Clean up: unregister the client and drop its subscriptions.
    state.unregister(client_id).await;
    tracing::info!(client_id = %client_id, "client disconnected and unregistered");
}

/// Waits for the first frame on the WebSocket, expecting a `Hello`.
///
/// Returns the hello contents if a valid `Hello` is received, or `None` if
/// the connection closes or an invalid frame arrives.
async fn wait_for_hello(
    receiver: &mut (impl StreamExt<Item = Result<Message, axum::Error>> + Unpin),
) -> Option<HelloInfo> {
    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Binary(data) => match codec::decode::<ClientFrame>(&data) {
                Ok(ClientFrame::Hello {
                    client_id,
                    account_id,
                    meeting_id,
                }) => {
                    if account_id.as_str().is_empty() {
                        tracing::warn!("received hello with empty account key");
                        return None;
                    }
                    return Some(HelloInfo {
                        client_id,
                        account_id,
                        meeting_id,
                    });
                }
                Ok(other) => {
                    tracing::warn!(frame = ?other, "expected hello, got different frame");
                    return None;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "failed to decode hello frame");
                    return None;
                }
            },
            Message::Close(_) => return None,
            _ => {
                // Skip non-binary frames (ping/pong) during the handshake.
            }
        }
    }
    None
}

/// Handles a binary WebSocket frame from a registered client.
async fn handle_binary_frame(client_id: ClientId, data: &[u8], state: &Arc<HubState>) {
    if data.len() > state.max_frame_size {
        tracing::warn!(
            client_id = %client_id,
            size = data.len(),
            max = state.max_frame_size,
            "frame exceeds size limit"
        );
        let err = HubFrame::Error {
            reason: format!(
                "frame too large: {} bytes (max {})",
                data.len(),
                state.max_frame_size
            ),
        };
        send_to_client(state, client_id, &err).await;
        return;
    }

    let frame = match codec::decode::<ClientFrame>(data) {
        Ok(f) => f,
        Err(e) => {
            tracing::warn!(client_id = %client_id, error = %e, "failed to decode frame");
            let err = HubFrame::Error {
                reason: format!("malformed frame: {e}"),
            };
            send_to_client(state, client_id, &err).await;
            return;
        }
    };

    match frame {
        ClientFrame::Request { request_id, op } => {
            let (outcome, events) = execute_op(state, client_id, op).await;

            // Reply before fanning out, so the requester sees its own
            // confirmation ahead of the matching change events.
            let reply = HubFrame::Reply {
                request_id,
                outcome,
            };
            send_to_client(state, client_id, &reply).await;

            for event in events {
                state.publish(&event).await;
            }
        }
        ClientFrame::Hello {
            client_id: new_id, ..
        } => {
            tracing::warn!(
                client_id = %client_id,
                new_id = %new_id,
                "received duplicate hello from registered client"
            );
        }
    }
}

/// Executes one store operation, returning the outcome together with the
/// change events the mutation produced.
#[allow(clippy::too_many_lines)]
async fn execute_op(
    state: &Arc<HubState>,
    client_id: ClientId,
    op: StoreOp,
) -> (OpOutcome, Vec<ChangeEvent>) {
    match op {
        StoreOp::Select {
            table,
            filter,
            order,
        } => {
            let rows = state.tables.select(table, &filter, order).await;
            tracing::debug!(
                client_id = %client_id,
                table = %table,
                rows = rows.len(),
                "select"
            );
            (OpOutcome::Rows(rows), Vec::new())
        }
        StoreOp::Insert { row } => {
            let table = row.table();
            match state.tables.insert(row).await {
                Ok(row) => {
                    tracing::debug!(client_id = %client_id, table = %table, "row inserted");
                    let event = ChangeEvent {
                        kind: ChangeKind::Insert,
                        row: row.clone(),
                    };
                    (OpOutcome::Inserted(row), vec![event])
                }
                Err(e) => {
                    tracing::warn!(client_id = %client_id, table = %table, error = %e, "insert failed");
                    (OpOutcome::Failed(e.to_string()), Vec::new())
                }
            }
        }
        StoreOp::Update {
            table,
            filter,
            patch,
        } => match state.tables.update(table, &filter, &patch).await {
            Ok(rows) => {
                tracing::debug!(
                    client_id = %client_id,
                    table = %table,
                    rows = rows.len(),
                    "rows updated"
                );
                let events = rows
                    .iter()
                    .map(|row| ChangeEvent {
                        kind: ChangeKind::Update,
                        row: row.clone(),
                    })
                    .collect();
                (OpOutcome::Rows(rows), events)
            }
            Err(e) => {
                tracing::warn!(client_id = %client_id, table = %table, error = %e, "update failed");
                (OpOutcome::Failed(e.to_string()), Vec::new())
            }
        },
        StoreOp::Delete { table, filter } => {
            let rows = state.tables.delete(table, &filter).await;
            tracing::debug!(
                client_id = %client_id,
                table = %table,
                rows = rows.len(),
                "rows deleted"
            );
            let events = rows
                .iter()
                .map(|row| ChangeEvent {
                    kind: ChangeKind::Delete,
                    row: row.clone(),
                })
                .collect();
            (OpOutcome::Deleted(rows.len()), events)
        }
        StoreOp::Subscribe { table, filter } => {
            let subscription_id = state.subscribe(client_id, table, filter).await;
            tracing::debug!(
                client_id = %client_id,
                table = %table,
                subscription_id = %subscription_id,
                "subscription opened"
            );
            (OpOutcome::Subscribed(subscription_id), Vec::new())
        }
        StoreOp::Unsubscribe { subscription_id } => {
            if state.unsubscribe(subscription_id).await {
                tracing::debug!(
                    client_id = %client_id,
                    subscription_id = %subscription_id,
                    "subscription closed"
                );
            } else {
                tracing::warn!(
                    client_id = %client_id,
                    subscription_id = %subscription_id,
                    "unsubscribe for unknown subscription"
                );
            }
            (OpOutcome::Unsubscribed, Vec::new())
        }
    }
}

/// Sends a hub frame to a registered client via its channel.
async fn send_to_client(state: &Arc<HubState>, client_id: ClientId, frame: &HubFrame) {
    if let Some(sender) = state.get_sender(client_id).await
        && let Ok(bytes) = codec::encode(frame)
    {
        let _ = sender.send(Message::Binary(bytes.into()));
    }
}

/// Encodes and sends a hub frame directly on a WebSocket sender.
async fn send_frame(
    ws_sender: &mut (impl SinkExt<Message, Error = axum::Error> + Unpin),
    frame: &HubFrame,
) -> Result<(), String> {
    let bytes = codec::encode(frame).map_err(|e| e.to_string())?;
    ws_sender
        .send(Message::Binary(bytes.into()))
        .await
        .map_err(|e| format!("WebSocket send error: {e}"))
}

/// Starts the hub server on the given address and returns the bound address
/// and a join handle.
///
/// This is the primary entry point used by both `main.rs` and test code.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server(
    addr: &str,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    start_server_with_state(addr, Arc::new(HubState::new())).await
}

/// Starts the hub server with a pre-configured [`HubState`].
///
/// Use [`HubState::with_config`] to create a state with a custom frame size
/// limit from the resolved [`crate::config::HubConfig`].
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server_with_state(
    addr: &str,
    state: Arc<HubState>,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let app = axum::Router::new()
        .route("/ws", axum::routing::get(ws_handler))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "hub server error");
        }
    });

    Ok((bound_addr, handle))
}

/// Starts the hub server in-process for testing.
///
/// Binds to `127.0.0.1:0` (OS-assigned port) and returns the bound address
/// and a [`tokio::task::JoinHandle`] for cleanup.
#[cfg(test)]
pub async fn start_test_server() -> (std::net::SocketAddr, tokio::task::JoinHandle<()>) {
    start_server("127.0.0.1:0")
        .await
        .expect("failed to start test server")
}

/// axum handler that upgrades an HTTP request to a WebSocket connection.
async fn ws_handler(
    ws: axum::extract::ws::WebSocketUpgrade,
    axum::extract::State(state): axum::extract::State<Arc<HubState>>,
) -> impl axum::response::IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}
