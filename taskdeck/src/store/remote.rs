//! WebSocket store client.
//!
//! Speaks the hub protocol: one `Hello`/`Welcome` handshake when
//! connecting, then correlated `Request`/`Reply` frames plus unsolicited
//! `Change` frames for open subscriptions. A spawned reader task routes
//! replies to their waiting request (by request id, over a oneshot) and
//! change events to the matching feed channel; writes go through a
//! mutex-guarded sink so concurrent requests interleave cleanly.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use taskdeck_proto::codec;
use taskdeck_proto::ids::{AccountId, ClientId, MeetingId, SubscriptionId};
use taskdeck_proto::store::{ChangeEvent, Order, Patch, Row, RowFilter, Table};
use taskdeck_proto::wire::{ClientFrame, HubFrame, OpOutcome, StoreOp};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::task::AbortOnDropHandle;

use super::{ChangeFeed, StoreClient, StoreError};

/// Sink half of the WebSocket connection to the hub.
type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Stream half of the WebSocket connection to the hub.
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Requests waiting for their reply, keyed by request id.
type PendingMap = Arc<parking_lot::Mutex<HashMap<u64, oneshot::Sender<OpOutcome>>>>;

/// Senders feeding open subscriptions.
type FeedMap =
    Arc<parking_lot::Mutex<HashMap<SubscriptionId, mpsc::UnboundedSender<ChangeEvent>>>>;

/// How long to wait for the TCP and WebSocket handshake.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// How long to wait for the hub's `Welcome` after sending `Hello`.
pub const WELCOME_TIMEOUT: Duration = Duration::from_secs(5);

/// [`StoreClient`] implementation backed by a hub WebSocket connection.
pub struct RemoteStore {
    client_id: ClientId,
    sink: Arc<Mutex<WsSink>>,
    connected: Arc<AtomicBool>,
    pending: PendingMap,
    feeds: FeedMap,
    next_request_id: AtomicU64,
    /// Keeps the reader task alive for the store's lifetime; aborted when
    /// the store is dropped.
    _reader_task: AbortOnDropHandle<()>,
}

impl RemoteStore {
    /// Connects to the hub and performs the `Hello`/`Welcome` handshake.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Connect`] when the URL is invalid, the
    /// connection cannot be established within [`CONNECT_TIMEOUT`], or the
    /// hub does not answer `Welcome` within [`WELCOME_TIMEOUT`].
    pub async fn connect(
        url: &str,
        client_id: ClientId,
        account_id: AccountId,
        meeting_id: MeetingId,
    ) -> Result<Self, StoreError> {
        let parsed = url::Url::parse(url)
            .map_err(|e| StoreError::Connect(format!("invalid hub url {url}: {e}")))?;
        tracing::info!(url = %parsed, %client_id, "connecting to hub");

        let (socket, _response) = timeout(CONNECT_TIMEOUT, connect_async(parsed.as_str()))
            .await
            .map_err(|_| StoreError::Connect(format!("timed out connecting to {url}")))?
            .map_err(|e| StoreError::Connect(map_ws_connect_error(&e, url)))?;
        let (mut sink, mut source) = socket.split();

        let hello = ClientFrame::Hello {
            client_id,
            account_id,
            meeting_id,
        };
        let bytes = codec::encode(&hello)?;
        sink.send(Message::Binary(bytes.into()))
            .await
            .map_err(|e| StoreError::Connect(format!("could not send hello: {e}")))?;

        timeout(WELCOME_TIMEOUT, wait_for_welcome(&mut source, client_id))
            .await
            .map_err(|_| {
                StoreError::Connect("timed out waiting for the hub's welcome".to_string())
            })??;
        tracing::info!(%client_id, "hub accepted the session");

        let connected = Arc::new(AtomicBool::new(true));
        let pending = PendingMap::default();
        let feeds = FeedMap::default();

        let reader = tokio::spawn(reader_loop(
            source,
            Arc::clone(&connected),
            Arc::clone(&pending),
            Arc::clone(&feeds),
        ));

        Ok(Self {
            client_id,
            sink: Arc::new(Mutex::new(sink)),
            connected,
            pending,
            feeds,
            next_request_id: AtomicU64::new(1),
            _reader_task: AbortOnDropHandle::new(reader),
        })
    }

    /// The id this client registered under.
    #[must_use]
    pub const fn client_id(&self) -> ClientId {
        self.client_id
    }

    /// Sends one request and waits for its correlated reply.
    async fn request(&self, op: StoreOp) -> Result<OpOutcome, StoreError> {
        if !self.is_connected() {
            return Err(StoreError::ConnectionClosed);
        }
        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let bytes = codec::encode(&ClientFrame::Request { request_id, op })?;

        let (reply_tx, reply_rx) = oneshot::channel();
        self.pending.lock().insert(request_id, reply_tx);

        {
            let mut sink = self.sink.lock().await;
            if let Err(e) = sink.send(Message::Binary(bytes.into())).await {
                self.pending.lock().remove(&request_id);
                self.connected.store(false, Ordering::SeqCst);
                tracing::warn!(error = %e, request_id, "could not send request to the hub");
                return Err(StoreError::ConnectionClosed);
            }
        }

        // The reader task clears the pending map on disconnect, which wakes
        // this receiver with an error.
        reply_rx.await.map_err(|_| StoreError::ConnectionClosed)
    }
}

impl StoreClient for RemoteStore {
    async fn select(
        &self,
        table: Table,
        filter: RowFilter,
        order: Option<Order>,
    ) -> Result<Vec<Row>, StoreError> {
        expect_rows(
            self.request(StoreOp::Select {
                table,
                filter,
                order,
            })
            .await?,
        )
    }

    async fn insert(&self, row: Row) -> Result<Row, StoreError> {
        match self.request(StoreOp::Insert { row }).await? {
            OpOutcome::Inserted(row) => Ok(row),
            OpOutcome::Failed(reason) => Err(StoreError::Rejected(reason)),
            other => Err(unexpected(&other)),
        }
    }

    async fn update(
        &self,
        table: Table,
        filter: RowFilter,
        patch: Patch,
    ) -> Result<Vec<Row>, StoreError> {
        expect_rows(
            self.request(StoreOp::Update {
                table,
                filter,
                patch,
            })
            .await?,
        )
    }

    async fn delete(&self, table: Table, filter: RowFilter) -> Result<usize, StoreError> {
        match self.request(StoreOp::Delete { table, filter }).await? {
            OpOutcome::Deleted(count) => Ok(count),
            OpOutcome::Failed(reason) => Err(StoreError::Rejected(reason)),
            other => Err(unexpected(&other)),
        }
    }

    async fn subscribe(&self, table: Table, filter: RowFilter) -> Result<ChangeFeed, StoreError> {
        match self.request(StoreOp::Subscribe { table, filter }).await? {
            OpOutcome::Subscribed(subscription_id) => {
                let (sender, receiver) = mpsc::unbounded_channel();
                self.feeds.lock().insert(subscription_id, sender);
                Ok(ChangeFeed::new(subscription_id, receiver))
            }
            OpOutcome::Failed(reason) => Err(StoreError::Rejected(reason)),
            other => Err(unexpected(&other)),
        }
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), StoreError> {
        // Local delivery stops immediately; the hub stops pushing once it
        // processes the request.
        self.feeds.lock().remove(&id);
        match self
            .request(StoreOp::Unsubscribe {
                subscription_id: id,
            })
            .await?
        {
            OpOutcome::Unsubscribed => Ok(()),
            OpOutcome::Failed(reason) => Err(StoreError::Rejected(reason)),
            other => Err(unexpected(&other)),
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// Routes incoming frames until the connection ends, then fails every
/// pending request and closes every feed.
async fn reader_loop(
    mut source: WsSource,
    connected: Arc<AtomicBool>,
    pending: PendingMap,
    feeds: FeedMap,
) {
    while let Some(message) = source.next().await {
        match message {
            Ok(Message::Binary(data)) => match codec::decode::<HubFrame>(&data) {
                Ok(HubFrame::Reply {
                    request_id,
                    outcome,
                }) => {
                    let Some(waiter) = pending.lock().remove(&request_id) else {
                        tracing::debug!(request_id, "reply with no waiting request");
                        continue;
                    };
                    let _ = waiter.send(outcome);
                }
                Ok(HubFrame::Change {
                    subscription_id,
                    event,
                }) => {
                    let mut feeds = feeds.lock();
                    let delivered = feeds
                        .get(&subscription_id)
                        .is_some_and(|sender| sender.send(event).is_ok());
                    if !delivered {
                        feeds.remove(&subscription_id);
                        tracing::debug!(%subscription_id, "dropping change with no local feed");
                    }
                }
                Ok(HubFrame::Error { reason }) => {
                    tracing::warn!(%reason, "hub reported an error");
                }
                Ok(HubFrame::Welcome { .. }) => {
                    tracing::debug!("ignoring welcome after the handshake");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "could not decode hub frame");
                }
            },
            Ok(Message::Close(_)) => {
                tracing::info!("hub closed the connection");
                break;
            }
            Ok(_) => {} // ping/pong are handled by tungstenite
            Err(e) => {
                tracing::warn!(error = %e, "hub connection error");
                break;
            }
        }
    }

    connected.store(false, Ordering::SeqCst);
    pending.lock().clear();
    feeds.lock().clear();
    tracing::debug!("hub reader task finished");
}

/// Waits for the hub's `Welcome`, skipping any non-binary frames.
async fn wait_for_welcome(source: &mut WsSource, expected: ClientId) -> Result<(), StoreError> {
    loop {
        let Some(message) = source.next().await else {
            return Err(StoreError::Connect(
                "hub closed the connection during the handshake".to_string(),
            ));
        };
        let message =
            message.map_err(|e| StoreError::Connect(format!("handshake failed: {e}")))?;
        let Message::Binary(data) = message else {
            continue;
        };
        match codec::decode::<HubFrame>(&data)? {
            HubFrame::Welcome { client_id } if client_id == expected => return Ok(()),
            HubFrame::Error { reason } => return Err(StoreError::Connect(reason)),
            other => {
                tracing::debug!(?other, "ignoring frame during handshake");
            }
        }
    }
}

/// Turns a tungstenite connect error into something a user can act on.
fn map_ws_connect_error(error: &tokio_tungstenite::tungstenite::Error, url: &str) -> String {
    use tokio_tungstenite::tungstenite::Error;
    match error {
        Error::Io(e) => format!("could not reach the hub at {url}: {e}"),
        Error::Url(e) => format!("invalid hub url {url}: {e}"),
        other => format!("hub connection to {url} failed: {other}"),
    }
}

fn expect_rows(outcome: OpOutcome) -> Result<Vec<Row>, StoreError> {
    match outcome {
        OpOutcome::Rows(rows) => Ok(rows),
        OpOutcome::Failed(reason) => Err(StoreError::Rejected(reason)),
        other => Err(unexpected(&other)),
    }
}

fn unexpected(outcome: &OpOutcome) -> StoreError {
    StoreError::UnexpectedReply(format!("{outcome:?}"))
}
