//! Store access behind a capability trait.
//!
//! Defines the [`StoreClient`] trait that every store implementation must
//! satisfy. Concrete implementations:
//! - [`memory::MemoryStore`] — in-process fake with the hub's matching and
//!   patch semantics, for tests and offline sessions
//! - [`remote::RemoteStore`] — WebSocket client speaking the hub protocol
//!
//! Controller and session logic depend only on the trait, so everything
//! above this layer tests deterministically against the memory store.

pub mod memory;
pub mod remote;

use taskdeck_proto::ids::SubscriptionId;
use taskdeck_proto::store::{ChangeEvent, Order, Patch, Row, RowFilter, Table};
use tokio::sync::mpsc;

/// Errors surfaced by store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The connection to the hub is gone.
    #[error("store connection closed")]
    ConnectionClosed,

    /// Could not establish a connection to the hub.
    #[error("could not connect to the hub: {0}")]
    Connect(String),

    /// The hub processed the request and refused it.
    #[error("store rejected the operation: {0}")]
    Rejected(String),

    /// Encoding or decoding a wire frame failed.
    #[error("codec error: {0}")]
    Codec(#[from] taskdeck_proto::codec::CodecError),

    /// The hub answered with an outcome that does not fit the request.
    #[error("unexpected reply: {0}")]
    UnexpectedReply(String),
}

/// A live change-feed subscription.
///
/// Events for rows matching the subscription's filter arrive in order.
/// Dropping the feed stops local delivery; the remote store additionally
/// needs an explicit [`StoreClient::unsubscribe`] to stop the hub pushing.
pub struct ChangeFeed {
    id: SubscriptionId,
    events: mpsc::UnboundedReceiver<ChangeEvent>,
}

impl ChangeFeed {
    pub(crate) const fn new(
        id: SubscriptionId,
        events: mpsc::UnboundedReceiver<ChangeEvent>,
    ) -> Self {
        Self { id, events }
    }

    /// The subscription this feed belongs to.
    #[must_use]
    pub const fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Waits for the next event. `None` means the subscription ended.
    pub async fn next(&mut self) -> Option<ChangeEvent> {
        self.events.recv().await
    }

    /// Returns a queued event without waiting, if one is ready.
    pub fn try_next(&mut self) -> Option<ChangeEvent> {
        self.events.try_recv().ok()
    }
}

/// Async capability trait for everything the client asks of the store.
///
/// Mutations publish one [`ChangeEvent`] per affected row to every
/// subscription whose table and filter match; delete events carry the
/// row's last state.
pub trait StoreClient: Send + Sync {
    /// Returns rows of `table` matching `filter`, optionally ordered.
    fn select(
        &self,
        table: Table,
        filter: RowFilter,
        order: Option<Order>,
    ) -> impl std::future::Future<Output = Result<Vec<Row>, StoreError>> + Send;

    /// Inserts one row and returns the store-confirmed copy.
    fn insert(&self, row: Row)
    -> impl std::future::Future<Output = Result<Row, StoreError>> + Send;

    /// Applies `patch` to every matching row; returns the new row states.
    fn update(
        &self,
        table: Table,
        filter: RowFilter,
        patch: Patch,
    ) -> impl std::future::Future<Output = Result<Vec<Row>, StoreError>> + Send;

    /// Deletes every matching row; returns how many were removed.
    fn delete(
        &self,
        table: Table,
        filter: RowFilter,
    ) -> impl std::future::Future<Output = Result<usize, StoreError>> + Send;

    /// Opens a change feed for `table` rows matching `filter`.
    fn subscribe(
        &self,
        table: Table,
        filter: RowFilter,
    ) -> impl std::future::Future<Output = Result<ChangeFeed, StoreError>> + Send;

    /// Closes a subscription opened by [`subscribe`](Self::subscribe).
    fn unsubscribe(
        &self,
        id: SubscriptionId,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Whether the store is currently reachable.
    fn is_connected(&self) -> bool;
}
