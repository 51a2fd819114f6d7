//! Hub wire protocol frames.
//!
//! Frames travel as postcard-encoded WebSocket binary messages. A client
//! opens with [`ClientFrame::Hello`] and the hub answers
//! [`HubFrame::Welcome`]; after that the client sends correlated
//! [`ClientFrame::Request`] frames and the hub pushes replies and
//! change-feed events.

use serde::{Deserialize, Serialize};

use crate::ids::{AccountId, ClientId, MeetingId, SubscriptionId};
use crate::store::{ChangeEvent, Order, Patch, Row, RowFilter, Table};

/// A store operation carried inside a [`ClientFrame::Request`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreOp {
    /// Return rows of `table` matching `filter`, optionally ordered.
    Select {
        /// Which table to read.
        table: Table,
        /// Row predicate.
        filter: RowFilter,
        /// Result ordering, newest-first variants only.
        order: Option<Order>,
    },
    /// Insert one row; the confirmed row is echoed back.
    Insert {
        /// The row to store. Its table is implied by the variant.
        row: Row,
    },
    /// Apply a patch to every row of `table` matching `filter`.
    Update {
        /// Which table to mutate.
        table: Table,
        /// Row predicate.
        filter: RowFilter,
        /// The semantic update to apply.
        patch: Patch,
    },
    /// Delete every row of `table` matching `filter`.
    Delete {
        /// Which table to mutate.
        table: Table,
        /// Row predicate.
        filter: RowFilter,
    },
    /// Open a change-feed subscription on `table` rows matching `filter`.
    Subscribe {
        /// Which table to watch.
        table: Table,
        /// Row predicate; only matching rows are delivered.
        filter: RowFilter,
    },
    /// Close a previously opened subscription.
    Unsubscribe {
        /// The subscription to close.
        subscription_id: SubscriptionId,
    },
}

/// Frames sent from a client to the hub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientFrame {
    /// Client introduces itself.
    ///
    /// Must be the first frame after the WebSocket connects; the hub
    /// answers with [`HubFrame::Welcome`] or drops the connection.
    Hello {
        /// The client's self-assigned id.
        client_id: ClientId,
        /// Account the session is scoped to.
        account_id: AccountId,
        /// Meeting the session is scoped to.
        meeting_id: MeetingId,
    },

    /// A correlated store operation.
    Request {
        /// Client-assigned correlation id, echoed in the reply.
        request_id: u64,
        /// The operation to perform.
        op: StoreOp,
    },
}

/// Outcome of a store operation, carried in [`HubFrame::Reply`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpOutcome {
    /// Rows returned by a select or update.
    Rows(Vec<Row>),
    /// The confirmed row from an insert.
    Inserted(Row),
    /// Number of rows removed by a delete.
    Deleted(usize),
    /// A subscription was opened.
    Subscribed(SubscriptionId),
    /// A subscription was closed.
    Unsubscribed,
    /// The operation failed; human-readable reason.
    Failed(String),
}

/// Frames sent from the hub to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HubFrame {
    /// Hub acknowledges the hello.
    Welcome {
        /// The client id that was registered (echoed back).
        client_id: ClientId,
    },

    /// Reply to a [`ClientFrame::Request`].
    Reply {
        /// Correlation id from the request.
        request_id: u64,
        /// What happened.
        outcome: OpOutcome,
    },

    /// A change-feed event for one subscription.
    Change {
        /// Which subscription matched.
        subscription_id: SubscriptionId,
        /// The row change.
        event: ChangeEvent,
    },

    /// Hub reports a connection-level error condition.
    Error {
        /// Human-readable error description.
        reason: String,
    },
}
