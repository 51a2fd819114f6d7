//! Breakout-room opt-in flag.
//!
//! Each (account, meeting) pair has at most one breakout row holding a
//! single boolean: whether the participant joins breakout rooms today. The
//! switch mirrors that row — ensured at session start, flipped on demand,
//! and kept live through the change feed when another client flips it.

use taskdeck_proto::ids::{AccountId, MeetingId, Timestamp};
use taskdeck_proto::records::{BreakoutRecord, UserRecord};
use taskdeck_proto::store::{ChangeEvent, ChangeKind, Patch, Row, RowFilter, Table};

use crate::store::StoreClient;

/// Mirror of the session's breakout row.
///
/// `joining` stays `None` until [`ensure`] has run — the UI renders the
/// switch as unavailable until then. All store failures are logged and
/// swallowed; the flag simply keeps its last known value.
///
/// [`ensure`]: BreakoutSwitch::ensure
pub struct BreakoutSwitch {
    account_id: AccountId,
    meeting_id: MeetingId,
    joining: Option<bool>,
}

impl BreakoutSwitch {
    /// Creates an unresolved switch for the session's scope.
    #[must_use]
    pub const fn new(account_id: AccountId, meeting_id: MeetingId) -> Self {
        Self {
            account_id,
            meeting_id,
            joining: None,
        }
    }

    /// The current flag, if the row has been resolved.
    #[must_use]
    pub const fn joining(&self) -> Option<bool> {
        self.joining
    }

    /// Resolves the breakout row for `user`, creating it when missing.
    ///
    /// A fresh row starts with `joining = true`. An existing row keeps its
    /// flag, but a stale stored display name is refreshed to the user's
    /// current one.
    pub async fn ensure<S: StoreClient>(&mut self, store: &S, user: &UserRecord) {
        let rows = match store.select(Table::Breakouts, self.filter(), None).await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(error = %e, "could not look up the breakout row");
                return;
            }
        };

        if let Some(existing) = rows.iter().find_map(Row::as_breakout) {
            self.joining = Some(existing.joining);
            if existing.user_name != user.name {
                self.refresh_name(store, existing.joining, &user.name).await;
            }
            return;
        }

        match store.insert(Row::Breakout(BreakoutRecord::new(user))).await {
            Ok(row) => {
                self.joining = row.as_breakout().map(|b| b.joining);
            }
            Err(e) => tracing::warn!(error = %e, "could not create the breakout row"),
        }
    }

    /// Flips the flag, stamping now and the current display name.
    ///
    /// Returns the confirmed new value, or `None` when the switch is not
    /// resolved yet or the write failed.
    pub async fn toggle<S: StoreClient>(&mut self, store: &S, user_name: &str) -> Option<bool> {
        let current = self.joining?;
        let patch = Patch::SetBreakout {
            joining: !current,
            user_name: user_name.to_string(),
            at: Timestamp::now(),
        };
        match store.update(Table::Breakouts, self.filter(), patch).await {
            Ok(rows) => {
                let confirmed = rows.iter().find_map(Row::as_breakout)?.joining;
                self.joining = Some(confirmed);
                Some(confirmed)
            }
            Err(e) => {
                tracing::warn!(error = %e, "could not toggle the breakout flag");
                None
            }
        }
    }

    /// Adopts a breakout change observed on the feed.
    pub fn apply_change(&mut self, event: &ChangeEvent) {
        let Some(breakout) = event.row.as_breakout() else {
            return;
        };
        if breakout.account_id != self.account_id || breakout.meeting_id != self.meeting_id {
            return;
        }
        match event.kind {
            ChangeKind::Insert | ChangeKind::Update => self.joining = Some(breakout.joining),
            ChangeKind::Delete => self.joining = None,
        }
    }

    /// Rewrites the stored display name without changing the flag.
    async fn refresh_name<S: StoreClient>(&mut self, store: &S, joining: bool, name: &str) {
        let patch = Patch::SetBreakout {
            joining,
            user_name: name.to_string(),
            at: Timestamp::now(),
        };
        match store.update(Table::Breakouts, self.filter(), patch).await {
            Ok(rows) => {
                if let Some(confirmed) = rows.iter().find_map(Row::as_breakout) {
                    self.joining = Some(confirmed.joining);
                }
            }
            Err(e) => tracing::warn!(error = %e, "could not refresh the breakout display name"),
        }
    }

    fn filter(&self) -> RowFilter {
        RowFilter::any()
            .with_account(self.account_id.clone())
            .with_meeting(self.meeting_id.clone())
    }
}
