//! Session identity: account/meeting keys, user bootstrap, name saving.
//!
//! A session is keyed by an account id and a meeting id. When the hosting
//! environment provides neither (running the binary by hand, demos), the
//! session falls back to freshly generated preview keys and stays fully
//! functional — preview is a mode, not an error.

use taskdeck_proto::ids::{AccountId, MeetingId, Timestamp};
use taskdeck_proto::name::{NameError, validate_display_name};
use taskdeck_proto::records::UserRecord;
use taskdeck_proto::store::{Order, Patch, Row, RowFilter, Table};

use crate::store::{StoreClient, StoreError};

/// The identity a session runs under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionKeys {
    /// Account scope for every row this session touches.
    pub account_id: AccountId,
    /// Meeting scope, used by the breakout flow.
    pub meeting_id: MeetingId,
    /// Whether any key had to be generated locally.
    pub preview: bool,
}

impl SessionKeys {
    /// Resolves the session keys from whatever the environment provided.
    ///
    /// Empty and whitespace-only values count as absent. Each missing key
    /// is replaced with a generated `preview-<epoch-millis>` identifier,
    /// and the session is marked preview when that happened.
    #[must_use]
    pub fn resolve(account: Option<&str>, meeting: Option<&str>) -> Self {
        let account = account.map(str::trim).filter(|s| !s.is_empty());
        let meeting = meeting.map(str::trim).filter(|s| !s.is_empty());
        let preview = account.is_none() || meeting.is_none();
        Self {
            account_id: account.map_or_else(|| AccountId::from(preview_key().as_str()), AccountId::from),
            meeting_id: meeting.map_or_else(|| MeetingId::from(preview_key().as_str()), MeetingId::from),
            preview,
        }
    }
}

fn preview_key() -> String {
    format!("preview-{}", Timestamp::now().as_millis())
}

/// Failure to persist a display name.
#[derive(Debug, thiserror::Error)]
pub enum NameSaveError {
    /// The input failed validation; shown to the user verbatim.
    #[error(transparent)]
    Invalid(#[from] NameError),
    /// The store refused or the connection is gone.
    #[error("could not save the name: {0}")]
    Store(#[from] StoreError),
}

/// Looks up the account's user row, refreshing its meeting key if stale.
///
/// Returns `None` when no row exists yet (the session starts name-less and
/// the name gate collects one) or when the lookup fails — a lookup failure
/// is logged and treated like a missing row so the session still starts.
pub async fn bootstrap_user<S: StoreClient>(
    store: &S,
    keys: &SessionKeys,
) -> Option<UserRecord> {
    let filter = RowFilter::any().with_account(keys.account_id.clone());
    let rows = match store.select(Table::Users, filter, Some(Order::CreatedAtDesc)).await {
        Ok(rows) => rows,
        Err(e) => {
            tracing::warn!(error = %e, "could not look up the session user");
            return None;
        }
    };
    let user = rows.into_iter().find_map(Row::into_user)?;

    if user.meeting_id == keys.meeting_id {
        return Some(user);
    }
    // The account moved to another meeting since the row was written.
    let filter = RowFilter::any().with_id(*user.id.as_uuid());
    let patch = Patch::SetUserMeeting(keys.meeting_id.clone());
    match store.update(Table::Users, filter, patch).await {
        Ok(rows) => rows
            .into_iter()
            .find_map(Row::into_user)
            .or(Some(user)),
        Err(e) => {
            tracing::warn!(error = %e, "could not refresh the user's meeting key");
            Some(user)
        }
    }
}

/// Validates and persists a display name for the session.
///
/// Updates the existing user row when one is known, inserting a fresh row
/// otherwise (or when the known row has vanished underneath us).
///
/// # Errors
///
/// Returns [`NameSaveError::Invalid`] when the input fails validation and
/// [`NameSaveError::Store`] when the write fails.
pub async fn save_name<S: StoreClient>(
    store: &S,
    keys: &SessionKeys,
    existing: Option<&UserRecord>,
    input: &str,
) -> Result<UserRecord, NameSaveError> {
    let name = validate_display_name(input)?;

    if let Some(user) = existing {
        let filter = RowFilter::any().with_id(*user.id.as_uuid());
        let patch = Patch::SetUserName(name.to_string());
        let confirmed = store
            .update(Table::Users, filter, patch)
            .await?
            .into_iter()
            .find_map(Row::into_user);
        if let Some(updated) = confirmed {
            return Ok(updated);
        }
        tracing::warn!(user_id = %user.id, "user row vanished; inserting a fresh one");
    }

    let record = UserRecord::new(
        keys.account_id.clone(),
        keys.meeting_id.clone(),
        name.to_string(),
    );
    let confirmed = store.insert(Row::User(record)).await?;
    confirmed
        .into_user()
        .ok_or_else(|| StoreError::UnexpectedReply("insert echoed a non-user row".to_string()).into())
}
