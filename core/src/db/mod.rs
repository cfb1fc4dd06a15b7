//! Record store for sessions and response records
//!
//! The components above this layer only see two traits:
//! - [`RecordStore`] scopes work in a read or write transaction. A write
//!   either commits as a whole or leaves no trace; rollback on early return
//!   is guaranteed.
//! - [`StoreTx`] is the typed row API available inside a transaction.
//!
//! [`SqliteStore`] is the production implementation.

pub mod sqlite;
pub mod transactions;

pub use sqlite::SqliteStore;
pub use transactions::execute_in_transaction;

use crate::errors::Result;
use crate::model::{Identity, NewResponse, ResponseRecord, Session, SessionId};
use chrono::{DateTime, Utc};

/// Row counts (for health checks)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub struct StoreCounts {
    pub sessions: u64,
    pub responses: u64,
}

/// Typed row operations inside one transaction
pub trait StoreTx {
    fn insert_session(&self, session: &Session) -> Result<()>;

    fn get_session(&self, session_id: &SessionId) -> Result<Option<Session>>;

    /// Overwrite identity, status and completion time of an existing session
    fn update_session(&self, session: &Session) -> Result<()>;

    fn response_by_session(&self, session_id: &SessionId) -> Result<Option<ResponseRecord>>;

    /// Insert and return the stored record with its assigned id
    fn insert_response(&self, record: &NewResponse) -> Result<ResponseRecord>;

    /// Overwrite every mutable column of an existing record
    fn update_response(&self, record: &ResponseRecord) -> Result<()>;

    /// Stamp `identity` on every record of a session; returns rows touched
    fn set_response_identity(
        &self,
        session_id: &SessionId,
        identity: &Identity,
        updated_at: DateTime<Utc>,
    ) -> Result<usize>;

    /// Remove every record of a session; returns rows deleted
    fn delete_responses(&self, session_id: &SessionId) -> Result<usize>;

    /// Records bound to `identity`, newest `created_at` first (ties: higher id first)
    fn responses_by_identity(&self, identity: &Identity) -> Result<Vec<ResponseRecord>>;

    /// Stream every identity-bearing record to `visit`, grouped by identity and
    /// newest first within a group. Anonymous records are never visited.
    fn scan_identified_responses(
        &self,
        visit: &mut dyn FnMut(ResponseRecord) -> Result<()>,
    ) -> Result<()>;

    fn counts(&self) -> Result<StoreCounts>;
}

/// Transaction scoping over a durable store
pub trait RecordStore: Send + Sync + 'static {
    /// Run `op` against a consistent snapshot
    fn read<T>(&self, op: impl FnOnce(&dyn StoreTx) -> Result<T>) -> Result<T>;

    /// Run `op` in a serialized write transaction; commit on `Ok`, roll back on `Err`
    fn write<T>(&self, op: impl FnOnce(&dyn StoreTx) -> Result<T>) -> Result<T>;
}
