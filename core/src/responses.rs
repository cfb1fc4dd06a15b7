//! Response records: per-session upsert with partial-update semantics

use crate::db::RecordStore;
use crate::errors::{IntakeError, Result};
use crate::model::{Answers, Identity, NewResponse, ResponseRecord, SessionId, now};
use std::sync::Arc;

/// Upserts and retrieves the response record of a session
pub struct ResponseManager<S> {
    store: Arc<S>,
}

impl<S: RecordStore> ResponseManager<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Create or partially update the record of `session_id`.
    ///
    /// Provided fields overwrite stored ones, absent fields are kept. A
    /// present `identity` always overwrites the stored one. A new record of a
    /// linked session inherits the session's identity. Answers are stored as
    /// given: validate them before calling.
    pub fn save_responses(
        &self,
        session_id: &SessionId,
        answers: Answers,
        identity: Option<&Identity>,
    ) -> Result<ResponseRecord> {
        let (record, created) = self.store.write(|tx| {
            let session = tx
                .get_session(session_id)?
                .ok_or_else(|| IntakeError::session_not_found(session_id))?;

            let saved_at = now();
            match tx.response_by_session(session_id)? {
                Some(mut record) => {
                    record.answers.overlay(answers);
                    if let Some(identity) = identity {
                        record.identity = Some(identity.clone());
                    }
                    record.updated_at = saved_at;
                    tx.update_response(&record)?;
                    Ok((record, false))
                }
                None => {
                    let record = tx.insert_response(&NewResponse {
                        session_id: session_id.clone(),
                        identity: identity.cloned().or(session.identity),
                        answers,
                        created_at: saved_at,
                    })?;
                    Ok((record, true))
                }
            }
        })?;

        tracing::debug!(
            session_id = %session_id,
            record_id = record.id,
            created,
            "Responses saved"
        );
        Ok(record)
    }

    pub fn get_by_session(&self, session_id: &SessionId) -> Result<ResponseRecord> {
        self.store
            .read(|tx| tx.response_by_session(session_id))?
            .ok_or_else(|| IntakeError::response_not_found(session_id))
    }

    /// Records bound to `identity`, most recently created first
    pub fn get_by_identity(&self, identity: &Identity) -> Result<Vec<ResponseRecord>> {
        self.store.read(|tx| tx.responses_by_identity(identity))
    }
}
