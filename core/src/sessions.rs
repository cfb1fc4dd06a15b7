//! Session lifecycle: creation, lookup, and binding to an identity

use crate::db::RecordStore;
use crate::errors::{IntakeError, Result};
use crate::model::{Identity, Session, SessionId, now};
use std::sync::Arc;

/// Creates sessions and binds them to identities
pub struct SessionManager<S> {
    store: Arc<S>,
}

impl<S: RecordStore> SessionManager<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Persist a fresh anonymous session for `device_id`
    pub fn create_session(&self, device_id: &str) -> Result<Session> {
        let session = Session::new(device_id, now());
        self.store.write(|tx| tx.insert_session(&session))?;

        tracing::debug!(
            session_id = %session.session_id,
            device_id = %session.device_id,
            "Session created"
        );
        Ok(session)
    }

    pub fn get_session(&self, session_id: &SessionId) -> Result<Session> {
        self.store
            .read(|tx| tx.get_session(session_id))?
            .ok_or_else(|| IntakeError::session_not_found(session_id))
    }

    /// Bind a session to `identity` and stamp the identity on its responses.
    ///
    /// The session update and the response propagation commit together.
    /// Re-linking an already linked session is allowed and rebinds it.
    pub fn link_session(&self, session_id: &SessionId, identity: &Identity) -> Result<Session> {
        let (session, stamped) = self.store.write(|tx| {
            let mut session = tx
                .get_session(session_id)?
                .ok_or_else(|| IntakeError::session_not_found(session_id))?;

            if let Some(previous) = &session.identity {
                tracing::warn!(
                    session_id = %session_id,
                    previous = %previous,
                    identity = %identity,
                    "Relinking an already linked session"
                );
            }

            let linked_at = now();
            session.bind(identity.clone(), linked_at);
            tx.update_session(&session)?;
            let stamped = tx.set_response_identity(session_id, identity, linked_at)?;
            Ok((session, stamped))
        })?;

        tracing::info!(
            session_id = %session_id,
            identity = %identity,
            responses = stamped,
            "Session linked"
        );
        Ok(session)
    }
}
