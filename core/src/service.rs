//! Async facade over the intake components
//!
//! Each operation checks ownership first, then validates input, then runs
//! its store work on Tokio's blocking pool. Nothing touches the store until
//! both checks pass.

use crate::analytics::{AnalyticsAggregator, AnalyticsReport};
use crate::catalog::OptionCatalog;
use crate::config::{CountMode, IntakeConfig};
use crate::db::{RecordStore, SqliteStore, StoreCounts};
use crate::errors::{IntakeError, Result};
use crate::merge::{MergeEngine, MergeReport};
use crate::model::{Answers, Identity, ResponseRecord, Session, SessionId};
use crate::responses::ResponseManager;
use crate::sessions::SessionManager;
use crate::validate::ResponseValidator;
use serde::Serialize;
use std::sync::Arc;

/// Store reachability and row counts
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub version: &'static str,
    pub sessions: u64,
    pub responses: u64,
}

struct Components<S> {
    store: Arc<S>,
    sessions: SessionManager<S>,
    responses: ResponseManager<S>,
    merge: MergeEngine<S>,
    analytics: AnalyticsAggregator<S>,
}

/// Entry point for callers that have already authenticated a principal
pub struct IntakeService<S> {
    components: Arc<Components<S>>,
    validator: ResponseValidator,
}

impl<S> Clone for IntakeService<S> {
    fn clone(&self) -> Self {
        Self {
            components: Arc::clone(&self.components),
            validator: self.validator.clone(),
        }
    }
}

impl IntakeService<SqliteStore> {
    /// Open the configured store and catalog
    pub fn from_config(cfg: &IntakeConfig) -> Result<Self> {
        let catalog = cfg.load_catalog()?;
        let store = SqliteStore::open(cfg)?;
        Ok(Self::new(
            Arc::new(store),
            Arc::new(catalog),
            cfg.analytics.count_mode,
        ))
    }
}

impl<S: RecordStore> IntakeService<S> {
    pub fn new(store: Arc<S>, catalog: Arc<OptionCatalog>, count_mode: CountMode) -> Self {
        let components = Components {
            sessions: SessionManager::new(Arc::clone(&store)),
            responses: ResponseManager::new(Arc::clone(&store)),
            merge: MergeEngine::new(Arc::clone(&store)),
            analytics: AnalyticsAggregator::new(Arc::clone(&store), count_mode),
            store,
        };
        Self {
            components: Arc::new(components),
            validator: ResponseValidator::new(catalog),
        }
    }

    pub fn validator(&self) -> &ResponseValidator {
        &self.validator
    }

    async fn blocking<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&Components<S>) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let components = Arc::clone(&self.components);
        tokio::task::spawn_blocking(move || op(&components))
            .await
            .map_err(|e| IntakeError::storage_with_source("blocking task failed", e))?
    }

    pub async fn create_session(&self, device_id: impl Into<String>) -> Result<Session> {
        let device_id = device_id.into();
        self.blocking(move |c| c.sessions.create_session(&device_id)).await
    }

    pub async fn get_session(&self, session_id: SessionId) -> Result<Session> {
        self.blocking(move |c| c.sessions.get_session(&session_id)).await
    }

    /// Validate and save answers. `caller`, when authenticated, is stamped
    /// on the record.
    pub async fn save_responses(
        &self,
        session_id: SessionId,
        answers: Answers,
        caller: Option<&Identity>,
    ) -> Result<ResponseRecord> {
        let answers = self.validator.validate(answers).inspect_err(|e| {
            tracing::debug!(session_id = %session_id, field = e.field_name(), "Rejected answers");
        })?;
        let caller = caller.cloned();
        self.blocking(move |c| {
            c.responses
                .save_responses(&session_id, answers, caller.as_ref())
        })
        .await
    }

    pub async fn link_session(
        &self,
        caller: &Identity,
        session_id: SessionId,
        identity: Identity,
    ) -> Result<Session> {
        ensure_owner(caller, &identity)?;
        self.blocking(move |c| c.sessions.link_session(&session_id, &identity)).await
    }

    pub async fn get_responses_by_session(&self, session_id: SessionId) -> Result<ResponseRecord> {
        self.blocking(move |c| c.responses.get_by_session(&session_id)).await
    }

    pub async fn get_responses_by_identity(
        &self,
        caller: &Identity,
        identity: Identity,
    ) -> Result<Vec<ResponseRecord>> {
        ensure_owner(caller, &identity)?;
        self.blocking(move |c| c.responses.get_by_identity(&identity)).await
    }

    pub async fn merge_sessions(
        &self,
        caller: &Identity,
        identity: Identity,
        session_ids: Vec<SessionId>,
    ) -> Result<MergeReport> {
        ensure_owner(caller, &identity)?;
        self.blocking(move |c| c.merge.merge(&identity, &session_ids)).await
    }

    /// Any authenticated caller may read the aggregate report.
    // TODO: restrict to an analyst role once the identity provider exposes roles.
    pub async fn get_analytics(&self, caller: &Identity) -> Result<AnalyticsReport> {
        tracing::debug!(caller = %caller, "Analytics requested");
        self.blocking(|c| c.analytics.compute()).await
    }

    pub async fn health(&self) -> Result<HealthReport> {
        let StoreCounts {
            sessions,
            responses,
        } = self.blocking(|c| c.store.read(|tx| tx.counts())).await?;
        Ok(HealthReport {
            status: "healthy",
            version: crate::VERSION,
            sessions,
            responses,
        })
    }
}

fn ensure_owner(caller: &Identity, target: &Identity) -> Result<()> {
    if caller != target {
        tracing::warn!(caller = %caller, target = %target, "Ownership check failed");
        return Err(IntakeError::ownership(caller.as_str(), target.as_str()));
    }
    Ok(())
}
