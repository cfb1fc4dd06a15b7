//! Merge of several sessions' responses into one identity's record
//!
//! The canonical record is the most recently created one; `id` breaks ties.
//! Gaps in the canonical answers are filled from the other records, newest
//! first, and never override a value the canonical record already holds.
//! The other records are deleted and every existing session of the merge
//! set is bound to the identity, including sessions previously linked to a
//! different one. All of it commits as one write transaction.

use crate::db::RecordStore;
use crate::errors::{IntakeError, Result};
use crate::model::{Identity, ResponseRecord, SessionId, now};
use serde::Serialize;
use std::cmp::Reverse;
use std::collections::HashSet;
use std::sync::Arc;

/// Outcome of a successful merge
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    /// The surviving record, bound to the target identity
    pub canonical: ResponseRecord,
    /// Sessions whose records were absorbed and deleted
    pub absorbed_sessions: Vec<SessionId>,
    /// Sessions (canonical included) now linked to the identity
    pub linked_sessions: usize,
}

/// Reconciles sessions that turned out to belong to one identity
pub struct MergeEngine<S> {
    store: Arc<S>,
}

impl<S: RecordStore> MergeEngine<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn merge(&self, identity: &Identity, session_ids: &[SessionId]) -> Result<MergeReport> {
        let mut seen = HashSet::new();
        let session_ids: Vec<&SessionId> = session_ids
            .iter()
            .filter(|id| seen.insert(*id))
            .collect();

        let report = self.store.write(|tx| {
            let mut records = Vec::with_capacity(session_ids.len());
            for session_id in &session_ids {
                match tx.response_by_session(session_id)? {
                    Some(record) => records.push(record),
                    None => tracing::debug!(session_id = %session_id, "No responses to merge"),
                }
            }

            // Newest first: the head is canonical, the rest fill gaps in order.
            records.sort_by_key(|r| Reverse((r.created_at, r.id)));
            let mut records = records.into_iter();
            let Some(mut canonical) = records.next() else {
                return Err(IntakeError::conflict(
                    "no response records found for the given sessions",
                ));
            };
            let absorbed: Vec<ResponseRecord> = records.collect();

            for source in &absorbed {
                canonical.answers.fill_gaps_from(&source.answers);
            }

            let merged_at = now();
            canonical.identity = Some(identity.clone());
            canonical.updated_at = merged_at;
            tx.update_response(&canonical)?;

            for session_id in &session_ids {
                if **session_id != canonical.session_id {
                    tx.delete_responses(session_id)?;
                }
            }

            let mut linked_sessions = 0;
            for session_id in &session_ids {
                if let Some(mut session) = tx.get_session(session_id)? {
                    if let Some(previous) = session.identity.as_ref().filter(|p| *p != identity) {
                        tracing::warn!(
                            session_id = %session_id,
                            previous = %previous,
                            identity = %identity,
                            "Merge rebinds a session linked to another identity"
                        );
                    }
                    session.bind(identity.clone(), merged_at);
                    tx.update_session(&session)?;
                    linked_sessions += 1;
                }
            }

            Ok(MergeReport {
                canonical,
                absorbed_sessions: absorbed.into_iter().map(|r| r.session_id).collect(),
                linked_sessions,
            })
        })?;

        tracing::info!(
            identity = %identity,
            canonical_session = %report.canonical.session_id,
            absorbed = report.absorbed_sessions.len(),
            linked = report.linked_sessions,
            "Sessions merged"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteStore;
    use crate::model::{Answers, NewResponse, Session};
    use chrono::{DateTime, Duration, Utc};
    use pretty_assertions::assert_eq;

    struct Fixture {
        store: Arc<SqliteStore>,
        engine: MergeEngine<SqliteStore>,
        base: DateTime<Utc>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(SqliteStore::open_in_memory().expect("open"));
        Fixture {
            engine: MergeEngine::new(Arc::clone(&store)),
            store,
            base: now(),
        }
    }

    impl Fixture {
        /// Session plus record created `offset` seconds after the base time
        fn seed(&self, offset: i64, answers: Answers) -> SessionId {
            let session = Session::new("d1", self.base);
            let record = NewResponse {
                session_id: session.session_id.clone(),
                identity: None,
                answers,
                created_at: self.base + Duration::seconds(offset),
            };
            self.store
                .write(|tx| {
                    tx.insert_session(&session)?;
                    tx.insert_response(&record)
                })
                .expect("seed");
            session.session_id
        }

        fn record(&self, session_id: &SessionId) -> Option<ResponseRecord> {
            self.store
                .read(|tx| tx.response_by_session(session_id))
                .expect("read")
        }
    }

    #[test]
    fn test_latest_record_is_canonical_and_gains_gaps() {
        let f = fixture();
        let s1 = f.seed(
            0,
            Answers {
                age: Some(25),
                ..Default::default()
            },
        );
        let s2 = f.seed(
            10,
            Answers {
                top_concern: Some("Bloating".into()),
                ..Default::default()
            },
        );

        let report = f
            .engine
            .merge(&Identity::new("u1"), &[s1.clone(), s2.clone()])
            .expect("merge");

        assert_eq!(report.canonical.session_id, s2);
        assert_eq!(report.canonical.answers.age, Some(25));
        assert_eq!(report.canonical.answers.top_concern.as_deref(), Some("Bloating"));
        assert_eq!(report.canonical.identity, Some(Identity::new("u1")));
        assert_eq!(report.absorbed_sessions, vec![s1.clone()]);
        assert_eq!(report.linked_sessions, 2);

        assert!(f.record(&s1).is_none());
        assert_eq!(f.record(&s2), Some(report.canonical));
    }

    #[test]
    fn test_gap_fill_never_overrides_canonical() {
        let f = fixture();
        let older = f.seed(
            0,
            Answers {
                age: Some(30),
                ..Default::default()
            },
        );
        let newer = f.seed(
            5,
            Answers {
                age: Some(25),
                ..Default::default()
            },
        );
        let report = f
            .engine
            .merge(&Identity::new("u1"), &[older, newer])
            .expect("merge");
        assert_eq!(report.canonical.answers.age, Some(25));
    }

    #[test]
    fn test_newer_sources_fill_first() {
        let f = fixture();
        let oldest = f.seed(
            0,
            Answers {
                name: Some("Old".into()),
                ..Default::default()
            },
        );
        let middle = f.seed(
            1,
            Answers {
                name: Some("Mid".into()),
                ..Default::default()
            },
        );
        let newest = f.seed(2, Answers::default());
        let report = f
            .engine
            .merge(&Identity::new("u1"), &[oldest, middle, newest.clone()])
            .expect("merge");
        assert_eq!(report.canonical.session_id, newest);
        assert_eq!(report.canonical.answers.name.as_deref(), Some("Mid"));
    }

    #[test]
    fn test_equal_timestamps_pick_highest_id() {
        let f = fixture();
        let first = f.seed(0, Answers::default());
        let second = f.seed(0, Answers::default());
        let report = f
            .engine
            .merge(&Identity::new("u1"), &[second.clone(), first])
            .expect("merge");
        assert_eq!(report.canonical.session_id, second);
    }

    #[test]
    fn test_nothing_to_merge_is_conflict() {
        let f = fixture();
        let err = f
            .engine
            .merge(&Identity::new("u1"), &[SessionId::new("session_nope")])
            .expect_err("nothing");
        assert_eq!(err.kind(), crate::ErrorKind::Conflict);

        let err = f.engine.merge(&Identity::new("u1"), &[]).expect_err("empty");
        assert_eq!(err.kind(), crate::ErrorKind::Conflict);
    }

    #[test]
    fn test_duplicate_ids_do_not_delete_canonical() {
        let f = fixture();
        let only = f.seed(0, Answers::default());
        let report = f
            .engine
            .merge(&Identity::new("u1"), &[only.clone(), only.clone()])
            .expect("merge");
        assert!(report.absorbed_sessions.is_empty());
        assert_eq!(report.linked_sessions, 1);
        assert!(f.record(&only).is_some());
    }

    #[test]
    fn test_sessions_without_records_are_still_linked() {
        let f = fixture();
        let with_record = f.seed(0, Answers::default());
        let bare = Session::new("d2", f.base);
        f.store
            .write(|tx| tx.insert_session(&bare))
            .expect("insert");

        let report = f
            .engine
            .merge(
                &Identity::new("u1"),
                &[with_record, bare.session_id.clone()],
            )
            .expect("merge");
        assert_eq!(report.linked_sessions, 2);

        let session = f
            .store
            .read(|tx| tx.get_session(&bare.session_id))
            .expect("read")
            .expect("exists");
        assert!(session.is_linked());
    }

    #[test]
    fn test_merge_rebinds_session_linked_elsewhere() {
        let f = fixture();
        let theirs = f.seed(0, Answers::default());
        let mine = f.seed(1, Answers::default());
        f.store
            .write(|tx| {
                let mut session = tx.get_session(&theirs)?.expect("seeded");
                session.bind(Identity::new("u2"), f.base);
                tx.update_session(&session)
            })
            .expect("link to u2");

        let u1 = Identity::new("u1");
        let report = f.engine.merge(&u1, &[theirs.clone(), mine]).expect("merge");
        assert_eq!(report.linked_sessions, 2);

        let session = f
            .store
            .read(|tx| tx.get_session(&theirs))
            .expect("read")
            .expect("exists");
        assert_eq!(session.identity, Some(u1));
        assert!(session.is_linked());
    }
}
