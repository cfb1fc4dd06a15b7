//! Population histograms over identified response records
//!
//! Anonymous records never contribute. The store streams identified records
//! grouped by identity, newest first, so the aggregator keeps only the
//! current identity and the running histograms in memory.

use crate::config::CountMode;
use crate::db::RecordStore;
use crate::errors::Result;
use crate::model::{Answers, Identity, ResponseRecord};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Aggregate report over the identified population
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AnalyticsReport {
    /// Distinct identities with at least one record
    pub total_users: u64,
    /// Keyed by decade bucket, e.g. `"20s"`
    pub age_distribution: BTreeMap<String, u64>,
    pub period_concerns_stats: BTreeMap<String, u64>,
    pub body_concerns_stats: BTreeMap<String, u64>,
    pub top_concerns_stats: BTreeMap<String, u64>,
}

/// Decade bucket label for an age: 25 → `"20s"`, 7 → `"0s"`
pub fn age_bucket(age: i32) -> String {
    format!("{}s", age.div_euclid(10) * 10)
}

fn bump(stats: &mut BTreeMap<String, u64>, key: &str) {
    *stats.entry(key.to_string()).or_default() += 1;
}

/// Incremental report builder fed one record at a time.
///
/// Records must arrive grouped by identity with the newest record of each
/// identity first; [`CountMode::PerIdentity`] relies on that order.
#[derive(Debug)]
pub struct ReportBuilder {
    mode: CountMode,
    current: Option<Identity>,
    report: AnalyticsReport,
}

impl ReportBuilder {
    pub fn new(mode: CountMode) -> Self {
        Self {
            mode,
            current: None,
            report: AnalyticsReport::default(),
        }
    }

    pub fn observe(&mut self, record: &ResponseRecord) {
        let Some(identity) = &record.identity else {
            return;
        };

        let first_of_identity = self.current.as_ref() != Some(identity);
        if first_of_identity {
            self.current = Some(identity.clone());
            self.report.total_users += 1;
        }

        if first_of_identity || self.mode == CountMode::PerRecord {
            self.tally(&record.answers);
        }
    }

    fn tally(&mut self, answers: &Answers) {
        let report = &mut self.report;
        if let Some(age) = answers.age {
            bump(&mut report.age_distribution, &age_bucket(age));
        }
        for concern in answers.period_concerns.iter().flatten() {
            bump(&mut report.period_concerns_stats, concern);
        }
        for concern in answers.body_concerns.iter().flatten() {
            bump(&mut report.body_concerns_stats, concern);
        }
        if let Some(top) = &answers.top_concern {
            bump(&mut report.top_concerns_stats, top);
        }
    }

    pub fn finish(self) -> AnalyticsReport {
        self.report
    }
}

/// Computes [`AnalyticsReport`] with a streaming scan of the store
pub struct AnalyticsAggregator<S> {
    store: Arc<S>,
    mode: CountMode,
}

impl<S: RecordStore> AnalyticsAggregator<S> {
    pub fn new(store: Arc<S>, mode: CountMode) -> Self {
        Self { store, mode }
    }

    pub fn compute(&self) -> Result<AnalyticsReport> {
        let mut builder = ReportBuilder::new(self.mode);
        self.store.read(|tx| {
            tx.scan_identified_responses(&mut |record: ResponseRecord| {
                builder.observe(&record);
                Ok(())
            })
        })?;

        let report = builder.finish();
        tracing::debug!(
            total_users = report.total_users,
            mode = ?self.mode,
            "Analytics computed"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteStore;
    use crate::model::{NewResponse, Session, SessionId, now};
    use chrono::Duration;
    use pretty_assertions::assert_eq;

    fn record(id: i64, identity: Option<&str>, answers: Answers) -> ResponseRecord {
        let at = now();
        ResponseRecord {
            id,
            session_id: SessionId::new(format!("session_{id}")),
            identity: identity.map(Identity::new),
            answers,
            created_at: at,
            updated_at: at,
        }
    }

    fn aged(age: i32) -> Answers {
        Answers {
            age: Some(age),
            ..Default::default()
        }
    }

    #[test]
    fn test_age_buckets() {
        assert_eq!(age_bucket(0), "0s");
        assert_eq!(age_bucket(9), "0s");
        assert_eq!(age_bucket(25), "20s");
        assert_eq!(age_bucket(30), "30s");
        assert_eq!(age_bucket(120), "120s");
    }

    #[test]
    fn test_anonymous_records_are_ignored() {
        let mut builder = ReportBuilder::new(CountMode::PerRecord);
        builder.observe(&record(1, Some("u1"), aged(23)));
        builder.observe(&record(2, Some("u2"), aged(31)));
        builder.observe(&record(3, None, aged(40)));
        let report = builder.finish();

        assert_eq!(report.total_users, 2);
        assert_eq!(
            report.age_distribution,
            BTreeMap::from([("20s".to_string(), 1), ("30s".to_string(), 1)])
        );
    }

    #[test]
    fn test_multi_select_values_each_count() {
        let mut builder = ReportBuilder::new(CountMode::PerIdentity);
        builder.observe(&record(
            1,
            Some("u1"),
            Answers {
                period_concerns: Some(vec!["Cramps".into(), "PMS".into(), "Spotting".into()]),
                body_concerns: Some(vec!["Bloating".into()]),
                top_concern: Some("Bloating".into()),
                ..Default::default()
            },
        ));
        builder.observe(&record(
            2,
            Some("u2"),
            Answers {
                period_concerns: Some(vec!["Cramps".into()]),
                top_concern: Some("Bloating".into()),
                ..Default::default()
            },
        ));
        let report = builder.finish();

        assert_eq!(report.period_concerns_stats.get("Cramps"), Some(&2));
        assert_eq!(report.period_concerns_stats.len(), 3);
        assert_eq!(report.body_concerns_stats.get("Bloating"), Some(&1));
        assert_eq!(report.top_concerns_stats.get("Bloating"), Some(&2));
        assert!(report.age_distribution.is_empty());
    }

    #[test]
    fn test_count_modes_differ_on_repeat_identity() {
        let newest = record(2, Some("u1"), aged(31));
        let older = record(1, Some("u1"), aged(23));

        let mut per_identity = ReportBuilder::new(CountMode::PerIdentity);
        let mut per_record = ReportBuilder::new(CountMode::PerRecord);
        for r in [&newest, &older] {
            per_identity.observe(r);
            per_record.observe(r);
        }
        let per_identity = per_identity.finish();
        let per_record = per_record.finish();

        assert_eq!(per_identity.total_users, 1);
        assert_eq!(
            per_identity.age_distribution,
            BTreeMap::from([("30s".to_string(), 1)])
        );
        assert_eq!(per_record.total_users, 1);
        assert_eq!(per_record.age_distribution.values().sum::<u64>(), 2);
    }

    #[test]
    fn test_compute_from_store() {
        let store = Arc::new(SqliteStore::open_in_memory().expect("open"));
        let base = now();
        let seeds = [
            (Some("u1"), 23, 0),
            (Some("u1"), 45, 1),
            (Some("u2"), 31, 0),
            (None, 40, 0),
        ];
        for (identity, age, offset) in seeds {
            let session = Session::new("d", base);
            let new = NewResponse {
                session_id: session.session_id.clone(),
                identity: identity.map(Identity::new),
                answers: aged(age),
                created_at: base + Duration::seconds(offset),
            };
            store
                .write(|tx| {
                    tx.insert_session(&session)?;
                    tx.insert_response(&new)
                })
                .expect("seed");
        }

        let report = AnalyticsAggregator::new(Arc::clone(&store), CountMode::PerIdentity)
            .compute()
            .expect("compute");
        assert_eq!(report.total_users, 2);
        // u1 counts once, with its newest record
        assert_eq!(
            report.age_distribution,
            BTreeMap::from([("30s".to_string(), 1), ("40s".to_string(), 1)])
        );

        let report = AnalyticsAggregator::new(store, CountMode::PerRecord)
            .compute()
            .expect("compute");
        assert_eq!(report.total_users, 2);
        assert_eq!(report.age_distribution.values().sum::<u64>(), 3);
    }

    #[test]
    fn test_compute_on_blocking_runtime() {
        let store = Arc::new(SqliteStore::open_in_memory().expect("open"));
        let aggregator = AnalyticsAggregator::new(store, CountMode::PerIdentity);
        let report = tokio_test::block_on(async move {
            tokio::task::spawn_blocking(move || aggregator.compute())
                .await
                .expect("join")
        })
        .expect("compute");
        assert_eq!(report, AnalyticsReport::default());
    }
}
