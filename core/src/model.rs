//! Persisted entities: sessions, answer sets and response records
//!
//! Answer fields are handled by explicit destructuring in [`Answers::overlay`]
//! and [`Answers::fill_gaps_from`], so adding a field is a compile error in
//! every routine that must learn about it (validator, partial update, merge).

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

/// Current time at the store's resolution (microseconds), so a value read
/// back compares equal to the one written.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Opaque principal handed in by the authentication layer. Never validated.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identity {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Survey session identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Prefix of generated identifiers
    pub const PREFIX: &'static str = "session_";

    /// Fresh identifier: `session_` followed by a random UUIDv4 in simple hex form
    pub fn generate() -> Self {
        Self(format!("{}{}", Self::PREFIX, uuid::Uuid::new_v4().simple()))
    }

    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Session lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    InProgress,
    Linked,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Linked => "linked",
        }
    }

    /// Parse from string representation
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "in_progress" => Some(Self::InProgress),
            "linked" => Some(Self::Linked),
            _ => None,
        }
    }
}

/// A client-scoped survey attempt.
///
/// `status` is `Linked` exactly when `identity` is present; use
/// [`Session::bind`] rather than setting either field alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: SessionId,
    pub device_id: String,
    pub identity: Option<Identity>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: SessionStatus,
}

impl Session {
    /// New anonymous session with a generated identifier
    pub fn new(device_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            session_id: SessionId::generate(),
            device_id: device_id.into(),
            identity: None,
            created_at: now,
            completed_at: None,
            status: SessionStatus::InProgress,
        }
    }

    /// Bind to an identity: sets the reference, flips status, stamps completion
    pub fn bind(&mut self, identity: Identity, now: DateTime<Utc>) {
        self.identity = Some(identity);
        self.status = SessionStatus::Linked;
        self.completed_at = Some(now);
    }

    pub fn is_linked(&self) -> bool {
        self.status == SessionStatus::Linked
    }
}

/// Answer set for one session. Absent fields mean "not provided".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Answers {
    pub name: Option<String>,
    pub age: Option<i32>,
    pub period_description: Option<String>,
    pub birth_control: Option<Vec<String>>,
    /// Free-form `MM/DD/YYYY` string, stored as given
    pub last_period_date: Option<String>,
    pub cycle_length: Option<String>,
    pub period_concerns: Option<Vec<String>>,
    pub body_concerns: Option<Vec<String>>,
    pub skin_hair_concerns: Option<Vec<String>>,
    pub mental_health_concerns: Option<Vec<String>>,
    pub other_concerns: Option<Vec<String>>,
    pub top_concern: Option<String>,
    pub diagnosed_conditions: Option<Vec<String>>,
}

/// Values that can be "present but empty"
trait Blank {
    fn is_blank(&self) -> bool;
}

impl Blank for String {
    fn is_blank(&self) -> bool {
        self.is_empty()
    }
}

impl Blank for Vec<String> {
    fn is_blank(&self) -> bool {
        self.is_empty()
    }
}

// Zero is a real age.
impl Blank for i32 {
    fn is_blank(&self) -> bool {
        false
    }
}

fn overwrite<T>(slot: &mut Option<T>, incoming: Option<T>) {
    if incoming.is_some() {
        *slot = incoming;
    }
}

fn fill_gap<T: Blank + Clone>(slot: &mut Option<T>, source: &Option<T>) {
    if !slot.as_ref().is_none_or(Blank::is_blank) {
        return;
    }
    if let Some(value) = source.as_ref().filter(|v| !v.is_blank()) {
        *slot = Some(value.clone());
    }
}

impl Answers {
    /// Partial update: every provided incoming field replaces the stored one,
    /// absent fields leave the stored value untouched.
    pub fn overlay(&mut self, incoming: Answers) {
        let Answers {
            name,
            age,
            period_description,
            birth_control,
            last_period_date,
            cycle_length,
            period_concerns,
            body_concerns,
            skin_hair_concerns,
            mental_health_concerns,
            other_concerns,
            top_concern,
            diagnosed_conditions,
        } = incoming;

        overwrite(&mut self.name, name);
        overwrite(&mut self.age, age);
        overwrite(&mut self.period_description, period_description);
        overwrite(&mut self.birth_control, birth_control);
        overwrite(&mut self.last_period_date, last_period_date);
        overwrite(&mut self.cycle_length, cycle_length);
        overwrite(&mut self.period_concerns, period_concerns);
        overwrite(&mut self.body_concerns, body_concerns);
        overwrite(&mut self.skin_hair_concerns, skin_hair_concerns);
        overwrite(&mut self.mental_health_concerns, mental_health_concerns);
        overwrite(&mut self.other_concerns, other_concerns);
        overwrite(&mut self.top_concern, top_concern);
        overwrite(&mut self.diagnosed_conditions, diagnosed_conditions);
    }

    /// Gap-filling: copy a source field only where this set is absent or empty.
    /// Values already present here are never replaced.
    pub fn fill_gaps_from(&mut self, source: &Answers) {
        let Answers {
            name,
            age,
            period_description,
            birth_control,
            last_period_date,
            cycle_length,
            period_concerns,
            body_concerns,
            skin_hair_concerns,
            mental_health_concerns,
            other_concerns,
            top_concern,
            diagnosed_conditions,
        } = source;

        fill_gap(&mut self.name, name);
        fill_gap(&mut self.age, age);
        fill_gap(&mut self.period_description, period_description);
        fill_gap(&mut self.birth_control, birth_control);
        fill_gap(&mut self.last_period_date, last_period_date);
        fill_gap(&mut self.cycle_length, cycle_length);
        fill_gap(&mut self.period_concerns, period_concerns);
        fill_gap(&mut self.body_concerns, body_concerns);
        fill_gap(&mut self.skin_hair_concerns, skin_hair_concerns);
        fill_gap(&mut self.mental_health_concerns, mental_health_concerns);
        fill_gap(&mut self.other_concerns, other_concerns);
        fill_gap(&mut self.top_concern, top_concern);
        fill_gap(&mut self.diagnosed_conditions, diagnosed_conditions);
    }
}

/// Stored answer set of one session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseRecord {
    /// Store-assigned, increasing; breaks `created_at` ties
    pub id: i64,
    pub session_id: SessionId,
    /// Copied from the session at link/merge time
    pub identity: Option<Identity>,
    #[serde(flatten)]
    pub answers: Answers,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Response record before the store assigns its id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewResponse {
    pub session_id: SessionId,
    pub identity: Option<Identity>,
    pub answers: Answers,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn list(values: &[&str]) -> Option<Vec<String>> {
        Some(values.iter().map(|s| (*s).to_string()).collect())
    }

    #[test]
    fn test_generated_session_ids_are_unique() {
        let a = SessionId::generate();
        let b = SessionId::generate();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with(SessionId::PREFIX));
        assert_eq!(a.as_str().len(), SessionId::PREFIX.len() + 32);
    }

    #[test]
    fn test_bind_keeps_status_in_step_with_identity() {
        let now = Utc::now();
        let mut session = Session::new("d1", now);
        assert_eq!(session.status, SessionStatus::InProgress);
        assert!(session.identity.is_none());
        assert!(session.completed_at.is_none());

        session.bind(Identity::new("u1"), now);
        assert!(session.is_linked());
        assert_eq!(session.identity, Some(Identity::new("u1")));
        assert_eq!(session.completed_at, Some(now));
    }

    #[test]
    fn test_overlay_leaves_absent_fields() {
        let mut stored = Answers {
            name: Some("A".into()),
            ..Default::default()
        };
        stored.overlay(Answers {
            age: Some(5),
            ..Default::default()
        });
        assert_eq!(stored.name.as_deref(), Some("A"));
        assert_eq!(stored.age, Some(5));
    }

    #[test]
    fn test_overlay_replaces_provided_fields() {
        let mut stored = Answers {
            body_concerns: list(&["Bloating", "Nausea"]),
            top_concern: Some("Bloating".into()),
            ..Default::default()
        };
        stored.overlay(Answers {
            body_concerns: list(&["Hot Flashes"]),
            ..Default::default()
        });
        assert_eq!(stored.body_concerns, list(&["Hot Flashes"]));
        assert_eq!(stored.top_concern.as_deref(), Some("Bloating"));
    }

    #[test]
    fn test_fill_gaps_never_overrides() {
        let mut canonical = Answers {
            age: Some(25),
            top_concern: Some("Bloating".into()),
            ..Default::default()
        };
        let source = Answers {
            name: Some("Sam".into()),
            age: Some(30),
            top_concern: Some("Adult Acne".into()),
            ..Default::default()
        };
        canonical.fill_gaps_from(&source);
        assert_eq!(canonical.age, Some(25));
        assert_eq!(canonical.top_concern.as_deref(), Some("Bloating"));
        assert_eq!(canonical.name.as_deref(), Some("Sam"));
    }

    #[test]
    fn test_fill_gaps_treats_empty_as_gap() {
        let mut canonical = Answers {
            name: Some(String::new()),
            period_concerns: Some(Vec::new()),
            ..Default::default()
        };
        let source = Answers {
            name: Some("Sam".into()),
            period_concerns: list(&["Heavy periods"]),
            body_concerns: Some(Vec::new()),
            ..Default::default()
        };
        canonical.fill_gaps_from(&source);
        assert_eq!(canonical.name.as_deref(), Some("Sam"));
        assert_eq!(canonical.period_concerns, list(&["Heavy periods"]));
        // Empty source values never fill anything
        assert_eq!(canonical.body_concerns, None);
    }

    #[test]
    fn test_fill_gaps_is_idempotent() {
        let source = Answers {
            name: Some("Sam".into()),
            age: Some(0),
            ..Default::default()
        };
        let mut once = Answers::default();
        once.fill_gaps_from(&source);
        let mut twice = once.clone();
        twice.fill_gaps_from(&source);
        assert_eq!(once, twice);
        assert_eq!(once.age, Some(0));
    }

    #[test]
    fn test_answers_json_accepts_partial_payload() {
        let answers: Answers =
            serde_json::from_str(r#"{"name":"Sam","period_concerns":["Heavy periods"]}"#)
                .expect("parse");
        assert_eq!(answers.name.as_deref(), Some("Sam"));
        assert_eq!(answers.period_concerns, list(&["Heavy periods"]));
        assert_eq!(answers.age, None);
    }
}
