//! Database schema and record types

use crate::state_machine::{
    ExamSection, FollowupState, MessageRole, SessionPhase, SessionSnapshot, SessionStatus,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// SQL schema for initialization
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS cases (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    triage_label TEXT,
    seed TEXT NOT NULL,
    blueprint TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    case_id TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'IN_PROGRESS',
    phase TEXT NOT NULL DEFAULT 'TRIAGE',
    triage_data TEXT,
    physical_data TEXT,
    orders TEXT,
    results TEXT,
    followup TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,

    FOREIGN KEY (case_id) REFERENCES cases(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id, updated_at DESC);

CREATE TABLE IF NOT EXISTS messages (
    id TEXT PRIMARY KEY,
    session_id TEXT NOT NULL,
    sequence_id INTEGER NOT NULL,
    role TEXT NOT NULL,
    content TEXT NOT NULL,
    created_at TEXT NOT NULL,

    FOREIGN KEY (session_id) REFERENCES sessions(id) ON DELETE CASCADE
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_messages_session
    ON messages(session_id, sequence_id);

CREATE TABLE IF NOT EXISTS evaluations (
    id TEXT PRIMARY KEY,
    session_id TEXT NOT NULL UNIQUE,
    score INTEGER NOT NULL,
    feedback TEXT NOT NULL,
    strengths TEXT NOT NULL,
    weaknesses TEXT NOT NULL,
    improvements TEXT NOT NULL,
    created_at TEXT NOT NULL,

    FOREIGN KEY (session_id) REFERENCES sessions(id) ON DELETE CASCADE
);
"#;

/// Case record. Immutable once created; the blueprint is kept as raw JSON
/// and parsed leniently at use time.
#[derive(Debug, Clone, Serialize)]
pub struct CaseRecord {
    pub id: String,
    pub title: String,
    pub triage_label: Option<String>,
    pub seed: String,
    pub blueprint: Value,
    pub created_at: DateTime<Utc>,
}

impl CaseRecord {
    pub fn blueprint(&self) -> crate::case::CaseBlueprint {
        crate::case::CaseBlueprint::from_value(&self.blueprint)
    }
}

/// Set of ordered test keys, insertion-ordered.
#[derive(Debug, Clone, Default, Serialize)]
pub struct OrdersRecord {
    pub ordered: Vec<String>,
}

/// Session record: the mutable unit of work.
#[derive(Debug, Clone, Serialize)]
pub struct SessionRecord {
    pub id: String,
    pub user_id: String,
    pub case_id: String,
    pub status: SessionStatus,
    pub phase: SessionPhase,
    pub triage_data: Option<Map<String, Value>>,
    pub physical_data: Option<BTreeMap<ExamSection, Value>>,
    pub orders: Option<OrdersRecord>,
    pub results: Option<BTreeMap<String, String>>,
    pub followup: Option<FollowupState>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionRecord {
    /// View of this record as seen by the pure session operations.
    pub fn snapshot(&self, has_evaluation: bool) -> SessionSnapshot {
        SessionSnapshot {
            status: self.status,
            phase: self.phase,
            triage_data: self.triage_data.clone(),
            physical_data: self.physical_data.clone().unwrap_or_default(),
            ordered: self
                .orders
                .as_ref()
                .map(|o| o.ordered.clone())
                .unwrap_or_default(),
            results: self.results.clone().unwrap_or_default(),
            followup: self.followup.clone(),
            has_evaluation,
        }
    }
}

/// Transcript entry. Append-only; ordering is by `sequence_id`.
#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub id: String,
    pub session_id: String,
    pub sequence_id: i64,
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Coordinator evaluation. At most one per session, immutable.
#[derive(Debug, Clone, Serialize)]
pub struct Evaluation {
    pub id: String,
    pub session_id: String,
    pub score: i64,
    pub feedback: String,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub improvements: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Dashboard row: a session joined with its case title and score.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub id: String,
    pub status: SessionStatus,
    pub case_title: String,
    pub case_triage: Option<String>,
    pub score: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
