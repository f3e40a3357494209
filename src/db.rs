//! Persistence for cases, sessions, messages, and evaluations.
//!
//! Every mutating operation runs inside a single transaction behind the
//! connection mutex. State-machine operations go through
//! [`Database::update_session_with`], which reads the session, runs the
//! pure op, and persists its outcome without releasing the lock in between,
//! which gives the per-session serialization the state machine relies on:
//! one operation's read-modify-write of the structured sub-records can
//! never interleave with another's. No lock is ever held across a call to
//! the language-model collaborators.

mod schema;

pub use schema::*;

use crate::state_machine::{
    ExamSection, FollowupState, MessageRole, OutboundMessage, SessionPhase, SessionSnapshot,
    SessionStatus,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Transaction};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Session not found: {0}")]
    SessionNotFound(String),
    #[error("Case not found: {0}")]
    CaseNotFound(String),
    #[error("Session already evaluated: {0}")]
    AlreadyEvaluated(String),
}

pub type DbResult<T> = Result<T, DbError>;

/// Fields of a session changed by one operation; `None` leaves the stored
/// column untouched.
#[derive(Debug, Clone, Default)]
pub struct SessionUpdate {
    pub phase: Option<SessionPhase>,
    pub triage_data: Option<Map<String, Value>>,
    pub physical_data: Option<BTreeMap<ExamSection, Value>>,
    pub ordered: Option<Vec<String>>,
    pub results: Option<BTreeMap<String, String>>,
    pub followup: Option<FollowupState>,
}

impl SessionUpdate {
    fn is_empty(&self) -> bool {
        self.phase.is_none()
            && self.triage_data.is_none()
            && self.physical_data.is_none()
            && self.ordered.is_none()
            && self.results.is_none()
            && self.followup.is_none()
    }
}

/// Thread-safe database handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn run_migrations(&self) -> DbResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    // ==================== Case + Session Creation ====================

    /// Create a case and its session in one transaction, appending the
    /// opening SYSTEM message.
    pub fn create_case_with_session(
        &self,
        user_id: &str,
        title: &str,
        triage_label: Option<&str>,
        seed: &str,
        blueprint: &Value,
        opening_message: &str,
    ) -> DbResult<(CaseRecord, SessionRecord)> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let now = Utc::now();

        let case_id = uuid::Uuid::new_v4().to_string();
        let blueprint_str = serde_json::to_string(blueprint).unwrap_or_else(|_| "null".to_string());
        tx.execute(
            "INSERT INTO cases (id, title, triage_label, seed, blueprint, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![case_id, title, triage_label, seed, blueprint_str, now.to_rfc3339()],
        )?;

        let session_id = uuid::Uuid::new_v4().to_string();
        tx.execute(
            "INSERT INTO sessions (id, user_id, case_id, status, phase, created_at, updated_at)
             VALUES (?1, ?2, ?3, 'IN_PROGRESS', 'TRIAGE', ?4, ?4)",
            params![session_id, user_id, case_id, now.to_rfc3339()],
        )?;

        insert_message(&tx, &session_id, MessageRole::System, opening_message, now)?;
        tx.commit()?;

        let case = CaseRecord {
            id: case_id,
            title: title.to_string(),
            triage_label: triage_label.map(String::from),
            seed: seed.to_string(),
            blueprint: blueprint.clone(),
            created_at: now,
        };
        let session = SessionRecord {
            id: session_id,
            user_id: user_id.to_string(),
            case_id: case.id.clone(),
            status: SessionStatus::InProgress,
            phase: SessionPhase::Triage,
            triage_data: None,
            physical_data: None,
            orders: None,
            results: None,
            followup: None,
            created_at: now,
            updated_at: now,
        };
        Ok((case, session))
    }

    // ==================== Session Reads ====================

    /// Get a session scoped to its owner.
    pub fn get_session(&self, session_id: &str, user_id: &str) -> DbResult<SessionRecord> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, user_id, case_id, status, phase, triage_data, physical_data,
                    orders, results, followup, created_at, updated_at
             FROM sessions WHERE id = ?1 AND user_id = ?2",
        )?;

        stmt.query_row(params![session_id, user_id], map_session)
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => {
                    DbError::SessionNotFound(session_id.to_string())
                }
                other => DbError::Sqlite(other),
            })
    }

    pub fn get_case(&self, case_id: &str) -> DbResult<CaseRecord> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, title, triage_label, seed, blueprint, created_at
             FROM cases WHERE id = ?1",
        )?;

        stmt.query_row(params![case_id], |row| {
            Ok(CaseRecord {
                id: row.get(0)?,
                title: row.get(1)?,
                triage_label: row.get(2)?,
                seed: row.get(3)?,
                blueprint: row
                    .get::<_, Option<String>>(4)?
                    .and_then(|s| serde_json::from_str(&s).ok())
                    .unwrap_or(Value::Null),
                created_at: parse_datetime(&row.get::<_, String>(5)?),
            })
        })
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => DbError::CaseNotFound(case_id.to_string()),
            other => DbError::Sqlite(other),
        })
    }

    /// List a user's sessions, newest first.
    pub fn list_sessions(&self, user_id: &str, limit: u32) -> DbResult<Vec<SessionSummary>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT s.id, s.status, c.title, c.triage_label, e.score, s.created_at, s.updated_at
             FROM sessions s
             JOIN cases c ON c.id = s.case_id
             LEFT JOIN evaluations e ON e.session_id = s.id
             WHERE s.user_id = ?1
             ORDER BY s.updated_at DESC
             LIMIT ?2",
        )?;

        let rows = stmt.query_map(params![user_id, limit], |row| {
            Ok(SessionSummary {
                id: row.get(0)?,
                status: SessionStatus::from_wire(&row.get::<_, String>(1)?),
                case_title: row.get(2)?,
                case_triage: row.get(3)?,
                score: row.get(4)?,
                created_at: parse_datetime(&row.get::<_, String>(5)?),
                updated_at: parse_datetime(&row.get::<_, String>(6)?),
            })
        })?;

        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }

    // ==================== Message Operations ====================

    /// Append a message with a server-assigned sequence id; touches the
    /// session's `updated_at`.
    pub fn append_message(
        &self,
        session_id: &str,
        role: MessageRole,
        content: &str,
    ) -> DbResult<Message> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let now = Utc::now();
        let message = insert_message(&tx, session_id, role, content, now)?;
        touch_session(&tx, session_id, now)?;
        tx.commit()?;
        Ok(message)
    }

    /// Full ordered transcript for a session.
    pub fn get_messages(&self, session_id: &str) -> DbResult<Vec<Message>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, session_id, sequence_id, role, content, created_at
             FROM messages WHERE session_id = ?1 ORDER BY sequence_id ASC",
        )?;

        let rows = stmt.query_map(params![session_id], |row| {
            Ok(Message {
                id: row.get(0)?,
                session_id: row.get(1)?,
                sequence_id: row.get(2)?,
                role: MessageRole::from_wire(&row.get::<_, String>(3)?),
                content: row.get(4)?,
                created_at: parse_datetime(&row.get::<_, String>(5)?),
            })
        })?;

        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }

    // ==================== Structured Sub-record Updates ====================

    /// Run one state-machine operation atomically: read the session under
    /// the connection mutex, let `op` decide on the snapshot, and persist
    /// the sub-record/phase updates and messages it returns, all in one
    /// transaction. Concurrent operations on the same session serialize
    /// here, so neither can overwrite the other's merge or write back a
    /// stale phase. An error from `op` rolls everything back.
    pub fn update_session_with<T, E>(
        &self,
        session_id: &str,
        user_id: &str,
        op: impl FnOnce(&SessionSnapshot) -> Result<(SessionUpdate, Vec<OutboundMessage>, T), E>,
    ) -> Result<T, E>
    where
        E: From<DbError>,
    {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().map_err(DbError::from)?;

        let record = tx
            .query_row(
                "SELECT id, user_id, case_id, status, phase, triage_data, physical_data,
                        orders, results, followup, created_at, updated_at
                 FROM sessions WHERE id = ?1 AND user_id = ?2",
                params![session_id, user_id],
                map_session,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => {
                    DbError::SessionNotFound(session_id.to_string())
                }
                other => DbError::Sqlite(other),
            })?;
        let has_evaluation: bool = tx
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM evaluations WHERE session_id = ?1)",
                params![session_id],
                |row| row.get(0),
            )
            .map_err(DbError::from)?;

        let (update, messages, value) = op(&record.snapshot(has_evaluation))?;

        if !(update.is_empty() && messages.is_empty()) {
            apply_update_tx(&tx, session_id, &update, &messages, Utc::now())
                .map_err(DbError::from)?;
        }
        tx.commit().map_err(DbError::from)?;
        Ok(value)
    }

    // ==================== Finalize ====================

    /// Compare-and-swap start of finalize: IN_PROGRESS -> WAITING_EVAL /
    /// FINALIZED. Returns false when the session already left IN_PROGRESS,
    /// i.e. a concurrent finalize won the race.
    pub fn begin_finalize(&self, session_id: &str) -> DbResult<bool> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now();
        let updated = conn.execute(
            "UPDATE sessions SET status = 'WAITING_EVAL', phase = 'FINALIZED', updated_at = ?1
             WHERE id = ?2 AND status = 'IN_PROGRESS'",
            params![now.to_rfc3339(), session_id],
        )?;
        Ok(updated == 1)
    }

    /// Record the evaluation, append the coordinator message, and move the
    /// session to DONE, in one transaction. The UNIQUE constraint on
    /// `evaluations.session_id` is the backstop against a double finalize.
    pub fn complete_finalize(
        &self,
        session_id: &str,
        evaluation: &crate::collab::EvaluationOutcome,
        coordinator_message: &str,
    ) -> DbResult<Evaluation> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let now = Utc::now();

        let eval_id = uuid::Uuid::new_v4().to_string();
        tx.execute(
            "INSERT INTO evaluations
                 (id, session_id, score, feedback, strengths, weaknesses, improvements, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                eval_id,
                session_id,
                evaluation.score,
                evaluation.feedback,
                to_json(&evaluation.strengths),
                to_json(&evaluation.weaknesses),
                to_json(&evaluation.improvements),
                now.to_rfc3339(),
            ],
        )
        .map_err(|e| match e {
            rusqlite::Error::SqliteFailure(err, _)
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                DbError::AlreadyEvaluated(session_id.to_string())
            }
            other => DbError::Sqlite(other),
        })?;

        insert_message(
            &tx,
            session_id,
            MessageRole::CoordinatorAi,
            coordinator_message,
            now,
        )?;
        tx.execute(
            "UPDATE sessions SET status = 'DONE', updated_at = ?1 WHERE id = ?2",
            params![now.to_rfc3339(), session_id],
        )?;
        tx.commit()?;

        Ok(Evaluation {
            id: eval_id,
            session_id: session_id.to_string(),
            score: evaluation.score,
            feedback: evaluation.feedback.clone(),
            strengths: evaluation.strengths.clone(),
            weaknesses: evaluation.weaknesses.clone(),
            improvements: evaluation.improvements.clone(),
            created_at: now,
        })
    }

    pub fn get_evaluation(&self, session_id: &str) -> DbResult<Option<Evaluation>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, session_id, score, feedback, strengths, weaknesses, improvements, created_at
             FROM evaluations WHERE session_id = ?1",
        )?;

        let result = stmt.query_row(params![session_id], |row| {
            Ok(Evaluation {
                id: row.get(0)?,
                session_id: row.get(1)?,
                score: row.get(2)?,
                feedback: row.get(3)?,
                strengths: from_json_list(&row.get::<_, String>(4)?),
                weaknesses: from_json_list(&row.get::<_, String>(5)?),
                improvements: from_json_list(&row.get::<_, String>(6)?),
                created_at: parse_datetime(&row.get::<_, String>(7)?),
            })
        });

        match result {
            Ok(eval) => Ok(Some(eval)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(DbError::Sqlite(e)),
        }
    }

    pub fn has_evaluation(&self, session_id: &str) -> DbResult<bool> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM evaluations WHERE session_id = ?1)",
            params![session_id],
            |row| row.get(0),
        )
        .map_err(DbError::from)
    }
}

fn insert_message(
    tx: &Transaction<'_>,
    session_id: &str,
    role: MessageRole,
    content: &str,
    now: DateTime<Utc>,
) -> rusqlite::Result<Message> {
    let sequence_id: i64 = tx.query_row(
        "SELECT COALESCE(MAX(sequence_id), 0) + 1 FROM messages WHERE session_id = ?1",
        params![session_id],
        |row| row.get(0),
    )?;

    let id = uuid::Uuid::new_v4().to_string();
    tx.execute(
        "INSERT INTO messages (id, session_id, sequence_id, role, content, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            id,
            session_id,
            sequence_id,
            role.to_string(),
            content,
            now.to_rfc3339()
        ],
    )?;

    Ok(Message {
        id,
        session_id: session_id.to_string(),
        sequence_id,
        role,
        content: content.to_string(),
        created_at: now,
    })
}

fn apply_update_tx(
    tx: &Transaction<'_>,
    session_id: &str,
    update: &SessionUpdate,
    messages: &[OutboundMessage],
    now: DateTime<Utc>,
) -> rusqlite::Result<()> {
    if let Some(phase) = update.phase {
        tx.execute(
            "UPDATE sessions SET phase = ?1 WHERE id = ?2",
            params![phase.to_string(), session_id],
        )?;
    }
    if let Some(triage) = &update.triage_data {
        tx.execute(
            "UPDATE sessions SET triage_data = ?1 WHERE id = ?2",
            params![to_json(triage), session_id],
        )?;
    }
    if let Some(physical) = &update.physical_data {
        tx.execute(
            "UPDATE sessions SET physical_data = ?1 WHERE id = ?2",
            params![to_json(physical), session_id],
        )?;
    }
    if let Some(ordered) = &update.ordered {
        let record = serde_json::json!({ "ordered": ordered });
        tx.execute(
            "UPDATE sessions SET orders = ?1 WHERE id = ?2",
            params![record.to_string(), session_id],
        )?;
    }
    if let Some(results) = &update.results {
        tx.execute(
            "UPDATE sessions SET results = ?1 WHERE id = ?2",
            params![to_json(results), session_id],
        )?;
    }
    if let Some(followup) = &update.followup {
        tx.execute(
            "UPDATE sessions SET followup = ?1 WHERE id = ?2",
            params![to_json(followup), session_id],
        )?;
    }
    for msg in messages {
        insert_message(tx, session_id, msg.role, &msg.content, now)?;
    }
    touch_session(tx, session_id, now)?;
    Ok(())
}

fn touch_session(
    tx: &Transaction<'_>,
    session_id: &str,
    now: DateTime<Utc>,
) -> rusqlite::Result<()> {
    tx.execute(
        "UPDATE sessions SET updated_at = ?1 WHERE id = ?2",
        params![now.to_rfc3339(), session_id],
    )?;
    Ok(())
}

fn map_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<SessionRecord> {
    Ok(SessionRecord {
        id: row.get(0)?,
        user_id: row.get(1)?,
        case_id: row.get(2)?,
        status: SessionStatus::from_wire(&row.get::<_, String>(3)?),
        phase: SessionPhase::from_wire(&row.get::<_, String>(4)?),
        triage_data: parse_json_column(row.get::<_, Option<String>>(5)?),
        physical_data: parse_json_column(row.get::<_, Option<String>>(6)?),
        orders: row
            .get::<_, Option<String>>(7)?
            .map(|s| OrdersRecord {
                ordered: serde_json::from_str::<Value>(&s)
                    .ok()
                    .and_then(|v| serde_json::from_value(v.get("ordered")?.clone()).ok())
                    .unwrap_or_default(),
            }),
        results: parse_json_column(row.get::<_, Option<String>>(8)?),
        followup: parse_json_column(row.get::<_, Option<String>>(9)?),
        created_at: parse_datetime(&row.get::<_, String>(10)?),
        updated_at: parse_datetime(&row.get::<_, String>(11)?),
    })
}

fn to_json<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "null".to_string())
}

fn from_json_list(s: &str) -> Vec<String> {
    serde_json::from_str(s).unwrap_or_default()
}

fn parse_json_column<T: serde::de::DeserializeOwned>(s: Option<String>) -> Option<T> {
    s.and_then(|s| serde_json::from_str(&s).ok())
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn seed_session(db: &Database) -> (CaseRecord, SessionRecord) {
        db.create_case_with_session(
            "user-1",
            "Dor abdominal e náuseas",
            Some("Média"),
            "Paciente de 34 anos com dor abdominal há dois dias.",
            &json!({"triage": {"age": 34, "vitals": {"hr": 96}}}),
            "Sessão iniciada.",
        )
        .unwrap()
    }

    #[test]
    fn open_creates_file_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("consilium.db");

        let session_id = {
            let db = Database::open(&path).unwrap();
            let (_, session) = seed_session(&db);
            session.id
        };

        let reopened = Database::open(&path).unwrap();
        let fetched = reopened.get_session(&session_id, "user-1").unwrap();
        assert_eq!(fetched.id, session_id);
    }

    #[test]
    fn create_and_get_session() {
        let db = Database::open_in_memory().unwrap();
        let (case, session) = seed_session(&db);

        let fetched = db.get_session(&session.id, "user-1").unwrap();
        assert_eq!(fetched.case_id, case.id);
        assert_eq!(fetched.status, SessionStatus::InProgress);
        assert_eq!(fetched.phase, SessionPhase::Triage);
        assert!(fetched.triage_data.is_none());

        // Owner scoping: other users see nothing.
        assert!(matches!(
            db.get_session(&session.id, "user-2"),
            Err(DbError::SessionNotFound(_))
        ));
    }

    #[test]
    fn opening_message_is_first() {
        let db = Database::open_in_memory().unwrap();
        let (_, session) = seed_session(&db);

        let messages = db.get_messages(&session.id).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].sequence_id, 1);
        assert_eq!(messages[0].role, MessageRole::System);
    }

    #[test]
    fn messages_keep_total_order() {
        let db = Database::open_in_memory().unwrap();
        let (_, session) = seed_session(&db);

        db.append_message(&session.id, MessageRole::Student, "Olá").unwrap();
        db.append_message(&session.id, MessageRole::PatientAi, "Oi, doutor").unwrap();

        let messages = db.get_messages(&session.id).unwrap();
        let seqs: Vec<i64> = messages.iter().map(|m| m.sequence_id).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
    }

    #[test]
    fn update_session_round_trips_sub_records() {
        let db = Database::open_in_memory().unwrap();
        let (_, session) = seed_session(&db);

        let mut physical = BTreeMap::new();
        physical.insert(ExamSection::Abdomen, json!("dor difusa"));
        let mut results = BTreeMap::new();
        results.insert("cbc".to_string(), "Hb 13,2".to_string());

        let seen_phase = db
            .update_session_with::<_, DbError>(&session.id, "user-1", |snapshot| {
                let update = SessionUpdate {
                    phase: Some(SessionPhase::Consult),
                    physical_data: Some(physical.clone()),
                    ordered: Some(vec!["cbc".to_string()]),
                    results: Some(results.clone()),
                    ..SessionUpdate::default()
                };
                let messages = vec![OutboundMessage::system("Exame físico solicitado")];
                Ok((update, messages, snapshot.phase))
            })
            .unwrap();
        assert_eq!(seen_phase, SessionPhase::Triage);

        let fetched = db.get_session(&session.id, "user-1").unwrap();
        assert_eq!(fetched.phase, SessionPhase::Consult);
        assert_eq!(fetched.physical_data.unwrap(), physical);
        assert_eq!(fetched.orders.unwrap().ordered, vec!["cbc"]);
        assert_eq!(fetched.results.unwrap(), results);
        assert!(fetched.followup.is_none());
        assert_eq!(db.get_messages(&session.id).unwrap().len(), 2);
    }

    #[test]
    fn update_session_is_owner_scoped() {
        let db = Database::open_in_memory().unwrap();
        let (_, session) = seed_session(&db);

        let result = db.update_session_with::<_, DbError>(&session.id, "user-2", |_| {
            Ok((SessionUpdate::default(), vec![], ()))
        });
        assert!(matches!(result, Err(DbError::SessionNotFound(_))));
    }

    #[test]
    fn update_session_rolls_back_on_op_error() {
        let db = Database::open_in_memory().unwrap();
        let (_, session) = seed_session(&db);

        let result = db.update_session_with::<(), DbError>(&session.id, "user-1", |_| {
            Err(DbError::AlreadyEvaluated(session.id.clone()))
        });
        assert!(matches!(result, Err(DbError::AlreadyEvaluated(_))));

        let fetched = db.get_session(&session.id, "user-1").unwrap();
        assert_eq!(fetched.phase, SessionPhase::Triage);
        assert_eq!(db.get_messages(&session.id).unwrap().len(), 1);
    }

    #[test]
    fn finalize_cas_wins_once() {
        let db = Database::open_in_memory().unwrap();
        let (_, session) = seed_session(&db);

        assert!(db.begin_finalize(&session.id).unwrap());
        assert!(!db.begin_finalize(&session.id).unwrap());

        let fetched = db.get_session(&session.id, "user-1").unwrap();
        assert_eq!(fetched.status, SessionStatus::WaitingEval);
        assert_eq!(fetched.phase, SessionPhase::Finalized);
    }

    #[test]
    fn evaluation_is_unique_per_session() {
        let db = Database::open_in_memory().unwrap();
        let (_, session) = seed_session(&db);
        assert!(db.begin_finalize(&session.id).unwrap());

        let outcome = crate::collab::EvaluationOutcome {
            score: 7,
            feedback: "Boa anamnese.".to_string(),
            strengths: vec!["comunicação".to_string()],
            weaknesses: vec![],
            improvements: vec![],
        };
        db.complete_finalize(&session.id, &outcome, "Nota: 7/10").unwrap();

        assert!(db.has_evaluation(&session.id).unwrap());
        let fetched = db.get_session(&session.id, "user-1").unwrap();
        assert_eq!(fetched.status, SessionStatus::Done);

        let second = db.complete_finalize(&session.id, &outcome, "Nota: 7/10");
        assert!(matches!(second, Err(DbError::AlreadyEvaluated(_))));

        let eval = db.get_evaluation(&session.id).unwrap().unwrap();
        assert_eq!(eval.score, 7);
        assert_eq!(eval.strengths, vec!["comunicação"]);
    }

    #[test]
    fn list_sessions_joins_case_and_score() {
        let db = Database::open_in_memory().unwrap();
        let (_, session) = seed_session(&db);

        let items = db.list_sessions("user-1", 30).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, session.id);
        assert_eq!(items[0].case_title, "Dor abdominal e náuseas");
        assert_eq!(items[0].case_triage.as_deref(), Some("Média"));
        assert_eq!(items[0].score, None);

        assert!(db.list_sessions("someone-else", 30).unwrap().is_empty());
    }
}
