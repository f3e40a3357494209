//! Session orchestration
//!
//! Glues the pure state machine to persistence and the collaborators. The
//! contract throughout: read the session, decide with the pure ops, and
//! persist the outcome under one transaction via
//! [`Database::update_session_with`], and never hold the database lock
//! across a model call.

use crate::collab::{CaseGenerator, EvaluationOutcome, Evaluator, PatientResponder};
use crate::db::{
    CaseRecord, Database, DbError, Evaluation, Message, SessionRecord, SessionSummary,
    SessionUpdate,
};
use crate::llm::{LlmError, LlmService};
use crate::state_machine::{
    self, MessageRole, SessionError, SessionSnapshot, SESSION_START_MESSAGE,
};
use chrono::Utc;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Sessão não encontrada.")]
    NotFound,
    #[error("{0}")]
    Session(#[from] SessionError),
    #[error("Serviço de IA não configurado.")]
    LlmUnconfigured,
    #[error("Falha ao gerar caso (JSON inválido).")]
    CaseGeneration,
    #[error("{0}")]
    Llm(#[from] LlmError),
    #[error("Database error: {0}")]
    Db(DbError),
}

impl From<DbError> for ServiceError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::SessionNotFound(_) | DbError::CaseNotFound(_) => ServiceError::NotFound,
            DbError::AlreadyEvaluated(_) => ServiceError::Session(SessionError::AlreadyEvaluated),
            other => ServiceError::Db(other),
        }
    }
}

/// What the test pane shows.
pub struct TestsView {
    pub phase: crate::state_machine::SessionPhase,
    pub catalog: Vec<crate::case::TestDef>,
    pub ordered: Vec<String>,
    pub results: BTreeMap<String, String>,
}

/// Everything a client needs to render a session.
pub struct SessionView {
    pub session: SessionRecord,
    pub case: CaseRecord,
    pub messages: Vec<Message>,
    pub evaluation: Option<Evaluation>,
}

/// The session orchestrator shared across request handlers.
#[derive(Clone)]
pub struct ConsultService {
    db: Database,
    llm: Option<Arc<dyn LlmService>>,
}

impl ConsultService {
    pub fn new(db: Database, llm: Option<Arc<dyn LlmService>>) -> Self {
        Self { db, llm }
    }

    fn require_llm(&self) -> Result<Arc<dyn LlmService>, ServiceError> {
        self.llm.clone().ok_or(ServiceError::LlmUnconfigured)
    }

    fn load(
        &self,
        user_id: &str,
        session_id: &str,
    ) -> Result<(SessionRecord, CaseRecord, SessionSnapshot), ServiceError> {
        let session = self.db.get_session(session_id, user_id)?;
        let case = self.db.get_case(&session.case_id)?;
        let has_evaluation = self.db.has_evaluation(session_id)?;
        let snapshot = session.snapshot(has_evaluation);
        Ok((session, case, snapshot))
    }

    // ==================== Session lifecycle ====================

    /// Generate a fresh case and open a session on it.
    pub async fn start_session(
        &self,
        user_id: &str,
    ) -> Result<(CaseRecord, SessionRecord), ServiceError> {
        let llm = self.require_llm()?;
        let generated = CaseGenerator::new(llm).generate().await.map_err(|e| {
            tracing::warn!(error = %e, "Case generation failed");
            ServiceError::CaseGeneration
        })?;

        let (case, session) = self.db.create_case_with_session(
            user_id,
            &generated.title,
            generated.triage_label.as_deref(),
            &generated.seed,
            &generated.blueprint,
            SESSION_START_MESSAGE,
        )?;

        tracing::info!(session_id = %session.id, case_title = %case.title, "Session started");
        Ok((case, session))
    }

    pub fn list_sessions(&self, user_id: &str) -> Result<Vec<SessionSummary>, ServiceError> {
        Ok(self.db.list_sessions(user_id, 30)?)
    }

    pub fn session_view(
        &self,
        user_id: &str,
        session_id: &str,
    ) -> Result<SessionView, ServiceError> {
        let (session, case, _) = self.load(user_id, session_id)?;
        let messages = self.db.get_messages(session_id)?;
        let evaluation = self.db.get_evaluation(session_id)?;
        Ok(SessionView {
            session,
            case,
            messages,
            evaluation,
        })
    }

    // ==================== Chat ====================

    /// Record a student message and produce the patient's reply. The student
    /// message is committed before the model call, so a model failure leaves
    /// it in the transcript.
    pub async fn send_message(
        &self,
        user_id: &str,
        session_id: &str,
        content: &str,
    ) -> Result<String, ServiceError> {
        let (session, case, snapshot) = self.load(user_id, session_id)?;
        let content = state_machine::accept_student_message(&snapshot, content)?;
        let llm = self.require_llm()?;

        self.db
            .append_message(&session.id, MessageRole::Student, &content)?;
        let messages = self.db.get_messages(&session.id)?;

        let reply = PatientResponder::new(llm)
            .reply(&case.seed, &snapshot, &messages)
            .await?;
        self.db
            .append_message(&session.id, MessageRole::PatientAi, &reply)?;
        Ok(reply)
    }

    // ==================== Structured operations ====================

    /// Copy the case's structured triage into the session, once.
    pub fn record_triage(
        &self,
        user_id: &str,
        session_id: &str,
    ) -> Result<Map<String, Value>, ServiceError> {
        let (_, case, _) = self.load(user_id, session_id)?;
        let blueprint = case.blueprint();
        self.db.update_session_with(session_id, user_id, |snapshot| {
            let outcome = state_machine::record_triage(snapshot, &blueprint)?;
            let update = if outcome.newly_recorded {
                SessionUpdate {
                    triage_data: Some(outcome.triage.clone()),
                    ..SessionUpdate::default()
                }
            } else {
                SessionUpdate::default()
            };
            Ok((update, outcome.messages, outcome.triage))
        })
    }

    /// The triage the student can currently see: the recorded copy, or the
    /// case's structured triage before recording.
    pub fn triage_view(
        &self,
        user_id: &str,
        session_id: &str,
    ) -> Result<(SessionRecord, Option<Value>), ServiceError> {
        let (session, case, _) = self.load(user_id, session_id)?;
        let triage = session
            .triage_data
            .clone()
            .map(Value::Object)
            .or_else(|| case.blueprint().triage.map(Value::Object));
        Ok((session, triage))
    }

    /// Reveal one physical-exam section.
    pub fn reveal_section(
        &self,
        user_id: &str,
        session_id: &str,
        section_key: &str,
    ) -> Result<state_machine::RevealOutcome, ServiceError> {
        let (_, case, _) = self.load(user_id, session_id)?;
        let blueprint = case.blueprint();
        self.db.update_session_with(session_id, user_id, |snapshot| {
            let outcome = state_machine::reveal_section(snapshot, &blueprint, section_key)?;
            let update = if outcome.newly_revealed {
                SessionUpdate {
                    phase: Some(outcome.phase),
                    physical_data: Some(outcome.physical_data.clone()),
                    ..SessionUpdate::default()
                }
            } else {
                SessionUpdate::default()
            };
            Ok((update, outcome.messages.clone(), outcome))
        })
    }

    /// Order a batch of tests from the case's catalog.
    pub fn order_tests(
        &self,
        user_id: &str,
        session_id: &str,
        requested: &[String],
    ) -> Result<state_machine::OrderOutcome, ServiceError> {
        let (_, case, _) = self.load(user_id, session_id)?;
        let blueprint = case.blueprint();
        self.db.update_session_with(session_id, user_id, |snapshot| {
            let outcome = state_machine::order_tests(snapshot, &blueprint, requested)?;
            let update = SessionUpdate {
                phase: Some(outcome.phase),
                ordered: Some(outcome.ordered.clone()),
                results: Some(outcome.results.clone()),
                ..SessionUpdate::default()
            };
            Ok((update, outcome.messages.clone(), outcome))
        })
    }

    /// What the test pane shows: the catalog plus current orders/results.
    pub fn tests_view(&self, user_id: &str, session_id: &str) -> Result<TestsView, ServiceError> {
        let (session, case, _) = self.load(user_id, session_id)?;
        let blueprint = case.blueprint();
        Ok(TestsView {
            phase: session.phase,
            catalog: blueprint.test_catalog,
            ordered: session.orders.map(|o| o.ordered).unwrap_or_default(),
            results: session.results.unwrap_or_default(),
        })
    }

    /// Record a follow-up round.
    pub fn record_followup(
        &self,
        user_id: &str,
        session_id: &str,
        outcome_key: &str,
    ) -> Result<state_machine::FollowupRecorded, ServiceError> {
        let (_, case, _) = self.load(user_id, session_id)?;
        let blueprint = case.blueprint();
        self.db.update_session_with(session_id, user_id, |snapshot| {
            let outcome =
                state_machine::record_followup(snapshot, &blueprint, outcome_key, Utc::now())?;
            let update = SessionUpdate {
                phase: Some(outcome.phase),
                followup: Some(outcome.followup.clone()),
                ..SessionUpdate::default()
            };
            Ok((update, outcome.messages.clone(), outcome))
        })
    }

    // ==================== Finalize ====================

    /// Close the session and grade it. The status flip is a compare-and-swap
    /// so concurrent finalizes settle to exactly one evaluation; the grading
    /// call runs after the swap, outside any lock.
    pub async fn finalize(
        &self,
        user_id: &str,
        session_id: &str,
    ) -> Result<Evaluation, ServiceError> {
        let (session, case, snapshot) = self.load(user_id, session_id)?;
        let llm = self.require_llm()?;
        state_machine::begin_finalize(&snapshot)?;

        if !self.db.begin_finalize(&session.id)? {
            return Err(ServiceError::Session(SessionError::AlreadyEvaluated));
        }

        let messages = self.db.get_messages(&session.id)?;
        let outcome: EvaluationOutcome = Evaluator::new(llm)
            .evaluate(&case.title, &snapshot, &messages)
            .await;

        let evaluation =
            self.db
                .complete_finalize(&session.id, &outcome, &outcome.coordinator_message())?;
        tracing::info!(session_id = %session.id, score = evaluation.score, "Session evaluated");
        Ok(evaluation)
    }
}
