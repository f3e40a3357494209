//! Pure session operations
//!
//! Every state-changing consultation action is decided here, as a pure
//! function from (session snapshot, case blueprint, request) to an outcome
//! describing the next sub-record values, the next phase, and the chat
//! messages to append. Nothing in this module touches the store: the
//! service layer applies an outcome transactionally or discards it whole,
//! so a precondition failure can never partially apply.

use super::merge::{merge_orders, merge_section};
use super::{ExamSection, FollowupOutcome, MessageRole, SessionPhase, SessionStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;

/// Opening SYSTEM message appended when a session is created.
pub const SESSION_START_MESSAGE: &str = "Você iniciou uma consulta simulada. \
Faça anamnese, explore sintomas, antecedentes, e finalize quando achar adequado.";

const TRIAGE_RECORDED_MESSAGE: &str =
    "Triagem registrada. Você pode iniciar a consulta no mesmo chat.";

const FOLLOWUP_RECORDED_MESSAGE: &str =
    "Retorno registrado dentro da mesma sessão (fase FOLLOWUP).";

/// Rejection reasons for session operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("Este caso não possui triagem estruturada.")]
    NoStructuredTriage,
    #[error("Seção inválida: {0}")]
    InvalidSection(String),
    #[error("Sem achados disponíveis para esta seção.")]
    NoFindingsAvailable,
    #[error("Nenhum exame válido.")]
    NoValidTests,
    #[error("Outcome inválido: {0}")]
    InvalidOutcome(String),
    #[error("Sessão não está em andamento.")]
    SessionNotInProgress,
    #[error("Sem texto de retorno no caso.")]
    NoFollowupText,
    #[error("Sessão já avaliada.")]
    AlreadyEvaluated,
    #[error("Mensagem vazia.")]
    EmptyMessage,
}

/// Recorded follow-up state. Unlike the other sub-records this field is
/// overwritten on every follow-up round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowupState {
    pub last_outcome: FollowupOutcome,
    pub at: DateTime<Utc>,
}

/// Read-only view of a session, as seen by the pure operations.
#[derive(Debug, Clone, Default)]
pub struct SessionSnapshot {
    pub status: SessionStatus,
    pub phase: SessionPhase,
    pub triage_data: Option<Map<String, Value>>,
    pub physical_data: BTreeMap<ExamSection, Value>,
    pub ordered: Vec<String>,
    pub results: BTreeMap<String, String>,
    pub followup: Option<FollowupState>,
    pub has_evaluation: bool,
}

impl SessionSnapshot {
    fn ensure_in_progress(&self) -> Result<(), SessionError> {
        if self.status == SessionStatus::InProgress {
            Ok(())
        } else {
            Err(SessionError::SessionNotInProgress)
        }
    }
}

/// A chat message an operation wants appended to the transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub role: MessageRole,
    pub content: String,
}

impl OutboundMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn patient(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::PatientAi,
            content: content.into(),
        }
    }
}

// ============================================================
// Record triage
// ============================================================

#[derive(Debug, Clone, PartialEq)]
pub struct TriageOutcome {
    pub triage: Map<String, Value>,
    pub newly_recorded: bool,
    pub messages: Vec<OutboundMessage>,
}

/// Copy the blueprint's triage record into the session, once. Repeat calls
/// return the stored record unchanged and append nothing.
pub fn record_triage(
    snapshot: &SessionSnapshot,
    blueprint: &crate::case::CaseBlueprint,
) -> Result<TriageOutcome, SessionError> {
    if let Some(existing) = &snapshot.triage_data {
        return Ok(TriageOutcome {
            triage: existing.clone(),
            newly_recorded: false,
            messages: vec![],
        });
    }

    snapshot.ensure_in_progress()?;

    let triage = blueprint
        .triage
        .clone()
        .ok_or(SessionError::NoStructuredTriage)?;

    Ok(TriageOutcome {
        triage,
        newly_recorded: true,
        messages: vec![OutboundMessage::system(TRIAGE_RECORDED_MESSAGE)],
    })
}

// ============================================================
// Reveal physical-exam section
// ============================================================

#[derive(Debug, Clone, PartialEq)]
pub struct RevealOutcome {
    pub section: ExamSection,
    pub value: Value,
    pub newly_revealed: bool,
    pub physical_data: BTreeMap<ExamSection, Value>,
    pub phase: SessionPhase,
    pub messages: Vec<OutboundMessage>,
}

/// Reveal one section's findings. Idempotent per section: a repeat reveal
/// returns the stored value, appends nothing, and cannot be re-billed.
pub fn reveal_section(
    snapshot: &SessionSnapshot,
    blueprint: &crate::case::CaseBlueprint,
    section_key: &str,
) -> Result<RevealOutcome, SessionError> {
    let section = ExamSection::from_key(section_key)
        .ok_or_else(|| SessionError::InvalidSection(section_key.to_string()))?;

    if let Some(existing) = snapshot.physical_data.get(&section) {
        return Ok(RevealOutcome {
            section,
            value: existing.clone(),
            newly_revealed: false,
            physical_data: snapshot.physical_data.clone(),
            phase: snapshot.phase,
            messages: vec![],
        });
    }

    snapshot.ensure_in_progress()?;

    let finding = blueprint
        .section_findings(section)
        .ok_or(SessionError::NoFindingsAvailable)?;

    let merge = merge_section(&snapshot.physical_data, section, finding);
    let message = OutboundMessage::system(format!(
        "Exame físico solicitado: {}\n\n{}",
        section.label(),
        render_finding(&merge.value)
    ));

    Ok(RevealOutcome {
        section,
        value: merge.value,
        newly_revealed: true,
        physical_data: merge.next,
        phase: snapshot.phase.after_clinical_action(),
        messages: vec![message],
    })
}

fn render_finding(value: &Value) -> String {
    match value.as_str() {
        Some(s) => s.to_string(),
        None => serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string()),
    }
}

// ============================================================
// Order tests
// ============================================================

#[derive(Debug, Clone, PartialEq)]
pub struct OrderOutcome {
    pub ordered: Vec<String>,
    pub results: BTreeMap<String, String>,
    /// Keys ordered for the first time by this call.
    pub newly: Vec<String>,
    /// Requested keys not present in the case's catalog.
    pub dropped: Vec<String>,
    pub phase: SessionPhase,
    pub messages: Vec<OutboundMessage>,
}

/// Order a set of tests. Unknown keys are silently dropped (reported back,
/// not errored); already-ordered keys are per-key no-ops. Result text is
/// copied from the blueprint at first order and never refreshed.
pub fn order_tests(
    snapshot: &SessionSnapshot,
    blueprint: &crate::case::CaseBlueprint,
    requested: &[String],
) -> Result<OrderOutcome, SessionError> {
    let (valid, dropped): (Vec<String>, Vec<String>) = requested
        .iter()
        .cloned()
        .partition(|key| blueprint.has_test(key));

    if valid.is_empty() {
        return Err(SessionError::NoValidTests);
    }

    snapshot.ensure_in_progress()?;

    let merge = merge_orders(
        &snapshot.ordered,
        &snapshot.results,
        &valid,
        &blueprint.test_results,
    );

    let labels = merge
        .newly
        .iter()
        .map(|k| blueprint.test_label(k))
        .collect::<Vec<_>>()
        .join(", ");
    let message = OutboundMessage::system(format!(
        "Exames solicitados: {labels}\n\nResultados liberados. Abra a seção \"Exames\" para revisar."
    ));

    Ok(OrderOutcome {
        ordered: merge.orders,
        results: merge.results,
        newly: merge.newly,
        dropped,
        phase: snapshot.phase.after_clinical_action(),
        messages: vec![message],
    })
}

// ============================================================
// Record follow-up
// ============================================================

#[derive(Debug, Clone, PartialEq)]
pub struct FollowupRecorded {
    pub followup: FollowupState,
    pub narrative: String,
    pub phase: SessionPhase,
    pub messages: Vec<OutboundMessage>,
}

/// Record a follow-up round. The follow-up field is the one mutable
/// sub-record: each round overwrites the previous outcome and timestamp.
/// Phase is set to `Followup` unconditionally (revisitable).
pub fn record_followup(
    snapshot: &SessionSnapshot,
    blueprint: &crate::case::CaseBlueprint,
    outcome_key: &str,
    now: DateTime<Utc>,
) -> Result<FollowupRecorded, SessionError> {
    let outcome = FollowupOutcome::from_key(outcome_key)
        .ok_or_else(|| SessionError::InvalidOutcome(outcome_key.to_string()))?;

    snapshot.ensure_in_progress()?;

    let narrative = blueprint
        .followup_text(outcome)
        .ok_or(SessionError::NoFollowupText)?
        .to_string();

    Ok(FollowupRecorded {
        followup: FollowupState {
            last_outcome: outcome,
            at: now,
        },
        narrative: narrative.clone(),
        phase: SessionPhase::Followup,
        messages: vec![
            OutboundMessage::patient(narrative),
            OutboundMessage::system(FOLLOWUP_RECORDED_MESSAGE),
        ],
    })
}

// ============================================================
// Chat and finalize gates
// ============================================================

/// Validate an inbound student chat message; returns the trimmed content.
pub fn accept_student_message(
    snapshot: &SessionSnapshot,
    content: &str,
) -> Result<String, SessionError> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(SessionError::EmptyMessage);
    }
    snapshot.ensure_in_progress()?;
    Ok(trimmed.to_string())
}

/// Gate for starting finalize. A session that already has an evaluation,
/// or that has already left IN_PROGRESS, cannot be finalized again.
pub fn begin_finalize(snapshot: &SessionSnapshot) -> Result<(), SessionError> {
    if snapshot.has_evaluation || snapshot.status != SessionStatus::InProgress {
        return Err(SessionError::AlreadyEvaluated);
    }
    Ok(())
}
