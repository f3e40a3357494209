//! Prompt context assembly
//!
//! Builds the bounded views of a session that the collaborators see: a
//! sliding conversation window for the patient responder and a transcript
//! tail plus structured summary for the evaluator. The case blueprint is
//! never part of any of these; the patient only "knows" what the session
//! has already revealed.

use crate::db::Message;
use crate::llm::{ChatMessage, ChatRole};
use crate::state_machine::{MessageRole, SessionSnapshot};

/// How many recent messages the patient responder sees.
pub const WINDOW_SIZE: usize = 12;

/// How many trailing messages the evaluator sees.
pub const TRANSCRIPT_TAIL: usize = 20;

/// Map the tail of the transcript onto chat-completion turns. Student
/// messages become `user`; everything else (patient, coordinator, system
/// notes) becomes `assistant` so the model reads them as things that
/// already happened in the encounter.
pub fn conversation_window(messages: &[Message]) -> Vec<ChatMessage> {
    let start = messages.len().saturating_sub(WINDOW_SIZE);
    messages[start..]
        .iter()
        .map(|m| {
            let role = match m.role {
                MessageRole::Student => ChatRole::User,
                _ => ChatRole::Assistant,
            };
            ChatMessage {
                role,
                content: m.content.clone(),
            }
        })
        .collect()
}

/// True once the patient has spoken at least once. On the first patient
/// turn the responder is told to open with the presenting complaint.
pub fn patient_has_spoken(messages: &[Message]) -> bool {
    messages.iter().any(|m| m.role == MessageRole::PatientAi)
}

/// Structured summary of what the session has recorded so far, one labeled
/// line per populated sub-record. Unset sub-records are omitted entirely.
pub fn structured_context(snapshot: &SessionSnapshot) -> String {
    let mut lines = vec![format!("FASE={}", snapshot.phase)];
    if let Some(triage) = &snapshot.triage_data {
        lines.push(format!("TRIAGEM={}", compact(triage)));
    }
    if !snapshot.physical_data.is_empty() {
        lines.push(format!("EXAME_FISICO={}", compact(&snapshot.physical_data)));
    }
    if !snapshot.ordered.is_empty() {
        lines.push(format!("EXAMES_SOLICITADOS={}", compact(&snapshot.ordered)));
    }
    if !snapshot.results.is_empty() {
        lines.push(format!("RESULTADOS={}", compact(&snapshot.results)));
    }
    if let Some(followup) = &snapshot.followup {
        lines.push(format!("RETORNO={}", compact(followup)));
    }
    lines.join("\n")
}

/// The labeled transcript tail the evaluator grades from.
pub fn transcript_tail(messages: &[Message]) -> String {
    let start = messages.len().saturating_sub(TRANSCRIPT_TAIL);
    messages[start..]
        .iter()
        .map(|m| format!("{}: {}", m.role.transcript_label(), m.content))
        .collect::<Vec<_>>()
        .join("\n")
}

fn compact<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "null".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::{ExamSection, SessionPhase, SessionStatus};
    use chrono::Utc;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn msg(seq: i64, role: MessageRole, content: &str) -> Message {
        Message {
            id: format!("m{seq}"),
            session_id: "s1".to_string(),
            sequence_id: seq,
            role,
            content: content.to_string(),
            created_at: Utc::now(),
        }
    }

    fn snapshot() -> SessionSnapshot {
        SessionSnapshot {
            status: SessionStatus::InProgress,
            phase: SessionPhase::Triage,
            triage_data: None,
            physical_data: BTreeMap::new(),
            ordered: Vec::new(),
            results: BTreeMap::new(),
            followup: None,
            has_evaluation: false,
        }
    }

    #[test]
    fn window_keeps_only_recent_messages() {
        let messages: Vec<Message> = (1..=20)
            .map(|i| msg(i, MessageRole::Student, &format!("pergunta {i}")))
            .collect();

        let window = conversation_window(&messages);
        assert_eq!(window.len(), WINDOW_SIZE);
        assert_eq!(window[0].content, "pergunta 9");
        assert_eq!(window.last().unwrap().content, "pergunta 20");
    }

    #[test]
    fn window_maps_only_student_to_user() {
        let messages = vec![
            msg(1, MessageRole::System, "Sessão iniciada."),
            msg(2, MessageRole::Student, "Bom dia"),
            msg(3, MessageRole::PatientAi, "Bom dia, doutor"),
        ];

        let window = conversation_window(&messages);
        assert_eq!(window[0].role, ChatRole::Assistant);
        assert_eq!(window[1].role, ChatRole::User);
        assert_eq!(window[2].role, ChatRole::Assistant);
    }

    #[test]
    fn structured_context_omits_unset_sub_records() {
        let ctx = structured_context(&snapshot());
        assert_eq!(ctx, "FASE=TRIAGE");
    }

    #[test]
    fn structured_context_includes_populated_sub_records() {
        let mut snap = snapshot();
        snap.phase = SessionPhase::Consult;
        snap.triage_data = Some(
            json!({"chiefComplaint": "dor torácica"})
                .as_object()
                .unwrap()
                .clone(),
        );
        snap.physical_data
            .insert(ExamSection::Cardio, json!("sopro sistólico"));
        snap.ordered = vec!["ecg".to_string()];
        snap.results.insert("ecg".to_string(), "supra de ST".to_string());

        let ctx = structured_context(&snap);
        assert!(ctx.starts_with("FASE=CONSULT"));
        assert!(ctx.contains("TRIAGEM={\"chiefComplaint\":\"dor torácica\"}"));
        assert!(ctx.contains("EXAME_FISICO="));
        assert!(ctx.contains("EXAMES_SOLICITADOS=[\"ecg\"]"));
        assert!(ctx.contains("RESULTADOS="));
        assert!(!ctx.contains("RETORNO="));
    }

    #[test]
    fn transcript_tail_uses_labels_and_bounds() {
        let mut messages: Vec<Message> = (1..=25)
            .map(|i| msg(i, MessageRole::Student, &format!("fala {i}")))
            .collect();
        messages.push(msg(26, MessageRole::PatientAi, "última resposta"));

        let tail = transcript_tail(&messages);
        let lines: Vec<&str> = tail.lines().collect();
        assert_eq!(lines.len(), TRANSCRIPT_TAIL);
        assert_eq!(lines[0], "ALUNO: fala 7");
        assert_eq!(*lines.last().unwrap(), "PACIENTE: última resposta");
    }

    #[test]
    fn patient_spoken_detection() {
        let mut messages = vec![msg(1, MessageRole::System, "Sessão iniciada.")];
        assert!(!patient_has_spoken(&messages));
        messages.push(msg(2, MessageRole::PatientAi, "Olá"));
        assert!(patient_has_spoken(&messages));
    }

}
