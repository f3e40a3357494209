//! Patient responder

use crate::context;
use crate::db::Message;
use crate::llm::{ChatRequest, LlmError, LlmService};
use crate::state_machine::SessionSnapshot;
use std::sync::Arc;

/// Reply when the model returns only whitespace.
pub const FALLBACK_REPLY: &str = "Desculpa, não entendi bem…";

pub struct PatientResponder {
    llm: Arc<dyn LlmService>,
}

impl PatientResponder {
    pub fn new(llm: Arc<dyn LlmService>) -> Self {
        Self { llm }
    }

    /// Produce the patient's next turn. `messages` is the full transcript
    /// including the student message just recorded; only the sliding window
    /// is forwarded to the model.
    pub async fn reply(
        &self,
        seed: &str,
        snapshot: &SessionSnapshot,
        messages: &[Message],
    ) -> Result<String, LlmError> {
        let first_turn = !context::patient_has_spoken(messages);
        let request = ChatRequest {
            system: Self::system_prompt(seed, snapshot, first_turn),
            messages: context::conversation_window(messages),
            temperature: Some(0.8),
            max_tokens: None,
        };

        let reply = self.llm.complete(&request).await?;
        let text = reply.text.trim();
        if text.is_empty() {
            Ok(FALLBACK_REPLY.to_string())
        } else {
            Ok(text.to_string())
        }
    }

    fn system_prompt(seed: &str, snapshot: &SessionSnapshot, first_turn: bool) -> String {
        let mut prompt = format!(
            "Você é um PACIENTE simulando um atendimento médico.\n\
             Você deve responder como paciente humano, linguagem leiga, com emoções e detalhes realistas.\n\
             Não diga que é IA. Não invente exames ou diagnósticos definitivos.\n\
             Se o aluno fizer perguntas vagas, peça esclarecimentos.\n\
             Caso base (persona e contexto):\n{seed}\n\n\
             Dados já registrados na consulta:\n{}",
            context::structured_context(snapshot)
        );
        if first_turn {
            prompt.push_str(
                "\n\nEsta é sua primeira fala na consulta: apresente-se brevemente e descreva a queixa principal.",
            );
        }
        prompt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::{SessionPhase, SessionStatus};
    use std::collections::BTreeMap;

    fn snapshot() -> SessionSnapshot {
        SessionSnapshot {
            status: SessionStatus::InProgress,
            phase: SessionPhase::Consult,
            triage_data: None,
            physical_data: BTreeMap::new(),
            ordered: Vec::new(),
            results: BTreeMap::new(),
            followup: None,
            has_evaluation: false,
        }
    }

    #[test]
    fn system_prompt_carries_seed_and_context() {
        let prompt =
            PatientResponder::system_prompt("Mulher de 28 anos com cefaleia.", &snapshot(), false);
        assert!(prompt.contains("Mulher de 28 anos com cefaleia."));
        assert!(prompt.contains("FASE=CONSULT"));
        assert!(!prompt.contains("primeira fala"));
        assert!(!prompt.contains("catalog"));
    }

    #[test]
    fn first_turn_asks_for_opening_complaint() {
        let prompt = PatientResponder::system_prompt("Seed.", &snapshot(), true);
        assert!(prompt.contains("primeira fala"));
    }
}
