//! Consultation evaluator

use super::salvage_json;
use crate::context;
use crate::db::Message;
use crate::llm::{ChatMessage, ChatRequest, LlmService};
use crate::state_machine::SessionSnapshot;
use serde_json::Value;
use std::sync::Arc;

const SYSTEM_PROMPT: &str = r#"Você é um COORDENADOR avaliando uma consulta simulada de estudante de medicina.
Retorne APENAS JSON válido, sem markdown, sem texto extra.

Critérios (nota 0-10):
- Acolhimento e comunicação
- Anamnese (perguntas relevantes)
- Organização do raciocínio
- Segurança do paciente (red flags, orientação responsável)
- Uso adequado de exame físico e exames
- Encerramento (resumo e próximos passos)

Formato:
{
  "score": 0-10,
  "feedback": "texto curto e objetivo",
  "strengths": ["..."],
  "weaknesses": ["..."],
  "improvements": ["..."]
}"#;

/// Grading result. Always well-formed: a failed or garbled model call
/// degrades to score 0 with a fallback feedback string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationOutcome {
    pub score: i64,
    pub feedback: String,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub improvements: Vec<String>,
}

impl Default for EvaluationOutcome {
    fn default() -> Self {
        Self {
            score: 0,
            feedback: "Avaliação indisponível.".to_string(),
            strengths: Vec::new(),
            weaknesses: Vec::new(),
            improvements: Vec::new(),
        }
    }
}

impl EvaluationOutcome {
    pub fn coordinator_message(&self) -> String {
        format!("Nota: {}/10\n\n{}", self.score, self.feedback)
    }
}

pub struct Evaluator {
    llm: Arc<dyn LlmService>,
}

impl Evaluator {
    pub fn new(llm: Arc<dyn LlmService>) -> Self {
        Self { llm }
    }

    /// Grade a finished session. Infallible: any model or parse failure
    /// yields the fallback outcome so finalize always completes.
    pub async fn evaluate(
        &self,
        case_title: &str,
        snapshot: &SessionSnapshot,
        messages: &[Message],
    ) -> EvaluationOutcome {
        let summary = context::structured_context(snapshot);
        let transcript = context::transcript_tail(messages);
        let user = format!(
            "Caso: {case_title}\n\nResumo estruturado:\n{}\n\nTranscrição (últimas mensagens):\n{transcript}",
            if summary.is_empty() { "(vazio)" } else { &summary },
        );

        let request = ChatRequest {
            system: SYSTEM_PROMPT.to_string(),
            messages: vec![ChatMessage::user(user)],
            temperature: Some(0.3),
            max_tokens: None,
        };

        match self.llm.complete(&request).await {
            Ok(reply) => Self::parse_outcome(&reply.text),
            Err(e) => {
                tracing::warn!(error = %e, "Evaluation failed, recording fallback");
                EvaluationOutcome::default()
            }
        }
    }

    #[allow(clippy::cast_possible_truncation)] // score is clamped to 0..=10
    fn parse_outcome(text: &str) -> EvaluationOutcome {
        let Some(parsed) = salvage_json(text) else {
            return EvaluationOutcome::default();
        };

        let score = parsed
            .get("score")
            .and_then(Value::as_f64)
            .filter(|n| n.is_finite())
            .map_or(0, |n| (n.round() as i64).clamp(0, 10));

        let feedback = parsed
            .get("feedback")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or("Avaliação indisponível.")
            .to_string();

        EvaluationOutcome {
            score,
            feedback,
            strengths: string_list(parsed.get("strengths")),
            weaknesses: string_list(parsed.get("weaknesses")),
            improvements: string_list(parsed.get("improvements")),
        }
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}
