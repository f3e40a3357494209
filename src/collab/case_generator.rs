//! Case generation

use super::salvage_json;
use crate::llm::{ChatMessage, ChatRequest, LlmError, LlmService};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

const SYSTEM_PROMPT: &str = r#"Você é um gerador de casos clínicos para simulação com estudantes de medicina.
Retorne APENAS JSON válido, sem markdown, sem texto extra.

Regras:
- Caso realista, linguagem leiga do paciente.
- Não entregue diagnóstico final.
- "seed" deve descrever a persona do paciente + contexto + sintomas + histórico curto + sinais de alarme (se houver).
- "title" curto (ex: "Dor abdominal e náuseas").
- "triage" opcional (ex: "Baixa", "Média", "Alta").
- "blueprint" com os dados objetivos do caso:
  - "triage": objeto com queixa principal, idade e "vitals" (sinais vitais).
  - "physical": objeto com achados por seção (vitals, general, heent, cardio, resp, abdomen, neuro, skin, extremities, gynUro); inclua apenas as seções relevantes.
  - "tests": objeto com "catalog" (lista de exames pertinentes, cada um {"key":"...","label":"..."}) e "results" (objeto key do exame -> resultado em texto).
  - "followup": objeto com narrativas de retorno para "improved", "same", "worse" e "sideEffect".
Formato:
{"title":"...","triage":"...","seed":"...","blueprint":{...}}"#;

const USER_PROMPT: &str =
    "Gere 1 caso para atendimento ambulatorial, com sintomas iniciais suficientes para iniciar anamnese.";

#[derive(Error, Debug)]
pub enum CaseGenerationError {
    #[error("{0}")]
    Llm(#[from] LlmError),
    #[error("Falha ao gerar caso (JSON inválido).")]
    InvalidPayload,
}

/// A generated case, ready to persist.
#[derive(Debug, Clone)]
pub struct GeneratedCase {
    pub title: String,
    pub triage_label: Option<String>,
    pub seed: String,
    pub blueprint: Value,
}

pub struct CaseGenerator {
    llm: Arc<dyn LlmService>,
}

impl CaseGenerator {
    pub fn new(llm: Arc<dyn LlmService>) -> Self {
        Self { llm }
    }

    /// Generate one case. Title and seed are required; a missing or broken
    /// blueprint degrades to an empty one rather than failing the session.
    pub async fn generate(&self) -> Result<GeneratedCase, CaseGenerationError> {
        let request = ChatRequest {
            system: SYSTEM_PROMPT.to_string(),
            messages: vec![ChatMessage::user(USER_PROMPT)],
            temperature: Some(0.7),
            max_tokens: None,
        };

        let reply = self.llm.complete(&request).await?;
        let parsed = salvage_json(&reply.text).ok_or(CaseGenerationError::InvalidPayload)?;

        Self::from_payload(&parsed).ok_or(CaseGenerationError::InvalidPayload)
    }

    fn from_payload(payload: &Value) -> Option<GeneratedCase> {
        let title = payload.get("title")?.as_str()?.trim();
        let seed = payload.get("seed")?.as_str()?.trim();
        if title.is_empty() || seed.is_empty() {
            return None;
        }

        let triage_label = payload
            .get("triage")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from);

        let blueprint = match payload.get("blueprint") {
            Some(v @ Value::Object(_)) => v.clone(),
            _ => Value::Object(serde_json::Map::new()),
        };

        Some(GeneratedCase {
            title: title.to_string(),
            triage_label,
            seed: seed.to_string(),
            blueprint,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_full_payload() {
        let payload = json!({
            "title": "  Tosse persistente ",
            "triage": "Baixa",
            "seed": "Homem de 52 anos, tabagista...",
            "blueprint": {"triage": {"age": 52}},
        });
        let case = CaseGenerator::from_payload(&payload).unwrap();
        assert_eq!(case.title, "Tosse persistente");
        assert_eq!(case.triage_label.as_deref(), Some("Baixa"));
        assert_eq!(case.blueprint, json!({"triage": {"age": 52}}));
    }

    #[test]
    fn rejects_missing_title_or_seed() {
        assert!(CaseGenerator::from_payload(&json!({"seed": "x"})).is_none());
        assert!(CaseGenerator::from_payload(&json!({"title": "x"})).is_none());
        assert!(CaseGenerator::from_payload(&json!({"title": "  ", "seed": "x"})).is_none());
    }

    #[test]
    fn broken_blueprint_degrades_to_empty() {
        let payload = json!({"title": "Febre", "seed": "Criança de 4 anos", "blueprint": [1, 2]});
        let case = CaseGenerator::from_payload(&payload).unwrap();
        assert_eq!(case.blueprint, json!({}));
    }
}
