//! Case blueprint model
//!
//! The blueprint is the structured ground truth for a generated clinical
//! case: triage values, physical findings per body system, a test catalog
//! with result texts, and follow-up narratives per outcome. It is produced
//! by the case-generator collaborator and may be missing or malformed, so
//! parsing is lenient throughout: anything unreadable is dropped and the
//! dependent session operations fail their own precondition checks instead.

use crate::state_machine::{ExamSection, FollowupOutcome};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// One entry of the orderable-test catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestDef {
    pub key: String,
    pub label: String,
}

/// Parsed case blueprint. An absent or malformed blueprint parses to
/// `CaseBlueprint::default()`, where every lookup returns nothing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CaseBlueprint {
    /// Structured triage record, copied verbatim into the session on the
    /// first record-triage call. Holds `vitals` among arbitrary keys.
    pub triage: Option<Map<String, Value>>,
    /// Physical findings keyed by body-system section.
    pub physical: BTreeMap<ExamSection, Value>,
    /// Orderable tests, in catalog order.
    pub test_catalog: Vec<TestDef>,
    /// Ground-truth result text per test key.
    pub test_results: BTreeMap<String, String>,
    /// Follow-up narrative per outcome.
    pub followup: BTreeMap<FollowupOutcome, String>,
}

impl CaseBlueprint {
    /// Parse a blueprint from raw JSON, dropping anything malformed.
    pub fn from_value(value: &Value) -> Self {
        let Some(root) = value.as_object() else {
            return Self::default();
        };

        let triage = root.get("triage").and_then(Value::as_object).cloned();

        let mut physical = BTreeMap::new();
        if let Some(map) = root.get("physical").and_then(Value::as_object) {
            for (key, finding) in map {
                if finding.is_null() {
                    continue;
                }
                if let Some(section) = ExamSection::from_key(key) {
                    physical.insert(section, finding.clone());
                }
            }
        }

        let tests = root.get("tests").and_then(Value::as_object);

        let mut test_catalog = Vec::new();
        if let Some(catalog) = tests
            .and_then(|t| t.get("catalog"))
            .and_then(Value::as_array)
        {
            for item in catalog {
                let (Some(key), Some(label)) = (
                    item.get("key").and_then(Value::as_str),
                    item.get("label").and_then(Value::as_str),
                ) else {
                    continue;
                };
                test_catalog.push(TestDef {
                    key: key.to_string(),
                    label: label.to_string(),
                });
            }
        }

        let mut test_results = BTreeMap::new();
        if let Some(results) = tests
            .and_then(|t| t.get("results"))
            .and_then(Value::as_object)
        {
            for (key, text) in results {
                if let Some(text) = text.as_str() {
                    test_results.insert(key.clone(), text.to_string());
                }
            }
        }

        let mut followup = BTreeMap::new();
        if let Some(map) = root.get("followup").and_then(Value::as_object) {
            for (key, narrative) in map {
                let Some(outcome) = FollowupOutcome::from_key(key) else {
                    continue;
                };
                if let Some(text) = narrative.as_str() {
                    let trimmed = text.trim();
                    if !trimmed.is_empty() {
                        followup.insert(outcome, trimmed.to_string());
                    }
                }
            }
        }

        Self {
            triage,
            physical,
            test_catalog,
            test_results,
            followup,
        }
    }

    /// Findings for one exam section. Vitals live inside the triage record,
    /// not under `physical`.
    pub fn section_findings(&self, section: ExamSection) -> Option<&Value> {
        match section {
            ExamSection::Vitals => self
                .triage
                .as_ref()
                .and_then(|t| t.get("vitals"))
                .filter(|v| !v.is_null()),
            other => self.physical.get(&other),
        }
    }

    /// Catalog label for a test key; falls back to the key itself.
    pub fn test_label<'a>(&'a self, key: &'a str) -> &'a str {
        self.test_catalog
            .iter()
            .find(|t| t.key == key)
            .map_or(key, |t| t.label.as_str())
    }

    pub fn has_test(&self, key: &str) -> bool {
        self.test_catalog.iter().any(|t| t.key == key)
    }

    pub fn followup_text(&self, outcome: FollowupOutcome) -> Option<&str> {
        self.followup.get(&outcome).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> CaseBlueprint {
        CaseBlueprint::from_value(&json!({
            "triage": {
                "age": 34,
                "sex": "F",
                "chiefComplaint": "dor abdominal",
                "vitals": {"hr": 96, "bp": "120x80"}
            },
            "physical": {
                "abdomen": "Dor à palpação em fossa ilíaca direita.",
                "cardio": "Bulhas normofonéticas, sem sopros.",
                "unknownSection": "ignored"
            },
            "tests": {
                "catalog": [
                    {"key": "cbc", "label": "Hemograma completo"},
                    {"key": "usg", "label": "USG abdominal"},
                    {"bad": "entry"}
                ],
                "results": {"cbc": "Leucocitose discreta.", "weird": 42}
            },
            "followup": {
                "worse": "A dor piorou bastante.",
                "improved": "  Estou melhor.  ",
                "same": "",
                "notAnOutcome": "x"
            }
        }))
    }

    #[test]
    fn parses_known_sections_and_drops_unknown() {
        let bp = sample();
        assert!(bp.physical.contains_key(&ExamSection::Abdomen));
        assert!(bp.physical.contains_key(&ExamSection::Cardio));
        assert_eq!(bp.physical.len(), 2);
    }

    #[test]
    fn vitals_come_from_triage() {
        let bp = sample();
        let vitals = bp.section_findings(ExamSection::Vitals).unwrap();
        assert_eq!(vitals["hr"], 96);
        assert!(bp.section_findings(ExamSection::Neuro).is_none());
    }

    #[test]
    fn catalog_skips_malformed_entries() {
        let bp = sample();
        assert_eq!(bp.test_catalog.len(), 2);
        assert_eq!(bp.test_label("cbc"), "Hemograma completo");
        assert_eq!(bp.test_label("nonexistent"), "nonexistent");
        assert!(bp.has_test("usg"));
        assert!(!bp.has_test("weird"));
    }

    #[test]
    fn non_string_results_are_dropped() {
        let bp = sample();
        assert_eq!(
            bp.test_results.get("cbc").map(String::as_str),
            Some("Leucocitose discreta.")
        );
        assert!(!bp.test_results.contains_key("weird"));
    }

    #[test]
    fn followup_trims_and_drops_blank() {
        let bp = sample();
        assert_eq!(
            bp.followup_text(FollowupOutcome::Worse),
            Some("A dor piorou bastante.")
        );
        assert_eq!(
            bp.followup_text(FollowupOutcome::Improved),
            Some("Estou melhor.")
        );
        assert_eq!(bp.followup_text(FollowupOutcome::Same), None);
        assert_eq!(bp.followup_text(FollowupOutcome::SideEffect), None);
    }

    #[test]
    fn malformed_blueprint_parses_to_empty() {
        for v in [json!(null), json!("nonsense"), json!([1, 2, 3]), json!(7)] {
            let bp = CaseBlueprint::from_value(&v);
            assert_eq!(bp, CaseBlueprint::default());
            assert!(bp.triage.is_none());
            assert!(bp.section_findings(ExamSection::Vitals).is_none());
        }
    }
}
