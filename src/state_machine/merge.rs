//! Pure merge helpers for the session's structured sub-records
//!
//! Reveal and order operations are idempotent re-applies: a union of sets
//! for ordered test keys and first-write-wins inserts for section findings
//! and result texts. Each helper is a pure function from (current state,
//! requested keys) to (next state, newly-added keys), which keeps the
//! read-modify-write step trivially testable without a database.

use super::ExamSection;
use serde_json::Value;
use std::collections::BTreeMap;

/// Placeholder stored when the case blueprint has no result text for an
/// ordered test.
pub const RESULT_UNAVAILABLE: &str = "Resultado indisponível.";

/// Outcome of merging one revealed section into the physical-exam record.
#[derive(Debug, Clone, PartialEq)]
pub struct SectionMerge {
    pub next: BTreeMap<ExamSection, Value>,
    /// The stored value for the section: the pre-existing one on a repeat
    /// reveal, the blueprint one on a first reveal.
    pub value: Value,
    pub newly_revealed: bool,
}

/// First-write-wins insert of a section finding.
pub fn merge_section(
    current: &BTreeMap<ExamSection, Value>,
    section: ExamSection,
    finding: &Value,
) -> SectionMerge {
    if let Some(existing) = current.get(&section) {
        return SectionMerge {
            next: current.clone(),
            value: existing.clone(),
            newly_revealed: false,
        };
    }
    let mut next = current.clone();
    next.insert(section, finding.clone());
    SectionMerge {
        next,
        value: finding.clone(),
        newly_revealed: true,
    }
}

/// Outcome of merging a test order into the orders/results records.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderMerge {
    /// Union of previously and newly ordered keys, insertion-ordered.
    pub orders: Vec<String>,
    pub results: BTreeMap<String, String>,
    /// Keys ordered for the first time by this call, in request order.
    pub newly: Vec<String>,
}

/// Union-merge of requested test keys. Result text is copied from the
/// blueprint on first order and never refreshed afterwards; keys with no
/// blueprint result get the fixed placeholder.
pub fn merge_orders(
    current_orders: &[String],
    current_results: &BTreeMap<String, String>,
    requested: &[String],
    blueprint_results: &BTreeMap<String, String>,
) -> OrderMerge {
    let mut orders = current_orders.to_vec();
    let mut results = current_results.clone();
    let mut newly = Vec::new();

    for key in requested {
        if orders.iter().any(|k| k == key) {
            continue;
        }
        orders.push(key.clone());
        let text = blueprint_results
            .get(key)
            .cloned()
            .unwrap_or_else(|| RESULT_UNAVAILABLE.to_string());
        results.entry(key.clone()).or_insert(text);
        newly.push(key.clone());
    }

    OrderMerge {
        orders,
        results,
        newly,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn first_reveal_inserts() {
        let current = BTreeMap::new();
        let merge = merge_section(&current, ExamSection::Abdomen, &json!("dor difusa"));
        assert!(merge.newly_revealed);
        assert_eq!(merge.value, json!("dor difusa"));
        assert_eq!(merge.next.len(), 1);
    }

    #[test]
    fn repeat_reveal_keeps_stored_value() {
        let mut current = BTreeMap::new();
        current.insert(ExamSection::Abdomen, json!("achado original"));
        let merge = merge_section(&current, ExamSection::Abdomen, &json!("achado novo"));
        assert!(!merge.newly_revealed);
        assert_eq!(merge.value, json!("achado original"));
        assert_eq!(merge.next, current);
    }

    #[test]
    fn order_union_and_placeholder() {
        let mut blueprint = BTreeMap::new();
        blueprint.insert("cbc".to_string(), "Hb 13,2".to_string());

        let merge = merge_orders(
            &[],
            &BTreeMap::new(),
            &["cbc".to_string(), "usg".to_string()],
            &blueprint,
        );
        assert_eq!(merge.newly, vec!["cbc", "usg"]);
        assert_eq!(merge.results["cbc"], "Hb 13,2");
        assert_eq!(merge.results["usg"], RESULT_UNAVAILABLE);
    }

    #[test]
    fn reorder_is_per_key_noop() {
        let mut blueprint = BTreeMap::new();
        blueprint.insert("cbc".to_string(), "primeiro texto".to_string());

        let first = merge_orders(&[], &BTreeMap::new(), &["cbc".to_string()], &blueprint);

        // Blueprint text changing later must not refresh the stored result.
        blueprint.insert("cbc".to_string(), "texto alterado".to_string());
        let second = merge_orders(
            &first.orders,
            &first.results,
            &["cbc".to_string(), "glicemia".to_string()],
            &blueprint,
        );

        assert_eq!(second.newly, vec!["glicemia"]);
        assert_eq!(second.results["cbc"], "primeiro texto");
        assert_eq!(second.orders, vec!["cbc", "glicemia"]);
    }

    #[test]
    fn explicit_not_applicable_text_is_kept_verbatim() {
        let mut blueprint = BTreeMap::new();
        blueprint.insert("betaHcg".to_string(), "Não se aplica.".to_string());

        let merge = merge_orders(
            &[],
            &BTreeMap::new(),
            &["betaHcg".to_string()],
            &blueprint,
        );
        assert_eq!(merge.results["betaHcg"], "Não se aplica.");
    }
}
