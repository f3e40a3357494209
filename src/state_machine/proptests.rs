//! Property-based tests for the merge helpers and phase ordering

use super::merge::{merge_orders, merge_section};
use super::ops::{order_tests, reveal_section, SessionSnapshot};
use super::{ExamSection, SessionPhase};
use crate::case::CaseBlueprint;
use proptest::prelude::*;
use serde_json::json;
use std::collections::BTreeMap;

fn arb_section() -> impl Strategy<Value = ExamSection> {
    prop::sample::select(ExamSection::ALL.to_vec())
}

fn arb_keys() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("[a-z]{2,8}", 0..6)
}

fn full_blueprint() -> CaseBlueprint {
    let mut physical = serde_json::Map::new();
    for section in ExamSection::ALL {
        if section == ExamSection::Vitals {
            continue;
        }
        physical.insert(
            section.as_key().to_string(),
            json!(format!("achado {}", section.as_key())),
        );
    }
    CaseBlueprint::from_value(&json!({
        "triage": {"vitals": {"hr": 80}},
        "physical": physical,
    }))
}

proptest! {
    /// Re-applying a section merge never changes the stored value.
    #[test]
    fn section_merge_idempotent(section in arb_section(), a in "[a-z ]{0,20}", b in "[a-z ]{0,20}") {
        let original = json!(a);
        let first = merge_section(&BTreeMap::new(), section, &original);
        prop_assert!(first.newly_revealed);
        let second = merge_section(&first.next, section, &json!(b));
        prop_assert!(!second.newly_revealed);
        prop_assert_eq!(second.value, original);
        prop_assert_eq!(second.next, first.next);
    }

    /// Ordered keys only ever grow, results are first-write-wins, and a
    /// repeated request adds nothing new.
    #[test]
    fn order_merge_grows_monotonically(first_req in arb_keys(), second_req in arb_keys()) {
        let blueprint = BTreeMap::new();
        let first = merge_orders(&[], &BTreeMap::new(), &first_req, &blueprint);
        let second = merge_orders(&first.orders, &first.results, &second_req, &blueprint);

        for key in &first.orders {
            prop_assert!(second.orders.contains(key));
        }
        for (key, text) in &first.results {
            prop_assert_eq!(second.results.get(key), Some(text));
        }

        let replay = merge_orders(&second.orders, &second.results, &second_req, &blueprint);
        prop_assert!(replay.newly.is_empty());
        prop_assert_eq!(replay.orders, second.orders);
    }

    /// Revealing sections in any order never moves the phase backwards.
    #[test]
    fn reveal_phase_is_monotonic(sections in prop::collection::vec(arb_section(), 1..8)) {
        let blueprint = full_blueprint();
        let mut snapshot = SessionSnapshot::default();
        let mut prev_phase = snapshot.phase;

        for key in sections.iter().map(|s| s.as_key()) {
            let outcome = reveal_section(&snapshot, &blueprint, key).unwrap();
            prop_assert!(outcome.phase >= prev_phase);
            prev_phase = outcome.phase;
            snapshot.phase = outcome.phase;
            snapshot.physical_data = outcome.physical_data;
        }
        prop_assert_eq!(prev_phase, SessionPhase::Consult);
    }

    /// Invalid test keys never produce a partial merge.
    #[test]
    fn invalid_orders_leave_no_trace(keys in arb_keys()) {
        let blueprint = CaseBlueprint::default();
        let snapshot = SessionSnapshot::default();
        prop_assert!(order_tests(&snapshot, &blueprint, &keys).is_err());
    }
}
