use mismatchkit_core::StatementValue;
use mismatchkit_wikidata::{parse_statement, parse_statements};
use proptest::prelude::*;
use serde_json::{json, Map, Value};

fn arb_json() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| json!(n)),
        "[a-zA-Z0-9+:$ -]{0,12}".prop_map(Value::String),
        prop::sample::select(vec!["value", "somevalue", "novalue", "time", "wikibase-item", "Q5"])
            .prop_map(|s| Value::String(s.to_string())),
    ];
    leaf.prop_recursive(4, 32, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map(
                prop::sample::select(vec!["id", "value", "type", "content", "time", "property", "data_type"]),
                inner,
                0..4,
            )
            .prop_map(|m| Value::Object(
                m.into_iter().map(|(k, v)| (k.to_string(), v)).collect::<Map<_, _>>()
            )),
        ]
    })
}

proptest! {
    #[test]
    fn prop_parse_statement_never_panics(raw in arb_json()) {
        if let Ok(statement) = parse_statement("Q1", &raw) {
            let id = raw.get("id").and_then(Value::as_str).unwrap_or_default();
            prop_assert_eq!(statement.id.as_str(), id);
        }
    }

    #[test]
    fn prop_parse_statements_keeps_only_requested_properties(body in arb_json()) {
        if let Ok(parsed) = parse_statements("Q1", &body, &["P569"]) {
            prop_assert!(parsed.keys().all(|k| k == "P569"));
        }
    }

    #[test]
    fn prop_typed_time_values_round_trip(time in "[+-][0-9]{1,11}-[0-9]{2}-[0-9]{2}T00:00:00Z") {
        let raw = json!({
            "id": "Q1$x",
            "property": {"data_type": "time"},
            "value": {"type": "value", "content": {"time": time.clone(), "precision": 9}}
        });
        let statement = parse_statement("Q1", &raw).unwrap();
        prop_assert_eq!(statement.value, StatementValue::Time(time));
    }
}
