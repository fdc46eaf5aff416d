use mismatchkit_core::fetcher::extract_attributes;
use mismatchkit_core::{classify, ClassifierRules, Decision, EntityError, MismatchRecord};
use mismatchkit_wikidata::parse_statements;
use serde_json::{json, Value};

/// Trimmed `/entities/items/Q77168/statements` response.
fn q77168() -> Value {
    json!({
        "P31": [
            {"id": "Q77168$A6F3E1B2-1111-4C8A-9E51-0F5D1B2C3A41", "rank": "normal",
             "property": {"id": "P31", "data_type": "wikibase-item"},
             "value": {"type": "value", "content": "Q5"}, "qualifiers": [], "references": []}
        ],
        "P106": [
            {"id": "Q77168$B7A4F2C3-2222-4D9B-8F62-1A6E2C3D4B52", "rank": "normal",
             "property": {"id": "P106", "data_type": "wikibase-item"},
             "value": {"type": "value", "content": "Q10873124"}, "qualifiers": [], "references": []}
        ],
        "P569": [
            {"id": "Q77168$C8B5A3D4-3333-4EAC-9A73-2B7F3D4E5C63", "rank": "preferred",
             "property": {"id": "P569", "data_type": "time"},
             "value": {"type": "value", "content": {
                 "time": "+1971-00-00T00:00:00Z", "precision": 9,
                 "calendarmodel": "http://www.wikidata.org/entity/Q1985727"}},
             "qualifiers": [], "references": []},
            {"id": "Q77168$D9C6B4E5-4444-4FBD-8B84-3C8A4E5F6D74", "rank": "normal",
             "property": {"id": "P569", "data_type": "time"},
             "value": {"type": "value", "content": {
                 "time": "+1979-00-00T00:00:00Z", "precision": 9,
                 "calendarmodel": "http://www.wikidata.org/entity/Q1985727"}},
             "qualifiers": [], "references": []}
        ]
    })
}

fn record(item_id: &str, external_value: &str) -> MismatchRecord {
    MismatchRecord {
        item_id: item_id.to_string(),
        statement_guid: format!("{item_id}$C8B5A3D4-3333-4EAC-9A73-2B7F3D4E5C63"),
        property_id: "P569".into(),
        wikidata_value: "+1971-00-00T00:00:00Z".into(),
        meta_wikidata_value: String::new(),
        external_value: external_value.to_string(),
        external_url: "https://ratings.fide.com/profile/4100018".into(),
        record_type: "statement".into(),
    }
}

#[test]
fn test_response_to_attributes() {
    let statements = parse_statements("Q77168", &q77168(), &["P106", "P569"]).unwrap();
    assert!(!statements.contains_key("P31"));

    let attrs = extract_attributes("Q77168", &statements, "P106", "P569").unwrap();
    assert_eq!(attrs.occupations.unwrap().into_iter().collect::<Vec<_>>(), vec!["Q10873124"]);
    assert_eq!(attrs.years_of_birth.into_iter().collect::<Vec<_>>(), vec![1971, 1979]);
}

#[test]
fn test_known_chess_player_with_matching_year_is_dropped() {
    let statements = parse_statements("Q77168", &q77168(), &["P106", "P569"]).unwrap();
    let attrs = extract_attributes("Q77168", &statements, "P106", "P569").unwrap();
    let rules = ClassifierRules::default();

    assert_eq!(classify(&record("Q77168", "1979"), &attrs, &rules).unwrap(), Decision::Drop);
    assert_eq!(classify(&record("Q77168", "1975"), &attrs, &rules).unwrap(), Decision::Keep);
}

#[test]
fn test_item_without_birth_dates() {
    let body = json!({
        "P106": [{"id": "Q4363644$1", "property": {"id": "P106", "data_type": "wikibase-item"},
                  "value": {"type": "value", "content": "Q10873124"}}]
    });
    let statements = parse_statements("Q4363644", &body, &["P106", "P569"]).unwrap();
    let err = extract_attributes("Q4363644", &statements, "P106", "P569").unwrap_err();
    assert_eq!(
        err,
        EntityError::MissingBirthYearStatements {
            item_id: "Q4363644".into()
        }
    );
}
