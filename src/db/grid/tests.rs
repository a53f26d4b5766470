use serde_json::json;

use super::*;

fn filter_model(entries: &[(&str, Value)]) -> Map<String, Value> {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

#[test]
fn contains_filter_builds_case_insensitive_predicate() {
    let model = filter_model(&[(
        "name",
        json!({"filterType": "text", "type": "contains", "filter": "foo"}),
    )]);
    let (conditions, patterns) = build_filters(&model);

    assert_eq!(conditions, vec!["\"name\"::text ILIKE $1".to_string()]);
    assert_eq!(patterns, vec!["%foo%".to_string()]);
}

#[test]
fn equals_filter_matches_metacharacters_literally() {
    let model = filter_model(&[(
        "discount",
        json!({"filterType": "text", "type": "equals", "filter": "50%"}),
    )]);
    let (conditions, patterns) = build_filters(&model);

    assert_eq!(conditions, vec!["\"discount\"::text ILIKE $1".to_string()]);
    assert_eq!(patterns, vec!["50\\%".to_string()]);

    let model = filter_model(&[(
        "code",
        json!({"filterType": "text", "type": "equals", "filter": "a_b\\c"}),
    )]);
    let (_, patterns) = build_filters(&model);
    assert_eq!(patterns, vec!["a\\_b\\\\c".to_string()]);
}

#[test]
fn each_match_kind_shapes_its_pattern() {
    let model = filter_model(&[
        ("a", json!({"filterType": "text", "type": "equals", "filter": "x"})),
        ("b", json!({"filterType": "text", "type": "startsWith", "filter": "x"})),
        ("c", json!({"filterType": "text", "type": "endsWith", "filter": "x"})),
    ]);
    let (_, patterns) = build_filters(&model);
    assert_eq!(patterns, vec!["x", "x%", "%x"]);
}

#[test]
fn filters_combine_with_and_and_number_in_order() {
    let model = filter_model(&[
        ("name", json!({"filterType": "text", "type": "contains", "filter": "a"})),
        ("city", json!({"filterType": "text", "type": "equals", "filter": "b"})),
    ]);
    let (conditions, patterns) = build_filters(&model);
    let clause = build_where(&conditions);

    assert_eq!(
        clause,
        " WHERE \"name\"::text ILIKE $1 AND \"city\"::text ILIKE $2"
    );
    assert_eq!(patterns, vec!["%a%", "b"]);
}

#[test]
fn unsupported_filters_are_silently_ignored() {
    let model = filter_model(&[
        ("age", json!({"filterType": "number", "type": "greaterThan", "filter": "3"})),
        ("name", json!({"filterType": "text", "type": "blurry", "filter": "a"})),
        ("note", json!("not even an object")),
        ("city", json!({"filterType": "text", "type": "contains", "filter": "x"})),
    ]);
    let (conditions, patterns) = build_filters(&model);

    assert_eq!(conditions.len(), 1);
    assert_eq!(conditions[0], "\"city\"::text ILIKE $1");
    assert_eq!(patterns, vec!["%x%"]);
}

#[test]
fn empty_model_yields_no_where_clause() {
    let (conditions, patterns) = build_filters(&Map::new());
    assert!(conditions.is_empty());
    assert!(patterns.is_empty());
    assert_eq!(build_where(&conditions), "");
}

#[test]
fn sort_specs_apply_in_given_order() {
    let sorts = vec![
        SortSpec {
            col_id: "created_at".to_string(),
            sort: SortDirection::Desc,
        },
        SortSpec {
            col_id: "name".to_string(),
            sort: SortDirection::Asc,
        },
    ];
    assert_eq!(
        build_order_by(&sorts),
        " ORDER BY \"created_at\" DESC, \"name\" ASC"
    );
    assert_eq!(build_order_by(&[]), "");
}

#[test]
fn page_bounds_derive_limit_from_row_window() {
    assert_eq!(page_bounds(Some(40.0), Some(60.0)), (20, 40));
    assert_eq!(page_bounds(Some(0.0), Some(100.0)), (100, 0));
}

#[test]
fn missing_or_invalid_bounds_fall_back_to_default_page() {
    assert_eq!(page_bounds(Some(0.0), None), (20, 0));
    assert_eq!(page_bounds(None, Some(50.0)), (20, 0));
    assert_eq!(page_bounds(None, None), (20, 0));
    assert_eq!(page_bounds(Some(0.0), Some(f64::NAN)), (20, 0));
}

#[test]
fn inverted_window_clamps_to_empty_page() {
    assert_eq!(page_bounds(Some(50.0), Some(30.0)), (0, 50));
    assert_eq!(page_bounds(Some(-10.0), Some(10.0)), (20, 0));
}

#[test]
fn sort_direction_deserializes_lowercase() {
    let sort: SortSpec =
        serde_json::from_value(json!({"colId": "name", "sort": "desc"})).unwrap();
    assert_eq!(sort.col_id, "name");
    assert_eq!(sort.sort, SortDirection::Desc);
}

#[test]
fn page_request_tolerates_missing_optional_fields() {
    let request: TablePageRequest = serde_json::from_value(json!({
        "connection": {"host": "localhost", "port": 5432, "username": "postgres"},
        "table": "users"
    }))
    .unwrap();
    assert!(request.start_row.is_none());
    assert!(request.filter_model.is_none());
    assert!(request.sort_model.is_none());
}
