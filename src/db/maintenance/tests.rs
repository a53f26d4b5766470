use super::*;

fn sample(name: &str, bloat: Option<f64>, unused: &[&str]) -> TableHealthSample {
    TableHealthSample {
        table_name: name.to_string(),
        bloat_ratio: bloat,
        index_scans: 10,
        sequential_scans: 2,
        unused_indexes: unused.iter().map(|i| i.to_string()).collect(),
    }
}

fn tables(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

#[test]
fn plan_splits_tables_by_bloat_threshold() {
    let discovered = tables(&["events", "users"]);
    let samples = vec![
        sample("events", Some(45.0), &[]),
        sample("users", Some(5.0), &[]),
    ];
    let plan = build_plan(&discovered, &samples);

    assert_eq!(plan.full_rewrite, vec!["events".to_string()]);
    assert_eq!(plan.light_pass, vec!["users".to_string()]);
}

#[test]
fn every_discovered_table_lands_in_exactly_one_list() {
    let discovered = tables(&["a", "b", "c"]);
    let samples = vec![
        sample("a", Some(80.0), &[]),
        sample("b", Some(20.0), &[]),
        sample("c", None, &[]),
    ];
    let plan = build_plan(&discovered, &samples);

    for name in &discovered {
        let in_light = plan.light_pass.contains(name);
        let in_full = plan.full_rewrite.contains(name);
        assert!(in_light != in_full, "{} must be planned exactly once", name);
    }
    // Exactly at the threshold is not bloated.
    assert!(plan.light_pass.contains(&"b".to_string()));
    // No estimate means no full rewrite.
    assert!(plan.light_pass.contains(&"c".to_string()));
}

#[test]
fn discovered_table_without_sample_still_gets_the_light_pass() {
    // Partitioned parents and freshly created tables show up in discovery
    // but may have no statistics sample yet.
    let discovered = tables(&["events", "measurements"]);
    let samples = vec![sample("events", Some(45.0), &[])];
    let plan = build_plan(&discovered, &samples);

    assert_eq!(plan.full_rewrite, vec!["events".to_string()]);
    assert_eq!(plan.light_pass, vec!["measurements".to_string()]);
    assert_eq!(plan.tables_processed(), 2);
}

#[test]
fn light_sweep_covers_both_lists() {
    let discovered = tables(&["events", "users"]);
    let samples = vec![
        sample("events", Some(45.0), &[]),
        sample("users", Some(5.0), &[]),
    ];
    let plan = build_plan(&discovered, &samples);

    let swept: Vec<&String> = plan.light_sweep().collect();
    assert_eq!(swept.len(), 2);
    assert_eq!(plan.tables_processed(), 2);
    assert_eq!(plan.full_rewrite.len(), 1);
}

#[test]
fn plan_collects_unused_indexes_across_tables() {
    let discovered = tables(&["orders", "events"]);
    let samples = vec![
        sample("orders", Some(2.0), &["idx_orders_status"]),
        sample("events", Some(55.0), &["idx_events_kind", "idx_events_actor"]),
    ];
    let plan = build_plan(&discovered, &samples);

    assert_eq!(
        plan.indexes_to_rebuild,
        vec![
            "idx_orders_status".to_string(),
            "idx_events_kind".to_string(),
            "idx_events_actor".to_string(),
        ]
    );
}

#[test]
fn empty_schema_yields_empty_plan() {
    let plan = build_plan(&[], &[]);
    assert!(plan.light_pass.is_empty());
    assert!(plan.full_rewrite.is_empty());
    assert!(plan.indexes_to_rebuild.is_empty());
    assert_eq!(plan.tables_processed(), 0);
}

#[test]
fn maintenance_outcome_uses_wire_names() {
    let outcome = MaintenanceOutcome {
        success: true,
        details: MaintenanceResult {
            tables_processed: 4,
            bloated_tables_fixed: 1,
            indexes_rebuilt: 2,
        },
    };
    let json = serde_json::to_value(&outcome).unwrap();
    assert_eq!(json["success"], true);
    assert_eq!(json["details"]["tablesProcessed"], 4);
    assert_eq!(json["details"]["bloatedTablesFixed"], 1);
    assert_eq!(json["details"]["indexesRebuilt"], 2);
}
