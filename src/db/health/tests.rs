use chrono::{Duration, TimeZone, Utc};

use super::*;

fn now() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 8, 20, 12, 0, 0).unwrap()
}

#[test]
fn bloat_ratio_is_deterministic() {
    let first = estimate_bloat_ratio(1_048_576.0, 1000.0, 12, true);
    let second = estimate_bloat_ratio(1_048_576.0, 1000.0, 12, true);
    assert_eq!(first, second);
    assert!(first.is_some());
}

#[test]
fn bloat_ratio_omitted_for_empty_relation() {
    assert_eq!(estimate_bloat_ratio(0.0, 0.0, 5, false), None);
    assert_eq!(estimate_bloat_ratio(-1.0, 100.0, 5, false), None);
}

#[test]
fn bloat_ratio_clamped_to_percentage_range() {
    // Tiny relation with many wide tuples would go negative without the clamp.
    let ratio = estimate_bloat_ratio(100.0, 1000.0, 3, false).unwrap();
    assert_eq!(ratio, 0.0);

    let ratio = estimate_bloat_ratio(1_000_000.0, 0.0, 3, false).unwrap();
    assert_eq!(ratio, 100.0);
}

#[test]
fn null_bitmap_lowers_the_estimate() {
    // The bitmap enlarges the per-tuple overhead, shrinking estimated waste.
    let without = estimate_bloat_ratio(100_000.0, 500.0, 9, false).unwrap();
    let with = estimate_bloat_ratio(100_000.0, 500.0, 9, true).unwrap();
    assert!(with < without);
}

#[test]
fn bloated_flag_follows_threshold() {
    let hot = TableBloatStat {
        table_name: "events".to_string(),
        bloat_ratio: Some(45.0),
    };
    let cold = TableBloatStat {
        table_name: "users".to_string(),
        bloat_ratio: Some(5.0),
    };
    let empty = TableBloatStat {
        table_name: "staging".to_string(),
        bloat_ratio: None,
    };
    assert!(hot.is_bloated());
    assert!(!cold.is_bloated());
    assert!(!empty.is_bloated());
}

#[test]
fn badge_good_when_both_recent() {
    let status = classify_maintenance(Some(now()), Some(now()), now());
    assert_eq!(status, MaintenanceStatus::Good);
}

#[test]
fn badge_warning_when_one_is_stale() {
    let stale = now() - Duration::days(10);
    let status = classify_maintenance(Some(now()), Some(stale), now());
    assert_eq!(status, MaintenanceStatus::Warning);
    let status = classify_maintenance(Some(stale), Some(now()), now());
    assert_eq!(status, MaintenanceStatus::Warning);
}

#[test]
fn badge_needs_maintenance_when_both_stale() {
    let stale = now() - Duration::days(30);
    let status = classify_maintenance(Some(stale), Some(stale), now());
    assert_eq!(status, MaintenanceStatus::NeedsMaintenance);
}

#[test]
fn badge_never_run_when_either_is_missing() {
    assert_eq!(
        classify_maintenance(None, Some(now()), now()),
        MaintenanceStatus::NeverRun
    );
    assert_eq!(
        classify_maintenance(Some(now()), None, now()),
        MaintenanceStatus::NeverRun
    );
    assert_eq!(
        classify_maintenance(None, None, now()),
        MaintenanceStatus::NeverRun
    );
}

#[test]
fn days_since_uses_most_recent_and_floors() {
    let vacuum = now() - Duration::days(12);
    let analyze = now() - Duration::hours(3 * 24 + 20);
    let days = days_since_maintenance(Some(vacuum), Some(analyze), now());
    assert_eq!(days, Some(3));
}

#[test]
fn days_since_missing_when_never_maintained() {
    assert_eq!(days_since_maintenance(None, Some(now()), now()), None);
    assert_eq!(days_since_maintenance(None, None, now()), None);
}

#[test]
fn badge_serializes_with_display_names() {
    let json = serde_json::to_string(&MaintenanceStatus::NeedsMaintenance).unwrap();
    assert_eq!(json, "\"Needs Maintenance\"");
    let json = serde_json::to_string(&MaintenanceStatus::NeverRun).unwrap();
    assert_eq!(json, "\"Never Run\"");
}
