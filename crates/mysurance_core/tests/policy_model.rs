use chrono::{TimeZone, Utc};
use mysurance_core::{Policy, PolicyPatch, RawPolicyFields};
use serde_json::json;
use uuid::Uuid;

#[test]
fn stored_fields_use_camel_case_and_type_keys() {
    let fields = RawPolicyFields {
        content: "Car".to_string(),
        value: 500.0,
        kind: Some("car".to_string()),
        excess: Some(20.0),
        deleted: false,
        created_at: "2024-03-01T10:00:00.000Z".to_string(),
    };

    let value = serde_json::to_value(&fields).unwrap();
    assert_eq!(value["type"], "car");
    assert_eq!(value["createdAt"], "2024-03-01T10:00:00.000Z");
    assert!(value.get("kind").is_none());
    assert!(value.get("created_at").is_none());

    let decoded: RawPolicyFields = serde_json::from_value(value).unwrap();
    assert_eq!(decoded, fields);
}

#[test]
fn legacy_record_without_type_or_excess_decodes() {
    let record = json!({
        "content": "Bike",
        "value": 120.0,
        "deleted": false,
        "createdAt": "2023-11-05T08:30:00.000Z"
    });

    let decoded: RawPolicyFields = serde_json::from_value(record).unwrap();
    assert_eq!(decoded.kind, None);
    assert_eq!(decoded.excess, None);

    let policy = Policy::from_fields(Uuid::new_v4(), &decoded).unwrap();
    assert_eq!(policy.display_kind(), "Unknown");
    assert_eq!(policy.excess_or_zero(), 0.0);
}

#[test]
fn materialized_policy_serializes_id_and_timestamp() {
    let id = Uuid::new_v4();
    let policy = Policy {
        id,
        content: "Home".to_string(),
        value: 900.0,
        kind: Some("home".to_string()),
        excess: None,
        deleted: false,
        created_at: Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap(),
    };

    let value = serde_json::to_value(&policy).unwrap();
    assert_eq!(value["id"], id.to_string());
    assert_eq!(value["type"], "home");
    assert!(value["excess"].is_null());

    let decoded: Policy = serde_json::from_value(value).unwrap();
    assert_eq!(decoded, policy);
}

#[test]
fn partial_patch_decodes_absent_fields_as_untouched() {
    let patch: PolicyPatch = serde_json::from_value(json!({ "deleted": true })).unwrap();
    assert_eq!(patch, PolicyPatch::tombstone());

    let patch: PolicyPatch =
        serde_json::from_value(json!({ "type": "travel", "value": 45.5 })).unwrap();
    assert_eq!(patch.kind.as_deref(), Some("travel"));
    assert_eq!(patch.value, Some(45.5));
    assert_eq!(patch.content, None);
}
