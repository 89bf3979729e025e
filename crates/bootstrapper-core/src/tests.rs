use std::cmp::Ordering;
use std::path::PathBuf;

use serde_json::json;

use super::*;

const SHA: &str = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

#[test]
fn compare_versions_is_reflexive() {
    for version in ["", "1", "10.6", "1.0a", "2024.01.rc3", "abc"] {
        assert_eq!(compare_versions(version, version), Ordering::Equal);
    }
}

#[test]
fn compare_versions_ignores_trailing_zero_components() {
    assert_eq!(compare_versions("10.6", "10.6.0"), Ordering::Equal);
    assert_eq!(compare_versions("10.6.0.0", "10.6"), Ordering::Equal);
    assert_eq!(LooseVersion::parse("10.6"), LooseVersion::parse("10.6.0"));
}

#[test]
fn compare_versions_orders_numbers_numerically() {
    assert_eq!(compare_versions("1.2", "1.10"), Ordering::Less);
    assert_eq!(compare_versions("1.10", "1.9"), Ordering::Greater);
    assert_eq!(compare_versions("1.01", "1.1"), Ordering::Equal);
}

#[test]
fn compare_versions_places_numbers_before_text() {
    assert_eq!(compare_versions("1.0", "1.0a"), Ordering::Less);
    assert_eq!(compare_versions("1.0b", "1.0.5"), Ordering::Greater);
    assert_eq!(compare_versions("1.0a", "1.0b"), Ordering::Less);
}

#[test]
fn compare_versions_splits_digit_boundaries_inside_segments() {
    assert_eq!(compare_versions("1.0b2", "1.0b10"), Ordering::Less);
    assert_eq!(compare_versions("5.3rc1", "5.3rc1"), Ordering::Equal);
}

#[test]
fn compare_versions_handles_numbers_wider_than_u64() {
    assert_eq!(
        compare_versions("1.99999999999999999999999", "1.100000000000000000000000"),
        Ordering::Less
    );
}

#[test]
fn receipt_sentinel_is_older_than_any_real_version() {
    assert_eq!(compare_versions("0.0.0.0.0", "0.1"), Ordering::Less);
    assert_eq!(compare_versions("0.0.0.0.0", "0.0"), Ordering::Equal);
}

#[test]
fn manifest_missing_preflight_is_empty_and_absent() {
    let manifest = Manifest::from_json_str(r#"{"setupassistant": [], "userland": []}"#)
        .expect("manifest should parse");
    assert!(!manifest.has_stage(Stage::Preflight));
    assert!(manifest.entries(Stage::Preflight).is_empty());
}

#[test]
fn manifest_missing_userland_and_setupassistant_are_empty_stages() {
    let manifest = Manifest::from_json_str(r#"{"preflight": []}"#).expect("manifest should parse");
    assert!(manifest.has_stage(Stage::Preflight));
    assert!(manifest.has_stage(Stage::Userland));
    assert_eq!(manifest.item_count(Stage::SetupAssistant), 0);
    assert_eq!(manifest.item_count(Stage::Userland), 0);
}

#[test]
fn manifest_rejects_non_object_root_and_non_array_stage() {
    assert!(Manifest::from_json_str("[]").is_err());
    assert!(Manifest::from_json_str(r#"{"userland": {"name": "x"}}"#).is_err());
    assert!(Manifest::from_json_str("{not json").is_err());
}

#[test]
fn manifest_keeps_malformed_entries_for_the_caller_to_skip() {
    let manifest = Manifest::from_json_str(
        r#"{"userland": [{"type": "package"}, {"name": "ok", "type": "plugin"}]}"#,
    )
    .expect("manifest should parse");
    let entries = manifest.entries(Stage::Userland);
    assert_eq!(entries.len(), 2);
    assert!(Item::from_value(&entries[0]).is_err());
    assert!(Item::from_value(&entries[1]).is_ok());
}

#[test]
fn stage_order_is_fixed() {
    let names: Vec<&str> = Stage::ALL.iter().map(|stage| stage.as_str()).collect();
    assert_eq!(names, vec!["preflight", "setupassistant", "userland"]);
    assert_eq!(Stage::parse("userland"), Some(Stage::Userland));
    assert_eq!(Stage::parse("postflight"), None);
}

#[test]
fn package_item_applies_defaults() {
    let item = Item::from_value(&json!({
        "type": "package",
        "name": "Agent",
        "file": "/tmp/agent.pkg",
        "url": "https://example.test/agent.pkg",
        "hash": SHA.to_ascii_uppercase(),
        "packageid": "com.example.agent",
        "version": "1.0"
    }))
    .expect("package item should parse");

    let Item::Package(package) = item else {
        panic!("expected package item");
    };
    assert_eq!(package.payload.name, "Agent");
    assert_eq!(package.payload.file, PathBuf::from("/tmp/agent.pkg"));
    assert_eq!(package.payload.hash.as_deref(), Some(SHA));
    assert_eq!(package.payload.retries, DEFAULT_RETRIES);
    assert_eq!(package.payload.retry_wait_secs, DEFAULT_RETRY_WAIT_SECS);
    assert!(!package.required);
    assert!(package.skip_if.is_none());
}

#[test]
fn package_item_reads_overrides() {
    let item = Item::from_value(&json!({
        "type": "package",
        "name": "Rosetta",
        "file": "/tmp/rosetta.pkg",
        "url": "https://example.test/rosetta.pkg",
        "hash": SHA,
        "packageid": "com.example.rosetta",
        "version": "2.0",
        "required": true,
        "skip_if": "intel",
        "retries": 7,
        "retrywait": 1
    }))
    .expect("package item should parse");

    let Item::Package(package) = item else {
        panic!("expected package item");
    };
    assert!(package.required);
    assert_eq!(package.skip_if.as_deref(), Some("intel"));
    assert_eq!(package.payload.retries, 7);
    assert_eq!(package.payload.retry_wait_secs, 1);
}

#[test]
fn item_requires_name_type_and_file() {
    let missing_name = json!({"type": "rootscript", "file": "/tmp/a.sh"});
    let missing_type = json!({"name": "a", "file": "/tmp/a.sh"});
    let missing_file = json!({"name": "a", "type": "rootscript"});
    let unknown_type = json!({"name": "a", "type": "profile", "file": "/tmp/a"});

    for value in [missing_name, missing_type, missing_file, unknown_type] {
        assert!(
            Item::from_value(&value).is_err(),
            "{value} should be rejected"
        );
    }
}

#[test]
fn item_requires_hash_when_url_is_present() {
    let err = Item::from_value(&json!({
        "name": "a",
        "type": "rootscript",
        "file": "/tmp/a.sh",
        "url": "https://example.test/a.sh"
    }))
    .expect_err("url without hash must be rejected");
    assert!(err.to_string().contains("hash"));
}

#[test]
fn item_rejects_zero_retries_and_relative_file() {
    assert!(Item::from_value(&json!({
        "name": "a",
        "type": "rootscript",
        "file": "/tmp/a.sh",
        "retries": 0
    }))
    .is_err());
    assert!(Item::from_value(&json!({
        "name": "a",
        "type": "rootscript",
        "file": "scripts/a.sh"
    }))
    .is_err());
}

#[test]
fn script_item_without_url_needs_no_hash() {
    let item = Item::from_value(&json!({
        "name": "Local",
        "type": "userscript",
        "file": "/tmp/local.sh",
        "donotwait": true
    }))
    .expect("local script should parse");
    let Item::UserScript(script) = item else {
        panic!("expected user script");
    };
    assert!(script.payload.url.is_none());
    assert!(script.do_not_wait);
}

#[test]
fn plugin_item_keeps_raw_fields_and_needs_no_file() {
    let raw = json!({"name": "Profile", "type": "plugin", "profile": "wifi"});
    let item = Item::from_value(&raw).expect("plugin item should parse");
    assert_eq!(item.item_type(), ItemType::Plugin);
    assert_eq!(item.name(), "Profile");
    let Item::Plugin(plugin) = item else {
        panic!("expected plugin item");
    };
    assert_eq!(plugin.raw, raw);
}

#[test]
fn package_item_requires_packageid_and_version() {
    assert!(Item::from_value(&json!({
        "name": "Agent",
        "type": "package",
        "file": "/tmp/agent.pkg",
        "version": "1.0"
    }))
    .is_err());
}
