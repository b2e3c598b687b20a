#![allow(clippy::expect_used, clippy::unwrap_used)]

use mpb_cli::profile::run_for_test;
use mpb_cli::CommandOutput;
use mpb_core::store::{MemoryStore, ProfileStore};

fn assert_success(out: &CommandOutput) {
    assert_eq!(out.exit_code, 0, "stderr: {}", out.stderr);
    assert!(out.stderr.is_empty(), "stderr: {}", out.stderr);
}

#[test]
fn add_then_list_in_insertion_order() {
    let store = MemoryStore::new();
    assert_success(&run_for_test(&["profile", "add", "Work", "mail.example.com"], &store));
    assert_success(&run_for_test(&["profile", "add", "--preset", "flipkart"], &store));

    let list = run_for_test(&["profile", "list"], &store);
    assert_success(&list);
    let lines: Vec<&str> = list.stdout.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("ID"));
    assert!(lines[1].contains("Work") && lines[1].contains("https://mail.example.com"));
    assert!(lines[2].contains("Flipkart Seller") && lines[2].contains("https://seller.flipkart.com"));
}

#[test]
fn list_json_marks_active_profile() {
    let store = MemoryStore::new();
    let a = store.create("A", "a.test").unwrap();
    store.create("B", "b.test").unwrap();
    store.set_active(Some(&a.id)).unwrap();

    let out = run_for_test(&["profile", "list", "--json"], &store);
    assert_success(&out);
    let rows: serde_json::Value = serde_json::from_str(&out.stdout).unwrap();
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["id"], a.id.as_str());
    assert_eq!(rows[0]["active"], true);
    assert_eq!(rows[1]["active"], false);
    assert_eq!(rows[1]["url"], "https://b.test");
}

#[test]
fn empty_list_says_so() {
    let store = MemoryStore::new();
    let out = run_for_test(&["profile", "ls"], &store);
    assert_success(&out);
    assert_eq!(out.stdout, "No profiles\n");
}

#[test]
fn add_rejects_missing_fields_and_unknown_preset() {
    let store = MemoryStore::new();
    let out = run_for_test(&["profile", "add", "OnlyName"], &store);
    assert_eq!(out.exit_code, 1);
    assert!(out.stderr.contains("url"));

    let out = run_for_test(&["profile", "add", "--preset", "nope"], &store);
    assert_eq!(out.exit_code, 1);
    assert!(out.stderr.contains("unknown preset 'nope'"));
    assert!(store.list().unwrap().is_empty());
}

#[test]
fn edit_keeps_unchanged_fields() {
    let store = MemoryStore::new();
    let p = store.create("Shop", "shop.test").unwrap();

    let out = run_for_test(&["profile", "edit", &p.id, "--name", "Store", "--json"], &store);
    assert_success(&out);
    let view: serde_json::Value = serde_json::from_str(&out.stdout).unwrap();
    assert_eq!(view["name"], "Store");
    assert_eq!(view["url"], "https://shop.test");

    let missing = run_for_test(&["profile", "edit", "ghost", "--url", "x.test"], &store);
    assert_eq!(missing.exit_code, 1);
    assert!(missing.stderr.contains("profile not found: ghost"));
}

#[test]
fn show_and_remove() {
    let store = MemoryStore::new();
    let p = store.create("Shop", "shop.test").unwrap();

    let show = run_for_test(&["profile", "show", &p.id], &store);
    assert_success(&show);
    assert!(show.stdout.contains("Shop"));
    assert!(show.stdout.contains("Active:"));

    assert_success(&run_for_test(&["profile", "rm", &p.id], &store));
    assert_eq!(store.get(&p.id).unwrap(), None);

    let again = run_for_test(&["profile", "show", &p.id], &store);
    assert_eq!(again.exit_code, 1);
    assert!(again.stderr.contains("profile not found"));
}

#[test]
fn presets_lists_every_template() {
    let store = MemoryStore::new();
    let out = run_for_test(&["profile", "presets", "--json"], &store);
    assert_success(&out);
    let rows: serde_json::Value = serde_json::from_str(&out.stdout).unwrap();
    assert_eq!(
        rows.as_array().unwrap().len(),
        mpb_db::profile_repository::PRESETS.len()
    );
}
