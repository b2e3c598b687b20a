#![allow(clippy::expect_used, clippy::unwrap_used)]

use mpb_cli::slots::run_for_test;
use mpb_core::store::{MemoryStore, ProfileStore, SlotRegistry};
use mpb_db::slot_repository::Slot;

fn seeded() -> (MemoryStore, Vec<String>) {
    let store = MemoryStore::new();
    let ids = ["A", "B", "C", "D"]
        .iter()
        .map(|name| store.create(name, &format!("{name}.test")).unwrap().id)
        .collect();
    (store, ids)
}

#[test]
fn slots_table_names_residents() {
    let (store, ids) = seeded();
    store.assign(Slot::Beta, &ids[1]).unwrap();

    let out = run_for_test(&["slots"], &store, &store);
    assert_eq!(out.exit_code, 0, "stderr: {}", out.stderr);
    let beta = out
        .stdout
        .lines()
        .find(|line| line.starts_with("beta"))
        .unwrap();
    assert!(beta.contains(&ids[1]));
    assert!(beta.contains('B'));
    let main = out.stdout.lines().find(|line| line.starts_with("main")).unwrap();
    assert!(main.contains('-'));
}

#[test]
fn slots_json_lists_every_slot() {
    let (store, ids) = seeded();
    store.assign(Slot::Main, &ids[0]).unwrap();

    let out = run_for_test(&["slots", "--json"], &store, &store);
    let rows: serde_json::Value = serde_json::from_str(&out.stdout).unwrap();
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), Slot::ALL.len());
    assert_eq!(rows[0]["slot"], "main");
    assert_eq!(rows[0]["profile_name"], "A");
}

#[test]
fn window_reports_doomed_residents() {
    let (store, ids) = seeded();
    store.assign(Slot::Main, &ids[0]).unwrap();
    store.assign(Slot::Beta, &ids[2]).unwrap();
    store.assign(Slot::Gamma, &ids[3]).unwrap();

    let out = run_for_test(&["window", &ids[2], "--json"], &store, &store);
    assert_eq!(out.exit_code, 0, "stderr: {}", out.stderr);
    let view: serde_json::Value = serde_json::from_str(&out.stdout).unwrap();
    assert_eq!(view["focused"], ids[2].as_str());
    assert_eq!(
        view["safe"],
        serde_json::json!([ids[1].clone(), ids[2].clone(), ids[3].clone()])
    );
    assert_eq!(view["doomed"], serde_json::json!([ids[0].clone()]));
}

#[test]
fn window_unknown_profile_fails() {
    let (store, _) = seeded();
    let out = run_for_test(&["window", "ghost"], &store, &store);
    assert_eq!(out.exit_code, 1);
    assert!(out.stderr.contains("profile not found: ghost"));
}

#[test]
fn active_set_show_clear() {
    let (store, ids) = seeded();

    let out = run_for_test(&["active"], &store, &store);
    assert_eq!(out.stdout, "none\n");

    let out = run_for_test(&["active", &ids[1]], &store, &store);
    assert_eq!(out.exit_code, 0);
    assert_eq!(out.stdout, format!("{}\n", ids[1]));
    assert_eq!(store.get_active().unwrap(), Some(ids[1].clone()));

    let out = run_for_test(&["active", "--clear", "--json"], &store, &store);
    let value: serde_json::Value = serde_json::from_str(&out.stdout).unwrap();
    assert!(value["active"].is_null());
    assert_eq!(store.get_active().unwrap(), None);

    let out = run_for_test(&["active", "ghost"], &store, &store);
    assert_eq!(out.exit_code, 1);
}
