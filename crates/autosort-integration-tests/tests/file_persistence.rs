//! Cross-crate persistence test: a host session saved through the file
//! store and reloaded in a fresh session, with its config from data files.

use autosort_core::context::{Role, SorterContext};
use autosort_core::engine::DistributionEngine;
use autosort_core::id::*;
use autosort_core::node::{FilterRule, SortMode};
use autosort_core::serialize::{FORMAT_VERSION, FileStore, PersistedFile};
use autosort_core::test_utils::*;
use autosort_core::transport::Outbox;
use autosort_data::load_sorter_data;
use std::fs;
use std::path::{Path, PathBuf};

fn temp_dir(suffix: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "autosort_persist_{suffix}_{}",
        std::process::id()
    ));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn session(dir: &Path, store_path: &Path) -> SorterContext {
    let data = load_sorter_data(dir).unwrap();
    SorterContext::new(
        PeerId(1),
        Role::Host,
        data.config,
        Box::new(Outbox::new()),
    )
    .with_store(Box::new(FileStore::new(store_path)))
}

#[test]
fn sorter_state_survives_restart() {
    let dir = temp_dir("restart");
    fs::write(dir.join("items.json"), r#"[{"name":"plank"},{"name":"rope"}]"#).unwrap();
    let store_path = dir.join("autosort.json");

    let mut ctx = session(&dir, &store_path);
    ctx.world_loaded("harbor");
    let sorter = add_container(&mut ctx, 40, &[(plank(), 1)]);
    let plain = add_container(&mut ctx, 41, &[(plank(), 9), (rope(), 3)]);
    upgrade_node(&mut ctx, sorter, SortMode::Filtered, 6);
    ctx.set_filter(sorter, FilterRule::unlimited(plank())).unwrap();
    ctx.set_ignore(plain, true).unwrap();
    ctx.save_world();
    ctx.world_unloaded();

    // Only the upgraded node is written, under the current version.
    let text = fs::read_to_string(&store_path).unwrap();
    let file = PersistedFile::from_json(&text).unwrap();
    assert_eq!(file.version, FORMAT_VERSION);
    assert_eq!(file.records.len(), 1);
    assert_eq!(file.records[0].node_id, sorter);
    assert!(!dir.join("autosort.json.tmp").exists());

    let mut ctx = session(&dir, &store_path);
    ctx.world_loaded("harbor");
    add_container(&mut ctx, 40, &[(plank(), 1)]);
    let source = add_container(&mut ctx, 42, &[(plank(), 12)]);
    let view = ctx.node_view(sorter).unwrap();
    assert_eq!(view.mode, Some(SortMode::Filtered));
    assert_eq!(view.priority, Some(6));
    assert_eq!(view.filters, vec![FilterRule::unlimited(plank())]);

    // The rehydrated sorter pulls as before.
    DistributionEngine::new().run_cycle(&mut ctx);
    assert_eq!(quantity_of(&ctx, sorter, plank()), 13);
    assert_eq!(quantity_of(&ctx, source, plank()), 0);

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn corrupt_store_falls_back_to_empty() {
    let dir = temp_dir("corrupt");
    fs::write(dir.join("items.json"), r#"[{"name":"plank"}]"#).unwrap();
    let store_path = dir.join("autosort.json");
    fs::write(&store_path, "{ definitely not a record file").unwrap();

    let mut ctx = session(&dir, &store_path);
    ctx.world_loaded("harbor");
    let node = add_container(&mut ctx, 1, &[]);
    assert!(!ctx.node_view(node).unwrap().upgraded);
    assert!(ctx.saved_records().all().is_empty());

    // Saving replaces the corrupt file with a valid one.
    upgrade_node(&mut ctx, node, SortMode::Auto, 0);
    ctx.save_world();
    let text = fs::read_to_string(&store_path).unwrap();
    assert_eq!(PersistedFile::from_json(&text).unwrap().records.len(), 1);

    let _ = fs::remove_dir_all(&dir);
}
