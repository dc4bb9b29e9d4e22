//! Durable state behavior across store instances, as a daemon restart
//! would exercise it.

use tempfile::TempDir;

use gantry_core::projects::parse_projects;
use gantry_core::state::{FileStateStore, StateStore};
use gantry_core::version::VersionTag;

#[test]
fn recorded_versions_survive_a_new_store_instance() {
    let dir = TempDir::new().unwrap();
    let v1 = VersionTag::parse("v1.4.0").unwrap();

    {
        let mut store = FileStateStore::new(dir.path());
        store.set(&"shop-api".into(), &v1).unwrap();
    }

    let store = FileStateStore::new(dir.path());
    assert_eq!(store.get(&"shop-api".into()).unwrap(), Some(v1));
}

#[test]
fn every_parsed_project_starts_with_empty_state() {
    let dir = TempDir::new().unwrap();
    let store = FileStateStore::new(dir.path());

    let projects = parse_projects(
        "# registry-side projects\nshop-api\nbilling\n",
    );
    assert_eq!(projects.len(), 2);
    for project in &projects {
        assert_eq!(
            store.get(&project.id).unwrap(),
            None,
            "'{}' has never been processed",
            project.id
        );
    }
}

#[test]
fn version_sort_decides_what_counts_as_new() {
    let dir = TempDir::new().unwrap();
    let mut store = FileStateStore::new(dir.path());
    store
        .set(&"shop-api".into(), &VersionTag::parse("v1.9.0").unwrap())
        .unwrap();

    let stored = store.get(&"shop-api".into()).unwrap().unwrap();
    let candidate = VersionTag::parse("v1.10.0").unwrap();
    assert!(
        candidate > stored,
        "v1.10.0 outranks v1.9.0 under version-sort, so a pipeline run is due"
    );
}
