// tests/catalog.rs

//! MetaDB catalog tests: index loading, provider lookups, atomic reloads.

mod common;

use common::FixturePackage;
use moss::{Kind, MetaDb, Mutability, Provider};
use std::fs;

fn index_with(packages: &[FixturePackage], dir: &std::path::Path) -> std::path::PathBuf {
    let index = dir.join("stone.index");
    common::write_index(&index, packages);
    index
}

#[test]
fn test_load_populates_catalog_and_provider_index() {
    let temp = tempfile::tempdir().unwrap();
    let index = index_with(
        &[
            FixturePackage::new("pkg-a", "1.0"),
            FixturePackage::new("pkg-b", "2.0"),
        ],
        temp.path(),
    );

    let mut db = MetaDb::connect(temp.path().join("meta.db"), Mutability::ReadWrite).unwrap();
    let loaded = db.load_from_index(&index).unwrap();
    assert_eq!(loaded, 2);

    let entries = db.list().unwrap();
    assert_eq!(entries.len(), 2);
    let names: Vec<_> = {
        let mut names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        names.sort();
        names
    };
    assert_eq!(names, vec!["pkg-a", "pkg-b"]);

    // The implicit name provider points back at the entry
    let a = entries.iter().find(|e| e.name == "pkg-a").unwrap();
    assert_eq!(
        db.by_provider(Kind::PackageName, "pkg-a").unwrap(),
        vec![a.pkg_id.clone()]
    );
}

#[test]
fn test_reload_replaces_catalog_completely() {
    let temp = tempfile::tempdir().unwrap();
    let first = index_with(
        &[
            FixturePackage::new("pkg-a", "1.0"),
            FixturePackage::new("pkg-b", "2.0"),
        ],
        temp.path(),
    );

    let mut db = MetaDb::connect(temp.path().join("meta.db"), Mutability::ReadWrite).unwrap();
    db.load_from_index(&first).unwrap();

    // New index drops pkg-b and upgrades pkg-a
    let second = temp.path().join("second.index");
    common::write_index(&second, &[FixturePackage::new("pkg-a", "1.1")]);
    db.load_from_index(&second).unwrap();

    let entries = db.list().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].name, "pkg-a");
    assert_eq!(entries[0].version_identifier, "1.1");

    assert!(db.by_provider(Kind::PackageName, "pkg-b").unwrap().is_empty());
    assert_eq!(db.by_provider(Kind::PackageName, "pkg-a").unwrap().len(), 1);
}

#[test]
fn test_explicit_providers_round_trip() {
    let temp = tempfile::tempdir().unwrap();
    let libfoo = FixturePackage::new("libfoo", "1.2.3")
        .providing(Provider::new(Kind::SharedLibrary, "libfoo.so.1"))
        .providing(Provider::new(Kind::PkgConfig, "foo"));
    let index = index_with(&[libfoo], temp.path());

    let mut db = MetaDb::connect(temp.path().join("meta.db"), Mutability::ReadWrite).unwrap();
    db.load_from_index(&index).unwrap();

    let entries = db.list().unwrap();
    let entry = &entries[0];
    for provider in &entry.providers {
        let ids = db
            .by_provider(provider.kind, &provider.identifier)
            .unwrap();
        assert_eq!(ids, vec![entry.pkg_id.clone()], "provider {provider}");
    }
    assert_eq!(
        db.by_provider(Kind::SharedLibrary, "libfoo.so.1").unwrap(),
        vec![entry.pkg_id.clone()]
    );
}

#[test]
fn test_shared_provider_lists_every_origin() {
    let temp = tempfile::tempdir().unwrap();
    let index = index_with(
        &[
            FixturePackage::new("openssl", "3.2")
                .providing(Provider::new(Kind::SharedLibrary, "libcrypto.so.3")),
            FixturePackage::new("openssl-compat", "3.1")
                .providing(Provider::new(Kind::SharedLibrary, "libcrypto.so.3")),
        ],
        temp.path(),
    );

    let mut db = MetaDb::connect(temp.path().join("meta.db"), Mutability::ReadWrite).unwrap();
    db.load_from_index(&index).unwrap();

    let ids = db
        .by_provider(Kind::SharedLibrary, "libcrypto.so.3")
        .unwrap();
    assert_eq!(ids.len(), 2);
}

#[test]
fn test_failed_load_leaves_no_residue() {
    let temp = tempfile::tempdir().unwrap();
    let good = index_with(&[FixturePackage::new("pkg-a", "1.0")], temp.path());
    let db_path = temp.path().join("meta.db");

    let mut db = MetaDb::connect(&db_path, Mutability::ReadWrite).unwrap();
    db.load_from_index(&good).unwrap();

    // Corrupt index: valid archive magic, garbage beyond
    let bad = temp.path().join("bad.index");
    let mut bytes = fs::read(&good).unwrap();
    bytes.truncate(40);
    fs::write(&bad, &bytes).unwrap();

    assert!(db.load_from_index(&bad).is_err());
    assert!(db.is_closed());

    // Post-failure the catalog is empty; a subsequent good load holds
    // exactly the new contents
    let mut db = MetaDb::connect(&db_path, Mutability::ReadWrite).unwrap();
    assert!(db.list().unwrap().is_empty());

    let next = temp.path().join("next.index");
    common::write_index(&next, &[FixturePackage::new("pkg-c", "3.0")]);
    db.load_from_index(&next).unwrap();

    let entries = db.list().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].name, "pkg-c");
}

#[test]
fn test_load_rejects_binary_archive() {
    let temp = tempfile::tempdir().unwrap();
    let package = temp.path().join("single.stone");
    common::write_package(&package, &FixturePackage::new("pkg-a", "1.0"));

    let mut db = MetaDb::connect(temp.path().join("meta.db"), Mutability::ReadWrite).unwrap();
    let err = db.load_from_index(&package).unwrap_err();
    assert!(err.to_string().contains("repository"));
}

#[test]
fn test_repeated_queries_are_stable() {
    let temp = tempfile::tempdir().unwrap();
    let index = index_with(
        &[
            FixturePackage::new("pkg-a", "1.0"),
            FixturePackage::new("pkg-b", "2.0"),
        ],
        temp.path(),
    );

    let mut db = MetaDb::connect(temp.path().join("meta.db"), Mutability::ReadWrite).unwrap();
    db.load_from_index(&index).unwrap();

    let first = db.list().unwrap();
    let second = db.list().unwrap();
    assert_eq!(first, second);

    let id = &first[0].pkg_id;
    assert_eq!(db.get(id).unwrap(), db.get(id).unwrap());
}

#[test]
fn test_download_hints_survive_the_catalog() {
    let temp = tempfile::tempdir().unwrap();
    let index = index_with(
        &[FixturePackage::new("nano", "7.2").downloadable(
            "stone/nano-7.2.stone",
            "0123456789abcdef",
            4096,
        )],
        temp.path(),
    );

    let mut db = MetaDb::connect(temp.path().join("meta.db"), Mutability::ReadWrite).unwrap();
    db.load_from_index(&index).unwrap();

    let entries = db.list().unwrap();
    let entry = &entries[0];
    assert_eq!(entry.uri.as_deref(), Some("stone/nano-7.2.stone"));
    assert_eq!(entry.hash.as_deref(), Some("0123456789abcdef"));
    assert_eq!(entry.download_size, Some(4096));
}
